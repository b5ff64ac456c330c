//! Readable, unique episode slugs.

use crate::error::Result;
use chrono::Utc;

const MAX_SLUG_LEN: usize = 60;

/// Lowercase ASCII words joined by `-`, e.g. "Ep. 12: Hello!" -> `ep-12-hello`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }

    let mut slug: String = slug.chars().take(MAX_SLUG_LEN).collect();
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        "episode".to_string()
    } else {
        slug
    }
}

/// Slug for a reprocessing clone: `<slug>-re-<base36 millis>`.
pub fn reprocess_slug(slug: &str) -> String {
    format!("{}-re-{}", slug, millis_base36())
}

/// `base` if free, else `base-2` .. `base-99`, else `base-<base36 millis>`.
pub fn unique_slug(base: &str, mut taken: impl FnMut(&str) -> Result<bool>) -> Result<String> {
    if !taken(base)? {
        return Ok(base.to_string());
    }
    for i in 2..100 {
        let candidate = format!("{}-{}", base, i);
        if !taken(&candidate)? {
            return Ok(candidate);
        }
    }
    Ok(format!("{}-{}", base, millis_base36()))
}

fn millis_base36() -> String {
    to_base36(Utc::now().timestamp_millis().max(0) as u64)
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Ep. 12: Hello, World!"), "ep-12-hello-world");
        assert_eq!(slugify("  --Compilers--  "), "compilers");
        assert_eq!(slugify("Ærlig talt"), "rlig-talt");
        assert_eq!(slugify("???"), "episode");
        assert!(slugify(&"word ".repeat(40)).len() <= MAX_SLUG_LEN);
        assert!(!slugify(&"word ".repeat(40)).ends_with('-'));
    }

    #[test]
    fn test_unique_slug_suffixes() {
        let taken: HashSet<&str> = ["pilot", "pilot-2"].into_iter().collect();
        let slug = unique_slug("pilot", |s| Ok(taken.contains(s))).unwrap();
        assert_eq!(slug, "pilot-3");

        assert_eq!(unique_slug("fresh", |_| Ok(false)).unwrap(), "fresh");

        let crowded = unique_slug("busy", |s| Ok(s != "busy-x")).unwrap();
        assert!(crowded.starts_with("busy-") && crowded.len() > "busy-99".len());
    }

    #[test]
    fn test_reprocess_slug() {
        let slug = reprocess_slug("pilot");
        assert!(slug.starts_with("pilot-re-"));
        assert!(slug["pilot-re-".len()..].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }
}
