//! Audio source resolution.
//!
//! Turns a user-supplied reference into a URL the recognition backend can
//! fetch. Internal storage references are trusted as-is; anything else must
//! look like audio by file extension or by the `Content-Type` of a `HEAD`
//! response.

use crate::config::AudioSettings;
use crate::error::{PodtekstError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

/// Supported audio file extensions.
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "m4a", "ogg", "flac", "aac", "wma"];

/// Trait for audio source resolvers.
#[async_trait]
pub trait AudioResolver: Send + Sync {
    /// Resolve `uri` into a playable URL, or fail with `InvalidSource`.
    async fn resolve(&self, uri: &str) -> Result<String>;
}

/// Resolver that validates remote URLs over HTTP.
pub struct HttpAudioResolver {
    http: reqwest::Client,
    trusted_prefixes: Vec<String>,
}

impl HttpAudioResolver {
    pub fn new(settings: &AudioSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            trusted_prefixes: settings.trusted_prefixes.clone(),
        })
    }

    fn is_trusted(&self, uri: &str) -> bool {
        self.trusted_prefixes
            .iter()
            .any(|prefix| !prefix.is_empty() && uri.starts_with(prefix.as_str()))
    }
}

/// Whether the URL path ends in a known audio extension.
pub fn has_audio_extension(url: &Url) -> bool {
    url.path()
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_audio_content_type(content_type: &str) -> bool {
    content_type.trim().to_lowercase().starts_with("audio/")
}

#[async_trait]
impl AudioResolver for HttpAudioResolver {
    #[instrument(skip(self))]
    async fn resolve(&self, uri: &str) -> Result<String> {
        if self.is_trusted(uri) {
            debug!("Trusted storage reference, skipping validation");
            return Ok(uri.to_string());
        }

        let url = Url::parse(uri)
            .map_err(|e| PodtekstError::InvalidSource(format!("{}: {}", uri, e)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(PodtekstError::InvalidSource(format!(
                "Unsupported URL scheme: {}",
                url.scheme()
            )));
        }

        if has_audio_extension(&url) {
            return Ok(url.to_string());
        }

        let response = self.http.head(url.clone()).send().await.map_err(|e| {
            PodtekstError::InvalidSource(format!("Could not reach {}: {}", url, e))
        })?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        debug!("HEAD {} -> {} ({})", url, response.status(), content_type);

        if response.status().is_success() && is_audio_content_type(content_type) {
            Ok(url.to_string())
        } else {
            Err(PodtekstError::InvalidSource(format!(
                "{} is not an audio file (content type: {})",
                url,
                if content_type.is_empty() { "unknown" } else { content_type }
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> HttpAudioResolver {
        HttpAudioResolver::new(&AudioSettings {
            trusted_prefixes: vec!["storage://".to_string()],
        })
        .unwrap()
    }

    #[test]
    fn test_audio_extension() {
        let ok = |s: &str| has_audio_extension(&Url::parse(s).unwrap());
        assert!(ok("https://cdn.example/ep1.mp3"));
        assert!(ok("https://cdn.example/show/Ep1.M4A?token=abc"));
        assert!(!ok("https://cdn.example/feed.xml"));
        assert!(!ok("https://cdn.example/mp3"));
    }

    #[test]
    fn test_audio_content_type() {
        assert!(is_audio_content_type("audio/mpeg"));
        assert!(is_audio_content_type("Audio/x-wav; charset=binary"));
        assert!(!is_audio_content_type("text/html"));
    }

    #[tokio::test]
    async fn test_trusted_reference_bypasses_checks() {
        let resolved = resolver().resolve("storage://uploads/ep1").await.unwrap();
        assert_eq!(resolved, "storage://uploads/ep1");
    }

    #[tokio::test]
    async fn test_extension_match_needs_no_request() {
        let resolved = resolver()
            .resolve("https://cdn.example/ep1.mp3")
            .await
            .unwrap();
        assert_eq!(resolved, "https://cdn.example/ep1.mp3");
    }

    #[tokio::test]
    async fn test_garbage_is_invalid_source() {
        let err = resolver().resolve("not a url").await.unwrap_err();
        assert!(matches!(err, PodtekstError::InvalidSource(_)));

        let err = resolver().resolve("ftp://cdn.example/ep1").await.unwrap_err();
        assert!(matches!(err, PodtekstError::InvalidSource(_)));
    }
}
