//! CLI output formatting utilities.

use crate::episode::{EpisodeStatus, EpisodeSummary};
use console::{style, StyledObject};
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print a list item.
    pub fn list_item(msg: &str) {
        println!("  {} {}", style("*").cyan(), msg);
    }

    /// Print one line of the episode list.
    pub fn episode_info(episode: &EpisodeSummary) {
        println!(
            "  {} {} ({}, {}, {})",
            style("*").cyan(),
            style(&episode.title).bold(),
            style(&episode.slug).dim(),
            Self::status(episode.status),
            episode.created_at.format("%Y-%m-%d %H:%M")
        );
        if let Some(error) = &episode.error {
            println!("    {}", style(content_preview(error, 120)).red());
        }
    }

    /// Status colored by outcome.
    pub fn status(status: EpisodeStatus) -> StyledObject<&'static str> {
        let text = style(status.as_str());
        match status {
            EpisodeStatus::Done => text.green(),
            EpisodeStatus::Error => text.red(),
            EpisodeStatus::Pending => text.dim(),
            _ => text.yellow(),
        }
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(template) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed}] {msg}") {
            pb.set_style(template);
        }
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

/// Truncate content with ellipsis, on a char boundary.
pub fn content_preview(content: &str, max_chars: usize) -> String {
    let content = content.replace('\n', " ");
    if content.chars().count() <= max_chars {
        content
    } else {
        let cut: String = content.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_preview() {
        assert_eq!(content_preview("short", 10), "short");
        assert_eq!(content_preview("line\nbreak", 20), "line break");
        assert_eq!(content_preview("abcdefgh", 3), "abc...");
        // Multi-byte text is cut on a char boundary
        assert_eq!(content_preview("blåbærsyltetøy", 4), "blåb...");
    }
}
