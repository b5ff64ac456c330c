//! Show command implementation.

use crate::cli::output::content_preview;
use crate::cli::Output;
use crate::config::Settings;
use crate::episode::{EpisodeStore, SqliteEpisodeStore};
use crate::transcription::{display_name, format_timestamp, speaker_label};
use anyhow::Result;

/// Run the show command.
pub async fn run_show(id: &str, settings: Settings) -> Result<()> {
    let store = SqliteEpisodeStore::new(&settings.sqlite_path())?;
    let Some(episode) = store.find_episode(id).await? else {
        Output::error(&format!("Episode not found: {}", id));
        Output::info("Use 'podtekst list' to see episodes.");
        return Ok(());
    };

    Output::header(&episode.title);
    Output::kv("ID", &episode.id);
    Output::kv("Slug", &episode.slug);
    Output::kv("Status", &Output::status(episode.status).to_string());
    Output::kv("Source", &episode.source_url);
    if let Some(audio_url) = &episode.audio_url {
        if audio_url != &episode.source_url {
            Output::kv("Audio", audio_url);
        }
    }
    if let Some(segments) = &episode.raw_transcript {
        Output::kv("Raw segments", &segments.len().to_string());
    }
    if let Some(paragraphs) = &episode.paragraphs {
        Output::kv("Paragraphs", &paragraphs.len().to_string());
    }
    Output::kv("Updated", &episode.updated_at.to_rfc3339());
    if let Some(error) = &episode.error {
        Output::error(error);
    }

    if let Some(summary) = &episode.summary {
        Output::header("Summary");
        println!("{}", summary.trim());
    }

    if let Some(chapters) = episode.chapters.as_deref().filter(|c| !c.is_empty()) {
        Output::header("Chapters");
        for chapter in chapters {
            Output::list_item(&format!(
                "[{}] {}",
                format_timestamp(chapter.timestamp),
                chapter.title
            ));
        }
    }

    if let Some(names) = episode.speaker_names.as_deref().filter(|n| !n.is_empty()) {
        Output::header("Speakers");
        for i in 0..names.len() {
            let label = speaker_label(i);
            Output::kv(&label, &display_name(&label, names));
        }
    }

    if let Some(first) = episode.paragraphs.as_deref().and_then(|p| p.first()) {
        Output::header("Opening");
        println!("{}", content_preview(&first.text, 300));
    }

    Ok(())
}
