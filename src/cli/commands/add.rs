//! Add command implementation.

use super::process::{parse_backend, run_process};
use crate::cli::Output;
use crate::config::Settings;
use crate::episode::{EpisodeStore, NewEpisode, SqliteEpisodeStore};
use anyhow::Result;

/// Run the add command.
pub async fn run_add(
    url: &str,
    title: &str,
    description: Option<String>,
    backend: Option<&str>,
    min_speakers: Option<u32>,
    no_process: bool,
    settings: Settings,
) -> Result<()> {
    // Fail on a bad backend name before creating anything
    parse_backend(backend)?;

    let mut fields = NewEpisode::new(title, url);
    if let Some(description) = description {
        fields = fields.with_description(description);
    }

    let store = SqliteEpisodeStore::new(&settings.sqlite_path())?;
    let id = store.create_episode(fields).await?;
    let slug = store
        .get_episode(&id)
        .await?
        .map(|e| e.slug)
        .unwrap_or_else(|| id.clone());
    Output::success(&format!("Added '{}' as {}", title, slug));

    if no_process {
        Output::info(&format!("Run 'podtekst process {}' to start it.", slug));
        return Ok(());
    }

    // Release the connection before the orchestrator opens its own
    drop(store);
    run_process(&id, backend, min_speakers, settings).await
}
