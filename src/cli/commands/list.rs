//! List command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::episode::{EpisodeStatus, EpisodeStore, SqliteEpisodeStore};
use anyhow::Result;

/// Run the list command.
pub async fn run_list(settings: Settings) -> Result<()> {
    let store = SqliteEpisodeStore::new(&settings.sqlite_path())?;
    let episodes = store.list_episodes().await?;

    if episodes.is_empty() {
        Output::info("No episodes yet. Use 'podtekst add <url> --title <title>' to add one.");
        return Ok(());
    }

    Output::header(&format!("Episodes ({})", episodes.len()));
    println!();

    for episode in &episodes {
        Output::episode_info(episode);
    }

    let done = episodes
        .iter()
        .filter(|e| e.status == EpisodeStatus::Done)
        .count();
    let failed = episodes
        .iter()
        .filter(|e| e.status == EpisodeStatus::Error)
        .count();
    println!();
    Output::kv("Done", &done.to_string());
    Output::kv("Failed", &failed.to_string());

    Ok(())
}
