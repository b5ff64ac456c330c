//! Export command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::episode::{EpisodeStore, SqliteEpisodeStore};
use crate::transcription::{format_transcript, OutputFormat};
use anyhow::Result;

/// Run the export command.
pub async fn run_export(
    id: &str,
    output: Option<String>,
    format: &str,
    settings: Settings,
) -> Result<()> {
    let output_format: OutputFormat = format.parse().map_err(|e: String| anyhow::anyhow!(e))?;

    let store = SqliteEpisodeStore::new(&settings.sqlite_path())?;
    let Some(episode) = store.find_episode(id).await? else {
        Output::error(&format!("Episode not found: {}", id));
        Output::info("Use 'podtekst list' to see episodes.");
        return Ok(());
    };

    let export = episode.to_export();
    if export.paragraphs.is_empty() {
        Output::warning(&format!(
            "'{}' has no refined paragraphs yet (status: {})",
            episode.title, episode.status
        ));
    }

    let output_str = format_transcript(&export, output_format);

    match output {
        Some(path) if path != "-" => {
            std::fs::write(&path, &output_str)?;
            Output::success(&format!(
                "Exported '{}' to {} ({} paragraphs)",
                episode.title,
                path,
                export.paragraphs.len()
            ));
        }
        _ => {
            println!("{}", output_str);
        }
    }

    Ok(())
}
