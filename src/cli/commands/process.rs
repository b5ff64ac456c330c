//! Process, reprocess and clone commands.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::episode::EpisodeStore;
use crate::orchestrator::{Orchestrator, ProcessOptions, RunOutcome, RunReport};
use crate::refinement::{ProgressSink, SummaryOutcome};
use crate::transcription::{AsrBackend, Paragraph};
use anyhow::Result;
use async_trait::async_trait;
use indicatif::ProgressBar;
use std::sync::Arc;

/// Spinner that follows pipeline progress.
struct SpinnerSink {
    spinner: ProgressBar,
}

#[async_trait]
impl ProgressSink for SpinnerSink {
    async fn on_chunk_progress(&self, paragraphs: &[Paragraph]) -> crate::Result<()> {
        self.spinner
            .set_message(format!("Refining... {} paragraphs so far", paragraphs.len()));
        Ok(())
    }

    async fn on_pipeline_complete(&self, outcome: &SummaryOutcome) -> crate::Result<()> {
        self.spinner
            .set_message(format!("Summary ready, {} chapters", outcome.chapters.len()));
        Ok(())
    }
}

/// Orchestrator with a spinner attached.
fn orchestrator_with_spinner(settings: Settings, msg: &str) -> Result<(Orchestrator, ProgressBar)> {
    let spinner = Output::spinner(msg);
    let orchestrator = Orchestrator::new(settings)?.with_observer(Arc::new(SpinnerSink {
        spinner: spinner.clone(),
    }));
    Ok((orchestrator, spinner))
}

/// Parse an optional backend name.
pub(crate) fn parse_backend(backend: Option<&str>) -> Result<Option<AsrBackend>> {
    backend
        .map(|b| b.parse::<AsrBackend>().map_err(|e| anyhow::anyhow!(e)))
        .transpose()
}

/// Run the process command.
pub async fn run_process(
    id: &str,
    backend: Option<&str>,
    min_speakers: Option<u32>,
    settings: Settings,
) -> Result<()> {
    let backend = parse_backend(backend)?;
    preflight::check(
        Operation::Process(backend.unwrap_or(settings.transcription.backend)),
        &settings,
    )?;

    let (orchestrator, spinner) = orchestrator_with_spinner(settings, "Transcribing...")?;
    let report = orchestrator
        .process_episode(
            id,
            ProcessOptions {
                backend,
                min_speakers,
            },
        )
        .await;
    spinner.finish_and_clear();

    print_report(&report?)
}

/// Run the reprocess command.
pub async fn run_reprocess(id: &str, settings: Settings) -> Result<()> {
    preflight::check(Operation::Reprocess, &settings)?;

    let (orchestrator, spinner) = orchestrator_with_spinner(settings, "Refining...")?;
    let report = orchestrator.reprocess_episode(id).await;
    spinner.finish_and_clear();

    print_report(&report?)
}

/// Run the clone command.
pub async fn run_clone(id: &str, no_process: bool, settings: Settings) -> Result<()> {
    if no_process {
        let store = Orchestrator::new(settings)?.store();
        let source = store
            .find_episode(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Episode not found: {}", id))?;
        let new_id = store.clone_episode(&source.id).await?;
        let slug = store
            .get_episode(&new_id)
            .await?
            .map(|e| e.slug)
            .unwrap_or_else(|| new_id.clone());
        Output::success(&format!("Cloned '{}' into {}", source.title, slug));
        Output::info(&format!("Run 'podtekst reprocess {}' to refine it.", slug));
        return Ok(());
    }

    preflight::check(Operation::Reprocess, &settings)?;

    let (orchestrator, spinner) = orchestrator_with_spinner(settings, "Refining clone...")?;
    let report = orchestrator.clone_and_reprocess(id).await;
    spinner.finish_and_clear();

    print_report(&report?)
}

/// Print a run report; a failed run becomes a non-zero exit.
pub(crate) fn print_report(report: &RunReport) -> Result<()> {
    match &report.outcome {
        RunOutcome::Completed {
            paragraphs,
            chapters,
            speakers,
            degraded_chunks,
        } => {
            Output::success(&format!("Episode {} is done ({})", report.episode_id, report.kind));
            Output::kv("Paragraphs", &paragraphs.to_string());
            Output::kv("Chapters", &chapters.to_string());
            if *speakers > 0 {
                Output::kv("Speakers", &speakers.to_string());
            }
            Output::kv(
                "Tokens",
                &format!(
                    "{} in / {} out",
                    report.usage.input_tokens, report.usage.output_tokens
                ),
            );
            if *degraded_chunks > 0 {
                Output::warning(&format!(
                    "{} chunk(s) were kept unrefined after a truncated response",
                    degraded_chunks
                ));
            }
            Ok(())
        }
        RunOutcome::Failed { stage, message } => {
            Output::error(&format!("Episode {} failed while {}", report.episode_id, stage));
            Err(anyhow::anyhow!(message.clone()))
        }
    }
}
