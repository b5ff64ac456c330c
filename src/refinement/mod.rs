//! Transcript refinement: chunk cleanup, ordered batch merge, and the
//! dependent summary stage.
//!
//! # Flow
//!
//! 1. [`BatchScheduler`] runs a [`Refiner`] over every chunk, a batch of
//!    `width` chunks at a time, and reports the merged paragraphs after each
//!    batch through a [`ProgressSink`].
//! 2. [`Summarizer`] makes one call over the merged paragraphs for the
//!    summary, chapters and speaker names.

mod scheduler;
mod summary;
mod worker;

pub use scheduler::{BatchScheduler, ScheduleOutcome};
pub use summary::{SummaryOutcome, Summarizer, EMPTY_TRANSCRIPT_SUMMARY, FAILED_SUMMARY, FULL_EPISODE_CHAPTER};
pub use worker::{ChunkRefinement, Refiner};

use crate::error::Result;
use crate::transcription::Paragraph;
use async_trait::async_trait;

/// Advisory prompt context about the episode being refined.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EpisodeContext {
    pub title: Option<String>,
    pub description: Option<String>,
}

impl EpisodeContext {
    pub fn new(title: impl Into<String>, description: Option<String>) -> Self {
        Self {
            title: Some(title.into()),
            description,
        }
    }

    /// Context block for prompts; empty when nothing is known.
    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        if let Some(title) = self.title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            lines.push(format!("Episode title: {}", title));
        }
        if let Some(desc) = self
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
        {
            lines.push(format!("Episode description: {}", desc));
        }

        if lines.is_empty() {
            String::new()
        } else {
            format!("\n{}\n", lines.join("\n"))
        }
    }
}

/// Observer for pipeline progress.
///
/// Calls happen in order on the pipeline's task: once after every completed
/// batch, then once when the summary stage finishes. An `Err` from a sink
/// aborts the run.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// All paragraphs merged so far, in chunk order.
    async fn on_chunk_progress(&self, paragraphs: &[Paragraph]) -> Result<()>;

    /// Final summary stage output.
    async fn on_pipeline_complete(&self, outcome: &SummaryOutcome) -> Result<()>;
}

/// Sink that ignores every notification.
pub struct NoopSink;

#[async_trait]
impl ProgressSink for NoopSink {
    async fn on_chunk_progress(&self, _paragraphs: &[Paragraph]) -> Result<()> {
        Ok(())
    }

    async fn on_pipeline_complete(&self, _outcome: &SummaryOutcome) -> Result<()> {
        Ok(())
    }
}
