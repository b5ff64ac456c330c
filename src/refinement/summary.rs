//! Summary, chapter and speaker-name stage.

use super::EpisodeContext;
use crate::config::Prompts;
use crate::error::{PodtekstError, Result};
use crate::llm::{parse_json_response, CompletionBackend, CompletionRequest, TokenUsage};
use crate::transcription::{speaker_label, Chapter, Paragraph};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Summary used when the model does not finish its answer.
pub const FAILED_SUMMARY: &str = "Summary generation failed.";

/// Summary used when there was nothing to summarize.
pub const EMPTY_TRANSCRIPT_SUMMARY: &str = "No speech was transcribed for this episode.";

/// Title of the single chapter covering the whole episode.
pub const FULL_EPISODE_CHAPTER: &str = "Full episode";

/// Output of the summary stage.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryOutcome {
    pub summary: String,
    /// Sorted by timestamp, never empty.
    pub chapters: Vec<Chapter>,
    /// Index `i` is the display name for `SPEAKER_i`.
    pub speaker_names: Vec<String>,
    pub usage: TokenUsage,
    pub degraded: bool,
}

#[derive(Debug, Deserialize)]
struct SummaryResponse {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    chapters: Vec<RawChapter>,
    #[serde(default, alias = "speakerNames")]
    speaker_names: Vec<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct RawChapter {
    #[serde(default)]
    title: String,
    #[serde(default)]
    timestamp: f64,
}

/// Runs the single summary call over the merged transcript.
pub struct Summarizer {
    backend: Arc<dyn CompletionBackend>,
    prompts: Arc<Prompts>,
    max_tokens: u32,
}

impl Summarizer {
    pub fn new(backend: Arc<dyn CompletionBackend>, prompts: Arc<Prompts>, max_tokens: u32) -> Self {
        Self {
            backend,
            prompts,
            max_tokens,
        }
    }

    /// Summarize the full paragraph sequence.
    ///
    /// `speaker_count` comes from the raw transcript's labels, so a speaker
    /// whose text was relabelled during refinement still gets a name slot.
    ///
    /// Fails with `Summary` only when the call itself fails. A truncated or
    /// unparseable answer yields the placeholder summary and one chapter for
    /// the whole episode.
    #[instrument(skip_all, fields(paragraphs = paragraphs.len(), speakers = speaker_count))]
    pub async fn summarize(
        &self,
        paragraphs: &[Paragraph],
        speaker_count: usize,
        ctx: &EpisodeContext,
    ) -> Result<SummaryOutcome> {
        if paragraphs.is_empty() {
            info!("Empty transcript, skipping summary call");
            return Ok(SummaryOutcome {
                summary: EMPTY_TRANSCRIPT_SUMMARY.to_string(),
                chapters: whole_episode(),
                speaker_names: Vec::new(),
                usage: TokenUsage::default(),
                degraded: false,
            });
        }

        let prompt = self.build_prompt(paragraphs, ctx, speaker_count > 0);
        let request = CompletionRequest::new(prompt, self.max_tokens)
            .with_system(self.prompts.summary.system.clone())
            .json();
        let completion = self
            .backend
            .complete(request)
            .await
            .map_err(|e| PodtekstError::Summary(e.to_string()))?;

        info!(
            "Summary used {} input / {} output tokens",
            completion.usage.input_tokens, completion.usage.output_tokens
        );

        let fallback = |usage: TokenUsage| SummaryOutcome {
            summary: FAILED_SUMMARY.to_string(),
            chapters: whole_episode(),
            speaker_names: resolve_speaker_names(&[], speaker_count),
            usage,
            degraded: true,
        };

        if !completion.stop.is_complete() {
            warn!("Summary stopped early ({}), using placeholder", completion.stop);
            return Ok(fallback(completion.usage));
        }

        let parsed: SummaryResponse = match parse_json_response(&completion.text) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Summary output unparseable ({}), using placeholder", e);
                return Ok(fallback(completion.usage));
            }
        };

        let transcript_end = paragraphs.iter().map(|p| p.end).fold(0.0, f64::max);
        let summary = parsed.summary.trim().to_string();

        Ok(SummaryOutcome {
            summary: if summary.is_empty() {
                FAILED_SUMMARY.to_string()
            } else {
                summary
            },
            chapters: normalize_chapters(parsed.chapters, transcript_end),
            speaker_names: resolve_speaker_names(&parsed.speaker_names, speaker_count),
            usage: completion.usage,
            degraded: false,
        })
    }

    fn build_prompt(&self, paragraphs: &[Paragraph], ctx: &EpisodeContext, labeled: bool) -> String {
        let speaker_instructions = if labeled {
            self.prompts.summary.speaker_instructions.clone()
        } else {
            String::new()
        };

        let mut vars = HashMap::new();
        vars.insert("episode_context".to_string(), ctx.render());
        vars.insert("speaker_instructions".to_string(), speaker_instructions);
        vars.insert("transcript".to_string(), format_paragraphs(paragraphs));

        self.prompts.render_with_custom(&self.prompts.summary.user, &vars)
    }
}

/// `[SPEAKER_00] 12.0s - 15.5s: text`, separated by blank lines.
fn format_paragraphs(paragraphs: &[Paragraph]) -> String {
    paragraphs
        .iter()
        .map(|p| match &p.speaker {
            Some(speaker) => format!("[{}] {:.1}s - {:.1}s: {}", speaker, p.start, p.end, p.text),
            None => format!("{:.1}s - {:.1}s: {}", p.start, p.end, p.text),
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn whole_episode() -> Vec<Chapter> {
    vec![Chapter::new(FULL_EPISODE_CHAPTER, 0.0)]
}

/// Positional name map sized to `count`; blank or missing entries keep the raw label.
fn resolve_speaker_names(names: &[Option<String>], count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            names
                .get(i)
                .and_then(|n| n.as_deref())
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| speaker_label(i))
        })
        .collect()
}

/// Sort, clamp and dedupe chapters; never returns an empty list.
fn normalize_chapters(raw: Vec<RawChapter>, transcript_end: f64) -> Vec<Chapter> {
    let mut chapters: Vec<Chapter> = raw
        .into_iter()
        .filter(|c| c.timestamp.is_finite() && !c.title.trim().is_empty())
        .map(|c| Chapter::new(c.title.trim(), c.timestamp.clamp(0.0, transcript_end.max(0.0))))
        .collect();

    // Stable, so ties keep insertion order
    chapters.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    chapters.dedup_by(|later, earlier| later.timestamp == earlier.timestamp);

    if chapters.is_empty() {
        return whole_episode();
    }
    chapters
}
