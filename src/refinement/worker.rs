//! Refinement of a single chunk into paragraphs.

use super::EpisodeContext;
use crate::chunking::Chunk;
use crate::config::Prompts;
use crate::error::{PodtekstError, Result};
use crate::llm::{parse_json_response, CompletionBackend, CompletionRequest, TokenUsage};
use crate::transcription::{Paragraph, Segment};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Paragraphs produced from one chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRefinement {
    pub paragraphs: Vec<Paragraph>,
    pub usage: TokenUsage,
    /// True when the fallback paragraphs were used instead of model output.
    pub degraded: bool,
}

#[derive(Debug, Deserialize)]
struct RefineResponse {
    #[serde(default)]
    paragraphs: Vec<RawParagraph>,
}

#[derive(Debug, Deserialize)]
struct RawParagraph {
    #[serde(default)]
    start: f64,
    #[serde(default)]
    end: f64,
    #[serde(default)]
    text: String,
    #[serde(default)]
    speaker: Option<String>,
}

/// Cleans up chunks through a completion backend.
pub struct Refiner {
    backend: Arc<dyn CompletionBackend>,
    prompts: Arc<Prompts>,
    max_tokens: u32,
}

impl Refiner {
    pub fn new(backend: Arc<dyn CompletionBackend>, prompts: Arc<Prompts>, max_tokens: u32) -> Self {
        Self {
            backend,
            prompts,
            max_tokens,
        }
    }

    /// Refine one chunk.
    ///
    /// Fails with `Refinement` only when the call itself fails. Truncated or
    /// unparseable output is replaced by fallback paragraphs built from the
    /// chunk's own text. Empty chunks produce nothing and make no call.
    #[instrument(
        skip(self, chunk, ctx),
        fields(chunk = chunk.index, segments = chunk.len(), span_secs = chunk.duration())
    )]
    pub async fn refine(&self, chunk: &Chunk, ctx: &EpisodeContext) -> Result<ChunkRefinement> {
        if chunk.is_empty() {
            return Ok(ChunkRefinement {
                paragraphs: Vec::new(),
                usage: TokenUsage::default(),
                degraded: false,
            });
        }

        let request = CompletionRequest::new(self.build_prompt(chunk, ctx), self.max_tokens)
            .with_system(self.prompts.refine.system.clone())
            .json();
        let completion = self
            .backend
            .complete(request)
            .await
            .map_err(|e| PodtekstError::Refinement(format!("chunk {}: {}", chunk.index, e)))?;

        info!(
            "Chunk {} used {} input / {} output tokens",
            chunk.index, completion.usage.input_tokens, completion.usage.output_tokens
        );

        if !completion.stop.is_complete() {
            warn!(
                "Chunk {} stopped early ({}), using original text",
                chunk.index, completion.stop
            );
            return Ok(degraded(chunk, completion.usage));
        }

        let parsed: RefineResponse = match parse_json_response(&completion.text) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Chunk {} returned unparseable output ({}), using original text", chunk.index, e);
                return Ok(degraded(chunk, completion.usage));
            }
        };

        let paragraphs = normalize_paragraphs(chunk, parsed.paragraphs);
        if paragraphs.is_empty() {
            warn!("Chunk {} returned no paragraphs, using original text", chunk.index);
            return Ok(degraded(chunk, completion.usage));
        }

        debug!("Chunk {} refined into {} paragraphs", chunk.index, paragraphs.len());
        Ok(ChunkRefinement {
            paragraphs,
            usage: completion.usage,
            degraded: false,
        })
    }

    fn build_prompt(&self, chunk: &Chunk, ctx: &EpisodeContext) -> String {
        let speaker_rules = if chunk.has_speakers() {
            self.prompts.refine.speaker_rules.clone()
        } else {
            String::new()
        };

        let mut vars = HashMap::new();
        vars.insert("episode_context".to_string(), ctx.render());
        vars.insert("speaker_rules".to_string(), speaker_rules);
        vars.insert("transcript".to_string(), format_chunk(&chunk.segments));

        self.prompts.render_with_custom(&self.prompts.refine.user, &vars)
    }
}

/// One line per segment: `[12.0s - 15.5s] [SPEAKER_00] text`.
fn format_chunk(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|s| match &s.speaker {
            Some(speaker) => format!("[{:.1}s - {:.1}s] [{}] {}", s.start, s.end, speaker, s.text.trim()),
            None => format!("[{:.1}s - {:.1}s] {}", s.start, s.end, s.text.trim()),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn degraded(chunk: &Chunk, usage: TokenUsage) -> ChunkRefinement {
    ChunkRefinement {
        paragraphs: fallback_paragraphs(chunk),
        usage,
        degraded: true,
    }
}

/// Speaker label per segment, with unlabeled segments inheriting the
/// previous label (or the chunk's first label at the start).
fn effective_speakers(chunk: &Chunk) -> Vec<Option<String>> {
    let first = chunk.segments.iter().find_map(|s| s.speaker.clone());
    let mut current = first;
    chunk
        .segments
        .iter()
        .map(|s| {
            if s.speaker.is_some() {
                current = s.speaker.clone();
            }
            current.clone()
        })
        .collect()
}

/// Chunk text verbatim, one paragraph per contiguous same-speaker run.
///
/// Without speaker labels this is exactly one paragraph spanning the chunk.
pub(crate) fn fallback_paragraphs(chunk: &Chunk) -> Vec<Paragraph> {
    if chunk.is_empty() {
        return Vec::new();
    }
    if !chunk.has_speakers() {
        return vec![Paragraph::new(
            chunk.start(),
            chunk.end().max(chunk.start()),
            chunk.joined_text(),
        )];
    }

    let speakers = effective_speakers(chunk);
    speaker_runs(chunk.segments.iter().zip(speakers.iter()))
}

/// One verbatim paragraph per contiguous run of the same effective speaker.
fn speaker_runs<'a>(
    segments: impl IntoIterator<Item = (&'a Segment, &'a Option<String>)>,
) -> Vec<Paragraph> {
    let mut paragraphs: Vec<Paragraph> = Vec::new();
    let mut run_speaker: Option<&Option<String>> = None;
    let mut run: Vec<&Segment> = Vec::new();

    for (segment, speaker) in segments {
        if run_speaker.is_some_and(|current| current != speaker) {
            flush_run(&mut run, run_speaker, &mut paragraphs);
        }
        run_speaker = Some(speaker);
        run.push(segment);
    }
    flush_run(&mut run, run_speaker, &mut paragraphs);

    paragraphs
}

fn flush_run(run: &mut Vec<&Segment>, speaker: Option<&Option<String>>, out: &mut Vec<Paragraph>) {
    if let (Some(first), Some(last)) = (run.first(), run.last()) {
        let text = run
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        out.push(Paragraph {
            start: first.start,
            end: last.end.max(first.start),
            text,
            speaker: speaker.cloned().flatten(),
        });
    }
    run.clear();
}

/// Enforce paragraph post-conditions against the source chunk.
///
/// Spans are clamped into the chunk. When the chunk has speaker labels,
/// every paragraph gets one: the model's label if it exists in the chunk,
/// otherwise the label active at the paragraph's start. A paragraph that
/// covers more than one speaker is replaced by the source text of each
/// speaker's run.
fn normalize_paragraphs(chunk: &Chunk, raw: Vec<RawParagraph>) -> Vec<Paragraph> {
    let chunk_start = chunk.start();
    let chunk_end = chunk.end().max(chunk_start);
    let labeled = chunk.has_speakers();
    let known: HashSet<&str> = chunk
        .segments
        .iter()
        .filter_map(|s| s.speaker.as_deref())
        .collect();
    let speakers = effective_speakers(chunk);

    let clamp = |t: f64, fallback: f64| {
        if t.is_finite() {
            t.clamp(chunk_start, chunk_end)
        } else {
            fallback
        }
    };

    raw.into_iter()
        .filter(|p| !p.text.trim().is_empty())
        .flat_map(|p| {
            let start = clamp(p.start, chunk_start);
            let end = clamp(p.end, chunk_end).max(start);

            let speaker = if labeled {
                p.speaker
                    .filter(|label| known.contains(label.as_str()))
                    .or_else(|| speaker_at(chunk, &speakers, start))
            } else {
                None
            };

            let paragraph = Paragraph {
                start,
                end,
                text: p.text.trim().to_string(),
                speaker,
            };
            if labeled {
                split_at_speaker_changes(chunk, &speakers, paragraph)
            } else {
                vec![paragraph]
            }
        })
        .collect()
}

/// Whether `paragraph` spans most of `segment`.
fn covers(paragraph: &Paragraph, segment: &Segment) -> bool {
    let overlap = paragraph.end.min(segment.end) - paragraph.start.max(segment.start);
    overlap > 0.0 && overlap * 2.0 > segment.end - segment.start
}

/// Keep `paragraph` unless it covers segments of different speakers, in
/// which case each speaker's run of source text becomes its own paragraph.
fn split_at_speaker_changes(
    chunk: &Chunk,
    speakers: &[Option<String>],
    paragraph: Paragraph,
) -> Vec<Paragraph> {
    let covered: Vec<(&Segment, &Option<String>)> = chunk
        .segments
        .iter()
        .zip(speakers.iter())
        .filter(|(segment, _)| covers(&paragraph, segment))
        .collect();

    if !covered.windows(2).any(|pair| pair[0].1 != pair[1].1) {
        return vec![paragraph];
    }

    warn!(
        "Chunk {}: paragraph at {:.1}s - {:.1}s mixes speakers, splitting it on speaker turns",
        chunk.index, paragraph.start, paragraph.end
    );
    speaker_runs(covered)
}

/// Effective label of the last segment starting at or before `time`.
fn speaker_at(chunk: &Chunk, speakers: &[Option<String>], time: f64) -> Option<String> {
    let idx = chunk
        .segments
        .iter()
        .rposition(|s| s.start <= time)
        .unwrap_or(0);
    speakers.get(idx).cloned().flatten()
}
