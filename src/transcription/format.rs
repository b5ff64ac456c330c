//! Transcript output formatting (JSON, SRT, VTT, Markdown).
//!
//! Exports refined paragraphs with resolved speaker names in place of raw
//! diarization labels.

use super::{format_timestamp, speaker_index, Chapter, Paragraph};
use serde::Serialize;

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputFormat {
    Json,
    Srt,
    Vtt,
    Markdown,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "srt" => Ok(OutputFormat::Srt),
            "vtt" | "webvtt" => Ok(OutputFormat::Vtt),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            _ => Err(format!(
                "Unknown format: {}. Use json, srt, vtt, or markdown.",
                s
            )),
        }
    }
}

/// JSON-serializable transcript for export.
#[derive(Debug, Serialize)]
pub struct TranscriptExport {
    pub episode_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub chapters: Vec<Chapter>,
    pub paragraphs: Vec<ParagraphExport>,
}

#[derive(Debug, Serialize)]
pub struct ParagraphExport {
    pub start_seconds: f64,
    pub end_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
    pub text: String,
}

impl TranscriptExport {
    /// Build an export, substituting resolved names for raw speaker labels.
    pub fn new(
        episode_id: impl Into<String>,
        title: impl Into<String>,
        paragraphs: &[Paragraph],
        speaker_names: &[String],
        summary: Option<String>,
        chapters: Vec<Chapter>,
    ) -> Self {
        Self {
            episode_id: episode_id.into(),
            title: title.into(),
            summary,
            chapters,
            paragraphs: paragraphs
                .iter()
                .map(|p| ParagraphExport {
                    start_seconds: p.start,
                    end_seconds: p.end,
                    speaker: p
                        .speaker
                        .as_deref()
                        .map(|label| display_name(label, speaker_names)),
                    text: p.text.clone(),
                })
                .collect(),
        }
    }
}

/// Resolved display name for a raw label, or the label itself.
pub fn display_name(label: &str, speaker_names: &[String]) -> String {
    speaker_index(label)
        .and_then(|i| speaker_names.get(i))
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .unwrap_or(label)
        .to_string()
}

/// Format a transcript for output.
pub fn format_transcript(export: &TranscriptExport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => format_json(export),
        OutputFormat::Srt => format_srt(export),
        OutputFormat::Vtt => format_vtt(export),
        OutputFormat::Markdown => format_markdown(export),
    }
}

fn format_json(export: &TranscriptExport) -> String {
    serde_json::to_string_pretty(export).unwrap_or_else(|_| "{}".to_string())
}

fn cue_text(paragraph: &ParagraphExport) -> String {
    match &paragraph.speaker {
        Some(speaker) => format!("{}: {}", speaker, paragraph.text),
        None => paragraph.text.clone(),
    }
}

/// Format as SRT (SubRip).
fn format_srt(export: &TranscriptExport) -> String {
    let mut output = String::new();

    for (i, paragraph) in export.paragraphs.iter().enumerate() {
        output.push_str(&format!("{}\n", i + 1));
        output.push_str(&format!(
            "{} --> {}\n",
            format_cue_timestamp(paragraph.start_seconds, ','),
            format_cue_timestamp(paragraph.end_seconds, ',')
        ));
        output.push_str(&cue_text(paragraph));
        output.push_str("\n\n");
    }

    output
}

/// Format as WebVTT, with speakers as voice spans.
fn format_vtt(export: &TranscriptExport) -> String {
    let mut output = String::from("WEBVTT\n\n");

    for (i, paragraph) in export.paragraphs.iter().enumerate() {
        output.push_str(&format!("{}\n", i + 1));
        output.push_str(&format!(
            "{} --> {}\n",
            format_cue_timestamp(paragraph.start_seconds, '.'),
            format_cue_timestamp(paragraph.end_seconds, '.')
        ));
        match &paragraph.speaker {
            Some(speaker) => output.push_str(&format!("<v {}>{}", speaker, paragraph.text)),
            None => output.push_str(&paragraph.text),
        }
        output.push_str("\n\n");
    }

    output
}

fn format_markdown(export: &TranscriptExport) -> String {
    let mut output = format!("# {}\n\n", export.title);

    if let Some(summary) = &export.summary {
        output.push_str("## Summary\n\n");
        output.push_str(summary.trim());
        output.push_str("\n\n");
    }

    if !export.chapters.is_empty() {
        output.push_str("## Chapters\n\n");
        for chapter in &export.chapters {
            output.push_str(&format!(
                "- [{}] {}\n",
                format_timestamp(chapter.timestamp),
                chapter.title
            ));
        }
        output.push('\n');
    }

    output.push_str("## Transcript\n\n");
    for paragraph in &export.paragraphs {
        let ts = format_timestamp(paragraph.start_seconds);
        match &paragraph.speaker {
            Some(speaker) => output.push_str(&format!("**{}** [{}]: {}\n\n", speaker, ts, paragraph.text)),
            None => output.push_str(&format!("[{}] {}\n\n", ts, paragraph.text)),
        }
    }

    output
}

/// `00:00:00,000` (SRT) or `00:00:00.000` (VTT).
fn format_cue_timestamp(seconds: f64, separator: char) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) / 1000;
    let ms = total_ms % 1000;

    format!("{:02}:{:02}:{:02}{}{:03}", hours, minutes, secs, separator, ms)
}
