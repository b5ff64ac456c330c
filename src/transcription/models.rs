//! Data models for transcription.

use serde::{Deserialize, Serialize};

/// A single timestamped unit of recognized speech.
///
/// Within one ordered sequence `start` is non-decreasing and `end >= start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Start time in seconds.
    pub start: f64,
    /// End time in seconds.
    pub end: f64,
    /// Recognized text.
    pub text: String,
    /// Raw speaker label from diarization (e.g. `SPEAKER_00`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

impl Segment {
    /// Create a new segment without a speaker label.
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            speaker: None,
        }
    }

    /// Attach a speaker label.
    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker = Some(speaker.into());
        self
    }

    /// Segment holding an unstructured backend result at time zero.
    pub fn raw(text: impl Into<String>) -> Self {
        Self::new(0.0, 0.0, text)
    }

    /// Duration of this segment in seconds.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// A cleaned, human-readable paragraph with its time span and optional speaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paragraph {
    /// Start time in seconds.
    pub start: f64,
    /// End time in seconds.
    pub end: f64,
    /// Cleaned text.
    pub text: String,
    /// Raw speaker label carried over from the source segments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

impl Paragraph {
    /// Create a new paragraph without a speaker label.
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            speaker: None,
        }
    }

    /// Attach a speaker label.
    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speaker = Some(speaker.into());
        self
    }
}

/// A chapter marker in the episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    /// Chapter title.
    pub title: String,
    /// Where the chapter begins, in seconds.
    pub timestamp: f64,
}

impl Chapter {
    pub fn new(title: impl Into<String>, timestamp: f64) -> Self {
        Self {
            title: title.into(),
            timestamp,
        }
    }
}

/// Whether any segment in the sequence carries a speaker label.
pub fn has_speakers(segments: &[Segment]) -> bool {
    segments.iter().any(|s| s.speaker.is_some())
}

/// Labels at or above this index are not treated as speakers.
pub const MAX_SPEAKERS: usize = 100;

/// Index encoded in a raw speaker label, e.g. `SPEAKER_03` -> 3.
pub fn speaker_index(label: &str) -> Option<usize> {
    label
        .strip_prefix("SPEAKER_")?
        .parse()
        .ok()
        .filter(|&i| i < MAX_SPEAKERS)
}

/// Highest speaker index among the labels, plus one.
pub fn speaker_count<'a>(labels: impl IntoIterator<Item = &'a str>) -> usize {
    labels
        .into_iter()
        .filter_map(speaker_index)
        .max()
        .map(|max| max + 1)
        .unwrap_or(0)
}

/// Raw speaker label for an index, e.g. 3 -> `SPEAKER_03`.
pub fn speaker_label(index: usize) -> String {
    format!("SPEAKER_{:02}", index)
}

/// Format seconds as M:SS, or H:MM:SS from one hour on.
pub fn format_timestamp(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "0:00".to_string();
    }
    let total_seconds = seconds as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

/// Parse an `H:MM:SS` or `M:SS` clock timestamp into seconds.
pub fn parse_clock_timestamp(ts: &str) -> Option<f64> {
    let parts: Vec<u64> = ts
        .trim()
        .split(':')
        .map(|p| p.parse().ok())
        .collect::<Option<Vec<_>>>()?;

    let (h, m, s) = match parts.as_slice() {
        [h, m, s] => (*h, *m, *s),
        [m, s] => (0, *m, *s),
        _ => return None,
    };
    let total = h
        .checked_mul(3600)?
        .checked_add(m.checked_mul(60)?)?
        .checked_add(s)?;
    Some(total as f64)
}
