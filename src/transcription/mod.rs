//! Transcription module for Podtekst.
//!
//! Every recognition backend normalizes its own output format into an ordered
//! sequence of [`Segment`]s.
//!
//! # Backends
//!
//! - **Whisper** (default): fast Whisper on a hosted prediction API, chunk timestamps.
//! - **Canary-Qwen**: returns text with inline `[M:SS - M:SS]` markers.
//! - **WhisperX**: diarized segments with a speaker label each.
//! - **OpenAI**: the OpenAI transcription endpoint in verbose JSON mode.

mod canary;
mod format;
mod models;
mod openai_whisper;
mod replicate;
mod whisper;
mod whisperx;

pub use canary::CanaryQwenTranscriber;
pub use format::{display_name, format_transcript, OutputFormat, ParagraphExport, TranscriptExport};
pub use models::{
    format_timestamp, has_speakers, parse_clock_timestamp, speaker_count, speaker_index, speaker_label,
    Chapter, Paragraph, Segment, MAX_SPEAKERS,
};
pub use openai_whisper::OpenAiTranscriber;
pub use replicate::ReplicateClient;
pub use whisper::WhisperTranscriber;
pub use whisperx::WhisperXTranscriber;

use crate::config::Settings;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Options passed through to the recognition backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscribeOptions {
    /// Diarization hint; ignored by backends without speaker support.
    pub min_speakers: Option<u32>,
}

/// Trait for speech recognition backends.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe the audio at `audio_url` into ordered segments.
    async fn transcribe(&self, audio_url: &str, options: &TranscribeOptions)
        -> Result<Vec<Segment>>;

    /// Which backend this is.
    fn backend(&self) -> AsrBackend;
}

/// Recognition backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AsrBackend {
    #[default]
    #[serde(rename = "whisper")]
    Whisper,
    #[serde(rename = "canary-qwen")]
    CanaryQwen,
    #[serde(rename = "whisperx")]
    WhisperX,
    #[serde(rename = "openai")]
    OpenAi,
}

impl AsrBackend {
    /// Whether the backend produces speaker labels.
    pub fn supports_diarization(self) -> bool {
        matches!(self, AsrBackend::WhisperX)
    }
}

impl std::str::FromStr for AsrBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "whisper" => Ok(AsrBackend::Whisper),
            "canary-qwen" | "canary" => Ok(AsrBackend::CanaryQwen),
            "whisperx" => Ok(AsrBackend::WhisperX),
            "openai" => Ok(AsrBackend::OpenAi),
            _ => Err(format!(
                "Unknown recognition backend: {}. Use whisper, canary-qwen, whisperx, or openai.",
                s
            )),
        }
    }
}

impl std::fmt::Display for AsrBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AsrBackend::Whisper => write!(f, "whisper"),
            AsrBackend::CanaryQwen => write!(f, "canary-qwen"),
            AsrBackend::WhisperX => write!(f, "whisperx"),
            AsrBackend::OpenAi => write!(f, "openai"),
        }
    }
}

/// Create a transcriber for the given backend.
pub fn create_transcriber(backend: AsrBackend, settings: &Settings) -> Result<Arc<dyn Transcriber>> {
    let transcriber: Arc<dyn Transcriber> = match backend {
        AsrBackend::Whisper => Arc::new(WhisperTranscriber::new(Arc::new(
            ReplicateClient::from_settings(&settings.replicate)?,
        ))),
        AsrBackend::CanaryQwen => Arc::new(CanaryQwenTranscriber::new(Arc::new(
            ReplicateClient::from_settings(&settings.replicate)?,
        ))?),
        AsrBackend::WhisperX => Arc::new(WhisperXTranscriber::new(
            Arc::new(ReplicateClient::from_settings(&settings.replicate)?),
            &settings.transcription.language,
            std::env::var("HUGGINGFACE_API_KEY").ok(),
        )),
        AsrBackend::OpenAi => Arc::new(OpenAiTranscriber::with_config(
            &settings.transcription.openai_model,
            &settings.transcription.language,
        )?),
    };
    Ok(transcriber)
}

/// Unstructured backend output as one zero-duration segment.
///
/// Strings are kept verbatim; anything else is JSON-encoded.
pub(crate) fn raw_output_segment(output: &serde_json::Value) -> Segment {
    match output {
        serde_json::Value::String(s) => Segment::raw(s.trim()),
        other => Segment::raw(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backend() {
        assert_eq!("whisper".parse::<AsrBackend>().unwrap(), AsrBackend::Whisper);
        assert_eq!("canary-qwen".parse::<AsrBackend>().unwrap(), AsrBackend::CanaryQwen);
        assert_eq!("WhisperX".parse::<AsrBackend>().unwrap(), AsrBackend::WhisperX);
        assert_eq!("openai".parse::<AsrBackend>().unwrap(), AsrBackend::OpenAi);
        assert!("deepgram".parse::<AsrBackend>().is_err());
    }

    #[test]
    fn test_backend_display_round_trips_through_serde() {
        for backend in [
            AsrBackend::Whisper,
            AsrBackend::CanaryQwen,
            AsrBackend::WhisperX,
            AsrBackend::OpenAi,
        ] {
            let json = serde_json::to_string(&backend).unwrap();
            assert_eq!(json, format!("\"{}\"", backend));
        }
    }

    #[test]
    fn test_raw_output_segment() {
        let seg = raw_output_segment(&serde_json::json!("  plain text "));
        assert_eq!(seg, Segment::raw("plain text"));

        let seg = raw_output_segment(&serde_json::json!({"unexpected": true}));
        assert_eq!(seg.text, r#"{"unexpected":true}"#);
        assert_eq!(seg.start, 0.0);
        assert_eq!(seg.end, 0.0);
    }

    #[test]
    fn test_only_whisperx_diarizes() {
        assert!(AsrBackend::WhisperX.supports_diarization());
        assert!(!AsrBackend::Whisper.supports_diarization());
        assert!(!AsrBackend::OpenAi.supports_diarization());
    }
}
