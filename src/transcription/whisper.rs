//! Fast Whisper backend with chunk-level timestamps.

use super::{raw_output_segment, AsrBackend, ReplicateClient, Segment, TranscribeOptions, Transcriber};
use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

const WHISPER_VERSION: &str =
    "vaibhavs10/incredibly-fast-whisper:3ab86df6c8f54c11309d4d1f930ac292bad43ace52d10c80d87eb258b3c9f79c";

/// Whisper transcriber running on the hosted prediction API.
pub struct WhisperTranscriber {
    client: Arc<ReplicateClient>,
}

#[derive(Debug, Deserialize)]
struct WhisperOutput {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    chunks: Option<Vec<WhisperChunk>>,
}

#[derive(Debug, Deserialize)]
struct WhisperChunk {
    text: String,
    /// The final chunk may come back with an open end.
    timestamp: (f64, Option<f64>),
}

impl WhisperTranscriber {
    pub fn new(client: Arc<ReplicateClient>) -> Self {
        Self { client }
    }

    /// Map Whisper output into segments.
    pub fn parse_output(output: &Value) -> Vec<Segment> {
        let parsed: WhisperOutput = match serde_json::from_value(output.clone()) {
            Ok(p) => p,
            Err(e) => {
                warn!("Unrecognized Whisper output ({}), keeping raw body", e);
                return vec![raw_output_segment(output)];
            }
        };

        if let Some(chunks) = parsed.chunks {
            return chunks
                .into_iter()
                .map(|chunk| {
                    let (start, end) = chunk.timestamp;
                    Segment::new(start, end.unwrap_or(start).max(start), chunk.text.trim())
                })
                .collect();
        }

        if let Some(text) = parsed.text {
            return vec![Segment::raw(text.trim())];
        }

        vec![raw_output_segment(output)]
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    #[instrument(skip(self, _options))]
    async fn transcribe(&self, audio_url: &str, _options: &TranscribeOptions) -> Result<Vec<Segment>> {
        let output = self
            .client
            .run(
                WHISPER_VERSION,
                json!({
                    "audio": audio_url,
                    "task": "transcribe",
                    "batch_size": 24,
                    "return_timestamps": true,
                }),
            )
            .await?;

        let segments = Self::parse_output(&output);
        debug!("Whisper returned {} segments", segments.len());
        Ok(segments)
    }

    fn backend(&self) -> AsrBackend {
        AsrBackend::Whisper
    }
}
