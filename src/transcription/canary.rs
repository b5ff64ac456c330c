//! Canary-Qwen backend: plain text with inline `[start - end]` timestamp markers.

use super::{
    parse_clock_timestamp, raw_output_segment, AsrBackend, ReplicateClient, Segment,
    TranscribeOptions, Transcriber,
};
use crate::error::{PodtekstError, Result};
use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, instrument};

const CANARY_VERSION: &str =
    "nvidia/canary-qwen-2.5b:afba731fc7a4082730943a246233b09c7fa3dfb2c24b07fe199c1408a7c8cb2f";

const MARKER_PATTERN: &str = r"\[(\d+:\d{2}(?::\d{2})?) - (\d+:\d{2}(?::\d{2})?)\]";

/// Canary-Qwen transcriber running on the hosted prediction API.
pub struct CanaryQwenTranscriber {
    client: Arc<ReplicateClient>,
    marker: Regex,
}

impl CanaryQwenTranscriber {
    pub fn new(client: Arc<ReplicateClient>) -> Result<Self> {
        let marker = Regex::new(MARKER_PATTERN)
            .map_err(|e| PodtekstError::Config(format!("Invalid timestamp pattern: {}", e)))?;
        Ok(Self { client, marker })
    }

    /// Tokenize text on timestamp markers.
    ///
    /// Each marker opens a segment whose body runs to the next marker. Markers
    /// with an empty body are skipped. Text with no usable markers becomes a
    /// single zero-duration segment.
    pub fn parse_timestamped_text(&self, text: &str) -> Vec<Segment> {
        let markers: Vec<_> = self.marker.captures_iter(text).collect();
        let mut segments = Vec::with_capacity(markers.len());

        for (i, caps) in markers.iter().enumerate() {
            let (Some(whole), Some(start), Some(end)) = (caps.get(0), caps.get(1), caps.get(2))
            else {
                continue;
            };

            let body_end = markers
                .get(i + 1)
                .and_then(|next| next.get(0))
                .map(|m| m.start())
                .unwrap_or(text.len());
            let body = text[whole.end()..body_end].trim();
            if body.is_empty() {
                continue;
            }

            if let (Some(start), Some(end)) = (
                parse_clock_timestamp(start.as_str()),
                parse_clock_timestamp(end.as_str()),
            ) {
                segments.push(Segment::new(start, end.max(start), body));
            }
        }

        if segments.is_empty() && !text.trim().is_empty() {
            return vec![Segment::raw(text.trim())];
        }

        segments
    }

    fn parse_output(&self, output: &Value) -> Vec<Segment> {
        match output {
            Value::String(text) => self.parse_timestamped_text(text),
            // Streamed output arrives as a list of text pieces.
            Value::Array(parts) if parts.iter().all(Value::is_string) => {
                let text: String = parts.iter().filter_map(Value::as_str).collect();
                self.parse_timestamped_text(&text)
            }
            other => vec![raw_output_segment(other)],
        }
    }
}

#[async_trait]
impl Transcriber for CanaryQwenTranscriber {
    #[instrument(skip(self, _options))]
    async fn transcribe(&self, audio_url: &str, _options: &TranscribeOptions) -> Result<Vec<Segment>> {
        let output = self
            .client
            .run(
                CANARY_VERSION,
                json!({
                    "audio": audio_url,
                    "include_timestamps": true,
                }),
            )
            .await?;

        let segments = self.parse_output(&output);
        debug!("Canary-Qwen returned {} segments", segments.len());
        Ok(segments)
    }

    fn backend(&self) -> AsrBackend {
        AsrBackend::CanaryQwen
    }
}
