//! WhisperX backend: aligned, diarized segments.

use super::{raw_output_segment, AsrBackend, ReplicateClient, Segment, TranscribeOptions, Transcriber};
use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

const WHISPERX_VERSION: &str =
    "victor-upmeet/whisperx:84d2ad2d6194fe98a17d2b60bef1c7f910c46b2f6fd38996ca457afd9c8abfcb";

/// WhisperX transcriber with speaker diarization.
pub struct WhisperXTranscriber {
    client: Arc<ReplicateClient>,
    language: String,
    hf_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WhisperXOutput {
    segments: Vec<WhisperXSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperXSegment {
    start: f64,
    end: f64,
    text: String,
    #[serde(default)]
    speaker: Option<String>,
}

impl WhisperXTranscriber {
    pub fn new(client: Arc<ReplicateClient>, language: &str, hf_token: Option<String>) -> Self {
        Self {
            client,
            language: language.to_string(),
            hf_token: hf_token.filter(|t| !t.is_empty()),
        }
    }

    /// Prediction input. `min_speakers` is only sent when given.
    fn build_input(&self, audio_url: &str, options: &TranscribeOptions) -> Value {
        let mut input = json!({
            "audio_file": audio_url,
            "language": self.language,
            "diarization": true,
            "align_output": true,
            "batch_size": 32,
            "huggingface_access_token": self.hf_token.clone().unwrap_or_default(),
        });

        if let (Some(min), Some(obj)) = (options.min_speakers, input.as_object_mut()) {
            obj.insert("min_speakers".to_string(), json!(min));
        }

        input
    }

    /// Map WhisperX output into labeled segments.
    pub fn parse_output(output: &Value) -> Vec<Segment> {
        match serde_json::from_value::<WhisperXOutput>(output.clone()) {
            Ok(parsed) => parsed
                .segments
                .into_iter()
                .map(|s| Segment {
                    start: s.start,
                    end: s.end.max(s.start),
                    text: s.text.trim().to_string(),
                    speaker: s.speaker.filter(|label| !label.is_empty()),
                })
                .collect(),
            Err(e) => {
                warn!("Unrecognized WhisperX output ({}), keeping raw body", e);
                vec![raw_output_segment(output)]
            }
        }
    }
}

#[async_trait]
impl Transcriber for WhisperXTranscriber {
    #[instrument(skip(self, options))]
    async fn transcribe(&self, audio_url: &str, options: &TranscribeOptions) -> Result<Vec<Segment>> {
        if self.hf_token.is_none() {
            warn!("HUGGINGFACE_API_KEY not set; diarization may fail");
        }

        let output = self
            .client
            .run(WHISPERX_VERSION, self.build_input(audio_url, options))
            .await?;

        let segments = Self::parse_output(&output);
        debug!("WhisperX returned {} segments", segments.len());
        Ok(segments)
    }

    fn backend(&self) -> AsrBackend {
        AsrBackend::WhisperX
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReplicateSettings;

    fn transcriber() -> WhisperXTranscriber {
        let client = ReplicateClient::new(&ReplicateSettings::default(), None).unwrap();
        WhisperXTranscriber::new(Arc::new(client), "en", Some("hf_test".to_string()))
    }

    #[test]
    fn test_parse_diarized_segments() {
        let output = json!({
            "detected_language": "en",
            "segments": [
                {"start": 0.0, "end": 3.2, "text": " Hi, I'm Ada.", "speaker": "SPEAKER_00"},
                {"start": 3.2, "end": 6.0, "text": " And I'm Grace.", "speaker": "SPEAKER_01"},
                {"start": 6.0, "end": 7.0, "text": " [music]"}
            ]
        });

        let segments = WhisperXTranscriber::parse_output(&output);
        assert_eq!(segments.len(), 3);
        assert_eq!(
            segments[0],
            Segment::new(0.0, 3.2, "Hi, I'm Ada.").with_speaker("SPEAKER_00")
        );
        assert_eq!(segments[1].speaker.as_deref(), Some("SPEAKER_01"));
        assert!(segments[2].speaker.is_none());
    }

    #[test]
    fn test_unparseable_output_keeps_body() {
        let segments = WhisperXTranscriber::parse_output(&json!("diarization crashed"));
        assert_eq!(segments, vec![Segment::raw("diarization crashed")]);
    }

    #[test]
    fn test_min_speakers_only_sent_when_given() {
        let t = transcriber();

        let input = t.build_input("https://cdn.example/ep.mp3", &TranscribeOptions::default());
        assert!(input.get("min_speakers").is_none());
        assert_eq!(input["audio_file"], "https://cdn.example/ep.mp3");
        assert_eq!(input["diarization"], true);
        assert_eq!(input["batch_size"], 32);

        let input = t.build_input(
            "https://cdn.example/ep.mp3",
            &TranscribeOptions {
                min_speakers: Some(3),
            },
        );
        assert_eq!(input["min_speakers"], 3);
    }
}
