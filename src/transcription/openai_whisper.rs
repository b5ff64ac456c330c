//! OpenAI transcription endpoint backend.

use super::{AsrBackend, Segment, TranscribeOptions, Transcriber};
use crate::error::{PodtekstError, Result};
use crate::openai::create_client;
use async_openai::types::{AudioInput, AudioResponseFormat, CreateTranscriptionRequestArgs};
use async_trait::async_trait;
use tracing::{debug, instrument};

/// Transcriber backed by the OpenAI audio API.
///
/// The endpoint takes file bytes rather than a URL, so the audio is
/// downloaded first. No diarization; `min_speakers` is ignored.
pub struct OpenAiTranscriber {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    http: reqwest::Client,
    model: String,
    language: String,
}

impl OpenAiTranscriber {
    /// Create a transcriber with the default model.
    pub fn new() -> Result<Self> {
        Self::with_config("whisper-1", "en")
    }

    pub fn with_config(model: &str, language: &str) -> Result<Self> {
        Ok(Self {
            client: create_client()?,
            http: reqwest::Client::new(),
            model: model.to_string(),
            language: language.to_string(),
        })
    }

    async fn download(&self, audio_url: &str) -> Result<Vec<u8>> {
        let bytes = self
            .http
            .get(audio_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| PodtekstError::Recognition(format!("Failed to download audio: {}", e)))?
            .bytes()
            .await
            .map_err(|e| PodtekstError::Recognition(format!("Failed to read audio: {}", e)))?;
        Ok(bytes.to_vec())
    }
}

/// File name sent with the upload; the API infers the container from it.
fn upload_file_name(audio_url: &str) -> String {
    url::Url::parse(audio_url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segs| segs.next_back().map(str::to_string))
        })
        .filter(|name| name.contains('.'))
        .unwrap_or_else(|| "audio.mp3".to_string())
}

#[async_trait]
impl Transcriber for OpenAiTranscriber {
    #[instrument(skip(self, _options))]
    async fn transcribe(&self, audio_url: &str, _options: &TranscribeOptions) -> Result<Vec<Segment>> {
        let file_bytes = self.download(audio_url).await?;
        debug!("Downloaded {} bytes", file_bytes.len());

        let request = CreateTranscriptionRequestArgs::default()
            .file(AudioInput::from_vec_u8(upload_file_name(audio_url), file_bytes))
            .model(&self.model)
            .language(&self.language)
            .response_format(AudioResponseFormat::VerboseJson)
            .build()
            .map_err(|e| PodtekstError::Recognition(format!("Failed to build request: {}", e)))?;

        let response = self
            .client
            .audio()
            .transcribe_verbose_json(request)
            .await
            .map_err(|e| PodtekstError::Recognition(format!("OpenAI transcription error: {}", e)))?;

        let segments: Vec<Segment> = match response.segments {
            Some(segs) if !segs.is_empty() => segs
                .iter()
                .map(|s| {
                    let start = s.start as f64;
                    Segment::new(start, (s.end as f64).max(start), s.text.trim())
                })
                .collect(),
            _ => vec![Segment::raw(response.text.trim())],
        };

        debug!("OpenAI returned {} segments", segments.len());
        Ok(segments)
    }

    fn backend(&self) -> AsrBackend {
        AsrBackend::OpenAi
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_file_name() {
        assert_eq!(upload_file_name("https://cdn.example/shows/ep12.m4a?x=1"), "ep12.m4a");
        assert_eq!(upload_file_name("https://cdn.example/stream"), "audio.mp3");
        assert_eq!(upload_file_name("not a url"), "audio.mp3");
    }
}
