//! Scripted collaborators for pipeline tests.

use crate::audio_source::AudioResolver;
use crate::error::{PodtekstError, Result};
use crate::llm::{Completion, CompletionBackend, CompletionRequest, StopReason, TokenUsage};
use crate::refinement::{ProgressSink, SummaryOutcome};
use crate::transcription::{AsrBackend, Paragraph, Segment, TranscribeOptions, Transcriber};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Transcriber returning canned segments.
pub struct MockTranscriber {
    segments: Vec<Segment>,
    failure: Option<String>,
    delay: Duration,
    backend: AsrBackend,
    calls: AtomicUsize,
    options: Mutex<Vec<TranscribeOptions>>,
}

impl MockTranscriber {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self {
            segments,
            failure: None,
            delay: Duration::ZERO,
            backend: AsrBackend::WhisperX,
            calls: AtomicUsize::new(0),
            options: Mutex::new(Vec::new()),
        }
    }

    pub fn with_failure(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_backend(mut self, backend: AsrBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn options(&self) -> Vec<TranscribeOptions> {
        self.options.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, _audio_url: &str, options: &TranscribeOptions) -> Result<Vec<Segment>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.options.lock().unwrap().push(options.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.failure {
            Some(message) => Err(PodtekstError::Recognition(message.clone())),
            None => Ok(self.segments.clone()),
        }
    }

    fn backend(&self) -> AsrBackend {
        self.backend
    }
}

/// Resolver that accepts everything, or rejects everything.
pub struct MockResolver {
    reject: bool,
}

impl MockResolver {
    pub fn accepting() -> Self {
        Self { reject: false }
    }

    pub fn rejecting() -> Self {
        Self { reject: true }
    }
}

#[async_trait]
impl AudioResolver for MockResolver {
    async fn resolve(&self, uri: &str) -> Result<String> {
        if self.reject {
            Err(PodtekstError::InvalidSource(format!("{} is not audio", uri)))
        } else {
            Ok(uri.to_string())
        }
    }
}

#[derive(Clone)]
enum Scripted {
    Reply(Completion),
    Fail(String),
}

struct Rule {
    needle: String,
    delay: Duration,
    action: Scripted,
}

/// Completion backend answering by prompt content.
///
/// The first rule whose needle occurs in the prompt wins; otherwise the
/// default answer is used. Per-rule delays let tests force completion order.
pub struct ScriptedBackend {
    default: Scripted,
    rules: Vec<Rule>,
    prompts: Mutex<Vec<String>>,
    completed: Mutex<Vec<String>>,
}

pub fn end_turn(text: &str) -> Completion {
    Completion {
        text: text.to_string(),
        stop: StopReason::EndTurn,
        usage: TokenUsage::new(100, 10),
    }
}

impl ScriptedBackend {
    pub fn new(default: Completion) -> Self {
        Self {
            default: Scripted::Reply(default),
            rules: Vec::new(),
            prompts: Mutex::new(Vec::new()),
            completed: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(text: &str) -> Self {
        Self::new(end_turn(text))
    }

    pub fn failing(message: &str) -> Self {
        let mut backend = Self::replying("");
        backend.default = Scripted::Fail(message.to_string());
        backend
    }

    pub fn on(mut self, needle: &str, delay: Duration, text: &str) -> Self {
        self.rules.push(Rule {
            needle: needle.to_string(),
            delay,
            action: Scripted::Reply(end_turn(text)),
        });
        self
    }

    pub fn truncate_on(mut self, needle: &str) -> Self {
        self.rules.push(Rule {
            needle: needle.to_string(),
            delay: Duration::ZERO,
            action: Scripted::Reply(Completion {
                text: "{\"paragraphs\": [".to_string(),
                stop: StopReason::MaxTokens,
                usage: TokenUsage::new(100, 8192),
            }),
        });
        self
    }

    pub fn fail_on(mut self, needle: &str, message: &str) -> Self {
        self.rules.push(Rule {
            needle: needle.to_string(),
            delay: Duration::ZERO,
            action: Scripted::Fail(message.to_string()),
        });
        self
    }

    /// Every prompt received, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    /// Matched needles (or `<default>`) in completion order.
    pub fn completed(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        self.prompts.lock().unwrap().push(request.prompt.clone());

        let rule = self.rules.iter().find(|r| request.prompt.contains(&r.needle));
        let (label, delay, action) = match rule {
            Some(r) => (r.needle.clone(), r.delay, r.action.clone()),
            None => ("<default>".to_string(), Duration::ZERO, self.default.clone()),
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.completed.lock().unwrap().push(label);

        match action {
            Scripted::Reply(completion) => Ok(completion),
            Scripted::Fail(message) => Err(PodtekstError::Completion(message)),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }
}

/// Sink that records every notification.
#[derive(Default)]
pub struct RecordingSink {
    progress: Mutex<Vec<Vec<Paragraph>>>,
    completions: Mutex<Vec<SummaryOutcome>>,
}

impl RecordingSink {
    pub fn progress(&self) -> Vec<Vec<Paragraph>> {
        self.progress.lock().unwrap().clone()
    }

    pub fn completions(&self) -> Vec<SummaryOutcome> {
        self.completions.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn on_chunk_progress(&self, paragraphs: &[Paragraph]) -> Result<()> {
        self.progress.lock().unwrap().push(paragraphs.to_vec());
        Ok(())
    }

    async fn on_pipeline_complete(&self, outcome: &SummaryOutcome) -> Result<()> {
        self.completions.lock().unwrap().push(outcome.clone());
        Ok(())
    }
}
