//! Completion backends for transcript refinement and summaries.
//!
//! Both stages make one request, read back text, and need to know whether the
//! model finished normally. [`StopReason`] carries that distinction so callers
//! can tell a truncated answer apart from a failed call.

mod anthropic;
mod openai;

pub use anthropic::AnthropicBackend;
pub use openai::OpenAiBackend;

use crate::config::{CompletionProvider, RefinementSettings};
use crate::error::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// A single completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// Optional system instructions.
    pub system: Option<String>,
    /// The user prompt.
    pub prompt: String,
    /// Output token budget.
    pub max_tokens: u32,
    /// Ask the provider for a bare JSON object when it supports that.
    pub json: bool,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            max_tokens,
            json: false,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn json(mut self) -> Self {
        self.json = true;
        self
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Natural end of the answer.
    EndTurn,
    /// Output token budget exhausted.
    MaxTokens,
    /// Anything else the provider reports (content filter, tool call, ...).
    Other(String),
}

impl StopReason {
    pub fn is_complete(&self) -> bool {
        matches!(self, StopReason::EndTurn)
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::EndTurn => write!(f, "end_turn"),
            StopReason::MaxTokens => write!(f, "max_tokens"),
            StopReason::Other(reason) => write!(f, "{}", reason),
        }
    }
}

/// Token accounting for one or more calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}

/// A structurally successful completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub stop: StopReason,
    pub usage: TokenUsage,
}

/// Trait for text completion providers.
///
/// `Err` means the call itself failed (network, auth, timeout). A response
/// that arrived but stopped early is `Ok` with a non-`EndTurn` stop reason.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;

    /// Provider name for logs.
    fn name(&self) -> &'static str;

    /// Model in use.
    fn model(&self) -> &str;
}

/// Create a completion backend from settings.
pub fn create_backend(settings: &RefinementSettings) -> Result<Arc<dyn CompletionBackend>> {
    let timeout = Duration::from_secs(settings.request_timeout_seconds);
    let backend: Arc<dyn CompletionBackend> = match settings.provider {
        CompletionProvider::OpenAi => Arc::new(OpenAiBackend::new(&settings.model, timeout)?),
        CompletionProvider::Anthropic => Arc::new(AnthropicBackend::from_env(&settings.model, timeout)?),
    };
    Ok(backend)
}

/// Parse a JSON object out of model output.
///
/// Tolerates markdown fences and prose around the object.
pub fn parse_json_response<T: DeserializeOwned>(response: &str) -> serde_json::Result<T> {
    let trimmed = response.trim();
    match serde_json::from_str(trimmed) {
        Ok(value) => Ok(value),
        Err(e) => match (trimmed.find('{'), trimmed.rfind('}')) {
            (Some(start), Some(end)) if end > start => serde_json::from_str(&trimmed[start..=end]),
            _ => Err(e),
        },
    }
}
