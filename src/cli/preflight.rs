//! Pre-flight checks before expensive operations.
//!
//! Validates that the API keys a run needs are set before any status is
//! written, so a missing token doesn't leave an episode in `error`.

use crate::config::{CompletionProvider, Settings};
use crate::error::{PodtekstError, Result};
use crate::transcription::AsrBackend;

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Full run: recognition plus refinement.
    Process(AsrBackend),
    /// Refinement only.
    Reprocess,
}

/// Environment variables an operation needs.
pub fn required_env_vars(operation: Operation, provider: CompletionProvider) -> Vec<&'static str> {
    let mut vars = Vec::new();

    if let Operation::Process(backend) = operation {
        match backend {
            AsrBackend::OpenAi => vars.push("OPENAI_API_KEY"),
            _ => vars.push("REPLICATE_API_TOKEN"),
        }
    }

    let completion_key = match provider {
        CompletionProvider::OpenAi => "OPENAI_API_KEY",
        CompletionProvider::Anthropic => "ANTHROPIC_API_KEY",
    };
    if !vars.contains(&completion_key) {
        vars.push(completion_key);
    }

    vars
}

/// Run pre-flight checks for the given operation.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    let missing: Vec<&str> = required_env_vars(operation, settings.refinement.provider)
        .into_iter()
        .filter(|var| !is_set(var))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(PodtekstError::Config(format!(
            "{} not set. Export {} before running.",
            missing.join(", "),
            if missing.len() == 1 { "it" } else { "them" }
        )))
    }
}

fn is_set(var: &str) -> bool {
    std::env::var(var).is_ok_and(|value| !value.trim().is_empty())
}
