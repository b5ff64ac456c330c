//! Configuration settings for Podtekst.

use crate::transcription::AsrBackend;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub transcription: TranscriptionSettings,
    pub replicate: ReplicateSettings,
    pub audio: AudioSettings,
    pub refinement: RefinementSettings,
    pub store: StoreSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.podtekst".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

/// Speech recognition settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionSettings {
    /// Recognition backend (whisper, canary-qwen, whisperx, openai).
    pub backend: AsrBackend,
    /// Language hint for backends that accept one.
    pub language: String,
    /// Default minimum speaker count passed to diarizing backends.
    pub min_speakers: Option<u32>,
    /// Model used by the OpenAI backend.
    pub openai_model: String,
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            backend: AsrBackend::Whisper,
            language: "en".to_string(),
            min_speakers: None,
            openai_model: "whisper-1".to_string(),
        }
    }
}

/// Hosted prediction API settings (used by the whisper, canary-qwen and whisperx backends).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicateSettings {
    /// API base URL.
    pub api_base: String,
    /// Delay between prediction status polls, in milliseconds.
    pub poll_interval_ms: u64,
    /// Give up on a prediction after this many seconds.
    pub timeout_seconds: u64,
}

impl Default for ReplicateSettings {
    fn default() -> Self {
        Self {
            api_base: "https://api.replicate.com/v1".to_string(),
            poll_interval_ms: 2000,
            timeout_seconds: 3600,
        }
    }
}

/// Audio source resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// URL prefixes for internal storage; these skip source validation.
    pub trusted_prefixes: Vec<String>,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            trusted_prefixes: vec!["storage://".to_string()],
        }
    }
}

/// Provider used for refinement and summary calls.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompletionProvider {
    /// OpenAI chat completions (default).
    #[default]
    OpenAi,
    /// Anthropic Messages API.
    Anthropic,
}

impl std::str::FromStr for CompletionProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(CompletionProvider::OpenAi),
            "anthropic" | "claude" => Ok(CompletionProvider::Anthropic),
            _ => Err(format!("Unknown completion provider: {}", s)),
        }
    }
}

impl std::fmt::Display for CompletionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompletionProvider::OpenAi => write!(f, "openai"),
            CompletionProvider::Anthropic => write!(f, "anthropic"),
        }
    }
}

/// Transcript refinement and summary settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementSettings {
    /// Completion provider (openai, anthropic).
    pub provider: CompletionProvider,
    /// Model used for chunk cleanup and the summary call.
    pub model: String,
    /// Maximum span of one refinement chunk, in seconds.
    pub chunk_duration_seconds: f64,
    /// Number of chunks refined concurrently per batch.
    pub max_concurrent_chunks: usize,
    /// Output token budget for one chunk.
    pub chunk_max_tokens: u32,
    /// Output token budget for the summary call.
    pub summary_max_tokens: u32,
    /// Request timeout for completion calls, in seconds.
    pub request_timeout_seconds: u64,
}

impl Default for RefinementSettings {
    fn default() -> Self {
        Self {
            provider: CompletionProvider::OpenAi,
            model: "gpt-4.1".to_string(),
            chunk_duration_seconds: 240.0,
            max_concurrent_chunks: 4,
            chunk_max_tokens: 8192,
            summary_max_tokens: 2048,
            request_timeout_seconds: 300,
        }
    }
}

/// Episode store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Path to the SQLite database.
    pub sqlite_path: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            sqlite_path: "~/.podtekst/episodes.db".to_string(),
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            settings.validate()?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::PodtekstError;

        if self.refinement.max_concurrent_chunks == 0 {
            return Err(PodtekstError::Config(
                "refinement.max_concurrent_chunks must be at least 1".to_string(),
            ));
        }
        if !(self.refinement.chunk_duration_seconds > 0.0) {
            return Err(PodtekstError::Config(
                "refinement.chunk_duration_seconds must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::PodtekstError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("podtekst")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded SQLite database path.
    pub fn sqlite_path(&self) -> PathBuf {
        Self::expand_path(&self.store.sqlite_path)
    }
}
