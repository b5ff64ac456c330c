//! Error types for Podtekst.

use thiserror::Error;

/// Library-level error type for Podtekst operations.
#[derive(Error, Debug)]
pub enum PodtekstError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid audio source: {0}")]
    InvalidSource(String),

    #[error("Transcription failed: {0}")]
    Recognition(String),

    #[error("Transcript refinement failed: {0}")]
    Refinement(String),

    #[error("Summary generation failed: {0}")]
    Summary(String),

    #[error("Pipeline failed: {0}")]
    Pipeline(String),

    #[error("Episode store error: {0}")]
    Store(String),

    #[error("Episode not found: {0}")]
    EpisodeNotFound(String),

    #[error("Episode {0} is already being processed")]
    RunInProgress(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("Completion API error: {0}")]
    Completion(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Result type alias for Podtekst operations.
pub type Result<T> = std::result::Result<T, PodtekstError>;
