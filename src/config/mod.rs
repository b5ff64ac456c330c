//! Configuration module for Podtekst.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{Prompts, RefinePrompts, SummaryPrompts};
pub use settings::{
    AudioSettings, CompletionProvider, GeneralSettings, PromptSettings, RefinementSettings,
    ReplicateSettings, Settings, StoreSettings, TranscriptionSettings,
};
