//! Podtekst - podcast transcript refinement
//!
//! Turns long, noisy speech recognition output into readable paragraphs,
//! with a summary, chapter markers and resolved speaker names.
//!
//! # Overview
//!
//! A pipeline run takes one episode through:
//! - resolving its audio reference to a playable URL
//! - speech recognition with one of several backends
//! - time-bounded chunking of the raw segments
//! - concurrent per-chunk refinement, merged back in source order
//! - a single summary call producing summary, chapters and speaker names
//!
//! Progress is persisted after every batch, so a client polling the
//! episode sees paragraphs appear while the run is still going.
//!
//! # Architecture
//!
//! - `config` - Settings and prompt templates
//! - `audio_source` - Audio reference resolution
//! - `transcription` - Recognition backends and transcript types
//! - `chunking` - Temporal chunking
//! - `llm` - Completion backends for refinement and summary calls
//! - `refinement` - Refinement worker, batch scheduler, summary stage
//! - `episode` - Episode state machine and persistence
//! - `orchestrator` - Pipeline coordination
//!
//! # Example
//!
//! ```rust,no_run
//! use podtekst::config::Settings;
//! use podtekst::episode::NewEpisode;
//! use podtekst::orchestrator::{Orchestrator, ProcessOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::new(settings)?;
//!
//!     let id = orchestrator
//!         .store()
//!         .create_episode(NewEpisode::new("Pilot", "https://cdn.example/pilot.mp3"))
//!         .await?;
//!     let report = orchestrator.process_episode(&id, ProcessOptions::default()).await?;
//!     println!("{:?}", report.outcome);
//!
//!     Ok(())
//! }
//! ```

pub mod audio_source;
pub mod chunking;
pub mod cli;
pub mod config;
pub mod episode;
pub mod error;
pub mod llm;
pub mod openai;
pub mod orchestrator;
pub mod refinement;
pub mod transcription;

#[cfg(test)]
mod testing;

pub use error::{PodtekstError, Result};
