//! Partitioning of recognized segments into bounded-duration chunks.
//!
//! A chunk is the unit of refinement work: each one is cleaned up by a single
//! completion call, and chunks are refined concurrently.

mod temporal;

pub use temporal::TemporalChunker;

use crate::transcription::{has_speakers, Segment};
use serde::{Deserialize, Serialize};

/// A contiguous run of segments from the episode transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Position of this chunk in the episode.
    pub index: usize,
    /// Segments in source order.
    pub segments: Vec<Segment>,
}

impl Chunk {
    pub fn new(index: usize, segments: Vec<Segment>) -> Self {
        Self { index, segments }
    }

    /// Start of the first segment, or 0 for an empty chunk.
    pub fn start(&self) -> f64 {
        self.segments.first().map(|s| s.start).unwrap_or(0.0)
    }

    /// End of the last segment, or 0 for an empty chunk.
    pub fn end(&self) -> f64 {
        self.segments.last().map(|s| s.end).unwrap_or(0.0)
    }

    /// Span covered by this chunk, in seconds.
    pub fn duration(&self) -> f64 {
        self.end() - self.start()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Whether any segment carries a speaker label.
    pub fn has_speakers(&self) -> bool {
        has_speakers(&self.segments)
    }

    /// Segment texts joined by single spaces.
    pub fn joined_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}
