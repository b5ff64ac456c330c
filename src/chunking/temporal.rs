//! Time-based chunking implementation.

use super::Chunk;
use crate::transcription::Segment;
use tracing::debug;

/// Default chunk span threshold, in seconds.
pub const DEFAULT_CHUNK_DURATION: f64 = 240.0;

/// Time-based chunker.
///
/// A new chunk opens at the first segment whose start lies more than
/// `max_duration` seconds after the current chunk's start. Segments are
/// never split, so a single long segment may exceed the threshold.
#[derive(Debug, Clone, Copy)]
pub struct TemporalChunker {
    max_duration: f64,
}

impl TemporalChunker {
    pub fn new(max_duration: f64) -> Self {
        Self { max_duration }
    }

    /// Split segments into ordered chunks.
    ///
    /// Empty input yields a single empty chunk.
    pub fn chunk(&self, segments: &[Segment]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut current: Vec<Segment> = Vec::new();
        let mut chunk_start = segments.first().map(|s| s.start).unwrap_or(0.0);

        for segment in segments {
            if segment.start - chunk_start > self.max_duration && !current.is_empty() {
                chunks.push(Chunk::new(chunks.len(), std::mem::take(&mut current)));
                chunk_start = segment.start;
            }
            current.push(segment.clone());
        }

        // Always emit the tail, even when empty
        chunks.push(Chunk::new(chunks.len(), current));

        debug!(
            "Split {} segments into {} chunks ({}s threshold)",
            segments.len(),
            chunks.len(),
            self.max_duration
        );
        chunks
    }
}

impl Default for TemporalChunker {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_DURATION)
    }
}
