//! Bounded-concurrency refinement with an order-preserving merge.

use super::{EpisodeContext, ProgressSink, Refiner};
use crate::chunking::Chunk;
use crate::error::{PodtekstError, Result};
use crate::llm::TokenUsage;
use crate::transcription::Paragraph;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{info, instrument};

/// Merged output of a full scheduling pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleOutcome {
    pub paragraphs: Vec<Paragraph>,
    pub usage: TokenUsage,
    /// Chunks that fell back to their original text.
    pub degraded_chunks: usize,
}

/// Runs a [`Refiner`] over chunks in sequential batches of `width`.
///
/// Results land in a slot per chunk index, so the merged order always
/// follows chunk order no matter which worker finishes first.
pub struct BatchScheduler {
    refiner: Arc<Refiner>,
    width: usize,
}

impl BatchScheduler {
    pub fn new(refiner: Arc<Refiner>, width: usize) -> Self {
        Self {
            refiner,
            width: width.max(1),
        }
    }

    /// Refine every chunk, notifying `sink` after each batch.
    ///
    /// The first failing chunk (by index) in a batch aborts the pass; batches
    /// already reported stay reported.
    #[instrument(skip_all, fields(chunks = chunks.len(), width = self.width))]
    pub async fn run(
        &self,
        chunks: &[Chunk],
        ctx: &EpisodeContext,
        sink: &dyn ProgressSink,
    ) -> Result<ScheduleOutcome> {
        let mut slots: Vec<Option<Vec<Paragraph>>> = vec![None; chunks.len()];
        let mut usage = TokenUsage::default();
        let mut degraded_chunks = 0;
        let batch_count = chunks.len().div_ceil(self.width);

        for (batch_idx, batch) in chunks.chunks(self.width).enumerate() {
            let batch_start = batch_idx * self.width;

            // Batch width bounds concurrency; join_all yields results in chunk order.
            let futs: Vec<_> = batch
                .iter()
                .map(|chunk| self.refiner.refine(chunk, ctx))
                .collect();
            let results = join_all(futs).await;

            for (offset, result) in results.into_iter().enumerate() {
                let idx = batch_start + offset;
                let refined = result?;
                usage += refined.usage;
                if refined.degraded {
                    degraded_chunks += 1;
                }
                let slot = slots.get_mut(idx).ok_or_else(|| {
                    PodtekstError::Pipeline(format!("chunk index {} out of range", idx))
                })?;
                *slot = Some(refined.paragraphs);
            }

            let batch_end = batch_start + batch.len();
            let merged = flatten(&slots[..batch_end]);
            info!(
                "Batch {}/{} done: {} chunks, {} paragraphs so far",
                batch_idx + 1,
                batch_count,
                batch_end,
                merged.len()
            );
            sink.on_chunk_progress(&merged).await?;
        }

        Ok(ScheduleOutcome {
            paragraphs: flatten(&slots),
            usage,
            degraded_chunks,
        })
    }
}

fn flatten(slots: &[Option<Vec<Paragraph>>]) -> Vec<Paragraph> {
    slots.iter().flatten().flatten().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::TemporalChunker;
    use crate::config::Prompts;
    use crate::testing::{RecordingSink, ScriptedBackend};
    use crate::transcription::Segment;
    use std::time::Duration;

    fn reply_for(n: usize) -> String {
        format!(
            r#"{{"paragraphs": [{{"start": {s}, "end": {e}, "text": "Paragraph {n}."}}]}}"#,
            s = n as f64 * 100.0,
            e = n as f64 * 100.0 + 10.0,
            n = n
        )
    }

    /// One segment per chunk, at 100s intervals with a 50s threshold.
    fn chunks(count: usize) -> Vec<Chunk> {
        let segments: Vec<Segment> = (0..count)
            .map(|i| Segment::new(i as f64 * 100.0, i as f64 * 100.0 + 10.0, format!("marker-{}.", i)))
            .collect();
        TemporalChunker::new(50.0).chunk(&segments)
    }

    fn scheduler(backend: ScriptedBackend, width: usize) -> (BatchScheduler, Arc<ScriptedBackend>) {
        let backend = Arc::new(backend);
        let refiner = Refiner::new(backend.clone(), Arc::new(Prompts::default()), 8192);
        (BatchScheduler::new(Arc::new(refiner), width), backend)
    }

    #[tokio::test]
    async fn test_reverse_completion_keeps_chunk_order() {
        // Chunk i takes (width - i) * 20ms, so later chunks finish first.
        let mut backend = ScriptedBackend::replying("{}");
        for i in 0..4 {
            backend = backend.on(
                &format!("marker-{}.", i),
                Duration::from_millis((4 - i as u64) * 20),
                &reply_for(i),
            );
        }
        let (scheduler, backend) = scheduler(backend, 4);
        let sink = RecordingSink::default();

        let outcome = scheduler
            .run(&chunks(4), &EpisodeContext::default(), &sink)
            .await
            .unwrap();

        let texts: Vec<_> = outcome.paragraphs.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["Paragraph 0.", "Paragraph 1.", "Paragraph 2.", "Paragraph 3."]);
        assert_eq!(backend.calls(), 4);

        // Completion order really was reversed
        let completed = backend.completed();
        assert_eq!(completed.first().map(String::as_str), Some("marker-3."));
    }

    #[tokio::test]
    async fn test_progress_after_each_batch() {
        let mut backend = ScriptedBackend::replying("{}");
        for i in 0..5 {
            backend = backend.on(&format!("marker-{}.", i), Duration::ZERO, &reply_for(i));
        }
        let (scheduler, _) = scheduler(backend, 2);
        let sink = RecordingSink::default();

        scheduler
            .run(&chunks(5), &EpisodeContext::default(), &sink)
            .await
            .unwrap();

        let progress = sink.progress();
        assert_eq!(progress.iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 4, 5]);
        assert_eq!(progress[2][4].text, "Paragraph 4.");
    }

    #[tokio::test]
    async fn test_failure_aborts_after_earlier_batches_reported() {
        let backend = ScriptedBackend::replying(&reply_for(0))
            .fail_on("marker-3.", "upstream 502");
        let (scheduler, _) = scheduler(backend, 2);
        let sink = RecordingSink::default();

        let err = scheduler
            .run(&chunks(5), &EpisodeContext::default(), &sink)
            .await
            .unwrap_err();

        assert!(matches!(err, PodtekstError::Refinement(ref m) if m.contains("chunk 3")));
        // Only the first batch made it out
        assert_eq!(sink.progress().len(), 1);
    }

    #[tokio::test]
    async fn test_degraded_chunk_keeps_position() {
        let backend = ScriptedBackend::replying("{}")
            .on("marker-0.", Duration::ZERO, &reply_for(0))
            .truncate_on("marker-1.")
            .on("marker-2.", Duration::ZERO, &reply_for(2));
        let (scheduler, _) = scheduler(backend, 4);

        let outcome = scheduler
            .run(&chunks(3), &EpisodeContext::default(), &RecordingSink::default())
            .await
            .unwrap();

        assert_eq!(outcome.degraded_chunks, 1);
        let texts: Vec<_> = outcome.paragraphs.iter().map(|p| p.text.as_str()).collect();
        assert_eq!(texts, vec!["Paragraph 0.", "marker-1.", "Paragraph 2."]);
        assert_eq!(outcome.paragraphs[1].start, 100.0);
        assert_eq!(outcome.paragraphs[1].end, 110.0);
    }

    #[tokio::test]
    async fn test_empty_transcript_makes_no_calls() {
        let (scheduler, backend) = scheduler(ScriptedBackend::failing("unused"), 4);
        let sink = RecordingSink::default();

        let outcome = scheduler
            .run(&chunks(0), &EpisodeContext::default(), &sink)
            .await
            .unwrap();

        assert!(outcome.paragraphs.is_empty());
        assert_eq!(backend.calls(), 0);
        assert_eq!(sink.progress(), vec![Vec::<Paragraph>::new()]);
    }
}
