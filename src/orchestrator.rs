//! Pipeline orchestrator for Podtekst.
//!
//! Drives one episode through resolve -> transcribe -> chunk -> refine ->
//! summarize, writing status and partial results to the episode store as it
//! goes. Once a run has started, failures are recorded on the episode and
//! reported in the [`RunReport`]; they are not returned as errors.

use crate::audio_source::{AudioResolver, HttpAudioResolver};
use crate::chunking::TemporalChunker;
use crate::config::{Prompts, Settings};
use crate::episode::{
    Episode, EpisodePatch, EpisodeStatus, EpisodeStore, RunKind, SqliteEpisodeStore,
};
use crate::error::{PodtekstError, Result};
use crate::llm::{create_backend, CompletionBackend, TokenUsage};
use crate::refinement::{
    BatchScheduler, EpisodeContext, ProgressSink, Refiner, Summarizer, SummaryOutcome,
};
use crate::transcription::{
    create_transcriber, speaker_count, AsrBackend, Paragraph, Segment, TranscribeOptions,
    Transcriber,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{error, info, instrument, warn};

/// Per-run overrides for a full processing run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOptions {
    /// Recognition backend; the configured default when `None`.
    pub backend: Option<AsrBackend>,
    /// Diarization hint; the configured default when `None`.
    pub min_speakers: Option<u32>,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed {
        paragraphs: usize,
        chapters: usize,
        speakers: usize,
        /// Chunks that kept their original text after a truncated answer.
        degraded_chunks: usize,
    },
    Failed {
        /// Status the episode was in when the run failed.
        stage: EpisodeStatus,
        message: String,
    },
}

/// Result of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub episode_id: String,
    pub kind: RunKind,
    pub outcome: RunOutcome,
    pub usage: TokenUsage,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RunOutcome::Completed { .. })
    }
}

/// A run that has been admitted but not yet executed.
///
/// Holding a permit keeps the episode marked in flight, so callers can
/// answer a request before the run itself starts.
pub struct RunPermit {
    _guard: RunGuard,
    episode: Episode,
    plan: Plan,
}

enum Plan {
    Full {
        transcriber: Arc<dyn Transcriber>,
        options: TranscribeOptions,
    },
    Reprocess,
}

impl RunPermit {
    pub fn episode_id(&self) -> &str {
        &self.episode.id
    }

    pub fn kind(&self) -> RunKind {
        match self.plan {
            Plan::Full { .. } => RunKind::Full,
            Plan::Reprocess => RunKind::Reprocess,
        }
    }
}

/// The main orchestrator for the Podtekst pipeline.
pub struct Orchestrator {
    settings: Settings,
    prompts: Arc<Prompts>,
    store: Arc<dyn EpisodeStore>,
    resolver: Arc<dyn AudioResolver>,
    transcriber: Arc<dyn Transcriber>,
    backend: Arc<dyn CompletionBackend>,
    observers: Vec<Arc<dyn ProgressSink>>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Orchestrator {
    /// Create an orchestrator from configuration.
    pub fn new(settings: Settings) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;
        let store = Arc::new(SqliteEpisodeStore::new(&settings.sqlite_path())?);
        let resolver = Arc::new(HttpAudioResolver::new(&settings.audio)?);
        let transcriber = create_transcriber(settings.transcription.backend, &settings)?;
        let backend = create_backend(&settings.refinement)?;

        info!(
            "Using {} for recognition, {} ({}) for refinement",
            settings.transcription.backend,
            backend.name(),
            backend.model()
        );

        Ok(Self::with_components(
            settings,
            prompts,
            store,
            resolver,
            transcriber,
            backend,
        ))
    }

    /// Create an orchestrator with custom components.
    pub fn with_components(
        settings: Settings,
        prompts: Prompts,
        store: Arc<dyn EpisodeStore>,
        resolver: Arc<dyn AudioResolver>,
        transcriber: Arc<dyn Transcriber>,
        backend: Arc<dyn CompletionBackend>,
    ) -> Self {
        Self {
            settings,
            prompts: Arc::new(prompts),
            store,
            resolver,
            transcriber,
            backend,
            observers: Vec::new(),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Attach an observer notified after each store write.
    pub fn with_observer(mut self, observer: Arc<dyn ProgressSink>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn store(&self) -> Arc<dyn EpisodeStore> {
        self.store.clone()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Whether a run is currently active for the episode.
    pub fn is_running(&self, id: &str) -> bool {
        self.in_flight
            .lock()
            .map(|set| set.contains(id))
            .unwrap_or(false)
    }

    /// Run the full pipeline on a `pending` episode (or a failed one that
    /// never got a raw transcript). `key` is an episode id or slug.
    ///
    /// Returns `Err` only if the run could not start.
    pub async fn process_episode(&self, key: &str, options: ProcessOptions) -> Result<RunReport> {
        let permit = self.claim(key, RunKind::Full, options).await?;
        Ok(self.execute(permit).await)
    }

    /// Refine the persisted raw transcript again, skipping recognition.
    pub async fn reprocess_episode(&self, key: &str) -> Result<RunReport> {
        let permit = self
            .claim(key, RunKind::Reprocess, ProcessOptions::default())
            .await?;
        Ok(self.execute(permit).await)
    }

    /// Clone an episode and reprocess the clone; the original is untouched.
    ///
    /// An episode without a raw transcript is rejected before the clone is
    /// written.
    pub async fn clone_and_reprocess(&self, key: &str) -> Result<RunReport> {
        let permit = self.claim_clone(key).await?;
        Ok(self.execute(permit).await)
    }

    /// Admit a run: mark the episode in flight and check it may start.
    ///
    /// Nothing is written to the episode until [`Orchestrator::execute`].
    #[instrument(skip_all, fields(episode = %key, kind = %kind))]
    pub async fn claim(&self, key: &str, kind: RunKind, options: ProcessOptions) -> Result<RunPermit> {
        let id = self.load(key).await?.id;
        let guard = self.acquire(&id)?;
        // Reload under the guard so the start check sees settled state
        let episode = self.load(&id).await?;
        self.check_start(&episode, kind)?;

        let plan = match kind {
            RunKind::Full => Plan::Full {
                transcriber: self.transcriber_for(options.backend)?,
                options: TranscribeOptions {
                    min_speakers: options
                        .min_speakers
                        .or(self.settings.transcription.min_speakers),
                },
            },
            RunKind::Reprocess => Plan::Reprocess,
        };

        Ok(RunPermit {
            _guard: guard,
            episode,
            plan,
        })
    }

    /// Clone an episode and admit a reprocessing run on the clone.
    pub async fn claim_clone(&self, key: &str) -> Result<RunPermit> {
        let source = self.load(key).await?;
        let new_id = self.store.clone_episode(&source.id).await?;
        info!("Cloned episode {} into {}", source.id, new_id);
        self.claim(&new_id, RunKind::Reprocess, ProcessOptions::default())
            .await
    }

    /// Execute an admitted run to completion.
    ///
    /// Failures are recorded on the episode and reported in the outcome.
    #[instrument(skip_all, fields(episode = %permit.episode.id, kind = %permit.kind()))]
    pub async fn execute(&self, permit: RunPermit) -> RunReport {
        let kind = permit.kind();
        let RunPermit {
            _guard,
            episode,
            plan,
        } = permit;

        let mut run = Run::new(self.store.clone(), &episode.id, kind);
        let result = match plan {
            Plan::Full {
                transcriber,
                options,
            } => {
                self.run_full(&mut run, &episode, transcriber.as_ref(), &options)
                    .await
            }
            Plan::Reprocess => {
                let segments = episode.raw_transcript.clone().unwrap_or_default();
                async {
                    run.begin().await?;
                    self.refine_and_summarize(&mut run, &segments, &episode.context())
                        .await
                }
                .await
            }
        };

        run.finish(result).await
    }

    async fn run_full(
        &self,
        run: &mut Run,
        episode: &Episode,
        transcriber: &dyn Transcriber,
        options: &TranscribeOptions,
    ) -> Result<RunOutcome> {
        run.begin().await?;
        let audio_url = self.resolver.resolve(&episode.source_url).await?;
        run.write(EpisodePatch {
            audio_url: Some(audio_url.clone()),
            ..Default::default()
        })
        .await?;

        run.advance(EpisodeStatus::Transcribing).await?;
        let segments = transcriber.transcribe(&audio_url, options).await?;
        info!("Recognition returned {} segments", segments.len());
        run.write(EpisodePatch {
            raw_transcript: Some(segments.clone()),
            ..Default::default()
        })
        .await?;

        run.advance(EpisodeStatus::Processing).await?;
        self.refine_and_summarize(run, &segments, &episode.context())
            .await
    }

    /// Transcriber for the requested backend.
    pub fn transcriber_for(&self, backend: Option<AsrBackend>) -> Result<Arc<dyn Transcriber>> {
        match backend {
            Some(b) if b != self.transcriber.backend() => create_transcriber(b, &self.settings),
            _ => Ok(self.transcriber.clone()),
        }
    }

    async fn refine_and_summarize(
        &self,
        run: &mut Run,
        segments: &[Segment],
        ctx: &EpisodeContext,
    ) -> Result<RunOutcome> {
        let refinement = &self.settings.refinement;
        let chunks = TemporalChunker::new(refinement.chunk_duration_seconds).chunk(segments);
        info!("Refining {} chunks", chunks.len());

        let sink = StoreProgressSink {
            store: self.store.clone(),
            episode_id: run.episode_id.clone(),
            observers: self.observers.clone(),
        };

        let refiner = Refiner::new(
            self.backend.clone(),
            self.prompts.clone(),
            refinement.chunk_max_tokens,
        );
        let scheduled = BatchScheduler::new(Arc::new(refiner), refinement.max_concurrent_chunks)
            .run(&chunks, ctx, &sink)
            .await?;
        run.usage += scheduled.usage;

        let speakers = speaker_count(segments.iter().filter_map(|s| s.speaker.as_deref()));
        let summary = Summarizer::new(
            self.backend.clone(),
            self.prompts.clone(),
            refinement.summary_max_tokens,
        )
        .summarize(&scheduled.paragraphs, speakers, ctx)
        .await?;
        run.usage += summary.usage;

        run.check(EpisodeStatus::Done)?;
        sink.on_pipeline_complete(&summary).await?;
        run.status = EpisodeStatus::Done;
        sink.notify_complete(&summary).await;

        Ok(RunOutcome::Completed {
            paragraphs: scheduled.paragraphs.len(),
            chapters: summary.chapters.len(),
            speakers: summary.speaker_names.len(),
            degraded_chunks: scheduled.degraded_chunks,
        })
    }

    async fn load(&self, key: &str) -> Result<Episode> {
        self.store
            .find_episode(key)
            .await?
            .ok_or_else(|| PodtekstError::EpisodeNotFound(key.to_string()))
    }

    fn check_start(&self, episode: &Episode, kind: RunKind) -> Result<()> {
        if kind.can_start(episode.status, episode.has_raw_transcript()) {
            return Ok(());
        }
        if kind == RunKind::Reprocess {
            return Err(PodtekstError::InvalidInput(format!(
                "Episode {} has no raw transcript to reprocess",
                episode.id
            )));
        }
        Err(PodtekstError::InvalidTransition {
            from: episode.status.to_string(),
            to: kind.first_status().to_string(),
        })
    }

    fn acquire(&self, id: &str) -> Result<RunGuard> {
        let mut set = self
            .in_flight
            .lock()
            .map_err(|e| PodtekstError::Pipeline(format!("in-flight set poisoned: {}", e)))?;
        if !set.insert(id.to_string()) {
            return Err(PodtekstError::RunInProgress(id.to_string()));
        }
        Ok(RunGuard {
            id: id.to_string(),
            in_flight: self.in_flight.clone(),
        })
    }
}

/// Marks an episode as in flight until dropped.
struct RunGuard {
    id: String,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut set = match self.in_flight.lock() {
            Ok(set) => set,
            Err(poisoned) => poisoned.into_inner(),
        };
        set.remove(&self.id);
    }
}

/// Status bookkeeping for one run.
struct Run {
    store: Arc<dyn EpisodeStore>,
    episode_id: String,
    kind: RunKind,
    status: EpisodeStatus,
    usage: TokenUsage,
}

impl Run {
    fn new(store: Arc<dyn EpisodeStore>, episode_id: &str, kind: RunKind) -> Self {
        Self {
            store,
            episode_id: episode_id.to_string(),
            kind,
            status: EpisodeStatus::Pending,
            usage: TokenUsage::default(),
        }
    }

    /// Enter the run's first status, clearing any stale error.
    async fn begin(&mut self) -> Result<()> {
        let first = self.kind.first_status();
        self.store
            .patch_episode(&self.episode_id, EpisodePatch::status(first).with_error(None))
            .await?;
        self.status = first;
        info!("Episode {} -> {}", self.episode_id, first);
        Ok(())
    }

    fn check(&self, next: EpisodeStatus) -> Result<()> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(PodtekstError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            })
        }
    }

    async fn advance(&mut self, next: EpisodeStatus) -> Result<()> {
        self.check(next)?;
        self.store
            .patch_episode(&self.episode_id, EpisodePatch::status(next))
            .await?;
        self.status = next;
        info!("Episode {} -> {}", self.episode_id, next);
        Ok(())
    }

    /// Content-only write; status is untouched.
    async fn write(&self, patch: EpisodePatch) -> Result<()> {
        self.store.patch_episode(&self.episode_id, patch).await
    }

    /// Turn the run result into a report, recording failure on the episode.
    async fn finish(self, result: Result<RunOutcome>) -> RunReport {
        let outcome = match result {
            Ok(outcome) => {
                info!(
                    "Episode {} done ({} input / {} output tokens)",
                    self.episode_id, self.usage.input_tokens, self.usage.output_tokens
                );
                outcome
            }
            Err(e) => {
                let message = e.to_string();
                warn!("Episode {} failed while {}: {}", self.episode_id, self.status, message);

                if self.status.can_transition_to(EpisodeStatus::Error) {
                    if let Err(store_err) = self
                        .store
                        .patch_episode(&self.episode_id, EpisodePatch::failed(message.clone()))
                        .await
                    {
                        error!(
                            "Could not record failure on episode {}: {}",
                            self.episode_id, store_err
                        );
                    }
                }

                RunOutcome::Failed {
                    stage: self.status,
                    message,
                }
            }
        };

        RunReport {
            episode_id: self.episode_id,
            kind: self.kind,
            outcome,
            usage: self.usage,
        }
    }
}

/// Writes progress to the store, then forwards it to observers.
struct StoreProgressSink {
    store: Arc<dyn EpisodeStore>,
    episode_id: String,
    observers: Vec<Arc<dyn ProgressSink>>,
}

#[async_trait]
impl ProgressSink for StoreProgressSink {
    async fn on_chunk_progress(&self, paragraphs: &[Paragraph]) -> Result<()> {
        self.store
            .patch_episode(
                &self.episode_id,
                EpisodePatch {
                    paragraphs: Some(paragraphs.to_vec()),
                    ..Default::default()
                },
            )
            .await?;
        for observer in &self.observers {
            observer.on_chunk_progress(paragraphs).await?;
        }
        Ok(())
    }

    /// Flips the episode to `done` in the same write as the summary.
    ///
    /// Observers are not called here: `done` is terminal, so they are
    /// notified afterwards through [`StoreProgressSink::notify_complete`].
    async fn on_pipeline_complete(&self, outcome: &SummaryOutcome) -> Result<()> {
        self.store
            .patch_episode(
                &self.episode_id,
                EpisodePatch {
                    status: Some(EpisodeStatus::Done),
                    summary: Some(outcome.summary.clone()),
                    chapters: Some(outcome.chapters.clone()),
                    speaker_names: Some(outcome.speaker_names.clone()),
                    ..Default::default()
                },
            )
            .await
    }
}

impl StoreProgressSink {
    /// Tell observers the run finished; their failures are only logged.
    async fn notify_complete(&self, outcome: &SummaryOutcome) {
        for observer in &self.observers {
            if let Err(e) = observer.on_pipeline_complete(outcome).await {
                warn!(
                    "Completion observer failed for episode {}: {}",
                    self.episode_id, e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::episode::{MemoryEpisodeStore, NewEpisode};
    use crate::refinement::{EMPTY_TRANSCRIPT_SUMMARY, FULL_EPISODE_CHAPTER};
    use crate::testing::{MockResolver, MockTranscriber, RecordingSink, ScriptedBackend};
    use crate::transcription::Chapter;
    use std::time::Duration;
    use EpisodeStatus::*;

    const SUMMARY_NEEDLE: &str = "Generate a summary";
    const SUMMARY_REPLY: &str = r#"{
        "summary": "Ada explains compilers.",
        "chapters": [{"title": "Parsing", "timestamp": 250}, {"title": "Hello", "timestamp": 0}],
        "speaker_names": ["Ada", "Grace"]
    }"#;
    const REFINE_REPLY: &str =
        r#"{"paragraphs": [{"start": 0, "end": 1000, "text": "Cleaned up.", "speaker": "SPEAKER_00"}]}"#;

    fn segments() -> Vec<Segment> {
        vec![
            Segment::new(0.0, 5.0, "um hi").with_speaker("SPEAKER_00"),
            Segment::new(5.0, 12.0, "today we talk about X").with_speaker("SPEAKER_01"),
            Segment::new(250.0, 255.0, "moving on").with_speaker("SPEAKER_00"),
        ]
    }

    fn backend() -> ScriptedBackend {
        ScriptedBackend::replying(REFINE_REPLY).on(SUMMARY_NEEDLE, Duration::ZERO, SUMMARY_REPLY)
    }

    struct Harness {
        orchestrator: Orchestrator,
        store: Arc<MemoryEpisodeStore>,
        transcriber: Arc<MockTranscriber>,
        backend: Arc<ScriptedBackend>,
        sink: Arc<RecordingSink>,
    }

    fn harness_with(
        transcriber: MockTranscriber,
        backend: ScriptedBackend,
        resolver: MockResolver,
        settings: Settings,
    ) -> Harness {
        let store = Arc::new(MemoryEpisodeStore::new());
        let transcriber = Arc::new(transcriber);
        let backend = Arc::new(backend);
        let sink = Arc::new(RecordingSink::default());

        let orchestrator = Orchestrator::with_components(
            settings,
            Prompts::default(),
            store.clone(),
            Arc::new(resolver),
            transcriber.clone(),
            backend.clone(),
        )
        .with_observer(sink.clone());

        Harness {
            orchestrator,
            store,
            transcriber,
            backend,
            sink,
        }
    }

    fn harness(transcriber: MockTranscriber, backend: ScriptedBackend) -> Harness {
        harness_with(transcriber, backend, MockResolver::accepting(), Settings::default())
    }

    async fn new_episode(h: &Harness) -> String {
        h.store
            .create_episode(NewEpisode::new("Compilers", "https://cdn.example/ep1.mp3"))
            .await
            .unwrap()
    }

    async fn episode(h: &Harness, id: &str) -> Episode {
        h.store.get_episode(id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_full_run_visits_every_state_in_order() {
        let h = harness(MockTranscriber::new(segments()), backend());
        let id = new_episode(&h).await;

        let report = h
            .orchestrator
            .process_episode(&id, ProcessOptions::default())
            .await
            .unwrap();

        assert!(report.is_success(), "{:?}", report.outcome);
        assert_eq!(
            h.store.status_history(&id),
            vec![Pending, Downloading, Transcribing, Processing, Done]
        );

        let ep = episode(&h, &id).await;
        assert_eq!(ep.audio_url.as_deref(), Some("https://cdn.example/ep1.mp3"));
        assert_eq!(ep.raw_transcript, Some(segments()));
        assert_eq!(ep.summary.as_deref(), Some("Ada explains compilers."));
        assert_eq!(
            ep.chapters,
            Some(vec![Chapter::new("Hello", 0.0), Chapter::new("Parsing", 250.0)])
        );
        assert_eq!(ep.speaker_names, Some(vec!["Ada".to_string(), "Grace".to_string()]));
        assert!(ep.error.is_none());

        // The first chunk's answer covered both speakers and was split on the turn
        let paragraphs = ep.paragraphs.unwrap();
        let spans: Vec<_> = paragraphs
            .iter()
            .map(|p| (p.start, p.end, p.speaker.as_deref()))
            .collect();
        assert_eq!(
            spans,
            vec![
                (0.0, 5.0, Some("SPEAKER_00")),
                (5.0, 12.0, Some("SPEAKER_01")),
                (250.0, 255.0, Some("SPEAKER_00")),
            ]
        );
        assert_eq!(paragraphs[2].text, "Cleaned up.");

        // One refinement per chunk plus the summary
        assert_eq!(h.backend.calls(), 3);
        assert_eq!(h.sink.progress().len(), 1);
        assert_eq!(h.sink.completions().len(), 1);
        assert!(report.usage.total() > 0);
    }

    #[tokio::test]
    async fn test_min_speakers_passed_through() {
        let h = harness(MockTranscriber::new(segments()), backend());
        let id = new_episode(&h).await;

        h.orchestrator
            .process_episode(
                &id,
                ProcessOptions {
                    backend: None,
                    min_speakers: Some(2),
                },
            )
            .await
            .unwrap();

        assert_eq!(h.transcriber.options()[0].min_speakers, Some(2));
    }

    #[test]
    fn test_matching_backend_reuses_transcriber() {
        let h = harness(
            MockTranscriber::new(segments()).with_backend(AsrBackend::OpenAi),
            backend(),
        );

        let same = h.orchestrator.transcriber_for(Some(AsrBackend::OpenAi)).unwrap();
        assert_eq!(same.backend(), AsrBackend::OpenAi);
        let default = h.orchestrator.transcriber_for(None).unwrap();
        assert_eq!(default.backend(), AsrBackend::OpenAi);
    }

    #[tokio::test]
    async fn test_invalid_source_fails_at_downloading() {
        let h = harness_with(
            MockTranscriber::new(segments()),
            backend(),
            MockResolver::rejecting(),
            Settings::default(),
        );
        let id = new_episode(&h).await;

        let report = h
            .orchestrator
            .process_episode(&id, ProcessOptions::default())
            .await
            .unwrap();

        assert!(matches!(report.outcome, RunOutcome::Failed { stage: Downloading, .. }));
        assert_eq!(h.store.status_history(&id), vec![Pending, Downloading, Error]);
        assert_eq!(h.transcriber.calls(), 0);

        let ep = episode(&h, &id).await;
        assert!(ep.audio_url.is_none());
        assert!(ep.error.unwrap().contains("not audio"));
    }

    #[tokio::test]
    async fn test_recognition_failure_keeps_audio_url() {
        let h = harness(
            MockTranscriber::new(Vec::new()).with_failure("backend exploded"),
            backend(),
        );
        let id = new_episode(&h).await;

        let report = h
            .orchestrator
            .process_episode(&id, ProcessOptions::default())
            .await
            .unwrap();

        assert!(matches!(report.outcome, RunOutcome::Failed { stage: Transcribing, .. }));
        assert_eq!(
            h.store.status_history(&id),
            vec![Pending, Downloading, Transcribing, Error]
        );

        let ep = episode(&h, &id).await;
        assert_eq!(ep.audio_url.as_deref(), Some("https://cdn.example/ep1.mp3"));
        assert!(ep.raw_transcript.is_none());
        assert!(ep.error.unwrap().contains("backend exploded"));
        assert_eq!(h.backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_refinement_failure_keeps_earlier_progress() {
        let mut settings = Settings::default();
        settings.refinement.max_concurrent_chunks = 1;
        let h = harness_with(
            MockTranscriber::new(segments()),
            backend().fail_on("moving on", "upstream 502"),
            MockResolver::accepting(),
            settings,
        );
        let id = new_episode(&h).await;

        let report = h
            .orchestrator
            .process_episode(&id, ProcessOptions::default())
            .await
            .unwrap();

        match &report.outcome {
            RunOutcome::Failed { stage, message } => {
                assert_eq!(*stage, Processing);
                assert!(message.contains("upstream 502"));
            }
            other => panic!("expected failure, got {:?}", other),
        }

        let ep = episode(&h, &id).await;
        assert_eq!(ep.status, Error);
        assert_eq!(ep.raw_transcript, Some(segments()));
        assert_eq!(ep.paragraphs.map(|p| p.len()), Some(2));
        assert!(ep.summary.is_none());
    }

    #[tokio::test]
    async fn test_summary_failure_is_recorded() {
        let h = harness(
            MockTranscriber::new(segments()),
            ScriptedBackend::replying(REFINE_REPLY).fail_on(SUMMARY_NEEDLE, "overloaded"),
        );
        let id = new_episode(&h).await;

        let report = h
            .orchestrator
            .process_episode(&id, ProcessOptions::default())
            .await
            .unwrap();

        assert!(!report.is_success());
        let ep = episode(&h, &id).await;
        assert_eq!(ep.status, Error);
        assert_eq!(ep.paragraphs.map(|p| p.len()), Some(3));
    }

    #[tokio::test]
    async fn test_empty_transcript_still_finishes() {
        let h = harness(MockTranscriber::new(Vec::new()), backend());
        let id = new_episode(&h).await;

        let report = h
            .orchestrator
            .process_episode(&id, ProcessOptions::default())
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(h.backend.calls(), 0);

        let ep = episode(&h, &id).await;
        assert_eq!(ep.status, Done);
        assert_eq!(ep.paragraphs, Some(Vec::new()));
        assert_eq!(ep.summary.as_deref(), Some(EMPTY_TRANSCRIPT_SUMMARY));
        assert_eq!(ep.chapters, Some(vec![Chapter::new(FULL_EPISODE_CHAPTER, 0.0)]));
    }

    #[tokio::test]
    async fn test_reprocess_skips_recognition() {
        let h = harness(MockTranscriber::new(segments()), backend());
        let id = new_episode(&h).await;
        h.orchestrator
            .process_episode(&id, ProcessOptions::default())
            .await
            .unwrap();

        let report = h.orchestrator.reprocess_episode(&id).await.unwrap();

        assert!(report.is_success());
        assert_eq!(report.kind, RunKind::Reprocess);
        assert_eq!(h.transcriber.calls(), 1);
        assert_eq!(
            h.store.status_history(&id),
            vec![Pending, Downloading, Transcribing, Processing, Done, Processing, Done]
        );
    }

    #[tokio::test]
    async fn test_reprocess_requires_raw_transcript() {
        let h = harness(MockTranscriber::new(segments()), backend());
        let id = new_episode(&h).await;

        let err = h.orchestrator.reprocess_episode(&id).await.unwrap_err();
        assert!(matches!(err, PodtekstError::InvalidInput(_)));
        assert_eq!(h.store.status_history(&id), vec![Pending]);
    }

    #[tokio::test]
    async fn test_done_episode_cannot_be_processed_again() {
        let h = harness(MockTranscriber::new(segments()), backend());
        let id = new_episode(&h).await;
        h.orchestrator
            .process_episode(&id, ProcessOptions::default())
            .await
            .unwrap();

        let err = h
            .orchestrator
            .process_episode(&id, ProcessOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PodtekstError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_failed_recognition_can_be_retried() {
        let h = harness(
            MockTranscriber::new(Vec::new()).with_failure("flaky"),
            backend(),
        );
        let id = new_episode(&h).await;
        h.orchestrator
            .process_episode(&id, ProcessOptions::default())
            .await
            .unwrap();

        // No raw transcript yet, so a full run is allowed from error
        let report = h
            .orchestrator
            .process_episode(&id, ProcessOptions::default())
            .await
            .unwrap();
        assert!(!report.is_success());
        assert_eq!(h.transcriber.calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_run_is_rejected() {
        let h = harness(
            MockTranscriber::new(segments()).with_delay(Duration::from_millis(100)),
            backend(),
        );
        let id = new_episode(&h).await;

        let (first, second) = tokio::join!(
            h.orchestrator.process_episode(&id, ProcessOptions::default()),
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                h.orchestrator.reprocess_episode(&id).await
            }
        );

        assert!(first.unwrap().is_success());
        assert!(matches!(second, Err(PodtekstError::RunInProgress(_))));
        assert!(!h.orchestrator.is_running(&id));
        assert_eq!(h.transcriber.calls(), 1);
    }

    #[tokio::test]
    async fn test_clone_and_reprocess_leaves_original() {
        let h = harness(MockTranscriber::new(segments()), backend());
        let id = new_episode(&h).await;
        h.orchestrator
            .process_episode(&id, ProcessOptions::default())
            .await
            .unwrap();

        let report = h.orchestrator.clone_and_reprocess(&id).await.unwrap();

        assert!(report.is_success());
        assert_ne!(report.episode_id, id);
        let clone = episode(&h, &report.episode_id).await;
        assert_eq!(clone.status, Done);
        assert_eq!(clone.raw_transcript, Some(segments()));
        assert_eq!(episode(&h, &id).await.status, Done);
        assert_eq!(h.transcriber.calls(), 1);
    }

    #[tokio::test]
    async fn test_clone_without_raw_transcript_writes_nothing() {
        let h = harness(MockTranscriber::new(segments()), backend());
        let id = new_episode(&h).await;

        let err = h.orchestrator.clone_and_reprocess(&id).await.unwrap_err();

        assert!(matches!(err, PodtekstError::InvalidInput(_)));
        let episodes = h.store.list_episodes().await.unwrap();
        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].status, Pending);
    }

    /// Observer whose completion callback always fails.
    struct FailingCompletion;

    #[async_trait]
    impl ProgressSink for FailingCompletion {
        async fn on_chunk_progress(&self, _: &[Paragraph]) -> Result<()> {
            Ok(())
        }

        async fn on_pipeline_complete(&self, _: &SummaryOutcome) -> Result<()> {
            Err(PodtekstError::Pipeline("observer went away".to_string()))
        }
    }

    #[tokio::test]
    async fn test_failing_completion_observer_keeps_done() {
        let store = Arc::new(MemoryEpisodeStore::new());
        let orchestrator = Orchestrator::with_components(
            Settings::default(),
            Prompts::default(),
            store.clone(),
            Arc::new(MockResolver::accepting()),
            Arc::new(MockTranscriber::new(segments())),
            Arc::new(backend()),
        )
        .with_observer(Arc::new(FailingCompletion));
        let id = store
            .create_episode(NewEpisode::new("Compilers", "https://cdn.example/ep1.mp3"))
            .await
            .unwrap();

        let report = orchestrator
            .process_episode(&id, ProcessOptions::default())
            .await
            .unwrap();

        assert!(report.is_success(), "{:?}", report.outcome);
        assert_eq!(
            store.status_history(&id),
            vec![Pending, Downloading, Transcribing, Processing, Done]
        );
        let ep = store.get_episode(&id).await.unwrap().unwrap();
        assert_eq!(ep.status, Done);
        assert!(ep.error.is_none());
    }

    #[tokio::test]
    async fn test_permit_holds_episode_until_executed() {
        let h = harness(MockTranscriber::new(segments()), backend());
        let id = new_episode(&h).await;

        let permit = h
            .orchestrator
            .claim(&id, RunKind::Full, ProcessOptions::default())
            .await
            .unwrap();
        assert!(h.orchestrator.is_running(&id));
        assert_eq!(h.store.status_history(&id), vec![Pending]);

        let second = h
            .orchestrator
            .claim(&id, RunKind::Full, ProcessOptions::default())
            .await;
        assert!(matches!(second, Err(PodtekstError::RunInProgress(_))));

        let report = h.orchestrator.execute(permit).await;
        assert!(report.is_success());
        assert!(!h.orchestrator.is_running(&id));
    }

    #[tokio::test]
    async fn test_episode_found_by_slug() {
        let h = harness(MockTranscriber::new(segments()), backend());
        let id = new_episode(&h).await;

        let report = h
            .orchestrator
            .process_episode("compilers", ProcessOptions::default())
            .await
            .unwrap();

        assert_eq!(report.episode_id, id);
        assert_eq!(episode(&h, &id).await.status, Done);
    }
}
