//! Episode aggregate and its persistence.
//!
//! An [`Episode`] is created in `pending` and then mutated only by the
//! orchestrator through sparse [`EpisodePatch`]es. The raw transcript is
//! written once; paragraphs are replaced wholesale on each progress write.

mod memory;
mod slug;
mod sqlite;
mod state;

pub use memory::MemoryEpisodeStore;
pub use slug::{reprocess_slug, slugify, unique_slug};
pub use sqlite::SqliteEpisodeStore;
pub use state::{EpisodeStatus, RunKind};

use crate::error::{PodtekstError, Result};
use crate::refinement::EpisodeContext;
use crate::transcription::{Chapter, Paragraph, Segment, TranscriptExport};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A podcast episode and everything produced for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    /// Readable unique handle derived from the title.
    pub slug: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Reference as supplied by the user.
    pub source_url: String,
    /// Resolved, playable audio URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    pub status: EpisodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_transcript: Option<Vec<Segment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paragraphs: Option<Vec<Paragraph>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapters: Option<Vec<Chapter>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_names: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Episode {
    /// A fresh `pending` episode with a new id.
    ///
    /// The slug is derived from the title; stores make it unique on insert.
    pub fn new(fields: NewEpisode) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            slug: slugify(&fields.title),
            title: fields.title,
            description: fields.description,
            source_url: fields.source_url,
            audio_url: None,
            status: EpisodeStatus::Pending,
            raw_transcript: None,
            paragraphs: None,
            summary: None,
            chapters: None,
            speaker_names: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A new `processing` episode sharing this one's inputs and raw transcript.
    ///
    /// Fails with `InvalidInput` when there is no raw transcript to reprocess.
    pub fn clone_for_reprocess(&self) -> Result<Self> {
        if !self.has_raw_transcript() {
            return Err(PodtekstError::InvalidInput(format!(
                "Episode {} has no raw transcript to reprocess",
                self.id
            )));
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            slug: reprocess_slug(&self.slug),
            title: self.title.clone(),
            description: self.description.clone(),
            source_url: self.source_url.clone(),
            audio_url: self.audio_url.clone(),
            status: EpisodeStatus::Processing,
            raw_transcript: self.raw_transcript.clone(),
            paragraphs: None,
            summary: None,
            chapters: None,
            speaker_names: None,
            error: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn has_raw_transcript(&self) -> bool {
        self.raw_transcript.is_some()
    }

    /// Prompt context for refinement and summary calls.
    pub fn context(&self) -> EpisodeContext {
        EpisodeContext::new(self.title.clone(), self.description.clone())
    }

    /// Apply a sparse patch in place.
    ///
    /// Fails without modifying anything if the patch would overwrite an
    /// existing raw transcript.
    pub fn apply(&mut self, patch: EpisodePatch) -> Result<()> {
        if patch.raw_transcript.is_some() && self.raw_transcript.is_some() {
            return Err(PodtekstError::Store(format!(
                "raw transcript of episode {} is already written",
                self.id
            )));
        }

        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(audio_url) = patch.audio_url {
            self.audio_url = Some(audio_url);
        }
        if let Some(raw) = patch.raw_transcript {
            self.raw_transcript = Some(raw);
        }
        if let Some(paragraphs) = patch.paragraphs {
            self.paragraphs = Some(paragraphs);
        }
        if let Some(summary) = patch.summary {
            self.summary = Some(summary);
        }
        if let Some(chapters) = patch.chapters {
            self.chapters = Some(chapters);
        }
        if let Some(names) = patch.speaker_names {
            self.speaker_names = Some(names);
        }
        if let Some(error) = patch.error {
            self.error = error;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Export view with speaker names applied.
    pub fn to_export(&self) -> TranscriptExport {
        TranscriptExport::new(
            self.id.clone(),
            self.title.clone(),
            self.paragraphs.as_deref().unwrap_or_default(),
            self.speaker_names.as_deref().unwrap_or_default(),
            self.summary.clone(),
            self.chapters.clone().unwrap_or_default(),
        )
    }
}

/// Fields supplied when an episode is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEpisode {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub source_url: String,
}

impl NewEpisode {
    pub fn new(title: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            source_url: source_url.into(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Sparse update; only `Some` fields are written.
///
/// `error` is tri-state: `None` leaves it alone, `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpisodePatch {
    pub status: Option<EpisodeStatus>,
    pub audio_url: Option<String>,
    pub raw_transcript: Option<Vec<Segment>>,
    pub paragraphs: Option<Vec<Paragraph>>,
    pub summary: Option<String>,
    pub chapters: Option<Vec<Chapter>>,
    pub speaker_names: Option<Vec<String>>,
    pub error: Option<Option<String>>,
}

impl EpisodePatch {
    pub fn status(status: EpisodeStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Flip to `error` with a message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: Some(EpisodeStatus::Error),
            error: Some(Some(message.into())),
            ..Default::default()
        }
    }

    pub fn with_error(mut self, error: Option<String>) -> Self {
        self.error = Some(error);
        self
    }
}

/// Row for episode listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeSummary {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub status: EpisodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Episode> for EpisodeSummary {
    fn from(episode: &Episode) -> Self {
        Self {
            id: episode.id.clone(),
            slug: episode.slug.clone(),
            title: episode.title.clone(),
            status: episode.status,
            error: episode.error.clone(),
            created_at: episode.created_at,
            updated_at: episode.updated_at,
        }
    }
}

/// Trait for episode persistence.
#[async_trait]
pub trait EpisodeStore: Send + Sync {
    async fn get_episode(&self, id: &str) -> Result<Option<Episode>>;

    async fn get_episode_by_slug(&self, slug: &str) -> Result<Option<Episode>>;

    /// Look up by id, then by slug.
    async fn find_episode(&self, key: &str) -> Result<Option<Episode>> {
        match self.get_episode(key).await? {
            Some(episode) => Ok(Some(episode)),
            None => self.get_episode_by_slug(key).await,
        }
    }

    /// Store a new `pending` episode under a unique slug and return its id.
    async fn create_episode(&self, fields: NewEpisode) -> Result<String>;

    /// Apply a sparse update. Fails with `EpisodeNotFound` for unknown ids.
    async fn patch_episode(&self, id: &str, patch: EpisodePatch) -> Result<()>;

    /// Copy an episode's inputs and raw transcript into a new `processing`
    /// episode; returns the new id.
    ///
    /// Fails with `InvalidInput`, writing nothing, when the source has no
    /// raw transcript.
    async fn clone_episode(&self, id: &str) -> Result<String>;

    /// All episodes, newest first.
    async fn list_episodes(&self) -> Result<Vec<EpisodeSummary>>;
}
