//! SQLite-backed episode store.
//!
//! Sequence fields (segments, paragraphs, chapters, speaker names) are stored
//! as JSON text columns.

use super::{
    unique_slug, Episode, EpisodePatch, EpisodeStatus, EpisodeStore, EpisodeSummary, NewEpisode,
};
use crate::error::{PodtekstError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS episodes (
    id TEXT PRIMARY KEY,
    slug TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    description TEXT,
    source_url TEXT NOT NULL,
    audio_url TEXT,
    status TEXT NOT NULL,
    raw_transcript_json TEXT,
    paragraphs_json TEXT,
    summary TEXT,
    chapters_json TEXT,
    speaker_names_json TEXT,
    error TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_episodes_created_at ON episodes(created_at);
"#;

const SELECT_COLUMNS: &str = "id, slug, title, description, source_url, audio_url, status, \
     raw_transcript_json, paragraphs_json, summary, chapters_json, speaker_names_json, \
     error, created_at, updated_at";

/// SQLite episode store.
pub struct SqliteEpisodeStore {
    conn: Mutex<Connection>,
}

impl SqliteEpisodeStore {
    /// Open (or create) the store at `path`.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Opened episode store at {:?}", path);
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| PodtekstError::Store(format!("Failed to acquire lock: {}", e)))
    }

    fn load(conn: &Connection, id: &str) -> Result<Option<Episode>> {
        Self::load_where(conn, "id", id)
    }

    fn load_where(conn: &Connection, column: &str, value: &str) -> Result<Option<Episode>> {
        let row = conn
            .query_row(
                &format!("SELECT {} FROM episodes WHERE {} = ?1", SELECT_COLUMNS, column),
                params![value],
                read_row,
            )
            .optional()?;

        row.map(RawRow::into_episode).transpose()
    }

    fn slug_taken(conn: &Connection, slug: &str) -> Result<bool> {
        let found = conn
            .query_row("SELECT 1 FROM episodes WHERE slug = ?1", params![slug], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    /// Insert a new episode under a unique slug.
    fn add(conn: &Connection, mut episode: Episode) -> Result<Episode> {
        let tx = conn.unchecked_transaction()?;
        episode.slug = unique_slug(&episode.slug, |s| Self::slug_taken(&tx, s))?;
        Self::write(&tx, &episode)?;
        tx.commit()?;
        Ok(episode)
    }

    fn write(conn: &Connection, episode: &Episode) -> Result<()> {
        conn.execute(
            r#"
            INSERT OR REPLACE INTO episodes
            (id, slug, title, description, source_url, audio_url, status,
             raw_transcript_json, paragraphs_json, summary, chapters_json, speaker_names_json,
             error, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
            params![
                episode.id,
                episode.slug,
                episode.title,
                episode.description,
                episode.source_url,
                episode.audio_url,
                episode.status.as_str(),
                to_json(&episode.raw_transcript)?,
                to_json(&episode.paragraphs)?,
                episode.summary,
                to_json(&episode.chapters)?,
                to_json(&episode.speaker_names)?,
                episode.error,
                episode.created_at.to_rfc3339(),
                episode.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

/// Column values as read, before JSON and enum decoding.
struct RawRow {
    id: String,
    slug: String,
    title: String,
    description: Option<String>,
    source_url: String,
    audio_url: Option<String>,
    status: String,
    raw_transcript: Option<String>,
    paragraphs: Option<String>,
    summary: Option<String>,
    chapters: Option<String>,
    speaker_names: Option<String>,
    error: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        id: row.get(0)?,
        slug: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        source_url: row.get(4)?,
        audio_url: row.get(5)?,
        status: row.get(6)?,
        raw_transcript: row.get(7)?,
        paragraphs: row.get(8)?,
        summary: row.get(9)?,
        chapters: row.get(10)?,
        speaker_names: row.get(11)?,
        error: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

impl RawRow {
    fn into_episode(self) -> Result<Episode> {
        let status: EpisodeStatus = self.status.parse().map_err(PodtekstError::Store)?;
        Ok(Episode {
            id: self.id,
            slug: self.slug,
            title: self.title,
            description: self.description,
            source_url: self.source_url,
            audio_url: self.audio_url,
            status,
            raw_transcript: from_json(self.raw_transcript)?,
            paragraphs: from_json(self.paragraphs)?,
            summary: self.summary,
            chapters: from_json(self.chapters)?,
            speaker_names: from_json(self.speaker_names)?,
            error: self.error,
            created_at: parse_time(&self.created_at),
            updated_at: parse_time(&self.updated_at),
        })
    }
}

fn to_json<T: Serialize>(value: &Option<T>) -> Result<Option<String>> {
    value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(Into::into)
}

fn from_json<T: DeserializeOwned>(value: Option<String>) -> Result<Option<T>> {
    value
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(Into::into)
}

fn parse_time(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl EpisodeStore for SqliteEpisodeStore {
    #[instrument(skip(self))]
    async fn get_episode(&self, id: &str) -> Result<Option<Episode>> {
        let conn = self.lock()?;
        Self::load(&conn, id)
    }

    #[instrument(skip(self))]
    async fn get_episode_by_slug(&self, slug: &str) -> Result<Option<Episode>> {
        let conn = self.lock()?;
        Self::load_where(&conn, "slug", slug)
    }

    #[instrument(skip(self, fields))]
    async fn create_episode(&self, fields: NewEpisode) -> Result<String> {
        let conn = self.lock()?;
        let episode = Self::add(&conn, Episode::new(fields))?;
        debug!("Created episode {} ({})", episode.id, episode.slug);
        Ok(episode.id)
    }

    #[instrument(skip(self, patch))]
    async fn patch_episode(&self, id: &str, patch: EpisodePatch) -> Result<()> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        let mut episode =
            Self::load(&tx, id)?.ok_or_else(|| PodtekstError::EpisodeNotFound(id.to_string()))?;
        episode.apply(patch)?;
        Self::write(&tx, &episode)?;

        tx.commit()?;
        debug!("Patched episode {} (status {})", id, episode.status);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn clone_episode(&self, id: &str) -> Result<String> {
        let conn = self.lock()?;
        let source =
            Self::load(&conn, id)?.ok_or_else(|| PodtekstError::EpisodeNotFound(id.to_string()))?;

        let copy = Self::add(&conn, source.clone_for_reprocess()?)?;
        info!("Cloned episode {} into {} ({})", id, copy.id, copy.slug);
        Ok(copy.id)
    }

    #[instrument(skip(self))]
    async fn list_episodes(&self) -> Result<Vec<EpisodeSummary>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, slug, title, status, error, created_at, updated_at
            FROM episodes
            ORDER BY created_at DESC
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut episodes = Vec::new();
        for row in rows {
            let (id, slug, title, status, error, created_at, updated_at) = row?;
            episodes.push(EpisodeSummary {
                id,
                slug,
                title,
                status: status.parse().map_err(PodtekstError::Store)?,
                error,
                created_at: parse_time(&created_at),
                updated_at: parse_time(&updated_at),
            });
        }
        Ok(episodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcription::{Chapter, Paragraph, Segment};

    async fn seeded() -> (SqliteEpisodeStore, String) {
        let store = SqliteEpisodeStore::in_memory().unwrap();
        let id = store
            .create_episode(
                NewEpisode::new("Pilot", "https://cdn.example/ep1.mp3").with_description("First"),
            )
            .await
            .unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (store, id) = seeded().await;
        let episode = store.get_episode(&id).await.unwrap().unwrap();

        assert_eq!(episode.title, "Pilot");
        assert_eq!(episode.description.as_deref(), Some("First"));
        assert_eq!(episode.status, EpisodeStatus::Pending);
        assert!(episode.raw_transcript.is_none());
        assert!(store.get_episode("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_patch_round_trips_json_columns() {
        let (store, id) = seeded().await;
        let raw = vec![
            Segment::new(0.0, 1.5, "hi").with_speaker("SPEAKER_00"),
            Segment::new(1.5, 3.0, "hello"),
        ];

        store
            .patch_episode(
                &id,
                EpisodePatch {
                    status: Some(EpisodeStatus::Processing),
                    raw_transcript: Some(raw.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store
            .patch_episode(
                &id,
                EpisodePatch {
                    status: Some(EpisodeStatus::Done),
                    paragraphs: Some(vec![Paragraph::new(0.0, 3.0, "Hi. Hello.")]),
                    summary: Some("Greetings.".into()),
                    chapters: Some(vec![Chapter::new("Hello", 0.0)]),
                    speaker_names: Some(vec!["Ada".into()]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let episode = store.get_episode(&id).await.unwrap().unwrap();
        assert_eq!(episode.status, EpisodeStatus::Done);
        assert_eq!(episode.raw_transcript, Some(raw));
        assert_eq!(episode.chapters, Some(vec![Chapter::new("Hello", 0.0)]));
        assert_eq!(episode.speaker_names, Some(vec!["Ada".to_string()]));
        assert_eq!(episode.summary.as_deref(), Some("Greetings."));
    }

    #[tokio::test]
    async fn test_raw_transcript_overwrite_rejected() {
        let (store, id) = seeded().await;
        let patch = EpisodePatch {
            raw_transcript: Some(vec![Segment::new(0.0, 1.0, "first")]),
            ..Default::default()
        };
        store.patch_episode(&id, patch.clone()).await.unwrap();

        let err = store.patch_episode(&id, patch).await.unwrap_err();
        assert!(matches!(err, PodtekstError::Store(_)));
    }

    #[tokio::test]
    async fn test_error_cleared_by_explicit_none() {
        let (store, id) = seeded().await;
        store.patch_episode(&id, EpisodePatch::failed("boom")).await.unwrap();
        assert_eq!(
            store.get_episode(&id).await.unwrap().unwrap().error.as_deref(),
            Some("boom")
        );

        store
            .patch_episode(&id, EpisodePatch::status(EpisodeStatus::Downloading).with_error(None))
            .await
            .unwrap();
        assert!(store.get_episode(&id).await.unwrap().unwrap().error.is_none());
    }

    #[tokio::test]
    async fn test_clone_of_done_episode() {
        let (store, id) = seeded().await;
        let raw = vec![Segment::new(0.0, 4.0, "the raw words")];
        store
            .patch_episode(
                &id,
                EpisodePatch {
                    status: Some(EpisodeStatus::Done),
                    raw_transcript: Some(raw.clone()),
                    summary: Some("old summary".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let clone_id = store.clone_episode(&id).await.unwrap();
        assert_ne!(clone_id, id);

        let clone = store.get_episode(&clone_id).await.unwrap().unwrap();
        assert_eq!(clone.status, EpisodeStatus::Processing);
        assert_eq!(clone.raw_transcript, Some(raw));
        assert_eq!(clone.title, "Pilot");
        assert!(clone.summary.is_none());

        let original = store.get_episode(&id).await.unwrap().unwrap();
        assert_eq!(original.status, EpisodeStatus::Done);
    }

    #[tokio::test]
    async fn test_clone_requires_raw_transcript() {
        let (store, id) = seeded().await;

        let err = store.clone_episode(&id).await.unwrap_err();
        assert!(matches!(err, PodtekstError::InvalidInput(_)));
        assert_eq!(store.list_episodes().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_slug_lookup_and_uniqueness() {
        let (store, id) = seeded().await;
        let second = store
            .create_episode(NewEpisode::new("Pilot", "https://cdn.example/ep2.mp3"))
            .await
            .unwrap();

        assert_eq!(store.get_episode(&id).await.unwrap().unwrap().slug, "pilot");
        let found = store.get_episode_by_slug("pilot-2").await.unwrap().unwrap();
        assert_eq!(found.id, second);
        assert_eq!(store.find_episode("pilot").await.unwrap().unwrap().id, id);

        store
            .patch_episode(
                &id,
                EpisodePatch {
                    raw_transcript: Some(vec![Segment::new(0.0, 1.0, "hi")]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let clone_id = store.clone_episode(&id).await.unwrap();
        let clone = store.get_episode(&clone_id).await.unwrap().unwrap();
        assert!(clone.slug.starts_with("pilot-re-"));

        let slugs: Vec<String> = store
            .list_episodes()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.slug)
            .collect();
        assert_eq!(slugs.len(), 3);
        assert!(slugs.contains(&"pilot-2".to_string()));
    }

    #[tokio::test]
    async fn test_list_episodes() {
        let (store, _) = seeded().await;
        store
            .create_episode(NewEpisode::new("Second", "https://cdn.example/ep2.mp3"))
            .await
            .unwrap();

        let list = store.list_episodes().await.unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.iter().all(|e| e.status == EpisodeStatus::Pending));
    }

    #[tokio::test]
    async fn test_on_disk_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("episodes.db");

        let id = {
            let store = SqliteEpisodeStore::new(&path).unwrap();
            store
                .create_episode(NewEpisode::new("Pilot", "https://cdn.example/ep1.mp3"))
                .await
                .unwrap()
        };

        let reopened = SqliteEpisodeStore::new(&path).unwrap();
        assert!(reopened.get_episode(&id).await.unwrap().is_some());
    }
}
