//! In-memory episode store.
//!
//! Backs the orchestrator and router tests. Every status written
//! is also recorded, so lifecycle order can be inspected afterwards.

use super::{
    unique_slug, Episode, EpisodePatch, EpisodeStatus, EpisodeStore, EpisodeSummary, NewEpisode,
};
use crate::error::{PodtekstError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Default)]
struct Inner {
    episodes: HashMap<String, Episode>,
    history: HashMap<String, Vec<EpisodeStatus>>,
}

impl Inner {
    fn slug_taken(&self, slug: &str) -> bool {
        self.episodes.values().any(|e| e.slug == slug)
    }

    /// Insert under a unique slug, starting a fresh status history.
    fn add(&mut self, mut episode: Episode) -> Result<String> {
        episode.slug = unique_slug(&episode.slug, |s| Ok(self.slug_taken(s)))?;
        let id = episode.id.clone();
        self.history.insert(id.clone(), vec![episode.status]);
        self.episodes.insert(id.clone(), episode);
        Ok(id)
    }
}

/// In-memory episode store.
#[derive(Default)]
pub struct MemoryEpisodeStore {
    inner: RwLock<Inner>,
}

fn poisoned<T>(_: T) -> PodtekstError {
    PodtekstError::Store("episode store lock poisoned".to_string())
}

impl MemoryEpisodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every status the episode has held, oldest first.
    pub fn status_history(&self, id: &str) -> Vec<EpisodeStatus> {
        self.inner
            .read()
            .map(|inner| inner.history.get(id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EpisodeStore for MemoryEpisodeStore {
    async fn get_episode(&self, id: &str) -> Result<Option<Episode>> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.episodes.get(id).cloned())
    }

    async fn get_episode_by_slug(&self, slug: &str) -> Result<Option<Episode>> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.episodes.values().find(|e| e.slug == slug).cloned())
    }

    async fn create_episode(&self, fields: NewEpisode) -> Result<String> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        inner.add(Episode::new(fields))
    }

    async fn patch_episode(&self, id: &str, patch: EpisodePatch) -> Result<()> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        let status = patch.status;

        let episode = inner
            .episodes
            .get_mut(id)
            .ok_or_else(|| PodtekstError::EpisodeNotFound(id.to_string()))?;
        episode.apply(patch)?;

        if let Some(status) = status {
            inner.history.entry(id.to_string()).or_default().push(status);
        }
        Ok(())
    }

    async fn clone_episode(&self, id: &str) -> Result<String> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        let copy = inner
            .episodes
            .get(id)
            .ok_or_else(|| PodtekstError::EpisodeNotFound(id.to_string()))?
            .clone_for_reprocess()?;
        inner.add(copy)
    }

    async fn list_episodes(&self) -> Result<Vec<EpisodeSummary>> {
        let inner = self.inner.read().map_err(poisoned)?;
        let mut list: Vec<EpisodeSummary> = inner.episodes.values().map(EpisodeSummary::from).collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }
}
