use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::track::Match;

/// Matches identified during this run, most recent first
///
/// Append-only and in-memory. Each append happens under one write lock, so
/// readers see the list either before or after it, never half-updated.
#[derive(Clone, Default)]
pub struct SessionHistory {
    entries: Arc<RwLock<Vec<Arc<Match>>>>,
}

impl SessionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn append(&self, matched: Arc<Match>) {
        let mut entries = self.entries.write().await;
        info!(
            "History: \"{}\" by {} ({} entries)",
            matched.title,
            matched.artist,
            entries.len() + 1
        );
        entries.insert(0, matched);
    }

    /// Copy of the current list
    pub async fn entries(&self) -> Vec<Arc<Match>> {
        self.entries.read().await.clone()
    }

    pub async fn latest(&self) -> Option<Arc<Match>> {
        self.entries.read().await.first().cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
