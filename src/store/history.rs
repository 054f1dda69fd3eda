use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{LocalStore, StoreError};
use crate::report::types::AnalysisResult;

const HISTORY_KEY: &str = "repoAnalyzerHistory";
pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

/// A past analysis, as shown in the history list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub id: String,
    pub repo_url: String,
    pub timestamp: DateTime<Utc>,
    pub result: AnalysisResult,
}

/// Most-recent-first log of analyses, one entry per repository URL.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    store: Arc<LocalStore>,
    capacity: usize,
}

impl HistoryStore {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self::with_capacity(store, DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_capacity(store: Arc<LocalStore>, capacity: usize) -> Self {
        Self { store, capacity }
    }

    /// Load the stored history. Unparseable data is dropped and reads as empty.
    pub fn load(&self) -> Vec<HistoryItem> {
        let Some(raw) = self.store.get(HISTORY_KEY) else {
            return Vec::new();
        };
        match serde_json::from_str::<Vec<HistoryItem>>(&raw) {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "stored history is corrupted, clearing it");
                if let Err(e) = self.store.remove(HISTORY_KEY) {
                    warn!(error = %e, "failed to clear corrupted history");
                }
                Vec::new()
            }
        }
    }

    /// Put `result` at the front, replacing any entry for the same URL and
    /// evicting the oldest entries past capacity. Returns the new history.
    pub fn upsert(
        &self,
        repo_url: &str,
        result: &AnalysisResult,
    ) -> Result<Vec<HistoryItem>, StoreError> {
        let item = HistoryItem {
            id: uuid::Uuid::new_v4().to_string(),
            repo_url: repo_url.to_string(),
            timestamp: Utc::now(),
            result: result.clone(),
        };

        let mut history: Vec<HistoryItem> = std::iter::once(item)
            .chain(self.load().into_iter().filter(|i| i.repo_url != repo_url))
            .collect();
        history.truncate(self.capacity);

        self.store
            .set(HISTORY_KEY, serde_json::to_string(&history)?)?;
        debug!(repo_url, entries = history.len(), "saved history");
        Ok(history)
    }

    pub fn find(&self, repo_url: &str) -> Option<HistoryItem> {
        self.load().into_iter().find(|i| i.repo_url == repo_url)
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.remove(HISTORY_KEY)
    }
}
