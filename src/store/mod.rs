pub mod history;

pub use history::{HistoryItem, HistoryStore};

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, warn};

const CREDENTIAL_KEY: &str = "githubApiKey";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to write local store: {0}")]
    Write(#[from] std::io::Error),

    #[error("Failed to serialize local store: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// String key/value store persisted as a single JSON object on disk.
///
/// Every mutation rewrites the file. A missing or unreadable file loads as an
/// empty store.
#[derive(Debug)]
pub struct LocalStore {
    path: Option<PathBuf>,
    entries: Mutex<BTreeMap<String, String>>,
}

impl LocalStore {
    /// Open the store at `path`, loading whatever is already there.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = load_entries(&path);
        debug!(path = %path.display(), keys = entries.len(), "opened local store");
        Self {
            path: Some(path),
            entries: Mutex::new(entries),
        }
    }

    /// A store that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// `<config dir>/repo-analyzer/store.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("repo-analyzer").join("store.json"))
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    pub fn set(&self, key: &str, value: impl Into<String>) -> Result<(), StoreError> {
        let mut entries = self.lock();
        let mut updated = entries.clone();
        updated.insert(key.to_string(), value.into());
        self.persist(&updated)?;
        *entries = updated;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.lock();
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut updated = entries.clone();
        updated.remove(key);
        self.persist(&updated)?;
        *entries = updated;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        // A panic while holding the lock cannot leave the map half-written.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(entries)?)?;
        Ok(())
    }
}

fn load_entries(path: &Path) -> BTreeMap<String, String> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(_) => return BTreeMap::new(),
    };
    serde_json::from_str(&contents).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "local store is corrupted, starting empty");
        BTreeMap::new()
    })
}

/// The GitHub bearer token.
///
/// The stored value wins; `fallback` (from config or `GITHUB_TOKEN`) is used
/// only when nothing is stored and is never written back.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    store: Arc<LocalStore>,
    fallback: Option<String>,
}

impl CredentialStore {
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self {
            store,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: Option<String>) -> Self {
        self.fallback = fallback.filter(|token| !token.trim().is_empty());
        self
    }

    pub fn token(&self) -> Option<String> {
        self.store
            .get(CREDENTIAL_KEY)
            .filter(|token| !token.trim().is_empty())
            .or_else(|| self.fallback.clone())
    }

    pub fn save(&self, token: &str) -> Result<(), StoreError> {
        self.store.set(CREDENTIAL_KEY, token.trim())
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.remove(CREDENTIAL_KEY)
    }
}
