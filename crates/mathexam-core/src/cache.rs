//! Keyed store of previously generated question batches.
//!
//! Entries are keyed by `topic::difficulty::count` and replaced wholesale,
//! never merged. Stores are shared between concurrent requests without
//! coordination: a miss race costs a redundant generation call and the last
//! writer wins.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};

use crate::model::{Difficulty, Question};

/// Composite cache key for a per-topic batch.
pub fn cache_key(topic: &str, difficulty: Difficulty, count: usize) -> String {
    format!("{topic}::{difficulty}::{count}")
}

/// Get/set contract for batch persistence.
///
/// Implementations are best-effort: they never surface failures to the
/// assembler.
pub trait BatchStore: Send + Sync {
    /// Look up a cached batch.
    fn get(&self, key: &str) -> Option<Vec<Question>>;

    /// Replace the batch stored under `key`.
    fn set(&self, key: &str, questions: Vec<Question>);

    /// Drop the batch stored under `key`, if any.
    fn remove(&self, key: &str);
}

/// In-process store, mainly for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<Question>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached batches.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BatchStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Vec<Question>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, questions: Vec<Question>) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), questions);
    }

    fn remove(&self, key: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

/// Store backed by a single JSON object on disk, surviving restarts.
///
/// The whole map is re-read on every access and rewritten on every change.
/// An unreadable or corrupt file reads as an empty cache.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> HashMap<String, Vec<Question>> {
        let Ok(content) = std::fs::read_to_string(&self.path) else {
            return HashMap::new();
        };
        match serde_json::from_str(&content) {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!("ignoring unreadable cache {}: {e}", self.path.display());
                HashMap::new()
            }
        }
    }

    fn save(&self, map: &HashMap<String, Vec<Question>>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string(map).context("failed to serialize cache")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("failed to write cache to {}", self.path.display()))?;
        Ok(())
    }

    fn update(&self, f: impl FnOnce(&mut HashMap<String, Vec<Question>>)) {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = self.load();
        f(&mut map);
        if let Err(e) = self.save(&map) {
            tracing::warn!("cache write failed: {e:#}");
        }
    }
}

impl BatchStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<Vec<Question>> {
        self.load().remove(key)
    }

    fn set(&self, key: &str, questions: Vec<Question>) {
        self.update(|map| {
            map.insert(key.to_string(), questions);
        });
    }

    fn remove(&self, key: &str) {
        self.update(|map| {
            map.remove(key);
        });
    }
}
