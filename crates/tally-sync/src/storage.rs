//! # Key-Value Persistence
//!
//! The persistence collaborator consumed by the queue and the per-receipt
//! state table. Two independent keys are written (`sync_queue` and
//! `receipt_sync_states`) with no transactional coupling between them; every
//! write is fire-and-forget from the caller's point of view.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Storage Keys
// =============================================================================

/// Key under which the serialized queue snapshot lives.
pub const SYNC_QUEUE_KEY: &str = "sync_queue";

/// Key under which the per-receipt sync states live.
pub const RECEIPT_SYNC_STATES_KEY: &str = "receipt_sync_states";

// =============================================================================
// KeyValueStore Trait
// =============================================================================

/// Platform key-value storage seam.
///
/// Implementations must tolerate concurrent calls from a single-threaded
/// cooperative runtime; no cross-key atomicity is expected or provided.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads the value stored under `key`, if any.
    async fn get(&self, key: &str) -> SyncResult<Option<String>>;

    /// Writes `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> SyncResult<()>;

    /// Removes `key` if present.
    async fn remove(&self, key: &str) -> SyncResult<()>;
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// Volatile store for tests and embedders that persist elsewhere.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("memory store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> SyncResult<Option<String>> {
        Ok(self
            .entries
            .lock()
            .expect("memory store poisoned")
            .get(key)
            .cloned())
    }

    async fn set(&self, key: &str, value: &str) -> SyncResult<()> {
        self.entries
            .lock()
            .expect("memory store poisoned")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> SyncResult<()> {
        self.entries
            .lock()
            .expect("memory store poisoned")
            .remove(key);
        Ok(())
    }
}

// =============================================================================
// File-Backed Store
// =============================================================================

/// One JSON file per key in a data directory.
///
/// Writes go through a temp file + rename so a crash mid-write never leaves
/// a truncated snapshot behind.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens (creating if needed) a file store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> SyncResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| SyncError::StorageWrite {
            key: dir.display().to_string(),
            source_msg: e.to_string(),
        })?;
        debug!(?dir, "Opened file store");
        Ok(FileStore { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        // Keys are internal constants, but keep filenames tame anyway.
        let safe: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.json"))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> SyncResult<Option<String>> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::StorageRead {
                key: key.to_string(),
                source_msg: e.to_string(),
            }),
        }
    }

    async fn set(&self, key: &str, value: &str) -> SyncResult<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");

        std::fs::write(&tmp, value)
            .and_then(|_| std::fs::rename(&tmp, &path))
            .map_err(|e| SyncError::StorageWrite {
                key: key.to_string(),
                source_msg: e.to_string(),
            })
    }

    async fn remove(&self, key: &str) -> SyncResult<()> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::StorageWrite {
                key: key.to_string(),
                source_msg: e.to_string(),
            }),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("missing").await.unwrap(), None);

        store.set("k", "v1").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v1"));

        store.set("k", "v2").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v2"));

        store.remove("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        assert_eq!(store.get(SYNC_QUEUE_KEY).await.unwrap(), None);

        store.set(SYNC_QUEUE_KEY, "[]").await.unwrap();
        assert_eq!(
            store.get(SYNC_QUEUE_KEY).await.unwrap().as_deref(),
            Some("[]")
        );

        // Reopening the same directory sees the same data
        let reopened = FileStore::open(dir.path()).unwrap();
        assert_eq!(
            reopened.get(SYNC_QUEUE_KEY).await.unwrap().as_deref(),
            Some("[]")
        );

        store.remove(SYNC_QUEUE_KEY).await.unwrap();
        assert_eq!(store.get(SYNC_QUEUE_KEY).await.unwrap(), None);
        // Removing twice is fine
        store.remove(SYNC_QUEUE_KEY).await.unwrap();
    }

    #[tokio::test]
    async fn test_file_store_keys_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        store.set(SYNC_QUEUE_KEY, "queue").await.unwrap();
        store.set(RECEIPT_SYNC_STATES_KEY, "states").await.unwrap();

        assert_eq!(
            store.get(SYNC_QUEUE_KEY).await.unwrap().as_deref(),
            Some("queue")
        );
        assert_eq!(
            store.get(RECEIPT_SYNC_STATES_KEY).await.unwrap().as_deref(),
            Some("states")
        );
    }
}
