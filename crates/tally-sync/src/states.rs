//! # Per-Receipt Sync States
//!
//! Keyed table of derived sync state, one entry per receipt the sync layer
//! has touched. The queue remains the source of truth for what still needs
//! to sync; this table only feeds badges and banners in the UI.
//!
//! Entries are created lazily on first reference and never evicted
//! automatically (matching the app's observed behavior); `remove` exists so
//! an embedder can evict explicitly when a receipt is deleted.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use chrono::Utc;
use tally_core::{ReceiptSyncState, SyncStatus};

use crate::storage::{KeyValueStore, RECEIPT_SYNC_STATES_KEY};

// =============================================================================
// Receipt State Table
// =============================================================================

/// id → state table with explicit insertion and removal.
pub struct ReceiptStateTable {
    states: RwLock<HashMap<String, ReceiptSyncState>>,
    storage: Arc<dyn KeyValueStore>,
}

impl ReceiptStateTable {
    /// Creates an empty table.
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        ReceiptStateTable {
            states: RwLock::new(HashMap::new()),
            storage,
        }
    }

    /// Creates a table restored from the last persisted snapshot.
    pub async fn load(storage: Arc<dyn KeyValueStore>) -> Self {
        let entries: Vec<(String, ReceiptSyncState)> =
            match storage.get(RECEIPT_SYNC_STATES_KEY).await {
                Ok(Some(snapshot)) => serde_json::from_str(&snapshot).unwrap_or_else(|e| {
                    warn!(?e, "Persisted receipt states unreadable, starting empty");
                    Vec::new()
                }),
                Ok(None) => Vec::new(),
                Err(e) => {
                    warn!(?e, "Failed to read persisted receipt states, starting empty");
                    Vec::new()
                }
            };

        debug!(count = entries.len(), "Restored receipt sync states");
        ReceiptStateTable {
            states: RwLock::new(entries.into_iter().collect()),
            storage,
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// State recorded for a receipt, if any.
    pub async fn get(&self, receipt_id: &str) -> Option<ReceiptSyncState> {
        self.states.read().await.get(receipt_id).cloned()
    }

    /// Number of tracked receipts.
    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.states.read().await.is_empty()
    }

    // =========================================================================
    // Mutations (side effects of queue processing)
    // =========================================================================

    /// Marks a receipt as actively syncing.
    pub async fn mark_syncing(&self, receipt_id: &str, progress: u8) {
        self.update(receipt_id, |state| {
            state.status = SyncStatus::Syncing;
            state.progress = Some(progress);
            state.error = None;
        })
        .await;
    }

    /// Marks a receipt as queued while offline.
    pub async fn mark_offline(&self, receipt_id: &str) {
        self.update(receipt_id, |state| {
            state.status = SyncStatus::Offline;
            state.progress = None;
        })
        .await;
    }

    /// Marks a receipt as successfully synced.
    pub async fn mark_synced(&self, receipt_id: &str) {
        self.update(receipt_id, |state| {
            state.status = SyncStatus::Synced;
            state.progress = None;
            state.error = None;
            state.last_synced_at = Some(Utc::now());
        })
        .await;
    }

    /// Records a sync failure for a receipt.
    pub async fn mark_error(&self, receipt_id: &str, message: &str) {
        self.update(receipt_id, |state| {
            state.status = SyncStatus::Error;
            state.progress = None;
            state.error = Some(message.to_string());
        })
        .await;
    }

    /// Resets every errored receipt back to pending and clears messages.
    pub async fn clear_errors(&self) {
        let snapshot = {
            let mut states = self.states.write().await;
            for state in states.values_mut() {
                if state.status == SyncStatus::Error {
                    state.status = SyncStatus::Pending;
                    state.error = None;
                }
            }
            states.clone()
        };
        self.persist(&snapshot).await;
    }

    /// Inserts or replaces a receipt's state wholesale.
    pub async fn upsert(&self, state: ReceiptSyncState) {
        let snapshot = {
            let mut states = self.states.write().await;
            states.insert(state.receipt_id.clone(), state);
            states.clone()
        };
        self.persist(&snapshot).await;
    }

    /// Evicts a receipt's state entirely (e.g. the receipt was deleted).
    pub async fn remove(&self, receipt_id: &str) -> Option<ReceiptSyncState> {
        let (removed, snapshot) = {
            let mut states = self.states.write().await;
            let removed = states.remove(receipt_id);
            (removed, states.clone())
        };
        if removed.is_some() {
            self.persist(&snapshot).await;
        }
        removed
    }

    /// Applies `patch` to the receipt's entry, creating it lazily.
    async fn update(&self, receipt_id: &str, patch: impl FnOnce(&mut ReceiptSyncState)) {
        let snapshot = {
            let mut states = self.states.write().await;
            let state = states
                .entry(receipt_id.to_string())
                .or_insert_with(|| ReceiptSyncState::synced(receipt_id));
            patch(state);
            states.clone()
        };
        self.persist(&snapshot).await;
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Best-effort full-snapshot write, entries as an array of pairs.
    async fn persist(&self, snapshot: &HashMap<String, ReceiptSyncState>) {
        let entries: Vec<(&String, &ReceiptSyncState)> = snapshot.iter().collect();
        let serialized = match serde_json::to_string(&entries) {
            Ok(s) => s,
            Err(e) => {
                warn!(?e, "Failed to serialize receipt sync states");
                return;
            }
        };

        if let Err(e) = self.storage.set(RECEIPT_SYNC_STATES_KEY, &serialized).await {
            warn!(?e, "Failed to persist receipt sync states");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn table() -> ReceiptStateTable {
        ReceiptStateTable::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_unknown_receipt_has_no_entry() {
        let states = table();
        assert!(states.get("r1").await.is_none());
        assert!(states.is_empty().await);
    }

    #[tokio::test]
    async fn test_lazy_creation_and_transitions() {
        let states = table();

        states.mark_syncing("r1", 0).await;
        let state = states.get("r1").await.unwrap();
        assert_eq!(state.status, SyncStatus::Syncing);
        assert_eq!(state.progress, Some(0));

        states.mark_synced("r1").await;
        let state = states.get("r1").await.unwrap();
        assert_eq!(state.status, SyncStatus::Synced);
        assert!(state.progress.is_none());
        assert!(state.last_synced_at.is_some());
    }

    #[tokio::test]
    async fn test_error_and_clear() {
        let states = table();
        states.mark_error("r1", "conflict").await;
        states.mark_synced("r2").await;

        let state = states.get("r1").await.unwrap();
        assert_eq!(state.status, SyncStatus::Error);
        assert_eq!(state.error.as_deref(), Some("conflict"));

        states.clear_errors().await;
        let state = states.get("r1").await.unwrap();
        assert_eq!(state.status, SyncStatus::Pending);
        assert!(state.error.is_none());

        // Non-error entries are untouched
        assert_eq!(states.get("r2").await.unwrap().status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn test_upsert_replaces_wholesale() {
        let states = table();
        states.mark_error("r1", "conflict").await;

        states.upsert(ReceiptSyncState::synced("r1")).await;
        let state = states.get("r1").await.unwrap();
        assert_eq!(state.status, SyncStatus::Synced);
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_remove_evicts_entry() {
        let states = table();
        states.mark_offline("r1").await;
        assert!(states.remove("r1").await.is_some());
        assert!(states.get("r1").await.is_none());
        assert!(states.remove("r1").await.is_none());
    }

    #[tokio::test]
    async fn test_persistence_round_trip() {
        let storage: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let states = ReceiptStateTable::new(storage.clone());

        states.mark_error("r1", "remote down").await;
        states.mark_synced("r2").await;

        let reloaded = ReceiptStateTable::load(storage).await;
        assert_eq!(reloaded.len().await, 2);
        assert_eq!(
            reloaded.get("r1").await.unwrap().error.as_deref(),
            Some("remote down")
        );
        assert_eq!(reloaded.get("r2").await.unwrap().status, SyncStatus::Synced);
    }
}
