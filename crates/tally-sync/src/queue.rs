//! # Sync Queue Store
//!
//! Durable, ordered record of the work the app still owes the backend.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Outbox Pattern Implementation                        │
//! │                                                                         │
//! │  LOCAL OPERATION (e.g., save receipt while offline)                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  enqueue(kind, receipt_id, payload, priority)                          │
//! │       │   appends { status: pending, retries: 0 } and persists         │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            BACKGROUND DRAIN PASS (SyncEngine)                   │   │
//! │  │                                                                 │   │
//! │  │  1. list_drainable() — FIFO, insertion order                   │   │
//! │  │  2. For each item:                                             │   │
//! │  │     a. Push to remote                                          │   │
//! │  │     b. On success: dequeue(id)                                 │   │
//! │  │     c. On failure: mark_failed(id, error) — retries += 1       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  KEY GUARANTEES:                                                       │
//! │  • FIFO: list_pending() preserves exact enqueue order                  │
//! │  • Failed items stay queued, eligible for the next pass                │
//! │  • Every mutation persists the full snapshot (fire-and-forget)         │
//! │  • Offline? No problem - items queue up until connectivity returns     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Persistence is best-effort: a storage failure is logged and the in-memory
//! queue keeps going with unpersisted changes.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use tally_core::{ItemStatus, OperationKind, Priority, SyncQueueItem};

use crate::storage::{KeyValueStore, SYNC_QUEUE_KEY};

// =============================================================================
// Sync Queue Store
// =============================================================================

/// Ordered, persisted collection of pending sync operations.
pub struct SyncQueueStore {
    /// Queue items in insertion order.
    items: RwLock<Vec<SyncQueueItem>>,

    /// Persistence collaborator.
    storage: Arc<dyn KeyValueStore>,
}

impl SyncQueueStore {
    /// Creates an empty store (nothing persisted yet).
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        SyncQueueStore {
            items: RwLock::new(Vec::new()),
            storage,
        }
    }

    /// Creates a store restored from the last persisted snapshot.
    ///
    /// Items found in `Processing` state are demoted to `Pending`: they were
    /// mid-drain when the process died and must not stay wedged.
    pub async fn load(storage: Arc<dyn KeyValueStore>) -> Self {
        let mut items: Vec<SyncQueueItem> = match storage.get(SYNC_QUEUE_KEY).await {
            Ok(Some(snapshot)) => serde_json::from_str(&snapshot).unwrap_or_else(|e| {
                warn!(?e, "Persisted sync queue is unreadable, starting empty");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(?e, "Failed to read persisted sync queue, starting empty");
                Vec::new()
            }
        };

        let mut demoted = 0usize;
        for item in &mut items {
            if item.status == ItemStatus::Processing {
                item.status = ItemStatus::Pending;
                demoted += 1;
            }
        }
        if demoted > 0 {
            warn!(demoted, "Demoted in-flight items back to pending after restart");
        }

        debug!(count = items.len(), "Restored sync queue");
        SyncQueueStore {
            items: RwLock::new(items),
            storage,
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Appends a new pending item and returns its generated id.
    pub async fn enqueue(
        &self,
        kind: OperationKind,
        receipt_id: Option<String>,
        payload: Value,
        priority: Priority,
    ) -> String {
        let item = SyncQueueItem::new(kind, receipt_id, payload, priority);
        let id = item.id.clone();

        let snapshot = {
            let mut items = self.items.write().await;
            items.push(item);
            items.clone()
        };

        debug!(id = %id, kind = %kind, "Enqueued sync item");
        self.persist(&snapshot).await;
        id
    }

    /// Removes an item by id unconditionally. Used on successful sync.
    pub async fn dequeue(&self, id: &str) -> Option<SyncQueueItem> {
        let (removed, snapshot) = {
            let mut items = self.items.write().await;
            let removed = items
                .iter()
                .position(|item| item.id == id)
                .map(|idx| items.remove(idx));
            (removed, items.clone())
        };

        if removed.is_some() {
            debug!(id = %id, "Dequeued sync item");
            self.persist(&snapshot).await;
        }
        removed
    }

    /// Records a failed attempt: retries += 1, status = Failed.
    ///
    /// The item stays in the queue, eligible for a future drain pass.
    pub async fn mark_failed(&self, id: &str, error: &str) -> Option<u32> {
        let (retries, snapshot) = {
            let mut items = self.items.write().await;
            let retries = items.iter_mut().find(|item| item.id == id).map(|item| {
                item.retries += 1;
                item.status = ItemStatus::Failed;
                item.last_error = Some(error.to_string());
                item.retries
            });
            (retries, items.clone())
        };

        if let Some(retries) = retries {
            debug!(id = %id, retries, error, "Marked sync item failed");
            self.persist(&snapshot).await;
        }
        retries
    }

    /// Flags an item as actively being drained.
    pub async fn mark_processing(&self, id: &str) {
        self.set_status(id, ItemStatus::Processing).await;
    }

    /// Returns an item to the pending state (undoes `mark_processing`).
    pub async fn mark_pending(&self, id: &str) {
        self.set_status(id, ItemStatus::Pending).await;
    }

    async fn set_status(&self, id: &str, status: ItemStatus) {
        let snapshot = {
            let mut items = self.items.write().await;
            if let Some(item) = items.iter_mut().find(|item| item.id == id) {
                item.status = status;
            }
            items.clone()
        };
        self.persist(&snapshot).await;
    }

    /// Resets all failed items to pending with zeroed retries.
    ///
    /// Returns the ids that were reset, in queue order.
    pub async fn reset_failed(&self) -> Vec<String> {
        let (reset, snapshot) = {
            let mut items = self.items.write().await;
            let mut reset = Vec::new();
            for item in items.iter_mut() {
                if item.status == ItemStatus::Failed {
                    item.status = ItemStatus::Pending;
                    item.retries = 0;
                    item.last_error = None;
                    reset.push(item.id.clone());
                }
            }
            (reset, items.clone())
        };

        if !reset.is_empty() {
            debug!(count = reset.len(), "Reset failed items to pending");
            self.persist(&snapshot).await;
        }
        reset
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Items with `status = Pending`, in exact insertion order.
    pub async fn list_pending(&self) -> Vec<SyncQueueItem> {
        self.items
            .read()
            .await
            .iter()
            .filter(|item| item.is_pending())
            .cloned()
            .collect()
    }

    /// Items eligible for a drain pass: pending or previously failed,
    /// in exact insertion order.
    pub async fn list_drainable(&self) -> Vec<SyncQueueItem> {
        self.items
            .read()
            .await
            .iter()
            .filter(|item| item.is_pending() || item.is_failed())
            .cloned()
            .collect()
    }

    /// Full snapshot in insertion order, regardless of status.
    pub async fn snapshot(&self) -> Vec<SyncQueueItem> {
        self.items.read().await.clone()
    }

    /// Looks up a single item by id.
    pub async fn get(&self, id: &str) -> Option<SyncQueueItem> {
        self.items
            .read()
            .await
            .iter()
            .find(|item| item.id == id)
            .cloned()
    }

    /// Total number of queued items (any status).
    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Persists the full collection. Best-effort: failures are logged and
    /// the in-memory state remains authoritative until the next write.
    async fn persist(&self, snapshot: &[SyncQueueItem]) {
        let serialized = match serde_json::to_string(snapshot) {
            Ok(s) => s,
            Err(e) => {
                warn!(?e, "Failed to serialize sync queue");
                return;
            }
        };

        if let Err(e) = self.storage.set(SYNC_QUEUE_KEY, &serialized).await {
            warn!(?e, "Failed to persist sync queue");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
