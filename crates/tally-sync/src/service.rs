//! # Sync Service
//!
//! The embedder-facing facade. Wires the queue, state table, event bus,
//! engine, and network monitor together and runs the background loop that
//! keeps the queue drained.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SyncService                                    │
//! │                                                                         │
//! │   sync_receipt / sync_update / sync_delete                              │
//! │        │  enqueue, then drain immediately when online                  │
//! │        ▼                                                                │
//! │   ┌───────────┐    ┌────────────┐    ┌─────────────┐                   │
//! │   │ QueueStore│◄───│ SyncEngine │───►│ RemoteSync  │                   │
//! │   └───────────┘    └─────┬──────┘    └─────────────┘                   │
//! │                          │ projections + events                        │
//! │              ┌───────────┼───────────────┐                             │
//! │              ▼           ▼               ▼                             │
//! │        StateTable   watch channels   SyncEventBus                      │
//! │                                                                         │
//! │   BACKGROUND LOOP (one task):                                          │
//! │   • periodic tick while online  ─► drain                               │
//! │   • offline ─► online edge      ─► drain (the moment connectivity      │
//! │                                     returns, not the next tick)        │
//! │   • shutdown signal             ─► exit                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use tally_core::{
    ConnectionKind, GlobalSyncState, NetworkStatus, OperationKind, Priority, Receipt,
    ReceiptSyncState, SyncProgress,
};

use crate::config::SyncConfig;
use crate::engine::{DrainReport, SyncEngine};
use crate::error::{SyncError, SyncResult};
use crate::events::{SyncEvent, SyncEventBus, SyncEventKind, Subscription};
use crate::network::{Connectivity, ManualConnectivity, NetworkMonitor, NetworkMonitorHandle};
use crate::queue::SyncQueueStore;
use crate::states::ReceiptStateTable;
use crate::storage::{FileStore, KeyValueStore, MemoryStore};
use crate::transport::{RemoteSync, SimulatedRemote};

// =============================================================================
// Sync Outcome
// =============================================================================

/// What happened to a sync request.
#[derive(Debug, Clone)]
pub enum SyncOutcome {
    /// A drain pass ran to completion. Per-item failures, if any, are in
    /// the report and on the event bus.
    Completed { report: DrainReport },

    /// Work is queued but was not drained now (offline, or a pass was
    /// already in flight). `pending` is the current queue length.
    Queued { pending: usize },

    /// The request could not run at all.
    Unavailable { message: String },
}

// =============================================================================
// Offline Capability
// =============================================================================

/// Snapshot answering "what can the app do right now?".
///
/// Capture always works: receipts save locally and queue for sync, so
/// `can_capture` is unconditionally true. It exists so UI code asks the
/// service instead of hard-coding the assumption.
#[derive(Debug, Clone)]
pub struct OfflineCapability {
    pub is_offline: bool,
    pub network_kind: ConnectionKind,
    pub can_capture: bool,
    pub has_offline_items: bool,
    pub offline_items_count: usize,
    pub failed_items: usize,
    pub last_synced_at: Option<chrono::DateTime<chrono::Utc>>,
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`SyncService`]. Collaborators left unset get the
/// config-driven defaults.
pub struct SyncServiceBuilder {
    config: SyncConfig,
    storage: Option<Arc<dyn KeyValueStore>>,
    remote: Option<Arc<dyn RemoteSync>>,
    connectivity: Option<Arc<dyn Connectivity>>,
}

impl SyncServiceBuilder {
    pub fn new(config: SyncConfig) -> Self {
        SyncServiceBuilder {
            config,
            storage: None,
            remote: None,
            connectivity: None,
        }
    }

    /// Overrides the persistence collaborator (default: file store in the
    /// configured data dir, falling back to in-memory).
    pub fn storage(mut self, storage: Arc<dyn KeyValueStore>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Overrides the remote (default: simulated remote from config).
    pub fn remote(mut self, remote: Arc<dyn RemoteSync>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Overrides the connectivity source (default: manual, starting online).
    pub fn connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = Some(connectivity);
        self
    }

    /// Restores persisted state, spawns the monitor and the background
    /// loop, and returns the running service.
    pub async fn build(self) -> SyncResult<SyncService> {
        self.config.validate()?;
        let config = self.config;

        let storage = match self.storage {
            Some(storage) => storage,
            None => match config.storage.resolve_data_dir() {
                Some(dir) => Arc::new(FileStore::open(dir)?) as Arc<dyn KeyValueStore>,
                None => {
                    warn!("No data directory available, sync state will not persist");
                    Arc::new(MemoryStore::new())
                }
            },
        };

        let queue = Arc::new(SyncQueueStore::load(storage.clone()).await);
        let states = Arc::new(ReceiptStateTable::load(storage).await);
        let bus = Arc::new(SyncEventBus::new());

        let remote = self
            .remote
            .unwrap_or_else(|| Arc::new(SimulatedRemote::from_settings(&config.transport)));
        let connectivity = self
            .connectivity
            .unwrap_or_else(|| Arc::new(ManualConnectivity::new()));

        let monitor = NetworkMonitor::spawn(connectivity, config.sync_interval()).await;

        let engine = Arc::new(SyncEngine::new(
            queue.clone(),
            states.clone(),
            bus.clone(),
            remote,
            monitor.watch(),
            config.sync.max_retries,
        ));

        // Restored work shows up as pending immediately
        if !queue.is_empty().await {
            engine.note_enqueued().await;
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let task = tokio::spawn(run_loop(
            engine.clone(),
            monitor.watch(),
            config.sync_interval(),
            shutdown_rx,
        ));

        info!(
            interval_secs = config.sync.interval_secs,
            max_retries = config.sync.max_retries,
            "Sync service started"
        );

        Ok(SyncService {
            queue,
            states,
            bus,
            engine,
            monitor,
            shutdown_tx,
            task,
        })
    }
}

/// Periodic drain plus edge-triggered drain on reconnect.
async fn run_loop(
    engine: Arc<SyncEngine>,
    mut network_rx: watch::Receiver<NetworkStatus>,
    interval: std::time::Duration,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    let mut tick = tokio::time::interval(interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut was_online = network_rx.borrow().is_online();

    loop {
        tokio::select! {
            _ = tick.tick() => {
                if engine.is_online() {
                    engine.drain().await;
                }
            }
            changed = network_rx.changed() => {
                if changed.is_err() {
                    // Monitor gone; nothing left to react to
                    break;
                }
                let now_online = network_rx.borrow().is_online();
                if !was_online && now_online {
                    info!("Back online, draining sync queue");
                    engine.drain().await;
                }
                was_online = now_online;
            }
            _ = shutdown_rx.recv() => {
                debug!("Sync loop shutting down");
                break;
            }
        }
    }
}

// =============================================================================
// Sync Service
// =============================================================================

/// Running sync subsystem: queue, projections, events, and the background
/// drain loop, behind one handle.
pub struct SyncService {
    queue: Arc<SyncQueueStore>,
    states: Arc<ReceiptStateTable>,
    bus: Arc<SyncEventBus>,
    engine: Arc<SyncEngine>,
    monitor: NetworkMonitorHandle,
    shutdown_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl SyncService {
    /// Builder with the given config.
    pub fn builder(config: SyncConfig) -> SyncServiceBuilder {
        SyncServiceBuilder::new(config)
    }

    // =========================================================================
    // Submitting Work
    // =========================================================================

    /// Queues a receipt create and syncs it immediately when online.
    pub async fn sync_receipt(&self, receipt: &Receipt) -> SyncResult<SyncOutcome> {
        receipt
            .validate()
            .map_err(|e| SyncError::InvalidPayload(e.to_string()))?;
        let payload = serde_json::to_value(receipt)?;
        self.submit(OperationKind::Receipt, Some(receipt.id.clone()), payload)
            .await
    }

    /// Queues a receipt update and syncs it immediately when online.
    pub async fn sync_update(&self, receipt: &Receipt) -> SyncResult<SyncOutcome> {
        receipt
            .validate()
            .map_err(|e| SyncError::InvalidPayload(e.to_string()))?;
        let payload = serde_json::to_value(receipt)?;
        self.submit(OperationKind::Update, Some(receipt.id.clone()), payload)
            .await
    }

    /// Queues a receipt delete and syncs it immediately when online.
    pub async fn sync_delete(&self, receipt_id: &str) -> SyncResult<SyncOutcome> {
        let payload = serde_json::json!({ "id": receipt_id });
        self.submit(OperationKind::Delete, Some(receipt_id.to_string()), payload)
            .await
    }

    async fn submit(
        &self,
        kind: OperationKind,
        receipt_id: Option<String>,
        payload: serde_json::Value,
    ) -> SyncResult<SyncOutcome> {
        let online = self.engine.is_online();
        // Online submissions expect immediate sync, so their items carry
        // the high (still advisory) priority hint
        let priority = if online {
            Priority::High
        } else {
            Priority::Normal
        };
        let id = self
            .queue
            .enqueue(kind, receipt_id.clone(), payload, priority)
            .await;
        self.engine.note_enqueued().await;

        if !online {
            debug!(id = %id, "Offline, operation queued for later sync");
            if let Some(ref receipt_id) = receipt_id {
                self.states.mark_offline(receipt_id).await;
            }
            return Ok(SyncOutcome::Queued {
                pending: self.queue.len().await,
            });
        }

        let report = self.engine.drain().await;
        if !report.ran {
            // A pass was already in flight; it will not see this item,
            // but the next tick will
            return Ok(SyncOutcome::Queued {
                pending: self.queue.len().await,
            });
        }
        Ok(SyncOutcome::Completed { report })
    }

    /// Drains everything pending right now.
    pub async fn sync_all(&self) -> SyncOutcome {
        if !self.engine.is_online() {
            return SyncOutcome::Unavailable {
                message: "Cannot sync while offline".into(),
            };
        }

        let report = self.engine.drain().await;
        if !report.ran {
            return SyncOutcome::Queued {
                pending: self.queue.len().await,
            };
        }
        SyncOutcome::Completed { report }
    }

    /// Resets failed items to pending, clears per-receipt errors, emits a
    /// `Retry` event per item, and drains when online.
    pub async fn retry_failed(&self) -> SyncOutcome {
        let reset = self.queue.reset_failed().await;
        for item_id in &reset {
            self.bus.emit(SyncEventKind::Retry {
                item_id: item_id.clone(),
            });
        }
        self.states.clear_errors().await;

        if reset.is_empty() {
            return SyncOutcome::Completed {
                report: DrainReport::default(),
            };
        }

        info!(count = reset.len(), "Retrying failed sync items");
        self.engine.note_enqueued().await;
        self.sync_all().await
    }

    /// Clears error state everywhere: failed queue items go back to
    /// pending (retries zeroed) and errored receipt projections reset.
    /// Does not trigger a drain; use [`retry_failed`](Self::retry_failed)
    /// for that.
    pub async fn clear_sync_errors(&self) {
        let reset = self.queue.reset_failed().await;
        self.states.clear_errors().await;
        if !reset.is_empty() {
            self.engine.note_enqueued().await;
        }
    }

    /// Asks the in-flight drain pass, if any, to stop before its next item.
    pub fn cancel_sync(&self) {
        self.engine.request_cancel();
    }

    // =========================================================================
    // Status Queries
    // =========================================================================

    /// Sync state for one receipt. Receipts the sync layer has never
    /// touched read as synced.
    pub async fn receipt_status(&self, receipt_id: &str) -> ReceiptSyncState {
        match self.states.get(receipt_id).await {
            Some(state) => state,
            None => ReceiptSyncState::synced(receipt_id),
        }
    }

    /// Current app-wide sync summary.
    pub fn global_state(&self) -> GlobalSyncState {
        self.engine.global_state()
    }

    /// Watch channel for global sync state changes.
    pub fn watch_global(&self) -> watch::Receiver<GlobalSyncState> {
        self.engine.watch_global()
    }

    /// Watch channel for drain progress (`None` outside a pass).
    pub fn watch_progress(&self) -> watch::Receiver<Option<SyncProgress>> {
        self.engine.watch_progress()
    }

    /// Latest connectivity snapshot.
    pub fn network_status(&self) -> NetworkStatus {
        self.monitor.status()
    }

    /// Watch channel for connectivity transitions.
    pub fn watch_network(&self) -> watch::Receiver<NetworkStatus> {
        self.monitor.watch()
    }

    /// Whether the device currently counts as online.
    pub fn is_online(&self) -> bool {
        self.monitor.is_online()
    }

    /// What the app can do right now, for gating UI affordances.
    pub async fn offline_capability(&self) -> OfflineCapability {
        let snapshot = self.queue.snapshot().await;
        let failed = snapshot.iter().filter(|item| item.is_failed()).count();
        let global = self.engine.global_state();
        let network = self.monitor.status();

        OfflineCapability {
            is_offline: !network.is_online(),
            network_kind: network.kind,
            can_capture: true,
            has_offline_items: !snapshot.is_empty(),
            offline_items_count: snapshot.len(),
            failed_items: failed,
            last_synced_at: global.last_synced_at,
        }
    }

    /// Registers a listener for sync lifecycle events.
    pub fn subscribe(&self, listener: impl Fn(&SyncEvent) + Send + Sync + 'static) -> Subscription {
        self.bus.subscribe(listener)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Stops the background loop and the network monitor.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
        self.monitor.shutdown().await;
        info!("Sync service stopped");
    }
}

// =============================================================================
// Tests
// =============================================================================
