//! # Sync Engine
//!
//! Drains pending queue items when online, updating state projections and
//! emitting lifecycle events.
//!
//! ## Drain Pass
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         One Drain Pass                                  │
//! │                                                                         │
//! │  drain()                                                                │
//! │    │                                                                    │
//! │    ├─ offline? ──────────────► return (no-op, nothing touched)         │
//! │    ├─ already draining? ─────► return (idempotent, single-flight)      │
//! │    │                                                                    │
//! │    ▼                                                                    │
//! │  snapshot list_drainable()  (FIFO, pending + failed; enqueues during    │
//! │    │                         the pass wait for the NEXT pass)           │
//! │    ▼                                                                    │
//! │  global status ► Syncing, progress {total, 0, 0, 0}, emit Started      │
//! │    │                                                                    │
//! │    ▼                                                                    │
//! │  for each item, SEQUENTIALLY:                                           │
//! │    cancel requested? ──► stop, leave the rest pending                  │
//! │    push to remote                                                       │
//! │      ok:   dequeue, completed += 1, emit Completed                     │
//! │      err:  mark_failed (retries += 1), failed += 1, emit Failed        │
//! │    │                                                                    │
//! │    ▼                                                                    │
//! │  global status ► Synced, last_synced_at = now, progress cleared        │
//! │  items_to_sync ► remaining queue length                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A single item's failure never aborts the pass. No backoff and no per-item
//! timeout exist; every failed item is retried on the next pass, bounded only
//! by the optional `max_retries` ceiling (0 = unlimited).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use tally_core::{GlobalSyncState, NetworkStatus, SyncProgress, SyncStatus};

use crate::events::{SyncEventBus, SyncEventKind};
use crate::queue::SyncQueueStore;
use crate::states::ReceiptStateTable;
use crate::transport::RemoteSync;

// =============================================================================
// Drain Report
// =============================================================================

/// Summary of one `drain()` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Whether a pass actually executed (false when offline or when
    /// another pass was already in flight).
    pub ran: bool,

    /// Items snapshotted at the start of the pass.
    pub total: usize,

    /// Items pushed successfully.
    pub completed: usize,

    /// Items that failed and stay queued.
    pub failed: usize,

    /// Items skipped for exceeding the retry ceiling.
    pub skipped: usize,

    /// Whether the pass stopped early on a cancel request.
    pub cancelled: bool,
}

impl DrainReport {
    fn not_run() -> Self {
        DrainReport::default()
    }
}

// =============================================================================
// Sync Engine
// =============================================================================

/// Drives drain passes over the queue and owns the observable sync state.
pub struct SyncEngine {
    /// Source of truth for pending work.
    queue: Arc<SyncQueueStore>,

    /// Per-receipt projections, updated as a side effect of processing.
    states: Arc<ReceiptStateTable>,

    /// Lifecycle event fan-out.
    bus: Arc<SyncEventBus>,

    /// Remote sync API (simulated).
    remote: Arc<dyn RemoteSync>,

    /// Current connectivity, fed by the network monitor.
    network_rx: watch::Receiver<NetworkStatus>,

    /// Retry ceiling; 0 means unlimited.
    max_retries: u32,

    /// Single-flight guard: exactly one drain pass at a time.
    draining: AtomicBool,

    /// Cancellation token checked between items.
    cancel_requested: AtomicBool,

    /// Observable global sync state.
    global_tx: watch::Sender<GlobalSyncState>,

    /// Observable progress; `None` outside a pass.
    progress_tx: watch::Sender<Option<SyncProgress>>,
}

impl SyncEngine {
    /// Creates an engine over the given collaborators.
    pub fn new(
        queue: Arc<SyncQueueStore>,
        states: Arc<ReceiptStateTable>,
        bus: Arc<SyncEventBus>,
        remote: Arc<dyn RemoteSync>,
        network_rx: watch::Receiver<NetworkStatus>,
        max_retries: u32,
    ) -> Self {
        let (global_tx, _) = watch::channel(GlobalSyncState::default());
        let (progress_tx, _) = watch::channel(None);

        SyncEngine {
            queue,
            states,
            bus,
            remote,
            network_rx,
            max_retries,
            draining: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
            global_tx,
            progress_tx,
        }
    }

    // =========================================================================
    // Observability
    // =========================================================================

    /// Current global sync state.
    pub fn global_state(&self) -> GlobalSyncState {
        self.global_tx.borrow().clone()
    }

    /// Watch channel for global sync state changes.
    pub fn watch_global(&self) -> watch::Receiver<GlobalSyncState> {
        self.global_tx.subscribe()
    }

    /// Progress of the in-flight pass, if one is running.
    pub fn progress(&self) -> Option<SyncProgress> {
        self.progress_tx.borrow().clone()
    }

    /// Watch channel for progress updates.
    pub fn watch_progress(&self) -> watch::Receiver<Option<SyncProgress>> {
        self.progress_tx.subscribe()
    }

    /// Whether the device is currently online.
    pub fn is_online(&self) -> bool {
        self.network_rx.borrow().is_online()
    }

    /// Whether a drain pass is currently in flight.
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Queue Coupling
    // =========================================================================

    /// Refreshes the global projection after an enqueue: status goes to
    /// Pending and the item count mirrors the queue length.
    pub async fn note_enqueued(&self) {
        let len = self.queue.len().await;
        self.global_tx.send_modify(|global| {
            global.status = SyncStatus::Pending;
            global.items_to_sync = len;
        });
    }

    /// Requests that the in-flight pass stop before its next item.
    ///
    /// Items already pushed stay pushed; the rest remain pending. A no-op
    /// when no pass is running.
    pub fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::SeqCst);
    }

    // =========================================================================
    // Drain
    // =========================================================================

    /// Attempts one drain pass. Idempotent: a no-op returning
    /// `ran == false` when offline or when a pass is already in flight.
    /// Never returns an error; per-item failures land in the report,
    /// the queue, and the event bus.
    pub async fn drain(&self) -> DrainReport {
        if !self.is_online() {
            debug!("Drain skipped: offline");
            return DrainReport::not_run();
        }

        // Single-flight: only the caller that wins the flag runs the pass
        if self
            .draining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Drain skipped: pass already in flight");
            return DrainReport::not_run();
        }

        let report = self.run_pass().await;
        self.draining.store(false, Ordering::SeqCst);
        report
    }

    async fn run_pass(&self) -> DrainReport {
        self.cancel_requested.store(false, Ordering::SeqCst);

        let pending = self.queue.list_drainable().await;

        // Retry ceiling: items at or over the limit are skipped, not dropped
        let (workable, over_limit): (Vec<_>, Vec<_>) = if self.max_retries > 0 {
            pending
                .into_iter()
                .partition(|item| item.retries < self.max_retries)
        } else {
            (pending, Vec::new())
        };

        for item in &over_limit {
            warn!(
                id = %item.id,
                retries = item.retries,
                "Skipping item that exceeded max retry attempts"
            );
        }

        let total = workable.len();
        let mut report = DrainReport {
            ran: true,
            total,
            skipped: over_limit.len(),
            ..DrainReport::default()
        };

        if total == 0 {
            debug!("Drain pass: nothing pending");
            return report;
        }

        info!(total, "Starting drain pass");
        self.global_tx
            .send_modify(|global| global.status = SyncStatus::Syncing);

        let mut progress = SyncProgress::start(total);
        self.progress_tx.send_replace(Some(progress.clone()));
        self.bus.emit(SyncEventKind::Started { total });

        for item in workable {
            if self.cancel_requested.load(Ordering::SeqCst) {
                info!(
                    remaining = total - report.completed - report.failed,
                    "Drain pass cancelled, leaving remaining items pending"
                );
                report.cancelled = true;
                break;
            }

            self.queue.mark_processing(&item.id).await;
            progress.in_progress = 1;
            self.progress_tx.send_replace(Some(progress.clone()));

            if let Some(receipt_id) = item.receipt_id.as_deref() {
                self.states.mark_syncing(receipt_id, progress.percent()).await;
            }

            match self.remote.push(&item).await {
                Ok(()) => {
                    self.queue.dequeue(&item.id).await;
                    report.completed += 1;
                    progress.completed += 1;

                    if let Some(receipt_id) = item.receipt_id.as_deref() {
                        self.states.mark_synced(receipt_id).await;
                    }
                    self.bus.emit(SyncEventKind::Completed { item });
                }
                Err(e) => {
                    let message = e.to_string();
                    self.queue.mark_failed(&item.id, &message).await;
                    report.failed += 1;
                    progress.failed += 1;

                    if let Some(receipt_id) = item.receipt_id.as_deref() {
                        self.states.mark_error(receipt_id, &message).await;
                    }
                    warn!(id = %item.id, error = %message, "Sync item failed");

                    // Emit the post-failure item so listeners see the
                    // incremented retry count
                    let failed_item = self.queue.get(&item.id).await.unwrap_or(item);
                    self.bus.emit(SyncEventKind::Failed {
                        item: failed_item,
                        error: message,
                    });
                }
            }

            progress.in_progress = 0;
            self.progress_tx.send_replace(Some(progress.clone()));
        }

        let remaining = self.queue.len().await;
        let cancelled_with_work_left = report.cancelled && remaining > 0;
        self.global_tx.send_modify(|global| {
            global.items_to_sync = remaining;
            if cancelled_with_work_left {
                global.status = SyncStatus::Pending;
            } else {
                global.status = SyncStatus::Synced;
                global.last_synced_at = Some(Utc::now());
            }
        });
        self.progress_tx.send_replace(None);

        info!(
            completed = report.completed,
            failed = report.failed,
            remaining,
            "Drain pass finished"
        );
        report
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::transport::SimulatedRemote;
    use serde_json::json;
    use std::time::Duration;
    use tally_core::{ItemStatus, OperationKind, Priority};

    struct Fixture {
        engine: Arc<SyncEngine>,
        queue: Arc<SyncQueueStore>,
        states: Arc<ReceiptStateTable>,
        remote: Arc<SimulatedRemote>,
        network_tx: watch::Sender<NetworkStatus>,
    }

    fn fixture(max_retries: u32) -> Fixture {
        let storage = Arc::new(MemoryStore::new());
        let queue = Arc::new(SyncQueueStore::new(storage.clone()));
        let states = Arc::new(ReceiptStateTable::new(storage));
        let bus = Arc::new(SyncEventBus::new());
        let remote = Arc::new(SimulatedRemote::new(Duration::from_millis(50)));
        let (network_tx, network_rx) = watch::channel(NetworkStatus::online());

        let engine = Arc::new(SyncEngine::new(
            queue.clone(),
            states.clone(),
            bus,
            remote.clone(),
            network_rx,
            max_retries,
        ));

        Fixture {
            engine,
            queue,
            states,
            remote,
            network_tx,
        }
    }

    async fn enqueue(fx: &Fixture, receipt_id: &str) -> String {
        fx.queue
            .enqueue(
                OperationKind::Receipt,
                Some(receipt_id.into()),
                json!({"receipt_id": receipt_id}),
                Priority::Normal,
            )
            .await
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_empties_queue_on_success() {
        let fx = fixture(0);
        for receipt in ["r1", "r2", "r3"] {
            enqueue(&fx, receipt).await;
        }

        let report = fx.engine.drain().await;
        assert!(report.ran);
        assert_eq!(report.total, 3);
        assert_eq!(report.completed, 3);
        assert_eq!(report.failed, 0);

        assert!(fx.queue.is_empty().await);
        let global = fx.engine.global_state();
        assert_eq!(global.status, SyncStatus::Synced);
        assert_eq!(global.items_to_sync, 0);
        assert!(global.last_synced_at.is_some());
        assert!(fx.engine.progress().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_item_stays_with_one_retry() {
        let fx = fixture(0);
        enqueue(&fx, "r1").await;
        let b = enqueue(&fx, "r2").await;
        enqueue(&fx, "r3").await;
        fx.remote.fail_receipt("r2");

        let report = fx.engine.drain().await;
        assert_eq!(report.completed, 2);
        assert_eq!(report.failed, 1);

        let snapshot = fx.queue.snapshot().await;
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, b);
        assert_eq!(snapshot[0].status, ItemStatus::Failed);
        assert_eq!(snapshot[0].retries, 1);

        // The pass still completes: global ends Synced, count mirrors queue
        let global = fx.engine.global_state();
        assert_eq!(global.status, SyncStatus::Synced);
        assert_eq!(global.items_to_sync, 1);

        // Receipt projections reflect the outcome
        assert_eq!(
            fx.states.get("r1").await.unwrap().status,
            SyncStatus::Synced
        );
        let r2 = fx.states.get("r2").await.unwrap();
        assert_eq!(r2.status, SyncStatus::Error);
        assert!(r2.error.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_is_noop_offline() {
        let fx = fixture(0);
        enqueue(&fx, "r1").await;
        fx.network_tx.send_replace(NetworkStatus::offline());

        let report = fx.engine.drain().await;
        assert!(!report.ran);
        assert_eq!(fx.queue.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_drains_single_flight() {
        let fx = fixture(0);
        enqueue(&fx, "r1").await;
        enqueue(&fx, "r2").await;

        let first = {
            let engine = fx.engine.clone();
            tokio::spawn(async move { engine.drain().await })
        };
        // Let the first pass reach its simulated network call
        tokio::task::yield_now().await;

        let second = fx.engine.drain().await;
        assert!(!second.ran);

        let first = first.await.unwrap();
        assert!(first.ran);
        assert_eq!(first.completed, 2);
        assert!(fx.queue.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_items_retried_on_next_pass() {
        let fx = fixture(0);
        let id = enqueue(&fx, "r1").await;
        fx.remote.fail_receipt("r1");

        let report = fx.engine.drain().await;
        assert_eq!(report.failed, 1);
        assert_eq!(fx.queue.get(&id).await.unwrap().retries, 1);

        // The scripted failure was one-shot; the next pass picks the
        // failed item up again and succeeds
        let report = fx.engine.drain().await;
        assert_eq!(report.total, 1);
        assert_eq!(report.completed, 1);
        assert!(fx.queue.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_ceiling_skips_exhausted_items() {
        let fx = fixture(2);
        let exhausted = enqueue(&fx, "r1").await;
        fx.queue.mark_failed(&exhausted, "1").await;
        fx.queue.mark_failed(&exhausted, "2").await;
        let fresh = enqueue(&fx, "r2").await;

        let report = fx.engine.drain().await;
        assert_eq!(report.total, 1);
        assert_eq!(report.completed, 1);
        assert_eq!(report.skipped, 1);

        // The exhausted item is skipped, not dropped
        assert_eq!(fx.queue.get(&exhausted).await.unwrap().retries, 2);
        assert!(fx.queue.get(&fresh).await.is_none());

        // A reset zeroes retries, making the item workable again
        fx.queue.reset_failed().await;
        let report = fx.engine.drain().await;
        assert_eq!(report.total, 1);
        assert_eq!(report.completed, 1);
        assert!(fx.queue.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_between_items() {
        let fx = fixture(0);
        for receipt in ["r1", "r2", "r3"] {
            enqueue(&fx, receipt).await;
        }

        let first = {
            let engine = fx.engine.clone();
            tokio::spawn(async move { engine.drain().await })
        };
        // First item in flight; request cancellation before the second
        tokio::task::yield_now().await;
        fx.engine.request_cancel();

        let report = first.await.unwrap();
        assert!(report.cancelled);
        assert_eq!(report.completed, 1);

        // Remaining items are untouched and still pending
        assert_eq!(fx.queue.list_pending().await.len(), 2);
        assert_eq!(fx.engine.global_state().status, SyncStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_during_drain_waits_for_next_pass() {
        let fx = fixture(0);
        enqueue(&fx, "r1").await;

        let first = {
            let engine = fx.engine.clone();
            tokio::spawn(async move { engine.drain().await })
        };
        tokio::task::yield_now().await;

        // Arrives mid-pass: safe, but not picked up by the running pass
        enqueue(&fx, "r2").await;

        let report = first.await.unwrap();
        assert_eq!(report.total, 1);
        assert_eq!(fx.queue.len().await, 1);

        let report = fx.engine.drain().await;
        assert_eq!(report.total, 1);
        assert!(fx.queue.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_note_enqueued_updates_global() {
        let fx = fixture(0);
        enqueue(&fx, "r1").await;
        fx.engine.note_enqueued().await;

        let global = fx.engine.global_state();
        assert_eq!(global.status, SyncStatus::Pending);
        assert_eq!(global.items_to_sync, 1);
    }
}
