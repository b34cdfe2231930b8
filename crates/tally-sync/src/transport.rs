//! # Remote Sync Transport
//!
//! The remote API seam. There is no real backend: the only implementation
//! simulates a network call with a timer and configurable failure, which is
//! exactly how the app mocks sync. A real client (HTTP, gRPC, ...) would
//! implement [`RemoteSync`] and define request contracts per operation kind.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use tally_core::SyncQueueItem;

use crate::config::TransportSettings;
use crate::error::{SyncError, SyncResult};

// =============================================================================
// RemoteSync Trait
// =============================================================================

/// One-item push to the remote sync API.
///
/// A failed push must leave no remote side effects the caller has to undo;
/// the engine retries the same item on a later drain pass.
#[async_trait]
pub trait RemoteSync: Send + Sync {
    /// Pushes a single queue item. Resolves after the (simulated) network
    /// round trip.
    async fn push(&self, item: &SyncQueueItem) -> SyncResult<()>;
}

// =============================================================================
// Simulated Remote
// =============================================================================

/// Timer-backed stand-in for the remote sync API.
///
/// Failure can be injected three ways, checked in this order:
/// 1. `fail_next(n)` - the next n pushes fail, whatever the item
/// 2. `fail_receipt(id)` / `fail_item(id)` - scripted one-shot failures
/// 3. `failure_rate` - random failure probability from config
pub struct SimulatedRemote {
    /// Simulated per-item network delay.
    latency: Duration,

    /// Random failure probability, `0.0..=1.0`.
    failure_rate: f64,

    /// Countdown of unconditional failures.
    fail_next: AtomicU32,

    /// Receipt ids whose next push fails.
    fail_receipts: Mutex<HashSet<String>>,

    /// Queue item ids whose next push fails.
    fail_items: Mutex<HashSet<String>>,
}

impl SimulatedRemote {
    /// Creates a remote with the given latency and no failures.
    pub fn new(latency: Duration) -> Self {
        SimulatedRemote {
            latency,
            failure_rate: 0.0,
            fail_next: AtomicU32::new(0),
            fail_receipts: Mutex::new(HashSet::new()),
            fail_items: Mutex::new(HashSet::new()),
        }
    }

    /// Creates a remote from transport config (latency + failure rate).
    pub fn from_settings(settings: &TransportSettings) -> Self {
        SimulatedRemote {
            latency: Duration::from_millis(settings.latency_ms),
            failure_rate: settings.failure_rate,
            fail_next: AtomicU32::new(0),
            fail_receipts: Mutex::new(HashSet::new()),
            fail_items: Mutex::new(HashSet::new()),
        }
    }

    /// Makes the next `n` pushes fail unconditionally.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Makes the next push for this receipt fail (one-shot).
    pub fn fail_receipt(&self, receipt_id: impl Into<String>) {
        self.fail_receipts
            .lock()
            .expect("fail set poisoned")
            .insert(receipt_id.into());
    }

    /// Makes the next push of this queue item fail (one-shot).
    pub fn fail_item(&self, item_id: impl Into<String>) {
        self.fail_items
            .lock()
            .expect("fail set poisoned")
            .insert(item_id.into());
    }

    fn scripted_failure(&self, item: &SyncQueueItem) -> bool {
        if self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return true;
        }

        if self
            .fail_items
            .lock()
            .expect("fail set poisoned")
            .remove(&item.id)
        {
            return true;
        }

        if let Some(ref receipt_id) = item.receipt_id {
            if self
                .fail_receipts
                .lock()
                .expect("fail set poisoned")
                .remove(receipt_id)
            {
                return true;
            }
        }

        false
    }
}

#[async_trait]
impl RemoteSync for SimulatedRemote {
    async fn push(&self, item: &SyncQueueItem) -> SyncResult<()> {
        // The "network": a timer
        tokio::time::sleep(self.latency).await;

        if self.scripted_failure(item) {
            debug!(id = %item.id, "Simulated remote: scripted failure");
            return Err(SyncError::RemoteRejected {
                id: item.id.clone(),
                reason: "simulated failure".into(),
            });
        }

        if self.failure_rate > 0.0 && rand::random::<f64>() < self.failure_rate {
            debug!(id = %item.id, "Simulated remote: random failure");
            return Err(SyncError::RemoteUnavailable("simulated outage".into()));
        }

        debug!(id = %item.id, kind = %item.kind, "Simulated remote: push ok");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tally_core::{OperationKind, Priority};

    fn item(receipt_id: &str) -> SyncQueueItem {
        SyncQueueItem::new(
            OperationKind::Receipt,
            Some(receipt_id.into()),
            json!({}),
            Priority::Normal,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_succeeds_by_default() {
        let remote = SimulatedRemote::new(Duration::from_millis(500));
        assert!(remote.push(&item("r1")).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_receipt_is_one_shot() {
        let remote = SimulatedRemote::new(Duration::from_millis(10));
        remote.fail_receipt("r1");

        assert!(remote.push(&item("r1")).await.is_err());
        // Second attempt for the same receipt succeeds
        assert!(remote.push(&item("r1")).await.is_ok());
        // Other receipts are unaffected
        assert!(remote.push(&item("r2")).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_next_counts_down() {
        let remote = SimulatedRemote::new(Duration::from_millis(10));
        remote.fail_next(2);

        assert!(remote.push(&item("a")).await.is_err());
        assert!(remote.push(&item("b")).await.is_err());
        assert!(remote.push(&item("c")).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_rate_extremes() {
        let always = SimulatedRemote::from_settings(&TransportSettings {
            latency_ms: 1,
            failure_rate: 1.0,
        });
        assert!(always.push(&item("r1")).await.is_err());

        let never = SimulatedRemote::from_settings(&TransportSettings {
            latency_ms: 1,
            failure_rate: 0.0,
        });
        assert!(never.push(&item("r1")).await.is_ok());
    }
}
