//! # Network Status Monitor
//!
//! Observes a connectivity source and publishes a normalized
//! [`NetworkStatus`] on a watch channel. Consumers read the latest status
//! cheaply or await transitions; the sync service drains the queue the
//! moment offline flips to online.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      NetworkMonitor Task                                │
//! │                                                                         │
//! │   Connectivity (trait) ──pushed events──► normalize ──changed?──►      │
//! │        ▲        └────────poll fallback───►            watch channel    │
//! │        │                                                     │          │
//! │   ManualConnectivity                              NetworkMonitorHandle  │
//! │   (tests, simulation)                             .status() .watch()    │
//! │                                                                         │
//! │   • Pushed transitions propagate immediately (edge-triggered);         │
//! │     the periodic poll only re-checks sources whose events can lag      │
//! │   • is_online = is_connected && (is_internet_reachable ?? true)        │
//! │     Unknown reachability is treated as reachable: better to attempt    │
//! │     a sync that fails than to sit on queued work while actually online │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use tally_core::NetworkStatus;

// =============================================================================
// Connectivity Source
// =============================================================================

/// Source of connectivity snapshots: a one-shot fetch plus an event
/// stream of pushed changes.
///
/// On a device this would wrap the platform connectivity API; here the
/// only implementation is [`ManualConnectivity`], flipped by hand.
#[async_trait]
pub trait Connectivity: Send + Sync {
    /// Returns the current connectivity snapshot.
    async fn check(&self) -> NetworkStatus;

    /// Event stream of status changes, delivered as they happen.
    fn subscribe(&self) -> watch::Receiver<NetworkStatus>;
}

/// Hand-driven connectivity source for tests and simulation.
///
/// `set*` pushes the new status to subscribers immediately, the way a
/// platform connectivity listener fires on a link change.
pub struct ManualConnectivity {
    status_tx: watch::Sender<NetworkStatus>,
}

impl ManualConnectivity {
    /// Starts out online (connected wifi).
    pub fn new() -> Self {
        Self::with_status(NetworkStatus::online())
    }

    /// Starts from the given status.
    pub fn with_status(status: NetworkStatus) -> Self {
        let (status_tx, _) = watch::channel(status);
        ManualConnectivity { status_tx }
    }

    /// Replaces the reported status and notifies subscribers.
    pub fn set(&self, status: NetworkStatus) {
        self.status_tx.send_replace(status);
    }

    /// Shorthand for flipping to a connected wifi status.
    pub fn set_online(&self) {
        self.set(NetworkStatus::online());
    }

    /// Shorthand for flipping to a fully disconnected status.
    pub fn set_offline(&self) {
        self.set(NetworkStatus::offline());
    }
}

impl Default for ManualConnectivity {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connectivity for ManualConnectivity {
    async fn check(&self) -> NetworkStatus {
        self.status_tx.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
        self.status_tx.subscribe()
    }
}

// =============================================================================
// Network Monitor
// =============================================================================

/// Background task observing a [`Connectivity`] source.
pub struct NetworkMonitor;

/// Handle to a running monitor. Dropping it does NOT stop the task;
/// call [`shutdown`](NetworkMonitorHandle::shutdown).
pub struct NetworkMonitorHandle {
    status_rx: watch::Receiver<NetworkStatus>,
    shutdown_tx: mpsc::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl NetworkMonitor {
    /// Spawns the monitor task. Pushed events from the source propagate
    /// immediately; `poll_interval` is a safety net re-check for sources
    /// whose event stream can miss transitions.
    pub async fn spawn(
        connectivity: Arc<dyn Connectivity>,
        poll_interval: Duration,
    ) -> NetworkMonitorHandle {
        let initial = connectivity.check().await;
        debug!(online = initial.is_online(), "Network monitor starting");

        let (status_tx, status_rx) = watch::channel(initial);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let task = tokio::spawn(async move {
            let mut events = connectivity.subscribe();
            let mut events_open = true;

            let mut poll = tokio::time::interval(poll_interval);
            poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick fires immediately; the initial check above
            // already covered it
            poll.tick().await;

            loop {
                tokio::select! {
                    changed = events.changed(), if events_open => {
                        match changed {
                            Ok(()) => {
                                let status = events.borrow_and_update().clone();
                                publish(&status_tx, status);
                            }
                            Err(_) => {
                                warn!("Connectivity event stream closed, polling only");
                                events_open = false;
                            }
                        }
                    }
                    _ = poll.tick() => {
                        let status = connectivity.check().await;
                        publish(&status_tx, status);
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Network monitor shutting down");
                        break;
                    }
                }
            }
        });

        NetworkMonitorHandle {
            status_rx,
            shutdown_tx,
            task,
        }
    }
}

/// Publishes only on change, logging online/offline transitions.
fn publish(status_tx: &watch::Sender<NetworkStatus>, status: NetworkStatus) {
    status_tx.send_if_modified(|current| {
        if *current == status {
            return false;
        }

        let was_online = current.is_online();
        let now_online = status.is_online();
        if was_online && !now_online {
            warn!(kind = ?status.kind, "Network connection lost");
        } else if !was_online && now_online {
            info!(kind = ?status.kind, "Network connection restored");
        } else {
            debug!(kind = ?status.kind, "Network details changed");
        }

        *current = status;
        true
    });
}

impl NetworkMonitorHandle {
    /// Latest published status.
    pub fn status(&self) -> NetworkStatus {
        self.status_rx.borrow().clone()
    }

    /// Whether the latest status counts as online.
    pub fn is_online(&self) -> bool {
        self.status_rx.borrow().is_online()
    }

    /// A fresh receiver for awaiting status transitions.
    pub fn watch(&self) -> watch::Receiver<NetworkStatus> {
        self.status_rx.clone()
    }

    /// Stops the monitor task and waits for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        let _ = self.task.await;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::ConnectionKind;

    #[tokio::test(start_paused = true)]
    async fn test_monitor_publishes_initial_status() {
        let connectivity = Arc::new(ManualConnectivity::new());
        let handle = NetworkMonitor::spawn(connectivity, Duration::from_secs(30)).await;

        assert!(handle.is_online());
        assert_eq!(handle.status().kind, ConnectionKind::Wifi);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_pushed_transition_propagates_without_poll_tick() {
        let connectivity = Arc::new(ManualConnectivity::new());
        let handle =
            NetworkMonitor::spawn(connectivity.clone(), Duration::from_secs(30)).await;
        let mut watch = handle.watch();

        // No clock advance: the pushed event alone must reach the watch
        connectivity.set_offline();
        watch.changed().await.unwrap();
        assert!(!watch.borrow().is_online());

        connectivity.set_online();
        watch.changed().await.unwrap();
        assert!(watch.borrow().is_online());
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_fallback_catches_silent_sources() {
        // A source whose event stream never fires; only check() tells
        // the truth
        struct SilentSource {
            status: std::sync::Mutex<NetworkStatus>,
            // Kept alive so the monitor's receiver stays open
            _events: watch::Sender<NetworkStatus>,
        }

        #[async_trait]
        impl Connectivity for SilentSource {
            async fn check(&self) -> NetworkStatus {
                self.status.lock().unwrap().clone()
            }

            fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
                self._events.subscribe()
            }
        }

        let source = Arc::new(SilentSource {
            status: std::sync::Mutex::new(NetworkStatus::online()),
            _events: watch::channel(NetworkStatus::online()).0,
        });

        let handle = NetworkMonitor::spawn(source.clone(), Duration::from_secs(30)).await;
        *source.status.lock().unwrap() = NetworkStatus::offline();

        let mut watch = handle.watch();
        tokio::time::advance(Duration::from_secs(31)).await;
        watch.changed().await.unwrap();
        assert!(!watch.borrow().is_online());
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitor_skips_publish_when_unchanged() {
        let connectivity = Arc::new(ManualConnectivity::new());
        let handle =
            NetworkMonitor::spawn(connectivity.clone(), Duration::from_secs(30)).await;
        let watch = handle.watch();

        // Re-pushing the same status and several polls leave the channel
        // unchanged
        connectivity.set_online();
        tokio::time::advance(Duration::from_secs(95)).await;
        tokio::task::yield_now().await;
        assert!(!watch.has_changed().unwrap());
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_reachability_counts_as_online() {
        let mut status = NetworkStatus::online();
        status.is_internet_reachable = None;
        let connectivity = Arc::new(ManualConnectivity::with_status(status));

        let handle = NetworkMonitor::spawn(connectivity, Duration::from_secs(30)).await;
        assert!(handle.is_online());
        handle.shutdown().await;
    }
}
