//! # Tally Sync
//!
//! Offline-first sync subsystem for the receipt vault: every capture,
//! edit, and delete lands in a durable local queue and flows to the
//! remote when connectivity allows. The app never blocks on the network.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           tally-sync                                    │
//! │                                                                         │
//! │  ┌──────────────┐          ┌─────────────────────────────────────────┐ │
//! │  │ NetworkMonitor│ watch   │              SyncService                │ │
//! │  │  (network.rs) ├────────►│             (service.rs)                │ │
//! │  └──────────────┘          │                                         │ │
//! │                            │  ┌───────────┐      ┌────────────────┐  │ │
//! │  ┌──────────────┐          │  │ SyncEngine│─────►│  RemoteSync    │  │ │
//! │  │ KeyValueStore│◄─────────┼──┤ (engine.rs)      │ (transport.rs) │  │ │
//! │  │ (storage.rs) │ persist  │  └─────┬─────┘      └────────────────┘  │ │
//! │  └──────────────┘          │        │                                │ │
//! │        ▲                   │        ▼                                │ │
//! │        │            ┌──────┴──────────────┬──────────────────┐       │ │
//! │        └────────────┤ SyncQueueStore      │ ReceiptStateTable│       │ │
//! │                     │ (queue.rs)          │ (states.rs)      │       │ │
//! │                     └─────────────────────┴──────────────────┘       │ │
//! │                                  │                                   │ │
//! │                                  ▼                                   │ │
//! │                     SyncEventBus (events.rs) ──► UI listeners        │ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//! - The queue is the single source of truth for unsynced work; global and
//!   per-receipt states are projections derived from processing it
//! - FIFO: items drain in exact enqueue order, one at a time
//! - A failed item stays queued with an incremented retry count; one bad
//!   item never aborts the rest of a pass
//! - At most one drain pass runs at a time; extra triggers are no-ops
//! - Every queue mutation persists; queued work survives restarts

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod network;
pub mod queue;
pub mod service;
pub mod states;
pub mod storage;
pub mod transport;

pub use config::{StorageSettings, SyncConfig, SyncSettings, TransportSettings};
pub use engine::{DrainReport, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use events::{Subscription, SyncEvent, SyncEventBus, SyncEventKind};
pub use network::{Connectivity, ManualConnectivity, NetworkMonitor, NetworkMonitorHandle};
pub use queue::SyncQueueStore;
pub use service::{OfflineCapability, SyncOutcome, SyncService, SyncServiceBuilder};
pub use states::ReceiptStateTable;
pub use storage::{FileStore, KeyValueStore, MemoryStore};
pub use transport::{RemoteSync, SimulatedRemote};

// Re-export the domain types alongside the machinery that drives them
pub use tally_core::{
    ConnectionKind, GlobalSyncState, ItemStatus, NetworkDetails, NetworkStatus, OperationKind,
    Priority, Receipt, ReceiptSyncState, SyncProgress, SyncQueueItem, SyncStatus,
};
