//! # Sync Domain Types
//!
//! Core types for the offline sync queue and its derived state projections.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Sync Domain Types                               │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  SyncQueueItem  │   │ GlobalSyncState │   │ReceiptSyncState │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id             │   │  status         │   │  receipt_id     │       │
//! │  │  kind           │   │  last_synced_at │   │  status         │       │
//! │  │  payload (JSON) │   │  items_to_sync  │   │  progress       │       │
//! │  │  retries        │   └─────────────────┘   │  error          │       │
//! │  │  status         │                         └─────────────────┘       │
//! │  └─────────────────┘                                                   │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  OperationKind  │   │   ItemStatus    │   │   SyncStatus    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  Receipt        │   │  Pending        │   │  Synced         │       │
//! │  │  Update         │   │  Processing     │   │  Syncing        │       │
//! │  │  Delete         │   │  Failed         │   │  Pending        │       │
//! │  └─────────────────┘   └─────────────────┘   │  Error          │       │
//! │                                              │  Offline        │       │
//! │                                              └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Source of Truth
//! The queue is authoritative for "what still needs to sync". Global and
//! per-receipt states are projections updated as side effects of processing
//! queue items, never the other way around.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

// =============================================================================
// Operation Kind
// =============================================================================

/// The kind of pending operation a queue item represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum OperationKind {
    /// Create a new receipt remotely.
    Receipt,

    /// Update an existing receipt.
    Update,

    /// Delete a receipt.
    Delete,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::Receipt => write!(f, "receipt"),
            OperationKind::Update => write!(f, "update"),
            OperationKind::Delete => write!(f, "delete"),
        }
    }
}

// =============================================================================
// Priority
// =============================================================================

/// Scheduling hint attached to a queue item.
///
/// Advisory metadata only: the queue is drained strictly in FIFO order and
/// priority is never consulted for reordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Normal => write!(f, "normal"),
            Priority::Low => write!(f, "low"),
        }
    }
}

// =============================================================================
// Item Status
// =============================================================================

/// Lifecycle status of a single queue item.
///
/// ## Invariant
/// At rest every item is `Pending` or `Failed`. `Processing` only appears
/// while a drain pass is actively working the item; a snapshot loaded from
/// storage demotes any `Processing` item back to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ItemStatus {
    /// Waiting for the next drain pass.
    #[default]
    Pending,

    /// Currently being pushed to the remote (drain in flight).
    Processing,

    /// Last attempt failed; eligible for a future drain pass.
    Failed,
}

// =============================================================================
// Sync Status
// =============================================================================

/// Summary sync status, used both globally and per receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum SyncStatus {
    /// Everything known to be in sync.
    #[default]
    Synced,

    /// A drain pass is in flight.
    Syncing,

    /// Work is queued, waiting for connectivity or the next pass.
    Pending,

    /// The last attempt failed.
    Error,

    /// Queued while the device was offline.
    Offline,
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Synced => write!(f, "synced"),
            SyncStatus::Syncing => write!(f, "syncing"),
            SyncStatus::Pending => write!(f, "pending"),
            SyncStatus::Error => write!(f, "error"),
            SyncStatus::Offline => write!(f, "offline"),
        }
    }
}

// =============================================================================
// Sync Queue Item
// =============================================================================

/// One unit of pending work: a receipt create/update/delete awaiting sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncQueueItem {
    /// Unique identifier, generated at enqueue time
    /// (epoch millis + random suffix).
    pub id: String,

    /// The kind of pending operation.
    pub kind: OperationKind,

    /// Receipt this operation refers to, if any.
    pub receipt_id: Option<String>,

    /// Opaque operation payload (e.g. receipt fields as JSON).
    pub payload: serde_json::Value,

    /// Scheduling hint. Advisory only, never used for reordering.
    pub priority: Priority,

    /// When the item was enqueued.
    pub enqueued_at: DateTime<Utc>,

    /// Number of failed attempts so far.
    pub retries: u32,

    /// Message from the most recent failed attempt.
    pub last_error: Option<String>,

    /// Current lifecycle status.
    pub status: ItemStatus,
}

impl SyncQueueItem {
    /// Creates a new pending item with a generated id.
    pub fn new(
        kind: OperationKind,
        receipt_id: Option<String>,
        payload: serde_json::Value,
        priority: Priority,
    ) -> Self {
        SyncQueueItem {
            id: generate_item_id(),
            kind,
            receipt_id,
            payload,
            priority,
            enqueued_at: Utc::now(),
            retries: 0,
            last_error: None,
            status: ItemStatus::Pending,
        }
    }

    /// Returns true if the item is waiting for a drain pass.
    pub fn is_pending(&self) -> bool {
        self.status == ItemStatus::Pending
    }

    /// Returns true if the item's last attempt failed.
    pub fn is_failed(&self) -> bool {
        self.status == ItemStatus::Failed
    }
}

/// Generates a queue item id: epoch millis, then a short random suffix.
///
/// The millis prefix keeps ids roughly sortable by enqueue time; the suffix
/// disambiguates items enqueued within the same millisecond.
fn generate_item_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().timestamp_millis(), &suffix[..9])
}

// =============================================================================
// Per-Receipt Sync State
// =============================================================================

/// Derived sync state for a single receipt.
///
/// A projection, not a source of truth: created lazily on first reference
/// and updated as a side effect of processing queue items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReceiptSyncState {
    /// The receipt this state describes.
    pub receipt_id: String,

    /// Current sync status for this receipt.
    pub status: SyncStatus,

    /// 0-100, set only while `status` is `Syncing`.
    pub progress: Option<u8>,

    /// Failure message, set only while `status` is `Error`.
    pub error: Option<String>,

    /// Last time this receipt synced successfully.
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl ReceiptSyncState {
    /// The default projection for a receipt nothing is known about.
    pub fn synced(receipt_id: impl Into<String>) -> Self {
        ReceiptSyncState {
            receipt_id: receipt_id.into(),
            status: SyncStatus::Synced,
            progress: None,
            error: None,
            last_synced_at: None,
        }
    }
}

// =============================================================================
// Global Sync State
// =============================================================================

/// App-wide sync summary, distinct from any single receipt's status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct GlobalSyncState {
    /// Overall status.
    pub status: SyncStatus,

    /// Updated when a drain pass runs to completion.
    pub last_synced_at: Option<DateTime<Utc>>,

    /// Mirrors the queue length.
    pub items_to_sync: usize,
}

impl Default for GlobalSyncState {
    fn default() -> Self {
        GlobalSyncState {
            status: SyncStatus::Synced,
            last_synced_at: None,
            items_to_sync: 0,
        }
    }
}

// =============================================================================
// Sync Progress
// =============================================================================

/// Progress record for one drain pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncProgress {
    /// Items snapshotted at the start of the pass.
    pub total: usize,

    /// Items pushed successfully so far.
    pub completed: usize,

    /// Items that failed so far.
    pub failed: usize,

    /// Items currently in flight (0 or 1: the pass is sequential).
    pub in_progress: usize,

    /// When the pass started.
    pub started_at: DateTime<Utc>,
}

impl SyncProgress {
    /// Starts a fresh progress record for `total` items.
    pub fn start(total: usize) -> Self {
        SyncProgress {
            total,
            completed: 0,
            failed: 0,
            in_progress: 0,
            started_at: Utc::now(),
        }
    }

    /// Completed + failed, as a percentage of total (0-100).
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        (((self.completed + self.failed) * 100) / self.total) as u8
    }
}

// =============================================================================
// Network Status
// =============================================================================

/// Connection medium reported by the platform connectivity observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ConnectionKind {
    #[default]
    Unknown,
    None,
    Wifi,
    Cellular,
    Other,
}

/// Extra connection details, when the platform reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NetworkDetails {
    /// Metered/expensive connection (cellular data, tethering).
    pub is_connection_expensive: Option<bool>,
}

/// Normalized snapshot of platform connectivity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NetworkStatus {
    /// Link-level connectivity.
    pub is_connected: bool,

    /// Whether the internet is reachable; `None` when the platform
    /// has not determined reachability yet.
    pub is_internet_reachable: Option<bool>,

    /// Connection medium.
    pub kind: ConnectionKind,

    /// Extra platform details, if reported.
    pub details: Option<NetworkDetails>,
}

impl NetworkStatus {
    /// Online means connected, with unknown reachability treated as
    /// reachable (optimistic default).
    pub fn is_online(&self) -> bool {
        self.is_connected && self.is_internet_reachable.unwrap_or(true)
    }

    /// A connected wifi status, the usual healthy case.
    pub fn online() -> Self {
        NetworkStatus {
            is_connected: true,
            is_internet_reachable: Some(true),
            kind: ConnectionKind::Wifi,
            details: None,
        }
    }

    /// A fully disconnected status.
    pub fn offline() -> Self {
        NetworkStatus {
            is_connected: false,
            is_internet_reachable: Some(false),
            kind: ConnectionKind::None,
            details: None,
        }
    }
}

impl Default for NetworkStatus {
    fn default() -> Self {
        NetworkStatus {
            is_connected: true,
            is_internet_reachable: None,
            kind: ConnectionKind::Unknown,
            details: None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
