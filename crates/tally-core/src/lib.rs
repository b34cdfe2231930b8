//! # tally-core: Pure Domain Types for Tally
//!
//! This crate holds the domain vocabulary of the Tally receipt tracker's
//! offline sync layer, as pure types with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Tally Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    App Shell (TypeScript)                       │   │
//! │  │    Capture UI ──► Gallery UI ──► Receipt UI ──► Sync badges    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    tally-sync (Sync Engine)                     │   │
//! │  │       Queue store, drain engine, network monitor, events        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐                  │   │
//! │  │   │   types   │  │  receipt  │  │   error   │                  │   │
//! │  │   │ QueueItem │  │  Receipt  │  │ CoreError │                  │   │
//! │  │   │ SyncState │  │ Warranty  │  │           │                  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘                  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO NETWORK • NO TIMERS • PURE FUNCTIONS             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Sync domain types (queue items, sync states, network status)
//! - [`receipt`] - Receipt payload type and warranty expiry math
//! - [`error`] - Domain error types
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic apart from
//!    timestamp/id generation, which is injected at the call site
//! 2. **No I/O**: Storage, network, and timer access is FORBIDDEN here
//! 3. **Explicit Errors**: All errors are typed, never strings or panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod receipt;
pub mod types;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::CoreError;
pub use receipt::{Receipt, WarrantyStanding, WarrantyStatus};
pub use types::{
    ConnectionKind, GlobalSyncState, ItemStatus, NetworkDetails, NetworkStatus, OperationKind,
    Priority, ReceiptSyncState, SyncProgress, SyncQueueItem, SyncStatus,
};
