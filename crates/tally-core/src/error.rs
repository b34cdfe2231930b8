//! # Error Types
//!
//! Domain-specific error types for tally-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tally-core errors (this file)                                         │
//! │  └── CoreError        - Domain validation failures                     │
//! │                                                                         │
//! │  tally-sync errors (separate crate)                                    │
//! │  └── SyncError        - Queue, storage, and transport failures         │
//! │                                                                         │
//! │  Flow: CoreError → SyncError → structured outcome → UI banner/toast    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (receipt id, field name)
//! 3. Errors are enum variants, never bare Strings

use thiserror::Error;

/// Domain validation errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Receipt id is empty or whitespace.
    #[error("Receipt id is empty")]
    EmptyReceiptId,

    /// Receipt fields fail validation.
    #[error("Invalid receipt: {0}")]
    InvalidReceipt(String),

    /// Payload cannot be interpreted for the given operation.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}
