//! # Sync Error Types
//!
//! Error types for sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Remote       │  │     Storage             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Offline        │  │  StorageRead           │ │
//! │  │  ConfigLoad     │  │  RemoteRejected │  │  StorageWrite          │ │
//! │  │  ConfigSave     │  │  RemoteUnavail. │  │  Serialization         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  Nothing here is fatal: every error is caught at the boundary of the   │
//! │  async operation that produced it and becomes a state transition or a  │
//! │  bus event. Persistence failures are logged and swallowed.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all possible sync failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// The device is offline; the operation was not attempted.
    #[error("Device is offline")]
    Offline,

    /// The remote rejected a specific queue item.
    #[error("Remote rejected item {id}: {reason}")]
    RemoteRejected { id: String, reason: String },

    /// The remote could not be reached.
    #[error("Remote unavailable: {0}")]
    RemoteUnavailable(String),

    // =========================================================================
    // Storage Errors
    // =========================================================================
    /// Failed to read from the key-value store.
    #[error("Storage read failed for key '{key}': {source_msg}")]
    StorageRead { key: String, source_msg: String },

    /// Failed to write to the key-value store.
    #[error("Storage write failed for key '{key}': {source_msg}")]
    StorageWrite { key: String, source_msg: String },

    /// Failed to serialize or deserialize a persisted snapshot.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The submitted payload failed validation and was never enqueued.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if this error is recoverable and the operation can be
    /// retried on a later drain pass.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Offline
                | SyncError::RemoteRejected { .. }
                | SyncError::RemoteUnavailable(_)
                | SyncError::StorageWrite { .. }
        )
    }

    /// Returns true if this error represents the expected offline condition
    /// rather than an actual failure.
    pub fn is_offline(&self) -> bool {
        matches!(self, SyncError::Offline)
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::Offline.is_retryable());
        assert!(SyncError::RemoteUnavailable("timeout".into()).is_retryable());
        assert!(SyncError::RemoteRejected {
            id: "1-abc".into(),
            reason: "flaky".into()
        }
        .is_retryable());

        assert!(!SyncError::InvalidConfig("bad".into()).is_retryable());
        assert!(!SyncError::ConfigLoadFailed("missing".into()).is_retryable());
    }

    #[test]
    fn test_offline_is_expected_not_exceptional() {
        assert!(SyncError::Offline.is_offline());
        assert!(!SyncError::RemoteUnavailable("down".into()).is_offline());
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::RemoteRejected {
            id: "1700000000000-abc123def".into(),
            reason: "conflict".into(),
        };
        assert!(err.to_string().contains("1700000000000-abc123def"));
        assert!(err.to_string().contains("conflict"));
    }
}
