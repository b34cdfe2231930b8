//! # Sync Configuration
//!
//! Configuration management for the sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TALLY_SYNC_INTERVAL_SECS=60                                        │
//! │     TALLY_MAX_RETRIES=5                                                │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/tally/sync.toml (Linux)                                  │
//! │     ~/Library/Application Support/com.tally.app/sync.toml (macOS)      │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     interval 30s, unlimited retries, 500ms simulated latency           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [sync]
//! interval_secs = 30     # periodic drain while online
//! max_retries = 0        # 0 = retry forever
//!
//! [transport]
//! latency_ms = 500       # simulated per-item network delay
//! failure_rate = 0.0     # random failure probability, 0.0..=1.0
//!
//! [storage]
//! # data_dir = "/var/lib/tally"   # defaults to the platform data dir
//! ```
//!
//! The app historically ran two independent periodic sync timers (30s in the
//! standalone monitor, 60s in the app wrapper). That was duplication, not a
//! two-tier design; there is exactly one interval here.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Sync Settings
// =============================================================================

/// Drain scheduling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Interval between periodic drain attempts while online (seconds).
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Maximum failed attempts before an item is skipped by drain passes.
    /// 0 means unlimited (items retry forever).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_interval_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    0 // Unlimited
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            interval_secs: default_interval_secs(),
            max_retries: default_max_retries(),
        }
    }
}

// =============================================================================
// Transport Settings
// =============================================================================

/// Settings for the simulated remote sync API.
///
/// There is no real backend; every push is a timer with configurable
/// latency and an optional random failure probability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSettings {
    /// Simulated per-item network delay (milliseconds).
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,

    /// Probability in `0.0..=1.0` that any given push fails.
    #[serde(default)]
    pub failure_rate: f64,
}

fn default_latency_ms() -> u64 {
    500
}

impl Default for TransportSettings {
    fn default() -> Self {
        TransportSettings {
            latency_ms: default_latency_ms(),
            failure_rate: 0.0,
        }
    }
}

// =============================================================================
// Storage Settings
// =============================================================================

/// Settings for the key-value persistence collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Directory for the file-backed store. When unset, the platform data
    /// directory is used.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl StorageSettings {
    /// Resolves the directory the file-backed store should use.
    pub fn resolve_data_dir(&self) -> Option<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Some(dir.clone());
        }
        directories::ProjectDirs::from("com", "tally", "app")
            .map(|dirs| dirs.data_dir().to_path_buf())
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Drain scheduling settings.
    #[serde(default)]
    pub sync: SyncSettings,

    /// Simulated remote settings.
    #[serde(default)]
    pub transport: TransportSettings,

    /// Persistence settings.
    #[serde(default)]
    pub storage: StorageSettings,
}

impl SyncConfig {
    /// Creates a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)
            .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.sync.interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "interval_secs must be greater than 0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.transport.failure_rate) {
            return Err(SyncError::InvalidConfig(format!(
                "failure_rate must be within 0.0..=1.0, got {}",
                self.transport.failure_rate
            )));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(secs) = std::env::var("TALLY_SYNC_INTERVAL_SECS") {
            if let Ok(parsed) = secs.parse::<u64>() {
                debug!(interval_secs = parsed, "Overriding sync interval from environment");
                self.sync.interval_secs = parsed;
            }
        }

        if let Ok(retries) = std::env::var("TALLY_MAX_RETRIES") {
            if let Ok(parsed) = retries.parse::<u32>() {
                self.sync.max_retries = parsed;
            }
        }

        if let Ok(latency) = std::env::var("TALLY_LATENCY_MS") {
            if let Ok(parsed) = latency.parse::<u64>() {
                self.transport.latency_ms = parsed;
            }
        }

        if let Ok(rate) = std::env::var("TALLY_FAILURE_RATE") {
            if let Ok(parsed) = rate.parse::<f64>() {
                self.transport.failure_rate = parsed;
            }
        }

        if let Ok(dir) = std::env::var("TALLY_DATA_DIR") {
            debug!(data_dir = %dir, "Overriding data dir from environment");
            self.storage.data_dir = Some(PathBuf::from(dir));
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tally", "app")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Periodic drain interval as a Duration.
    pub fn sync_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sync.interval_secs)
    }

    /// Simulated per-item latency as a Duration.
    pub fn transport_latency(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.transport.latency_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.sync.interval_secs, 30);
        assert_eq!(config.sync.max_retries, 0);
        assert_eq!(config.transport.latency_ms, 500);
        assert_eq!(config.transport.failure_rate, 0.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();

        config.sync.interval_secs = 0;
        assert!(config.validate().is_err());

        config.sync.interval_secs = 30;
        config.transport.failure_rate = 1.5;
        assert!(config.validate().is_err());

        config.transport.failure_rate = 0.25;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = SyncConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[sync]"));
        assert!(toml_str.contains("[transport]"));

        let parsed: SyncConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.sync.interval_secs, config.sync.interval_secs);
        assert_eq!(parsed.transport.latency_ms, config.transport.latency_ms);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let parsed: SyncConfig = toml::from_str("[sync]\ninterval_secs = 15\n").unwrap();
        assert_eq!(parsed.sync.interval_secs, 15);
        assert_eq!(parsed.sync.max_retries, 0);
        assert_eq!(parsed.transport.latency_ms, 500);
    }
}
