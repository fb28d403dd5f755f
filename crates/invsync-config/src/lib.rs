//! Configuration management for InvSync
//!
//! Configuration is layered: serialized defaults, then an optional file
//! (YAML, TOML or JSON, chosen by extension), then `INVSYNC__SECTION__KEY`
//! environment variables. The merged result is validated before use.
//!
//! # Examples
//!
//! ```rust
//! use invsync_config::{Config, ConfigBuilder};
//!
//! let config = ConfigBuilder::new()
//!     .add_defaults()
//!     .add_source_file("invsync.yaml")
//!     .add_env_prefix("INVSYNC")
//!     .build()
//!     .expect("Failed to load configuration");
//!
//! println!("Provider timeout: {}s", config.provider.timeout_secs);
//! ```

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use invsync_types::{RetryConfig, SyncSource, TimeoutConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub mod builder;
pub mod error;
pub mod loader;

pub use builder::ConfigBuilder;
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "INVSYNC";

/// Main configuration structure for InvSync
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Live resource provider
    pub provider: ProviderConfig,
    /// Persistent store
    pub store: StoreConfig,
    /// Sync run defaults
    pub sync: SyncConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Which provider fetches the live set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// The `az` command line
    #[default]
    AzureCli,
    /// A snapshot file on disk
    Snapshot,
}

/// Provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider implementation
    pub kind: ProviderKind,
    /// CLI executable
    pub command: String,
    /// Snapshot file, required for `snapshot`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<PathBuf>,
    /// Hard limit per provider command
    pub timeout_secs: u64,
    /// Heartbeat interval while a command runs
    pub heartbeat_secs: u64,
    /// Backoff for provider calls
    pub retry: RetrySettings,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::AzureCli,
            command: "az".to_string(),
            snapshot_path: None,
            timeout_secs: 120,
            heartbeat_secs: 3,
            retry: RetrySettings::default(),
        }
    }
}

impl ProviderConfig {
    /// Timeouts as a typed value
    pub fn timeouts(&self) -> TimeoutConfig {
        TimeoutConfig {
            command_timeout: Duration::from_secs(self.timeout_secs),
            heartbeat_interval: Duration::from_secs(self.heartbeat_secs),
        }
    }
}

/// Retry settings in file-friendly units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// First backoff delay
    pub initial_delay_ms: u64,
    /// Backoff multiplier
    pub backoff_multiplier: f64,
    /// Backoff cap
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 2000,
            backoff_multiplier: 2.0,
            max_delay_ms: 30_000,
        }
    }
}

impl RetrySettings {
    /// Convert into the typed retry configuration
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
        }
    }
}

/// Which store keeps the stored set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreKind {
    /// Process memory, lost on exit
    Memory,
    /// JSON documents in a directory
    #[default]
    JsonFile,
}

/// Store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store implementation
    pub kind: StoreKind,
    /// Directory holding the document files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::JsonFile,
            path: Some(PathBuf::from(".invsync")),
        }
    }
}

/// Sync run defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Source stamped on stored records
    pub source: SyncSource,
    /// Default number of history entries shown
    pub history_limit: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            source: SyncSource::Manual,
            history_limit: 20,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Enable JSON formatting
    pub json_format: bool,
    /// Enable file logging
    pub enable_file_logging: bool,
    /// Log file path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    /// Enable colored output
    pub colored_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            enable_file_logging: false,
            log_file: None,
            colored_output: true,
        }
    }
}
