//! Configuration loading for mailroom-relay.
//!
//! Configuration is loaded from a TOML file (default: `mailroom.toml`).

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for mailroom-relay.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Provider binding (group, operator).
    pub provider: ProviderConfig,
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Retry policy for transport calls.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Rate limiting configuration.
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Provider binding.
///
/// The group that holds the topic mailboxes and the operator account
/// whose messages are relayed outward. Both are raw provider ids; the
/// transport adapter interprets them.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Id of the group whose topics serve as mailboxes.
    pub group_id: i64,
    /// Id of the operator account.
    pub operator_id: i64,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
}

/// Retry policy for transport calls.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts per transport call, first try included
    /// (default: 4).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base backoff delay in milliseconds (default: 500).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Upper bound on a single backoff delay in seconds (default: 10).
    ///
    /// Also caps how long a provider-advertised retry-after interval is
    /// honored, so the per-user lock is never held unboundedly.
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,
}

impl RetryConfig {
    /// Base delay as a [`Duration`].
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    /// Delay cap as a [`Duration`].
    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Maximum transport calls per minute across all users
    /// (default: 1200).
    #[serde(default = "default_global_per_minute")]
    pub global_per_minute: u32,
    /// Maximum transport calls per minute into a single user's mailbox
    /// (default: 20).
    #[serde(default = "default_per_user_per_minute")]
    pub per_user_per_minute: u32,
}

// Default value functions
fn default_database_path() -> PathBuf {
    PathBuf::from("mailroom.db")
}

fn default_max_attempts() -> u32 {
    4
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_secs() -> u64 {
    10
}

fn default_global_per_minute() -> u32 {
    1200
}

fn default_per_user_per_minute() -> u32 {
    20
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database_path(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            global_per_minute: default_global_per_minute(),
            per_user_per_minute: default_per_user_per_minute(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
