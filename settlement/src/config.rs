//! Configuration for the wallet engine

use crate::policy::PolicySettings;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Wallet engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ledger store configuration
    pub ledger: ledger_core::Config,

    /// Archival janitor configuration
    pub janitor: JanitorConfig,

    /// External dependency bounds
    pub dependencies: DependencyConfig,

    /// Initial policy loaded into the configuration store
    pub policy: PolicySettings,
}

/// Archival janitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JanitorConfig {
    /// Delay between a deposit being settled and its archival
    pub archive_delay_secs: u64,

    /// Interval of the catch-up sweep over the deposit queue
    pub sweep_interval_secs: u64,

    /// Attempts per archival job before it is left to the sweep
    pub max_attempts: u32,

    /// Mailbox capacity
    pub channel_capacity: usize,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            archive_delay_secs: 30,
            sweep_interval_secs: 300,
            max_attempts: 5,
            channel_capacity: 1024,
        }
    }
}

/// Longest delay or period the janitor will wait
pub const MAX_JANITOR_PERIOD: Duration = Duration::from_secs(30 * 24 * 60 * 60);

impl JanitorConfig {
    /// Archive delay as a duration, at most [`MAX_JANITOR_PERIOD`]
    pub fn archive_delay(&self) -> Duration {
        Duration::from_secs(self.archive_delay_secs).min(MAX_JANITOR_PERIOD)
    }

    /// Sweep interval as a duration, between one second and [`MAX_JANITOR_PERIOD`]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1)).min(MAX_JANITOR_PERIOD)
    }
}

/// Bounds on calls to external collaborators
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencyConfig {
    /// Timeout for a configuration store snapshot
    pub config_read_timeout_ms: u64,
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            config_read_timeout_ms: 500,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn with_env_overrides(mut self) -> crate::Result<Self> {
        self.ledger = self.ledger.with_env_overrides()?;

        if let Ok(delay) = std::env::var("WALLET_ARCHIVE_DELAY_SECS") {
            self.janitor.archive_delay_secs = delay
                .parse()
                .map_err(|e| crate::Error::Config(format!("WALLET_ARCHIVE_DELAY_SECS: {}", e)))?;
        }

        if let Ok(timeout) = std::env::var("WALLET_CONFIG_READ_TIMEOUT_MS") {
            self.dependencies.config_read_timeout_ms = timeout.parse().map_err(|e| {
                crate::Error::Config(format!("WALLET_CONFIG_READ_TIMEOUT_MS: {}", e))
            })?;
        }

        Ok(self)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        Config::default().with_env_overrides()
    }
}
