//! Engine configuration with sensible defaults.
//!
//! Values can be loaded from a JSON document; missing fields fall
//! back to their defaults, so `{}` is a valid configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Result, SessionError};

/// Fourteen days in milliseconds, the default message TTL.
pub const FOURTEEN_DAYS_MS: u64 = 14 * 24 * 60 * 60 * 1000;

// ---------------------------------------------------------------------------
// PollerConfig
// ---------------------------------------------------------------------------

/// Scheduling, backoff and dedup parameters for one poller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Delay between successful poll cycles, in milliseconds.
    pub interval_ms: u64,

    /// First backoff delay after a fetch failure, in milliseconds.
    /// Doubles per consecutive failure.
    pub backoff_base_ms: u64,

    /// Upper bound on the backoff delay, in milliseconds.
    pub backoff_cap_ms: u64,

    /// Maximum number of dedup keys kept in memory.
    pub dedup_capacity: usize,

    /// Dedup keys older than this are evicted, in milliseconds.
    pub dedup_retention_ms: u64,

    /// Whether envelope content is sealed and signed and must be
    /// opened and verified before decoding.
    pub verify_signatures: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 3_000,
            backoff_base_ms: 1_000,
            backoff_cap_ms: 60_000,
            dedup_capacity: 10_000,
            dedup_retention_ms: FOURTEEN_DAYS_MS,
            verify_signatures: true,
        }
    }
}

impl PollerConfig {
    /// Validates all poller values.
    pub fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(SessionError::ConfigError {
                reason: "poller.interval_ms must be greater than 0".into(),
            });
        }

        if self.backoff_base_ms == 0 {
            return Err(SessionError::ConfigError {
                reason: "poller.backoff_base_ms must be greater than 0".into(),
            });
        }

        if self.backoff_cap_ms < self.backoff_base_ms {
            return Err(SessionError::ConfigError {
                reason: "poller.backoff_cap_ms must be >= backoff_base_ms".into(),
            });
        }

        if self.dedup_capacity == 0 {
            return Err(SessionError::ConfigError {
                reason: "poller.dedup_capacity must be greater than 0".into(),
            });
        }

        if self.dedup_retention_ms == 0 {
            return Err(SessionError::ConfigError {
                reason: "poller.dedup_retention_ms must be greater than 0".into(),
            });
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Top-level configuration for a `Session` facade.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Defaults applied to pollers created through the facade.
    pub poller: PollerConfig,

    /// Capacity of the message event broadcast channel.
    pub event_channel_size: usize,

    /// TTL used for outgoing messages without a more specific policy,
    /// in milliseconds.
    pub default_ttl_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poller: PollerConfig::default(),
            event_channel_size: 1024,
            default_ttl_ms: FOURTEEN_DAYS_MS,
        }
    }
}

impl SessionConfig {
    /// Parses and validates a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| SessionError::ConfigError {
            reason: format!("invalid config JSON: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| SessionError::ConfigError {
            reason: format!("cannot read config file {}: {e}", path.display()),
        })?;
        Self::from_json_str(&raw)
    }

    /// Validates all configuration values.
    pub fn validate(&self) -> Result<()> {
        self.poller.validate()?;

        if self.event_channel_size == 0 {
            return Err(SessionError::ConfigError {
                reason: "event_channel_size must be greater than 0".into(),
            });
        }

        if self.default_ttl_ms == 0 {
            return Err(SessionError::ConfigError {
                reason: "default_ttl_ms must be greater than 0".into(),
            });
        }

        Ok(())
    }
}
