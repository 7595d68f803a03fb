//! Notification rule cache configuration.
//!
//! Loaded from environment variables with defaults suited to a single node:
//! - `HERALD_RULE_CACHE_TTL_SECS`: entry time-to-live in seconds, 0 disables expiry (default: 1800)
//! - `HERALD_RULE_CACHE_MAX_SIZE`: maximum number of entries, 0 disables caching (default: 1000)

use std::time::Duration;

use chrono::{DateTime, Utc};
use herald_core::ConfigError;
use serde::{Deserialize, Serialize};

const TTL_ENV: &str = "HERALD_RULE_CACHE_TTL_SECS";
const MAX_SIZE_ENV: &str = "HERALD_RULE_CACHE_MAX_SIZE";

/// Configuration shared by all rule cache backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCacheConfig {
    /// How long an entry stays valid after it was cached. Zero means forever.
    pub ttl: Duration,
    /// Maximum number of entries. Zero disables the cache entirely.
    pub max_size: usize,
}

impl Default for RuleCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30 * 60),
            max_size: 1000,
        }
    }
}

impl RuleCacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the maximum number of entries.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Whether the cache stores anything at all.
    pub fn is_enabled(&self) -> bool {
        self.max_size > 0
    }

    /// Whether an entry cached at `cached_at` has expired by `now`.
    pub fn is_expired(&self, cached_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        if self.ttl.is_zero() {
            return false;
        }
        match chrono::Duration::from_std(self.ttl) {
            Ok(ttl) => now.signed_duration_since(cached_at) > ttl,
            Err(_) => false,
        }
    }

    /// Check that the values can be honored.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if chrono::Duration::from_std(self.ttl).is_err() {
            return Err(ConfigError::InvalidValue {
                field: "ttl".to_string(),
                value: format!("{:?}", self.ttl),
                reason: "too large to compare against timestamps".to_string(),
            });
        }
        Ok(())
    }

    /// Create a config from the process environment.
    ///
    /// Unset variables keep their defaults; unparsable ones are an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create a config from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(TTL_ENV) {
            let secs = parse_number::<u64>(TTL_ENV, &raw)?;
            config.ttl = Duration::from_secs(secs);
        }

        if let Some(raw) = lookup(MAX_SIZE_ENV) {
            config.max_size = parse_number::<usize>(MAX_SIZE_ENV, &raw)?;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(field: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        field: field.to_string(),
        value: raw.to_string(),
        reason: "must be a non-negative integer".to_string(),
    })
}
