//! Configuration types

use crate::{ConfigError, TesseraResult, Timestamp, VersionConfig, VersionNumber};
use serde::{Deserialize, Serialize};

/// Default number of days a deprecated version stays documented as available.
pub const DEFAULT_SUNSET_GRACE_DAYS: i64 = 90;

/// Default cap on any cache TTL (24 hours).
pub const DEFAULT_MAX_CACHE_TTL_SECS: u64 = 86_400;

/// Subsystem-wide settings for resolution and caching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TesseraConfig {
    /// Days added to `deprecated_at` to compute the sunset date.
    pub sunset_grace_days: i64,
    /// TTL used when a version config does not set one. 0 disables caching.
    pub default_cache_ttl_secs: u64,
    /// Upper bound for any effective TTL.
    pub max_cache_ttl_secs: u64,
}

impl Default for TesseraConfig {
    fn default() -> Self {
        Self {
            sunset_grace_days: DEFAULT_SUNSET_GRACE_DAYS,
            default_cache_ttl_secs: 0,
            max_cache_ttl_secs: DEFAULT_MAX_CACHE_TTL_SECS,
        }
    }
}

impl TesseraConfig {
    /// Validate the configuration.
    ///
    /// Validates:
    /// - sunset_grace_days > 0
    /// - max_cache_ttl_secs > 0
    /// - default_cache_ttl_secs <= max_cache_ttl_secs
    pub fn validate(&self) -> TesseraResult<()> {
        if self.sunset_grace_days <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "sunset_grace_days".to_string(),
                value: self.sunset_grace_days.to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if self.max_cache_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_cache_ttl_secs".to_string(),
                value: "0".to_string(),
                reason: "must be greater than 0".to_string(),
            }
            .into());
        }

        if self.default_cache_ttl_secs > self.max_cache_ttl_secs {
            return Err(ConfigError::InvalidValue {
                field: "default_cache_ttl_secs".to_string(),
                value: self.default_cache_ttl_secs.to_string(),
                reason: format!("must not exceed max_cache_ttl_secs ({})", self.max_cache_ttl_secs),
            }
            .into());
        }

        Ok(())
    }

    pub fn sunset_grace(&self) -> chrono::Duration {
        chrono::Duration::days(self.sunset_grace_days)
    }

    /// TTL to use when caching a response produced under `config`.
    pub fn effective_cache_ttl(&self, config: &VersionConfig) -> u64 {
        config
            .cache_ttl_secs()
            .unwrap_or(self.default_cache_ttl_secs)
            .min(self.max_cache_ttl_secs)
    }

    /// Upgrade guidance attached to responses served by a deprecated version.
    pub fn deprecation_message(&self, version_number: VersionNumber, sunset_at: Timestamp) -> String {
        format!(
            "Version {} is deprecated and will be sunset on {}. Remove the X-Version header or pin a newer version.",
            version_number,
            sunset_at.format("%Y-%m-%d")
        )
    }
}
