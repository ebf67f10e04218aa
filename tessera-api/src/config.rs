//! Server settings read from `TESSERA_*` environment variables.

use std::str::FromStr;

use tessera_core::config::{DEFAULT_MAX_CACHE_TTL_SECS, DEFAULT_SUNSET_GRACE_DAYS};
use tessera_core::{ConfigError, TesseraConfig};

use crate::constants::{DEFAULT_BIND_HOST, DEFAULT_CORS_MAX_AGE_SECS, DEFAULT_PORT};

/// Where versions and cached responses are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageBackend {
    /// Lost on restart.
    #[default]
    Memory,
    Postgres,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(Self::Memory),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            other => Err(ConfigError::InvalidValue {
                field: "TESSERA_STORAGE".to_string(),
                value: other.to_string(),
                reason: "expected memory or postgres".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_host: String,
    pub port: u16,
    /// Exact origins or `*.suffix` patterns. Empty allows any origin.
    pub cors_origins: Vec<String>,
    pub cors_allow_credentials: bool,
    pub cors_max_age_secs: u64,
    pub storage: StorageBackend,
    pub tessera: TesseraConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_host: DEFAULT_BIND_HOST.to_string(),
            port: DEFAULT_PORT,
            cors_origins: Vec::new(),
            cors_allow_credentials: false,
            cors_max_age_secs: DEFAULT_CORS_MAX_AGE_SECS,
            storage: StorageBackend::default(),
            tessera: TesseraConfig::default(),
        }
    }
}

/// Parse `key` if set, falling back to `default` when missing or malformed.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

impl ApiConfig {
    /// | variable | default |
    /// |---|---|
    /// | `TESSERA_API_BIND` | `0.0.0.0` |
    /// | `PORT`, then `TESSERA_API_PORT` | `3000` |
    /// | `TESSERA_CORS_ORIGINS` (comma separated) | any origin |
    /// | `TESSERA_CORS_ALLOW_CREDENTIALS` | `false` |
    /// | `TESSERA_CORS_MAX_AGE_SECS` | `86400` |
    /// | `TESSERA_STORAGE` (`memory` or `postgres`) | `memory` |
    /// | `TESSERA_SUNSET_GRACE_DAYS` | `90` |
    /// | `TESSERA_DEFAULT_CACHE_TTL_SECS` | `0` |
    /// | `TESSERA_MAX_CACHE_TTL_SECS` | `86400` |
    ///
    /// Numeric settings fall back to their default when malformed. A bad
    /// port or storage backend is an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match std::env::var("PORT").or_else(|_| std::env::var("TESSERA_API_PORT")) {
            Ok(raw) => raw.trim().parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                field: "PORT".to_string(),
                value: raw.clone(),
                reason: "expected a port number".to_string(),
            })?,
            Err(_) => DEFAULT_PORT,
        };

        let storage = match std::env::var("TESSERA_STORAGE") {
            Ok(raw) => raw.parse()?,
            Err(_) => StorageBackend::default(),
        };

        let cors_origins = std::env::var("TESSERA_CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            bind_host: std::env::var("TESSERA_API_BIND")
                .unwrap_or_else(|_| DEFAULT_BIND_HOST.to_string()),
            port,
            cors_origins,
            cors_allow_credentials: std::env::var("TESSERA_CORS_ALLOW_CREDENTIALS")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            cors_max_age_secs: env_or("TESSERA_CORS_MAX_AGE_SECS", DEFAULT_CORS_MAX_AGE_SECS),
            storage,
            tessera: TesseraConfig {
                sunset_grace_days: env_or("TESSERA_SUNSET_GRACE_DAYS", DEFAULT_SUNSET_GRACE_DAYS),
                default_cache_ttl_secs: env_or("TESSERA_DEFAULT_CACHE_TTL_SECS", 0),
                max_cache_ttl_secs: env_or("TESSERA_MAX_CACHE_TTL_SECS", DEFAULT_MAX_CACHE_TTL_SECS),
            },
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }

    /// `*.example.com` matches any subdomain of `example.com` but not the
    /// bare domain.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.cors_origins.is_empty() {
            return true;
        }
        self.cors_origins
            .iter()
            .any(|pattern| match pattern.strip_prefix("*.") {
                Some(domain) => origin
                    .strip_suffix(domain)
                    .is_some_and(|host| host.ends_with('.') && host.len() > 1),
                None => pattern == origin,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert!(config.cors_origins.is_empty());
        assert_eq!(config.port, 3000);
        assert_eq!(config.storage, StorageBackend::Memory);
        assert_eq!(config.bind_addr(), "0.0.0.0:3000");
        assert!(config.tessera.validate().is_ok());
    }

    #[test]
    fn test_storage_backend_parse() {
        assert_eq!("memory".parse::<StorageBackend>(), Ok(StorageBackend::Memory));
        assert_eq!(" Postgres ".parse::<StorageBackend>(), Ok(StorageBackend::Postgres));
        assert!("redis".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_origin_allowed_dev_mode() {
        let config = ApiConfig::default();
        assert!(config.is_origin_allowed("https://anything.com"));
    }

    #[test]
    fn test_origin_allowed_wildcard() {
        let config = ApiConfig {
            cors_origins: vec!["*.tessera.run".to_string(), "https://exact.io".to_string()],
            ..Default::default()
        };
        assert!(config.is_origin_allowed("https://app.tessera.run"));
        assert!(!config.is_origin_allowed("https://tessera.run"));
        assert!(!config.is_origin_allowed("https://eviltessera.run"));
        assert!(config.is_origin_allowed("https://exact.io"));
        assert!(!config.is_origin_allowed("https://other.io"));
    }
}
