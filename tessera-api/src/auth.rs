//! API-key authentication.
//!
//! Every key is bound to exactly one tenant and one environment. The
//! environment of the key is the environment of every request made with it;
//! callers cannot override it.
//!
//! Keys are configured through `TESSERA_API_KEYS` as a comma-separated list
//! of `key:tenant-uuid:ENVIRONMENT[:user]` entries. Only the SHA-256 digest
//! of each key is kept after parsing.

use std::collections::HashMap;

use axum::http::HeaderMap;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tessera_core::{ConfigError, Environment, TenantId};
use thiserror::Error;
use uuid::Uuid;

use crate::constants::{API_KEY_HEADER, BEARER_PREFIX};
use crate::error::ApiError;

// ============================================================================
// AUTH CONTEXT
// ============================================================================

/// Identity attached to an authenticated request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthContext {
    pub tenant_id: TenantId,
    /// Environment every resolution for this request runs in.
    pub environment: Environment,
    /// Acting user recorded in audit events, when the key names one.
    pub user_id: Option<String>,
}

impl AuthContext {
    pub fn new(tenant_id: TenantId, environment: Environment, user_id: Option<String>) -> Self {
        Self {
            tenant_id,
            environment,
            user_id,
        }
    }
}

// ============================================================================
// KEY PARSING
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiKeyParseError {
    #[error("entry {index} must look like key:tenant-uuid:ENVIRONMENT[:user]")]
    Malformed { index: usize },

    #[error("entry {index} has an empty key")]
    EmptyKey { index: usize },

    #[error("entry {index} has an invalid tenant id: {reason}")]
    InvalidTenant { index: usize, reason: String },

    #[error("entry {index} has an unknown environment {value:?}")]
    InvalidEnvironment { index: usize, value: String },

    #[error("entry {index} repeats an earlier key")]
    DuplicateKey { index: usize },
}

impl From<ApiKeyParseError> for ConfigError {
    fn from(err: ApiKeyParseError) -> Self {
        ConfigError::InvalidValue {
            field: "TESSERA_API_KEYS".to_string(),
            value: "[REDACTED]".to_string(),
            reason: err.to_string(),
        }
    }
}

/// SHA-256 hex digest of a raw API key.
pub fn hash_api_key(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Clone, Default)]
pub struct AuthConfig {
    /// Key digest -> identity.
    keys: HashMap<String, AuthContext>,
}

impl AuthConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load keys from `TESSERA_API_KEYS`. An unset variable yields an empty
    /// config that rejects every request.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var("TESSERA_API_KEYS") {
            Ok(raw) => Ok(Self::parse(&SecretString::from(raw))?),
            Err(_) => Ok(Self::default()),
        }
    }

    /// Parse a comma-separated key list.
    pub fn parse(raw: &SecretString) -> Result<Self, ApiKeyParseError> {
        let mut config = Self::default();
        let entries = raw
            .expose_secret()
            .split(',')
            .map(str::trim)
            .filter(|e| !e.is_empty());
        for (index, entry) in entries.enumerate() {
            let mut parts = entry.splitn(4, ':');
            let (Some(key), Some(tenant), Some(env)) = (parts.next(), parts.next(), parts.next())
            else {
                return Err(ApiKeyParseError::Malformed { index });
            };
            let user = parts.next().filter(|u| !u.is_empty()).map(str::to_string);
            if key.is_empty() {
                return Err(ApiKeyParseError::EmptyKey { index });
            }
            let tenant_id =
                Uuid::parse_str(tenant).map_err(|e| ApiKeyParseError::InvalidTenant {
                    index,
                    reason: e.to_string(),
                })?;
            let environment =
                env.parse::<Environment>()
                    .map_err(|_| ApiKeyParseError::InvalidEnvironment {
                        index,
                        value: env.to_string(),
                    })?;
            let digest = hash_api_key(key);
            if config.keys.contains_key(&digest) {
                return Err(ApiKeyParseError::DuplicateKey { index });
            }
            config
                .keys
                .insert(digest, AuthContext::new(tenant_id, environment, user));
        }
        Ok(config)
    }

    /// Register one key.
    pub fn with_key(mut self, raw: &SecretString, context: AuthContext) -> Self {
        self.keys.insert(hash_api_key(raw.expose_secret()), context);
        self
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Identity bound to `raw`, if the key is known.
    pub fn lookup(&self, raw: &SecretString) -> Option<&AuthContext> {
        self.keys.get(&hash_api_key(raw.expose_secret()))
    }

    /// Authenticate a request from its `X-API-Key` or `Authorization: Bearer`
    /// header.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, ApiError> {
        let key = extract_api_key(headers)
            .ok_or_else(|| ApiError::unauthorized("Missing API key"))?;
        self.lookup(&key)
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Invalid API key"))
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("api_keys", &format!("[{} keys]", self.keys.len()))
            .finish()
    }
}

fn extract_api_key(headers: &HeaderMap) -> Option<SecretString> {
    if let Some(value) = headers.get(API_KEY_HEADER) {
        let key = value.to_str().ok()?.trim();
        return (!key.is_empty()).then(|| SecretString::from(key.to_string()));
    }
    let auth = headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    let key = auth.strip_prefix(BEARER_PREFIX)?.trim();
    (!key.is_empty()).then(|| SecretString::from(key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const TENANT: &str = "0190c5d2-7a4e-7c1b-9f0e-2b3c4d5e6f70";

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    #[test]
    fn test_parse_entries() {
        let config = AuthConfig::parse(&secret(&format!(
            "sk_sand:{TENANT}:SANDBOX:alice, sk_prod:{TENANT}:production"
        )))
        .unwrap();
        assert_eq!(config.len(), 2);

        let sandbox = config.lookup(&secret("sk_sand")).unwrap();
        assert_eq!(sandbox.environment, Environment::Sandbox);
        assert_eq!(sandbox.user_id.as_deref(), Some("alice"));

        let prod = config.lookup(&secret("sk_prod")).unwrap();
        assert_eq!(prod.environment, Environment::Production);
        assert_eq!(prod.user_id, None);
        assert_eq!(prod.tenant_id.to_string(), TENANT);
    }

    #[test]
    fn test_parse_rejects_bad_entries() {
        assert!(matches!(
            AuthConfig::parse(&secret("just-a-key")),
            Err(ApiKeyParseError::Malformed { index: 0 })
        ));
        assert!(matches!(
            AuthConfig::parse(&secret("k:not-a-uuid:SANDBOX")),
            Err(ApiKeyParseError::InvalidTenant { .. })
        ));
        assert!(matches!(
            AuthConfig::parse(&secret(&format!("k:{TENANT}:STAGING"))),
            Err(ApiKeyParseError::InvalidEnvironment { .. })
        ));
        assert!(matches!(
            AuthConfig::parse(&secret(&format!("k:{TENANT}:SANDBOX,k:{TENANT}:PRODUCTION"))),
            Err(ApiKeyParseError::DuplicateKey { index: 1 })
        ));
    }

    #[test]
    fn test_parse_error_never_leaks_key() {
        let err: ConfigError = ApiKeyParseError::Malformed { index: 0 }.into();
        assert!(err.to_string().contains("[REDACTED]"));
    }

    #[test]
    fn test_only_digests_are_stored() {
        let config = AuthConfig::parse(&secret(&format!("sk_live_123:{TENANT}:SANDBOX"))).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk_live_123"));
        assert!(config.keys.contains_key(&hash_api_key("sk_live_123")));
        assert_eq!(hash_api_key("sk_live_123").len(), 64);
    }

    #[test]
    fn test_authenticate_headers() {
        let tenant = Uuid::now_v7();
        let config = AuthConfig::new().with_key(
            &secret("k1"),
            AuthContext::new(tenant, Environment::Production, None),
        );

        let mut headers = HeaderMap::new();
        assert!(config.authenticate(&headers).is_err());

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("k1"));
        assert_eq!(config.authenticate(&headers).unwrap().tenant_id, tenant);

        let mut bearer = HeaderMap::new();
        bearer.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer k1"),
        );
        assert!(config.authenticate(&bearer).is_ok());

        let mut wrong = HeaderMap::new();
        wrong.insert(API_KEY_HEADER, HeaderValue::from_static("k2"));
        let err = config.authenticate(&wrong).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::UNAUTHORIZED);
    }
}
