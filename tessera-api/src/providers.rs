//! HTTP intelligence provider.
//!
//! The model call itself lives behind an HTTP endpoint. Each invocation
//! POSTs `{config, input}` and expects a JSON object back; that object is the
//! response payload that gets cached.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use tessera_core::{ProviderError, VersionConfig};
use tessera_lifecycle::{IntelligenceProvider, UnconfiguredProvider};

use crate::constants::DEFAULT_PROVIDER_TIMEOUT_SECS;

#[derive(Clone)]
pub struct ProviderConfig {
    /// Endpoint receiving `{config, input}`. `None` disables serving.
    pub url: Option<String>,
    /// Sent as a bearer token when set.
    pub token: Option<SecretString>,
    pub timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            timeout: Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECS),
        }
    }
}

impl ProviderConfig {
    /// Environment variables:
    /// - `TESSERA_PROVIDER_URL`: provider endpoint (unset = no provider)
    /// - `TESSERA_PROVIDER_TOKEN`: bearer token for the endpoint
    /// - `TESSERA_PROVIDER_TIMEOUT_SECS`: per-call timeout (default: 60)
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("TESSERA_PROVIDER_URL")
                .ok()
                .filter(|u| !u.trim().is_empty()),
            token: std::env::var("TESSERA_PROVIDER_TOKEN")
                .ok()
                .map(SecretString::from),
            timeout: Duration::from_secs(
                std::env::var("TESSERA_PROVIDER_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_PROVIDER_TIMEOUT_SECS),
            ),
        }
    }

    /// Build the provider this config describes.
    pub fn build(&self) -> Result<Arc<dyn IntelligenceProvider>, ProviderError> {
        match &self.url {
            Some(url) => Ok(Arc::new(HttpProvider::new(
                url.clone(),
                self.token.clone(),
                self.timeout,
            )?)),
            None => {
                tracing::warn!("TESSERA_PROVIDER_URL not set; run requests will fail");
                Ok(Arc::new(UnconfiguredProvider))
            }
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Serialize)]
struct InvokeBody<'a> {
    config: &'a VersionConfig,
    input: &'a Value,
}

pub struct HttpProvider {
    client: Client,
    url: String,
    token: Option<SecretString>,
}

impl HttpProvider {
    pub fn new(
        url: String,
        token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::RequestFailed {
                reason: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client, url, token })
    }
}

#[async_trait]
impl IntelligenceProvider for HttpProvider {
    async fn invoke(&self, config: &VersionConfig, input: &Value) -> Result<Value, ProviderError> {
        let mut request = self
            .client
            .post(&self.url)
            .json(&InvokeBody { config, input });
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed {
                reason: format!("HTTP request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::RequestFailed {
                reason: format!("provider answered {}: {}", status, truncate(&body, 256)),
            });
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse {
                reason: format!("failed to parse response: {}", e),
            })?;
        if !payload.is_object() {
            return Err(ProviderError::InvalidResponse {
                reason: "response must be a JSON object".to_string(),
            });
        }
        Ok(payload)
    }
}

impl std::fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProvider")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_missing_url_builds_unconfigured_provider() {
        let provider = ProviderConfig::default().build().unwrap();
        let err = provider
            .invoke(&VersionConfig::new(json!({})), &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::RequestFailed { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_request_failure() {
        let provider = HttpProvider::new(
            "http://127.0.0.1:9/invoke".to_string(),
            None,
            Duration::from_millis(500),
        )
        .unwrap();
        let err = provider
            .invoke(&VersionConfig::new(json!({})), &json!({"q": 1}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::RequestFailed { .. }));
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = ProviderConfig {
            url: Some("https://llm.internal/invoke".into()),
            token: Some(SecretString::from("tok_secret".to_string())),
            ..Default::default()
        };
        assert!(!format!("{:?}", config).contains("tok_secret"));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }

    #[test]
    fn test_body_shape() {
        let config = VersionConfig::new(json!({"temperature": 0.2}));
        let input = json!({"q": "x"});
        let body = serde_json::to_value(InvokeBody {
            config: &config,
            input: &input,
        })
        .unwrap();
        assert_eq!(body, json!({"config": {"temperature": 0.2}, "input": {"q": "x"}}));
    }
}
