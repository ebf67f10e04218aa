//! Serving: the request path from version resolution to a cached or fresh
//! provider response.
//!
//! resolve -> validate input -> fingerprint -> cache lookup -> provider on
//! miss -> cache write with the effective TTL.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tessera_core::{
    fingerprint, Environment, Fingerprint, ProcessId, ProviderError, ResolvedVersion, TenantId,
    TesseraConfig, TesseraError, TesseraResult, Timestamp, ValidationError, VersionConfig,
    VersionNumber,
};
use tessera_storage::ResponseCache;
use tracing::debug;

use crate::context::LifecycleContext;
use crate::resolver::VersionResolver;

// ============================================================================
// COLLABORATORS
// ============================================================================

/// The model call behind a process. Receives the resolved version's config
/// and the validated input.
#[async_trait]
pub trait IntelligenceProvider: Send + Sync {
    async fn invoke(&self, config: &VersionConfig, input: &Value) -> Result<Value, ProviderError>;
}

/// Provider used when none is configured. Every call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredProvider;

#[async_trait]
impl IntelligenceProvider for UnconfiguredProvider {
    async fn invoke(&self, _config: &VersionConfig, _input: &Value) -> Result<Value, ProviderError> {
        Err(ProviderError::RequestFailed {
            reason: "no intelligence provider configured".to_string(),
        })
    }
}

/// Validates request input against a version's `input_schema`.
pub trait InputValidator: Send + Sync {
    /// Reject schemas the validator cannot compile.
    fn check_schema(&self, schema: &Value) -> Result<(), ValidationError>;

    /// Validate `input` and return it with undeclared top-level properties removed.
    fn validate(&self, schema: &Value, input: &Value) -> Result<Value, ValidationError>;
}

/// Drop top-level input properties the schema does not declare.
///
/// Schemas without `properties`, or with `additionalProperties: true`, keep
/// the input as is.
pub fn strip_undeclared_properties(schema: &Value, input: &Value) -> Value {
    let (Some(Value::Object(declared)), Value::Object(fields)) =
        (schema.get("properties"), input)
    else {
        return input.clone();
    };
    if schema.get("additionalProperties") == Some(&Value::Bool(true)) {
        return input.clone();
    }
    let kept: Map<String, Value> = fields
        .iter()
        .filter(|(key, _)| declared.contains_key(key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    Value::Object(kept)
}

// ============================================================================
// PIPELINE
// ============================================================================

#[derive(Debug, Clone)]
pub struct ServeRequest {
    pub tenant_id: TenantId,
    pub process_id: ProcessId,
    pub environment: Environment,
    pub pinned: Option<VersionNumber>,
    pub input: Value,
}

/// Outcome of one served request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServeOutcome {
    pub payload: Value,
    pub resolved: ResolvedVersion,
    pub cache_hit: bool,
    /// When the payload was computed; earlier than now on a cache hit.
    pub produced_at: Timestamp,
    pub fingerprint: Fingerprint,
    /// Upgrade guidance, present only for deprecated versions.
    pub deprecation_message: Option<String>,
}

impl ServeOutcome {
    pub fn cache_status(&self) -> &'static str {
        if self.cache_hit {
            "hit"
        } else {
            "miss"
        }
    }
}

#[derive(Clone)]
pub struct ServingPipeline {
    resolver: VersionResolver,
    cache: Arc<ResponseCache>,
    validator: Arc<dyn InputValidator>,
    provider: Arc<dyn IntelligenceProvider>,
    config: TesseraConfig,
}

impl ServingPipeline {
    pub fn new(
        resolver: VersionResolver,
        cache: Arc<ResponseCache>,
        validator: Arc<dyn InputValidator>,
        provider: Arc<dyn IntelligenceProvider>,
        config: TesseraConfig,
    ) -> Self {
        Self {
            resolver,
            cache,
            validator,
            provider,
            config,
        }
    }

    pub fn from_context(
        ctx: &LifecycleContext,
        cache: Arc<ResponseCache>,
        validator: Arc<dyn InputValidator>,
        provider: Arc<dyn IntelligenceProvider>,
    ) -> Self {
        Self::new(ctx.resolver(), cache, validator, provider, ctx.config.clone())
    }

    pub fn resolver(&self) -> &VersionResolver {
        &self.resolver
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub async fn serve(&self, request: ServeRequest) -> TesseraResult<ServeOutcome> {
        let resolved = self
            .resolver
            .resolve(
                request.tenant_id,
                request.process_id,
                request.environment,
                request.pinned,
            )
            .await?;
        let version_number = resolved.version_number();
        let config = resolved.version.config.clone();

        if !request.input.is_object() {
            return Err(ValidationError::InputNotObject.into());
        }
        let input = match config.input_schema() {
            Some(schema) if !schema.is_null() => self.validator.validate(schema, &request.input)?,
            _ => request.input,
        };

        let fp = fingerprint(request.tenant_id, request.process_id, &input);
        let ttl = self.config.effective_cache_ttl(&config);

        let provider = Arc::clone(&self.provider);
        let read = self
            .cache
            .read_through(
                request.tenant_id,
                request.process_id,
                &fp,
                version_number,
                ttl,
                move || async move {
                    provider
                        .invoke(&config, &input)
                        .await
                        .map_err(TesseraError::from)
                },
            )
            .await?;

        debug!(
            tenant_id = %request.tenant_id,
            process_id = %request.process_id,
            environment = %request.environment,
            version_number,
            cache_hit = read.was_cache_hit(),
            ttl_secs = ttl,
            "Request served"
        );

        let deprecation_message = resolved
            .sunset_at
            .filter(|_| resolved.is_deprecated)
            .map(|sunset| self.config.deprecation_message(version_number, sunset));

        Ok(ServeOutcome {
            cache_hit: read.was_cache_hit(),
            produced_at: read.cached_at(),
            payload: read.into_value(),
            resolved,
            fingerprint: fp,
            deprecation_message,
        })
    }
}

impl std::fmt::Debug for ServingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServingPipeline")
            .field("resolver", &self.resolver)
            .field("cache", &self.cache)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
