//! Tessera Test Utilities
//!
//! Shared test infrastructure for the Tessera workspace:
//! - Proptest generators for versions, configs and request inputs
//! - Mock intelligence providers
//! - Fixtures that seed version histories
//! - Assertions on the error taxonomy

pub use tessera_core::{
    Environment, ProcessId, StorageError, TenantId, TesseraError, TesseraResult, Timestamp,
    ValidationError, Version, VersionConfig, VersionError, VersionNumber, VersionStatus,
};
pub use tessera_storage::{InMemoryStore, VersionStore};

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use tessera_core::ProviderError;
use tessera_lifecycle::IntelligenceProvider;

// ============================================================================
// MOCK PROVIDERS
// ============================================================================

/// Provider that answers with the config's `temperature` and the input it
/// received, counting calls.
#[derive(Debug, Default)]
pub struct EchoProvider {
    calls: AtomicUsize,
}

impl EchoProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IntelligenceProvider for EchoProvider {
    async fn invoke(&self, config: &VersionConfig, input: &Value) -> Result<Value, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(json!({
            "echo": input,
            "temperature": config.as_value().get("temperature").cloned().unwrap_or(Value::Null),
            "call": call,
        }))
    }
}

/// Provider whose every call fails.
#[derive(Debug, Clone)]
pub struct FailingProvider {
    reason: String,
}

impl FailingProvider {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl IntelligenceProvider for FailingProvider {
    async fn invoke(&self, _config: &VersionConfig, _input: &Value) -> Result<Value, ProviderError> {
        Err(ProviderError::RequestFailed {
            reason: self.reason.clone(),
        })
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Tessera types.

    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    pub fn arb_environment() -> impl Strategy<Value = Environment> {
        prop_oneof![Just(Environment::Sandbox), Just(Environment::Production)]
    }

    /// Flat JSON scalars.
    pub fn arb_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| json!(n)),
            "[a-z ]{0,16}".prop_map(Value::String),
        ]
    }

    /// JSON objects nested up to three levels.
    pub fn arb_json_object() -> impl Strategy<Value = Value> {
        let leaf = arb_scalar();
        let tree = leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        });
        prop::collection::btree_map("[a-z]{1,6}", tree, 0..5)
            .prop_map(|m| Value::Object(m.into_iter().collect()))
    }

    /// Version configs with an optional cache TTL.
    pub fn arb_version_config() -> impl Strategy<Value = VersionConfig> {
        (
            0.0f64..2.0,
            "[a-zA-Z ]{1,40}",
            prop::option::of(0u64..3_600),
        )
            .prop_map(|(temperature, system, ttl)| {
                let mut config = json!({
                    "temperature": temperature,
                    "prompt": {"system": system},
                });
                if let Some(ttl) = ttl {
                    config["cache_ttl_secs"] = json!(ttl);
                }
                VersionConfig::new(config)
            })
    }

    /// Lifecycle operation scripts for state-machine style tests.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum LifecycleOp {
        Save,
        /// Promote the current SANDBOX version.
        Promote,
        /// Roll back to the n-th version ever created (modulo history length).
        Rollback(usize),
    }

    pub fn arb_lifecycle_op() -> impl Strategy<Value = LifecycleOp> {
        prop_oneof![
            3 => Just(LifecycleOp::Save),
            2 => Just(LifecycleOp::Promote),
            1 => any::<usize>().prop_map(LifecycleOp::Rollback),
        ]
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built configs and seeded histories.

    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    pub fn tenant_id() -> TenantId {
        Uuid::now_v7()
    }

    pub fn process_id() -> ProcessId {
        Uuid::now_v7()
    }

    pub fn config_with_temperature(temperature: f64) -> VersionConfig {
        VersionConfig::new(json!({"temperature": temperature}))
    }

    /// Config with a cache TTL and an input schema requiring `question`.
    pub fn cached_config(temperature: f64, ttl_secs: u64) -> VersionConfig {
        VersionConfig::new(json!({
            "temperature": temperature,
            "cache_ttl_secs": ttl_secs,
            "input_schema": {
                "type": "object",
                "required": ["question"],
                "properties": {"question": {"type": "string"}}
            }
        }))
    }

    /// Insert a version directly into the store, bypassing the lifecycle rules.
    pub async fn seed_version(
        store: &dyn VersionStore,
        tenant_id: TenantId,
        process_id: ProcessId,
        number: VersionNumber,
        environment: Environment,
        status: VersionStatus,
        config: VersionConfig,
    ) -> TesseraResult<Version> {
        let now = Utc::now();
        let mut version =
            Version::new_active(tenant_id, process_id, number, config, environment, now, None);
        match status {
            VersionStatus::Active => {}
            VersionStatus::Deprecated => version.deprecate(now),
            VersionStatus::Draft => {
                version.status = VersionStatus::Draft;
                version.published_at = None;
            }
        }
        let mut tx = store.begin(tenant_id, process_id).await?;
        if let Err(e) = tx.version_insert(&version).await {
            tx.abort().await;
            return Err(e);
        }
        tx.commit().await?;
        Ok(version)
    }

    /// PRODUCTION v1 `{temperature: 0.7}` and SANDBOX v2 `{temperature: 0.9}`.
    pub async fn promotion_scenario(
        store: &dyn VersionStore,
        tenant_id: TenantId,
        process_id: ProcessId,
    ) -> TesseraResult<(Version, Version)> {
        let v1 = seed_version(
            store,
            tenant_id,
            process_id,
            1,
            Environment::Production,
            VersionStatus::Active,
            config_with_temperature(0.7),
        )
        .await?;
        let v2 = seed_version(
            store,
            tenant_id,
            process_id,
            2,
            Environment::Sandbox,
            VersionStatus::Active,
            config_with_temperature(0.9),
        )
        .await?;
        Ok((v1, v2))
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on the Tessera error taxonomy.

    use super::*;

    #[track_caller]
    pub fn assert_version_error<T: std::fmt::Debug>(
        result: &TesseraResult<T>,
        matches: impl FnOnce(&VersionError) -> bool,
    ) {
        match result {
            Err(TesseraError::Version(e)) if matches(e) => {}
            other => panic!("Expected matching Version error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_conflict<T: std::fmt::Debug>(result: &TesseraResult<T>) {
        match result {
            Err(TesseraError::Storage(StorageError::TransactionConflict { .. })) => {}
            other => panic!("Expected TransactionConflict, got: {:?}", other),
        }
    }

    /// At most one ACTIVE version per environment, and unique numbers.
    #[track_caller]
    pub fn assert_history_invariants(versions: &[Version]) {
        for env in Environment::ALL {
            let active = versions
                .iter()
                .filter(|v| v.environment == env && v.status == VersionStatus::Active)
                .count();
            assert!(active <= 1, "{active} ACTIVE {env} versions");
        }
        let mut numbers: Vec<VersionNumber> = versions.iter().map(|v| v.version_number).collect();
        numbers.sort_unstable();
        let before = numbers.len();
        numbers.dedup();
        assert_eq!(before, numbers.len(), "version numbers reused");
    }
}

#[cfg(test)]
mod tests {
    use super::assertions::*;
    use super::fixtures::*;
    use super::generators::*;
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_promotion_scenario_seeds_two_versions() {
        let store = InMemoryStore::new();
        let (tenant, process) = (tenant_id(), process_id());
        let (v1, v2) = promotion_scenario(&store, tenant, process).await.unwrap();
        assert_eq!((v1.version_number, v2.version_number), (1, 2));
        let history = store.list(tenant, process).await.unwrap();
        assert_history_invariants(&history);
        assert_eq!(history[0].version_id, v2.version_id);
    }

    #[tokio::test]
    async fn test_echo_provider_counts() {
        let provider = EchoProvider::new();
        let out = provider
            .invoke(&config_with_temperature(0.3), &json!({"q": 1}))
            .await
            .unwrap();
        assert_eq!(out["temperature"], json!(0.3));
        assert_eq!(out["echo"], json!({"q": 1}));
        assert_eq!(provider.calls(), 1);
        assert!(FailingProvider::new("down")
            .invoke(&config_with_temperature(0.3), &json!({}))
            .await
            .is_err());
    }

    proptest! {
        #[test]
        fn prop_generated_configs_are_objects(config in arb_version_config()) {
            prop_assert!(config.as_value().is_object());
        }

        #[test]
        fn prop_generated_inputs_are_objects(input in arb_json_object()) {
            prop_assert!(input.is_object());
        }
    }
}
