//! Shared fixtures for this crate's unit tests.

use std::sync::Arc;

use serde_json::{json, Value};
use tessera_core::{
    Clock, Environment, ManualClock, ProcessId, TenantId, TesseraConfig, ValidationError, Version,
    VersionConfig, VersionNumber, VersionStatus,
};
use tessera_storage::{InMemoryStore, VersionStore};
use uuid::Uuid;

use crate::audit::{spawn_audit_worker, MemoryAuditSink};
use crate::context::LifecycleContext;
use crate::resolver::VersionResolver;
use crate::serving::{strip_undeclared_properties, InputValidator};

pub(crate) struct Fixture {
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<ManualClock>,
    pub audit: MemoryAuditSink,
    pub ctx: LifecycleContext,
    pub tenant: TenantId,
    pub process: ProcessId,
}

impl Fixture {
    /// Must be called inside a tokio runtime; spawns the audit worker.
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::starting_now());
        let audit = MemoryAuditSink::new();
        let (sender, _handle) = spawn_audit_worker(Arc::new(audit.clone()), 64);
        let ctx = LifecycleContext::new(
            store.clone(),
            clock.clone(),
            TesseraConfig::default(),
            sender,
        );
        Self {
            store,
            clock,
            audit,
            ctx,
            tenant: Uuid::now_v7(),
            process: Uuid::now_v7(),
        }
    }

    pub fn resolver(&self) -> VersionResolver {
        self.ctx.resolver()
    }

    /// Wait until the audit worker has recorded `n` events.
    pub async fn audit_events(&self, n: usize) -> Vec<tessera_core::AuditEvent> {
        for _ in 0..200 {
            let events = self.audit.events();
            if events.len() >= n {
                return events;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        self.audit.events()
    }
}

/// Insert a version with the given number, environment and status.
pub(crate) async fn seed(
    fx: &Fixture,
    number: VersionNumber,
    env: Environment,
    status: VersionStatus,
) -> Version {
    seed_config(fx, number, env, status, json!({"temperature": number})).await
}

pub(crate) async fn seed_config(
    fx: &Fixture,
    number: VersionNumber,
    env: Environment,
    status: VersionStatus,
    config: serde_json::Value,
) -> Version {
    let now = fx.clock.now();
    let mut version = Version::new_active(
        fx.tenant,
        fx.process,
        number,
        VersionConfig::new(config),
        env,
        now,
        None,
    );
    match status {
        VersionStatus::Active => {}
        VersionStatus::Deprecated => version.deprecate(now),
        VersionStatus::Draft => {
            version.status = VersionStatus::Draft;
            version.published_at = None;
        }
    }
    let mut tx = fx.store.begin(fx.tenant, fx.process).await.unwrap();
    tx.version_insert(&version).await.unwrap();
    tx.commit().await.unwrap();
    version
}

/// Stand-in for the JSON Schema validator: checks `required` keys and
/// string-typed properties only.
pub(crate) struct FakeSchemaValidator;

impl InputValidator for FakeSchemaValidator {
    fn check_schema(&self, schema: &Value) -> Result<(), ValidationError> {
        if schema.is_object() {
            Ok(())
        } else {
            Err(ValidationError::InvalidSchema {
                reason: "not an object".into(),
            })
        }
    }

    fn validate(&self, schema: &Value, input: &Value) -> Result<Value, ValidationError> {
        let mut errors = Vec::new();
        for key in schema["required"].as_array().into_iter().flatten() {
            let key = key.as_str().unwrap_or_default();
            if input.get(key).is_none() {
                errors.push(format!("{key}: missing"));
            }
        }
        for (key, property) in schema["properties"].as_object().into_iter().flatten() {
            if property["type"] == "string" && input.get(key).is_some_and(|v| !v.is_string()) {
                errors.push(format!("{key}: expected string"));
            }
        }
        if errors.is_empty() {
            Ok(strip_undeclared_properties(schema, input))
        } else {
            Err(ValidationError::InputSchemaViolation { errors })
        }
    }
}
