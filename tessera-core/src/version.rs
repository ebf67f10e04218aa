//! Version records and resolution results.

use crate::{Environment, ProcessId, TenantId, Timestamp, VersionId, VersionNumber, VersionStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key in a version config holding the response cache TTL in seconds.
pub const CACHE_TTL_KEY: &str = "cache_ttl_secs";

/// Key in a version config holding the JSON Schema for request input.
pub const INPUT_SCHEMA_KEY: &str = "input_schema";

/// Opaque configuration blob of a version (prompt, schemas, cache TTL, ...).
///
/// Immutable once attached to a version. Only a handful of well-known keys
/// are interpreted by the serving path; everything else is passed through
/// to the intelligence provider untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionConfig(Value);

impl VersionConfig {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Cache TTL requested by this config, if it sets one.
    ///
    /// Negative or non-integer values are treated as "not set".
    pub fn cache_ttl_secs(&self) -> Option<u64> {
        self.0.get(CACHE_TTL_KEY).and_then(Value::as_u64)
    }

    /// JSON Schema the request input must satisfy, if any.
    pub fn input_schema(&self) -> Option<&Value> {
        self.0.get(INPUT_SCHEMA_KEY).filter(|v| !v.is_null())
    }
}

impl From<Value> for VersionConfig {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// One configuration revision of a process.
///
/// Append-only: after insertion only `status` and `deprecated_at` change,
/// and only through [`Version::deprecate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub version_id: VersionId,
    pub tenant_id: TenantId,
    pub process_id: ProcessId,
    pub version_number: VersionNumber,
    pub config: VersionConfig,
    pub environment: Environment,
    pub status: VersionStatus,
    pub created_at: Timestamp,
    pub published_at: Option<Timestamp>,
    pub deprecated_at: Option<Timestamp>,
    pub change_notes: Option<String>,
}

impl Version {
    /// Build a new, published, ACTIVE version.
    pub fn new_active(
        tenant_id: TenantId,
        process_id: ProcessId,
        version_number: VersionNumber,
        config: VersionConfig,
        environment: Environment,
        now: Timestamp,
        change_notes: Option<String>,
    ) -> Self {
        Self {
            version_id: crate::new_entity_id(),
            tenant_id,
            process_id,
            version_number,
            config,
            environment,
            status: VersionStatus::Active,
            created_at: now,
            published_at: Some(now),
            deprecated_at: None,
            change_notes,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == VersionStatus::Active
    }

    pub fn is_deprecated(&self) -> bool {
        self.status == VersionStatus::Deprecated
    }

    /// Drafts are never served to API consumers.
    pub fn is_servable(&self) -> bool {
        matches!(self.status, VersionStatus::Active | VersionStatus::Deprecated)
    }

    /// Whether this version is owned by the given tenant and process.
    pub fn belongs_to(&self, tenant_id: TenantId, process_id: ProcessId) -> bool {
        self.tenant_id == tenant_id && self.process_id == process_id
    }

    /// Transition to DEPRECATED. Config and identity are left untouched.
    pub fn deprecate(&mut self, at: Timestamp) {
        self.status = VersionStatus::Deprecated;
        self.deprecated_at = Some(at);
    }

    /// Sunset date for a deprecated version: `deprecated_at + grace`.
    pub fn sunset_at(&self, grace: chrono::Duration) -> Option<Timestamp> {
        if !self.is_deprecated() {
            return None;
        }
        self.deprecated_at.map(|at| at + grace)
    }
}

/// Next version number for a process: `max(existing) + 1`, starting at 1.
///
/// Deprecated versions count toward the maximum, so numbers are never reused.
pub fn next_version_number<I>(existing: I) -> VersionNumber
where
    I: IntoIterator<Item = VersionNumber>,
{
    existing.into_iter().max().unwrap_or(0) + 1
}

/// Outcome of version resolution for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedVersion {
    pub version: Version,
    pub is_deprecated: bool,
    /// Present only when `is_deprecated` is true.
    pub sunset_at: Option<Timestamp>,
}

impl ResolvedVersion {
    pub fn version_number(&self) -> VersionNumber {
        self.version.version_number
    }

    /// Status label exposed to callers (`active` or `deprecated`).
    pub fn status_label(&self) -> &'static str {
        if self.is_deprecated {
            "deprecated"
        } else {
            "active"
        }
    }
}
