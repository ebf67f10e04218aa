//! Tessera Core - Entity Types
//!
//! Pure data structures shared by every other crate: identities, the
//! version record and its status machine, cache entries, request
//! fingerprints, the configuration diff engine and the error taxonomy.
//! This crate performs no I/O.

pub mod audit;
pub mod cache;
pub mod clock;
pub mod config;
pub mod diff;
pub mod enums;
pub mod error;
pub mod fingerprint;
pub mod identity;
pub mod version;

pub use audit::{AuditAction, AuditEvent};
pub use cache::CacheEntry;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::TesseraConfig;
pub use diff::{diff_configs, diff_versions, ChangeCount, ChangeKind, FieldChange, VersionDiff};
pub use enums::{Environment, EnumParseError, VersionStatus};
pub use error::{
    ConfigError, ProviderError, StorageError, TesseraError, TesseraResult, ValidationError,
    VersionError,
};
pub use fingerprint::{canonical_json, fingerprint, Fingerprint};
pub use identity::{
    compute_content_hash, new_entity_id, ContentHash, EntityId, ProcessId, TenantId, Timestamp,
    VersionId, VersionNumber,
};
pub use version::{next_version_number, ResolvedVersion, Version, VersionConfig};
