//! Error types for Tessera operations

use crate::{Environment, ProcessId, VersionId, VersionNumber, VersionStatus};
use thiserror::Error;

/// Version lifecycle and resolution errors.
///
/// Every variant is terminal for the request that produced it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VersionError {
    #[error("No active {environment} version for process {process_id}")]
    NoActiveVersion {
        process_id: ProcessId,
        environment: Environment,
    },

    #[error(
        "Version {requested} not found for process {process_id} in {environment}; available versions: {available:?}"
    )]
    VersionNotFound {
        process_id: ProcessId,
        environment: Environment,
        requested: VersionNumber,
        available: Vec<VersionNumber>,
    },

    #[error("Version {version_number} is a {actual} version and cannot be used from {requested}")]
    VersionEnvironmentMismatch {
        process_id: ProcessId,
        version_number: VersionNumber,
        requested: Environment,
        actual: Environment,
    },

    #[error("Version {version_id} not found")]
    VersionIdNotFound { version_id: VersionId },

    #[error("Version {version_id} is a {environment} version; only SANDBOX versions can be promoted")]
    NotSandboxVersion {
        version_id: VersionId,
        environment: Environment,
    },

    #[error("Version {version_id} is {status}; only ACTIVE versions can be promoted")]
    NotActiveVersion {
        version_id: VersionId,
        status: VersionStatus,
    },

    #[error("Version {version_number} is already the active SANDBOX version")]
    CannotRollbackToCurrentSandbox {
        version_id: VersionId,
        version_number: VersionNumber,
    },
}

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// Another transaction committed a change to the same process first.
    #[error("Concurrent modification of process {process_id}; retry the operation")]
    TransactionConflict { process_id: ProcessId },

    #[error("Unique constraint {constraint} violated")]
    UniqueViolation { constraint: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("Stored data is malformed: {reason}")]
    Corrupt { reason: String },

    #[error("Storage backend error: {reason}")]
    Backend { reason: String },
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid X-Version header {value:?}: expected a positive integer")]
    InvalidVersionHeader { value: String },

    #[error("Input does not match the process input schema: {}", errors.join("; "))]
    InputSchemaViolation { errors: Vec<String> },

    #[error("Input schema is invalid: {reason}")]
    InvalidSchema { reason: String },

    #[error("Input must be a JSON object")]
    InputNotObject,

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Errors reported by the intelligence provider collaborator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Provider request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Provider returned an invalid response: {reason}")]
    InvalidResponse { reason: String },
}

/// Master error type for all Tessera errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TesseraError {
    #[error("Version error: {0}")]
    Version(#[from] VersionError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

impl TesseraError {
    /// Only transactional conflicts are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TesseraError::Storage(StorageError::TransactionConflict { .. })
        )
    }
}

/// Result type alias for Tessera operations.
pub type TesseraResult<T> = Result<T, TesseraError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_version_not_found_lists_available() {
        let err = VersionError::VersionNotFound {
            process_id: Uuid::nil(),
            environment: Environment::Production,
            requested: 9,
            available: vec![1, 3],
        };
        let msg = err.to_string();
        assert!(msg.contains("Version 9 not found"));
        assert!(msg.contains("[1, 3]"));
        assert!(msg.contains("PRODUCTION"));
    }

    #[test]
    fn test_mismatch_display_names_both_environments() {
        let err = VersionError::VersionEnvironmentMismatch {
            process_id: Uuid::nil(),
            version_number: 2,
            requested: Environment::Sandbox,
            actual: Environment::Production,
        };
        let msg = err.to_string();
        assert!(msg.contains("PRODUCTION"));
        assert!(msg.contains("SANDBOX"));
    }

    #[test]
    fn test_schema_violation_joins_errors() {
        let err = ValidationError::InputSchemaViolation {
            errors: vec!["/a: bad".into(), "/b: worse".into()],
        };
        assert!(err.to_string().contains("/a: bad; /b: worse"));
    }

    #[test]
    fn test_master_error_from_conversions() {
        let version = TesseraError::from(VersionError::VersionIdNotFound {
            version_id: Uuid::nil(),
        });
        assert!(matches!(version, TesseraError::Version(_)));

        let storage = TesseraError::from(StorageError::LockPoisoned);
        assert!(matches!(storage, TesseraError::Storage(_)));

        let validation = TesseraError::from(ValidationError::InputNotObject);
        assert!(matches!(validation, TesseraError::Validation(_)));

        let provider = TesseraError::from(ProviderError::RequestFailed {
            reason: "timeout".into(),
        });
        assert!(matches!(provider, TesseraError::Provider(_)));
    }

    #[test]
    fn test_only_conflicts_are_retryable() {
        let conflict = TesseraError::from(StorageError::TransactionConflict {
            process_id: Uuid::nil(),
        });
        assert!(conflict.is_retryable());

        let not_found = TesseraError::from(VersionError::NoActiveVersion {
            process_id: Uuid::nil(),
            environment: Environment::Sandbox,
        });
        assert!(!not_found.is_retryable());
        assert!(!TesseraError::from(StorageError::LockPoisoned).is_retryable());
    }
}
