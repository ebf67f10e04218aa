//! HTTP error surface.
//!
//! Every failure leaves the server as `{code, message, details?, retryable?}`
//! with a status derived from `code`. Core errors are translated here and
//! nowhere else.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use tessera_core::{
    ConfigError, ProviderError, StorageError, TesseraError, ValidationError, VersionError,
};

/// Machine-readable failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Missing or unknown API key.
    Unauthorized,
    /// Pinned version lives in the other environment.
    VersionEnvironmentMismatch,
    /// Input rejected by the process's input schema.
    ValidationFailed,
    InvalidInput,
    /// Malformed path, query or header value.
    InvalidFormat,
    EntityNotFound,
    /// Pinned version number is unknown or retired.
    VersionNotFound,
    NoActiveVersion,
    /// Lost a race against another writer on the same process.
    ConcurrentModification,
    /// Transition precondition not met (wrong status or environment).
    StateConflict,
    ProviderFailed,
    InternalError,
    DatabaseError,
    /// No pooled connection became free in time, or the pool is closed.
    ConnectionPoolExhausted,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        use ErrorCode::*;
        match self {
            Unauthorized => StatusCode::UNAUTHORIZED,
            VersionEnvironmentMismatch => StatusCode::FORBIDDEN,
            ValidationFailed | InvalidInput | InvalidFormat => StatusCode::BAD_REQUEST,
            EntityNotFound | VersionNotFound | NoActiveVersion => StatusCode::NOT_FOUND,
            ConcurrentModification | StateConflict => StatusCode::CONFLICT,
            ProviderFailed => StatusCode::BAD_GATEWAY,
            ConnectionPoolExhausted => StatusCode::SERVICE_UNAVAILABLE,
            InternalError | DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Response body for every non-2xx answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    /// Structured context such as available versions or schema errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// True when an identical retry can succeed.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            retryable: false,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    /// `field` could not be parsed; `expected` describes the accepted shape.
    pub fn invalid_format(field: &str, expected: &str) -> Self {
        Self::new(
            ErrorCode::InvalidFormat,
            format!("'{}' must be {}", field, expected),
        )
        .with_details(json!({ "field": field }))
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

impl From<VersionError> for ApiError {
    fn from(err: VersionError) -> Self {
        let message = err.to_string();
        match err {
            VersionError::NoActiveVersion {
                process_id,
                environment,
            } => Self::new(ErrorCode::NoActiveVersion, message).with_details(json!({
                "process_id": process_id,
                "environment": environment,
            })),
            VersionError::VersionNotFound {
                process_id,
                environment,
                requested,
                available,
            } => Self::new(ErrorCode::VersionNotFound, message).with_details(json!({
                "process_id": process_id,
                "environment": environment,
                "requested": requested,
                "available_versions": available,
            })),
            VersionError::VersionEnvironmentMismatch {
                version_number,
                requested,
                actual,
                ..
            } => Self::new(ErrorCode::VersionEnvironmentMismatch, message).with_details(json!({
                "version_number": version_number,
                "requested_environment": requested,
                "version_environment": actual,
            })),
            VersionError::VersionIdNotFound { version_id } => {
                Self::new(ErrorCode::EntityNotFound, message)
                    .with_details(json!({ "version_id": version_id }))
            }
            VersionError::NotSandboxVersion { version_id, .. }
            | VersionError::NotActiveVersion { version_id, .. }
            | VersionError::CannotRollbackToCurrentSandbox { version_id, .. } => {
                Self::new(ErrorCode::StateConflict, message)
                    .with_details(json!({ "version_id": version_id }))
            }
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        if let StorageError::TransactionConflict { process_id } = err {
            return Self::new(ErrorCode::ConcurrentModification, err.to_string())
                .with_details(json!({ "process_id": process_id }))
                .retryable();
        }
        // backend detail stays in the log
        tracing::error!(error = %err, "store call failed");
        Self::database_error("Storage backend failure")
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        let message = err.to_string();
        match err {
            ValidationError::InvalidVersionHeader { value } => {
                Self::new(ErrorCode::InvalidFormat, message)
                    .with_details(json!({ "header": "X-Version", "value": value }))
            }
            ValidationError::InputSchemaViolation { errors } => {
                Self::new(ErrorCode::ValidationFailed, message)
                    .with_details(json!({ "errors": errors }))
            }
            ValidationError::InvalidValue { field, .. } => {
                Self::new(ErrorCode::InvalidInput, message).with_details(json!({ "field": field }))
            }
            ValidationError::InvalidSchema { .. } | ValidationError::InputNotObject => {
                Self::new(ErrorCode::InvalidInput, message)
            }
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        tracing::error!(error = %err, "invalid configuration reached a handler");
        Self::internal_error(err.to_string())
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        tracing::warn!(error = %err, "provider call failed");
        Self::new(ErrorCode::ProviderFailed, err.to_string())
    }
}

impl From<TesseraError> for ApiError {
    fn from(err: TesseraError) -> Self {
        match err {
            TesseraError::Version(e) => e.into(),
            TesseraError::Storage(e) => e.into(),
            TesseraError::Validation(e) => e.into(),
            TesseraError::Config(e) => e.into(),
            TesseraError::Provider(e) => e.into(),
        }
    }
}

impl From<tokio_postgres::Error> for ApiError {
    fn from(err: tokio_postgres::Error) -> Self {
        tracing::error!(error = %err, code = ?err.code(), "postgres query failed");
        Self::database_error("Storage backend failure")
    }
}

impl From<deadpool_postgres::PoolError> for ApiError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        tracing::error!(error = %err, "could not check out a connection");
        match err {
            deadpool_postgres::PoolError::Timeout(_) | deadpool_postgres::PoolError::Closed => {
                Self::new(
                    ErrorCode::ConnectionPoolExhausted,
                    "No database connection available",
                )
                .retryable()
            }
            _ => Self::database_error("Storage backend failure"),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorCode::InvalidInput, format!("malformed JSON: {}", err))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::Environment;
    use uuid::Uuid;

    #[test]
    fn test_error_code_status_mapping() {
        assert_eq!(ErrorCode::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ErrorCode::VersionEnvironmentMismatch.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(ErrorCode::InvalidFormat.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::VersionNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::NoActiveVersion.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::StateConflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::ProviderFailed.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            ErrorCode::ConnectionPoolExhausted.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_version_not_found_carries_available_versions() {
        let err: ApiError = TesseraError::from(VersionError::VersionNotFound {
            process_id: Uuid::nil(),
            environment: Environment::Production,
            requested: 7,
            available: vec![1, 3],
        })
        .into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        let details = err.details.unwrap();
        assert_eq!(details["available_versions"], json!([1, 3]));
        assert_eq!(details["requested"], json!(7));
        assert_eq!(details["environment"], json!("PRODUCTION"));
    }

    #[test]
    fn test_mismatch_is_forbidden() {
        let err: ApiError = VersionError::VersionEnvironmentMismatch {
            process_id: Uuid::nil(),
            version_number: 2,
            requested: Environment::Sandbox,
            actual: Environment::Production,
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(err.details.unwrap()["version_environment"], json!("PRODUCTION"));
    }

    #[test]
    fn test_preconditions_are_state_conflicts() {
        let err: ApiError = VersionError::CannotRollbackToCurrentSandbox {
            version_id: Uuid::nil(),
            version_number: 4,
        }
        .into();
        assert_eq!(err.code, ErrorCode::StateConflict);
        assert!(!err.retryable);
    }

    #[test]
    fn test_conflict_is_retryable() {
        let err: ApiError = StorageError::TransactionConflict {
            process_id: Uuid::nil(),
        }
        .into();
        assert_eq!(err.code, ErrorCode::ConcurrentModification);
        assert!(err.retryable);
        let body = serde_json::to_value(&err).unwrap();
        assert_eq!(body["retryable"], json!(true));
    }

    #[test]
    fn test_backend_error_is_generic() {
        let err: ApiError = StorageError::Backend {
            reason: "password authentication failed for user tessera".into(),
        }
        .into();
        assert_eq!(err.code, ErrorCode::DatabaseError);
        assert!(!err.message.contains("password"));
    }

    #[test]
    fn test_bad_header_is_invalid_format() {
        let err: ApiError = ValidationError::InvalidVersionHeader {
            value: "abc".into(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code, ErrorCode::InvalidFormat);
    }

    #[test]
    fn test_schema_violation_lists_errors() {
        let err: ApiError = ValidationError::InputSchemaViolation {
            errors: vec!["/question: 1 is not of type \"string\"".into()],
        }
        .into();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
        assert_eq!(err.details.unwrap()["errors"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn test_provider_failure_is_bad_gateway() {
        let err: ApiError = ProviderError::RequestFailed {
            reason: "timeout".into(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_error_serialization() -> Result<(), serde_json::Error> {
        let err = ApiError::unauthorized("Invalid API key");
        let json = serde_json::to_string(&err)?;

        assert!(json.contains("UNAUTHORIZED"));
        assert!(!json.contains("retryable"));

        let deserialized: ApiError = serde_json::from_str(&json)?;
        assert_eq!(deserialized, err);
        Ok(())
    }
}
