//! Enum types for Tessera entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Deployment environment of a version and of an API key.
///
/// The two environments are strictly isolated: a request authenticated with
/// a SANDBOX key can only ever be served by SANDBOX versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Environment {
    /// Testing environment. New versions land here on save.
    Sandbox,
    /// Live environment. Versions only arrive here through promotion.
    Production,
}

impl Environment {
    pub const ALL: [Environment; 2] = [Environment::Sandbox, Environment::Production];

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Sandbox => "SANDBOX",
            Environment::Production => "PRODUCTION",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "SANDBOX" => Ok(Environment::Sandbox),
            "PRODUCTION" => Ok(Environment::Production),
            _ => Err(EnumParseError {
                kind: "environment",
                value: s.to_string(),
            }),
        }
    }
}

/// Lifecycle status of a version.
///
/// Only `status` and `deprecated_at` ever change on a stored version, and
/// only in the direction ACTIVE -> DEPRECATED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionStatus {
    /// Saved but not externally servable.
    Draft,
    /// The live version for its (process, environment).
    Active,
    /// Superseded; still servable when pinned.
    Deprecated,
}

impl VersionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionStatus::Draft => "DRAFT",
            VersionStatus::Active => "ACTIVE",
            VersionStatus::Deprecated => "DEPRECATED",
        }
    }
}

impl fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VersionStatus {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DRAFT" => Ok(VersionStatus::Draft),
            "ACTIVE" => Ok(VersionStatus::Active),
            "DEPRECATED" => Ok(VersionStatus::Deprecated),
            _ => Err(EnumParseError {
                kind: "version status",
                value: s.to_string(),
            }),
        }
    }
}

/// Error returned when parsing an enum from its textual form fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumParseError {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for EnumParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for EnumParseError {}
