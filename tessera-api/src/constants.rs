//! Constants for the Tessera API
//!
//! Header names, environment variable defaults and route prefixes live here
//! so handlers, middleware and tests agree on them.

// ============================================================================
// VERSION HEADERS
// ============================================================================

/// Request header pinning a version; response header naming the resolved one
pub const VERSION_HEADER: &str = "x-version";

/// `active` or `deprecated`
pub const VERSION_STATUS_HEADER: &str = "x-version-status";

/// Present (as `true`) only on responses served by a deprecated version
pub const DEPRECATED_HEADER: &str = "x-deprecated";

/// Upgrade guidance for deprecated versions
pub const DEPRECATED_MESSAGE_HEADER: &str = "x-deprecated-message";

/// RFC 3339 sunset instant for deprecated versions
pub const SUNSET_DATE_HEADER: &str = "x-sunset-date";

/// `hit` or `miss` on run responses
pub const CACHE_STATUS_HEADER: &str = "x-cache";

// ============================================================================
// AUTHENTICATION
// ============================================================================

/// Header carrying the raw API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Prefix accepted in the Authorization header
pub const BEARER_PREFIX: &str = "Bearer ";

// ============================================================================
// SERVER
// ============================================================================

/// Default bind host
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

/// Default port when neither PORT nor TESSERA_API_PORT is set
pub const DEFAULT_PORT: u16 = 3000;

/// Default CORS max age in seconds (24 hours)
pub const DEFAULT_CORS_MAX_AGE_SECS: u64 = 86400;

/// Prefix of every authenticated route
pub const API_PREFIX: &str = "/api/v1";

// ============================================================================
// BACKGROUND JOBS
// ============================================================================

/// Default interval between cache reaper cycles (5 minutes)
pub const DEFAULT_CACHE_REAPER_INTERVAL_SECS: u64 = 300;

// ============================================================================
// PROVIDER
// ============================================================================

/// Default timeout for intelligence provider calls
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 60;
