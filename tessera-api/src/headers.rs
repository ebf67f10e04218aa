//! The `X-Version` header contract.
//!
//! Requests may pin a version with `X-Version: <positive integer>`. Responses
//! always name the resolved version and its status, and deprecated versions
//! additionally carry `X-Deprecated`, `X-Deprecated-Message` and
//! `X-Sunset-Date`.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, HeaderName, HeaderValue},
};
use chrono::SecondsFormat;
use tessera_core::{ResolvedVersion, ValidationError, VersionNumber};

use crate::constants::{
    DEPRECATED_HEADER, DEPRECATED_MESSAGE_HEADER, SUNSET_DATE_HEADER, VERSION_HEADER,
    VERSION_STATUS_HEADER,
};
use crate::error::ApiError;

/// Parse the optional `X-Version` request header.
///
/// An absent header means "latest active". Anything other than a positive
/// integer (after trimming) is rejected before resolution is attempted.
pub fn parse_version_header(
    headers: &HeaderMap,
) -> Result<Option<VersionNumber>, ValidationError> {
    let Some(value) = headers.get(VERSION_HEADER) else {
        return Ok(None);
    };
    let invalid = || ValidationError::InvalidVersionHeader {
        value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
    };
    let text = value.to_str().map_err(|_| invalid())?.trim();
    match text.parse::<VersionNumber>() {
        Ok(n) if n > 0 => Ok(Some(n)),
        _ => Err(invalid()),
    }
}

/// Extractor for the pinned version of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinnedVersion(pub Option<VersionNumber>);

#[axum::async_trait]
impl<S> FromRequestParts<S> for PinnedVersion
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parse_version_header(&parts.headers)
            .map(PinnedVersion)
            .map_err(ApiError::from)
    }
}

/// Response headers describing a resolved version.
///
/// `deprecation_message` is only used when the version is deprecated.
/// Values that cannot be encoded as header values are dropped.
pub fn version_headers(resolved: &ResolvedVersion, deprecation_message: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    insert(
        &mut headers,
        VERSION_HEADER,
        &resolved.version_number().to_string(),
    );
    insert(&mut headers, VERSION_STATUS_HEADER, resolved.status_label());

    if resolved.is_deprecated {
        insert(&mut headers, DEPRECATED_HEADER, "true");
        if let Some(message) = deprecation_message {
            insert(&mut headers, DEPRECATED_MESSAGE_HEADER, message);
        }
        if let Some(sunset) = resolved.sunset_at {
            insert(
                &mut headers,
                SUNSET_DATE_HEADER,
                &sunset.to_rfc3339_opts(SecondsFormat::Secs, true),
            );
        }
    }
    headers
}

pub(crate) fn insert(headers: &mut HeaderMap, name: &'static str, value: &str) {
    match HeaderValue::from_str(value) {
        Ok(v) => {
            headers.insert(HeaderName::from_static(name), v);
        }
        Err(_) => tracing::warn!(header = name, "Dropping header with unencodable value"),
    }
}
