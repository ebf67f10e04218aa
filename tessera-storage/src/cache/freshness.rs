//! Read results that say where the value came from.

use tessera_core::{Timestamp, VersionNumber};

/// A response payload plus its provenance.
///
/// Serving code must know whether a payload came from the cache, because
/// the `cache: hit|miss` marker is part of the response contract.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRead<T> {
    value: T,
    /// When the value was cached, or computed for a miss.
    cached_at: Timestamp,
    /// Version that produced the value.
    version_number: VersionNumber,
    was_cache_hit: bool,
}

impl<T> CacheRead<T> {
    /// A value served from a cache entry.
    pub fn from_cache(value: T, cached_at: Timestamp, version_number: VersionNumber) -> Self {
        Self {
            value,
            cached_at,
            version_number,
            was_cache_hit: true,
        }
    }

    /// A value freshly computed by the provider.
    pub fn from_origin(value: T, computed_at: Timestamp, version_number: VersionNumber) -> Self {
        Self {
            value,
            cached_at: computed_at,
            version_number,
            was_cache_hit: false,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn cached_at(&self) -> Timestamp {
        self.cached_at
    }

    pub fn version_number(&self) -> VersionNumber {
        self.version_number
    }

    pub fn was_cache_hit(&self) -> bool {
        self.was_cache_hit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_provenance_flags() {
        let now = Utc::now();
        assert!(CacheRead::from_cache(1, now, 2).was_cache_hit());
        assert!(!CacheRead::from_origin(1, now, 2).was_cache_hit());
    }
}
