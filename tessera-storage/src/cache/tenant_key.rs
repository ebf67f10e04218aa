//! Tenant-scoped cache keys.
//!
//! `TenantScopedKey`'s private inner struct means a key cannot exist without
//! a tenant, a process and the version that produced the entry. Two tenants
//! sending byte-identical input to processes with the same id can never
//! share an entry, and neither can two versions of one process.

use tessera_core::{CacheEntry, Fingerprint, ProcessId, TenantId, VersionNumber};

/// Separator byte between key segments.
const SEPARATOR: u8 = 0xFF;

/// Length of the `[tenant][sep][process][sep]` prefix.
const PROCESS_PREFIX_LEN: usize = 34;

/// Length of the process prefix plus `[version][sep]`.
const VERSION_PREFIX_LEN: usize = PROCESS_PREFIX_LEN + 5;

/// A cache key scoped to one tenant, one process and one version.
///
/// # Binary Format
///
/// - Bytes 0-15: tenant_id
/// - Byte 16: separator (0xFF)
/// - Bytes 17-32: process_id
/// - Byte 33: separator (0xFF)
/// - Bytes 34-37: version_number (big endian)
/// - Byte 38: separator (0xFF)
/// - Bytes 39..: fingerprint (UTF-8 hex)
///
/// Keys sort by tenant first, then process, so a process prefix scan
/// visits exactly the entries a promotion has to wipe, across all versions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantScopedKey {
    inner: TenantKeyInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TenantKeyInner {
    tenant_id: TenantId,
    process_id: ProcessId,
    version_number: VersionNumber,
    fingerprint: Fingerprint,
}

impl TenantScopedKey {
    pub fn new(
        tenant_id: TenantId,
        process_id: ProcessId,
        version_number: VersionNumber,
        fingerprint: Fingerprint,
    ) -> Self {
        Self {
            inner: TenantKeyInner {
                tenant_id,
                process_id,
                version_number,
                fingerprint,
            },
        }
    }

    /// Key under which `entry` is stored.
    pub fn for_entry(entry: &CacheEntry) -> Self {
        Self::new(
            entry.tenant_id,
            entry.process_id,
            entry.version_number,
            entry.fingerprint.clone(),
        )
    }

    pub fn tenant_id(&self) -> TenantId {
        self.inner.tenant_id
    }

    pub fn process_id(&self) -> ProcessId {
        self.inner.process_id
    }

    pub fn version_number(&self) -> VersionNumber {
        self.inner.version_number
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.inner.fingerprint
    }

    pub fn encode(&self) -> Vec<u8> {
        let fp = self.inner.fingerprint.as_str().as_bytes();
        let mut bytes = Vec::with_capacity(VERSION_PREFIX_LEN + fp.len());
        bytes.extend_from_slice(&Self::process_prefix(self.inner.tenant_id, self.inner.process_id));
        bytes.extend_from_slice(&self.inner.version_number.to_be_bytes());
        bytes.push(SEPARATOR);
        bytes.extend_from_slice(fp);
        bytes
    }

    fn tenant_prefix(tenant_id: TenantId) -> [u8; 17] {
        let mut prefix = [0u8; 17];
        prefix[0..16].copy_from_slice(tenant_id.as_bytes());
        prefix[16] = SEPARATOR;
        prefix
    }

    /// Prefix shared by every key of one tenant's process.
    pub fn process_prefix(tenant_id: TenantId, process_id: ProcessId) -> [u8; PROCESS_PREFIX_LEN] {
        let mut prefix = [0u8; PROCESS_PREFIX_LEN];
        prefix[0..17].copy_from_slice(&Self::tenant_prefix(tenant_id));
        prefix[17..33].copy_from_slice(process_id.as_bytes());
        prefix[33] = SEPARATOR;
        prefix
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn uuid_strategy() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        /// Every key of a process starts with that process's prefix, and
        /// never with another tenant's prefix.
        #[test]
        fn prop_process_prefix_is_prefix(
            tenant_id in uuid_strategy(),
            other_tenant in uuid_strategy(),
            process_id in uuid_strategy(),
            version_number in 1i32..10_000,
            fp in "[0-9a-f]{1,64}",
        ) {
            let key = TenantScopedKey::new(tenant_id, process_id, version_number, Fingerprint::from_hex(fp));
            let encoded = key.encode();
            let prefix = TenantScopedKey::process_prefix(tenant_id, process_id);
            prop_assert!(encoded.starts_with(&prefix));
            if other_tenant != tenant_id {
                prop_assert!(!encoded.starts_with(&TenantScopedKey::tenant_prefix(other_tenant)));
            }
        }

        /// Distinct (version, fingerprint) pairs never share an encoding.
        #[test]
        fn prop_encoding_is_injective(
            tenant_id in uuid_strategy(),
            process_id in uuid_strategy(),
            a in (1i32..50, "[0-9a-f]{1,8}"),
            b in (1i32..50, "[0-9a-f]{1,8}"),
        ) {
            let ka = TenantScopedKey::new(tenant_id, process_id, a.0, Fingerprint::from_hex(a.1.clone()));
            let kb = TenantScopedKey::new(tenant_id, process_id, b.0, Fingerprint::from_hex(b.1.clone()));
            prop_assert_eq!(ka.encode() == kb.encode(), a == b);
        }
    }
}
