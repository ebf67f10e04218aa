//! Response cache with tenant isolation and a version-stamp read contract.
//!
//! Entries are addressed by [`TenantScopedKey`], which cannot be built
//! without a tenant and a process. Reads go through [`ResponseCache`], which
//! treats an entry as a miss when it has expired or when it was produced by
//! a different version than the one the request resolved to. Bulk
//! invalidation on promotion and rollback happens inside the version store
//! transaction, not here.

pub mod freshness;
pub mod response_cache;
pub mod tenant_key;
pub mod traits;

pub use freshness::CacheRead;
pub use response_cache::ResponseCache;
pub use tenant_key::TenantScopedKey;
pub use traits::{CacheStats, CacheStore};
