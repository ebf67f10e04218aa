//! Request-time version resolution.
//!
//! Picks exactly one stored version for a request, or fails with a typed,
//! terminal error. Resolution is a pair of store reads and never calls out
//! to the provider or the audit sink.

use std::sync::Arc;

use chrono::Duration;
use tessera_core::{
    Environment, ProcessId, ResolvedVersion, TenantId, TesseraResult, Version, VersionError,
    VersionNumber, VersionStatus,
};
use tessera_storage::VersionStore;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct VersionResolver {
    store: Arc<dyn VersionStore>,
    sunset_grace: Duration,
}

impl VersionResolver {
    pub fn new(store: Arc<dyn VersionStore>, sunset_grace: Duration) -> Self {
        Self {
            store,
            sunset_grace,
        }
    }

    /// Resolve the version serving a request.
    ///
    /// Without a pin, returns the ACTIVE version of `environment`. With a
    /// pin, looks the number up regardless of status and then enforces, in
    /// order: environment match, not a draft. Versions of other tenants are
    /// reported exactly like missing ones.
    pub async fn resolve(
        &self,
        tenant_id: TenantId,
        process_id: ProcessId,
        environment: Environment,
        pinned: Option<VersionNumber>,
    ) -> TesseraResult<ResolvedVersion> {
        let Some(number) = pinned else {
            let version = self
                .store
                .find_active(tenant_id, process_id, environment)
                .await?
                .ok_or(VersionError::NoActiveVersion {
                    process_id,
                    environment,
                })?;
            return Ok(self.resolved(version));
        };

        let Some(version) = self
            .store
            .find_by_number(tenant_id, process_id, number)
            .await?
        else {
            return Err(self
                .not_found(tenant_id, process_id, environment, number)
                .await?
                .into());
        };

        if version.environment != environment {
            warn!(
                target: "tessera::security",
                %tenant_id,
                %process_id,
                version_number = number,
                requested_environment = %environment,
                version_environment = %version.environment,
                "Pinned version belongs to the other environment"
            );
            return Err(VersionError::VersionEnvironmentMismatch {
                process_id,
                version_number: number,
                requested: environment,
                actual: version.environment,
            }
            .into());
        }

        if version.status == VersionStatus::Draft {
            debug!(%tenant_id, %process_id, version_number = number, "Pinned version is a draft");
            return Err(self
                .not_found(tenant_id, process_id, environment, number)
                .await?
                .into());
        }

        Ok(self.resolved(version))
    }

    /// Servable version numbers of a process in one environment, ascending.
    pub async fn available_versions(
        &self,
        tenant_id: TenantId,
        process_id: ProcessId,
        environment: Environment,
    ) -> TesseraResult<Vec<VersionNumber>> {
        let mut numbers: Vec<VersionNumber> = self
            .store
            .list(tenant_id, process_id)
            .await?
            .into_iter()
            .filter(|v| v.environment == environment && v.is_servable())
            .map(|v| v.version_number)
            .collect();
        numbers.sort_unstable();
        Ok(numbers)
    }

    async fn not_found(
        &self,
        tenant_id: TenantId,
        process_id: ProcessId,
        environment: Environment,
        requested: VersionNumber,
    ) -> TesseraResult<VersionError> {
        Ok(VersionError::VersionNotFound {
            process_id,
            environment,
            requested,
            available: self
                .available_versions(tenant_id, process_id, environment)
                .await?,
        })
    }

    fn resolved(&self, version: Version) -> ResolvedVersion {
        let is_deprecated = version.is_deprecated();
        let sunset_at = version.sunset_at(self.sunset_grace);
        ResolvedVersion {
            version,
            is_deprecated,
            sunset_at,
        }
    }
}

impl std::fmt::Debug for VersionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionResolver")
            .field("sunset_grace", &self.sunset_grace)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{seed, Fixture};
    use tessera_core::TesseraError;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_unpinned_returns_active() {
        let fx = Fixture::new();
        let v1 = seed(&fx, 1, Environment::Production, VersionStatus::Active).await;
        seed(&fx, 2, Environment::Sandbox, VersionStatus::Active).await;

        let resolved = fx
            .resolver()
            .resolve(fx.tenant, fx.process, Environment::Production, None)
            .await
            .unwrap();
        assert_eq!(resolved.version, v1);
        assert!(!resolved.is_deprecated);
        assert!(resolved.sunset_at.is_none());
    }

    #[tokio::test]
    async fn test_unpinned_without_active_fails() {
        let fx = Fixture::new();
        seed(&fx, 1, Environment::Sandbox, VersionStatus::Active).await;
        let err = fx
            .resolver()
            .resolve(fx.tenant, fx.process, Environment::Production, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TesseraError::Version(VersionError::NoActiveVersion { .. })
        ));
    }

    #[tokio::test]
    async fn test_pin_equals_unpinned() {
        let fx = Fixture::new();
        seed(&fx, 1, Environment::Sandbox, VersionStatus::Deprecated).await;
        seed(&fx, 2, Environment::Sandbox, VersionStatus::Active).await;
        let resolver = fx.resolver();

        let unpinned = resolver
            .resolve(fx.tenant, fx.process, Environment::Sandbox, None)
            .await
            .unwrap();
        let pinned = resolver
            .resolve(
                fx.tenant,
                fx.process,
                Environment::Sandbox,
                Some(unpinned.version_number()),
            )
            .await
            .unwrap();
        assert_eq!(pinned, unpinned);
    }

    #[tokio::test]
    async fn test_pinned_deprecated_carries_sunset() {
        let fx = Fixture::new();
        let v1 = seed(&fx, 1, Environment::Production, VersionStatus::Deprecated).await;
        let resolved = fx
            .resolver()
            .resolve(fx.tenant, fx.process, Environment::Production, Some(1))
            .await
            .unwrap();
        assert!(resolved.is_deprecated);
        assert_eq!(resolved.status_label(), "deprecated");
        assert_eq!(
            resolved.sunset_at,
            v1.deprecated_at.map(|at| at + Duration::days(90))
        );
    }

    #[tokio::test]
    async fn test_pin_other_environment_is_mismatch() {
        let fx = Fixture::new();
        seed(&fx, 1, Environment::Production, VersionStatus::Active).await;
        seed(&fx, 2, Environment::Sandbox, VersionStatus::Draft).await;

        for (env, number) in [(Environment::Sandbox, 1), (Environment::Production, 2)] {
            let err = fx
                .resolver()
                .resolve(fx.tenant, fx.process, env, Some(number))
                .await
                .unwrap_err();
            assert!(
                matches!(
                    err,
                    TesseraError::Version(VersionError::VersionEnvironmentMismatch { .. })
                ),
                "unexpected {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_unknown_pin_lists_available() {
        let fx = Fixture::new();
        seed(&fx, 1, Environment::Production, VersionStatus::Deprecated).await;
        seed(&fx, 2, Environment::Sandbox, VersionStatus::Active).await;
        seed(&fx, 3, Environment::Production, VersionStatus::Active).await;

        let err = fx
            .resolver()
            .resolve(fx.tenant, fx.process, Environment::Production, Some(42))
            .await
            .unwrap_err();
        match err {
            TesseraError::Version(VersionError::VersionNotFound {
                requested,
                available,
                ..
            }) => {
                assert_eq!(requested, 42);
                assert_eq!(available, vec![1, 3]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_draft_pin_is_not_found() {
        let fx = Fixture::new();
        seed(&fx, 1, Environment::Sandbox, VersionStatus::Draft).await;
        let err = fx
            .resolver()
            .resolve(fx.tenant, fx.process, Environment::Sandbox, Some(1))
            .await
            .unwrap_err();
        match err {
            TesseraError::Version(VersionError::VersionNotFound { available, .. }) => {
                assert!(available.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_other_tenant_looks_missing() {
        let fx = Fixture::new();
        seed(&fx, 1, Environment::Production, VersionStatus::Active).await;
        let stranger = Uuid::now_v7();
        let resolver = fx.resolver();

        let pinned = resolver
            .resolve(stranger, fx.process, Environment::Production, Some(1))
            .await
            .unwrap_err();
        assert!(matches!(
            pinned,
            TesseraError::Version(VersionError::VersionNotFound { ref available, .. }) if available.is_empty()
        ));

        let unpinned = resolver
            .resolve(stranger, fx.process, Environment::Production, None)
            .await
            .unwrap_err();
        assert!(matches!(
            unpinned,
            TesseraError::Version(VersionError::NoActiveVersion { .. })
        ));
    }
}
