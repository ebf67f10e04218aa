//! PostgreSQL backend tests.
//!
//! Run with `DB_TESTS=1 cargo test -p tessera-api --features db-tests`
//! against a database configured through the `TESSERA_DB_*` variables.

#![cfg(feature = "db-tests")]

use std::sync::Arc;

use serde_json::json;
use tessera_api::{DbConfig, PgStore};
use tessera_core::{Environment, Fingerprint, SystemClock, VersionStatus};
use tessera_lifecycle::{
    create_version, promote, CreateVersionRequest, LifecycleContext, PromoteRequest,
};
use tessera_storage::{ResponseCache, VersionStore};
use tessera_test_utils::assertions::assert_history_invariants;
use tessera_test_utils::fixtures::{config_with_temperature, promotion_scenario};
use uuid::Uuid;

fn db_tests_enabled() -> bool {
    std::env::var("DB_TESTS").map(|v| v == "1").unwrap_or(false)
}

async fn store() -> Option<Arc<PgStore>> {
    if !db_tests_enabled() {
        eprintln!("skipping: DB_TESTS != 1");
        return None;
    }
    let store = PgStore::from_config(&DbConfig::from_env()).expect("pool");
    store.migrate().await.expect("migration");
    Some(Arc::new(store))
}

#[tokio::test]
async fn test_version_numbers_are_sequential() {
    let Some(store) = store().await else { return };
    let ctx = LifecycleContext::with_defaults(store.clone());
    let (tenant_id, process_id) = (Uuid::now_v7(), Uuid::now_v7());

    for temperature in [0.1, 0.2, 0.3] {
        create_version(
            &ctx,
            CreateVersionRequest {
                tenant_id,
                process_id,
                config: config_with_temperature(temperature),
                change_notes: None,
                actor: None,
            },
        )
        .await
        .unwrap();
    }

    let versions = store.list(tenant_id, process_id).await.unwrap();
    assert_eq!(
        versions.iter().map(|v| v.version_number).collect::<Vec<_>>(),
        vec![3, 2, 1]
    );
    assert_history_invariants(&versions);
    let active = store
        .find_active(tenant_id, process_id, Environment::Sandbox)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(active.version_number, 3);
}

#[tokio::test]
async fn test_promotion_commits_atomically_and_wipes_cache() {
    let Some(store) = store().await else { return };
    let ctx = LifecycleContext::with_defaults(store.clone());
    let (tenant_id, process_id) = (Uuid::now_v7(), Uuid::now_v7());
    let (v1, v2) = promotion_scenario(store.as_ref(), tenant_id, process_id)
        .await
        .unwrap();

    let cache = ResponseCache::new(store.clone(), Arc::new(SystemClock));
    cache
        .set(tenant_id, process_id, &Fingerprint::from_hex("ab12"), 1, json!({"x": 1}), 600)
        .await
        .unwrap();

    let outcome = promote(
        &ctx,
        PromoteRequest {
            tenant_id,
            process_id,
            source_version_id: v2.version_id,
            change_notes: None,
            actor: Some("db-test".into()),
        },
    )
    .await
    .unwrap();
    assert_eq!(outcome.promoted.version_number, 3);

    let old = store.version_get(tenant_id, v1.version_id).await.unwrap().unwrap();
    assert_eq!(old.status, VersionStatus::Deprecated);
    assert!(cache
        .get(tenant_id, process_id, &Fingerprint::from_hex("ab12"), 1)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_concurrent_promotions_leave_one_active_version() {
    let Some(store) = store().await else { return };
    let ctx = LifecycleContext::with_defaults(store.clone());
    let (tenant_id, process_id) = (Uuid::now_v7(), Uuid::now_v7());
    let (_v1, v2) = promotion_scenario(store.as_ref(), tenant_id, process_id)
        .await
        .unwrap();

    let request = PromoteRequest {
        tenant_id,
        process_id,
        source_version_id: v2.version_id,
        change_notes: None,
        actor: None,
    };
    let (a, b) = tokio::join!(promote(&ctx, request.clone()), promote(&ctx, request));
    assert!(a.is_ok() || b.is_ok());

    let versions = store.list(tenant_id, process_id).await.unwrap();
    assert_history_invariants(&versions);
}
