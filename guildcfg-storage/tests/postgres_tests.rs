//! PgDurableRepo against a live database.
//!
//! Connection settings come from `DbConfig::from_env()`. When
//! `GUILDCFG_DB_HOST` is not set the tests return early.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Duration, Utc};
use guildcfg_core::{ActorId, AuditAction, ConfigUpdate, StorageError, TenantId, ValidatedUpdate};
use guildcfg_storage::{AuditTrail, DbConfig, DurableRepo, PgDurableRepo};
use tokio::sync::Mutex;

/// Retention deletes across tenants, so tests touching the shared tables
/// run one at a time.
static DB_LOCK: Mutex<()> = Mutex::const_new(());

static NEXT_TENANT: AtomicU64 = AtomicU64::new(0);

async fn test_repo() -> Option<PgDurableRepo> {
    if std::env::var("GUILDCFG_DB_HOST").is_err() {
        eprintln!("GUILDCFG_DB_HOST not set, skipping PostgreSQL tests");
        return None;
    }
    let repo = PgDurableRepo::from_config(&DbConfig::from_env())
        .expect("Failed to create database pool");
    repo.ensure_schema().await.expect("Failed to create schema");
    Some(repo)
}

fn unique_tenant() -> TenantId {
    let stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let n = NEXT_TENANT.fetch_add(1, Ordering::Relaxed);
    TenantId::parse(format!("pgtest-{}-{}-{}", std::process::id(), stamp, n))
        .expect("valid tenant id")
}

fn update(allow_all: bool, channels: &[&str]) -> ValidatedUpdate {
    ConfigUpdate::new(allow_all, channels.iter().map(|c| c.to_string()).collect())
        .validate()
        .expect("valid update")
}

#[tokio::test]
async fn test_update_persists_whitelist_order_and_audit() {
    let Some(repo) = test_repo().await else { return };
    let _guard = DB_LOCK.lock().await;
    let tenant = unique_tenant();
    let actor = ActorId::new("42");

    repo.create_default(&tenant, &ActorId::system()).await.expect("create");
    let saved = repo
        .update(&tenant, 1, &update(false, &["333", "111", "222", "111"]), &actor)
        .await
        .expect("update");
    assert_eq!(saved.version, 2);

    let stored = repo.get(&tenant).await.expect("get").expect("row exists");
    assert_eq!(stored, saved);
    assert_eq!(stored.whitelist, vec!["333", "111", "222"]);
    assert!(!stored.allow_all_channels);

    let cleared = repo
        .update(&tenant, 2, &update(true, &[]), &actor)
        .await
        .expect("update");
    assert_eq!(cleared.version, 3);
    assert!(repo.get(&tenant).await.expect("get").expect("row").whitelist.is_empty());

    let audit = repo.entries_for(&tenant).await.expect("audit");
    let versions: Vec<_> = audit.iter().map(|e| (e.old_version, e.new_version)).collect();
    assert_eq!(versions, vec![(None, 1), (Some(1), 2), (Some(2), 3)]);
    assert_eq!(audit[0].action, AuditAction::Create);
    assert_eq!(audit[2].actor_id, actor);
}

#[tokio::test]
async fn test_conflict_leaves_store_unchanged() {
    let Some(repo) = test_repo().await else { return };
    let _guard = DB_LOCK.lock().await;
    let tenant = unique_tenant();

    let created = repo.create_default(&tenant, &ActorId::system()).await.expect("create");
    let err = repo
        .update(&tenant, 5, &update(false, &["111"]), &ActorId::new("42"))
        .await
        .expect_err("stale version must conflict");
    match err {
        StorageError::VersionConflict {
            current_version, ..
        } => assert_eq!(current_version, 1),
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(repo.get(&tenant).await.expect("get"), Some(created));
    assert_eq!(repo.entries_for(&tenant).await.expect("audit").len(), 1);
}

#[tokio::test]
async fn test_update_unknown_tenant_is_not_found() {
    let Some(repo) = test_repo().await else { return };
    let _guard = DB_LOCK.lock().await;
    let err = repo
        .update(&unique_tenant(), 1, &update(true, &[]), &ActorId::new("42"))
        .await
        .expect_err("missing row");
    assert!(matches!(err, StorageError::NotFound { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_updates_have_one_winner() {
    let Some(repo) = test_repo().await else { return };
    let _guard = DB_LOCK.lock().await;
    let repo = Arc::new(repo);
    let tenant = unique_tenant();
    repo.create_default(&tenant, &ActorId::system()).await.expect("create");

    let mut handles = Vec::new();
    for i in 0..8 {
        let repo = repo.clone();
        let tenant = tenant.clone();
        handles.push(tokio::spawn(async move {
            let channel = format!("{}", 1000 + i);
            let actor = ActorId::new(format!("u{}", i));
            repo.update(&tenant, 1, &update(false, &[channel.as_str()]), &actor)
                .await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.expect("task should join") {
            Ok(config) => {
                winners += 1;
                assert_eq!(config.version, 2);
            }
            Err(StorageError::VersionConflict {
                current_version, ..
            }) => assert_eq!(current_version, 2),
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(repo.entries_for(&tenant).await.expect("audit").len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_create_default_is_idempotent() {
    let Some(repo) = test_repo().await else { return };
    let _guard = DB_LOCK.lock().await;
    let repo = Arc::new(repo);
    let tenant = unique_tenant();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let repo = repo.clone();
        let tenant = tenant.clone();
        handles.push(tokio::spawn(async move {
            repo.create_default(&tenant, &ActorId::system()).await
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.expect("task should join").expect("create"));
    }
    assert!(results.iter().all(|config| config == &results[0]));
    assert_eq!(results[0].version, 1);

    let audit = repo.entries_for(&tenant).await.expect("audit");
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, AuditAction::Create);
}

#[tokio::test]
async fn test_prune_before_respects_cutoff() {
    let Some(repo) = test_repo().await else { return };
    let _guard = DB_LOCK.lock().await;
    let tenant = unique_tenant();
    repo.create_default(&tenant, &ActorId::system()).await.expect("create");
    repo.update(&tenant, 1, &update(true, &[]), &ActorId::new("42"))
        .await
        .expect("update");

    repo.prune_before(Utc::now() - Duration::days(1)).await.expect("prune");
    assert_eq!(repo.entries_for(&tenant).await.expect("audit").len(), 2);

    let pruned = repo
        .prune_before(Utc::now() + Duration::seconds(1))
        .await
        .expect("prune");
    assert!(pruned >= 2);
    assert!(repo.entries_for(&tenant).await.expect("audit").is_empty());
    // The configuration row itself is not part of retention.
    assert!(repo.get(&tenant).await.expect("get").is_some());
}
