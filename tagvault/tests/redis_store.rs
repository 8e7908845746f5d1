//! Redis-backed registry tests.
//!
//! These need a running server at `REDIS_URL` (default `redis://127.0.0.1/`):
//!
//! ```text
//! cargo test --test redis_store -- --ignored
//! ```

mod support;

use std::sync::atomic::{AtomicUsize, Ordering};

use serial_test::serial;
use tagvault::{
    InMemoryTypeRegistry, IntegrityChecker, RedisStore, RegistryError, RegistryPlan, RegistryStore, Reconciler, TypeId,
};

use support::{descriptor, owners, record_for, tag, tags_of, user_field};

static TEST_PREFIX_COUNTER: AtomicUsize = AtomicUsize::new(0);

async fn fresh_store() -> RedisStore {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string());
    let idx = TEST_PREFIX_COUNTER.fetch_add(1, Ordering::SeqCst);
    let prefix = format!("tagvault_test_{}_{idx}", std::process::id());
    let store = RedisStore::connect(&url, prefix).await.expect("connect to redis");
    store.clear().await.expect("clear test prefix");
    store
}

#[tokio::test]
#[serial]
#[ignore = "requires a running Redis server"]
async fn pass_round_trips_through_redis() {
    let store = fresh_store().await;
    let registry = InMemoryTypeRegistry::with_types([descriptor("ct-1", "blog", "BlogPost", vec![user_field("tags")])]);
    let directory = owners(&["ana", "bo"]);
    let reconciler = Reconciler::new(&store, &registry, &directory);
    reconciler.run(None).await.unwrap();

    let old = record_for(&store.snapshot().await.unwrap(), "ct-1", "tags").id.clone();
    tag(&store, "ana", &old, &["rust"]).await;

    registry.remove(&TypeId::new("ct-1"));
    registry.declare(descriptor("ct-2", "blog", "Article", vec![user_field("tags")]));
    let report = reconciler.run(None).await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.merge.merged.len(), 1);

    let snapshot = store.snapshot().await.unwrap();
    let article = record_for(&snapshot, "ct-2", "tags");
    assert_eq!(tags_of(&snapshot, "ana", &article.id), ["rust"]);
    assert!(IntegrityChecker::new(&store, &registry).run().await.unwrap().is_healthy());

    store.clear().await.unwrap();
}

#[tokio::test]
#[serial]
#[ignore = "requires a running Redis server"]
async fn stale_plan_is_rejected() {
    let store = fresh_store().await;
    let registry = InMemoryTypeRegistry::with_types([descriptor("ct-1", "blog", "Article", vec![user_field("tags")])]);
    Reconciler::new(&store, &registry, &owners(&["ana"])).populate(None).await.unwrap();

    let version = store.snapshot().await.unwrap().version;
    assert!(version > 0);
    let mut stale = RegistryPlan::expecting(version - 1);
    stale.delete_sync_group("tags");
    let err = store.commit(stale).await.unwrap_err();
    assert!(matches!(err, RegistryError::VersionConflict { .. }));
    assert_eq!(store.snapshot().await.unwrap().version, version);

    store.clear().await.unwrap();
}
