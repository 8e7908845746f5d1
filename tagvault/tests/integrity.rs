//! Integrity checks over registries drifted in known ways.

mod support;

use tagvault::integrity::DisplayAttribute;
use tagvault::{
    InMemoryTypeRegistry, IntegrityChecker, MemoryStore, RecordId, RegistryPlan, RegistrySnapshot, RegistryStore,
    TypeId, TypeRegistry,
};

use support::{descriptor, owners, populate, record_for, user_field};

#[tokio::test]
async fn healthy_registry_passes_every_check() {
    let store = MemoryStore::new();
    let registry = InMemoryTypeRegistry::with_types([descriptor("ct-1", "blog", "Article", vec![user_field("tags")])]);
    populate(&store, &registry, &owners(&["ana", "bo"])).await;

    let report = IntegrityChecker::new(&store, &registry).run().await.unwrap();
    assert!(report.is_healthy());
    assert_eq!(report.statistics.records, 1);
    assert_eq!(report.statistics.user_associations, 2);
    assert_eq!(report.statistics.distinct_owners, 2);
}

#[tokio::test]
async fn unresolvable_record_is_the_only_orphan_reported() {
    let store = MemoryStore::new();
    let registry = InMemoryTypeRegistry::with_types([
        descriptor("ct-1", "blog", "Article", vec![user_field("tags")]),
        descriptor("ct-2", "blog", "Page", vec![user_field("tags"), user_field("topics")]),
    ]);
    populate(&store, &registry, &owners(&["ana"])).await;
    let orphan = record_for(&store.snapshot().await.unwrap(), "ct-1", "tags").id.clone();

    registry.remove(&TypeId::new("ct-1"));
    let report = IntegrityChecker::new(&store, &registry).run().await.unwrap();

    assert_eq!(report.orphaned_records.len(), 1);
    assert_eq!(report.orphaned_records[0].record_id, orphan);
    assert_eq!(report.orphaned_records[0].cached_type_name, "Article");
    assert!(report.dead_type_identifiers.is_empty());
    assert!(!report.is_healthy());
}

#[tokio::test]
async fn renamed_type_shows_stale_display_name_until_populated() {
    let store = MemoryStore::new();
    let registry = InMemoryTypeRegistry::with_types([descriptor("ct-1", "blog", "BlogPost", vec![user_field("tags")])]);
    let directory = owners(&["ana"]);
    populate(&store, &registry, &directory).await;

    registry.rename(&TypeId::new("ct-1"), "Article");
    let checker = IntegrityChecker::new(&store, &registry);
    let report = checker.run().await.unwrap();
    assert_eq!(report.stale_display_names.len(), 1);
    let stale = &report.stale_display_names[0];
    assert_eq!(stale.attribute, DisplayAttribute::TypeName);
    assert_eq!(stale.cached, "BlogPost");
    assert_eq!(stale.current, "Article");

    populate(&store, &registry, &directory).await;
    assert!(checker.run().await.unwrap().is_healthy());
}

#[tokio::test]
async fn legacy_data_reports_broken_references_and_field_mismatches() {
    let registry = InMemoryTypeRegistry::with_types([descriptor("ct-1", "blog", "Article", vec![user_field("tags")])]);
    let seeded = MemoryStore::new();
    populate(&seeded, &registry, &owners(&["ana", "bo", "cy"])).await;

    let mut snapshot: RegistrySnapshot = seeded.snapshot().await.unwrap();
    let mut rows: Vec<_> = snapshot.associations.values_mut().collect();
    rows[0].record_ref = None;
    rows[1].record_ref = Some(RecordId::new("deleted"));
    rows[2].cached_field_name = Some("old_tags".to_string());
    let store = MemoryStore::from_snapshot(snapshot);

    let report = IntegrityChecker::new(&store, &registry).run().await.unwrap();
    assert_eq!(report.broken_references.len(), 2);
    assert!(report.broken_references.iter().any(|broken| broken.record_ref.is_none()));
    assert_eq!(report.field_name_mismatches.len(), 1);
    assert_eq!(report.field_name_mismatches[0].cached_field_name.as_deref(), Some("old_tags"));
    assert_eq!(report.field_name_mismatches[0].record_field_name, "tags");

    populate(&store, &registry, &owners(&["ana", "bo", "cy"])).await;
    let report = IntegrityChecker::new(&store, &registry).run().await.unwrap();
    assert!(report.field_name_mismatches.is_empty());
    assert_eq!(report.broken_references.len(), 2);
}

#[tokio::test]
async fn removed_type_without_records_is_a_dead_identifier() {
    let store = MemoryStore::new();
    let registry = InMemoryTypeRegistry::with_types([
        descriptor("ct-1", "blog", "Article", vec![user_field("tags")]),
        descriptor("ct-2", "blog", "Draft", vec![user_field("tags")]),
    ]);
    populate(&store, &registry, &owners(&[])).await;

    let snapshot = store.snapshot().await.unwrap();
    let draft = record_for(&snapshot, "ct-2", "tags").id.clone();
    let mut plan = RegistryPlan::expecting(snapshot.version);
    plan.delete_record(draft);
    store.commit(plan).await.unwrap();
    registry.remove(&TypeId::new("ct-2"));

    let checker = IntegrityChecker::new(&store, &registry);
    let dead = checker.dead_type_identifiers().await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].type_id, TypeId::new("ct-2"));
    assert_eq!(dead[0].type_name, "Draft");

    assert!(registry.forget(&TypeId::new("ct-2")).unwrap());
    assert!(checker.run().await.unwrap().is_healthy());
}

#[tokio::test]
async fn checks_never_write() {
    let store = MemoryStore::new();
    let registry = InMemoryTypeRegistry::with_types([descriptor("ct-1", "blog", "Article", vec![user_field("tags")])]);
    populate(&store, &registry, &owners(&["ana"])).await;
    registry.remove(&TypeId::new("ct-1"));

    let before = store.snapshot().await.unwrap();
    let report = IntegrityChecker::new(&store, &registry).run().await.unwrap();
    assert_eq!(report.issue_count(), 1);
    assert_eq!(store.snapshot().await.unwrap(), before);
}
