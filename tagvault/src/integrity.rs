//! Read-only audit of the registry.
//!
//! Five independent checks, each returning the ids needed to repair what it
//! found. None of them writes.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::errors::RegistryError;
use crate::registry::{Resolution, TypeRegistry};
use crate::store::{RegistrySnapshot, RegistryStore};
use crate::types::{AssociationId, Owner, RecordId, TagKind, TypeId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrphanViolation {
    pub record_id: RecordId,
    pub type_id: TypeId,
    pub namespace: String,
    pub cached_type_name: String,
    pub field_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayAttribute {
    TypeName,
    FieldDisplayName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaleDisplayName {
    pub record_id: RecordId,
    pub attribute: DisplayAttribute,
    pub cached: String,
    pub current: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrokenReference {
    pub association_id: AssociationId,
    pub owner: Owner,
    /// `None` when the reference is null rather than dangling.
    pub record_ref: Option<RecordId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldNameMismatch {
    pub association_id: AssociationId,
    pub record_id: RecordId,
    pub cached_field_name: Option<String>,
    pub record_field_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeadIdentifier {
    pub type_id: TypeId,
    pub namespace: String,
    pub type_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStatistics {
    pub version: u64,
    pub records: usize,
    pub system_records: usize,
    pub user_records: usize,
    pub system_associations: usize,
    pub user_associations: usize,
    pub distinct_owners: usize,
    pub sync_groups: usize,
}

impl RegistryStatistics {
    pub fn of(snapshot: &RegistrySnapshot) -> Self {
        let system_records = snapshot
            .records
            .values()
            .filter(|record| record.tag_kind == TagKind::System)
            .count();
        let system_associations = snapshot
            .associations
            .values()
            .filter(|association| association.owner.is_system())
            .count();
        Self {
            version: snapshot.version,
            records: snapshot.records.len(),
            system_records,
            user_records: snapshot.records.len() - system_records,
            system_associations,
            user_associations: snapshot.associations.len() - system_associations,
            distinct_owners: snapshot.user_owners().len(),
            sync_groups: snapshot.sync_groups.len(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IntegrityReport {
    pub statistics: RegistryStatistics,
    pub orphaned_records: Vec<OrphanViolation>,
    pub stale_display_names: Vec<StaleDisplayName>,
    pub broken_references: Vec<BrokenReference>,
    pub field_name_mismatches: Vec<FieldNameMismatch>,
    pub dead_type_identifiers: Vec<DeadIdentifier>,
}

impl IntegrityReport {
    pub fn issue_count(&self) -> usize {
        self.orphaned_records.len()
            + self.stale_display_names.len()
            + self.broken_references.len()
            + self.field_name_mismatches.len()
            + self.dead_type_identifiers.len()
    }

    pub fn is_healthy(&self) -> bool {
        self.issue_count() == 0
    }
}

/// Records whose type identifier no longer resolves.
pub fn orphaned_records<R: TypeRegistry + ?Sized>(
    snapshot: &RegistrySnapshot,
    registry: &R,
) -> Result<Vec<OrphanViolation>, RegistryError> {
    let mut violations = Vec::new();
    for record in snapshot.records.values() {
        if registry.resolve(&record.type_id)? == Resolution::Unresolved {
            violations.push(OrphanViolation {
                record_id: record.id.clone(),
                type_id: record.type_id.clone(),
                namespace: record.namespace.clone(),
                cached_type_name: record.cached_type_name.clone(),
                field_name: record.field_name.clone(),
            });
        }
    }
    Ok(violations)
}

/// Live records whose cached type or field display name differs from the
/// current declaration.
pub fn stale_display_names<R: TypeRegistry + ?Sized>(
    snapshot: &RegistrySnapshot,
    registry: &R,
) -> Result<Vec<StaleDisplayName>, RegistryError> {
    let mut violations = Vec::new();
    for record in snapshot.records.values() {
        let Resolution::Live(descriptor) = registry.resolve(&record.type_id)? else {
            continue;
        };
        if descriptor.type_name != record.cached_type_name {
            violations.push(StaleDisplayName {
                record_id: record.id.clone(),
                attribute: DisplayAttribute::TypeName,
                cached: record.cached_type_name.clone(),
                current: descriptor.type_name.clone(),
            });
        }
        if let Some(field) = descriptor.field(&record.field_name)
            && field.display_name != record.cached_field_display_name
        {
            violations.push(StaleDisplayName {
                record_id: record.id.clone(),
                attribute: DisplayAttribute::FieldDisplayName,
                cached: record.cached_field_display_name.clone(),
                current: field.display_name.clone(),
            });
        }
    }
    Ok(violations)
}

/// Associations with a null reference or one pointing at a missing record.
pub fn broken_references(snapshot: &RegistrySnapshot) -> Vec<BrokenReference> {
    snapshot
        .associations
        .values()
        .filter(|association| {
            association
                .record_ref
                .as_ref()
                .is_none_or(|record_id| !snapshot.records.contains_key(record_id))
        })
        .map(|association| BrokenReference {
            association_id: association.id.clone(),
            owner: association.owner.clone(),
            record_ref: association.record_ref.clone(),
        })
        .collect()
}

/// Associations whose cached field name disagrees with their record.
pub fn field_name_mismatches(snapshot: &RegistrySnapshot) -> Vec<FieldNameMismatch> {
    snapshot
        .associations
        .values()
        .filter_map(|association| {
            let record = snapshot.record(association.record_ref.as_ref()?)?;
            if association.cached_field_name.as_deref() == Some(record.field_name.as_str()) {
                return None;
            }
            Some(FieldNameMismatch {
                association_id: association.id.clone(),
                record_id: record.id.clone(),
                cached_field_name: association.cached_field_name.clone(),
                record_field_name: record.field_name.clone(),
            })
        })
        .collect()
}

/// Identifiers the adapter still lists in a namespace the registry uses that
/// resolve to nothing and back no record.
pub fn dead_type_identifiers<R: TypeRegistry + ?Sized>(
    snapshot: &RegistrySnapshot,
    registry: &R,
) -> Result<Vec<DeadIdentifier>, RegistryError> {
    let namespaces: BTreeSet<&str> = snapshot.records.values().map(|record| record.namespace.as_str()).collect();
    let referenced: BTreeSet<&TypeId> = snapshot.records.values().map(|record| &record.type_id).collect();

    let mut dead = Vec::new();
    for entry in registry.known_identifiers()? {
        if !namespaces.contains(entry.namespace.as_str()) || referenced.contains(&entry.type_id) {
            continue;
        }
        if registry.resolve(&entry.type_id)? == Resolution::Unresolved {
            dead.push(DeadIdentifier {
                type_id: entry.type_id,
                namespace: entry.namespace,
                type_name: entry.type_name,
            });
        }
    }
    Ok(dead)
}

pub struct IntegrityChecker<'a, S, R> {
    store: &'a S,
    registry: &'a R,
}

impl<'a, S, R> IntegrityChecker<'a, S, R>
where
    S: RegistryStore,
    R: TypeRegistry,
{
    pub fn new(store: &'a S, registry: &'a R) -> Self {
        Self { store, registry }
    }

    /// Runs every check against one snapshot.
    pub async fn run(&self) -> Result<IntegrityReport, RegistryError> {
        self.registry.invalidate_cache();
        let snapshot = self.store.snapshot().await?;
        let report = IntegrityReport {
            statistics: RegistryStatistics::of(&snapshot),
            orphaned_records: orphaned_records(&snapshot, self.registry)?,
            stale_display_names: stale_display_names(&snapshot, self.registry)?,
            broken_references: broken_references(&snapshot),
            field_name_mismatches: field_name_mismatches(&snapshot),
            dead_type_identifiers: dead_type_identifiers(&snapshot, self.registry)?,
        };
        if report.is_healthy() {
            log::info!("integrity_check_passed records={}", report.statistics.records);
        } else {
            log::warn!("integrity_check_failed issues={}", report.issue_count());
        }
        Ok(report)
    }

    pub async fn orphaned_records(&self) -> Result<Vec<OrphanViolation>, RegistryError> {
        orphaned_records(&self.store.snapshot().await?, self.registry)
    }

    pub async fn stale_display_names(&self) -> Result<Vec<StaleDisplayName>, RegistryError> {
        stale_display_names(&self.store.snapshot().await?, self.registry)
    }

    pub async fn broken_references(&self) -> Result<Vec<BrokenReference>, RegistryError> {
        Ok(broken_references(&self.store.snapshot().await?))
    }

    pub async fn field_name_mismatches(&self) -> Result<Vec<FieldNameMismatch>, RegistryError> {
        Ok(field_name_mismatches(&self.store.snapshot().await?))
    }

    pub async fn dead_type_identifiers(&self) -> Result<Vec<DeadIdentifier>, RegistryError> {
        dead_type_identifiers(&self.store.snapshot().await?, self.registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{DeclaredField, InMemoryTypeRegistry, TypeDescriptor};
    use crate::store::{MemoryStore, RegistryPlan};
    use crate::types::{TagAssociation, TagList, TaggedFieldRecord};

    fn article() -> TypeDescriptor {
        TypeDescriptor {
            type_id: TypeId::new("t-article"),
            namespace: "blog".into(),
            type_name: "Article".into(),
            fields: vec![DeclaredField {
                field_name: "tags".into(),
                display_name: "Tags".into(),
                tag_kind: TagKind::User,
                default_tags: None,
                synchronise: false,
            }],
        }
    }

    fn record(id: &str, type_id: &str, type_name: &str) -> TaggedFieldRecord {
        TaggedFieldRecord {
            id: RecordId::new(id),
            type_id: TypeId::new(type_id),
            namespace: "blog".into(),
            cached_type_name: type_name.into(),
            cached_field_display_name: "Tags".into(),
            field_name: "tags".into(),
            tag_kind: TagKind::User,
            default_tag_seed: None,
            synchronise: false,
        }
    }

    #[test]
    fn legacy_null_and_dangling_references_are_reported() {
        let live = record("r1", "t-article", "Article");
        let mut null_ref = TagAssociation::seeded(Owner::user("ana"), &live, TagList::new());
        null_ref.record_ref = None;
        let dangling = TagAssociation::seeded(Owner::user("bo"), &record("gone", "t-x", "X"), TagList::new());
        let mut stale_cache = TagAssociation::seeded(Owner::user("cy"), &live, TagList::new());
        stale_cache.cached_field_name = Some("labels".into());

        let mut snapshot = RegistrySnapshot::default();
        snapshot.records.insert(live.id.clone(), live.clone());
        for association in [null_ref.clone(), dangling.clone(), stale_cache.clone()] {
            snapshot.associations.insert(association.id.clone(), association);
        }

        let broken: BTreeSet<_> = broken_references(&snapshot)
            .into_iter()
            .map(|violation| violation.association_id)
            .collect();
        assert_eq!(broken, BTreeSet::from([null_ref.id, dangling.id]));

        let mismatches = field_name_mismatches(&snapshot);
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].association_id, stale_cache.id);
        assert_eq!(mismatches[0].record_field_name, "tags");
    }

    #[tokio::test]
    async fn report_covers_every_check() {
        let registry = InMemoryTypeRegistry::with_types([article()]);
        registry.declare(TypeDescriptor {
            type_id: TypeId::new("t-dead"),
            namespace: "blog".into(),
            type_name: "Draft".into(),
            fields: Vec::new(),
        });
        registry.remove(&TypeId::new("t-dead"));

        let store = MemoryStore::new();
        let mut seed = RegistryPlan::new();
        seed.put_record(record("r1", "t-article", "BlogPost"))
            .put_record(record("r2", "t-gone", "Legacy"));
        store.commit(seed).await.unwrap();

        let report = IntegrityChecker::new(&store, &registry).run().await.unwrap();
        assert_eq!(report.orphaned_records.len(), 1);
        assert_eq!(report.orphaned_records[0].record_id, RecordId::new("r2"));
        assert_eq!(report.stale_display_names.len(), 1);
        assert_eq!(report.stale_display_names[0].current, "Article");
        assert_eq!(report.dead_type_identifiers.len(), 1);
        assert_eq!(report.dead_type_identifiers[0].type_id, TypeId::new("t-dead"));
        assert_eq!(report.statistics.records, 2);
        assert!(!report.is_healthy());
    }
}
