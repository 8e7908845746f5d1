//! Registry store: the persisted table of records, associations and sync groups.
//!
//! Every backend exposes a consistent [`RegistrySnapshot`] and applies
//! [`RegistryPlan`]s atomically. Invariant checks live on the snapshot so all
//! backends enforce the same rules.

mod file;
mod memory;
mod redis_store;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

pub use file::FileStore;
pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use crate::errors::RegistryError;
use crate::types::{AssociationId, Owner, RecordId, SyncGroup, TagAssociation, TagKind, TaggedFieldRecord, TypeId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum RegistryCommand {
    PutRecord { record: TaggedFieldRecord },
    DeleteRecord { id: RecordId },
    PutAssociation { association: TagAssociation },
    DeleteAssociation { id: AssociationId },
    PutSyncGroup { group: SyncGroup },
    DeleteSyncGroup { field_name: String },
}

/// Ordered batch of commands committed as one unit of work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryPlan {
    /// When set, the commit fails unless the store is still at this version.
    pub expected_version: Option<u64>,
    pub commands: Vec<RegistryCommand>,
}

impl RegistryPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expecting(version: u64) -> Self {
        Self {
            expected_version: Some(version),
            commands: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn put_record(&mut self, record: TaggedFieldRecord) -> &mut Self {
        self.commands.push(RegistryCommand::PutRecord { record });
        self
    }

    pub fn delete_record(&mut self, id: RecordId) -> &mut Self {
        self.commands.push(RegistryCommand::DeleteRecord { id });
        self
    }

    pub fn put_association(&mut self, association: TagAssociation) -> &mut Self {
        self.commands.push(RegistryCommand::PutAssociation { association });
        self
    }

    pub fn delete_association(&mut self, id: AssociationId) -> &mut Self {
        self.commands.push(RegistryCommand::DeleteAssociation { id });
        self
    }

    pub fn put_sync_group(&mut self, group: SyncGroup) -> &mut Self {
        self.commands.push(RegistryCommand::PutSyncGroup { group });
        self
    }

    pub fn delete_sync_group(&mut self, field_name: impl Into<String>) -> &mut Self {
        self.commands.push(RegistryCommand::DeleteSyncGroup {
            field_name: field_name.into(),
        });
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitReceipt {
    /// Store version after the commit.
    pub version: u64,
    pub applied: usize,
}

#[allow(async_fn_in_trait)]
pub trait RegistryStore {
    /// Consistent read of the whole registry.
    async fn snapshot(&self) -> Result<RegistrySnapshot, RegistryError>;

    /// Applies every command of `plan` or none of them.
    async fn commit(&self, plan: RegistryPlan) -> Result<CommitReceipt, RegistryError>;
}

/// Point-in-time copy of the registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub records: BTreeMap<RecordId, TaggedFieldRecord>,
    #[serde(default)]
    pub associations: BTreeMap<AssociationId, TagAssociation>,
    #[serde(default)]
    pub sync_groups: BTreeMap<String, SyncGroup>,
}

impl RegistrySnapshot {
    pub fn record(&self, id: &RecordId) -> Option<&TaggedFieldRecord> {
        self.records.get(id)
    }

    pub fn find_record(&self, type_id: &TypeId, field_name: &str, tag_kind: TagKind) -> Option<&TaggedFieldRecord> {
        self.records
            .values()
            .find(|record| record.natural_key() == (type_id, field_name, tag_kind))
    }

    pub fn records_with_type<'a>(&'a self, type_id: &'a TypeId) -> impl Iterator<Item = &'a TaggedFieldRecord> + 'a {
        self.records.values().filter(move |record| &record.type_id == type_id)
    }

    pub fn associations_for<'a>(&'a self, record_id: &'a RecordId) -> impl Iterator<Item = &'a TagAssociation> + 'a {
        self.associations
            .values()
            .filter(move |association| association.references(record_id))
    }

    pub fn association_for(&self, owner: &Owner, record_id: &RecordId) -> Option<&TagAssociation> {
        self.associations
            .values()
            .find(|association| association.references(record_id) && &association.owner == owner)
    }

    /// Type identifiers with at least one record holding an association.
    pub fn types_with_associations(&self) -> BTreeSet<TypeId> {
        self.associations
            .values()
            .filter_map(|association| association.record_ref.as_ref())
            .filter_map(|record_id| self.records.get(record_id))
            .map(|record| record.type_id.clone())
            .collect()
    }

    pub fn user_owners(&self) -> BTreeSet<String> {
        self.associations
            .values()
            .filter_map(|association| match &association.owner {
                Owner::User(handle) => Some(handle.clone()),
                Owner::System => None,
            })
            .collect()
    }

    pub fn groups_containing<'a>(&'a self, record_id: &'a RecordId) -> impl Iterator<Item = &'a SyncGroup> + 'a {
        self.sync_groups.values().filter(move |group| group.contains(record_id))
    }

    /// Applies `plan` in place after validating the resulting state. On error
    /// the snapshot is left unchanged.
    pub fn apply(&mut self, plan: &RegistryPlan) -> Result<CommitReceipt, RegistryError> {
        if let Some(expected) = plan.expected_version
            && expected != self.version
        {
            return Err(RegistryError::VersionConflict {
                expected: Some(expected),
                actual: Some(self.version),
            });
        }
        if plan.is_empty() {
            return Ok(CommitReceipt {
                version: self.version,
                applied: 0,
            });
        }

        let mut next = self.clone();
        let mut touched_records = BTreeSet::new();
        let mut touched_associations = BTreeSet::new();
        let mut deleted_records = BTreeSet::new();

        for command in &plan.commands {
            match command {
                RegistryCommand::PutRecord { record } => {
                    touched_records.insert(record.id.clone());
                    deleted_records.remove(&record.id);
                    next.records.insert(record.id.clone(), record.clone());
                }
                RegistryCommand::DeleteRecord { id } => {
                    if next.records.remove(id).is_none() {
                        return Err(RegistryError::NotFound {
                            kind: "record",
                            id: id.to_string(),
                        });
                    }
                    touched_records.remove(id);
                    deleted_records.insert(id.clone());
                }
                RegistryCommand::PutAssociation { association } => {
                    touched_associations.insert(association.id.clone());
                    next.associations.insert(association.id.clone(), association.clone());
                }
                RegistryCommand::DeleteAssociation { id } => {
                    if next.associations.remove(id).is_none() {
                        return Err(RegistryError::NotFound {
                            kind: "association",
                            id: id.to_string(),
                        });
                    }
                    touched_associations.remove(id);
                }
                RegistryCommand::PutSyncGroup { group } => {
                    next.sync_groups.insert(group.field_name.clone(), group.clone());
                }
                RegistryCommand::DeleteSyncGroup { field_name } => {
                    next.sync_groups.remove(field_name);
                }
            }
        }

        next.validate_records(&touched_records)?;
        next.validate_associations(&touched_associations)?;
        next.validate_deletions(&deleted_records)?;

        next.version += 1;
        *self = next;
        Ok(CommitReceipt {
            version: self.version,
            applied: plan.len(),
        })
    }

    fn validate_records(&self, touched: &BTreeSet<RecordId>) -> Result<(), RegistryError> {
        for id in touched {
            let Some(record) = self.records.get(id) else {
                continue;
            };
            if let Some(existing) = self
                .records
                .values()
                .find(|other| other.id != record.id && other.natural_key() == record.natural_key())
            {
                return Err(RegistryError::UniqueConstraintViolation {
                    constraint: "type_id, field_name, tag_kind",
                    values: vec![
                        record.type_id.to_string(),
                        record.field_name.clone(),
                        record.tag_kind.to_string(),
                    ],
                    existing_id: existing.id.to_string(),
                });
            }
        }
        Ok(())
    }

    fn validate_associations(&self, touched: &BTreeSet<AssociationId>) -> Result<(), RegistryError> {
        for id in touched {
            let Some(association) = self.associations.get(id) else {
                continue;
            };
            let Some(record_ref) = &association.record_ref else {
                return Err(RegistryError::invalid(format!(
                    "association {id} has no record reference"
                )));
            };
            if !self.records.contains_key(record_ref) {
                return Err(RegistryError::NotFound {
                    kind: "record",
                    id: record_ref.to_string(),
                });
            }
            if let Some(existing) = self
                .associations_for(record_ref)
                .find(|other| other.id != association.id && other.owner == association.owner)
            {
                return Err(RegistryError::UniqueConstraintViolation {
                    constraint: "owner, record_ref",
                    values: vec![association.owner.to_string(), record_ref.to_string()],
                    existing_id: existing.id.to_string(),
                });
            }
        }
        Ok(())
    }

    fn validate_deletions(&self, deleted: &BTreeSet<RecordId>) -> Result<(), RegistryError> {
        for id in deleted {
            if let Some(association) = self.associations_for(id).next() {
                return Err(RegistryError::invalid(format!(
                    "record {id} is still referenced by association {}",
                    association.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TagList;

    fn record(id: &str, type_id: &str, field: &str) -> TaggedFieldRecord {
        TaggedFieldRecord {
            id: RecordId::new(id),
            type_id: TypeId::new(type_id),
            namespace: "blog".into(),
            cached_type_name: "Article".into(),
            cached_field_display_name: "Tags".into(),
            field_name: field.into(),
            tag_kind: TagKind::User,
            default_tag_seed: None,
            synchronise: false,
        }
    }

    #[test]
    fn rejects_duplicate_natural_key() {
        let mut snapshot = RegistrySnapshot::default();
        let mut plan = RegistryPlan::new();
        plan.put_record(record("r1", "blog.article", "tags"))
            .put_record(record("r2", "blog.article", "tags"));
        let err = snapshot.apply(&plan).unwrap_err();
        assert!(matches!(err, RegistryError::UniqueConstraintViolation { .. }));
        assert!(snapshot.records.is_empty());
        assert_eq!(snapshot.version, 0);
    }

    #[test]
    fn rejects_duplicate_owner_on_record() {
        let mut snapshot = RegistrySnapshot::default();
        let r1 = record("r1", "blog.article", "tags");
        let mut plan = RegistryPlan::new();
        plan.put_record(r1.clone())
            .put_association(TagAssociation::seeded(Owner::user("ana"), &r1, TagList::new()))
            .put_association(TagAssociation::seeded(Owner::user("ana"), &r1, TagList::new()));
        assert!(matches!(
            snapshot.apply(&plan),
            Err(RegistryError::UniqueConstraintViolation { .. })
        ));
    }

    #[test]
    fn refuses_to_delete_referenced_record() {
        let mut snapshot = RegistrySnapshot::default();
        let r1 = record("r1", "blog.article", "tags");
        let mut seed = RegistryPlan::new();
        seed.put_record(r1.clone())
            .put_association(TagAssociation::seeded(Owner::user("ana"), &r1, TagList::new()));
        snapshot.apply(&seed).unwrap();

        let mut delete = RegistryPlan::new();
        delete.delete_record(r1.id.clone());
        assert!(matches!(snapshot.apply(&delete), Err(RegistryError::InvalidRequest { .. })));
        assert!(snapshot.record(&r1.id).is_some());
    }

    #[test]
    fn stale_expected_version_conflicts() {
        let mut snapshot = RegistrySnapshot::default();
        let mut first = RegistryPlan::expecting(0);
        first.put_record(record("r1", "blog.article", "tags"));
        assert_eq!(snapshot.apply(&first).unwrap().version, 1);

        let mut stale = RegistryPlan::expecting(0);
        stale.put_record(record("r2", "blog.article", "notes"));
        assert!(matches!(
            snapshot.apply(&stale),
            Err(RegistryError::VersionConflict {
                expected: Some(0),
                actual: Some(1)
            })
        ));
    }

    #[test]
    fn association_lookup_outlives_the_record_id_argument() {
        let mut snapshot = RegistrySnapshot::default();
        let r1 = record("r1", "blog.article", "tags");
        let mut plan = RegistryPlan::new();
        plan.put_record(r1.clone())
            .put_association(TagAssociation::seeded(Owner::user("ana"), &r1, ["rust"].into_iter().collect()));
        snapshot.apply(&plan).unwrap();

        let found = snapshot.association_for(&Owner::user("ana"), &RecordId::new("r1")).unwrap();
        assert_eq!(found.tags.as_slice(), ["rust"]);
        assert!(snapshot.association_for(&Owner::System, &RecordId::new("r1")).is_none());
    }

    #[test]
    fn types_with_associations_ignores_bare_records() {
        let mut snapshot = RegistrySnapshot::default();
        let tagged = record("r1", "blog.article", "tags");
        let mut plan = RegistryPlan::new();
        plan.put_record(tagged.clone())
            .put_record(record("r2", "blog.page", "tags"))
            .put_association(TagAssociation::seeded(Owner::System, &tagged, TagList::new()));
        snapshot.apply(&plan).unwrap();

        let types = snapshot.types_with_associations();
        assert_eq!(types.into_iter().collect::<Vec<_>>(), vec![TypeId::new("blog.article")]);
    }

    #[test]
    fn association_must_reference_existing_record() {
        let mut snapshot = RegistrySnapshot::default();
        let ghost = record("ghost", "blog.article", "tags");
        let mut plan = RegistryPlan::new();
        plan.put_association(TagAssociation::seeded(Owner::System, &ghost, TagList::new()));
        assert!(matches!(snapshot.apply(&plan), Err(RegistryError::NotFound { kind: "record", .. })));
    }
}
