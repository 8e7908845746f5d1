use serde::Serialize;

use crate::errors::RegistryError;
use crate::owners::OwnerDirectory;
use crate::reconcile::Reconciler;
use crate::registry::{DeclaredTaggedField, TypeRegistry};
use crate::store::{RegistryPlan, RegistrySnapshot, RegistryStore};
use crate::sync;
use crate::types::{Owner, RecordId, TagAssociation, TagKind, TagList, TaggedFieldRecord, TypeId};

#[derive(Debug, Clone, Default, Serialize)]
pub struct PopulateReport {
    pub declared_fields: usize,
    pub records_created: usize,
    pub records_updated: usize,
    pub records_unchanged: usize,
    pub associations_created: usize,
    pub associations_refreshed: usize,
    pub sync_groups_updated: usize,
    pub sync_members_removed: usize,
    pub owners_considered: usize,
    pub created_record_ids: Vec<RecordId>,
    pub failed: Vec<PopulateFailure>,
}

impl PopulateReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PopulateFailure {
    pub type_id: TypeId,
    pub field_name: String,
    pub tag_kind: TagKind,
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordChange {
    Created,
    Updated,
    Unchanged,
}

#[derive(Debug, Default)]
struct FieldOutcome {
    associations_created: usize,
    associations_refreshed: usize,
}

impl<S, R, O> Reconciler<'_, S, R, O>
where
    S: RegistryStore,
    R: TypeRegistry,
    O: OwnerDirectory,
{
    /// Upserts a record for every declared tagged field and seeds missing
    /// associations. When `owner` is given only that owner's user
    /// associations are seeded.
    ///
    /// Everything the adapter has to say is collected before the first write,
    /// so an unreachable adapter aborts the pass with the registry untouched.
    pub async fn populate(&self, owner: Option<&str>) -> Result<PopulateReport, RegistryError> {
        self.registry.invalidate_cache();

        let mut declared = Vec::new();
        for namespace in self.registry.namespaces()? {
            declared.extend(self.registry.enumerate_declared_fields(&namespace)?);
        }
        declared.sort_by(|a, b| {
            (&a.namespace, &a.type_id, &a.field.field_name, a.field.tag_kind).cmp(&(
                &b.namespace,
                &b.type_id,
                &b.field.field_name,
                b.field.tag_kind,
            ))
        });

        let owners: Vec<String> = match owner {
            Some(handle) => vec![handle.to_string()],
            None => self.owners.list_known_owners()?,
        };

        let mut report = PopulateReport {
            declared_fields: declared.len(),
            owners_considered: owners.len(),
            ..PopulateReport::default()
        };

        for field in &declared {
            match self.populate_field(field, &owners).await {
                Ok((change, record_id, outcome)) => {
                    match change {
                        RecordChange::Created => {
                            report.records_created += 1;
                            report.created_record_ids.push(record_id);
                        }
                        RecordChange::Updated => report.records_updated += 1,
                        RecordChange::Unchanged => report.records_unchanged += 1,
                    }
                    report.associations_created += outcome.associations_created;
                    report.associations_refreshed += outcome.associations_refreshed;
                }
                Err(err) => {
                    log::warn!(
                        "populate_field_failed type_id={} field_name={} error={err}",
                        field.type_id,
                        field.field.field_name
                    );
                    report.failed.push(PopulateFailure {
                        type_id: field.type_id.clone(),
                        field_name: field.field.field_name.clone(),
                        tag_kind: field.field.tag_kind,
                        error: err.to_string(),
                    });
                }
            }
        }

        match self.enrol_sync_groups().await {
            Ok((updated, removed)) => {
                report.sync_groups_updated = updated;
                report.sync_members_removed = removed;
            }
            Err(err) => {
                log::warn!("sync_enrolment_failed error={err}");
            }
        }

        log::info!(
            "populate_completed declared={} created={} updated={} associations_created={} failed={}",
            report.declared_fields,
            report.records_created,
            report.records_updated,
            report.associations_created,
            report.failed.len()
        );

        Ok(report)
    }

    async fn populate_field(
        &self,
        declared: &DeclaredTaggedField,
        owners: &[String],
    ) -> Result<(RecordChange, RecordId, FieldOutcome), RegistryError> {
        let snapshot = self.store.snapshot().await?;
        let mut plan = RegistryPlan::expecting(snapshot.version);

        let (record, change) = upsert_record(&snapshot, declared);
        if change != RecordChange::Unchanged {
            plan.put_record(record.clone());
        }

        let mut outcome = FieldOutcome::default();
        let seed = record.default_tag_seed.clone().unwrap_or_default();

        match record.tag_kind {
            TagKind::System => {
                if snapshot.associations_for(&record.id).next().is_none() {
                    plan.put_association(TagAssociation::seeded(Owner::System, &record, seed));
                    outcome.associations_created += 1;
                }
            }
            TagKind::User => {
                let seed = if self.options.seed_user_defaults {
                    seed
                } else {
                    TagList::new()
                };
                for handle in owners {
                    let owner = Owner::user(handle.as_str());
                    if snapshot.association_for(&owner, &record.id).is_none() {
                        plan.put_association(TagAssociation::seeded(owner, &record, seed.clone()));
                        outcome.associations_created += 1;
                    }
                }
            }
        }

        for association in snapshot.associations_for(&record.id) {
            if association.cached_field_name.as_deref() != Some(record.field_name.as_str()) {
                let mut refreshed = association.clone();
                refreshed.cached_field_name = Some(record.field_name.clone());
                plan.put_association(refreshed);
                outcome.associations_refreshed += 1;
            }
        }

        if !plan.is_empty() {
            self.store.commit(plan).await?;
        }
        if change == RecordChange::Created {
            log::info!("tagged_field_registered record={} label={}", record.id, record.label());
        }
        Ok((change, record.id, outcome))
    }

    /// Adds every `synchronise` record to the group named after its field and
    /// drops members whose record no longer exists.
    async fn enrol_sync_groups(&self) -> Result<(usize, usize), RegistryError> {
        let snapshot = self.store.snapshot().await?;
        let mut plan = RegistryPlan::expecting(snapshot.version);
        let mut groups = snapshot.sync_groups.clone();
        let mut removed = 0;

        for record in snapshot.records.values().filter(|record| record.synchronise) {
            groups
                .entry(record.field_name.clone())
                .or_insert_with(|| crate::types::SyncGroup::new(record.field_name.clone(), []))
                .add_member(record.id.clone());
        }

        let mut updated = 0;
        for (field_name, group) in groups.iter_mut() {
            let before = group.members.len();
            group.members.retain(|member| {
                let exists = snapshot.records.contains_key(member);
                if !exists {
                    log::warn!("sync_member_dangling group={field_name} record={member}");
                }
                exists
            });
            removed += before - group.members.len();
            if snapshot.sync_groups.get(field_name) != Some(group) {
                plan.put_sync_group(group.clone());
                updated += 1;
            }
        }

        if !plan.is_empty() {
            self.store.commit(plan).await?;
        }
        sync::check_group_sizes(groups.values());
        Ok((updated, removed))
    }
}

fn upsert_record(snapshot: &RegistrySnapshot, declared: &DeclaredTaggedField) -> (TaggedFieldRecord, RecordChange) {
    let field = &declared.field;
    match snapshot.find_record(&declared.type_id, &field.field_name, field.tag_kind) {
        Some(existing) => {
            let mut record = existing.clone();
            record.namespace = declared.namespace.clone();
            record.cached_type_name = declared.type_name.clone();
            record.cached_field_display_name = field.display_name.clone();
            record.synchronise = field.synchronise;
            if field.tag_kind == TagKind::System {
                record.default_tag_seed = field.default_tags.clone();
            }
            let change = if &record == existing {
                RecordChange::Unchanged
            } else {
                RecordChange::Updated
            };
            (record, change)
        }
        None => (
            TaggedFieldRecord {
                id: RecordId::generate(),
                type_id: declared.type_id.clone(),
                namespace: declared.namespace.clone(),
                cached_type_name: declared.type_name.clone(),
                cached_field_display_name: field.display_name.clone(),
                field_name: field.field_name.clone(),
                tag_kind: field.tag_kind,
                default_tag_seed: field.default_tags.clone(),
                synchronise: field.synchronise,
            },
            RecordChange::Created,
        ),
    }
}
