use serde::Serialize;

use crate::errors::RegistryError;
use crate::store::{RegistryPlan, RegistryStore};
use crate::sync::{self, Propagation};
use crate::types::{AssociationId, Owner, RecordId, TagKind, TagList};

#[derive(Debug, Clone, Serialize)]
pub struct TagEdit {
    pub association: AssociationId,
    pub tags: TagList,
    pub created: bool,
    pub changed: bool,
    pub propagation: Propagation,
}

/// Entry point for changing an owner's tags on one record.
///
/// Each edit is committed together with its sync propagation, so mirrored
/// records never observe a half-applied change.
pub struct TagEditor<'a, S> {
    store: &'a S,
}

impl<'a, S: RegistryStore> TagEditor<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub async fn add_tag(&self, owner: &Owner, record: &RecordId, tag: &str) -> Result<TagEdit, RegistryError> {
        self.edit(owner, record, |tags| {
            tags.push(tag);
        })
        .await
    }

    pub async fn remove_tag(&self, owner: &Owner, record: &RecordId, tag: &str) -> Result<TagEdit, RegistryError> {
        self.edit(owner, record, |tags| {
            tags.remove(tag);
        })
        .await
    }

    pub async fn set_tags(&self, owner: &Owner, record: &RecordId, tags: TagList) -> Result<TagEdit, RegistryError> {
        self.edit(owner, record, move |current| *current = tags).await
    }

    async fn edit(
        &self,
        owner: &Owner,
        record_id: &RecordId,
        change: impl FnOnce(&mut TagList),
    ) -> Result<TagEdit, RegistryError> {
        let snapshot = self.store.snapshot().await?;
        let record = snapshot.record(record_id).ok_or_else(|| RegistryError::NotFound {
            kind: "record",
            id: record_id.to_string(),
        })?;
        match (record.tag_kind, owner) {
            (TagKind::System, Owner::System) | (TagKind::User, Owner::User(_)) => {}
            (kind, owner) => {
                return Err(RegistryError::invalid(format!(
                    "owner {owner} cannot edit {kind} tags on record {record_id}"
                )));
            }
        }

        let (mut association, created) = match snapshot.association_for(owner, record_id) {
            Some(existing) => (existing.clone(), false),
            None => (
                crate::types::TagAssociation::seeded(owner.clone(), record, TagList::new()),
                true,
            ),
        };

        let mut tags = association.tags.clone();
        change(&mut tags);
        let changed = tags != association.tags;
        if !changed && !created {
            return Ok(TagEdit {
                association: association.id,
                tags,
                created,
                changed,
                propagation: Propagation::default(),
            });
        }

        association.replace_tags(tags.clone());
        let mut plan = RegistryPlan::expecting(snapshot.version);
        plan.put_association(association.clone());
        let propagation = sync::propagate(&snapshot, record_id, owner, &tags, &mut plan);
        self.store.commit(plan).await?;

        log::debug!(
            "tags_edited record={record_id} owner={owner} tags={tags} mirrored={}",
            propagation.updated.len()
        );
        Ok(TagEdit {
            association: association.id,
            tags,
            created,
            changed,
            propagation,
        })
    }
}
