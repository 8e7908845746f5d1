//! Sync groups: records whose associations carry the same tag list per owner.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::errors::RegistryError;
use crate::store::{CommitReceipt, RegistryPlan, RegistrySnapshot, RegistryStore};
use crate::types::{Owner, RecordId, SyncGroup, TagList};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupHealth {
    Empty,
    Single,
    Healthy,
}

impl GroupHealth {
    pub fn of(group: &SyncGroup) -> Self {
        match group.members.len() {
            0 => GroupHealth::Empty,
            1 => GroupHealth::Single,
            _ => GroupHealth::Healthy,
        }
    }
}

/// Logs the size of every group. Undersized groups are misconfiguration, not
/// errors.
pub fn check_group_sizes<'a>(groups: impl IntoIterator<Item = &'a SyncGroup>) -> Vec<(String, GroupHealth)> {
    groups
        .into_iter()
        .map(|group| {
            let health = GroupHealth::of(group);
            match health {
                GroupHealth::Empty => {
                    log::warn!("sync_group_empty group={} consider removing it", group.field_name);
                }
                GroupHealth::Single => {
                    log::warn!(
                        "sync_group_single_member group={} member={} forgotten synchronise flag?",
                        group.field_name,
                        group.members[0]
                    );
                }
                GroupHealth::Healthy => {
                    log::info!("sync_group_ok group={} members={}", group.field_name, group.members.len());
                }
            }
            (group.field_name.clone(), health)
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Propagation {
    pub updated: Vec<RecordId>,
    pub skipped: Vec<RecordId>,
}

/// Appends to `plan` the writes mirroring `tags` from `source` onto every
/// other member of the groups containing it, for the same `owner`.
///
/// Members whose record is gone, or where `owner` has no association, are
/// skipped with a warning.
pub fn propagate(
    snapshot: &RegistrySnapshot,
    source: &RecordId,
    owner: &Owner,
    tags: &TagList,
    plan: &mut RegistryPlan,
) -> Propagation {
    let mut propagation = Propagation::default();
    let mut visited = BTreeSet::from([source.clone()]);

    for group in snapshot.groups_containing(source) {
        for member in &group.members {
            if !visited.insert(member.clone()) {
                continue;
            }
            if snapshot.record(member).is_none() {
                log::warn!("sync_member_missing group={} record={member}", group.field_name);
                propagation.skipped.push(member.clone());
                continue;
            }
            let Some(association) = snapshot.association_for(owner, member) else {
                log::warn!(
                    "sync_member_without_association group={} record={member} owner={owner}",
                    group.field_name
                );
                propagation.skipped.push(member.clone());
                continue;
            };
            if &association.tags != tags {
                let mut mirrored = association.clone();
                mirrored.replace_tags(tags.clone());
                plan.put_association(mirrored);
                propagation.updated.push(member.clone());
            }
        }
    }

    if !propagation.updated.is_empty() {
        log::debug!(
            "sync_propagated source={source} owner={owner} updated={}",
            propagation.updated.len()
        );
    }
    propagation
}

/// Writes sync group configuration.
pub struct SyncConfig<'a, S> {
    store: &'a S,
}

impl<'a, S: RegistryStore> SyncConfig<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Stores the group for `field_name`, replacing any previous membership.
    pub async fn configure(
        &self,
        field_name: impl Into<String>,
        members: impl IntoIterator<Item = RecordId>,
    ) -> Result<CommitReceipt, RegistryError> {
        let group = SyncGroup::new(field_name, members);
        check_group_sizes([&group]);
        let snapshot = self.store.snapshot().await?;
        let mut plan = RegistryPlan::expecting(snapshot.version);
        plan.put_sync_group(group);
        self.store.commit(plan).await
    }

    pub async fn remove(&self, field_name: &str) -> Result<bool, RegistryError> {
        let snapshot = self.store.snapshot().await?;
        if !snapshot.sync_groups.contains_key(field_name) {
            return Ok(false);
        }
        let mut plan = RegistryPlan::expecting(snapshot.version);
        plan.delete_sync_group(field_name);
        self.store.commit(plan).await?;
        Ok(true)
    }

    pub async fn check_group_sizes(&self) -> Result<Vec<(String, GroupHealth)>, RegistryError> {
        let snapshot = self.store.snapshot().await?;
        Ok(check_group_sizes(snapshot.sync_groups.values()))
    }
}
