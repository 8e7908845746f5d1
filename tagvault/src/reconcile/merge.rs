use chrono::Utc;
use serde::Serialize;

use crate::errors::RegistryError;
use crate::owners::OwnerDirectory;
use crate::reconcile::Reconciler;
use crate::reconcile::matcher::{MatchStrategy, MergeDecision, MergeOutcome, MergePlan};
use crate::registry::TypeRegistry;
use crate::store::{RegistryPlan, RegistrySnapshot, RegistryStore};
use crate::types::{RecordId, SyncGroup, TypeId};

#[derive(Debug, Clone, Serialize)]
pub struct MergedOrphan {
    pub orphan: RecordId,
    pub orphan_label: String,
    pub target: RecordId,
    pub target_label: String,
    pub strategy: MatchStrategy,
    pub associations_repointed: usize,
    pub associations_combined: usize,
    pub sync_groups_updated: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeFailure {
    pub orphan: RecordId,
    pub orphan_label: String,
    pub target: RecordId,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeReport {
    pub merged: Vec<MergedOrphan>,
    pub unresolved: Vec<MergeDecision>,
    pub failed: Vec<MergeFailure>,
    pub forgotten_type_ids: Vec<TypeId>,
}

impl MergeReport {
    pub fn associations_moved(&self) -> usize {
        self.merged
            .iter()
            .map(|merged| merged.associations_repointed + merged.associations_combined)
            .sum()
    }
}

/// Commands that fold `orphan` into `target`, plus what they will touch.
#[derive(Debug, Clone)]
pub struct OrphanMerge {
    pub plan: RegistryPlan,
    pub associations_repointed: usize,
    pub associations_combined: usize,
    pub sync_groups_updated: usize,
}

/// Builds the unit of work merging `orphan` into `target` against `snapshot`.
///
/// Associations move to the target. Where the target already has a row for
/// the same owner that row is kept and receives the orphan's tags followed by
/// its own, and the orphan's row is dropped.
pub fn build_merge_plan(
    snapshot: &RegistrySnapshot,
    orphan: &RecordId,
    target: &RecordId,
) -> Result<OrphanMerge, RegistryError> {
    let orphan_record = snapshot.record(orphan).ok_or_else(|| RegistryError::NotFound {
        kind: "record",
        id: orphan.to_string(),
    })?;
    let target_record = snapshot.record(target).ok_or_else(|| RegistryError::NotFound {
        kind: "record",
        id: target.to_string(),
    })?;
    if orphan == target {
        return Err(RegistryError::invalid(format!("record {orphan} cannot be merged into itself")));
    }

    let mut merge = OrphanMerge {
        plan: RegistryPlan::expecting(snapshot.version),
        associations_repointed: 0,
        associations_combined: 0,
        sync_groups_updated: 0,
    };

    for association in snapshot.associations_for(&orphan_record.id) {
        match snapshot.association_for(&association.owner, &target_record.id) {
            Some(existing) => {
                let mut combined = existing.clone();
                combined.tags = association.tags.union_ordered(&existing.tags);
                combined.search_tags = association
                    .search_tags
                    .union_ordered(&existing.search_tags)
                    .union_ordered(&combined.tags);
                combined.cached_field_name = Some(target_record.field_name.clone());
                combined.updated_at = Utc::now();
                merge
                    .plan
                    .put_association(combined)
                    .delete_association(association.id.clone());
                merge.associations_combined += 1;
            }
            None => {
                let mut moved = association.clone();
                moved.record_ref = Some(target_record.id.clone());
                moved.cached_field_name = Some(target_record.field_name.clone());
                merge.plan.put_association(moved);
                merge.associations_repointed += 1;
            }
        }
    }

    for group in snapshot.groups_containing(&orphan_record.id) {
        let members = group.members.iter().map(|member| {
            if member == &orphan_record.id {
                target_record.id.clone()
            } else {
                member.clone()
            }
        });
        merge.plan.put_sync_group(SyncGroup::new(group.field_name.clone(), members));
        merge.sync_groups_updated += 1;
    }

    merge.plan.delete_record(orphan_record.id.clone());
    Ok(merge)
}

impl<S, R, O> Reconciler<'_, S, R, O>
where
    S: RegistryStore,
    R: TypeRegistry,
    O: OwnerDirectory,
{
    /// Executes `plan`, one unit of work per merge decision.
    ///
    /// A merge that fails is recorded and skipped; merges already committed
    /// stay committed.
    pub async fn merge(&self, plan: &MergePlan) -> MergeReport {
        let mut report = MergeReport::default();

        for decision in &plan.decisions {
            let MergeOutcome::Merge {
                target,
                target_label,
                strategy,
            } = &decision.outcome
            else {
                report.unresolved.push(decision.clone());
                continue;
            };

            match self.merge_one(decision, target).await {
                Ok(merge) => {
                    log::info!(
                        "orphan_merged orphan={} target={target} repointed={} combined={}",
                        decision.orphan,
                        merge.associations_repointed,
                        merge.associations_combined
                    );
                    report.merged.push(MergedOrphan {
                        orphan: decision.orphan.clone(),
                        orphan_label: decision.orphan_label.clone(),
                        target: target.clone(),
                        target_label: target_label.clone(),
                        strategy: *strategy,
                        associations_repointed: merge.associations_repointed,
                        associations_combined: merge.associations_combined,
                        sync_groups_updated: merge.sync_groups_updated,
                    });
                    if self.forget_if_unreferenced(&decision.orphan_type_id).await {
                        report.forgotten_type_ids.push(decision.orphan_type_id.clone());
                    }
                }
                Err(err) => {
                    log::warn!("orphan_merge_failed orphan={} target={target} error={err}", decision.orphan);
                    report.failed.push(MergeFailure {
                        orphan: decision.orphan.clone(),
                        orphan_label: decision.orphan_label.clone(),
                        target: target.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }

        report
    }

    async fn merge_one(&self, decision: &MergeDecision, target: &RecordId) -> Result<OrphanMerge, RegistryError> {
        let snapshot = self.store.snapshot().await?;
        let merge = build_merge_plan(&snapshot, &decision.orphan, target)?;
        log::debug!("orphan_merge_plan orphan={} commands={}", decision.orphan, merge.plan.len());
        self.store.commit(merge.plan.clone()).await?;
        Ok(merge)
    }

    /// Drops `type_id` from the adapter once no record is filed under it.
    async fn forget_if_unreferenced(&self, type_id: &TypeId) -> bool {
        let snapshot = match self.store.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                log::warn!("type_forget_skipped type_id={type_id} error={err}");
                return false;
            }
        };
        if snapshot.records_with_type(type_id).next().is_some() {
            return false;
        }
        match self.registry.forget(type_id) {
            Ok(forgotten) => {
                if forgotten {
                    log::info!("type_identifier_forgotten type_id={type_id}");
                }
                forgotten
            }
            Err(err) => {
                log::warn!("type_forget_failed type_id={type_id} error={err}");
                false
            }
        }
    }
}
