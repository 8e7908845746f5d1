//! Picks the live record each orphan should be merged into.
//!
//! A single candidate is taken as is. Several candidates are ranked by how
//! closely their type's field-name signature matches the orphan's, and only a
//! unique top scorer is accepted: the matcher never guesses between equals.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::reconcile::orphans::Classification;
use crate::store::RegistrySnapshot;
use crate::types::{RecordId, TagKind, TaggedFieldRecord, TypeId};

/// Which live records may receive an orphan's associations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CandidatePolicy {
    /// Only records whose type is absent from the baseline, i.e. types with
    /// no associations when the pass began.
    FreshOnly(BTreeSet<TypeId>),
    AnyLive,
}

impl CandidatePolicy {
    fn admits(&self, candidate: &TaggedFieldRecord) -> bool {
        match self {
            CandidatePolicy::FreshOnly(baseline) => !baseline.contains(&candidate.type_id),
            CandidatePolicy::AnyLive => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    UniqueMatch,
    FieldSignature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnresolvedReason {
    NoCandidate,
    Ambiguous { candidates: Vec<RecordId> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MergeOutcome {
    Merge {
        target: RecordId,
        target_label: String,
        strategy: MatchStrategy,
    },
    Unresolved {
        #[serde(flatten)]
        reason: UnresolvedReason,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeDecision {
    pub orphan: RecordId,
    pub orphan_label: String,
    pub orphan_type_id: TypeId,
    pub namespace: String,
    pub field_name: String,
    pub tag_kind: TagKind,
    pub outcome: MergeOutcome,
}

impl MergeDecision {
    pub fn target(&self) -> Option<&RecordId> {
        match &self.outcome {
            MergeOutcome::Merge { target, .. } => Some(target),
            MergeOutcome::Unresolved { .. } => None,
        }
    }
}

/// One decision per orphan, in namespace then record id order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergePlan {
    pub decisions: Vec<MergeDecision>,
}

impl MergePlan {
    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn merges(&self) -> impl Iterator<Item = &MergeDecision> {
        self.decisions.iter().filter(|decision| decision.target().is_some())
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &MergeDecision> {
        self.decisions.iter().filter(|decision| decision.target().is_none())
    }
}

/// Closeness of a candidate's signature to the orphan's. Ordered so a
/// signature match outranks any overlap size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SignatureScore {
    pub exact: bool,
    pub overlap: usize,
}

impl SignatureScore {
    pub fn between(orphan: &BTreeSet<String>, candidate: &BTreeSet<String>) -> Self {
        Self {
            exact: orphan == candidate,
            overlap: orphan.intersection(candidate).count(),
        }
    }
}

/// Returns the unique best-scoring candidate, or `None` when the top score is
/// shared.
pub fn select_candidate<'a>(scored: &[(&'a RecordId, SignatureScore)]) -> Option<&'a RecordId> {
    let best = scored.iter().map(|(_, score)| *score).max()?;
    let mut top = scored.iter().filter(|(_, score)| *score == best);
    let (winner, _) = top.next()?;
    match top.next() {
        Some(_) => None,
        None => Some(*winner),
    }
}

/// Field names of every record filed under `type_id`.
pub fn signature(snapshot: &RegistrySnapshot, type_id: &TypeId) -> BTreeSet<String> {
    snapshot
        .records_with_type(type_id)
        .map(|record| record.field_name.clone())
        .collect()
}

/// Decides a merge target for every orphan of `classification`.
///
/// Signatures come from `snapshot` as it stands before any merge, so the
/// order orphans are visited in cannot change another orphan's outcome.
pub fn plan_merges(snapshot: &RegistrySnapshot, classification: &Classification, policy: &CandidatePolicy) -> MergePlan {
    let mut signatures: BTreeMap<&TypeId, BTreeSet<String>> = BTreeMap::new();
    for record in snapshot.records.values() {
        signatures
            .entry(&record.type_id)
            .or_default()
            .insert(record.field_name.clone());
    }

    let mut plan = MergePlan::default();
    for orphan in classification.iter_orphans() {
        let candidates: Vec<&TaggedFieldRecord> = snapshot
            .records
            .values()
            .filter(|candidate| {
                classification
                    .live
                    .get(&candidate.id)
                    .is_some_and(|namespace| namespace == &orphan.namespace)
                    && candidate.field_name == orphan.field_name
                    && candidate.tag_kind == orphan.tag_kind
                    && candidate.type_id != orphan.type_id
                    && policy.admits(candidate)
            })
            .collect();

        let outcome = match candidates.as_slice() {
            [] => MergeOutcome::Unresolved {
                reason: UnresolvedReason::NoCandidate,
            },
            [only] => MergeOutcome::Merge {
                target: only.id.clone(),
                target_label: only.label(),
                strategy: MatchStrategy::UniqueMatch,
            },
            several => {
                let empty = BTreeSet::new();
                let orphan_signature = signatures.get(&orphan.type_id).unwrap_or(&empty);
                let scored: Vec<(&RecordId, SignatureScore)> = several
                    .iter()
                    .map(|candidate| {
                        let candidate_signature = signatures.get(&candidate.type_id).unwrap_or(&empty);
                        (&candidate.id, SignatureScore::between(orphan_signature, candidate_signature))
                    })
                    .collect();
                match select_candidate(&scored) {
                    Some(target) => MergeOutcome::Merge {
                        target: target.clone(),
                        target_label: snapshot.record(target).map(TaggedFieldRecord::label).unwrap_or_default(),
                        strategy: MatchStrategy::FieldSignature,
                    },
                    None => MergeOutcome::Unresolved {
                        reason: UnresolvedReason::Ambiguous {
                            candidates: several.iter().map(|candidate| candidate.id.clone()).collect(),
                        },
                    },
                }
            }
        };

        match &outcome {
            MergeOutcome::Merge { target, strategy, .. } => {
                log::debug!("merge_target_selected orphan={} target={target} strategy={strategy:?}", orphan.id);
            }
            MergeOutcome::Unresolved { reason } => {
                log::warn!("orphan_unresolved orphan={} label={} reason={reason:?}", orphan.id, orphan.label());
            }
        }

        plan.decisions.push(MergeDecision {
            orphan: orphan.id.clone(),
            orphan_label: orphan.label(),
            orphan_type_id: orphan.type_id.clone(),
            namespace: orphan.namespace.clone(),
            field_name: orphan.field_name.clone(),
            tag_kind: orphan.tag_kind,
            outcome,
        });
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn exact_signature_outranks_larger_overlap() {
        let orphan = set(&["emotions", "breed"]);
        let exact = SignatureScore::between(&orphan, &set(&["emotions", "breed"]));
        let superset = SignatureScore::between(&orphan, &set(&["emotions", "breed", "size"]));
        assert!(exact > superset);
        assert_eq!(superset.overlap, 2);
    }

    #[test]
    fn shared_top_score_selects_nothing() {
        let a = RecordId::new("a");
        let b = RecordId::new("b");
        let score = SignatureScore { exact: false, overlap: 1 };
        assert_eq!(select_candidate(&[(&a, score), (&b, score)]), None);
    }

    #[test]
    fn unique_top_score_wins_regardless_of_position() {
        let a = RecordId::new("a");
        let b = RecordId::new("b");
        let c = RecordId::new("c");
        let low = SignatureScore { exact: false, overlap: 1 };
        let high = SignatureScore { exact: false, overlap: 2 };
        assert_eq!(select_candidate(&[(&a, low), (&b, high), (&c, low)]), Some(&b));
    }

    #[test]
    fn two_exact_matches_are_a_tie() {
        let orphan = set(&["emotions"]);
        let a = RecordId::new("a");
        let b = RecordId::new("b");
        let scored = [
            (&a, SignatureScore::between(&orphan, &set(&["emotions"]))),
            (&b, SignatureScore::between(&orphan, &set(&["emotions"]))),
        ];
        assert_eq!(select_candidate(&scored), None);
    }

    fn record(id: &str, type_id: &str) -> TaggedFieldRecord {
        TaggedFieldRecord {
            id: RecordId::new(id),
            type_id: TypeId::new(type_id),
            namespace: "zoo".into(),
            cached_type_name: "Cat".into(),
            cached_field_display_name: "Emotions".into(),
            field_name: "emotions".into(),
            tag_kind: TagKind::User,
            default_tag_seed: None,
            synchronise: false,
        }
    }

    #[test]
    fn fresh_only_excludes_every_record_of_a_baseline_type() {
        let policy = CandidatePolicy::FreshOnly([TypeId::new("ct-cat")].into_iter().collect());
        assert!(!policy.admits(&record("brand-new-field", "ct-cat")));
        assert!(policy.admits(&record("hound", "ct-hound")));
        assert!(CandidatePolicy::AnyLive.admits(&record("brand-new-field", "ct-cat")));
    }
}
