//! Registry reconciliation under schema drift.
//!
//! A pass runs in four steps against one store and one type registry:
//!
//! 1. [`populate`] upserts a record for every declared tagged field and seeds
//!    missing associations.
//! 2. [`orphans`] finds records whose type identifier no longer resolves.
//! 3. [`matcher`] picks, per orphan, the live record it should be merged into,
//!    or leaves it unresolved.
//! 4. [`merge`] re-points associations from each orphan to its target, one
//!    atomic unit of work per orphan.
//!
//! [`Reconciler::run`] chains all four; the steps are also callable on their
//! own for operator tooling and dry runs.

pub mod matcher;
pub mod merge;
pub mod orphans;
pub mod populate;

use serde::Serialize;

use crate::errors::RegistryError;
use crate::owners::OwnerDirectory;
use crate::registry::TypeRegistry;
use crate::store::RegistryStore;

pub use matcher::{CandidatePolicy, MatchStrategy, MergeDecision, MergeOutcome, MergePlan, UnresolvedReason};
pub use merge::{MergeFailure, MergeReport, MergedOrphan};
pub use orphans::{Classification, OrphanMap};
pub use populate::{PopulateFailure, PopulateReport};

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Seed new user associations from the record's default tags.
    pub seed_user_defaults: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            seed_user_defaults: true,
        }
    }
}

/// Outcome of a full coordinating pass.
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub populate: PopulateReport,
    pub plan: MergePlan,
    pub merge: MergeReport,
}

impl PassReport {
    pub fn is_success(&self) -> bool {
        self.populate.is_success() && self.merge.failed.is_empty()
    }
}

/// Result of the standalone orphan repair operation.
#[derive(Debug, Clone, Serialize)]
pub struct OrphanFixReport {
    pub dry_run: bool,
    pub plan: MergePlan,
    /// `None` for dry runs.
    pub merge: Option<MergeReport>,
}

impl OrphanFixReport {
    pub fn is_success(&self) -> bool {
        self.merge.as_ref().is_none_or(|merge| merge.failed.is_empty())
    }
}

pub struct Reconciler<'a, S, R, O> {
    store: &'a S,
    registry: &'a R,
    owners: &'a O,
    options: ReconcileOptions,
}

impl<'a, S, R, O> Reconciler<'a, S, R, O>
where
    S: RegistryStore,
    R: TypeRegistry,
    O: OwnerDirectory,
{
    pub fn new(store: &'a S, registry: &'a R, owners: &'a O) -> Self {
        Self {
            store,
            registry,
            owners,
            options: ReconcileOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ReconcileOptions) -> Self {
        self.options = options;
        self
    }

    /// Runs the whole pass triggered by a schema change.
    ///
    /// Merge targets are restricted to records of types that held no
    /// association before the pass began, i.e. types the pass itself discovered.
    pub async fn run(&self, owner: Option<&str>) -> Result<PassReport, RegistryError> {
        self.registry.invalidate_cache();
        let baseline = self.store.snapshot().await?.types_with_associations();

        let populate = self.populate(owner).await?;
        let plan = self
            .plan_orphan_merges(&CandidatePolicy::FreshOnly(baseline))
            .await?;
        let merge = self.merge(&plan).await;

        log::info!(
            "reconcile_pass_completed records_created={} associations_created={} merged={} unresolved={} failed={}",
            populate.records_created,
            populate.associations_created,
            merge.merged.len(),
            merge.unresolved.len(),
            merge.failed.len() + populate.failed.len(),
        );

        Ok(PassReport { populate, plan, merge })
    }

    /// Detects orphans and decides their targets without mutating anything.
    pub async fn plan_orphan_merges(&self, policy: &CandidatePolicy) -> Result<MergePlan, RegistryError> {
        let snapshot = self.store.snapshot().await?;
        let classification = orphans::classify(&snapshot, self.registry)?;
        Ok(matcher::plan_merges(&snapshot, &classification, policy))
    }

    /// Operator repair: merge every orphan that has a unique live match.
    pub async fn fix_orphans(&self, dry_run: bool) -> Result<OrphanFixReport, RegistryError> {
        self.registry.invalidate_cache();
        let plan = self.plan_orphan_merges(&CandidatePolicy::AnyLive).await?;
        let merge = if dry_run { None } else { Some(self.merge(&plan).await) };
        Ok(OrphanFixReport { dry_run, plan, merge })
    }
}
