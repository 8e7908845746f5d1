use std::collections::BTreeSet;

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::{Cell, Table};

use tagvault::reconcile::matcher::{self, MergeOutcome, UnresolvedReason};
use tagvault::reconcile::{MergePlan, OrphanFixReport, Reconciler};
use tagvault::{RegistrySnapshot, RegistryStore};

use crate::examples::ExampleGroup;
use crate::output::{GlobalOptions, OutputManager, TableDisplay, themed_table};
use crate::theme::ICONS;
use crate::workspace::Workspace;

pub const EXAMPLES: &[ExampleGroup] = &[
    ExampleGroup {
        title: "Preview",
        commands: &[
            "tagvault fix-orphans --dry-run              # Show what would be merged",
            "tagvault fix-orphans --dry-run --verbose    # Include field signatures",
        ],
    },
    ExampleGroup {
        title: "Apply",
        commands: &[
            "tagvault fix-orphans                        # Merge every uniquely matched orphan",
            "tagvault fix-orphans --verbose              # Apply and show per-merge details",
        ],
    },
];

#[derive(Args)]
pub struct FixOrphansArgs {
    /// Compute the merge plan without changing anything
    #[arg(long)]
    dry_run: bool,

    /// Show field signatures and per-merge details
    #[arg(short = 'v', long)]
    verbose: bool,
}

impl TableDisplay for OrphanFixReport {
    fn to_table(&self, options: &GlobalOptions) -> Table {
        let mut table = themed_table(options, &["Orphan", "Outcome", "Target", "Strategy"]);
        for decision in &self.plan.decisions {
            let (outcome, target, strategy) = match &decision.outcome {
                MergeOutcome::Merge {
                    target_label, strategy, ..
                } => {
                    let outcome = match &self.merge {
                        None => "would merge",
                        Some(report) if report.failed.iter().any(|failed| failed.orphan == decision.orphan) => "failed",
                        Some(_) => "merged",
                    };
                    (outcome, target_label.clone(), format!("{strategy:?}"))
                }
                MergeOutcome::Unresolved { reason } => ("unresolved", String::new(), describe_reason(reason)),
            };
            table.add_row(vec![
                Cell::new(&decision.orphan_label),
                Cell::new(outcome),
                Cell::new(target),
                Cell::new(strategy),
            ]);
        }
        if self.plan.is_empty() {
            table.add_row(vec![Cell::new("No orphans found"), Cell::new(""), Cell::new(""), Cell::new("")]);
        }
        table
    }

    fn to_compact(&self) -> String {
        let planned = self.plan.merges().count();
        let unresolved = self.plan.unresolved().count();
        match &self.merge {
            None => format!("dry_run=true would_merge={planned} unresolved={unresolved}"),
            Some(report) => format!(
                "merged={} unresolved={unresolved} failed={}",
                report.merged.len(),
                report.failed.len()
            ),
        }
    }
}

fn describe_reason(reason: &UnresolvedReason) -> String {
    match reason {
        UnresolvedReason::NoCandidate => "no candidate".to_string(),
        UnresolvedReason::Ambiguous { candidates } => {
            format!("ambiguous, {} candidates", candidates.len())
        }
    }
}

fn format_signature(signature: &BTreeSet<String>) -> String {
    let names: Vec<&str> = signature.iter().map(String::as_str).collect();
    format!("{{{}}}", names.join(", "))
}

fn show_signatures(plan: &MergePlan, snapshot: &RegistrySnapshot, output: &OutputManager) {
    output.heading("Field Signatures");
    for decision in &plan.decisions {
        let orphan_signature = matcher::signature(snapshot, &decision.orphan_type_id);
        output.bullet(&format!(
            "{} {} has {}",
            decision.orphan_label,
            decision.orphan_type_id,
            format_signature(&orphan_signature)
        ));
        let candidates: Vec<_> = match &decision.outcome {
            MergeOutcome::Merge { target, .. } => vec![target.clone()],
            MergeOutcome::Unresolved {
                reason: UnresolvedReason::Ambiguous { candidates },
            } => candidates.clone(),
            MergeOutcome::Unresolved { .. } => Vec::new(),
        };
        for candidate in candidates {
            let Some(record) = snapshot.record(&candidate) else {
                continue;
            };
            let candidate_signature = matcher::signature(snapshot, &record.type_id);
            let marker = if candidate_signature == orphan_signature {
                "match"
            } else {
                "differs"
            };
            output.indented(
                ICONS.arrow,
                &format!(
                    "{} {} has {} ({marker})",
                    record.label(),
                    record.id,
                    format_signature(&candidate_signature)
                ),
            );
        }
    }
}

pub async fn handle_fix_orphans(args: FixOrphansArgs, output: &OutputManager) -> Result<()> {
    let workspace = Workspace::open(output).await?;
    let verbose = args.verbose || output.is_verbose();
    output.heading(if args.dry_run {
        "Fix Orphans (dry run)"
    } else {
        "Fix Orphans"
    });

    let before = workspace.store.snapshot().await?;
    let reconciler = Reconciler::new(&workspace.store, &workspace.registry, &workspace.owners)
        .with_options(workspace.reconcile_options());
    let report = reconciler
        .fix_orphans(args.dry_run)
        .await
        .context("Failed to plan orphan merges")?;

    if !args.dry_run {
        workspace.save_identifiers()?;
    }

    output.display(&report)?;
    if verbose {
        show_signatures(&report.plan, &before, output);
    }

    if report.plan.is_empty() {
        output.success("No orphaned records found");
        return Ok(());
    }

    let unresolved = report.plan.unresolved().count();
    match &report.merge {
        None => {
            output.info(&format!(
                "{} orphan(s) would be merged, {unresolved} unresolved",
                report.plan.merges().count()
            ));
            output.info("Re-run without --dry-run to apply changes");
        }
        Some(merge) => {
            if verbose {
                for merged in &merge.merged {
                    output.indented(
                        ICONS.merge,
                        &format!(
                            "{} -> {} (repointed {}, combined {})",
                            merged.orphan_label,
                            merged.target_label,
                            merged.associations_repointed,
                            merged.associations_combined
                        ),
                    );
                }
                for type_id in &merge.forgotten_type_ids {
                    output.verbose(&format!("forgot stale type identifier {type_id}"));
                }
            }
            for failure in &merge.failed {
                output.error(&format!("{} -> {}: {}", failure.orphan_label, failure.target, failure.error));
            }
            if merge.merged.is_empty() {
                output.warning("Nothing was merged");
            } else {
                output.success(&format!("Merged {} orphan(s)", merge.merged.len()));
            }
        }
    }

    if unresolved > 0 {
        if verbose {
            for decision in report.plan.unresolved() {
                if let MergeOutcome::Unresolved { reason } = &decision.outcome {
                    output.indented(
                        ICONS.unresolved,
                        &format!("{} {}", decision.orphan_label, describe_reason(reason)),
                    );
                }
            }
        }
        output.warning(&format!(
            "{unresolved} orphan(s) left unresolved; use --verbose to inspect their signatures"
        ));
    }
    if !report.is_success() {
        let failed = report.merge.as_ref().map_or(0, |merge| merge.failed.len());
        anyhow::bail!("{failed} merge(s) failed");
    }
    Ok(())
}
