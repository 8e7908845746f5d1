use anyhow::{Context, Result};
use clap::Args;
use comfy_table::{Cell, Table};

use tagvault::integrity::DisplayAttribute;
use tagvault::{IntegrityChecker, IntegrityReport, RegistryStore};

use crate::examples::ExampleGroup;
use crate::output::{GlobalOptions, OutputManager, TableDisplay, themed_table};
use crate::workspace::Workspace;

pub const EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "Integrity Check",
    commands: &[
        "tagvault check                    # Run all five checks",
        "tagvault check --verbose          # Also list every record with its association counts",
        "tagvault check --output json      # Full report for scripting",
    ],
}];

#[derive(Args)]
pub struct CheckArgs {
    /// Show a per-record breakdown
    #[arg(short = 'v', long)]
    verbose: bool,
}

impl TableDisplay for IntegrityReport {
    fn to_table(&self, options: &GlobalOptions) -> Table {
        let mut table = themed_table(options, &["Check", "Issues"]);
        let rows = [
            ("Orphaned records", self.orphaned_records.len()),
            ("Stale display names", self.stale_display_names.len()),
            ("Broken references", self.broken_references.len()),
            ("Field name mismatches", self.field_name_mismatches.len()),
            ("Dead type identifiers", self.dead_type_identifiers.len()),
        ];
        for (label, count) in rows {
            table.add_row(vec![Cell::new(label), Cell::new(count)]);
        }
        table
    }

    fn to_compact(&self) -> String {
        format!(
            "healthy={} orphans={} stale={} broken={} mismatched={} dead={}",
            self.is_healthy(),
            self.orphaned_records.len(),
            self.stale_display_names.len(),
            self.broken_references.len(),
            self.field_name_mismatches.len(),
            self.dead_type_identifiers.len()
        )
    }
}

pub async fn handle_check(args: CheckArgs, output: &OutputManager) -> Result<()> {
    let workspace = Workspace::open(output).await?;
    output.heading("Data Integrity Check");

    let checker = IntegrityChecker::new(&workspace.store, &workspace.registry);
    let report = checker.run().await.context("Integrity check failed to run")?;
    output.display(&report)?;

    report_details(&report, output);

    output.heading("Summary Statistics");
    let stats = &report.statistics;
    output.key_value("Registry version", &stats.version.to_string());
    output.key_value("Tagged field records", &stats.records.to_string());
    output.key_value("User associations", &stats.user_associations.to_string());
    output.key_value("System associations", &stats.system_associations.to_string());
    output.key_value("Owners with tags", &stats.distinct_owners.to_string());
    output.key_value("Sync groups", &stats.sync_groups.to_string());

    if args.verbose || output.is_verbose() {
        output.heading("Record Breakdown");
        let snapshot = workspace.store.snapshot().await?;
        let mut records: Vec<_> = snapshot.records.values().collect();
        records.sort_by_key(|record| record.label());
        for record in records {
            let (mut user, mut system) = (0, 0);
            for association in snapshot.associations_for(&record.id) {
                if association.owner.is_system() {
                    system += 1;
                } else {
                    user += 1;
                }
            }
            output.bullet(&format!(
                "{} [{}] (user_tags={user}, system_tags={system})",
                record.label(),
                record.tag_kind
            ));
        }
    }

    if report.is_healthy() {
        output.success("All checks passed, data is healthy");
        Ok(())
    } else {
        output.warning("Issues found, see above for details");
        output.info("Run 'tagvault fix-orphans --dry-run' to preview a repair");
        anyhow::bail!("{} integrity issue(s) found", report.issue_count())
    }
}

fn report_details(report: &IntegrityReport, output: &OutputManager) {
    if !report.orphaned_records.is_empty() {
        output.heading("Orphaned records");
        for orphan in &report.orphaned_records {
            output.bullet(&format!(
                "{} {}.{}.{} (type {} no longer resolves)",
                orphan.record_id, orphan.namespace, orphan.cached_type_name, orphan.field_name, orphan.type_id
            ));
        }
        output.info("Fix with: tagvault fix-orphans");
    }

    if !report.stale_display_names.is_empty() {
        output.heading("Stale display names");
        for stale in &report.stale_display_names {
            let attribute = match stale.attribute {
                DisplayAttribute::TypeName => "type name",
                DisplayAttribute::FieldDisplayName => "field display name",
            };
            output.bullet(&format!(
                "{} {attribute}: '{}' is now '{}'",
                stale.record_id, stale.cached, stale.current
            ));
        }
        output.info("Fix with: tagvault populate");
    }

    if !report.broken_references.is_empty() {
        output.heading("Broken association references");
        for broken in &report.broken_references {
            let target = broken
                .record_ref
                .as_ref()
                .map_or_else(|| "null".to_string(), |record_id| format!("missing record {record_id}"));
            output.bullet(&format!("{} (owner {}) -> {target}", broken.association_id, broken.owner));
        }
        output.info("These need manual repair");
    }

    if !report.field_name_mismatches.is_empty() {
        output.heading("Field name mismatches");
        for mismatch in &report.field_name_mismatches {
            output.bullet(&format!(
                "{} caches '{}' but record {} is '{}'",
                mismatch.association_id,
                mismatch.cached_field_name.as_deref().unwrap_or("<none>"),
                mismatch.record_id,
                mismatch.record_field_name
            ));
        }
        output.info("Fix with: tagvault populate");
    }

    if !report.dead_type_identifiers.is_empty() {
        output.heading("Dead type identifiers");
        for dead in &report.dead_type_identifiers {
            output.bullet(&format!("{} {}.{}", dead.type_id, dead.namespace, dead.type_name));
        }
        output.info("Fix with: tagvault clear-cache --prune-identifiers");
    }
}
