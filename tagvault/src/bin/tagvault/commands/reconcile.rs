use anyhow::{Context, Result};
use clap::Args;
use comfy_table::{Cell, Table};

use tagvault::{PassReport, Reconciler};

use crate::examples::ExampleGroup;
use crate::output::{GlobalOptions, OutputManager, TableDisplay, themed_table};
use crate::workspace::Workspace;

pub const EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "Schema Changed",
    commands: &[
        "tagvault reconcile                # Populate, detect orphans and merge them in one pass",
        "tagvault reconcile --owner ana    # Same, seeding only one owner",
    ],
}];

#[derive(Args)]
pub struct ReconcileArgs {
    /// Only seed user associations for this owner
    #[arg(long)]
    owner: Option<String>,
}

impl TableDisplay for PassReport {
    fn to_table(&self, options: &GlobalOptions) -> Table {
        let mut table = themed_table(options, &["Step", "Metric", "Count"]);
        let rows = [
            ("populate", "records created", self.populate.records_created),
            ("populate", "records updated", self.populate.records_updated),
            ("populate", "associations created", self.populate.associations_created),
            ("populate", "failed fields", self.populate.failed.len()),
            ("match", "orphans", self.plan.len()),
            ("merge", "merged", self.merge.merged.len()),
            ("merge", "associations moved", self.merge.associations_moved()),
            ("merge", "unresolved", self.merge.unresolved.len()),
            ("merge", "failed", self.merge.failed.len()),
        ];
        for (step, metric, count) in rows {
            table.add_row(vec![Cell::new(step), Cell::new(metric), Cell::new(count)]);
        }
        table
    }

    fn to_compact(&self) -> String {
        format!(
            "created={} merged={} unresolved={} failed={}",
            self.populate.records_created,
            self.merge.merged.len(),
            self.merge.unresolved.len(),
            self.populate.failed.len() + self.merge.failed.len()
        )
    }
}

pub async fn handle_reconcile(args: ReconcileArgs, output: &OutputManager) -> Result<()> {
    let workspace = Workspace::open(output).await?;
    output.heading("Reconcile");

    let reconciler = Reconciler::new(&workspace.store, &workspace.registry, &workspace.owners)
        .with_options(workspace.reconcile_options());
    output.progress("Running reconciliation pass");
    let report = reconciler
        .run(args.owner.as_deref())
        .await
        .context("Reconciliation pass aborted")?;
    output.clear_line();
    workspace.save_identifiers()?;

    output.display(&report)?;
    for decision in &report.merge.unresolved {
        output.warning(&format!("{} left unresolved", decision.orphan_label));
    }

    if !report.is_success() {
        anyhow::bail!(
            "{} unit(s) of work failed",
            report.populate.failed.len() + report.merge.failed.len()
        );
    }
    output.success("Registry reconciled");
    Ok(())
}
