use anyhow::{Context, Result};
use clap::Args;
use comfy_table::{Cell, Table};

use tagvault::OwnerDirectory;
use tagvault::reconcile::{PopulateReport, Reconciler};

use crate::examples::ExampleGroup;
use crate::output::{GlobalOptions, OutputManager, TableDisplay, themed_table};
use crate::workspace::Workspace;

pub const EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "Populate",
    commands: &[
        "tagvault populate                 # Register every declared field for all owners",
        "tagvault populate --owner ana     # Seed associations for one owner only",
        "tagvault populate --output json   # Machine-readable report",
    ],
}];

#[derive(Args)]
pub struct PopulateArgs {
    /// Only seed user associations for this owner
    #[arg(long)]
    owner: Option<String>,
}

impl TableDisplay for PopulateReport {
    fn to_table(&self, options: &GlobalOptions) -> Table {
        let mut table = themed_table(options, &["Metric", "Count"]);
        let rows = [
            ("Declared fields", self.declared_fields),
            ("Owners considered", self.owners_considered),
            ("Records created", self.records_created),
            ("Records updated", self.records_updated),
            ("Records unchanged", self.records_unchanged),
            ("Associations created", self.associations_created),
            ("Associations refreshed", self.associations_refreshed),
            ("Sync groups updated", self.sync_groups_updated),
            ("Sync members removed", self.sync_members_removed),
            ("Failed fields", self.failed.len()),
        ];
        for (label, count) in rows {
            table.add_row(vec![Cell::new(label), Cell::new(count)]);
        }
        table
    }

    fn to_compact(&self) -> String {
        format!(
            "created={} updated={} unchanged={} associations={} failed={}",
            self.records_created,
            self.records_updated,
            self.records_unchanged,
            self.associations_created,
            self.failed.len()
        )
    }
}

pub async fn handle_populate(args: PopulateArgs, output: &OutputManager) -> Result<()> {
    let workspace = Workspace::open(output).await?;
    output.heading("Populate");

    if let Some(owner) = args.owner.as_deref() {
        let known = workspace.owners.list_known_owners()?;
        if !known.iter().any(|handle| handle == owner) {
            output.error(&format!("Owner '{owner}' is not listed in the schema manifest"));
            anyhow::bail!("Unknown owner '{owner}'");
        }
        output.warning(&format!("Targeting specific owner: {owner}"));
    }

    let reconciler = Reconciler::new(&workspace.store, &workspace.registry, &workspace.owners)
        .with_options(workspace.reconcile_options());
    output.progress("Registering declared fields");
    let report = reconciler
        .populate(args.owner.as_deref())
        .await
        .context("Tag population failed")?;
    output.clear_line();
    workspace.save_identifiers()?;

    output.display(&report)?;
    for failure in &report.failed {
        output.error(&format!(
            "{}.{} [{}]: {}",
            failure.type_id, failure.field_name, failure.tag_kind, failure.error
        ));
    }
    if output.is_verbose() {
        for record_id in &report.created_record_ids {
            output.verbose(&format!("created record {record_id}"));
        }
    }

    if !report.is_success() {
        anyhow::bail!("{} field(s) failed to populate", report.failed.len());
    }
    match args.owner {
        Some(owner) => output.success(&format!("Successfully populated tags for owner {owner}")),
        None => output.success("Successfully populated/updated all tags"),
    }
    Ok(())
}
