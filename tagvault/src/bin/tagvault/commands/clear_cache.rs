use anyhow::{Context, Result};
use clap::Args;

use tagvault::{IntegrityChecker, Resolution, TypeRegistry};

use crate::examples::ExampleGroup;
use crate::output::OutputManager;
use crate::workspace::Workspace;

pub const EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "Type Cache",
    commands: &[
        "tagvault clear-cache                        # Drop memoized type resolutions",
        "tagvault clear-cache --prune-identifiers    # Also forget dead type identifiers",
    ],
}];

#[derive(Args)]
pub struct ClearCacheArgs {
    /// Forget identifiers that resolve to nothing and back no record
    #[arg(long)]
    prune_identifiers: bool,
}

pub async fn handle_clear_cache(args: ClearCacheArgs, output: &OutputManager) -> Result<()> {
    let workspace = Workspace::open(output).await?;
    output.heading("Clear Type Cache");

    let cached = workspace.registry.cached_resolutions();
    workspace.registry.invalidate_cache();
    output.success(&format!("Type resolution cache cleared ({cached} entries dropped)"));

    let remembered = workspace.registry.known_identifiers()?;
    let stale = remembered
        .iter()
        .filter(|entry| matches!(workspace.registry.resolve(&entry.type_id), Ok(Resolution::Unresolved)))
        .count();
    workspace.registry.invalidate_cache();
    output.info(&format!(
        "{} identifier(s) remembered, {stale} no longer resolve",
        remembered.len()
    ));

    if args.prune_identifiers {
        let checker = IntegrityChecker::new(&workspace.store, &workspace.registry);
        let dead = checker
            .dead_type_identifiers()
            .await
            .context("Failed to find dead type identifiers")?;
        for entry in &dead {
            if workspace.registry.forget(&entry.type_id)? {
                output.bullet(&format!("forgot {} {}.{}", entry.type_id, entry.namespace, entry.type_name));
            }
        }
        workspace.save_identifiers()?;
        output.success(&format!("Pruned {} dead identifier(s)", dead.len()));
    } else if stale > 0 {
        output.info("Orphaned types are forgotten by 'tagvault fix-orphans' once merged");
    }

    Ok(())
}
