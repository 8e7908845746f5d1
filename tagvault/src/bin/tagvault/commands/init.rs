use anyhow::{Context, Result};
use clap::Args;

use crate::context::{ProjectContext, StoreBackend, TagvaultConfig};
use crate::examples::ExampleGroup;
use crate::output::OutputManager;

pub const EXAMPLES: &[ExampleGroup] = &[ExampleGroup {
    title: "Initialize",
    commands: &[
        "tagvault init                     # Create .tagvault/ with a file-backed registry",
        "tagvault init --backend redis     # Store the registry in Redis (uses REDIS_URL)",
        "tagvault init --force             # Rewrite config.toml, keep schema and data",
    ],
}];

const SCHEMA_TEMPLATE: &str = r#"# Known owners; user-kind fields get one association per owner.
owners = []

# Each type lists its tagged fields. `kind` is "user" or "system".
#
# [[types]]
# type_id = "ct-1"
# namespace = "blog"
# name = "Article"
# fields = [
#     { name = "tags", display_name = "Tags", kind = "user", default_tags = ["draft"] },
#     { name = "category", kind = "system", default_tags = ["news"] },
# ]
"#;

#[derive(Args)]
pub struct InitArgs {
    /// Registry backend to configure
    #[arg(long, value_parser = ["file", "redis"], default_value = "file")]
    backend: String,

    /// Overwrite an existing config.toml
    #[arg(long)]
    force: bool,
}

pub async fn handle_init(args: InitArgs, output: &OutputManager) -> Result<()> {
    let current_dir = std::env::current_dir().context("Failed to get current directory")?;
    let ctx = ProjectContext::from_root(current_dir)?;

    output.heading("Initialize tagvault");

    if ctx.is_initialized() && !args.force {
        output.warning(&format!("Already initialized: {}", ctx.config_path.display()));
        output.info("Use --force to rewrite the configuration.");
        return Ok(());
    }

    std::fs::create_dir_all(&ctx.tagvault_dir)
        .with_context(|| format!("Failed to create {}", ctx.tagvault_dir.display()))?;

    let mut config = TagvaultConfig::default();
    if args.backend == "redis" {
        config.store.backend = StoreBackend::Redis;
    }
    let rendered = toml::to_string_pretty(&config).context("Failed to render config.toml")?;
    std::fs::write(&ctx.config_path, rendered).context("Failed to write config.toml")?;
    output.success(&format!("Wrote {}", ctx.config_path.display()));

    let schema_path = ctx.project_root.join(&config.tagvault.schema_path);
    if schema_path.exists() {
        output.info(&format!("Keeping existing {}", schema_path.display()));
    } else {
        std::fs::write(&schema_path, SCHEMA_TEMPLATE)
            .with_context(|| format!("Failed to write {}", schema_path.display()))?;
        output.success(&format!("Wrote {}", schema_path.display()));
    }

    output.heading("Next steps");
    output.bullet("Declare your tagged fields in .tagvault/schema.toml");
    output.bullet("Run 'tagvault populate' to register them");
    output.bullet("Run 'tagvault check' after every schema change");
    Ok(())
}
