use anyhow::{Context, Result};

use tagvault::errors::RegistryError;
use tagvault::store::{CommitReceipt, FileStore, RedisStore, RegistryPlan, RegistrySnapshot, RegistryStore};
use tagvault::{IdentifierTable, InMemoryTypeRegistry, ReconcileOptions, SchemaManifest, StaticOwnerDirectory};

use crate::context::{ProjectContext, StoreBackend};
use crate::output::OutputManager;

/// Store selected by `[store] backend`.
pub enum CliStore {
    File(FileStore),
    Redis(RedisStore),
}

impl RegistryStore for CliStore {
    async fn snapshot(&self) -> Result<RegistrySnapshot, RegistryError> {
        match self {
            CliStore::File(store) => store.snapshot().await,
            CliStore::Redis(store) => store.snapshot().await,
        }
    }

    async fn commit(&self, plan: RegistryPlan) -> Result<CommitReceipt, RegistryError> {
        match self {
            CliStore::File(store) => store.commit(plan).await,
            CliStore::Redis(store) => store.commit(plan).await,
        }
    }
}

/// Everything a command needs: the loaded schema, the store and the owners.
pub struct Workspace {
    pub ctx: ProjectContext,
    pub registry: InMemoryTypeRegistry,
    pub owners: StaticOwnerDirectory,
    pub store: CliStore,
}

impl Workspace {
    pub async fn open(output: &OutputManager) -> Result<Self> {
        let ctx = ProjectContext::find()?;
        if !ctx.is_initialized() {
            output.error("tagvault is not initialized in this project.");
            output.info("Run 'tagvault init' first to initialize.");
            anyhow::bail!("Project not initialized");
        }

        let schema_path = ctx.schema_path();
        let manifest = SchemaManifest::load(&schema_path)
            .with_context(|| format!("Failed to load schema manifest {}", schema_path.display()))?;
        let identifiers = IdentifierTable::load(&ctx.identifiers_path()).context("Failed to load identifier table")?;
        output.verbose(&format!(
            "Loaded {} type(s) and {} remembered identifier(s)",
            manifest.types.len(),
            identifiers.identifiers.len()
        ));

        let registry = manifest.into_registry(&identifiers);
        let owners = StaticOwnerDirectory::new(manifest.owners.iter().cloned());
        let store = open_store(&ctx, output).await?;

        Ok(Self {
            ctx,
            registry,
            owners,
            store,
        })
    }

    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            seed_user_defaults: self.ctx.config.tagvault.seed_user_defaults,
        }
    }

    /// Persists the identifier table so forgotten or removed types are
    /// remembered correctly on the next run.
    pub fn save_identifiers(&self) -> Result<()> {
        IdentifierTable::from_registry(&self.registry)?
            .save(&self.ctx.identifiers_path())
            .context("Failed to save identifier table")
    }
}

async fn open_store(ctx: &ProjectContext, output: &OutputManager) -> Result<CliStore> {
    match ctx.config.store.backend {
        StoreBackend::File => {
            let path = ctx.store_path();
            output.verbose(&format!("Using file store {}", path.display()));
            let store = FileStore::open(&path).with_context(|| format!("Failed to open {}", path.display()))?;
            Ok(CliStore::File(store))
        }
        StoreBackend::Redis => {
            let redis_url = ctx
                .redis_url()
                .context("REDIS_URL environment variable not set. Set it to connect to Redis.")?;
            output.progress("Connecting to Redis");
            let store = RedisStore::connect(&redis_url, ctx.config.store.prefix.clone())
                .await
                .context("Failed to connect to Redis")?;
            output.clear_line();
            output.verbose("Connected to Redis");
            Ok(CliStore::Redis(store))
        }
    }
}
