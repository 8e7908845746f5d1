use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Project context for tagvault operations
pub struct ProjectContext {
    /// Root directory of the project (where .tagvault/ or Cargo.toml is)
    pub project_root: PathBuf,
    /// Path to .tagvault directory
    pub tagvault_dir: PathBuf,
    /// Path to config file
    pub config_path: PathBuf,
    /// Loaded configuration, defaults when no config file exists
    pub config: TagvaultConfig,
}

/// Configuration stored in .tagvault/config.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagvaultConfig {
    #[serde(default)]
    pub tagvault: TagvaultSettings,
    #[serde(default)]
    pub store: StoreSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagvaultSettings {
    #[serde(default = "default_schema_path")]
    pub schema_path: String,
    #[serde(default = "default_identifiers_path")]
    pub identifiers_path: String,
    #[serde(default = "default_true")]
    pub seed_user_defaults: bool,
}

impl Default for TagvaultSettings {
    fn default() -> Self {
        Self {
            schema_path: default_schema_path(),
            identifiers_path: default_identifiers_path(),
            seed_user_defaults: true,
        }
    }
}

fn default_schema_path() -> String {
    ".tagvault/schema.toml".to_string()
}

fn default_identifiers_path() -> String {
    ".tagvault/identifiers.json".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    File,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_store_path")]
    pub path: String,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
            redis_url: default_redis_url(),
            prefix: default_prefix(),
        }
    }
}

fn default_store_path() -> String {
    ".tagvault/registry.json".to_string()
}

fn default_redis_url() -> String {
    "${REDIS_URL}".to_string()
}

fn default_prefix() -> String {
    "tagvault".to_string()
}

impl ProjectContext {
    /// Find and load project context from current directory or ancestors
    pub fn find() -> Result<Self> {
        let current_dir = std::env::current_dir().context("Failed to get current directory")?;
        Self::find_from(&current_dir)
    }

    /// Find project context starting from the given directory
    pub fn find_from(start: &Path) -> Result<Self> {
        let project_root = Self::find_project_root(start)?;
        Self::from_root(project_root)
    }

    /// Create context from a known project root
    pub fn from_root(project_root: PathBuf) -> Result<Self> {
        let tagvault_dir = project_root.join(".tagvault");
        let config_path = tagvault_dir.join("config.toml");

        let config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path).context("Failed to read config.toml")?;
            toml::from_str(&content).context("Failed to parse config.toml")?
        } else {
            TagvaultConfig::default()
        };

        Ok(Self {
            project_root,
            tagvault_dir,
            config_path,
            config,
        })
    }

    /// Walk up to the nearest directory holding `.tagvault/`, else the
    /// nearest one holding `Cargo.toml`.
    fn find_project_root(start: &Path) -> Result<PathBuf> {
        if let Some(root) = start.ancestors().find(|dir| dir.join(".tagvault").is_dir()) {
            return Ok(root.to_path_buf());
        }
        if let Some(root) = start.ancestors().find(|dir| dir.join("Cargo.toml").exists()) {
            return Ok(root.to_path_buf());
        }
        anyhow::bail!(
            "Could not find .tagvault/ or Cargo.toml in {start:?} or any parent directory. \
             Run 'tagvault init' in your project root."
        )
    }

    /// Check if tagvault is initialized in this project
    pub fn is_initialized(&self) -> bool {
        self.tagvault_dir.exists() && self.config_path.exists()
    }

    pub fn schema_path(&self) -> PathBuf {
        self.project_root.join(&self.config.tagvault.schema_path)
    }

    pub fn identifiers_path(&self) -> PathBuf {
        self.project_root.join(&self.config.tagvault.identifiers_path)
    }

    pub fn store_path(&self) -> PathBuf {
        self.project_root.join(&self.config.store.path)
    }

    /// Get the Redis URL, expanding environment variables
    pub fn redis_url(&self) -> Result<String> {
        expand_env(&self.config.store.redis_url)
    }
}

/// Expands a whole-value `${VAR}` reference from the environment.
pub fn expand_env(value: &str) -> Result<String> {
    match value.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')) {
        Some(var_name) => {
            std::env::var(var_name).with_context(|| format!("Environment variable {var_name} not set"))
        }
        None => Ok(value.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TagvaultConfig::default();
        assert_eq!(config.tagvault.schema_path, ".tagvault/schema.toml");
        assert_eq!(config.tagvault.identifiers_path, ".tagvault/identifiers.json");
        assert!(config.tagvault.seed_user_defaults);
        assert_eq!(config.store.backend, StoreBackend::File);
        assert_eq!(config.store.redis_url, "${REDIS_URL}");
        assert_eq!(config.store.prefix, "tagvault");
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: TagvaultConfig = toml::from_str("[store]\nbackend = \"redis\"\n").unwrap();
        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.store.path, ".tagvault/registry.json");
        assert_eq!(config.tagvault.schema_path, ".tagvault/schema.toml");
    }

    #[test]
    fn test_config_serialization() {
        let config = TagvaultConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("schema_path"));
        assert!(toml_str.contains("backend = \"file\""));
    }

    #[test]
    fn test_literal_values_are_not_expanded() {
        assert_eq!(expand_env("redis://127.0.0.1/").unwrap(), "redis://127.0.0.1/");
        assert!(expand_env("${TAGVAULT_TEST_SURELY_UNSET_VAR}").is_err());
    }

    #[test]
    fn test_finds_tagvault_dir_above_start() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".tagvault")).unwrap();
        let nested = dir.path().join("src").join("models");
        std::fs::create_dir_all(&nested).unwrap();

        let ctx = ProjectContext::find_from(&nested).unwrap();
        assert_eq!(ctx.project_root, dir.path());
        assert!(!ctx.is_initialized());
    }
}
