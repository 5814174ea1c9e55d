//! Configuration types for the tenancy workspace.
//!
//! Configuration is loaded from YAML files (tenancy.yaml, models/*.yaml) and
//! combined into a single `TenancyConfig` structure.
//!
//! # Configuration Files
//!
//! - **tenancy.yaml**: Main configuration file with the upstream DB, the tenants
//!   table, RLS settings and resource syncing settings
//! - **models/*.yaml**: Individual synced model definitions (one per file)

pub mod rls;
pub mod sync;
pub mod tenancy;
pub mod upstream;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub use rls::{RlsConfig, RlsUserConfig};
pub use sync::{CreationAttribute, ModelSide, SyncConfig, SyncedModelConfig};
pub use tenancy::TenantsTableConfig;
pub use upstream::{ConnectionPoolConfig, SslMode, UpstreamConfig};

/// Complete tenancy configuration loaded from files.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenancyConfig {
    /// Project name.
    #[serde(default)]
    pub project: Option<String>,

    /// Configuration version.
    #[serde(default)]
    pub version: Option<String>,

    /// Upstream (central) Postgres connection.
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// The tenants table and its key.
    #[serde(default)]
    pub tenants: TenantsTableConfig,

    /// Row-level security settings.
    #[serde(default)]
    pub rls: RlsConfig,

    /// Resource syncing settings.
    #[serde(default)]
    pub sync: SyncConfig,

    /// Directory containing synced model definition files.
    #[serde(default)]
    pub models_dir: Option<PathBuf>,

    /// List of individual synced model definition files.
    #[serde(default)]
    pub model_files: Vec<PathBuf>,
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TenancyConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(ConfigError::from)
    }

    /// Load configuration and resolve all external references.
    ///
    /// This loads synced model definitions from `models_dir` and `model_files`
    /// (relative paths are resolved against the directory of `path`), then
    /// validates the combined sync configuration.
    pub fn load_with_context(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut config = Self::from_file(path)?;

        let base_dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        if let Some(models_dir) = &config.models_dir {
            let models_path = resolve(&base_dir, models_dir);

            if models_path.is_dir() {
                let mut files: Vec<PathBuf> = fs::read_dir(&models_path)?
                    .collect::<Result<Vec<_>, _>>()?
                    .into_iter()
                    .map(|entry| entry.path())
                    .filter(|p| {
                        p.extension()
                            .map(|e| e == "yaml" || e == "yml")
                            .unwrap_or(false)
                    })
                    .collect();
                // read_dir order is platform dependent
                files.sort();

                for file in files {
                    config.sync.models.push(SyncedModelConfig::from_file(&file)?);
                }
            }
        }

        for model_file in &config.model_files.clone() {
            let model_path = resolve(&base_dir, model_file);
            if !model_path.exists() {
                return Err(ConfigError::Config(format!(
                    "Model file not found: {}",
                    model_path.display()
                )));
            }
            config.sync.models.push(SyncedModelConfig::from_file(&model_path)?);
        }

        config.sync.validate()?;

        Ok(config)
    }
}

fn resolve(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}
