//! Configuration System
//!
//! Layered configuration for opening a context stack: which schema to load,
//! where the store lives and how sled is tuned, and how logging is set up.
//! Sources are merged in order: defaults, global file, workspace files,
//! then `CTXSTACK__` environment variables.

use crate::error::StackError;
use crate::logging::LoggingConfig;
use crate::schema::is_identifier;
use config::{Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod merge {
    pub mod merge_policy;
}
mod sources {
    pub mod global_file;
    pub mod workspace_file;
}
mod store;

pub use store::{EngineKind, StoreConfig};

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackConfig {
    #[serde(default)]
    pub schema: SchemaConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which schema resource to load, and from where
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    #[serde(default = "default_schema_name")]
    pub name: String,

    /// Directory of `<name>.toml` schema resources
    #[serde(default = "default_bundle_dir")]
    pub bundle_dir: PathBuf,
}

fn default_schema_name() -> String {
    "Model".to_string()
}

fn default_bundle_dir() -> PathBuf {
    PathBuf::from("schemas")
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            name: default_schema_name(),
            bundle_dir: default_bundle_dir(),
        }
    }
}

impl SchemaConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !is_identifier(&self.name) {
            return Err(format!("Schema name '{}' is not a valid identifier", self.name));
        }
        if self.bundle_dir.as_os_str().is_empty() {
            return Err("Schema bundle directory cannot be empty".to_string());
        }
        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Schema(String),
    Store(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Schema(msg) => write!(f, "Schema: {}", msg),
            ValidationError::Store(msg) => write!(f, "Store: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl StackConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = self.schema.validate() {
            errors.push(ValidationError::Schema(e));
        }
        if let Err(e) = self.store.validate() {
            errors.push(ValidationError::Store(e));
        }
        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validate, folding every problem into one `StackError::ConfigError`.
    pub fn ensure_valid(&self) -> Result<(), StackError> {
        self.validate().map_err(|errors| {
            let error_msgs: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            StackError::ConfigError(format!(
                "Configuration validation failed:\n{}",
                error_msgs.join("\n")
            ))
        })
    }
}

/// Loads [`StackConfig`] from the layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration for a workspace root.
    pub fn load(workspace_root: &Path) -> Result<StackConfig, StackError> {
        let builder = merge::merge_policy::builder_with_defaults()?;
        let builder = sources::global_file::add_to_builder(builder)?;
        let builder = sources::workspace_file::add_to_builder(builder, workspace_root)?;
        let builder = builder.add_source(
            Environment::with_prefix("CTXSTACK")
                .separator("__")
                .try_parsing(true),
        );

        let config: StackConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Load configuration from a single file on top of the defaults.
    pub fn load_from_file(path: &Path) -> Result<StackConfig, StackError> {
        let config: StackConfig = merge::merge_policy::builder_with_defaults()?
            .add_source(File::from(path))
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Path of the user-level config file, if a home can be determined.
    pub fn global_config_path() -> Option<PathBuf> {
        sources::global_file::global_config_path()
    }

    pub fn default() -> StackConfig {
        StackConfig::default()
    }
}
