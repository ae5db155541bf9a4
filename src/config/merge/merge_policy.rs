//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("schema.name", "Model")?
        .set_default("schema.bundle_dir", "schemas")?
        .set_default("store.engine", "sled")?
        .set_default("store.file_name", "ctxstack.db")?
        .set_default("logging.level", "info")
}
