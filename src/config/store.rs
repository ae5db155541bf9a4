//! Store section: which engine backs the stack and how sled is tuned.

use crate::error::StackError;
use crate::store::StoreLocation;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Storage engine backing a stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    #[default]
    Sled,
    /// Nothing touches disk; contents are lost with the stack.
    Memory,
}

/// Store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub engine: EngineKind,

    /// Store file name under `directory` (or the per-user data dir)
    #[serde(default = "default_file_name")]
    pub file_name: String,

    /// Directory holding the store; the per-user data dir when unset
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// sled page cache size in bytes
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,

    /// Background flush interval; `None` flushes only on commit of the root
    /// and on close.
    #[serde(default = "default_flush_every_ms")]
    pub flush_every_ms: Option<u64>,
}

fn default_file_name() -> String {
    "ctxstack.db".to_string()
}

fn default_cache_capacity() -> u64 {
    64 * 1024 * 1024 // 64 MB
}

fn default_flush_every_ms() -> Option<u64> {
    Some(500)
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            engine: EngineKind::default(),
            file_name: default_file_name(),
            directory: None,
            cache_capacity: default_cache_capacity(),
            flush_every_ms: default_flush_every_ms(),
        }
    }
}

impl StoreConfig {
    pub fn location(&self) -> StoreLocation {
        match &self.directory {
            Some(directory) => StoreLocation::Path(directory.join(&self.file_name)),
            None => StoreLocation::data_dir(self.file_name.clone()),
        }
    }

    pub fn resolve_path(&self) -> Result<PathBuf, StackError> {
        self.location().resolve()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.file_name.is_empty() {
            return Err("Store file name cannot be empty".to_string());
        }
        if self.file_name.contains(std::path::MAIN_SEPARATOR) || self.file_name.contains('/') {
            return Err(format!(
                "Store file name '{}' must not contain a path separator; use store.directory",
                self.file_name
            ));
        }
        if self.cache_capacity == 0 {
            return Err("Cache capacity must be greater than zero".to_string());
        }
        Ok(())
    }
}
