//! Store location resolution and self-healing open.

use crate::config::StoreConfig;
use crate::error::{StackError, StorageError};
use crate::schema::Schema;
use crate::store::SledObjectStore;
use directories::ProjectDirs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Where a store lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    /// Explicit path.
    Path(PathBuf),
    /// `<per-user data dir>/ctxstack/<file_name>`.
    DataDir { file_name: String },
}

impl StoreLocation {
    pub fn data_dir(file_name: impl Into<String>) -> Self {
        StoreLocation::DataDir {
            file_name: file_name.into(),
        }
    }

    pub fn resolve(&self) -> Result<PathBuf, StackError> {
        match self {
            StoreLocation::Path(path) => Ok(path.clone()),
            StoreLocation::DataDir { file_name } => {
                if file_name.is_empty() {
                    return Err(StackError::StoreLocationUnavailable(
                        "store file name cannot be empty".to_string(),
                    ));
                }
                Ok(data_dir()?.join(file_name))
            }
        }
    }
}

/// Per-user data directory for ctxstack stores.
pub fn data_dir() -> Result<PathBuf, StackError> {
    ProjectDirs::from("", "", "ctxstack")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or_else(|| {
            StackError::StoreLocationUnavailable("no home directory for data dir".to_string())
        })
}

/// Open a sled store, deleting whatever is at `path` and retrying exactly
/// once if the first open fails. A second failure is `StoreOpenFailed`.
///
/// A store that is locked by another open handle is busy, not broken: that
/// failure is `StoreOpenFailed` straight away and nothing is deleted.
pub fn open_with_recovery(
    path: &Path,
    schema: Arc<Schema>,
    config: &StoreConfig,
) -> Result<SledObjectStore, StackError> {
    match SledObjectStore::open_with(path, schema.clone(), config) {
        Ok(store) => Ok(store),
        Err(first) if is_lock_contention(&first) => {
            warn!(path = %path.display(), error = %first, "Store is locked by another handle");
            Err(StackError::StoreOpenFailed {
                path: path.to_path_buf(),
                source: first,
            })
        }
        Err(first) => {
            warn!(
                path = %path.display(),
                error = %first,
                "Cannot open store; removing it and retrying once"
            );
            remove_store(path);
            let store = SledObjectStore::open_with(path, schema, config).map_err(|source| {
                StackError::StoreOpenFailed {
                    path: path.to_path_buf(),
                    source,
                }
            })?;
            info!(path = %path.display(), "Recreated store after failed open");
            Ok(store)
        }
    }
}

/// Whether an open failed because another handle holds the store's lock.
fn is_lock_contention(error: &StorageError) -> bool {
    let io = match error {
        StorageError::Engine(sled::Error::Io(io)) => io,
        StorageError::IoError(io) => io,
        _ => return false,
    };
    io.kind() == ErrorKind::WouldBlock || io.to_string().contains("lock")
}

/// Best-effort removal of a file or directory store. Failures are logged.
fn remove_store(path: &Path) {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    if let Err(e) = result {
        let e = StorageError::IoError(e);
        warn!(path = %path.display(), error = %e, "Cannot remove store");
    }
}
