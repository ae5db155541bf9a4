//! Object Store
//!
//! The storage engine behind a context stack. Engine-bound contexts apply
//! their pending changes here as one atomic [`WriteBatch`]; every read that
//! is not satisfied by a context's own buffer ends up here.

pub mod location;
pub mod memory;
pub mod persistence;

pub use location::{open_with_recovery, StoreLocation};
pub use memory::MemoryObjectStore;
pub use persistence::SledObjectStore;

use crate::entity::Entity;
use crate::error::StorageError;
use crate::types::ObjectId;
use std::path::Path;

/// Atomic unit of work applied by an engine-bound commit.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    /// Inserted and updated objects, written whole.
    pub upserts: Vec<Entity>,
    pub deletes: Vec<ObjectId>,
}

impl WriteBatch {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.upserts.len() + self.deletes.len()
    }
}

/// Storage engine interface
pub trait ObjectStore: Send + Sync {
    fn get(&self, id: &ObjectId) -> Result<Option<Entity>, StorageError>;

    /// All objects of one kind, in key order.
    fn scan(&self, kind: &str) -> Result<Vec<Entity>, StorageError>;

    /// Apply a batch atomically: either every record lands or none does.
    /// Engines that refuse a well-formed batch report
    /// [`StorageError::Rejected`].
    fn apply(&self, batch: &WriteBatch) -> Result<(), StorageError>;

    fn flush(&self) -> Result<(), StorageError> {
        Ok(())
    }

    /// Backing path, for engines that have one.
    fn path(&self) -> Option<&Path> {
        None
    }
}
