//! In-memory engine for ephemeral stacks.

use crate::entity::Entity;
use crate::error::StorageError;
use crate::schema::Schema;
use crate::store::{ObjectStore, WriteBatch};
use crate::types::ObjectId;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct MemoryObjectStore {
    schema: Arc<Schema>,
    objects: RwLock<BTreeMap<ObjectId, Entity>>,
}

impl MemoryObjectStore {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self {
            schema,
            objects: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

impl ObjectStore for MemoryObjectStore {
    fn get(&self, id: &ObjectId) -> Result<Option<Entity>, StorageError> {
        Ok(self.objects.read().get(id).cloned())
    }

    fn scan(&self, kind: &str) -> Result<Vec<Entity>, StorageError> {
        Ok(self
            .objects
            .read()
            .values()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect())
    }

    fn apply(&self, batch: &WriteBatch) -> Result<(), StorageError> {
        // Validate everything before touching the map so a rejected batch
        // leaves no partial writes.
        for entity in &batch.upserts {
            self.schema
                .validate_entity(entity)
                .map_err(|reason| StorageError::ValidationFailed {
                    kind: entity.kind.clone(),
                    id: entity.id,
                    reason,
                })?;
        }

        let mut objects = self.objects.write();
        for entity in &batch.upserts {
            objects.insert(entity.id, entity.clone());
        }
        for id in &batch.deletes {
            objects.remove(id);
        }
        Ok(())
    }
}
