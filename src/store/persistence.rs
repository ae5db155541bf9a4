//! Persistence layer for the Object Store

use crate::config::StoreConfig;
use crate::entity::Entity;
use crate::error::StorageError;
use crate::schema::Schema;
use crate::store::{ObjectStore, WriteBatch};
use crate::types::ObjectId;
use bincode;
use sled;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

const SCHEMA_KEY: &[u8] = b"schema";
const OBJECTS_TREE: &str = "objects";

/// Sled-based implementation of ObjectStore
///
/// Objects live in a dedicated `objects` tree keyed by the 16 raw bytes of
/// their [`ObjectId`]. The default tree carries the schema stamp.
pub struct SledObjectStore {
    db: sled::Db,
    objects: sled::Tree,
    schema: Arc<Schema>,
    path: PathBuf,
}

impl SledObjectStore {
    /// Open (or create) a store at the given path with default tuning.
    pub fn open<P: AsRef<Path>>(path: P, schema: Arc<Schema>) -> Result<Self, StorageError> {
        Self::open_with(path, schema, &StoreConfig::default())
    }

    /// Open (or create) a store at the given path.
    ///
    /// Fails with [`StorageError::SchemaMismatch`] if the store was created
    /// under a different schema name or version.
    pub fn open_with<P: AsRef<Path>>(
        path: P,
        schema: Arc<Schema>,
        config: &StoreConfig,
    ) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = sled::Config::new()
            .path(&path)
            .cache_capacity(config.cache_capacity)
            .flush_every_ms(config.flush_every_ms)
            .open()?;

        let stamp = schema.stamp();
        match db.get(SCHEMA_KEY)? {
            Some(existing) => {
                let found = String::from_utf8_lossy(&existing).into_owned();
                if found != stamp {
                    return Err(StorageError::SchemaMismatch {
                        expected: stamp,
                        found,
                    });
                }
            }
            None => {
                db.insert(SCHEMA_KEY, stamp.as_bytes())?;
            }
        }

        let objects = db.open_tree(OBJECTS_TREE)?;
        debug!(path = %path.display(), schema = %stamp, "Opened sled object store");

        Ok(Self {
            db,
            objects,
            schema,
            path,
        })
    }

    /// Get the underlying sled database (for advanced operations)
    pub fn db(&self) -> &sled::Db {
        &self.db
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Number of stored objects across all kinds
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Check if an object exists in the store
    pub fn contains(&self, id: &ObjectId) -> Result<bool, StorageError> {
        Ok(self.objects.contains_key(id.as_bytes())?)
    }

    fn decode(key: &[u8], value: &[u8]) -> Result<Entity, StorageError> {
        if key.len() != 16 {
            return Err(StorageError::CorruptRecord(format!("{:?}", key)));
        }
        Ok(bincode::deserialize(value)?)
    }
}

impl ObjectStore for SledObjectStore {
    fn get(&self, id: &ObjectId) -> Result<Option<Entity>, StorageError> {
        match self.objects.get(id.as_bytes())? {
            Some(value) => Ok(Some(Self::decode(id.as_bytes(), &value)?)),
            None => Ok(None),
        }
    }

    fn scan(&self, kind: &str) -> Result<Vec<Entity>, StorageError> {
        let mut entities = Vec::new();
        for item in self.objects.iter() {
            let (key, value) = item?;
            let entity = Self::decode(&key, &value)?;
            if entity.kind == kind {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    fn apply(&self, batch: &WriteBatch) -> Result<(), StorageError> {
        let mut sled_batch = sled::Batch::default();

        for entity in &batch.upserts {
            self.schema
                .validate_entity(entity)
                .map_err(|reason| StorageError::ValidationFailed {
                    kind: entity.kind.clone(),
                    id: entity.id,
                    reason,
                })?;
            let value = bincode::serialize(entity)?;
            sled_batch.insert(&entity.id.as_bytes()[..], value);
        }
        for id in &batch.deletes {
            sled_batch.remove(&id.as_bytes()[..]);
        }

        self.objects.apply_batch(sled_batch)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}
