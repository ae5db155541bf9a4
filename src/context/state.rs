//! Queue-owned context state: the pending change buffer and the cache of
//! committed objects this context has read.

use crate::bus::ChangeSet;
use crate::entity::Entity;
use crate::store::WriteBatch;
use crate::types::{ContextId, ObjectId};
use std::collections::{BTreeMap, HashMap};

/// What a context's own buffer says about one object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PendingLookup<'a> {
    Present(&'a Entity),
    Deleted,
    Untouched,
}

/// Uncommitted inserts, updates and deletes of one context.
///
/// An id is in at most one of the three maps. Updating a pending insert
/// rewrites the insert; deleting a pending insert drops it entirely.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingChanges {
    inserted: BTreeMap<ObjectId, Entity>,
    updated: BTreeMap<ObjectId, Entity>,
    /// id -> kind
    deleted: BTreeMap<ObjectId, String>,
}

impl PendingChanges {
    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inserted.len() + self.updated.len() + self.deleted.len()
    }

    pub fn inserted(&self) -> impl Iterator<Item = &Entity> {
        self.inserted.values()
    }

    pub fn updated(&self) -> impl Iterator<Item = &Entity> {
        self.updated.values()
    }

    pub fn deleted(&self) -> impl Iterator<Item = &ObjectId> {
        self.deleted.keys()
    }

    pub fn record_insert(&mut self, entity: Entity) {
        self.deleted.remove(&entity.id);
        self.updated.remove(&entity.id);
        self.inserted.insert(entity.id, entity);
    }

    /// Record a new full value for an object. A pending delete wins.
    pub fn record_update(&mut self, entity: Entity) {
        if self.deleted.contains_key(&entity.id) {
            return;
        }
        match self.inserted.get_mut(&entity.id) {
            Some(insert) => *insert = entity,
            None => {
                self.updated.insert(entity.id, entity);
            }
        }
    }

    pub fn record_delete(&mut self, id: ObjectId, kind: impl Into<String>) {
        if self.inserted.remove(&id).is_some() {
            return;
        }
        self.updated.remove(&id);
        self.deleted.insert(id, kind.into());
    }

    /// Drop a pending update, leaving inserts and deletes alone.
    pub fn discard_update(&mut self, id: &ObjectId) -> bool {
        self.updated.remove(id).is_some()
    }

    /// Fold a child's pushed changes into this buffer.
    pub fn absorb(&mut self, child: PendingChanges) {
        for (_, entity) in child.inserted {
            self.record_insert(entity);
        }
        for (_, entity) in child.updated {
            self.record_update(entity);
        }
        for (id, kind) in child.deleted {
            self.record_delete(id, kind);
        }
    }

    pub fn lookup(&self, id: &ObjectId) -> PendingLookup<'_> {
        if let Some(entity) = self.inserted.get(id).or_else(|| self.updated.get(id)) {
            PendingLookup::Present(entity)
        } else if self.deleted.contains_key(id) {
            PendingLookup::Deleted
        } else {
            PendingLookup::Untouched
        }
    }

    /// Lay this buffer over rows read from below: deleted rows vanish,
    /// updated rows are replaced, inserted rows of `kind` are added. Output
    /// is in id order.
    pub fn overlay(&self, rows: Vec<Entity>, kind: &str) -> Vec<Entity> {
        let mut by_id: BTreeMap<ObjectId, Entity> =
            rows.into_iter().map(|entity| (entity.id, entity)).collect();

        for id in self.deleted.keys() {
            by_id.remove(id);
        }
        for entity in self.updated.values().filter(|e| e.kind == kind) {
            by_id.insert(entity.id, entity.clone());
        }
        for entity in self.inserted.values().filter(|e| e.kind == kind) {
            by_id.insert(entity.id, entity.clone());
        }

        by_id.into_values().collect()
    }

    pub fn to_write_batch(&self) -> WriteBatch {
        WriteBatch {
            upserts: self
                .inserted
                .values()
                .chain(self.updated.values())
                .cloned()
                .collect(),
            deletes: self.deleted.keys().copied().collect(),
        }
    }

    pub fn change_set(&self, source: ContextId, level: usize) -> ChangeSet {
        ChangeSet::new(
            source,
            level,
            self.inserted.keys().copied().collect(),
            self.updated.keys().copied().collect(),
            self.deleted.keys().copied().collect(),
        )
    }
}

/// Everything a context's queue thread owns.
#[derive(Debug, Default)]
pub struct ContextState {
    pub(crate) pending: PendingChanges,
    /// Committed objects this context has read, by id.
    pub(crate) registered: HashMap<ObjectId, Entity>,
    pub(crate) merges: u64,
}
