//! Access to a context's state from inside one of its queue jobs.

use crate::bus::ChangeSet;
use crate::context::state::{ContextState, PendingChanges, PendingLookup};
use crate::context::ObjectContext;
use crate::entity::Entity;
use crate::error::{CommitError, QueryError};
use crate::schema::Schema;
use crate::types::{ContextId, ObjectId};
use std::sync::Arc;
use tracing::{debug, warn};

/// A context together with its queue-owned state.
///
/// Only ever constructed on the context's own queue thread, so holding one
/// means nothing else is touching the state.
pub struct ContextSession<'a> {
    context: &'a ObjectContext,
    state: &'a mut ContextState,
}

impl<'a> ContextSession<'a> {
    pub(crate) fn new(context: &'a ObjectContext, state: &'a mut ContextState) -> Self {
        Self { context, state }
    }

    pub fn context(&self) -> &ObjectContext {
        self.context
    }

    pub fn id(&self) -> ContextId {
        self.context.id()
    }

    pub fn schema(&self) -> &Arc<Schema> {
        self.context.schema()
    }

    pub fn has_changes(&self) -> bool {
        !self.state.pending.is_empty()
    }

    pub fn pending(&self) -> &PendingChanges {
        &self.state.pending
    }

    /// Number of change-sets merged into this context so far.
    pub fn merge_count(&self) -> u64 {
        self.state.merges
    }

    /// Whether a committed object is in this context's read cache.
    pub fn is_registered(&self, id: &ObjectId) -> bool {
        self.state.registered.contains_key(id)
    }

    pub(crate) fn state_mut(&mut self) -> &mut ContextState {
        self.state
    }

    /// Take changes pushed up from a child.
    pub fn absorb(&mut self, changes: PendingChanges) {
        self.state.pending.absorb(changes);
    }

    /// Commit this context's pending changes one level: into the engine if
    /// bound to one, otherwise into the parent's buffer. Publishes the
    /// resulting change-set on success.
    pub(crate) fn save_level(
        &mut self,
        level: usize,
    ) -> Result<Option<Arc<ChangeSet>>, CommitError> {
        let context = self.context;
        if context.parent_id().is_none() && !context.has_engine() {
            return Err(CommitError::RootHasNoEngineBinding {
                context: context.id(),
                level,
            });
        }
        if self.state.pending.is_empty() {
            return Ok(None);
        }

        if let Some(engine) = context.engine() {
            engine
                .apply(&self.state.pending.to_write_batch())
                .map_err(|source| CommitError::EngineCommitFailed {
                    level,
                    context: context.id(),
                    source,
                })?;
        } else if let Some(parent_id) = context.parent_id() {
            let parent = context.parent().ok_or(CommitError::ParentUnavailable {
                context: context.id(),
                parent: parent_id,
            })?;
            let pushed = self.state.pending.clone();
            parent.perform_and_wait(move |session| session.absorb(pushed))?;
        }

        let committed = std::mem::take(&mut self.state.pending);
        for entity in committed.inserted().chain(committed.updated()) {
            self.state.registered.insert(entity.id, entity.clone());
        }
        for id in committed.deleted() {
            self.state.registered.remove(id);
        }

        let change_set = Arc::new(committed.change_set(context.id(), level));
        debug!(
            context = %context.id(),
            role = %context.role(),
            level,
            inserted = change_set.inserted.len(),
            updated = change_set.updated.len(),
            deleted = change_set.deleted.len(),
            "Committed context level"
        );
        if let Some(bus) = context.bus() {
            bus.publish(change_set.clone());
        }
        Ok(Some(change_set))
    }

    /// Bring this context up to date with a change-set committed elsewhere.
    ///
    /// Deleted objects are evicted. Updated and inserted ones are re-read
    /// through the parent chain only if already cached; the rest fault in
    /// on first read. Merging the same set twice is harmless.
    pub fn merge(&mut self, change_set: &ChangeSet) {
        for id in &change_set.deleted {
            self.state.registered.remove(id);
            self.state.pending.discard_update(id);
        }

        let cached = change_set
            .updated
            .iter()
            .chain(change_set.inserted.iter())
            .filter(|id| self.state.registered.contains_key(*id))
            .copied()
            .collect::<Vec<_>>();
        for id in &cached {
            match self.base_object(*id) {
                Ok(Some(entity)) => {
                    self.state.registered.insert(*id, entity);
                }
                Ok(None) => {
                    self.state.registered.remove(id);
                }
                Err(e) => {
                    warn!(context = %self.id(), object = %id, error = %e, "Cannot refresh merged object");
                }
            }
        }

        self.state.merges += 1;
        debug!(
            context = %self.id(),
            source = %change_set.source,
            changes = change_set.len(),
            "Merged change set"
        );
    }

    /// Rows of `kind` as seen from below this context: the engine, or the
    /// parent's visible view.
    pub fn base_rows(&self, kind: &str) -> Result<Vec<Entity>, QueryError> {
        if let Some(engine) = self.context.engine() {
            return engine.scan(kind).map_err(QueryError::EngineQueryFailed);
        }
        let parent = self.parent_for_read()?;
        let kind = kind.to_string();
        parent.perform_and_wait(move |session| session.visible_rows(&kind))?
    }

    /// Rows of `kind` as seen by this context, including its own pending changes.
    pub fn visible_rows(&self, kind: &str) -> Result<Vec<Entity>, QueryError> {
        let rows = self.base_rows(kind)?;
        Ok(self.state.pending.overlay(rows, kind))
    }

    /// One object as seen from below this context. Ancestors' read caches
    /// are not consulted.
    pub fn base_object(&self, id: ObjectId) -> Result<Option<Entity>, QueryError> {
        if let Some(engine) = self.context.engine() {
            return engine.get(&id).map_err(QueryError::EngineQueryFailed);
        }
        let parent = self.parent_for_read()?;
        parent.perform_and_wait(move |session| session.current_object(id))?
    }

    /// One object as seen by this context, bypassing its read cache.
    pub fn current_object(&self, id: ObjectId) -> Result<Option<Entity>, QueryError> {
        match self.state.pending.lookup(&id) {
            PendingLookup::Present(entity) => Ok(Some(entity.clone())),
            PendingLookup::Deleted => Ok(None),
            PendingLookup::Untouched => self.base_object(id),
        }
    }

    /// One object as seen by this context: its own buffer first, then the
    /// read cache, then the chain below. Objects read from below are cached.
    pub fn visible_object(&mut self, id: ObjectId) -> Result<Option<Entity>, QueryError> {
        match self.state.pending.lookup(&id) {
            PendingLookup::Present(entity) => return Ok(Some(entity.clone())),
            PendingLookup::Deleted => return Ok(None),
            PendingLookup::Untouched => {}
        }
        if let Some(entity) = self.state.registered.get(&id) {
            return Ok(Some(entity.clone()));
        }
        let found = self.base_object(id)?;
        if let Some(entity) = &found {
            self.state.registered.insert(id, entity.clone());
        }
        Ok(found)
    }

    /// Remember committed rows that a fetch returned.
    pub(crate) fn register_rows(&mut self, rows: &[Entity]) {
        for entity in rows {
            if let PendingLookup::Untouched = self.state.pending.lookup(&entity.id) {
                self.state.registered.insert(entity.id, entity.clone());
            }
        }
    }

    fn parent_for_read(&self) -> Result<ObjectContext, QueryError> {
        self.context
            .parent()
            .ok_or(QueryError::NoEngineBinding(self.context.id()))
    }
}
