//! Context registry: resolves parent ids to live contexts without owning them.

use crate::context::{ObjectContext, WeakContext};
use crate::schema::Schema;
use crate::types::ContextId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

pub struct ContextRegistry {
    schema: Arc<Schema>,
    contexts: RwLock<HashMap<ContextId, WeakContext>>,
}

impl ContextRegistry {
    pub fn new(schema: Arc<Schema>) -> Arc<Self> {
        Arc::new(Self {
            schema,
            contexts: RwLock::new(HashMap::new()),
        })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub(crate) fn register(&self, context: &ObjectContext) {
        self.contexts
            .write()
            .insert(context.id(), context.downgrade());
    }

    pub(crate) fn unregister(&self, id: ContextId) {
        self.contexts.write().remove(&id);
    }

    /// Live context for an id, if it is still held somewhere.
    pub fn resolve(&self, id: ContextId) -> Option<ObjectContext> {
        let weak = self.contexts.read().get(&id).cloned()?;
        weak.upgrade()
    }

    pub fn contains(&self, id: ContextId) -> bool {
        self.contexts.read().contains_key(&id)
    }

    /// Number of registered contexts.
    pub fn len(&self) -> usize {
        self.contexts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.read().is_empty()
    }
}
