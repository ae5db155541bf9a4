//! Query facade
//!
//! Typed insert, update, fetch and delete against one context. Inside a job
//! the operations are methods on [`ContextSession`]; from any other thread
//! the blocking wrappers on [`ObjectContext`] submit the same operation to
//! the context's queue and wait for it.
//!
//! A fetch sees the engine's rows overlaid with every ancestor's pending
//! changes and then this context's own.

use crate::context::{ContextSession, ObjectContext};
use crate::entity::{Entity, Value};
use crate::error::QueryError;
use crate::filter::{CompareOp, FetchRequest, Filter};
use crate::types::ObjectId;
use tokio::sync::oneshot;
use tracing::{debug, warn};

impl ContextSession<'_> {
    /// Insert a blank object of `kind`.
    pub fn insert(&mut self, kind: &str) -> Result<Entity, QueryError> {
        self.insert_with(kind, Vec::<(String, Value)>::new())
    }

    /// Insert an object with initial attribute values.
    pub fn insert_with<I, K, V>(&mut self, kind: &str, attributes: I) -> Result<Entity, QueryError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.schema().entity(kind)?;
        let mut entity = Entity::new(kind);
        for (attribute, value) in attributes {
            let attribute = attribute.into();
            let value = value.into();
            self.schema().check_value(kind, &attribute, &value)?;
            entity.attributes.insert(attribute, value);
        }
        self.state_mut().pending.record_insert(entity.clone());
        Ok(entity)
    }

    /// Set one attribute on a visible object.
    pub fn set(
        &mut self,
        id: ObjectId,
        attribute: &str,
        value: impl Into<Value>,
    ) -> Result<Entity, QueryError> {
        let mut entity = self
            .visible_object(id)?
            .ok_or(QueryError::ObjectNotFound(id))?;
        let value = value.into();
        self.schema().check_value(&entity.kind, attribute, &value)?;
        entity.attributes.insert(attribute.to_string(), value);
        self.state_mut().pending.record_update(entity.clone());
        Ok(entity)
    }

    /// Mark one object for deletion. Returns false if it is not visible
    /// from this context.
    pub fn delete(&mut self, id: ObjectId) -> Result<bool, QueryError> {
        match self.visible_object(id)? {
            Some(entity) => {
                self.state_mut().pending.record_delete(id, entity.kind);
                self.state_mut().registered.remove(&id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Fetch one object by identity.
    pub fn object(&mut self, id: ObjectId) -> Result<Option<Entity>, QueryError> {
        self.visible_object(id)
    }

    pub fn fetch_many(&mut self, request: &FetchRequest) -> Result<Vec<Entity>, QueryError> {
        request.validate(self.schema())?;
        let rows = self.visible_rows(&request.kind).map_err(|e| {
            warn!(context = %self.id(), kind = %request.kind, error = %e, "Fetch failed");
            e
        })?;
        let rows = request.apply(rows);
        self.register_rows(&rows);
        Ok(rows)
    }

    pub fn fetch_one(
        &mut self,
        kind: &str,
        filter: Option<Filter>,
    ) -> Result<Option<Entity>, QueryError> {
        let mut request = FetchRequest::new(kind).limit(1);
        request.filter = filter;
        Ok(self.fetch_many(&request)?.into_iter().next())
    }

    /// First object matching `filter`, or a new one seeded with the filter's
    /// equality clauses. Two contexts racing on the same filter can both
    /// insert.
    pub fn fetch_or_insert(&mut self, kind: &str, filter: Filter) -> Result<Entity, QueryError> {
        if let Some(existing) = self.fetch_one(kind, Some(filter.clone()))? {
            return Ok(existing);
        }
        let seed: Vec<(String, Value)> = filter
            .clauses()
            .iter()
            .filter(|clause| clause.op == CompareOp::Eq)
            .map(|clause| (clause.attribute.clone(), clause.value.clone()))
            .collect();
        self.insert_with(kind, seed)
    }

    /// Delete every object of `kind` matching `filter` (all of them when
    /// `None`). Returns how many were marked.
    pub fn delete_matching(
        &mut self,
        kind: &str,
        filter: Option<Filter>,
    ) -> Result<usize, QueryError> {
        let mut request = FetchRequest::new(kind);
        request.filter = filter;
        let rows = self.fetch_many(&request)?;
        for entity in &rows {
            self.state_mut().pending.record_delete(entity.id, entity.kind.clone());
            self.state_mut().registered.remove(&entity.id);
        }
        debug!(context = %self.id(), kind, deleted = rows.len(), "Marked objects for deletion");
        Ok(rows.len())
    }

    pub fn count(&mut self, kind: &str, filter: Option<Filter>) -> Result<usize, QueryError> {
        let mut request = FetchRequest::new(kind);
        request.filter = filter;
        request.validate(self.schema())?;
        Ok(request.apply(self.visible_rows(kind)?).len())
    }
}

/// Blocking wrappers: each runs on the context's queue and waits.
impl ObjectContext {
    pub fn insert(&self, kind: &str) -> Result<Entity, QueryError> {
        let kind = kind.to_string();
        self.perform_and_wait(move |session| session.insert(&kind))?
    }

    pub fn insert_with<I, K, V>(&self, kind: &str, attributes: I) -> Result<Entity, QueryError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let kind = kind.to_string();
        let attributes: Vec<(String, Value)> = attributes
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.perform_and_wait(move |session| session.insert_with(&kind, attributes))?
    }

    pub fn set(
        &self,
        id: ObjectId,
        attribute: &str,
        value: impl Into<Value>,
    ) -> Result<Entity, QueryError> {
        let attribute = attribute.to_string();
        let value = value.into();
        self.perform_and_wait(move |session| session.set(id, &attribute, value))?
    }

    pub fn delete(&self, id: ObjectId) -> Result<bool, QueryError> {
        self.perform_and_wait(move |session| session.delete(id))?
    }

    pub fn object(&self, id: ObjectId) -> Result<Option<Entity>, QueryError> {
        self.perform_and_wait(move |session| session.object(id))?
    }

    pub fn fetch_many(&self, request: FetchRequest) -> Result<Vec<Entity>, QueryError> {
        self.perform_and_wait(move |session| session.fetch_many(&request))?
    }

    pub fn fetch_one(&self, kind: &str, filter: Option<Filter>) -> Result<Option<Entity>, QueryError> {
        let kind = kind.to_string();
        self.perform_and_wait(move |session| session.fetch_one(&kind, filter))?
    }

    pub fn fetch_or_insert(&self, kind: &str, filter: Filter) -> Result<Entity, QueryError> {
        let kind = kind.to_string();
        self.perform_and_wait(move |session| session.fetch_or_insert(&kind, filter))?
    }

    pub fn delete_matching(&self, kind: &str, filter: Option<Filter>) -> Result<usize, QueryError> {
        let kind = kind.to_string();
        self.perform_and_wait(move |session| session.delete_matching(&kind, filter))?
    }

    pub fn count(&self, kind: &str, filter: Option<Filter>) -> Result<usize, QueryError> {
        let kind = kind.to_string();
        self.perform_and_wait(move |session| session.count(&kind, filter))?
    }

    /// Run a fetch on the context queue and hand the result to `on_complete`.
    ///
    /// The request is checked against the schema first; an unknown kind or
    /// attribute returns false and `on_complete` never runs. Otherwise it
    /// runs exactly once.
    pub fn fetch_async<F>(&self, request: FetchRequest, on_complete: F) -> bool
    where
        F: FnOnce(Result<Vec<Entity>, QueryError>) + Send + 'static,
    {
        if let Err(e) = request.validate(self.schema()) {
            debug!(context = %self.id(), error = %e, "Rejected async fetch");
            return false;
        }
        match self.perform(move |session| on_complete(session.fetch_many(&request))) {
            Ok(()) => true,
            Err(e) => {
                warn!(context = %self.id(), error = %e, "Cannot queue async fetch");
                false
            }
        }
    }

    /// Like [`fetch_async`](Self::fetch_async), delivering through a
    /// oneshot channel that can be awaited.
    pub fn fetch_future(
        &self,
        request: FetchRequest,
    ) -> Result<oneshot::Receiver<Result<Vec<Entity>, QueryError>>, QueryError> {
        request.validate(self.schema())?;
        let (tx, rx) = oneshot::channel();
        self.perform(move |session| {
            let _ = tx.send(session.fetch_many(&request));
        })?;
        Ok(rx)
    }
}
