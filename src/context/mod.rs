//! Object contexts
//!
//! An [`ObjectContext`] buffers entity changes and is bound either to a
//! parent context (by id, resolved through the [`ContextRegistry`]) or
//! directly to a storage engine. All work on a context runs on its own
//! queue thread; callers hand it closures that receive a [`ContextSession`].

mod queue;
pub mod registry;
pub mod session;
pub mod state;

pub use registry::ContextRegistry;
pub use session::ContextSession;
pub use state::{ContextState, PendingChanges, PendingLookup};

use crate::bus::{ChangeBus, Subscription};
use crate::error::QueueError;
use crate::schema::Schema;
use crate::store::ObjectStore;
use crate::types::{ContextId, ContextRole};
use queue::ContextQueue;
use std::fmt;
use std::sync::mpsc;
use std::sync::{Arc, Weak};
use tracing::trace;

struct ContextInner {
    id: ContextId,
    role: ContextRole,
    parent: Option<ContextId>,
    engine: Option<Arc<dyn ObjectStore>>,
    registry: Arc<ContextRegistry>,
    bus: Option<Arc<ChangeBus>>,
    queue: ContextQueue,
    /// Owned subscription (workers); dropped with the context.
    _subscription: Option<Subscription>,
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
        self.queue.close();
        trace!(context = %self.id, role = %self.role, "Context released");
    }
}

/// Shared handle to one object context.
#[derive(Clone)]
pub struct ObjectContext {
    inner: Arc<ContextInner>,
}

/// Non-owning handle; see [`ObjectContext::downgrade`].
#[derive(Clone)]
pub struct WeakContext {
    inner: Weak<ContextInner>,
}

impl WeakContext {
    pub fn upgrade(&self) -> Option<ObjectContext> {
        self.inner.upgrade().map(|inner| ObjectContext { inner })
    }
}

impl ObjectContext {
    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    pub fn role(&self) -> ContextRole {
        self.inner.role
    }

    pub fn parent_id(&self) -> Option<ContextId> {
        self.inner.parent
    }

    /// The parent context, if it is bound to one and it is still alive.
    pub fn parent(&self) -> Option<ObjectContext> {
        self.inner
            .parent
            .and_then(|id| self.inner.registry.resolve(id))
    }

    pub fn engine(&self) -> Option<&Arc<dyn ObjectStore>> {
        self.inner.engine.as_ref()
    }

    pub fn has_engine(&self) -> bool {
        self.inner.engine.is_some()
    }

    pub fn schema(&self) -> &Arc<Schema> {
        self.inner.registry.schema()
    }

    pub fn registry(&self) -> &Arc<ContextRegistry> {
        &self.inner.registry
    }

    pub fn bus(&self) -> Option<&Arc<ChangeBus>> {
        self.inner.bus.as_ref()
    }

    pub fn downgrade(&self) -> WeakContext {
        WeakContext {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// True when called from this context's own queue thread.
    pub fn is_current(&self) -> bool {
        self.inner.queue.is_current()
    }

    /// Run `f` on this context's queue and block until it returns.
    ///
    /// Calling this from the context's own queue would wait on itself, so it
    /// is rejected with [`QueueError::Reentrant`].
    pub fn perform_and_wait<F, R>(&self, f: F) -> Result<R, QueueError>
    where
        F: FnOnce(&mut ContextSession<'_>) -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_current() {
            return Err(QueueError::Reentrant(self.id()));
        }

        let (reply, result) = mpsc::sync_channel(1);
        let context = self.clone();
        self.inner.queue.submit(Box::new(move |state| {
            let value = {
                let mut session = ContextSession::new(&context, state);
                f(&mut session)
            };
            // Release our handle before the caller wakes.
            drop(context);
            let _ = reply.send(value);
        }))?;

        // Submitted jobs always run, so a lost reply means `f` panicked.
        result.recv().map_err(|_| QueueError::JobPanicked(self.id()))
    }

    /// Queue `f` on this context and return immediately.
    pub fn perform<F>(&self, f: F) -> Result<(), QueueError>
    where
        F: FnOnce(&mut ContextSession<'_>) + Send + 'static,
    {
        let context = self.clone();
        self.inner.queue.submit(Box::new(move |state| {
            let mut session = ContextSession::new(&context, state);
            f(&mut session);
        }))
    }

    pub fn has_changes(&self) -> Result<bool, QueueError> {
        self.perform_and_wait(|session| session.has_changes())
    }
}

impl PartialEq for ObjectContext {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ObjectContext {}

impl fmt::Debug for ObjectContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectContext")
            .field("id", &self.inner.id)
            .field("role", &self.inner.role)
            .field("parent", &self.inner.parent)
            .field("engine", &self.inner.engine.is_some())
            .finish()
    }
}

/// Builds and registers a context.
///
/// The id is allocated up front so a subscription filter can name the
/// context before it exists.
pub struct ContextBuilder {
    id: ContextId,
    role: ContextRole,
    registry: Arc<ContextRegistry>,
    parent: Option<ContextId>,
    engine: Option<Arc<dyn ObjectStore>>,
    bus: Option<Arc<ChangeBus>>,
    subscription: Option<Subscription>,
}

impl ContextBuilder {
    pub fn new(registry: &Arc<ContextRegistry>, role: ContextRole) -> Self {
        Self {
            id: ContextId::next(),
            role,
            registry: registry.clone(),
            parent: None,
            engine: None,
            bus: None,
            subscription: None,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn parent(mut self, parent: &ObjectContext) -> Self {
        self.parent = Some(parent.id());
        self
    }

    pub fn engine(mut self, engine: Arc<dyn ObjectStore>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn bus(mut self, bus: Arc<ChangeBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Tie a bus subscription to the context's lifetime.
    pub fn subscription(mut self, subscription: Subscription) -> Self {
        self.subscription = Some(subscription);
        self
    }

    pub fn build(self) -> Result<ObjectContext, QueueError> {
        let queue = ContextQueue::spawn(self.id, self.role)?;
        let context = ObjectContext {
            inner: Arc::new(ContextInner {
                id: self.id,
                role: self.role,
                parent: self.parent,
                engine: self.engine,
                registry: self.registry,
                bus: self.bus,
                queue,
                _subscription: self.subscription,
            }),
        };
        context.inner.registry.register(&context);
        trace!(
            context = %context.id(),
            role = %context.role(),
            parent = ?context.parent_id(),
            "Context created"
        );
        Ok(context)
    }
}
