//! Change notification bus
//!
//! Committed change-sets are published here and fanned out to every
//! subscriber whose filter matches. A stack owns exactly one bus; nothing is
//! persisted or replayed to late subscribers.

use crate::types::{ContextId, ObjectId};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::trace;

/// Ids touched by one successful commit level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    pub source: ContextId,
    /// Walk level that produced this set; 0 is the committing context.
    pub level: usize,
    pub inserted: BTreeSet<ObjectId>,
    pub updated: BTreeSet<ObjectId>,
    pub deleted: BTreeSet<ObjectId>,
    pub committed_at: DateTime<Utc>,
}

impl ChangeSet {
    pub fn new(
        source: ContextId,
        level: usize,
        inserted: BTreeSet<ObjectId>,
        updated: BTreeSet<ObjectId>,
        deleted: BTreeSet<ObjectId>,
    ) -> Self {
        Self {
            source,
            level,
            inserted,
            updated,
            deleted,
            committed_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inserted.len() + self.updated.len() + self.deleted.len()
    }
}

/// Which change-sets a subscriber receives.
#[derive(Clone)]
pub enum ChangeFilter {
    All,
    Source(ContextId),
    ExceptSource(ContextId),
    Custom(Arc<dyn Fn(&ChangeSet) -> bool + Send + Sync>),
}

impl ChangeFilter {
    pub fn matches(&self, change_set: &ChangeSet) -> bool {
        match self {
            ChangeFilter::All => true,
            ChangeFilter::Source(id) => change_set.source == *id,
            ChangeFilter::ExceptSource(id) => change_set.source != *id,
            ChangeFilter::Custom(predicate) => predicate(change_set),
        }
    }
}

impl fmt::Debug for ChangeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeFilter::All => f.write_str("All"),
            ChangeFilter::Source(id) => write!(f, "Source({})", id),
            ChangeFilter::ExceptSource(id) => write!(f, "ExceptSource({})", id),
            ChangeFilter::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

pub type ChangeHandler = Arc<dyn Fn(Arc<ChangeSet>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

impl SubscriptionToken {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

struct Subscriber {
    token: SubscriptionToken,
    filter: ChangeFilter,
    handler: ChangeHandler,
}

/// Fan-out router for committed change-sets.
pub struct ChangeBus {
    subscribers: RwLock<Vec<Subscriber>>,
    next_token: AtomicU64,
}

impl ChangeBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            subscribers: RwLock::new(Vec::new()),
            next_token: AtomicU64::new(1),
        })
    }

    /// Register a handler. Dropping the returned guard unsubscribes it.
    pub fn subscribe<F>(self: &Arc<Self>, filter: ChangeFilter, handler: F) -> Subscription
    where
        F: Fn(Arc<ChangeSet>) + Send + Sync + 'static,
    {
        let token = SubscriptionToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push(Subscriber {
            token,
            filter,
            handler: Arc::new(handler),
        });
        trace!(token = token.0, "Bus subscriber added");
        Subscription {
            token,
            bus: Arc::downgrade(self),
        }
    }

    /// Remove a subscriber. Returns false if it was already gone.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|s| s.token != token);
        subscribers.len() != before
    }

    /// Deliver to every matching subscriber. Handlers run on the calling
    /// thread after the subscriber lock is released, so a handler may
    /// subscribe or unsubscribe. Returns the number of deliveries.
    pub fn publish(&self, change_set: Arc<ChangeSet>) -> usize {
        let handlers: Vec<ChangeHandler> = self
            .subscribers
            .read()
            .iter()
            .filter(|s| s.filter.matches(&change_set))
            .map(|s| s.handler.clone())
            .collect();

        for handler in &handlers {
            handler(change_set.clone());
        }
        trace!(
            source = %change_set.source,
            delivered = handlers.len(),
            "Published change set"
        );
        handlers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

/// RAII subscription guard.
#[must_use = "dropping a Subscription unsubscribes it"]
pub struct Subscription {
    token: SubscriptionToken,
    bus: Weak<ChangeBus>,
}

impl Subscription {
    pub fn token(&self) -> SubscriptionToken {
        self.token
    }

    /// Keep the subscription for the bus lifetime.
    pub fn detach(self) -> SubscriptionToken {
        let token = self.token;
        std::mem::forget(self);
        token
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.token);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("token", &self.token)
            .finish()
    }
}
