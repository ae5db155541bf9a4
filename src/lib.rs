//! ctxstack: layered object contexts over an embedded store
//!
//! A tree of object contexts buffers entity changes in memory, commits them
//! level by level up to a sled-backed root, and broadcasts every commit so
//! the interactive context stays current without re-reading the store.

pub mod bus;
pub mod cli;
pub mod config;
pub mod context;
pub mod defaults;
pub mod entity;
pub mod error;
pub mod filter;
pub mod logging;
pub mod query;
pub mod save;
pub mod schema;
pub mod stack;
pub mod store;
pub mod types;

pub use bus::{ChangeBus, ChangeFilter, ChangeSet, Subscription, SubscriptionToken};
pub use context::{ContextSession, ObjectContext};
pub use entity::{Entity, Value};
pub use error::{ApiError, CommitError, QueryError, QueueError, StackError, StorageError};
pub use filter::{FetchRequest, Filter, SortDescriptor};
pub use save::{commit, commit_on_interactive, commit_on_new_worker, CommitOutcome};
pub use schema::{Schema, SchemaBundle};
pub use stack::ContextStack;
pub use types::{ContextId, ContextRole, ObjectId};
