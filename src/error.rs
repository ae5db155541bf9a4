//! Error types for the ctxstack object-context layer.

use crate::schema::AttributeType;
use crate::types::{ContextId, ObjectId};
use std::path::PathBuf;
use thiserror::Error;

/// Storage engine errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Engine error: {0}")]
    Engine(#[from] sled::Error),

    #[error("Record codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("Storage I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Store was created for schema {found}, expected {expected}")]
    SchemaMismatch { expected: String, found: String },

    #[error("Validation failed for {kind} {id}: {reason}")]
    ValidationFailed {
        kind: String,
        id: ObjectId,
        reason: String,
    },

    #[error("Corrupt record under key {0}")]
    CorruptRecord(String),

    /// For engines outside this crate that refuse a batch for reasons of
    /// their own (quota, read-only mode, remote refusal).
    #[error("Engine rejected the write: {0}")]
    Rejected(String),
}

/// Per-context queue errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("Queue for context {0} is closed")]
    Closed(ContextId),

    #[error("Blocking submit to context {0} from its own queue")]
    Reentrant(ContextId),

    #[error("Job on context {0} panicked before replying")]
    JobPanicked(ContextId),

    #[error("Failed to spawn queue for context {context}: {reason}")]
    Spawn { context: ContextId, reason: String },
}

/// Errors raised by the save walk
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("Context {context} at level {level} has neither a parent nor an engine binding")]
    RootHasNoEngineBinding { context: ContextId, level: usize },

    #[error("Engine rejected commit of context {context} at level {level}: {source}")]
    EngineCommitFailed {
        level: usize,
        context: ContextId,
        #[source]
        source: StorageError,
    },

    #[error("Parent {parent} of context {context} is no longer registered")]
    ParentUnavailable { context: ContextId, parent: ContextId },

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Errors raised by the query facade
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Entity kind not registered in schema: {0}")]
    UnknownEntityKind(String),

    #[error("Attribute {attribute} is not declared on {kind}")]
    UnknownAttribute { kind: String, attribute: String },

    #[error("Attribute {kind}.{attribute} expects {expected}, got {actual}")]
    TypeMismatch {
        kind: String,
        attribute: String,
        expected: AttributeType,
        actual: &'static str,
    },

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Object not found: {0}")]
    ObjectNotFound(ObjectId),

    #[error("Context {0} has no path to a storage engine")]
    NoEngineBinding(ContextId),

    #[error("Query execution failed: {0}")]
    EngineQueryFailed(#[source] StorageError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Stack construction and lookup errors
#[derive(Debug, Error)]
pub enum StackError {
    #[error("Schema {name} not found in bundle {}", .bundle.display())]
    SchemaNotFound { name: String, bundle: PathBuf },

    #[error("Schema {name} is invalid: {reason}")]
    SchemaInvalid { name: String, reason: String },

    #[error("Failed to open store at {}: {source}", .path.display())]
    StoreOpenFailed {
        path: PathBuf,
        #[source]
        source: StorageError,
    },

    #[error("Store location unavailable: {0}")]
    StoreLocationUnavailable(String),

    #[error("No default stack has been registered")]
    NoDefaultStack,

    #[error("Stack has no storage engine binding")]
    NoEngineBinding,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl From<config::ConfigError> for StackError {
    fn from(err: config::ConfigError) -> Self {
        StackError::ConfigError(err.to_string())
    }
}

/// Umbrella error for callers driving several layers at once (CLI, host glue).
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Stack(#[from] StackError),

    #[error(transparent)]
    Commit(#[from] CommitError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Output error: {0}")]
    Output(#[from] serde_json::Error),
}
