//! Context hierarchy
//!
//! A [`ContextStack`] owns the storage engine, the change bus, the context
//! registry and the two long-lived contexts: Root (bound to the engine) and
//! Interactive (child of Root). Workers are created on demand as siblings
//! of Interactive, bound straight to the engine; whatever a worker commits
//! is merged into Interactive on Interactive's own queue.

use crate::bus::{ChangeBus, ChangeFilter};
use crate::config::{EngineKind, StackConfig, StoreConfig};
use crate::context::{ContextBuilder, ContextRegistry, ObjectContext};
use crate::error::{StackError, StorageError};
use crate::schema::{Schema, SchemaBundle};
use crate::store::{open_with_recovery, MemoryObjectStore, ObjectStore, StoreLocation};
use crate::types::ContextRole;
use parking_lot::RwLock;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub struct ContextStack {
    schema: Arc<Schema>,
    /// Cleared by [`close`](Self::close).
    engine: RwLock<Option<Arc<dyn ObjectStore>>>,
    registry: Arc<ContextRegistry>,
    bus: Arc<ChangeBus>,
    root: ObjectContext,
    interactive: ObjectContext,
    store_path: Option<PathBuf>,
}

impl ContextStack {
    /// Resolve `schema_name` from `bundle` and open the store named
    /// `store_file_name` in the per-user data directory.
    pub fn open(
        schema_name: &str,
        bundle: &SchemaBundle,
        store_file_name: &str,
    ) -> Result<Arc<Self>, StackError> {
        let schema = bundle.resolve(schema_name)?;
        let path = StoreLocation::data_dir(store_file_name).resolve()?;
        Self::open_with(schema, path, &StoreConfig::default())
    }

    /// Open a sled store at an explicit path.
    pub fn open_at<P: AsRef<Path>>(schema: Schema, path: P) -> Result<Arc<Self>, StackError> {
        Self::open_with(schema, path, &StoreConfig::default())
    }

    pub fn open_with<P: AsRef<Path>>(
        schema: Schema,
        path: P,
        config: &StoreConfig,
    ) -> Result<Arc<Self>, StackError> {
        let schema = Arc::new(schema);
        let path = path.as_ref();
        let store = open_with_recovery(path, schema.clone(), config)?;
        Self::with_engine(schema, Arc::new(store))
    }

    /// Build a stack from loaded configuration.
    pub fn from_config(config: &StackConfig) -> Result<Arc<Self>, StackError> {
        config.ensure_valid()?;
        let schema = SchemaBundle::new(&config.schema.bundle_dir).resolve(&config.schema.name)?;
        match config.store.engine {
            EngineKind::Sled => {
                let path = config.store.resolve_path()?;
                Self::open_with(schema, path, &config.store)
            }
            EngineKind::Memory => {
                let schema = Arc::new(schema);
                let engine = Arc::new(MemoryObjectStore::new(schema.clone()));
                Self::with_engine(schema, engine)
            }
        }
    }

    /// Build the Root and Interactive contexts over an already-open engine.
    pub fn with_engine(
        schema: Arc<Schema>,
        engine: Arc<dyn ObjectStore>,
    ) -> Result<Arc<Self>, StackError> {
        let registry = ContextRegistry::new(schema.clone());
        let bus = ChangeBus::new();

        let root = ContextBuilder::new(&registry, ContextRole::Root)
            .engine(engine.clone())
            .bus(bus.clone())
            .build()?;
        let interactive = ContextBuilder::new(&registry, ContextRole::Interactive)
            .parent(&root)
            .bus(bus.clone())
            .build()?;

        let store_path = engine.path().map(Path::to_path_buf);
        info!(
            schema = %schema.stamp(),
            store = ?store_path,
            root = %root.id(),
            interactive = %interactive.id(),
            "Context stack opened"
        );

        Ok(Arc::new(Self {
            schema,
            engine: RwLock::new(Some(engine)),
            registry,
            bus,
            root,
            interactive,
            store_path,
        }))
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn root(&self) -> &ObjectContext {
        &self.root
    }

    pub fn interactive(&self) -> &ObjectContext {
        &self.interactive
    }

    pub fn bus(&self) -> &Arc<ChangeBus> {
        &self.bus
    }

    pub fn registry(&self) -> &Arc<ContextRegistry> {
        &self.registry
    }

    pub fn store_path(&self) -> Option<&Path> {
        self.store_path.as_deref()
    }

    /// The engine, until the stack is closed.
    pub fn engine(&self) -> Option<Arc<dyn ObjectStore>> {
        self.engine.read().clone()
    }

    /// Create an engine-bound worker whose commits are merged into
    /// Interactive. Dropping the last handle to the worker ends the merge
    /// subscription.
    pub fn new_worker(&self) -> Result<ObjectContext, StackError> {
        let engine = self.engine().ok_or(StackError::NoEngineBinding)?;
        let builder = ContextBuilder::new(&self.registry, ContextRole::Worker)
            .engine(engine)
            .bus(self.bus.clone());

        let interactive = self.interactive.downgrade();
        let subscription = self
            .bus
            .subscribe(ChangeFilter::Source(builder.id()), move |change_set| {
                let Some(interactive) = interactive.upgrade() else {
                    return;
                };
                let id = interactive.id();
                if let Err(e) = interactive.perform(move |session| session.merge(&change_set)) {
                    warn!(context = %id, error = %e, "Cannot queue merge");
                }
            });

        Ok(builder.subscription(subscription).build()?)
    }

    /// Build a context outside the canonical tree, optionally under `parent`
    /// and optionally bound to the engine.
    pub fn detached_context(
        &self,
        parent: Option<&ObjectContext>,
        bind_engine: bool,
    ) -> Result<ObjectContext, StackError> {
        let mut builder =
            ContextBuilder::new(&self.registry, ContextRole::Detached).bus(self.bus.clone());
        if let Some(parent) = parent {
            builder = builder.parent(parent);
        }
        if bind_engine {
            builder = builder.engine(self.engine().ok_or(StackError::NoEngineBinding)?);
        }
        Ok(builder.build()?)
    }

    /// Wait for work already queued on Interactive and Root, flush the
    /// engine and stop handing it to new contexts. Existing contexts keep
    /// their binding.
    pub fn close(&self) -> Result<(), StorageError> {
        for context in [&self.interactive, &self.root] {
            if let Err(e) = context.perform_and_wait(|_| ()) {
                warn!(context = %context.id(), error = %e, "Cannot drain context queue");
            }
        }

        let Some(engine) = self.engine.write().take() else {
            return Ok(());
        };
        engine.flush()?;
        info!(store = ?self.store_path, "Context stack closed");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.engine.read().is_none()
    }
}

impl fmt::Debug for ContextStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextStack")
            .field("schema", &self.schema.stamp())
            .field("store_path", &self.store_path)
            .field("root", &self.root.id())
            .field("interactive", &self.interactive.id())
            .finish()
    }
}
