//! CLI route: single route table and run context.

use crate::cli::output::{format_count, format_entities, format_schema};
use crate::cli::parse::Commands;
use crate::config::{ConfigLoader, StackConfig};
use crate::entity::Value;
use crate::error::{ApiError, QueryError};
use crate::filter::{FetchRequest, Filter, SortDescriptor};
use crate::save;
use crate::schema::{Schema, SchemaBundle};
use crate::stack::ContextStack;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Runtime context for CLI execution: loaded config and the open stack.
pub struct RunContext {
    stack: Arc<ContextStack>,
    workspace_root: PathBuf,
}

impl RunContext {
    /// Load configuration and open the stack. `store_path` overrides the
    /// configured store location.
    pub fn new(
        workspace_root: PathBuf,
        config_path: Option<PathBuf>,
        store_path: Option<PathBuf>,
    ) -> Result<Self, ApiError> {
        let mut config = match config_path {
            Some(ref cfg_path) => ConfigLoader::load_from_file(cfg_path)?,
            None => ConfigLoader::load(&workspace_root)?,
        };
        resolve_relative_paths(&mut config, &workspace_root);

        let stack = match store_path {
            Some(path) => {
                config.ensure_valid()?;
                let schema = SchemaBundle::new(&config.schema.bundle_dir)
                    .resolve(&config.schema.name)?;
                ContextStack::open_with(schema, path, &config.store)?
            }
            None => ContextStack::from_config(&config)?,
        };

        Ok(Self {
            stack,
            workspace_root,
        })
    }

    /// Wrap an already-open stack.
    pub fn with_stack(stack: Arc<ContextStack>, workspace_root: PathBuf) -> Self {
        Self {
            stack,
            workspace_root,
        }
    }

    pub fn stack(&self) -> &Arc<ContextStack> {
        &self.stack
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Schema { format } => format_schema(self.stack.schema(), format),
            Commands::Fetch {
                kind,
                filter,
                limit,
                sort,
                format,
            } => {
                let mut request = FetchRequest::new(kind.as_str()).limit(*limit);
                request.filter = parse_filter(filter.as_deref())?;
                for key in sort {
                    request = request.order_by(parse_sort(key));
                }
                let rows = self.stack.interactive().fetch_many(request)?;
                format_entities(self.stack.schema(), kind, &rows, format)
            }
            Commands::Count { kind, filter } => {
                let count = self
                    .stack
                    .interactive()
                    .count(kind, parse_filter(filter.as_deref())?)?;
                format_count(kind, count, "text")
            }
            Commands::Insert {
                kind,
                values,
                format,
            } => {
                let attributes = parse_assignments(self.stack.schema(), kind, values)?;
                let worker = self.stack.new_worker()?;
                let entity = worker.insert_with(kind, attributes)?;
                save::commit(&worker)?;
                self.stack.close()?;
                info!(kind = %kind, id = %entity.id, "Inserted object");
                format_entities(self.stack.schema(), kind, &[entity], format)
            }
            Commands::Delete { kind, filter, all } => {
                let filter = parse_filter(filter.as_deref())?;
                if filter.is_none() && !*all {
                    return Err(ApiError::InvalidInput(
                        "delete needs --filter or --all".to_string(),
                    ));
                }
                let interactive = self.stack.interactive();
                let deleted = interactive.delete_matching(kind, filter)?;
                save::commit(interactive)?;
                self.stack.close()?;
                info!(kind = %kind, deleted, "Deleted objects");
                Ok(format!("Deleted {} {}", deleted, kind))
            }
        }
    }
}

fn resolve_relative_paths(config: &mut StackConfig, workspace_root: &Path) {
    if config.schema.bundle_dir.is_relative() {
        config.schema.bundle_dir = workspace_root.join(&config.schema.bundle_dir);
    }
    if let Some(directory) = &config.store.directory {
        if directory.is_relative() {
            config.store.directory = Some(workspace_root.join(directory));
        }
    }
}

fn parse_filter(expr: Option<&str>) -> Result<Option<Filter>, QueryError> {
    expr.map(Filter::parse).transpose()
}

fn parse_sort(key: &str) -> SortDescriptor {
    match key.strip_prefix('-') {
        Some(attribute) => SortDescriptor::descending(attribute),
        None => SortDescriptor::ascending(key),
    }
}

/// Parse `attr=value` pairs using each attribute's declared type.
fn parse_assignments(
    schema: &Schema,
    kind: &str,
    values: &[String],
) -> Result<Vec<(String, Value)>, ApiError> {
    let entity = schema.entity(kind)?;
    values
        .iter()
        .map(|assignment| {
            let (name, raw) = assignment.split_once('=').ok_or_else(|| {
                ApiError::InvalidInput(format!("expected attr=value, got '{}'", assignment))
            })?;
            let attribute = entity.attribute(kind, name)?;
            let value = attribute.kind.parse_value(raw).ok_or_else(|| {
                ApiError::InvalidInput(format!(
                    "'{}' is not a valid {} for {}.{}",
                    raw, attribute.kind, kind, name
                ))
            })?;
            Ok((name.to_string(), value))
        })
        .collect()
}
