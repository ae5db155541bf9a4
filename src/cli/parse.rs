//! CLI parse: clap types for ctxstack. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ctxstack CLI - inspect and edit an object store through a context stack
#[derive(Parser)]
#[command(name = "ctxstack")]
#[command(about = "Inspect and edit an object store through a context stack")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory (config/ and relative schema paths resolve here)
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Store path (overrides store.directory and store.file_name)
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Show the loaded schema
    Schema {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Fetch objects of one kind
    Fetch {
        /// Entity kind
        kind: String,
        /// Filter expression, e.g. 'name BEGINSWITH "a" AND rank >= 3'
        #[arg(long)]
        filter: Option<String>,
        /// Maximum rows (0 = unlimited)
        #[arg(long, default_value = "0")]
        limit: usize,
        /// Sort key; prefix with '-' for descending. Repeatable.
        #[arg(long = "sort", allow_hyphen_values = true)]
        sort: Vec<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Count objects of one kind
    Count {
        kind: String,
        #[arg(long)]
        filter: Option<String>,
    },
    /// Insert one object and commit it
    Insert {
        kind: String,
        /// Attribute values as attr=value
        values: Vec<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Delete matching objects and commit
    Delete {
        kind: String,
        #[arg(long)]
        filter: Option<String>,
        /// Required to delete without a filter
        #[arg(long)]
        all: bool,
    },
}
