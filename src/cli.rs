//! CLI domain: parse, route, and output only.
//! Route handlers stay thin; all behavior lives in the stack and query layers.

mod output;
mod parse;
mod route;

pub use output::{format_count, format_entities, format_schema, map_error};
pub use parse::{Cli, Commands};
pub use route::RunContext;
