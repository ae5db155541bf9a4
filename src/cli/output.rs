//! CLI output: table and json rendering, and error mapping to the CLI surface.

use crate::entity::{Entity, Value};
use crate::error::ApiError;
use crate::schema::Schema;
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use owo_colors::OwoColorize;
use serde_json::json;

/// Map domain/service errors to a string for CLI output.
pub fn map_error(e: &ApiError) -> String {
    format!("{} {}", "error:".red().bold(), e)
}

pub fn format_schema(schema: &Schema, format: &str) -> Result<String, ApiError> {
    if format == "json" {
        return Ok(serde_json::to_string_pretty(schema)?);
    }
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Entity", "Attribute", "Type", "Optional"]);
    for (kind, description) in &schema.entities {
        for (name, attribute) in &description.attributes {
            table.add_row(vec![
                kind.clone(),
                name.clone(),
                attribute.kind.to_string(),
                attribute.optional.to_string(),
            ]);
        }
    }
    Ok(format!("{}\n{}", schema.stamp(), table))
}

/// Render rows of one kind. Columns follow the schema's attribute order.
pub fn format_entities(
    schema: &Schema,
    kind: &str,
    rows: &[Entity],
    format: &str,
) -> Result<String, ApiError> {
    if format == "json" {
        let arr: Vec<serde_json::Value> = rows.iter().map(Entity::to_json).collect();
        return Ok(serde_json::to_string_pretty(&arr)?);
    }

    let attributes: Vec<&String> = schema
        .entity(kind)?
        .attributes
        .keys()
        .collect();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    let mut header = vec!["id".to_string()];
    header.extend(attributes.iter().map(|a| a.to_string()));
    table.set_header(header);
    for entity in rows {
        let mut row = vec![entity.id.to_string()];
        row.extend(attributes.iter().map(|a| cell(entity.get(a))));
        table.add_row(row);
    }
    Ok(table.to_string())
}

pub fn format_count(kind: &str, count: usize, format: &str) -> Result<String, ApiError> {
    if format == "json" {
        return Ok(serde_json::to_string_pretty(&json!({ "kind": kind, "count": count }))?);
    }
    Ok(count.to_string())
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::Text(s) => s.clone(),
        other => other.to_string(),
    }
}
