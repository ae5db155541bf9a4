//! Schema descriptions
//!
//! A schema is a named, versioned set of entity kinds with typed attributes.
//! Schemas ship as TOML resources inside a [`SchemaBundle`] directory and are
//! resolved by name when a stack is opened:
//!
//! ```toml
//! version = 1
//!
//! [entities.TestEntity.attributes]
//! testEntityAttribute = { type = "text" }
//! rank = { type = "int", optional = false }
//! ```

use crate::entity::{Entity, Value};
use crate::error::{QueryError, StackError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Declared attribute type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    Bool,
    Int,
    Float,
    Text,
}

impl AttributeType {
    /// Whether a non-null value fits this type. Ints are accepted for floats.
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (_, Value::Null)
                | (AttributeType::Bool, Value::Bool(_))
                | (AttributeType::Int, Value::Int(_))
                | (AttributeType::Float, Value::Float(_))
                | (AttributeType::Float, Value::Int(_))
                | (AttributeType::Text, Value::Text(_))
        )
    }

    /// Parse a raw string (CLI input, config) as a value of this type.
    pub fn parse_value(&self, raw: &str) -> Option<Value> {
        if raw == "nil" || raw == "null" {
            return Some(Value::Null);
        }
        match self {
            AttributeType::Bool => raw.parse().ok().map(Value::Bool),
            AttributeType::Int => raw.parse().ok().map(Value::Int),
            AttributeType::Float => raw.parse().ok().map(Value::Float),
            AttributeType::Text => Some(Value::Text(raw.to_string())),
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttributeType::Bool => "bool",
            AttributeType::Int => "int",
            AttributeType::Float => "float",
            AttributeType::Text => "text",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDescription {
    #[serde(rename = "type")]
    pub kind: AttributeType,

    /// Optional attributes may be null at commit time.
    #[serde(default = "default_true")]
    pub optional: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityDescription {
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeDescription>,
}

impl EntityDescription {
    pub fn attribute(&self, kind: &str, name: &str) -> Result<&AttributeDescription, QueryError> {
        self.attributes
            .get(name)
            .ok_or_else(|| QueryError::UnknownAttribute {
                kind: kind.to_string(),
                attribute: name.to_string(),
            })
    }
}

/// Entity schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Defaults to the resource name when omitted from the file.
    #[serde(default)]
    pub name: String,

    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub entities: BTreeMap<String, EntityDescription>,
}

fn default_version() -> u32 {
    1
}

impl Schema {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            version,
            entities: BTreeMap::new(),
        }
    }

    /// Builder-style helper for declaring an attribute in code.
    pub fn with_attribute(
        mut self,
        kind: &str,
        attribute: &str,
        attribute_type: AttributeType,
        optional: bool,
    ) -> Self {
        self.entities
            .entry(kind.to_string())
            .or_default()
            .attributes
            .insert(
                attribute.to_string(),
                AttributeDescription {
                    kind: attribute_type,
                    optional,
                },
            );
        self
    }

    /// Parse a schema resource. `name` fills in a missing `name` field.
    pub fn from_toml_str(name: &str, source: &str) -> Result<Self, StackError> {
        let mut schema: Schema = toml::from_str(source).map_err(|e| StackError::SchemaInvalid {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        if schema.name.is_empty() {
            schema.name = name.to_string();
        }
        schema.validate().map_err(|reason| StackError::SchemaInvalid {
            name: name.to_string(),
            reason,
        })?;
        Ok(schema)
    }

    /// Check entity and attribute names are usable in filters.
    pub fn validate(&self) -> Result<(), String> {
        if self.entities.is_empty() {
            return Err("schema declares no entities".to_string());
        }
        for (kind, description) in &self.entities {
            if !is_identifier(kind) {
                return Err(format!("invalid entity name '{}'", kind));
            }
            for attribute in description.attributes.keys() {
                if !is_identifier(attribute) {
                    return Err(format!("invalid attribute name '{}.{}'", kind, attribute));
                }
            }
        }
        Ok(())
    }

    pub fn entity(&self, kind: &str) -> Result<&EntityDescription, QueryError> {
        self.entities
            .get(kind)
            .ok_or_else(|| QueryError::UnknownEntityKind(kind.to_string()))
    }

    /// Stamp written into a store so a store is never reopened under a
    /// different schema.
    pub fn stamp(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }

    /// Check a value against the declared attribute type.
    pub fn check_value(&self, kind: &str, attribute: &str, value: &Value) -> Result<(), QueryError> {
        let description = self.entity(kind)?.attribute(kind, attribute)?;
        if description.kind.accepts(value) {
            Ok(())
        } else {
            Err(QueryError::TypeMismatch {
                kind: kind.to_string(),
                attribute: attribute.to_string(),
                expected: description.kind,
                actual: value.type_name(),
            })
        }
    }

    /// Commit-time validation: required attributes must be set.
    pub fn validate_entity(&self, entity: &Entity) -> Result<(), String> {
        let description = self
            .entities
            .get(&entity.kind)
            .ok_or_else(|| format!("unknown entity kind '{}'", entity.kind))?;
        for (name, attribute) in &description.attributes {
            let value = entity.get(name);
            if !attribute.optional && value.is_null() {
                return Err(format!("required attribute '{}' is not set", name));
            }
            if !attribute.kind.accepts(value) {
                return Err(format!(
                    "attribute '{}' expects {}, got {}",
                    name,
                    attribute.kind,
                    value.type_name()
                ));
            }
        }
        Ok(())
    }
}

pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Directory of schema resources, one `<name>.toml` per schema.
#[derive(Debug, Clone)]
pub struct SchemaBundle {
    root: PathBuf,
}

impl SchemaBundle {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resource_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.toml", name))
    }

    /// Resolve a schema by name.
    pub fn resolve(&self, name: &str) -> Result<Schema, StackError> {
        let path = self.resource_path(name);
        let source = std::fs::read_to_string(&path).map_err(|_| StackError::SchemaNotFound {
            name: name.to_string(),
            bundle: self.root.clone(),
        })?;
        Schema::from_toml_str(name, &source)
    }
}
