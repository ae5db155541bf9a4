//! Entities and attribute values
//!
//! An [`Entity`] is the unit the contexts buffer and the engine stores: an
//! engine-level identity, the kind it was declared under in the schema, and a
//! flat map of typed attribute values.

use crate::types::ObjectId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Compare two values of compatible types.
    ///
    /// Ints and floats compare numerically; any other cross-type comparison
    /// is `None`. Null equals only null.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) if !b.is_nan() => Some(cmp_int_float(*a, *b)),
            (Value::Float(a), Value::Int(b)) if !a.is_nan() => {
                Some(cmp_int_float(*b, *a).reverse())
            }
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Total order used for sorting: compatible values by [`Value::compare`],
    /// otherwise by type rank with null first. NaN sorts after every other
    /// number.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self.is_nan(), other.is_nan()) {
            (true, true) => return Ordering::Equal,
            (true, false) if other.rank() == self.rank() => return Ordering::Greater,
            (false, true) if other.rank() == self.rank() => return Ordering::Less,
            _ => {}
        }
        self.compare(other)
            .unwrap_or_else(|| self.rank().cmp(&other.rank()))
    }

    fn is_nan(&self) -> bool {
        matches!(self, Value::Float(x) if x.is_nan())
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::Text(_) => 3,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

/// Exact comparison of an integer with a non-NaN float.
fn cmp_int_float(int: i64, float: f64) -> Ordering {
    // 2^63: the first float above every i64.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if float >= LIMIT {
        return Ordering::Less;
    }
    if float < -LIMIT {
        return Ordering::Greater;
    }
    let whole = float.trunc();
    match int.cmp(&(whole as i64)) {
        Ordering::Equal => 0.0_f64
            .partial_cmp(&(float - whole))
            .unwrap_or(Ordering::Equal),
        unequal => unequal,
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Text(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A stored object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: ObjectId,
    pub kind: String,
    pub attributes: BTreeMap<String, Value>,
}

impl Entity {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            id: ObjectId::new(),
            kind: kind.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Attribute value; undeclared or unset attributes read as null.
    pub fn get(&self, attribute: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.attributes.get(attribute).unwrap_or(&NULL)
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut attributes = serde_json::Map::new();
        for (name, value) in &self.attributes {
            attributes.insert(name.clone(), value.to_json());
        }
        serde_json::json!({
            "id": self.id.to_string(),
            "kind": self.kind,
            "attributes": attributes,
        })
    }
}
