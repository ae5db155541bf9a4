//! Filter language and fetch requests
//!
//! Filters are conjunctions of attribute comparisons:
//!
//! ```text
//! testEntityAttribute == "test" AND rank >= 3
//! name BEGINSWITH ? AND archived == false
//! ```
//!
//! Operators: `==` (or `=`), `!=`, `<`, `<=`, `>`, `>=`, `CONTAINS`,
//! `BEGINSWITH`. Literals: quoted strings, integers, floats, `true`, `false`,
//! `nil`. `?` placeholders are bound positionally by [`Filter::parse_with`].
//! Missing attributes read as `nil`; ordering comparisons against `nil` never
//! match.

use crate::entity::{Entity, Value};
use crate::error::QueryError;
use crate::schema::{is_identifier, Schema};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
    BeginsWith,
}

impl CompareOp {
    fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Contains => "CONTAINS",
            CompareOp::BeginsWith => "BEGINSWITH",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub attribute: String,
    pub op: CompareOp,
    pub value: Value,
}

impl Comparison {
    pub fn matches(&self, entity: &Entity) -> bool {
        let actual = entity.get(&self.attribute);
        match self.op {
            CompareOp::Eq => actual.compare(&self.value) == Some(std::cmp::Ordering::Equal),
            CompareOp::Ne => actual.compare(&self.value) != Some(std::cmp::Ordering::Equal),
            CompareOp::Lt => !actual.is_null() && actual.compare(&self.value).is_some_and(|o| o.is_lt()),
            CompareOp::Le => !actual.is_null() && actual.compare(&self.value).is_some_and(|o| o.is_le()),
            CompareOp::Gt => !actual.is_null() && actual.compare(&self.value).is_some_and(|o| o.is_gt()),
            CompareOp::Ge => !actual.is_null() && actual.compare(&self.value).is_some_and(|o| o.is_ge()),
            CompareOp::Contains => match (actual.as_str(), self.value.as_str()) {
                (Some(haystack), Some(needle)) => haystack.contains(needle),
                _ => false,
            },
            CompareOp::BeginsWith => match (actual.as_str(), self.value.as_str()) {
                (Some(haystack), Some(prefix)) => haystack.starts_with(prefix),
                _ => false,
            },
        }
    }
}

/// Conjunction of comparisons. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<Comparison>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::all().and(attribute, CompareOp::Eq, value)
    }

    pub fn and(mut self, attribute: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        self.clauses.push(Comparison {
            attribute: attribute.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn clauses(&self) -> &[Comparison] {
        &self.clauses
    }

    pub fn parse(expr: &str) -> Result<Self, QueryError> {
        Self::parse_with(expr, &[])
    }

    /// Parse and bind `?` placeholders in order.
    pub fn parse_with(expr: &str, params: &[Value]) -> Result<Self, QueryError> {
        let tokens = tokenize(expr)?;
        Parser {
            tokens,
            pos: 0,
            params,
            next_param: 0,
        }
        .parse()
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        self.clauses.iter().all(|clause| clause.matches(entity))
    }

    /// Every referenced attribute must be declared on `kind`.
    pub fn validate(&self, schema: &Schema, kind: &str) -> Result<(), QueryError> {
        let entity = schema.entity(kind)?;
        for clause in &self.clauses {
            entity.attribute(kind, &clause.attribute)?;
        }
        Ok(())
    }
}

impl FromStr for Filter {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Filter::parse(s)
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                f.write_str(" AND ")?;
            }
            write!(f, "{} {} {}", clause.attribute, clause.op.as_str(), clause.value)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Op(CompareOp),
    Literal(Value),
    Param,
    And,
}

fn tokenize(expr: &str) -> Result<Vec<Token>, QueryError> {
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '?' => {
                tokens.push(Token::Param);
                i += 1;
            }
            '=' => {
                i += if chars.get(i + 1) == Some(&'=') { 2 } else { 1 };
                tokens.push(Token::Op(CompareOp::Eq));
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op(CompareOp::Ne));
                i += 2;
            }
            '<' | '>' => {
                let or_equal = chars.get(i + 1) == Some(&'=');
                let op = match (c, or_equal) {
                    ('<', false) => CompareOp::Lt,
                    ('<', true) => CompareOp::Le,
                    ('>', false) => CompareOp::Gt,
                    _ => CompareOp::Ge,
                };
                tokens.push(Token::Op(op));
                i += if or_equal { 2 } else { 1 };
            }
            '"' | '\'' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => {
                            return Err(QueryError::InvalidFilter(format!(
                                "unterminated string in '{}'",
                                expr
                            )))
                        }
                        Some('\\') => {
                            let escaped = chars.get(i + 1).ok_or_else(|| {
                                QueryError::InvalidFilter(format!("dangling escape in '{}'", expr))
                            })?;
                            text.push(match escaped {
                                'n' => '\n',
                                't' => '\t',
                                other => *other,
                            });
                            i += 2;
                        }
                        Some(ch) if *ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(ch) => {
                            text.push(*ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Literal(Value::Text(text)));
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let raw: String = chars[start..i].iter().collect();
                let value = if raw.contains('.') {
                    raw.parse().map(Value::Float).ok()
                } else {
                    raw.parse().map(Value::Int).ok()
                };
                let value = value.ok_or_else(|| {
                    QueryError::InvalidFilter(format!("invalid number '{}'", raw))
                })?;
                tokens.push(Token::Literal(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let token = match word.to_ascii_uppercase().as_str() {
                    "AND" => Token::And,
                    "CONTAINS" => Token::Op(CompareOp::Contains),
                    "BEGINSWITH" => Token::Op(CompareOp::BeginsWith),
                    "TRUE" => Token::Literal(Value::Bool(true)),
                    "FALSE" => Token::Literal(Value::Bool(false)),
                    "NIL" | "NULL" => Token::Literal(Value::Null),
                    _ => Token::Ident(word),
                };
                tokens.push(token);
            }
            other => {
                return Err(QueryError::InvalidFilter(format!(
                    "unexpected character '{}' in '{}'",
                    other, expr
                )))
            }
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    params: &'a [Value],
    next_param: usize,
}

impl Parser<'_> {
    fn parse(mut self) -> Result<Filter, QueryError> {
        if self.tokens.is_empty() {
            return Err(QueryError::InvalidFilter("empty filter".to_string()));
        }

        let mut filter = Filter::all();
        loop {
            let attribute = match self.advance() {
                Some(Token::Ident(name)) if is_identifier(&name) => name,
                other => {
                    return Err(QueryError::InvalidFilter(format!(
                        "expected attribute name, found {:?}",
                        other
                    )))
                }
            };
            let op = match self.advance() {
                Some(Token::Op(op)) => op,
                other => {
                    return Err(QueryError::InvalidFilter(format!(
                        "expected operator after '{}', found {:?}",
                        attribute, other
                    )))
                }
            };
            let value = match self.advance() {
                Some(Token::Literal(value)) => value,
                Some(Token::Param) => {
                    let value = self.params.get(self.next_param).cloned().ok_or_else(|| {
                        QueryError::InvalidFilter(format!(
                            "missing parameter {} for '{}'",
                            self.next_param + 1,
                            attribute
                        ))
                    })?;
                    self.next_param += 1;
                    value
                }
                other => {
                    return Err(QueryError::InvalidFilter(format!(
                        "expected value for '{}', found {:?}",
                        attribute, other
                    )))
                }
            };
            filter = filter.and(attribute, op, value);

            match self.advance() {
                None => break,
                Some(Token::And) => continue,
                Some(other) => {
                    return Err(QueryError::InvalidFilter(format!(
                        "expected AND, found {:?}",
                        other
                    )))
                }
            }
        }

        if self.next_param != self.params.len() {
            return Err(QueryError::InvalidFilter(format!(
                "{} parameters supplied, {} used",
                self.params.len(),
                self.next_param
            )));
        }
        Ok(filter)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }
}

/// Sort key for fetch results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortDescriptor {
    pub attribute: String,
    pub ascending: bool,
}

impl SortDescriptor {
    pub fn ascending(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            ascending: true,
        }
    }

    pub fn descending(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            ascending: false,
        }
    }
}

/// Fetch request against one entity kind
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub kind: String,
    pub filter: Option<Filter>,
    /// Zero means unlimited.
    pub limit: usize,
    pub order: Vec<SortDescriptor>,
}

impl FetchRequest {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            filter: None,
            limit: 0,
            order: Vec::new(),
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn order_by(mut self, descriptor: SortDescriptor) -> Self {
        self.order.push(descriptor);
        self
    }

    /// Reject requests the engine could never run: unknown kind, or a filter
    /// or sort key naming undeclared attributes.
    pub fn validate(&self, schema: &Schema) -> Result<(), QueryError> {
        let entity = schema.entity(&self.kind)?;
        if let Some(filter) = &self.filter {
            filter.validate(schema, &self.kind)?;
        }
        for descriptor in &self.order {
            entity.attribute(&self.kind, &descriptor.attribute)?;
        }
        Ok(())
    }

    /// Filter, order and limit a set of candidate rows.
    pub fn apply(&self, rows: impl IntoIterator<Item = Entity>) -> Vec<Entity> {
        let mut matched: Vec<Entity> = rows
            .into_iter()
            .filter(|e| e.kind == self.kind)
            .filter(|e| self.filter.as_ref().map_or(true, |f| f.matches(e)))
            .collect();

        if !self.order.is_empty() {
            matched.sort_by(|a, b| {
                for descriptor in &self.order {
                    let ordering = a
                        .get(&descriptor.attribute)
                        .sort_cmp(b.get(&descriptor.attribute));
                    let ordering = if descriptor.ascending {
                        ordering
                    } else {
                        ordering.reverse()
                    };
                    if ordering.is_ne() {
                        return ordering;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }

        if self.limit > 0 {
            matched.truncate(self.limit);
        }
        matched
    }
}
