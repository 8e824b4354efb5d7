//! MongoDB-style predicate engine
//!
//! Filters arrive as JSON, parse into a typed tree, and evaluate
//! against the wire form of a document. The tree also serializes back
//! to JSON: `parse` and `canonicalize` are structural inverses, so a
//! canonical form can be stored and reparsed without drift.
//!
//! Supported surface:
//! - logical: `$or`, `$and`, `$not`, `$nor`
//! - comparison: `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`
//! - membership: `$in`, `$nin`
//! - presence: `$exists`
//! - pattern: `$regex` with `$options` (guarded, see [`regex_guard`])
//!
//! Plain `{field: value}` entries use strict structural equality;
//! `$eq`/`$ne` apply loose numeric coercion. Missing fields evaluate
//! as JSON null everywhere except `$exists`.

pub mod compare;
pub mod regex_guard;

use serde_json::{Map, Value};
use std::cmp::Ordering;
use thiserror::Error;

use crate::error::StoreError;
use compare::{compare_values, values_equal};

/// Filter parse failure. Always a caller error.
#[derive(Debug, Error, PartialEq)]
pub enum FilterError {
    #[error("filter must be a JSON object")]
    NotAnObject,

    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    #[error("operator '{op}' {detail}")]
    InvalidOperand { op: String, detail: String },
}

impl From<FilterError> for StoreError {
    fn from(e: FilterError) -> Self {
        StoreError::Validation(e.to_string())
    }
}

fn invalid(op: &str, detail: &str) -> FilterError {
    FilterError::InvalidOperand {
        op: op.to_string(),
        detail: detail.to_string(),
    }
}

/// A parsed filter tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Every clause must hold. `And(vec![])` is the empty filter and
    /// matches everything.
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
    Not(Box<Filter>),
    /// Predicate applied to one (possibly dotted) field path.
    Field { path: String, predicate: Predicate },
}

/// A per-field condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Plain `{field: value}` shorthand. Strict structural equality.
    Value(Value),
    /// `$eq`: loose equality with numeric coercion.
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Exists(bool),
    Regex { pattern: String, options: String },
    /// Field-level `$not`, negating an operator object.
    Not(Box<Predicate>),
    /// Several operators on one field, all required.
    All(Vec<Predicate>),
}

impl Filter {
    /// Parse a JSON filter into a tree.
    pub fn parse(value: &Value) -> Result<Filter, FilterError> {
        let obj = value.as_object().ok_or(FilterError::NotAnObject)?;
        let mut clauses = Vec::with_capacity(obj.len());
        for (key, operand) in obj {
            clauses.push(Self::parse_entry(key, operand)?);
        }
        Ok(collapse(clauses))
    }

    fn parse_entry(key: &str, operand: &Value) -> Result<Filter, FilterError> {
        match key {
            "$and" => Ok(collapse(Self::parse_list(key, operand)?)),
            "$or" => Ok(Filter::Or(Self::parse_list(key, operand)?)),
            "$nor" => Ok(Filter::Nor(Self::parse_list(key, operand)?)),
            "$not" => {
                if !operand.is_object() {
                    return Err(invalid(key, "expects a filter object"));
                }
                Ok(Filter::Not(Box::new(Filter::parse(operand)?)))
            }
            _ if key.starts_with('$') => Err(FilterError::UnknownOperator(key.to_string())),
            path => Self::parse_field(path, operand),
        }
    }

    fn parse_list(op: &str, operand: &Value) -> Result<Vec<Filter>, FilterError> {
        let items = operand
            .as_array()
            .ok_or_else(|| invalid(op, "expects a non-empty array of filters"))?;
        if items.is_empty() {
            return Err(invalid(op, "expects a non-empty array of filters"));
        }
        items.iter().map(Filter::parse).collect()
    }

    fn parse_field(path: &str, operand: &Value) -> Result<Filter, FilterError> {
        let predicate = match operand.as_object() {
            Some(obj) if obj.keys().any(|k| k.starts_with('$')) => parse_predicates(obj)?,
            // Object literals without operators compare structurally
            _ => Predicate::Value(operand.clone()),
        };
        Ok(Filter::Field {
            path: path.to_string(),
            predicate,
        })
    }

    /// Evaluate against the wire form of a document.
    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Filter::And(clauses) => clauses.iter().all(|c| c.matches(doc)),
            Filter::Or(clauses) => clauses.iter().any(|c| c.matches(doc)),
            Filter::Nor(clauses) => !clauses.iter().any(|c| c.matches(doc)),
            Filter::Not(inner) => !inner.matches(doc),
            Filter::Field { path, predicate } => predicate.matches(lookup_path(doc, path)),
        }
    }

    /// Serialize back to the JSON filter syntax.
    ///
    /// Reparsing the output reproduces this tree exactly.
    pub fn canonicalize(&self) -> Value {
        match self {
            Filter::And(clauses) => {
                // Merge clauses into one object while keys stay unique
                let mut obj = Map::new();
                for clause in clauses {
                    let (key, value) = clause.entry();
                    if obj.contains_key(&key) {
                        let items: Vec<Value> =
                            clauses.iter().map(|c| c.canonicalize()).collect();
                        let mut wrapped = Map::new();
                        wrapped.insert("$and".to_string(), Value::Array(items));
                        return Value::Object(wrapped);
                    }
                    obj.insert(key, value);
                }
                Value::Object(obj)
            }
            Filter::Or(_) | Filter::Nor(_) | Filter::Not(_) | Filter::Field { .. } => {
                let (key, value) = self.entry();
                let mut obj = Map::new();
                obj.insert(key, value);
                Value::Object(obj)
            }
        }
    }

    /// The single key/value pair this node contributes to an object.
    fn entry(&self) -> (String, Value) {
        match self {
            Filter::And(clauses) => {
                let items: Vec<Value> = clauses.iter().map(|c| c.canonicalize()).collect();
                ("$and".to_string(), Value::Array(items))
            }
            Filter::Or(clauses) => {
                let items: Vec<Value> = clauses.iter().map(|c| c.canonicalize()).collect();
                ("$or".to_string(), Value::Array(items))
            }
            Filter::Nor(clauses) => {
                let items: Vec<Value> = clauses.iter().map(|c| c.canonicalize()).collect();
                ("$nor".to_string(), Value::Array(items))
            }
            Filter::Not(inner) => ("$not".to_string(), inner.canonicalize()),
            Filter::Field { path, predicate } => (path.clone(), predicate.canonicalize()),
        }
    }
}

fn collapse(mut clauses: Vec<Filter>) -> Filter {
    if clauses.len() == 1 {
        clauses.pop().unwrap()
    } else {
        Filter::And(clauses)
    }
}

fn parse_predicates(obj: &Map<String, Value>) -> Result<Predicate, FilterError> {
    // $options belongs to $regex, pick it up first
    let options = match obj.get("$options") {
        Some(Value::String(s)) => {
            if let Some(bad) = s.chars().find(|c| !"imsx".contains(*c)) {
                return Err(invalid(
                    "$options",
                    &format!("does not support flag '{}'", bad),
                ));
            }
            Some(s.clone())
        }
        Some(_) => return Err(invalid("$options", "expects a string of flags")),
        None => None,
    };
    if options.is_some() && !obj.contains_key("$regex") {
        return Err(invalid("$options", "requires $regex"));
    }

    let mut predicates = Vec::with_capacity(obj.len());
    for (op, operand) in obj {
        let predicate = match op.as_str() {
            "$options" => continue,
            "$eq" => Predicate::Eq(operand.clone()),
            "$ne" => Predicate::Ne(operand.clone()),
            "$gt" => Predicate::Gt(operand.clone()),
            "$gte" => Predicate::Gte(operand.clone()),
            "$lt" => Predicate::Lt(operand.clone()),
            "$lte" => Predicate::Lte(operand.clone()),
            "$in" => Predicate::In(operand_array(op, operand)?),
            "$nin" => Predicate::Nin(operand_array(op, operand)?),
            "$exists" => match operand {
                Value::Bool(b) => Predicate::Exists(*b),
                _ => return Err(invalid(op, "expects a boolean")),
            },
            "$regex" => match operand {
                Value::String(pattern) => Predicate::Regex {
                    pattern: pattern.clone(),
                    options: options.clone().unwrap_or_default(),
                },
                _ => return Err(invalid(op, "expects a string pattern")),
            },
            "$not" => match operand.as_object() {
                Some(inner) if inner.keys().any(|k| k.starts_with('$')) => {
                    Predicate::Not(Box::new(parse_predicates(inner)?))
                }
                _ => return Err(invalid(op, "expects an operator object")),
            },
            other => return Err(FilterError::UnknownOperator(other.to_string())),
        };
        predicates.push(predicate);
    }

    if predicates.len() == 1 {
        Ok(predicates.pop().unwrap())
    } else {
        Ok(Predicate::All(predicates))
    }
}

fn operand_array(op: &str, operand: &Value) -> Result<Vec<Value>, FilterError> {
    operand
        .as_array()
        .map(|a| a.to_vec())
        .ok_or_else(|| invalid(op, "expects an array"))
}

static NULL: Value = Value::Null;

impl Predicate {
    /// Evaluate against a field lookup result.
    ///
    /// `None` means the path is absent from the document; every
    /// operator except `$exists` then sees JSON null.
    pub fn matches(&self, field: Option<&Value>) -> bool {
        let value = field.unwrap_or(&NULL);
        match self {
            Predicate::Value(expected) => value == expected,
            Predicate::Eq(expected) => values_equal(value, expected),
            Predicate::Ne(expected) => !values_equal(value, expected),
            Predicate::Gt(expected) => {
                matches!(compare_values(value, expected), Some(Ordering::Greater))
            }
            Predicate::Gte(expected) => matches!(
                compare_values(value, expected),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Predicate::Lt(expected) => {
                matches!(compare_values(value, expected), Some(Ordering::Less))
            }
            Predicate::Lte(expected) => matches!(
                compare_values(value, expected),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Predicate::In(items) => items.iter().any(|item| values_equal(value, item)),
            Predicate::Nin(items) => !items.iter().any(|item| values_equal(value, item)),
            Predicate::Exists(expected) => field.is_some() == *expected,
            Predicate::Regex { pattern, options } => value
                .as_str()
                .map(|s| regex_guard::safe_match(pattern, options, s))
                .unwrap_or(false),
            Predicate::Not(inner) => !inner.matches(field),
            Predicate::All(predicates) => predicates.iter().all(|p| p.matches(field)),
        }
    }

    fn canonicalize(&self) -> Value {
        match self {
            Predicate::Value(v) => v.clone(),
            _ => Value::Object(self.canonical_object()),
        }
    }

    fn canonical_object(&self) -> Map<String, Value> {
        let mut obj = Map::new();
        match self {
            Predicate::Value(v) => {
                obj.insert("$eq".to_string(), v.clone());
            }
            Predicate::Eq(v) => {
                obj.insert("$eq".to_string(), v.clone());
            }
            Predicate::Ne(v) => {
                obj.insert("$ne".to_string(), v.clone());
            }
            Predicate::Gt(v) => {
                obj.insert("$gt".to_string(), v.clone());
            }
            Predicate::Gte(v) => {
                obj.insert("$gte".to_string(), v.clone());
            }
            Predicate::Lt(v) => {
                obj.insert("$lt".to_string(), v.clone());
            }
            Predicate::Lte(v) => {
                obj.insert("$lte".to_string(), v.clone());
            }
            Predicate::In(items) => {
                obj.insert("$in".to_string(), Value::Array(items.clone()));
            }
            Predicate::Nin(items) => {
                obj.insert("$nin".to_string(), Value::Array(items.clone()));
            }
            Predicate::Exists(b) => {
                obj.insert("$exists".to_string(), Value::Bool(*b));
            }
            Predicate::Regex { pattern, options } => {
                obj.insert("$regex".to_string(), Value::String(pattern.clone()));
                if !options.is_empty() {
                    obj.insert("$options".to_string(), Value::String(options.clone()));
                }
            }
            Predicate::Not(inner) => {
                obj.insert("$not".to_string(), Value::Object(inner.canonical_object()));
            }
            Predicate::All(predicates) => {
                for p in predicates {
                    obj.extend(p.canonical_object());
                }
            }
        }
        obj
    }
}

/// Resolve a dotted path against a document. Arrays end the walk.
pub fn lookup_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}
