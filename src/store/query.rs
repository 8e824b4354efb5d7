//! List, search and count over the document table
//!
//! All three share one pipeline: type and soft-delete scope, then the
//! optional predicate filter, then projection, lexicographic sort and
//! the offset/limit slice. `total` counts matches before pagination.
//!
//! Scans over large models run on the rayon pool; small ones stay on
//! the calling thread.

use std::cmp::Ordering;

use rayon::prelude::*;
use serde_json::{Map, Value};

use crate::error::{StoreError, StoreResult};
use crate::filter::Filter;
use crate::store::documents::DocumentTable;
use crate::types::{Document, DocumentPage};

/// Scans over more documents than this fan out to the rayon pool.
pub const PARALLEL_SCAN_THRESHOLD: usize = 1000;

/// Default page size when the caller does not pass a limit.
pub const DEFAULT_PAGE_LIMIT: usize = 100;

/// One sort key with its direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

/// Parsed options shared by `list` and `search`.
#[derive(Debug, Clone)]
pub struct ListOptions {
    pub filter: Option<Filter>,
    /// Applied left to right; later keys break ties.
    pub order: Vec<SortKey>,
    /// Payload fields to keep. Envelope fields are always returned.
    pub select: Option<Vec<String>>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for ListOptions {
    fn default() -> Self {
        ListOptions {
            filter: None,
            order: Vec::new(),
            select: None,
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

/// Parse an order object like `{"priority": -1, "title": "asc"}` into
/// sort keys, preserving key order for tie-breaking.
pub fn parse_order(value: &Value) -> StoreResult<Vec<SortKey>> {
    let obj = value
        .as_object()
        .ok_or_else(|| StoreError::validation("order must be an object"))?;

    let mut keys = Vec::with_capacity(obj.len());
    for (field, direction) in obj {
        let descending = match direction {
            Value::Number(n) => n.as_f64().map(|f| f < 0.0).unwrap_or(false),
            Value::String(s) => match s.to_ascii_lowercase().as_str() {
                "desc" | "descending" | "-1" => true,
                "asc" | "ascending" | "1" => false,
                other => {
                    return Err(StoreError::validation(format!(
                        "invalid sort direction '{}'",
                        other
                    )))
                }
            },
            _ => {
                return Err(StoreError::validation(
                    "sort direction must be 1, -1, 'asc' or 'desc'",
                ))
            }
        };
        keys.push(SortKey {
            field: field.clone(),
            descending,
        });
    }
    Ok(keys)
}

/// Page through one model's live documents.
pub fn list(table: &DocumentTable, model: &str, options: &ListOptions) -> DocumentPage {
    let scoped = table.scan(model);
    let matched = apply_filter(scoped, options.filter.as_ref());
    paginate(matched, options)
}

/// Case-insensitive substring search across payload values, then the
/// same pipeline as `list`.
pub fn search(table: &DocumentTable, model: &str, text: &str, options: &ListOptions) -> DocumentPage {
    let needle = text.to_lowercase();
    let scoped = table.scan(model);

    let candidates = if needle.is_empty() {
        scoped
    } else if scoped.len() > PARALLEL_SCAN_THRESHOLD {
        scoped
            .into_par_iter()
            .filter(|doc| matches_text(doc, &needle))
            .collect()
    } else {
        scoped
            .into_iter()
            .filter(|doc| matches_text(doc, &needle))
            .collect()
    };

    let matched = apply_filter(candidates, options.filter.as_ref());
    paginate(matched, options)
}

/// Matches after filtering, no pagination.
pub fn count(table: &DocumentTable, model: &str, filter: Option<&Filter>) -> usize {
    apply_filter(table.scan(model), filter).len()
}

fn apply_filter<'a>(docs: Vec<&'a Document>, filter: Option<&Filter>) -> Vec<&'a Document> {
    let filter = match filter {
        Some(f) => f,
        None => return docs,
    };

    if docs.len() > PARALLEL_SCAN_THRESHOLD {
        docs.into_par_iter()
            .filter(|doc| matches_doc(filter, doc))
            .collect()
    } else {
        docs.into_iter()
            .filter(|doc| matches_doc(filter, doc))
            .collect()
    }
}

fn matches_doc(filter: &Filter, doc: &Document) -> bool {
    // Filters see the wire form, envelope included
    serde_json::to_value(doc)
        .map(|value| filter.matches(&value))
        .unwrap_or(false)
}

fn matches_text(doc: &Document, needle: &str) -> bool {
    // Cheap coarse gate over the serialized payload first
    if let Ok(raw) = serde_json::to_string(&doc.payload) {
        if !raw.to_lowercase().contains(needle) {
            return false;
        }
    }
    doc.payload.values().any(|value| value_contains(value, needle))
}

fn value_contains(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(s) => s.to_lowercase().contains(needle),
        Value::Number(n) => n.to_string().contains(needle),
        Value::Bool(b) => b.to_string().contains(needle),
        Value::Null => false,
        Value::Array(items) => items.iter().any(|item| value_contains(item, needle)),
        Value::Object(map) => map.values().any(|v| value_contains(v, needle)),
    }
}

fn paginate(matched: Vec<&Document>, options: &ListOptions) -> DocumentPage {
    let total = matched.len();

    let mut projected: Vec<Document> = matched
        .into_iter()
        .map(|doc| project(doc, options.select.as_deref()))
        .collect();

    if !options.order.is_empty() {
        sort_documents(&mut projected, &options.order);
    }

    let documents: Vec<Document> = projected
        .into_iter()
        .skip(options.offset)
        .take(options.limit)
        .collect();
    let has_more = options.offset + documents.len() < total;

    DocumentPage {
        documents,
        total,
        has_more,
    }
}

fn project(doc: &Document, select: Option<&[String]>) -> Document {
    let mut out = doc.clone();
    if let Some(fields) = select {
        let kept: Map<String, Value> = doc
            .payload
            .iter()
            .filter(|(key, _)| fields.iter().any(|f| f == *key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        out.payload = kept;
    }
    out
}

fn sort_documents(docs: &mut [Document], order: &[SortKey]) {
    docs.sort_by(|a, b| {
        for key in order {
            let sa = sort_string(a, &key.field);
            let sb = sort_string(b, &key.field);
            let ord = if key.descending {
                sb.cmp(&sa)
            } else {
                sa.cmp(&sb)
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

/// String form a sort key compares by. Numbers sort by their string
/// form too; absent fields sort first.
fn sort_string(doc: &Document, field: &str) -> String {
    match field {
        "id" => doc.id.clone(),
        "type" => doc.model.clone(),
        "version" => doc.version.to_string(),
        "createdAt" => doc.created_at.to_string(),
        "updatedAt" => doc.updated_at.to_string(),
        _ => match doc.payload.get(field) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        },
    }
}
