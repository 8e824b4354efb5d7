//! Document model
//!
//! A document is a flat JSON object owned by a named type ("model").
//! The store controls the envelope fields; everything else the caller
//! sends lives in the flattened payload.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Envelope field names the store owns. Stripped from caller payloads
/// before merge so user data can never shadow them.
pub const RESERVED_FIELDS: &[&str] = &[
    "id",
    "type",
    "version",
    "createdAt",
    "updatedAt",
    "deletedAt",
    "createdBy",
    "updatedBy",
    "deletedBy",
];

/// A stored document: system envelope plus flattened user payload.
///
/// Serializes to a single flat JSON object, e.g.
/// `{"id":"t1","type":"task","version":2,"createdAt":...,"title":"x"}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,

    /// Type name ("model") this document belongs to.
    #[serde(rename = "type")]
    pub model: String,

    /// Optimistic version counter, starts at 1 and bumps on every
    /// update or delete.
    pub version: u64,

    /// Unix millis
    pub created_at: i64,

    /// Unix millis
    pub updated_at: i64,

    /// Soft-delete marker. A document with `deletedAt` set is invisible
    /// to reads but still on disk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_by: Option<String>,

    /// Caller-owned fields, kept flat next to the envelope.
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Document {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Wire representation as a JSON value.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Serialize to a single JSONL line.
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse from a JSONL line.
    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

/// Attribution for a mutation: who issued it and under which request.
#[derive(Debug, Clone, Default)]
pub struct MutationContext {
    /// Stamped into `createdBy` / `updatedBy` / `deletedBy` and onto
    /// emitted events.
    pub user_id: Option<String>,
    /// Correlation id carried onto emitted events.
    pub request_id: Option<String>,
}

impl MutationContext {
    pub fn new(user_id: Option<String>, request_id: Option<String>) -> Self {
        MutationContext {
            user_id,
            request_id,
        }
    }

    pub fn for_user(user_id: impl Into<String>) -> Self {
        MutationContext {
            user_id: Some(user_id.into()),
            request_id: None,
        }
    }
}

/// One page of a `list` or `search` result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPage {
    pub documents: Vec<Document>,
    /// Matches after filtering, before pagination.
    pub total: usize,
    pub has_more: bool,
}

/// Strip every reserved envelope key out of a caller payload.
pub fn strip_reserved(payload: &mut Map<String, Value>) {
    for key in RESERVED_FIELDS {
        payload.remove(*key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Document {
        Document {
            id: "t1".to_string(),
            model: "task".to_string(),
            version: 1,
            created_at: 1_700_000_000_000,
            updated_at: 1_700_000_000_000,
            deleted_at: None,
            created_by: Some("alice".to_string()),
            updated_by: Some("alice".to_string()),
            deleted_by: None,
            payload: json!({"title": "write docs", "done": false})
                .as_object()
                .unwrap()
                .clone(),
        }
    }

    #[test]
    fn test_serializes_flat() {
        let value = sample().to_value();
        assert_eq!(value["id"], "t1");
        assert_eq!(value["type"], "task");
        assert_eq!(value["version"], 1);
        assert_eq!(value["title"], "write docs");
        // Unset envelope fields stay off the wire
        assert!(value.get("deletedAt").is_none());
        assert!(value.get("deletedBy").is_none());
    }

    #[test]
    fn test_json_line_round_trip() {
        let doc = sample();
        let line = doc.to_json_line().unwrap();
        let parsed = Document::from_json_line(&line).unwrap();
        assert_eq!(parsed, doc);
    }

    #[test]
    fn test_unknown_keys_land_in_payload() {
        let line = r#"{"id":"x","type":"task","version":3,"createdAt":1,"updatedAt":2,"priority":9}"#;
        let doc = Document::from_json_line(line).unwrap();
        assert_eq!(doc.version, 3);
        assert_eq!(doc.payload.get("priority"), Some(&json!(9)));
    }

    #[test]
    fn test_strip_reserved() {
        let mut payload = json!({
            "id": "evil",
            "version": 99,
            "createdAt": 0,
            "title": "kept"
        })
        .as_object()
        .unwrap()
        .clone();

        strip_reserved(&mut payload);

        assert_eq!(payload.len(), 1);
        assert!(payload.contains_key("title"));
    }

    #[test]
    fn test_is_deleted() {
        let mut doc = sample();
        assert!(!doc.is_deleted());
        doc.deleted_at = Some(1_700_000_001_000);
        assert!(doc.is_deleted());
    }
}
