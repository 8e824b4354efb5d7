//! Change event types for the append-only log
//!
//! Every successful mutation appends exactly one immutable event.
//! Events carry before/after images so consumers can rebuild state
//! without reading the store.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::utils::time::now_millis;

/// Mutation kind that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Update => write!(f, "update"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

/// One committed change, as stored in the log and handed to sinks and
/// live subscribers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// Random identifier, distinct from the sequence number.
    pub id: String,

    /// Position in the tenant-wide total order. Starts at 1, gapless
    /// across the retained window.
    pub sequence: u64,

    /// Unix millis at commit time.
    pub timestamp: i64,

    pub operation: Operation,

    /// Type name of the affected document.
    pub model: String,

    pub document_id: String,

    /// Document image before the mutation. Absent for creates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,

    /// Document image after the mutation. Absent for deletes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,

    /// User who triggered the mutation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Correlation id of the originating request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ChangeEvent {
    /// Materialize a draft at the given sequence number, stamping id
    /// and timestamp.
    pub fn from_draft(draft: EventDraft, sequence: u64) -> Self {
        ChangeEvent {
            id: Uuid::new_v4().to_string(),
            sequence,
            timestamp: now_millis(),
            operation: draft.operation,
            model: draft.model,
            document_id: draft.document_id,
            before: draft.before,
            after: draft.after,
            user_id: draft.user_id,
            request_id: draft.request_id,
        }
    }

    /// Serialize event to JSON string (for JSONL)
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize event from JSON string
    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

/// An event minus the fields only the log may assign: id, sequence and
/// timestamp.
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub operation: Operation,
    pub model: String,
    pub document_id: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub user_id: Option<String>,
    pub request_id: Option<String>,
}

/// Result of a cursor read against the log.
#[derive(Debug, Clone)]
pub struct EventBatch {
    pub events: Vec<ChangeEvent>,
    /// True when the cursor predates the oldest retained event, i.e.
    /// pruning discarded events the consumer never saw.
    pub gap_detected: bool,
    /// Lowest sequence the log can still answer from. Zero until the
    /// first prune.
    pub min_available_sequence: u64,
}
