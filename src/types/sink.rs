//! Sink configuration and dead-letter types
//!
//! Sinks are external destinations that receive every committed change
//! event. The active set is configured at runtime via `configureEvents`
//! and persisted in the meta store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::event::ChangeEvent;

/// One configured delivery destination.
///
/// The `type` field on the wire selects the variant:
/// `{"type": "webhook", "url": "...", "secret": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SinkConfig {
    /// HTTP POST per event with retries, signing and dead-lettering.
    #[serde(rename_all = "camelCase")]
    Webhook {
        url: String,
        /// HMAC-SHA256 signing key. No secret, no signature header.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        secret: Option<String>,
        /// Extra request headers sent on every delivery.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        headers: Option<BTreeMap<String, String>>,
    },

    /// Fire-and-forget hand-off to the in-process queue binding.
    Queue,

    /// Fire-and-forget HTTP POST to a sibling store instance.
    #[serde(rename_all = "camelCase")]
    PeerStore { url: String },

    /// Accepted for configuration compatibility; delivery is a no-op.
    Analytics,
}

impl SinkConfig {
    /// Wire name of the variant, used in logs and dead letters.
    pub fn kind(&self) -> &'static str {
        match self {
            SinkConfig::Webhook { .. } => "webhook",
            SinkConfig::Queue => "queue",
            SinkConfig::PeerStore { .. } => "peerStore",
            SinkConfig::Analytics => "analytics",
        }
    }

    /// Destination URL for sinks that have one.
    pub fn url(&self) -> Option<&str> {
        match self {
            SinkConfig::Webhook { url, .. } => Some(url),
            SinkConfig::PeerStore { url } => Some(url),
            _ => None,
        }
    }
}

/// Record of an event a webhook sink permanently failed to deliver.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FailedDelivery {
    pub id: String,

    /// The undelivered event, in full.
    pub event: ChangeEvent,

    pub sink_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sink_url: Option<String>,

    /// Error from the final attempt.
    pub error: String,

    /// Attempts actually made before giving up.
    pub attempts: u32,

    /// Unix millis when the record was written.
    pub created_at: i64,

    /// Unix millis of the final attempt.
    pub last_attempt_at: i64,
}

impl FailedDelivery {
    /// Serialize to a single JSONL line.
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse from a JSONL line.
    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_webhook_config_round_trip() {
        let value = json!({
            "type": "webhook",
            "url": "https://example.com/hook",
            "secret": "s3cret"
        });

        let sink: SinkConfig = serde_json::from_value(value.clone()).unwrap();
        match &sink {
            SinkConfig::Webhook { url, secret, headers } => {
                assert_eq!(url, "https://example.com/hook");
                assert_eq!(secret.as_deref(), Some("s3cret"));
                assert!(headers.is_none());
            }
            other => panic!("expected webhook, got {:?}", other),
        }

        assert_eq!(serde_json::to_value(&sink).unwrap(), value);
    }

    #[test]
    fn test_unit_variants() {
        let queue: SinkConfig = serde_json::from_value(json!({"type": "queue"})).unwrap();
        assert_eq!(queue, SinkConfig::Queue);
        assert_eq!(queue.kind(), "queue");

        let analytics: SinkConfig =
            serde_json::from_value(json!({"type": "analytics"})).unwrap();
        assert_eq!(analytics, SinkConfig::Analytics);
        assert!(analytics.url().is_none());
    }

    #[test]
    fn test_peer_store_tag_is_camel_case() {
        let sink = SinkConfig::PeerStore {
            url: "http://peer:8080/rpc".to_string(),
        };
        let value = serde_json::to_value(&sink).unwrap();
        assert_eq!(value["type"], "peerStore");
        assert_eq!(sink.kind(), "peerStore");
    }

    #[test]
    fn test_unknown_sink_type_rejected() {
        let result: Result<SinkConfig, _> =
            serde_json::from_value(json!({"type": "carrier-pigeon"}));
        assert!(result.is_err());
    }
}
