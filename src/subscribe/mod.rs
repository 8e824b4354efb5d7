//! Live change subscriptions
//!
//! Registry of push subscriptions fed by the store on every committed
//! event. Each subscription carries an optional model filter and an
//! unbounded channel to its transport (the WebSocket handler in
//! [`handler`]). Events are serialized once per publish; subscriptions
//! whose receiving end is gone are removed when a send to them fails,
//! there is no background sweep.

pub mod handler;

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::types::ChangeEvent;

/// One registered subscription.
#[derive(Debug)]
struct Subscription {
    id: u64,
    model: Option<String>,
    tx: mpsc::UnboundedSender<String>,
}

impl Subscription {
    fn matches(&self, event: &ChangeEvent) -> bool {
        match &self.model {
            Some(model) => *model == event.model,
            None => true,
        }
    }
}

/// Fan-out point for live change notifications.
#[derive(Debug, Default)]
pub struct Broadcaster {
    subscriptions: Mutex<Vec<Subscription>>,
    next_id: AtomicU64,
}

impl Broadcaster {
    pub fn new() -> Self {
        Broadcaster {
            subscriptions: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a subscription, optionally restricted to one model.
    /// Returns the subscription id and the receiving end of its
    /// channel.
    pub fn subscribe(&self, model: Option<String>) -> (u64, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscriptions
            .lock()
            .push(Subscription { id, model, tx });
        tracing::debug!(subscription = id, "subscription opened");
        (id, rx)
    }

    /// Replace the model filter of an existing subscription. A `None`
    /// model widens it back to all models.
    pub fn retarget(&self, id: u64, model: Option<String>) {
        let mut subscriptions = self.subscriptions.lock();
        if let Some(subscription) = subscriptions.iter_mut().find(|s| s.id == id) {
            subscription.model = model;
        }
    }

    pub fn unsubscribe(&self, id: u64) {
        self.subscriptions.lock().retain(|s| s.id != id);
        tracing::debug!(subscription = id, "subscription closed");
    }

    /// Push an event to every matching subscription.
    ///
    /// Subscriptions that fail the send are dropped from the registry;
    /// non-matching subscriptions are untouched.
    pub fn publish(&self, event: &ChangeEvent) {
        let mut subscriptions = self.subscriptions.lock();
        if subscriptions.is_empty() {
            return;
        }
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(sequence = event.sequence, error = %e, "failed to serialize event for push");
                return;
            }
        };
        subscriptions.retain(|subscription| {
            if !subscription.matches(event) {
                return true;
            }
            subscription.tx.send(payload.clone()).is_ok()
        });
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }
}

/// Control messages a client can send over the push channel.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Re-target the subscription's model filter. The `filter` member
    /// is accepted on the wire but not applied to pushed events.
    Subscribe {
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        filter: Option<serde_json::Value>,
    },
    /// Heartbeat; answered with `{"type":"pong"}`.
    Ping,
}
