//! Sink dispatcher
//!
//! Fans committed events out to the configured sinks. Each sink is
//! handled independently: webhooks get the full retry and dead-letter
//! treatment, queue and peer-store sinks are fire-and-forget, the
//! analytics sink is accepted but inert.
//!
//! Dispatch runs after the store lock is released; the caller awaits
//! it so mutation latency includes delivery, but other operations
//! proceed meanwhile.

pub mod dead_letter;
pub mod signature;
pub mod webhook;

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::RetryPolicy;
use crate::error::StoreResult;
use crate::types::{ChangeEvent, SinkConfig};

pub use dead_letter::DeadLetterStore;

#[derive(Debug)]
pub struct Dispatcher {
    client: reqwest::Client,
    retry: RetryPolicy,
    dead_letters: Arc<DeadLetterStore>,
    /// In-process binding for queue sinks, if the embedder provided
    /// one.
    queue: Option<mpsc::UnboundedSender<ChangeEvent>>,
}

impl Dispatcher {
    pub fn new(retry: RetryPolicy, dead_letters: Arc<DeadLetterStore>) -> StoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(retry.attempt_timeout)
            .build()?;
        Ok(Dispatcher {
            client,
            retry,
            dead_letters,
            queue: None,
        })
    }

    pub fn bind_queue(&mut self, queue: mpsc::UnboundedSender<ChangeEvent>) {
        self.queue = Some(queue);
    }

    /// Deliver one event to every configured sink.
    ///
    /// Sinks run concurrently; one sink retrying or failing never
    /// blocks the others. Resolves once every sink reached a terminal
    /// outcome: delivered, dead-lettered or logged.
    pub async fn dispatch(&self, event: &ChangeEvent, sinks: &[SinkConfig]) {
        if sinks.is_empty() {
            return;
        }
        let deliveries = sinks.iter().map(|sink| self.deliver(event, sink));
        futures::future::join_all(deliveries).await;
    }

    async fn deliver(&self, event: &ChangeEvent, sink: &SinkConfig) {
        match sink {
            SinkConfig::Webhook {
                url,
                secret,
                headers,
            } => {
                webhook::deliver(
                    &self.client,
                    &self.retry,
                    event,
                    url,
                    secret.as_deref(),
                    headers.as_ref(),
                    &self.dead_letters,
                )
                .await;
            }
            SinkConfig::Queue => self.deliver_queue(event),
            SinkConfig::PeerStore { url } => self.deliver_peer(event, url).await,
            SinkConfig::Analytics => {
                tracing::debug!(sequence = event.sequence, "analytics sink no-op");
            }
        }
    }

    fn deliver_queue(&self, event: &ChangeEvent) {
        match &self.queue {
            Some(queue) => {
                if queue.send(event.clone()).is_err() {
                    tracing::warn!(
                        sequence = event.sequence,
                        "queue sink receiver dropped, event discarded"
                    );
                }
            }
            None => {
                tracing::debug!(
                    sequence = event.sequence,
                    "queue sink without binding, event discarded"
                );
            }
        }
    }

    /// Single attempt; peer failures are logged, never dead-lettered.
    async fn deliver_peer(&self, event: &ChangeEvent, url: &str) {
        match self.client.post(url).json(event).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(url, sequence = event.sequence, "peer store notified");
            }
            Ok(response) => {
                tracing::warn!(
                    url,
                    status = response.status().as_u16(),
                    sequence = event.sequence,
                    "peer store rejected event"
                );
            }
            Err(e) => {
                tracing::warn!(url, error = %e, sequence = event.sequence, "peer store unreachable");
            }
        }
    }

    pub fn dead_letters(&self) -> &DeadLetterStore {
        &self.dead_letters
    }
}
