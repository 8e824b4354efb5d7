//! Webhook sink delivery
//!
//! One HTTP POST per event with bounded retries. Response handling:
//!
//! - 2xx: delivered
//! - 4xx: permanent rejection, no retry, straight to the dead letters
//! - 5xx or transport error: retryable, exponential backoff
//!
//! The backoff doubles per attempt (base, 2x, 4x, ...) and also runs
//! after the final failed attempt before the event is dead-lettered.
//! With the default policy that is 1s + 2s + 4s, roughly seven seconds
//! worst case.

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::config::RetryPolicy;
use crate::dispatch::dead_letter::DeadLetterStore;
use crate::dispatch::signature::{self, SIGNATURE_HEADER};
use crate::types::{ChangeEvent, FailedDelivery};
use crate::utils::time::now_millis;

#[derive(Debug, PartialEq, Eq)]
enum Disposition {
    Success,
    Permanent,
    Retryable,
}

fn classify_status(status: u16) -> Disposition {
    if (200..300).contains(&status) {
        Disposition::Success
    } else if (400..500).contains(&status) {
        Disposition::Permanent
    } else {
        Disposition::Retryable
    }
}

enum AttemptError {
    Permanent(String),
    Retryable(String),
}

/// Deliver one event to one webhook, retrying as the policy allows.
///
/// Never returns an error: terminal failures become dead letters and
/// log lines. At-least-once is the contract, not exactly-once.
#[allow(clippy::too_many_arguments)]
pub async fn deliver(
    client: &reqwest::Client,
    retry: &RetryPolicy,
    event: &ChangeEvent,
    url: &str,
    secret: Option<&str>,
    headers: Option<&BTreeMap<String, String>>,
    dead_letters: &DeadLetterStore,
) {
    let body = match event.to_json_line() {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(error = %e, event_id = %event.id, "event failed to serialize for webhook");
            return;
        }
    };
    // Signature covers the exact bytes sent
    let sig = secret.map(|s| signature::sign(s, body.as_bytes()));

    let mut attempts = 0;
    let mut last_error = String::new();
    let mut last_attempt_at = now_millis();

    for attempt in 1..=retry.max_attempts.max(1) {
        attempts = attempt;
        let outcome = post_once(client, url, headers, sig.as_deref(), &body).await;
        last_attempt_at = now_millis();

        match outcome {
            Ok(status) => {
                tracing::debug!(url, status, sequence = event.sequence, "webhook delivered");
                return;
            }
            Err(AttemptError::Permanent(message)) => {
                tracing::warn!(url, sequence = event.sequence, error = %message, "webhook rejected permanently");
                last_error = message;
                break;
            }
            Err(AttemptError::Retryable(message)) => {
                tracing::warn!(url, attempt, sequence = event.sequence, error = %message, "webhook attempt failed");
                last_error = message;
                tokio::time::sleep(retry.backoff_delay(attempt)).await;
            }
        }
    }

    let failure = FailedDelivery {
        id: Uuid::new_v4().to_string(),
        event: event.clone(),
        sink_type: "webhook".to_string(),
        sink_url: Some(url.to_string()),
        error: last_error.clone(),
        attempts,
        created_at: now_millis(),
        last_attempt_at,
    };
    dead_letters.record(failure);
    tracing::error!(url, sequence = event.sequence, attempts, error = %last_error, "webhook delivery dead-lettered");
}

async fn post_once(
    client: &reqwest::Client,
    url: &str,
    headers: Option<&BTreeMap<String, String>>,
    signature: Option<&str>,
    body: &str,
) -> Result<u16, AttemptError> {
    let mut request = client
        .post(url)
        .header("content-type", "application/json");

    if let Some(extra) = headers {
        for (name, value) in extra {
            request = request.header(name.as_str(), value.as_str());
        }
    }
    if let Some(sig) = signature {
        request = request.header(SIGNATURE_HEADER, sig);
    }

    let response = match request.body(body.to_string()).send().await {
        Ok(response) => response,
        Err(e) => return Err(AttemptError::Retryable(format!("transport: {}", e))),
    };

    let status = response.status().as_u16();
    match classify_status(status) {
        Disposition::Success => Ok(status),
        Disposition::Permanent => Err(AttemptError::Permanent(format!("status {}", status))),
        Disposition::Retryable => Err(AttemptError::Retryable(format!("status {}", status))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(classify_status(200), Disposition::Success);
        assert_eq!(classify_status(204), Disposition::Success);
        assert_eq!(classify_status(299), Disposition::Success);
        assert_eq!(classify_status(400), Disposition::Permanent);
        assert_eq!(classify_status(404), Disposition::Permanent);
        assert_eq!(classify_status(429), Disposition::Permanent);
        assert_eq!(classify_status(499), Disposition::Permanent);
        assert_eq!(classify_status(500), Disposition::Retryable);
        assert_eq!(classify_status(503), Disposition::Retryable);
        // Redirect responses that survive the client policy are not
        // client errors; let them retry
        assert_eq!(classify_status(301), Disposition::Retryable);
    }
}
