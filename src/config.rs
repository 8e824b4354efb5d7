//! Store configuration: data directory layout, retention defaults and
//! the webhook retry policy.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default ceiling on retained change events.
pub const DEFAULT_MAX_EVENTS: u64 = 10_000;

/// Lowest retention ceiling `configureMaxEvents` accepts.
pub const MIN_EVENT_RETENTION: u64 = 100;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "DOCFLOW_DATA_DIR";

/// Retry behaviour for webhook sink delivery.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per event, first try included.
    pub max_attempts: u32,
    /// Delay after the first retryable failure; doubles per attempt.
    pub base_delay: Duration,
    /// Per-attempt HTTP timeout.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Backoff before the attempt following `attempt` (1-based):
    /// `base_delay * 2^(attempt - 1)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

/// Configuration for a [`Store`](crate::store::Store) instance.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directory holding documents, events, meta and dead letters.
    pub data_dir: PathBuf,
    /// Retention ceiling used until `configureMaxEvents` overrides it.
    pub max_events: u64,
    pub retry: RetryPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            data_dir: PathBuf::from("data"),
            max_events: DEFAULT_MAX_EVENTS,
            retry: RetryPolicy::default(),
        }
    }
}

impl StoreConfig {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        StoreConfig {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Reads `DOCFLOW_DATA_DIR`, falling back to `./data`.
    pub fn from_env() -> Self {
        match env::var(DATA_DIR_ENV) {
            Ok(dir) if !dir.trim().is_empty() => StoreConfig::new(dir),
            _ => StoreConfig::default(),
        }
    }

    pub fn with_max_events(mut self, max_events: u64) -> Self {
        self.max_events = max_events;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn documents_path(&self) -> PathBuf {
        self.data_dir.join("documents.jsonl")
    }

    pub fn events_path(&self) -> PathBuf {
        self.data_dir.join("events.jsonl")
    }

    pub fn meta_path(&self) -> PathBuf {
        self.data_dir.join("meta.json")
    }

    pub fn dead_letter_path(&self) -> PathBuf {
        self.data_dir.join("dead_letter.jsonl")
    }
}
