//! Dead-letter queue
//!
//! Webhook deliveries that fail permanently or exhaust retries land
//! here: an in-memory list mirrored to dead_letter.jsonl, append-only.
//! Records carry the full event, so operators can replay by hand.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::StoreResult;
use crate::types::FailedDelivery;

#[derive(Debug)]
pub struct DeadLetterStore {
    path: PathBuf,
    records: Mutex<Vec<FailedDelivery>>,
}

impl DeadLetterStore {
    /// Load from disk; a missing file starts empty.
    pub fn load<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut records = Vec::new();

        if path.exists() {
            let content = fs::read_to_string(&path)?;
            for (idx, line) in content.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match FailedDelivery::from_json_line(line) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        tracing::warn!(line = idx + 1, error = %e, "skipping unreadable dead letter");
                    }
                }
            }
        }

        Ok(DeadLetterStore {
            path,
            records: Mutex::new(records),
        })
    }

    /// Append a failed delivery.
    ///
    /// Runs on the delivery path after retries already failed, so a
    /// disk error here is logged rather than propagated.
    pub fn record(&self, failure: FailedDelivery) {
        if let Err(e) = self.append_line(&failure) {
            tracing::error!(error = %e, event_id = %failure.event.id, "failed to persist dead letter");
        }
        self.records.lock().push(failure);
    }

    fn append_line(&self, failure: &FailedDelivery) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", failure.to_json_line()?)?;
        file.sync_all()?;
        Ok(())
    }

    /// Most recent failures first.
    pub fn recent(&self, limit: usize) -> Vec<FailedDelivery> {
        let records = self.records.lock();
        records.iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChangeEvent, EventDraft, Operation};
    use tempfile::TempDir;

    fn failure(n: u64) -> FailedDelivery {
        let draft = EventDraft {
            operation: Operation::Create,
            model: "task".to_string(),
            document_id: format!("t{}", n),
            before: None,
            after: None,
            user_id: None,
            request_id: None,
        };
        FailedDelivery {
            id: format!("dl{}", n),
            event: ChangeEvent::from_draft(draft, n),
            sink_type: "webhook".to_string(),
            sink_url: Some("http://localhost:9/hook".to_string()),
            error: "status 500".to_string(),
            attempts: 3,
            created_at: 1_700_000_000_000 + n as i64,
            last_attempt_at: 1_700_000_000_000 + n as i64,
        }
    }

    #[test]
    fn test_record_and_recent_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = DeadLetterStore::load(dir.path().join("dead_letter.jsonl")).unwrap();

        for n in 1..=3 {
            store.record(failure(n));
        }

        assert_eq!(store.len(), 3);
        let recent = store.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, "dl3");
        assert_eq!(recent[1].id, "dl2");
    }

    #[test]
    fn test_survives_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dead_letter.jsonl");
        {
            let store = DeadLetterStore::load(&path).unwrap();
            store.record(failure(1));
            store.record(failure(2));
        }

        let store = DeadLetterStore::load(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.recent(10)[0].id, "dl2");
        assert_eq!(store.recent(10)[0].attempts, 3);
    }

    #[test]
    fn test_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = DeadLetterStore::load(dir.path().join("dead_letter.jsonl")).unwrap();
        assert!(store.is_empty());
        assert!(store.recent(10).is_empty());
    }
}
