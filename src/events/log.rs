//! Append-only bounded event log
//!
//! Events live in memory (a deque ordered by sequence) and on disk as
//! events.jsonl. Appends go straight to the file with an fsync before
//! the in-memory state changes; pruning rewrites the file atomically.
//!
//! Sequence numbers start at 1 and are assigned here and nowhere else.
//! The caller serializes appends, which keeps the sequence gapless.

use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::StoreResult;
use crate::store::meta::MetaStore;
use crate::types::{ChangeEvent, EventBatch, EventDraft};
use crate::utils::atomic::atomic_write_with;

#[derive(Debug)]
pub struct EventLog {
    path: PathBuf,
    events: VecDeque<ChangeEvent>,
    next_sequence: u64,
    /// Lowest sequence still answerable. Zero until the first prune.
    min_available: u64,
}

impl EventLog {
    /// Load retained events from disk and recover the sequence counter.
    ///
    /// The counter resumes from whichever is further along: the meta
    /// entry or the highest sequence found in the file. Retention may
    /// have emptied the file while the counter keeps climbing.
    pub fn load<P: AsRef<Path>>(path: P, meta: &MetaStore) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut events = VecDeque::new();

        if path.exists() {
            let content = fs::read_to_string(&path)?;
            for (idx, line) in content.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match ChangeEvent::from_json_line(line) {
                    Ok(event) => events.push_back(event),
                    Err(e) => {
                        tracing::warn!(line = idx + 1, error = %e, "skipping unreadable event line");
                    }
                }
            }
        }

        let max_seen = events.iter().map(|e| e.sequence).max().unwrap_or(0);
        let next_sequence = meta.sequence().max(max_seen) + 1;
        let min_available = meta.min_available_sequence();

        tracing::debug!(
            retained = events.len(),
            next_sequence,
            min_available,
            "event log loaded"
        );

        Ok(EventLog {
            path,
            events,
            next_sequence,
            min_available,
        })
    }

    /// Commit a draft: assign the next sequence, persist, then prune
    /// anything the retention ceiling no longer covers.
    ///
    /// The sequence counter only advances after the file append
    /// succeeds, so a failed append never burns a number.
    pub fn append(
        &mut self,
        draft: EventDraft,
        ceiling: u64,
        meta: &mut MetaStore,
    ) -> StoreResult<ChangeEvent> {
        let sequence = self.next_sequence;
        let event = ChangeEvent::from_draft(draft, sequence);

        self.append_line(&event)?;
        self.next_sequence += 1;
        self.events.push_back(event.clone());
        meta.set_sequence(sequence);

        self.prune(sequence, ceiling, meta)?;
        meta.persist()?;

        Ok(event)
    }

    /// Re-apply the retention ceiling to a freshly reloaded log.
    ///
    /// A ceiling lowered after the last append only takes effect on
    /// the next one, so the file on disk can still exceed it. Returns
    /// the number of events pruned.
    pub fn enforce_ceiling(&mut self, ceiling: u64, meta: &mut MetaStore) -> StoreResult<usize> {
        let last = self.next_sequence.saturating_sub(1);
        let before = self.events.len();
        let min_before = self.min_available;

        self.prune(last, ceiling, meta)?;

        let removed = before - self.events.len();
        if removed > 0 || self.min_available > min_before {
            meta.persist()?;
        }
        Ok(removed)
    }

    fn append_line(&self, event: &ChangeEvent) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", event.to_json_line()?)?;
        // Durable before the mutation is acknowledged
        file.sync_all()?;
        Ok(())
    }

    /// Drop events at or below `sequence - ceiling` and advance the
    /// retention floor.
    fn prune(&mut self, sequence: u64, ceiling: u64, meta: &mut MetaStore) -> StoreResult<()> {
        let threshold = sequence.saturating_sub(ceiling);
        if threshold == 0 {
            return Ok(());
        }

        let mut removed = 0usize;
        while self
            .events
            .front()
            .map(|e| e.sequence <= threshold)
            .unwrap_or(false)
        {
            self.events.pop_front();
            removed += 1;
        }

        let new_min = threshold + 1;
        if new_min > self.min_available {
            self.min_available = new_min;
            meta.set_min_available_sequence(new_min);
        }

        if removed > 0 {
            self.rewrite()?;
            tracing::debug!(removed, min_available = self.min_available, "pruned event log");
        }

        Ok(())
    }

    fn rewrite(&self) -> StoreResult<()> {
        atomic_write_with(&self.path, |file| {
            for event in &self.events {
                let line = event
                    .to_json_line()
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                writeln!(file, "{}", line)?;
            }
            Ok(())
        })?;
        Ok(())
    }

    /// Cursor read: events with sequence strictly greater than `since`,
    /// oldest first, optionally scoped to one model.
    ///
    /// `gap_detected` fires when `since` falls below the retention
    /// floor, meaning pruning discarded events this consumer never saw.
    pub fn query(&self, since: u64, limit: usize, model: Option<&str>) -> EventBatch {
        let events: Vec<ChangeEvent> = self
            .events
            .iter()
            .filter(|e| e.sequence > since)
            .filter(|e| model.map_or(true, |m| e.model == m))
            .take(limit)
            .cloned()
            .collect();

        EventBatch {
            events,
            gap_detected: self.min_available > 0 && since < self.min_available,
            min_available_sequence: self.min_available,
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Last assigned sequence, zero before the first event.
    pub fn last_sequence(&self) -> u64 {
        self.next_sequence - 1
    }

    pub fn min_available_sequence(&self) -> u64 {
        self.min_available
    }
}
