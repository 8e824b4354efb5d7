//! Tenant metadata file
//!
//! Small key-value document (meta.json) holding everything that is
//! neither a document nor an event: the schema blob and its version,
//! the sequence counter, the sink configuration and the retention
//! settings. Rewritten atomically as a whole on every change.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::StoreResult;
use crate::types::SinkConfig;
use crate::utils::atomic::atomic_write;

const KEY_SCHEMA: &str = "schema";
const KEY_SCHEMA_VERSION: &str = "schemaVersion";
const KEY_SEQUENCE: &str = "sequence";
const KEY_MIN_AVAILABLE: &str = "minAvailableSequence";
const KEY_SINKS: &str = "sinks";
const KEY_MAX_EVENTS: &str = "maxEvents";

#[derive(Debug)]
pub struct MetaStore {
    path: PathBuf,
    entries: Map<String, Value>,
}

impl MetaStore {
    /// Load from disk; a missing file starts empty.
    pub fn load<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<Value>(&content) {
                Ok(Value::Object(map)) => map,
                Ok(_) | Err(_) => {
                    tracing::warn!(path = %path.display(), "meta file unreadable, starting empty");
                    Map::new()
                }
            }
        } else {
            Map::new()
        };
        Ok(MetaStore { path, entries })
    }

    /// Write the whole document back atomically.
    pub fn persist(&self) -> StoreResult<()> {
        let content = serde_json::to_string_pretty(&Value::Object(self.entries.clone()))?;
        atomic_write(&self.path, &content)?;
        Ok(())
    }

    fn get_u64(&self, key: &str) -> u64 {
        self.entries.get(key).and_then(Value::as_u64).unwrap_or(0)
    }

    fn set_u64(&mut self, key: &str, value: u64) {
        self.entries.insert(key.to_string(), Value::from(value));
    }

    /// Last sequence number handed out. Zero before the first event.
    pub fn sequence(&self) -> u64 {
        self.get_u64(KEY_SEQUENCE)
    }

    pub fn set_sequence(&mut self, sequence: u64) {
        self.set_u64(KEY_SEQUENCE, sequence);
    }

    /// Lowest sequence still retained. Zero until the first prune.
    pub fn min_available_sequence(&self) -> u64 {
        self.get_u64(KEY_MIN_AVAILABLE)
    }

    pub fn set_min_available_sequence(&mut self, sequence: u64) {
        self.set_u64(KEY_MIN_AVAILABLE, sequence);
    }

    /// Runtime retention override from `configureMaxEvents`, if any.
    pub fn max_events(&self) -> Option<u64> {
        self.entries.get(KEY_MAX_EVENTS).and_then(Value::as_u64)
    }

    pub fn set_max_events(&mut self, max_events: u64) {
        self.set_u64(KEY_MAX_EVENTS, max_events);
    }

    pub fn schema(&self) -> Option<&Value> {
        self.entries.get(KEY_SCHEMA)
    }

    /// Replace the schema blob and bump its version. Returns the new
    /// version.
    pub fn set_schema(&mut self, schema: Value) -> u64 {
        let version = self.schema_version() + 1;
        self.entries.insert(KEY_SCHEMA.to_string(), schema);
        self.set_u64(KEY_SCHEMA_VERSION, version);
        version
    }

    pub fn schema_version(&self) -> u64 {
        self.get_u64(KEY_SCHEMA_VERSION)
    }

    /// Configured sinks. Unparsable stored values read as none.
    pub fn sinks(&self) -> Vec<SinkConfig> {
        match self.entries.get(KEY_SINKS) {
            Some(value) => match serde_json::from_value(value.clone()) {
                Ok(sinks) => sinks,
                Err(e) => {
                    tracing::warn!(error = %e, "stored sink configuration unreadable");
                    Vec::new()
                }
            },
            None => Vec::new(),
        }
    }

    pub fn set_sinks(&mut self, sinks: &[SinkConfig]) -> StoreResult<()> {
        let value = serde_json::to_value(sinks)?;
        self.entries.insert(KEY_SINKS.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_when_missing() {
        let dir = TempDir::new().unwrap();
        let meta = MetaStore::load(dir.path().join("meta.json")).unwrap();
        assert_eq!(meta.sequence(), 0);
        assert_eq!(meta.min_available_sequence(), 0);
        assert_eq!(meta.schema_version(), 0);
        assert!(meta.schema().is_none());
        assert!(meta.sinks().is_empty());
        assert!(meta.max_events().is_none());
    }

    #[test]
    fn test_persist_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("meta.json");

        let mut meta = MetaStore::load(&path).unwrap();
        meta.set_sequence(17);
        meta.set_min_available_sequence(8);
        meta.set_max_events(500);
        let version = meta.set_schema(serde_json::json!({"task": {"fields": {}}}));
        assert_eq!(version, 1);
        meta.set_sinks(&[SinkConfig::Queue]).unwrap();
        meta.persist().unwrap();

        let reloaded = MetaStore::load(&path).unwrap();
        assert_eq!(reloaded.sequence(), 17);
        assert_eq!(reloaded.min_available_sequence(), 8);
        assert_eq!(reloaded.max_events(), Some(500));
        assert_eq!(reloaded.schema_version(), 1);
        assert_eq!(reloaded.sinks(), vec![SinkConfig::Queue]);
    }

    #[test]
    fn test_schema_version_increments() {
        let dir = TempDir::new().unwrap();
        let mut meta = MetaStore::load(dir.path().join("meta.json")).unwrap();
        assert_eq!(meta.set_schema(serde_json::json!({"a": 1})), 1);
        assert_eq!(meta.set_schema(serde_json::json!({"a": 2})), 2);
        assert_eq!(meta.schema_version(), 2);
    }

    #[test]
    fn test_corrupt_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("meta.json");
        std::fs::write(&path, "not json at all {").unwrap();

        let meta = MetaStore::load(&path).unwrap();
        assert_eq!(meta.sequence(), 0);
    }
}
