//! Document table
//!
//! Every document across every model, indexed by (model, id) and
//! persisted as documents.jsonl. Mutations rewrite the whole file
//! atomically; at per-tenant scale the simplicity beats a write-ahead
//! scheme.
//!
//! Soft-deleted rows stay in the table and on disk. Reads skip them,
//! mutations treat them as absent.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::types::{strip_reserved, Document, MutationContext};
use crate::utils::atomic::atomic_write_with;
use crate::utils::time::now_millis;

#[derive(Debug)]
pub struct DocumentTable {
    path: PathBuf,
    /// model -> id -> document. BTreeMap keeps scans in stable
    /// id-ascending order.
    types: BTreeMap<String, BTreeMap<String, Document>>,
}

impl DocumentTable {
    /// Load from disk; a missing file starts empty.
    pub fn load<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut types: BTreeMap<String, BTreeMap<String, Document>> = BTreeMap::new();

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            for (idx, line) in content.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match Document::from_json_line(line) {
                    Ok(doc) => {
                        types
                            .entry(doc.model.clone())
                            .or_default()
                            .insert(doc.id.clone(), doc);
                    }
                    Err(e) => {
                        tracing::warn!(line = idx + 1, error = %e, "skipping unreadable document line");
                    }
                }
            }
        }

        Ok(DocumentTable { path, types })
    }

    /// Rewrite documents.jsonl from the in-memory table.
    fn persist(&self) -> StoreResult<()> {
        atomic_write_with(&self.path, |file| {
            for table in self.types.values() {
                for doc in table.values() {
                    let line = doc
                        .to_json_line()
                        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                    writeln!(file, "{}", line)?;
                }
            }
            Ok(())
        })?;
        Ok(())
    }

    /// Insert a new document.
    ///
    /// A string `id` in the payload is honored, anything else gets a
    /// fresh UUID. Reserved envelope keys are stripped from the
    /// payload. An existing id is silently replaced with a fresh
    /// version-1 row.
    pub fn create(
        &mut self,
        model: &str,
        mut payload: Map<String, Value>,
        ctx: &MutationContext,
    ) -> StoreResult<Document> {
        if model.trim().is_empty() {
            return Err(StoreError::validation("type must not be empty"));
        }

        let id = match payload.remove("id") {
            Some(Value::String(s)) if !s.is_empty() => s,
            Some(Value::String(_)) | Some(Value::Null) | None => Uuid::new_v4().to_string(),
            Some(other) => {
                return Err(StoreError::validation(format!(
                    "document id must be a string, got {}",
                    other
                )))
            }
        };
        strip_reserved(&mut payload);

        let now = now_millis();
        let doc = Document {
            id: id.clone(),
            model: model.to_string(),
            version: 1,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            created_by: ctx.user_id.clone(),
            updated_by: ctx.user_id.clone(),
            deleted_by: None,
            payload,
        };

        self.types
            .entry(model.to_string())
            .or_default()
            .insert(id, doc.clone());
        self.persist()?;

        Ok(doc)
    }

    /// Live document lookup. Soft-deleted rows read as absent.
    pub fn get(&self, model: &str, id: &str) -> Option<&Document> {
        self.types
            .get(model)
            .and_then(|table| table.get(id))
            .filter(|doc| !doc.is_deleted())
    }

    /// Shallow-merge a patch into an existing document and bump its
    /// version. Returns the before and after images.
    pub fn update(
        &mut self,
        model: &str,
        id: &str,
        mut patch: Map<String, Value>,
        ctx: &MutationContext,
    ) -> StoreResult<(Document, Document)> {
        let doc = match self.types.get_mut(model).and_then(|t| t.get_mut(id)) {
            Some(d) if !d.is_deleted() => d,
            _ => return Err(StoreError::not_found(model, id)),
        };

        let before = doc.clone();

        strip_reserved(&mut patch);
        for (key, value) in patch {
            // Null overwrites; keys are never removed by a patch
            doc.payload.insert(key, value);
        }
        doc.version += 1;
        doc.updated_at = now_millis();
        doc.updated_by = ctx.user_id.clone();

        let after = doc.clone();
        self.persist()?;

        Ok((before, after))
    }

    /// Soft-delete a document, returning its pre-delete image.
    ///
    /// Missing or already-deleted targets are a no-op and return
    /// `None`; the caller emits no event for those.
    pub fn soft_delete(
        &mut self,
        model: &str,
        id: &str,
        ctx: &MutationContext,
    ) -> StoreResult<Option<Document>> {
        let doc = match self.types.get_mut(model).and_then(|t| t.get_mut(id)) {
            Some(d) if !d.is_deleted() => d,
            _ => return Ok(None),
        };

        let before = doc.clone();

        doc.deleted_at = Some(now_millis());
        doc.deleted_by = ctx.user_id.clone();
        doc.version += 1;

        self.persist()?;

        Ok(Some(before))
    }

    /// All live documents of one model, id-ascending.
    pub fn scan(&self, model: &str) -> Vec<&Document> {
        match self.types.get(model) {
            Some(table) => table.values().filter(|d| !d.is_deleted()).collect(),
            None => Vec::new(),
        }
    }

    /// Live documents across all models.
    pub fn live_count(&self) -> usize {
        self.types
            .values()
            .map(|t| t.values().filter(|d| !d.is_deleted()).count())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn payload(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    fn open(dir: &TempDir) -> DocumentTable {
        DocumentTable::load(dir.path().join("documents.jsonl")).unwrap()
    }

    fn ctx() -> MutationContext {
        MutationContext::for_user("alice")
    }

    #[test]
    fn test_create_assigns_uuid_when_missing() {
        let dir = TempDir::new().unwrap();
        let mut table = open(&dir);

        let doc = table
            .create("task", payload(json!({"title": "x"})), &ctx())
            .unwrap();
        assert!(!doc.id.is_empty());
        assert_eq!(doc.version, 1);
        assert_eq!(doc.created_by.as_deref(), Some("alice"));
        assert_eq!(doc.created_at, doc.updated_at);
    }

    #[test]
    fn test_create_honors_string_id() {
        let dir = TempDir::new().unwrap();
        let mut table = open(&dir);

        let doc = table
            .create("task", payload(json!({"id": "t1", "title": "x"})), &ctx())
            .unwrap();
        assert_eq!(doc.id, "t1");
        // id lives in the envelope, not the payload
        assert!(!doc.payload.contains_key("id"));
    }

    #[test]
    fn test_create_rejects_non_string_id() {
        let dir = TempDir::new().unwrap();
        let mut table = open(&dir);

        let err = table
            .create("task", payload(json!({"id": 42})), &ctx())
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION");
    }

    #[test]
    fn test_create_strips_reserved_fields() {
        let dir = TempDir::new().unwrap();
        let mut table = open(&dir);

        let doc = table
            .create(
                "task",
                payload(json!({"version": 99, "createdAt": 1, "deletedAt": 2, "title": "x"})),
                &ctx(),
            )
            .unwrap();
        assert_eq!(doc.version, 1);
        assert!(doc.deleted_at.is_none());
        assert_eq!(doc.payload.len(), 1);
    }

    #[test]
    fn test_create_replaces_existing_id() {
        let dir = TempDir::new().unwrap();
        let mut table = open(&dir);

        table
            .create("task", payload(json!({"id": "t1", "title": "old"})), &ctx())
            .unwrap();
        table
            .update("task", "t1", payload(json!({"extra": true})), &ctx())
            .unwrap();
        let doc = table
            .create("task", payload(json!({"id": "t1", "title": "new"})), &ctx())
            .unwrap();

        // Fresh row: version resets, old payload is gone
        assert_eq!(doc.version, 1);
        assert_eq!(doc.payload.get("title"), Some(&json!("new")));
        assert!(!doc.payload.contains_key("extra"));
    }

    #[test]
    fn test_update_merges_and_bumps_version() {
        let dir = TempDir::new().unwrap();
        let mut table = open(&dir);

        let created = table
            .create("task", payload(json!({"id": "t1", "title": "x", "done": false})), &ctx())
            .unwrap();
        let (before, after) = table
            .update(
                "task",
                "t1",
                payload(json!({"done": true, "note": null})),
                &MutationContext::for_user("bob"),
            )
            .unwrap();

        assert_eq!(before, created);
        assert_eq!(after.version, 2);
        assert_eq!(after.payload.get("title"), Some(&json!("x")));
        assert_eq!(after.payload.get("done"), Some(&json!(true)));
        assert_eq!(after.payload.get("note"), Some(&json!(null)));
        assert_eq!(after.created_by.as_deref(), Some("alice"));
        assert_eq!(after.updated_by.as_deref(), Some("bob"));
        assert_eq!(after.created_at, created.created_at);
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let dir = TempDir::new().unwrap();
        let mut table = open(&dir);

        let err = table
            .update("task", "ghost", Map::new(), &ctx())
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn test_delete_hides_and_returns_before_image() {
        let dir = TempDir::new().unwrap();
        let mut table = open(&dir);

        table
            .create("task", payload(json!({"id": "t1", "title": "x"})), &ctx())
            .unwrap();
        let before = table.soft_delete("task", "t1", &ctx()).unwrap().unwrap();
        assert_eq!(before.version, 1);
        assert!(!before.is_deleted());

        assert!(table.get("task", "t1").is_none());
        assert!(table.scan("task").is_empty());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut table = open(&dir);

        table
            .create("task", payload(json!({"id": "t1"})), &ctx())
            .unwrap();
        assert!(table.soft_delete("task", "t1", &ctx()).unwrap().is_some());
        assert!(table.soft_delete("task", "t1", &ctx()).unwrap().is_none());
        assert!(table.soft_delete("task", "ghost", &ctx()).unwrap().is_none());
    }

    #[test]
    fn test_update_after_delete_is_not_found() {
        let dir = TempDir::new().unwrap();
        let mut table = open(&dir);

        table
            .create("task", payload(json!({"id": "t1"})), &ctx())
            .unwrap();
        table.soft_delete("task", "t1", &ctx()).unwrap();

        let err = table
            .update("task", "t1", Map::new(), &ctx())
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn test_scan_is_id_ascending_per_model() {
        let dir = TempDir::new().unwrap();
        let mut table = open(&dir);

        for id in ["b", "a", "c"] {
            table
                .create("task", payload(json!({"id": id})), &ctx())
                .unwrap();
        }
        table
            .create("note", payload(json!({"id": "n1"})), &ctx())
            .unwrap();

        let ids: Vec<&str> = table.scan("task").iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(table.scan("note").len(), 1);
        assert!(table.scan("ghost").is_empty());
    }

    #[test]
    fn test_persists_across_reload() {
        let dir = TempDir::new().unwrap();
        {
            let mut table = open(&dir);
            table
                .create("task", payload(json!({"id": "t1", "title": "x"})), &ctx())
                .unwrap();
            table.soft_delete("task", "t1", &ctx()).unwrap();
            table
                .create("task", payload(json!({"id": "t2"})), &ctx())
                .unwrap();
        }

        let table = open(&dir);
        // Soft-deleted row survives on disk but stays hidden
        assert!(table.get("task", "t1").is_none());
        assert!(table.get("task", "t2").is_some());
        assert_eq!(table.live_count(), 1);
    }
}
