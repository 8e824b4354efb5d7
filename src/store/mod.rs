//! Tenant store actor
//!
//! One [`Store`] owns one data directory: the document table, the
//! event log, the meta file and the dead-letter file. All state sits
//! behind a single async mutex, so document mutation, sequence
//! assignment and subscriber notification are strictly serialized.
//!
//! A mutation commits the row, appends its event and notifies push
//! subscribers while holding the lock, then releases the lock and
//! awaits sink dispatch before returning. A slow webhook therefore
//! delays the triggering caller's response, but never blocks other
//! operations on the store. Reads never touch the log and never pay
//! dispatch latency.

pub mod documents;
pub mod meta;
pub mod query;

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::{mpsc, Mutex};

use crate::config::{StoreConfig, MIN_EVENT_RETENTION};
use crate::dispatch::{DeadLetterStore, Dispatcher};
use crate::error::{StoreError, StoreResult};
use crate::events::EventLog;
use crate::filter::Filter;
use crate::subscribe::Broadcaster;
use crate::types::{
    ChangeEvent, Document, DocumentPage, EventBatch, EventDraft, FailedDelivery, MutationContext,
    Operation, SinkConfig,
};
use crate::utils::atomic::cleanup_temp_files;

use documents::DocumentTable;
use meta::MetaStore;
use query::ListOptions;

/// Everything a mutation must see in one consistent picture.
#[derive(Debug)]
struct StoreState {
    table: DocumentTable,
    log: EventLog,
    meta: MetaStore,
    /// In-memory copy of the sink list persisted in meta.
    sinks: Vec<SinkConfig>,
}

pub struct Store {
    state: Mutex<StoreState>,
    dispatcher: Dispatcher,
    broadcaster: Broadcaster,
    dead_letters: Arc<DeadLetterStore>,
    config: StoreConfig,
}

impl Store {
    /// Open (or create) the store rooted at the configured data
    /// directory and recover all persisted state.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let stale = cleanup_temp_files(&config.data_dir)?;
        if stale > 0 {
            tracing::warn!(removed = stale, "removed stale temp files from interrupted writes");
        }

        let dead_letters = Arc::new(DeadLetterStore::load(config.dead_letter_path())?);
        let mut meta = MetaStore::load(config.meta_path())?;
        let mut log = EventLog::load(config.events_path(), &meta)?;

        // A ceiling lowered just before shutdown may not have pruned yet
        let ceiling = meta.max_events().unwrap_or(config.max_events);
        let pruned = log.enforce_ceiling(ceiling, &mut meta)?;
        if pruned > 0 {
            tracing::info!(pruned, "retention ceiling applied to reloaded event log");
        }

        let table = DocumentTable::load(config.documents_path())?;
        let sinks = meta.sinks();
        let dispatcher = Dispatcher::new(config.retry.clone(), Arc::clone(&dead_letters))?;

        tracing::info!(
            data_dir = %config.data_dir.display(),
            documents = table.live_count(),
            events = log.len(),
            sinks = sinks.len(),
            "store opened"
        );

        Ok(Store {
            state: Mutex::new(StoreState {
                table,
                log,
                meta,
                sinks,
            }),
            dispatcher,
            broadcaster: Broadcaster::new(),
            dead_letters,
            config,
        })
    }

    /// Route queue sink events to an in-process channel. Call before
    /// sharing the store.
    pub fn bind_queue(&mut self, queue: mpsc::UnboundedSender<ChangeEvent>) {
        self.dispatcher.bind_queue(queue);
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    // --- mutations ---

    pub async fn create(
        &self,
        model: &str,
        payload: Map<String, Value>,
        ctx: &MutationContext,
    ) -> StoreResult<Document> {
        let mut state = self.state.lock().await;
        let doc = state.table.create(model, payload, ctx)?;
        let (event, sinks) = self.commit_event(
            &mut state,
            EventDraft {
                operation: Operation::Create,
                model: doc.model.clone(),
                document_id: doc.id.clone(),
                before: None,
                after: Some(doc.to_value()),
                user_id: ctx.user_id.clone(),
                request_id: ctx.request_id.clone(),
            },
        )?;
        drop(state);

        self.dispatcher.dispatch(&event, &sinks).await;
        Ok(doc)
    }

    pub async fn update(
        &self,
        model: &str,
        id: &str,
        patch: Map<String, Value>,
        ctx: &MutationContext,
    ) -> StoreResult<Document> {
        let mut state = self.state.lock().await;
        let (before, after) = state.table.update(model, id, patch, ctx)?;
        let (event, sinks) = self.commit_event(
            &mut state,
            EventDraft {
                operation: Operation::Update,
                model: after.model.clone(),
                document_id: after.id.clone(),
                before: Some(before.to_value()),
                after: Some(after.to_value()),
                user_id: ctx.user_id.clone(),
                request_id: ctx.request_id.clone(),
            },
        )?;
        drop(state);

        self.dispatcher.dispatch(&event, &sinks).await;
        Ok(after)
    }

    /// Soft-delete a document. Missing or already-deleted targets are
    /// a no-op that emits no event; returns whether a delete happened.
    pub async fn delete(&self, model: &str, id: &str, ctx: &MutationContext) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let before = match state.table.soft_delete(model, id, ctx)? {
            Some(before) => before,
            None => return Ok(false),
        };
        let (event, sinks) = self.commit_event(
            &mut state,
            EventDraft {
                operation: Operation::Delete,
                model: model.to_string(),
                document_id: id.to_string(),
                before: Some(before.to_value()),
                after: None,
                user_id: ctx.user_id.clone(),
                request_id: ctx.request_id.clone(),
            },
        )?;
        drop(state);

        self.dispatcher.dispatch(&event, &sinks).await;
        Ok(true)
    }

    /// Append the event, notify push subscribers and hand back the
    /// sink snapshot to dispatch after the lock is gone.
    fn commit_event(
        &self,
        state: &mut StoreState,
        draft: EventDraft,
    ) -> StoreResult<(ChangeEvent, Vec<SinkConfig>)> {
        let ceiling = state.meta.max_events().unwrap_or(self.config.max_events);
        let event = state.log.append(draft, ceiling, &mut state.meta)?;
        self.broadcaster.publish(&event);
        Ok((event, state.sinks.clone()))
    }

    // --- reads ---

    pub async fn get(&self, model: &str, id: &str) -> Option<Document> {
        let state = self.state.lock().await;
        state.table.get(model, id).cloned()
    }

    pub async fn list(&self, model: &str, options: &ListOptions) -> DocumentPage {
        let state = self.state.lock().await;
        query::list(&state.table, model, options)
    }

    pub async fn search(&self, model: &str, text: &str, options: &ListOptions) -> DocumentPage {
        let state = self.state.lock().await;
        query::search(&state.table, model, text, options)
    }

    pub async fn count(&self, model: &str, filter: Option<&Filter>) -> usize {
        let state = self.state.lock().await;
        query::count(&state.table, model, filter)
    }

    /// Cursor read over retained events.
    pub async fn query_events(&self, since: u64, limit: usize, model: Option<&str>) -> EventBatch {
        let state = self.state.lock().await;
        state.log.query(since, limit, model)
    }

    /// Dead-lettered deliveries, newest first.
    pub fn failed_events(&self, limit: usize) -> Vec<FailedDelivery> {
        self.dead_letters.recent(limit)
    }

    // --- configuration ---

    /// Replace the schema blob. Returns the bumped registry version.
    pub async fn set_schema(&self, schema: Value) -> StoreResult<u64> {
        if !schema.is_object() {
            return Err(StoreError::validation("schema must be an object"));
        }
        let mut state = self.state.lock().await;
        let version = state.meta.set_schema(schema);
        state.meta.persist()?;
        tracing::info!(version, "schema replaced");
        Ok(version)
    }

    pub async fn type_registry_version(&self) -> u64 {
        let state = self.state.lock().await;
        state.meta.schema_version()
    }

    pub async fn schema(&self) -> Option<Value> {
        let state = self.state.lock().await;
        state.meta.schema().cloned()
    }

    /// Replace the sink list. Every sink is validated before anything
    /// is stored; the new list applies to mutations from now on.
    pub async fn configure_sinks(&self, sinks: Vec<SinkConfig>) -> StoreResult<()> {
        for sink in &sinks {
            validate_sink(sink)?;
        }
        let mut state = self.state.lock().await;
        state.meta.set_sinks(&sinks)?;
        state.meta.persist()?;
        tracing::info!(sinks = sinks.len(), "sink configuration replaced");
        state.sinks = sinks;
        Ok(())
    }

    /// Override the event retention ceiling. Takes effect on the next
    /// append.
    pub async fn configure_max_events(&self, max_events: u64) -> StoreResult<()> {
        if max_events < MIN_EVENT_RETENTION {
            return Err(StoreError::validation(format!(
                "maxEvents must be at least {}",
                MIN_EVENT_RETENTION
            )));
        }
        let mut state = self.state.lock().await;
        state.meta.set_max_events(max_events);
        state.meta.persist()?;
        tracing::info!(max_events, "event retention ceiling set");
        Ok(())
    }
}

fn validate_sink(sink: &SinkConfig) -> StoreResult<()> {
    if let Some(url) = sink.url() {
        let parsed = reqwest::Url::parse(url).map_err(|e| {
            StoreError::validation(format!("invalid {} url '{}': {}", sink.kind(), url, e))
        })?;
        let scheme = parsed.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(StoreError::validation(format!(
                "{} url must use http or https",
                sink.kind()
            )));
        }
    }
    if let SinkConfig::Webhook {
        headers: Some(headers),
        ..
    } = sink
    {
        for name in headers.keys() {
            let well_formed = !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
            if !well_formed {
                return Err(StoreError::validation(format!(
                    "invalid webhook header name '{}'",
                    name
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn payload(v: Value) -> Map<String, Value> {
        v.as_object().unwrap().clone()
    }

    fn open(dir: &TempDir) -> Store {
        Store::open(StoreConfig::new(dir.path())).unwrap()
    }

    fn ctx() -> MutationContext {
        MutationContext::for_user("alice")
    }

    #[tokio::test]
    async fn test_create_commits_document_and_event() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        let doc = store
            .create("task", payload(json!({"id": "t1", "title": "x"})), &ctx())
            .await
            .unwrap();
        assert_eq!(doc.version, 1);

        let batch = store.query_events(0, 100, None).await;
        assert_eq!(batch.events.len(), 1);
        let event = &batch.events[0];
        assert_eq!(event.sequence, 1);
        assert_eq!(event.operation, Operation::Create);
        assert_eq!(event.document_id, "t1");
        assert!(event.before.is_none());
        assert!(event.after.is_some());
        assert_eq!(event.user_id.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_update_event_carries_both_images() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        store
            .create("task", payload(json!({"id": "t1", "done": false})), &ctx())
            .await
            .unwrap();
        let doc = store
            .update("task", "t1", payload(json!({"done": true})), &ctx())
            .await
            .unwrap();
        assert_eq!(doc.version, 2);

        let batch = store.query_events(1, 100, None).await;
        let event = &batch.events[0];
        assert_eq!(event.sequence, 2);
        assert_eq!(event.before.as_ref().unwrap()["done"], json!(false));
        assert_eq!(event.after.as_ref().unwrap()["done"], json!(true));
    }

    #[tokio::test]
    async fn test_delete_noop_emits_no_event() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        store
            .create("task", payload(json!({"id": "t1"})), &ctx())
            .await
            .unwrap();
        assert!(store.delete("task", "t1", &ctx()).await.unwrap());
        assert!(!store.delete("task", "t1", &ctx()).await.unwrap());
        assert!(!store.delete("task", "ghost", &ctx()).await.unwrap());

        let batch = store.query_events(0, 100, None).await;
        assert_eq!(batch.events.len(), 2);
        assert_eq!(batch.events[1].operation, Operation::Delete);
        assert!(batch.events[1].after.is_none());
    }

    #[tokio::test]
    async fn test_mutations_reach_push_subscribers() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let (_id, mut rx) = store.broadcaster().subscribe(Some("task".to_string()));

        store
            .create("task", payload(json!({"id": "t1"})), &ctx())
            .await
            .unwrap();
        store
            .create("note", payload(json!({"id": "n1"})), &ctx())
            .await
            .unwrap();

        let pushed: ChangeEvent = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(pushed.model, "task");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_schema_versioning() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        assert_eq!(store.type_registry_version().await, 0);
        assert_eq!(
            store.set_schema(json!({"task": {}})).await.unwrap(),
            1
        );
        assert_eq!(
            store.set_schema(json!({"task": {}, "note": {}})).await.unwrap(),
            2
        );
        assert_eq!(store.type_registry_version().await, 2);

        let err = store.set_schema(json!("nope")).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION");
    }

    #[tokio::test]
    async fn test_configure_max_events_floor() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        let err = store.configure_max_events(99).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION");
        store.configure_max_events(100).await.unwrap();
    }

    #[tokio::test]
    async fn test_configure_sinks_validates_urls() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        let err = store
            .configure_sinks(vec![SinkConfig::Webhook {
                url: "ftp://example.com/hook".to_string(),
                secret: None,
                headers: None,
            }])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION");

        let err = store
            .configure_sinks(vec![SinkConfig::PeerStore {
                url: "not a url".to_string(),
            }])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION");

        store
            .configure_sinks(vec![
                SinkConfig::Webhook {
                    url: "https://example.com/hook".to_string(),
                    secret: Some("s3cret".to_string()),
                    headers: None,
                },
                SinkConfig::Queue,
                SinkConfig::Analytics,
            ])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_configure_sinks_rejects_bad_header_names() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        let mut headers = std::collections::BTreeMap::new();
        headers.insert("x bad header".to_string(), "v".to_string());
        let err = store
            .configure_sinks(vec![SinkConfig::Webhook {
                url: "https://example.com/hook".to_string(),
                secret: None,
                headers: Some(headers),
            }])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION");
    }

    #[tokio::test]
    async fn test_sinks_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = open(&dir);
            store
                .configure_sinks(vec![SinkConfig::Queue])
                .await
                .unwrap();
            store
                .create("task", payload(json!({"id": "t1"})), &ctx())
                .await
                .unwrap();
        }

        let store = open(&dir);
        let state = store.state.lock().await;
        assert_eq!(state.sinks, vec![SinkConfig::Queue]);
        assert_eq!(state.log.last_sequence(), 1);
    }

    #[tokio::test]
    async fn test_queue_sink_receives_committed_events() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        let (tx, mut rx) = mpsc::unbounded_channel();
        store.bind_queue(tx);

        store
            .configure_sinks(vec![SinkConfig::Queue])
            .await
            .unwrap();
        store
            .create("task", payload(json!({"id": "t1"})), &ctx())
            .await
            .unwrap();

        let event = rx.try_recv().unwrap();
        assert_eq!(event.sequence, 1);
        assert_eq!(event.document_id, "t1");
    }
}
