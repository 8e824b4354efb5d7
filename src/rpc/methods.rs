//! RPC method dispatch
//!
//! One function per method, each deserializing its own params shape.
//! Param field names follow the wire convention: `type` for the model
//! name, camelCase elsewhere.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{RpcRequest, RpcResponse};
use crate::error::{StoreError, StoreResult};
use crate::filter::Filter;
use crate::store::query::{parse_order, ListOptions, DEFAULT_PAGE_LIMIT};
use crate::store::Store;
use crate::types::{MutationContext, SinkConfig};

/// Dead-letter page size when the caller does not pass a limit.
pub const DEFAULT_FAILED_LIMIT: usize = 50;

/// Execute one RPC call. Never fails the transport; every error comes
/// back inside the envelope.
pub async fn handle(store: &Store, request: RpcRequest, request_id: &str) -> RpcResponse {
    let method = request.method.clone();
    match dispatch(store, request, request_id).await {
        Ok(result) => RpcResponse::ok(result),
        Err(err) => {
            tracing::debug!(method = %method, code = err.code(), error = %err, "rpc call failed");
            RpcResponse::from(err)
        }
    }
}

async fn dispatch(store: &Store, request: RpcRequest, request_id: &str) -> StoreResult<Value> {
    match request.method.as_str() {
        "setSchema" => set_schema(store, request.params).await,
        "getTypeRegistryVersion" => Ok(json!(store.type_registry_version().await)),
        "create" => create(store, request.params, request_id).await,
        "get" => get(store, request.params).await,
        "update" => update(store, request.params, request_id).await,
        "delete" => delete(store, request.params, request_id).await,
        "list" => list(store, request.params).await,
        "search" => search(store, request.params).await,
        "count" => count(store, request.params).await,
        "configureEvents" => configure_events(store, request.params).await,
        "configureMaxEvents" => configure_max_events(store, request.params).await,
        "getFailedEvents" => get_failed_events(store, request.params),
        other => Err(StoreError::bad_request(format!(
            "unknown method '{}'",
            other
        ))),
    }
}

fn parse_params<T: DeserializeOwned>(params: Value) -> StoreResult<T> {
    serde_json::from_value(params)
        .map_err(|e| StoreError::bad_request(format!("invalid params: {}", e)))
}

#[derive(Debug, Deserialize)]
struct SchemaParams {
    schema: Value,
}

async fn set_schema(store: &Store, params: Value) -> StoreResult<Value> {
    let params: SchemaParams = parse_params(params)?;
    let version = store.set_schema(params.schema).await?;
    Ok(json!({ "version": version }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateParams {
    #[serde(rename = "type")]
    model: String,
    #[serde(default)]
    payload: Map<String, Value>,
    user_id: Option<String>,
}

async fn create(store: &Store, params: Value, request_id: &str) -> StoreResult<Value> {
    let params: CreateParams = parse_params(params)?;
    let ctx = MutationContext::new(params.user_id, Some(request_id.to_string()));
    let doc = store.create(&params.model, params.payload, &ctx).await?;
    Ok(doc.to_value())
}

#[derive(Debug, Deserialize)]
struct GetParams {
    #[serde(rename = "type")]
    model: String,
    id: String,
}

async fn get(store: &Store, params: Value) -> StoreResult<Value> {
    let params: GetParams = parse_params(params)?;
    Ok(store
        .get(&params.model, &params.id)
        .await
        .map(|doc| doc.to_value())
        .unwrap_or(Value::Null))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateParams {
    #[serde(rename = "type")]
    model: String,
    id: String,
    #[serde(default)]
    patch: Map<String, Value>,
    user_id: Option<String>,
}

async fn update(store: &Store, params: Value, request_id: &str) -> StoreResult<Value> {
    let params: UpdateParams = parse_params(params)?;
    let ctx = MutationContext::new(params.user_id, Some(request_id.to_string()));
    let doc = store
        .update(&params.model, &params.id, params.patch, &ctx)
        .await?;
    Ok(doc.to_value())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteParams {
    #[serde(rename = "type")]
    model: String,
    id: String,
    user_id: Option<String>,
}

async fn delete(store: &Store, params: Value, request_id: &str) -> StoreResult<Value> {
    let params: DeleteParams = parse_params(params)?;
    let ctx = MutationContext::new(params.user_id, Some(request_id.to_string()));
    store.delete(&params.model, &params.id, &ctx).await?;
    Ok(Value::Null)
}

#[derive(Debug, Deserialize)]
struct ListParams {
    #[serde(rename = "type")]
    model: String,
    filter: Option<Value>,
    order: Option<Value>,
    select: Option<Vec<String>>,
    limit: Option<usize>,
    offset: Option<usize>,
}

fn list_options(params: &ListParams) -> StoreResult<ListOptions> {
    let filter = match &params.filter {
        Some(Value::Null) | None => None,
        Some(value) => Some(Filter::parse(value)?),
    };
    let order = match &params.order {
        Some(Value::Null) | None => Vec::new(),
        Some(value) => parse_order(value)?,
    };
    Ok(ListOptions {
        filter,
        order,
        select: params.select.clone(),
        limit: params.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
        offset: params.offset.unwrap_or(0),
    })
}

async fn list(store: &Store, params: Value) -> StoreResult<Value> {
    let params: ListParams = parse_params(params)?;
    let options = list_options(&params)?;
    let page = store.list(&params.model, &options).await;
    Ok(serde_json::to_value(page)?)
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(flatten)]
    list: ListParams,
    #[serde(default)]
    text: String,
}

async fn search(store: &Store, params: Value) -> StoreResult<Value> {
    let params: SearchParams = parse_params(params)?;
    let options = list_options(&params.list)?;
    let page = store.search(&params.list.model, &params.text, &options).await;
    Ok(serde_json::to_value(page)?)
}

#[derive(Debug, Deserialize)]
struct CountParams {
    #[serde(rename = "type")]
    model: String,
    filter: Option<Value>,
}

async fn count(store: &Store, params: Value) -> StoreResult<Value> {
    let params: CountParams = parse_params(params)?;
    let filter = match &params.filter {
        Some(Value::Null) | None => None,
        Some(value) => Some(Filter::parse(value)?),
    };
    let n = store.count(&params.model, filter.as_ref()).await;
    Ok(json!(n))
}

#[derive(Debug, Deserialize)]
struct ConfigureEventsParams {
    #[serde(default)]
    sinks: Vec<SinkConfig>,
}

async fn configure_events(store: &Store, params: Value) -> StoreResult<Value> {
    let params: ConfigureEventsParams = parse_params(params)?;
    store.configure_sinks(params.sinks).await?;
    Ok(Value::Null)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigureMaxEventsParams {
    max_events: u64,
}

async fn configure_max_events(store: &Store, params: Value) -> StoreResult<Value> {
    let params: ConfigureMaxEventsParams = parse_params(params)?;
    store.configure_max_events(params.max_events).await?;
    Ok(Value::Null)
}

#[derive(Debug, Deserialize)]
struct FailedEventsParams {
    limit: Option<usize>,
}

fn get_failed_events(store: &Store, params: Value) -> StoreResult<Value> {
    let params: FailedEventsParams = if params.is_null() {
        FailedEventsParams { limit: None }
    } else {
        parse_params(params)?
    };
    let failed = store.failed_events(params.limit.unwrap_or(DEFAULT_FAILED_LIMIT));
    Ok(json!({ "failedEvents": failed }))
}
