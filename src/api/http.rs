//! HTTP server setup with Axum

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::rpc::methods::{self, DEFAULT_FAILED_LIMIT};
use crate::rpc::{RpcRequest, RpcResponse};
use crate::store::Store;
use crate::subscribe::handler::ws_handler;
use crate::types::{ChangeEvent, FailedDelivery};

/// Pull cursor page size when the caller does not pass a limit.
const DEFAULT_PULL_LIMIT: usize = 100;

/// Create the Axum router with all endpoints
pub fn create_router(store: Arc<Store>) -> Router {
    // CORS configuration - allow all origins for development
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // RPC surface
        .route("/rpc", post(rpc_handler))
        // Pull cursor and dead-letter inspection
        .route("/events", get(pull_events))
        .route("/events/failed", get(failed_events))
        // WebSocket push channel
        .route("/subscribe", get(ws_handler))
        // Health check
        .route("/health", get(health_check))
        .layer(cors)
        .with_state(store)
}

/// POST /rpc - method envelope dispatch
///
/// Takes the raw body so a malformed request still comes back as an
/// error envelope rather than a transport-level rejection. Each call
/// gets a fresh request id, threaded into any events it emits.
async fn rpc_handler(State(store): State<Arc<Store>>, body: String) -> Json<RpcResponse> {
    let request: RpcRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(e) => {
            return Json(RpcResponse::fail(
                format!("malformed request: {}", e),
                "BAD_REQUEST",
            ))
        }
    };
    let request_id = Uuid::new_v4().to_string();
    Json(methods::handle(&store, request, &request_id).await)
}

/// Query parameters for the pull cursor
#[derive(Debug, Deserialize)]
pub struct PullParams {
    /// Exclusive lower bound on sequence
    #[serde(default)]
    pub since: u64,
    pub limit: Option<usize>,
    /// Restrict to one model
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
struct PullResponse {
    events: Vec<ChangeEvent>,
    /// Present only when the cursor fell behind retention.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    meta: Option<PullMeta>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PullMeta {
    gap_detected: bool,
    min_available_sequence: u64,
}

/// GET /events - cursor read over retained events
async fn pull_events(
    State(store): State<Arc<Store>>,
    Query(params): Query<PullParams>,
) -> Json<PullResponse> {
    let batch = store
        .query_events(
            params.since,
            params.limit.unwrap_or(DEFAULT_PULL_LIMIT),
            params.model.as_deref(),
        )
        .await;
    let meta = if batch.gap_detected {
        Some(PullMeta {
            gap_detected: true,
            min_available_sequence: batch.min_available_sequence,
        })
    } else {
        None
    };
    Json(PullResponse {
        events: batch.events,
        meta,
    })
}

/// Query parameters for dead-letter inspection
#[derive(Debug, Deserialize)]
pub struct FailedParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FailedResponse {
    failed_events: Vec<FailedDelivery>,
}

/// GET /events/failed - dead-lettered deliveries, newest first
async fn failed_events(
    State(store): State<Arc<Store>>,
    Query(params): Query<FailedParams>,
) -> Json<FailedResponse> {
    Json(FailedResponse {
        failed_events: store.failed_events(params.limit.unwrap_or(DEFAULT_FAILED_LIMIT)),
    })
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
