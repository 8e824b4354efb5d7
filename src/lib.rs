//! Docflow
//!
//! An embedded per-tenant document store fused with event sourcing and
//! change notification. Every mutation commits a typed document row,
//! appends an ordered change event, pushes it to live subscribers, and
//! delivers it to configured sinks (webhooks with HMAC signing and
//! retry, in-process queues, peer stores) with dead-letter capture on
//! exhaustion.
//!
//! # Features
//!
//! - **Typed CRUD**: optimistic versioning, soft deletes, shallow-merge
//!   patches
//! - **Bounded event log**: gapless sequences, configurable retention,
//!   gap detection for slow consumers
//! - **Reliable delivery**: exponential backoff, permanent-vs-retryable
//!   classification, signed webhook payloads, dead-letter queue
//! - **Query engine**: MongoDB-style predicates with regex-DoS guarding
//! - **Live subscriptions**: WebSocket push with per-subscription model
//!   filters
//!
//! # Modules
//!
//! - `types`: Core data structures (Document, ChangeEvent, SinkConfig)
//! - `store`: Document table, metadata, query pipeline and the store
//!   actor
//! - `events`: Append-only bounded event log
//! - `filter`: Predicate engine and regex safety guard
//! - `dispatch`: Sink fan-out, webhook retry and dead-letter capture
//! - `subscribe`: Live subscription registry and WebSocket handler
//! - `rpc`: Method envelope and dispatch
//! - `api`: Axum router over the whole surface
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use docflow::{Store, StoreConfig};
//!
//! #[tokio::main]
//! async fn main() -> docflow::StoreResult<()> {
//!     let store = Arc::new(Store::open(StoreConfig::new("data"))?);
//!     let app = docflow::api::create_router(store);
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod filter;
pub mod rpc;
pub mod store;
pub mod subscribe;
pub mod types;
pub mod utils;

// Re-export commonly used items at crate root
pub use config::{RetryPolicy, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use filter::Filter;
pub use store::Store;
pub use types::{
    ChangeEvent, Document, DocumentPage, EventBatch, FailedDelivery, MutationContext, Operation,
    SinkConfig,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
