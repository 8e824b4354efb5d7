//! HTTP transport
//!
//! Thin axum wiring over the RPC surface, the event pull cursor, the
//! dead-letter endpoint and the WebSocket push channel.

pub mod http;

pub use http::create_router;
