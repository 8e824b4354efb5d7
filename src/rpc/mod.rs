//! RPC surface
//!
//! Request shape `{method, params}`; response shape `{result}` or
//! `{error: {message, code}}`. Every store error is converted into the
//! error envelope at this boundary; no call into [`methods::handle`]
//! fails the transport.

pub mod methods;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StoreError;

#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    /// Method arguments; `null` when omitted.
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize)]
pub struct RpcResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl RpcResponse {
    pub fn ok(result: Value) -> Self {
        RpcResponse {
            result: Some(result),
            error: None,
        }
    }

    pub fn fail(message: impl Into<String>, code: impl Into<String>) -> Self {
        RpcResponse {
            result: None,
            error: Some(RpcError {
                message: message.into(),
                code: Some(code.into()),
            }),
        }
    }
}

impl From<StoreError> for RpcResponse {
    fn from(err: StoreError) -> Self {
        RpcResponse::fail(err.to_string(), err.code())
    }
}
