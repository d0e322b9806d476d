//! JSON-RPC 2.0 envelopes and classification of incoming frames.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Method not found.
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Params failed to deserialize.
pub const INVALID_PARAMS: i64 = -32602;
/// Handler failed.
pub const INTERNAL_ERROR: i64 = -32603;
/// Request arrived before the session was ready.
pub const SERVER_NOT_INITIALIZED: i64 = -32002;

#[derive(Debug, Serialize)]
pub(crate) struct Request<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl<'a> Request<'a> {
    pub fn new(id: u64, method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct NotificationMessage<'a> {
    pub jsonrpc: &'static str,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl<'a> NotificationMessage<'a> {
    pub fn new(method: &'a str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method,
            params,
        }
    }
}

/// Error object carried by a failed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
}

impl ResponseError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }
}

/// Build a response frame for a request `id`.
pub(crate) fn response_frame(id: Value, outcome: Result<Value, ResponseError>) -> Value {
    match outcome {
        Ok(result) => serde_json::json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err(error) => serde_json::json!({ "jsonrpc": "2.0", "id": id, "error": error }),
    }
}

pub(crate) enum IncomingFrame {
    Response {
        id: u64,
        outcome: Result<Value, ResponseError>,
    },
    Request {
        id: Value,
        method: String,
        params: Option<Value>,
    },
    Notification {
        method: String,
        params: Option<Value>,
    },
}

pub(crate) fn parse_incoming(frame: &Value) -> Option<IncomingFrame> {
    let id = frame.get("id");
    let method = frame.get("method").and_then(Value::as_str).map(String::from);
    let result = frame.get("result");
    let error = frame.get("error");

    match (id, method) {
        (Some(id), None) if result.is_some() || error.is_some() => {
            let outcome = match error {
                Some(error) => Err(serde_json::from_value(error.clone()).unwrap_or_else(|_| {
                    ResponseError::new(INTERNAL_ERROR, "malformed error object")
                })),
                None => Ok(result.cloned().unwrap_or(Value::Null)),
            };
            Some(IncomingFrame::Response {
                id: id.as_u64()?,
                outcome,
            })
        }
        (Some(id), Some(method)) => Some(IncomingFrame::Request {
            id: id.clone(),
            method,
            params: frame.get("params").cloned(),
        }),
        (None, Some(method)) => Some(IncomingFrame::Notification {
            method,
            params: frame.get("params").cloned(),
        }),
        _ => None,
    }
}

/// Deserialize request or notification params, treating absent params as `null`.
pub fn parse_params<T: serde::de::DeserializeOwned>(
    params: Option<Value>,
) -> Result<T, ResponseError> {
    serde_json::from_value(params.unwrap_or(Value::Null))
        .map_err(|e| ResponseError::new(INVALID_PARAMS, e.to_string()))
}
