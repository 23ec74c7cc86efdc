use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Argument payload of a call: a key-to-string mapping.
pub type Params = BTreeMap<String, String>;

/// Reply payload filled in by a handler.
pub type Reply = BTreeMap<String, String>;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const HANDLER_ERROR: i64 = -32000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    pub id: Value, // string, number or null
}

impl RpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: &Params) -> Self {
        RpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params: Value::Object(
                params
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ),
            id: Value::from(id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObj {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcErrorObj {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        RpcErrorObj {
            code,
            message: message.into(),
            data: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObj>,
    pub id: Value,
}

impl RpcResponse {
    /// Successful response carrying `res` for request `id`.
    pub fn with_result(id: Value, res: Value) -> Self {
        RpcResponse {
            jsonrpc: "2.0".to_string(),
            result: Some(res),
            error: None,
            id,
        }
    }

    /// Error response for request `id`.
    ///
    /// `id` is `Value::Null` when the request could not be decoded far enough
    /// to recover it.
    pub fn with_error(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self::from_error_obj(id, RpcErrorObj::new(code, message))
    }

    pub fn from_error_obj(id: Value, err: RpcErrorObj) -> Self {
        RpcResponse {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(err),
            id,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
