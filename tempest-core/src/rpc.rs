//! JSON-RPC 2.0 envelope types

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC request structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Value,
    pub id: u64,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, params: Value, id: u64) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
            id,
        }
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    #[serde(default)]
    pub code: Option<i64>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A response envelope carrying exactly one of `result` / `error`
#[derive(Debug, Clone, PartialEq)]
pub enum RpcResponse {
    Result { id: Option<Value>, result: Value },
    Error { id: Option<Value>, error: RpcErrorObject },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    #[error("body is not JSON: {0}")]
    NotJson(String),

    #[error("body is not a JSON object")]
    NotObject,

    #[error("envelope has both result and error")]
    Both,

    #[error("envelope has neither result nor error")]
    Neither,

    #[error("malformed error object: {0}")]
    BadError(String),
}

impl RpcResponse {
    pub fn parse(body: &str) -> Result<Self, EnvelopeError> {
        let value: Value =
            serde_json::from_str(body).map_err(|e| EnvelopeError::NotJson(e.to_string()))?;
        let obj = value.as_object().ok_or(EnvelopeError::NotObject)?;
        let id = obj.get("id").cloned();

        match (obj.get("result"), obj.get("error")) {
            (Some(_), Some(_)) => Err(EnvelopeError::Both),
            (None, None) => Err(EnvelopeError::Neither),
            (Some(result), None) => Ok(Self::Result {
                id,
                result: result.clone(),
            }),
            (None, Some(error)) => {
                let error: RpcErrorObject = serde_json::from_value(error.clone())
                    .map_err(|e| EnvelopeError::BadError(e.to_string()))?;
                Ok(Self::Error { id, error })
            }
        }
    }

    pub fn result(&self) -> Option<&Value> {
        match self {
            Self::Result { result, .. } => Some(result),
            Self::Error { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&RpcErrorObject> {
        match self {
            Self::Result { .. } => None,
            Self::Error { error, .. } => Some(error),
        }
    }
}
