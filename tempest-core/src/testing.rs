//! Scripted in-memory transport for dispatcher and runner tests

use async_trait::async_trait;
use serde_json::json;
use std::sync::Mutex;
use std::time::Duration;

use crate::method::{CHAIN_ID, GET_TRANSACTION_COUNT, SEND_RAW_TRANSACTION};
use crate::rpc::RpcRequest;
use crate::signer::keccak256;
use crate::transport::{Transport, TransportError, TransportResponse};

type Responder = Box<dyn Fn(&RpcRequest) -> Result<TransportResponse, TransportError> + Send + Sync>;

pub struct MockTransport {
    responder: Responder,
    requests: Mutex<Vec<RpcRequest>>,
}

impl MockTransport {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&RpcRequest) -> Result<TransportResponse, TransportError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A healthy node on chain 123123 that accepts every transaction
    pub fn healthy() -> Self {
        Self::new(|req| Ok(ok_result(req, healthy_result(req))))
    }

    pub fn requests(&self) -> Vec<RpcRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_for(&self, method: &str) -> Vec<RpcRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method)
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &RpcRequest) -> Result<TransportResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        (self.responder)(request)
    }
}

pub fn healthy_result(req: &RpcRequest) -> serde_json::Value {
    match req.method.as_str() {
        CHAIN_ID => json!("0x1e0f3"),
        GET_TRANSACTION_COUNT => json!("0x0"),
        SEND_RAW_TRANSACTION => {
            let raw = req.params[0].as_str().unwrap_or_default();
            json!(format!("0x{}", hex::encode(keccak256(raw.as_bytes()))))
        }
        _ => json!("0x10"),
    }
}

pub fn ok_result(req: &RpcRequest, result: serde_json::Value) -> TransportResponse {
    respond(200, json!({"jsonrpc": "2.0", "id": req.id, "result": result}).to_string())
}

pub fn rpc_error(req: &RpcRequest, status: u16, message: &str) -> TransportResponse {
    respond(
        status,
        json!({"jsonrpc": "2.0", "id": req.id, "error": {"code": -32000, "message": message}})
            .to_string(),
    )
}

pub fn respond(status: u16, body: impl Into<String>) -> TransportResponse {
    TransportResponse {
        status,
        body: body.into(),
        duration: Duration::from_millis(12),
    }
}
