//! Request transport
//!
//! The dispatcher only needs `send(request) -> {status, body, duration}`.
//! `HttpTransport` is the reqwest-backed implementation used by the CLI.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::rpc::RpcRequest;

/// Raw outcome of one delivered request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &RpcRequest) -> Result<TransportResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn send(&self, request: &RpcRequest) -> Result<TransportResponse, TransportError> {
        (**self).send(request).await
    }
}

/// JSON-RPC over HTTP POST
pub struct HttpTransport {
    endpoint: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(
        endpoint: &str,
        timeout: Duration,
        extra_headers: &BTreeMap<String, String>,
    ) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        for (name, value) in extra_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Http(format!("invalid header name {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::Http(format!("invalid header value for {}: {}", name, e)))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(100)
            .default_headers(headers)
            .build()
            .map_err(|e| TransportError::Http(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.to_string(),
            client,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &RpcRequest) -> Result<TransportResponse, TransportError> {
        let start = Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(self.timeout)
                } else if e.is_connect() {
                    TransportError::Connect(e.to_string())
                } else {
                    TransportError::Http(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        // A body that fails mid-read still leaves a status worth classifying
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(
                    "failed to read {} response body from {}: {}",
                    status, self.endpoint, e
                );
                String::new()
            }
        };

        Ok(TransportResponse {
            status,
            body,
            duration: start.elapsed(),
        })
    }
}
