//! Response classification
//!
//! Each check is evaluated on its own: a 500 with a well-formed JSON-RPC
//! error body fails the status check but still passes the envelope check.

use serde_json::Value;

use crate::method::CHAIN_ID;
use crate::rpc::RpcResponse;
use crate::transport::TransportError;

pub const CHECK_STATUS_200: &str = "status is 200";
pub const CHECK_VALID_JSON: &str = "valid JSON response";
pub const CHECK_CHAIN_ID: &str = "correct chain ID";

/// Independent check results for one response
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Classification {
    /// HTTP status was 200
    pub status_ok: bool,
    /// Body is JSON with exactly one of `result` / `error`
    pub valid_response: bool,
    /// Only evaluated for `eth_chainId` responses carrying a result
    pub chain_id_ok: Option<bool>,
    /// Message of an RPC-level `error`
    pub rpc_error: Option<String>,
    /// Why the body failed envelope validation
    pub parse_error: Option<String>,
    /// Transport failure, if the request never produced a response
    pub transport_error: Option<String>,
    pub result: Option<Value>,
}

impl Classification {
    /// The node returned a result for this request
    pub fn accepted(&self) -> bool {
        self.status_ok && self.valid_response && self.result.is_some()
    }

    /// Counts toward the failed-request rate
    pub fn request_failed(&self) -> bool {
        !self.status_ok
    }

    /// `(check name, passed)` for every check that applies
    pub fn checks(&self) -> Vec<(&'static str, bool)> {
        let mut checks = vec![
            (CHECK_STATUS_200, self.status_ok),
            (CHECK_VALID_JSON, self.valid_response),
        ];
        if let Some(ok) = self.chain_id_ok {
            checks.push((CHECK_CHAIN_ID, ok));
        }
        checks
    }
}

#[derive(Debug, Clone)]
pub struct Classifier {
    expected_chain_id_hex: String,
}

impl Classifier {
    pub fn new(expected_chain_id_hex: impl Into<String>) -> Self {
        Self {
            expected_chain_id_hex: expected_chain_id_hex.into(),
        }
    }

    pub fn classify(&self, method: &str, status: u16, body: &str) -> Classification {
        let mut classification = Classification {
            status_ok: status == 200,
            ..Default::default()
        };

        match RpcResponse::parse(body) {
            Ok(RpcResponse::Result { result, .. }) => {
                classification.valid_response = true;
                if method == CHAIN_ID {
                    let matches = result
                        .as_str()
                        .map(|s| s.eq_ignore_ascii_case(&self.expected_chain_id_hex))
                        .unwrap_or(false);
                    classification.chain_id_ok = Some(matches);
                }
                classification.result = Some(result);
            }
            Ok(RpcResponse::Error { error, .. }) => {
                classification.valid_response = true;
                classification.rpc_error = Some(error.message);
            }
            Err(e) => {
                classification.parse_error = Some(e.to_string());
            }
        }

        classification
    }

    /// A request that never produced a response still scores every check as failed
    pub fn classify_transport_error(&self, error: &TransportError) -> Classification {
        Classification {
            parse_error: Some("no response body".to_string()),
            transport_error: Some(error.to_string()),
            ..Default::default()
        }
    }
}
