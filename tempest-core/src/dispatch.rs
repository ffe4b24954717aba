//! Workload dispatcher
//!
//! One call to [`Dispatcher::run_iteration`] is one iteration of a virtual
//! client: select a method, build its payload (signing when it is a write),
//! send it, classify the response, then pace. Everything a client owns
//! across iterations (wallet, nonce, request id, rng) lives in its
//! [`ClientSession`], so the dispatcher itself is shared read-only.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::classify::{Classification, Classifier};
use crate::config::{ConfigError, WorkloadConfig};
use crate::method::{MethodDescriptor, MethodMix, ParamTemplate, GET_TRANSACTION_COUNT};
use crate::rlp::RlpError;
use crate::rpc::RpcRequest;
use crate::signer::SigningError;
use crate::transport::{Transport, TransportError};
use crate::tx::TransactionFields;
use crate::types::{parse_quantity, Address};
use crate::wallet::Wallet;

const BODY_PREVIEW_CHARS: usize = 400;

/// Per-client state carried between iterations
pub struct ClientSession {
    ordinal: u32,
    wallet: Option<Wallet>,
    next_nonce: u64,
    next_request_id: u64,
    rng: Box<dyn RngCore + Send>,
}

impl ClientSession {
    pub fn new(ordinal: u32, wallet: Option<Wallet>, rng: Box<dyn RngCore + Send>) -> Self {
        Self {
            ordinal,
            wallet,
            next_nonce: 0,
            next_request_id: 1,
            rng,
        }
    }

    pub fn with_entropy(ordinal: u32, wallet: Option<Wallet>) -> Self {
        Self::new(ordinal, wallet, Box::new(StdRng::from_entropy()))
    }

    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    pub fn wallet(&self) -> Option<&Wallet> {
        self.wallet.as_ref()
    }

    pub fn next_nonce(&self) -> u64 {
        self.next_nonce
    }

    pub fn set_next_nonce(&mut self, nonce: u64) {
        self.next_nonce = nonce;
    }

    fn take_request_id(&mut self) -> u64 {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }
}

/// Why an iteration did not produce a clean response
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IterationFailure {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("signing: {0}")]
    Signing(#[from] SigningError),

    #[error("transport: {0}")]
    Transport(#[from] TransportError),
}

/// Result of one iteration, consumed by metrics
#[derive(Debug, Clone, PartialEq)]
pub struct IterationOutcome {
    pub ordinal: u32,
    pub method: &'static str,
    /// Whether the selected method was a signed transaction submission
    pub is_write: bool,
    /// Nonce signed into the transaction, for writes
    pub nonce: Option<u64>,
    pub status: Option<u16>,
    pub duration: Option<Duration>,
    /// `None` when nothing was sent
    pub classification: Option<Classification>,
    pub failure: Option<IterationFailure>,
}

impl IterationOutcome {
    fn new(ordinal: u32, descriptor: &MethodDescriptor) -> Self {
        Self {
            ordinal,
            method: descriptor.method,
            is_write: descriptor.is_write(),
            nonce: None,
            status: None,
            duration: None,
            classification: None,
            failure: None,
        }
    }

    pub fn was_sent(&self) -> bool {
        self.classification.is_some()
    }

    pub fn accepted(&self) -> bool {
        self.classification
            .as_ref()
            .map(Classification::accepted)
            .unwrap_or(false)
    }
}

pub struct Dispatcher<T> {
    config: Arc<WorkloadConfig>,
    mix: MethodMix,
    classifier: Classifier,
    transport: T,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(config: Arc<WorkloadConfig>, transport: T) -> Self {
        let mix = MethodMix::from_config(&config);
        Self::with_mix(config, mix, transport)
    }

    pub fn with_mix(config: Arc<WorkloadConfig>, mix: MethodMix, transport: T) -> Self {
        let classifier = Classifier::new(config.expected_chain_id_hex.clone());
        Self {
            config,
            mix,
            classifier,
            transport,
        }
    }

    pub fn config(&self) -> &WorkloadConfig {
        &self.config
    }

    pub fn mix(&self) -> &MethodMix {
        &self.mix
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run one iteration and pace; the pacing sleep completes before this returns
    pub async fn run_iteration(&self, session: &mut ClientSession) -> IterationOutcome {
        let outcome = self.execute(session).await;

        let pause = self.config.sleep_per_iteration();
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
        outcome
    }

    async fn execute(&self, session: &mut ClientSession) -> IterationOutcome {
        let descriptor = self.mix.select(session.rng.as_mut());
        let mut outcome = IterationOutcome::new(session.ordinal, descriptor);

        let params = match self.build_params(descriptor, session) {
            Ok((params, nonce)) => {
                outcome.nonce = nonce;
                params
            }
            Err(failure) => {
                warn!(
                    "[VU {}] {} not sent: {}",
                    session.ordinal, descriptor.method, failure
                );
                outcome.failure = Some(failure);
                return outcome;
            }
        };

        let request = RpcRequest::new(descriptor.method, params, session.take_request_id());
        let classification = match self.transport.send(&request).await {
            Ok(response) => {
                debug!(
                    "[VU {}] Method: {} | Status: {} | Duration: {}ms",
                    session.ordinal,
                    descriptor.method,
                    response.status,
                    response.duration.as_millis()
                );
                if response.status != 200 {
                    warn!(
                        "[VU {}] Non-200 ({}) - possible rate limit / block",
                        session.ordinal, response.status
                    );
                }
                debug!(
                    "[VU {}] Body preview: {}",
                    session.ordinal,
                    preview(&response.body)
                );

                outcome.status = Some(response.status);
                outcome.duration = Some(response.duration);
                self.classifier
                    .classify(descriptor.method, response.status, &response.body)
            }
            Err(e) => {
                warn!("[VU {}] {} failed: {}", session.ordinal, descriptor.method, e);
                let classification = self.classifier.classify_transport_error(&e);
                outcome.failure = Some(e.into());
                classification
            }
        };

        if let Some(reason) = &classification.parse_error {
            if classification.transport_error.is_none() {
                warn!("[VU {}] Parse failed: {}", session.ordinal, reason);
            }
        }

        if outcome.is_write && nonce_consumed(&classification) {
            match session.next_nonce.checked_add(1) {
                Some(next) => session.next_nonce = next,
                None => {
                    warn!("[VU {}] nonce space exhausted at {}", session.ordinal, session.next_nonce);
                    outcome.failure = Some(
                        SigningError::Encoding(RlpError::IntegerOverflow { width: 8 }).into(),
                    );
                }
            }
        }

        outcome.classification = Some(classification);
        outcome
    }

    /// Resolve a method's parameter template; returns the params and the signed nonce for writes
    fn build_params(
        &self,
        descriptor: &MethodDescriptor,
        session: &ClientSession,
    ) -> Result<(Value, Option<u64>), IterationFailure> {
        match &descriptor.params {
            ParamTemplate::Fixed(params) => Ok((params.clone(), None)),
            ParamTemplate::WalletBalance => {
                let address = session
                    .wallet
                    .as_ref()
                    .map(Wallet::address)
                    .unwrap_or(Address::ZERO);
                Ok((json!([address.to_string(), "latest"]), None))
            }
            ParamTemplate::SignedTransfer => {
                let wallet = session.wallet.as_ref().ok_or(ConfigError::MissingWallet {
                    ordinal: session.ordinal,
                })?;
                let nonce = session.next_nonce;
                let signed = self.transfer_fields(nonce).sign(wallet.key())?;
                Ok((json!([signed.to_hex()]), Some(nonce)))
            }
        }
    }

    /// Value transfer built from the configured gas, amount and recipient
    pub fn transfer_fields(&self, nonce: u64) -> TransactionFields {
        TransactionFields {
            nonce,
            gas_price: self.config.gas_price_wei,
            gas_limit: self.config.gas_limit,
            to: self.config.transfer_to,
            value: self.config.transfer_value_wei,
            data: Vec::new(),
            chain_id: self.config.chain_id,
        }
    }

    /// Ask the node for the account's pending nonce
    pub async fn fetch_pending_nonce(&self, address: Address) -> Option<u64> {
        let request = RpcRequest::new(
            GET_TRANSACTION_COUNT,
            json!([address.to_string(), "pending"]),
            0,
        );
        let response = match self.transport.send(&request).await {
            Ok(response) => response,
            Err(e) => {
                debug!("failed to get nonce for {}: {}", address, e);
                return None;
            }
        };
        let classification =
            self.classifier
                .classify(GET_TRANSACTION_COUNT, response.status, &response.body);
        let nonce = classification
            .result
            .as_ref()
            .and_then(Value::as_str)
            .and_then(parse_quantity);
        if nonce.is_none() {
            debug!(
                "invalid nonce response for {}: {}",
                address,
                preview(&response.body)
            );
        }
        nonce
    }
}

/// The node either took the transaction or says this nonce is already spent
fn nonce_consumed(classification: &Classification) -> bool {
    if classification.accepted() {
        return true;
    }
    classification
        .rpc_error
        .as_deref()
        .map(|msg| {
            let msg = msg.to_ascii_lowercase();
            msg.contains("nonce too low") || msg.contains("already known")
        })
        .unwrap_or(false)
}

fn preview(body: &str) -> String {
    let mut out: String = body.chars().take(BODY_PREVIEW_CHARS).collect();
    if body.chars().count() > BODY_PREVIEW_CHARS {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::{CHAIN_ID, GET_BALANCE, SEND_RAW_TRANSACTION};
    use crate::signer::PrivateKey;
    use crate::testing::{ok_result, respond, rpc_error, MockTransport};
    use crate::tx::SignedTransaction;
    use std::sync::atomic::{AtomicU32, Ordering};

    const TEST_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    fn wallet() -> Wallet {
        Wallet::from_key(PrivateKey::from_hex(TEST_KEY).unwrap())
    }

    fn config(fixed_method: &str) -> Arc<WorkloadConfig> {
        Arc::new(WorkloadConfig {
            mixed_methods: false,
            fixed_method: fixed_method.to_string(),
            sleep_per_iteration_ms: 0,
            ..Default::default()
        })
    }

    fn session(wallet: Option<Wallet>) -> ClientSession {
        ClientSession::new(1, wallet, Box::new(StdRng::seed_from_u64(9)))
    }

    fn sent_nonces(transport: &MockTransport) -> Vec<u64> {
        transport
            .requests_for(SEND_RAW_TRANSACTION)
            .iter()
            .map(|r| {
                let raw = r.params[0].as_str().unwrap();
                SignedTransaction::decode_hex(raw).unwrap().fields().nonce
            })
            .collect()
    }

    #[tokio::test]
    async fn test_chain_id_iteration() {
        let dispatcher = Dispatcher::new(config(CHAIN_ID), MockTransport::healthy());
        let mut session = session(None);

        let outcome = dispatcher.run_iteration(&mut session).await;
        assert_eq!(outcome.method, CHAIN_ID);
        assert_eq!(outcome.status, Some(200));
        assert!(outcome.accepted());
        assert!(outcome.failure.is_none());
        let classification = outcome.classification.unwrap();
        assert_eq!(classification.chain_id_ok, Some(true));

        let requests = dispatcher.transport().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].jsonrpc, "2.0");
        assert_eq!(requests[0].params, json!([]));
    }

    #[tokio::test]
    async fn test_request_ids_increase() {
        let dispatcher = Dispatcher::new(config(CHAIN_ID), MockTransport::healthy());
        let mut session = session(None);
        for _ in 0..3 {
            dispatcher.run_iteration(&mut session).await;
        }
        let ids: Vec<u64> = dispatcher.transport().requests().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_balance_uses_wallet_address() {
        let dispatcher = Dispatcher::new(config(GET_BALANCE), MockTransport::healthy());

        let mut with_wallet = session(Some(wallet()));
        dispatcher.run_iteration(&mut with_wallet).await;
        let mut without_wallet = session(None);
        dispatcher.run_iteration(&mut without_wallet).await;

        let requests = dispatcher.transport().requests();
        assert_eq!(
            requests[0].params,
            json!(["0x2c7536e3605d9c16a7a3d7b1898e529396a65c23", "latest"])
        );
        assert_eq!(
            requests[1].params,
            json!(["0x0000000000000000000000000000000000000000", "latest"])
        );
    }

    #[tokio::test]
    async fn test_write_nonces_are_monotonic() {
        let dispatcher = Dispatcher::new(config(SEND_RAW_TRANSACTION), MockTransport::healthy());
        let mut session = session(Some(wallet()));
        session.set_next_nonce(7);

        for _ in 0..5 {
            let outcome = dispatcher.run_iteration(&mut session).await;
            assert!(outcome.is_write);
            assert!(outcome.accepted());
        }

        assert_eq!(sent_nonces(dispatcher.transport()), vec![7, 8, 9, 10, 11]);
        assert_eq!(session.next_nonce(), 12);

        for req in dispatcher.transport().requests() {
            let signed = SignedTransaction::decode_hex(req.params[0].as_str().unwrap()).unwrap();
            assert_eq!(signed.recover_signer().unwrap(), wallet().address());
            assert_eq!(signed.fields().chain_id, 123123);
            assert_eq!(signed.fields().gas_limit, 21000);
            assert_eq!(signed.fields().value, 1_000_000_000_000);
        }
    }

    #[tokio::test]
    async fn test_rejected_write_reuses_nonce() {
        let calls = AtomicU32::new(0);
        let transport = MockTransport::new(move |req| {
            // second submission is rejected
            if calls.fetch_add(1, Ordering::SeqCst) == 1 {
                Ok(rpc_error(req, 200, "insufficient funds for gas * price + value"))
            } else {
                Ok(ok_result(req, json!("0xabc")))
            }
        });
        let dispatcher = Dispatcher::new(config(SEND_RAW_TRANSACTION), transport);
        let mut session = session(Some(wallet()));

        for _ in 0..3 {
            dispatcher.run_iteration(&mut session).await;
        }
        assert_eq!(sent_nonces(dispatcher.transport()), vec![0, 1, 1]);
        assert_eq!(session.next_nonce(), 2);
    }

    #[tokio::test]
    async fn test_nonce_too_low_advances() {
        let transport = MockTransport::new(|req| Ok(rpc_error(req, 200, "Nonce too low")));
        let dispatcher = Dispatcher::new(config(SEND_RAW_TRANSACTION), transport);
        let mut session = session(Some(wallet()));

        let outcome = dispatcher.run_iteration(&mut session).await;
        assert!(!outcome.accepted());
        assert_eq!(session.next_nonce(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_nonce_is_a_signing_failure() {
        let dispatcher = Dispatcher::new(config(SEND_RAW_TRANSACTION), MockTransport::healthy());
        let mut session = session(Some(wallet()));
        session.set_next_nonce(u64::MAX);

        let outcome = dispatcher.run_iteration(&mut session).await;
        assert_eq!(outcome.nonce, Some(u64::MAX));
        assert!(outcome.accepted());
        assert_eq!(
            outcome.failure,
            Some(IterationFailure::Signing(SigningError::Encoding(
                RlpError::IntegerOverflow { width: 8 }
            )))
        );
        assert_eq!(session.next_nonce(), u64::MAX);
        assert_eq!(sent_nonces(dispatcher.transport()), vec![u64::MAX]);
    }

    #[tokio::test]
    async fn test_transport_failure_is_classified() {
        let transport = MockTransport::new(|_| Err(TransportError::Connect("refused".to_string())));
        let dispatcher = Dispatcher::new(config(SEND_RAW_TRANSACTION), transport);
        let mut session = session(Some(wallet()));

        let outcome = dispatcher.run_iteration(&mut session).await;
        assert!(matches!(outcome.failure, Some(IterationFailure::Transport(_))));
        let classification = outcome.classification.unwrap();
        assert!(!classification.status_ok);
        assert!(!classification.valid_response);
        assert_eq!(session.next_nonce(), 0);
    }

    #[tokio::test]
    async fn test_non_json_body_does_not_fail_iteration() {
        let transport = MockTransport::new(|_| Ok(respond(503, "<html>busy</html>")));
        let dispatcher = Dispatcher::new(config(CHAIN_ID), transport);
        let mut session = session(None);

        let outcome = dispatcher.run_iteration(&mut session).await;
        assert_eq!(outcome.status, Some(503));
        assert!(outcome.failure.is_none());
        let classification = outcome.classification.unwrap();
        assert!(!classification.status_ok);
        assert!(!classification.valid_response);
    }

    #[tokio::test]
    async fn test_write_without_wallet_is_config_failure() {
        let dispatcher = Dispatcher::new(config(SEND_RAW_TRANSACTION), MockTransport::healthy());
        let mut session = session(None);

        let outcome = dispatcher.run_iteration(&mut session).await;
        assert_eq!(
            outcome.failure,
            Some(IterationFailure::Config(ConfigError::MissingWallet { ordinal: 1 }))
        );
        assert!(!outcome.was_sent());
        assert!(dispatcher.transport().requests().is_empty());
    }

    #[tokio::test]
    async fn test_signing_failure_sends_nothing() {
        let config = Arc::new(WorkloadConfig {
            mixed_methods: false,
            fixed_method: SEND_RAW_TRANSACTION.to_string(),
            sleep_per_iteration_ms: 0,
            chain_id: u64::MAX,
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(config, MockTransport::healthy());
        let mut session = session(Some(wallet()));

        let outcome = dispatcher.run_iteration(&mut session).await;
        assert!(matches!(outcome.failure, Some(IterationFailure::Signing(_))));
        assert!(!outcome.was_sent());
        assert!(dispatcher.transport().requests().is_empty());
        assert_eq!(session.next_nonce(), 0);
    }

    #[tokio::test]
    async fn test_mixed_selection_follows_seed() {
        let config = Arc::new(WorkloadConfig {
            sleep_per_iteration_ms: 0,
            ..Default::default()
        });
        let run = |seed| {
            let config = Arc::clone(&config);
            async move {
                let dispatcher = Dispatcher::new(config, MockTransport::healthy());
                let mut session = ClientSession::new(1, None, Box::new(StdRng::seed_from_u64(seed)));
                let mut methods = Vec::new();
                for _ in 0..20 {
                    methods.push(dispatcher.run_iteration(&mut session).await.method);
                }
                methods
            }
        };
        assert_eq!(run(3).await, run(3).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_sleeps_after_iteration() {
        let config = Arc::new(WorkloadConfig {
            mixed_methods: false,
            sleep_per_iteration_ms: 500,
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(config, MockTransport::healthy());
        let mut session = session(None);

        let start = tokio::time::Instant::now();
        dispatcher.run_iteration(&mut session).await;
        dispatcher.run_iteration(&mut session).await;
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_fetch_pending_nonce() {
        let transport = MockTransport::new(|req| Ok(ok_result(req, json!("0x2a"))));
        let dispatcher = Dispatcher::new(config(CHAIN_ID), transport);
        assert_eq!(dispatcher.fetch_pending_nonce(wallet().address()).await, Some(42));

        let transport = MockTransport::new(|req| Ok(rpc_error(req, 200, "unsupported")));
        let dispatcher = Dispatcher::new(config(CHAIN_ID), transport);
        assert_eq!(dispatcher.fetch_pending_nonce(wallet().address()).await, None);
    }

    #[test]
    fn test_preview_truncates() {
        let body = "x".repeat(500);
        let p = preview(&body);
        assert_eq!(p.len(), 403);
        assert!(p.ends_with("..."));
        assert_eq!(preview("short"), "short");
    }
}
