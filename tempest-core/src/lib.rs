//! Tempest Core Library
//!
//! Building blocks for load testing an EVM-compatible JSON-RPC endpoint:
//! canonical RLP encoding, EIP-155 transaction signing, per-client wallets,
//! the workload dispatcher and response classifier, and the runner that
//! schedules virtual clients against a load profile.

pub mod classify;
pub mod config;
pub mod dispatch;
pub mod method;
pub mod metrics;
pub mod rlp;
pub mod rpc;
pub mod runner;
pub mod signer;
pub mod transport;
pub mod tx;
pub mod types;
pub mod wallet;

#[cfg(test)]
mod testing;

pub use classify::{Classification, Classifier};
pub use config::{ConfigError, LoadProfile, Stage, Thresholds, WorkloadConfig};
pub use dispatch::{ClientSession, Dispatcher, IterationFailure, IterationOutcome};
pub use metrics::{MetricsSnapshot, RunMetrics, ThresholdResult};
pub use runner::{RunSummary, Runner};
pub use signer::{PrivateKey, Signature, SigningError};
pub use transport::{HttpTransport, Transport, TransportError, TransportResponse};
pub use tx::{SignedTransaction, TransactionFields};
pub use types::*;
pub use wallet::{Wallet, WalletRegistry};
