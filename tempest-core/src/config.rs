//! Workload configuration
//!
//! Resolved once at startup and shared read-only by every virtual client.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::method::KNOWN_METHODS;
use crate::types::{parse_quantity, to_quantity, Address};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("no wallet configured for virtual client {ordinal}")]
    MissingWallet { ordinal: u32 },

    #[error("environment variable {0} is not set")]
    MissingEnv(String),

    #[error("invalid private key for virtual client {ordinal}: {reason}")]
    InvalidKey { ordinal: u32, reason: String },

    #[error("invalid address for virtual client {ordinal}: {reason}")]
    InvalidAddress { ordinal: u32, reason: String },

    #[error("address {configured} does not match key-derived address {derived} for virtual client {ordinal}")]
    AddressMismatch {
        ordinal: u32,
        configured: String,
        derived: String,
    },

    #[error("failed to read {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// One step of a ramping profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Stage {
    pub duration_seconds: u64,
    /// Virtual client count reached at the end of the stage
    pub target: u32,
}

/// Pass/fail limits evaluated on the final metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Thresholds {
    /// Maximum share of failed requests, exclusive
    #[serde(default = "default_max_failure_rate")]
    pub max_failure_rate: f64,

    /// Maximum 95th percentile latency, exclusive
    #[serde(default = "default_p95_latency_ms")]
    pub p95_latency_ms: u64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_failure_rate: default_max_failure_rate(),
            p95_latency_ms: default_p95_latency_ms(),
        }
    }
}

/// Load test workload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkloadConfig {
    /// Test name for identification
    #[serde(default = "default_name")]
    pub name: String,

    /// Target RPC endpoint (overridable via CLI)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_endpoint: Option<String>,

    /// Constant virtual client count (ignored when `stages` is non-empty)
    #[serde(default = "default_vus")]
    pub vus: u32,

    /// Constant load duration in seconds (ignored when `stages` is non-empty)
    #[serde(default = "default_duration")]
    pub duration_seconds: u64,

    /// Ramping profile
    #[serde(default)]
    pub stages: Vec<Stage>,

    /// Random choice among the method set; otherwise `fixed_method` only
    #[serde(default = "default_true")]
    pub mixed_methods: bool,

    /// Method used when `mixed_methods` is false
    #[serde(default = "default_fixed_method")]
    pub fixed_method: String,

    /// Add signed transfers to the method set
    #[serde(default)]
    pub enable_writes: bool,

    /// Delay after each iteration (0 = no throttling)
    #[serde(default = "default_sleep_ms")]
    pub sleep_per_iteration_ms: u64,

    /// Expected `eth_chainId` result
    #[serde(default = "default_expected_chain_id_hex")]
    pub expected_chain_id_hex: String,

    /// Chain id signed into write transactions
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,

    #[serde(default = "default_gas_price")]
    pub gas_price_wei: u128,

    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,

    /// Value to transfer per write (in wei)
    #[serde(default = "default_transfer_value")]
    pub transfer_value_wei: u128,

    /// Recipient of write transfers
    #[serde(default)]
    pub transfer_to: Address,

    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Extra HTTP headers sent with every request
    #[serde(default)]
    pub extra_headers: BTreeMap<String, String>,

    #[serde(default)]
    pub thresholds: Thresholds,

    /// Periodic metrics log interval
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_seconds: u64,
}

fn default_name() -> String {
    "rpc-stress".to_string()
}
fn default_vus() -> u32 {
    5
}
fn default_duration() -> u64 {
    60
}
fn default_true() -> bool {
    true
}
fn default_fixed_method() -> String {
    "eth_chainId".to_string()
}
fn default_sleep_ms() -> u64 {
    500
}
fn default_expected_chain_id_hex() -> String {
    "0x1e0f3".to_string()
}
fn default_chain_id() -> u64 {
    123123
}
fn default_gas_price() -> u128 {
    1_000_000_000
}
fn default_gas_limit() -> u64 {
    21000
}
fn default_transfer_value() -> u128 {
    1_000_000_000_000
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_failure_rate() -> f64 {
    0.30
}
fn default_p95_latency_ms() -> u64 {
    2000
}
fn default_metrics_interval() -> u64 {
    10
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            rpc_endpoint: None,
            vus: default_vus(),
            duration_seconds: default_duration(),
            stages: Vec::new(),
            mixed_methods: true,
            fixed_method: default_fixed_method(),
            enable_writes: false,
            sleep_per_iteration_ms: default_sleep_ms(),
            expected_chain_id_hex: default_expected_chain_id_hex(),
            chain_id: default_chain_id(),
            gas_price_wei: default_gas_price(),
            gas_limit: default_gas_limit(),
            transfer_value_wei: default_transfer_value(),
            transfer_to: Address::ZERO,
            request_timeout_seconds: default_request_timeout(),
            extra_headers: BTreeMap::new(),
            thresholds: Thresholds::default(),
            metrics_interval_seconds: default_metrics_interval(),
        }
    }
}

impl WorkloadConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(contents)
            .map_err(|e| ConfigError::Invalid(format!("failed to parse workload config: {}", e)))?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stages.is_empty() {
            if self.vus == 0 {
                return Err(ConfigError::Invalid(
                    "vus must be at least 1 when no stages are given".to_string(),
                ));
            }
            if self.duration_seconds == 0 {
                return Err(ConfigError::Invalid(
                    "duration_seconds must be at least 1".to_string(),
                ));
            }
        } else if self.stages.iter().all(|s| s.duration_seconds == 0) {
            return Err(ConfigError::Invalid(
                "stages must have a non-zero total duration".to_string(),
            ));
        }

        if !self.mixed_methods && !KNOWN_METHODS.contains(&self.fixed_method.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "unknown fixed_method {} (valid: {})",
                self.fixed_method,
                KNOWN_METHODS.join(", ")
            )));
        }
        if self.expected_chain_id().is_none() {
            return Err(ConfigError::Invalid(format!(
                "expected_chain_id_hex {} is not a hex quantity",
                self.expected_chain_id_hex
            )));
        }
        if self.request_timeout_seconds == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_seconds must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.thresholds.max_failure_rate) {
            return Err(ConfigError::Invalid(
                "thresholds.max_failure_rate must be within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }

    /// Numeric value of `expected_chain_id_hex`
    pub fn expected_chain_id(&self) -> Option<u64> {
        parse_quantity(&self.expected_chain_id_hex)
    }

    /// Whether the signing chain id agrees with the expected `eth_chainId` value
    pub fn chain_ids_agree(&self) -> bool {
        self.expected_chain_id_hex.eq_ignore_ascii_case(&to_quantity(self.chain_id))
    }

    pub fn sleep_per_iteration(&self) -> Duration {
        Duration::from_millis(self.sleep_per_iteration_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Whether any iteration may submit a signed transaction
    pub fn writes_enabled(&self) -> bool {
        if self.mixed_methods {
            self.enable_writes
        } else {
            self.fixed_method == crate::method::SEND_RAW_TRANSACTION
        }
    }

    pub fn profile(&self) -> LoadProfile {
        if self.stages.is_empty() {
            LoadProfile::Constant {
                vus: self.vus,
                duration: Duration::from_secs(self.duration_seconds),
            }
        } else {
            LoadProfile::Staged(self.stages.clone())
        }
    }
}

/// Virtual client count over time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadProfile {
    Constant { vus: u32, duration: Duration },
    Staged(Vec<Stage>),
}

impl LoadProfile {
    pub fn total_duration(&self) -> Duration {
        match self {
            Self::Constant { duration, .. } => *duration,
            Self::Staged(stages) => {
                Duration::from_secs(stages.iter().map(|s| s.duration_seconds).sum())
            }
        }
    }

    /// Highest client count the profile reaches
    pub fn max_vus(&self) -> u32 {
        match self {
            Self::Constant { vus, .. } => *vus,
            Self::Staged(stages) => stages.iter().map(|s| s.target).max().unwrap_or(0),
        }
    }

    /// Target client count at `elapsed`, or `None` once the profile has ended.
    ///
    /// Stages ramp linearly from the previous stage's target (0 for the first).
    pub fn target_at(&self, elapsed: Duration) -> Option<u32> {
        match self {
            Self::Constant { vus, duration } => (elapsed < *duration).then_some(*vus),
            Self::Staged(stages) => {
                let mut from = 0u32;
                let mut stage_start = Duration::ZERO;
                for stage in stages {
                    let length = Duration::from_secs(stage.duration_seconds);
                    let stage_end = stage_start + length;
                    if elapsed < stage_end {
                        let progress = (elapsed - stage_start).as_secs_f64() / length.as_secs_f64();
                        let delta = stage.target as f64 - from as f64;
                        return Some((from as f64 + delta * progress).round() as u32);
                    }
                    from = stage.target;
                    stage_start = stage_end;
                }
                None
            }
        }
    }
}
