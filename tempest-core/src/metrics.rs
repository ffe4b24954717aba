//! Run metrics and threshold evaluation

use hdrhistogram::{CreationError, Histogram};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::classify::{CHECK_CHAIN_ID, CHECK_STATUS_200, CHECK_VALID_JSON};
use crate::config::Thresholds;
use crate::dispatch::{IterationFailure, IterationOutcome};

/// Latencies above this are recorded at the bound
pub const MAX_TRACKED_LATENCY_MS: u64 = 60_000;

#[derive(Debug, Default)]
struct CheckCounter {
    passed: AtomicU64,
    failed: AtomicU64,
}

impl CheckCounter {
    fn record(&self, passed: bool) {
        if passed {
            self.passed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn snapshot(&self) -> CheckSnapshot {
        CheckSnapshot {
            passed: self.passed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Metrics collected during the run, shared by every client task
#[derive(Debug)]
pub struct RunMetrics {
    iterations: AtomicU64,
    requests: AtomicU64,
    requests_failed: AtomicU64,
    total_latency_ms: AtomicU64,
    min_latency_ms: AtomicU64,
    max_latency_ms: AtomicU64,
    latency_histogram: Mutex<Histogram<u64>>,
    status_check: CheckCounter,
    json_check: CheckCounter,
    chain_id_check: CheckCounter,
    writes_sent: AtomicU64,
    writes_accepted: AtomicU64,
    rpc_errors: AtomicU64,
    signing_failures: AtomicU64,
    config_failures: AtomicU64,
}

impl RunMetrics {
    pub fn new() -> Result<Self, CreationError> {
        Ok(Self {
            iterations: AtomicU64::new(0),
            requests: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            total_latency_ms: AtomicU64::new(0),
            min_latency_ms: AtomicU64::new(u64::MAX),
            max_latency_ms: AtomicU64::new(0),
            latency_histogram: Mutex::new(Histogram::new_with_bounds(
                1,
                MAX_TRACKED_LATENCY_MS,
                3,
            )?),
            status_check: CheckCounter::default(),
            json_check: CheckCounter::default(),
            chain_id_check: CheckCounter::default(),
            writes_sent: AtomicU64::new(0),
            writes_accepted: AtomicU64::new(0),
            rpc_errors: AtomicU64::new(0),
            signing_failures: AtomicU64::new(0),
            config_failures: AtomicU64::new(0),
        })
    }

    pub fn record(&self, outcome: &IterationOutcome) {
        self.iterations.fetch_add(1, Ordering::Relaxed);

        match &outcome.failure {
            Some(IterationFailure::Signing(_)) => {
                self.signing_failures.fetch_add(1, Ordering::Relaxed);
            }
            Some(IterationFailure::Config(_)) => self.record_config_failure(),
            _ => {}
        }

        let Some(classification) = &outcome.classification else {
            return;
        };

        self.requests.fetch_add(1, Ordering::Relaxed);
        if classification.request_failed() {
            self.requests_failed.fetch_add(1, Ordering::Relaxed);
        }
        if classification.rpc_error.is_some() {
            self.rpc_errors.fetch_add(1, Ordering::Relaxed);
        }

        self.status_check.record(classification.status_ok);
        self.json_check.record(classification.valid_response);
        if let Some(ok) = classification.chain_id_ok {
            self.chain_id_check.record(ok);
        }

        if outcome.is_write {
            self.writes_sent.fetch_add(1, Ordering::Relaxed);
            if classification.accepted() {
                self.writes_accepted.fetch_add(1, Ordering::Relaxed);
            }
        }

        if let Some(duration) = outcome.duration {
            self.record_latency(duration.as_millis() as u64);
        }
    }

    /// A client that could not start, or an iteration that hit a config error
    pub fn record_config_failure(&self) {
        self.config_failures.fetch_add(1, Ordering::Relaxed);
    }

    fn record_latency(&self, latency_ms: u64) {
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);

        let mut current = self.min_latency_ms.load(Ordering::Relaxed);
        while latency_ms < current {
            match self.min_latency_ms.compare_exchange_weak(
                current,
                latency_ms,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(c) => current = c,
            }
        }

        let mut current = self.max_latency_ms.load(Ordering::Relaxed);
        while latency_ms > current {
            match self.max_latency_ms.compare_exchange_weak(
                current,
                latency_ms,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(c) => current = c,
            }
        }

        if let Ok(mut hist) = self.latency_histogram.lock() {
            hist.saturating_record(latency_ms);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let requests = self.requests.load(Ordering::Relaxed);
        let failed = self.requests_failed.load(Ordering::Relaxed);
        let total_latency = self.total_latency_ms.load(Ordering::Relaxed);
        let min = self.min_latency_ms.load(Ordering::Relaxed);

        let (timed, p95) = match self.latency_histogram.lock() {
            Ok(hist) if !hist.is_empty() => (hist.len(), hist.value_at_quantile(0.95)),
            _ => (0, 0),
        };

        let mut checks = BTreeMap::new();
        checks.insert(CHECK_STATUS_200, self.status_check.snapshot());
        checks.insert(CHECK_VALID_JSON, self.json_check.snapshot());
        let chain = self.chain_id_check.snapshot();
        if chain.total() > 0 {
            checks.insert(CHECK_CHAIN_ID, chain);
        }

        MetricsSnapshot {
            iterations: self.iterations.load(Ordering::Relaxed),
            requests,
            requests_failed: failed,
            failure_rate: if requests > 0 {
                failed as f64 / requests as f64
            } else {
                0.0
            },
            avg_latency_ms: if timed > 0 { total_latency / timed } else { 0 },
            min_latency_ms: if min == u64::MAX { 0 } else { min },
            max_latency_ms: self.max_latency_ms.load(Ordering::Relaxed),
            p95_latency_ms: p95,
            checks,
            writes_sent: self.writes_sent.load(Ordering::Relaxed),
            writes_accepted: self.writes_accepted.load(Ordering::Relaxed),
            rpc_errors: self.rpc_errors.load(Ordering::Relaxed),
            signing_failures: self.signing_failures.load(Ordering::Relaxed),
            config_failures: self.config_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CheckSnapshot {
    pub passed: u64,
    pub failed: u64,
}

impl CheckSnapshot {
    pub fn total(&self) -> u64 {
        self.passed + self.failed
    }

    pub fn pass_rate(&self) -> f64 {
        if self.total() == 0 {
            return 0.0;
        }
        self.passed as f64 / self.total() as f64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub iterations: u64,
    pub requests: u64,
    pub requests_failed: u64,
    pub failure_rate: f64,
    pub avg_latency_ms: u64,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    pub p95_latency_ms: u64,
    pub checks: BTreeMap<&'static str, CheckSnapshot>,
    pub writes_sent: u64,
    pub writes_accepted: u64,
    pub rpc_errors: u64,
    pub signing_failures: u64,
    pub config_failures: u64,
}

/// One threshold and whether the run stayed inside it
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdResult {
    pub name: &'static str,
    pub limit: String,
    pub observed: String,
    pub passed: bool,
}

impl Thresholds {
    pub fn evaluate(&self, snapshot: &MetricsSnapshot) -> Vec<ThresholdResult> {
        vec![
            ThresholdResult {
                name: "http_req_failed",
                limit: format!("rate<{:.2}", self.max_failure_rate),
                observed: format!("{:.4}", snapshot.failure_rate),
                passed: snapshot.failure_rate < self.max_failure_rate,
            },
            ThresholdResult {
                name: "http_req_duration",
                limit: format!("p(95)<{}", self.p95_latency_ms),
                observed: format!("{}ms", snapshot.p95_latency_ms),
                passed: snapshot.p95_latency_ms < self.p95_latency_ms,
            },
        ]
    }

    pub fn all_pass(&self, snapshot: &MetricsSnapshot) -> bool {
        self.evaluate(snapshot).iter().all(|r| r.passed)
    }
}
