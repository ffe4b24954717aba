//! Tempest - EVM JSON-RPC Load Testing Agent
//!
//! Drives concurrent virtual clients against a JSON-RPC endpoint, mixing
//! read calls with optional signed transfers, and fails the run when the
//! configured failure-rate or p95 latency thresholds are exceeded.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tempest_core::{
    Dispatcher, HttpTransport, MetricsSnapshot, RunMetrics, Runner, WalletRegistry, WorkloadConfig,
};
use tokio::sync::oneshot;
use tokio::time::{interval, Instant};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

pub const APP_NAME: &str = "tempest";

#[derive(Parser, Debug)]
#[command(name = "tempest")]
#[command(about = "EVM JSON-RPC load testing agent")]
#[command(version)]
struct Cli {
    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Workload spec file (YAML); built-in defaults are used without it
    #[arg(long)]
    spec_file: Option<String>,

    /// Target RPC endpoint (overrides spec file)
    #[arg(long, env = "TEMPEST_RPC_URL")]
    rpc_endpoint: Option<String>,

    /// Constant virtual client count (overrides spec file)
    #[arg(long)]
    vus: Option<u32>,

    /// Test duration in seconds (overrides spec file)
    #[arg(long)]
    duration: Option<u64>,

    /// Sleep after each iteration in milliseconds (overrides spec file)
    #[arg(long)]
    sleep_ms: Option<u64>,

    /// Pick a random method each iteration
    #[arg(long, overrides_with = "no_mixed")]
    mixed: bool,

    /// Always call the spec file's fixed method
    #[arg(long)]
    no_mixed: bool,

    /// Add signed transfers to the method mix (needs VU_<i>_PK / VU_<i>_ADDR)
    #[arg(long)]
    enable_writes: bool,

    /// Dry run - validate config without executing
    #[arg(long)]
    dry_run: bool,
}

fn apply_overrides(config: &mut WorkloadConfig, cli: &Cli) {
    if let Some(rpc) = &cli.rpc_endpoint {
        config.rpc_endpoint = Some(rpc.clone());
    }
    if let Some(vus) = cli.vus {
        config.vus = vus;
    }
    if let Some(duration) = cli.duration {
        config.duration_seconds = duration;
    }
    if let Some(sleep_ms) = cli.sleep_ms {
        config.sleep_per_iteration_ms = sleep_ms;
    }
    if cli.mixed {
        config.mixed_methods = true;
    }
    if cli.no_mixed {
        config.mixed_methods = false;
    }
    if cli.enable_writes {
        config.enable_writes = true;
    }
}

fn log_snapshot(label: &str, snapshot: &MetricsSnapshot) {
    info!(
        "{}: requests={}, failed={} ({:.2}%), avg={}ms, p95={}ms, writes={}/{}",
        label,
        snapshot.requests,
        snapshot.requests_failed,
        snapshot.failure_rate * 100.0,
        snapshot.avg_latency_ms,
        snapshot.p95_latency_ms,
        snapshot.writes_accepted,
        snapshot.writes_sent
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &cli.spec_file {
        Some(path) => WorkloadConfig::load(Path::new(path))?,
        None => WorkloadConfig::default(),
    };
    apply_overrides(&mut config, &cli);
    config.validate()?;

    let rpc_endpoint = config
        .rpc_endpoint
        .clone()
        .context("RPC endpoint required (--rpc-endpoint, TEMPEST_RPC_URL or spec file)")?;

    if !config.chain_ids_agree() {
        warn!(
            "signing chain id {} does not match expected {}",
            config.chain_id, config.expected_chain_id_hex
        );
    }

    let profile = config.profile();
    let registry = WalletRegistry::from_env(profile.max_vus());

    info!("starting {} load test: {}", APP_NAME, config.name);
    info!("target: {}", rpc_endpoint);
    info!(
        "profile: {:?}, total duration: {}s",
        profile,
        profile.total_duration().as_secs()
    );
    info!(
        "mixed methods: {}, writes: {}, sleep: {}ms",
        config.mixed_methods,
        config.writes_enabled(),
        config.sleep_per_iteration_ms
    );
    info!("wallets loaded: {}", registry.len());
    for (ordinal, e) in registry.failures() {
        warn!("[VU {}] wallet config rejected: {}", ordinal, e);
    }
    if config.writes_enabled() && (registry.len() as u32) < profile.max_vus() {
        warn!(
            "writes enabled but only {} of {} clients have wallets",
            registry.len(),
            profile.max_vus()
        );
    }

    if cli.dry_run {
        info!("dry run - configuration validated");
        return Ok(());
    }

    let transport = HttpTransport::new(
        &rpc_endpoint,
        config.request_timeout(),
        &config.extra_headers,
    )?;
    let thresholds = config.thresholds;
    let report_interval = Duration::from_secs(config.metrics_interval_seconds.max(1));

    let metrics = Arc::new(RunMetrics::new().context("failed to create latency histogram")?);
    let dispatcher = Dispatcher::new(Arc::new(config), transport);
    let runner = Runner::new(dispatcher, registry, Arc::clone(&metrics));

    // Ctrl-C ends the run early
    let shutdown = runner.shutdown_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received SIGINT, stopping load test");
            shutdown.store(true, Ordering::SeqCst);
        }
    });

    // Spawn metrics reporter task
    let (stop_reporter, mut reporter_stopped) = oneshot::channel::<()>();
    let report_metrics = Arc::clone(&metrics);
    let reporter_handle = tokio::spawn(async move {
        let mut ticker = interval(report_interval);
        ticker.tick().await;
        let mut last_requests = 0u64;
        let mut last_tick = Instant::now();

        loop {
            tokio::select! {
                _ = &mut reporter_stopped => break,
                _ = ticker.tick() => {
                    let snapshot = report_metrics.snapshot();
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let rps = if elapsed > 0.0 {
                        (snapshot.requests - last_requests) as f64 / elapsed
                    } else {
                        0.0
                    };
                    last_requests = snapshot.requests;
                    last_tick = Instant::now();

                    log_snapshot("metrics", &snapshot);
                    info!("throughput: {:.1} req/s", rps);
                }
            }
        }
    });

    let summary = runner.run(&profile).await;
    let _ = stop_reporter.send(());
    let _ = reporter_handle.await;

    // Final metrics
    let snapshot = metrics.snapshot();
    info!("=== final results ===");
    log_snapshot("totals", &snapshot);
    info!(
        "clients spawned: {}, peak active: {}, elapsed: {:.1}s{}",
        summary.clients_spawned,
        summary.peak_active,
        summary.elapsed.as_secs_f64(),
        if summary.interrupted { " (interrupted)" } else { "" }
    );
    info!(
        "latency min/avg/max: {}/{}/{}ms",
        snapshot.min_latency_ms, snapshot.avg_latency_ms, snapshot.max_latency_ms
    );
    for (name, check) in &snapshot.checks {
        info!(
            "check '{}': {:.2}% ({} passed, {} failed)",
            name,
            check.pass_rate() * 100.0,
            check.passed,
            check.failed
        );
    }
    if snapshot.rpc_errors > 0 {
        info!("rpc errors: {}", snapshot.rpc_errors);
    }
    if snapshot.signing_failures > 0 || snapshot.config_failures > 0 {
        warn!(
            "signing failures: {}, config failures: {}",
            snapshot.signing_failures, snapshot.config_failures
        );
    }

    let mut passed = true;
    for result in thresholds.evaluate(&snapshot) {
        if result.passed {
            info!("threshold {} {}: ok ({})", result.name, result.limit, result.observed);
        } else {
            error!("threshold {} {}: FAILED ({})", result.name, result.limit, result.observed);
            passed = false;
        }
    }

    if !passed {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "tempest",
            "--rpc-endpoint",
            "http://localhost:8545",
            "--vus",
            "12",
            "--sleep-ms",
            "0",
            "--no-mixed",
            "--enable-writes",
        ]);
        let mut config = WorkloadConfig::default();
        apply_overrides(&mut config, &cli);

        assert_eq!(config.rpc_endpoint.as_deref(), Some("http://localhost:8545"));
        assert_eq!(config.vus, 12);
        assert_eq!(config.duration_seconds, 60);
        assert_eq!(config.sleep_per_iteration_ms, 0);
        assert!(!config.mixed_methods);
        assert!(config.enable_writes);
    }

    #[test]
    fn test_cli_defaults_keep_config() {
        let cli = Cli::parse_from(["tempest", "--dry-run"]);
        let mut config = WorkloadConfig::default();
        config.mixed_methods = false;
        apply_overrides(&mut config, &cli);
        assert!(!config.mixed_methods);
        assert_eq!(config.vus, 5);
        assert!(cli.dry_run);
    }
}
