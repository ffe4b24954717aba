//! Virtual client scheduling
//!
//! One tokio task per client ordinal. The controller wakes every
//! [`CONTROLLER_TICK`], asks the load profile for the current target and
//! raises or lowers per-client run flags to match. Clients above the target
//! are parked rather than dropped, so an ordinal keeps its nonce across a
//! ramp down and back up and never runs twice at once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{ConfigError, LoadProfile};
use crate::dispatch::{ClientSession, Dispatcher};
use crate::metrics::RunMetrics;
use crate::transport::Transport;
use crate::wallet::WalletRegistry;

pub const CONTROLLER_TICK: Duration = Duration::from_millis(100);

struct ClientHandle {
    running: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// What the controller did over the run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub clients_spawned: u32,
    pub peak_active: u32,
    pub elapsed: Duration,
    pub interrupted: bool,
}

pub struct Runner<T> {
    dispatcher: Arc<Dispatcher<T>>,
    registry: Arc<WalletRegistry>,
    metrics: Arc<RunMetrics>,
    shutdown: Arc<AtomicBool>,
}

impl<T: Transport + 'static> Runner<T> {
    pub fn new(dispatcher: Dispatcher<T>, registry: WalletRegistry, metrics: Arc<RunMetrics>) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            registry: Arc::new(registry),
            metrics,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Raising this flag ends the run early; in-flight iterations still finish
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn metrics(&self) -> &Arc<RunMetrics> {
        &self.metrics
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher<T>> {
        &self.dispatcher
    }

    pub async fn run(&self, profile: &LoadProfile) -> RunSummary {
        let start = Instant::now();
        let mut ticker = interval(CONTROLLER_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut clients: Vec<ClientHandle> = Vec::new();
        let mut active = 0usize;
        let mut peak_active = 0usize;
        let mut interrupted = false;

        loop {
            ticker.tick().await;
            if self.shutdown.load(Ordering::SeqCst) {
                info!("shutdown requested, stopping clients");
                interrupted = true;
                break;
            }
            let Some(target) = profile.target_at(start.elapsed()) else {
                break;
            };
            let target = target as usize;

            while active < target {
                match clients.get(active) {
                    Some(client) => client.running.store(true, Ordering::SeqCst),
                    None => clients.push(self.spawn_client(active as u32 + 1)),
                }
                active += 1;
            }
            while active > target {
                active -= 1;
                clients[active].running.store(false, Ordering::SeqCst);
            }
            if active > peak_active {
                debug!("active clients: {}", active);
                peak_active = active;
            }
        }

        // Wakes parked clients so they observe the shutdown
        self.shutdown.store(true, Ordering::SeqCst);
        let clients_spawned = clients.len() as u32;
        for (index, client) in clients.into_iter().enumerate() {
            if let Err(e) = client.task.await {
                warn!("[VU {}] task ended abnormally: {}", index + 1, e);
            }
        }

        RunSummary {
            clients_spawned,
            peak_active: peak_active as u32,
            elapsed: start.elapsed(),
            interrupted,
        }
    }

    fn spawn_client(&self, ordinal: u32) -> ClientHandle {
        let running = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(run_client(
            ordinal,
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.registry),
            Arc::clone(&self.metrics),
            Arc::clone(&running),
            Arc::clone(&self.shutdown),
        ));
        ClientHandle { running, task }
    }
}

async fn run_client<T: Transport>(
    ordinal: u32,
    dispatcher: Arc<Dispatcher<T>>,
    registry: Arc<WalletRegistry>,
    metrics: Arc<RunMetrics>,
    running: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
) {
    let writes = dispatcher.mix().has_writes();

    // Read-only clients may run without a wallet; a rejected wallet entry always ends the client
    let wallet = match registry.resolve(ordinal) {
        Ok(wallet) => Some(wallet.clone()),
        Err(ConfigError::MissingWallet { .. }) if !writes => None,
        Err(e) => {
            warn!("[VU {}] not starting: {}", ordinal, e);
            metrics.record_config_failure();
            return;
        }
    };

    let mut session = ClientSession::with_entropy(ordinal, wallet);
    if writes {
        if let Some(address) = session.wallet().map(|w| w.address()) {
            let nonce = match dispatcher.fetch_pending_nonce(address).await {
                Some(nonce) => nonce,
                None => {
                    warn!("[VU {}] could not read pending nonce, starting at 0", ordinal);
                    0
                }
            };
            session.set_next_nonce(nonce);
            debug!("[VU {}] {} starting at nonce {}", ordinal, address.to_checksum(), nonce);
        }
    }

    while !shutdown.load(Ordering::SeqCst) {
        if !running.load(Ordering::SeqCst) {
            sleep(CONTROLLER_TICK).await;
            continue;
        }
        let outcome = dispatcher.run_iteration(&mut session).await;
        metrics.record(&outcome);
    }
    debug!("[VU {}] stopped", ordinal);
}
