//! Reference tracing agent.
//!
//! Issues [`TransactionToken`]s, keeps the supportability counters, and times
//! out tokens that were never expired. A token whose context is dropped
//! without being detached is only reclaimed here, by the reaper.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use threadline_config::AgentConfig;

/// Instrumented task builders that hand tokens across spawns.
pub mod instrument;
/// Supportability counters.
pub mod stats;
/// Transactions and their tokens.
pub mod transaction;

pub use instrument::{TransactionKey, current_transaction, launch, launch_blocking, trace};
pub use stats::{AgentStats, StatsSnapshot};
pub use transaction::{Transaction, TransactionToken};

/// Shutdown signal for the reaper.
#[derive(Debug, Clone)]
struct ShutdownSignal;

/// The reference agent.
pub struct Agent {
    config: AgentConfig,
    stats: Arc<AgentStats>,
    transactions: Mutex<Vec<Weak<Transaction>>>,
    shutdown_tx: broadcast::Sender<ShutdownSignal>,
}

impl Agent {
    /// Create an agent with the given configuration.
    pub fn new(config: AgentConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            stats: Arc::new(AgentStats::default()),
            transactions: Mutex::new(Vec::new()),
            shutdown_tx,
        }
    }

    /// The agent's configuration.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Start a new transaction.
    pub fn start_transaction(&self, name: &str) -> Arc<Transaction> {
        let txn = Arc::new(Transaction::new(
            name,
            &self.config.app_name,
            self.config.token_timeout(),
            Arc::clone(&self.stats),
        ));
        self.stats.transaction_started();
        let mut transactions = self.lock_transactions();
        transactions.retain(|weak| weak.upgrade().is_some_and(|open| !open.is_complete()));
        transactions.push(Arc::downgrade(&txn));
        drop(transactions);
        debug!(txn = txn.id(), name, "Transaction started");
        txn
    }

    /// Current counter values.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Number of transactions that are still open.
    pub fn live_transactions(&self) -> usize {
        self.live().len()
    }

    /// Time out stale tokens across all open transactions.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// [`sweep`](Self::sweep) as if the current time were `now`.
    pub fn sweep_at(&self, now: Instant) -> usize {
        self.live()
            .iter()
            .map(|txn| txn.expire_timed_out(now))
            .sum()
    }

    /// Run [`sweep`](Self::sweep) every `reaper_interval` until
    /// [`shutdown`](Self::shutdown) is called.
    pub fn spawn_reaper(self: &Arc<Self>) -> JoinHandle<()> {
        let agent = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let period = self.config.reaper_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                interval_ms = period.as_millis() as u64,
                timeout_ms = agent.config.token_timeout().as_millis() as u64,
                "Token reaper started"
            );

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Token reaper stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        let timed_out = agent.sweep();
                        if timed_out > 0 {
                            warn!(timed_out, "Reclaimed tokens that were never expired");
                        }
                    }
                }
            }
        })
    }

    /// Stop the reaper, if running.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(ShutdownSignal);
    }

    /// Number of reaper tasks still listening for shutdown.
    pub fn running_reapers(&self) -> usize {
        self.shutdown_tx.receiver_count()
    }

    /// Open transactions; drops entries for completed or released ones.
    fn live(&self) -> Vec<Arc<Transaction>> {
        let mut transactions = self.lock_transactions();
        let mut live = Vec::with_capacity(transactions.len());
        transactions.retain(|weak| match weak.upgrade() {
            Some(txn) if !txn.is_complete() => {
                live.push(txn);
                true
            }
            _ => false,
        });
        live
    }

    fn lock_transactions(&self) -> MutexGuard<'_, Vec<Weak<Transaction>>> {
        self.transactions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Agent {
    fn default() -> Self {
        Self::new(AgentConfig::default())
    }
}
