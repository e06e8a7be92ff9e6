//! Supportability counters for token and transaction lifecycles.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Metric name for issued tokens.
pub const TOKEN_CREATE: &str = "Supportability/Async/Token/Create";
/// Metric name for tokens released through `expire`.
pub const TOKEN_EXPIRE: &str = "Supportability/Async/Token/Expire";
/// Metric name for tokens reclaimed by the timeout reaper.
pub const TOKEN_TIMEOUT: &str = "Supportability/Async/Token/Timeout";
/// Metric name for successful links.
pub const TOKEN_LINK_SUCCESS: &str = "Supportability/Async/Token/Link/Success";
/// Metric name for links on tokens that were no longer active.
pub const TOKEN_LINK_IGNORE: &str = "Supportability/Async/Token/Link/Ignore";

/// Live counters shared by an agent and its transactions.
#[derive(Debug, Default)]
pub struct AgentStats {
    token_create: AtomicU64,
    token_expire: AtomicU64,
    token_timeout: AtomicU64,
    token_link_success: AtomicU64,
    token_link_ignore: AtomicU64,
    transactions_started: AtomicU64,
    transactions_completed: AtomicU64,
}

impl AgentStats {
    pub(crate) fn token_created(&self) {
        self.token_create.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn token_expired(&self) {
        self.token_expire.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn tokens_timed_out(&self, count: u64) {
        self.token_timeout.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn link(&self, success: bool) {
        let counter = if success {
            &self.token_link_success
        } else {
            &self.token_link_ignore
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn transaction_started(&self) {
        self.transactions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn transaction_completed(&self) {
        self.transactions_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            token_create: self.token_create.load(Ordering::Relaxed),
            token_expire: self.token_expire.load(Ordering::Relaxed),
            token_timeout: self.token_timeout.load(Ordering::Relaxed),
            token_link_success: self.token_link_success.load(Ordering::Relaxed),
            token_link_ignore: self.token_link_ignore.load(Ordering::Relaxed),
            transactions_started: self.transactions_started.load(Ordering::Relaxed),
            transactions_completed: self.transactions_completed.load(Ordering::Relaxed),
        }
    }
}

/// Counter values at one point in time.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub token_create: u64,
    pub token_expire: u64,
    pub token_timeout: u64,
    pub token_link_success: u64,
    pub token_link_ignore: u64,
    pub transactions_started: u64,
    pub transactions_completed: u64,
}

impl StatsSnapshot {
    /// Token counters keyed by metric name.
    pub fn token_metrics(&self) -> [(&'static str, u64); 5] {
        [
            (TOKEN_CREATE, self.token_create),
            (TOKEN_EXPIRE, self.token_expire),
            (TOKEN_TIMEOUT, self.token_timeout),
            (TOKEN_LINK_SUCCESS, self.token_link_success),
            (TOKEN_LINK_IGNORE, self.token_link_ignore),
        ]
    }

    /// Tokens issued but neither expired nor timed out.
    pub fn outstanding_tokens(&self) -> u64 {
        self.token_create
            .saturating_sub(self.token_expire)
            .saturating_sub(self.token_timeout)
    }
}
