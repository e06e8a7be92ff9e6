//! Transactions and the tokens they issue.
//!
//! A transaction stays open until its root work has finished and every token
//! it issued has been expired or timed out.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::stats::AgentStats;
use crate::error::TokenError;
use crate::token::{NoOpToken, Token, TokenHandle};

const ACTIVE: u8 = 0;
const EXPIRED: u8 = 1;
const TIMED_OUT: u8 = 2;

/// Shared between a token and the transaction's active set.
#[derive(Debug)]
struct TokenSlot {
    issued_at: Instant,
    state: AtomicU8,
}

#[derive(Debug, Default)]
struct TransactionState {
    root_finished: bool,
    active: HashMap<u64, Arc<TokenSlot>>,
}

/// One traced unit of work.
pub struct Transaction {
    id: u64,
    name: String,
    app_name: String,
    started_at: Instant,
    token_timeout: Duration,
    stats: Arc<AgentStats>,
    state: Mutex<TransactionState>,
    completed: watch::Sender<bool>,
}

impl Transaction {
    pub(crate) fn new(
        name: &str,
        app_name: &str,
        token_timeout: Duration,
        stats: Arc<AgentStats>,
    ) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);

        let (completed, _) = watch::channel(false);
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            name: name.to_string(),
            app_name: app_name.to_string(),
            started_at: Instant::now(),
            token_timeout,
            stats,
            state: Mutex::new(TransactionState::default()),
            completed,
        }
    }

    /// Unique transaction identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Transaction name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Application the transaction is reported under.
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Time since the transaction started.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Number of issued tokens not yet expired or timed out.
    pub fn active_tokens(&self) -> usize {
        self.lock_state().active.len()
    }

    /// Whether the root work finished and no tokens remain active.
    pub fn is_complete(&self) -> bool {
        *self.completed.borrow()
    }

    /// Issue a token linked to this transaction.
    ///
    /// Once the transaction has completed a [`NoOpToken`] is returned instead.
    pub fn token(self: &Arc<Self>) -> TokenHandle {
        static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

        let slot = Arc::new(TokenSlot {
            issued_at: Instant::now(),
            state: AtomicU8::new(ACTIVE),
        });

        let mut state = self.lock_state();
        if self.is_complete() {
            debug!(txn = self.id, "Token requested after completion, handing out no-op");
            return NoOpToken::handle();
        }
        let id = NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed);
        state.active.insert(id, Arc::clone(&slot));
        self.stats.token_created();
        debug!(txn = self.id, token = id, "Token issued");

        Arc::new(TransactionToken {
            id,
            slot,
            transaction: Arc::clone(self),
        })
    }

    /// Mark the root work as finished.
    pub fn finish(&self) {
        let mut state = self.lock_state();
        state.root_finished = true;
        debug!(txn = self.id, active = state.active.len(), "Root work finished");
        self.check_complete(&state);
    }

    /// Resolve once the transaction is complete.
    pub async fn wait_complete(&self) {
        let mut rx = self.completed.subscribe();
        // The sender lives as long as `self`, so this only returns once complete.
        let _ = rx.wait_for(|done| *done).await;
    }

    /// Time out every active token issued at least `token_timeout` before `now`.
    ///
    /// Returns the number of tokens timed out.
    pub fn expire_timed_out(&self, now: Instant) -> usize {
        let mut state = self.lock_state();
        let stale: Vec<u64> = state
            .active
            .iter()
            .filter(|(_, slot)| now.saturating_duration_since(slot.issued_at) >= self.token_timeout)
            .map(|(id, _)| *id)
            .collect();

        for id in &stale {
            if let Some(slot) = state.active.remove(id) {
                slot.state.store(TIMED_OUT, Ordering::Release);
                warn!(txn = self.id, token = id, "Token timed out");
            }
        }

        if !stale.is_empty() {
            self.stats.tokens_timed_out(stale.len() as u64);
            self.check_complete(&state);
        }
        stale.len()
    }

    fn expire_token(&self, id: u64, slot: &TokenSlot) -> Result<(), TokenError> {
        let mut state = self.lock_state();
        match slot.state.load(Ordering::Acquire) {
            ACTIVE => {
                slot.state.store(EXPIRED, Ordering::Release);
                state.active.remove(&id);
                self.stats.token_expired();
                debug!(txn = self.id, token = id, remaining = state.active.len(), "Token expired");
                self.check_complete(&state);
                Ok(())
            }
            TIMED_OUT => Err(TokenError::TimedOut { id }),
            _ => Err(TokenError::AlreadyExpired { id }),
        }
    }

    /// Must be called with the state lock held.
    fn check_complete(&self, state: &TransactionState) {
        if state.root_finished && state.active.is_empty() && !self.completed.send_replace(true) {
            self.stats.transaction_completed();
            info!(
                txn = self.id,
                name = %self.name,
                app = %self.app_name,
                elapsed_ms = self.elapsed().as_millis() as u64,
                "Transaction complete"
            );
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, TransactionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("complete", &self.is_complete())
            .finish()
    }
}

/// A token issued by a [`Transaction`].
pub struct TransactionToken {
    id: u64,
    slot: Arc<TokenSlot>,
    transaction: Arc<Transaction>,
}

impl TransactionToken {
    /// Unique token identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The issuing transaction.
    pub fn transaction(&self) -> &Arc<Transaction> {
        &self.transaction
    }
}

impl Token for TransactionToken {
    fn expire(&self) -> Result<(), TokenError> {
        self.transaction.expire_token(self.id, &self.slot)
    }

    fn link(&self) -> bool {
        let linked = self.is_active();
        self.transaction.stats.link(linked);
        if !linked {
            debug!(txn = self.transaction.id, token = self.id, "Ignoring link on inactive token");
        }
        linked
    }

    fn is_active(&self) -> bool {
        self.slot.state.load(Ordering::Acquire) == ACTIVE
    }
}

impl fmt::Debug for TransactionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.slot.state.load(Ordering::Acquire) {
            ACTIVE => "active",
            EXPIRED => "expired",
            _ => "timed_out",
        };
        f.debug_struct("TransactionToken")
            .field("id", &self.id)
            .field("txn", &self.transaction.id)
            .field("state", &state)
            .finish()
    }
}
