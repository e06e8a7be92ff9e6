//! Token doubles that record how they are used.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use threadline_core::{Token, TokenError, TokenHandle};

/// A token that counts calls and never fails.
///
/// Expiring twice is recorded, not rejected, so tests can observe what the
/// propagation layer actually does.
#[derive(Debug, Default)]
pub struct SpyToken {
    expire_calls: AtomicUsize,
    link_calls: AtomicUsize,
}

impl SpyToken {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Type-erased handle sharing this spy.
    pub fn handle(self: &Arc<Self>) -> TokenHandle {
        Arc::clone(self) as TokenHandle
    }

    pub fn expire_calls(&self) -> usize {
        self.expire_calls.load(Ordering::SeqCst)
    }

    pub fn link_calls(&self) -> usize {
        self.link_calls.load(Ordering::SeqCst)
    }
}

impl Token for SpyToken {
    fn expire(&self) -> Result<(), TokenError> {
        self.expire_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn link(&self) -> bool {
        self.link_calls.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn is_active(&self) -> bool {
        self.expire_calls() == 0
    }
}

/// A token whose `expire` always fails with the configured error.
#[derive(Debug)]
pub struct FailingToken {
    error: TokenError,
    expire_calls: AtomicUsize,
}

impl FailingToken {
    pub fn new(error: TokenError) -> Arc<Self> {
        Arc::new(Self {
            error,
            expire_calls: AtomicUsize::new(0),
        })
    }

    pub fn handle(self: &Arc<Self>) -> TokenHandle {
        Arc::clone(self) as TokenHandle
    }

    pub fn expire_calls(&self) -> usize {
        self.expire_calls.load(Ordering::SeqCst)
    }
}

impl Token for FailingToken {
    fn expire(&self) -> Result<(), TokenError> {
        self.expire_calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }

    fn is_active(&self) -> bool {
        true
    }
}
