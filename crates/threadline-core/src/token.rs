//! The opaque correlation handle carried through contexts.
//!
//! A [`Token`] is issued by a tracing agent for one logical unit of work. The
//! propagation layer never constructs one; it only moves [`TokenHandle`]s
//! between contexts and calls [`Token::expire`] when a binding is detached.

use std::fmt;
use std::sync::Arc;

use crate::error::TokenError;

/// A correlation handle issued by a tracing agent.
///
/// Implementations own their internal state and must be callable from any
/// thread a task is resumed on.
pub trait Token: Send + Sync + fmt::Debug {
    /// Invalidate the handle and let the agent reclaim what it holds.
    ///
    /// Callers route this through
    /// [`remove_token_context`](crate::remove_token_context) or
    /// [`DetachedToken::expire`](crate::DetachedToken::expire); a second call
    /// for the same handle is a caller error the agent may report.
    fn expire(&self) -> Result<(), TokenError>;

    /// Associate the calling unit of work with the token's transaction.
    ///
    /// Returns `true` when the link took effect.
    fn link(&self) -> bool {
        false
    }

    /// Link, then expire.
    fn link_and_expire(&self) -> Result<bool, TokenError> {
        let linked = self.link();
        self.expire()?;
        Ok(linked)
    }

    /// Whether the handle is still usable.
    fn is_active(&self) -> bool;
}

/// Shared, type-erased token handle.
pub type TokenHandle = Arc<dyn Token>;

/// Whether two handles refer to the same token instance.
pub fn same_token(a: &TokenHandle, b: &TokenHandle) -> bool {
    Arc::ptr_eq(a, b)
}

/// Token handed out for work started outside any transaction.
///
/// Linking does nothing and expiring always succeeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpToken;

impl NoOpToken {
    /// A fresh handle to a no-op token.
    pub fn handle() -> TokenHandle {
        Arc::new(NoOpToken)
    }
}

impl Token for NoOpToken {
    fn expire(&self) -> Result<(), TokenError> {
        Ok(())
    }

    fn is_active(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_token() {
        let token = NoOpToken::handle();
        assert!(!token.is_active());
        assert!(!token.link());
        assert_eq!(token.expire(), Ok(()));
        assert_eq!(token.link_and_expire(), Ok(false));
    }

    #[test]
    fn test_same_token_is_identity() {
        let a = NoOpToken::handle();
        let b = NoOpToken::handle();
        assert!(same_token(&a, &Arc::clone(&a)));
        assert!(!same_token(&a, &b));
    }
}
