//! Errors raised by token implementations.
//!
//! The propagation layer itself cannot fail. These errors originate in a
//! [`Token`](crate::Token) implementation and pass through the lifecycle
//! operations untouched.

/// Failure reported by [`Token::expire`](crate::Token::expire).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// The token was expired before; a handle must be released only once.
    #[error("token {id} was already expired")]
    AlreadyExpired { id: u64 },

    /// The agent timed the token out before it was released.
    #[error("token {id} timed out before it was expired")]
    TimedOut { id: u64 },

    /// The agent refused the request for an implementation-specific reason.
    #[error("token rejected: {0}")]
    Rejected(String),
}
