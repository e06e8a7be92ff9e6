#![deny(unsafe_code)]

//! threadline core: carrying tracing tokens through async contexts.
//!
//! A tracing agent issues a [`Token`] for a unit of work. When that work hands
//! off to another task, the token travels in the task's immutable
//! [`Context`]: [`add_token_context`] binds it, [`get_token_context`] reads it,
//! and [`remove_token_context`] detaches it and expires it exactly once.
//!
//! ```
//! use std::sync::Arc;
//! use threadline_core::{Context, NoOpToken, add_token_context, get_token_context, remove_token_context};
//!
//! let token = NoOpToken::handle();
//! let ctx = add_token_context(&Context::empty(), Arc::clone(&token));
//! assert!(get_token_context(&ctx).is_some());
//!
//! let ctx = remove_token_context(&ctx).unwrap();
//! assert!(get_token_context(&ctx).is_none());
//! ```

/// Reference tracing agent, transactions, and instrumented task builders.
pub mod agent;
/// Compile-time build metadata (version, git hash, profile).
pub mod build_info;
/// Binding a token into a context.
pub mod carrier;
/// Persistent keyed contexts and the current-context scope.
pub mod context;
/// Errors reported by tokens.
pub mod error;
/// Detaching and releasing a bound token.
pub mod lifecycle;
/// The token handle abstraction.
pub mod token;

pub use agent::Agent;
pub use carrier::{TokenCarrier, TokenKey, add_token_context, get_token_context};
pub use context::scope::{ContextFutureExt, ContextGuard, WithContext};
pub use context::{Context, ContextKey};
pub use error::TokenError;
pub use lifecycle::{DetachedToken, remove_token_context, take_token_context};
pub use token::{NoOpToken, Token, TokenHandle, same_token};
