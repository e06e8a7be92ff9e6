//! Binding a token to its slot in a [`Context`].

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::context::{Context, ContextKey};
use crate::token::TokenHandle;

/// Immutable wrapper around the token carried by a context.
#[derive(Clone)]
pub struct TokenCarrier {
    token: TokenHandle,
}

impl TokenCarrier {
    /// Wrap `token` for insertion into a context.
    pub fn new(token: TokenHandle) -> Self {
        Self { token }
    }

    /// The carried token.
    pub fn token(&self) -> &TokenHandle {
        &self.token
    }

    /// Unwrap into the carried token.
    pub fn into_token(self) -> TokenHandle {
        self.token
    }
}

impl fmt::Debug for TokenCarrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCarrier")
            .field("token", &self.token)
            .finish()
    }
}

/// Context key under which the token carrier is stored.
#[derive(Debug)]
pub struct TokenKey;

impl ContextKey for TokenKey {
    type Value = TokenCarrier;
    const NAME: &'static str = "token";
}

/// A context equal to `context` except that `token` is bound in the token slot.
///
/// Any token already bound is replaced and is **not** expired.
#[must_use]
pub fn add_token_context(context: &Context, token: TokenHandle) -> Context {
    trace!(token = ?token, replaced = context.contains::<TokenKey>(), "Binding token to context");
    context.with::<TokenKey>(TokenCarrier::new(token))
}

/// The token bound in `context`, if any. Never touches the token's state.
pub fn get_token_context(context: &Context) -> Option<TokenHandle> {
    context
        .get::<TokenKey>()
        .map(|carrier| Arc::clone(carrier.token()))
}
