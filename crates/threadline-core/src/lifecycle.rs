//! Detaching a token from a context, coupled with its release.
//!
//! [`take_token_context`] splits detaching into two steps: the binding is
//! removed and the token comes back as an owned [`DetachedToken`], whose
//! [`expire`](DetachedToken::expire) consumes it. [`remove_token_context`]
//! performs both steps at once.
//!
//! Dropping a context, or a [`DetachedToken`], never expires the token.

use std::fmt;

use tracing::debug;

use crate::carrier::{TokenCarrier, TokenKey};
use crate::context::Context;
use crate::error::TokenError;
use crate::token::TokenHandle;

/// A token that has been removed from its context but not yet released.
#[must_use = "a detached token is released only by calling `expire`"]
pub struct DetachedToken {
    token: TokenHandle,
}

impl DetachedToken {
    /// Release the token. Consumes the value so it cannot be released twice.
    pub fn expire(self) -> Result<(), TokenError> {
        debug!(token = ?self.token, "Expiring detached token");
        self.token.expire()
    }

    /// The underlying token.
    pub fn token(&self) -> &TokenHandle {
        &self.token
    }

    /// Give up ownership without expiring.
    pub fn into_inner(self) -> TokenHandle {
        self.token
    }
}

impl fmt::Debug for DetachedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DetachedToken").field(&self.token).finish()
    }
}

/// Remove the token binding from `context` without expiring it.
///
/// When nothing is bound the returned context is the same snapshot.
pub fn take_token_context(context: &Context) -> (Context, Option<DetachedToken>) {
    let (rest, carrier) = context.take::<TokenKey>();
    let detached = carrier.map(|carrier: TokenCarrier| DetachedToken {
        token: carrier.into_token(),
    });
    (rest, detached)
}

/// Expire the bound token, then return `context` without the binding.
///
/// Without a binding this is a no-op that returns the same snapshot. Errors
/// from [`Token::expire`](crate::Token::expire) are returned unchanged.
pub fn remove_token_context(context: &Context) -> Result<Context, TokenError> {
    let (rest, detached) = take_token_context(context);
    match detached {
        Some(token) => {
            token.expire()?;
            Ok(rest)
        }
        None => Ok(rest),
    }
}
