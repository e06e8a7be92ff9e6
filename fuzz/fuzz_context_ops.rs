//! Fuzz target for context derivation and token detachment.
//!
//! Run with: cargo +nightly fuzz run fuzz_context_ops
//!
//! Each input byte selects an operation on one of a few live snapshots. The
//! result is checked against a plain model of which key is bound and how often
//! each token has been expired.

#![no_main]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use libfuzzer_sys::fuzz_target;
use threadline_core::{
    Context, ContextKey, Token, TokenError, TokenHandle, add_token_context, get_token_context,
    remove_token_context, take_token_context,
};

#[derive(Debug, Default)]
struct Counted {
    expired: AtomicUsize,
}

impl Token for Counted {
    fn expire(&self) -> Result<(), TokenError> {
        self.expired.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.expired.load(Ordering::SeqCst) == 0
    }
}

struct Tag;
impl ContextKey for Tag {
    type Value = u8;
    const NAME: &'static str = "tag";
}

/// A snapshot plus what the model says it holds.
#[derive(Clone)]
struct Tracked {
    ctx: Context,
    token: Option<usize>,
    tag: Option<u8>,
}

fuzz_target!(|data: &[u8]| {
    let mut tokens: Vec<Arc<Counted>> = Vec::new();
    let mut expected_expiries: Vec<usize> = Vec::new();
    let mut snapshots = vec![Tracked {
        ctx: Context::empty(),
        token: None,
        tag: None,
    }];

    for &byte in data {
        let slot = (byte >> 3) as usize % snapshots.len();
        let current = snapshots[slot].clone();

        let next = match byte & 0b111 {
            0 => {
                let token = Arc::new(Counted::default());
                tokens.push(Arc::clone(&token));
                expected_expiries.push(0);
                Tracked {
                    ctx: add_token_context(&current.ctx, token as TokenHandle),
                    token: Some(tokens.len() - 1),
                    ..current
                }
            }
            1 => {
                let ctx = remove_token_context(&current.ctx).unwrap();
                match current.token {
                    Some(index) => expected_expiries[index] += 1,
                    None => assert!(ctx == current.ctx),
                }
                Tracked {
                    ctx,
                    token: None,
                    ..current
                }
            }
            2 => {
                let (ctx, detached) = take_token_context(&current.ctx);
                assert_eq!(detached.is_some(), current.token.is_some());
                // Detached but never expired.
                drop(detached);
                Tracked {
                    ctx,
                    token: None,
                    ..current
                }
            }
            3 => Tracked {
                ctx: current.ctx.with::<Tag>(byte),
                tag: Some(byte),
                ..current
            },
            4 => Tracked {
                ctx: current.ctx.without::<Tag>(),
                tag: None,
                ..current
            },
            _ => current,
        };

        assert_eq!(get_token_context(&next.ctx).is_some(), next.token.is_some());
        assert_eq!(next.ctx.get::<Tag>().copied(), next.tag);
        assert_eq!(
            next.ctx.len(),
            usize::from(next.token.is_some()) + usize::from(next.tag.is_some())
        );

        if snapshots.len() < 8 {
            snapshots.push(next);
        } else {
            snapshots[slot] = next;
        }
    }

    for (token, expected) in tokens.iter().zip(expected_expiries) {
        assert_eq!(token.expired.load(Ordering::SeqCst), expected);
    }
});
