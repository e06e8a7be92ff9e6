//! Binding, reading, and detaching tokens on plain contexts.

use pretty_assertions::assert_eq;
use threadline_core::{
    Context, TokenError, add_token_context, get_token_context, remove_token_context, same_token,
    take_token_context,
};
use threadline_test_utils::{FailingToken, SpyToken};

struct Tenant;
impl threadline_core::ContextKey for Tenant {
    type Value = &'static str;
    const NAME: &'static str = "tenant";
}

/// Contexts the properties are checked against.
fn sample_contexts() -> Vec<Context> {
    let empty = Context::empty();
    let tenant = empty.with::<Tenant>("acme");
    let removed = tenant.without::<Tenant>();
    let previously_bound = remove_token_context(&add_token_context(&tenant, SpyToken::new().handle()))
        .expect("spy tokens never fail");
    vec![empty, tenant, removed, previously_bound]
}

#[test]
fn read_returns_attached_token() {
    for ctx in sample_contexts() {
        let spy = SpyToken::new();
        let bound = add_token_context(&ctx, spy.handle());
        let read = get_token_context(&bound).expect("token should be bound");
        assert!(same_token(&read, &spy.handle()));
        assert_eq!(spy.expire_calls(), 0);
    }
}

#[test]
fn detach_after_attach_leaves_nothing_bound() {
    for ctx in sample_contexts() {
        let spy = SpyToken::new();
        let detached = remove_token_context(&add_token_context(&ctx, spy.handle())).unwrap();
        assert!(get_token_context(&detached).is_none());
        assert_eq!(spy.expire_calls(), 1);
    }
}

#[test]
fn detach_without_binding_is_noop() {
    for ctx in sample_contexts() {
        let after = remove_token_context(&ctx).unwrap();
        assert_eq!(after, ctx);
    }
}

#[test]
fn detach_keeps_other_keys() {
    let ctx = Context::empty().with::<Tenant>("acme");
    let ctx = remove_token_context(&add_token_context(&ctx, SpyToken::new().handle())).unwrap();
    assert_eq!(ctx.get::<Tenant>(), Some(&"acme"));
}

#[test]
fn second_attach_replaces_without_expiring() {
    let first = SpyToken::new();
    let second = SpyToken::new();

    let ctx = add_token_context(&Context::empty(), first.handle());
    let ctx = add_token_context(&ctx, second.handle());

    let read = get_token_context(&ctx).unwrap();
    assert!(same_token(&read, &second.handle()));
    assert_eq!(first.expire_calls(), 0);

    let _ = remove_token_context(&ctx).unwrap();
    assert_eq!(second.expire_calls(), 1);
    // The replaced token is never released by the context.
    assert_eq!(first.expire_calls(), 0);
}

#[test]
fn reads_never_expire() {
    let spy = SpyToken::new();
    let ctx = add_token_context(&Context::empty(), spy.handle());
    for _ in 0..10 {
        assert!(get_token_context(&ctx).is_some());
    }
    assert_eq!(spy.expire_calls(), 0);
    assert_eq!(spy.link_calls(), 0);
}

#[test]
fn detach_expires_exactly_once() {
    let spy = SpyToken::new();
    let ctx = add_token_context(&Context::empty(), spy.handle());
    let _ = remove_token_context(&ctx).unwrap();
    assert_eq!(spy.expire_calls(), 1);
}

#[test]
fn forked_snapshots_are_isolated() {
    let token_a = SpyToken::new();
    let c0 = Context::empty();
    let c1 = add_token_context(&c0, token_a.handle());
    let c1a = c1.clone();
    let c1b = c1.clone();

    let detached = remove_token_context(&c1a).unwrap();
    assert_eq!(token_a.expire_calls(), 1);
    assert!(get_token_context(&detached).is_none());

    let still_bound = get_token_context(&c1b).expect("sibling keeps its binding");
    assert!(same_token(&still_bound, &token_a.handle()));
}

#[test]
fn removing_twice_on_returned_value_is_noop() {
    let spy = SpyToken::new();
    let ctx = add_token_context(&Context::empty(), spy.handle());

    let once = remove_token_context(&ctx).unwrap();
    let twice = remove_token_context(&once).unwrap();

    assert_eq!(twice, once);
    assert_eq!(spy.expire_calls(), 1);
}

#[test]
fn detaching_duplicated_snapshots_expires_twice() {
    // Callers own the "remove once per unit of work" rule; the context does not
    // serialize removals from duplicated snapshots.
    let spy = SpyToken::new();
    let ctx = add_token_context(&Context::empty(), spy.handle());
    let _ = remove_token_context(&ctx.clone()).unwrap();
    let _ = remove_token_context(&ctx).unwrap();
    assert_eq!(spy.expire_calls(), 2);
}

#[test]
fn expire_failure_propagates_to_caller() {
    let failing = FailingToken::new(TokenError::AlreadyExpired { id: 4 });
    let ctx = add_token_context(&Context::empty(), failing.handle());

    let err = remove_token_context(&ctx).unwrap_err();
    assert_eq!(err, TokenError::AlreadyExpired { id: 4 });
    assert_eq!(failing.expire_calls(), 1);
}

#[test]
fn take_then_expire_is_two_steps() {
    let spy = SpyToken::new();
    let ctx = add_token_context(&Context::empty(), spy.handle());

    let (rest, detached) = take_token_context(&ctx);
    assert!(get_token_context(&rest).is_none());
    assert_eq!(spy.expire_calls(), 0);

    detached.expect("binding present").expire().unwrap();
    assert_eq!(spy.expire_calls(), 1);

    let (again, nothing) = take_token_context(&rest);
    assert!(nothing.is_none());
    assert_eq!(again, rest);
}

#[test]
fn dropping_a_bound_context_does_not_expire() {
    let spy = SpyToken::new();
    drop(add_token_context(&Context::empty(), spy.handle()));
    assert_eq!(spy.expire_calls(), 0);
}
