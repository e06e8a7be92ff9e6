//! The current context of a thread, and futures that carry their own.
//!
//! Every thread has a current [`Context`]. A [`WithContext`] future installs
//! its context for the duration of each poll and saves whatever the inner
//! future left behind, so a task keeps one logical context no matter which
//! worker thread resumes it.

use std::cell::RefCell;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use tokio::task::JoinHandle;

use super::Context;

thread_local! {
    static CURRENT: RefCell<Context> = RefCell::new(Context::empty());
}

impl Context {
    /// Snapshot of the calling thread's current context.
    pub fn current() -> Self {
        CURRENT.with(|current| current.borrow().clone())
    }

    /// Replace the calling thread's current context and return the previous one.
    pub fn set_current(context: Self) -> Self {
        CURRENT.with(|current| current.replace(context))
    }

    /// Make this context current until the returned guard is dropped.
    pub fn enter(&self) -> ContextGuard {
        ContextGuard {
            previous: Some(Self::set_current(self.clone())),
            _not_send: PhantomData,
        }
    }
}

/// Restores the previously current context when dropped.
///
/// Guards are tied to the thread that created them.
#[must_use = "the context is only current while the guard is alive"]
pub struct ContextGuard {
    previous: Option<Context>,
    _not_send: PhantomData<*const ()>,
}

impl ContextGuard {
    /// Restore the previous context and return the one that was current.
    pub fn exit(mut self) -> Context {
        self.restore().unwrap_or_default()
    }

    fn restore(&mut self) -> Option<Context> {
        self.previous.take().map(Context::set_current)
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        self.restore();
    }
}

/// A future that runs inside its own [`Context`].
///
/// Changes the inner future makes with [`Context::set_current`] persist across
/// polls but never leak to the thread that polls it.
#[must_use = "futures do nothing unless polled"]
pub struct WithContext<F> {
    inner: Pin<Box<F>>,
    context: Context,
}

impl<F> WithContext<F> {
    /// Wrap `future` so it runs in `context`.
    pub fn new(future: F, context: Context) -> Self {
        Self {
            inner: Box::pin(future),
            context,
        }
    }

    /// The context the future will observe on its next poll.
    pub fn context(&self) -> &Context {
        &self.context
    }
}

impl<F: Future> Future for WithContext<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        let guard = this.context.enter();
        let poll = this.inner.as_mut().poll(cx);
        this.context = guard.exit();
        poll
    }
}

/// Attach contexts to futures.
pub trait ContextFutureExt: Future + Sized {
    /// Run this future in `context`.
    fn with_context(self, context: Context) -> WithContext<Self> {
        WithContext::new(self, context)
    }

    /// Run this future in the caller's current context.
    fn in_current_context(self) -> WithContext<Self> {
        WithContext::new(self, Context::current())
    }
}

impl<F: Future> ContextFutureExt for F {}

/// Spawn a task on the tokio runtime that inherits the current context.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    tokio::spawn(future.in_current_context())
}

/// Run blocking work on tokio's blocking pool inside the current context.
pub fn spawn_blocking<F, R>(f: F) -> JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let context = Context::current();
    tokio::task::spawn_blocking(move || {
        let _guard = context.enter();
        f()
    })
}
