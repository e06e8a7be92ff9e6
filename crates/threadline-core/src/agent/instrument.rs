//! Task builders that carry a token across the spawn boundary.
//!
//! When the spawning context belongs to a transaction, [`launch`] issues a
//! token, binds it into the child's context, links it when the child starts
//! and detaches it when the child finishes. An aborted child never reaches
//! the detach; its token is left to the agent's reaper.

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::warn;

use super::{Agent, Transaction};
use crate::carrier::{add_token_context, get_token_context};
use crate::context::scope::ContextFutureExt;
use crate::context::{Context, ContextKey};
use crate::lifecycle::remove_token_context;

/// Context key binding the transaction that owns the current work.
#[derive(Debug)]
pub struct TransactionKey;

impl ContextKey for TransactionKey {
    type Value = Arc<Transaction>;
    const NAME: &'static str = "transaction";
}

/// The transaction bound in the current context.
pub fn current_transaction() -> Option<Arc<Transaction>> {
    Context::current().get::<TransactionKey>().cloned()
}

/// Run `future` as the root of a new transaction.
///
/// The transaction is bound into the future's context and its root is
/// finished when the future completes. Tokens handed to children keep it
/// open until they are released; await
/// [`Transaction::wait_complete`] to observe that.
pub async fn trace<F>(agent: &Agent, name: &str, future: F) -> (F::Output, Arc<Transaction>)
where
    F: Future,
{
    let txn = agent.start_transaction(name);
    let context = Context::current().with::<TransactionKey>(Arc::clone(&txn));
    let output = future.with_context(context).await;
    txn.finish();
    (output, txn)
}

/// Spawn `future` on the tokio runtime, handing it a token of the current
/// transaction.
pub fn launch<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let context = handoff_context();
    tokio::spawn(
        async move {
            link_current_token();
            let output = future.await;
            release_current_token();
            output
        }
        .with_context(context),
    )
}

/// Run blocking `f` on tokio's blocking pool, handing it a token of the
/// current transaction.
pub fn launch_blocking<F, R>(f: F) -> JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let context = handoff_context();
    tokio::task::spawn_blocking(move || {
        let _guard = context.enter();
        link_current_token();
        let output = f();
        release_current_token();
        output
    })
}

/// The current context, with a fresh token bound when a transaction is present.
fn handoff_context() -> Context {
    let parent = Context::current();
    match parent.get::<TransactionKey>() {
        Some(txn) => add_token_context(&parent, txn.token()),
        None => parent,
    }
}

fn link_current_token() {
    if let Some(token) = get_token_context(&Context::current()) {
        token.link();
    }
}

fn release_current_token() {
    match remove_token_context(&Context::current()) {
        Ok(rest) => {
            Context::set_current(rest);
        }
        Err(err) => warn!(error = %err, "Failed to expire token at end of task"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_launch_outside_transaction_issues_no_token() {
        let had_token = launch(async { get_token_context(&Context::current()).is_some() })
            .await
            .unwrap();
        assert!(!had_token);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_launch_links_and_expires() {
        let agent = Agent::default();
        let (child, txn) = trace(&agent, "launch", async {
            launch(async {
                let token = get_token_context(&Context::current()).expect("token bound");
                (token.is_active(), current_transaction().map(|t| t.id()))
            })
        })
        .await;

        let (was_active, child_txn) = child.await.unwrap();
        assert!(was_active);
        assert_eq!(child_txn, Some(txn.id()));

        txn.wait_complete().await;
        let stats = agent.stats();
        assert_eq!(stats.token_create, 1);
        assert_eq!(stats.token_link_success, 1);
        assert_eq!(stats.token_expire, 1);
        assert_eq!(stats.transactions_completed, 1);
    }

    #[tokio::test]
    async fn test_launch_blocking_links_and_expires() {
        let agent = Agent::default();
        let (handle, txn) = trace(&agent, "blocking", async {
            launch_blocking(|| current_transaction().is_some())
        })
        .await;

        assert!(handle.await.unwrap());
        txn.wait_complete().await;
        assert_eq!(agent.stats().token_expire, 1);
    }

    #[tokio::test]
    async fn test_parent_context_keeps_no_token() {
        let agent = Agent::default();
        let (parent_had_token, txn) = trace(&agent, "parent", async {
            let child = launch(async {});
            let _ = child.await;
            get_token_context(&Context::current()).is_some()
        })
        .await;

        assert!(!parent_had_token);
        txn.wait_complete().await;
    }
}
