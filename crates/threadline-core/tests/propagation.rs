//! Token hand-off across tokio tasks and threads.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use threadline_core::agent::{Agent, current_transaction, launch, launch_blocking, trace};
use threadline_core::context::scope;
use threadline_core::{
    Context, ContextFutureExt, add_token_context, get_token_context, remove_token_context,
    same_token,
};
use threadline_test_utils::SpyToken;
use threadline_test_utils::config::TestConfigBuilder;
use threadline_test_utils::tracing_setup::init_test_tracing;

const WAIT: Duration = Duration::from_secs(5);

fn agent() -> Agent {
    Agent::new(TestConfigBuilder::new().build().agent)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn token_survives_thread_hops() {
    let spy = SpyToken::new();
    let ctx = add_token_context(&Context::empty(), spy.handle());

    let seen = async {
        scope::spawn(async {
            let mut seen = Vec::new();
            for _ in 0..20 {
                tokio::task::yield_now().await;
                seen.push(get_token_context(&Context::current()).is_some());
            }
            seen
        })
        .await
    }
    .with_context(ctx)
    .await
    .unwrap();

    assert!(seen.into_iter().all(|bound| bound));
    assert_eq!(spy.expire_calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sibling_tasks_do_not_share_changes() {
    let spy = SpyToken::new();
    let shared = add_token_context(&Context::empty(), spy.handle());

    let detacher = tokio::spawn(
        async {
            let rest = remove_token_context(&Context::current()).unwrap();
            Context::set_current(rest);
            get_token_context(&Context::current()).is_none()
        }
        .with_context(shared.clone()),
    );
    let reader = tokio::spawn(
        async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            get_token_context(&Context::current())
        }
        .with_context(shared.clone()),
    );

    assert!(detacher.await.unwrap());
    let still_bound = reader.await.unwrap().expect("sibling keeps the token");
    assert!(same_token(&still_bound, &spy.handle()));
    assert_eq!(spy.expire_calls(), 1);
    assert!(get_token_context(&shared).is_some());
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn launch_propagates_transaction_to_other_thread() {
    let agent = agent();
    let (child, txn) = trace(&agent, "propagation", async {
        launch(async { current_transaction().map(|t| t.id()) })
    })
    .await;

    assert_eq!(child.await.unwrap(), Some(txn.id()));
    tokio::time::timeout(WAIT, txn.wait_complete()).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn await_all_children_expire_their_tokens() {
    let agent = agent();
    let (sum, txn) = trace(&agent, "await-all", async {
        let handles: Vec<_> = (0..5u64)
            .map(|i| {
                launch(async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    i
                })
            })
            .collect();
        let mut sum = 0;
        for handle in handles {
            sum += handle.await.unwrap();
        }
        sum
    })
    .await;

    assert_eq!(sum, 10);
    tokio::time::timeout(WAIT, txn.wait_complete()).await.unwrap();
    let stats = agent.stats();
    assert_eq!(stats.token_create, 5);
    assert_eq!(stats.token_expire, 5);
    assert_eq!(stats.token_link_success, 5);
    assert_eq!(stats.token_timeout, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn nested_launches_each_get_their_own_token() {
    let agent = agent();
    let (inner_tokens, txn) = trace(&agent, "nested", async {
        launch(async {
            let outer = get_token_context(&Context::current()).unwrap();
            let inner = launch(async { get_token_context(&Context::current()).unwrap() })
                .await
                .unwrap();
            let outer_after = get_token_context(&Context::current()).unwrap();
            (
                same_token(&outer, &inner),
                same_token(&outer, &outer_after),
            )
        })
        .await
        .unwrap()
    })
    .await;

    let (shared_with_inner, outer_unchanged) = inner_tokens;
    assert!(!shared_with_inner);
    assert!(outer_unchanged);

    tokio::time::timeout(WAIT, txn.wait_complete()).await.unwrap();
    let stats = agent.stats();
    assert_eq!(stats.token_create, 2);
    assert_eq!(stats.token_expire, 2);
}

#[tokio::test]
async fn channel_consumer_runs_in_transaction() {
    let agent = agent();
    let (received, txn) = trace(&agent, "channel", async {
        let (tx, mut rx) = tokio::sync::mpsc::channel::<u32>(4);
        let producer = launch(async move {
            for i in 0..3 {
                tx.send(i).await.unwrap();
            }
        });
        let consumer = launch(async move {
            let mut got = Vec::new();
            while let Some(value) = rx.recv().await {
                got.push(value);
            }
            (got, current_transaction().is_some())
        });
        producer.await.unwrap();
        consumer.await.unwrap()
    })
    .await;

    assert_eq!(received, (vec![0, 1, 2], true));
    tokio::time::timeout(WAIT, txn.wait_complete()).await.unwrap();
    assert_eq!(agent.stats().token_expire, 2);
}

#[tokio::test]
async fn with_blocking_hop_expires_token() {
    let agent = agent();
    let (value, txn) = trace(&agent, "with-context", async {
        launch_blocking(|| {
            std::thread::sleep(Duration::from_millis(5));
            current_transaction().map(|t| t.name().to_string())
        })
        .await
        .unwrap()
    })
    .await;

    assert_eq!(value.as_deref(), Some("with-context"));
    tokio::time::timeout(WAIT, txn.wait_complete()).await.unwrap();
    assert_eq!(agent.stats().token_expire, 1);
}

#[tokio::test]
async fn cancelled_child_is_timed_out_by_reaper() {
    init_test_tracing();
    let agent = Arc::new(Agent::new(
        TestConfigBuilder::new().fast_reaper().build().agent,
    ));
    let reaper = agent.spawn_reaper();

    let (_, txn) = trace(&agent, "cancellation", async {
        let child = launch(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        child.abort();
        assert!(child.await.unwrap_err().is_cancelled());
    })
    .await;

    assert!(!txn.is_complete());
    tokio::time::timeout(WAIT, txn.wait_complete()).await.unwrap();

    let stats = agent.stats();
    assert_eq!(stats.token_create, 1);
    assert_eq!(stats.token_expire, 0);
    assert_eq!(stats.token_timeout, 1);

    agent.shutdown();
    reaper.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn high_concurrency_releases_every_token() {
    let agent = agent();
    let (_, txn) = trace(&agent, "high-concurrency", async {
        let handles: Vec<_> = (0..200)
            .map(|_| launch(async { tokio::task::yield_now().await }))
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
    })
    .await;

    tokio::time::timeout(WAIT, txn.wait_complete()).await.unwrap();
    let stats = agent.stats();
    assert_eq!(stats.token_create, 200);
    assert_eq!(stats.token_expire, 200);
    assert_eq!(stats.outstanding_tokens(), 0);
    assert_eq!(txn.active_tokens(), 0);
}

#[tokio::test]
async fn root_context_is_untouched_after_trace() {
    let agent = agent();
    let _ = trace(&agent, "scoped", async {}).await;
    assert!(current_transaction().is_none());
    assert!(Context::current().is_empty());
}
