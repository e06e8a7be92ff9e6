//! Demo workloads that hand work across tasks inside a traced transaction.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result, anyhow};
use clap::ValueEnum;
use serde::Serialize;
use tracing::info;

use threadline_core::agent::{Agent, StatsSnapshot, current_transaction, launch, launch_blocking, trace};

/// A type-erased, `Send`-safe, boxed future.
type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Simulated work per step.
const STEP: Duration = Duration::from_millis(50);

/// Slack on top of the token timeout before a run is declared stuck.
const GRACE: Duration = Duration::from_secs(1);

/// Available workloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    /// Root work only, no hand-off.
    RunBlocking,
    /// One child task.
    Launch,
    /// Two children whose results are awaited in turn.
    AsyncAwait,
    /// Five children awaited together.
    AwaitAll,
    /// Hops onto the blocking pool and back.
    WithContext,
    /// Producer and consumer tasks joined by a channel.
    Channel,
    /// A child that launches its own child.
    Nested,
    /// A child aborted before it finishes; its token is left for the reaper.
    Cancellation,
    /// Many short-lived children.
    HighConcurrency,
}

impl Scenario {
    pub fn name(self) -> &'static str {
        match self {
            Self::RunBlocking => "run-blocking",
            Self::Launch => "launch",
            Self::AsyncAwait => "async-await",
            Self::AwaitAll => "await-all",
            Self::WithContext => "with-context",
            Self::Channel => "channel",
            Self::Nested => "nested",
            Self::Cancellation => "cancellation",
            Self::HighConcurrency => "high-concurrency",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::RunBlocking => "root work only, no tokens issued",
            Self::Launch => "one launched child",
            Self::AsyncAwait => "two children awaited one after the other",
            Self::AwaitAll => "five children awaited together",
            Self::WithContext => "a hop onto the blocking pool",
            Self::Channel => "producer and consumer over a channel",
            Self::Nested => "a child that launches a grandchild",
            Self::Cancellation => "an aborted child reclaimed by the token reaper",
            Self::HighConcurrency => "one hundred short-lived children",
        }
    }

    fn workload(self) -> BoxFuture<'static, Result<()>> {
        match self {
            Self::RunBlocking => Box::pin(async {
                tokio::time::sleep(STEP).await;
                Ok(())
            }),
            Self::Launch => Box::pin(async {
                launch(tokio::time::sleep(STEP)).await?;
                Ok(())
            }),
            Self::AsyncAwait => Box::pin(async {
                let first = launch(delayed("result1"));
                let second = launch(delayed("result2"));
                first.await?;
                second.await?;
                Ok(())
            }),
            Self::AwaitAll => Box::pin(async {
                let handles: Vec<_> = (0..5).map(|i| launch(delayed(i))).collect();
                for handle in handles {
                    handle.await?;
                }
                Ok(())
            }),
            Self::WithContext => Box::pin(async {
                let name = launch_blocking(|| {
                    std::thread::sleep(STEP);
                    current_transaction().map(|txn| txn.name().to_string())
                })
                .await?;
                if name.is_none() {
                    return Err(anyhow!("blocking hop lost the transaction"));
                }
                Ok(())
            }),
            Self::Channel => Box::pin(async {
                let (tx, mut rx) = tokio::sync::mpsc::channel::<u32>(2);
                let producer = launch(async move {
                    for i in 0..5 {
                        if tx.send(i).await.is_err() {
                            break;
                        }
                    }
                });
                let consumer = launch(async move {
                    let mut sum = 0;
                    while let Some(value) = rx.recv().await {
                        sum += value;
                    }
                    sum
                });
                producer.await?;
                let sum = consumer.await?;
                info!(sum, "Channel drained");
                Ok(())
            }),
            Self::Nested => Box::pin(async {
                launch(async {
                    tokio::time::sleep(STEP).await;
                    launch(tokio::time::sleep(STEP)).await
                })
                .await??;
                Ok(())
            }),
            Self::Cancellation => Box::pin(async {
                let child = launch(tokio::time::sleep(Duration::from_secs(3600)));
                tokio::time::sleep(STEP).await;
                child.abort();
                match child.await {
                    Err(err) if err.is_cancelled() => Ok(()),
                    Err(err) => Err(err.into()),
                    Ok(()) => Err(anyhow!("child finished before it was aborted")),
                }
            }),
            Self::HighConcurrency => Box::pin(async {
                let handles: Vec<_> = (0..100)
                    .map(|_| launch(async { tokio::task::yield_now().await }))
                    .collect();
                for handle in handles {
                    handle.await?;
                }
                Ok(())
            }),
        }
    }
}

async fn delayed<T>(value: T) -> T {
    tokio::time::sleep(STEP).await;
    value
}

/// Outcome of one scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub scenario: Scenario,
    pub transaction_id: u64,
    pub elapsed_ms: u64,
    pub stats: StatsSnapshot,
}

impl ScenarioReport {
    /// Human-readable rendering.
    pub fn render_text(&self) -> String {
        let mut out = format!(
            "scenario: {}\ntransaction: {}\nelapsed: {} ms\n",
            self.scenario.name(),
            self.transaction_id,
            self.elapsed_ms
        );
        for (metric, value) in self.stats.token_metrics() {
            out.push_str(&format!("{metric}: {value}\n"));
        }
        out
    }
}

/// Run `scenario` as a transaction and wait for every token to be released.
pub async fn run(agent: Arc<Agent>, scenario: Scenario) -> Result<ScenarioReport> {
    run_workload(agent, scenario, scenario.workload()).await
}

async fn run_workload(
    agent: Arc<Agent>,
    scenario: Scenario,
    workload: BoxFuture<'static, Result<()>>,
) -> Result<ScenarioReport> {
    let reaper = agent.spawn_reaper();
    let started = Instant::now();

    info!(scenario = scenario.name(), "Running scenario");
    let (result, txn) = trace(&agent, scenario.name(), workload).await;
    if let Err(err) = result {
        agent.shutdown();
        reaper.await.context("token reaper panicked")?;
        return Err(err.context(format!("scenario {} failed", scenario.name())));
    }

    let deadline = agent.config().token_timeout() + agent.config().reaper_interval() * 2 + GRACE;
    if txn.active_tokens() > 0 {
        info!(
            active = txn.active_tokens(),
            deadline_ms = deadline.as_millis() as u64,
            "Waiting for outstanding tokens"
        );
    }
    let completed = tokio::time::timeout(deadline, txn.wait_complete()).await;

    agent.shutdown();
    reaper.await.context("token reaper panicked")?;
    completed.map_err(|_| anyhow!("transaction did not complete within {deadline:?}"))?;

    Ok(ScenarioReport {
        scenario,
        transaction_id: txn.id(),
        elapsed_ms: started.elapsed().as_millis() as u64,
        stats: agent.stats(),
    })
}
