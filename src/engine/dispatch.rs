use crate::resolve::{execute_call, FetchCall, FetchedResources};
use crate::resources::ResourceStrategy;
use crate::runtime::backoff::{retry_with_backoff, RetryPolicy};
use crate::runtime::error::panic_message;
use crate::runtime::telemetry::Telemetry;
use anyhow::{anyhow, Result};
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// One planned call, tagged with the strategy that owns it.
pub(crate) struct FetchJob {
    pub strategy: usize,
    pub executor: Arc<dyn ResourceStrategy>,
    pub call: FetchCall,
}

pub(crate) enum CallOutcome {
    Fetched(FetchedResources),
    Failed(String),
    /// The batch deadline or shutdown hit before the call finished.
    Abandoned,
}

pub(crate) struct CompletedCall {
    pub strategy: usize,
    pub call: FetchCall,
    pub outcome: CallOutcome,
}

/// Runs fetch calls concurrently, bounded by a shared permit pool.
pub(crate) struct Dispatcher {
    limiter: Arc<Semaphore>,
    policy: RetryPolicy,
    batch_timeout: Duration,
    telemetry: Arc<Telemetry>,
}

impl Dispatcher {
    pub(crate) fn new(
        worker_count: usize,
        policy: RetryPolicy,
        batch_timeout: Duration,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            limiter: Arc::new(Semaphore::new(worker_count.max(1))),
            policy,
            batch_timeout,
            telemetry,
        }
    }

    /// Every job yields exactly one [`CompletedCall`]. Calls still running when
    /// the deadline passes or `shutdown` fires are aborted and reported as
    /// abandoned; finished calls are kept.
    pub(crate) async fn run(
        &self,
        jobs: Vec<FetchJob>,
        shutdown: &CancellationToken,
    ) -> Vec<CompletedCall> {
        let run_token = shutdown.child_token();
        let mut pending: HashMap<usize, (usize, FetchCall)> = HashMap::with_capacity(jobs.len());
        let mut tasks = JoinSet::new();

        for (job_id, job) in jobs.into_iter().enumerate() {
            let call = job.call.clone();
            pending.insert(job_id, (job.strategy, job.call));
            tasks.spawn(run_job(
                job_id,
                job.executor,
                call,
                self.limiter.clone(),
                self.policy,
                run_token.clone(),
                self.telemetry.clone(),
            ));
        }

        let mut completed = Vec::with_capacity(pending.len());
        let deadline = tokio::time::sleep(self.batch_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok((job_id, result))) => {
                        let Some((strategy, call)) = pending.remove(&job_id) else {
                            continue;
                        };
                        let outcome = match result {
                            Ok(fetched) => CallOutcome::Fetched(fetched),
                            Err(err) => CallOutcome::Failed(format!("{err:#}")),
                        };
                        completed.push(CompletedCall { strategy, call, outcome });
                    }
                    Some(Err(join_err)) => {
                        tracing::error!(error = %join_err, "fetch task did not complete");
                    }
                },
                _ = &mut deadline => {
                    tracing::warn!(
                        timeout_ms = self.batch_timeout.as_millis() as u64,
                        outstanding = pending.len(),
                        "batch timeout reached; abandoning outstanding fetches"
                    );
                    break;
                }
                _ = shutdown.cancelled() => {
                    tracing::warn!(
                        outstanding = pending.len(),
                        "shutdown requested; abandoning outstanding fetches"
                    );
                    break;
                }
            }
        }

        run_token.cancel();
        tasks.abort_all();
        while tasks.join_next().await.is_some() {}

        let mut abandoned: Vec<_> = pending.into_iter().collect();
        abandoned.sort_by_key(|(job_id, _)| *job_id);
        for (_, (strategy, call)) in abandoned {
            completed.push(CompletedCall {
                strategy,
                call,
                outcome: CallOutcome::Abandoned,
            });
        }

        completed
    }
}

async fn run_job(
    job_id: usize,
    executor: Arc<dyn ResourceStrategy>,
    call: FetchCall,
    limiter: Arc<Semaphore>,
    policy: RetryPolicy,
    cancellation: CancellationToken,
    telemetry: Arc<Telemetry>,
) -> (usize, Result<FetchedResources>) {
    let _permit = match limiter.acquire_owned().await {
        Ok(permit) => permit,
        Err(err) => return (job_id, Err(anyhow!("fetch pool closed: {err}"))),
    };

    let _in_flight = telemetry.track_call();
    let attempt = retry_with_backoff(
        policy,
        &cancellation,
        |_| {
            telemetry.record_fetch_call();
            execute_call(executor.as_ref(), &call)
        },
        |attempt, delay, err| {
            tracing::warn!(
                tenant = call.tenant(),
                keys = call.keys().len(),
                attempt,
                retry_in_ms = delay.as_millis() as u64,
                error = %err,
                "fetch call failed; retrying"
            );
        },
    );
    let result = match AssertUnwindSafe(attempt).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(anyhow!("fetch call panicked: {}", panic_message(panic.as_ref()))),
    };

    (job_id, result)
}
