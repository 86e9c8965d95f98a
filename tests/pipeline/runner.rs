use std::sync::Arc;
use std::time::Duration;

use crate::support::{
    helpers::{base_config, init_tracing, observation, patient_published, Harness},
    memory::MemoryStream,
};
use anyhow::{bail, Result};
use refetch::{BatchOutcome, EngineError, Runner};
use tokio::time::{sleep, timeout, Instant};

fn harness() -> Harness {
    Harness::new(vec![
        observation("obs-1", "123", "laboratory", "2024-01-05T10:00:00Z"),
        observation("obs-2", "456", "laboratory", "2024-01-06T10:00:00Z"),
    ])
}

async fn wait_for_consumed(stream: &MemoryStream, expected: usize, limit: Duration) -> Result<()> {
    let deadline = Instant::now() + limit;
    while stream.consumed().len() < expected {
        if Instant::now() >= deadline {
            bail!(
                "only {} of {expected} batches consumed within {limit:?}",
                stream.consumed().len()
            );
        }
        sleep(Duration::from_millis(10)).await;
    }
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn run_once_processes_and_acknowledges() -> Result<()> {
    init_tracing();
    let harness = harness();
    let stream = Arc::new(MemoryStream::with_batches(vec![vec![
        patient_published("run-1", "tenant-a", "123"),
    ]]));
    let runner = Runner::new(harness.observation_engine(base_config().build()?)?, stream.clone());

    match runner.run_once().await? {
        BatchOutcome::Processed(report) => assert_eq!(report.published_count, 1),
        other => bail!("expected a processed batch, got {other:?}"),
    }
    assert_eq!(stream.consumed().len(), 1);

    assert!(matches!(runner.run_once().await?, BatchOutcome::Idle));
    assert_eq!(stream.polls(), 2);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rejected_batch_is_left_unacknowledged() -> Result<()> {
    init_tracing();
    let harness = harness();
    let stream = Arc::new(MemoryStream::with_batches(vec![vec![patient_published(
        "run-1", "", "123",
    )]]));
    let runner = Runner::new(harness.observation_engine(base_config().build()?)?, stream.clone());

    for _ in 0..2 {
        match runner.run_once().await? {
            BatchOutcome::Rejected(EngineError::MalformedEvent { index, .. }) => {
                assert_eq!(index, 0)
            }
            other => bail!("expected a rejected batch, got {other:?}"),
        }
    }
    assert!(stream.consumed().is_empty());
    assert!(harness.sink.batches().is_empty());
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn started_runner_drains_stream_until_stopped() -> Result<()> {
    init_tracing();
    let harness = harness();
    let stream = Arc::new(MemoryStream::with_batches(vec![
        vec![patient_published("run-1", "tenant-a", "123")],
        vec![
            patient_published("run-2", "tenant-a", "456"),
            patient_published("run-2", "tenant-b", "123"),
        ],
    ]));
    let mut runner =
        Runner::new(harness.observation_engine(base_config().build()?)?, stream.clone());

    runner.start().await?;
    wait_for_consumed(&stream, 2, Duration::from_secs(5)).await?;
    timeout(Duration::from_secs(5), runner.stop()).await??;

    assert_eq!(harness.completeness.pushed().len(), 1);
    let mut published = harness.sink.published_ids();
    published.sort();
    assert_eq!(published, vec!["obs-1", "obs-1", "obs-2"]);
    assert_eq!(runner.engine().telemetry().snapshot().events, 3);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancellation_token_stops_run_until_ctrl_c() -> Result<()> {
    init_tracing();
    let harness = harness();
    let stream = Arc::new(MemoryStream::default());
    let mut runner =
        Runner::new(harness.observation_engine(base_config().build()?)?, stream.clone());
    let token = runner.cancellation_token();

    let canceller = tokio::spawn(async move {
        sleep(Duration::from_millis(100)).await;
        token.cancel();
    });

    timeout(Duration::from_secs(5), runner.run_until_ctrl_c()).await??;
    canceller.await?;
    assert!(stream.polls() >= 1);
    Ok(())
}
