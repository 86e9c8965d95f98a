use crate::clients::EventStreamClient;
use crate::engine::ResolutionEngine;
use crate::publish::PublishReport;
use crate::runtime::error::EngineError;
use crate::runtime::telemetry::spawn_metrics_reporter;
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Result of one poll of the event stream.
#[derive(Debug)]
pub enum BatchOutcome {
    /// Nothing was pending.
    Idle,
    /// The batch was processed and acknowledged.
    Processed(PublishReport),
    /// The batch was rejected as a whole and left unacknowledged.
    Rejected(EngineError),
}

/// Drives the poll, process, acknowledge loop and handles OS signals for graceful shutdowns.
pub struct Runner {
    engine: Arc<ResolutionEngine>,
    stream: Arc<dyn EventStreamClient>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Runner {
    /// The runner shares the engine's cancellation token, so stopping the
    /// runner also aborts fetches that are still in flight.
    pub fn new(engine: ResolutionEngine, stream: Arc<dyn EventStreamClient>) -> Self {
        let shutdown = engine.cancellation_token();
        Self {
            engine: Arc::new(engine),
            stream,
            shutdown,
            tasks: Vec::new(),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn engine(&self) -> &ResolutionEngine {
        &self.engine
    }

    /// Polls once, processes whatever arrived and acknowledges it.
    ///
    /// Stream errors are returned; a batch rejected by the engine is not.
    pub async fn run_once(&self) -> Result<BatchOutcome> {
        poll_and_process(&self.engine, self.stream.as_ref()).await
    }

    /// Registers completeness DAGs, then spawns the poll loop and metrics reporter.
    pub async fn start(&mut self) -> Result<()> {
        if !self.tasks.is_empty() {
            return Ok(());
        }
        if self.shutdown.is_cancelled() {
            bail!("runner has been stopped and cannot be restarted");
        }

        let registered = self.engine.register_dags().await;
        if !registered.failed.is_empty() {
            tracing::warn!(
                failed = registered.failed.len(),
                successful = registered.successful.len(),
                "some completeness dag declarations were not registered"
            );
        }

        let config = self.engine.config();
        self.tasks.push(spawn_metrics_reporter(
            self.engine.telemetry(),
            self.shutdown.clone(),
            config.metrics_interval(),
        ));
        self.tasks.push(tokio::spawn(poll_loop(
            self.engine.clone(),
            self.stream.clone(),
            self.shutdown.clone(),
            config.idle_poll_backoff(),
        )));

        tracing::info!(group_id = config.group_id(), "runner started");
        Ok(())
    }

    /// Cancels the root token and waits for the background tasks to exit.
    pub async fn stop(&mut self) -> Result<()> {
        if self.tasks.is_empty() {
            return Ok(());
        }

        self.shutdown.cancel();
        for task in self.tasks.drain(..) {
            task.await.context("runner task failed to join")?;
        }
        tracing::info!("runner stopped");
        Ok(())
    }

    /// Runs until a Ctrl-C (SIGINT) is received or the shutdown token is cancelled elsewhere.
    pub async fn run_until_ctrl_c(&mut self) -> Result<()> {
        self.start().await?;
        tracing::info!("runner started; waiting for Ctrl-C (SIGINT) to initiate shutdown");

        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("Ctrl-C received; shutting down runner");
            }
            _ = self.shutdown.cancelled() => {
                tracing::info!("runner shutdown token cancelled");
            }
        }

        self.stop().await
    }
}

async fn poll_and_process(
    engine: &ResolutionEngine,
    stream: &dyn EventStreamClient,
) -> Result<BatchOutcome> {
    let group_id = engine.config().group_id();
    let events = stream
        .poll_events(group_id)
        .await
        .with_context(|| format!("failed to poll events for group {group_id}"))?;

    if events.is_empty() {
        return Ok(BatchOutcome::Idle);
    }

    match engine.process(&events).await {
        Ok(report) => {
            stream
                .mark_consumed(group_id, &events)
                .await
                .with_context(|| format!("failed to acknowledge {} events", events.len()))?;
            Ok(BatchOutcome::Processed(report))
        }
        Err(err) => {
            tracing::error!(
                group_id,
                events = events.len(),
                error = %err,
                "batch rejected; leaving it unacknowledged"
            );
            Ok(BatchOutcome::Rejected(err))
        }
    }
}

async fn poll_loop(
    engine: Arc<ResolutionEngine>,
    stream: Arc<dyn EventStreamClient>,
    shutdown: CancellationToken,
    idle_backoff: Duration,
) {
    while !shutdown.is_cancelled() {
        let outcome = poll_and_process(&engine, stream.as_ref()).await;
        let pause = match outcome {
            Ok(BatchOutcome::Processed(_)) => continue,
            Ok(BatchOutcome::Idle) | Ok(BatchOutcome::Rejected(_)) => idle_backoff,
            Err(err) => {
                tracing::warn!(error = %err, "event stream call failed");
                idle_backoff
            }
        };

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(pause) => {}
        }
    }
    tracing::debug!("poll loop exited");
}
