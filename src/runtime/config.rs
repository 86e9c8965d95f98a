use crate::runtime::telemetry;
use anyhow::{bail, Context, Result};
use std::time::Duration;

const DEFAULT_WORKER_COUNT: usize = 8;
const DEFAULT_MAX_BACKFILL_DAYS: u32 = 30;
const DEFAULT_BATCH_TIMEOUT_SECS: u64 = 300;
const DEFAULT_FETCH_MAX_ATTEMPTS: usize = 3;
const DEFAULT_FETCH_INITIAL_BACKOFF_MS: u64 = 200;
const DEFAULT_FETCH_MAX_BACKOFF_MS: u64 = 2_000;
const DEFAULT_IDLE_POLL_BACKOFF_SECS: u64 = 1;

/// Runtime configuration for the resolution engine and its poll loop.
///
/// All instances must be constructed via [`EngineConfig::builder`] or [`EngineConfig::new`]
/// so invariants are validated before any consumer observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    group_id: String,
    worker_count: usize,
    max_backfill_days: u32,
    batch_timeout: Duration,
    fetch_max_attempts: usize,
    fetch_initial_backoff: Duration,
    fetch_max_backoff: Duration,
    dag_registration_enabled: bool,
    metrics_interval: Duration,
    idle_poll_backoff: Duration,
}

pub struct EngineConfigParams {
    pub group_id: String,
    pub worker_count: usize,
    pub max_backfill_days: u32,
    pub batch_timeout: Duration,
    pub fetch_max_attempts: usize,
    pub fetch_initial_backoff: Duration,
    pub fetch_max_backoff: Duration,
    pub dag_registration_enabled: bool,
    pub metrics_interval: Duration,
    pub idle_poll_backoff: Duration,
}

impl EngineConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    ///
    /// Prefer [`EngineConfig::builder`] when most values use defaults.
    pub fn new(params: EngineConfigParams) -> Result<Self> {
        let EngineConfigParams {
            group_id,
            worker_count,
            max_backfill_days,
            batch_timeout,
            fetch_max_attempts,
            fetch_initial_backoff,
            fetch_max_backoff,
            dag_registration_enabled,
            metrics_interval,
            idle_poll_backoff,
        } = params;

        let config = Self {
            group_id: group_id.trim().to_owned(),
            worker_count,
            max_backfill_days,
            batch_timeout,
            fetch_max_attempts,
            fetch_initial_backoff,
            fetch_max_backoff,
            dag_registration_enabled,
            metrics_interval,
            idle_poll_backoff,
        };

        config.validate()?;
        Ok(config)
    }

    /// Consumer group polled on the event stream.
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// Maximum number of downstream fetch calls in flight at once.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Longest sub-range, in tenant-local days, of a single windowed fetch.
    pub fn max_backfill_days(&self) -> u32 {
        self.max_backfill_days
    }

    /// Deadline for the fetch phase of one batch.
    pub fn batch_timeout(&self) -> Duration {
        self.batch_timeout
    }

    pub fn fetch_max_attempts(&self) -> usize {
        self.fetch_max_attempts
    }

    pub fn fetch_initial_backoff(&self) -> Duration {
        self.fetch_initial_backoff
    }

    pub fn fetch_max_backoff(&self) -> Duration {
        self.fetch_max_backoff
    }

    /// Whether completeness DAG declarations are pushed at startup.
    pub fn dag_registration_enabled(&self) -> bool {
        self.dag_registration_enabled
    }

    /// Interval used by the telemetry reporter.
    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    /// Pause after a poll that returned no events.
    pub fn idle_poll_backoff(&self) -> Duration {
        self.idle_poll_backoff
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        if self.group_id.is_empty() {
            bail!("group_id cannot be empty");
        }

        if self.worker_count == 0 {
            bail!("worker_count must be greater than 0");
        }

        if self.max_backfill_days == 0 {
            bail!("max_backfill_days must be greater than 0");
        }

        if self.batch_timeout.is_zero() {
            bail!("batch_timeout must be greater than 0");
        }

        if self.fetch_max_attempts == 0 {
            bail!("fetch_max_attempts must be greater than 0");
        }

        if self.fetch_max_backoff < self.fetch_initial_backoff {
            bail!(
                "fetch_max_backoff ({:?}) must not be shorter than fetch_initial_backoff ({:?})",
                self.fetch_max_backoff,
                self.fetch_initial_backoff,
            );
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        if self.idle_poll_backoff.is_zero() {
            bail!("idle_poll_backoff must be greater than 0");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct EngineConfigBuilder {
    group_id: Option<String>,
    worker_count: Option<usize>,
    max_backfill_days: Option<u32>,
    batch_timeout: Option<Duration>,
    fetch_max_attempts: Option<usize>,
    fetch_initial_backoff: Option<Duration>,
    fetch_max_backoff: Option<Duration>,
    dag_registration_enabled: Option<bool>,
    metrics_interval: Option<Duration>,
    idle_poll_backoff: Option<Duration>,
}

impl EngineConfigBuilder {
    pub fn group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn worker_count(mut self, count: usize) -> Self {
        self.worker_count = Some(count);
        self
    }

    pub fn max_backfill_days(mut self, days: u32) -> Self {
        self.max_backfill_days = Some(days);
        self
    }

    pub fn batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = Some(timeout);
        self
    }

    pub fn fetch_max_attempts(mut self, attempts: usize) -> Self {
        self.fetch_max_attempts = Some(attempts);
        self
    }

    pub fn fetch_initial_backoff(mut self, backoff: Duration) -> Self {
        self.fetch_initial_backoff = Some(backoff);
        self
    }

    pub fn fetch_max_backoff(mut self, backoff: Duration) -> Self {
        self.fetch_max_backoff = Some(backoff);
        self
    }

    pub fn dag_registration_enabled(mut self, enabled: bool) -> Self {
        self.dag_registration_enabled = Some(enabled);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn idle_poll_backoff(mut self, backoff: Duration) -> Self {
        self.idle_poll_backoff = Some(backoff);
        self
    }

    pub fn build(self) -> Result<EngineConfig> {
        let params = EngineConfigParams {
            group_id: self.group_id.context("group_id is required")?,
            worker_count: self.worker_count.unwrap_or(DEFAULT_WORKER_COUNT),
            max_backfill_days: self.max_backfill_days.unwrap_or(DEFAULT_MAX_BACKFILL_DAYS),
            batch_timeout: self
                .batch_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_BATCH_TIMEOUT_SECS)),
            fetch_max_attempts: self
                .fetch_max_attempts
                .unwrap_or(DEFAULT_FETCH_MAX_ATTEMPTS),
            fetch_initial_backoff: self
                .fetch_initial_backoff
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_FETCH_INITIAL_BACKOFF_MS)),
            fetch_max_backoff: self
                .fetch_max_backoff
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_FETCH_MAX_BACKOFF_MS)),
            dag_registration_enabled: self.dag_registration_enabled.unwrap_or(true),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
            idle_poll_backoff: self
                .idle_poll_backoff
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_IDLE_POLL_BACKOFF_SECS)),
        };

        EngineConfig::new(params)
    }
}
