use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(5);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

pub struct InFlightCall {
    telemetry: Arc<Telemetry>,
}

impl Drop for InFlightCall {
    fn drop(&mut self) {
        self.telemetry.call_finished();
    }
}

/// Monotonic counters covering every stage of batch resolution.
#[derive(Default, Debug)]
pub struct Telemetry {
    events: AtomicU64,
    keys: AtomicU64,
    fetch_calls: AtomicU64,
    fetch_failures: AtomicU64,
    published: AtomicU64,
    transform_failures: AtomicU64,
    publish_failures: AtomicU64,
    conflicts: AtomicU64,
    in_flight_calls: AtomicUsize,
}

impl Telemetry {
    pub fn record_events(&self, count: usize) {
        add(&self.events, count);
    }

    pub fn record_keys(&self, count: usize) {
        add(&self.keys, count);
    }

    pub fn record_fetch_call(&self) {
        self.fetch_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_failures(&self, keys: usize) {
        add(&self.fetch_failures, keys);
    }

    pub fn record_published(&self, count: usize) {
        add(&self.published, count);
    }

    pub fn record_transform_failure(&self) {
        self.transform_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_failures(&self, count: usize) {
        add(&self.publish_failures, count);
    }

    pub fn record_conflicts(&self, count: usize) {
        add(&self.conflicts, count);
    }

    pub fn call_started(&self) {
        self.in_flight_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn call_finished(&self) {
        let _ = self
            .in_flight_calls
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_sub(1))
            });
    }

    /// Counts one fetch call as in flight until the returned guard drops,
    /// including when the task running the call is aborted.
    pub fn track_call(self: &Arc<Self>) -> InFlightCall {
        self.call_started();
        InFlightCall {
            telemetry: Arc::clone(self),
        }
    }

    pub fn in_flight_calls(&self) -> usize {
        self.in_flight_calls.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            events: self.events.load(Ordering::Relaxed),
            keys: self.keys.load(Ordering::Relaxed),
            fetch_calls: self.fetch_calls.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            transform_failures: self.transform_failures.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
        }
    }
}

fn add(counter: &AtomicU64, count: usize) {
    if count == 0 {
        return;
    }
    counter.fetch_add(count as u64, Ordering::Relaxed);
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub events: u64,
    pub keys: u64,
    pub fetch_calls: u64,
    pub fetch_failures: u64,
    pub published: u64,
    pub transform_failures: u64,
    pub publish_failures: u64,
    pub conflicts: u64,
}

/// Spawns a background task that periodically logs event throughput and failure counters.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "refetch::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current = telemetry.snapshot();
                    let events_delta = current.events.saturating_sub(last_snapshot.events);
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let throughput = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        events_delta as f64 / elapsed
                    };

                    tracing::info!(
                        target: "refetch::metrics",
                        throughput = format!("{throughput:.2}"),
                        events = current.events,
                        keys = current.keys,
                        fetch_calls = current.fetch_calls,
                        in_flight = telemetry.in_flight_calls(),
                        fetch_failures = current.fetch_failures,
                        published = current.published,
                        transform_failures = current.transform_failures,
                        publish_failures = current.publish_failures,
                        conflicts = current.conflicts,
                        "runtime metrics snapshot"
                    );

                    last_snapshot = current;
                    last_tick = Instant::now();
                }
            }
        }
    })
}
