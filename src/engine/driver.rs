use crate::clients::PushResult;
use crate::engine::dispatch::{CallOutcome, Dispatcher, FetchJob};
use crate::engine::services::EngineServices;
use crate::model::{Event, RequestKey, Resource, ResourceType};
use crate::publish::{
    CompletenessDagPublisher, KeyFailure, PublishReport, StagedResults, TransformPublishStage,
};
use crate::resolve::{
    classify, plan_fetches, ClassifiedKey, DateRangeSplitter, DedupedKeys, DuplicateKeyConflict,
    KeyDeduplicator, ResultDemultiplexer, ResultSet,
};
use crate::resources::{dag_declaration, ResourceStrategy};
use crate::runtime::backoff::RetryPolicy;
use crate::runtime::config::EngineConfig;
use crate::runtime::error::EngineError;
use crate::runtime::telemetry::Telemetry;
use crate::schedule::AvailabilityWindowScheduler;
use anyhow::Result;
use chrono::{DateTime, FixedOffset, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything one strategy resolved for a batch.
///
/// Every distinct key ends up in exactly one of `results`, `fetch_failures`
/// or `abandoned`.
#[derive(Debug)]
pub struct StrategyResolution {
    target_type: ResourceType,
    keys: DedupedKeys,
    results: ResultSet,
    fetch_failures: Vec<KeyFailure>,
    abandoned: Vec<RequestKey>,
    event_keys: HashMap<usize, Vec<RequestKey>>,
}

impl StrategyResolution {
    pub fn target_type(&self) -> &ResourceType {
        &self.target_type
    }

    pub fn keys(&self) -> &DedupedKeys {
        &self.keys
    }

    pub fn results(&self) -> &ResultSet {
        &self.results
    }

    pub fn fetch_failures(&self) -> &[KeyFailure] {
        &self.fetch_failures
    }

    pub fn abandoned(&self) -> &[RequestKey] {
        &self.abandoned
    }

    pub fn conflicts(&self) -> &[DuplicateKeyConflict] {
        self.keys.conflicts()
    }

    /// Keys the event at `index` maps to, with their fetched resources.
    /// Keys whose fetch failed or was abandoned are omitted.
    pub fn results_for_event(&self, index: usize) -> Vec<(&RequestKey, &[Resource])> {
        self.event_keys
            .get(&index)
            .into_iter()
            .flatten()
            .filter_map(|key| self.results.get(key).map(|resources| (key, resources)))
            .collect()
    }

    fn staged<'a>(&'a self, events: &[Event]) -> StagedResults<'a> {
        let mut staged = StagedResults::new(&self.target_type);
        for (key, resources) in &self.results {
            let trigger = self
                .keys
                .events_for(key)
                .first()
                .and_then(|&index| events.get(index))
                .map(Event::trigger);
            if let Some(trigger) = trigger {
                staged.push(key, trigger, resources);
            }
        }
        staged
    }
}

/// Outcome of resolving one batch, before transform and publish.
#[derive(Debug)]
pub struct Resolution {
    strategies: Vec<StrategyResolution>,
    skipped_events: usize,
}

impl Resolution {
    pub fn strategies(&self) -> &[StrategyResolution] {
        &self.strategies
    }

    pub fn strategy(&self, target_type: &ResourceType) -> Option<&StrategyResolution> {
        self.strategies
            .iter()
            .find(|strategy| &strategy.target_type == target_type)
    }

    /// Events that no strategy produced a key for.
    pub fn skipped_events(&self) -> usize {
        self.skipped_events
    }

    pub fn distinct_keys(&self) -> usize {
        self.strategies.iter().map(|strategy| strategy.keys.len()).sum()
    }

    pub fn results_for_event(&self, index: usize) -> Vec<(&ResourceType, &RequestKey, &[Resource])> {
        self.strategies
            .iter()
            .flat_map(|strategy| {
                strategy
                    .results_for_event(index)
                    .into_iter()
                    .map(move |(key, resources)| (&strategy.target_type, key, resources))
            })
            .collect()
    }
}

/// Runs every registered strategy over a batch: classify, dedupe, fetch,
/// demultiplex, then transform and publish.
pub struct ResolutionEngine {
    strategies: Vec<Arc<dyn ResourceStrategy>>,
    services: EngineServices,
    config: EngineConfig,
    telemetry: Arc<Telemetry>,
    splitter: DateRangeSplitter,
    dispatcher: Dispatcher,
    stage: TransformPublishStage,
    dags: CompletenessDagPublisher,
    scheduler: AvailabilityWindowScheduler,
    shutdown: CancellationToken,
}

impl ResolutionEngine {
    pub fn new(
        config: EngineConfig,
        services: EngineServices,
        strategies: Vec<Arc<dyn ResourceStrategy>>,
    ) -> Result<Self> {
        Self::with_telemetry(config, services, strategies, Arc::new(Telemetry::default()))
    }

    pub fn with_telemetry(
        config: EngineConfig,
        services: EngineServices,
        strategies: Vec<Arc<dyn ResourceStrategy>>,
        telemetry: Arc<Telemetry>,
    ) -> Result<Self> {
        config.validate()?;
        let splitter = DateRangeSplitter::new(config.max_backfill_days())?;
        let dispatcher = Dispatcher::new(
            config.worker_count(),
            RetryPolicy::from_config(&config),
            config.batch_timeout(),
            telemetry.clone(),
        );
        let stage = TransformPublishStage::new(
            services.transform.clone(),
            services.sink.clone(),
            telemetry.clone(),
        );
        let dags = CompletenessDagPublisher::new(
            services.completeness.clone(),
            config.dag_registration_enabled(),
        );
        let scheduler = AvailabilityWindowScheduler::new(services.tenant_config.clone());

        Ok(Self {
            strategies,
            services,
            config,
            telemetry,
            splitter,
            dispatcher,
            stage,
            dags,
            scheduler,
            shutdown: CancellationToken::new(),
        })
    }

    /// Replaces the token that aborts in-flight fetches on shutdown.
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    pub fn strategies(&self) -> &[Arc<dyn ResourceStrategy>] {
        &self.strategies
    }

    /// Whether `tenant`'s scheduled job should run at `now`; records the run when it should.
    pub async fn should_run(&self, tenant: &str, now: DateTime<Utc>) -> Result<bool> {
        self.scheduler.should_run(tenant, now).await
    }

    /// Pushes one completeness DAG declaration per strategy. Never fails.
    pub async fn register_dags(&self) -> PushResult {
        let mut combined = PushResult::default();
        for strategy in &self.strategies {
            let result = self
                .dags
                .publish_declaration(dag_declaration(strategy.as_ref()))
                .await;
            combined.successful.extend(result.successful);
            combined.failed.extend(result.failed);
        }
        combined
    }

    /// Resolves `events` to fetched resources per request key.
    ///
    /// Only a malformed event fails the whole batch. Fetch errors, timeouts
    /// and key conflicts are recorded in the returned [`Resolution`].
    pub async fn resolve(&self, events: &[Event]) -> Result<Resolution, EngineError> {
        validate_events(events)?;
        self.telemetry.record_events(events.len());

        let mut produced = vec![false; events.len()];
        let mut deduped = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            let classified: Vec<ClassifiedKey> = events
                .iter()
                .enumerate()
                .flat_map(|(index, event)| {
                    classify(strategy.as_ref(), event)
                        .into_iter()
                        .map(move |(key, args)| ClassifiedKey::new(index, key, args))
                })
                .collect();
            for key in &classified {
                produced[key.event_index] = true;
            }

            let keys = KeyDeduplicator::dedupe(classified);
            self.telemetry.record_keys(keys.len());
            self.telemetry.record_conflicts(keys.conflicts().len());
            tracing::debug!(
                target_type = %strategy.target_type(),
                distinct_keys = keys.len(),
                conflicts = keys.conflicts().len(),
                "request keys deduplicated"
            );
            deduped.push(keys);
        }
        let skipped_events = produced.iter().filter(|produced| !**produced).count();

        let offsets = self.tenant_offsets(&deduped).await;

        let mut jobs = Vec::new();
        let mut strategies = Vec::with_capacity(self.strategies.len());
        for (slot, (strategy, keys)) in self.strategies.iter().zip(deduped).enumerate() {
            let plan = plan_fetches(&keys, &self.splitter, &offsets);
            self.telemetry.record_fetch_failures(plan.rejected.len());
            let fetch_failures = plan
                .rejected
                .into_iter()
                .map(|(key, error)| KeyFailure::new(key, error.to_string()))
                .collect();
            jobs.extend(plan.calls.into_iter().map(|call| FetchJob {
                strategy: slot,
                executor: strategy.clone(),
                call,
            }));

            strategies.push(StrategyResolution {
                target_type: strategy.target_type().clone(),
                event_keys: index_events(&keys),
                keys,
                results: ResultSet::new(),
                fetch_failures,
                abandoned: Vec::new(),
            });
        }

        for completed in self.dispatcher.run(jobs, &self.shutdown).await {
            let Some(resolution) = strategies.get_mut(completed.strategy) else {
                continue;
            };
            let keys = completed.call.keys();
            match completed.outcome {
                CallOutcome::Fetched(fetched) => {
                    resolution
                        .results
                        .merge(ResultDemultiplexer::demux(keys, fetched));
                }
                CallOutcome::Failed(error) => {
                    tracing::warn!(
                        target_type = %resolution.target_type,
                        tenant = completed.call.tenant(),
                        keys = keys.len(),
                        error = %error,
                        "fetch call failed; its keys receive no results"
                    );
                    self.telemetry.record_fetch_failures(keys.len());
                    resolution.fetch_failures.extend(
                        keys.iter()
                            .cloned()
                            .map(|key| KeyFailure::new(key, error.clone())),
                    );
                }
                CallOutcome::Abandoned => {
                    resolution.abandoned.extend(keys.iter().cloned());
                }
            }
        }

        Ok(Resolution {
            strategies,
            skipped_events,
        })
    }

    /// Resolves, transforms and publishes `events`, reporting every partial failure.
    pub async fn process(&self, events: &[Event]) -> Result<PublishReport, EngineError> {
        let resolution = self.resolve(events).await?;

        let staged: Vec<StagedResults<'_>> = resolution
            .strategies
            .iter()
            .map(|strategy| strategy.staged(events))
            .collect();
        let mut report = self.stage.process(&staged).await;

        for strategy in &resolution.strategies {
            report
                .fetch_failures
                .extend(strategy.fetch_failures.iter().cloned());
            report.abandoned_keys.extend(strategy.abandoned.iter().cloned());
            report
                .duplicate_key_conflicts
                .extend(strategy.conflicts().iter().cloned());
        }
        report.skipped_events = resolution.skipped_events;

        tracing::info!(
            events = events.len(),
            distinct_keys = resolution.distinct_keys(),
            report = %report,
            "batch processed"
        );
        Ok(report)
    }

    async fn tenant_offsets(&self, deduped: &[DedupedKeys]) -> HashMap<String, FixedOffset> {
        let tenants: BTreeSet<&str> = deduped
            .iter()
            .flat_map(|keys| keys.keys())
            .filter(|key| key.is_windowed())
            .map(|key| key.tenant())
            .collect();

        let mut offsets = HashMap::with_capacity(tenants.len());
        for tenant in tenants {
            match self.services.tenant_config.tenant_offset(tenant).await {
                Ok(Some(offset)) => {
                    offsets.insert(tenant.to_string(), offset);
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(tenant, error = %err, "tenant offset lookup failed; splitting in UTC");
                }
            }
        }
        offsets
    }
}

fn validate_events(events: &[Event]) -> Result<(), EngineError> {
    for (index, event) in events.iter().enumerate() {
        if event.tenant().trim().is_empty() {
            return Err(EngineError::MalformedEvent {
                index,
                reason: "event has no tenant".to_string(),
            });
        }
        if event.resource_type().as_str().trim().is_empty() {
            return Err(EngineError::MalformedEvent {
                index,
                reason: "event has no resource type".to_string(),
            });
        }
    }
    Ok(())
}

fn index_events(keys: &DedupedKeys) -> HashMap<usize, Vec<RequestKey>> {
    let mut index: HashMap<usize, Vec<RequestKey>> = HashMap::new();
    for key in keys.keys() {
        for &event in keys.events_for(key) {
            index.entry(event).or_default().push(key.clone());
        }
    }
    index
}
