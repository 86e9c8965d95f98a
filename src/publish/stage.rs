use crate::clients::{PublishSink, TransformService};
use crate::model::{CanonicalResource, RequestKey, Resource, ResourceType, Trigger};
use crate::publish::report::{PublishReport, UNKNOWN_RESOURCE_ID};
use crate::runtime::telemetry::Telemetry;
use futures::future::join_all;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// One strategy's results, each key tagged with the trigger it is published under.
#[derive(Debug, Clone)]
pub struct StagedResults<'a> {
    pub target_type: &'a ResourceType,
    pub entries: Vec<(&'a RequestKey, Trigger, &'a [Resource])>,
}

impl<'a> StagedResults<'a> {
    pub fn new(target_type: &'a ResourceType) -> Self {
        Self {
            target_type,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, key: &'a RequestKey, trigger: Trigger, resources: &'a [Resource]) {
        self.entries.push((key, trigger, resources));
    }
}

#[derive(Default)]
struct Group<'a> {
    pending: Vec<(&'a str, &'a Resource)>,
    seen: HashSet<(&'a ResourceType, &'a str)>,
    anonymous: Vec<(&'a ResourceType, &'a Resource)>,
}

/// Transforms fetched resources to their canonical form and hands them to the sink.
pub struct TransformPublishStage {
    transform: Arc<dyn TransformService>,
    sink: Arc<dyn PublishSink>,
    telemetry: Arc<Telemetry>,
}

impl TransformPublishStage {
    pub fn new(
        transform: Arc<dyn TransformService>,
        sink: Arc<dyn PublishSink>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            transform,
            sink,
            telemetry,
        }
    }

    /// Publishes every resource once per `(tenant, trigger)` group.
    ///
    /// A resource served to several keys of the same group is transformed and
    /// published once. Transform failures are per resource, and a resource
    /// without an id is reported once per group as `<unknown>`. Publish
    /// failures cover every id of the failed sink call.
    pub async fn process(&self, staged: &[StagedResults<'_>]) -> PublishReport {
        let mut report = PublishReport::default();
        let mut groups: BTreeMap<(&str, Trigger), Group<'_>> = BTreeMap::new();

        for batch in staged {
            for &(key, trigger, resources) in &batch.entries {
                let group = groups.entry((key.tenant(), trigger)).or_default();
                for resource in resources {
                    let Some(id) = resource.id() else {
                        // Equal bodies served to several keys count once.
                        let entry = (batch.target_type, resource);
                        if !group.anonymous.contains(&entry) {
                            tracing::warn!(key = %key, "fetched resource has no id");
                            self.telemetry.record_transform_failure();
                            report.transform_failures.push(UNKNOWN_RESOURCE_ID.to_string());
                            group.anonymous.push(entry);
                        }
                        continue;
                    };
                    if group.seen.insert((batch.target_type, id)) {
                        group.pending.push((id, resource));
                    }
                }
            }
        }

        for ((tenant, trigger), group) in groups {
            if group.pending.is_empty() {
                continue;
            }
            let transformed = self.transform_group(tenant, &group.pending, &mut report).await;
            if transformed.is_empty() {
                continue;
            }
            self.publish_group(tenant, trigger, transformed, &mut report)
                .await;
        }

        report
    }

    async fn transform_group<'a>(
        &self,
        tenant: &str,
        pending: &[(&'a str, &'a Resource)],
        report: &mut PublishReport,
    ) -> Vec<(&'a str, CanonicalResource)> {
        let outcomes = join_all(pending.iter().map(|&(id, resource)| async move {
            (id, self.transform.transform(resource, tenant).await)
        }))
        .await;

        let mut transformed = Vec::with_capacity(outcomes.len());
        for (id, outcome) in outcomes {
            match outcome {
                Ok(canonical) => transformed.push((id, canonical)),
                Err(err) => {
                    tracing::warn!(tenant, resource_id = id, error = %err, "transform failed");
                    self.telemetry.record_transform_failure();
                    report.transform_failures.push(id.to_string());
                }
            }
        }
        transformed
    }

    async fn publish_group(
        &self,
        tenant: &str,
        trigger: Trigger,
        transformed: Vec<(&str, CanonicalResource)>,
        report: &mut PublishReport,
    ) {
        let (ids, resources): (Vec<&str>, Vec<CanonicalResource>) =
            transformed.into_iter().unzip();

        if self.sink.batch_capable() {
            self.publish_call(tenant, trigger, &ids, &resources, report)
                .await;
            return;
        }

        for (id, resource) in ids.iter().zip(resources.iter()) {
            self.publish_call(
                tenant,
                trigger,
                std::slice::from_ref(id),
                std::slice::from_ref(resource),
                report,
            )
            .await;
        }
    }

    async fn publish_call(
        &self,
        tenant: &str,
        trigger: Trigger,
        ids: &[&str],
        resources: &[CanonicalResource],
        report: &mut PublishReport,
    ) {
        match self.sink.publish(tenant, resources, trigger).await {
            Ok(true) => {
                tracing::debug!(tenant, %trigger, count = resources.len(), "resources published");
                self.telemetry.record_published(resources.len());
                report.published_count += resources.len();
            }
            Ok(false) => {
                tracing::warn!(tenant, %trigger, count = ids.len(), "publish sink rejected batch");
                self.record_publish_failure(ids, report);
            }
            Err(err) => {
                tracing::warn!(tenant, %trigger, count = ids.len(), error = %err, "publish call failed");
                self.record_publish_failure(ids, report);
            }
        }
    }

    fn record_publish_failure(&self, ids: &[&str], report: &mut PublishReport) {
        self.telemetry.record_publish_failures(ids.len());
        report
            .publish_failures
            .extend(ids.iter().map(|id| id.to_string()));
    }
}
