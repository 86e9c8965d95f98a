use crate::model::{CanonicalResource, Resource, Trigger};
use anyhow::Result;
use futures::future::BoxFuture;

pub trait TransformService: Send + Sync {
    fn transform<'a>(
        &'a self,
        resource: &'a Resource,
        tenant: &'a str,
    ) -> BoxFuture<'a, Result<CanonicalResource>>;
}

pub trait PublishSink: Send + Sync {
    /// Publishes `resources` as one unit. `Ok(false)` and `Err` both mean the
    /// whole call failed; there is no per-resource outcome.
    fn publish<'a>(
        &'a self,
        tenant: &'a str,
        resources: &'a [CanonicalResource],
        trigger: Trigger,
    ) -> BoxFuture<'a, Result<bool>>;

    /// Sinks that cannot take a batch receive one resource per call.
    fn batch_capable(&self) -> bool {
        true
    }
}
