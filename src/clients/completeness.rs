use crate::model::ResourceType;
use anyhow::Result;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// "`resource_type` is derived from `consumed_resource_types`".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagDeclaration {
    pub resource_type: ResourceType,
    pub consumed_resource_types: BTreeSet<ResourceType>,
}

impl DagDeclaration {
    pub fn new(
        resource_type: ResourceType,
        consumed: impl IntoIterator<Item = ResourceType>,
    ) -> Self {
        Self {
            resource_type,
            consumed_resource_types: consumed.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushFailure {
    pub declaration: DagDeclaration,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushResult {
    pub successful: Vec<DagDeclaration>,
    pub failed: Vec<PushFailure>,
}

impl PushResult {
    pub fn is_empty(&self) -> bool {
        self.successful.is_empty() && self.failed.is_empty()
    }
}

pub trait CompletenessClient: Send + Sync {
    fn publish_events<'a>(
        &'a self,
        topic: &'a str,
        events: &'a [DagDeclaration],
    ) -> BoxFuture<'a, Result<PushResult>>;
}
