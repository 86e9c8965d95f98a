use crate::clients::{CompletenessClient, DagDeclaration, PushFailure, PushResult};
use crate::model::ResourceType;
use crate::runtime::error::panic_message;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

pub const DEFAULT_DAG_TOPIC: &str = "completeness.dag";

/// Best-effort registration of "X is derived from {Y, Z}" declarations.
///
/// Never fails: a disabled publisher returns an empty result, and any client
/// error or panic becomes a single failure entry.
#[derive(Clone)]
pub struct CompletenessDagPublisher {
    client: Arc<dyn CompletenessClient>,
    enabled: bool,
    topic: String,
}

impl CompletenessDagPublisher {
    pub fn new(client: Arc<dyn CompletenessClient>, enabled: bool) -> Self {
        Self {
            client,
            enabled,
            topic: DEFAULT_DAG_TOPIC.to_string(),
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub async fn publish_dag(
        &self,
        resource_type: &ResourceType,
        consumed: &[ResourceType],
    ) -> PushResult {
        let declaration = DagDeclaration::new(resource_type.clone(), consumed.iter().cloned());
        self.publish_declaration(declaration).await
    }

    pub async fn publish_declaration(&self, declaration: DagDeclaration) -> PushResult {
        if !self.enabled {
            tracing::debug!(
                resource_type = %declaration.resource_type,
                "dag registration disabled; skipping"
            );
            return PushResult::default();
        }

        let events = std::slice::from_ref(&declaration);
        let outcome = AssertUnwindSafe(self.client.publish_events(&self.topic, events))
            .catch_unwind()
            .await;

        let error = match outcome {
            Ok(Ok(result)) => {
                tracing::info!(
                    topic = %self.topic,
                    resource_type = %declaration.resource_type,
                    successful = result.successful.len(),
                    failed = result.failed.len(),
                    "completeness dag pushed"
                );
                return result;
            }
            Ok(Err(err)) => format!("{err:#}"),
            Err(panic) => panic_message(panic.as_ref()),
        };

        tracing::warn!(
            topic = %self.topic,
            resource_type = %declaration.resource_type,
            error = %error,
            "completeness dag push failed"
        );
        PushResult {
            successful: Vec::new(),
            failed: vec![PushFailure { declaration, error }],
        }
    }
}
