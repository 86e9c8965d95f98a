use crate::clients::{CompletenessClient, PublishSink, TenantConfigStore, TransformService};
use std::sync::Arc;

/// Collaborators the engine talks to, injected at construction.
#[derive(Clone)]
pub struct EngineServices {
    pub transform: Arc<dyn TransformService>,
    pub sink: Arc<dyn PublishSink>,
    pub completeness: Arc<dyn CompletenessClient>,
    pub tenant_config: Arc<dyn TenantConfigStore>,
}

impl EngineServices {
    pub fn new(
        transform: Arc<dyn TransformService>,
        sink: Arc<dyn PublishSink>,
        completeness: Arc<dyn CompletenessClient>,
        tenant_config: Arc<dyn TenantConfigStore>,
    ) -> Self {
        Self {
            transform,
            sink,
            completeness,
            tenant_config,
        }
    }
}
