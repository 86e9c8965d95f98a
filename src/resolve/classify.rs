use crate::model::{Event, FetchArgs, RequestKey, Resource, ResourceType};
use std::collections::HashSet;
use std::fmt;

/// Why an event produced no request keys. None of these are errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotFoundReason {
    /// Load event for a type this classifier does not produce.
    OtherTargetType,
    /// Publish event of a type this classifier does not consume.
    NotConsumed,
    /// The source resource carries no usable reference to the target type.
    NoReferences,
    MissingResourceId,
}

impl fmt::Display for NotFoundReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFoundReason::OtherTargetType => write!(f, "load event targets another type"),
            NotFoundReason::NotConsumed => write!(f, "source type is not consumed"),
            NotFoundReason::NoReferences => write!(f, "source resource has no references"),
            NotFoundReason::MissingResourceId => write!(f, "event carries no resource id"),
        }
    }
}

impl std::error::Error for NotFoundReason {}

/// Per-resource-type rules that turn events into request keys.
pub trait ClassificationRules: Send + Sync {
    /// The resource type this strategy fetches and republishes.
    fn target_type(&self) -> &ResourceType;

    /// Types whose publish events imply fetches of the target type.
    fn consumed_types(&self) -> &[ResourceType];

    fn load_args(&self) -> FetchArgs {
        FetchArgs::ById
    }

    /// Returns the ids (with fetch args) that `source` refers to. Malformed
    /// references must be skipped rather than reported.
    fn extract_references(
        &self,
        source_type: &ResourceType,
        source: &Resource,
    ) -> Result<Vec<(String, FetchArgs)>, NotFoundReason>;
}

/// Classifies `event`, returning why nothing was produced when it yields no keys.
pub fn try_classify<R>(
    rules: &R,
    event: &Event,
) -> Result<Vec<(RequestKey, FetchArgs)>, NotFoundReason>
where
    R: ClassificationRules + ?Sized,
{
    match event {
        Event::Load(load) => {
            if &load.resource_type != rules.target_type() {
                return Err(NotFoundReason::OtherTargetType);
            }
            let id = load.resource_id.trim();
            if id.is_empty() {
                return Err(NotFoundReason::MissingResourceId);
            }
            Ok(vec![(RequestKey::from_event(event, id), rules.load_args())])
        }
        Event::Publish(publish) => {
            if !rules.consumed_types().contains(&publish.resource_type) {
                return Err(NotFoundReason::NotConsumed);
            }

            let references = rules.extract_references(&publish.resource_type, &publish.resource)?;
            let mut seen = HashSet::with_capacity(references.len());
            let keys: Vec<_> = references
                .into_iter()
                .filter(|(id, _)| seen.insert(id.clone()))
                .map(|(id, args)| (RequestKey::from_event(event, id), args))
                .collect();

            if keys.is_empty() {
                return Err(NotFoundReason::NoReferences);
            }
            Ok(keys)
        }
    }
}

/// Classifies `event`; a skipped event yields an empty list and a debug log.
pub fn classify<R>(rules: &R, event: &Event) -> Vec<(RequestKey, FetchArgs)>
where
    R: ClassificationRules + ?Sized,
{
    match try_classify(rules, event) {
        Ok(keys) => keys,
        Err(reason) => {
            tracing::debug!(
                target_type = %rules.target_type(),
                source_type = %event.resource_type(),
                tenant = event.tenant(),
                reason = %reason,
                "event classified to zero request keys"
            );
            Vec::new()
        }
    }
}
