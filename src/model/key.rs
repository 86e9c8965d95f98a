//! Composite fetch identity shared by the classifier, deduplicator, executor,
//! and demultiplexer.

use crate::model::event::{DateRange, Event};
use crate::model::resource::ResourceType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one downstream fetch request.
///
/// Two keys are equal iff every field is equal. `date_range` is the
/// originating event's backfill window verbatim: identical windows collide,
/// different windows for the same id never do.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey {
    run_id: String,
    source_resource_type: ResourceType,
    tenant: String,
    resource_id: String,
    date_range: Option<DateRange>,
}

impl RequestKey {
    pub fn new(
        run_id: impl Into<String>,
        source_resource_type: ResourceType,
        tenant: impl Into<String>,
        resource_id: impl Into<String>,
        date_range: Option<DateRange>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            source_resource_type,
            tenant: tenant.into(),
            resource_id: resource_id.into(),
            date_range,
        }
    }

    /// Builds the key for `resource_id` as implied by `event`.
    pub fn from_event(event: &Event, resource_id: impl Into<String>) -> Self {
        Self::new(
            event.run_id(),
            event.resource_type().clone(),
            event.tenant(),
            resource_id,
            event.backfill_window(),
        )
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn source_resource_type(&self) -> &ResourceType {
        &self.source_resource_type
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub fn date_range(&self) -> Option<&DateRange> {
        self.date_range.as_ref()
    }

    pub fn is_windowed(&self) -> bool {
        self.date_range.is_some()
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}/{}",
            self.run_id, self.tenant, self.source_resource_type, self.resource_id
        )?;
        if let Some(range) = &self.date_range {
            write!(f, "[{range}]")?;
        }
        Ok(())
    }
}

/// How the executor should look up the target resources for a key's id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum FetchArgs {
    /// The key's id is the target resource id.
    ById,
    /// The key's id is a patient id; search the target type by subject.
    ByPatient { categories: Vec<String> },
    /// The key's id belongs to `reference_type`; search targets pointing at it.
    ByReference { reference_type: ResourceType },
}
