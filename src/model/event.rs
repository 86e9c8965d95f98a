use crate::model::resource::{Resource, ResourceType};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an event was emitted upstream. Carried through to the publish sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Nightly,
    AdHoc,
    Backfill,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Nightly => write!(f, "nightly"),
            Trigger::AdHoc => write!(f, "ad_hoc"),
            Trigger::Backfill => write!(f, "backfill"),
        }
    }
}

/// Closed interval `[start, end]` in UTC instants. Adjacent pieces produced
/// by the splitter are one nanosecond apart and never overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// `false` when `start` is after `end`; such ranges must be rejected before splitting.
    pub fn is_ordered(&self) -> bool {
        self.start <= self.end
    }

    pub fn span(&self) -> Duration {
        self.end - self.start
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub run_id: String,
    /// Only present for backfill-triggered events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backfill_window: Option<DateRange>,
}

impl EventMetadata {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            backfill_window: None,
        }
    }

    pub fn with_backfill_window(mut self, window: DateRange) -> Self {
        self.backfill_window = Some(window);
        self
    }
}

/// "Load resource X by id".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadEvent {
    pub tenant: String,
    pub resource_type: ResourceType,
    pub resource_id: String,
    pub trigger: Trigger,
    pub metadata: EventMetadata,
}

/// "A resource of type X changed", carrying the resource body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishEvent {
    pub tenant: String,
    pub resource_type: ResourceType,
    pub resource: Resource,
    pub trigger: Trigger,
    pub metadata: EventMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    Load(LoadEvent),
    Publish(PublishEvent),
}

impl Event {
    pub fn tenant(&self) -> &str {
        match self {
            Event::Load(event) => &event.tenant,
            Event::Publish(event) => &event.tenant,
        }
    }

    pub fn resource_type(&self) -> &ResourceType {
        match self {
            Event::Load(event) => &event.resource_type,
            Event::Publish(event) => &event.resource_type,
        }
    }

    pub fn trigger(&self) -> Trigger {
        match self {
            Event::Load(event) => event.trigger,
            Event::Publish(event) => event.trigger,
        }
    }

    pub fn metadata(&self) -> &EventMetadata {
        match self {
            Event::Load(event) => &event.metadata,
            Event::Publish(event) => &event.metadata,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.metadata().run_id
    }

    pub fn backfill_window(&self) -> Option<DateRange> {
        self.metadata().backfill_window
    }
}
