use crate::model::RequestKey;
use crate::resolve::DuplicateKeyConflict;
use std::fmt;

/// Id recorded for a resource that reached the publish stage without an `id`.
pub const UNKNOWN_RESOURCE_ID: &str = "<unknown>";

/// A key that received no results because its fetch failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFailure {
    pub key: RequestKey,
    pub error: String,
}

impl KeyFailure {
    pub fn new(key: RequestKey, error: impl Into<String>) -> Self {
        Self {
            key,
            error: error.into(),
        }
    }
}

impl fmt::Display for KeyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.error)
    }
}

/// Aggregate outcome of processing one batch of events.
///
/// Partial failures never abort a batch; each category is listed here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishReport {
    pub published_count: usize,
    pub transform_failures: Vec<String>,
    pub publish_failures: Vec<String>,
    pub fetch_failures: Vec<KeyFailure>,
    pub abandoned_keys: Vec<RequestKey>,
    pub duplicate_key_conflicts: Vec<DuplicateKeyConflict>,
    /// Events that produced no request key.
    pub skipped_events: usize,
}

impl PublishReport {
    pub fn is_clean(&self) -> bool {
        self.transform_failures.is_empty()
            && self.publish_failures.is_empty()
            && self.fetch_failures.is_empty()
            && self.abandoned_keys.is_empty()
            && self.duplicate_key_conflicts.is_empty()
    }

    pub fn merge(&mut self, other: PublishReport) {
        self.published_count += other.published_count;
        self.transform_failures.extend(other.transform_failures);
        self.publish_failures.extend(other.publish_failures);
        self.fetch_failures.extend(other.fetch_failures);
        self.abandoned_keys.extend(other.abandoned_keys);
        self.duplicate_key_conflicts
            .extend(other.duplicate_key_conflicts);
        self.skipped_events += other.skipped_events;
    }
}

impl fmt::Display for PublishReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "published={} transform_failures={} publish_failures={} fetch_failures={} \
             abandoned={} conflicts={} skipped_events={}",
            self.published_count,
            self.transform_failures.len(),
            self.publish_failures.len(),
            self.fetch_failures.len(),
            self.abandoned_keys.len(),
            self.duplicate_key_conflicts.len(),
            self.skipped_events,
        )
    }
}
