use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Name of a domain resource type such as `Patient` or `Observation`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceType(String);

impl ResourceType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourceType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl PartialEq<str> for ResourceType {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ResourceType {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A domain resource as returned by a downstream data source.
///
/// The body is kept as raw JSON; only `id`, `resourceType` and reference
/// fields are interpreted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resource(Value);

impl Resource {
    pub fn new(body: Value) -> Self {
        Self(body)
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    pub fn resource_type(&self) -> Option<&str> {
        self.0.get("resourceType").and_then(Value::as_str)
    }

    pub fn body(&self) -> &Value {
        &self.0
    }

    pub fn into_body(self) -> Value {
        self.0
    }

    /// Collects every `reference` string found by following `path` from the
    /// resource root. Arrays met along the way are flattened, so
    /// `["reasonReference"]` yields one entry per list element.
    pub fn references_at(&self, path: &[&str]) -> Vec<&str> {
        let mut out = Vec::new();
        collect_references(&self.0, path, &mut out);
        out
    }
}

fn collect_references<'a>(value: &'a Value, path: &[&str], out: &mut Vec<&'a str>) {
    if let Value::Array(items) = value {
        for item in items {
            collect_references(item, path, out);
        }
        return;
    }

    match path.split_first() {
        None => {
            if let Some(reference) = value.get("reference").and_then(Value::as_str) {
                out.push(reference);
            }
        }
        Some((field, rest)) => {
            if let Some(next) = value.get(*field) {
                collect_references(next, rest, out);
            }
        }
    }
}

/// Output of the canonical transform service, ready for the publish sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalResource {
    pub resource_type: ResourceType,
    pub id: String,
    pub body: Value,
}

impl CanonicalResource {
    pub fn new(resource_type: ResourceType, id: impl Into<String>, body: Value) -> Self {
        Self {
            resource_type,
            id: id.into(),
            body,
        }
    }
}
