use crate::model::{DateRange, Resource, ResourceType};
use anyhow::Result;
use futures::future::BoxFuture;

/// Reference search against a downstream source: "every resource whose
/// `field` points at one of `ids` of `reference_type`".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub field: &'static str,
    pub reference_type: ResourceType,
    pub ids: Vec<String>,
    pub categories: Vec<String>,
    /// Inclusive at both ends; sub-ranges of one split never share an instant.
    pub window: Option<DateRange>,
}

impl SearchQuery {
    pub fn new(field: &'static str, reference_type: ResourceType, ids: Vec<String>) -> Self {
        Self {
            field,
            reference_type,
            ids,
            categories: Vec::new(),
            window: None,
        }
    }

    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_window(mut self, window: DateRange) -> Self {
        self.window = Some(window);
        self
    }
}

/// Downstream data source for one target resource type.
pub trait ResourceClient: Send + Sync {
    fn get_by_id<'a>(
        &'a self,
        tenant: &'a str,
        id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Resource>>>;

    fn get_by_ids<'a>(
        &'a self,
        tenant: &'a str,
        ids: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<Resource>>>;

    /// Results must come back in the source's order; the engine never reorders them.
    fn search<'a>(
        &'a self,
        tenant: &'a str,
        query: &'a SearchQuery,
    ) -> BoxFuture<'a, Result<Vec<Resource>>>;
}
