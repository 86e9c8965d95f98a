//! Observations, loaded by id or found through a published Patient with a
//! category-restricted subject search.

use crate::clients::{ResourceClient, SearchQuery};
use crate::model::{DateRange, FetchArgs, Resource, ResourceType};
use crate::resolve::{ClassificationRules, FetchExecutor, NotFoundReason};
use crate::resources::lookup::{fetch_by_ids, fetch_one, search_grouped};
use crate::resources::references::{OBSERVATION, PATIENT};
use anyhow::{bail, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::Arc;

const DEFAULT_CATEGORIES: &[&str] = &["laboratory", "vital-signs"];

pub struct ObservationStrategy {
    client: Arc<dyn ResourceClient>,
    categories: Vec<String>,
    target: ResourceType,
    consumed: Vec<ResourceType>,
}

impl ObservationStrategy {
    pub fn new(client: Arc<dyn ResourceClient>) -> Self {
        Self::with_categories(
            client,
            DEFAULT_CATEGORIES.iter().map(|c| (*c).to_owned()).collect(),
        )
    }

    pub fn with_categories(client: Arc<dyn ResourceClient>, categories: Vec<String>) -> Self {
        Self {
            client,
            categories,
            target: ResourceType::from(OBSERVATION),
            consumed: vec![ResourceType::from(PATIENT)],
        }
    }

    fn subject_query(&self, categories: &[String], ids: Vec<String>) -> SearchQuery {
        SearchQuery::new("subject", ResourceType::from(PATIENT), ids)
            .with_categories(categories.to_vec())
    }
}

impl ClassificationRules for ObservationStrategy {
    fn target_type(&self) -> &ResourceType {
        &self.target
    }

    fn consumed_types(&self) -> &[ResourceType] {
        &self.consumed
    }

    fn extract_references(
        &self,
        _source_type: &ResourceType,
        source: &Resource,
    ) -> Result<Vec<(String, FetchArgs)>, NotFoundReason> {
        let patient_id = source.id().ok_or(NotFoundReason::MissingResourceId)?;
        Ok(vec![(
            patient_id.to_owned(),
            FetchArgs::ByPatient {
                categories: self.categories.clone(),
            },
        )])
    }
}

impl FetchExecutor for ObservationStrategy {
    fn fetch_batch<'a>(
        &'a self,
        tenant: &'a str,
        args: &'a FetchArgs,
        ids: &'a [String],
    ) -> BoxFuture<'a, Result<HashMap<String, Vec<Resource>>>> {
        async move {
            match args {
                FetchArgs::ById => fetch_by_ids(self.client.as_ref(), tenant, ids).await,
                FetchArgs::ByPatient { categories } => {
                    let query = self.subject_query(categories, ids.to_vec());
                    search_grouped(self.client.as_ref(), tenant, &query).await
                }
                FetchArgs::ByReference { reference_type } => {
                    bail!("observations cannot be fetched by {reference_type} reference")
                }
            }
        }
        .boxed()
    }

    fn fetch_windowed<'a>(
        &'a self,
        tenant: &'a str,
        args: &'a FetchArgs,
        id: &'a str,
        window: &'a DateRange,
    ) -> BoxFuture<'a, Result<Vec<Resource>>> {
        async move {
            match args {
                FetchArgs::ById => fetch_one(self.client.as_ref(), tenant, id).await,
                FetchArgs::ByPatient { categories } => {
                    let query = self
                        .subject_query(categories, vec![id.to_owned()])
                        .with_window(*window);
                    self.client.search(tenant, &query).await
                }
                FetchArgs::ByReference { reference_type } => {
                    bail!("observations cannot be fetched by {reference_type} reference")
                }
            }
        }
        .boxed()
    }
}
