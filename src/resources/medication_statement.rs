//! MedicationStatements derived from published MedicationRequests. Several
//! requests of a batch are resolved by one `basedOn` search.

use crate::clients::{ResourceClient, SearchQuery};
use crate::model::{DateRange, FetchArgs, Resource, ResourceType};
use crate::resolve::{ClassificationRules, FetchExecutor, NotFoundReason};
use crate::resources::lookup::{fetch_by_ids, fetch_one, search_grouped};
use crate::resources::references::{MEDICATION_REQUEST, MEDICATION_STATEMENT};
use anyhow::{bail, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::Arc;

const BASED_ON: &str = "basedOn";

pub struct MedicationStatementStrategy {
    client: Arc<dyn ResourceClient>,
    target: ResourceType,
    consumed: Vec<ResourceType>,
}

impl MedicationStatementStrategy {
    pub fn new(client: Arc<dyn ResourceClient>) -> Self {
        Self {
            client,
            target: ResourceType::from(MEDICATION_STATEMENT),
            consumed: vec![ResourceType::from(MEDICATION_REQUEST)],
        }
    }
}

impl ClassificationRules for MedicationStatementStrategy {
    fn target_type(&self) -> &ResourceType {
        &self.target
    }

    fn consumed_types(&self) -> &[ResourceType] {
        &self.consumed
    }

    fn extract_references(
        &self,
        source_type: &ResourceType,
        source: &Resource,
    ) -> Result<Vec<(String, FetchArgs)>, NotFoundReason> {
        let request_id = source.id().ok_or(NotFoundReason::MissingResourceId)?;
        Ok(vec![(
            request_id.to_owned(),
            FetchArgs::ByReference {
                reference_type: source_type.clone(),
            },
        )])
    }
}

impl FetchExecutor for MedicationStatementStrategy {
    fn fetch_batch<'a>(
        &'a self,
        tenant: &'a str,
        args: &'a FetchArgs,
        ids: &'a [String],
    ) -> BoxFuture<'a, Result<HashMap<String, Vec<Resource>>>> {
        async move {
            match args {
                FetchArgs::ById => fetch_by_ids(self.client.as_ref(), tenant, ids).await,
                FetchArgs::ByReference { reference_type } => {
                    let query = SearchQuery::new(BASED_ON, reference_type.clone(), ids.to_vec());
                    search_grouped(self.client.as_ref(), tenant, &query).await
                }
                FetchArgs::ByPatient { .. } => {
                    bail!("medication statements are not searched by patient")
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
                FetchArgs::ByReference { reference_type } => {
                    let query =
                        SearchQuery::new(BASED_ON, reference_type.clone(), vec![id.to_owned()])
                            .with_window(*window);
                    self.client.search(tenant, &query).await
                }
                FetchArgs::ByPatient { .. } => {
                    bail!("medication statements are not searched by patient")
                }
            }
        }
        .boxed()
    }
}
