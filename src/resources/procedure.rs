//! Procedures: loaded by id, referenced from an Encounter's `reasonReference`
//! list, or searched by subject when a Patient is published.

use crate::clients::{ResourceClient, SearchQuery};
use crate::model::{DateRange, FetchArgs, Resource, ResourceType};
use crate::resolve::{ClassificationRules, FetchExecutor, NotFoundReason};
use crate::resources::lookup::{fetch_by_ids, fetch_one, search_grouped};
use crate::resources::references::{parse_reference, ENCOUNTER, PATIENT, PROCEDURE};
use anyhow::{bail, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::Arc;

pub struct ProcedureStrategy {
    client: Arc<dyn ResourceClient>,
    target: ResourceType,
    consumed: Vec<ResourceType>,
}

impl ProcedureStrategy {
    pub fn new(client: Arc<dyn ResourceClient>) -> Self {
        Self {
            client,
            target: ResourceType::from(PROCEDURE),
            consumed: vec![ResourceType::from(ENCOUNTER), ResourceType::from(PATIENT)],
        }
    }
}

impl ClassificationRules for ProcedureStrategy {
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
        if source_type == PATIENT {
            let patient_id = source.id().ok_or(NotFoundReason::MissingResourceId)?;
            return Ok(vec![(
                patient_id.to_owned(),
                FetchArgs::ByPatient {
                    categories: Vec::new(),
                },
            )]);
        }

        let ids: Vec<_> = source
            .references_at(&["reasonReference"])
            .into_iter()
            .filter_map(|reference| {
                let parsed = parse_reference(reference, &self.target);
                if parsed.is_none() {
                    tracing::trace!(reference, "skipping non-procedure reason reference");
                }
                parsed
            })
            .map(|id| (id, FetchArgs::ById))
            .collect();

        if ids.is_empty() {
            return Err(NotFoundReason::NoReferences);
        }
        Ok(ids)
    }
}

impl FetchExecutor for ProcedureStrategy {
    fn fetch_batch<'a>(
        &'a self,
        tenant: &'a str,
        args: &'a FetchArgs,
        ids: &'a [String],
    ) -> BoxFuture<'a, Result<HashMap<String, Vec<Resource>>>> {
        async move {
            match args {
                FetchArgs::ById => fetch_by_ids(self.client.as_ref(), tenant, ids).await,
                FetchArgs::ByPatient { .. } => {
                    let query = SearchQuery::new("subject", ResourceType::from(PATIENT), ids.to_vec());
                    search_grouped(self.client.as_ref(), tenant, &query).await
                }
                FetchArgs::ByReference { reference_type } => {
                    bail!("procedures cannot be fetched by {reference_type} reference")
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
                FetchArgs::ByPatient { .. } => {
                    let query =
                        SearchQuery::new("subject", ResourceType::from(PATIENT), vec![id.to_owned()])
                            .with_window(*window);
                    self.client.search(tenant, &query).await
                }
                FetchArgs::ByReference { reference_type } => {
                    bail!("procedures cannot be fetched by {reference_type} reference")
                }
            }
        }
        .boxed()
    }
}
