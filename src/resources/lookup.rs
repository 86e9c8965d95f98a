//! Downstream lookups shared by the strategies, returning results keyed by
//! the id each request asked for.

use crate::clients::{ResourceClient, SearchQuery};
use crate::model::Resource;
use crate::resources::references::parse_reference;
use anyhow::Result;
use std::collections::{HashMap, HashSet};

/// `getByIDs`, regrouped by each returned resource's own id.
pub async fn fetch_by_ids(
    client: &dyn ResourceClient,
    tenant: &str,
    ids: &[String],
) -> Result<HashMap<String, Vec<Resource>>> {
    let resources = client.get_by_ids(tenant, ids).await?;
    let mut grouped: HashMap<String, Vec<Resource>> = HashMap::new();
    for resource in resources {
        match resource.id() {
            Some(id) => grouped.entry(id.to_owned()).or_default().push(resource),
            None => tracing::warn!(tenant, "downstream returned a resource without an id"),
        }
    }
    Ok(grouped)
}

/// `getByID` as a list; a missing resource is an empty list.
pub async fn fetch_one(
    client: &dyn ResourceClient,
    tenant: &str,
    id: &str,
) -> Result<Vec<Resource>> {
    Ok(client.get_by_id(tenant, id).await?.into_iter().collect())
}

/// Runs `query` and files each result under every requested id it references
/// through `query.field`. A result referencing two requested ids appears under both.
pub async fn search_grouped(
    client: &dyn ResourceClient,
    tenant: &str,
    query: &SearchQuery,
) -> Result<HashMap<String, Vec<Resource>>> {
    let requested: HashSet<&str> = query.ids.iter().map(String::as_str).collect();
    let resources = client.search(tenant, query).await?;
    let mut grouped: HashMap<String, Vec<Resource>> = HashMap::new();

    for resource in resources {
        let mut seen = HashSet::new();
        let owners: Vec<String> = resource
            .references_at(&[query.field])
            .into_iter()
            .filter_map(|reference| parse_reference(reference, &query.reference_type))
            .filter(|id| requested.contains(id.as_str()) && seen.insert(id.clone()))
            .collect();

        if owners.is_empty() {
            tracing::debug!(
                tenant,
                field = query.field,
                resource_id = resource.id().unwrap_or("<unknown>"),
                "search result does not reference any requested id"
            );
            continue;
        }

        for owner in owners {
            grouped.entry(owner).or_default().push(resource.clone());
        }
    }

    Ok(grouped)
}
