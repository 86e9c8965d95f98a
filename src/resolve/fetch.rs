//! Fetch planning and execution. Keys without a date range are grouped into
//! one batch call per `(tenant, args)`; keys with a range get their own
//! windowed calls, one per split sub-range. By-id keys are never split.

use crate::model::{DateRange, FetchArgs, RequestKey, Resource};
use crate::resolve::dedupe::DedupedKeys;
use crate::resolve::demux::FetchedResources;
use crate::resolve::split::{DateRangeSplitter, SplitError};
use anyhow::Result;
use chrono::{FixedOffset, Offset, Utc};
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};

/// Executes downstream fetches for one target resource type.
pub trait FetchExecutor: Send + Sync {
    /// One downstream call serving every id in `ids`. The returned map is keyed
    /// by the requested id; ids with no results may be absent.
    fn fetch_batch<'a>(
        &'a self,
        tenant: &'a str,
        args: &'a FetchArgs,
        ids: &'a [String],
    ) -> BoxFuture<'a, Result<HashMap<String, Vec<Resource>>>>;

    /// One downstream call for exactly one id and one window.
    fn fetch_windowed<'a>(
        &'a self,
        tenant: &'a str,
        args: &'a FetchArgs,
        id: &'a str,
        window: &'a DateRange,
    ) -> BoxFuture<'a, Result<Vec<Resource>>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchCall {
    Batch {
        tenant: String,
        args: FetchArgs,
        ids: Vec<String>,
        keys: Vec<RequestKey>,
    },
    Windowed {
        key: RequestKey,
        args: FetchArgs,
        windows: Vec<DateRange>,
    },
}

impl FetchCall {
    /// Every key this call serves; a failed call fails all of them.
    pub fn keys(&self) -> &[RequestKey] {
        match self {
            FetchCall::Batch { keys, .. } => keys,
            FetchCall::Windowed { key, .. } => std::slice::from_ref(key),
        }
    }

    pub fn tenant(&self) -> &str {
        match self {
            FetchCall::Batch { tenant, .. } => tenant,
            FetchCall::Windowed { key, .. } => key.tenant(),
        }
    }

    pub fn downstream_calls(&self) -> usize {
        match self {
            FetchCall::Batch { .. } => 1,
            FetchCall::Windowed { windows, .. } => windows.len(),
        }
    }
}

#[derive(Debug, Default)]
pub struct FetchPlan {
    pub calls: Vec<FetchCall>,
    /// Windowed keys whose range could not be split.
    pub rejected: Vec<(RequestKey, SplitError)>,
}

pub fn plan_fetches(
    deduped: &DedupedKeys,
    splitter: &DateRangeSplitter,
    offsets: &HashMap<String, FixedOffset>,
) -> FetchPlan {
    let mut plan = FetchPlan::default();
    let mut batch_slots: HashMap<(String, FetchArgs), usize> = HashMap::new();
    let mut batch_ids: HashMap<usize, HashSet<String>> = HashMap::new();

    for (key, args) in deduped.iter() {
        if let Some(range) = key.date_range() {
            let offset = offsets.get(key.tenant()).copied().unwrap_or_else(|| Utc.fix());
            let windows = match args {
                // A by-id lookup ignores the window, so splitting would only repeat it.
                FetchArgs::ById if range.is_ordered() => Ok(vec![*range]),
                FetchArgs::ById => Err(SplitError::Reversed(*range)),
                _ => splitter.split(*range, offset),
            };
            match windows {
                Ok(windows) => plan.calls.push(FetchCall::Windowed {
                    key: key.clone(),
                    args: args.clone(),
                    windows,
                }),
                Err(error) => {
                    tracing::warn!(key = %key, error = %error, "rejecting unsplittable backfill window");
                    plan.rejected.push((key.clone(), error));
                }
            }
            continue;
        }

        let group = (key.tenant().to_owned(), args.clone());
        let slot = *batch_slots.entry(group).or_insert_with(|| {
            plan.calls.push(FetchCall::Batch {
                tenant: key.tenant().to_owned(),
                args: args.clone(),
                ids: Vec::new(),
                keys: Vec::new(),
            });
            plan.calls.len() - 1
        });

        let seen = batch_ids.entry(slot).or_default();
        if let FetchCall::Batch { ids, keys, .. } = &mut plan.calls[slot] {
            if seen.insert(key.resource_id().to_owned()) {
                ids.push(key.resource_id().to_owned());
            }
            keys.push(key.clone());
        }
    }

    plan
}

/// Runs `call` against `executor`. Windowed sub-range results are
/// concatenated in window order.
pub async fn execute_call<E>(executor: &E, call: &FetchCall) -> Result<FetchedResources>
where
    E: FetchExecutor + ?Sized,
{
    match call {
        FetchCall::Batch {
            tenant, args, ids, ..
        } => {
            let by_id = executor.fetch_batch(tenant, args, ids).await?;
            Ok(FetchedResources::ById(by_id))
        }
        FetchCall::Windowed { key, args, windows } => {
            let mut resources = Vec::new();
            for window in windows {
                let mut page = executor
                    .fetch_windowed(key.tenant(), args, key.resource_id(), window)
                    .await?;
                resources.append(&mut page);
            }
            Ok(FetchedResources::Windowed(resources))
        }
    }
}
