use crate::model::{RequestKey, Resource};
use std::collections::btree_map;
use std::collections::{BTreeMap, HashMap};

/// Raw output of one executed fetch call.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchedResources {
    /// Batch call results keyed by requested id.
    ById(HashMap<String, Vec<Resource>>),
    /// The full result of a windowed call, in downstream order.
    Windowed(Vec<Resource>),
}

/// Fetched resources per request key. A key mapped to an empty list means
/// "nothing found", which is not an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    entries: BTreeMap<RequestKey, Vec<Resource>>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &RequestKey) -> Option<&[Resource]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    pub fn contains_key(&self, key: &RequestKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, RequestKey, Vec<Resource>> {
        self.entries.iter()
    }

    pub fn insert(&mut self, key: RequestKey, resources: Vec<Resource>) {
        self.entries.insert(key, resources);
    }

    pub fn merge(&mut self, other: ResultSet) {
        self.entries.extend(other.entries);
    }

    /// Total resources across all keys, counting shared lists once per key.
    pub fn resource_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }
}

impl IntoIterator for ResultSet {
    type Item = (RequestKey, Vec<Resource>);
    type IntoIter = btree_map::IntoIter<RequestKey, Vec<Resource>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = (&'a RequestKey, &'a Vec<Resource>);
    type IntoIter = btree_map::Iter<'a, RequestKey, Vec<Resource>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ResultDemultiplexer;

impl ResultDemultiplexer {
    /// Maps `fetched` back onto every key in `keys`. Every key gets an entry.
    ///
    /// By-id results fan out: all keys sharing an id receive that id's list.
    pub fn demux(keys: &[RequestKey], fetched: FetchedResources) -> ResultSet {
        let mut results = ResultSet::new();

        match fetched {
            FetchedResources::ById(by_id) => {
                for key in keys {
                    let resources = by_id.get(key.resource_id()).cloned().unwrap_or_default();
                    results.insert(key.clone(), resources);
                }
            }
            FetchedResources::Windowed(resources) => {
                for key in keys {
                    results.insert(key.clone(), resources.clone());
                }
            }
        }

        results
    }
}
