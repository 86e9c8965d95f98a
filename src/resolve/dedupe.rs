use crate::model::{FetchArgs, RequestKey};
use std::collections::HashMap;
use std::fmt;

/// A request key as produced for one event of the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedKey {
    pub event_index: usize,
    pub key: RequestKey,
    pub args: FetchArgs,
}

impl ClassifiedKey {
    pub fn new(event_index: usize, key: RequestKey, args: FetchArgs) -> Self {
        Self {
            event_index,
            key,
            args,
        }
    }
}

/// Two equal keys arrived with different fetch args. The first-seen args are
/// kept; the conflicting event is excluded from the key's fan-out.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateKeyConflict {
    pub key: RequestKey,
    pub event_index: usize,
    pub kept: FetchArgs,
    pub rejected: FetchArgs,
}

impl fmt::Display for DuplicateKeyConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "request key {} from event {} carries {:?} but {:?} was already recorded",
            self.key, self.event_index, self.rejected, self.kept
        )
    }
}

impl std::error::Error for DuplicateKeyConflict {}

#[derive(Debug)]
struct Entry {
    key: RequestKey,
    args: FetchArgs,
    events: Vec<usize>,
}

/// Distinct keys of a batch in first-seen order, with the events each one serves.
#[derive(Debug, Default)]
pub struct DedupedKeys {
    entries: Vec<Entry>,
    index: HashMap<RequestKey, usize>,
    conflicts: Vec<DuplicateKeyConflict>,
}

impl DedupedKeys {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RequestKey, &FetchArgs)> {
        self.entries.iter().map(|entry| (&entry.key, &entry.args))
    }

    pub fn keys(&self) -> impl Iterator<Item = &RequestKey> {
        self.entries.iter().map(|entry| &entry.key)
    }

    pub fn args(&self, key: &RequestKey) -> Option<&FetchArgs> {
        self.index.get(key).map(|&slot| &self.entries[slot].args)
    }

    /// Indices of the events whose results come from `key`.
    pub fn events_for(&self, key: &RequestKey) -> &[usize] {
        self.index
            .get(key)
            .map(|&slot| self.entries[slot].events.as_slice())
            .unwrap_or(&[])
    }

    pub fn conflicts(&self) -> &[DuplicateKeyConflict] {
        &self.conflicts
    }

    pub fn into_map(self) -> HashMap<RequestKey, FetchArgs> {
        self.entries
            .into_iter()
            .map(|entry| (entry.key, entry.args))
            .collect()
    }
}

/// Collapses equal request keys across a whole batch in a single pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyDeduplicator;

impl KeyDeduplicator {
    pub fn dedupe<I>(classified: I) -> DedupedKeys
    where
        I: IntoIterator<Item = ClassifiedKey>,
    {
        let mut deduped = DedupedKeys::default();

        for ClassifiedKey {
            event_index,
            key,
            args,
        } in classified
        {
            match deduped.index.get(&key).copied() {
                Some(slot) => {
                    let entry = &mut deduped.entries[slot];
                    if entry.args == args {
                        if !entry.events.contains(&event_index) {
                            entry.events.push(event_index);
                        }
                        continue;
                    }

                    let conflict = DuplicateKeyConflict {
                        key,
                        event_index,
                        kept: entry.args.clone(),
                        rejected: args,
                    };
                    tracing::error!(
                        key = %conflict.key,
                        event_index,
                        kept = ?conflict.kept,
                        rejected = ?conflict.rejected,
                        "duplicate request key with conflicting fetch args; excluding event"
                    );
                    deduped.conflicts.push(conflict);
                }
                None => {
                    deduped.index.insert(key.clone(), deduped.entries.len());
                    deduped.entries.push(Entry {
                        key,
                        args,
                        events: vec![event_index],
                    });
                }
            }
        }

        deduped
    }

    /// Positional variant: each pair's event index is its position in `pairs`.
    pub fn dedupe_pairs(pairs: Vec<(RequestKey, FetchArgs)>) -> DedupedKeys {
        Self::dedupe(
            pairs
                .into_iter()
                .enumerate()
                .map(|(index, (key, args))| ClassifiedKey::new(index, key, args)),
        )
    }
}
