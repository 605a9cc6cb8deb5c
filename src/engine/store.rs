//! Deduplicating item store

use crate::output::{OutputResult, ResultSink};
use crate::{ItemKey, SearchItem, SearchKind};
use std::collections::{BTreeMap, HashMap};

/// Items discovered so far, keyed by `(kind, provider_id)`.
///
/// Adjacent windows never overlap, but the provider may still return one
/// item under two windows (for example when its creation date is reported
/// inconsistently). Insertion is idempotent: only the first occurrence is
/// kept and forwarded to the sink.
pub struct ResultStore {
    items: Vec<SearchItem>,
    index: HashMap<ItemKey, usize>,
    sink: Option<Box<dyn ResultSink>>,
    duplicates: u64,
}

impl ResultStore {
    /// Store that only keeps items in memory.
    pub fn in_memory() -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
            sink: None,
            duplicates: 0,
        }
    }

    /// Store that also appends every new item to `sink`.
    pub fn with_sink(sink: Box<dyn ResultSink>) -> Self {
        Self {
            sink: Some(sink),
            ..Self::in_memory()
        }
    }

    /// Insert an item; returns `true` when it was not seen before.
    pub fn insert(&mut self, item: SearchItem) -> OutputResult<bool> {
        let key = item.key();
        if self.index.contains_key(&key) {
            self.duplicates += 1;
            return Ok(false);
        }
        if let Some(sink) = self.sink.as_mut() {
            sink.append(&item)?;
        }
        self.index.insert(key, self.items.len());
        self.items.push(item);
        Ok(true)
    }

    /// Whether an item with `key` has been recorded.
    pub fn contains(&self, key: &ItemKey) -> bool {
        self.index.contains_key(key)
    }

    /// Look up an item.
    pub fn get(&self, key: &ItemKey) -> Option<&SearchItem> {
        self.index.get(key).map(|&i| &self.items[i])
    }

    /// Items in discovery order.
    pub fn items(&self) -> &[SearchItem] {
        &self.items
    }

    /// Distinct items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Duplicate inserts ignored so far.
    pub fn duplicates(&self) -> u64 {
        self.duplicates
    }

    /// Distinct items per kind.
    pub fn count_by_kind(&self) -> BTreeMap<SearchKind, usize> {
        let mut counts = BTreeMap::new();
        for item in &self.items {
            *counts.entry(item.kind).or_insert(0) += 1;
        }
        counts
    }

    /// Flush and close the sink. Safe to call more than once.
    pub fn finalize(&mut self) -> OutputResult<()> {
        match self.sink.take() {
            Some(mut sink) => sink.finalize(),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for ResultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultStore")
            .field("items", &self.items.len())
            .field("duplicates", &self.duplicates)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}
