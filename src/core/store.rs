// src/core/store.rs

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::models::{Fact, Finding};

/// Append-only accumulator keyed by module identity.
///
/// Keys keep the order in which they were first created; values keep their
/// insertion order. Nothing can be removed or rewritten during a run.
#[derive(Debug, Clone)]
pub struct KeyedStore<T> {
    entries: Vec<(String, Vec<T>)>,
    index: HashMap<String, usize>,
}

pub type FindingStore = KeyedStore<Finding>;
pub type FactStore = KeyedStore<Fact>;

impl<T> Default for KeyedStore<T> {
    fn default() -> Self {
        Self { entries: Vec::new(), index: HashMap::new() }
    }
}

impl<T: Clone> KeyedStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty entry for `key` if none exists yet.
    pub fn ensure_key(&mut self, key: &str) {
        self.slot(key);
    }

    pub fn append(&mut self, key: &str, items: impl IntoIterator<Item = T>) {
        let slot = self.slot(key);
        self.entries[slot].1.extend(items);
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|(key, _)| key.clone()).collect()
    }

    pub fn get(&self, key: &str) -> &[T] {
        self.index.get(key).map(|&i| self.entries[i].1.as_slice()).unwrap_or(&[])
    }

    /// A copy of one key's current values, safe to hand to another task.
    pub fn snapshot(&self, key: &str) -> Arc<[T]> {
        Arc::from(self.get(key))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.iter().map(|(_, items)| items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Key order of first appearance, then insertion order within each key.
    pub fn flatten(&self) -> Vec<T> {
        self.entries.iter().flat_map(|(_, items)| items.iter().cloned()).collect()
    }

    fn slot(&mut self, key: &str) -> usize {
        if let Some(&slot) = self.index.get(key) {
            return slot;
        }
        self.entries.push((key.to_string(), Vec::new()));
        let slot = self.entries.len() - 1;
        self.index.insert(key.to_string(), slot);
        slot
    }
}

impl<T: Serialize> Serialize for KeyedStore<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, items) in &self.entries {
            map.serialize_entry(key, items)?;
        }
        map.end()
    }
}
