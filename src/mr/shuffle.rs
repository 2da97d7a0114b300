//! The shuffle phase: groups mapped pairs by key

use std::{
    collections::{hash_map, HashMap},
    hash::Hash,
};

use tracing::debug;

use crate::mr::worker::KeyValue;

/// Every value mapped for each key, built in one pass after the map barrier
/// The order of values inside a group is unspecified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShuffleGroup<K: Eq + Hash, V> {
    groups: HashMap<K, Vec<V>>,
}

impl<K: Eq + Hash, V> ShuffleGroup<K, V> {
    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get(&self, key: &K) -> Option<&[V]> {
        self.groups.get(key).map(Vec::as_slice)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.groups.keys()
    }

    /// Total number of values across all groups
    pub fn value_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn into_inner(self) -> HashMap<K, Vec<V>> {
        self.groups
    }
}

impl<K: Eq + Hash, V> Default for ShuffleGroup<K, V> {
    fn default() -> Self {
        Self {
            groups: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash, V> FromIterator<KeyValue<K, V>> for ShuffleGroup<K, V> {
    fn from_iter<I: IntoIterator<Item = KeyValue<K, V>>>(iter: I) -> Self {
        let mut groups: HashMap<K, Vec<V>> = HashMap::new();
        for KeyValue { key, value } in iter {
            groups.entry(key).or_default().push(value);
        }
        Self { groups }
    }
}

impl<K: Eq + Hash, V> IntoIterator for ShuffleGroup<K, V> {
    type Item = (K, Vec<V>);
    type IntoIter = hash_map::IntoIter<K, Vec<V>>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.into_iter()
    }
}

/// Groups `pairs` by key, creating each key's group on first sight
pub fn group<K, V, I>(pairs: I) -> ShuffleGroup<K, V>
where
    K: Eq + Hash,
    I: IntoIterator<Item = KeyValue<K, V>>,
{
    let shuffled: ShuffleGroup<K, V> = pairs.into_iter().collect();
    debug!(
        "[Shuffle] Grouped {} value(s) under {} key(s)",
        shuffled.value_count(),
        shuffled.len()
    );
    shuffled
}
