//! Priority-ordered, key-addressable collection.
//!
//! Both the active and the waiting set are lanes. A lane answers "lowest"
//! (the preemption victim) and "highest" (the backfill candidate) in
//! O(log n), and finds entries by key in O(1).

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use crate::pool::task::Priority;

/// Total order key: priority first, then insertion sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Rank {
    pub priority: Priority,
    pub seq: u64,
}

impl Rank {
    pub fn new(priority: Priority, seq: u64) -> Self {
        Self { priority, seq }
    }
}

#[derive(Debug)]
struct Slot<V> {
    rank: Rank,
    value: V,
}

/// Keyed entries ordered by [`Rank`].
#[derive(Debug)]
pub struct Lane<K, V> {
    order: BTreeMap<Rank, K>,
    entries: HashMap<K, Slot<V>>,
}

impl<K, V> Lane<K, V>
where
    K: Clone + Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            order: BTreeMap::new(),
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|slot| &slot.value)
    }

    /// Insert an entry. The key must not already be present.
    pub fn insert(&mut self, key: K, rank: Rank, value: V) {
        debug_assert!(!self.entries.contains_key(&key), "duplicate key in lane");
        debug_assert!(!self.order.contains_key(&rank), "duplicate rank in lane");
        self.order.insert(rank, key.clone());
        self.entries.insert(key, Slot { rank, value });
    }

    pub fn remove(&mut self, key: &K) -> Option<(Rank, V)> {
        let slot = self.entries.remove(key)?;
        self.order.remove(&slot.rank);
        Some((slot.rank, slot.value))
    }

    pub fn lowest_rank(&self) -> Option<Rank> {
        self.order.keys().next().copied()
    }

    pub fn pop_lowest(&mut self) -> Option<(K, Rank, V)> {
        let (rank, key) = self.order.pop_first()?;
        let slot = self.entries.remove(&key)?;
        Some((key, rank, slot.value))
    }

    pub fn pop_highest(&mut self) -> Option<(K, Rank, V)> {
        let (rank, key) = self.order.pop_last()?;
        let slot = self.entries.remove(&key)?;
        Some((key, rank, slot.value))
    }

    /// Keys from lowest to highest rank.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.order.values()
    }

    /// Remove everything, lowest rank first.
    pub fn drain(&mut self) -> Vec<(K, V)> {
        let mut drained = Vec::with_capacity(self.entries.len());
        while let Some((key, _, value)) = self.pop_lowest() {
            drained.push((key, value));
        }
        drained
    }
}

impl<K, V> Default for Lane<K, V>
where
    K: Clone + Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}
