//! Result cache consulted before a request reaches the pool.
//!
//! The pool never touches the cache; the caller reads it before submitting and
//! writes it after a successful completion.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Get/put store keyed by a task's domain identity.
pub trait ResultCache<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<V>;
    fn put(&self, key: K, value: V);
    fn remove(&self, key: &K) -> Option<V>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 3600,
            capacity: 1024,
        }
    }
}

struct Entry<V> {
    value: V,
    stored_at: DateTime<Utc>,
}

/// In-memory cache with expiry and a size bound.
///
/// When full, the entry stored longest ago is evicted.
pub struct MemoryCache<K, V> {
    entries: Mutex<HashMap<K, Entry<V>>>,
    ttl: Option<Duration>,
    capacity: usize,
}

impl<K, V> MemoryCache<K, V>
where
    K: Clone + Eq + Hash,
{
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        let ttl = (config.ttl_secs > 0).then(|| Duration::seconds(config.ttl_secs as i64));
        Self::new(config.capacity, ttl)
    }

    fn is_fresh(&self, entry: &Entry<V>, now: DateTime<Utc>) -> bool {
        self.ttl.is_none_or(|ttl| now - entry.stored_at < ttl)
    }
}

impl<K, V> ResultCache<K, V> for MemoryCache<K, V>
where
    K: Clone + Eq + Hash + Send,
    V: Clone + Send,
{
    fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let entry = entries.get(key)?;
        if self.is_fresh(entry, Utc::now()) {
            return Some(entry.value.clone());
        }
        entries.remove(key);
        None
    }

    fn put(&self, key: K, value: V) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.stored_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }
        entries.insert(
            key,
            Entry {
                value,
                stored_at: Utc::now(),
            },
        );
    }

    fn remove(&self, key: &K) -> Option<V> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key).map(|entry| entry.value)
    }

    fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
