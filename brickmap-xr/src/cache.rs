//! Bounded read-through caches
//!
//! [`TtlCache`] holds values for a fixed time-to-live and a fixed number of
//! entries. It is shared behind an `Arc` and guarded by a `std::sync::Mutex`
//! that is never held across an `.await`: callers `get`, do their async work
//! unlocked, then `set`. Two requests populating the same key both write and
//! the later value wins.

use crate::config::CachePolicyConfig;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Capacity and time-to-live of one cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub capacity: usize,
    pub ttl: Duration,
}

impl CachePolicy {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
        }
    }
}

impl From<CachePolicyConfig> for CachePolicy {
    fn from(config: CachePolicyConfig) -> Self {
        CachePolicy::new(config.capacity, Duration::from_secs(config.ttl_secs))
    }
}

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

pub struct TtlCache<K, V> {
    policy: CachePolicy,
    entries: Mutex<HashMap<K, Entry<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Live value for `key`; an expired entry is removed and reported missing
    pub fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.lock();
        let expired = match entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < self.policy.ttl => {
                return Some(entry.value.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.remove(key);
        }
        None
    }

    pub fn has(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Insert or replace; evicts expired entries, then the oldest, when full
    pub fn set(&self, key: K, value: V) {
        let mut entries = self.lock();

        if !entries.contains_key(&key) && entries.len() >= self.policy.capacity {
            let ttl = self.policy.ttl;
            entries.retain(|_, entry| entry.inserted_at.elapsed() < ttl);

            while entries.len() >= self.policy.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.inserted_at)
                    .map(|(key, _)| key.clone());
                match oldest {
                    Some(oldest) => {
                        entries.remove(&oldest);
                    }
                    None => break,
                }
            }
        }

        entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    // A poisoned lock only means another thread panicked mid-insert; the map is still usable
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<K, Entry<V>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
