//! Generic loading cache with value-derived expiry.
//!
//! # Responsibilities
//! - Store `(value, computed expiry instant)` pairs
//! - Coalesce concurrent misses into one loader invocation per key
//! - Expose invalidation by key, by key predicate, and in-place updates
//!
//! # Design Decisions
//! - Expiry is computed from the loaded value, not a cache-wide TTL
//! - `None` expiry means pure memoization (credential cache)
//! - Expired entries are dropped on access; no background sweeper thread
//! - Bulk invalidation may race with reads; a racing read observes pre- or
//!   post-invalidation state, never a torn entry

use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::error::SidecarError;
use crate::observability::metrics as metric_names;

#[derive(Debug, Clone)]
struct Slot<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Slot<V> {
    fn is_live(&self) -> bool {
        match self.expires_at {
            Some(deadline) => Instant::now() < deadline,
            None => true,
        }
    }
}

/// Loading cache keyed by `K`, holding values until their computed expiry.
pub struct ExpiringCache<K, V> {
    /// Cache name used as a metric label.
    name: &'static str,
    slots: DashMap<K, Slot<V>>,
    /// Per-key flight locks; at most one loader runs per key.
    flights: DashMap<K, Arc<Mutex<()>>>,
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slots: DashMap::new(),
            flights: DashMap::new(),
        }
    }

    /// Live value for the key, if present.
    pub fn get(&self, key: &K) -> Option<V> {
        // The read guard from `slots.get` must be dropped before `remove_if`
        // takes a write lock on the same shard, or this thread deadlocks.
        let lookup = match self.slots.get(key) {
            Some(slot) if slot.is_live() => Some(Some(slot.value.clone())),
            Some(_) => Some(None),
            None => None,
        };
        match lookup {
            Some(Some(value)) => {
                metrics::counter!(metric_names::CACHE_HITS_TOTAL, "cache" => self.name).increment(1);
                Some(value)
            }
            Some(None) => {
                drop(self.slots.remove_if(key, |_, slot| !slot.is_live()));
                metrics::counter!(metric_names::CACHE_MISSES_TOTAL, "cache" => self.name).increment(1);
                None
            }
            None => {
                metrics::counter!(metric_names::CACHE_MISSES_TOTAL, "cache" => self.name).increment(1);
                None
            }
        }
    }

    /// Insert a value with an explicit expiry instant (`None` = no expiry).
    pub fn insert(&self, key: K, value: V, expires_at: Option<Instant>) {
        self.slots.insert(key, Slot { value, expires_at });
    }

    /// Live value or the result of exactly one loader invocation.
    ///
    /// Concurrent misses for the same key wait on the in-flight load and then
    /// read its result. The expiry is computed from the loaded value.
    pub async fn get_or_try_load<F, Fut, E>(
        &self,
        key: K,
        expiry_of: E,
        load: F,
    ) -> Result<V, SidecarError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, SidecarError>>,
        E: Fn(&V) -> Option<Instant>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }

        let flight = self
            .flights
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = flight.lock().await;

        // Another flight may have completed while we waited.
        if let Some(slot) = self.slots.get(&key) {
            if slot.is_live() {
                return Ok(slot.value.clone());
            }
        }

        let result = load().await;
        if let Ok(value) = &result {
            let expires_at = expiry_of(value);
            self.slots.insert(key.clone(), Slot { value: value.clone(), expires_at });
        }
        self.flights.remove(&key);
        result
    }

    /// Remove one key.
    pub fn invalidate(&self, key: &K) {
        self.slots.remove(key);
        self.flights.remove(key);
    }

    /// Remove every entry whose key matches the predicate.
    pub fn invalidate_matching(&self, mut pred: impl FnMut(&K) -> bool) {
        self.slots.retain(|key, _| !pred(key));
    }

    /// Update, in place, every live entry whose key matches the predicate.
    /// Used to flip introspection verdicts to "inactive" without evicting
    /// them (an evicted entry would trigger a pointless re-introspection).
    pub fn update_matching(
        &self,
        mut pred: impl FnMut(&K) -> bool,
        mut apply: impl FnMut(&mut V),
    ) {
        for mut entry in self.slots.iter_mut() {
            if pred(entry.key()) {
                apply(&mut entry.value_mut().value);
            }
        }
    }

    /// Number of stored entries, live or not.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when the cache holds nothing.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
