//! TTL cache for registered waiters.
//!
//! A concurrent map from correlation id to [`Waiter`] with sliding
//! expiration: every successful lookup resets the entry's timer. The
//! dispatcher runs a periodic sweep that evicts entries idle for longer
//! than the sliding window and invokes their release hook exactly once.
//! The map mutex serializes lookup, insertion, and eviction per entry.

use std::collections::HashMap;
use std::collections::hash_map::Entry as MapEntry;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::waiter::Waiter;

struct Entry {
    waiter: Waiter,
    last_access: Instant,
}

struct Inner {
    entries: Mutex<HashMap<String, Entry>>,
    sliding_expiration: Duration,
}

/// Concurrent id → waiter map with sliding expiration.
#[derive(Clone)]
pub struct TtlCache {
    inner: Arc<Inner>,
}

impl TtlCache {
    pub fn new(sliding_expiration: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                sliding_expiration,
            }),
        }
    }

    /// Atomic insert-if-absent. Returns false when a waiter with the same
    /// id is already registered.
    pub fn try_add(&self, waiter: Waiter) -> bool {
        let mut entries = self.inner.entries.lock();
        match entries.entry(waiter.id().to_owned()) {
            MapEntry::Occupied(_) => false,
            MapEntry::Vacant(slot) => {
                slot.insert(Entry {
                    waiter,
                    last_access: Instant::now(),
                });
                true
            }
        }
    }

    /// Look up a waiter, resetting its expiration timer.
    pub fn try_get(&self, id: &str) -> Option<Waiter> {
        let mut entries = self.inner.entries.lock();
        let entry = entries.get_mut(id)?;
        entry.last_access = Instant::now();
        Some(entry.waiter.clone())
    }

    /// Atomic remove. Does not invoke the release hook; used when a
    /// dispatched one-shot waiter is consumed rather than abandoned.
    pub fn try_remove(&self, id: &str) -> Option<Waiter> {
        self.inner.entries.lock().remove(id).map(|e| e.waiter)
    }

    /// Remove and release. Returns false if no such entry existed.
    pub fn remove_release(&self, id: &str) -> bool {
        match self.try_remove(id) {
            Some(waiter) => {
                waiter.release();
                true
            }
            None => false,
        }
    }

    /// Evict every entry idle for longer than the sliding window, invoking
    /// each release hook once. Returns the number of evictions.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<Waiter> = {
            let mut entries = self.inner.entries.lock();
            let dead: Vec<String> = entries
                .iter()
                .filter(|(_, e)| now.duration_since(e.last_access) > self.inner.sliding_expiration)
                .map(|(id, _)| id.clone())
                .collect();
            dead.into_iter()
                .filter_map(|id| entries.remove(&id).map(|e| e.waiter))
                .collect()
        };
        for waiter in &expired {
            tracing::debug!(id = waiter.id(), "evicting idle waiter");
            waiter.release();
        }
        expired.len()
    }

    /// Remove and release every entry (pipeline teardown).
    pub fn release_all(&self) {
        let drained: Vec<Entry> = {
            let mut entries = self.inner.entries.lock();
            entries.drain().map(|(_, e)| e).collect()
        };
        for entry in &drained {
            entry.waiter.release();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache_with(window_ms: u64) -> TtlCache {
        TtlCache::new(Duration::from_millis(window_ms))
    }

    #[test]
    fn add_is_insert_if_absent() {
        let cache = cache_with(1000);
        let (a, _rx_a) = Waiter::one_shot("x");
        let (b, _rx_b) = Waiter::one_shot("x");
        assert!(cache.try_add(a));
        assert!(!cache.try_add(b), "second registration for the same id must fail");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn get_returns_registered_waiter() {
        let cache = cache_with(1000);
        let (w, _rx) = Waiter::one_shot("abc");
        cache.try_add(w);
        assert_eq!(cache.try_get("abc").unwrap().id(), "abc");
        assert!(cache.try_get("nope").is_none());
        // Byte-exact comparison: hex ids are case-sensitive.
        assert!(cache.try_get("ABC").is_none());
    }

    #[test]
    fn remove_without_release_keeps_waiter_live() {
        let cache = cache_with(1000);
        let (w, _rx) = Waiter::one_shot("abc");
        cache.try_add(w);
        let w = cache.try_remove("abc").unwrap();
        assert!(!w.is_cancelled());
    }

    #[test]
    fn remove_release_cancels() {
        let cache = cache_with(1000);
        let (w, _rx) = Waiter::one_shot("abc");
        cache.try_add(w.clone());
        assert!(cache.remove_release("abc"));
        assert!(w.is_cancelled());
        assert!(!cache.remove_release("abc"));
    }

    #[test]
    fn sweep_evicts_only_idle_entries() {
        let cache = cache_with(30);
        let (old, _rx_old) = Waiter::one_shot("old");
        let (hot, _rx_hot) = Waiter::one_shot("hot");
        cache.try_add(old.clone());
        cache.try_add(hot.clone());

        std::thread::sleep(Duration::from_millis(40));
        // Access resets the sliding timer for "hot" only.
        cache.try_get("hot");

        assert_eq!(cache.evict_expired(), 1);
        assert!(old.is_cancelled());
        assert!(!hot.is_cancelled());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn release_all_drains() {
        let cache = cache_with(1000);
        let (a, _rx_a) = Waiter::one_shot("a");
        let (b, _rx_b) = Waiter::one_shot("b");
        cache.try_add(a.clone());
        cache.try_add(b.clone());
        cache.release_all();
        assert!(cache.is_empty());
        assert!(a.is_cancelled() && b.is_cancelled());
    }
}
