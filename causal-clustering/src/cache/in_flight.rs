use std::sync::Arc;

use super::ConsecutiveCache;
use crate::config::ClusterConfig;

/// Marshalled size of a cached value, used for byte accounting.
pub trait EntrySize {
    fn size_in_bytes(&self) -> u64;
}

/// Observes cache effectiveness and occupancy.
pub trait InFlightCacheMonitor: Send + Sync {
    fn hit(&self);
    fn miss(&self);
    fn set_total_bytes(&self, total_bytes: u64);
    fn set_element_count(&self, element_count: usize);
}

pub struct NoopInFlightCacheMonitor;

impl InFlightCacheMonitor for NoopInFlightCacheMonitor {
    fn hit(&self) {}
    fn miss(&self) {}
    fn set_total_bytes(&self, _total_bytes: u64) {}
    fn set_element_count(&self, _element_count: usize) {}
}

#[derive(Debug)]
struct SizedEntry<V> {
    value: V,
    size: u64,
}

/// Recently appended log entries, bounded by entry count and total bytes.
///
/// Sizes are captured at insertion so that eviction subtracts exactly what
/// was added; `total_bytes` always equals the sum over retained entries.
pub struct ConsecutiveInFlightCache<V> {
    cache: ConsecutiveCache<SizedEntry<V>>,
    max_bytes: u64,
    total_bytes: u64,
    enabled: bool,
    monitor: Arc<dyn InFlightCacheMonitor>,
}

impl<V: EntrySize> ConsecutiveInFlightCache<V> {
    pub fn new(max_entries: usize, max_bytes: u64, enabled: bool) -> Self {
        Self::with_monitor(max_entries, max_bytes, enabled, Arc::new(NoopInFlightCacheMonitor))
    }

    pub fn from_config(config: &ClusterConfig, monitor: Arc<dyn InFlightCacheMonitor>) -> Self {
        Self::with_monitor(
            config.in_flight_cache_max_entries,
            config.in_flight_cache_max_bytes,
            config.in_flight_cache_enabled,
            monitor,
        )
    }

    pub fn with_monitor(
        max_entries: usize,
        max_bytes: u64,
        enabled: bool,
        monitor: Arc<dyn InFlightCacheMonitor>,
    ) -> Self {
        Self {
            cache: ConsecutiveCache::new(max_entries),
            max_bytes,
            total_bytes: 0,
            enabled,
            monitor,
        }
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Caches `value` at `index` and returns what had to be evicted, lowest
    /// index first. A disabled cache stores nothing.
    pub fn put(&mut self, index: i64, value: V) -> Vec<(i64, V)> {
        if !self.enabled {
            return Vec::new();
        }

        let size = value.size_in_bytes();
        let displaced = self.cache.put(index, SizedEntry { value, size });
        let mut evicted = self.account(displaced);
        self.total_bytes += size;

        while self.total_bytes > self.max_bytes {
            let Some(oldest) = self.cache.remove() else {
                break;
            };
            evicted.extend(self.account(vec![oldest]));
        }

        self.report();
        evicted
    }

    pub fn get(&self, index: i64) -> Option<&V> {
        if !self.enabled {
            return None;
        }
        match self.cache.get(index) {
            Some(entry) => {
                self.monitor.hit();
                Some(&entry.value)
            }
            None => {
                self.monitor.miss();
                None
            }
        }
    }

    /// Drops entries superseded by a snapshot, i.e. index `<= upto_inclusive`.
    pub fn prune(&mut self, upto_inclusive: i64) -> Vec<(i64, V)> {
        let evicted = self.cache.prune(upto_inclusive);
        let evicted = self.account(evicted);
        self.report();
        evicted
    }

    /// Drops entries discarded by a log conflict, i.e. index `>= from_inclusive`,
    /// highest index first.
    pub fn truncate(&mut self, from_inclusive: i64) -> Vec<(i64, V)> {
        let evicted = self.cache.truncate(from_inclusive);
        let evicted = self.account(evicted);
        self.report();
        evicted
    }

    pub fn clear(&mut self) -> Vec<(i64, V)> {
        let evicted = self.cache.clear();
        let evicted = self.account(evicted);
        self.report();
        evicted
    }

    pub fn element_count(&self) -> usize {
        self.cache.size()
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    fn account(&mut self, evicted: Vec<(i64, SizedEntry<V>)>) -> Vec<(i64, V)> {
        evicted
            .into_iter()
            .map(|(index, entry)| {
                self.total_bytes -= entry.size;
                (index, entry.value)
            })
            .collect()
    }

    fn report(&self) {
        self.monitor.set_total_bytes(self.total_bytes);
        self.monitor.set_element_count(self.cache.size());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    use super::*;

    #[derive(Debug, PartialEq)]
    struct Blob(u64);

    impl EntrySize for Blob {
        fn size_in_bytes(&self) -> u64 {
            self.0
        }
    }

    #[derive(Default)]
    struct CountingMonitor {
        hits: AtomicUsize,
        misses: AtomicUsize,
        total_bytes: AtomicU64,
        elements: AtomicUsize,
    }

    impl InFlightCacheMonitor for CountingMonitor {
        fn hit(&self) {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        fn miss(&self) {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        fn set_total_bytes(&self, total_bytes: u64) {
            self.total_bytes.store(total_bytes, Ordering::Relaxed);
        }
        fn set_element_count(&self, element_count: usize) {
            self.elements.store(element_count, Ordering::Relaxed);
        }
    }

    #[test]
    fn tracks_total_bytes_of_retained_entries() {
        let mut cache = ConsecutiveInFlightCache::new(10, 1_000, true);
        cache.put(0, Blob(10));
        cache.put(1, Blob(20));
        cache.put(2, Blob(30));

        assert_eq!(cache.element_count(), 3);
        assert_eq!(cache.total_bytes(), 60);

        cache.prune(0);
        assert_eq!(cache.total_bytes(), 50);

        cache.truncate(2);
        assert_eq!(cache.total_bytes(), 20);
        assert_eq!(cache.element_count(), 1);
    }

    #[test]
    fn byte_budget_evicts_oldest_first() {
        let mut cache = ConsecutiveInFlightCache::new(10, 100, true);
        cache.put(0, Blob(40));
        cache.put(1, Blob(40));
        let evicted = cache.put(2, Blob(40));

        assert_eq!(evicted, vec![(0, Blob(40))]);
        assert_eq!(cache.total_bytes(), 80);
        assert_eq!(cache.get(0), None);
        assert_eq!(cache.get(2), Some(&Blob(40)));

        let evicted = cache.put(3, Blob(90));
        assert_eq!(evicted, vec![(1, Blob(40)), (2, Blob(40))]);
        assert_eq!(cache.total_bytes(), 90);
    }

    #[test]
    fn entry_budget_evicts_oldest() {
        let mut cache = ConsecutiveInFlightCache::new(2, 1_000, true);
        cache.put(0, Blob(1));
        cache.put(1, Blob(2));
        let evicted = cache.put(2, Blob(3));

        assert_eq!(evicted, vec![(0, Blob(1))]);
        assert_eq!(cache.element_count(), 2);
        assert_eq!(cache.total_bytes(), 5);
    }

    #[test]
    fn gap_resets_window_and_bytes() {
        let mut cache = ConsecutiveInFlightCache::new(10, 1_000, true);
        cache.put(0, Blob(5));
        cache.put(1, Blob(5));
        cache.put(7, Blob(3));

        assert_eq!(cache.element_count(), 1);
        assert_eq!(cache.total_bytes(), 3);
    }

    #[test]
    fn disabled_cache_stores_nothing() {
        let mut cache = ConsecutiveInFlightCache::new(10, 1_000, false);
        cache.put(0, Blob(5));
        assert_eq!(cache.element_count(), 0);
        assert_eq!(cache.get(0), None);

        cache.enable();
        cache.put(0, Blob(5));
        assert_eq!(cache.get(0), Some(&Blob(5)));
    }

    #[test]
    fn monitor_sees_hits_misses_and_occupancy() {
        let monitor = Arc::new(CountingMonitor::default());
        let mut cache = ConsecutiveInFlightCache::with_monitor(10, 1_000, true, monitor.clone());
        cache.put(0, Blob(7));
        cache.put(1, Blob(8));

        assert!(cache.get(1).is_some());
        assert!(cache.get(5).is_none());

        assert_eq!(monitor.hits.load(Ordering::Relaxed), 1);
        assert_eq!(monitor.misses.load(Ordering::Relaxed), 1);
        assert_eq!(monitor.total_bytes.load(Ordering::Relaxed), 15);
        assert_eq!(monitor.elements.load(Ordering::Relaxed), 2);

        cache.clear();
        assert_eq!(monitor.total_bytes.load(Ordering::Relaxed), 0);
        assert_eq!(cache.total_bytes(), 0);
    }

    #[test]
    fn config_controls_bounds_and_enablement() {
        let mut config = ClusterConfig {
            in_flight_cache_max_entries: 2,
            in_flight_cache_enabled: false,
            ..ClusterConfig::default()
        };
        let mut disabled =
            ConsecutiveInFlightCache::from_config(&config, Arc::new(NoopInFlightCacheMonitor));
        assert!(disabled.put(0, Blob(1)).is_empty());
        assert_eq!(disabled.element_count(), 0);

        config.in_flight_cache_enabled = true;
        let mut cache =
            ConsecutiveInFlightCache::from_config(&config, Arc::new(NoopInFlightCacheMonitor));
        cache.put(0, Blob(1));
        cache.put(1, Blob(1));
        assert_eq!(cache.put(2, Blob(1)), vec![(0, Blob(1))]);
        assert_eq!(cache.element_count(), 2);
    }
}
