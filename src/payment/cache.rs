//! LRU cache of webhook deliveries that were already applied.
//!
//! Gateways redeliver notifications until they see a 2xx. A delivery whose
//! reference code, canonical status and digest match one already applied
//! can be acknowledged without touching the store. Crediting is idempotent
//! without this cache; it only saves the round trip.

use crate::payment::status::CanonicalStatus;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Default cache capacity.
const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Identity of one applied delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeliveryKey {
    /// Payment reference code.
    pub reference_code: String,
    /// Status the delivery carried, after normalisation.
    pub status: CanonicalStatus,
    /// Digest as received, lowercased.
    pub digest: String,
}

impl DeliveryKey {
    /// Build a key, normalising the digest's case.
    #[must_use]
    pub fn new(reference_code: &str, status: CanonicalStatus, digest: &str) -> Self {
        Self {
            reference_code: reference_code.to_string(),
            status,
            digest: digest.trim().to_ascii_lowercase(),
        }
    }
}

/// LRU cache of applied deliveries.
#[derive(Clone)]
pub struct DeliveryCache {
    inner: Arc<Mutex<LruCache<DeliveryKey, ()>>>,
    stats: Arc<Mutex<CacheStats>>,
}

/// Cache statistics for monitoring.
#[derive(Debug, Default, Clone)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries added.
    pub additions: u64,
}

impl CacheStats {
    /// Calculate hit rate as a percentage.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

impl DeliveryCache {
    /// Create a new cache with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// Create a new cache with the specified capacity (at least one entry).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Arc::new(Mutex::new(LruCache::new(cap))),
            stats: Arc::new(Mutex::new(CacheStats::default())),
        }
    }

    /// Check if this delivery was already applied.
    pub fn contains(&self, key: &DeliveryKey) -> bool {
        let found = self.inner.lock().get(key).is_some();

        let mut stats = self.stats.lock();
        if found {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }

        found
    }

    /// Remember a delivery after it was applied.
    pub fn insert(&self, key: DeliveryKey) {
        self.inner.lock().put(key, ());
        self.stats.lock().additions += 1;
    }

    /// Get current cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }

    /// Get the current number of entries in the cache.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Check if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Default for DeliveryCache {
    fn default() -> Self {
        Self::new()
    }
}
