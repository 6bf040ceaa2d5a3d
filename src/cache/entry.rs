//! Timestamped cache entries and hit/miss counters shared by both caches.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Cached value with the instant it was last fetched or optimistically touched
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    value: V,
    fetched_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    /// Entry fetched at `now`
    pub fn fresh(value: V, now: Instant) -> Self {
        Self {
            value,
            fetched_at: Some(now),
        }
    }

    /// Entry holding a value that has never been confirmed by a fetch
    pub fn unfetched(value: V) -> Self {
        Self {
            value,
            fetched_at: None,
        }
    }

    pub fn data(&self) -> &V {
        &self.value
    }

    pub fn data_mut(&mut self) -> &mut V {
        &mut self.value
    }

    pub fn fetched_at(&self) -> Option<Instant> {
        self.fetched_at
    }

    /// Fresh iff fetched and `now - fetched_at < ttl`
    pub fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        self.fetched_at
            .is_some_and(|fetched_at| now.saturating_duration_since(fetched_at) < ttl)
    }

    pub fn touch(&mut self, now: Instant) {
        self.fetched_at = Some(now);
    }
}

/// Serializable snapshot of [`CacheStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub refreshes: u64,
    pub failures: u64,
}

impl CacheStatsSnapshot {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    refreshes: AtomicU64,
    failures: AtomicU64,
}

impl CacheStats {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}
