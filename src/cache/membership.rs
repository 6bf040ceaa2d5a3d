//! # Membership Set Cache
//!
//! Per-identity set of resource ids the identity is associated with (for
//! example the spaces a user follows), with optimistic local mutation.
//!
//! - [`load`](MembershipSetCache::load) is a fresh-or-refetch read through the
//!   limiter and deadline stack, and surfaces failures.
//! - [`is_member`](MembershipSetCache::is_member) never blocks and never fails:
//!   it answers from memory and, when the entry is stale, schedules a
//!   background refresh (stale-while-revalidate). At most one background
//!   refresh per identity is in flight.
//! - [`add_optimistic`](MembershipSetCache::add_optimistic) and
//!   [`remove_optimistic`](MembershipSetCache::remove_optimistic) mutate the set
//!   and mark it fresh without any remote call. The caller issues the remote
//!   write separately; if that write fails, the next TTL-driven load replaces
//!   the optimistic state with what the backend reports.

use crate::cache::entry::{CacheEntry, CacheStats, CacheStatsSnapshot};
use crate::concurrency::ConcurrencyLimiter;
use crate::config::duration_ms;
use crate::error::{CoreError, CoreResult};
use crate::source::{RelationSource, ResourceId};
use dashmap::{DashMap, DashSet};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

struct MembershipInner {
    source: Arc<dyn RelationSource>,
    limiter: Arc<ConcurrencyLimiter>,
    ttl: Duration,
    timeout: Duration,
    entries: DashMap<String, CacheEntry<HashSet<ResourceId>>>,
    refreshing: DashSet<String>,
    stats: CacheStats,
}

impl MembershipInner {
    fn fresh_members(&self, identity: &str) -> Option<HashSet<ResourceId>> {
        let entry = self.entries.get(identity)?;
        entry
            .is_fresh(self.ttl, Instant::now())
            .then(|| entry.data().clone())
    }

    /// Fetch the set from the source and overwrite whatever is cached
    async fn refresh(&self, identity: &str) -> CoreResult<HashSet<ResourceId>> {
        let source = Arc::clone(&self.source);
        let owned_identity = identity.to_string();
        let fetched = self
            .limiter
            .execute_with_deadline("list_memberships", self.timeout, move || async move {
                source
                    .list_memberships(&owned_identity)
                    .await
                    .map_err(CoreError::from)
            })
            .await;

        match fetched {
            Ok(members) => {
                debug!(identity, members = members.len(), "Membership set refreshed");
                self.entries.insert(
                    identity.to_string(),
                    CacheEntry::fresh(members.clone(), Instant::now()),
                );
                self.stats.record_refresh();
                Ok(members)
            }
            Err(error) => {
                self.stats.record_failure();
                Err(error)
            }
        }
    }
}

/// Cheap to clone; clones share the same entries
#[derive(Clone)]
pub struct MembershipSetCache {
    inner: Arc<MembershipInner>,
}

impl std::fmt::Debug for MembershipSetCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MembershipSetCache")
            .field("limiter", &self.inner.limiter.name())
            .field("ttl", &self.inner.ttl)
            .field("timeout", &self.inner.timeout)
            .field("entries", &self.inner.entries.len())
            .field("refreshing", &self.inner.refreshing.len())
            .finish()
    }
}

impl MembershipSetCache {
    pub fn new(
        source: Arc<dyn RelationSource>,
        limiter: Arc<ConcurrencyLimiter>,
        ttl: Duration,
        timeout: Duration,
    ) -> Self {
        info!(
            limiter = %limiter.name(),
            ttl_ms = duration_ms(ttl),
            timeout_ms = duration_ms(timeout),
            "Membership set cache initialized"
        );
        Self {
            inner: Arc::new(MembershipInner {
                source,
                limiter,
                ttl,
                timeout,
                entries: DashMap::new(),
                refreshing: DashSet::new(),
                stats: CacheStats::default(),
            }),
        }
    }

    /// Membership set for `identity`, fetched unless a fresh copy is cached
    pub async fn load(&self, identity: &str) -> CoreResult<HashSet<ResourceId>> {
        if let Some(members) = self.inner.fresh_members(identity) {
            self.inner.stats.record_hit();
            return Ok(members);
        }
        self.inner.stats.record_miss();

        self.inner.refresh(identity).await.inspect_err(|error| {
            warn!(identity, error = %error, "Membership load failed");
        })
    }

    /// Last-known membership; schedules a background refresh when stale
    pub fn is_member(&self, identity: &str, resource_id: &str) -> bool {
        let now = Instant::now();
        let (member, fresh) = match self.inner.entries.get(identity) {
            Some(entry) => (
                entry.data().contains(resource_id),
                entry.is_fresh(self.inner.ttl, now),
            ),
            None => (false, false),
        };

        if fresh {
            self.inner.stats.record_hit();
        } else {
            self.inner.stats.record_miss();
            self.spawn_refresh(identity);
        }
        member
    }

    pub fn add_optimistic(&self, identity: &str, resource_id: &str) {
        let mut entry = self
            .inner
            .entries
            .entry(identity.to_string())
            .or_insert_with(|| CacheEntry::unfetched(HashSet::new()));
        entry.data_mut().insert(resource_id.to_string());
        entry.touch(Instant::now());
        debug!(identity, resource_id, "Optimistic membership add");
    }

    pub fn remove_optimistic(&self, identity: &str, resource_id: &str) {
        let mut entry = self
            .inner
            .entries
            .entry(identity.to_string())
            .or_insert_with(|| CacheEntry::unfetched(HashSet::new()));
        entry.data_mut().remove(resource_id);
        entry.touch(Instant::now());
        debug!(identity, resource_id, "Optimistic membership remove");
    }

    /// Snapshot of the cached set regardless of freshness
    pub fn members(&self, identity: &str) -> Option<HashSet<ResourceId>> {
        self.inner
            .entries
            .get(identity)
            .map(|entry| entry.data().clone())
    }

    /// Whether a background refresh for `identity` is currently in flight
    pub fn is_refreshing(&self, identity: &str) -> bool {
        self.inner.refreshing.contains(identity)
    }

    pub fn invalidate(&self, identity: &str) -> bool {
        self.inner.entries.remove(identity).is_some()
    }

    pub fn clear(&self) {
        self.inner.entries.clear();
        info!("Cleared membership set cache");
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.inner.stats.snapshot()
    }

    fn spawn_refresh(&self, identity: &str) {
        let Ok(runtime) = Handle::try_current() else {
            debug!(identity, "No Tokio runtime available, skipping background refresh");
            return;
        };
        if !self.inner.refreshing.insert(identity.to_string()) {
            return;
        }

        let marker = RefreshMarker {
            inner: Arc::clone(&self.inner),
            identity: identity.to_string(),
        };
        runtime.spawn(async move {
            if let Err(error) = marker.inner.refresh(&marker.identity).await {
                warn!(identity = %marker.identity, error = %error, "Background membership refresh failed");
            }
        });
    }
}

/// Clears the in-flight refresh flag when the refresh task ends, even by panic
struct RefreshMarker {
    inner: Arc<MembershipInner>,
    identity: String,
}

impl Drop for RefreshMarker {
    fn drop(&mut self) {
        self.inner.refreshing.remove(&self.identity);
    }
}
