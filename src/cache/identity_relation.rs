//! # Identity Relation Cache
//!
//! Resolves which backend resource an external caller identity acts through,
//! and memoizes the answer for one TTL window so UI renders do not repeat the
//! owner-then-member lookup.
//!
//! Resolution is two dependent reads, each submitted through the concurrency
//! limiter with a deadline:
//!
//! 1. does the identity own a resource? If yes, that is the acting context.
//! 2. otherwise, is the identity a member of a resource? Its answer, or `None`,
//!    is the acting context.
//!
//! A confirmed "no relation" (`None`) is cached like any other answer. A failed
//! read caches nothing and the error goes to the caller.
//!
//! Concurrent `resolve` calls for the same stale identity are not coalesced:
//! each issues its own reads and the last one to finish wins the entry.

use crate::cache::entry::{CacheEntry, CacheStats, CacheStatsSnapshot};
use crate::concurrency::ConcurrencyLimiter;
use crate::config::duration_ms;
use crate::error::{CoreError, CoreResult, UpstreamError};
use crate::source::{RelationSource, ResourceId};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// How an identity is related to the resource it acts through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Owner,
    Member,
}

/// Resource through which an identity is permitted to act
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActingContext {
    pub resource_id: ResourceId,
    pub relation: RelationKind,
}

impl ActingContext {
    pub fn owner(resource_id: impl Into<ResourceId>) -> Self {
        Self {
            resource_id: resource_id.into(),
            relation: RelationKind::Owner,
        }
    }

    pub fn member(resource_id: impl Into<ResourceId>) -> Self {
        Self {
            resource_id: resource_id.into(),
            relation: RelationKind::Member,
        }
    }
}

pub struct IdentityRelationCache {
    source: Arc<dyn RelationSource>,
    limiter: Arc<ConcurrencyLimiter>,
    ttl: Duration,
    timeout: Duration,
    entries: DashMap<String, CacheEntry<Option<ActingContext>>>,
    stats: CacheStats,
}

impl std::fmt::Debug for IdentityRelationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityRelationCache")
            .field("limiter", &self.limiter.name())
            .field("ttl", &self.ttl)
            .field("timeout", &self.timeout)
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl IdentityRelationCache {
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
            "Identity relation cache initialized"
        );
        Self {
            source,
            limiter,
            ttl,
            timeout,
            entries: DashMap::new(),
            stats: CacheStats::default(),
        }
    }

    /// Acting context for `identity`, from cache when fresh, otherwise fetched
    pub async fn resolve(&self, identity: &str) -> CoreResult<Option<ActingContext>> {
        if let Some(cached) = self.peek(identity) {
            self.stats.record_hit();
            debug!(identity, "Identity relation cache hit");
            return Ok(cached);
        }
        self.stats.record_miss();
        debug!(identity, "Identity relation cache miss");

        match self.lookup(identity).await {
            Ok(context) => {
                self.entries.insert(
                    identity.to_string(),
                    CacheEntry::fresh(context.clone(), Instant::now()),
                );
                self.stats.record_refresh();
                Ok(context)
            }
            Err(error) => {
                self.stats.record_failure();
                warn!(identity, error = %error, "Identity relation lookup failed");
                Err(error)
            }
        }
    }

    /// Cached answer if it is still fresh. Never issues a remote read.
    ///
    /// The outer `Option` is `None` when nothing fresh is cached; the inner one
    /// is the cached answer, where `None` means "no relation".
    pub fn peek(&self, identity: &str) -> Option<Option<ActingContext>> {
        let entry = self.entries.get(identity)?;
        entry
            .is_fresh(self.ttl, Instant::now())
            .then(|| entry.data().clone())
    }

    /// Drop the entry for `identity`; returns whether one existed
    pub fn invalidate(&self, identity: &str) -> bool {
        self.entries.remove(identity).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
        info!("Cleared identity relation cache");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    async fn lookup(&self, identity: &str) -> CoreResult<Option<ActingContext>> {
        let owned = self
            .submit("find_owned_resource", identity, |source, identity| async move {
                source.find_owned_resource(&identity).await
            })
            .await?;
        if let Some(resource_id) = owned {
            return Ok(Some(ActingContext::owner(resource_id)));
        }

        let member = self
            .submit("find_member_resource", identity, |source, identity| async move {
                source.find_member_resource(&identity).await
            })
            .await?;
        Ok(member.map(ActingContext::member))
    }

    async fn submit<T, F, Fut>(&self, operation: &str, identity: &str, read: F) -> CoreResult<T>
    where
        F: FnOnce(Arc<dyn RelationSource>, String) -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>> + Send + 'static,
        T: Send + 'static,
    {
        let source = Arc::clone(&self.source);
        let identity = identity.to_string();
        self.limiter
            .execute_with_deadline(operation, self.timeout, move || {
                let read = read(source, identity);
                async move { read.await.map_err(CoreError::from) }
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemoryRelationSource;
    use tokio::time::sleep;

    fn cache_with(source: Arc<InMemoryRelationSource>, ttl: Duration) -> IdentityRelationCache {
        let limiter = Arc::new(ConcurrencyLimiter::new("identity_relations", 2).unwrap());
        IdentityRelationCache::new(source, limiter, ttl, Duration::from_millis(100))
    }

    #[tokio::test(start_paused = true)]
    async fn test_owner_short_circuits_member_lookup() {
        let source = Arc::new(InMemoryRelationSource::new());
        source.set_owner("user-1", "space-1");
        source.set_member("user-1", "space-2");
        let cache = cache_with(Arc::clone(&source), Duration::from_secs(60));

        let context = cache.resolve("user-1").await.unwrap();

        assert_eq!(context, Some(ActingContext::owner("space-1")));
        assert_eq!(source.call_counts().owner_lookups, 1);
        assert_eq!(source.call_counts().member_lookups, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_member_lookup_when_not_owner() {
        let source = Arc::new(InMemoryRelationSource::new());
        source.set_member("user-2", "space-7");
        let cache = cache_with(Arc::clone(&source), Duration::from_secs(60));

        let context = cache.resolve("user-2").await.unwrap();

        assert_eq!(context, Some(ActingContext::member("space-7")));
        assert_eq!(source.call_counts().member_lookups, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_relation_is_cached() {
        let source = Arc::new(InMemoryRelationSource::new());
        let cache = cache_with(Arc::clone(&source), Duration::from_secs(60));

        assert_eq!(cache.resolve("anonymous").await.unwrap(), None);
        assert_eq!(cache.resolve("anonymous").await.unwrap(), None);

        assert_eq!(source.call_counts().total(), 2);
        assert_eq!(cache.peek("anonymous"), Some(None));
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_entry_skips_remote_reads_until_ttl_expires() {
        let source = Arc::new(InMemoryRelationSource::new());
        source.set_owner("user-1", "space-1");
        let cache = cache_with(Arc::clone(&source), Duration::from_millis(100));

        cache.resolve("user-1").await.unwrap();
        sleep(Duration::from_millis(50)).await;
        cache.resolve("user-1").await.unwrap();
        assert_eq!(source.call_counts().total(), 1);

        sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.peek("user-1"), None);
        cache.resolve("user-1").await.unwrap();
        assert_eq!(source.call_counts().total(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_not_cached() {
        let source = Arc::new(InMemoryRelationSource::new());
        source.set_owner("user-1", "space-1");
        source.set_failing(true);
        let cache = cache_with(Arc::clone(&source), Duration::from_secs(60));

        let error = cache.resolve("user-1").await.unwrap_err();
        assert!(error.is_upstream());
        assert!(cache.is_empty());
        assert_eq!(cache.stats().failures, 1);

        source.set_failing(false);
        assert_eq!(
            cache.resolve("user-1").await.unwrap(),
            Some(ActingContext::owner("space-1"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_lookup_surfaces_deadline_exceeded() {
        let source = Arc::new(InMemoryRelationSource::new().with_latency(Duration::from_millis(500)));
        let cache = cache_with(Arc::clone(&source), Duration::from_secs(60));

        let error = cache.resolve("user-1").await.unwrap_err();

        assert!(error.is_deadline_exceeded());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_refetch() {
        let source = Arc::new(InMemoryRelationSource::new());
        source.set_owner("user-1", "space-1");
        let cache = cache_with(Arc::clone(&source), Duration::from_secs(60));

        cache.resolve("user-1").await.unwrap();
        assert!(cache.invalidate("user-1"));
        assert!(!cache.invalidate("user-1"));
        cache.resolve("user-1").await.unwrap();

        assert_eq!(source.call_counts().owner_lookups, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_stale_resolves_each_fetch() {
        let source = Arc::new(InMemoryRelationSource::new().with_latency(Duration::from_millis(10)));
        source.set_owner("user-1", "space-1");
        let cache = cache_with(Arc::clone(&source), Duration::from_secs(60));

        let (first, second) = tokio::join!(cache.resolve("user-1"), cache.resolve("user-1"));

        assert_eq!(first.unwrap(), second.unwrap());
        assert_eq!(source.call_counts().owner_lookups, 2);
        assert_eq!(cache.len(), 1);
    }
}
