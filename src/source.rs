//! # Relation Source
//!
//! The remote reads the caches depend on. Implementations wrap the hosted
//! backend client; the core treats every call as an opaque task and passes
//! its [`UpstreamError`] through untouched.

use crate::error::UpstreamError;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Identifier of a backend resource (a space, a household, a page)
pub type ResourceId = String;

#[async_trait]
pub trait RelationSource: Send + Sync + 'static {
    /// Resource the identity owns, if any
    async fn find_owned_resource(&self, identity: &str) -> Result<Option<ResourceId>, UpstreamError>;

    /// Resource the identity is a member of, if any
    async fn find_member_resource(
        &self,
        identity: &str,
    ) -> Result<Option<ResourceId>, UpstreamError>;

    /// Every resource the identity is associated with
    async fn list_memberships(&self, identity: &str) -> Result<HashSet<ResourceId>, UpstreamError>;
}

/// Number of calls an [`InMemoryRelationSource`] has served, per operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceCallCounts {
    pub owner_lookups: u64,
    pub member_lookups: u64,
    pub membership_lists: u64,
}

impl SourceCallCounts {
    pub fn total(&self) -> u64 {
        self.owner_lookups + self.member_lookups + self.membership_lists
    }
}

/// In-process relation backend with injectable latency and failures
#[derive(Debug, Default)]
pub struct InMemoryRelationSource {
    owners: DashMap<String, ResourceId>,
    members: DashMap<String, ResourceId>,
    memberships: DashMap<String, HashSet<ResourceId>>,
    latency: Mutex<Duration>,
    failing: AtomicBool,
    owner_lookups: AtomicU64,
    member_lookups: AtomicU64,
    membership_lists: AtomicU64,
}

impl InMemoryRelationSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        *self.latency.lock() = latency;
        self
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub fn set_owner(&self, identity: &str, resource_id: &str) {
        self.owners
            .insert(identity.to_string(), resource_id.to_string());
    }

    pub fn set_member(&self, identity: &str, resource_id: &str) {
        self.members
            .insert(identity.to_string(), resource_id.to_string());
    }

    pub fn add_membership(&self, identity: &str, resource_id: &str) {
        self.memberships
            .entry(identity.to_string())
            .or_default()
            .insert(resource_id.to_string());
    }

    pub fn remove_membership(&self, identity: &str, resource_id: &str) {
        if let Some(mut set) = self.memberships.get_mut(identity) {
            set.remove(resource_id);
        }
    }

    /// Make every subsequent call fail with an [`UpstreamError`]
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn call_counts(&self) -> SourceCallCounts {
        SourceCallCounts {
            owner_lookups: self.owner_lookups.load(Ordering::SeqCst),
            member_lookups: self.member_lookups.load(Ordering::SeqCst),
            membership_lists: self.membership_lists.load(Ordering::SeqCst),
        }
    }

    async fn simulate(&self, operation: &str, counter: &AtomicU64) -> Result<(), UpstreamError> {
        counter.fetch_add(1, Ordering::SeqCst);
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(UpstreamError::new(operation, "simulated backend failure").with_code("503"));
        }
        Ok(())
    }
}

#[async_trait]
impl RelationSource for InMemoryRelationSource {
    async fn find_owned_resource(&self, identity: &str) -> Result<Option<ResourceId>, UpstreamError> {
        self.simulate("find_owned_resource", &self.owner_lookups)
            .await?;
        Ok(self.owners.get(identity).map(|r| r.value().clone()))
    }

    async fn find_member_resource(
        &self,
        identity: &str,
    ) -> Result<Option<ResourceId>, UpstreamError> {
        self.simulate("find_member_resource", &self.member_lookups)
            .await?;
        Ok(self.members.get(identity).map(|r| r.value().clone()))
    }

    async fn list_memberships(&self, identity: &str) -> Result<HashSet<ResourceId>, UpstreamError> {
        self.simulate("list_memberships", &self.membership_lists)
            .await?;
        Ok(self
            .memberships
            .get(identity)
            .map(|set| set.value().clone())
            .unwrap_or_default())
    }
}
