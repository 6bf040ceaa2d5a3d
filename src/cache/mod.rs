//! # Caches
//!
//! TTL-bounded, identity-keyed caches over the remote relation reads. Each
//! cache submits its reads through a shared [`ConcurrencyLimiter`] with a
//! deadline, so a burst of UI renders cannot flood the backend.
//!
//! [`ConcurrencyLimiter`]: crate::concurrency::ConcurrencyLimiter

pub mod entry;
pub mod identity_relation;
pub mod membership;

pub use entry::{CacheEntry, CacheStats, CacheStatsSnapshot};
pub use identity_relation::{ActingContext, IdentityRelationCache, RelationKind};
pub use membership::MembershipSetCache;
