#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Nestfeed Core
//!
//! Client-side request concurrency and caching core for the Nestfeed app.
//!
//! ## Overview
//!
//! UI renders fan out into many small remote reads against the hosted backend.
//! This crate sits between the UI and that backend and keeps the fan-out under
//! control:
//!
//! - **Concurrency limiting**: at most N remote reads per resource class in
//!   flight, admitted FIFO
//! - **Deadlines**: callers stop waiting after a timeout while the underlying
//!   work runs to completion and keeps its slot
//! - **Identity relation cache**: memoized "which resource does this identity
//!   act through" answers
//! - **Membership cache**: per-identity membership sets with optimistic
//!   add/remove and stale-while-revalidate reads
//!
//! ## Module Organization
//!
//! - [`concurrency`] - Limiter, deadline guard and limiter registry
//! - [`cache`] - Identity relation and membership caches
//! - [`source`] - Remote relation reads the caches depend on
//! - [`context`] - `ClientCore` service container
//! - [`config`] - Environment presets and layered configuration loading
//! - [`error`] - Structured error handling
//! - [`logging`] - Tracing subscriber setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use nestfeed_core::config::ConfigLoader;
//! use nestfeed_core::context::ClientCore;
//! use nestfeed_core::source::InMemoryRelationSource;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), nestfeed_core::CoreError> {
//! nestfeed_core::logging::init_tracing();
//!
//! let config = ConfigLoader::from_env().load()?;
//! let core = ClientCore::new(config, Arc::new(InMemoryRelationSource::new()))?;
//!
//! if let Some(context) = core.identity_relations().resolve("user-1").await? {
//!     println!("acting through {}", context.resource_id);
//! }
//! core.memberships().add_optimistic("user-1", "space-9");
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod concurrency;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod source;

pub use cache::{ActingContext, IdentityRelationCache, MembershipSetCache, RelationKind};
pub use concurrency::{
    with_deadline, ConcurrencyLimiter, DeadlineGuard, LimiterRegistry, LimiterStatus,
};
pub use config::{ConfigLoader, CoreConfig};
pub use context::{ClientCore, CoreStatus};
pub use error::{CoreError, CoreResult, UpstreamError};
pub use source::{InMemoryRelationSource, RelationSource, ResourceId};
