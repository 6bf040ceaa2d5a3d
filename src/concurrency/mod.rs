//! # Concurrency
//!
//! Admission control and caller-side deadlines for remote reads.
//!
//! - [`ConcurrencyLimiter`] bounds in-flight tasks per resource class, FIFO fair
//! - [`DeadlineGuard`] bounds how long a caller waits, without cancelling work
//! - [`LimiterRegistry`] hands out one shared limiter per resource class
//!
//! ## Usage
//!
//! ```rust,no_run
//! use nestfeed_core::concurrency::ConcurrencyLimiter;
//! use nestfeed_core::error::CoreError;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), CoreError> {
//! let limiter = ConcurrencyLimiter::new("listings", 3)?;
//!
//! let listing: String = limiter
//!     .execute_with_deadline("fetch_listing", Duration::from_secs(5), || async {
//!         Ok::<_, CoreError>("listing-1".to_string())
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod deadline;
pub mod limiter;
pub mod registry;

pub use deadline::{with_deadline, DeadlineGuard};
pub use limiter::{ConcurrencyLimiter, LimiterMetrics, LimiterSlot, LimiterStatus};
pub use registry::{LimiterRegistry, ResourceClassStatus};
