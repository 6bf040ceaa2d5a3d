//! # Concurrency Limiter
//!
//! Bounds how many submitted tasks may be in flight at once. Admission is
//! granted by a FIFO-fair Tokio semaphore sized to the limiter's capacity, so
//! callers that arrive while the limiter is saturated are admitted strictly in
//! arrival order as slots free up.

use crate::concurrency::deadline::DeadlineGuard;
use crate::error::{CoreError, CoreResult};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, info};

/// Point-in-time view of a limiter's occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterStatus {
    pub in_flight: usize,
    pub queued: usize,
    pub capacity: usize,
}

/// Cumulative admission counters since construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterMetrics {
    /// Tasks that were granted a slot
    pub admitted: u64,
    /// Tasks that had to wait in the queue before admission
    pub waited: u64,
    /// Highest in-flight count ever observed
    pub peak_in_flight: usize,
}

#[derive(Debug, Default)]
struct Counters {
    in_flight: AtomicUsize,
    queued: AtomicUsize,
    admitted: AtomicU64,
    waited: AtomicU64,
    peak_in_flight: AtomicUsize,
}

/// Occupied admission slot.
///
/// `in_flight` is decremented before the permit goes back to the semaphore, so
/// the next waiter can never be counted while this slot is still counted.
#[derive(Debug)]
pub struct LimiterSlot {
    counters: Arc<Counters>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for LimiterSlot {
    fn drop(&mut self) {
        self.counters.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Keeps `queued` accurate when a waiting caller is admitted or abandons the wait
struct QueuedMarker<'a>(&'a Counters);

impl Drop for QueuedMarker<'_> {
    fn drop(&mut self) {
        self.0.queued.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Counting semaphore with a FIFO wait queue
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    name: String,
    capacity: usize,
    semaphore: Arc<Semaphore>,
    counters: Arc<Counters>,
}

impl ConcurrencyLimiter {
    /// Create a limiter protecting the named resource class.
    ///
    /// Fails with [`CoreError::Construction`] when `capacity` is zero or larger
    /// than the semaphore can represent.
    pub fn new(name: impl Into<String>, capacity: usize) -> CoreResult<Self> {
        let name = name.into();
        if capacity == 0 {
            return Err(CoreError::Construction(format!(
                "limiter '{name}' capacity must be at least 1"
            )));
        }
        if capacity > Semaphore::MAX_PERMITS {
            return Err(CoreError::Construction(format!(
                "limiter '{name}' capacity {capacity} exceeds maximum of {}",
                Semaphore::MAX_PERMITS
            )));
        }

        info!(limiter = %name, capacity, "Concurrency limiter initialized");

        Ok(Self {
            name,
            capacity,
            semaphore: Arc::new(Semaphore::new(capacity)),
            counters: Arc::new(Counters::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Side-effect free snapshot of current occupancy
    pub fn status(&self) -> LimiterStatus {
        LimiterStatus {
            in_flight: self.counters.in_flight.load(Ordering::Acquire),
            queued: self.counters.queued.load(Ordering::Acquire),
            capacity: self.capacity,
        }
    }

    pub fn metrics(&self) -> LimiterMetrics {
        LimiterMetrics {
            admitted: self.counters.admitted.load(Ordering::Relaxed),
            waited: self.counters.waited.load(Ordering::Relaxed),
            peak_in_flight: self.counters.peak_in_flight.load(Ordering::Relaxed),
        }
    }

    /// Stop admitting work.
    ///
    /// Callers still queued and every later submission fail with
    /// [`CoreError::LimiterClosed`]. Tasks already admitted run to completion
    /// and release their slots normally.
    pub fn close(&self) {
        self.semaphore.close();
        info!(
            limiter = %self.name,
            in_flight = self.counters.in_flight.load(Ordering::Acquire),
            queued = self.counters.queued.load(Ordering::Acquire),
            "Concurrency limiter closed"
        );
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Wait for a free slot.
    ///
    /// Tokio's semaphore hands released permits to waiters in arrival order, and
    /// `try_acquire` cannot succeed while anyone is waiting, so admission is FIFO.
    pub async fn acquire(&self) -> CoreResult<LimiterSlot> {
        let permit = match Arc::clone(&self.semaphore).try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => {
                self.counters.queued.fetch_add(1, Ordering::AcqRel);
                self.counters.waited.fetch_add(1, Ordering::Relaxed);
                let _marker = QueuedMarker(&self.counters);
                debug!(
                    limiter = %self.name,
                    queued = self.counters.queued.load(Ordering::Acquire),
                    "Limiter saturated, waiting for a slot"
                );
                Arc::clone(&self.semaphore)
                    .acquire_owned()
                    .await
                    .map_err(|e| CoreError::LimiterClosed(format!("{}: {e}", self.name)))?
            }
            Err(TryAcquireError::Closed) => {
                return Err(CoreError::LimiterClosed(self.name.clone()));
            }
        };

        let in_flight = self.counters.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.counters.admitted.fetch_add(1, Ordering::Relaxed);
        self.counters
            .peak_in_flight
            .fetch_max(in_flight, Ordering::Relaxed);

        Ok(LimiterSlot {
            counters: Arc::clone(&self.counters),
            _permit: permit,
        })
    }

    /// Run `task_fn` once a slot is available.
    ///
    /// The outcome is exactly the task's; the slot is released when the task
    /// settles, whether it succeeded or failed. A task that never settles holds
    /// its slot forever; use [`execute_with_deadline`](Self::execute_with_deadline)
    /// to bound how long the caller waits.
    pub async fn execute<F, Fut, T, E>(&self, task_fn: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CoreError>,
    {
        let _slot = self.acquire().await?;
        task_fn().await
    }

    /// Submit a batch of tasks, returning their outcomes in submission order.
    ///
    /// Slots are requested in submission order, so queued members of the batch
    /// are admitted in that order too. An empty batch does not touch the limiter.
    pub async fn execute_all<F, Fut, T, E>(&self, tasks: Vec<F>) -> Vec<Result<T, E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CoreError>,
    {
        if tasks.is_empty() {
            return Vec::new();
        }
        join_all(tasks.into_iter().map(|task_fn| self.execute(task_fn))).await
    }

    /// Admit the task, then race it against `timeout`.
    ///
    /// The task runs on its own Tokio task that owns the admission slot. If the
    /// deadline fires first the caller receives [`CoreError::DeadlineExceeded`],
    /// but the task keeps running and the slot stays occupied until it actually
    /// finishes, so `in_flight` reflects real work rather than waiting callers.
    pub async fn execute_with_deadline<F, Fut, T, E>(
        &self,
        operation: &str,
        timeout: Duration,
        task_fn: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: From<CoreError> + Send + 'static,
    {
        let slot = self.acquire().await?;
        let task = task_fn();
        let handle = tokio::spawn(async move {
            let outcome = task.await;
            drop(slot);
            outcome
        });
        DeadlineGuard::new(operation, timeout).race(handle).await
    }
}
