//! # Deadline Guard
//!
//! Bounds how long a caller waits for a task without cancelling the task.
//!
//! The task is moved onto its own Tokio task and the caller races the join
//! handle against a timer. When the timer wins, the handle is dropped, which
//! detaches the task: it keeps running to completion and its outcome is
//! discarded. The remote calls this guards expose no cancellation signal, so
//! "cancellation" here only means the caller stops waiting.

use crate::config::duration_ms;
use crate::error::CoreError;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Label used by [`with_deadline`] when the caller does not name the operation
const UNNAMED_OPERATION: &str = "task";

/// Named deadline applied to one or more task runs
#[derive(Debug, Clone)]
pub struct DeadlineGuard {
    operation: String,
    timeout: Duration,
}

impl DeadlineGuard {
    pub fn new(operation: impl Into<String>, timeout: Duration) -> Self {
        Self {
            operation: operation.into(),
            timeout,
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start `task_fn` and wait at most `timeout` for its outcome.
    ///
    /// Calling this inside [`ConcurrencyLimiter::execute`] releases the
    /// limiter slot as soon as the deadline fires, while the task is still
    /// running. Use [`ConcurrencyLimiter::execute_with_deadline`] when the slot
    /// must stay occupied until the task really finishes.
    ///
    /// [`ConcurrencyLimiter::execute`]: crate::concurrency::ConcurrencyLimiter::execute
    /// [`ConcurrencyLimiter::execute_with_deadline`]: crate::concurrency::ConcurrencyLimiter::execute_with_deadline
    pub async fn run<F, Fut, T, E>(&self, task_fn: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: From<CoreError> + Send + 'static,
    {
        let handle = tokio::spawn(task_fn());
        self.race(handle).await
    }

    /// Race an already spawned task against the deadline.
    ///
    /// A panic inside the task is resumed on the caller. If the task was
    /// cancelled by the runtime the caller gets [`CoreError::TaskFailed`].
    pub(crate) async fn race<T, E>(&self, handle: JoinHandle<Result<T, E>>) -> Result<T, E>
    where
        E: From<CoreError>,
    {
        let started = Instant::now();
        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(outcome)) => {
                debug!(
                    operation = %self.operation,
                    elapsed_ms = duration_ms(started.elapsed()),
                    "Task settled before deadline"
                );
                outcome
            }
            Ok(Err(join_error)) => {
                if join_error.is_panic() {
                    std::panic::resume_unwind(join_error.into_panic());
                }
                Err(CoreError::TaskFailed(format!("{}: {join_error}", self.operation)).into())
            }
            Err(_) => {
                warn!(
                    operation = %self.operation,
                    timeout_ms = duration_ms(self.timeout),
                    "Deadline exceeded, abandoning wait (task keeps running)"
                );
                Err(CoreError::DeadlineExceeded {
                    operation: self.operation.clone(),
                    timeout: self.timeout,
                }
                .into())
            }
        }
    }
}

/// Race `task_fn()` against a timer of `timeout`.
///
/// Whichever settles first decides the outcome: the task's own value or error,
/// or [`CoreError::DeadlineExceeded`]. The task is never aborted.
///
/// `limiter.execute(|| with_deadline(task, timeout))` frees the limiter slot
/// when the deadline fires, not when the task finishes. To keep in-flight
/// accounting tied to real work, use
/// [`ConcurrencyLimiter::execute_with_deadline`](crate::concurrency::ConcurrencyLimiter::execute_with_deadline).
pub async fn with_deadline<F, Fut, T, E>(task_fn: F, timeout: Duration) -> Result<T, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: From<CoreError> + Send + 'static,
{
    DeadlineGuard::new(UNNAMED_OPERATION, timeout)
        .run(task_fn)
        .await
}
