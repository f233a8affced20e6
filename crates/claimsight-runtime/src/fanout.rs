//! Concurrent fan-out of modality units with per-unit isolation.
//!
//! Every unit settles into exactly one [`TaskResult`] under its own key:
//! an error, a panic or a timeout in one unit becomes that unit's
//! `Failure` and never touches its siblings. Units run on the calling task
//! through `buffer_unordered`, so they may borrow from the caller.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use claimsight_core::{Payload, ProcessingError, TaskKey, TaskResult};
use futures::{stream, FutureExt, StreamExt};
use tokio::time::Instant;

/// Runs units concurrently, bounded by `max_concurrency`.
#[derive(Debug, Clone, Copy)]
pub struct FanOutExecutor {
    max_concurrency: usize,
    unit_timeout: Duration,
}

impl FanOutExecutor {
    pub fn new(max_concurrency: usize, unit_timeout: Duration) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            unit_timeout,
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn unit_timeout(&self) -> Duration {
        self.unit_timeout
    }

    /// Run all units to settlement.
    pub async fn run<F, Fut>(&self, tasks: Vec<(TaskKey, F)>) -> BTreeMap<TaskKey, TaskResult>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Payload, ProcessingError>>,
    {
        self.run_until(tasks, None).await
    }

    /// Run all units; none may run past `deadline`.
    ///
    /// A unit whose timeout was cut short by the deadline, or that starts
    /// after it, fails with `DeadlineExceeded`.
    pub async fn run_until<F, Fut>(
        &self,
        tasks: Vec<(TaskKey, F)>,
        deadline: Option<Instant>,
    ) -> BTreeMap<TaskKey, TaskResult>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Payload, ProcessingError>>,
    {
        if tasks.is_empty() {
            return BTreeMap::new();
        }

        let mut seen = BTreeSet::new();
        let units: Vec<_> = tasks
            .into_iter()
            .filter(|(key, _)| {
                let fresh = seen.insert(*key);
                if !fresh {
                    tracing::warn!(%key, "Duplicate unit key, not dispatching again");
                }
                fresh
            })
            .collect();

        let unit_timeout = self.unit_timeout;
        let settled: Vec<(TaskKey, TaskResult)> = stream::iter(units)
            .map(|(key, unit)| async move {
                let started = Instant::now();
                let result = run_unit(unit, unit_timeout, deadline).await;
                match &result {
                    Ok(_) => tracing::debug!(
                        %key,
                        elapsed = ?started.elapsed(),
                        "Unit succeeded"
                    ),
                    Err(err) => tracing::warn!(
                        %key,
                        elapsed = ?started.elapsed(),
                        error = %err,
                        "Unit failed"
                    ),
                }
                let result = match result {
                    Ok(payload) => TaskResult::success(payload),
                    Err(err) => TaskResult::failure(err),
                };
                (key, result)
            })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        settled.into_iter().collect()
    }
}

impl Default for FanOutExecutor {
    fn default() -> Self {
        Self::new(8, Duration::from_secs(120))
    }
}

async fn run_unit<F, Fut>(
    unit: F,
    unit_timeout: Duration,
    deadline: Option<Instant>,
) -> Result<Payload, ProcessingError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Payload, ProcessingError>>,
{
    let (limit, deadline_bound) = match deadline {
        Some(deadline) => {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ProcessingError::DeadlineExceeded);
            }
            if remaining < unit_timeout {
                (remaining, true)
            } else {
                (unit_timeout, false)
            }
        }
        None => (unit_timeout, false),
    };

    let guarded = AssertUnwindSafe(async move { unit().await }).catch_unwind();
    match tokio::time::timeout(limit, guarded).await {
        Ok(Ok(result)) => result,
        Ok(Err(panic)) => Err(ProcessingError::Panicked(panic_message(panic.as_ref()))),
        Err(_) if deadline_bound => Err(ProcessingError::DeadlineExceeded),
        Err(_) => Err(ProcessingError::Timeout(limit)),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
