//! Fetch orchestration
//!
//! Executes independent fetch tasks on a bounded worker pool
//! (`Semaphore` + `JoinSet`). Each task pages through its request until the
//! service stops returning a cursor; each page request runs under the
//! [`RetryPolicy`].
//!
//! ## Guarantees
//!
//! - Results come back per task, in submission order, whatever the
//!   completion order.
//! - Fail-fast: the first failing task cancels every queued and in-flight
//!   task of the same run and its error is returned. No partial results.
//!
//! ```text
//! run(requests) ─┬─ task 0 ── page ── page ── done ─┐
//!                ├─ task 1 ── page ── done ─────────┼─► Vec<Vec<T>> (by index)
//!                └─ task 2 ── (waits for a permit) ─┘
//! ```

pub mod retry;
pub mod warnings;

pub use retry::{FailureClass, RequestState, RequestTracker, RetryPolicy};
pub use warnings::{WarningKind, WarningThrottle};

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::service::{Cursor, Page, ServiceResult};
use crate::{Error, Result};

/// Bounded, retrying, paginating task runner.
#[derive(Debug, Clone)]
pub struct FetchOrchestrator {
    policy: RetryPolicy,
    max_workers: usize,
    warnings: Arc<WarningThrottle>,
}

impl FetchOrchestrator {
    /// Create an orchestrator with `max_workers` concurrent tasks (at least 1).
    #[must_use]
    pub fn new(policy: RetryPolicy, max_workers: usize) -> Self {
        Self {
            policy,
            max_workers: max_workers.max(1),
            warnings: Arc::new(WarningThrottle::new()),
        }
    }

    /// Share a warning throttle (one per client).
    #[must_use]
    pub fn with_warnings(mut self, warnings: Arc<WarningThrottle>) -> Self {
        self.warnings = warnings;
        self
    }

    /// Retry policy.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Worker pool size.
    #[must_use]
    pub const fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Run every request to completion.
    ///
    /// `fetch` issues one page request for a request and an optional cursor.
    ///
    /// # Errors
    ///
    /// Returns the first task error; every other task is cancelled.
    pub async fn run<R, T, F, Fut>(&self, requests: Vec<R>, fetch: F) -> Result<Vec<Vec<T>>>
    where
        R: Send + Sync + 'static,
        T: Send + 'static,
        F: Fn(Arc<R>, Option<Cursor>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult<Page<T>>> + Send + 'static,
    {
        let total = requests.len();
        if total == 0 {
            return Ok(Vec::new());
        }
        debug!(tasks = total, workers = self.max_workers, "starting fetch run");

        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        let cancelled = Arc::new(AtomicBool::new(false));
        let fetch = Arc::new(fetch);
        let policy = Arc::new(self.policy.clone());

        let mut tasks = JoinSet::new();
        for (index, request) in requests.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let cancelled = Arc::clone(&cancelled);
            let fetch = Arc::clone(&fetch);
            let policy = Arc::clone(&policy);
            let warnings = Arc::clone(&self.warnings);
            let request = Arc::new(request);

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (index, Err(Error::Cancelled));
                };
                if cancelled.load(Ordering::Acquire) {
                    return (index, Err(Error::Cancelled));
                }
                let outcome = run_task(&request, &*fetch, &policy, &warnings, &cancelled).await;
                (index, outcome)
            });
        }

        let mut results: Vec<Option<Vec<T>>> = std::iter::repeat_with(|| None).take(total).collect();
        let mut first_error: Option<Error> = None;

        while let Some(joined) = tasks.join_next().await {
            let failure = match joined {
                Ok((index, Ok(items))) => {
                    results[index] = Some(items);
                    continue;
                }
                Ok((_, Err(error))) => error,
                Err(join_error) if join_error.is_cancelled() => continue,
                Err(join_error) => Error::Other(format!("fetch task panicked: {join_error}")),
            };

            if first_error.is_none() {
                warn!(error = %failure, "fetch task failed, cancelling the rest of the query");
                cancelled.store(true, Ordering::Release);
                tasks.abort_all();
                first_error = Some(failure);
            }
        }

        if let Some(error) = first_error {
            return Err(error);
        }
        results
            .into_iter()
            .map(|r| r.ok_or_else(|| Error::Other("fetch task finished without a result".to_string())))
            .collect()
    }
}

async fn run_task<R, T, F, Fut>(
    request: &Arc<R>,
    fetch: &F,
    policy: &RetryPolicy,
    warnings: &WarningThrottle,
    cancelled: &AtomicBool,
) -> Result<Vec<T>>
where
    F: Fn(Arc<R>, Option<Cursor>) -> Fut,
    Fut: Future<Output = ServiceResult<Page<T>>>,
{
    let mut items = Vec::new();
    let mut cursor: Option<Cursor> = None;
    let mut pages = 0usize;

    loop {
        if cancelled.load(Ordering::Acquire) {
            return Err(Error::Cancelled);
        }
        let page = retry::execute(policy, warnings, || fetch(Arc::clone(request), cursor.clone())).await?;
        pages += 1;
        debug!(page = pages, items = page.items.len(), "fetched page");
        items.extend(page.items);

        match page.next {
            Some(next) => cursor = Some(next),
            None => return Ok(items),
        }
    }
}
