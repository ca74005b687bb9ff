//! Retry policy and per-request state machine
//!
//! Every request runs under two budgets:
//!
//! - **soft**: time spent in attempts plus self-computed backoff;
//! - **hard**: wall-clock time since the first attempt, including
//!   server-mandated waits.
//!
//! Server waits (`Retry-After`) are always honored and count only toward the
//! hard budget. A wait that would cross the hard limit is not slept; the
//! request fails with [`RetryBudget::Hard`] right away.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::warnings::{WarningKind, WarningThrottle};
use crate::error::RetryBudget;
use crate::service::ServiceError;
use crate::{Error, Result};

/// Retry and timeout policy for fetch requests.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Backoff before the first retry
    /// Default: 500ms
    pub initial_backoff: Duration,

    /// Upper bound of a single backoff
    /// Default: 30 seconds
    pub max_backoff: Duration,

    /// Multiplier for exponential backoff
    /// Default: 2.0
    pub multiplier: f64,

    /// Add up to 25% random jitter to backoffs
    /// Default: true
    pub jitter: bool,

    /// Soft budget
    /// Default: 1800 seconds
    pub soft_timeout: Duration,

    /// Hard budget
    /// Default: 3600 seconds
    pub hard_timeout: Duration,

    /// Timeout of a single attempt
    /// Default: 60 seconds
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
            soft_timeout: Duration::from_secs(1800),
            hard_timeout: Duration::from_secs(3600),
            attempt_timeout: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Set the soft budget
    #[must_use]
    pub const fn soft_timeout(mut self, timeout: Duration) -> Self {
        self.soft_timeout = timeout;
        self
    }

    /// Set the hard budget
    #[must_use]
    pub const fn hard_timeout(mut self, timeout: Duration) -> Self {
        self.hard_timeout = timeout;
        self
    }

    /// Set the per-attempt timeout
    #[must_use]
    pub const fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Set the backoff curve
    #[must_use]
    pub const fn backoff(mut self, initial: Duration, max: Duration, multiplier: f64) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self.multiplier = multiplier;
        self
    }

    /// Enable or disable jitter
    #[must_use]
    pub const fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Backoff after the given failed attempt (0-indexed).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = base.min(self.max_backoff.as_secs_f64());

        let delay = if self.jitter {
            // up to 25% jitter
            capped * (1.0 + rand::random::<f64>() * 0.25)
        } else {
            capped
        };
        Duration::from_secs_f64(delay.max(0.0))
    }
}

/// Why a request ended in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Retryable failures until a budget ran out
    RetryableExhausted,
    /// Failure that is never retried
    NonRetryable,
}

/// State of one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Not started
    Idle,
    /// Attempt in progress
    InFlight {
        /// Attempt number, starting at 1
        attempt: u32,
    },
    /// Waiting before the next attempt
    RetryScheduled {
        /// Attempts made so far
        attempt: u32,
        /// Wait before the next attempt
        delay: Duration,
    },
    /// Terminal success
    Succeeded {
        /// Attempts made
        attempts: u32,
    },
    /// Terminal failure
    Failed(FailureClass),
}

/// Tracks state and soft-elapsed time of one request.
#[derive(Debug, Clone)]
pub struct RequestTracker {
    state: RequestState,
    attempts: u32,
    soft_elapsed: Duration,
}

impl RequestTracker {
    /// Fresh tracker in `Idle`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: RequestState::Idle,
            attempts: 0,
            soft_elapsed: Duration::ZERO,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> RequestState {
        self.state
    }

    /// Attempts made so far.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Soft-elapsed time so far.
    #[must_use]
    pub const fn soft_elapsed(&self) -> Duration {
        self.soft_elapsed
    }

    /// `Idle | RetryScheduled -> InFlight`; returns the attempt number.
    pub fn begin_attempt(&mut self) -> u32 {
        debug_assert!(matches!(
            self.state,
            RequestState::Idle | RequestState::RetryScheduled { .. }
        ));
        self.attempts += 1;
        self.state = RequestState::InFlight {
            attempt: self.attempts,
        };
        self.attempts
    }

    /// Count attempt time or own backoff toward the soft budget.
    pub fn add_soft(&mut self, elapsed: Duration) {
        self.soft_elapsed += elapsed;
    }

    /// `InFlight -> RetryScheduled`.
    pub fn schedule_retry(&mut self, delay: Duration) {
        self.state = RequestState::RetryScheduled {
            attempt: self.attempts,
            delay,
        };
    }

    /// `InFlight -> Succeeded`.
    pub fn succeed(&mut self) {
        self.state = RequestState::Succeeded {
            attempts: self.attempts,
        };
    }

    /// `* -> Failed`.
    pub fn fail(&mut self, class: FailureClass) {
        self.state = RequestState::Failed(class);
    }
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::new()
    }
}

enum Disposition {
    Retry {
        reason: String,
        server_wait: Option<Duration>,
        warning: Option<WarningKind>,
    },
    Fatal(Error),
}

fn classify(error: ServiceError) -> Disposition {
    match error {
        ServiceError::Network(message) => Disposition::Retry {
            reason: format!("network error: {message}"),
            server_wait: None,
            warning: None,
        },
        ServiceError::Status {
            code: 429,
            message,
            retry_after,
        } => Disposition::Retry {
            reason: format!("HTTP 429: {message}"),
            server_wait: retry_after,
            warning: Some(WarningKind::TooManyRequests),
        },
        ServiceError::Status {
            code,
            message,
            retry_after,
        } if code >= 500 => Disposition::Retry {
            reason: format!("HTTP {code}: {message}"),
            server_wait: retry_after,
            warning: Some(WarningKind::ServerError),
        },
        ServiceError::Status { code, message, .. } => {
            Disposition::Fatal(Error::NonRetryableRequest {
                status: code,
                message,
            })
        }
        ServiceError::UnexpectedResponse(message) => {
            Disposition::Fatal(Error::UnexpectedResponse(message))
        }
    }
}

fn exhausted(tracker: &mut RequestTracker, budget: RetryBudget, reason: String) -> Error {
    tracker.fail(FailureClass::RetryableExhausted);
    debug!(%budget, attempts = tracker.attempts(), "retry budget exhausted");
    Error::RetryBudgetExceeded {
        budget,
        attempts: tracker.attempts(),
        last_error: reason,
    }
}

/// Run one logical request under `policy`.
///
/// `attempt` is called once per attempt. Each attempt is bounded by
/// `policy.attempt_timeout`; a timeout counts as a retryable failure.
///
/// # Errors
///
/// - `NonRetryableRequest` for 4xx other than 429
/// - `UnexpectedResponse` when the service rejects the request
/// - `RetryBudgetExceeded` when the soft or hard budget runs out
pub async fn execute<T, F, Fut>(
    policy: &RetryPolicy,
    warnings: &WarningThrottle,
    mut attempt: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, ServiceError>>,
{
    let started = Instant::now();
    let mut tracker = RequestTracker::new();

    loop {
        let attempt_no = tracker.begin_attempt();
        let attempt_started = Instant::now();
        let outcome = tokio::time::timeout(policy.attempt_timeout, attempt()).await;
        tracker.add_soft(attempt_started.elapsed());

        let disposition = match outcome {
            Ok(Ok(value)) => {
                tracker.succeed();
                return Ok(value);
            }
            Ok(Err(error)) => classify(error),
            Err(_) => Disposition::Retry {
                reason: format!(
                    "attempt timed out after {}s",
                    policy.attempt_timeout.as_secs_f64()
                ),
                server_wait: None,
                warning: None,
            },
        };

        let (reason, server_wait, warning) = match disposition {
            Disposition::Fatal(error) => {
                tracker.fail(FailureClass::NonRetryable);
                return Err(error);
            }
            Disposition::Retry {
                reason,
                server_wait,
                warning,
            } => (reason, server_wait, warning),
        };

        match warning {
            Some(kind) => warnings.warn(kind, &reason),
            None => debug!(attempt = attempt_no, "{reason}; retrying"),
        }

        let hard_elapsed = started.elapsed();
        if tracker.soft_elapsed() >= policy.soft_timeout {
            return Err(exhausted(&mut tracker, RetryBudget::Soft, reason));
        }
        if hard_elapsed >= policy.hard_timeout {
            return Err(exhausted(&mut tracker, RetryBudget::Hard, reason));
        }

        if let Some(wait) = server_wait {
            if hard_elapsed + wait > policy.hard_timeout {
                return Err(exhausted(&mut tracker, RetryBudget::Hard, reason));
            }
            tracker.schedule_retry(wait);
            tokio::time::sleep(wait).await;
        } else {
            let backoff = policy.delay_for_attempt(attempt_no - 1);
            if tracker.soft_elapsed() + backoff > policy.soft_timeout {
                return Err(exhausted(&mut tracker, RetryBudget::Soft, reason));
            }
            if hard_elapsed + backoff > policy.hard_timeout {
                return Err(exhausted(&mut tracker, RetryBudget::Hard, reason));
            }
            tracker.schedule_retry(backoff);
            tokio::time::sleep(backoff).await;
            tracker.add_soft(backoff);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn no_jitter() -> RetryPolicy {
        RetryPolicy::default().jitter(false)
    }

    #[test]
    fn test_exponential_backoff_capped() {
        let policy = no_jitter().backoff(Duration::from_secs(1), Duration::from_secs(5), 2.0);
        assert_eq!(policy.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_bounded() {
        let policy = RetryPolicy::default().backoff(Duration::from_secs(4), Duration::from_secs(4), 2.0);
        for _ in 0..100 {
            let d = policy.delay_for_attempt(0);
            assert!(d >= Duration::from_secs(4));
            assert!(d <= Duration::from_secs(5));
        }
    }

    #[test]
    fn test_tracker_transitions() {
        let mut t = RequestTracker::new();
        assert_eq!(t.state(), RequestState::Idle);
        assert_eq!(t.begin_attempt(), 1);
        t.schedule_retry(Duration::from_secs(1));
        assert!(matches!(t.state(), RequestState::RetryScheduled { attempt: 1, .. }));
        assert_eq!(t.begin_attempt(), 2);
        t.succeed();
        assert_eq!(t.state(), RequestState::Succeeded { attempts: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let value = execute(&no_jitter(), &WarningThrottle::new(), || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ServiceError::status(503, "unavailable"))
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_fails_immediately() {
        let calls = AtomicU32::new(0);
        let err = execute(&no_jitter(), &WarningThrottle::new(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(ServiceError::status(404, "not found")) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::NonRetryableRequest { status: 404, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unexpected_response_not_retried() {
        let err = execute(&no_jitter(), &WarningThrottle::new(), || async {
            Err::<(), _>(ServiceError::UnexpectedResponse("bad filter".to_string()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_waits_exhaust_hard_budget() {
        let start = Instant::now();
        let err = execute(&no_jitter(), &WarningThrottle::new(), || async {
            Err::<(), _>(ServiceError::too_many_requests(Duration::from_secs(1000)))
        })
        .await
        .unwrap_err();
        match err {
            Error::RetryBudgetExceeded {
                budget, attempts, ..
            } => {
                assert_eq!(budget, RetryBudget::Hard);
                assert_eq!(attempts, 4);
            }
            other => panic!("unexpected error: {other}"),
        }
        // the clipped fourth wait is never slept
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3000));
        assert!(elapsed < Duration::from_secs(3001));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_exhausts_soft_budget() {
        let policy = no_jitter()
            .backoff(Duration::from_secs(1), Duration::from_secs(60), 2.0)
            .soft_timeout(Duration::from_secs(10));
        let err = execute(&policy, &WarningThrottle::new(), || async {
            Err::<(), _>(ServiceError::Network("connection reset".to_string()))
        })
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            Error::RetryBudgetExceeded {
                budget: RetryBudget::Soft,
                attempts: 4,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeout_counts_toward_soft() {
        let policy = no_jitter()
            .backoff(Duration::from_secs(1), Duration::from_secs(1), 2.0)
            .attempt_timeout(Duration::from_secs(60))
            .soft_timeout(Duration::from_secs(100));
        let err = execute(&policy, &WarningThrottle::new(), || async {
            tokio::time::sleep(Duration::from_secs(120)).await;
            Ok::<_, ServiceError>(())
        })
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            Error::RetryBudgetExceeded {
                budget: RetryBudget::Soft,
                attempts: 2,
                ..
            }
        ));
    }
}
