//! Throttled retry warnings
//!
//! Rate-limit and server-error retries can happen hundreds of times during a
//! large query. Each kind is reported at most once per interval; repeats are
//! logged at debug level.

use std::fmt;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, warn};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Kind of throttled warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningKind {
    /// HTTP 429
    TooManyRequests,
    /// HTTP 5xx
    ServerError,
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooManyRequests => f.write_str("http_429"),
            Self::ServerError => f.write_str("http_5xx"),
        }
    }
}

/// Per-client warning throttle.
#[derive(Debug)]
pub struct WarningThrottle {
    interval: Duration,
    last_emitted: DashMap<WarningKind, Instant>,
}

impl WarningThrottle {
    /// Throttle emitting each kind at most once per minute.
    #[must_use]
    pub fn new() -> Self {
        Self::with_interval(DEFAULT_INTERVAL)
    }

    /// Throttle with a custom interval.
    #[must_use]
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            last_emitted: DashMap::new(),
        }
    }

    /// Whether a warning of `kind` may be emitted now; records the emission.
    pub fn should_emit(&self, kind: WarningKind) -> bool {
        let now = Instant::now();
        match self.last_emitted.entry(kind) {
            Entry::Occupied(mut last) => {
                if now.duration_since(*last.get()) >= self.interval {
                    last.insert(now);
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        }
    }

    /// Log a retry warning, throttled per kind.
    pub fn warn(&self, kind: WarningKind, detail: &str) {
        if self.should_emit(kind) {
            warn!(kind = %kind, "{detail}; retrying (further warnings of this kind suppressed for {}s)", self.interval.as_secs());
        } else {
            debug!(kind = %kind, "{detail}; retrying");
        }
    }
}

impl Default for WarningThrottle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_once_per_interval_per_kind() {
        let throttle = WarningThrottle::new();
        assert!(throttle.should_emit(WarningKind::TooManyRequests));
        assert!(!throttle.should_emit(WarningKind::TooManyRequests));
        assert!(throttle.should_emit(WarningKind::ServerError));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!throttle.should_emit(WarningKind::TooManyRequests));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(throttle.should_emit(WarningKind::TooManyRequests));
    }
}
