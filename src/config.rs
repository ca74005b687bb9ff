//! Client configuration
//!
//! [`FetchConfig`] is built explicitly and handed to the
//! [`Client`](crate::client::Client). Environment variables are read only by
//! [`FetchConfig::from_env`]:
//!
//! | Variable | Default |
//! |---|---|
//! | `TRUENO_FETCH_HTTP_REQUEST_TIMEOUT_SECONDS` | 60 |
//! | `TRUENO_FETCH_MAX_WORKERS` | 10 |
//! | `TRUENO_FETCH_RETRY_SOFT_TIMEOUT_SECONDS` | 1800 |
//! | `TRUENO_FETCH_RETRY_HARD_TIMEOUT_SECONDS` | 3600 |
//! | `TRUENO_FETCH_MAX_REQUEST_SIZE` | 16777216 |
//! | `TRUENO_FETCH_VALUES_BATCH_SIZE` | 10000 |
//! | `TRUENO_FETCH_QUERY_METADATA` | unset |

use std::str::FromStr;
use std::time::Duration;

use crate::orchestrator::RetryPolicy;
use crate::{Error, Result};

/// Per-attempt request timeout variable.
pub const ENV_REQUEST_TIMEOUT: &str = "TRUENO_FETCH_HTTP_REQUEST_TIMEOUT_SECONDS";
/// Worker pool size variable.
pub const ENV_MAX_WORKERS: &str = "TRUENO_FETCH_MAX_WORKERS";
/// Soft retry budget variable.
pub const ENV_RETRY_SOFT_TIMEOUT: &str = "TRUENO_FETCH_RETRY_SOFT_TIMEOUT_SECONDS";
/// Hard retry budget variable.
pub const ENV_RETRY_HARD_TIMEOUT: &str = "TRUENO_FETCH_RETRY_HARD_TIMEOUT_SECONDS";
/// Request size limit variable.
pub const ENV_MAX_REQUEST_SIZE: &str = "TRUENO_FETCH_MAX_REQUEST_SIZE";
/// Values-per-request limit variable.
pub const ENV_VALUES_BATCH_SIZE: &str = "TRUENO_FETCH_VALUES_BATCH_SIZE";
/// Caller-provided query metadata variable.
pub const ENV_QUERY_METADATA: &str = "TRUENO_FETCH_QUERY_METADATA";

/// Client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchConfig {
    /// Timeout of a single request attempt
    /// Default: 60 seconds
    pub request_timeout: Duration,

    /// Concurrent fetch tasks per query
    /// Default: 10
    pub max_workers: usize,

    /// Soft retry budget
    /// Default: 1800 seconds
    pub retry_soft_timeout: Duration,

    /// Hard retry budget
    /// Default: 3600 seconds
    pub retry_hard_timeout: Duration,

    /// Upper bound of a request's entity ids plus attribute paths, in bytes
    /// Default: 16 MiB
    pub max_request_size: usize,

    /// Upper bound of entities × attributes in one fetch task
    /// Default: 10000
    pub values_batch_size: usize,

    /// Attach query metadata to every request
    /// Default: true
    pub send_query_metadata: bool,

    /// Caller data carried in query metadata
    /// Default: None
    pub query_user_data: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(60),
            max_workers: 10,
            retry_soft_timeout: Duration::from_secs(1800),
            retry_hard_timeout: Duration::from_secs(3600),
            max_request_size: 16 * 1024 * 1024,
            values_batch_size: 10_000,
            send_query_metadata: true,
            query_user_data: None,
        }
    }
}

impl FetchConfig {
    /// Start a builder from the defaults.
    #[must_use]
    pub fn builder() -> FetchConfigBuilder {
        FetchConfigBuilder::default()
    }

    /// Defaults overridden by `TRUENO_FETCH_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a variable that does not parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by values from `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a value that does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(secs) = parse_var::<u64>(&lookup, ENV_REQUEST_TIMEOUT)? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(workers) = parse_var::<usize>(&lookup, ENV_MAX_WORKERS)? {
            config.max_workers = workers;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, ENV_RETRY_SOFT_TIMEOUT)? {
            config.retry_soft_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, ENV_RETRY_HARD_TIMEOUT)? {
            config.retry_hard_timeout = Duration::from_secs(secs);
        }
        if let Some(size) = parse_var::<usize>(&lookup, ENV_MAX_REQUEST_SIZE)? {
            config.max_request_size = size;
        }
        if let Some(size) = parse_var::<usize>(&lookup, ENV_VALUES_BATCH_SIZE)? {
            config.values_batch_size = size;
        }
        config.query_user_data = lookup(ENV_QUERY_METADATA);
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for zero workers, a zero values batch size
    /// or a zero request timeout.
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(Error::InvalidArgument("max_workers must be at least 1".to_string()));
        }
        if self.values_batch_size == 0 {
            return Err(Error::InvalidArgument(
                "values_batch_size must be at least 1".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(Error::InvalidArgument(
                "request_timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Retry policy derived from the timeouts.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .attempt_timeout(self.request_timeout)
            .soft_timeout(self.retry_soft_timeout)
            .hard_timeout(self.retry_hard_timeout)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|_| Error::InvalidArgument(format!("{key} must be a non-negative integer, got '{raw}'")))
}

/// Builder for [`FetchConfig`]
#[derive(Debug, Clone, Default)]
pub struct FetchConfigBuilder {
    config: FetchConfig,
}

impl FetchConfigBuilder {
    /// Set the per-attempt request timeout
    #[must_use]
    pub const fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the worker pool size
    #[must_use]
    pub const fn max_workers(mut self, workers: usize) -> Self {
        self.config.max_workers = workers;
        self
    }

    /// Set the soft retry budget
    #[must_use]
    pub const fn retry_soft_timeout(mut self, timeout: Duration) -> Self {
        self.config.retry_soft_timeout = timeout;
        self
    }

    /// Set the hard retry budget
    #[must_use]
    pub const fn retry_hard_timeout(mut self, timeout: Duration) -> Self {
        self.config.retry_hard_timeout = timeout;
        self
    }

    /// Set the request size limit
    #[must_use]
    pub const fn max_request_size(mut self, size: usize) -> Self {
        self.config.max_request_size = size;
        self
    }

    /// Set the values-per-task limit
    #[must_use]
    pub const fn values_batch_size(mut self, size: usize) -> Self {
        self.config.values_batch_size = size;
        self
    }

    /// Enable or disable query metadata
    #[must_use]
    pub const fn send_query_metadata(mut self, enabled: bool) -> Self {
        self.config.send_query_metadata = enabled;
        self
    }

    /// Set caller data carried in query metadata
    #[must_use]
    pub fn query_user_data(mut self, user_data: impl Into<String>) -> Self {
        self.config.query_user_data = Some(user_data.into());
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    ///
    /// See [`FetchConfig::validate`].
    pub fn build(self) -> Result<FetchConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
