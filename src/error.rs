//! Error types for Trueno-Fetch
//!
//! Clear error messages with actionable guidance. Local errors (filter
//! construction, argument validation, type inference) are raised before any
//! request leaves the process; remote errors surface as the first failure of
//! a query.

use std::fmt;

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Which retry budget a request ran out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryBudget {
    /// Time spent on attempts plus self-computed backoff.
    Soft,
    /// Wall-clock time since the first attempt, including server-mandated waits.
    Hard,
}

impl fmt::Display for RetryBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Soft => f.write_str("soft"),
            Self::Hard => f.write_str("hard"),
        }
    }
}

/// Trueno-Fetch error types
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed predicate construction (never sent to the service)
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// An attribute reference without a declared type matched several types
    #[error(
        "Cannot infer the type of attribute '{path}': observed types {types:?}\n\
         Declare the type explicitly on the attribute reference"
    )]
    AttributeTypeInference {
        /// Attribute path
        path: String,
        /// Every type observed for the path
        types: Vec<String>,
    },

    /// Several resolved types map to the same output column
    #[error(
        "Conflicting attribute types for '{path}': {types:?}\n\
         Enable type suffixes in column names to get one column per type"
    )]
    ConflictingAttributeTypes {
        /// Attribute path shared by the conflicting columns
        path: String,
        /// Conflicting types
        types: Vec<String>,
    },

    /// A retryable request ran out of time
    #[error("Retry budget exceeded ({budget}) after {attempts} attempt(s): {last_error}")]
    RetryBudgetExceeded {
        /// The budget that ran out
        budget: RetryBudget,
        /// Number of attempts made
        attempts: u32,
        /// Last retryable failure observed
        last_error: String,
    },

    /// The service rejected the request with a 4xx other than 429
    #[error("Request rejected with HTTP {status}: {message}")]
    NonRetryableRequest {
        /// HTTP status code
        status: u16,
        /// Service-provided message
        message: String,
    },

    /// The service rejected a well-formed-looking request
    #[error("Unexpected response from the metadata service: {0}")]
    UnexpectedResponse(String),

    /// The caller combined results or queries that do not belong together
    #[error("Invalid usage: {0}")]
    UserMisuse(String),

    /// Invalid argument value
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Task cancelled because another task of the same query failed
    #[error("Fetch task cancelled")]
    Cancelled,

    /// Arrow conversion error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
