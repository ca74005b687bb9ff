//! Logging setup
//!
//! The library only emits `tracing` events. Applications that do not
//! install their own subscriber can call [`init_from_env`].

use tracing_subscriber::EnvFilter;

use crate::{Error, Result};

/// Environment variable holding the log filter directives.
pub const LOG_ENV: &str = "TRUENO_FETCH_LOG";

const DEFAULT_DIRECTIVES: &str = "trueno_fetch=info";

/// Filter built from `TRUENO_FETCH_LOG`, or `trueno_fetch=info` when unset.
///
/// Invalid directives are skipped.
#[must_use]
pub fn env_filter() -> EnvFilter {
    let directives = std::env::var(LOG_ENV).unwrap_or_else(|_| DEFAULT_DIRECTIVES.to_owned());
    EnvFilter::builder().parse_lossy(directives)
}

/// Install a global `fmt` subscriber filtered by `TRUENO_FETCH_LOG`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_from_env() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(true)
        .try_init()
        .map_err(|e| Error::Other(format!("failed to install log subscriber: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        // the first call may race another test; the second always finds a subscriber
        let _ = init_from_env();
        assert!(init_from_env().is_err());
    }
}
