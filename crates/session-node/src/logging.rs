//! Tracing subscriber setup for binaries and tests embedding the engine.

use session_types::{Result, SessionError};
use tracing_subscriber::EnvFilter;

/// Installs a global `fmt` subscriber.
///
/// The filter comes from `RUST_LOG` when set, otherwise from
/// `default_filter` (for example `"info"` or `"session_node=debug"`).
///
/// # Errors
///
/// [`SessionError::ConfigError`] if `default_filter` does not parse or
/// a global subscriber is already installed.
pub fn init_tracing(default_filter: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter).map_err(|e| SessionError::ConfigError {
            reason: format!("invalid log filter '{default_filter}': {e}"),
        })?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| SessionError::ConfigError {
            reason: format!("tracing subscriber already installed: {e}"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_rejected() {
        // Another test in this binary may have won the race; either way
        // at most one call succeeds.
        let first = init_tracing("warn");
        let second = init_tracing("warn");
        assert!(matches!(second, Err(SessionError::ConfigError { .. })));
        let _ = first;
    }
}
