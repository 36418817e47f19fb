//! Logging setup for hosts embedding the PostgreSQL resources.
//!
//! Every lifecycle call logs through `tracing`. Output goes to **stderr** so a
//! host that talks to its parent process over stdout is not disturbed.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: log filter, e.g. `info` or `azurerm_postgresql=debug`
//!
//! ```bash
//! # Show every request the ARM client makes and every poll of a long-running operation
//! RUST_LOG=azurerm_postgresql::client=debug,azurerm_postgresql::poller=debug ./provider
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn layered(default_level: &str) -> impl tracing::Subscriber + Send + Sync + 'static {
    tracing_subscriber::registry().with(filter(default_level)).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false),
    )
}

/// Install the stderr subscriber, filtered by `RUST_LOG` or `info`.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default("info");
}

/// Like [`init_logging`], with `default_level` used when `RUST_LOG` is unset.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    layered(default_level).init();
}

/// Install the subscriber unless one is already set. Returns whether it was installed.
pub fn try_init_logging() -> bool {
    layered("info").try_init().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_parsing() {
        assert!(EnvFilter::try_new("info").is_ok());
        assert!(EnvFilter::try_new("azurerm_postgresql=debug").is_ok());
        assert!(EnvFilter::try_new("warn,azurerm_postgresql::poller=trace").is_ok());
    }

    #[test]
    fn test_try_init_is_idempotent() {
        // Whichever call wins, the second one must not panic.
        let _ = try_init_logging();
        assert!(!try_init_logging());
    }
}
