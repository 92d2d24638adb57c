//! Structured logging initialisation for the binary.
//!
//! Events go to stderr so stdout carries only build results. `RUST_LOG`
//! overrides the default filter.

use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "imagewright=info,warn";
/// Filter used when `RUST_LOG` is unset and verbose output was requested.
const VERBOSE_FILTER: &str = "imagewright=debug,info";

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    /// A global subscriber is already installed.
    #[error("failed to initialise logging: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Picks the filter directive for the requested verbosity.
#[must_use]
pub const fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        VERBOSE_FILTER
    } else {
        DEFAULT_FILTER
    }
}

/// Installs a compact `fmt` subscriber writing to stderr.
///
/// # Errors
///
/// Returns [`LoggingError::Init`] when a global subscriber already exists.
pub fn init_tracing(verbose: bool) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbose)
                .with_thread_ids(false)
                .with_line_number(false)
                .with_file(false)
                .compact(),
        )
        .try_init()?;
    Ok(())
}
