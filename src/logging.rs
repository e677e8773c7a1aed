//! Logging setup.
//!
//! The library itself only emits `tracing` events. Applications embedding it
//! may call [`init_logging`] to install a formatted subscriber.

use tracing_subscriber::EnvFilter;

/// Install a `tracing-subscriber` fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_directive` (for example
/// `"flowsync=debug"`) is used. Returns `false` when a global subscriber was
/// already installed, in which case nothing changes.
///
/// # Examples
///
/// ```rust
/// let first = flowsync::logging::init_logging("flowsync=info");
/// let second = flowsync::logging::init_logging("flowsync=debug");
/// assert!(!(first && second));
/// ```
pub fn init_logging(default_directive: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
