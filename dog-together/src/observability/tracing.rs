//! Opt-in subscriber setup for binaries and test harnesses.
//!
//! The library itself only emits `tracing` events; installing a subscriber
//! is left to the application unless the `tracing-basic` feature is on.

use tracing_subscriber::{fmt, EnvFilter};

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_DIRECTIVE: &str = "dog_together=info";

/// Install a global fmt subscriber honoring `RUST_LOG`.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing() -> bool {
    init_tracing_with(DEFAULT_DIRECTIVE, false)
}

/// Install a global subscriber with a fallback directive, optionally as JSON lines
pub fn init_tracing_with(default_directive: &str, json: bool) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    if json {
        fmt().with_env_filter(filter).json().try_init().is_ok()
    } else {
        fmt().with_env_filter(filter).try_init().is_ok()
    }
}
