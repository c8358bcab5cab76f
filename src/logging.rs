//! Logging initialization.
//!
//! The library logs through `tracing` macros; this module installs the
//! subscriber for the binary.
//!
//! - Output goes to stderr; stdout carries per-item result lines.
//! - `RUST_LOG` overrides the default level.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the global subscriber.
///
/// `verbose` lowers the default level from `info` to `debug`; `json_format`
/// switches to one JSON object per line.
pub fn init(verbose: bool, json_format: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
