//! Logging setup for the Universe knowledge-base QA system.
//!
//! Library crates only emit `tracing` events; binaries call [`init`] or
//! [`init_json`] once at startup. Verbosity follows `RUST_LOG` and
//! defaults to `info`.
//!
//! ```rust,no_run
//! universe_telemetry::init("universe-qa").ok();
//! tracing::info!("ready");
//! ```

pub mod capture;

use std::fmt;

use tracing_subscriber::{EnvFilter, fmt as fmt_layer, prelude::*};

pub use capture::{CaptureLayer, CapturedEvent, CapturedEvents, capture_thread};
pub use tracing::{Level, debug, error, info, instrument, trace, warn};

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// A global subscriber was already installed.
#[derive(Debug)]
pub struct AlreadyInitialized;

impl fmt::Display for AlreadyInitialized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a global tracing subscriber is already installed")
    }
}

impl std::error::Error for AlreadyInitialized {}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a human-readable subscriber.
///
/// Calling it again (or after another subscriber was installed) returns
/// [`AlreadyInitialized`] and keeps the existing one.
pub fn init(service_name: &str) -> Result<(), AlreadyInitialized> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt_layer::layer().with_target(true))
        .try_init()
        .map_err(|_| AlreadyInitialized)?;
    tracing::info!(service = service_name, "telemetry initialized");
    Ok(())
}

/// Install a subscriber that writes one JSON object per event.
pub fn init_json(service_name: &str) -> Result<(), AlreadyInitialized> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt_layer::layer().json().with_current_span(true))
        .try_init()
        .map_err(|_| AlreadyInitialized)?;
    tracing::info!(service = service_name, format = "json", "telemetry initialized");
    Ok(())
}

/// Install a human-readable subscriber that also records every event into `storage`.
pub fn init_with_capture(
    service_name: &str,
    storage: CapturedEvents,
) -> Result<(), AlreadyInitialized> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt_layer::layer().with_target(true))
        .with(CaptureLayer::new(storage))
        .try_init()
        .map_err(|_| AlreadyInitialized)?;
    tracing::info!(service = service_name, "telemetry initialized with capture");
    Ok(())
}
