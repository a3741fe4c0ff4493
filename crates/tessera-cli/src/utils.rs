//! CLI utility functions

use std::io;
use tessera_types::{Result, TesseraError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Setup logging based on verbosity level.
///
/// `RUST_LOG` overrides `default_level` unless `verbose` or `quiet` is set.
pub fn setup_logging(verbose: bool, quiet: bool, json: bool, default_level: &str) -> Result<()> {
    let filter = if quiet {
        EnvFilter::new(tracing::Level::ERROR.to_string())
    } else if verbose {
        EnvFilter::new(tracing::Level::DEBUG.to_string())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .try_init()
    };

    installed.map_err(|e| TesseraError::internal(format!("Failed to install logger: {}", e)))
}

/// Human readable byte count
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}
