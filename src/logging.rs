//! Structured logging setup.
//!
//! The library only emits `tracing` events; the binary installs a subscriber
//! here. Level selection:
//!
//! - `RUST_LOG` wins when set (e.g. `RUST_LOG=ft_regress=debug`)
//! - otherwise the `-v` count: 0 = warn, 1 = info, 2 = debug, 3+ = trace
//!
//! Output format from `FTR_LOG_FORMAT`: `pretty`, `compact` (default) or `json`.
//! Events go to stderr so stdout stays clean for reports.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::error::AppError;

pub const LOG_FORMAT_ENV: &str = "FTR_LOG_FORMAT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

impl LogFormat {
    /// Unknown names fall back to `Compact`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            _ => LogFormat::Compact,
        }
    }

    pub fn from_env() -> Self {
        std::env::var(LOG_FORMAT_ENV)
            .map(|s| Self::parse(&s))
            .unwrap_or(LogFormat::Compact)
    }
}

/// Filter directive for a `-v` count.
pub fn level_directive(verbosity: u8) -> String {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    format!("warn,ft_regress={level}")
}

/// Install the global subscriber. A second call is a no-op.
pub fn init(verbosity: u8) -> Result<(), AppError> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(directive) if !directive.trim().is_empty() => EnvFilter::try_new(&directive)
            .map_err(|e| AppError::input(format!("Invalid RUST_LOG '{directive}': {e}")))?,
        _ => EnvFilter::new(level_directive(verbosity)),
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = match LogFormat::from_env() {
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_target(false).with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };
    // Already installed (tests, repeated calls).
    let _ = result;
    Ok(())
}
