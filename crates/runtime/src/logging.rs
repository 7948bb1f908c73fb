// SPDX-License-Identifier: MIT

//! Structured logging setup (§4.3): `tracing-subscriber` with either a
//! JSON or compact text layer, level sourced from `log_level`.

use crate::config::LogFormat;
use thiserror::Error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log level {0:?}")]
    InvalidLevel(String),
}

/// Initializes the global tracing subscriber. The returned guard must be
/// held for the lifetime of the process — dropping it flushes the
/// non-blocking writer's buffered lines before exit.
pub fn init(
    log_level: &str,
    format: LogFormat,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LoggingError> {
    let directive = log_level.to_ascii_lowercase();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&directive))
        .map_err(|_| LoggingError::InvalidLevel(log_level.to_string()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stdout());

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(non_blocking))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(non_blocking))
                .init();
        }
    }

    Ok(guard)
}
