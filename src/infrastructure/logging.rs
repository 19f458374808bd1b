//! Tracing subscriber setup

use crate::config::LoggingConfig;
use crate::domain::shared::{GatewayError, Result};
use std::path::Path;
use tracing::debug;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
/// With `log_enabled`, output is also appended to `config.file` from a
/// background writer; the returned guard flushes it when dropped.
///
/// A second call leaves the first subscriber in place.
pub fn init(config: &LoggingConfig, log_enabled: bool) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| GatewayError::Config(format!("invalid log level {}: {}", config.level, e)))?;

    let (file_layer, guard) = if log_enabled {
        let (writer, guard) = tracing_appender::non_blocking(file_appender(&config.file)?);
        (
            Some(fmt::layer().with_ansi(false).with_writer(writer)),
            Some(guard),
        )
    } else {
        (None, None)
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init();

    if installed.is_err() {
        debug!("Tracing subscriber already installed");
        return Ok(None);
    }
    Ok(guard)
}

fn file_appender(file: &str) -> Result<RollingFileAppender> {
    let path = Path::new(file);
    let name = path
        .file_name()
        .ok_or_else(|| GatewayError::Config(format!("log file {} has no file name", file)))?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name.to_string_lossy())
        .build(dir)
        .map_err(|e| GatewayError::Config(format!("cannot open log file {}: {}", file, e)))
}
