// Tracing setup for the CLI and embedding services
//
// RUST_LOG takes precedence over the configured level. An optional log file
// receives JSON lines through a non-blocking, daily-rotated appender.

use crate::config::LoggingConfig;
use crate::{InsightError, InsightResult};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Install the global subscriber.
///
/// Returns the file writer guard when a log file is configured; keep it alive
/// for the lifetime of the process. Calling this again after a subscriber is
/// installed is a no-op.
pub fn init_logging(config: &LoggingConfig) -> InsightResult<Option<WorkerGuard>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            InsightError::Config(format!("invalid log level '{}': {}", config.level, e))
        })?,
    };

    let console_layer = if config.json {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path.file_name().ok_or_else(|| {
                InsightError::Config(format!("log file '{}' has no file name", path.display()))
            })?;

            std::fs::create_dir_all(directory)?;
            let appender = tracing_appender::rolling::daily(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            let layer = fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(level = %config.level, json = config.json, "Tracing initialized");
        Ok(guard)
    } else {
        Ok(None)
    }
}
