use crate::config::{LogFormat, LoggerConfig};
use crate::error::{LoggerError, LoggerResult};
use crate::redactor::{PiiRedactor, RedactionConfig};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::{self, time::ChronoUtc};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Keeps the background file writer alive; drop it last.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Filter from the configured level. `RUST_LOG` takes precedence in
/// [`init_logging`].
pub fn build_filter(config: &LoggerConfig) -> LoggerResult<EnvFilter> {
    let directives = config.filter_directives();
    EnvFilter::try_new(&directives).map_err(|e| LoggerError::InvalidFilter {
        directives,
        reason: e.to_string(),
    })
}

/// Install the global tracing subscriber and the process-wide redactor.
pub fn init_logging(config: &LoggerConfig) -> LoggerResult<LoggingGuard> {
    let redactor = if config.redaction.enabled {
        PiiRedactor::new(RedactionConfig::from_settings(&config.redaction)?)
    } else {
        PiiRedactor::disabled()
    };
    crate::install_redactor(redactor);

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_filter(config)?,
    };

    let (pretty, json) = match config.format {
        LogFormat::Pretty => (
            Some(
                fmt::layer()
                    .with_target(true)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_level(true),
            ),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                fmt::layer()
                    .with_target(false)
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(false)
                    .json(),
            ),
        ),
    };

    let (file_layer, file_guard) = match &config.file {
        Some(file) => {
            let appender = tracing_appender::rolling::daily(&file.directory, &file.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_timer(ChronoUtc::rfc_3339())
                .with_ansi(false)
                .json();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(pretty)
        .with(json)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggerError::Init(e.to_string()))?;

    Ok(LoggingGuard { _file: file_guard })
}
