use crate::config::{LogFormat, LoggerOptions};
use crate::error::{Error, Result};
use std::fmt;
use std::fs::OpenOptions;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Keeps the background log writer alive. Buffered lines are flushed when it is dropped.
#[must_use = "dropping the guard stops the log writer"]
pub struct LoggingGuard {
    _worker: WorkerGuard,
}

impl fmt::Debug for LoggingGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggingGuard").finish_non_exhaustive()
    }
}

/// Filter built from `RUST_LOG`, falling back to [`LoggerOptions::level`].
pub fn env_filter(options: &LoggerOptions) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => {
            EnvFilter::try_new(&options.level).map_err(|err| Error::Config(err.to_string()))
        }
    }
}

/// Install the global `tracing` subscriber described by `options`.
///
/// Logs go to stdout, or are appended to [`LoggerOptions::log_file_path`], through
/// a non-blocking writer. Fails if a global subscriber is already set.
pub fn init_logging(options: &LoggerOptions) -> Result<LoggingGuard> {
    let filter = env_filter(options)?;
    let (writer, worker) = match &options.log_file_path {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_appender::non_blocking(file)
        }
        None => tracing_appender::non_blocking(std::io::stdout()),
    };

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match options.format {
        LogFormat::Json => registry
            .with(tracing_fmt::layer().json().with_writer(writer))
            .try_init(),
        LogFormat::Pretty => registry
            .with(
                tracing_fmt::layer()
                    .pretty()
                    .with_ansi(options.log_file_path.is_none())
                    .with_writer(writer),
            )
            .try_init(),
    };
    installed.map_err(|err| Error::Logging(err.to_string()))?;

    Ok(LoggingGuard { _worker: worker })
}
