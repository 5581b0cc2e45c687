//! Wrapper for errors raised while configuring or running the instrumentation layer.
#[cfg(feature = "metrics")]
use crate::metrics::MetricError;
#[cfg(feature = "sdk")]
use opentelemetry_sdk::error::OTelSdkError;
use std::sync::PoisonError;

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the registry, configuration, logging and SDK bootstrap.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[cfg(feature = "metrics")]
    #[cfg_attr(docsrs, doc(cfg(feature = "metrics")))]
    #[error(transparent)]
    /// An issue raised by the instrument registry.
    Metric(#[from] MetricError),

    /// Invalid or unreadable configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// Reading a configuration file or opening a log destination failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The logging subscriber could not be installed.
    #[error("Logging error: {0}")]
    Logging(String),

    #[cfg(feature = "sdk")]
    #[cfg_attr(docsrs, doc(cfg(feature = "sdk")))]
    #[error(transparent)]
    /// Building or shutting down the SDK providers failed.
    Sdk(#[from] OTelSdkError),

    #[error("{0}")]
    /// Other types of failures not covered by the variants above.
    Other(String),
}

impl<T> From<PoisonError<T>> for Error {
    fn from(err: PoisonError<T>) -> Self {
        Error::Other(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Config(err.to_string())
    }
}
