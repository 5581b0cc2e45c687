//! # Structured application logging
//!
//! Messages are built with [`LogMessage`], then written by a [`Logger`] as
//! `tracing` events enriched with the ids of the active span. [`init_logging`]
//! installs a subscriber that renders those events as JSON or pretty text.
mod logger;
mod message;
mod subscriber;

pub use crate::config::{LogFormat, LoggerOptions};
pub use logger::{Logger, LOG_TARGET};
pub use message::{LogDetails, LogLevel, LogMessage, LoggableLogMessage};
pub use subscriber::{env_filter, init_logging, LoggingGuard};
