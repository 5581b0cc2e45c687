use super::{LogLevel, LogMessage};
use opentelemetry::{trace::TraceContextExt, Context};
use std::borrow::Cow;

/// Target of every event written by a [`Logger`].
pub const LOG_TARGET: &str = "opentelemetry_instrumentation::logs";

macro_rules! emit {
    ($level:ident, $logger:expr, $details:expr, $trace_id:expr, $span_id:expr) => {
        tracing::$level!(
            target: LOG_TARGET,
            logger = %$logger,
            details = %$details,
            trace_id = $trace_id,
            span_id = $span_id,
            "{}",
            $details.msg
        )
    };
}

/// Leveled logger writing [`LogMessage`]s as `tracing` events.
///
/// Every event carries the logger name, the message details as a JSON string,
/// and the ids of the active OpenTelemetry span when there is one.
#[derive(Clone, Debug)]
pub struct Logger {
    name: Cow<'static, str>,
}

impl Logger {
    /// Create a logger called `name`.
    pub fn new<S: Into<Cow<'static, str>>>(name: S) -> Self {
        Logger { name: name.into() }
    }

    /// Name reported with every event.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Write `message` at [`LogLevel::Log`].
    pub fn log<M: Into<LogMessage>>(&self, message: M) {
        self.write(LogLevel::Log, message.into())
    }

    /// Write `message` at [`LogLevel::Debug`].
    pub fn debug<M: Into<LogMessage>>(&self, message: M) {
        self.write(LogLevel::Debug, message.into())
    }

    /// Write `message` at [`LogLevel::Warn`].
    pub fn warn<M: Into<LogMessage>>(&self, message: M) {
        self.write(LogLevel::Warn, message.into())
    }

    /// Write `message` at [`LogLevel::Error`].
    pub fn error<M: Into<LogMessage>>(&self, message: M) {
        self.write(LogLevel::Error, message.into())
    }

    fn write(&self, level: LogLevel, message: LogMessage) {
        let loggable = message.level(level).switch_to_log();
        let details = loggable.details();

        let cx = Context::current();
        let span = cx.span();
        let span_context = span.span_context();
        let (trace_id, span_id) = if span_context.is_valid() {
            (
                Some(span_context.trace_id().to_string()),
                Some(span_context.span_id().to_string()),
            )
        } else {
            (None, None)
        };
        let trace_id = trace_id.as_deref();
        let span_id = span_id.as_deref();

        match level {
            LogLevel::Log => emit!(info, self.name, details, trace_id, span_id),
            LogLevel::Debug => emit!(debug, self.name, details, trace_id, span_id),
            LogLevel::Warn => emit!(warn, self.name, details, trace_id, span_id),
            LogLevel::Error => emit!(error, self.name, details, trace_id, span_id),
        }
    }
}
