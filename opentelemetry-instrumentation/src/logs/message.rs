use opentelemetry::otel_warn;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Severity attached to a [`LogMessage`] by the [`Logger`](super::Logger).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Regular operational message, emitted at `INFO`.
    Log,
    /// Emitted at `DEBUG`.
    Debug,
    /// Emitted at `WARN`.
    Warn,
    /// Emitted at `ERROR`.
    Error,
}

impl LogLevel {
    /// Lowercase name, as serialized.
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Log => "log",
            LogLevel::Debug => "debug",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// The `tracing` level events of this severity are emitted at.
    pub fn tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Log => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields of a log message, serialized as one flat JSON object.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LogDetails {
    /// Human readable message. Always present.
    pub msg: String,
    /// Severity, set when the message is handed to a logger.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<LogLevel>,
    /// Application defined fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl LogDetails {
    /// Value of a custom field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// The details as a JSON object.
    pub fn to_value(&self) -> Value {
        let mut object = Map::with_capacity(self.fields.len() + 2);
        object.insert("msg".into(), Value::String(self.msg.clone()));
        if let Some(level) = self.level {
            object.insert("level".into(), Value::String(level.as_str().into()));
        }
        object.extend(self.fields.clone());
        Value::Object(object)
    }
}

impl fmt::Display for LogDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

/// Builder for structured log messages.
///
/// Typed messages are newtypes over `LogMessage` that expose one setter per
/// field and convert into `LogMessage` for the logger:
///
/// ```
/// use opentelemetry_instrumentation::logs::LogMessage;
///
/// struct UserLogMessage(LogMessage);
///
/// impl UserLogMessage {
///     fn new(msg: &str) -> Self {
///         UserLogMessage(LogMessage::new(msg))
///     }
///
///     fn user_mail(self, email: &str) -> Self {
///         UserLogMessage(self.0.set("userMail", email))
///     }
/// }
///
/// impl From<UserLogMessage> for LogMessage {
///     fn from(message: UserLogMessage) -> Self {
///         message.0
///     }
/// }
///
/// let message: LogMessage = UserLogMessage::new("signed in").user_mail("a@b.c").into();
/// assert_eq!(
///     message.switch_to_log().details().to_string(),
///     r#"{"msg":"signed in","userMail":"a@b.c"}"#
/// );
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LogMessage {
    details: LogDetails,
}

impl LogMessage {
    /// Start a message.
    pub fn new<S: Into<String>>(msg: S) -> Self {
        LogMessage {
            details: LogDetails {
                msg: msg.into(),
                ..Default::default()
            },
        }
    }

    /// Set a field. Setting `msg` or `level` replaces the built in value when the
    /// new value has the right shape; otherwise the value is dropped with an
    /// internal warning.
    pub fn set<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Serialize,
    {
        let key = key.into();
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(err) => {
                let reason = err.to_string();
                otel_warn!(
                    name: "LogMessage.FieldNotSerializable",
                    field = key.as_str(),
                    reason = reason.as_str()
                );
                Value::Null
            }
        };

        match key.as_str() {
            "msg" => match value {
                Value::String(msg) => self.details.msg = msg,
                _ => {
                    otel_warn!(
                        name: "LogMessage.BuiltinFieldRejected",
                        field = "msg",
                        reason = "msg must be a string"
                    );
                }
            },
            "level" => match serde_json::from_value::<LogLevel>(value) {
                Ok(level) => self.details.level = Some(level),
                Err(err) => {
                    let reason = err.to_string();
                    otel_warn!(
                        name: "LogMessage.BuiltinFieldRejected",
                        field = "level",
                        reason = reason.as_str()
                    );
                }
            },
            _ => {
                self.details.fields.insert(key, value);
            }
        }
        self
    }

    /// Set the severity.
    pub fn level(mut self, level: LogLevel) -> Self {
        self.details.level = Some(level);
        self
    }

    /// Freeze the message so a logger can read it.
    pub fn switch_to_log(self) -> LoggableLogMessage {
        LoggableLogMessage {
            details: self.details,
        }
    }
}

/// A finished message, ready to be written.
#[derive(Clone, Debug, PartialEq)]
pub struct LoggableLogMessage {
    details: LogDetails,
}

impl LoggableLogMessage {
    /// All fields of the message.
    pub fn details(&self) -> &LogDetails {
        &self.details
    }

    /// Take the fields out of the message.
    pub fn into_details(self) -> LogDetails {
        self.details
    }
}
