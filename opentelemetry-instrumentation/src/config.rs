//! # Instrumentation configuration
//!
//! [`TelemetryOptions`] is read from YAML, then adjusted from the standard
//! `OTEL_*` environment variables:
//!
//! ```
//! use opentelemetry_instrumentation::config::TelemetryOptions;
//!
//! let options = TelemetryOptions::from_yaml(
//!     r#"
//!     service_name: checkout
//!     metrics:
//!       api_metrics:
//!         enable: true
//!         ignore_routes:
//!           - health
//!           - { path: metrics, method: GET }
//!     "#,
//! )
//! .unwrap()
//! .with_env_overrides();
//!
//! assert!(options.metrics.api_metrics.enable);
//! ```
use crate::error::Result;
use opentelemetry::otel_warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

const OTEL_SERVICE_NAME: &str = "OTEL_SERVICE_NAME";
const OTEL_METRIC_EXPORT_INTERVAL: &str = "OTEL_METRIC_EXPORT_INTERVAL";

/// Service name used when none is configured.
pub const DEFAULT_SERVICE_NAME: &str = "unknown_service";
/// Metric export interval used when none is configured, in milliseconds.
pub const DEFAULT_EXPORT_INTERVAL_MS: u64 = 6000;

/// Latency buckets in seconds, stretched for long running requests.
pub const DEFAULT_LONG_RUNNING_REQUEST_BUCKETS: [f64; 16] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
    600.0,
];
/// Request body size buckets in bytes.
pub const DEFAULT_REQUEST_SIZE_BUCKETS: [f64; 11] = [
    5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0,
];
/// Response body size buckets in bytes.
pub const DEFAULT_RESPONSE_SIZE_BUCKETS: [f64; 11] = DEFAULT_REQUEST_SIZE_BUCKETS;

/// Top level configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryOptions {
    /// Reported as the `service.name` resource attribute.
    pub service_name: String,
    /// Metrics settings.
    pub metrics: MetricsOptions,
    /// Application log settings.
    pub logging: LoggerOptions,
    /// Exporters installed when the host does not supply its own.
    pub exporter: ExporterKind,
}

impl Default for TelemetryOptions {
    fn default() -> Self {
        TelemetryOptions {
            service_name: DEFAULT_SERVICE_NAME.to_owned(),
            metrics: MetricsOptions::default(),
            logging: LoggerOptions::default(),
            exporter: ExporterKind::default(),
        }
    }
}

impl TelemetryOptions {
    /// Parse options from a YAML document. Missing fields take their defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Read and parse a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    /// Apply `OTEL_SERVICE_NAME` and `OTEL_METRIC_EXPORT_INTERVAL`.
    ///
    /// An interval that is not a whole number of milliseconds is ignored.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(service_name) = env::var(OTEL_SERVICE_NAME) {
            if !service_name.is_empty() {
                self.service_name = service_name;
            }
        }
        if let Ok(interval) = env::var(OTEL_METRIC_EXPORT_INTERVAL) {
            match interval.parse::<u64>() {
                Ok(interval) => self.metrics.export_interval_ms = interval,
                Err(_) => {
                    otel_warn!(
                        name: "TelemetryOptions.InvalidExportInterval",
                        value = interval.as_str()
                    );
                }
            }
        }
        self
    }
}

/// Built in exporters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExporterKind {
    /// Only exporters supplied by the host are installed.
    #[default]
    None,
    /// Spans and metrics are written to stdout.
    Stdout,
}

/// Metrics settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsOptions {
    /// Interval between two pushes of the periodic reader.
    pub export_interval_ms: u64,
    /// HTTP API metrics.
    pub api_metrics: ApiMetricsOptions,
}

impl Default for MetricsOptions {
    fn default() -> Self {
        MetricsOptions {
            export_interval_ms: DEFAULT_EXPORT_INTERVAL_MS,
            api_metrics: ApiMetricsOptions::default(),
        }
    }
}

/// Settings of the HTTP API metrics layer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiMetricsOptions {
    /// Whether the layer is applied at all.
    pub enable: bool,
    /// Latency buckets in seconds. Empty means the defaults.
    pub time_buckets: Vec<f64>,
    /// Request size buckets in bytes. Empty means the defaults.
    pub request_size_buckets: Vec<f64>,
    /// Response size buckets in bytes. Empty means the defaults.
    pub response_size_buckets: Vec<f64>,
    /// Attributes added to every response measurement.
    pub default_attributes: BTreeMap<String, String>,
    /// Requests that are never measured.
    pub ignore_routes: Vec<IgnoredRoute>,
    /// Skip requests that no route matched.
    pub ignore_undefined_routes: bool,
}

impl ApiMetricsOptions {
    /// Configured latency buckets or [`DEFAULT_LONG_RUNNING_REQUEST_BUCKETS`].
    pub fn time_buckets_or_default(&self) -> Vec<f64> {
        or_default(&self.time_buckets, &DEFAULT_LONG_RUNNING_REQUEST_BUCKETS)
    }

    /// Configured request size buckets or [`DEFAULT_REQUEST_SIZE_BUCKETS`].
    pub fn request_size_buckets_or_default(&self) -> Vec<f64> {
        or_default(&self.request_size_buckets, &DEFAULT_REQUEST_SIZE_BUCKETS)
    }

    /// Configured response size buckets or [`DEFAULT_RESPONSE_SIZE_BUCKETS`].
    pub fn response_size_buckets_or_default(&self) -> Vec<f64> {
        or_default(&self.response_size_buckets, &DEFAULT_RESPONSE_SIZE_BUCKETS)
    }

    /// Whether a request is excluded by [`ignore_routes`](Self::ignore_routes).
    pub fn is_ignored(&self, method: &str, path: &str) -> bool {
        self.ignore_routes
            .iter()
            .any(|route| route.matches(method, path))
    }
}

fn or_default(configured: &[f64], defaults: &[f64]) -> Vec<f64> {
    if configured.is_empty() {
        defaults.to_vec()
    } else {
        configured.to_vec()
    }
}

/// A route excluded from API metrics, written either as a bare path or as
/// `{ path, method }`.
///
/// Paths are compared segment by segment, without their leading and trailing
/// slashes. A `:name` segment matches any single non-empty segment, and a
/// trailing `*` matches any suffix. A missing method, or `ALL`, matches every
/// method.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IgnoredRoute {
    /// Any method on this path.
    Path(String),
    /// A path, optionally restricted to one method.
    Route {
        /// Route path.
        path: String,
        /// HTTP method, case insensitive.
        #[serde(default)]
        method: Option<String>,
    },
}

impl IgnoredRoute {
    /// The configured path.
    pub fn path(&self) -> &str {
        match self {
            IgnoredRoute::Path(path) | IgnoredRoute::Route { path, .. } => path,
        }
    }

    /// The configured method, if restricted.
    pub fn method(&self) -> Option<&str> {
        match self {
            IgnoredRoute::Path(_) => None,
            IgnoredRoute::Route { method, .. } => method.as_deref(),
        }
    }

    /// Whether a request with `method` on `path` is excluded.
    pub fn matches(&self, method: &str, path: &str) -> bool {
        let method_matches = match self.method() {
            None => true,
            Some(expected) => {
                expected.eq_ignore_ascii_case("ALL") || expected.eq_ignore_ascii_case(method)
            }
        };
        if !method_matches {
            return false;
        }

        path_matches(self.path(), path)
    }
}

fn path_matches(pattern: &str, path: &str) -> bool {
    let mut expected_segments = trim_slashes(pattern).split('/').peekable();
    let mut actual_segments = trim_slashes(path).split('/');

    while let Some(expected) = expected_segments.next() {
        let Some(actual) = actual_segments.next() else {
            return false;
        };
        if expected_segments.peek().is_none() {
            if let Some(prefix) = expected.strip_suffix('*') {
                return actual.starts_with(prefix);
            }
        }
        let segment_matches = if expected.starts_with(':') {
            !actual.is_empty()
        } else {
            expected == actual
        };
        if !segment_matches {
            return false;
        }
    }
    actual_segments.next().is_none()
}

fn trim_slashes(path: &str) -> &str {
    path.trim_matches('/')
}

/// Output format of application logs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Multi line human readable output.
    Pretty,
}

/// Application log settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerOptions {
    /// Append logs to this file instead of stdout.
    pub log_file_path: Option<PathBuf>,
    /// Output format.
    pub format: LogFormat,
    /// Filter directives used when `RUST_LOG` is not set, e.g. `info` or `my_app=debug`.
    pub level: String,
}

impl Default for LoggerOptions {
    fn default() -> Self {
        LoggerOptions {
            log_file_path: None,
            format: LogFormat::default(),
            level: "info".to_owned(),
        }
    }
}
