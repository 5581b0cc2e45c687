use http::HeaderMap;
use opentelemetry::{
    metrics::{Counter, Histogram},
    KeyValue,
};
use opentelemetry_instrumentation::config::ApiMetricsOptions;
use opentelemetry_instrumentation::metrics::{InstrumentRegistry, MetricOptions, MetricResult};
use std::fmt;
use std::time::Duration;

/// Counter of handled requests.
pub const HTTP_REQUEST_TOTAL: &str = "http_request_total";
/// Counter of sent responses.
pub const HTTP_RESPONSE_TOTAL: &str = "http_response_total";
/// Counter of 2xx and 3xx responses.
pub const HTTP_RESPONSE_SUCCESS_TOTAL: &str = "http_response_success_total";
/// Counter of 4xx and 5xx responses.
pub const HTTP_RESPONSE_ERROR_TOTAL: &str = "http_response_error_total";
/// Counter of 4xx responses.
pub const HTTP_CLIENT_ERROR_TOTAL: &str = "http_client_error_total";
/// Counter of 5xx responses.
pub const HTTP_SERVER_ERROR_TOTAL: &str = "http_server_error_total";
/// Counter of requests abandoned before a response was produced.
pub const HTTP_SERVER_ABORTS_TOTAL: &str = "http_server_aborts_total";
/// Latency histogram, in seconds.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
/// Request body size histogram, in bytes.
pub const HTTP_REQUEST_SIZE_BYTES: &str = "http_request_size_bytes";
/// Response body size histogram, in bytes.
pub const HTTP_RESPONSE_SIZE_BYTES: &str = "http_response_size_bytes";

/// Status used when the inner service failed without producing a response.
const FALLBACK_STATUS: u16 = 500;

/// The five status code classes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatusClass {
    /// 1xx, and anything below.
    Info,
    /// 2xx
    Success,
    /// 3xx
    Redirect,
    /// 4xx
    ClientError,
    /// 5xx, and anything above.
    ServerError,
}

impl StatusClass {
    /// Classify a status code.
    pub fn from_code(code: u16) -> Self {
        match code {
            0..=199 => StatusClass::Info,
            200..=299 => StatusClass::Success,
            300..=399 => StatusClass::Redirect,
            400..=499 => StatusClass::ClientError,
            _ => StatusClass::ServerError,
        }
    }

    /// Snake case name of the class.
    pub fn as_str(self) -> &'static str {
        match self {
            StatusClass::Info => "info",
            StatusClass::Success => "success",
            StatusClass::Redirect => "redirect",
            StatusClass::ClientError => "client_error",
            StatusClass::ServerError => "server_error",
        }
    }
}

impl fmt::Display for StatusClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything known about one finished request.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestObservation {
    /// HTTP method.
    pub method: String,
    /// Route template matched by the router, e.g. `/users/:id`.
    pub route: Option<String>,
    /// Path of the request URI.
    pub uri_path: String,
    /// Response status, `None` when the inner service failed.
    pub status: Option<u16>,
    /// `Content-Length` of the request.
    pub request_content_length: Option<u64>,
    /// `Content-Length` of the response.
    pub response_content_length: Option<u64>,
    /// Time from receiving the request to producing the response.
    pub duration: Duration,
}

/// Parse the `Content-Length` header. Missing or malformed values give `None`.
pub fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(http::header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// The HTTP API instruments and the rules for recording into them.
#[derive(Clone)]
pub struct ApiMetrics {
    request_total: Counter<u64>,
    response_total: Counter<u64>,
    response_success_total: Counter<u64>,
    response_error_total: Counter<u64>,
    client_error_total: Counter<u64>,
    server_error_total: Counter<u64>,
    server_aborts_total: Counter<u64>,
    request_duration: Histogram<f64>,
    request_size: Histogram<f64>,
    response_size: Histogram<f64>,
    default_attributes: Vec<KeyValue>,
    options: ApiMetricsOptions,
}

impl fmt::Debug for ApiMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiMetrics")
            .field("default_attributes", &self.default_attributes)
            .field("ignore_routes", &self.options.ignore_routes)
            .field("ignore_undefined_routes", &self.options.ignore_undefined_routes)
            .finish()
    }
}

impl ApiMetrics {
    /// Get or create the instruments in `registry`.
    ///
    /// Empty bucket lists in `options` fall back to the defaults from
    /// [`opentelemetry_instrumentation::config`].
    pub fn new(registry: &InstrumentRegistry, options: &ApiMetricsOptions) -> MetricResult<Self> {
        let counter = |name: &str, description: &'static str| {
            registry.get_or_create_counter(name, &MetricOptions::with_description(description))
        };
        let histogram =
            |name: &str, description: &'static str, unit: &'static str, buckets: Vec<f64>| {
                registry.get_or_create_histogram(
                    name,
                    &MetricOptions::with_description(description)
                        .unit(unit)
                        .boundaries(buckets),
                )
            };

        Ok(ApiMetrics {
            request_total: counter(HTTP_REQUEST_TOTAL, "Total number of HTTP requests")?,
            response_total: counter(HTTP_RESPONSE_TOTAL, "Total number of HTTP responses")?,
            response_success_total: counter(
                HTTP_RESPONSE_SUCCESS_TOTAL,
                "Total number of all successful responses",
            )?,
            response_error_total: counter(
                HTTP_RESPONSE_ERROR_TOTAL,
                "Total number of all response errors",
            )?,
            client_error_total: counter(
                HTTP_CLIENT_ERROR_TOTAL,
                "Total number of client error requests",
            )?,
            server_error_total: counter(
                HTTP_SERVER_ERROR_TOTAL,
                "Total number of server error requests",
            )?,
            server_aborts_total: counter(
                HTTP_SERVER_ABORTS_TOTAL,
                "Total number of data transfers aborted",
            )?,
            request_duration: histogram(
                HTTP_REQUEST_DURATION_SECONDS,
                "HTTP latency value recorder in seconds",
                "s",
                options.time_buckets_or_default(),
            )?,
            request_size: histogram(
                HTTP_REQUEST_SIZE_BYTES,
                "Current total of incoming bytes",
                "By",
                options.request_size_buckets_or_default(),
            )?,
            response_size: histogram(
                HTTP_RESPONSE_SIZE_BYTES,
                "Current total of outgoing bytes",
                "By",
                options.response_size_buckets_or_default(),
            )?,
            default_attributes: options
                .default_attributes
                .iter()
                .map(|(key, value)| KeyValue::new(key.clone(), value.clone()))
                .collect(),
            options: options.clone(),
        })
    }

    /// Whether requests with `method` on `path` are excluded from measurement.
    pub fn is_ignored(&self, method: &str, path: &str) -> bool {
        self.options.is_ignored(method, path)
    }

    /// Record one finished request.
    pub fn record(&self, observation: &RequestObservation) {
        let path = match (&observation.route, self.options.ignore_undefined_routes) {
            (Some(route), _) => route.as_str(),
            (None, true) => return,
            (None, false) => observation.uri_path.as_str(),
        };

        self.request_total.add(
            1,
            &[
                KeyValue::new("method", observation.method.clone()),
                KeyValue::new("path", path.to_owned()),
            ],
        );

        let status = observation.status.unwrap_or(FALLBACK_STATUS);
        let mut attributes = Vec::with_capacity(3 + self.default_attributes.len());
        attributes.push(KeyValue::new("method", observation.method.clone()));
        attributes.push(KeyValue::new("status", i64::from(status)));
        attributes.push(KeyValue::new("path", path.to_owned()));
        attributes.extend(self.default_attributes.iter().cloned());

        self.request_size.record(
            observation.request_content_length.unwrap_or(0) as f64,
            &attributes,
        );
        self.response_size.record(
            observation.response_content_length.unwrap_or(0) as f64,
            &attributes,
        );
        self.response_total.add(1, &attributes);
        self.request_duration
            .record(observation.duration.as_secs_f64(), &attributes);

        match StatusClass::from_code(status) {
            StatusClass::Success | StatusClass::Redirect => self.response_success_total.add(1, &[]),
            StatusClass::ClientError => {
                self.response_error_total.add(1, &[]);
                self.client_error_total.add(1, &[]);
            }
            StatusClass::ServerError => {
                self.response_error_total.add(1, &[]);
                self.server_error_total.add(1, &[]);
            }
            StatusClass::Info => {}
        }
    }

    /// Record a request abandoned before its response was produced.
    pub fn record_abort(&self) {
        self.server_aborts_total.add(1, &[]);
    }
}
