//! # OpenTelemetry HTTP API metrics
//!
//! A [`tower`] layer that counts requests and responses, classifies response
//! status codes, and records latency and body size histograms for any
//! `http` based service.
//!
//! ```
//! use http::{Request, Response};
//! use opentelemetry_instrumentation::config::ApiMetricsOptions;
//! use opentelemetry_instrumentation::metrics::InstrumentRegistry;
//! use opentelemetry_instrumentation_http::ApiMetricsLayer;
//! use std::convert::Infallible;
//! use tower::{service_fn, Layer};
//!
//! let registry = InstrumentRegistry::from_global_meter();
//! let options = ApiMetricsOptions {
//!     enable: true,
//!     ..Default::default()
//! };
//! let layer = ApiMetricsLayer::from_options(&registry, &options)
//!     .unwrap()
//!     .expect("enabled");
//! let _service = layer.layer(service_fn(|_: Request<()>| async {
//!     Ok::<_, Infallible>(Response::new(()))
//! }));
//! ```
//!
//! Requests carrying a [`MatchedRoute`] extension are recorded under the route
//! template; other requests use the URI path unless
//! [`ApiMetricsOptions::ignore_undefined_routes`] is set.
//!
//! | Instrument | Kind | Attributes |
//! |---|---|---|
//! | `http_request_total` | counter | `method`, `path` |
//! | `http_response_total` | counter | `method`, `status`, `path`, defaults |
//! | `http_response_success_total` | counter | none |
//! | `http_response_error_total` | counter | none |
//! | `http_client_error_total` | counter | none |
//! | `http_server_error_total` | counter | none |
//! | `http_server_aborts_total` | counter | none |
//! | `http_request_duration_seconds` | histogram | `method`, `status`, `path`, defaults |
//! | `http_request_size_bytes` | histogram | `method`, `status`, `path`, defaults |
//! | `http_response_size_bytes` | histogram | `method`, `status`, `path`, defaults |
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]
#![doc(
    html_logo_url = "https://raw.githubusercontent.com/open-telemetry/opentelemetry-rust/main/assets/logo.svg"
)]

mod layer;
mod metrics;

pub use layer::{ApiMetricsLayer, ApiMetricsService, MatchedRoute, ResponseFuture};
pub use metrics::{
    content_length, ApiMetrics, RequestObservation, StatusClass, HTTP_CLIENT_ERROR_TOTAL,
    HTTP_REQUEST_DURATION_SECONDS, HTTP_REQUEST_SIZE_BYTES, HTTP_REQUEST_TOTAL,
    HTTP_RESPONSE_ERROR_TOTAL, HTTP_RESPONSE_SIZE_BYTES, HTTP_RESPONSE_SUCCESS_TOTAL,
    HTTP_RESPONSE_TOTAL, HTTP_SERVER_ABORTS_TOTAL, HTTP_SERVER_ERROR_TOTAL,
};
pub use opentelemetry_instrumentation::config::{ApiMetricsOptions, IgnoredRoute};
