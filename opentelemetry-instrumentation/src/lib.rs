//! # OpenTelemetry Instrumentation
//!
//! Declarative helpers that attach OpenTelemetry signals to application code
//! without changing its call sites:
//!
//! * [`metrics::InstrumentRegistry`] creates each named instrument at most once
//!   and hands the same handle to every later caller.
//! * [`metrics::InstanceCounter`] and [`metrics::MethodCounter`] count
//!   constructions and method calls as `app_<Type>_instances_total` and
//!   `app_<Type>_<method>_calls_total`.
//! * [`trace::SpanAttachment`] runs a function, or the future it returns, inside
//!   a span named `<Type>.<method>` by default.
//! * [`logs::Logger`] writes structured [`logs::LogMessage`]s as `tracing`
//!   events carrying the active trace and span ids.
//!
//! Configuration lives in [`config`]; with the `sdk` feature, [`sdk`] builds and
//! installs the SDK providers.
//!
//! ## Crate Feature Flags
//!
//! * `metrics`: instrument registry and counters. Enabled by default.
//! * `trace`: span attachment and trace service. Enabled by default.
//! * `logs`: structured logger and subscriber setup. Enabled by default.
//! * `sdk`: provider bootstrap on top of `opentelemetry_sdk`.
//! * `internal-logs`: emit internal diagnostics through `tracing`. Enabled by default.
//! * `testing`: test doubles for code built on this crate.
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

pub mod config;
mod error;
#[cfg(feature = "logs")]
#[cfg_attr(docsrs, doc(cfg(feature = "logs")))]
pub mod logs;
#[cfg(feature = "metrics")]
#[cfg_attr(docsrs, doc(cfg(feature = "metrics")))]
pub mod metrics;
#[cfg(feature = "sdk")]
#[cfg_attr(docsrs, doc(cfg(feature = "sdk")))]
pub mod sdk;
#[cfg(any(test, feature = "testing"))]
#[doc(hidden)]
pub mod testing;
#[cfg(feature = "trace")]
#[cfg_attr(docsrs, doc(cfg(feature = "trace")))]
pub mod trace;

pub use error::{Error, Result};
