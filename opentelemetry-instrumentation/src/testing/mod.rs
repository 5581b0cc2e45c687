//! Test doubles for code built on this crate.

/// Recording [`InstrumentFactory`](crate::metrics::InstrumentFactory) for metrics tests.
#[cfg(feature = "metrics")]
pub mod metrics;
