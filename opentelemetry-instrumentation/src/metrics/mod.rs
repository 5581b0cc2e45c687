//! # Metrics instrumentation
//!
//! The [`InstrumentRegistry`] hands out OpenTelemetry instruments by name and
//! guarantees the backend is asked to create each name at most once. The
//! [`InstanceCounter`] and [`MethodCounter`] combinators build on it to count
//! constructions and method calls without touching the call sites they wrap.
//!
//! ```
//! use std::sync::Arc;
//! use opentelemetry::global;
//! use opentelemetry_instrumentation::metrics::{InstrumentRegistry, MethodCounter};
//!
//! let registry = Arc::new(InstrumentRegistry::new(global::meter("my-app")));
//! let render_calls = MethodCounter::new(registry, "Widget", "render");
//!
//! let rendered = render_calls.call(|| "<widget/>").unwrap();
//! assert_eq!(rendered, "<widget/>");
//! ```
use std::borrow::Cow;
use std::fmt;
use std::sync::PoisonError;
use thiserror::Error;

mod counters;
mod registry;

pub use counters::{
    instance_counter_description, instance_counter_name, method_counter_description,
    method_counter_name, InstanceCounter, MethodCounter, METRIC_PREFIX,
};
pub use registry::{
    Instrument, InstrumentFactory, InstrumentRegistry, ObservableCallback, RegisteredInstrument,
    METER_NAME,
};

/// A specialized `Result` type for registry operations.
pub type MetricResult<T> = std::result::Result<T, MetricError>;

/// Errors returned by the instrument registry and the counters built on it.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum MetricError {
    /// The name is already registered under a different instrument kind.
    #[error("Instrument {name} is registered as {registered}, requested as {requested}")]
    KindMismatch {
        /// The contested instrument name.
        name: String,
        /// Kind of the handle stored in the registry.
        registered: InstrumentKind,
        /// Kind the caller asked for.
        requested: InstrumentKind,
    },
    /// Instrument names must not be empty.
    #[error("Invalid instrument name: {0:?}")]
    InvalidName(String),
    /// The backend refused to create the instrument.
    #[error("Failed to create instrument {name}: {reason}")]
    Creation {
        /// Name of the instrument that could not be created.
        name: String,
        /// Backend supplied reason.
        reason: String,
    },
    /// Other errors not covered by specific cases.
    #[error("Metrics error: {0}")]
    Other(String),
}

impl<T> From<PoisonError<T>> for MetricError {
    fn from(err: PoisonError<T>) -> Self {
        MetricError::Other(err.to_string())
    }
}

/// The kinds of instrument the registry can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InstrumentKind {
    /// Monotonic sum, recorded with `add`.
    Counter,
    /// Non-monotonic sum, recorded with `add`.
    UpDownCounter,
    /// Distribution of recorded values.
    Histogram,
    /// Current value reported by a collection callback.
    ObservableGauge,
    /// Monotonic sum reported by a collection callback.
    ObservableCounter,
    /// Non-monotonic sum reported by a collection callback.
    ObservableUpDownCounter,
}

impl InstrumentKind {
    /// Whether instruments of this kind are fed by a pull callback.
    pub fn is_observable(self) -> bool {
        matches!(
            self,
            InstrumentKind::ObservableGauge
                | InstrumentKind::ObservableCounter
                | InstrumentKind::ObservableUpDownCounter
        )
    }

    /// Static name of the kind.
    pub fn as_str(self) -> &'static str {
        match self {
            InstrumentKind::Counter => "Counter",
            InstrumentKind::UpDownCounter => "UpDownCounter",
            InstrumentKind::Histogram => "Histogram",
            InstrumentKind::ObservableGauge => "ObservableGauge",
            InstrumentKind::ObservableCounter => "ObservableCounter",
            InstrumentKind::ObservableUpDownCounter => "ObservableUpDownCounter",
        }
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options consumed when an instrument is first created.
///
/// Options passed for a name that already exists in the registry are ignored.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetricOptions {
    /// Human readable description.
    pub description: Option<Cow<'static, str>>,
    /// Unit of the recorded values, e.g. `s` or `By`.
    pub unit: Option<Cow<'static, str>>,
    /// Explicit bucket boundaries, used by histograms only.
    pub boundaries: Option<Vec<f64>>,
}

impl MetricOptions {
    /// Options carrying only a description.
    pub fn with_description<S: Into<Cow<'static, str>>>(description: S) -> Self {
        MetricOptions {
            description: Some(description.into()),
            ..Default::default()
        }
    }

    /// Set the description.
    pub fn description<S: Into<Cow<'static, str>>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the unit.
    pub fn unit<S: Into<Cow<'static, str>>>(mut self, unit: S) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Set histogram bucket boundaries.
    pub fn boundaries(mut self, boundaries: Vec<f64>) -> Self {
        self.boundaries = Some(boundaries);
        self
    }

    /// Returns `self` with every field that is set on `overrides` replaced.
    pub fn merged_with(mut self, overrides: &MetricOptions) -> Self {
        if let Some(description) = &overrides.description {
            self.description = Some(description.clone());
        }
        if let Some(unit) = &overrides.unit {
            self.unit = Some(unit.clone());
        }
        if let Some(boundaries) = &overrides.boundaries {
            self.boundaries = Some(boundaries.clone());
        }
        self
    }
}
