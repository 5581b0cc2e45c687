//! Instrument registry
use super::{InstrumentKind, MetricError, MetricOptions, MetricResult};
use core::fmt;
use opentelemetry::{
    global,
    metrics::{
        AsyncInstrument, Counter, Histogram, Meter, MeterProvider, ObservableCounter,
        ObservableGauge, ObservableUpDownCounter, UpDownCounter,
    },
    otel_debug,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Name of the meter the registry creates instruments on when built from a provider.
pub const METER_NAME: &str = "opentelemetry-instrumentation";

/// Pull callback invoked by the backend on its own collection schedule.
pub type ObservableCallback<T> = Box<dyn Fn(&dyn AsyncInstrument<T>) + Send + Sync>;

/// Backend capability used by the registry to allocate instruments.
///
/// Implemented for [`Meter`]; tests and alternative backends provide their own.
/// Implementations are called at most once per instrument name by an
/// [`InstrumentRegistry`].
pub trait InstrumentFactory: Send + Sync {
    /// Creates a monotonic counter.
    fn create_counter(&self, name: &str, options: &MetricOptions) -> MetricResult<Counter<u64>>;

    /// Creates a counter that can go up and down.
    fn create_up_down_counter(
        &self,
        name: &str,
        options: &MetricOptions,
    ) -> MetricResult<UpDownCounter<i64>>;

    /// Creates a histogram, honouring [`MetricOptions::boundaries`].
    fn create_histogram(&self, name: &str, options: &MetricOptions)
        -> MetricResult<Histogram<f64>>;

    /// Creates a gauge whose value is supplied by `callback`.
    fn create_observable_gauge(
        &self,
        name: &str,
        options: &MetricOptions,
        callback: ObservableCallback<f64>,
    ) -> MetricResult<ObservableGauge<f64>>;

    /// Creates a monotonic counter whose value is supplied by `callback`.
    fn create_observable_counter(
        &self,
        name: &str,
        options: &MetricOptions,
        callback: ObservableCallback<u64>,
    ) -> MetricResult<ObservableCounter<u64>>;

    /// Creates an up/down counter whose value is supplied by `callback`.
    fn create_observable_up_down_counter(
        &self,
        name: &str,
        options: &MetricOptions,
        callback: ObservableCallback<i64>,
    ) -> MetricResult<ObservableUpDownCounter<i64>>;
}

// Builders differ per instrument type but share the description/unit setters.
macro_rules! apply_options {
    ($builder:expr, $options:expr) => {{
        let mut builder = $builder;
        if let Some(description) = &$options.description {
            builder = builder.with_description(description.clone());
        }
        if let Some(unit) = &$options.unit {
            builder = builder.with_unit(unit.clone());
        }
        builder
    }};
}

impl InstrumentFactory for Meter {
    fn create_counter(&self, name: &str, options: &MetricOptions) -> MetricResult<Counter<u64>> {
        Ok(apply_options!(self.u64_counter(name.to_owned()), options).build())
    }

    fn create_up_down_counter(
        &self,
        name: &str,
        options: &MetricOptions,
    ) -> MetricResult<UpDownCounter<i64>> {
        Ok(apply_options!(self.i64_up_down_counter(name.to_owned()), options).build())
    }

    fn create_histogram(
        &self,
        name: &str,
        options: &MetricOptions,
    ) -> MetricResult<Histogram<f64>> {
        let mut builder = apply_options!(self.f64_histogram(name.to_owned()), options);
        if let Some(boundaries) = &options.boundaries {
            builder = builder.with_boundaries(boundaries.clone());
        }
        Ok(builder.build())
    }

    fn create_observable_gauge(
        &self,
        name: &str,
        options: &MetricOptions,
        callback: ObservableCallback<f64>,
    ) -> MetricResult<ObservableGauge<f64>> {
        Ok(
            apply_options!(self.f64_observable_gauge(name.to_owned()), options)
                .with_callback(callback)
                .build(),
        )
    }

    fn create_observable_counter(
        &self,
        name: &str,
        options: &MetricOptions,
        callback: ObservableCallback<u64>,
    ) -> MetricResult<ObservableCounter<u64>> {
        Ok(
            apply_options!(self.u64_observable_counter(name.to_owned()), options)
                .with_callback(callback)
                .build(),
        )
    }

    fn create_observable_up_down_counter(
        &self,
        name: &str,
        options: &MetricOptions,
        callback: ObservableCallback<i64>,
    ) -> MetricResult<ObservableUpDownCounter<i64>> {
        Ok(
            apply_options!(self.i64_observable_up_down_counter(name.to_owned()), options)
                .with_callback(callback)
                .build(),
        )
    }
}

/// A handle stored in the registry.
#[derive(Clone)]
pub enum Instrument {
    /// See [`InstrumentKind::Counter`].
    Counter(Counter<u64>),
    /// See [`InstrumentKind::UpDownCounter`].
    UpDownCounter(UpDownCounter<i64>),
    /// See [`InstrumentKind::Histogram`].
    Histogram(Histogram<f64>),
    /// See [`InstrumentKind::ObservableGauge`].
    ObservableGauge(ObservableGauge<f64>),
    /// See [`InstrumentKind::ObservableCounter`].
    ObservableCounter(ObservableCounter<u64>),
    /// See [`InstrumentKind::ObservableUpDownCounter`].
    ObservableUpDownCounter(ObservableUpDownCounter<i64>),
}

impl Instrument {
    /// The kind of the stored handle.
    pub fn kind(&self) -> InstrumentKind {
        match self {
            Instrument::Counter(_) => InstrumentKind::Counter,
            Instrument::UpDownCounter(_) => InstrumentKind::UpDownCounter,
            Instrument::Histogram(_) => InstrumentKind::Histogram,
            Instrument::ObservableGauge(_) => InstrumentKind::ObservableGauge,
            Instrument::ObservableCounter(_) => InstrumentKind::ObservableCounter,
            Instrument::ObservableUpDownCounter(_) => InstrumentKind::ObservableUpDownCounter,
        }
    }
}

impl fmt::Debug for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Instrument").field(&self.kind()).finish()
    }
}

/// Typed view over one [`Instrument`] variant.
pub trait RegisteredInstrument: Clone + Sized {
    /// Kind of instrument this type represents.
    const KIND: InstrumentKind;

    /// Wraps the handle for storage.
    fn into_instrument(self) -> Instrument;

    /// Extracts the handle if `instrument` holds this kind.
    fn from_instrument(instrument: &Instrument) -> Option<Self>;
}

macro_rules! registered_instrument {
    ($ty:ty, $variant:ident) => {
        impl RegisteredInstrument for $ty {
            const KIND: InstrumentKind = InstrumentKind::$variant;

            fn into_instrument(self) -> Instrument {
                Instrument::$variant(self)
            }

            fn from_instrument(instrument: &Instrument) -> Option<Self> {
                match instrument {
                    Instrument::$variant(handle) => Some(handle.clone()),
                    _ => None,
                }
            }
        }
    };
}

registered_instrument!(Counter<u64>, Counter);
registered_instrument!(UpDownCounter<i64>, UpDownCounter);
registered_instrument!(Histogram<f64>, Histogram);
registered_instrument!(ObservableGauge<f64>, ObservableGauge);
registered_instrument!(ObservableCounter<u64>, ObservableCounter);
registered_instrument!(ObservableUpDownCounter<i64>, ObservableUpDownCounter);

/// Process wide cache of instruments keyed by name.
///
/// The first request for a name creates the instrument through the
/// [`InstrumentFactory`]; every later request returns the same handle and
/// ignores its options. Entries are never removed.
///
/// Lookup and creation happen under one lock, so concurrent first requests for a
/// name still produce exactly one backend call.
pub struct InstrumentRegistry {
    factory: Arc<dyn InstrumentFactory>,
    instruments: Mutex<HashMap<String, Instrument>>,
}

impl fmt::Debug for InstrumentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentRegistry")
            .field("instruments", &self.len())
            .finish()
    }
}

impl InstrumentRegistry {
    /// Create an empty registry backed by `factory`.
    pub fn new<F>(factory: F) -> Self
    where
        F: InstrumentFactory + 'static,
    {
        InstrumentRegistry {
            factory: Arc::new(factory),
            instruments: Mutex::new(HashMap::new()),
        }
    }

    /// Create an empty registry using the [`METER_NAME`] meter of `provider`.
    pub fn from_meter_provider<P>(provider: &P) -> Self
    where
        P: MeterProvider + ?Sized,
    {
        Self::new(provider.meter(METER_NAME))
    }

    /// Create an empty registry using the [`METER_NAME`] meter of the global provider.
    pub fn from_global_meter() -> Self {
        Self::new(global::meter(METER_NAME))
    }

    /// Get the counter registered as `name`, creating it on first use.
    pub fn get_or_create_counter(
        &self,
        name: &str,
        options: &MetricOptions,
    ) -> MetricResult<Counter<u64>> {
        self.get_or_create(name, |factory| factory.create_counter(name, options))
    }

    /// Get the up/down counter registered as `name`, creating it on first use.
    pub fn get_or_create_up_down_counter(
        &self,
        name: &str,
        options: &MetricOptions,
    ) -> MetricResult<UpDownCounter<i64>> {
        self.get_or_create(name, |factory| {
            factory.create_up_down_counter(name, options)
        })
    }

    /// Get the histogram registered as `name`, creating it on first use.
    pub fn get_or_create_histogram(
        &self,
        name: &str,
        options: &MetricOptions,
    ) -> MetricResult<Histogram<f64>> {
        self.get_or_create(name, |factory| factory.create_histogram(name, options))
    }

    /// Get the observable gauge registered as `name`, creating it on first use.
    ///
    /// `callback` is only registered with the backend when the gauge is created.
    pub fn get_or_create_observable_gauge<C>(
        &self,
        name: &str,
        options: &MetricOptions,
        callback: C,
    ) -> MetricResult<ObservableGauge<f64>>
    where
        C: Fn(&dyn AsyncInstrument<f64>) + Send + Sync + 'static,
    {
        self.get_or_create(name, |factory| {
            factory.create_observable_gauge(name, options, Box::new(callback))
        })
    }

    /// Get the observable counter registered as `name`, creating it on first use.
    ///
    /// `callback` is only registered with the backend when the counter is created.
    pub fn get_or_create_observable_counter<C>(
        &self,
        name: &str,
        options: &MetricOptions,
        callback: C,
    ) -> MetricResult<ObservableCounter<u64>>
    where
        C: Fn(&dyn AsyncInstrument<u64>) + Send + Sync + 'static,
    {
        self.get_or_create(name, |factory| {
            factory.create_observable_counter(name, options, Box::new(callback))
        })
    }

    /// Get the observable up/down counter registered as `name`, creating it on first use.
    ///
    /// `callback` is only registered with the backend when the counter is created.
    pub fn get_or_create_observable_up_down_counter<C>(
        &self,
        name: &str,
        options: &MetricOptions,
        callback: C,
    ) -> MetricResult<ObservableUpDownCounter<i64>>
    where
        C: Fn(&dyn AsyncInstrument<i64>) + Send + Sync + 'static,
    {
        self.get_or_create(name, |factory| {
            factory.create_observable_up_down_counter(name, options, Box::new(callback))
        })
    }

    /// The instrument registered as `name`, if any.
    pub fn get(&self, name: &str) -> Option<Instrument> {
        self.instruments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Whether an instrument is registered as `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.instruments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Number of registered instruments.
    pub fn len(&self) -> usize {
        self.instruments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no instrument has been created yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_or_create<T, F>(&self, name: &str, create: F) -> MetricResult<T>
    where
        T: RegisteredInstrument,
        F: FnOnce(&dyn InstrumentFactory) -> MetricResult<T>,
    {
        if name.is_empty() {
            return Err(MetricError::InvalidName(name.to_owned()));
        }

        // Entries are only inserted after a successful creation, so a lock
        // poisoned by a panicking backend still guards a consistent map.
        let mut instruments = self
            .instruments
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = instruments.get(name) {
            return T::from_instrument(existing).ok_or_else(|| MetricError::KindMismatch {
                name: name.to_owned(),
                registered: existing.kind(),
                requested: T::KIND,
            });
        }

        let instrument = create(self.factory.as_ref())?;
        instruments.insert(name.to_owned(), instrument.clone().into_instrument());
        otel_debug!(
            name: "InstrumentRegistry.InstrumentCreated",
            instrument_name = name,
            instrument_kind = T::KIND.as_str()
        );

        Ok(instrument)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::metrics::RecordingFactory;
    use opentelemetry::KeyValue;
    use std::thread;

    #[test]
    fn creates_once_and_ignores_later_options() {
        let factory = RecordingFactory::new();
        let registry = InstrumentRegistry::new(factory.clone());

        let first = registry
            .get_or_create_counter(
                "app_Widget_instances_total",
                &MetricOptions::with_description("d"),
            )
            .unwrap();
        let second = registry
            .get_or_create_counter(
                "app_Widget_instances_total",
                &MetricOptions::with_description("something else"),
            )
            .unwrap();

        let creations = factory.creations();
        assert_eq!(creations.len(), 1);
        assert_eq!(creations[0].kind, InstrumentKind::Counter);
        assert_eq!(creations[0].name, "app_Widget_instances_total");
        assert_eq!(creations[0].options, MetricOptions::with_description("d"));

        // Both handles feed the single recorder created by the backend.
        first.add(1, &[]);
        second.add(2, &[KeyValue::new("k", "v")]);
        assert_eq!(factory.recorder_count("app_Widget_instances_total"), 1);
        assert_eq!(factory.total("app_Widget_instances_total"), 3.0);
    }

    #[test]
    fn every_kind_is_created_once() {
        let factory = RecordingFactory::new();
        let registry = InstrumentRegistry::new(factory.clone());
        let options = MetricOptions::default();

        for _ in 0..2 {
            registry.get_or_create_counter("counter", &options).unwrap();
            registry
                .get_or_create_up_down_counter("up_down", &options)
                .unwrap();
            registry.get_or_create_histogram("histogram", &options).unwrap();
            registry
                .get_or_create_observable_gauge("gauge", &options, |observer| {
                    observer.observe(1.0, &[])
                })
                .unwrap();
            registry
                .get_or_create_observable_counter("observable_counter", &options, |observer| {
                    observer.observe(1, &[])
                })
                .unwrap();
            registry
                .get_or_create_observable_up_down_counter(
                    "observable_up_down",
                    &options,
                    |observer| observer.observe(-1, &[]),
                )
                .unwrap();
        }

        let kinds: Vec<InstrumentKind> = factory.creations().iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                InstrumentKind::Counter,
                InstrumentKind::UpDownCounter,
                InstrumentKind::Histogram,
                InstrumentKind::ObservableGauge,
                InstrumentKind::ObservableCounter,
                InstrumentKind::ObservableUpDownCounter,
            ]
        );
        assert_eq!(registry.len(), 6);
        assert_eq!(
            registry.get("gauge").map(|i| i.kind()),
            Some(InstrumentKind::ObservableGauge)
        );
    }

    #[test]
    fn concurrent_first_use_creates_once() {
        let factory = RecordingFactory::new();
        let registry = Arc::new(InstrumentRegistry::new(factory.clone()));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    let counter = registry
                        .get_or_create_counter("shared_total", &MetricOptions::default())
                        .unwrap();
                    counter.add(1, &[]);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(factory.creation_count("shared_total"), 1);
        assert_eq!(factory.recorder_count("shared_total"), 1);
        assert_eq!(factory.total("shared_total"), 16.0);
    }

    #[test]
    fn kind_mismatch_is_reported_without_backend_call() {
        let factory = RecordingFactory::new();
        let registry = InstrumentRegistry::new(factory.clone());
        registry
            .get_or_create_counter("requests", &MetricOptions::default())
            .unwrap();

        let err = registry
            .get_or_create_histogram("requests", &MetricOptions::default())
            .unwrap_err();

        assert!(matches!(
            err,
            MetricError::KindMismatch {
                registered: InstrumentKind::Counter,
                requested: InstrumentKind::Histogram,
                ..
            }
        ));
        assert_eq!(factory.creations().len(), 1);
    }

    #[test]
    fn empty_name_is_rejected() {
        let factory = RecordingFactory::new();
        let registry = InstrumentRegistry::new(factory.clone());

        let err = registry
            .get_or_create_counter("", &MetricOptions::default())
            .unwrap_err();

        assert!(matches!(err, MetricError::InvalidName(_)));
        assert!(factory.creations().is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn backend_failure_propagates_and_is_not_cached() {
        let factory = RecordingFactory::new().fail_on("flaky_total");
        let registry = InstrumentRegistry::new(factory.clone());

        let err = registry
            .get_or_create_counter("flaky_total", &MetricOptions::default())
            .unwrap_err();
        assert!(matches!(err, MetricError::Creation { ref name, .. } if name == "flaky_total"));
        assert!(!registry.contains("flaky_total"));

        factory.recover("flaky_total");
        registry
            .get_or_create_counter("flaky_total", &MetricOptions::default())
            .unwrap();
        assert!(registry.contains("flaky_total"));
    }

    #[test]
    fn backend_panic_does_not_disable_the_registry() {
        let factory = RecordingFactory::new().panic_on("exploding_total");
        let registry = InstrumentRegistry::new(factory.clone());

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            registry.get_or_create_counter("exploding_total", &MetricOptions::default())
        }));
        assert!(outcome.is_err());
        assert!(!registry.contains("exploding_total"));

        let counter = registry
            .get_or_create_counter("unrelated_total", &MetricOptions::default())
            .unwrap();
        counter.add(2, &[]);

        assert_eq!(registry.len(), 1);
        assert_eq!(factory.total("unrelated_total"), 2.0);
    }

    #[test]
    fn meter_backed_registry() {
        let provider = opentelemetry_sdk::metrics::SdkMeterProvider::default();
        let registry = InstrumentRegistry::from_meter_provider(&provider);

        let histogram = registry
            .get_or_create_histogram(
                "latency_seconds",
                &MetricOptions::with_description("latency")
                    .unit("s")
                    .boundaries(vec![0.1, 1.0]),
            )
            .unwrap();
        histogram.record(0.5, &[]);

        assert!(registry.contains("latency_seconds"));
        assert_eq!(registry.len(), 1);
    }
}
