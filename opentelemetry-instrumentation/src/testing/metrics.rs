//! An [`InstrumentFactory`] that records creation requests and measurements.
use crate::metrics::{
    InstrumentFactory, InstrumentKind, MetricError, MetricOptions, MetricResult,
    ObservableCallback,
};
use opentelemetry::{
    global,
    metrics::{
        Counter, Histogram, ObservableCounter, ObservableGauge, ObservableUpDownCounter,
        SyncInstrument, UpDownCounter,
    },
    KeyValue,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

/// A single instrument creation request.
#[derive(Clone, Debug, PartialEq)]
pub struct Creation {
    /// Requested kind.
    pub kind: InstrumentKind,
    /// Requested name.
    pub name: String,
    /// Options as received by the backend.
    pub options: MetricOptions,
}

/// A value recorded through a synchronous instrument.
#[derive(Clone, Debug, PartialEq)]
pub struct Measurement {
    /// Recorded value, widened to `f64`.
    pub value: f64,
    /// Attributes passed with the value.
    pub attributes: Vec<KeyValue>,
}

#[derive(Debug, Default)]
struct Recorder {
    measurements: Mutex<Vec<Measurement>>,
}

impl Recorder {
    fn push(&self, value: f64, attributes: &[KeyValue]) {
        self.measurements
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Measurement {
                value,
                attributes: attributes.to_vec(),
            });
    }
}

impl SyncInstrument<u64> for Recorder {
    fn measure(&self, measurement: u64, attributes: &[KeyValue]) {
        self.push(measurement as f64, attributes)
    }
}

impl SyncInstrument<i64> for Recorder {
    fn measure(&self, measurement: i64, attributes: &[KeyValue]) {
        self.push(measurement as f64, attributes)
    }
}

impl SyncInstrument<f64> for Recorder {
    fn measure(&self, measurement: f64, attributes: &[KeyValue]) {
        self.push(measurement, attributes)
    }
}

#[derive(Debug, Default)]
struct State {
    creations: Vec<Creation>,
    recorders: Vec<(String, Arc<Recorder>)>,
    failing: HashSet<String>,
    panicking: HashSet<String>,
}

/// Records every creation request and every measurement made through the
/// synchronous handles it returns.
///
/// Clones share state, so a test can keep one clone while the registry owns
/// another. Observable instruments are created on the no-op global meter and
/// only their creation is recorded.
#[derive(Clone, Debug, Default)]
pub struct RecordingFactory {
    state: Arc<Mutex<State>>,
}

impl RecordingFactory {
    /// Create a factory with no recorded activity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make creation of `name` fail with [`MetricError::Creation`] until [`recover`](Self::recover).
    pub fn fail_on(self, name: &str) -> Self {
        self.state().failing.insert(name.to_owned());
        self
    }

    /// Make creation of `name` panic inside the backend.
    pub fn panic_on(self, name: &str) -> Self {
        self.state().panicking.insert(name.to_owned());
        self
    }

    /// Let creation of `name` succeed again.
    pub fn recover(&self, name: &str) {
        self.state().failing.remove(name);
    }

    /// All creation requests in call order.
    pub fn creations(&self) -> Vec<Creation> {
        self.state().creations.clone()
    }

    /// Number of creation requests for `name`.
    pub fn creation_count(&self, name: &str) -> usize {
        self.state()
            .creations
            .iter()
            .filter(|creation| creation.name == name)
            .count()
    }

    /// Number of distinct synchronous handles created for `name`.
    pub fn recorder_count(&self, name: &str) -> usize {
        self.state()
            .recorders
            .iter()
            .filter(|(recorded, _)| recorded == name)
            .count()
    }

    /// Every measurement recorded for `name`, across all of its handles.
    pub fn measurements(&self, name: &str) -> Vec<Measurement> {
        let recorders: Vec<Arc<Recorder>> = self
            .state()
            .recorders
            .iter()
            .filter(|(recorded, _)| recorded == name)
            .map(|(_, recorder)| Arc::clone(recorder))
            .collect();
        recorders
            .iter()
            .flat_map(|recorder| {
                recorder
                    .measurements
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone()
            })
            .collect()
    }

    /// Sum of the values recorded for `name`.
    pub fn total(&self, name: &str) -> f64 {
        self.measurements(name).iter().map(|m| m.value).sum()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(
        &self,
        kind: InstrumentKind,
        name: &str,
        options: &MetricOptions,
    ) -> MetricResult<()> {
        let mut state = self.state();
        state.creations.push(Creation {
            kind,
            name: name.to_owned(),
            options: options.clone(),
        });
        if state.panicking.contains(name) {
            drop(state);
            panic!("test backend panicked creating {name}");
        }
        if state.failing.contains(name) {
            return Err(MetricError::Creation {
                name: name.to_owned(),
                reason: "rejected by test backend".into(),
            });
        }
        Ok(())
    }

    fn recorder(&self, name: &str) -> Arc<Recorder> {
        let recorder = Arc::new(Recorder::default());
        self.state()
            .recorders
            .push((name.to_owned(), Arc::clone(&recorder)));
        recorder
    }
}

impl InstrumentFactory for RecordingFactory {
    fn create_counter(&self, name: &str, options: &MetricOptions) -> MetricResult<Counter<u64>> {
        self.register(InstrumentKind::Counter, name, options)?;
        Ok(Counter::new(self.recorder(name)))
    }

    fn create_up_down_counter(
        &self,
        name: &str,
        options: &MetricOptions,
    ) -> MetricResult<UpDownCounter<i64>> {
        self.register(InstrumentKind::UpDownCounter, name, options)?;
        Ok(UpDownCounter::new(self.recorder(name)))
    }

    fn create_histogram(
        &self,
        name: &str,
        options: &MetricOptions,
    ) -> MetricResult<Histogram<f64>> {
        self.register(InstrumentKind::Histogram, name, options)?;
        Ok(Histogram::new(self.recorder(name)))
    }

    fn create_observable_gauge(
        &self,
        name: &str,
        options: &MetricOptions,
        callback: ObservableCallback<f64>,
    ) -> MetricResult<ObservableGauge<f64>> {
        self.register(InstrumentKind::ObservableGauge, name, options)?;
        global::meter("testing").create_observable_gauge(name, options, callback)
    }

    fn create_observable_counter(
        &self,
        name: &str,
        options: &MetricOptions,
        callback: ObservableCallback<u64>,
    ) -> MetricResult<ObservableCounter<u64>> {
        self.register(InstrumentKind::ObservableCounter, name, options)?;
        global::meter("testing").create_observable_counter(name, options, callback)
    }

    fn create_observable_up_down_counter(
        &self,
        name: &str,
        options: &MetricOptions,
        callback: ObservableCallback<i64>,
    ) -> MetricResult<ObservableUpDownCounter<i64>> {
        self.register(InstrumentKind::ObservableUpDownCounter, name, options)?;
        global::meter("testing").create_observable_up_down_counter(name, options, callback)
    }
}
