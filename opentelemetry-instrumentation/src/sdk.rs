//! # SDK bootstrap
//!
//! Builds the tracer and meter providers described by [`TelemetryOptions`] and
//! optionally installs them as the global providers.
//!
//! ```no_run
//! use opentelemetry_instrumentation::config::{ExporterKind, TelemetryOptions};
//! use opentelemetry_instrumentation::sdk::TelemetryPipeline;
//!
//! let options = TelemetryOptions {
//!     service_name: "checkout".into(),
//!     exporter: ExporterKind::Stdout,
//!     ..Default::default()
//! };
//! let providers = TelemetryPipeline::builder(options).install();
//! let registry = providers.registry();
//! // ... run the application ...
//! providers.shutdown().unwrap();
//! ```
use crate::config::{ExporterKind, TelemetryOptions};
use crate::error::Result;
use crate::metrics::InstrumentRegistry;
use opentelemetry::{global, otel_debug, propagation::TextMapCompositePropagator};
use opentelemetry_sdk::{
    metrics::{
        exporter::PushMetricExporter, MeterProviderBuilder, PeriodicReader, SdkMeterProvider,
    },
    propagation::{BaggagePropagator, TraceContextPropagator},
    trace::{SdkTracerProvider, SpanExporter, TracerProviderBuilder},
    Resource,
};
use std::fmt;
use std::time::Duration;

/// Entry point of the bootstrap.
#[derive(Debug)]
pub struct TelemetryPipeline;

impl TelemetryPipeline {
    /// Start building providers for `options`.
    pub fn builder(options: TelemetryOptions) -> TelemetryPipelineBuilder {
        TelemetryPipelineBuilder {
            options,
            tracer_provider: SdkTracerProvider::builder(),
            meter_provider: SdkMeterProvider::builder(),
            has_span_exporter: false,
            has_metric_exporter: false,
        }
    }
}

/// Collects exporters before the providers are built.
pub struct TelemetryPipelineBuilder {
    options: TelemetryOptions,
    tracer_provider: TracerProviderBuilder,
    meter_provider: MeterProviderBuilder,
    has_span_exporter: bool,
    has_metric_exporter: bool,
}

impl fmt::Debug for TelemetryPipelineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryPipelineBuilder")
            .field("options", &self.options)
            .field("has_span_exporter", &self.has_span_exporter)
            .field("has_metric_exporter", &self.has_metric_exporter)
            .finish()
    }
}

impl TelemetryPipelineBuilder {
    /// Export spans through a batch processor.
    pub fn with_span_exporter<E: SpanExporter + 'static>(mut self, exporter: E) -> Self {
        self.tracer_provider = self.tracer_provider.with_batch_exporter(exporter);
        self.has_span_exporter = true;
        self
    }

    /// Push metrics through a periodic reader running every `export_interval_ms`.
    pub fn with_metric_exporter<E: PushMetricExporter>(mut self, exporter: E) -> Self {
        let reader = PeriodicReader::builder(exporter)
            .with_interval(self.export_interval())
            .build();
        self.meter_provider = self.meter_provider.with_reader(reader);
        self.has_metric_exporter = true;
        self
    }

    /// Build the providers without touching global state.
    pub fn build(self) -> TelemetryProviders {
        let TelemetryPipelineBuilder {
            options,
            mut tracer_provider,
            mut meter_provider,
            has_span_exporter,
            has_metric_exporter,
        } = self;

        let resource = Resource::builder()
            .with_service_name(options.service_name.clone())
            .build();
        tracer_provider = tracer_provider.with_resource(resource.clone());
        meter_provider = meter_provider.with_resource(resource);

        if options.exporter == ExporterKind::Stdout {
            if !has_span_exporter {
                let exporter = opentelemetry_stdout::SpanExporter::default();
                tracer_provider = tracer_provider.with_batch_exporter(exporter);
            }
            if !has_metric_exporter {
                let exporter = opentelemetry_stdout::MetricExporter::default();
                let reader = PeriodicReader::builder(exporter)
                    .with_interval(Duration::from_millis(options.metrics.export_interval_ms))
                    .build();
                meter_provider = meter_provider.with_reader(reader);
            }
        }

        otel_debug!(
            name: "TelemetryPipeline.Built",
            service_name = options.service_name.as_str()
        );
        TelemetryProviders {
            tracer_provider: tracer_provider.build(),
            meter_provider: meter_provider.build(),
        }
    }

    /// Build the providers and install them, together with the W3C trace
    /// context, W3C baggage and Jaeger propagators, as the global defaults.
    pub fn install(self) -> TelemetryProviders {
        let providers = self.build();
        global::set_tracer_provider(providers.tracer_provider.clone());
        global::set_meter_provider(providers.meter_provider.clone());
        global::set_text_map_propagator(TextMapCompositePropagator::new(vec![
            Box::new(TraceContextPropagator::new()),
            Box::new(BaggagePropagator::new()),
            Box::new(opentelemetry_jaeger_propagator::Propagator::new()),
        ]));
        providers
    }

    fn export_interval(&self) -> Duration {
        Duration::from_millis(self.options.metrics.export_interval_ms)
    }
}

/// The providers built by a [`TelemetryPipeline`].
#[derive(Clone, Debug)]
pub struct TelemetryProviders {
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
}

impl TelemetryProviders {
    /// The tracer provider.
    pub fn tracer_provider(&self) -> &SdkTracerProvider {
        &self.tracer_provider
    }

    /// The meter provider.
    pub fn meter_provider(&self) -> &SdkMeterProvider {
        &self.meter_provider
    }

    /// A new instrument registry backed by this meter provider.
    pub fn registry(&self) -> InstrumentRegistry {
        InstrumentRegistry::from_meter_provider(&self.meter_provider)
    }

    /// Flush and shut down both providers. Both are always attempted; the
    /// first failure is returned.
    pub fn shutdown(&self) -> Result<()> {
        let traces = self.tracer_provider.shutdown();
        let metrics = self.meter_provider.shutdown();
        Ok(traces.and(metrics)?)
    }
}
