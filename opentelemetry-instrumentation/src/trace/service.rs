use super::DEFAULT_TRACER_NAME;
use opentelemetry::{
    global::{self, BoxedTracer},
    trace::{SpanContext, TraceContextExt, Tracer},
    Context,
};
use std::borrow::Cow;
use std::fmt;

/// Thin access point to a tracer for code that starts spans by hand.
pub struct TraceService<T = BoxedTracer> {
    tracer: T,
}

impl<T> fmt::Debug for TraceService<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceService").finish_non_exhaustive()
    }
}

impl Default for TraceService<BoxedTracer> {
    fn default() -> Self {
        TraceService {
            tracer: global::tracer(DEFAULT_TRACER_NAME),
        }
    }
}

impl TraceService<BoxedTracer> {
    /// Service over the global [`DEFAULT_TRACER_NAME`] tracer.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T: Tracer> TraceService<T> {
    /// Service over `tracer`.
    pub fn with_tracer(tracer: T) -> Self {
        TraceService { tracer }
    }

    /// The wrapped tracer.
    pub fn tracer(&self) -> &T {
        &self.tracer
    }

    /// Start a span as a child of the current context. The caller ends it.
    pub fn start_span<S>(&self, name: S) -> T::Span
    where
        S: Into<Cow<'static, str>>,
    {
        self.tracer.start(name)
    }

    /// Span context of the currently active span.
    ///
    /// Returns an invalid context when no span is active.
    pub fn current_span_context(&self) -> SpanContext {
        Context::current().span().span_context().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::{Span, TracerProvider as _};
    use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider};

    #[test]
    fn starts_spans_and_reads_the_active_one() {
        let exporter = InMemorySpanExporter::default();
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        let service = TraceService::with_tracer(provider.tracer("test"));

        assert!(!service.current_span_context().is_valid());

        let span = service.start_span("manual");
        let expected = span.span_context().clone();
        let cx = Context::current_with_span(span);
        {
            let _attached = cx.clone().attach();
            assert_eq!(service.current_span_context(), expected);
        }
        cx.span().end();

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "manual");
    }
}
