use crate::metrics::{content_length, ApiMetrics, RequestObservation};
use http::{Request, Response};
use opentelemetry::otel_debug;
use opentelemetry_instrumentation::config::ApiMetricsOptions;
use opentelemetry_instrumentation::metrics::{InstrumentRegistry, MetricResult};
use pin_project_lite::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};

/// Route template matched for a request, e.g. `/users/:id`.
///
/// Routers insert this into the request extensions so that measurements are
/// grouped by route instead of by concrete path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchedRoute(pub String);

/// [`Layer`] that records [`ApiMetrics`] for every request of the wrapped
/// service.
#[derive(Clone, Debug)]
pub struct ApiMetricsLayer {
    metrics: Arc<ApiMetrics>,
}

impl ApiMetricsLayer {
    /// Record into `metrics`.
    pub fn new(metrics: ApiMetrics) -> Self {
        ApiMetricsLayer {
            metrics: Arc::new(metrics),
        }
    }

    /// Build the layer from configuration. Returns `None` when API metrics
    /// are disabled.
    pub fn from_options(
        registry: &InstrumentRegistry,
        options: &ApiMetricsOptions,
    ) -> MetricResult<Option<Self>> {
        if !options.enable {
            otel_debug!(name: "ApiMetricsLayer.Disabled");
            return Ok(None);
        }
        let metrics = ApiMetrics::new(registry, options)?;
        otel_debug!(
            name: "ApiMetricsLayer.Created",
            ignored_routes = options.ignore_routes.len()
        );
        Ok(Some(Self::new(metrics)))
    }
}

impl<S> Layer<S> for ApiMetricsLayer {
    type Service = ApiMetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ApiMetricsService {
            inner,
            metrics: Arc::clone(&self.metrics),
        }
    }
}

/// Service produced by [`ApiMetricsLayer`].
#[derive(Clone, Debug)]
pub struct ApiMetricsService<S> {
    inner: S,
    metrics: Arc<ApiMetrics>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for ApiMetricsService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = ResponseFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        let uri_path = request.uri().path();
        let in_flight = if self.metrics.is_ignored(request.method().as_str(), uri_path) {
            None
        } else {
            Some(InFlight {
                metrics: Arc::clone(&self.metrics),
                method: request.method().as_str().to_owned(),
                route: request
                    .extensions()
                    .get::<MatchedRoute>()
                    .map(|route| route.0.clone()),
                uri_path: uri_path.to_owned(),
                request_content_length: content_length(request.headers()),
                start: Instant::now(),
            })
        };

        ResponseFuture {
            inner: self.inner.call(request),
            in_flight,
        }
    }
}

#[derive(Debug)]
struct InFlight {
    metrics: Arc<ApiMetrics>,
    method: String,
    route: Option<String>,
    uri_path: String,
    request_content_length: Option<u64>,
    start: Instant,
}

impl InFlight {
    fn finish(self, status: Option<u16>, response_content_length: Option<u64>) {
        let observation = RequestObservation {
            method: self.method,
            route: self.route,
            uri_path: self.uri_path,
            status,
            request_content_length: self.request_content_length,
            response_content_length,
            duration: self.start.elapsed(),
        };
        self.metrics.record(&observation);
    }
}

pin_project! {
    /// Response future of [`ApiMetricsService`].
    ///
    /// Dropping it before completion counts the request as aborted.
    #[derive(Debug)]
    pub struct ResponseFuture<F> {
        #[pin]
        inner: F,
        in_flight: Option<InFlight>,
    }

    impl<F> PinnedDrop for ResponseFuture<F> {
        fn drop(this: Pin<&mut Self>) {
            if let Some(in_flight) = this.project().in_flight.take() {
                in_flight.metrics.record_abort();
            }
        }
    }
}

impl<F, ResBody, E> Future for ResponseFuture<F>
where
    F: Future<Output = Result<Response<ResBody>, E>>,
{
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let result = ready!(this.inner.poll(cx));
        if let Some(in_flight) = this.in_flight.take() {
            match &result {
                Ok(response) => in_flight.finish(
                    Some(response.status().as_u16()),
                    content_length(response.headers()),
                ),
                Err(_) => in_flight.finish(None, None),
            }
        }
        Poll::Ready(result)
    }
}
