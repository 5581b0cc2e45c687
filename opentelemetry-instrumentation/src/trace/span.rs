use opentelemetry::{
    global::{self, BoxedTracer},
    trace::{TraceContextExt, Tracer},
    Context,
};
use pin_project_lite::pin_project;
use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context as TaskContext, Poll};

/// Tracer name used when no tracer is supplied.
pub const DEFAULT_TRACER_NAME: &str = "default";

/// Default span name for a method: `<TypeName>.<methodName>`.
pub fn span_name(type_name: &str, method_name: &str) -> String {
    format!("{type_name}.{method_name}")
}

/// Ends its span exactly once, when dropped.
struct ActiveSpan {
    cx: Context,
}

impl ActiveSpan {
    fn start<T>(tracer: &T, name: Cow<'static, str>) -> Self
    where
        T: Tracer,
        T::Span: Send + Sync + 'static,
    {
        let span = tracer.start(name);
        ActiveSpan {
            cx: Context::current_with_span(span),
        }
    }
}

impl Drop for ActiveSpan {
    fn drop(&mut self) {
        self.cx.span().end();
    }
}

/// Runs method bodies inside a span of a fixed name.
///
/// The span is started before the body runs, is the active span while the body
/// runs, and is ended exactly once on every exit path: normal return, error,
/// panic, or a future dropped before completion.
///
/// ```
/// use opentelemetry_instrumentation::trace::SpanAttachment;
///
/// let render = SpanAttachment::for_method("Widget", "render");
/// assert_eq!(render.name(), "Widget.render");
///
/// let html = render.in_span(|| "<widget/>");
/// assert_eq!(html, "<widget/>");
/// ```
#[derive(Clone)]
pub struct SpanAttachment<T = BoxedTracer> {
    tracer: T,
    name: Cow<'static, str>,
}

impl<T> fmt::Debug for SpanAttachment<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanAttachment")
            .field("name", &self.name)
            .finish()
    }
}

impl SpanAttachment<BoxedTracer> {
    /// Spans called `name`, started on the global [`DEFAULT_TRACER_NAME`] tracer.
    pub fn named<S>(name: S) -> Self
    where
        S: Into<Cow<'static, str>>,
    {
        SpanAttachment {
            tracer: global::tracer(DEFAULT_TRACER_NAME),
            name: name.into(),
        }
    }

    /// Spans named after the method, see [`span_name`].
    pub fn for_method(type_name: &str, method_name: &str) -> Self {
        Self::named(span_name(type_name, method_name))
    }

    /// Spans called `name` if given, otherwise named after the method.
    pub fn new(name: Option<Cow<'static, str>>, type_name: &str, method_name: &str) -> Self {
        match name {
            Some(name) => Self::named(name),
            None => Self::for_method(type_name, method_name),
        }
    }
}

impl<T> SpanAttachment<T> {
    /// Start spans on `tracer` instead.
    pub fn with_tracer<U: Tracer>(self, tracer: U) -> SpanAttachment<U> {
        SpanAttachment {
            tracer,
            name: self.name,
        }
    }

    /// The span name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> SpanAttachment<T>
where
    T: Tracer,
    T::Span: Send + Sync + 'static,
{
    /// Run `body` inside a new span.
    pub fn in_span<R, F>(&self, body: F) -> R
    where
        F: FnOnce() -> R,
    {
        let span = ActiveSpan::start(&self.tracer, self.name.clone());
        let _attached = span.cx.clone().attach();
        body()
    }

    /// Call `body` inside a new span and keep the span open until the returned
    /// future completes.
    pub fn in_span_async<Fut, F>(&self, body: F) -> Traced<Fut>
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        let span = ActiveSpan::start(&self.tracer, self.name.clone());
        let inner = {
            let _attached = span.cx.clone().attach();
            body()
        };
        Traced {
            inner,
            span: Some(span),
        }
    }

    /// Turn `f` into a function whose every call runs inside a new span.
    pub fn wrap<A, R, F>(self, f: F) -> impl Fn(A) -> R
    where
        F: Fn(A) -> R,
    {
        move |args| self.in_span(|| f(args))
    }

    /// Turn `f` into a function whose every returned future runs inside a new span.
    pub fn wrap_async<A, Fut, F>(self, f: F) -> impl Fn(A) -> Traced<Fut>
    where
        F: Fn(A) -> Fut,
        Fut: Future,
    {
        move |args| self.in_span_async(|| f(args))
    }
}

pin_project! {
    /// A future running inside a span, returned by [`SpanAttachment::in_span_async`].
    ///
    /// The span is entered on every poll and ended once the inner future
    /// completes, or when this future is dropped before that.
    #[must_use = "futures do nothing unless polled"]
    pub struct Traced<F> {
        #[pin]
        inner: F,
        span: Option<ActiveSpan>,
    }
}

impl<F> fmt::Debug for Traced<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Traced")
            .field("settled", &self.span.is_none())
            .finish()
    }
}

impl<F: Future> Future for Traced<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, task_cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let attached = this.span.as_ref().map(|span| span.cx.clone().attach());
        let output = ready!(this.inner.poll(task_cx));
        drop(attached);
        this.span.take();
        Poll::Ready(output)
    }
}
