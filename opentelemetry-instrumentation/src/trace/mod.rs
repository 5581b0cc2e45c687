//! # Span instrumentation
//!
//! [`SpanAttachment`] brackets a function call, or the future it returns, with
//! a span. [`TraceService`] gives direct access to the tracer for code that
//! manages spans itself.
mod service;
mod span;

pub use service::TraceService;
pub use span::{span_name, SpanAttachment, Traced, DEFAULT_TRACER_NAME};
