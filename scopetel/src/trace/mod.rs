//! # Tracing
//!
//! Spans record one logical operation each: its duration, outcome, tags and
//! timestamped events. They nest into traces through their
//! [`SpanContext`], which children inherit from the ambient
//! [`Context`](crate::Context).
//!
//! The [`TracerProvider`] holds the sampler, id generator, span limits,
//! resource and span processors. A [`Tracer`] obtained from it starts spans
//! for one instrumentation scope. Sampled spans are handed to the processors
//! when they end; unsampled spans keep their identity for linkage but record
//! nothing.
//!
//! ```
//! use scopetel::trace::{InMemorySpanExporter, SpanKind, Status, TracerProvider};
//! use scopetel::KeyValue;
//!
//! let exporter = InMemorySpanExporter::default();
//! let provider = TracerProvider::builder()
//!     .with_batch_exporter(exporter.clone())
//!     .build();
//! let tracer = provider.tracer("WebAPI.Weather.Forecast");
//!
//! tracer.in_span_with_kind("GET /weatherforecast", SpanKind::Server, |span| {
//!     span.set_attribute(KeyValue::new("forecast.count", 5)).unwrap();
//!     span.set_status(Status::ok("Forecast generated successfully")).unwrap();
//! });
//!
//! provider.shutdown().unwrap();
//! assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);
//! ```
mod config;
mod error;
mod export;
mod id_generator;
mod in_memory_exporter;
mod provider;
mod sampler;
mod span;
mod span_context;
mod span_processor;
mod tracer;

pub use config::{Config, SpanLimits};
pub use error::InvalidStateError;
pub use export::{Event, SpanData, SpanEvents, SpanExporter};
pub use id_generator::{IdGenerator, IncrementIdGenerator, RandomIdGenerator};
pub use in_memory_exporter::InMemorySpanExporter;
pub use provider::{TracerProvider, TracerProviderBuilder};
pub use sampler::{Sampler, SamplingDecision, ShouldSample};
pub use span::{Span, EXCEPTION_EVENT_NAME, EXCEPTION_MESSAGE, EXCEPTION_TYPE};
pub use span_context::{SpanContext, SpanId, SpanKind, Status, TraceFlags, TraceId};
pub use span_processor::{BatchSpanProcessor, BatchSpanProcessorBuilder, SpanProcessor};
pub use tracer::{SpanBuilder, Tracer};
