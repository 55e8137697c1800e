//! An OTLP/HTTP sink for scopetel.
//!
//! Spans, cumulative metric snapshots and log records are posted as
//! OTLP/JSON to a collector's `/v1/traces`, `/v1/metrics` and `/v1/logs`
//! endpoints. Requests are sent with a blocking [`reqwest`] client from the
//! batch worker threads, never from instrumented code.
//!
//! # Configuration
//!
//! | Variable                      | Meaning                                   | Default                      |
//! |-------------------------------|-------------------------------------------|------------------------------|
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | base URL the signal path is appended to   | `http://otel-collector:4318` |
//! | `OTEL_EXPORTER_OTLP_TIMEOUT`  | request timeout, in milliseconds          | `10000`                      |
//! | `OTEL_EXPORTER_OTLP_HEADERS`  | extra headers, as `key1=value1,key2=value2` |                            |
//!
//! Values set on [`HttpExporterBuilder`] take precedence.
//!
//! A non-2xx response fails the export with
//! [`ExportError::HttpStatus`](scopetel::export::ExportError::HttpStatus), an
//! unreachable collector with
//! [`ExportError::Transport`](scopetel::export::ExportError::Transport); the
//! batch processor retries both according to its retry policy.
//!
//! # Example
//!
//! ```no_run
//! use scopetel_http::HttpExporterBuilder;
//! use scopetel::trace::TracerProvider;
//!
//! let provider = TracerProvider::builder()
//!     .with_batch_exporter(HttpExporterBuilder::default().build_span_exporter())
//!     .build();
//! ```
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]

use std::time::Duration;

mod exporter;
mod transform;

pub use exporter::{HttpExporterBuilder, LogExporter, MetricExporter, SpanExporter};

/// Base URL of the collector; `/v1/<signal>` is appended.
pub const OTEL_EXPORTER_OTLP_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
/// Request timeout in milliseconds.
pub const OTEL_EXPORTER_OTLP_TIMEOUT: &str = "OTEL_EXPORTER_OTLP_TIMEOUT";
/// Extra request headers, as `key1=value1,key2=value2`.
pub const OTEL_EXPORTER_OTLP_HEADERS: &str = "OTEL_EXPORTER_OTLP_HEADERS";

/// Collector base URL used when neither code nor environment sets one.
pub const DEFAULT_ENDPOINT: &str = "http://otel-collector:4318";
/// Request timeout used when neither code nor environment sets one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);
