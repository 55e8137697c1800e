//! Export telemetry signals to stdout.
//!
//! The exporters print a human readable rendering of every span, metric
//! snapshot and log record they receive. They are meant for local
//! development, mirroring what is sent to a remote sink, and never for
//! production use: writing to stdout is synchronous.
//!
//! # Examples
//!
//! ```no_run
//! use scopetel::Telemetry;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let telemetry = Telemetry::builder()
//!     .with_service_name("weather-api")
//!     .with_sampling_ratio(1.0)
//!     .with_span_exporter(scopetel_stdout::SpanExporter::default())
//!     .with_metric_exporter(scopetel_stdout::MetricExporter::default())
//!     .with_log_exporter(scopetel_stdout::LogExporter::default())
//!     .build()?;
//!
//! telemetry.tracer("WebAPI.Weather.Forecast").in_span("GET /weatherforecast", |_| {});
//!
//! // Spans
//! // Span #0
//! //  Instrumentation Scope
//! //      Name: "WebAPI.Weather.Forecast"
//! // ...
//! telemetry.shutdown()?;
//! # Ok(())
//! # }
//! ```
#![warn(missing_debug_implementations, missing_docs)]

pub(crate) mod common;

mod logs;
mod metrics;
mod trace;

pub use logs::*;
pub use metrics::*;
pub use trace::*;
