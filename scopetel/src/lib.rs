//! Request-scoped telemetry for services.
//!
//! `scopetel` produces, for every unit of work a service handles, a correlated
//! bundle of a trace span, counter observations and structured log records that
//! all share one trace identity, and ships them out-of-band to one or more
//! sinks.
//!
//! # Getting Started
//!
//! ```no_run
//! use scopetel::trace::{SpanKind, Status};
//! use scopetel::{Context, KeyValue, Telemetry};
//! use scopetel::logs::Severity;
//! use scopetel::trace::InMemorySpanExporter;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let telemetry = Telemetry::builder()
//!     .with_service_name("weather-api")
//!     .with_sampling_ratio(1.0)
//!     .with_span_exporter(InMemorySpanExporter::default())
//!     .build()?;
//!
//! let tracer = telemetry.tracer("WebAPI.Weather.Forecast");
//! let meter = telemetry.meter("WebAPI.Weather.Forecast");
//! let logger = telemetry.logger("WebAPI.Weather.Forecast");
//! let requests = meter.u64_counter("forecast_requests").with_unit("1").build();
//!
//! tracer.in_span_with_kind("GET /weatherforecast", SpanKind::Server, |span| {
//!     requests.add(1, &[KeyValue::new("event", "add")]);
//!     Context::set_baggage("user.id", "42");
//!     span.add_event("forecast.generate.start", vec![])?;
//!     logger.log(Severity::Information, "Generating {count} forecasts", vec![KeyValue::new("count", 5)]);
//!     span.set_status(Status::ok("Forecast generated successfully"))
//! })?;
//!
//! telemetry.shutdown()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Crate layout
//!
//! * [`Resource`]: the process identity attached to everything exported.
//! * [`context`]: the ambient, execution-local [`Context`] holding the current
//!   span identity and [`baggage`].
//! * [`trace`]: ids, samplers, spans, tracers and batch span processors.
//! * [`metrics`]: the counter registry and the periodic reader.
//! * [`logs`]: the correlated logger and batch log processors.
//! * [`export`]: the batching worker shared by every signal, retry policy and
//!   export diagnostics.
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![allow(clippy::needless_doctest_main)]

pub(crate) mod internal_logging;

pub mod baggage;
mod common;
mod env;
pub mod context;
pub mod error;
pub mod export;
pub mod logs;
pub mod metrics;
pub mod resource;
mod telemetry;
pub mod trace;

pub use common::{InstrumentationScope, InstrumentationScopeBuilder, Key, KeyValue, Value};
pub use context::{Context, ContextGuard, FutureContextExt, StreamContextExt, WithContext};
pub use error::{ConfigError, SdkError, SdkResult};
pub use resource::Resource;
pub use telemetry::{Telemetry, TelemetryBuilder};

/// Re-exports used by the internal logging macros.
#[doc(hidden)]
#[cfg(feature = "internal-logs")]
pub mod _private {
    pub use tracing::{debug, error, info, warn};
}
