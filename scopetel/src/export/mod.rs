//! The export pipeline shared by spans, logs and metrics.
//!
//! Finished spans and log records are handed to a batch processor, one per
//! (signal, sink) pair. Each processor owns:
//!
//! * a bounded queue that never blocks producers and drops its **oldest**
//!   entry when full, so recent telemetry wins under overload,
//! * a dedicated worker thread that exports a batch whenever
//!   `max_export_batch_size` items are queued, every `scheduled_delay`, on
//!   `force_flush` and at shutdown,
//! * a [`RetryPolicy`] applied to each batch, after which a still-failing
//!   batch is dropped and counted in [`ExportDiagnostics`].
//!
//! Export errors never travel back to the code that produced the telemetry.
//! Metrics are pushed by a [`PeriodicReader`](crate::metrics::PeriodicReader)
//! that uses the same retry policy and diagnostics.
//!
//! ```ascii
//!   +------------------+   +-----------------------+   +----------------+
//!   | Span::end()      |   | BatchSpanProcessor    |   |                |
//!   | Logger::emit()   +--->  queue -> worker ---- +---> SpanExporter   |
//!   +------------------+   |  (retry, diagnostics) |   | / LogExporter  |
//!                          +-----------------------+   +----------------+
//! ```
mod batch;
mod diagnostics;
mod retry;

pub(crate) use batch::{BatchExport, BatchProcessor};
pub(crate) use retry::export_with_retry;
pub use batch::{BatchConfig, BatchConfigBuilder};
pub use diagnostics::ExportDiagnostics;
pub use retry::RetryPolicy;

pub use crate::error::ExportError;

/// Describes the result of an export.
pub type ExportResult = Result<(), ExportError>;
