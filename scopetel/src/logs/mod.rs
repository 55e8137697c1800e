//! # Logs
//!
//! A [`Logger`] emits structured [`LogRecord`]s: a severity, a message
//! template with `{name}` placeholders and the structured fields that fill
//! them. Each record is stamped with the trace and span ids of the span
//! that is current when it is emitted, so logs can be joined with the trace
//! of the same unit of work.
//!
//! Records go to the [`LogProcessor`]s of the [`LoggerProvider`]; the
//! [`BatchLogProcessor`] ships them to a [`LogExporter`] in the background.
mod export;
mod in_memory_exporter;
mod log_processor;
mod logger;
mod logger_provider;
mod record;

pub use export::LogExporter;
pub use in_memory_exporter::InMemoryLogExporter;
pub use log_processor::{BatchLogProcessor, BatchLogProcessorBuilder, LogProcessor};
pub use logger::Logger;
pub use logger_provider::{LoggerProvider, LoggerProviderBuilder};
pub use record::{LogData, LogRecord, Severity, TraceContext};
