//! # scopetel-appender-tracing
//!
//! A [`tracing_subscriber::Layer`] that turns `tracing` events into scopetel
//! log records, so code that already logs through `tracing` gets the same
//! correlation and export as the scopetel [`Logger`](scopetel::logs::Logger).
//!
//! ```
//! use scopetel::logs::{InMemoryLogExporter, LoggerProvider};
//! use scopetel_appender_tracing::layer::ScopetelTracingBridge;
//! use tracing_subscriber::prelude::*;
//!
//! let provider = LoggerProvider::builder()
//!     .with_batch_exporter(InMemoryLogExporter::default())
//!     .build();
//! let subscriber = tracing_subscriber::registry().with(ScopetelTracingBridge::new(&provider));
//! tracing::subscriber::with_default(subscriber, || {
//!     tracing::info!(count = 5, "Generating forecasts");
//! });
//! ```
//!
//! ## Mapping details
//!
//! | `tracing`          | scopetel                                      |
//! |--------------------|-----------------------------------------------|
//! | target             | instrumentation scope name of the record      |
//! | level              | [`Severity`](scopetel::logs::Severity)        |
//! | `message` field    | template and rendered message                 |
//! | other fields       | record fields                                 |
//! | `&dyn Error` field | `exception.message` field                     |
//!
//! `u64` values that do not fit an `i64` and `&dyn Debug` values are stored
//! as strings. Records are correlated with the scopetel span current on the
//! emitting thread, not with `tracing` spans.
//!
//! Events whose target starts with `scopetel` are scopetel's own diagnostics
//! and are never forwarded, so a failing exporter cannot feed itself.
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]

pub mod layer;
