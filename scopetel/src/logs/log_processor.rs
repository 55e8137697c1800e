//! # Log Processor Interface
//!
//! Log processors receive every record a [`Logger`](crate::logs::Logger)
//! emits. The built-in [`BatchLogProcessor`] queues records and exports
//! them in batches from a background thread, so emitting never waits on
//! the sink.
use crate::error::SdkResult;
use crate::export::{
    BatchConfig, BatchConfigBuilder, BatchExport, BatchProcessor, ExportDiagnostics,
    ExportResult,
};
use crate::logs::{LogData, LogExporter};
use futures_util::future::BoxFuture;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// The interface for plugging into a [`LoggerProvider`].
///
/// [`LoggerProvider`]: crate::logs::LoggerProvider
pub trait LogProcessor: Send + Sync + Debug {
    /// Called for every emitted record. Must not block on export.
    fn emit(&self, data: LogData);

    /// Force the records lying in the cache to be exported.
    fn force_flush(&self) -> SdkResult;

    /// Shuts down the processor, waiting at most `timeout`.
    fn shutdown_with_timeout(&self, timeout: Duration) -> SdkResult;

    /// Shuts down the processor with a default timeout.
    fn shutdown(&self) -> SdkResult {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT)
    }
}

#[derive(Debug)]
struct LogBatchExport<E>(E);

impl<E: LogExporter + 'static> BatchExport for LogBatchExport<E> {
    type Item = LogData;

    fn export(&mut self, batch: Vec<LogData>) -> BoxFuture<'static, ExportResult> {
        self.0.export(batch)
    }

    fn shutdown(&mut self) -> ExportResult {
        self.0.shutdown()
    }
}

/// A [`LogProcessor`] that buffers records and exports them in batches from
/// a dedicated thread.
///
/// Batch settings default to the `OTEL_BLRP_*` environment variables. As
/// with spans, a full queue drops its oldest record and failed batches are
/// retried, then dropped and counted in [`BatchLogProcessor::diagnostics`].
///
/// ```
/// use scopetel::export::BatchConfigBuilder;
/// use scopetel::logs::{BatchLogProcessor, InMemoryLogExporter, LoggerProvider};
/// use std::time::Duration;
///
/// let processor = BatchLogProcessor::builder(InMemoryLogExporter::default())
///     .with_batch_config(
///         BatchConfigBuilder::for_logs()
///             .with_scheduled_delay(Duration::from_millis(200))
///             .build(),
///     )
///     .build();
/// let provider = LoggerProvider::builder()
///     .with_log_processor(processor)
///     .build();
/// # provider.shutdown().unwrap();
/// ```
#[derive(Debug)]
pub struct BatchLogProcessor {
    inner: BatchProcessor<LogData>,
}

impl BatchLogProcessor {
    /// Creates a new instance of `BatchLogProcessor`.
    pub fn new<E>(exporter: E, config: BatchConfig) -> Self
    where
        E: LogExporter + 'static,
    {
        BatchLogProcessor {
            inner: BatchProcessor::new("BatchLogProcessor", LogBatchExport(exporter), config),
        }
    }

    /// Creates a new builder, with batch settings read from `OTEL_BLRP_*`.
    pub fn builder<E>(exporter: E) -> BatchLogProcessorBuilder<E>
    where
        E: LogExporter + 'static,
    {
        BatchLogProcessorBuilder {
            exporter,
            config: BatchConfigBuilder::for_logs().build(),
        }
    }

    /// Export counters of this processor.
    pub fn diagnostics(&self) -> Arc<ExportDiagnostics> {
        self.inner.diagnostics()
    }
}

impl LogProcessor for BatchLogProcessor {
    fn emit(&self, data: LogData) {
        self.inner.push(data);
    }

    fn force_flush(&self) -> SdkResult {
        self.inner.force_flush()
    }

    fn shutdown_with_timeout(&self, timeout: Duration) -> SdkResult {
        self.inner.shutdown_with_timeout(timeout)
    }
}

/// A builder for creating [`BatchLogProcessor`] instances.
#[derive(Debug)]
pub struct BatchLogProcessorBuilder<E> {
    exporter: E,
    config: BatchConfig,
}

impl<E> BatchLogProcessorBuilder<E>
where
    E: LogExporter + 'static,
{
    /// Set the BatchConfig for [`BatchLogProcessorBuilder`]
    pub fn with_batch_config(self, config: BatchConfig) -> Self {
        BatchLogProcessorBuilder { config, ..self }
    }

    /// Build a batch processor
    pub fn build(self) -> BatchLogProcessor {
        BatchLogProcessor::new(self.exporter, self.config)
    }
}
