//! # Span Processor Interface
//!
//! Span processors receive every sampled span when it ends. The built-in
//! [`BatchSpanProcessor`] queues spans and exports them in batches from a
//! background thread; custom processors can be registered on the
//! [`TracerProvider`] alongside it and are invoked in registration order.
//!
//! ```ascii
//!   +-----+--------------+   +-----------------------+   +-------------------+
//!   |     |              |   |                       |   |                   |
//!   |     | Tracer.start |   |  BatchSpanProcessor   |   |    SpanExporter   |
//!   |     | Span.end()   +--->  (queue + worker)     +--->  (http / stdout)  |
//!   |     |              |   |                       |   |                   |
//!   +-----+--------------+   +-----------------------+   +-------------------+
//! ```
//!
//! [`TracerProvider`]: crate::trace::TracerProvider
use crate::error::SdkResult;
use crate::export::{
    BatchConfig, BatchConfigBuilder, BatchExport, BatchProcessor, ExportDiagnostics,
    ExportResult,
};
use crate::trace::{SpanData, SpanExporter};
use futures_util::future::BoxFuture;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// `SpanProcessor` is an interface which allows hooks for span end.
pub trait SpanProcessor: Send + Sync + Debug {
    /// `on_end` is called after a recording span has ended. It must not
    /// block on export.
    fn on_end(&self, span: SpanData);

    /// Force the spans lying in the cache to be exported.
    fn force_flush(&self) -> SdkResult;

    /// Shuts down the processor, waiting at most `timeout`. Called when the
    /// provider shuts down; after that, ended spans are discarded.
    fn shutdown_with_timeout(&self, timeout: Duration) -> SdkResult;

    /// Shuts down the processor with a default timeout.
    fn shutdown(&self) -> SdkResult {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT)
    }
}

#[derive(Debug)]
struct SpanBatchExport<E>(E);

impl<E: SpanExporter + 'static> BatchExport for SpanBatchExport<E> {
    type Item = SpanData;

    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        self.0.export(batch)
    }

    fn shutdown(&mut self) -> ExportResult {
        self.0.shutdown()
    }
}

/// A [`SpanProcessor`] that buffers ended spans and exports them in batches
/// from a dedicated thread.
///
/// When the queue is full the oldest span is dropped, so `on_end` never
/// blocks the instrumented code. Failed batches are retried according to the
/// configured [`RetryPolicy`](crate::export::RetryPolicy) and then dropped;
/// both kinds of loss are visible in [`BatchSpanProcessor::diagnostics`].
///
/// # Examples
///
/// ```
/// use scopetel::export::BatchConfigBuilder;
/// use scopetel::trace::{BatchSpanProcessor, InMemorySpanExporter, TracerProvider};
/// use std::time::Duration;
///
/// let exporter = InMemorySpanExporter::default();
/// let processor = BatchSpanProcessor::builder(exporter.clone())
///     .with_batch_config(
///         BatchConfigBuilder::for_spans()
///             .with_max_queue_size(1024)
///             .with_scheduled_delay(Duration::from_millis(500))
///             .build(),
///     )
///     .build();
///
/// let provider = TracerProvider::builder()
///     .with_span_processor(processor)
///     .build();
/// # provider.shutdown().unwrap();
/// ```
#[derive(Debug)]
pub struct BatchSpanProcessor {
    inner: BatchProcessor<SpanData>,
}

impl BatchSpanProcessor {
    /// Creates a new instance of `BatchSpanProcessor`.
    pub fn new<E>(exporter: E, config: BatchConfig) -> Self
    where
        E: SpanExporter + 'static,
    {
        BatchSpanProcessor {
            inner: BatchProcessor::new("BatchSpanProcessor", SpanBatchExport(exporter), config),
        }
    }

    /// Creates a new builder, with batch settings read from `OTEL_BSP_*`.
    pub fn builder<E>(exporter: E) -> BatchSpanProcessorBuilder<E>
    where
        E: SpanExporter + 'static,
    {
        BatchSpanProcessorBuilder {
            exporter,
            config: BatchConfigBuilder::for_spans().build(),
        }
    }

    /// Export counters of this processor.
    pub fn diagnostics(&self) -> Arc<ExportDiagnostics> {
        self.inner.diagnostics()
    }
}

impl SpanProcessor for BatchSpanProcessor {
    fn on_end(&self, span: SpanData) {
        self.inner.push(span);
    }

    fn force_flush(&self) -> SdkResult {
        self.inner.force_flush()
    }

    fn shutdown_with_timeout(&self, timeout: Duration) -> SdkResult {
        self.inner.shutdown_with_timeout(timeout)
    }
}

/// A builder for creating [`BatchSpanProcessor`] instances.
#[derive(Debug)]
pub struct BatchSpanProcessorBuilder<E> {
    exporter: E,
    config: BatchConfig,
}

impl<E> BatchSpanProcessorBuilder<E>
where
    E: SpanExporter + 'static,
{
    /// Set the BatchConfig for [`BatchSpanProcessorBuilder`]
    pub fn with_batch_config(self, config: BatchConfig) -> Self {
        BatchSpanProcessorBuilder { config, ..self }
    }

    /// Build a batch processor
    pub fn build(self) -> BatchSpanProcessor {
        BatchSpanProcessor::new(self.exporter, self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{ExportError, RetryPolicy};
    use crate::trace::{InMemorySpanExporter, TracerProvider};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Clone, Default)]
    struct FlakyExporter {
        fail_next: Arc<AtomicUsize>,
        exported: Arc<Mutex<Vec<String>>>,
    }

    impl SpanExporter for FlakyExporter {
        fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
            let failing = self
                .fail_next
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            let result = if failing {
                Err(ExportError::HttpStatus(503))
            } else {
                self.exported
                    .lock()
                    .unwrap()
                    .extend(batch.into_iter().map(|span| span.name.into_owned()));
                Ok(())
            };
            Box::pin(std::future::ready(result))
        }
    }

    fn fast_config() -> BatchConfig {
        BatchConfigBuilder::for_spans()
            .with_scheduled_delay(Duration::from_secs(3600))
            .with_retry_policy(RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
                jitter: Duration::ZERO,
            })
            .build()
    }

    #[test]
    fn exports_on_force_flush_and_shutdown() {
        let exporter = InMemorySpanExporter::default();
        let processor = BatchSpanProcessor::builder(exporter.clone())
            .with_batch_config(fast_config())
            .build();
        let diagnostics = processor.diagnostics();
        let provider = TracerProvider::builder()
            .with_span_processor(processor)
            .build();
        let tracer = provider.tracer("test");

        tracer.in_span("first", |_| {});
        provider.force_flush().unwrap();
        assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);

        tracer.in_span("second", |_| {});
        provider.shutdown().unwrap();
        assert_eq!(exporter.get_finished_spans().unwrap().len(), 2);
        assert_eq!(diagnostics.exported_items(), 2);
    }

    #[test]
    fn failed_export_is_retried_then_dropped() {
        let exporter = FlakyExporter::default();
        exporter.fail_next.store(3, Ordering::SeqCst);
        let processor = BatchSpanProcessor::new(exporter.clone(), fast_config());
        let diagnostics = processor.diagnostics();
        let provider = TracerProvider::builder()
            .with_span_processor(processor)
            .build();
        let tracer = provider.tracer("test");

        tracer.in_span("lost", |_| {});
        assert!(provider.force_flush().is_err());
        assert_eq!(diagnostics.failed_batches(), 1);

        tracer.in_span("delivered", |_| {});
        assert!(provider.force_flush().is_ok());
        assert_eq!(*exporter.exported.lock().unwrap(), vec!["delivered".to_string()]);
    }

    #[test]
    fn transient_failure_recovers_within_retries() {
        let exporter = FlakyExporter::default();
        exporter.fail_next.store(2, Ordering::SeqCst);
        let processor = BatchSpanProcessor::new(exporter.clone(), fast_config());
        let diagnostics = processor.diagnostics();
        let provider = TracerProvider::builder()
            .with_span_processor(processor)
            .build();

        provider.tracer("test").in_span("retried", |_| {});
        assert!(provider.force_flush().is_ok());
        assert_eq!(diagnostics.failed_batches(), 0);
        assert_eq!(*exporter.exported.lock().unwrap(), vec!["retried".to_string()]);
    }
}
