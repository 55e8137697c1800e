use crate::error::{SdkError, SdkResult};
use crate::export::{ExportError, ExportResult};
use crate::trace::{SpanData, SpanExporter};
use futures_util::future::BoxFuture;
use std::sync::{Arc, Mutex};

/// An in-memory span exporter that stores span data in memory.
///
/// This exporter is useful for testing and debugging purposes. It stores
/// span data in a `Vec<SpanData>`. Spans can be retrieved using the
/// `get_finished_spans` method, also after the provider was shut down.
///
/// # Example
/// ```
/// use scopetel::trace::{InMemorySpanExporter, SpanKind, TracerProvider};
///
/// let exporter = InMemorySpanExporter::default();
/// let provider = TracerProvider::builder()
///     .with_batch_exporter(exporter.clone())
///     .build();
///
/// let tracer = provider.tracer("example/in_memory_exporter");
/// tracer.in_span_with_kind("say hello", SpanKind::Server, |span| {
///     span.add_event("handling this...", Vec::new()).unwrap();
/// });
///
/// provider.force_flush().unwrap();
/// let spans = exporter.get_finished_spans().unwrap();
/// assert_eq!(spans.len(), 1);
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemorySpanExporter {
    spans: Arc<Mutex<Vec<SpanData>>>,
}

impl InMemorySpanExporter {
    /// Returns the finished spans, in export order.
    ///
    /// # Errors
    ///
    /// Returns an `SdkError` if the internal lock cannot be acquired.
    pub fn get_finished_spans(&self) -> Result<Vec<SpanData>, SdkError> {
        let spans = self.spans.lock()?;
        Ok(spans.clone())
    }

    /// Clears the internal storage of finished spans.
    pub fn reset(&self) -> SdkResult {
        self.spans.lock()?.clear();
        Ok(())
    }
}

impl SpanExporter for InMemorySpanExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        let result = self
            .spans
            .lock()
            .map(|mut spans_guard| spans_guard.extend(batch))
            .map_err(|err| ExportError::Other(format!("Failed to lock spans: {:?}", err)));
        Box::pin(std::future::ready(result))
    }
}
