use crate::error::{SdkError, SdkResult};
use crate::export::{ExportError, ExportResult};
use crate::metrics::data::ResourceMetrics;
use crate::metrics::MetricExporter;
use futures_util::future::BoxFuture;
use std::sync::{Arc, Mutex};

/// An in-memory metrics exporter that stores every exported snapshot.
///
/// Snapshots are cumulative, so the last one holds the running totals of
/// every series.
///
/// # Example
///
/// ```
/// use scopetel::metrics::{InMemoryMetricExporter, MeterProvider};
/// use scopetel::KeyValue;
///
/// let exporter = InMemoryMetricExporter::default();
/// let provider = MeterProvider::builder()
///     .with_periodic_exporter(exporter.clone())
///     .build();
///
/// let counter = provider.meter("example").u64_counter("requests_total").build();
/// counter.add(1, &[KeyValue::new("event", "add")]);
///
/// provider.force_flush().unwrap();
/// let metrics = exporter.get_finished_metrics().unwrap();
/// assert_eq!(metrics.len(), 1);
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryMetricExporter {
    metrics: Arc<Mutex<Vec<ResourceMetrics>>>,
}

impl InMemoryMetricExporter {
    /// Returns the exported snapshots, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an `SdkError` if the internal lock cannot be acquired.
    pub fn get_finished_metrics(&self) -> Result<Vec<ResourceMetrics>, SdkError> {
        Ok(self.metrics.lock()?.clone())
    }

    /// The most recent snapshot, if any was exported.
    pub fn latest(&self) -> Result<Option<ResourceMetrics>, SdkError> {
        Ok(self.metrics.lock()?.last().cloned())
    }

    /// Clears the stored snapshots.
    pub fn reset(&self) -> SdkResult {
        self.metrics.lock()?.clear();
        Ok(())
    }
}

impl MetricExporter for InMemoryMetricExporter {
    fn export(&mut self, metrics: &ResourceMetrics) -> BoxFuture<'static, ExportResult> {
        let result = self
            .metrics
            .lock()
            .map(|mut stored| stored.push(metrics.clone()))
            .map_err(|err| ExportError::Other(format!("Failed to lock metrics: {:?}", err)));
        Box::pin(std::future::ready(result))
    }
}
