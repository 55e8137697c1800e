//! Interfaces for exporting metrics
use crate::export::ExportResult;
use crate::metrics::data::ResourceMetrics;
use futures_util::future::BoxFuture;
use std::fmt;

/// Exporter handles the delivery of metric data to external receivers.
///
/// Exporters are owned by a [`PeriodicReader`](crate::metrics::PeriodicReader)
/// worker thread and are only called from it. The returned future is driven
/// to completion before the next export starts.
pub trait MetricExporter: Send + fmt::Debug + 'static {
    /// Serializes and transmits one cumulative snapshot.
    ///
    /// An error makes the reader retry the same snapshot according to its
    /// retry policy.
    fn export(&mut self, metrics: &ResourceMetrics) -> BoxFuture<'static, ExportResult>;

    /// Releases the exporter's resources. Called once, after the final
    /// export at shutdown.
    fn shutdown(&mut self) -> ExportResult {
        Ok(())
    }
}
