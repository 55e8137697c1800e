//! Log exporters
use crate::export::ExportResult;
use crate::logs::LogData;
use futures_util::future::BoxFuture;
use std::fmt::Debug;

/// `LogExporter` defines the interface that log exporters should implement.
///
/// Exporters are driven from a single worker thread, one batch at a time,
/// and report failures through the returned [`ExportResult`]; the
/// [`BatchLogProcessor`](crate::logs::BatchLogProcessor) retries them.
pub trait LogExporter: Send + Sync + Debug {
    /// Exports a batch of log records, in emission order.
    fn export(&mut self, batch: Vec<LogData>) -> BoxFuture<'static, ExportResult>;

    /// Shuts down the exporter. Called once, after the final export.
    fn shutdown(&mut self) -> ExportResult {
        Ok(())
    }
}
