use crate::error::{SdkError, SdkResult};
use crate::export::{ExportError, ExportResult};
use crate::logs::{LogData, LogExporter};
use futures_util::future::BoxFuture;
use std::sync::{Arc, Mutex};

/// An in-memory logs exporter that stores logs data in memory.
///
/// This exporter is useful for testing and debugging purposes. Records stay
/// available after the provider was shut down.
///
/// # Example
/// ```
/// use scopetel::logs::{InMemoryLogExporter, LoggerProvider, Severity};
/// use scopetel::KeyValue;
///
/// let exporter = InMemoryLogExporter::default();
/// let provider = LoggerProvider::builder()
///     .with_batch_exporter(exporter.clone())
///     .build();
///
/// let logger = provider.logger("example");
/// logger.log(Severity::Information, "Hello {name}", vec![KeyValue::new("name", "world")]);
///
/// provider.force_flush().unwrap();
/// let logs = exporter.get_emitted_logs().unwrap();
/// assert_eq!(logs[0].record.message.as_deref(), Some("Hello world"));
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryLogExporter {
    logs: Arc<Mutex<Vec<LogData>>>,
}

impl InMemoryLogExporter {
    /// Returns the exported records, in export order.
    ///
    /// # Errors
    ///
    /// Returns an `SdkError` if the internal lock cannot be acquired.
    pub fn get_emitted_logs(&self) -> Result<Vec<LogData>, SdkError> {
        Ok(self.logs.lock()?.clone())
    }

    /// Clears the internal storage of records.
    pub fn reset(&self) -> SdkResult {
        self.logs.lock()?.clear();
        Ok(())
    }
}

impl LogExporter for InMemoryLogExporter {
    fn export(&mut self, batch: Vec<LogData>) -> BoxFuture<'static, ExportResult> {
        let result = self
            .logs
            .lock()
            .map(|mut logs_guard| logs_guard.extend(batch))
            .map_err(|err| ExportError::Other(format!("Failed to lock logs: {:?}", err)));
        Box::pin(std::future::ready(result))
    }
}
