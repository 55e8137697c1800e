use super::OtlpHttpClient;
use crate::transform::LogsData;
use futures_util::future::BoxFuture;
use scopetel::export::ExportResult;
use scopetel::logs::LogData;

/// Sends log records to `<endpoint>/v1/logs`.
///
/// Created through [`HttpExporterBuilder::build_log_exporter`].
///
/// [`HttpExporterBuilder::build_log_exporter`]: crate::HttpExporterBuilder::build_log_exporter
#[derive(Debug)]
pub struct LogExporter {
    client: OtlpHttpClient,
}

impl LogExporter {
    pub(crate) fn new(client: OtlpHttpClient) -> Self {
        LogExporter { client }
    }
}

impl scopetel::logs::LogExporter for LogExporter {
    fn export(&mut self, batch: Vec<LogData>) -> BoxFuture<'static, ExportResult> {
        let result = self.client.post(&LogsData::from(batch));
        Box::pin(futures_util::future::ready(result))
    }

    fn shutdown(&mut self) -> ExportResult {
        self.client.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::FakeCollector;
    use crate::HttpExporterBuilder;
    use scopetel::logs::{LoggerProvider, Severity};

    #[test]
    fn records_are_posted_to_logs_path() {
        let collector = FakeCollector::start("202 Accepted");
        let provider = LoggerProvider::builder()
            .with_batch_exporter(
                HttpExporterBuilder::default()
                    .with_endpoint(collector.endpoint.clone())
                    .build_log_exporter(),
            )
            .build();
        provider
            .logger("WebAPI.Weather.Forecast")
            .log(Severity::Error, "Forecast failed", vec![]);
        assert_eq!(provider.force_flush(), Ok(()));

        let request = collector.request();
        assert_eq!(request.path, "/v1/logs");
        assert!(request.body.contains(r#""severityText":"Error""#));
        assert!(request
            .body
            .contains(r#""body":{"stringValue":"Forecast failed"}"#));
        let _ = provider.shutdown();
    }
}
