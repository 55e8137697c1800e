use super::OtlpHttpClient;
use crate::transform::TracesData;
use futures_util::future::BoxFuture;
use scopetel::export::ExportResult;
use scopetel::trace::SpanData;

/// Sends finished spans to `<endpoint>/v1/traces`.
///
/// Created through [`HttpExporterBuilder::build_span_exporter`].
///
/// [`HttpExporterBuilder::build_span_exporter`]: crate::HttpExporterBuilder::build_span_exporter
#[derive(Debug)]
pub struct SpanExporter {
    client: OtlpHttpClient,
}

impl SpanExporter {
    pub(crate) fn new(client: OtlpHttpClient) -> Self {
        SpanExporter { client }
    }
}

impl scopetel::trace::SpanExporter for SpanExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        let result = self.client.post(&TracesData::from(batch));
        Box::pin(futures_util::future::ready(result))
    }

    fn shutdown(&mut self) -> ExportResult {
        self.client.shutdown()
    }
}
