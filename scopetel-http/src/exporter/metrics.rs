use super::OtlpHttpClient;
use crate::transform::MetricsData;
use futures_util::future::BoxFuture;
use scopetel::export::ExportResult;
use scopetel::metrics::data::ResourceMetrics;

/// Sends cumulative metric snapshots to `<endpoint>/v1/metrics`.
///
/// Created through [`HttpExporterBuilder::build_metric_exporter`].
///
/// [`HttpExporterBuilder::build_metric_exporter`]: crate::HttpExporterBuilder::build_metric_exporter
#[derive(Debug)]
pub struct MetricExporter {
    client: OtlpHttpClient,
}

impl MetricExporter {
    pub(crate) fn new(client: OtlpHttpClient) -> Self {
        MetricExporter { client }
    }
}

impl scopetel::metrics::MetricExporter for MetricExporter {
    fn export(&mut self, metrics: &ResourceMetrics) -> BoxFuture<'static, ExportResult> {
        let result = self.client.post(&MetricsData::from(metrics));
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
    use scopetel::metrics::MeterProvider;
    use scopetel::KeyValue;

    #[test]
    fn snapshot_is_posted_to_metrics_path() {
        let collector = FakeCollector::start("200 OK");
        let provider = MeterProvider::builder()
            .with_periodic_exporter(
                HttpExporterBuilder::default()
                    .with_endpoint(collector.endpoint.clone())
                    .build_metric_exporter(),
            )
            .build();
        provider
            .meter("WebAPI.Weather.Forecast")
            .u64_counter("forecast_requests")
            .build()
            .add(1, &[KeyValue::new("event", "add")]);
        assert_eq!(provider.force_flush(), Ok(()));

        let request = collector.request();
        assert_eq!(request.path, "/v1/metrics");
        assert!(request.body.contains(r#""name":"forecast_requests""#));
        assert!(request.body.contains(r#""asInt":"1""#));
        let _ = provider.shutdown();
    }
}
