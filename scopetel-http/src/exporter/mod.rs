use crate::{
    DEFAULT_ENDPOINT, DEFAULT_TIMEOUT, OTEL_EXPORTER_OTLP_ENDPOINT, OTEL_EXPORTER_OTLP_HEADERS,
    OTEL_EXPORTER_OTLP_TIMEOUT,
};
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue, Uri};
use scopetel::export::{ExportError, ExportResult};
use serde::Serialize;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

mod logs;
mod metrics;
mod trace;

pub use logs::LogExporter;
pub use metrics::MetricExporter;
pub use trace::SpanExporter;

const TRACES_PATH: &str = "/v1/traces";
const METRICS_PATH: &str = "/v1/metrics";
const LOGS_PATH: &str = "/v1/logs";

/// Configuration for the OTLP/HTTP JSON exporters.
///
/// Settings given here take precedence over the `OTEL_EXPORTER_OTLP_*`
/// environment variables, which take precedence over the defaults.
///
/// ## Examples
///
/// ```no_run
/// use scopetel::Telemetry;
/// use scopetel_http::HttpExporterBuilder;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let telemetry = Telemetry::builder()
///     .with_service_name("weather-api")
///     .with_sampling_ratio(1.0)
///     .with_span_exporter(
///         HttpExporterBuilder::default()
///             .with_endpoint("http://otel-collector:4318")
///             .build_span_exporter(),
///     )
///     .with_metric_exporter(HttpExporterBuilder::default().build_metric_exporter())
///     .with_log_exporter(HttpExporterBuilder::default().build_log_exporter())
///     .build()?;
/// # telemetry.shutdown()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct HttpExporterBuilder {
    endpoint: Option<String>,
    timeout: Option<Duration>,
    headers: HashMap<String, String>,
    client: Option<reqwest::blocking::Client>,
}

impl HttpExporterBuilder {
    /// Base URL of the collector, such as `http://otel-collector:4318`.
    ///
    /// The signal path (`/v1/traces`, `/v1/metrics` or `/v1/logs`) is
    /// appended to it. A bare `host:port` is taken to be plain HTTP.
    pub fn with_endpoint<T: Into<String>>(mut self, endpoint: T) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Timeout of each export request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Additional headers to send to the collector, on top of the ones in
    /// `OTEL_EXPORTER_OTLP_HEADERS`. Headers set here win on conflict.
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Use a preconfigured client, e.g. one with custom TLS settings.
    pub fn with_http_client(mut self, client: reqwest::blocking::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Create a span exporter posting to `<endpoint>/v1/traces`.
    pub fn build_span_exporter(self) -> crate::SpanExporter {
        crate::SpanExporter::new(self.build_client(TRACES_PATH))
    }

    /// Create a metric exporter posting to `<endpoint>/v1/metrics`.
    pub fn build_metric_exporter(self) -> crate::MetricExporter {
        crate::MetricExporter::new(self.build_client(METRICS_PATH))
    }

    /// Create a log exporter posting to `<endpoint>/v1/logs`.
    pub fn build_log_exporter(self) -> crate::LogExporter {
        crate::LogExporter::new(self.build_client(LOGS_PATH))
    }

    fn build_client(self, signal_path: &str) -> OtlpHttpClient {
        let endpoint = resolve_endpoint(self.endpoint.as_deref(), signal_path);
        if let Err(err) = endpoint.parse::<Uri>() {
            // Construction never fails; every export to this endpoint will.
            scopetel::tel_warn!(
                name: "HttpExporter.InvalidEndpoint",
                endpoint = endpoint.as_str(),
                error = format!("{}", err)
            );
        }

        let timeout = self.timeout.unwrap_or_else(resolve_timeout);

        let mut headers = HeaderMap::new();
        if let Ok(input) = env::var(OTEL_EXPORTER_OTLP_HEADERS) {
            add_header_from_string(&input, &mut headers);
        }
        for (key, value) in &self.headers {
            insert_header(&mut headers, key, value);
        }

        OtlpHttpClient {
            client: Some(self.client.unwrap_or_default()),
            endpoint,
            headers,
            timeout,
        }
    }
}

/// Picks the collector base URL and appends `signal_path` to it.
fn resolve_endpoint(provided: Option<&str>, signal_path: &str) -> String {
    let base = match provided {
        Some(endpoint) => endpoint.to_string(),
        None => env::var(OTEL_EXPORTER_OTLP_ENDPOINT)
            .ok()
            .map(|endpoint| endpoint.trim().to_string())
            .filter(|endpoint| !endpoint.is_empty())
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
    };
    build_endpoint_uri(&base, signal_path)
}

fn build_endpoint_uri(endpoint: &str, path: &str) -> String {
    let endpoint = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{}", endpoint)
    };
    format!(
        "{}/{}",
        endpoint.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn resolve_timeout() -> Duration {
    match env::var(OTEL_EXPORTER_OTLP_TIMEOUT) {
        Ok(value) => match value.trim().parse::<u64>() {
            Ok(millis) => Duration::from_millis(millis),
            Err(_) => {
                scopetel::tel_warn!(
                    name: "HttpExporter.InvalidTimeout",
                    value = value.as_str(),
                    default_ms = DEFAULT_TIMEOUT.as_millis() as u64
                );
                DEFAULT_TIMEOUT
            }
        },
        Err(_) => DEFAULT_TIMEOUT,
    }
}

/// Parses `key1=value1,key2=value2`. Values may be percent-encoded;
/// malformed pairs are skipped.
fn add_header_from_string(input: &str, headers: &mut HeaderMap) {
    for (key, value) in input
        .split_terminator(',')
        .filter_map(|pair| pair.split_once('='))
    {
        let value = value.trim();
        let value = url_decode(value).unwrap_or_else(|| value.to_string());
        insert_header(headers, key.trim(), &value);
    }
}

fn insert_header(headers: &mut HeaderMap, key: &str, value: &str) {
    if key.is_empty() || value.is_empty() {
        return;
    }
    match (HeaderName::from_str(key), HeaderValue::from_str(value)) {
        (Ok(name), Ok(value)) => {
            headers.insert(name, value);
        }
        _ => {
            scopetel::tel_warn!(name: "HttpExporter.InvalidHeader", key = key);
        }
    }
}

fn url_decode(value: &str) -> Option<String> {
    let bytes = value.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = value.get(i + 1..i + 3)?;
            decoded.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(decoded).ok()
}

/// Posts JSON bodies to one signal endpoint of the collector.
#[derive(Debug)]
pub(crate) struct OtlpHttpClient {
    client: Option<reqwest::blocking::Client>,
    endpoint: String,
    headers: HeaderMap,
    timeout: Duration,
}

impl OtlpHttpClient {
    pub(crate) fn post<T: Serialize>(&self, body: &T) -> ExportResult {
        let client = self.client.as_ref().ok_or(ExportError::AlreadyShutdown)?;
        let body =
            serde_json::to_vec(body).map_err(|err| ExportError::Serialization(err.to_string()))?;

        let response = client
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .header(CONTENT_TYPE, "application/json")
            .timeout(self.timeout)
            .body(body)
            .send()
            .map_err(|err| ExportError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            scopetel::tel_debug!(
                name: "HttpExporter.ExportRejected",
                url = self.endpoint.as_str(),
                status = status.as_u16()
            );
            return Err(ExportError::HttpStatus(status.as_u16()));
        }
        Ok(())
    }

    pub(crate) fn shutdown(&mut self) -> ExportResult {
        match self.client.take() {
            Some(_) => Ok(()),
            None => Err(ExportError::AlreadyShutdown),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    /// A single-request HTTP server answering with `status`. Yields the
    /// request path, headers and body.
    pub(crate) struct FakeCollector {
        pub(crate) endpoint: String,
        requests: mpsc::Receiver<CapturedRequest>,
    }

    #[derive(Debug)]
    pub(crate) struct CapturedRequest {
        pub(crate) path: String,
        pub(crate) headers: Vec<String>,
        pub(crate) body: String,
    }

    impl FakeCollector {
        pub(crate) fn start(status: &'static str) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let endpoint = format!("http://{}", listener.local_addr().unwrap());
            let (sender, requests) = mpsc::channel();
            thread::spawn(move || {
                let (stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream.try_clone().unwrap());

                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();
                let path = request_line
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or_default()
                    .to_string();

                let mut headers = Vec::new();
                let mut content_length = 0;
                loop {
                    let mut line = String::new();
                    reader.read_line(&mut line).unwrap();
                    let line = line.trim_end().to_string();
                    if line.is_empty() {
                        break;
                    }
                    if let Some((name, value)) = line.split_once(':') {
                        if name.eq_ignore_ascii_case("content-length") {
                            content_length = value.trim().parse().unwrap();
                        }
                    }
                    headers.push(line.to_ascii_lowercase());
                }

                let mut body = vec![0; content_length];
                reader.read_exact(&mut body).unwrap();

                let mut stream = stream;
                write!(
                    stream,
                    "HTTP/1.1 {}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                    status
                )
                .unwrap();
                stream.flush().unwrap();

                let _ = sender.send(CapturedRequest {
                    path,
                    headers,
                    body: String::from_utf8(body).unwrap(),
                });
            });
            FakeCollector { endpoint, requests }
        }

        pub(crate) fn request(&self) -> CapturedRequest {
            self.requests
                .recv_timeout(Duration::from_secs(5))
                .unwrap()
        }
    }

    #[test]
    fn signal_path_is_appended_once() {
        assert_eq!(
            build_endpoint_uri("http://collector:4318/", "/v1/traces"),
            "http://collector:4318/v1/traces"
        );
        assert_eq!(
            build_endpoint_uri("http://collector:4318", "/v1/logs"),
            "http://collector:4318/v1/logs"
        );
        assert_eq!(
            build_endpoint_uri("collector:4318", "/v1/metrics"),
            "http://collector:4318/v1/metrics"
        );
    }

    #[test]
    fn endpoint_precedence() {
        temp_env::with_var_unset(OTEL_EXPORTER_OTLP_ENDPOINT, || {
            assert_eq!(
                resolve_endpoint(None, TRACES_PATH),
                "http://otel-collector:4318/v1/traces"
            );
        });
        temp_env::with_var(
            OTEL_EXPORTER_OTLP_ENDPOINT,
            Some("http://from-env:4318"),
            || {
                assert_eq!(
                    resolve_endpoint(None, TRACES_PATH),
                    "http://from-env:4318/v1/traces"
                );
                assert_eq!(
                    resolve_endpoint(Some("http://from-code:4318"), TRACES_PATH),
                    "http://from-code:4318/v1/traces"
                );
            },
        );
    }

    #[test]
    fn malformed_endpoint_does_not_fail_construction() {
        let client = HttpExporterBuilder::default()
            .with_endpoint("http://bad host:4318")
            .build_client(TRACES_PATH);
        let result = client.post(&serde_json::json!({}));
        assert!(matches!(result, Err(ExportError::Transport(_))));
    }

    #[test]
    fn timeout_from_env() {
        temp_env::with_var(OTEL_EXPORTER_OTLP_TIMEOUT, Some("2500"), || {
            assert_eq!(resolve_timeout(), Duration::from_millis(2500));
        });
        temp_env::with_var(OTEL_EXPORTER_OTLP_TIMEOUT, Some("soon"), || {
            assert_eq!(resolve_timeout(), DEFAULT_TIMEOUT);
        });
        temp_env::with_var(OTEL_EXPORTER_OTLP_TIMEOUT, Some("2500"), || {
            let client = HttpExporterBuilder::default()
                .with_timeout(Duration::from_secs(1))
                .build_client(TRACES_PATH);
            assert_eq!(client.timeout, Duration::from_secs(1));
        });
    }

    #[test]
    fn headers_from_string() {
        let mut headers = HeaderMap::new();
        add_header_from_string(
            "api-key=secret, x-tenant = weather%20team ,broken,=novalue,empty=",
            &mut headers,
        );
        assert_eq!(headers.len(), 2);
        assert_eq!(headers["api-key"], "secret");
        assert_eq!(headers["x-tenant"], "weather team");
    }

    #[test]
    fn programmatic_headers_win() {
        temp_env::with_var(OTEL_EXPORTER_OTLP_HEADERS, Some("api-key=env,x-a=1"), || {
            let client = HttpExporterBuilder::default()
                .with_headers(HashMap::from([("api-key".to_string(), "code".to_string())]))
                .build_client(LOGS_PATH);
            assert_eq!(client.headers["api-key"], "code");
            assert_eq!(client.headers["x-a"], "1");
        });
    }

    #[test]
    fn posts_json_and_maps_status() {
        let collector = FakeCollector::start("503 Service Unavailable");
        let client = HttpExporterBuilder::default()
            .with_endpoint(collector.endpoint.clone())
            .with_headers(HashMap::from([("api-key".to_string(), "k".to_string())]))
            .build_client(METRICS_PATH);

        let result = client.post(&serde_json::json!({"resourceMetrics": []}));
        assert_eq!(result, Err(ExportError::HttpStatus(503)));

        let request = collector.request();
        assert_eq!(request.path, "/v1/metrics");
        assert!(request
            .headers
            .contains(&"content-type: application/json".to_string()));
        assert!(request.headers.contains(&"api-key: k".to_string()));
        assert_eq!(request.body, r#"{"resourceMetrics":[]}"#);
    }

    #[test]
    fn unreachable_collector_is_a_transport_error() {
        let client = HttpExporterBuilder::default()
            .with_endpoint("http://127.0.0.1:1")
            .with_timeout(Duration::from_secs(2))
            .build_client(TRACES_PATH);
        let result = client.post(&serde_json::json!({}));
        assert!(matches!(result, Err(ExportError::Transport(_))));
    }

    #[test]
    fn shutdown_is_final() {
        let mut client = HttpExporterBuilder::default().build_client(LOGS_PATH);
        assert_eq!(client.shutdown(), Ok(()));
        assert_eq!(client.shutdown(), Err(ExportError::AlreadyShutdown));
        assert_eq!(
            client.post(&serde_json::json!({})),
            Err(ExportError::AlreadyShutdown)
        );
    }
}
