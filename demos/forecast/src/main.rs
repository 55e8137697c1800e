use chrono::{Days, NaiveDate, Utc};
use rand::Rng;
use scopetel::logs::{Logger, Severity};
use scopetel::metrics::Counter;
use scopetel::trace::{
    InvalidStateError, Span, SpanBuilder, SpanKind, Status, Tracer, EXCEPTION_MESSAGE,
    EXCEPTION_TYPE,
};
use scopetel::{emit_log, Context, FutureContextExt, InstrumentationScope, KeyValue, Telemetry};
use scopetel_appender_tracing::layer::ScopetelTracingBridge;
use scopetel_http::HttpExporterBuilder;
use std::error::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const SCOPE_NAME: &str = "WebAPI.Weather.Forecast";
const SCOPE_VERSION: &str = "1.0.0";
const SAMPLER_ARG: &str = "OTEL_TRACES_SAMPLER_ARG";

const SUMMARIES: [&str; 10] = [
    "Freezing",
    "Bracing",
    "Chilly",
    "Cool",
    "Mild",
    "Warm",
    "Balmy",
    "Hot",
    "Sweltering",
    "Scorching",
];

#[derive(Debug)]
struct WeatherForecast {
    date: NaiveDate,
    temperature_c: i32,
    summary: &'static str,
}

impl WeatherForecast {
    fn temperature_f(&self) -> i32 {
        32 + (self.temperature_c as f64 / 0.5556) as i32
    }
}

#[derive(thiserror::Error, Debug)]
enum ForecastError {
    #[error("upstream weather model unavailable")]
    ModelUnavailable,
    #[error(transparent)]
    Span(#[from] InvalidStateError),
}

/// Instruments shared by every request.
struct App {
    tracer: Tracer,
    requests: Counter<u64>,
    logger: Logger,
}

impl App {
    fn new(telemetry: &Telemetry) -> Self {
        let scope = InstrumentationScope::builder(SCOPE_NAME)
            .with_version(SCOPE_VERSION)
            .build();
        let requests = telemetry
            .meter_provider()
            .meter_with_scope(scope.clone())
            .u64_counter("forecast_requests")
            .with_description("Counts forecast requests.")
            .with_unit("1")
            .build();
        App {
            tracer: telemetry.tracer_provider().tracer_with_scope(scope.clone()),
            requests,
            logger: telemetry.logger_provider().logger_with_scope(scope),
        }
    }
}

fn init_telemetry() -> Result<Telemetry, Box<dyn Error + Send + Sync + 'static>> {
    let mut builder = Telemetry::builder()
        .with_service_name("WebAPI.Weather")
        .with_service_version(env!("CARGO_PKG_VERSION"))
        .with_span_exporter(scopetel_stdout::SpanExporter::default())
        .with_span_exporter(HttpExporterBuilder::default().build_span_exporter())
        .with_metric_exporter(scopetel_stdout::MetricExporter::default())
        .with_metric_exporter(HttpExporterBuilder::default().build_metric_exporter())
        .with_process_metrics()
        .with_log_exporter(scopetel_stdout::LogExporter::default())
        .with_log_exporter(HttpExporterBuilder::default().build_log_exporter());
    if std::env::var_os(SAMPLER_ARG).is_none() {
        builder = builder.with_sampling_ratio(1.0);
    }
    Ok(builder.build()?)
}

fn generate(app: &App, span: &mut Span) -> Result<Vec<WeatherForecast>, ForecastError> {
    span.add_event("forecast.generate.start", vec![])?;
    emit_log!(app.logger, Severity::Information, "Fetching forecast started.");

    let started = Instant::now();
    let mut rng = rand::rng();
    if rng.random_ratio(1, 10) {
        let err = ForecastError::ModelUnavailable;
        span.record_error(&err)?;
        return Err(err);
    }

    let today = Utc::now().date_naive();
    let forecast: Vec<WeatherForecast> = (1..=5)
        .map(|index| WeatherForecast {
            date: today + Days::new(index),
            temperature_c: rng.random_range(-20..55),
            summary: SUMMARIES[rng.random_range(0..SUMMARIES.len())],
        })
        .collect();
    let elapsed_ms = started.elapsed().as_millis() as i64;

    if span.is_recording() {
        let min = forecast.iter().map(|f| f.temperature_c).min().unwrap_or_default();
        let max = forecast.iter().map(|f| f.temperature_c).max().unwrap_or_default();
        span.add_event(
            "forecast.generate.end",
            vec![
                KeyValue::new("forecast.temp.min", min),
                KeyValue::new("forecast.temp.max", max),
            ],
        )?;
        span.set_attribute(KeyValue::new("forecast.count", forecast.len()))?;
        span.set_attribute(KeyValue::new("forecast.elapsed_ms", elapsed_ms))?;
        span.set_status(Status::ok("Forecast generated successfully"))?;
    }

    emit_log!(
        app.logger,
        Severity::Information,
        "Fetching forecast finished after {elapsed_ms} ms.",
        elapsed_ms = elapsed_ms
    );
    Ok(forecast)
}

/// The body of the request handler, running with the server span attached.
async fn handle(app: Arc<App>, user: Option<String>) -> Result<Vec<WeatherForecast>, ForecastError> {
    Context::set_baggage("user.id", user.unwrap_or_else(|| "anonymous".to_string()));
    app.requests.add(1, &[KeyValue::new("event", "add")]);

    // stands in for reading request state
    let delay = rand::rng().random_range(5..50);
    tokio::time::sleep(Duration::from_millis(delay)).await;

    let result = app
        .tracer
        .in_span("ForecastGeneration", |span| generate(&app, span));
    if let Err(err) = &result {
        emit_log!(
            app.logger,
            Severity::Error,
            "Error during forecast generation: {message}",
            message = err.to_string()
        );
    }
    result
}

/// Marks the request span as failed the way dashboards for this service expect:
/// an `Error` status and a `forecast.generate.failed` event.
fn record_failure(span: &mut Span, err: &ForecastError) -> Result<(), InvalidStateError> {
    if !span.is_recording() {
        return Ok(());
    }
    span.set_status(Status::error(err.to_string()))?;
    span.add_event(
        "forecast.generate.failed",
        vec![
            KeyValue::new(EXCEPTION_TYPE, std::any::type_name::<ForecastError>()),
            KeyValue::new(EXCEPTION_MESSAGE, err.to_string()),
        ],
    )
}

async fn get_weather_forecast(
    app: Arc<App>,
    user: Option<String>,
) -> Result<Vec<WeatherForecast>, ForecastError> {
    let mut server = SpanBuilder::from_name("GET /weatherforecast")
        .with_kind(SpanKind::Server)
        .with_attributes([KeyValue::new("http.route", "/weatherforecast")])
        .start(&app.tracer);
    let cx = Context::current().with_span(&server);

    let result = handle(app, user).with_context(cx).await;
    match &result {
        Ok(_) => server.set_status(Status::ok("Forecast generation completed successfully"))?,
        Err(err) => record_failure(&mut server, err)?,
    }
    server.end()?;
    result
}

async fn serve(app: Arc<App>) {
    let users = [Some("alice"), None, Some("bob"), Some("carol"), None];
    let requests: Vec<_> = users
        .into_iter()
        .map(|user| tokio::spawn(get_weather_forecast(app.clone(), user.map(String::from))))
        .collect();

    for request in requests {
        match request.await {
            Ok(Ok(forecast)) => {
                for day in &forecast {
                    info!(
                        date = %day.date,
                        temperature_c = day.temperature_c,
                        temperature_f = day.temperature_f(),
                        summary = day.summary,
                        "forecast"
                    );
                }
            }
            Ok(Err(err)) => warn!(error = %err, "request failed"),
            Err(err) => warn!(error = %err, "request task panicked"),
        }
    }
}

fn main() -> Result<(), Box<dyn Error + Send + Sync + 'static>> {
    // The blocking HTTP clients must be created outside the tokio runtime.
    let telemetry = init_telemetry()?;

    let bridge_filter = EnvFilter::new("info")
        .add_directive("hyper=off".parse()?)
        .add_directive("reqwest=off".parse()?);
    let fmt_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info,scopetel=debug"))?;
    tracing_subscriber::registry()
        .with(ScopetelTracingBridge::new(telemetry.logger_provider()).with_filter(bridge_filter))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_names(true)
                .with_filter(fmt_filter),
        )
        .init();

    let app = Arc::new(App::new(&telemetry));
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(app));

    telemetry.shutdown()?;
    Ok(())
}
