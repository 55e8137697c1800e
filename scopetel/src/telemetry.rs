//! One-stop setup of the trace, metric and log pipelines of a service.
use crate::error::{ConfigError, SdkError, SdkResult};
use crate::logs::{LogExporter, LogProcessor, Logger, LoggerProvider, LoggerProviderBuilder, Severity};
use crate::metrics::{Meter, MeterProvider, MeterProviderBuilder, MetricExporter, PeriodicReader};
use crate::resource::Resource;
use crate::tel_info;
use crate::trace::{
    Sampler, SpanExporter, SpanLimits, SpanProcessor, Tracer, TracerProvider,
    TracerProviderBuilder,
};
use std::borrow::Cow;
use std::env;
use std::time::Duration;

/// Fraction of new traces to sample, between 0 and 1.
pub(crate) const OTEL_TRACES_SAMPLER_ARG: &str = "OTEL_TRACES_SAMPLER_ARG";

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// The telemetry of one service: a tracer, a meter and a logger provider
/// sharing a single [`Resource`].
///
/// Spans are sampled with `ParentBased(TraceIdRatioBased(ratio))`: a
/// decision propagated from an upstream caller is honoured, otherwise
/// `ratio` of new traces is kept. The ratio has no default.
///
/// ```
/// use scopetel::metrics::InMemoryMetricExporter;
/// use scopetel::trace::InMemorySpanExporter;
/// use scopetel::Telemetry;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let spans = InMemorySpanExporter::default();
/// let telemetry = Telemetry::builder()
///     .with_service_name("weather-api")
///     .with_sampling_ratio(1.0)
///     .with_span_exporter(spans.clone())
///     .with_metric_exporter(InMemoryMetricExporter::default())
///     .build()?;
///
/// telemetry.tracer("WebAPI.Weather.Forecast").in_span("GET /weatherforecast", |_| {});
/// telemetry.shutdown()?;
/// assert_eq!(spans.get_finished_spans()?.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Telemetry {
    tracer_provider: TracerProvider,
    meter_provider: MeterProvider,
    logger_provider: LoggerProvider,
}

impl Telemetry {
    /// Create a new [`TelemetryBuilder`].
    pub fn builder() -> TelemetryBuilder {
        TelemetryBuilder::default()
    }

    /// Returns a tracer for the named instrumentation scope.
    pub fn tracer(&self, name: impl Into<Cow<'static, str>>) -> Tracer {
        self.tracer_provider.tracer(name)
    }

    /// Returns a meter for the named instrumentation scope.
    pub fn meter(&self, name: impl Into<Cow<'static, str>>) -> Meter {
        self.meter_provider.meter(name)
    }

    /// Returns a logger for the named instrumentation scope.
    pub fn logger(&self, name: impl Into<Cow<'static, str>>) -> Logger {
        self.logger_provider.logger(name)
    }

    /// The trace pipeline.
    pub fn tracer_provider(&self) -> &TracerProvider {
        &self.tracer_provider
    }

    /// The metric pipeline.
    pub fn meter_provider(&self) -> &MeterProvider {
        &self.meter_provider
    }

    /// The log pipeline.
    pub fn logger_provider(&self) -> &LoggerProvider {
        &self.logger_provider
    }

    /// The resource shared by all three pipelines.
    pub fn resource(&self) -> std::sync::Arc<Resource> {
        self.tracer_provider.resource()
    }

    /// Exports everything recorded so far: spans, then logs, then a metric
    /// snapshot.
    pub fn force_flush(&self) -> SdkResult {
        combine([
            self.tracer_provider.force_flush(),
            self.logger_provider.force_flush(),
            self.meter_provider.force_flush(),
        ])
    }

    /// Flushes and stops the three pipelines. See
    /// [`Telemetry::shutdown_with_timeout`].
    pub fn shutdown(&self) -> SdkResult {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT)
    }

    /// Shuts down spans, logs and metrics in turn, waiting at most `timeout`
    /// for each. Pending items that cannot be delivered in time are lost.
    ///
    /// Fails with [`SdkError::AlreadyShutdown`] if every pipeline was already
    /// shut down.
    pub fn shutdown_with_timeout(&self, timeout: Duration) -> SdkResult {
        combine([
            self.tracer_provider.shutdown_with_timeout(timeout),
            self.logger_provider.shutdown_with_timeout(timeout),
            self.meter_provider.shutdown_with_timeout(timeout),
        ])
    }
}

fn combine<const N: usize>(results: [SdkResult; N]) -> SdkResult {
    let errors: Vec<SdkError> = results.into_iter().filter_map(Result::err).collect();
    if errors.is_empty() {
        Ok(())
    } else if errors.len() == N && errors.iter().all(|err| *err == SdkError::AlreadyShutdown) {
        Err(SdkError::AlreadyShutdown)
    } else {
        Err(SdkError::InternalFailure(format!("errs: {:?}", errors)))
    }
}

/// Builder for [`Telemetry`].
///
/// Several exporters may be added per signal; each gets its own batch
/// processor or periodic reader and receives an independent copy of the
/// data, so a failing sink never holds up another one.
#[derive(Debug, Default)]
pub struct TelemetryBuilder {
    service_name: Option<Cow<'static, str>>,
    service_version: Option<Cow<'static, str>>,
    resource: Option<Resource>,
    sampling_ratio: Option<f64>,
    tracer: TracerProviderBuilder,
    meter: MeterProviderBuilder,
    logger: LoggerProviderBuilder,
}

impl TelemetryBuilder {
    /// Sets the service name of the detected resource.
    pub fn with_service_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.service_name = Some(name.into());
        self
    }

    /// Sets the service version of the detected resource.
    pub fn with_service_version(mut self, version: impl Into<Cow<'static, str>>) -> Self {
        self.service_version = Some(version.into());
        self
    }

    /// Uses `resource` as is, instead of detecting one. Takes precedence
    /// over [`with_service_name`](Self::with_service_name) and
    /// [`with_service_version`](Self::with_service_version).
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Fraction of new traces to sample, in `[0, 1]`. Overrides
    /// `OTEL_TRACES_SAMPLER_ARG`; one of the two is required.
    pub fn with_sampling_ratio(mut self, ratio: f64) -> Self {
        self.sampling_ratio = Some(ratio);
        self
    }

    /// Limits on attributes and events per span.
    pub fn with_span_limits(mut self, span_limits: SpanLimits) -> Self {
        self.tracer = self.tracer.with_span_limits(span_limits);
        self
    }

    /// Sends spans to `exporter` through a batch span processor.
    pub fn with_span_exporter<E: SpanExporter + 'static>(mut self, exporter: E) -> Self {
        self.tracer = self.tracer.with_batch_exporter(exporter);
        self
    }

    /// Adds a custom span processor.
    pub fn with_span_processor<P: SpanProcessor + 'static>(mut self, processor: P) -> Self {
        self.tracer = self.tracer.with_span_processor(processor);
        self
    }

    /// Sends log records to `exporter` through a batch log processor.
    pub fn with_log_exporter<E: LogExporter + 'static>(mut self, exporter: E) -> Self {
        self.logger = self.logger.with_batch_exporter(exporter);
        self
    }

    /// Adds a custom log processor.
    pub fn with_log_processor<P: LogProcessor + 'static>(mut self, processor: P) -> Self {
        self.logger = self.logger.with_log_processor(processor);
        self
    }

    /// Records below `severity` are dropped.
    pub fn with_min_log_severity(mut self, severity: Severity) -> Self {
        self.logger = self.logger.with_min_severity(severity);
        self
    }

    /// Sends metric snapshots to `exporter` through a periodic reader.
    pub fn with_metric_exporter<E: MetricExporter>(mut self, exporter: E) -> Self {
        self.meter = self.meter.with_periodic_exporter(exporter);
        self
    }

    /// Reports CPU time, memory, thread count and uptime of this process
    /// with every metric snapshot.
    pub fn with_process_metrics(mut self) -> Self {
        self.meter = self.meter.with_process_metrics();
        self
    }

    /// Adds a configured periodic reader.
    pub fn with_metric_reader(mut self, reader: PeriodicReader) -> Self {
        self.meter = self.meter.with_reader(reader);
        self
    }

    /// Builds the three pipelines.
    ///
    /// # Errors
    ///
    /// Fails if no sampling ratio was given, or if the ratio lies outside
    /// `[0, 1]`.
    pub fn build(self) -> Result<Telemetry, ConfigError> {
        let ratio = match self.sampling_ratio {
            Some(ratio) => ratio,
            None => sampling_ratio_from_env()?,
        };
        if !(0.0..=1.0).contains(&ratio) {
            return Err(ConfigError::InvalidSamplingRatio(ratio));
        }

        let resource = match self.resource {
            Some(resource) => resource,
            None => {
                let mut builder = Resource::builder();
                if let Some(name) = self.service_name {
                    builder = builder.with_service_name(name);
                }
                if let Some(version) = self.service_version {
                    builder = builder.with_service_version(version);
                }
                builder.build()
            }
        };

        tel_info!(
            name: "Telemetry.Started",
            service_name = resource.service_name(),
            service_version = resource.service_version(),
            instance_id = resource.instance_id(),
            sampling_ratio = ratio
        );

        Ok(Telemetry {
            tracer_provider: self
                .tracer
                .with_sampler(Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(
                    ratio,
                ))))
                .with_resource(resource.clone())
                .build(),
            meter_provider: self.meter.with_resource(resource.clone()).build(),
            logger_provider: self.logger.with_resource(resource).build(),
        })
    }
}

fn sampling_ratio_from_env() -> Result<f64, ConfigError> {
    let raw = env::var(OTEL_TRACES_SAMPLER_ARG)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or(ConfigError::MissingSamplingRatio)?;
    raw.trim()
        .parse::<f64>()
        .map_err(|_| ConfigError::InvalidValue {
            name: OTEL_TRACES_SAMPLER_ARG.to_string(),
            value: raw.clone(),
        })
}
