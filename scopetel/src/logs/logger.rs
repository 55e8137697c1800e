use crate::common::{InstrumentationScope, KeyValue};
use crate::context::Context;
use crate::logs::record::render_template;
use crate::logs::{LogData, LogRecord, LoggerProvider, Severity, TraceContext};
use std::borrow::Cow;
use std::fmt;
use std::time::SystemTime;

/// Emits structured log records correlated with the current span.
///
/// When a record is emitted inside an attached context with a span, the
/// span's trace and span ids are stamped onto it. Outside any span the record
/// is emitted without correlation.
#[derive(Clone)]
pub struct Logger {
    scope: InstrumentationScope,
    provider: LoggerProvider,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("scope", &self.scope)
            .finish()
    }
}

impl Logger {
    pub(crate) fn new(scope: InstrumentationScope, provider: LoggerProvider) -> Self {
        Logger { scope, provider }
    }

    /// The instrumentation scope of this logger.
    pub fn instrumentation_scope(&self) -> &InstrumentationScope {
        &self.scope
    }

    /// The provider this logger was obtained from.
    pub fn provider(&self) -> &LoggerProvider {
        &self.provider
    }

    /// Whether a record of `severity` would be emitted right now.
    ///
    /// False below the provider's minimum severity, after shutdown, without
    /// processors, and inside a telemetry-suppressed context.
    pub fn event_enabled(&self, severity: Severity) -> bool {
        severity >= self.provider.min_severity()
            && !self.provider.is_shutdown()
            && !self.provider.log_processors().is_empty()
            && !Context::is_current_telemetry_suppressed()
    }

    /// Emits a record built from `template` and `fields`.
    ///
    /// ```
    /// use scopetel::logs::{LoggerProvider, Severity};
    /// use scopetel::KeyValue;
    ///
    /// let logger = LoggerProvider::builder().build().logger("WebAPI.Weather.Forecast");
    /// logger.log(
    ///     Severity::Information,
    ///     "Generating {count} forecasts",
    ///     vec![KeyValue::new("count", 5)],
    /// );
    /// ```
    pub fn log(
        &self,
        severity: Severity,
        template: impl Into<Cow<'static, str>>,
        fields: Vec<KeyValue>,
    ) {
        if !self.event_enabled(severity) {
            return;
        }
        let mut record = LogRecord::new(severity, template);
        record.fields = fields;
        self.emit(record);
    }

    /// Emits `record`, filling in the timestamp, the rendered message and the
    /// trace correlation where they are absent.
    pub fn emit(&self, mut record: LogRecord) {
        if !self.event_enabled(record.severity) {
            return;
        }

        if record.timestamp.is_none() {
            record.timestamp = Some(SystemTime::now());
        }
        if record.trace_context.is_none() {
            record.trace_context = Context::map_current(|cx| {
                cx.span_context()
                    .filter(|span_context| span_context.is_valid())
                    .map(TraceContext::from)
            });
        }
        if record.message.is_none() {
            record.message = Some(render_template(&record.template, &record.fields));
        }

        let data = LogData {
            record,
            instrumentation_scope: self.scope.clone(),
            resource: self.provider.resource(),
        };
        match self.provider.log_processors() {
            [] => {}
            [processor] => processor.emit(data),
            processors => {
                for processor in processors {
                    processor.emit(data.clone());
                }
            }
        }
    }
}

/// Emits a log record through a [`Logger`], taking fields as named
/// arguments.
///
/// ```
/// use scopetel::emit_log;
/// use scopetel::logs::{LoggerProvider, Severity};
///
/// let logger = LoggerProvider::builder().build().logger("WebAPI.Weather.Forecast");
/// emit_log!(logger, Severity::Information, "Generating {count} forecasts", count = 5);
/// emit_log!(logger, Severity::Debug, "Forecast cache miss");
/// ```
#[macro_export]
macro_rules! emit_log {
    ($logger:expr, $severity:expr, $template:expr $(,)?) => {
        $logger.log($severity, $template, ::std::vec::Vec::new())
    };
    ($logger:expr, $severity:expr, $template:expr, $($key:ident = $value:expr),+ $(,)?) => {
        $logger.log(
            $severity,
            $template,
            ::std::vec![$($crate::KeyValue::new(stringify!($key), $value)),+],
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::{InMemoryLogExporter, LoggerProvider};
    use crate::trace::{Sampler, TracerProvider};

    fn setup() -> (LoggerProvider, InMemoryLogExporter) {
        let exporter = InMemoryLogExporter::default();
        let provider = LoggerProvider::builder()
            .with_batch_exporter(exporter.clone())
            .build();
        (provider, exporter)
    }

    #[test]
    fn log_inside_span_carries_span_ids() {
        let (provider, exporter) = setup();
        let logger = provider.logger("test");
        let tracer_provider = TracerProvider::default();
        let tracer = tracer_provider.tracer("test");

        let (trace_id, span_id) = tracer.in_span("GET /weatherforecast", |span| {
            logger.log(Severity::Information, "inside", vec![]);
            (span.span_context().trace_id(), span.span_context().span_id())
        });
        logger.log(Severity::Information, "outside", vec![]);
        provider.force_flush().unwrap();

        let logs = exporter.get_emitted_logs().unwrap();
        assert_eq!(logs.len(), 2);
        let inside = logs[0].record.trace_context.unwrap();
        assert_eq!(inside.trace_id, trace_id);
        assert_eq!(inside.span_id, span_id);
        assert!(logs[1].record.trace_context.is_none());
    }

    #[test]
    fn unsampled_span_still_correlates() {
        let (provider, exporter) = setup();
        let logger = provider.logger("test");
        let tracer_provider = TracerProvider::builder()
            .with_sampler(Sampler::AlwaysOff)
            .build();

        tracer_provider.tracer("test").in_span("op", |span| {
            assert!(!span.is_recording());
            logger.log(Severity::Warning, "not sampled", vec![]);
        });
        provider.force_flush().unwrap();

        let logs = exporter.get_emitted_logs().unwrap();
        let trace_context = logs[0].record.trace_context.unwrap();
        assert!(!trace_context.trace_flags.is_sampled());
    }

    #[test]
    fn emit_fills_message_scope_and_resource() {
        let (provider, exporter) = setup();
        let logger = provider.logger("WebAPI.Weather.Forecast");
        emit_log!(
            logger,
            Severity::Information,
            "Generating {count} forecasts",
            count = 5
        );
        provider.force_flush().unwrap();

        let logs = exporter.get_emitted_logs().unwrap();
        let data = &logs[0];
        assert_eq!(data.record.template, "Generating {count} forecasts");
        assert_eq!(data.record.message.as_deref(), Some("Generating 5 forecasts"));
        assert!(data.record.timestamp.is_some());
        assert_eq!(data.instrumentation_scope.name(), "WebAPI.Weather.Forecast");
        assert_eq!(data.resource.service_name(), provider.resource().service_name());
    }

    #[test]
    fn explicit_timestamp_and_message_are_kept() {
        let (provider, exporter) = setup();
        let timestamp = SystemTime::UNIX_EPOCH;
        let mut record = LogRecord::new(Severity::Error, "raw {x}").with_timestamp(timestamp);
        record.message = Some("already rendered".into());
        provider.logger("test").emit(record);
        provider.force_flush().unwrap();

        let logs = exporter.get_emitted_logs().unwrap();
        assert_eq!(logs[0].record.timestamp, Some(timestamp));
        assert_eq!(logs[0].record.message.as_deref(), Some("already rendered"));
    }

    #[test]
    fn below_min_severity_is_dropped() {
        let exporter = InMemoryLogExporter::default();
        let provider = LoggerProvider::builder()
            .with_min_severity(Severity::Warning)
            .with_batch_exporter(exporter.clone())
            .build();
        let logger = provider.logger("test");
        assert!(!logger.event_enabled(Severity::Information));
        logger.log(Severity::Information, "dropped", vec![]);
        logger.log(Severity::Critical, "kept", vec![]);
        provider.force_flush().unwrap();

        let logs = exporter.get_emitted_logs().unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].record.severity, Severity::Critical);
    }

    #[test]
    fn suppressed_context_emits_nothing() {
        let (provider, exporter) = setup();
        let logger = provider.logger("test");
        {
            let _guard = Context::enter_telemetry_suppressed_scope();
            logger.log(Severity::Error, "from inside an exporter", vec![]);
        }
        provider.force_flush().unwrap();
        assert!(exporter.get_emitted_logs().unwrap().is_empty());
    }
}
