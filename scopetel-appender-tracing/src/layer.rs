//! The `tracing` layer forwarding events to a scopetel logger provider.
use scopetel::logs::{LogRecord, LoggerProvider, Severity};
use scopetel::KeyValue;
use std::borrow::Cow;
use tracing::field::{Field, Visit};
use tracing_core::Level;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

const EXCEPTION_MESSAGE: &str = "exception.message";

/// Visitor to record the message and fields of an event.
struct EventVisitor<'a> {
    log_record: &'a mut LogRecord,
}

impl EventVisitor<'_> {
    fn push(&mut self, field: &Field, value: impl Into<scopetel::Value>) {
        self.log_record
            .fields
            .push(KeyValue::new(field.name(), value.into()));
    }

    fn set_message(&mut self, message: String) {
        self.log_record.template = Cow::Owned(message.clone());
        self.log_record.message = Some(message);
    }
}

impl Visit for EventVisitor<'_> {
    fn record_error(&mut self, _field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.log_record
            .fields
            .push(KeyValue::new(EXCEPTION_MESSAGE, value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.set_message(format!("{value:?}"));
        } else {
            self.push(field, format!("{value:?}"));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.set_message(value.to_string());
        } else {
            self.push(field, value.to_string());
        }
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, value);
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, value);
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        match i64::try_from(value) {
            Ok(value) => self.push(field, value),
            Err(_) => self.push(field, value.to_string()),
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, value);
    }
}

/// Forwards `tracing` events to a scopetel [`LoggerProvider`].
///
/// Each event becomes a [`LogRecord`] emitted by a logger named after the
/// event's target.
#[derive(Debug, Clone)]
pub struct ScopetelTracingBridge {
    provider: LoggerProvider,
}

impl ScopetelTracingBridge {
    /// Create a bridge emitting through `provider`.
    pub fn new(provider: &LoggerProvider) -> Self {
        ScopetelTracingBridge {
            provider: provider.clone(),
        }
    }
}

impl<S> Layer<S> for ScopetelTracingBridge
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        let meta = event.metadata();
        if meta.target().starts_with("scopetel") {
            return;
        }

        let severity = map_severity(meta.level());
        let logger = self.provider.logger(meta.target());
        if !logger.event_enabled(severity) {
            return;
        }

        let mut log_record = LogRecord::new(severity, meta.name());
        let mut visitor = EventVisitor {
            log_record: &mut log_record,
        };
        event.record(&mut visitor);
        logger.emit(log_record);
    }
}

fn map_severity(level: &Level) -> Severity {
    match *level {
        Level::ERROR => Severity::Error,
        Level::WARN => Severity::Warning,
        Level::INFO => Severity::Information,
        Level::DEBUG => Severity::Debug,
        _ => Severity::Trace,
    }
}
