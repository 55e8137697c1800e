use crate::common::{InstrumentationScope, KeyValue};
use crate::resource::Resource;
use crate::trace::{SpanContext, SpanId, TraceFlags, TraceId};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

/// The severity of a log record, ordered from least to most severe.
///
/// The numeric values follow the OpenTelemetry severity number ranges, one
/// value per range.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Fine-grained diagnostics, usually disabled.
    Trace = 1,
    /// Diagnostics useful while debugging.
    Debug = 5,
    /// Normal operation.
    Information = 9,
    /// Unexpected but handled situations.
    Warning = 13,
    /// Failed operations.
    Error = 17,
    /// Failures that need immediate attention.
    Critical = 21,
}

impl Severity {
    /// The display name of this severity.
    pub const fn name(&self) -> &'static str {
        match self {
            Severity::Trace => "Trace",
            Severity::Debug => "Debug",
            Severity::Information => "Information",
            Severity::Warning => "Warning",
            Severity::Error => "Error",
            Severity::Critical => "Critical",
        }
    }

    /// The severity number.
    pub const fn number(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Identifiers of the span that was current when a record was emitted.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TraceContext {
    /// Trace id of the span.
    pub trace_id: TraceId,
    /// Span id of the span.
    pub span_id: SpanId,
    /// Trace flags of the span; tells whether it was sampled.
    pub trace_flags: TraceFlags,
}

impl From<&SpanContext> for TraceContext {
    fn from(span_context: &SpanContext) -> Self {
        TraceContext {
            trace_id: span_context.trace_id(),
            span_id: span_context.span_id(),
            trace_flags: span_context.trace_flags(),
        }
    }
}

/// A structured log record.
///
/// The template keeps its `{name}` placeholders; the rendered message is
/// filled in from the fields when the record is emitted.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub struct LogRecord {
    /// Record timestamp. Set to the emission time if absent.
    pub timestamp: Option<SystemTime>,
    /// Record severity.
    pub severity: Severity,
    /// Message template, such as `"Generating {count} forecasts"`.
    pub template: Cow<'static, str>,
    /// Template rendered with the record's fields. Set on emission.
    pub message: Option<String>,
    /// Structured fields of the record.
    pub fields: Vec<KeyValue>,
    /// Correlation with the span that was current at emission. Taken from
    /// the ambient context if absent.
    pub trace_context: Option<TraceContext>,
}

impl LogRecord {
    /// Create a record without fields.
    pub fn new(severity: Severity, template: impl Into<Cow<'static, str>>) -> Self {
        LogRecord {
            timestamp: None,
            severity,
            template: template.into(),
            message: None,
            fields: Vec::new(),
            trace_context: None,
        }
    }

    /// Adds a structured field.
    pub fn with_field(mut self, field: KeyValue) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds structured fields.
    pub fn with_fields(mut self, fields: impl IntoIterator<Item = KeyValue>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Sets an explicit timestamp.
    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Looks up a field by key.
    pub fn field(&self, key: &str) -> Option<&crate::Value> {
        self.fields
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| &kv.value)
    }
}

/// An emitted record, together with where it came from. This is what log
/// processors and exporters receive.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct LogData {
    /// The record.
    pub record: LogRecord,
    /// Instrumentation scope of the logger that emitted the record.
    pub instrumentation_scope: InstrumentationScope,
    /// Resource of the logger provider.
    pub resource: Arc<Resource>,
}

/// Renders `template`, replacing each `{name}` placeholder with the value of
/// the field `name`.
///
/// `{{` and `}}` stand for literal braces. A leading `@` or `$` and any
/// `,alignment` or `:format` suffix inside a placeholder are ignored.
/// Placeholders without a matching field are kept as written.
pub(crate) fn render_template(template: &str, fields: &[KeyValue]) -> String {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(position) = rest.find(|c: char| c == '{' || c == '}') {
        rendered.push_str(&rest[..position]);
        let tail = &rest[position..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            rendered.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('}') {
            rendered.push('}');
            rest = &tail[1..];
            continue;
        }

        let Some(end) = tail.find('}') else {
            rendered.push_str(tail);
            return rendered;
        };
        let placeholder = &tail[1..end];
        let name = placeholder
            .trim_start_matches(|c: char| c == '@' || c == '$')
            .split(|c: char| c == ',' || c == ':')
            .next()
            .unwrap_or_default()
            .trim();
        match fields.iter().rev().find(|kv| kv.key.as_str() == name) {
            Some(kv) => rendered.push_str(&kv.value.as_str()),
            None => rendered.push_str(&tail[..=end]),
        }
        rest = &tail[end + 1..];
    }

    rendered.push_str(rest);
    rendered
}
