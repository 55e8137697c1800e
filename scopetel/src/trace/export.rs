//! Trace exporters
use crate::common::{InstrumentationScope, KeyValue};
use crate::export::ExportResult;
use crate::resource::Resource;
use crate::trace::{SpanContext, SpanId, SpanKind, Status};
use futures_util::future::BoxFuture;
use std::borrow::Cow;
use std::fmt::Debug;
use std::ops::Deref;
use std::sync::Arc;
use std::time::SystemTime;

/// `SpanExporter` defines the interface that protocol-specific exporters must
/// implement so that they can be plugged into a [`BatchSpanProcessor`].
///
/// Exporters are driven from a single worker thread, one batch at a time.
/// A failed export is retried by the processor, so exporters report failures
/// through the returned [`ExportResult`] and do not retry on their own.
///
/// [`BatchSpanProcessor`]: crate::trace::BatchSpanProcessor
pub trait SpanExporter: Send + Sync + Debug {
    /// Exports a batch of readable spans.
    ///
    /// The processor may call `export` again with a clone of the same batch
    /// if the returned future resolves to an error.
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult>;

    /// Shuts down the exporter. Called once, after the final export.
    fn shutdown(&mut self) -> ExportResult {
        Ok(())
    }
}

/// A time-stamped annotation recorded on a span.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub struct Event {
    /// The name of this event.
    pub name: Cow<'static, str>,
    /// The time at which this event occurred.
    pub timestamp: SystemTime,
    /// Attributes that describe this event.
    pub attributes: Vec<KeyValue>,
    /// The number of attributes that were above the configured limit, and thus
    /// dropped.
    pub dropped_attributes_count: u32,
}

impl Event {
    /// Create new `Event`
    pub fn new<T: Into<Cow<'static, str>>>(
        name: T,
        timestamp: SystemTime,
        attributes: Vec<KeyValue>,
        dropped_attributes_count: u32,
    ) -> Self {
        Event {
            name: name.into(),
            timestamp,
            attributes,
            dropped_attributes_count,
        }
    }
}

/// Stores span events along with dropped count.
#[derive(Clone, Debug, Default, PartialEq)]
#[non_exhaustive]
pub struct SpanEvents {
    /// The events stored as a vector, in the order they were added.
    pub events: Vec<Event>,
    /// The number of events dropped from the span.
    pub dropped_count: u32,
}

impl Deref for SpanEvents {
    type Target = [Event];

    fn deref(&self) -> &Self::Target {
        &self.events
    }
}

impl IntoIterator for SpanEvents {
    type Item = Event;
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}

/// A finished, sampled span as handed to exporters.
#[derive(Clone, Debug, PartialEq)]
pub struct SpanData {
    /// Exportable `SpanContext`
    pub span_context: SpanContext,
    /// Span parent id, [`SpanId::INVALID`] for root spans
    pub parent_span_id: SpanId,
    /// Whether the parent was propagated from another process
    pub parent_span_is_remote: bool,
    /// Span kind
    pub span_kind: SpanKind,
    /// Span name
    pub name: Cow<'static, str>,
    /// Span start time
    pub start_time: SystemTime,
    /// Span end time, never before `start_time`
    pub end_time: SystemTime,
    /// Span attributes
    pub attributes: Vec<KeyValue>,
    /// The number of attributes that were above the configured limit, and thus
    /// dropped.
    pub dropped_attributes_count: u32,
    /// Span events
    pub events: SpanEvents,
    /// Span status
    pub status: Status,
    /// Instrumentation scope that produced this span
    pub instrumentation_scope: InstrumentationScope,
    /// Resource of the process that produced this span
    pub resource: Arc<Resource>,
}

impl SpanData {
    /// Returns the value of the attribute `key`, if set.
    pub fn attribute(&self, key: &str) -> Option<&crate::Value> {
        self.attributes
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| &kv.value)
    }
}
