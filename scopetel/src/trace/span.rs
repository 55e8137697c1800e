//! # Span
//!
//! A `Span` represents a single operation within a trace. Spans nest to form
//! a trace tree: each trace has a root span, typically describing the
//! end-to-end latency of one unit of work, and optionally child spans for its
//! sub-operations.
//!
//! A span is owned by the code performing the operation. Tags, events and the
//! status can be changed until [`Span::end`] is called; afterwards every
//! mutation fails with [`InvalidStateError`]. Spans that were not sampled keep
//! their identity, so children link to them, but accept mutations as no-ops
//! and are never exported.
use crate::baggage::Baggage;
use crate::common::KeyValue;
use crate::trace::export::{Event, SpanData, SpanEvents};
use crate::trace::{
    InvalidStateError, SpanContext, SpanId, SpanKind, SpanLimits, Status, Tracer,
};
use std::borrow::Cow;
use std::error::Error;
use std::time::{Instant, SystemTime};

/// Event name used by [`Span::record_error`].
pub const EXCEPTION_EVENT_NAME: &str = "exception";
/// Attribute holding the error's type on an `exception` event.
pub const EXCEPTION_TYPE: &str = "exception.type";
/// Attribute holding the error's message on an `exception` event.
pub const EXCEPTION_MESSAGE: &str = "exception.message";

/// Single operation within a trace.
#[derive(Debug)]
pub struct Span {
    span_context: SpanContext,
    baggage: Baggage,
    data: Option<SpanRecord>,
    ended: bool,
    tracer: Tracer,
    span_limits: SpanLimits,
}

/// What a recording span collects before it ends.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SpanRecord {
    pub(crate) parent_span_id: SpanId,
    pub(crate) parent_span_is_remote: bool,
    pub(crate) span_kind: SpanKind,
    pub(crate) name: Cow<'static, str>,
    pub(crate) start_time: SystemTime,
    /// Monotonic start, so `end_time` can never precede `start_time`.
    pub(crate) started: Instant,
    pub(crate) attributes: Vec<KeyValue>,
    pub(crate) dropped_attributes_count: u32,
    pub(crate) events: SpanEvents,
    pub(crate) status: Status,
}

impl Span {
    pub(crate) fn new(
        span_context: SpanContext,
        baggage: Baggage,
        data: Option<SpanRecord>,
        tracer: Tracer,
        span_limits: SpanLimits,
    ) -> Self {
        Span {
            span_context,
            baggage,
            data,
            ended: false,
            tracer,
            span_limits,
        }
    }

    /// Returns the `SpanContext` for the given `Span`.
    pub fn span_context(&self) -> &SpanContext {
        &self.span_context
    }

    /// The baggage this span was started with.
    ///
    /// Entries added to the ambient context after the span started are not
    /// visible here.
    pub fn baggage(&self) -> &Baggage {
        &self.baggage
    }

    /// Returns `true` if this span collects tags, events and status.
    ///
    /// Always returns false after the span has ended.
    pub fn is_recording(&self) -> bool {
        !self.ended && self.data.is_some()
    }

    /// Returns `true` once [`Span::end`] was called.
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    fn with_data<F>(&mut self, operation: &'static str, f: F) -> Result<(), InvalidStateError>
    where
        F: FnOnce(&mut SpanRecord, &SpanLimits),
    {
        if self.ended {
            return Err(InvalidStateError::new(self.span_context.span_id(), operation));
        }
        if let Some(data) = self.data.as_mut() {
            f(data, &self.span_limits);
        }
        Ok(())
    }

    /// Records an event in the context of this span.
    ///
    /// Events beyond the span's event limit, and event attributes beyond the
    /// per-event limit, are counted as dropped.
    pub fn add_event<T>(
        &mut self,
        name: T,
        attributes: Vec<KeyValue>,
    ) -> Result<(), InvalidStateError>
    where
        T: Into<Cow<'static, str>>,
    {
        self.add_event_with_timestamp(name, SystemTime::now(), attributes)
    }

    /// Records an event at a specific time.
    pub fn add_event_with_timestamp<T>(
        &mut self,
        name: T,
        timestamp: SystemTime,
        attributes: Vec<KeyValue>,
    ) -> Result<(), InvalidStateError>
    where
        T: Into<Cow<'static, str>>,
    {
        self.with_data("add_event", |data, limits| {
            data_add_event(
                data,
                name.into(),
                timestamp,
                attributes,
                limits.max_events_per_span as usize,
                limits.max_attributes_per_event as usize,
            )
        })
    }

    /// Sets a single tag. An existing tag with the same key is replaced;
    /// tags with an empty key are ignored.
    pub fn set_attribute(&mut self, attribute: KeyValue) -> Result<(), InvalidStateError> {
        self.with_data("set_attribute", |data, limits| {
            data_set_attribute(data, attribute, limits.max_attributes_per_span as usize)
        })
    }

    /// Sets several tags at once.
    pub fn set_attributes<I>(&mut self, attributes: I) -> Result<(), InvalidStateError>
    where
        I: IntoIterator<Item = KeyValue>,
    {
        self.with_data("set_attributes", |data, limits| {
            for attribute in attributes {
                data_set_attribute(data, attribute, limits.max_attributes_per_span as usize);
            }
        })
    }

    /// Sets the status of this `Span`.
    ///
    /// `Ok` is final. Setting `Unset` has no effect, and a later `Error`
    /// replaces an earlier one.
    pub fn set_status(&mut self, status: Status) -> Result<(), InvalidStateError> {
        self.with_data("set_status", |data, _| {
            if matches!(data.status, Status::Ok { .. }) || status == Status::Unset {
                return;
            }
            data.status = status;
        })
    }

    /// Marks the span as failed with `err`.
    ///
    /// Sets an `Error` status carrying the error message and records an
    /// `exception` event with `exception.message` and `exception.type`, the
    /// full type path of `E`.
    pub fn record_error<E>(&mut self, err: &E) -> Result<(), InvalidStateError>
    where
        E: Error + ?Sized,
    {
        let message = err.to_string();
        let error_type = std::any::type_name::<E>();
        self.add_event(
            EXCEPTION_EVENT_NAME,
            vec![
                KeyValue::new(EXCEPTION_TYPE, error_type),
                KeyValue::new(EXCEPTION_MESSAGE, message.clone()),
            ],
        )?;
        self.set_status(Status::error(message))
    }

    /// Updates the span's name.
    pub fn update_name<T>(&mut self, new_name: T) -> Result<(), InvalidStateError>
    where
        T: Into<Cow<'static, str>>,
    {
        self.with_data("update_name", |data, _| data.name = new_name.into())
    }

    /// Ends the span and, if it is recording, hands it to the span
    /// processors.
    ///
    /// Never blocks on export. Ending a span twice fails.
    pub fn end(&mut self) -> Result<(), InvalidStateError> {
        if self.ended {
            return Err(InvalidStateError::new(self.span_context.span_id(), "end"));
        }
        self.ended = true;
        if let Some(data) = self.data.take() {
            end_and_export_span(data, self.span_context.clone(), &self.tracer);
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn record(&self) -> Option<&SpanRecord> {
        self.data.as_ref()
    }
}

impl Drop for Span {
    /// Ends spans that were never ended explicitly.
    fn drop(&mut self) {
        if !self.ended {
            let _ = self.end();
        }
    }
}

fn data_set_attribute(data: &mut SpanRecord, attribute: KeyValue, span_attribute_limit: usize) {
    if attribute.key.is_empty() {
        return;
    }
    if let Some(existing) = data
        .attributes
        .iter_mut()
        .find(|kv| kv.key == attribute.key)
    {
        existing.value = attribute.value;
    } else if data.attributes.len() < span_attribute_limit {
        data.attributes.push(attribute);
    } else {
        data.dropped_attributes_count += 1;
    }
}

fn data_add_event(
    data: &mut SpanRecord,
    name: Cow<'static, str>,
    timestamp: SystemTime,
    mut attributes: Vec<KeyValue>,
    span_events_limit: usize,
    event_attributes_limit: usize,
) {
    if data.events.len() < span_events_limit {
        let dropped_attributes_count = attributes.len().saturating_sub(event_attributes_limit);
        attributes.truncate(event_attributes_limit);

        data.events.events.push(Event::new(
            name,
            timestamp,
            attributes,
            dropped_attributes_count as u32,
        ));
    } else {
        data.events.dropped_count += 1;
    }
}

fn end_and_export_span(data: SpanRecord, span_context: SpanContext, tracer: &Tracer) {
    let provider = tracer.provider();
    // skip if provider has been shut down
    if provider.is_shutdown() {
        return;
    }

    let end_time = data.start_time + data.started.elapsed();
    let span_data = SpanData {
        span_context,
        parent_span_id: data.parent_span_id,
        parent_span_is_remote: data.parent_span_is_remote,
        span_kind: data.span_kind,
        name: data.name,
        start_time: data.start_time,
        end_time,
        attributes: data.attributes,
        dropped_attributes_count: data.dropped_attributes_count,
        events: data.events,
        status: data.status,
        instrumentation_scope: tracer.instrumentation_scope().clone(),
        resource: provider.resource(),
    };

    match provider.span_processors() {
        [] => {}
        [processor] => processor.on_end(span_data),
        processors => {
            for processor in processors {
                processor.on_end(span_data.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{InMemorySpanExporter, Sampler, SpanLimits, TracerProvider};
    use crate::Context;
    use std::fmt;

    #[derive(Debug)]
    struct ForecastUnavailable;

    impl fmt::Display for ForecastUnavailable {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("forecast service unavailable")
        }
    }

    impl Error for ForecastUnavailable {}

    fn test_provider(limits: SpanLimits) -> (TracerProvider, InMemorySpanExporter) {
        let exporter = InMemorySpanExporter::default();
        let provider = TracerProvider::builder()
            .with_span_limits(limits)
            .with_batch_exporter(exporter.clone())
            .build();
        (provider, exporter)
    }

    fn finished(provider: &TracerProvider, exporter: &InMemorySpanExporter) -> Vec<SpanData> {
        provider.force_flush().unwrap();
        exporter.get_finished_spans().unwrap()
    }

    #[test]
    fn mutations_after_end_fail() {
        let (provider, _exporter) = test_provider(SpanLimits::default());
        let tracer = provider.tracer("test");
        let mut span = tracer.start("op");
        let span_id = span.span_context().span_id();
        assert!(span.end().is_ok());
        assert!(!span.is_recording());

        let err = span.end().unwrap_err();
        assert_eq!(err.span_id(), span_id);
        assert_eq!(err.operation(), "end");
        assert_eq!(
            span.set_attribute(KeyValue::new("k", "v")).unwrap_err().operation(),
            "set_attribute"
        );
        assert!(span.add_event("late", vec![]).is_err());
        assert!(span.set_status(Status::ok("")).is_err());
        assert!(span.record_error(&ForecastUnavailable).is_err());
    }

    #[test]
    fn non_recording_span_accepts_mutations() {
        let exporter = InMemorySpanExporter::default();
        let provider = TracerProvider::builder()
            .with_sampler(Sampler::AlwaysOff)
            .with_batch_exporter(exporter.clone())
            .build();
        let tracer = provider.tracer("test");
        let mut span = tracer.start("op");
        assert!(span.span_context().is_valid());
        assert!(!span.is_recording());
        assert!(span.set_attribute(KeyValue::new("k", "v")).is_ok());
        assert!(span.add_event("e", vec![]).is_ok());
        assert!(span.end().is_ok());
        assert!(span.end().is_err());
        assert!(finished(&provider, &exporter).is_empty());
    }

    #[test]
    fn set_attribute_replaces_and_limits() {
        let limits = SpanLimits {
            max_attributes_per_span: 2,
            ..SpanLimits::default()
        };
        let (provider, exporter) = test_provider(limits);
        let tracer = provider.tracer("test");
        let mut span = tracer.start("op");
        span.set_attribute(KeyValue::new("forecast.count", 3)).unwrap();
        span.set_attribute(KeyValue::new("forecast.count", 5)).unwrap();
        span.set_attribute(KeyValue::new("", "ignored")).unwrap();
        span.set_attribute(KeyValue::new("elapsed_ms", 12)).unwrap();
        span.set_attribute(KeyValue::new("over", "limit")).unwrap();
        span.end().unwrap();

        let spans = finished(&provider, &exporter);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].attributes.len(), 2);
        assert_eq!(spans[0].attribute("forecast.count"), Some(&crate::Value::I64(5)));
        assert_eq!(spans[0].dropped_attributes_count, 1);
    }

    #[test]
    fn event_limits() {
        let limits = SpanLimits {
            max_events_per_span: 1,
            max_attributes_per_event: 1,
            ..SpanLimits::default()
        };
        let (provider, exporter) = test_provider(limits);
        let tracer = provider.tracer("test");
        let mut span = tracer.start("op");
        span.add_event(
            "forecast.generate.start",
            vec![KeyValue::new("a", 1), KeyValue::new("b", 2)],
        )
        .unwrap();
        span.add_event("forecast.generate.end", vec![]).unwrap();
        span.end().unwrap();

        let spans = finished(&provider, &exporter);
        let events = &spans[0].events;
        assert_eq!(events.len(), 1);
        assert_eq!(events.dropped_count, 1);
        assert_eq!(events[0].name, "forecast.generate.start");
        assert_eq!(events[0].attributes.len(), 1);
        assert_eq!(events[0].dropped_attributes_count, 1);
    }

    #[test]
    fn status_transitions() {
        let (provider, _exporter) = test_provider(SpanLimits::default());
        let tracer = provider.tracer("test");
        let mut span = tracer.start("op");

        span.set_status(Status::error("first")).unwrap();
        span.set_status(Status::error("second")).unwrap();
        assert_eq!(span.record().unwrap().status, Status::error("second"));

        span.set_status(Status::Unset).unwrap();
        assert_eq!(span.record().unwrap().status, Status::error("second"));

        span.set_status(Status::ok("Forecast generated successfully"))
            .unwrap();
        span.set_status(Status::error("too late")).unwrap();
        assert_eq!(
            span.record().unwrap().status,
            Status::ok("Forecast generated successfully")
        );
    }

    #[test]
    fn record_error_sets_status_and_exception_event() {
        let (provider, exporter) = test_provider(SpanLimits::default());
        let tracer = provider.tracer("test");
        let mut span = tracer.start("op");
        span.record_error(&ForecastUnavailable).unwrap();
        span.end().unwrap();

        let spans = finished(&provider, &exporter);
        let span = &spans[0];
        assert_eq!(span.status, Status::error("forecast service unavailable"));
        let event = &span.events[0];
        assert_eq!(event.name, EXCEPTION_EVENT_NAME);
        assert!(event.attributes.contains(&KeyValue::new(
            EXCEPTION_TYPE,
            "scopetel::trace::span::tests::ForecastUnavailable"
        )));
        assert!(event.attributes.contains(&KeyValue::new(
            EXCEPTION_MESSAGE,
            "forecast service unavailable"
        )));
    }

    #[test]
    fn drop_ends_span() {
        let (provider, exporter) = test_provider(SpanLimits::default());
        let tracer = provider.tracer("test");
        {
            let _span = tracer.start("dropped");
        }
        let spans = finished(&provider, &exporter);
        assert_eq!(spans.len(), 1);
        assert!(spans[0].end_time >= spans[0].start_time);
    }

    #[test]
    fn baggage_is_a_start_time_snapshot() {
        let (provider, _exporter) = test_provider(SpanLimits::default());
        let tracer = provider.tracer("test");
        let _guard = Context::current_with_baggage([("user.id", "42")]).attach();
        let before = tracer.start("before");
        assert!(Context::set_baggage("tenant", "acme"));
        let after = tracer.start("after");

        assert_eq!(before.baggage().get("user.id"), Some("42"));
        assert_eq!(before.baggage().get("tenant"), None);
        assert_eq!(after.baggage().get("tenant"), Some("acme"));
    }

    #[test]
    fn update_name_renames_until_end() {
        let (provider, exporter) = test_provider(SpanLimits::default());
        let tracer = provider.tracer("test");
        let mut span = tracer.start("GET");
        span.update_name("GET /weatherforecast").unwrap();
        span.end().unwrap();
        assert_eq!(
            span.update_name("too late").unwrap_err().operation(),
            "update_name"
        );

        let spans = finished(&provider, &exporter);
        assert_eq!(spans[0].name, "GET /weatherforecast");
    }

    #[test]
    fn exception_type_is_the_error_type_path() {
        let (provider, exporter) = test_provider(SpanLimits::default());
        let tracer = provider.tracer("test");
        let mut span = tracer.start("op");
        span.record_error(&std::io::Error::other("boom")).unwrap();
        span.end().unwrap();

        let spans = finished(&provider, &exporter);
        let exception_type = spans[0].events[0]
            .attributes
            .iter()
            .find(|kv| kv.key.as_str() == EXCEPTION_TYPE)
            .map(|kv| kv.value.to_string());
        assert_eq!(
            exception_type.as_deref(),
            Some(std::any::type_name::<std::io::Error>())
        );
        assert_ne!(exception_type.as_deref(), Some("Custom"));
    }
}
