//! # Tracer
//!
//! The `Tracer` creates spans and makes them current. Span creation picks the
//! parent from an explicit [`Context`] or, by default, from the ambient
//! context of the calling thread or task.
//!
//! The sampler is consulted only when a new trace starts here, that is for
//! root spans and for children of remote parents. Children of a local span
//! inherit its decision.
use crate::common::{InstrumentationScope, KeyValue};
use crate::context::Context;
use crate::trace::export::SpanEvents;
use crate::trace::provider::TracerProvider;
use crate::trace::span::{Span, SpanRecord};
use crate::trace::{SamplingDecision, SpanContext, SpanId, SpanKind, SpanLimits, Status};
use std::borrow::Cow;
use std::fmt;
use std::time::{Instant, SystemTime};

/// Creates spans for one instrumentation scope.
#[derive(Clone)]
pub struct Tracer {
    scope: InstrumentationScope,
    provider: TracerProvider,
}

impl fmt::Debug for Tracer {
    /// Omitting `provider` here is necessary to avoid cycles.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("name", &self.scope.name())
            .field("version", &self.scope.version())
            .finish()
    }
}

impl Tracer {
    pub(crate) fn new(scope: InstrumentationScope, provider: TracerProvider) -> Self {
        Tracer { scope, provider }
    }

    /// TracerProvider associated with this tracer.
    pub(crate) fn provider(&self) -> &TracerProvider {
        &self.provider
    }

    /// Instrumentation scope of this tracer.
    pub fn instrumentation_scope(&self) -> &InstrumentationScope {
        &self.scope
    }

    /// Creates a span builder, for setting the kind, start time or initial
    /// tags before the span starts.
    pub fn span_builder<T>(&self, name: T) -> SpanBuilder
    where
        T: Into<Cow<'static, str>>,
    {
        SpanBuilder::from_name(name)
    }

    /// Starts an `Internal` span whose parent is the ambient current span.
    ///
    /// The span is not made current; see [`Tracer::in_span`] or
    /// [`Context::with_span`] for that.
    pub fn start<T>(&self, name: T) -> Span
    where
        T: Into<Cow<'static, str>>,
    {
        Context::map_current(|cx| self.start_with_context(name, cx))
    }

    /// Starts an `Internal` span whose parent is the span in `parent_cx`.
    pub fn start_with_context<T>(&self, name: T, parent_cx: &Context) -> Span
    where
        T: Into<Cow<'static, str>>,
    {
        self.build_with_context(SpanBuilder::from_name(name), parent_cx)
    }

    /// Starts a span of kind `Internal` and makes it the ambient current span
    /// while `f` runs.
    ///
    /// The previous context is restored when `f` returns or unwinds, and the
    /// span is ended if `f` did not end it.
    ///
    /// # Examples
    ///
    /// ```
    /// use scopetel::trace::{Status, TracerProvider};
    /// use scopetel::Context;
    ///
    /// let provider = TracerProvider::builder().build();
    /// let tracer = provider.tracer("my-component");
    ///
    /// tracer.in_span("parent", |_span| {
    ///     tracer.in_span("child", |span| {
    ///         assert!(Context::current().has_active_span());
    ///         span.set_status(Status::ok("done")).unwrap();
    ///     });
    /// });
    /// ```
    pub fn in_span<T, F, N>(&self, name: N, f: F) -> T
    where
        F: FnOnce(&mut Span) -> T,
        N: Into<Cow<'static, str>>,
    {
        self.in_span_with_builder(SpanBuilder::from_name(name), f)
    }

    /// Same as [`Tracer::in_span`] with an explicit [`SpanKind`], e.g.
    /// `Server` for the span covering an inbound request.
    pub fn in_span_with_kind<T, F, N>(&self, name: N, kind: SpanKind, f: F) -> T
    where
        F: FnOnce(&mut Span) -> T,
        N: Into<Cow<'static, str>>,
    {
        self.in_span_with_builder(SpanBuilder::from_name(name).with_kind(kind), f)
    }

    /// Same as [`Tracer::in_span`], starting the span from `builder`.
    pub fn in_span_with_builder<T, F>(&self, builder: SpanBuilder, f: F) -> T
    where
        F: FnOnce(&mut Span) -> T,
    {
        let parent_cx = Context::current();
        let mut span = self.build_with_context(builder, &parent_cx);
        let result = {
            let _guard = parent_cx.with_span(&span).attach();
            f(&mut span)
        };
        if !span.is_ended() {
            let _ = span.end();
        }
        result
    }

    /// Starts a span from a `SpanBuilder`, with the span in `parent_cx` as
    /// parent.
    ///
    /// Spans started in a telemetry-suppressed context or after the provider
    /// shut down are non-recording and carry no identity.
    pub fn build_with_context(&self, builder: SpanBuilder, parent_cx: &Context) -> Span {
        let provider = self.provider();
        if parent_cx.is_telemetry_suppressed() || provider.is_shutdown() {
            return Span::new(
                SpanContext::empty_context(),
                parent_cx.baggage().clone(),
                None,
                self.clone(),
                SpanLimits::default(),
            );
        }

        let config = provider.config();
        let span_kind = builder.span_kind.clone().unwrap_or_default();
        let parent = parent_cx
            .span_context()
            .filter(|parent| parent.is_valid());

        let (trace_id, decision) = match parent {
            Some(parent) if !parent.is_remote() => {
                let inherited = if parent.is_sampled() {
                    SamplingDecision::RecordAndSample
                } else {
                    SamplingDecision::Drop
                };
                (parent.trace_id(), inherited)
            }
            Some(parent) => {
                let decision = config.sampler.should_sample(
                    Some(parent),
                    parent.trace_id(),
                    &builder.name,
                    &span_kind,
                );
                (parent.trace_id(), decision)
            }
            None => {
                let trace_id = config.id_generator.new_trace_id();
                let decision = config
                    .sampler
                    .should_sample(None, trace_id, &builder.name, &span_kind);
                (trace_id, decision)
            }
        };

        let span_id = config.id_generator.new_span_id();
        let sampled = decision == SamplingDecision::RecordAndSample;
        let trace_flags = parent
            .map(SpanContext::trace_flags)
            .unwrap_or_default()
            .with_sampled(sampled);
        let span_context = SpanContext::new(trace_id, span_id, trace_flags, false);
        let span_limits = config.span_limits;

        let data = sampled.then(|| {
            let (parent_span_id, parent_span_is_remote) = parent
                .map(|p| (p.span_id(), p.is_remote()))
                .unwrap_or((SpanId::INVALID, false));
            build_record(builder, span_kind, parent_span_id, parent_span_is_remote, &span_limits)
        });

        Span::new(
            span_context,
            parent_cx.baggage().clone(),
            data,
            self.clone(),
            span_limits,
        )
    }
}

fn build_record(
    builder: SpanBuilder,
    span_kind: SpanKind,
    parent_span_id: SpanId,
    parent_span_is_remote: bool,
    span_limits: &SpanLimits,
) -> SpanRecord {
    let SpanBuilder {
        name,
        attributes: initial_attributes,
        start_time,
        ..
    } = builder;

    let mut attributes: Vec<KeyValue> = Vec::new();
    let mut dropped_attributes_count = 0u32;
    for attribute in initial_attributes
        .unwrap_or_default()
        .into_iter()
        .filter(|kv| !kv.key.is_empty())
    {
        if let Some(existing) = attributes.iter_mut().find(|kv| kv.key == attribute.key) {
            existing.value = attribute.value;
        } else if attributes.len() < span_limits.max_attributes_per_span as usize {
            attributes.push(attribute);
        } else {
            dropped_attributes_count += 1;
        }
    }

    // A caller-supplied start time is kept as is; the duration is still
    // measured from now.
    let start_time = start_time.unwrap_or_else(SystemTime::now);

    SpanRecord {
        parent_span_id,
        parent_span_is_remote,
        span_kind,
        name,
        start_time,
        started: Instant::now(),
        attributes,
        dropped_attributes_count,
        events: SpanEvents::default(),
        status: Status::Unset,
    }
}

/// `SpanBuilder` allows span attributes to be configured before the span
/// has started.
///
/// ```
/// use scopetel::trace::{SpanKind, TracerProvider};
/// use scopetel::KeyValue;
///
/// let provider = TracerProvider::builder().build();
/// let tracer = provider.tracer("my-component");
///
/// let span = tracer
///     .span_builder("GET /weatherforecast")
///     .with_kind(SpanKind::Server)
///     .with_attributes([KeyValue::new("http.method", "GET")])
///     .start(&tracer);
/// # drop(span);
/// ```
#[derive(Clone, Debug, Default)]
pub struct SpanBuilder {
    /// Span name
    pub name: Cow<'static, str>,

    /// Span kind, `Internal` if unset
    pub span_kind: Option<SpanKind>,

    /// Span attributes that are provided at the span creation time.
    pub attributes: Option<Vec<KeyValue>>,

    /// Span start time, now if unset
    pub start_time: Option<SystemTime>,
}

impl SpanBuilder {
    /// Create a new span builder from a span name
    pub fn from_name<T: Into<Cow<'static, str>>>(name: T) -> Self {
        SpanBuilder {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Assign span kind
    pub fn with_kind(self, span_kind: SpanKind) -> Self {
        SpanBuilder {
            span_kind: Some(span_kind),
            ..self
        }
    }

    /// Assign span attributes from an iterable.
    pub fn with_attributes<I>(self, attributes: I) -> Self
    where
        I: IntoIterator<Item = KeyValue>,
    {
        SpanBuilder {
            attributes: Some(attributes.into_iter().collect()),
            ..self
        }
    }

    /// Assign span start time
    pub fn with_start_time<T: Into<SystemTime>>(self, start_time: T) -> Self {
        SpanBuilder {
            start_time: Some(start_time.into()),
            ..self
        }
    }

    /// Builds a span with the given tracer from this configuration, with the
    /// ambient current span as parent.
    pub fn start(self, tracer: &Tracer) -> Span {
        Context::map_current(|cx| tracer.build_with_context(self, cx))
    }

    /// Builds a span with the given tracer from this configuration and parent.
    pub fn start_with_context(self, tracer: &Tracer, parent_cx: &Context) -> Span {
        tracer.build_with_context(self, parent_cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{
        IncrementIdGenerator, InMemorySpanExporter, Sampler, SpanData, TraceFlags, TraceId,
        TracerProvider,
    };

    fn provider_with(sampler: Sampler) -> (TracerProvider, InMemorySpanExporter) {
        let exporter = InMemorySpanExporter::default();
        let provider = TracerProvider::builder()
            .with_sampler(sampler)
            .with_batch_exporter(exporter.clone())
            .build();
        (provider, exporter)
    }

    fn finished(provider: &TracerProvider, exporter: &InMemorySpanExporter) -> Vec<SpanData> {
        provider.force_flush().unwrap();
        exporter.get_finished_spans().unwrap()
    }

    #[test]
    fn child_shares_trace_and_links_to_parent() {
        let (provider, exporter) = provider_with(Sampler::AlwaysOn);
        let tracer = provider.tracer("test");

        let (root_cx, child_cx) = tracer.in_span_with_kind("A", SpanKind::Server, |root| {
            let root_cx = root.span_context().clone();
            let child_cx = tracer.in_span("B", |child| child.span_context().clone());
            (root_cx, child_cx)
        });

        assert_eq!(root_cx.trace_id(), child_cx.trace_id());
        assert_ne!(root_cx.span_id(), child_cx.span_id());

        let spans = finished(&provider, &exporter);
        assert_eq!(spans.len(), 2);
        let child = spans.iter().find(|s| s.name == "B").unwrap();
        let root = spans.iter().find(|s| s.name == "A").unwrap();
        assert_eq!(child.parent_span_id, root.span_context.span_id());
        assert_eq!(root.parent_span_id, SpanId::INVALID);
        assert_eq!(root.span_kind, SpanKind::Server);
        assert_eq!(child.span_kind, SpanKind::Internal);
    }

    #[test]
    fn in_span_restores_previous_context() {
        let (provider, _exporter) = provider_with(Sampler::AlwaysOn);
        let tracer = provider.tracer("test");
        assert!(!Context::current().has_active_span());
        tracer.in_span("outer", |outer| {
            let outer_id = outer.span_context().span_id();
            tracer.in_span("inner", |_| {});
            let current = Context::current();
            assert_eq!(current.span_context().map(|sc| sc.span_id()), Some(outer_id));
        });
        assert!(!Context::current().has_active_span());
    }

    #[test]
    fn in_span_restores_context_on_panic() {
        let (provider, _exporter) = provider_with(Sampler::AlwaysOn);
        let tracer = provider.tracer("test");
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            tracer.in_span("failing", |_| panic!("handler fault"));
        }));
        assert!(result.is_err());
        assert!(!Context::current().has_active_span());
    }

    #[test]
    fn in_span_does_not_double_end() {
        let (provider, exporter) = provider_with(Sampler::AlwaysOn);
        let tracer = provider.tracer("test");
        tracer.in_span("explicit", |span| span.end().unwrap());
        assert_eq!(finished(&provider, &exporter).len(), 1);
    }

    #[test]
    fn local_children_inherit_sampling() {
        let (provider, exporter) = provider_with(Sampler::AlwaysOff);
        let tracer = provider.tracer("test");
        tracer.in_span("root", |root| {
            assert!(!root.is_recording());
            assert!(!root.span_context().is_sampled());
            tracer.in_span("child", |child| {
                assert!(!child.is_recording());
                assert_eq!(child.span_context().trace_id(), root.span_context().trace_id());
            });
        });
        assert!(finished(&provider, &exporter).is_empty());
    }

    #[test]
    fn remote_parent_consults_parent_based_sampler() {
        let (provider, _exporter) =
            provider_with(Sampler::ParentBased(Box::new(Sampler::AlwaysOff)));
        let tracer = provider.tracer("test");
        let remote = SpanContext::new(
            TraceId::from(0x42_u128),
            SpanId::from(0x7_u64),
            TraceFlags::SAMPLED,
            true,
        );
        let cx = Context::new().with_remote_span_context(remote.clone());
        let span = tracer.start_with_context("downstream", &cx);
        assert!(span.is_recording());
        assert_eq!(span.span_context().trace_id(), remote.trace_id());
        assert!(!span.span_context().is_remote());
        let record = span.record().unwrap();
        assert_eq!(record.parent_span_id, remote.span_id());
        assert!(record.parent_span_is_remote);
    }

    #[test]
    fn suppressed_context_yields_non_recording_span() {
        let (provider, _exporter) = provider_with(Sampler::AlwaysOn);
        let tracer = provider.tracer("test");
        let _guard = Context::enter_telemetry_suppressed_scope();
        let span = tracer.start("suppressed");
        assert!(!span.is_recording());
        assert!(!span.span_context().is_valid());
    }

    #[test]
    fn builder_attributes_respect_limits() {
        let exporter = InMemorySpanExporter::default();
        let provider = TracerProvider::builder()
            .with_span_limits(SpanLimits {
                max_attributes_per_span: 1,
                ..SpanLimits::default()
            })
            .with_batch_exporter(exporter.clone())
            .build();
        let tracer = provider.tracer("test");
        let mut span = tracer
            .span_builder("op")
            .with_attributes([KeyValue::new("a", 1), KeyValue::new("b", 2)])
            .start(&tracer);
        span.end().unwrap();
        let spans = finished(&provider, &exporter);
        assert_eq!(spans[0].attributes, vec![KeyValue::new("a", 1)]);
        assert_eq!(spans[0].dropped_attributes_count, 1);
    }

    #[test]
    fn id_generator_is_used() {
        let exporter = InMemorySpanExporter::default();
        let provider = TracerProvider::builder()
            .with_id_generator(IncrementIdGenerator::new())
            .with_batch_exporter(exporter.clone())
            .build();
        let tracer = provider.tracer("test");
        let span = tracer.start("op");
        assert_eq!(span.span_context().trace_id(), TraceId::from(1_u128));
        assert_eq!(span.span_context().span_id(), SpanId::from(2_u64));
    }
}
