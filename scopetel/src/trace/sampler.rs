use crate::trace::{SpanContext, SpanKind, TraceId};
use std::fmt;

/// Decision about whether a span is recorded and exported.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SamplingDecision {
    /// The span is non-recording: it keeps parent/child linkage but collects
    /// nothing and is never exported.
    Drop,
    /// The span records tags, events and status and is exported when it ends.
    RecordAndSample,
}

/// Decides, for a new trace, whether its spans are recorded.
///
/// The tracer consults the sampler only for root spans and for children of
/// remote parents. Children of a local span always inherit that span's
/// decision, so a trace is either recorded as a whole or not at all within one
/// process.
pub trait ShouldSample: Send + Sync + fmt::Debug {
    /// Returns the [`SamplingDecision`] for a span about to be created.
    ///
    /// `parent` is the parent's span identity, if the span has one.
    fn should_sample(
        &self,
        parent: Option<&SpanContext>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
    ) -> SamplingDecision;
}

/// Built-in samplers.
///
/// The usual composition for a service is
/// `ParentBased(Box::new(TraceIdRatioBased(ratio)))`: honour the upstream
/// caller's decision if there is one, otherwise keep `ratio` of new traces.
#[derive(Clone, Debug)]
pub enum Sampler {
    /// Always sample the trace
    AlwaysOn,
    /// Never sample the trace
    AlwaysOff,
    /// Respects the parent span's sampling decision or delegates a delegate sampler for root spans.
    ParentBased(Box<Sampler>),
    /// Sample a given fraction of traces. Fractions >= 1 will always sample.
    /// If the parent span is sampled, then it's child spans will automatically
    /// be sampled. Fractions < 0 are treated as zero, but spans may still be
    /// sampled if their parent is.
    ///
    /// The decision is a deterministic function of the low 63 bits of the
    /// trace id, so every process applying the same ratio to the same trace
    /// agrees.
    TraceIdRatioBased(f64),
}

impl ShouldSample for Sampler {
    fn should_sample(
        &self,
        parent: Option<&SpanContext>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
    ) -> SamplingDecision {
        match self {
            Sampler::AlwaysOn => SamplingDecision::RecordAndSample,
            Sampler::AlwaysOff => SamplingDecision::Drop,
            // The parent decision if there is a valid parent; otherwise the delegate's
            Sampler::ParentBased(delegate_sampler) => {
                match parent.filter(|parent| parent.is_valid()) {
                    Some(parent) if parent.is_sampled() => SamplingDecision::RecordAndSample,
                    Some(_) => SamplingDecision::Drop,
                    None => delegate_sampler.should_sample(parent, trace_id, name, span_kind),
                }
            }
            Sampler::TraceIdRatioBased(prob) => sample_based_on_probability(prob, trace_id),
        }
    }
}

pub(crate) fn sample_based_on_probability(prob: &f64, trace_id: TraceId) -> SamplingDecision {
    if *prob >= 1.0 {
        SamplingDecision::RecordAndSample
    } else {
        let prob_upper_bound = (prob.max(0.0) * (1u64 << 63) as f64) as u64;
        let bytes = trace_id.to_bytes();
        let mut low = [0u8; 8];
        low.copy_from_slice(&bytes[8..]);
        let rnd_from_trace_id = u64::from_be_bytes(low) >> 1;

        if rnd_from_trace_id < prob_upper_bound {
            SamplingDecision::RecordAndSample
        } else {
            SamplingDecision::Drop
        }
    }
}
