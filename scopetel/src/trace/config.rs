//! Tracer configuration
//!
//! Overrides can be set for the default span limits, the sampler and the id
//! generator.
use crate::env;
use crate::trace::{IdGenerator, RandomIdGenerator, Sampler, ShouldSample};

pub(crate) const DEFAULT_MAX_EVENT_PER_SPAN: u32 = 128;
pub(crate) const DEFAULT_MAX_ATTRIBUTES_PER_SPAN: u32 = 128;
pub(crate) const DEFAULT_MAX_ATTRIBUTES_PER_EVENT: u32 = 128;

const OTEL_SPAN_ATTRIBUTE_COUNT_LIMIT: &str = "OTEL_SPAN_ATTRIBUTE_COUNT_LIMIT";
const OTEL_SPAN_EVENT_COUNT_LIMIT: &str = "OTEL_SPAN_EVENT_COUNT_LIMIT";
const OTEL_EVENT_ATTRIBUTE_COUNT_LIMIT: &str = "OTEL_EVENT_ATTRIBUTE_COUNT_LIMIT";

/// Limits on what a single span collects.
///
/// Anything over a limit is counted as dropped rather than rejected.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct SpanLimits {
    /// The max events that can be added to a `Span`.
    pub max_events_per_span: u32,
    /// The max attributes that can be added to a `Span`.
    pub max_attributes_per_span: u32,
    /// The max attributes that can be added into an `Event`
    pub max_attributes_per_event: u32,
}

impl Default for SpanLimits {
    fn default() -> Self {
        SpanLimits {
            max_events_per_span: DEFAULT_MAX_EVENT_PER_SPAN,
            max_attributes_per_span: DEFAULT_MAX_ATTRIBUTES_PER_SPAN,
            max_attributes_per_event: DEFAULT_MAX_ATTRIBUTES_PER_EVENT,
        }
    }
}

impl SpanLimits {
    /// Default limits overridden by `OTEL_SPAN_ATTRIBUTE_COUNT_LIMIT`,
    /// `OTEL_SPAN_EVENT_COUNT_LIMIT` and `OTEL_EVENT_ATTRIBUTE_COUNT_LIMIT`.
    pub fn from_env() -> Self {
        let mut limits = SpanLimits::default();
        if let Some(max) = env::parse(OTEL_SPAN_ATTRIBUTE_COUNT_LIMIT) {
            limits.max_attributes_per_span = max;
        }
        if let Some(max) = env::parse(OTEL_SPAN_EVENT_COUNT_LIMIT) {
            limits.max_events_per_span = max;
        }
        if let Some(max) = env::parse(OTEL_EVENT_ATTRIBUTE_COUNT_LIMIT) {
            limits.max_attributes_per_event = max;
        }
        limits
    }
}

/// Tracer configuration
#[derive(Debug)]
#[non_exhaustive]
pub struct Config {
    /// The sampler consulted for new traces
    pub sampler: Box<dyn ShouldSample>,

    /// The id generator for trace and span ids
    pub id_generator: Box<dyn IdGenerator>,

    /// span limits
    pub span_limits: SpanLimits,
}

impl Default for Config {
    /// Samples every trace, uses random ids and reads span limits from the
    /// environment.
    fn default() -> Self {
        Config {
            sampler: Box::new(Sampler::ParentBased(Box::new(Sampler::AlwaysOn))),
            id_generator: Box::<RandomIdGenerator>::default(),
            span_limits: SpanLimits::from_env(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_limits_from_env() {
        temp_env::with_vars(
            [
                (OTEL_SPAN_ATTRIBUTE_COUNT_LIMIT, Some("4")),
                (OTEL_SPAN_EVENT_COUNT_LIMIT, Some("not-a-number")),
                (OTEL_EVENT_ATTRIBUTE_COUNT_LIMIT, None),
            ],
            || {
                let limits = SpanLimits::from_env();
                assert_eq!(limits.max_attributes_per_span, 4);
                assert_eq!(limits.max_events_per_span, DEFAULT_MAX_EVENT_PER_SPAN);
                assert_eq!(
                    limits.max_attributes_per_event,
                    DEFAULT_MAX_ATTRIBUTES_PER_EVENT
                );
            },
        );
    }
}
