use crate::trace::SpanId;
use thiserror::Error;

/// Returned when a span is used after it has ended.
///
/// This always indicates a bug in the instrumented code, so it is surfaced
/// synchronously instead of being logged.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot {operation} span {span_id}: span has already ended")]
pub struct InvalidStateError {
    span_id: SpanId,
    operation: &'static str,
}

impl InvalidStateError {
    pub(crate) fn new(span_id: SpanId, operation: &'static str) -> Self {
        InvalidStateError { span_id, operation }
    }

    /// Id of the span that was already ended.
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// The rejected operation, for example `"end"` or `"add_event"`.
    pub fn operation(&self) -> &'static str {
        self.operation
    }
}
