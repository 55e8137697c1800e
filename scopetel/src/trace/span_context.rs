use std::borrow::Cow;
use std::fmt;
use std::num::ParseIntError;

/// Trace-level options carried by a [`SpanContext`]. Only bit 0, `sampled`,
/// is defined.
#[derive(Clone, Debug, Default, PartialEq, Eq, Copy, Hash)]
pub struct TraceFlags(u8);

impl TraceFlags {
    const SAMPLED_BIT: u8 = 0x01;

    /// No flags set: the trace is not sampled, so its spans record nothing.
    pub const NOT_SAMPLED: TraceFlags = TraceFlags(0x00);

    /// The trace is sampled.
    pub const SAMPLED: TraceFlags = TraceFlags(Self::SAMPLED_BIT);

    /// Wraps raw flag bits.
    pub const fn new(flags: u8) -> Self {
        TraceFlags(flags)
    }

    /// Whether the `sampled` bit is set.
    pub fn is_sampled(&self) -> bool {
        self.0 & Self::SAMPLED_BIT != 0
    }

    /// These flags with the `sampled` bit set to `sampled`.
    pub fn with_sampled(&self, sampled: bool) -> Self {
        if sampled {
            TraceFlags(self.0 | Self::SAMPLED_BIT)
        } else {
            TraceFlags(self.0 & !Self::SAMPLED_BIT)
        }
    }

    /// The raw flag bits, as written to the wire.
    pub fn to_u8(self) -> u8 {
        self.0
    }
}

/// Implements the shared surface of fixed-width, hex-encoded ids: byte
/// conversion, hex parsing and zero-padded lowercase formatting.
macro_rules! hex_id {
    ($name:ident, $repr:ty, $bytes:literal, $width:literal) => {
        impl $name {
            /// The all-zero id, which never identifies anything.
            pub const INVALID: $name = $name(0);

            /// Builds the id from its big-endian bytes.
            pub const fn from_bytes(bytes: [u8; $bytes]) -> Self {
                $name(<$repr>::from_be_bytes(bytes))
            }

            /// The big-endian bytes of the id.
            pub const fn to_bytes(self) -> [u8; $bytes] {
                self.0.to_be_bytes()
            }

            /// Parses a base 16 string. Shorter strings are zero-extended.
            pub fn from_hex(hex: &str) -> Result<Self, ParseIntError> {
                <$repr>::from_str_radix(hex, 16).map($name)
            }
        }

        impl From<$repr> for $name {
            fn from(value: $repr) -> Self {
                $name(value)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:0width$x}", self.0, width = $width)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:0width$x}", self.0, width = $width)
            }
        }
    };
}

/// Identity of a trace, shared by all of its spans. Rendered as 32 hex
/// digits.
///
/// ```
/// use scopetel::trace::TraceId;
///
/// let id = TraceId::from_hex("58406520a006649127e371903a2de979").unwrap();
/// assert_eq!(id.to_string(), "58406520a006649127e371903a2de979");
/// assert!(TraceId::from_hex("not_hex").is_err());
/// ```
#[derive(Clone, PartialEq, Eq, Copy, Hash)]
pub struct TraceId(u128);

hex_id!(TraceId, u128, 16, 32);

/// Identity of a span within its trace. Rendered as 16 hex digits.
#[derive(Clone, PartialEq, Eq, Copy, Hash)]
pub struct SpanId(u64);

hex_id!(SpanId, u64, 8, 16);

/// Immutable identity of a span: the part that is propagated to children,
/// log records and, across process boundaries, to downstream services.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SpanContext {
    trace_id: TraceId,
    span_id: SpanId,
    trace_flags: TraceFlags,
    is_remote: bool,
}

impl SpanContext {
    /// The context of "no span": invalid ids and nothing sampled.
    pub const NONE: SpanContext = SpanContext {
        trace_id: TraceId::INVALID,
        span_id: SpanId::INVALID,
        trace_flags: TraceFlags::NOT_SAMPLED,
        is_remote: false,
    };

    /// Same as [`SpanContext::NONE`].
    pub fn empty_context() -> Self {
        SpanContext::NONE
    }

    /// Assembles a span context from its parts.
    pub fn new(trace_id: TraceId, span_id: SpanId, trace_flags: TraceFlags, is_remote: bool) -> Self {
        SpanContext {
            trace_id,
            span_id,
            trace_flags,
            is_remote,
        }
    }

    /// The trace this span belongs to.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// The id of the span itself.
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// Flags of the trace, currently only the sampling decision.
    pub fn trace_flags(&self) -> TraceFlags {
        self.trace_flags
    }

    /// Both ids are non-zero.
    pub fn is_valid(&self) -> bool {
        self.trace_id != TraceId::INVALID && self.span_id != SpanId::INVALID
    }

    /// The context was received from another process rather than created
    /// here.
    pub fn is_remote(&self) -> bool {
        self.is_remote
    }

    /// Whether spans of this trace are recorded and exported.
    pub fn is_sampled(&self) -> bool {
        self.trace_flags.is_sampled()
    }
}

/// The relationship between a span, its parent and its children.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SpanKind {
    /// Operation spanning the handling of an inbound request, e.g. the unit of
    /// work started by an HTTP layer.
    Server,
    /// Outbound request to a remote service.
    Client,
    /// Initiation of an asynchronous operation, such as enqueuing a message.
    Producer,
    /// Processing of an asynchronous operation started by a producer.
    Consumer,
    /// Operation internal to the application. The default.
    #[default]
    Internal,
}

impl fmt::Display for SpanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpanKind::Client => write!(f, "client"),
            SpanKind::Server => write!(f, "server"),
            SpanKind::Producer => write!(f, "producer"),
            SpanKind::Consumer => write!(f, "consumer"),
            SpanKind::Internal => write!(f, "internal"),
        }
    }
}

/// The outcome of the operation a span describes.
///
/// Statuses form a total order `Ok > Error > Unset`; a span's status only
/// moves upwards, so once `Ok` is set it is final.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Hash)]
pub enum Status {
    /// No outcome was recorded.
    #[default]
    Unset,

    /// The operation failed.
    Error {
        /// What went wrong.
        description: Cow<'static, str>,
    },

    /// The operation was explicitly marked as successful.
    Ok {
        /// Optional description, e.g. `Forecast generated successfully`.
        description: Cow<'static, str>,
    },
}

impl Status {
    /// An `Error` status.
    ///
    /// ```
    /// use scopetel::trace::Status;
    ///
    /// let status = Status::error(format!("{} of 5 days missing", 2));
    /// assert_eq!(status.description(), Some("2 of 5 days missing"));
    /// ```
    pub fn error(description: impl Into<Cow<'static, str>>) -> Self {
        Status::Error {
            description: description.into(),
        }
    }

    /// An `Ok` status. The description may be empty.
    pub fn ok(description: impl Into<Cow<'static, str>>) -> Self {
        Status::Ok {
            description: description.into(),
        }
    }

    /// The description attached to an `Ok` or `Error` status, if any.
    pub fn description(&self) -> Option<&str> {
        match self {
            Status::Unset => None,
            Status::Error { description } | Status::Ok { description } => {
                Some(&**description).filter(|d| !d.is_empty())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_id_is_32_hex_digits_big_endian() {
        let id = TraceId::from(42);
        assert_eq!(id.to_string(), "0000000000000000000000000000002a");
        assert_eq!(format!("{:?}", id), id.to_string());
        assert_eq!(id.to_bytes()[15], 42);
        assert_eq!(TraceId::from_bytes(id.to_bytes()), id);
        assert_eq!(TraceId::from_hex("2a").unwrap(), id);
        assert_eq!(TraceId::INVALID.to_string(), "0".repeat(32));
    }

    #[test]
    fn span_id_formats_as_16_hex_digits() {
        assert_eq!(SpanId::from(42).to_string(), "000000000000002a");
        assert_eq!(SpanId::from_hex("4c721bf33e3caf8f").unwrap(), SpanId::from(5508496025762705295));
    }

    #[test]
    fn status_order() {
        assert!(Status::ok("") > Status::error("boom"));
        assert!(Status::error("boom") > Status::Unset);
        assert_eq!(Status::ok("done").description(), Some("done"));
        assert_eq!(Status::ok("").description(), None);
    }

    #[test]
    fn sampled_flag() {
        let flags = TraceFlags::default().with_sampled(true);
        assert!(flags.is_sampled());
        assert!(!flags.with_sampled(false).is_sampled());
        assert!(!SpanContext::NONE.is_valid());
    }
}
