//! Errors shared by the trace, metrics and logs pipelines.
use std::sync::PoisonError;
use std::time::Duration;
use thiserror::Error;

/// Result of a lifecycle operation such as `force_flush` or `shutdown`.
pub type SdkResult = Result<(), SdkError>;

/// Errors returned by lifecycle operations of providers and processors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SdkError {
    /// Shutdown has already been invoked.
    ///
    /// Calling `shutdown` more than once indicates a lifecycle bug in the
    /// application, but is otherwise harmless.
    #[error("Shutdown already invoked")]
    AlreadyShutdown,

    /// The operation did not complete within the allotted time.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Any other failure, including exports that exhausted their retries
    /// during a flush.
    #[error("Operation failed: {0}")]
    InternalFailure(String),
}

impl<T> From<PoisonError<T>> for SdkError {
    fn from(err: PoisonError<T>) -> Self {
        SdkError::InternalFailure(format!("Mutex poisoned: {}", err))
    }
}

/// Failure to deliver a batch to a sink.
///
/// Export errors stay inside the export pipeline: they drive the retry loop
/// and the export diagnostics, and are never returned to instrumented code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExportError {
    /// The sink could not be reached.
    #[error("transport error: {0}")]
    Transport(String),

    /// The sink answered with a non-success status code.
    #[error("sink responded with HTTP status {0}")]
    HttpStatus(u16),

    /// The batch could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The exporter was already shut down.
    #[error("exporter already shut down")]
    AlreadyShutdown,

    /// Any other failure reported by an exporter.
    #[error("{0}")]
    Other(String),
}

impl From<String> for ExportError {
    fn from(err_msg: String) -> Self {
        ExportError::Other(err_msg)
    }
}

impl From<&'static str> for ExportError {
    fn from(err_msg: &'static str) -> Self {
        ExportError::Other(err_msg.to_string())
    }
}

/// Invalid configuration supplied programmatically or via environment
/// variables.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ConfigError {
    /// No sampling ratio was configured. The ratio has no default and must be
    /// given with `with_sampling_ratio` or `OTEL_TRACES_SAMPLER_ARG`.
    #[error("no sampling ratio configured; set one programmatically or via OTEL_TRACES_SAMPLER_ARG")]
    MissingSamplingRatio,

    /// The sampling ratio lies outside `[0, 1]` or is not a number.
    #[error("sampling ratio {0} is outside [0, 1]")]
    InvalidSamplingRatio(f64),

    /// An environment variable held a value that could not be parsed.
    #[error("invalid value {value:?} for {name}")]
    InvalidValue {
        /// The variable name.
        name: String,
        /// The rejected value.
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn poisoned_mutex_maps_to_internal_failure() {
        let lock = std::sync::Arc::new(Mutex::new(0));
        let poisoner = lock.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison");
        })
        .join();

        let err: SdkError = lock.lock().unwrap_err().into();
        assert!(matches!(err, SdkError::InternalFailure(_)));
    }

    #[test]
    fn config_error_messages_name_the_variable() {
        let err = ConfigError::InvalidValue {
            name: "OTEL_BSP_MAX_QUEUE_SIZE".into(),
            value: "lots".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid value \"lots\" for OTEL_BSP_MAX_QUEUE_SIZE"
        );
    }
}
