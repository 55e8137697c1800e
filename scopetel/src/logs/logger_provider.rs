use crate::common::InstrumentationScope;
use crate::error::{SdkError, SdkResult};
use crate::logs::{BatchLogProcessor, LogExporter, LogProcessor, Logger, Severity};
use crate::resource::Resource;
use crate::tel_debug;
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Creator and registry of named [`Logger`] instances.
///
/// Like the tracer provider, cloning is cheap and processing stops on an
/// explicit [`LoggerProvider::shutdown`] or when the last clone, including
/// the ones held by loggers, is dropped.
#[derive(Debug, Clone)]
pub struct LoggerProvider {
    inner: Arc<LoggerProviderInner>,
}

#[derive(Debug)]
struct LoggerProviderInner {
    processors: Vec<Box<dyn LogProcessor>>,
    resource: Arc<Resource>,
    min_severity: Severity,
    is_shutdown: AtomicBool,
}

impl LoggerProviderInner {
    fn shutdown(&self, timeout: Duration) -> Vec<SdkResult> {
        let mut results = vec![];
        for processor in &self.processors {
            let result = processor.shutdown_with_timeout(timeout);
            if let Err(err) = &result {
                tel_debug!(name: "LoggerProvider.ShutdownError", error = format!("{err}"));
            }
            results.push(result);
        }
        results
    }
}

impl Drop for LoggerProviderInner {
    fn drop(&mut self) {
        if !self.is_shutdown.load(Ordering::Relaxed) {
            let _ = self.shutdown(DEFAULT_SHUTDOWN_TIMEOUT);
        } else {
            tel_debug!(
                name: "LoggerProvider.Drop.AlreadyShutdown",
                message = "LoggerProvider was already shut down; drop will not attempt shutdown again."
            );
        }
    }
}

impl Default for LoggerProvider {
    fn default() -> Self {
        LoggerProvider::builder().build()
    }
}

impl LoggerProvider {
    /// Create a new `LoggerProvider` builder.
    pub fn builder() -> LoggerProviderBuilder {
        LoggerProviderBuilder::default()
    }

    /// Returns a logger for the named instrumentation scope.
    pub fn logger(&self, name: impl Into<Cow<'static, str>>) -> Logger {
        self.logger_with_scope(InstrumentationScope::builder(name).build())
    }

    /// Returns a logger for the given instrumentation scope.
    pub fn logger_with_scope(&self, scope: InstrumentationScope) -> Logger {
        if scope.name().is_empty() {
            tel_debug!(name: "LoggerProvider.EmptyLoggerName");
        }
        Logger::new(scope, self.clone())
    }

    pub(crate) fn log_processors(&self) -> &[Box<dyn LogProcessor>] {
        &self.inner.processors
    }

    pub(crate) fn min_severity(&self) -> Severity {
        self.inner.min_severity
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.inner.is_shutdown.load(Ordering::Relaxed)
    }

    /// The resource attached to every record of this provider.
    pub fn resource(&self) -> Arc<Resource> {
        self.inner.resource.clone()
    }

    /// Exports every record emitted so far, blocking until the processors
    /// report back.
    pub fn force_flush(&self) -> SdkResult {
        let errors: Vec<SdkError> = self
            .log_processors()
            .iter()
            .filter_map(|processor| processor.force_flush().err())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SdkError::InternalFailure(format!("errs: {:?}", errors)))
        }
    }

    /// Shuts down the provider, flushing pending records. Records emitted
    /// afterwards are discarded. A second call fails with
    /// [`SdkError::AlreadyShutdown`].
    pub fn shutdown(&self) -> SdkResult {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT)
    }

    /// Same as [`LoggerProvider::shutdown`], waiting at most `timeout` for
    /// each processor.
    pub fn shutdown_with_timeout(&self, timeout: Duration) -> SdkResult {
        if self
            .inner
            .is_shutdown
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SdkError::AlreadyShutdown);
        }

        let errors: Vec<SdkError> = self
            .inner
            .shutdown(timeout)
            .into_iter()
            .filter_map(Result::err)
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SdkError::InternalFailure(format!(
                "Shutdown errors: {:?}",
                errors
            )))
        }
    }
}

/// Builder for [`LoggerProvider`].
#[derive(Debug)]
pub struct LoggerProviderBuilder {
    processors: Vec<Box<dyn LogProcessor>>,
    resource: Option<Resource>,
    min_severity: Severity,
}

impl Default for LoggerProviderBuilder {
    fn default() -> Self {
        LoggerProviderBuilder {
            processors: Vec::new(),
            resource: None,
            min_severity: Severity::Trace,
        }
    }
}

impl LoggerProviderBuilder {
    /// Adds a [`BatchLogProcessor`] for `exporter`, using the batch
    /// settings from the environment.
    pub fn with_batch_exporter<T: LogExporter + 'static>(self, exporter: T) -> Self {
        let batch = BatchLogProcessor::builder(exporter).build();
        self.with_log_processor(batch)
    }

    /// Adds a custom [`LogProcessor`]. Processors receive records in
    /// registration order.
    pub fn with_log_processor<T: LogProcessor + 'static>(mut self, processor: T) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    /// Records below `severity` are dropped before reaching any processor.
    ///
    /// Defaults to [`Severity::Trace`], which keeps everything.
    pub fn with_min_severity(mut self, severity: Severity) -> Self {
        self.min_severity = severity;
        self
    }

    /// The [`Resource`] attached to every record.
    ///
    /// Defaults to [`Resource::from_env`].
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Create a new provider from this configuration.
    pub fn build(self) -> LoggerProvider {
        LoggerProvider {
            inner: Arc::new(LoggerProviderInner {
                processors: self.processors,
                resource: Arc::new(self.resource.unwrap_or_else(Resource::from_env)),
                min_severity: self.min_severity,
                is_shutdown: AtomicBool::new(false),
            }),
        }
    }
}
