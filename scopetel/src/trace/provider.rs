//! # Tracer Provider
//!
//! The `TracerProvider` owns the trace pipeline of a process: configuration,
//! resource and span processors. All tracers created from one provider share
//! them.
use crate::common::InstrumentationScope;
use crate::error::{SdkError, SdkResult};
use crate::resource::Resource;
use crate::tel_debug;
use crate::trace::{
    BatchSpanProcessor, Config, IdGenerator, ShouldSample, SpanExporter, SpanLimits,
    SpanProcessor, Tracer,
};
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// State shared by all clones of a provider and its tracers.
#[derive(Debug)]
pub(crate) struct TracerProviderInner {
    processors: Vec<Box<dyn SpanProcessor>>,
    config: Config,
    resource: Arc<Resource>,
    is_shutdown: AtomicBool,
}

impl TracerProviderInner {
    /// Called both from explicit shutdown and from Drop when the last
    /// reference is released.
    fn shutdown(&self, timeout: Duration) -> Vec<SdkResult> {
        let mut results = vec![];
        for processor in &self.processors {
            let result = processor.shutdown_with_timeout(timeout);
            if let Err(err) = &result {
                tel_debug!(name: "TracerProvider.ShutdownError", error = format!("{err}"));
            }
            results.push(result);
        }
        results
    }
}

impl Drop for TracerProviderInner {
    fn drop(&mut self) {
        if !self.is_shutdown.load(Ordering::Relaxed) {
            let _ = self.shutdown(DEFAULT_SHUTDOWN_TIMEOUT);
        } else {
            tel_debug!(
                name: "TracerProvider.Drop.AlreadyShutdown",
                message = "TracerProvider was already shut down; drop will not attempt shutdown again."
            );
        }
    }
}

/// Creator and registry of named [`Tracer`] instances.
///
/// Cloning a `TracerProvider` and dropping a clone does not stop span
/// processing. Processing stops on an explicit [`TracerProvider::shutdown`]
/// or when the last reference, including those held by tracers and open
/// spans, is dropped.
#[derive(Clone, Debug)]
pub struct TracerProvider {
    inner: Arc<TracerProviderInner>,
}

impl Default for TracerProvider {
    fn default() -> Self {
        TracerProvider::builder().build()
    }
}

impl TracerProvider {
    /// Create a new [`TracerProvider`] builder.
    pub fn builder() -> TracerProviderBuilder {
        TracerProviderBuilder::default()
    }

    /// Returns a tracer for the named instrumentation scope.
    pub fn tracer(&self, name: impl Into<Cow<'static, str>>) -> Tracer {
        self.tracer_with_scope(InstrumentationScope::builder(name).build())
    }

    /// Returns a tracer for the given instrumentation scope.
    ///
    /// ```
    /// use scopetel::trace::TracerProvider;
    /// use scopetel::InstrumentationScope;
    ///
    /// let provider = TracerProvider::default();
    /// let scope = InstrumentationScope::builder("WebAPI.Weather.Forecast")
    ///     .with_version("1.0.0")
    ///     .build();
    /// let tracer = provider.tracer_with_scope(scope);
    /// # drop(tracer);
    /// ```
    pub fn tracer_with_scope(&self, scope: InstrumentationScope) -> Tracer {
        if scope.name().is_empty() {
            tel_debug!(name: "TracerProvider.EmptyTracerName");
        }
        Tracer::new(scope, self.clone())
    }

    pub(crate) fn span_processors(&self) -> &[Box<dyn SpanProcessor>] {
        &self.inner.processors
    }

    pub(crate) fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The resource attached to every span of this provider.
    pub fn resource(&self) -> Arc<Resource> {
        self.inner.resource.clone()
    }

    /// Set once by the first shutdown.
    /// Spans started after shutdown are non-recording.
    pub(crate) fn is_shutdown(&self) -> bool {
        self.inner.is_shutdown.load(Ordering::Relaxed)
    }

    /// Exports every span that has ended so far, blocking until the
    /// processors report back.
    ///
    /// Fails if a processor could not deliver a batch, even after retries.
    pub fn force_flush(&self) -> SdkResult {
        let result: Vec<_> = self
            .span_processors()
            .iter()
            .map(|processor| processor.force_flush())
            .collect();
        if result.iter().all(|r| r.is_ok()) {
            Ok(())
        } else {
            Err(SdkError::InternalFailure(format!("errs: {:?}", result)))
        }
    }

    /// Shuts down the current `TracerProvider`, flushing pending spans.
    ///
    /// Spans started afterwards are non-recording. A second call fails with
    /// [`SdkError::AlreadyShutdown`].
    pub fn shutdown(&self) -> SdkResult {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT)
    }

    /// Same as [`TracerProvider::shutdown`], waiting at most `timeout` for
    /// each processor.
    pub fn shutdown_with_timeout(&self, timeout: Duration) -> SdkResult {
        if self
            .inner
            .is_shutdown
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let results = self.inner.shutdown(timeout);

            if results.iter().all(|res| res.is_ok()) {
                Ok(())
            } else {
                Err(SdkError::InternalFailure(format!(
                    "Shutdown errors: {:?}",
                    results
                        .into_iter()
                        .filter_map(Result::err)
                        .collect::<Vec<_>>()
                )))
            }
        } else {
            Err(SdkError::AlreadyShutdown)
        }
    }
}

/// Builder for [`TracerProvider`].
#[derive(Debug, Default)]
pub struct TracerProviderBuilder {
    processors: Vec<Box<dyn SpanProcessor>>,
    config: Config,
    resource: Option<Resource>,
}

impl TracerProviderBuilder {
    /// Adds a [`BatchSpanProcessor`] with the configured exporter to the
    /// pipeline, using the batch settings from the environment.
    pub fn with_batch_exporter<T: SpanExporter + 'static>(self, exporter: T) -> Self {
        let batch = BatchSpanProcessor::builder(exporter).build();
        self.with_span_processor(batch)
    }

    /// Adds a custom [`SpanProcessor`] to the pipeline. Processors receive
    /// ended spans in registration order.
    pub fn with_span_processor<T: SpanProcessor + 'static>(self, processor: T) -> Self {
        let mut processors = self.processors;
        processors.push(Box::new(processor));

        TracerProviderBuilder { processors, ..self }
    }

    /// The sdk [`Config`] that this provider will use.
    pub fn with_config(self, config: Config) -> Self {
        TracerProviderBuilder { config, ..self }
    }

    /// Decides which new traces are recorded.
    pub fn with_sampler<T: ShouldSample + 'static>(mut self, sampler: T) -> Self {
        self.config.sampler = Box::new(sampler);
        self
    }

    /// Source of trace and span ids.
    pub fn with_id_generator<T: IdGenerator + 'static>(mut self, id_generator: T) -> Self {
        self.config.id_generator = Box::new(id_generator);
        self
    }

    /// Specify all limits via the span_limits
    pub fn with_span_limits(mut self, span_limits: SpanLimits) -> Self {
        self.config.span_limits = span_limits;
        self
    }

    /// Associates a [Resource] with a [TracerProvider].
    ///
    /// Defaults to [`Resource::from_env`].
    pub fn with_resource(self, resource: Resource) -> Self {
        TracerProviderBuilder {
            resource: Some(resource),
            ..self
        }
    }

    /// Finishes the provider. Processors start their workers here.
    pub fn build(self) -> TracerProvider {
        TracerProvider {
            inner: Arc::new(TracerProviderInner {
                processors: self.processors,
                config: self.config,
                resource: Arc::new(self.resource.unwrap_or_else(Resource::from_env)),
                is_shutdown: AtomicBool::new(false),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{InMemorySpanExporter, SpanData};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct AssertInfo {
        ended: Mutex<Vec<String>>,
        shutdown_calls: AtomicUsize,
    }

    #[derive(Debug, Clone, Default)]
    struct TestSpanProcessor {
        info: Arc<AssertInfo>,
        fail_flush: bool,
    }

    impl SpanProcessor for TestSpanProcessor {
        fn on_end(&self, span: SpanData) {
            self.info.ended.lock().unwrap().push(span.name.into_owned());
        }

        fn force_flush(&self) -> SdkResult {
            if self.fail_flush {
                Err(SdkError::InternalFailure("flush failed".into()))
            } else {
                Ok(())
            }
        }

        fn shutdown_with_timeout(&self, _timeout: Duration) -> SdkResult {
            self.info.shutdown_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn every_processor_receives_ended_spans() {
        let first = TestSpanProcessor::default();
        let second = TestSpanProcessor::default();
        let provider = TracerProvider::builder()
            .with_span_processor(first.clone())
            .with_span_processor(second.clone())
            .build();
        provider.tracer("test").in_span("op", |_| {});
        assert_eq!(*first.info.ended.lock().unwrap(), vec!["op".to_string()]);
        assert_eq!(*second.info.ended.lock().unwrap(), vec!["op".to_string()]);
    }

    #[test]
    fn force_flush_reports_processor_failure() {
        let provider = TracerProvider::builder()
            .with_span_processor(TestSpanProcessor {
                fail_flush: true,
                ..Default::default()
            })
            .build();
        assert!(matches!(
            provider.force_flush(),
            Err(SdkError::InternalFailure(_))
        ));
    }

    #[test]
    fn shutdown_twice_fails_and_stops_recording() {
        let processor = TestSpanProcessor::default();
        let provider = TracerProvider::builder()
            .with_span_processor(processor.clone())
            .build();
        assert!(provider.shutdown().is_ok());
        assert_eq!(provider.shutdown(), Err(SdkError::AlreadyShutdown));
        assert_eq!(processor.info.shutdown_calls.load(Ordering::SeqCst), 1);

        let span = provider.tracer("test").start("late");
        assert!(!span.is_recording());
        drop(span);
        assert!(processor.info.ended.lock().unwrap().is_empty());
    }

    #[test]
    fn dropping_last_reference_shuts_down() {
        let processor = TestSpanProcessor::default();
        let provider = TracerProvider::builder()
            .with_span_processor(processor.clone())
            .build();
        let tracer = provider.tracer("test");
        drop(provider);
        assert_eq!(processor.info.shutdown_calls.load(Ordering::SeqCst), 0);
        drop(tracer);
        assert_eq!(processor.info.shutdown_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn spans_carry_provider_resource() {
        let exporter = InMemorySpanExporter::default();
        let provider = TracerProvider::builder()
            .with_resource(
                Resource::builder()
                    .with_service_name("weather-api")
                    .with_instance_id("host-1")
                    .build(),
            )
            .with_batch_exporter(exporter.clone())
            .build();
        provider.tracer("test").in_span("op", |_| {});
        provider.force_flush().unwrap();
        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans[0].resource.service_name(), "weather-api");
        assert_eq!(spans[0].resource.instance_id(), "host-1");
    }
}
