use crate::common::InstrumentationScope;
use crate::error::{SdkError, SdkResult};
use crate::metrics::data::ResourceMetrics;
use crate::metrics::pipeline::Pipeline;
use crate::metrics::{process, Meter, MetricExporter, PeriodicReader};
use crate::resource::Resource;
use crate::tel_debug;
use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Handles the creation and coordination of [Meter]s.
///
/// All meters of one provider share a single instrument registry, the
/// provider's [Resource] and its [PeriodicReader]s. Cloning the provider is
/// cheap; the readers are shut down on an explicit
/// [`MeterProvider::shutdown`] or when the last clone is dropped.
#[derive(Clone, Debug)]
pub struct MeterProvider {
    inner: Arc<MeterProviderInner>,
}

struct MeterProviderInner {
    pipeline: Arc<Pipeline>,
    readers: Vec<PeriodicReader>,
    is_shutdown: AtomicBool,
}

impl fmt::Debug for MeterProviderInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeterProvider")
            .field("pipeline", &self.pipeline)
            .field("readers", &self.readers)
            .finish()
    }
}

impl MeterProviderInner {
    fn shutdown(&self, timeout: Duration) -> SdkResult {
        if self
            .is_shutdown
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SdkError::AlreadyShutdown);
        }

        let errors: Vec<SdkError> = self
            .readers
            .iter()
            .filter_map(|reader| reader.shutdown_with_timeout(timeout).err())
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

impl Drop for MeterProviderInner {
    fn drop(&mut self) {
        if self.is_shutdown.load(Ordering::Relaxed) {
            tel_debug!(
                name: "MeterProvider.Drop.AlreadyShutdown",
                message = "MeterProvider was already shut down; drop will not attempt shutdown again."
            );
        } else if let Err(err) = self.shutdown(DEFAULT_SHUTDOWN_TIMEOUT) {
            tel_debug!(name: "MeterProvider.Drop.ShutdownError", error = format!("{err}"));
        }
    }
}

impl Default for MeterProvider {
    fn default() -> Self {
        MeterProvider::builder().build()
    }
}

impl MeterProvider {
    /// Create a new [`MeterProvider`] builder.
    pub fn builder() -> MeterProviderBuilder {
        MeterProviderBuilder::default()
    }

    /// Returns a meter for the named instrumentation scope.
    pub fn meter(&self, name: impl Into<Cow<'static, str>>) -> Meter {
        self.meter_with_scope(InstrumentationScope::builder(name).build())
    }

    /// Returns a meter for the given instrumentation scope.
    pub fn meter_with_scope(&self, scope: InstrumentationScope) -> Meter {
        if scope.name().is_empty() {
            tel_debug!(name: "MeterProvider.EmptyMeterName");
        }
        Meter::new(scope, self.inner.pipeline.clone())
    }

    /// The resource attached to every snapshot of this provider.
    pub fn resource(&self) -> Arc<Resource> {
        self.inner.pipeline.resource().clone()
    }

    /// A cumulative snapshot of every counter, taken now.
    ///
    /// Readers take the same snapshot on their own schedule; this is for
    /// callers that want to inspect the registry directly.
    pub fn collect(&self) -> ResourceMetrics {
        self.inner.pipeline.produce()
    }

    /// Makes every reader export a snapshot now, blocking until they report
    /// back.
    pub fn force_flush(&self) -> SdkResult {
        let errors: Vec<SdkError> = self
            .inner
            .readers
            .iter()
            .filter_map(|reader| reader.force_flush().err())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(SdkError::InternalFailure(format!("errs: {:?}", errors)))
        }
    }

    /// Exports a final snapshot through every reader and stops them.
    ///
    /// Counters keep accepting increments afterwards, but nothing is
    /// exported. A second call fails with [`SdkError::AlreadyShutdown`].
    pub fn shutdown(&self) -> SdkResult {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT)
    }

    /// Same as [`MeterProvider::shutdown`], waiting at most `timeout` for
    /// each reader.
    pub fn shutdown_with_timeout(&self, timeout: Duration) -> SdkResult {
        self.inner.shutdown(timeout)
    }
}

/// Configuration options for a [MeterProvider].
#[derive(Default)]
pub struct MeterProviderBuilder {
    resource: Option<Resource>,
    readers: Vec<PeriodicReader>,
    process_metrics: bool,
}

impl MeterProviderBuilder {
    /// Associates a [Resource] with a [MeterProvider].
    ///
    /// Defaults to [`Resource::from_env`].
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Associates a [PeriodicReader] with a [MeterProvider].
    pub fn with_reader(mut self, reader: PeriodicReader) -> Self {
        self.readers.push(reader);
        self
    }

    /// Adds a [PeriodicReader] for `exporter`, using the export interval
    /// from the environment.
    pub fn with_periodic_exporter<E: MetricExporter>(self, exporter: E) -> Self {
        let reader = PeriodicReader::builder(exporter).build();
        self.with_reader(reader)
    }

    /// Registers the gauges of [`process`] under their own scope.
    pub fn with_process_metrics(mut self) -> Self {
        self.process_metrics = true;
        self
    }

    /// Construct a new [MeterProvider] with this configuration.
    pub fn build(self) -> MeterProvider {
        let resource = Arc::new(self.resource.unwrap_or_else(Resource::from_env));
        let pipeline = Arc::new(Pipeline::new(resource));
        for reader in &self.readers {
            reader.register_pipeline(Arc::downgrade(&pipeline));
        }

        let provider = MeterProvider {
            inner: Arc::new(MeterProviderInner {
                pipeline,
                readers: self.readers,
                is_shutdown: AtomicBool::new(false),
            }),
        };
        if self.process_metrics {
            process::register(&provider.meter_with_scope(process::scope()));
        }
        provider
    }
}

impl fmt::Debug for MeterProviderBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeterProviderBuilder")
            .field("resource", &self.resource)
            .field("readers", &self.readers)
            .field("process_metrics", &self.process_metrics)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::data::MetricData;
    use crate::metrics::InMemoryMetricExporter;
    use crate::KeyValue;

    fn u64_value(metrics: &ResourceMetrics, name: &str, attributes: &[KeyValue]) -> Option<u64> {
        match &metrics.metric(name)?.data {
            MetricData::U64Sum(sum) => sum.value_for(attributes),
            _ => None,
        }
    }

    #[test]
    fn meters_share_the_registry() {
        let provider = MeterProvider::builder().build();
        let a = provider.meter("WebAPI.Weather.Forecast");
        let b = provider.meter("WebAPI.Weather.Forecast");
        a.u64_counter("forecast_requests").build().add(1, &[]);
        b.u64_counter("forecast_requests").build().add(1, &[]);
        assert_eq!(u64_value(&provider.collect(), "forecast_requests", &[]), Some(2));
    }

    #[test]
    fn snapshots_carry_the_resource() {
        let exporter = InMemoryMetricExporter::default();
        let provider = MeterProvider::builder()
            .with_resource(Resource::builder().with_service_name("weather-api").build())
            .with_periodic_exporter(exporter.clone())
            .build();
        provider.meter("test").u64_counter("c").build().add(1, &[]);
        provider.force_flush().unwrap();

        let latest = exporter.latest().unwrap().unwrap();
        assert_eq!(latest.resource.service_name(), "weather-api");
        assert_eq!(latest.scope_metrics[0].scope.name(), "test");
    }

    #[test]
    fn every_reader_gets_a_copy() {
        let first = InMemoryMetricExporter::default();
        let second = InMemoryMetricExporter::default();
        let provider = MeterProvider::builder()
            .with_periodic_exporter(first.clone())
            .with_periodic_exporter(second.clone())
            .build();
        provider.meter("test").u64_counter("c").build().add(3, &[]);
        provider.shutdown().unwrap();

        for exporter in [first, second] {
            let latest = exporter.latest().unwrap().unwrap();
            assert_eq!(u64_value(&latest, "c", &[]), Some(3));
        }
    }

    #[test]
    fn shutdown_twice_fails() {
        let provider = MeterProvider::builder()
            .with_periodic_exporter(InMemoryMetricExporter::default())
            .build();
        assert!(provider.shutdown().is_ok());
        assert_eq!(provider.shutdown(), Err(SdkError::AlreadyShutdown));
    }

    #[test]
    fn dropping_provider_exports_final_snapshot() {
        let exporter = InMemoryMetricExporter::default();
        let provider = MeterProvider::builder()
            .with_periodic_exporter(exporter.clone())
            .build();
        let counter = provider.meter("test").u64_counter("c").build();
        counter.add(1, &[]);
        drop(provider);
        assert_eq!(exporter.get_finished_metrics().unwrap().len(), 1);
    }
}
