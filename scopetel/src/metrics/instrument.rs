use crate::common::KeyValue;
use crate::metrics::sum::{Number, Sum};
use crate::metrics::Meter;
use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Records measurements for one synchronous instrument.
pub(crate) trait SyncInstrument<T>: Send + Sync {
    fn measure(&self, value: T, attributes: &[KeyValue]);
}

impl<T: Number> SyncInstrument<T> for Sum<T> {
    fn measure(&self, value: T, attributes: &[KeyValue]) {
        Sum::measure(self, value, attributes)
    }
}

/// Instrument handed out when registration failed; measurements are ignored.
#[derive(Debug, Default)]
pub(crate) struct NoopSyncInstrument;

impl<T> SyncInstrument<T> for NoopSyncInstrument {
    fn measure(&self, _value: T, _attributes: &[KeyValue]) {}
}

/// An instrument that records monotonically increasing values.
///
/// Handles are cheap to clone; every clone, and every handle obtained by
/// registering the same name again, feeds the same series.
///
/// ```
/// use scopetel::metrics::MeterProvider;
/// use scopetel::KeyValue;
///
/// let provider = MeterProvider::builder().build();
/// let meter = provider.meter("WebAPI.Weather.Forecast");
/// let requests = meter
///     .u64_counter("forecast_requests")
///     .with_description("Number of weather forecast requests")
///     .with_unit("1")
///     .build();
///
/// requests.add(1, &[KeyValue::new("event", "add")]);
/// ```
#[derive(Clone)]
#[non_exhaustive]
pub struct Counter<T>(Arc<dyn SyncInstrument<T>>);

impl<T> fmt::Debug for Counter<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("Counter<{}>", std::any::type_name::<T>()))
    }
}

impl<T> Counter<T> {
    pub(crate) fn new(inner: Arc<dyn SyncInstrument<T>>) -> Self {
        Counter(inner)
    }

    /// Records an increment to the counter.
    ///
    /// Each distinct set of `attributes` is its own series; the order of the
    /// attributes does not matter. Increments that are negative or not
    /// finite are ignored.
    pub fn add(&self, value: T, attributes: &[KeyValue]) {
        self.0.measure(value, attributes)
    }
}

/// Configuration for building a [`Counter`].
#[non_exhaustive]
pub struct CounterBuilder<'a, T> {
    meter: &'a Meter,
    /// Instrument name.
    pub name: Cow<'static, str>,
    /// Instrument description.
    pub description: Option<Cow<'static, str>>,
    /// Instrument unit.
    pub unit: Option<Cow<'static, str>>,
    _marker: PhantomData<T>,
}

impl<'a, T> CounterBuilder<'a, T> {
    pub(crate) fn new(meter: &'a Meter, name: Cow<'static, str>) -> Self {
        CounterBuilder {
            meter,
            name,
            description: None,
            unit: None,
            _marker: PhantomData,
        }
    }

    /// Set the description for this instrument.
    pub fn with_description<S: Into<Cow<'static, str>>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the unit for this instrument.
    ///
    /// Unit is case sensitive(`kb` is not the same as `kB`).
    ///
    /// Unit must be:
    /// - ASCII string
    /// - No longer than 63 characters
    pub fn with_unit<S: Into<Cow<'static, str>>>(mut self, unit: S) -> Self {
        self.unit = Some(unit.into());
        self
    }
}

impl CounterBuilder<'_, u64> {
    /// Registers the counter, or returns the one already registered under
    /// this name.
    pub fn build(self) -> Counter<u64> {
        self.meter.create_counter(self)
    }
}

impl CounterBuilder<'_, f64> {
    /// Registers the counter, or returns the one already registered under
    /// this name.
    pub fn build(self) -> Counter<f64> {
        self.meter.create_counter(self)
    }
}

impl<T> fmt::Debug for CounterBuilder<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CounterBuilder")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("unit", &self.unit)
            .field("kind", &std::any::type_name::<T>())
            .finish()
    }
}
