//! Observable gauges, whose values are read by callbacks each time a
//! snapshot is taken.
use crate::common::KeyValue;
use crate::metrics::attribute_set::AttributeSet;
use crate::metrics::data::{self, GaugeDataPoint};
use crate::metrics::sum::{Aggregator, STREAM_CARDINALITY_LIMIT};
use crate::metrics::Meter;
use crate::{tel_debug, tel_warn};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;

/// Receives the readings of an observable instrument while its callbacks
/// run.
pub trait AsyncInstrument<T>: Send + Sync {
    /// Records `value` for the series identified by `attributes`.
    ///
    /// Observing the same attribute set twice in one collection keeps the
    /// last value.
    fn observe(&self, value: T, attributes: &[KeyValue]);
}

/// Function that reports the current readings of an observable instrument.
pub type Callback<T> = Box<dyn Fn(&dyn AsyncInstrument<T>) + Send + Sync>;

/// Marks a type that observable gauges can be built for.
pub(crate) trait GaugeNumber: Copy + fmt::Debug + Send + Sync + 'static {
    /// Name of the instrument kind, used in diagnostics.
    const KIND: &'static str;

    fn is_valid_reading(self) -> bool;

    fn into_aggregator(gauge: Arc<ObservableGaugeState<Self>>) -> Aggregator;

    fn from_aggregator(aggregator: &Aggregator) -> Option<Arc<ObservableGaugeState<Self>>>;
}

impl GaugeNumber for u64 {
    const KIND: &'static str = "u64 gauge";

    fn is_valid_reading(self) -> bool {
        true
    }

    fn into_aggregator(gauge: Arc<ObservableGaugeState<u64>>) -> Aggregator {
        Aggregator::U64Gauge(gauge)
    }

    fn from_aggregator(aggregator: &Aggregator) -> Option<Arc<ObservableGaugeState<u64>>> {
        match aggregator {
            Aggregator::U64Gauge(gauge) => Some(gauge.clone()),
            _ => None,
        }
    }
}

impl GaugeNumber for f64 {
    const KIND: &'static str = "f64 gauge";

    fn is_valid_reading(self) -> bool {
        self.is_finite()
    }

    fn into_aggregator(gauge: Arc<ObservableGaugeState<f64>>) -> Aggregator {
        Aggregator::F64Gauge(gauge)
    }

    fn from_aggregator(aggregator: &Aggregator) -> Option<Arc<ObservableGaugeState<f64>>> {
        match aggregator {
            Aggregator::F64Gauge(gauge) => Some(gauge.clone()),
            _ => None,
        }
    }
}

/// The callbacks of one registered gauge.
pub(crate) struct ObservableGaugeState<T> {
    name: String,
    callbacks: RwLock<Vec<Callback<T>>>,
    cardinality_limit: usize,
}

impl<T> fmt::Debug for ObservableGaugeState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableGauge")
            .field("name", &self.name)
            .finish()
    }
}

impl<T: GaugeNumber> ObservableGaugeState<T> {
    pub(crate) fn new(name: String) -> Self {
        ObservableGaugeState {
            name,
            callbacks: RwLock::new(Vec::new()),
            cardinality_limit: STREAM_CARDINALITY_LIMIT,
        }
    }

    pub(crate) fn register_callbacks(&self, callbacks: Vec<Callback<T>>) {
        if let Ok(mut registered) = self.callbacks.write() {
            registered.extend(callbacks);
        }
    }

    /// Runs every callback and returns what they observed.
    pub(crate) fn collect(&self) -> data::Gauge<T> {
        let observations = Observations {
            name: &self.name,
            readings: Mutex::new(HashMap::new()),
            cardinality_limit: self.cardinality_limit,
            dropped: AtomicUsize::new(0),
        };
        if let Ok(callbacks) = self.callbacks.read() {
            for callback in callbacks.iter() {
                callback(&observations);
            }
        }

        let dropped = observations.dropped.load(Ordering::Relaxed);
        if dropped > 0 {
            tel_warn!(
                name: "ObservableGauge.CardinalityLimitReached",
                gauge = self.name.as_str(),
                limit = self.cardinality_limit,
                dropped = dropped,
                message = "Readings for further attribute sets were dropped."
            );
        }

        let data_points = match observations.readings.into_inner() {
            Ok(readings) => readings
                .into_iter()
                .map(|(attributes, value)| GaugeDataPoint {
                    attributes: attributes.to_key_values(),
                    value,
                })
                .collect(),
            Err(_) => Vec::new(),
        };
        data::Gauge {
            data_points,
            time: SystemTime::now(),
        }
    }
}

/// Collects the readings of one collection run.
struct Observations<'a, T> {
    name: &'a str,
    readings: Mutex<HashMap<AttributeSet, T>>,
    cardinality_limit: usize,
    dropped: AtomicUsize,
}

impl<T: GaugeNumber> AsyncInstrument<T> for Observations<'_, T> {
    fn observe(&self, value: T, attributes: &[KeyValue]) {
        if !value.is_valid_reading() {
            tel_debug!(
                name: "ObservableGauge.InvalidReading",
                gauge = self.name,
                value = format!("{:?}", value)
            );
            return;
        }

        let attributes = AttributeSet::from(attributes);
        let Ok(mut readings) = self.readings.lock() else {
            return;
        };
        if readings.len() >= self.cardinality_limit && !readings.contains_key(&attributes) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        readings.insert(attributes, value);
    }
}

/// An instrument whose readings are reported by callbacks when a snapshot
/// is taken.
///
/// The callbacks stay registered for the lifetime of the meter provider;
/// dropping this handle does not remove them.
///
/// ```
/// use scopetel::metrics::MeterProvider;
/// use scopetel::KeyValue;
///
/// let provider = MeterProvider::builder().build();
/// let meter = provider.meter("WebAPI.Weather.Forecast");
/// let _queue_depth = meter
///     .u64_observable_gauge("forecast_queue_depth")
///     .with_unit("{request}")
///     .with_callback(|observer| observer.observe(3, &[KeyValue::new("queue", "pending")]))
///     .build();
/// ```
#[derive(Clone)]
#[non_exhaustive]
pub struct ObservableGauge<T> {
    inner: Option<Arc<ObservableGaugeState<T>>>,
}

impl<T> ObservableGauge<T> {
    pub(crate) fn new(inner: Option<Arc<ObservableGaugeState<T>>>) -> Self {
        ObservableGauge { inner }
    }
}

impl<T> fmt::Debug for ObservableGauge<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(&format!("ObservableGauge<{}>", std::any::type_name::<T>()))
            .field("registered", &self.inner.is_some())
            .finish()
    }
}

/// Configuration for building an [`ObservableGauge`].
#[non_exhaustive]
pub struct ObservableGaugeBuilder<'a, T> {
    meter: &'a Meter,
    /// Instrument name.
    pub name: Cow<'static, str>,
    /// Instrument description.
    pub description: Option<Cow<'static, str>>,
    /// Instrument unit.
    pub unit: Option<Cow<'static, str>>,
    pub(crate) callbacks: Vec<Callback<T>>,
}

impl<'a, T> ObservableGaugeBuilder<'a, T> {
    pub(crate) fn new(meter: &'a Meter, name: Cow<'static, str>) -> Self {
        ObservableGaugeBuilder {
            meter,
            name,
            description: None,
            unit: None,
            callbacks: Vec::new(),
        }
    }

    /// Set the description for this instrument.
    pub fn with_description<S: Into<Cow<'static, str>>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the unit for this instrument.
    pub fn with_unit<S: Into<Cow<'static, str>>>(mut self, unit: S) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Adds a callback that reports readings each time a snapshot is taken.
    ///
    /// Callbacks run on the thread taking the snapshot, usually a periodic
    /// reader's worker, and should return quickly.
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&dyn AsyncInstrument<T>) + Send + Sync + 'static,
    {
        self.callbacks.push(Box::new(callback));
        self
    }
}

impl ObservableGaugeBuilder<'_, u64> {
    /// Registers the gauge. If the name is already registered as a `u64`
    /// gauge, the callbacks are added to that gauge.
    pub fn build(self) -> ObservableGauge<u64> {
        self.meter.create_observable_gauge(self)
    }
}

impl ObservableGaugeBuilder<'_, f64> {
    /// Registers the gauge. If the name is already registered as an `f64`
    /// gauge, the callbacks are added to that gauge.
    pub fn build(self) -> ObservableGauge<f64> {
        self.meter.create_observable_gauge(self)
    }
}

impl<T> fmt::Debug for ObservableGaugeBuilder<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableGaugeBuilder")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("unit", &self.unit)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}
