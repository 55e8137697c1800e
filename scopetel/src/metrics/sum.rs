//! Lock-light cumulative sums, one atomic accumulator per attribute set.
use crate::common::KeyValue;
use crate::metrics::attribute_set::AttributeSet;
use crate::metrics::data::{self, MetricData, SumDataPoint};
use crate::metrics::observable::{GaugeNumber, ObservableGaugeState};
use crate::{tel_debug, tel_warn};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

/// Maximum number of distinct attribute sets per counter. Measurements for
/// further sets are folded into the overflow series.
pub(crate) const STREAM_CARDINALITY_LIMIT: usize = 2000;

/// Attribute marking the series that absorbs measurements beyond the
/// cardinality limit.
pub(crate) const OVERFLOW_ATTRIBUTE: &str = "otel.metric.overflow";

/// A value that can be added to atomically.
pub(crate) trait AtomicNumber<T>: Send + Sync + 'static {
    /// Returns `true` if the total was clamped at the type's maximum.
    fn add(&self, value: T) -> bool;
    fn get(&self) -> T;
}

/// Marks a type that counters can be built for.
pub(crate) trait Number: Copy + Default + fmt::Debug + fmt::Display + Send + Sync + 'static {
    type Atomic: AtomicNumber<Self>;

    fn new_atomic() -> Self::Atomic;

    /// Counters only accept finite, non-negative increments.
    fn is_valid_increment(self) -> bool;

    /// Name of the number kind, used in diagnostics.
    const KIND: &'static str;

    fn into_aggregator(sum: Arc<Sum<Self>>) -> Aggregator;

    fn from_aggregator(aggregator: &Aggregator) -> Option<Arc<Sum<Self>>>;
}

impl AtomicNumber<u64> for AtomicU64 {
    fn add(&self, value: u64) -> bool {
        let mut saturated = false;
        let _ = self.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
            let (total, overflowed) = current.overflowing_add(value);
            saturated = overflowed;
            Some(if overflowed { u64::MAX } else { total })
        });
        saturated
    }

    fn get(&self) -> u64 {
        self.load(Ordering::Relaxed)
    }
}

impl Number for u64 {
    type Atomic = AtomicU64;

    fn new_atomic() -> AtomicU64 {
        AtomicU64::new(0)
    }

    fn is_valid_increment(self) -> bool {
        true
    }

    const KIND: &'static str = "u64";

    fn into_aggregator(sum: Arc<Sum<u64>>) -> Aggregator {
        Aggregator::U64(sum)
    }

    fn from_aggregator(aggregator: &Aggregator) -> Option<Arc<Sum<u64>>> {
        match aggregator {
            Aggregator::U64(sum) => Some(sum.clone()),
            _ => None,
        }
    }
}

/// An `f64` stored as its bit pattern, updated with compare-and-swap.
pub(crate) struct AtomicF64(AtomicU64);

impl AtomicNumber<f64> for AtomicF64 {
    fn add(&self, value: f64) -> bool {
        let _ = self
            .0
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                Some((f64::from_bits(bits) + value).to_bits())
            });
        false
    }

    fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }
}

impl Number for f64 {
    type Atomic = AtomicF64;

    fn new_atomic() -> AtomicF64 {
        AtomicF64(AtomicU64::new(0.0_f64.to_bits()))
    }

    fn is_valid_increment(self) -> bool {
        self.is_finite() && self >= 0.0
    }

    const KIND: &'static str = "f64";

    fn into_aggregator(sum: Arc<Sum<f64>>) -> Aggregator {
        Aggregator::F64(sum)
    }

    fn from_aggregator(aggregator: &Aggregator) -> Option<Arc<Sum<f64>>> {
        match aggregator {
            Aggregator::F64(sum) => Some(sum.clone()),
            _ => None,
        }
    }
}

/// Summarizes a set of measurements made as their arithmetic sum, scoped by
/// attributes.
pub(crate) struct Sum<T: Number> {
    name: String,
    trackers: RwLock<HashMap<AttributeSet, Arc<T::Atomic>>>,
    overflow: T::Atomic,
    has_overflow: AtomicBool,
    has_saturated: AtomicBool,
    cardinality_limit: usize,
    start_time: SystemTime,
}

impl<T: Number> fmt::Debug for Sum<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sum").field("name", &self.name).finish()
    }
}

impl<T: Number> Sum<T> {
    pub(crate) fn new(name: String, start_time: SystemTime) -> Self {
        Self::with_cardinality_limit(name, start_time, STREAM_CARDINALITY_LIMIT)
    }

    pub(crate) fn with_cardinality_limit(
        name: String,
        start_time: SystemTime,
        cardinality_limit: usize,
    ) -> Self {
        Sum {
            name,
            trackers: RwLock::new(HashMap::new()),
            overflow: T::new_atomic(),
            has_overflow: AtomicBool::new(false),
            has_saturated: AtomicBool::new(false),
            cardinality_limit,
            start_time,
        }
    }

    pub(crate) fn measure(&self, value: T, attributes: &[KeyValue]) {
        if !value.is_valid_increment() {
            tel_debug!(
                name: "Counter.InvalidIncrement",
                counter = self.name.as_str(),
                value = value.to_string()
            );
            return;
        }

        let attributes = AttributeSet::from(attributes);
        if let Ok(trackers) = self.trackers.read() {
            if let Some(tracker) = trackers.get(&attributes) {
                self.add_to(tracker, value);
                return;
            }
        }

        let Ok(mut trackers) = self.trackers.write() else {
            return;
        };
        // Another thread may have inserted the set in between.
        if let Some(tracker) = trackers.get(&attributes) {
            self.add_to(tracker, value);
        } else if trackers.len() < self.cardinality_limit {
            let tracker = Arc::new(T::new_atomic());
            self.add_to(&tracker, value);
            trackers.insert(attributes, tracker);
        } else {
            self.add_to(&self.overflow, value);
            if !self.has_overflow.swap(true, Ordering::Relaxed) {
                tel_warn!(
                    name: "Counter.CardinalityLimitReached",
                    counter = self.name.as_str(),
                    limit = self.cardinality_limit,
                    message = "Further attribute sets are recorded in the overflow series."
                );
            }
        }
    }

    fn add_to(&self, tracker: &T::Atomic, value: T) {
        if tracker.add(value) && !self.has_saturated.swap(true, Ordering::Relaxed) {
            tel_debug!(
                name: "Counter.Saturated",
                counter = self.name.as_str(),
                message = "A series reached the maximum value and stops increasing."
            );
        }
    }

    /// Cumulative snapshot of every series.
    pub(crate) fn snapshot(&self) -> data::Sum<T> {
        let mut data_points = match self.trackers.read() {
            Ok(trackers) => trackers
                .iter()
                .map(|(attributes, tracker)| SumDataPoint {
                    attributes: attributes.to_key_values(),
                    value: tracker.get(),
                })
                .collect(),
            Err(_) => Vec::new(),
        };
        if self.has_overflow.load(Ordering::Relaxed) {
            data_points.push(SumDataPoint {
                attributes: vec![KeyValue::new(OVERFLOW_ATTRIBUTE, true)],
                value: self.overflow.get(),
            });
        }

        data::Sum {
            data_points,
            start_time: self.start_time,
            time: SystemTime::now(),
            is_monotonic: true,
        }
    }
}

/// The aggregator behind a registered instrument.
#[derive(Clone, Debug)]
pub(crate) enum Aggregator {
    U64(Arc<Sum<u64>>),
    F64(Arc<Sum<f64>>),
    U64Gauge(Arc<ObservableGaugeState<u64>>),
    F64Gauge(Arc<ObservableGaugeState<f64>>),
}

impl Aggregator {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Aggregator::U64(_) => <u64 as Number>::KIND,
            Aggregator::F64(_) => <f64 as Number>::KIND,
            Aggregator::U64Gauge(_) => <u64 as GaugeNumber>::KIND,
            Aggregator::F64Gauge(_) => <f64 as GaugeNumber>::KIND,
        }
    }

    pub(crate) fn snapshot(&self) -> MetricData {
        match self {
            Aggregator::U64(sum) => MetricData::U64Sum(sum.snapshot()),
            Aggregator::F64(sum) => MetricData::F64Sum(sum.snapshot()),
            Aggregator::U64Gauge(gauge) => MetricData::U64Gauge(gauge.collect()),
            Aggregator::F64Gauge(gauge) => MetricData::F64Gauge(gauge.collect()),
        }
    }
}
