//! Snapshots handed to metric exporters.
//!
//! Counters are reported with cumulative temporality: every snapshot carries
//! the running total of each series since the series' meter provider started.
//! Gauges carry whatever their callbacks observed during the collection.
use crate::common::{InstrumentationScope, KeyValue};
use crate::resource::Resource;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::SystemTime;

/// One snapshot of every counter of a meter provider, grouped by scope.
#[derive(Clone, Debug)]
pub struct ResourceMetrics {
    /// The service the counters belong to.
    pub resource: Arc<Resource>,
    /// One entry per scope that registered counters.
    pub scope_metrics: Vec<ScopeMetrics>,
}

impl ResourceMetrics {
    /// Finds a metric by instrument name across all scopes.
    pub fn metric(&self, name: &str) -> Option<&Metric> {
        self.scope_metrics
            .iter()
            .flat_map(|scope| scope.metrics.iter())
            .find(|metric| metric.name == name)
    }

    pub(crate) fn data_point_count(&self) -> usize {
        self.scope_metrics
            .iter()
            .flat_map(|scope| scope.metrics.iter())
            .map(|metric| match &metric.data {
                MetricData::U64Sum(sum) => sum.data_points.len(),
                MetricData::F64Sum(sum) => sum.data_points.len(),
                MetricData::U64Gauge(gauge) => gauge.data_points.len(),
                MetricData::F64Gauge(gauge) => gauge.data_points.len(),
            })
            .sum()
    }
}

/// The counters registered under one [`InstrumentationScope`].
#[derive(Clone, Default, Debug)]
pub struct ScopeMetrics {
    /// Scope of the meter the counters were created from.
    pub scope: InstrumentationScope,
    /// The counters, in registration order.
    pub metrics: Vec<Metric>,
}

/// The series of one counter.
#[derive(Clone, Debug)]
pub struct Metric {
    /// Counter name, unique within the provider.
    pub name: Cow<'static, str>,
    /// Free-form description; empty if none was given.
    pub description: Cow<'static, str>,
    /// Unit such as `1` or `ms`; empty if none was given.
    pub unit: Cow<'static, str>,
    /// The running totals.
    pub data: MetricData,
}

/// The data of one instrument, by instrument and value type.
#[derive(Clone, Debug)]
pub enum MetricData {
    /// Sum of a `u64` counter
    U64Sum(Sum<u64>),
    /// Sum of an `f64` counter
    F64Sum(Sum<f64>),
    /// Latest readings of a `u64` observable gauge
    U64Gauge(Gauge<u64>),
    /// Latest readings of an `f64` observable gauge
    F64Gauge(Gauge<f64>),
}

/// The running total of one attribute combination.
#[derive(Debug, Clone, PartialEq)]
pub struct SumDataPoint<T> {
    /// Identifies the series. Sorted by key.
    pub attributes: Vec<KeyValue>,
    /// Total since `start_time`.
    pub value: T,
}

/// Cumulative sums of a counter, one point per attribute combination.
#[derive(Debug, Clone)]
pub struct Sum<T> {
    /// One point per series.
    pub data_points: Vec<SumDataPoint<T>>,
    /// When the provider started counting.
    pub start_time: SystemTime,
    /// When this snapshot was taken.
    pub time: SystemTime,
    /// Always `true` for counters.
    pub is_monotonic: bool,
}

impl<T: Copy> Sum<T> {
    /// The value of the series identified by `attributes`, in any order.
    pub fn value_for(&self, attributes: &[KeyValue]) -> Option<T> {
        self.data_points
            .iter()
            .find(|point| {
                point.attributes.len() == attributes.len()
                    && attributes.iter().all(|kv| point.attributes.contains(kv))
            })
            .map(|point| point.value)
    }
}

/// One reading of an observable gauge.
#[derive(Debug, Clone, PartialEq)]
pub struct GaugeDataPoint<T> {
    /// Identifies the series. Sorted by key.
    pub attributes: Vec<KeyValue>,
    /// The value observed by the callback.
    pub value: T,
}

/// The readings an observable gauge's callbacks reported in one collection.
#[derive(Debug, Clone)]
pub struct Gauge<T> {
    /// One point per observed attribute combination.
    pub data_points: Vec<GaugeDataPoint<T>>,
    /// When the callbacks ran.
    pub time: SystemTime,
}

impl<T: Copy> Gauge<T> {
    /// The reading for the series identified by `attributes`, in any order.
    pub fn value_for(&self, attributes: &[KeyValue]) -> Option<T> {
        self.data_points
            .iter()
            .find(|point| {
                point.attributes.len() == attributes.len()
                    && attributes.iter().all(|kv| point.attributes.contains(kv))
            })
            .map(|point| point.value)
    }
}
