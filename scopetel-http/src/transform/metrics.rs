use crate::transform::common::{as_unix_nano, KeyValue, Resource, Scope};
use scopetel::metrics::data as sdk;
use serde::Serialize;
use std::borrow::Cow;
use std::time::SystemTime;

/// `AGGREGATION_TEMPORALITY_CUMULATIVE` in the OTLP data model.
const CUMULATIVE: u8 = 2;

/// Body of a `POST /v1/metrics` request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MetricsData {
    resource_metrics: Vec<ResourceMetrics>,
}

impl From<&sdk::ResourceMetrics> for MetricsData {
    fn from(value: &sdk::ResourceMetrics) -> Self {
        MetricsData {
            resource_metrics: vec![ResourceMetrics {
                resource: value.resource.as_ref().into(),
                scope_metrics: value.scope_metrics.iter().map(Into::into).collect(),
            }],
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResourceMetrics {
    resource: Resource,
    scope_metrics: Vec<ScopeMetrics>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScopeMetrics {
    scope: Scope,
    metrics: Vec<Metric>,
}

impl From<&sdk::ScopeMetrics> for ScopeMetrics {
    fn from(value: &sdk::ScopeMetrics) -> Self {
        ScopeMetrics {
            scope: (&value.scope).into(),
            metrics: value.metrics.iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Metric {
    name: Cow<'static, str>,
    #[serde(skip_serializing_if = "str::is_empty")]
    description: Cow<'static, str>,
    #[serde(skip_serializing_if = "str::is_empty")]
    unit: Cow<'static, str>,
    #[serde(flatten)]
    data: Data,
}

/// The data field of a metric is named after its type.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum Data {
    Sum(Sum),
    Gauge(Gauge),
}

impl From<&sdk::Metric> for Metric {
    fn from(value: &sdk::Metric) -> Self {
        Metric {
            name: value.name.clone(),
            description: value.description.clone(),
            unit: value.unit.clone(),
            data: match &value.data {
                sdk::MetricData::U64Sum(sum) => {
                    Data::Sum(Sum::new(sum, |v| DataValue::AsInt(v.to_string())))
                }
                sdk::MetricData::F64Sum(sum) => Data::Sum(Sum::new(sum, DataValue::AsDouble)),
                sdk::MetricData::U64Gauge(gauge) => {
                    Data::Gauge(Gauge::new(gauge, |v| DataValue::AsInt(v.to_string())))
                }
                sdk::MetricData::F64Gauge(gauge) => {
                    Data::Gauge(Gauge::new(gauge, DataValue::AsDouble))
                }
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Sum {
    data_points: Vec<DataPoint>,
    aggregation_temporality: u8,
    is_monotonic: bool,
}

impl Sum {
    fn new<T: Copy>(sum: &sdk::Sum<T>, value: impl Fn(T) -> DataValue) -> Self {
        Sum {
            data_points: sum
                .data_points
                .iter()
                .map(|point| DataPoint {
                    attributes: point.attributes.iter().map(Into::into).collect(),
                    start_time_unix_nano: sum.start_time,
                    time_unix_nano: sum.time,
                    value: value(point.value),
                })
                .collect(),
            aggregation_temporality: CUMULATIVE,
            is_monotonic: sum.is_monotonic,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Gauge {
    data_points: Vec<GaugeDataPoint>,
}

impl Gauge {
    fn new<T: Copy>(gauge: &sdk::Gauge<T>, value: impl Fn(T) -> DataValue) -> Self {
        Gauge {
            data_points: gauge
                .data_points
                .iter()
                .map(|point| GaugeDataPoint {
                    attributes: point.attributes.iter().map(Into::into).collect(),
                    time_unix_nano: gauge.time,
                    value: value(point.value),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GaugeDataPoint {
    attributes: Vec<KeyValue>,
    #[serde(serialize_with = "as_unix_nano")]
    time_unix_nano: SystemTime,
    #[serde(flatten)]
    value: DataValue,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DataPoint {
    attributes: Vec<KeyValue>,
    #[serde(serialize_with = "as_unix_nano")]
    start_time_unix_nano: SystemTime,
    #[serde(serialize_with = "as_unix_nano")]
    time_unix_nano: SystemTime,
    #[serde(flatten)]
    value: DataValue,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum DataValue {
    /// 64-bit integers are strings in the JSON mapping.
    AsInt(String),
    AsDouble(f64),
}
