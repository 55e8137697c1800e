//! The OTLP/JSON mapping of spans, metrics and logs.
mod common;
mod logs;
mod metrics;
mod trace;

pub(crate) use logs::LogsData;
pub(crate) use metrics::MetricsData;
pub(crate) use trace::TracesData;
