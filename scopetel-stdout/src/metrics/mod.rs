mod exporter;

pub use exporter::{MetricExporter, MetricExporterBuilder};
