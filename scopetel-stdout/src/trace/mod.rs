mod exporter;

pub use exporter::{SpanExporter, SpanExporterBuilder};
