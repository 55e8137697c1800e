mod exporter;

pub use exporter::{LogExporter, LogExporterBuilder};
