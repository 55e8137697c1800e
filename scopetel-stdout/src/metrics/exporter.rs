use crate::common::{default_writer, format_time, print_scope, Output, Writer};
use core::fmt;
use futures_util::future::BoxFuture;
use scopetel::export::ExportResult;
use scopetel::metrics::data::{Gauge, MetricData, ResourceMetrics, Sum};
use scopetel::KeyValue;
use std::io::{self, Write};

/// An exporter that writes cumulative metric snapshots to stdout, or to any
/// configured writer.
pub struct MetricExporter {
    output: Output,
}

impl MetricExporter {
    /// Create a builder to configure this exporter.
    pub fn builder() -> MetricExporterBuilder {
        MetricExporterBuilder::default()
    }
}

impl Default for MetricExporter {
    fn default() -> Self {
        MetricExporterBuilder::default().build()
    }
}

impl fmt::Debug for MetricExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MetricExporter")
    }
}

impl scopetel::metrics::MetricExporter for MetricExporter {
    fn export(&mut self, metrics: &ResourceMetrics) -> BoxFuture<'static, ExportResult> {
        let result = self
            .output
            .write(Some(metrics.resource.as_ref()), |w| print_metrics(w, metrics));
        Box::pin(futures_util::future::ready(result))
    }

    fn shutdown(&mut self) -> ExportResult {
        self.output.shutdown()
    }
}

fn print_metrics(w: &mut dyn Write, metrics: &ResourceMetrics) -> io::Result<()> {
    writeln!(w, "Metrics")?;
    for (i, scope_metrics) in metrics.scope_metrics.iter().enumerate() {
        writeln!(w, "\tScope #{}", i)?;
        print_scope(w, "\t\t", &scope_metrics.scope)?;
        for (j, metric) in scope_metrics.metrics.iter().enumerate() {
            writeln!(w, "Metric #{}", j)?;
            writeln!(w, "\t\t Name         : {}", metric.name)?;
            if !metric.description.is_empty() {
                writeln!(w, "\t\t Description  : {}", metric.description)?;
            }
            if !metric.unit.is_empty() {
                writeln!(w, "\t\t Unit         : {}", metric.unit)?;
            }
            match &metric.data {
                MetricData::U64Sum(sum) => print_sum(w, "u64", sum)?,
                MetricData::F64Sum(sum) => print_sum(w, "f64", sum)?,
                MetricData::U64Gauge(gauge) => print_gauge(w, "u64", gauge)?,
                MetricData::F64Gauge(gauge) => print_gauge(w, "f64", gauge)?,
            }
        }
    }
    Ok(())
}

fn print_sum<T: fmt::Display>(w: &mut dyn Write, kind: &str, sum: &Sum<T>) -> io::Result<()> {
    writeln!(w, "\t\t Type         : Sum<{}>", kind)?;
    writeln!(w, "\t\t Temporality  : Cumulative")?;
    writeln!(w, "\t\t Monotonic    : {}", sum.is_monotonic)?;
    writeln!(w, "\t\t StartTime    : {}", format_time(sum.start_time))?;
    writeln!(w, "\t\t EndTime      : {}", format_time(sum.time))?;
    writeln!(w, "\t\t SumDataPoints")?;
    for (i, point) in sum.data_points.iter().enumerate() {
        writeln!(w, "\t\t DataPoint #{}", i)?;
        writeln!(w, "\t\t\t Value        : {}", point.value)?;
        writeln!(w, "\t\t\t Attributes   :")?;
        print_point_attributes(w, &point.attributes)?;
    }
    Ok(())
}

fn print_gauge<T: fmt::Display>(w: &mut dyn Write, kind: &str, gauge: &Gauge<T>) -> io::Result<()> {
    writeln!(w, "\t\t Type         : Gauge<{}>", kind)?;
    writeln!(w, "\t\t Time         : {}", format_time(gauge.time))?;
    writeln!(w, "\t\t GaugeDataPoints")?;
    for (i, point) in gauge.data_points.iter().enumerate() {
        writeln!(w, "\t\t DataPoint #{}", i)?;
        writeln!(w, "\t\t\t Value        : {}", point.value)?;
        writeln!(w, "\t\t\t Attributes   :")?;
        print_point_attributes(w, &point.attributes)?;
    }
    Ok(())
}

fn print_point_attributes(w: &mut dyn Write, attributes: &[KeyValue]) -> io::Result<()> {
    for kv in attributes {
        writeln!(w, "\t\t\t\t ->  {}: {}", kv.key, kv.value)?;
    }
    Ok(())
}

/// Configuration for the stdout metric exporter.
#[derive(Default)]
pub struct MetricExporterBuilder {
    writer: Option<Writer>,
}

impl fmt::Debug for MetricExporterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MetricExporterBuilder")
    }
}

impl MetricExporterBuilder {
    /// Set the writer that the exporter will write to. Defaults to stdout.
    pub fn with_writer<W>(mut self, writer: W) -> Self
    where
        W: Write + Send + Sync + 'static,
    {
        self.writer = Some(Box::new(writer));
        self
    }

    /// Create a metric exporter with the current configuration.
    pub fn build(self) -> MetricExporter {
        MetricExporter {
            output: Output::new(self.writer.unwrap_or_else(default_writer)),
        }
    }
}
