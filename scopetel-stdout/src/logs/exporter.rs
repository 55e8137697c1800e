use crate::common::{default_writer, format_time, print_attributes, Output, Writer};
use core::fmt;
use futures_util::future::BoxFuture;
use scopetel::export::ExportResult;
use scopetel::logs::LogData;
use std::io::{self, Write};

/// An exporter that writes log records to stdout, or to any configured
/// writer.
pub struct LogExporter {
    output: Output,
}

impl LogExporter {
    /// Create a builder to configure this exporter.
    pub fn builder() -> LogExporterBuilder {
        LogExporterBuilder::default()
    }
}

impl Default for LogExporter {
    fn default() -> Self {
        LogExporterBuilder::default().build()
    }
}

impl fmt::Debug for LogExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LogExporter")
    }
}

impl scopetel::logs::LogExporter for LogExporter {
    fn export(&mut self, batch: Vec<LogData>) -> BoxFuture<'static, ExportResult> {
        let resource = batch.first().map(|log| log.resource.clone());
        let result = self
            .output
            .write(resource.as_deref(), |w| print_logs(w, &batch));
        Box::pin(futures_util::future::ready(result))
    }

    fn shutdown(&mut self) -> ExportResult {
        self.output.shutdown()
    }
}

fn print_logs(w: &mut dyn Write, batch: &[LogData]) -> io::Result<()> {
    writeln!(w, "Logs")?;
    for (i, log) in batch.iter().enumerate() {
        let record = &log.record;
        writeln!(w, "Log #{}", i)?;
        writeln!(
            w,
            "\t Instrumentation Scope: {:?}",
            log.instrumentation_scope.name()
        )?;
        if let Some(trace_context) = &record.trace_context {
            writeln!(w, "\t TraceId: {}", trace_context.trace_id)?;
            writeln!(w, "\t SpanId: {}", trace_context.span_id)?;
            writeln!(w, "\t TraceFlags: {:?}", trace_context.trace_flags)?;
        }
        if let Some(timestamp) = record.timestamp {
            writeln!(w, "\t Timestamp: {}", format_time(timestamp))?;
        }
        writeln!(w, "\t SeverityText: {}", record.severity)?;
        writeln!(w, "\t SeverityNumber: {}", record.severity.number())?;
        writeln!(w, "\t Template: {:?}", record.template)?;
        if let Some(message) = &record.message {
            writeln!(w, "\t Body: {:?}", message)?;
        }
        print_attributes(w, "\t", "Attributes", &record.fields)?;
    }
    Ok(())
}

/// Configuration for the stdout log exporter.
#[derive(Default)]
pub struct LogExporterBuilder {
    writer: Option<Writer>,
}

impl fmt::Debug for LogExporterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LogExporterBuilder")
    }
}

impl LogExporterBuilder {
    /// Set the writer that the exporter will write to. Defaults to stdout.
    pub fn with_writer<W>(mut self, writer: W) -> Self
    where
        W: Write + Send + Sync + 'static,
    {
        self.writer = Some(Box::new(writer));
        self
    }

    /// Create a log exporter with the current configuration.
    pub fn build(self) -> LogExporter {
        LogExporter {
            output: Output::new(self.writer.unwrap_or_else(default_writer)),
        }
    }
}
