use crate::common::{default_writer, format_time, print_attributes, print_scope, Output};
use core::fmt;
use futures_util::future::BoxFuture;
use scopetel::export::ExportResult;
use scopetel::trace::{SpanData, SpanId};
use std::io::{self, Write};

/// An exporter that writes finished spans to stdout, or to any configured
/// writer, in a human readable form.
pub struct SpanExporter {
    output: Output,
}

impl SpanExporter {
    /// Create a builder to configure this exporter.
    pub fn builder() -> SpanExporterBuilder {
        SpanExporterBuilder::default()
    }
}

impl Default for SpanExporter {
    fn default() -> Self {
        SpanExporterBuilder::default().build()
    }
}

impl fmt::Debug for SpanExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SpanExporter")
    }
}

impl scopetel::trace::SpanExporter for SpanExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        let resource = batch.first().map(|span| span.resource.clone());
        let result = self
            .output
            .write(resource.as_deref(), |w| print_spans(w, &batch));
        Box::pin(futures_util::future::ready(result))
    }

    fn shutdown(&mut self) -> ExportResult {
        self.output.shutdown()
    }
}

fn print_spans(w: &mut dyn Write, batch: &[SpanData]) -> io::Result<()> {
    writeln!(w, "Spans")?;
    for (i, span) in batch.iter().enumerate() {
        writeln!(w, "Span #{}", i)?;
        print_scope(w, "\t", &span.instrumentation_scope)?;
        writeln!(w)?;
        writeln!(w, "\t Name         : {}", span.name)?;
        writeln!(w, "\t TraceId      : {}", span.span_context.trace_id())?;
        writeln!(w, "\t SpanId       : {}", span.span_context.span_id())?;
        if span.parent_span_id != SpanId::INVALID {
            writeln!(w, "\t ParentSpanId : {}", span.parent_span_id)?;
        }
        writeln!(w, "\t Kind         : {}", span.span_kind)?;
        writeln!(w, "\t Start time   : {}", format_time(span.start_time))?;
        writeln!(w, "\t End time     : {}", format_time(span.end_time))?;
        writeln!(w, "\t Status       : {:?}", span.status)?;

        print_attributes(w, "\t", "Attributes", &span.attributes)?;
        if span.dropped_attributes_count > 0 {
            writeln!(
                w,
                "\t Dropped attributes count: {}",
                span.dropped_attributes_count
            )?;
        }

        if !span.events.is_empty() {
            writeln!(w, "\t Events:")?;
            for (j, event) in span.events.iter().enumerate() {
                writeln!(w, "\t Event #{}", j)?;
                writeln!(w, "\t Name      : {}", event.name)?;
                writeln!(w, "\t Timestamp : {}", format_time(event.timestamp))?;
                print_attributes(w, "\t\t", "Attributes", &event.attributes)?;
            }
        }
    }
    Ok(())
}

/// Configuration for the stdout span exporter.
#[derive(Default)]
pub struct SpanExporterBuilder {
    writer: Option<crate::common::Writer>,
}

impl fmt::Debug for SpanExporterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SpanExporterBuilder")
    }
}

impl SpanExporterBuilder {
    /// Set the writer that the exporter will write to. Defaults to stdout.
    pub fn with_writer<W>(mut self, writer: W) -> Self
    where
        W: Write + Send + Sync + 'static,
    {
        self.writer = Some(Box::new(writer));
        self
    }

    /// Create a span exporter with the current configuration.
    pub fn build(self) -> SpanExporter {
        SpanExporter {
            output: Output::new(self.writer.unwrap_or_else(default_writer)),
        }
    }
}
