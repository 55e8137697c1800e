use chrono::{DateTime, Utc};
use scopetel::export::ExportError;
use scopetel::{InstrumentationScope, KeyValue, Resource};
use std::io::{self, stdout, Write};
use std::time::SystemTime;

pub(crate) type Writer = Box<dyn Write + Send + Sync>;

pub(crate) fn default_writer() -> Writer {
    Box::new(stdout())
}

/// The sink shared by the three exporters: an optional writer, gone once the
/// exporter is shut down, and whether the resource header was printed yet.
pub(crate) struct Output {
    writer: Option<Writer>,
    resource_emitted: bool,
}

impl Output {
    pub(crate) fn new(writer: Writer) -> Self {
        Output {
            writer: Some(writer),
            resource_emitted: false,
        }
    }

    /// Runs `f` against the writer, printing the resource header first if
    /// this is the first export.
    pub(crate) fn write<F>(&mut self, resource: Option<&Resource>, f: F) -> Result<(), ExportError>
    where
        F: FnOnce(&mut dyn Write) -> io::Result<()>,
    {
        let writer: &mut dyn Write = self
            .writer
            .as_mut()
            .ok_or(ExportError::AlreadyShutdown)?
            .as_mut();
        let result = (|| {
            if let Some(resource) = resource.filter(|_| !self.resource_emitted) {
                print_resource(writer, resource)?;
                self.resource_emitted = true;
            }
            f(writer)?;
            writer.flush()
        })();
        result.map_err(|err| ExportError::Transport(err.to_string()))
    }

    pub(crate) fn shutdown(&mut self) -> Result<(), ExportError> {
        match self.writer.take() {
            Some(mut writer) => writer
                .flush()
                .map_err(|err| ExportError::Transport(err.to_string())),
            None => Err(ExportError::AlreadyShutdown),
        }
    }
}

fn print_resource(w: &mut dyn Write, resource: &Resource) -> io::Result<()> {
    writeln!(w, "Resource")?;
    for kv in resource.iter() {
        writeln!(w, "\t ->  {}={}", kv.key, kv.value)?;
    }
    Ok(())
}

pub(crate) fn print_scope(w: &mut dyn Write, indent: &str, scope: &InstrumentationScope) -> io::Result<()> {
    writeln!(w, "{indent}Instrumentation Scope")?;
    writeln!(w, "{indent}\t Name: {:?}", scope.name())?;
    if let Some(version) = scope.version() {
        writeln!(w, "{indent}\t Version: {:?}", version)?;
    }
    Ok(())
}

pub(crate) fn print_attributes(
    w: &mut dyn Write,
    indent: &str,
    header: &str,
    attributes: &[KeyValue],
) -> io::Result<()> {
    if attributes.is_empty() {
        return Ok(());
    }
    writeln!(w, "{indent} {header}:")?;
    for kv in attributes {
        writeln!(w, "{indent}\t ->  {}: {}", kv.key, kv.value)?;
    }
    Ok(())
}

pub(crate) fn format_time(time: SystemTime) -> String {
    let datetime: DateTime<Utc> = time.into();
    datetime.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

#[cfg(test)]
pub(crate) mod test_utils {
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    /// A writer whose contents can be read back after it was handed to an
    /// exporter.
    #[derive(Clone, Debug, Default)]
    pub(crate) struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        pub(crate) fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
