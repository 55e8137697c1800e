use crate::context::Context;
use crate::env;
use crate::error::{SdkError, SdkResult};
use crate::export::{export_with_retry, ExportDiagnostics, RetryPolicy};
use crate::metrics::pipeline::Pipeline;
use crate::metrics::MetricExporter;
use crate::{tel_debug, tel_error, tel_warn};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);
const CONTROL_CHANNEL_SIZE: usize = 16;

/// Interval between the start of two exports, in milliseconds.
pub(crate) const OTEL_METRIC_EXPORT_INTERVAL: &str = "OTEL_METRIC_EXPORT_INTERVAL";

/// Configuration options for [PeriodicReader].
///
/// By default the reader exports every 60 seconds, or every
/// `OTEL_METRIC_EXPORT_INTERVAL` milliseconds when that variable is set.
/// The export time is not counted towards the interval between attempts.
#[derive(Debug)]
pub struct PeriodicReaderBuilder<E> {
    interval: Duration,
    retry_policy: RetryPolicy,
    exporter: E,
}

impl<E> PeriodicReaderBuilder<E>
where
    E: MetricExporter,
{
    fn new(exporter: E) -> Self {
        let interval = env::parse_millis(OTEL_METRIC_EXPORT_INTERVAL)
            .filter(|interval| !interval.is_zero())
            .unwrap_or(DEFAULT_INTERVAL);

        PeriodicReaderBuilder {
            interval,
            retry_policy: RetryPolicy::default(),
            exporter,
        }
    }

    /// Configures the intervening time between exports for a [PeriodicReader].
    ///
    /// This option overrides any value set for the `OTEL_METRIC_EXPORT_INTERVAL`
    /// environment variable. A zero `interval` is ignored.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.interval = interval;
        }
        self
    }

    /// Set the policy for retrying failed exports.
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Create a [PeriodicReader] with the given config.
    pub fn build(self) -> PeriodicReader {
        PeriodicReader::new(self.exporter, self.interval, self.retry_policy)
    }
}

enum Message {
    Flush(SyncSender<SdkResult>),
    Shutdown(SyncSender<SdkResult>),
}

/// Collects a cumulative snapshot of every counter at a set interval and
/// hands it to a [`MetricExporter`] from a dedicated thread.
///
/// The reader is attached to a [`MeterProvider`] with
/// [`MeterProviderBuilder::with_reader`]. Snapshots are also exported on
/// `force_flush` and once more at shutdown. Snapshots without any data
/// points are not exported.
///
/// [`MeterProvider`]: crate::metrics::MeterProvider
/// [`MeterProviderBuilder::with_reader`]: crate::metrics::MeterProviderBuilder::with_reader
///
/// # Example
///
/// ```
/// use scopetel::metrics::{InMemoryMetricExporter, MeterProvider, PeriodicReader};
/// use std::time::Duration;
///
/// let reader = PeriodicReader::builder(InMemoryMetricExporter::default())
///     .with_interval(Duration::from_secs(10))
///     .build();
/// let provider = MeterProvider::builder().with_reader(reader).build();
/// # provider.shutdown().unwrap();
/// ```
#[derive(Clone)]
pub struct PeriodicReader {
    inner: Arc<PeriodicReaderInner>,
}

struct PeriodicReaderInner {
    message_sender: SyncSender<Message>,
    producer: Arc<Mutex<Option<Weak<Pipeline>>>>,
    diagnostics: Arc<ExportDiagnostics>,
    is_shutdown: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl PeriodicReader {
    /// Configuration options for a periodic reader
    pub fn builder<E>(exporter: E) -> PeriodicReaderBuilder<E>
    where
        E: MetricExporter,
    {
        PeriodicReaderBuilder::new(exporter)
    }

    fn new<E>(exporter: E, interval: Duration, retry_policy: RetryPolicy) -> Self
    where
        E: MetricExporter,
    {
        let (message_sender, message_receiver) = mpsc::sync_channel(CONTROL_CHANNEL_SIZE);
        let producer = Arc::new(Mutex::new(None));
        let diagnostics = Arc::new(ExportDiagnostics::default());

        let mut worker = Worker {
            exporter,
            producer: producer.clone(),
            diagnostics: diagnostics.clone(),
            retry_policy,
            interval,
        };

        let spawned = thread::Builder::new()
            .name("scopetel.PeriodicReader".to_string())
            .spawn(move || {
                let _suppress_guard = Context::enter_telemetry_suppressed_scope();
                tel_debug!(
                    name: "PeriodicReader.ThreadStarted",
                    interval_in_millisecs = interval.as_millis() as u64
                );
                worker.run(message_receiver);
                tel_debug!(name: "PeriodicReader.ThreadStopped");
            });

        let handle = match spawned {
            Ok(handle) => Some(handle),
            Err(err) => {
                tel_error!(
                    name: "PeriodicReader.ThreadSpawnFailed",
                    error = format!("{}", err)
                );
                None
            }
        };

        PeriodicReader {
            inner: Arc::new(PeriodicReaderInner {
                message_sender,
                producer,
                diagnostics,
                is_shutdown: AtomicBool::new(false),
                handle: Mutex::new(handle),
            }),
        }
    }

    /// Connects the reader to the registry it snapshots. A reader serves a
    /// single provider; registering again replaces the previous one.
    pub(crate) fn register_pipeline(&self, pipeline: Weak<Pipeline>) {
        match self.inner.producer.lock() {
            Ok(mut producer) => *producer = Some(pipeline),
            Err(err) => {
                tel_error!(
                    name: "PeriodicReader.RegisterPipelineFailed",
                    error = format!("{}", err)
                );
            }
        }
    }

    /// Counters of exported and failed snapshots.
    pub fn diagnostics(&self) -> Arc<ExportDiagnostics> {
        self.inner.diagnostics.clone()
    }

    /// Exports a snapshot now and waits for the result.
    pub(crate) fn force_flush(&self) -> SdkResult {
        if self.inner.is_shutdown.load(Ordering::Relaxed) {
            return Err(SdkError::AlreadyShutdown);
        }
        let (sender, receiver) = mpsc::sync_channel(1);
        self.send(Message::Flush(sender))?;
        receiver
            .recv_timeout(DEFAULT_FLUSH_TIMEOUT)
            .map_err(|err| match err {
                RecvTimeoutError::Timeout => SdkError::Timeout(DEFAULT_FLUSH_TIMEOUT),
                RecvTimeoutError::Disconnected => {
                    SdkError::InternalFailure("reader thread stopped".into())
                }
            })?
    }

    /// Exports a final snapshot, shuts the exporter down and stops the
    /// worker thread.
    pub(crate) fn shutdown_with_timeout(&self, timeout: Duration) -> SdkResult {
        if self
            .inner
            .is_shutdown
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SdkError::AlreadyShutdown);
        }

        let (sender, receiver) = mpsc::sync_channel(1);
        self.send(Message::Shutdown(sender))?;
        let result = receiver.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => SdkError::Timeout(timeout),
            RecvTimeoutError::Disconnected => {
                SdkError::InternalFailure("reader thread stopped".into())
            }
        })?;

        if let Some(handle) = self.inner.handle.lock()?.take() {
            if handle.join().is_err() {
                tel_error!(name: "PeriodicReader.ThreadPanicked");
            }
        }
        result
    }

    fn send(&self, message: Message) -> SdkResult {
        self.inner
            .message_sender
            .try_send(message)
            .map_err(|err| match err {
                TrySendError::Full(_) => SdkError::InternalFailure("control channel is full".into()),
                TrySendError::Disconnected(_) => SdkError::AlreadyShutdown,
            })
    }
}

impl fmt::Debug for PeriodicReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicReader")
            .field("is_shutdown", &self.inner.is_shutdown.load(Ordering::Relaxed))
            .finish()
    }
}

struct Worker<E> {
    exporter: E,
    producer: Arc<Mutex<Option<Weak<Pipeline>>>>,
    diagnostics: Arc<ExportDiagnostics>,
    retry_policy: RetryPolicy,
    interval: Duration,
}

impl<E: MetricExporter> Worker<E> {
    fn run(&mut self, receiver: mpsc::Receiver<Message>) {
        let mut interval_start = Instant::now();
        loop {
            let remaining = self.interval.saturating_sub(interval_start.elapsed());
            match receiver.recv_timeout(remaining) {
                Ok(Message::Flush(sender)) => {
                    tel_debug!(name: "PeriodicReader.ExportingDueToFlush");
                    let _ = sender.send(self.collect_and_export());
                }
                Ok(Message::Shutdown(sender)) => {
                    tel_debug!(name: "PeriodicReader.ExportingDueToShutdown");
                    let result = self.collect_and_export();
                    let shutdown_result = self.exporter.shutdown().map_err(|err| {
                        SdkError::InternalFailure(format!("exporter shutdown failed: {}", err))
                    });
                    let _ = sender.send(result.and(shutdown_result));
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {
                    tel_debug!(name: "PeriodicReader.ExportingDueToTimer");
                    interval_start = Instant::now();
                    let _ = self.collect_and_export();
                }
                Err(RecvTimeoutError::Disconnected) => {
                    let _ = self.exporter.shutdown();
                    break;
                }
            }
        }
    }

    fn collect_and_export(&mut self) -> SdkResult {
        let pipeline = match self.producer.lock()?.as_ref() {
            Some(weak) => weak.upgrade(),
            // not attached to a provider yet
            None => return Ok(()),
        };
        let Some(pipeline) = pipeline else {
            return Err(SdkError::InternalFailure("meter provider dropped".into()));
        };

        let metrics = pipeline.produce();
        let points = metrics.data_point_count();
        if points == 0 {
            tel_debug!(name: "PeriodicReader.NoMetricsCollected");
            return Ok(());
        }

        let exporter = &mut self.exporter;
        let result = export_with_retry(&self.retry_policy, "PeriodicReader", || {
            futures_executor::block_on(exporter.export(&metrics))
        });
        match result {
            Ok(()) => {
                self.diagnostics.record_exported(points);
                Ok(())
            }
            Err(err) => {
                self.diagnostics.record_failed();
                tel_warn!(
                    name: "PeriodicReader.ExportFailed",
                    data_points = points,
                    error = format!("{}", err)
                );
                Err(SdkError::InternalFailure(format!(
                    "metric snapshot dropped: {}",
                    err
                )))
            }
        }
    }
}
