//! The bounded queue and worker thread behind the batch processors.
//!
//! Producers push into a `Mutex<VecDeque>` and never block on export. The
//! worker thread is woken through a control channel when a full batch is
//! available, on `force_flush` and on shutdown, and otherwise exports every
//! `scheduled_delay`.
use crate::context::Context;
use crate::env;
use crate::error::{SdkError, SdkResult};
use crate::export::retry::export_with_retry;
use crate::export::{ExportDiagnostics, ExportResult, RetryPolicy};
use crate::{tel_debug, tel_error, tel_warn};
use futures_util::future::BoxFuture;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Delay interval between two consecutive span exports.
pub(crate) const OTEL_BSP_SCHEDULE_DELAY: &str = "OTEL_BSP_SCHEDULE_DELAY";
/// Default delay interval between two consecutive span exports.
pub(crate) const OTEL_BSP_SCHEDULE_DELAY_DEFAULT: Duration = Duration::from_millis(5_000);
/// Maximum queue size for spans.
pub(crate) const OTEL_BSP_MAX_QUEUE_SIZE: &str = "OTEL_BSP_MAX_QUEUE_SIZE";
/// Maximum batch size for span exports.
pub(crate) const OTEL_BSP_MAX_EXPORT_BATCH_SIZE: &str = "OTEL_BSP_MAX_EXPORT_BATCH_SIZE";

/// Delay interval between two consecutive log exports.
pub(crate) const OTEL_BLRP_SCHEDULE_DELAY: &str = "OTEL_BLRP_SCHEDULE_DELAY";
/// Default delay interval between two consecutive log exports.
pub(crate) const OTEL_BLRP_SCHEDULE_DELAY_DEFAULT: Duration = Duration::from_millis(1_000);
/// Maximum queue size for log records.
pub(crate) const OTEL_BLRP_MAX_QUEUE_SIZE: &str = "OTEL_BLRP_MAX_QUEUE_SIZE";
/// Maximum batch size for log exports.
pub(crate) const OTEL_BLRP_MAX_EXPORT_BATCH_SIZE: &str = "OTEL_BLRP_MAX_EXPORT_BATCH_SIZE";

/// Default maximum queue size.
pub(crate) const MAX_QUEUE_SIZE_DEFAULT: usize = 2_048;
/// Default maximum batch size.
pub(crate) const MAX_EXPORT_BATCH_SIZE_DEFAULT: usize = 512;

const DEFAULT_FORCE_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);
const CONTROL_CHANNEL_SIZE: usize = 64;

/// Batch processor configuration.
/// Use [`BatchConfigBuilder`] to configure your own instance of [`BatchConfig`].
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// The maximum queue size to buffer items for delayed processing. If the
    /// queue gets full it drops its oldest items.
    pub(crate) max_queue_size: usize,

    /// The delay interval between two consecutive processing of batches.
    pub(crate) scheduled_delay: Duration,

    /// The maximum number of items to process in a single batch. If there are
    /// more than one batch worth of items then it processes multiple batches
    /// of items one batch after the other without any delay.
    pub(crate) max_export_batch_size: usize,

    /// Applied to every batch before it is dropped.
    pub(crate) retry_policy: RetryPolicy,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfigBuilder::for_spans().build()
    }
}

impl BatchConfig {
    /// Maximum number of queued items.
    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }

    /// Delay between two scheduled exports.
    pub fn scheduled_delay(&self) -> Duration {
        self.scheduled_delay
    }

    /// Maximum number of items per exported batch.
    pub fn max_export_batch_size(&self) -> usize {
        self.max_export_batch_size
    }

    /// Retry policy applied to each batch.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }
}

/// A builder for creating [`BatchConfig`] instances.
#[derive(Debug)]
pub struct BatchConfigBuilder {
    max_queue_size: usize,
    scheduled_delay: Duration,
    max_export_batch_size: usize,
    retry_policy: RetryPolicy,
}

impl Default for BatchConfigBuilder {
    /// Same as [`BatchConfigBuilder::for_spans`].
    fn default() -> Self {
        BatchConfigBuilder::for_spans()
    }
}

impl BatchConfigBuilder {
    /// Span defaults, overridden by `OTEL_BSP_SCHEDULE_DELAY`,
    /// `OTEL_BSP_MAX_QUEUE_SIZE` and `OTEL_BSP_MAX_EXPORT_BATCH_SIZE`.
    pub fn for_spans() -> Self {
        BatchConfigBuilder::from_env(
            OTEL_BSP_SCHEDULE_DELAY,
            OTEL_BSP_SCHEDULE_DELAY_DEFAULT,
            OTEL_BSP_MAX_QUEUE_SIZE,
            OTEL_BSP_MAX_EXPORT_BATCH_SIZE,
        )
    }

    /// Log record defaults, overridden by `OTEL_BLRP_SCHEDULE_DELAY`,
    /// `OTEL_BLRP_MAX_QUEUE_SIZE` and `OTEL_BLRP_MAX_EXPORT_BATCH_SIZE`.
    pub fn for_logs() -> Self {
        BatchConfigBuilder::from_env(
            OTEL_BLRP_SCHEDULE_DELAY,
            OTEL_BLRP_SCHEDULE_DELAY_DEFAULT,
            OTEL_BLRP_MAX_QUEUE_SIZE,
            OTEL_BLRP_MAX_EXPORT_BATCH_SIZE,
        )
    }

    fn from_env(
        delay_var: &str,
        default_delay: Duration,
        queue_var: &str,
        batch_var: &str,
    ) -> Self {
        BatchConfigBuilder {
            max_queue_size: env::parse(queue_var).unwrap_or(MAX_QUEUE_SIZE_DEFAULT),
            scheduled_delay: env::parse_millis(delay_var).unwrap_or(default_delay),
            max_export_batch_size: env::parse(batch_var).unwrap_or(MAX_EXPORT_BATCH_SIZE_DEFAULT),
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Set max_queue_size for [`BatchConfigBuilder`].
    /// It's the maximum queue size to buffer items for delayed processing.
    /// If the queue gets full it will drop its oldest items.
    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    /// Set scheduled_delay for [`BatchConfigBuilder`].
    pub fn with_scheduled_delay(mut self, scheduled_delay: Duration) -> Self {
        self.scheduled_delay = scheduled_delay;
        self
    }

    /// Set max_export_batch_size for [`BatchConfigBuilder`].
    /// It's the maximum number of items to process in a single batch. Values
    /// above the queue size are capped to it.
    pub fn with_max_export_batch_size(mut self, max_export_batch_size: usize) -> Self {
        self.max_export_batch_size = max_export_batch_size;
        self
    }

    /// Set the retry policy applied to each exported batch.
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Builds a `BatchConfig`, enforcing `1 <= max_export_batch_size <= max_queue_size`.
    pub fn build(self) -> BatchConfig {
        let max_queue_size = self.max_queue_size.max(1);
        let max_export_batch_size = self.max_export_batch_size.clamp(1, max_queue_size);

        BatchConfig {
            max_queue_size,
            scheduled_delay: self.scheduled_delay,
            max_export_batch_size,
            retry_policy: self.retry_policy,
        }
    }
}

/// The sink end of a batch processor, implemented per signal.
pub(crate) trait BatchExport: Send + 'static {
    type Item: Clone + Send + 'static;

    fn export(&mut self, batch: Vec<Self::Item>) -> BoxFuture<'static, ExportResult>;

    fn shutdown(&mut self) -> ExportResult;
}

enum PushOutcome {
    Accepted(usize),
    DroppedOldest(usize),
    Closed,
}

#[derive(Debug)]
struct BoundedQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    closed: AtomicBool,
}

impl<T> BoundedQueue<T> {
    fn new(capacity: usize) -> Self {
        BoundedQueue {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            closed: AtomicBool::new(false),
        }
    }

    fn push(&self, item: T) -> PushOutcome {
        if self.closed.load(Ordering::Relaxed) {
            return PushOutcome::Closed;
        }
        let Ok(mut items) = self.items.lock() else {
            return PushOutcome::Closed;
        };
        // close() flips the flag under this lock
        if self.closed.load(Ordering::SeqCst) {
            return PushOutcome::Closed;
        }
        let dropped = if items.len() >= self.capacity {
            items.pop_front();
            true
        } else {
            false
        };
        items.push_back(item);
        if dropped {
            PushOutcome::DroppedOldest(items.len())
        } else {
            PushOutcome::Accepted(items.len())
        }
    }

    fn drain(&self, max: usize) -> Vec<T> {
        match self.items.lock() {
            Ok(mut items) => {
                let count = max.min(items.len());
                items.drain(..count).collect()
            }
            Err(_) => Vec::new(),
        }
    }

    fn len(&self) -> usize {
        self.items.lock().map(|items| items.len()).unwrap_or_default()
    }

    /// Returns `false` if the queue was already closed.
    ///
    /// Every push that was accepted happens before this returns, so a drain
    /// after `close` sees all of them.
    fn close(&self) -> bool {
        match self.items.lock() {
            Ok(_items) => !self.closed.swap(true, Ordering::SeqCst),
            Err(_) => !self.closed.swap(true, Ordering::SeqCst),
        }
    }
}

enum BatchMessage {
    /// A full batch is waiting in the queue.
    Export,
    ForceFlush(SyncSender<SdkResult>),
    Shutdown(SyncSender<SdkResult>),
}

/// A signal-agnostic batch processor: bounded drop-oldest queue plus a
/// dedicated export thread.
#[derive(Debug)]
pub(crate) struct BatchProcessor<T> {
    name: &'static str,
    queue: Arc<BoundedQueue<T>>,
    message_sender: SyncSender<BatchMessage>,
    handle: Mutex<Option<JoinHandle<()>>>,
    export_message_sent: Arc<AtomicBool>,
    max_export_batch_size: usize,
    diagnostics: Arc<ExportDiagnostics>,
    forceflush_timeout: Duration,
}

impl<T: Clone + Send + 'static> BatchProcessor<T> {
    /// Starts the worker thread. `name` labels the thread and the internal
    /// logs of this processor.
    pub(crate) fn new<E>(name: &'static str, exporter: E, config: BatchConfig) -> Self
    where
        E: BatchExport<Item = T>,
    {
        let (message_sender, message_receiver) = mpsc::sync_channel(CONTROL_CHANNEL_SIZE);
        let queue = Arc::new(BoundedQueue::new(config.max_queue_size));
        let export_message_sent = Arc::new(AtomicBool::new(false));
        let diagnostics = Arc::new(ExportDiagnostics::default());
        let max_export_batch_size = config.max_export_batch_size;

        let mut worker = Worker {
            name,
            exporter,
            queue: queue.clone(),
            export_message_sent: export_message_sent.clone(),
            diagnostics: diagnostics.clone(),
            config,
            last_export_time: Instant::now(),
        };

        let spawned = thread::Builder::new()
            .name(format!("scopetel.{}", name))
            .spawn(move || {
                // Exporting must not produce telemetry of its own.
                let _suppress_guard = Context::enter_telemetry_suppressed_scope();
                tel_debug!(
                    name: "BatchProcessor.ThreadStarted",
                    processor = name,
                    interval_in_millisecs = worker.config.scheduled_delay.as_millis() as u64,
                    max_export_batch_size = worker.config.max_export_batch_size,
                    max_queue_size = worker.config.max_queue_size
                );
                worker.run(message_receiver);
                tel_debug!(name: "BatchProcessor.ThreadStopped", processor = name);
            });

        let handle = match spawned {
            Ok(handle) => Some(handle),
            Err(err) => {
                // Without a worker the queue is never drained; pushes keep
                // dropping the oldest item and nothing reaches the sink.
                tel_error!(
                    name: "BatchProcessor.ThreadSpawnFailed",
                    processor = name,
                    error = format!("{}", err)
                );
                None
            }
        };

        BatchProcessor {
            name,
            queue,
            message_sender,
            handle: Mutex::new(handle),
            export_message_sent,
            max_export_batch_size,
            diagnostics,
            forceflush_timeout: DEFAULT_FORCE_FLUSH_TIMEOUT,
        }
    }

    /// Queues `item` without blocking.
    pub(crate) fn push(&self, item: T) {
        let len = match self.queue.push(item) {
            PushOutcome::Accepted(len) => len,
            PushOutcome::DroppedOldest(len) => {
                if self.diagnostics.record_dropped() == 0 {
                    tel_warn!(
                        name: "BatchProcessor.QueueFull",
                        processor = self.name,
                        message = "Queue is full, dropping the oldest items. The total dropped count is reported at shutdown."
                    );
                }
                len
            }
            PushOutcome::Closed => {
                self.diagnostics.record_dropped();
                tel_debug!(name: "BatchProcessor.AlreadyShutdown", processor = self.name);
                return;
            }
        };

        // Wake the worker only once per full batch.
        if len >= self.max_export_batch_size
            && !self.export_message_sent.swap(true, Ordering::Relaxed)
        {
            match self.message_sender.try_send(BatchMessage::Export) {
                Ok(()) => {}
                Err(_) => {
                    self.export_message_sent.store(false, Ordering::Relaxed);
                }
            }
        }
    }

    pub(crate) fn force_flush(&self) -> SdkResult {
        let (sender, receiver) = mpsc::sync_channel(1);
        match self
            .message_sender
            .try_send(BatchMessage::ForceFlush(sender))
        {
            Ok(()) => receiver
                .recv_timeout(self.forceflush_timeout)
                .map_err(|err| match err {
                    RecvTimeoutError::Timeout => SdkError::Timeout(self.forceflush_timeout),
                    RecvTimeoutError::Disconnected => {
                        SdkError::InternalFailure("export worker stopped".into())
                    }
                })?,
            Err(TrySendError::Full(_)) => Err(SdkError::InternalFailure(
                "control channel is full".into(),
            )),
            Err(TrySendError::Disconnected(_)) => Err(SdkError::AlreadyShutdown),
        }
    }

    pub(crate) fn shutdown(&self) -> SdkResult {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT)
    }

    /// Closes the queue, exports what is left and shuts the exporter down.
    ///
    /// Items pushed after this call are dropped and counted.
    pub(crate) fn shutdown_with_timeout(&self, timeout: Duration) -> SdkResult {
        if !self.queue.close() {
            return Err(SdkError::AlreadyShutdown);
        }

        let dropped = self.diagnostics.dropped_items();
        if dropped > 0 {
            tel_warn!(
                name: "BatchProcessor.ItemsDropped",
                processor = self.name,
                dropped_count = dropped,
                message = "Items were dropped due to a full queue. Consider a larger queue or a shorter scheduled delay."
            );
        }

        let (sender, receiver) = mpsc::sync_channel(1);
        match self.message_sender.try_send(BatchMessage::Shutdown(sender)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                return Err(SdkError::InternalFailure("control channel is full".into()))
            }
            Err(TrySendError::Disconnected(_)) => return Err(SdkError::AlreadyShutdown),
        }

        let result = receiver.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => SdkError::Timeout(timeout),
            RecvTimeoutError::Disconnected => {
                SdkError::InternalFailure("export worker stopped".into())
            }
        })?;

        if let Some(handle) = self.handle.lock()?.take() {
            if handle.join().is_err() {
                tel_error!(name: "BatchProcessor.ThreadPanicked", processor = self.name);
            }
        }
        result
    }

    pub(crate) fn diagnostics(&self) -> Arc<ExportDiagnostics> {
        self.diagnostics.clone()
    }

    #[cfg(test)]
    fn queued(&self) -> usize {
        self.queue.len()
    }
}

struct Worker<E: BatchExport> {
    name: &'static str,
    exporter: E,
    queue: Arc<BoundedQueue<E::Item>>,
    export_message_sent: Arc<AtomicBool>,
    diagnostics: Arc<ExportDiagnostics>,
    config: BatchConfig,
    last_export_time: Instant,
}

impl<E: BatchExport> Worker<E> {
    fn run(&mut self, receiver: mpsc::Receiver<BatchMessage>) {
        loop {
            let remaining_time = self
                .config
                .scheduled_delay
                .saturating_sub(self.last_export_time.elapsed());

            match receiver.recv_timeout(remaining_time) {
                Ok(BatchMessage::Export) => {
                    self.export_message_sent.store(false, Ordering::Relaxed);
                    let _ = self.export_pending();
                }
                Ok(BatchMessage::ForceFlush(sender)) => {
                    tel_debug!(name: "BatchProcessor.ExportingDueToForceFlush", processor = self.name);
                    let result = self.export_pending();
                    let _ = sender.send(result);
                }
                Ok(BatchMessage::Shutdown(sender)) => {
                    tel_debug!(name: "BatchProcessor.ExportingDueToShutdown", processor = self.name);
                    let result = self.export_pending();
                    let shutdown_result = self.exporter.shutdown().map_err(|err| {
                        SdkError::InternalFailure(format!("exporter shutdown failed: {}", err))
                    });
                    let _ = sender.send(result.and(shutdown_result));
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {
                    tel_debug!(name: "BatchProcessor.ExportingDueToTimer", processor = self.name);
                    let _ = self.export_pending();
                }
                Err(RecvTimeoutError::Disconnected) => {
                    tel_debug!(name: "BatchProcessor.ProcessorDropped", processor = self.name);
                    let _ = self.export_pending();
                    let _ = self.exporter.shutdown();
                    break;
                }
            }
        }
    }

    /// Exports everything queued when called, one batch at a time. Fails if
    /// any batch was dropped after exhausting its retries.
    fn export_pending(&mut self) -> SdkResult {
        self.last_export_time = Instant::now();
        let mut remaining = self.queue.len();
        let mut result = Ok(());

        while remaining > 0 {
            let batch = self.queue.drain(self.config.max_export_batch_size);
            if batch.is_empty() {
                break;
            }
            remaining = remaining.saturating_sub(batch.len());
            let count = batch.len();
            let exporter = &mut self.exporter;
            let export_result = export_with_retry(&self.config.retry_policy, self.name, || {
                futures_executor::block_on(exporter.export(batch.clone()))
            });

            match export_result {
                Ok(()) => self.diagnostics.record_exported(count),
                Err(err) => {
                    self.diagnostics.record_failed();
                    tel_warn!(
                        name: "BatchProcessor.ExportFailed",
                        processor = self.name,
                        batch_size = count,
                        error = format!("{}", err)
                    );
                    result = Err(SdkError::InternalFailure(format!(
                        "batch of {} items dropped: {}",
                        count, err
                    )));
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ExportError;
    use std::sync::atomic::AtomicUsize;

    #[derive(Clone, Debug, Default)]
    struct RecordingSink {
        batches: Arc<Mutex<Vec<Vec<u32>>>>,
        failures_left: Arc<AtomicUsize>,
        attempts: Arc<AtomicUsize>,
        shutdown_called: Arc<AtomicBool>,
    }

    impl RecordingSink {
        fn failing(times: usize) -> Self {
            let sink = RecordingSink::default();
            sink.failures_left.store(times, Ordering::SeqCst);
            sink
        }

        fn exported(&self) -> Vec<u32> {
            self.batches.lock().unwrap().iter().flatten().copied().collect()
        }
    }

    impl BatchExport for RecordingSink {
        type Item = u32;

        fn export(&mut self, batch: Vec<u32>) -> BoxFuture<'static, ExportResult> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let failing = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Box::pin(std::future::ready(Err(ExportError::Transport(
                    "sink unreachable".into(),
                ))));
            }
            self.batches.lock().unwrap().push(batch);
            Box::pin(std::future::ready(Ok(())))
        }

        fn shutdown(&mut self) -> ExportResult {
            self.shutdown_called.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config(max_queue_size: usize, max_export_batch_size: usize) -> BatchConfig {
        BatchConfigBuilder::for_spans()
            .with_max_queue_size(max_queue_size)
            .with_max_export_batch_size(max_export_batch_size)
            .with_scheduled_delay(Duration::from_secs(3600))
            .with_retry_policy(RetryPolicy {
                max_attempts: 3,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
                jitter: Duration::ZERO,
            })
            .build()
    }

    #[test]
    fn builder_caps_batch_size_at_queue_size() {
        let config = BatchConfigBuilder::for_spans()
            .with_max_queue_size(10)
            .with_max_export_batch_size(100)
            .build();
        assert_eq!(config.max_export_batch_size(), 10);

        let config = BatchConfigBuilder::for_spans()
            .with_max_queue_size(0)
            .with_max_export_batch_size(0)
            .build();
        assert_eq!(config.max_queue_size(), 1);
        assert_eq!(config.max_export_batch_size(), 1);
    }

    #[test]
    fn span_and_log_defaults() {
        temp_env::with_vars_unset(
            [
                OTEL_BSP_SCHEDULE_DELAY,
                OTEL_BSP_MAX_QUEUE_SIZE,
                OTEL_BSP_MAX_EXPORT_BATCH_SIZE,
                OTEL_BLRP_SCHEDULE_DELAY,
                OTEL_BLRP_MAX_QUEUE_SIZE,
                OTEL_BLRP_MAX_EXPORT_BATCH_SIZE,
            ],
            || {
                let spans = BatchConfigBuilder::for_spans().build();
                assert_eq!(spans.scheduled_delay(), OTEL_BSP_SCHEDULE_DELAY_DEFAULT);
                assert_eq!(spans.max_queue_size(), MAX_QUEUE_SIZE_DEFAULT);
                assert_eq!(spans.max_export_batch_size(), MAX_EXPORT_BATCH_SIZE_DEFAULT);
                assert_eq!(spans.retry_policy().max_attempts, 3);

                let logs = BatchConfigBuilder::for_logs().build();
                assert_eq!(logs.scheduled_delay(), OTEL_BLRP_SCHEDULE_DELAY_DEFAULT);
            },
        );
    }

    #[test]
    fn config_from_env() {
        temp_env::with_vars(
            [
                (OTEL_BSP_SCHEDULE_DELAY, Some("250")),
                (OTEL_BSP_MAX_QUEUE_SIZE, Some("100")),
                (OTEL_BSP_MAX_EXPORT_BATCH_SIZE, Some("10")),
            ],
            || {
                let config = BatchConfigBuilder::for_spans().build();
                assert_eq!(config.scheduled_delay(), Duration::from_millis(250));
                assert_eq!(config.max_queue_size(), 100);
                assert_eq!(config.max_export_batch_size(), 10);
            },
        );
    }

    #[test]
    fn queue_drops_oldest_when_full() {
        let queue = BoundedQueue::new(2);
        assert!(matches!(queue.push(1), PushOutcome::Accepted(1)));
        assert!(matches!(queue.push(2), PushOutcome::Accepted(2)));
        assert!(matches!(queue.push(3), PushOutcome::DroppedOldest(2)));
        assert_eq!(queue.drain(10), vec![2, 3]);

        assert!(queue.close());
        assert!(!queue.close());
        assert!(matches!(queue.push(4), PushOutcome::Closed));
    }

    #[test]
    fn no_item_lands_after_close_and_final_drain() {
        for _ in 0..50 {
            let queue = Arc::new(BoundedQueue::new(100_000));
            let pushers: Vec<_> = (0..4)
                .map(|_| {
                    let queue = queue.clone();
                    std::thread::spawn(move || {
                        let mut accepted = 0;
                        for i in 0..1_000 {
                            match queue.push(i) {
                                PushOutcome::Accepted(_) | PushOutcome::DroppedOldest(_) => {
                                    accepted += 1
                                }
                                PushOutcome::Closed => break,
                            }
                        }
                        accepted
                    })
                })
                .collect();

            std::thread::yield_now();
            assert!(queue.close());
            let drained = queue.drain(usize::MAX).len();
            let accepted: usize = pushers.into_iter().map(|p| p.join().unwrap()).sum();

            assert_eq!(queue.len(), 0);
            assert_eq!(drained, accepted);
        }
    }

    #[test]
    fn force_flush_exports_queued_items() {
        let sink = RecordingSink::default();
        let processor = BatchProcessor::new("Test", sink.clone(), config(100, 10));
        for i in 0..25 {
            processor.push(i);
        }
        assert!(processor.force_flush().is_ok());
        assert_eq!(sink.exported(), (0..25).collect::<Vec<_>>());
        assert_eq!(processor.queued(), 0);
        let diagnostics = processor.diagnostics();
        assert_eq!(diagnostics.exported_items(), 25);
        assert!(diagnostics.exported_batches() >= 3);
        let _ = processor.shutdown();
    }

    #[derive(Debug)]
    struct BlockingSink {
        started: SyncSender<()>,
        release: mpsc::Receiver<()>,
        exported: Arc<Mutex<Vec<u32>>>,
    }

    impl BatchExport for BlockingSink {
        type Item = u32;

        fn export(&mut self, batch: Vec<u32>) -> BoxFuture<'static, ExportResult> {
            let _ = self.started.send(());
            let _ = self.release.recv();
            self.exported.lock().unwrap().extend(batch);
            Box::pin(std::future::ready(Ok(())))
        }

        fn shutdown(&mut self) -> ExportResult {
            Ok(())
        }
    }

    #[test]
    fn overflow_keeps_newest_items_and_counts_drops() {
        let (started_tx, started_rx) = mpsc::sync_channel(16);
        let (release_tx, release_rx) = mpsc::channel();
        let exported = Arc::new(Mutex::new(Vec::new()));
        let processor = BatchProcessor::new(
            "Test",
            BlockingSink {
                started: started_tx,
                release: release_rx,
                exported: exported.clone(),
            },
            config(3, 3),
        );

        // The first full batch occupies the worker inside export.
        for i in 0..3 {
            processor.push(i);
        }
        started_rx.recv().unwrap();

        // Capacity 3, five pushes: the two oldest are dropped.
        for i in 10..15 {
            processor.push(i);
        }
        assert_eq!(processor.queued(), 3);
        assert_eq!(processor.diagnostics().dropped_items(), 2);

        for _ in 0..4 {
            release_tx.send(()).unwrap();
        }
        assert!(processor.force_flush().is_ok());
        assert_eq!(*exported.lock().unwrap(), vec![0, 1, 2, 12, 13, 14]);
        let _ = processor.shutdown();
    }

    #[test]
    fn failed_batch_is_dropped_after_retries_and_next_flush_recovers() {
        let sink = RecordingSink::failing(3);
        let processor = BatchProcessor::new("Test", sink.clone(), config(100, 10));

        processor.push(1);
        let result = processor.force_flush();
        assert!(matches!(result, Err(SdkError::InternalFailure(_))));
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(processor.diagnostics().failed_batches(), 1);
        assert!(sink.exported().is_empty());

        processor.push(2);
        assert!(processor.force_flush().is_ok());
        assert_eq!(sink.exported(), vec![2]);
        assert_eq!(processor.diagnostics().exported_batches(), 1);
        let _ = processor.shutdown();
    }

    #[test]
    fn full_batch_triggers_export_without_flush() {
        let sink = RecordingSink::default();
        let processor = BatchProcessor::new("Test", sink.clone(), config(100, 5));
        for i in 0..5 {
            processor.push(i);
        }
        let deadline = Instant::now() + Duration::from_secs(5);
        while sink.exported().len() < 5 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(sink.exported(), vec![0, 1, 2, 3, 4]);
        let _ = processor.shutdown();
    }

    #[test]
    fn scheduled_delay_triggers_export() {
        let sink = RecordingSink::default();
        let processor = BatchProcessor::new(
            "Test",
            sink.clone(),
            BatchConfigBuilder::for_spans()
                .with_scheduled_delay(Duration::from_millis(20))
                .build(),
        );
        processor.push(7);
        let deadline = Instant::now() + Duration::from_secs(5);
        while sink.exported().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(sink.exported(), vec![7]);
        let _ = processor.shutdown();
    }

    #[test]
    fn shutdown_drains_and_rejects_later_items() {
        let sink = RecordingSink::default();
        let processor = BatchProcessor::new("Test", sink.clone(), config(100, 10));
        processor.push(1);
        processor.push(2);
        assert!(processor.shutdown().is_ok());
        assert_eq!(sink.exported(), vec![1, 2]);
        assert!(sink.shutdown_called.load(Ordering::SeqCst));

        processor.push(3);
        assert_eq!(processor.diagnostics().dropped_items(), 1);
        assert_eq!(processor.shutdown(), Err(SdkError::AlreadyShutdown));
        assert_eq!(processor.force_flush(), Err(SdkError::AlreadyShutdown));
    }
}
