use std::sync::atomic::{AtomicU64, Ordering};

/// Counters describing what an export pipeline did with the telemetry it was
/// given.
///
/// Every processor and reader owns one; read it through their
/// `diagnostics()` accessor.
#[derive(Debug, Default)]
pub struct ExportDiagnostics {
    exported_batches: AtomicU64,
    exported_items: AtomicU64,
    failed_batches: AtomicU64,
    dropped_items: AtomicU64,
}

impl ExportDiagnostics {
    /// Batches delivered successfully, including after retries.
    pub fn exported_batches(&self) -> u64 {
        self.exported_batches.load(Ordering::Relaxed)
    }

    /// Items contained in successfully delivered batches.
    pub fn exported_items(&self) -> u64 {
        self.exported_items.load(Ordering::Relaxed)
    }

    /// Batches dropped because every retry attempt failed.
    pub fn failed_batches(&self) -> u64 {
        self.failed_batches.load(Ordering::Relaxed)
    }

    /// Items dropped before export, because the queue was full or the
    /// pipeline was already shut down.
    pub fn dropped_items(&self) -> u64 {
        self.dropped_items.load(Ordering::Relaxed)
    }

    pub(crate) fn record_exported(&self, items: usize) {
        self.exported_batches.fetch_add(1, Ordering::Relaxed);
        self.exported_items.fetch_add(items as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed_batches.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the dropped count before this drop.
    pub(crate) fn record_dropped(&self) -> u64 {
        self.dropped_items.fetch_add(1, Ordering::Relaxed)
    }
}
