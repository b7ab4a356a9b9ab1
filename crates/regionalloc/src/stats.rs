use core::sync::atomic::{AtomicUsize, Ordering};

/// Byte counters for OS memory traffic.
///
/// A `&MemStats` is threaded through every arena operation; the platform
/// adapter does all the accounting and the arena itself never reads it.
/// Counters are advisory: they are updated with relaxed atomics and may be
/// momentarily inconsistent with each other under contention.
pub struct MemStats {
    reserved: AtomicUsize,
    committed: AtomicUsize,
    committed_peak: AtomicUsize,
    reset: AtomicUsize,
}

impl MemStats {
    pub const fn new() -> Self {
        MemStats {
            reserved: AtomicUsize::new(0),
            committed: AtomicUsize::new(0),
            committed_peak: AtomicUsize::new(0),
            reset: AtomicUsize::new(0),
        }
    }

    /// Bytes of virtual address space currently reserved.
    pub fn reserved(&self) -> usize {
        self.reserved.load(Ordering::Relaxed)
    }

    /// Bytes currently committed.
    pub fn committed(&self) -> usize {
        self.committed.load(Ordering::Relaxed)
    }

    /// High-water mark of `committed`.
    pub fn committed_peak(&self) -> usize {
        self.committed_peak.load(Ordering::Relaxed)
    }

    /// Total bytes passed to `reset` over the process lifetime.
    pub fn reset_total(&self) -> usize {
        self.reset.load(Ordering::Relaxed)
    }

    pub(crate) fn reserve_add(&self, bytes: usize) {
        self.reserved.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn reserve_sub(&self, bytes: usize) {
        let _ = self
            .reserved
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(bytes))
            });
    }

    pub(crate) fn commit_add(&self, bytes: usize) {
        let now = self.committed.fetch_add(bytes, Ordering::Relaxed) + bytes;
        self.committed_peak.fetch_max(now, Ordering::Relaxed);
    }

    pub(crate) fn commit_sub(&self, bytes: usize) {
        // Decommits may cover ranges that were never individually committed
        // (eager regions), so saturate instead of underflowing.
        let _ = self
            .committed
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(bytes))
            });
    }

    pub(crate) fn reset_add(&self, bytes: usize) {
        self.reset.fetch_add(bytes, Ordering::Relaxed);
    }
}

impl Default for MemStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide stats instance backing the module-level arena façade.
pub static GLOBAL: MemStats = MemStats::new();
