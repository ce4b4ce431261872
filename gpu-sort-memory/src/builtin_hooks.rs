//! Ready-made memory hooks.

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::memory_hook::{MemoryEvent, MemoryHook};

/// Logs every allocation, request and release through `tracing`.
pub struct TracingHook {
    name: String,
}

impl TracingHook {
    pub fn new() -> Self {
        Self::with_name("tracing")
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for TracingHook {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHook for TracingHook {
    fn name(&self) -> &str {
        &self.name
    }

    fn alloc_postprocess(&self, event: &MemoryEvent) {
        debug!(hook = %self.name, "alloc {}", event);
    }

    fn malloc_postprocess(&self, event: &MemoryEvent) {
        debug!(hook = %self.name, "malloc {}", event);
    }

    fn free_preprocess(&self, event: &MemoryEvent) {
        debug!(hook = %self.name, "free {}", event);
    }
}

/// Snapshot of the counters kept by [`AllocationStatsHook`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AllocationStats {
    pub allocs: usize,
    pub mallocs: usize,
    pub frees: usize,
    pub allocated_bytes: usize,
    pub freed_bytes: usize,
    /// Highest value reached by `allocated_bytes - freed_bytes`.
    pub peak_live_bytes: usize,
}

impl AllocationStats {
    /// Bytes allocated but not yet released.
    pub fn live_bytes(&self) -> usize {
        self.allocated_bytes.saturating_sub(self.freed_bytes)
    }
}

/// Counts events and bytes seen on the thread it is installed on.
pub struct AllocationStatsHook {
    name: String,
    stats: Mutex<AllocationStats>,
}

impl AllocationStatsHook {
    pub fn new() -> Self {
        Self::with_name("allocation-stats")
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stats: Mutex::new(AllocationStats::default()),
        }
    }

    pub fn stats(&self) -> AllocationStats {
        *self.stats.lock()
    }

    pub fn reset(&self) {
        *self.stats.lock() = AllocationStats::default();
    }

    /// Emit the current counters at `info` level.
    pub fn report(&self) {
        let s = self.stats();
        info!(
            "{}: {} allocs ({} bytes), {} mallocs, {} frees ({} bytes), peak {} bytes",
            self.name, s.allocs, s.allocated_bytes, s.mallocs, s.frees, s.freed_bytes, s.peak_live_bytes
        );
    }
}

impl Default for AllocationStatsHook {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHook for AllocationStatsHook {
    fn name(&self) -> &str {
        &self.name
    }

    fn alloc_postprocess(&self, event: &MemoryEvent) {
        let mut s = self.stats.lock();
        s.allocs += 1;
        s.allocated_bytes += event.bytes;
        s.peak_live_bytes = s.peak_live_bytes.max(s.live_bytes());
    }

    fn malloc_postprocess(&self, _event: &MemoryEvent) {
        self.stats.lock().mallocs += 1;
    }

    fn free_postprocess(&self, event: &MemoryEvent) {
        let mut s = self.stats.lock();
        s.frees += 1;
        s.freed_bytes += event.bytes;
    }
}
