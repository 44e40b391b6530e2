//! Per-device counters.

use core::sync::atomic::{AtomicU64, Ordering};

/// Statistics for a readiness device.
#[derive(Debug, Default)]
pub struct DeviceStats {
    /// Reads that returned an event.
    pub read_count: AtomicU64,
    /// Writes, all of which are rejected.
    pub write_count: AtomicU64,
    /// Non-blocking reads that found nothing pending.
    pub would_block_count: AtomicU64,
    /// Blocking reads abandoned before an event arrived.
    pub interrupted_count: AtomicU64,
    /// Timer firings delivered to the gate.
    pub fired_count: AtomicU64,
    /// Firings that landed on an already pending event.
    pub coalesced_count: AtomicU64,
}

impl DeviceStats {
    /// Creates a new statistics tracker.
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_read(&self) {
        self.read_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_write(&self) {
        self.write_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_would_block(&self) {
        self.would_block_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_interrupted(&self) {
        self.interrupted_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_fire(&self, coalesced: bool) {
        self.fired_count.fetch_add(1, Ordering::Relaxed);
        if coalesced {
            self.coalesced_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Gets the number of reads that returned an event.
    #[inline]
    pub fn reads(&self) -> u64 {
        self.read_count.load(Ordering::Relaxed)
    }

    /// Gets the number of rejected writes.
    #[inline]
    pub fn writes(&self) -> u64 {
        self.write_count.load(Ordering::Relaxed)
    }

    /// Gets the number of would-block outcomes.
    #[inline]
    pub fn would_blocks(&self) -> u64 {
        self.would_block_count.load(Ordering::Relaxed)
    }

    /// Gets the number of interrupted reads.
    #[inline]
    pub fn interrupts(&self) -> u64 {
        self.interrupted_count.load(Ordering::Relaxed)
    }

    /// Gets the number of timer firings.
    #[inline]
    pub fn fired(&self) -> u64 {
        self.fired_count.load(Ordering::Relaxed)
    }

    /// Gets the number of firings that coalesced.
    #[inline]
    pub fn coalesced(&self) -> u64 {
        self.coalesced_count.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fire_and_coalesce_counters() {
        let stats = DeviceStats::new();
        stats.record_fire(false);
        stats.record_fire(true);
        stats.record_fire(true);

        assert_eq!(stats.fired(), 3);
        assert_eq!(stats.coalesced(), 2);
    }
}
