//! Cache statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Lock-free counters updated on the read and produce paths.
#[derive(Debug, Default)]
pub struct PrefetchStats {
    window_hits: AtomicU64,
    repeat_hits: AtomicU64,
    direct_fetches: AtomicU64,
    produced: AtomicU64,
    discarded: AtomicU64,
    skipped: AtomicU64,
}

impl PrefetchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_window_hit(&self) {
        self.window_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_repeat_hit(&self) {
        self.repeat_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_direct_fetch(&self) {
        self.direct_fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_produced(&self) {
        self.produced.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_discarded(&self, count: usize) {
        self.discarded.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped(&self, count: usize) {
        self.skipped.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Zero every counter.
    pub fn reset(&self) {
        for counter in [
            &self.window_hits,
            &self.repeat_hits,
            &self.direct_fetches,
            &self.produced,
            &self.discarded,
            &self.skipped,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> PrefetchStatsSnapshot {
        PrefetchStatsSnapshot {
            window_hits: self.window_hits.load(Ordering::Relaxed),
            repeat_hits: self.repeat_hits.load(Ordering::Relaxed),
            direct_fetches: self.direct_fetches.load(Ordering::Relaxed),
            produced: self.produced.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

/// Copy of [`PrefetchStats`] taken at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PrefetchStatsSnapshot {
    /// Reads served from the prefetch window.
    pub window_hits: u64,
    /// Reads served from the "last served" slots.
    pub repeat_hits: u64,
    /// Reads that bypassed the window and fetched synchronously.
    pub direct_fetches: u64,
    /// Packets the worker appended to the window.
    pub produced: u64,
    /// Packets thrown away by a window restart or stop.
    pub discarded: u64,
    /// Buffered packets dropped because the reader jumped past them.
    pub skipped: u64,
}

impl PrefetchStatsSnapshot {
    /// Total number of reads.
    pub fn reads(&self) -> u64 {
        self.window_hits + self.repeat_hits + self.direct_fetches
    }

    /// Fraction of reads that did not need a synchronous fetch.
    pub fn hit_rate(&self) -> f64 {
        let reads = self.reads();
        if reads == 0 {
            0.0
        } else {
            (self.window_hits + self.repeat_hits) as f64 / reads as f64
        }
    }

    /// Sum of two snapshots (used to aggregate input and ground truth).
    pub fn merged(&self, other: &Self) -> Self {
        Self {
            window_hits: self.window_hits + other.window_hits,
            repeat_hits: self.repeat_hits + other.repeat_hits,
            direct_fetches: self.direct_fetches + other.direct_fetches,
            produced: self.produced + other.produced,
            discarded: self.discarded + other.discarded,
            skipped: self.skipped + other.skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_and_snapshot() {
        let stats = PrefetchStats::new();
        stats.record_window_hit();
        stats.record_window_hit();
        stats.record_repeat_hit();
        stats.record_direct_fetch();
        stats.record_produced();
        stats.record_discarded(3);
        stats.record_skipped(2);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.window_hits, 2);
        assert_eq!(snapshot.repeat_hits, 1);
        assert_eq!(snapshot.direct_fetches, 1);
        assert_eq!(snapshot.produced, 1);
        assert_eq!(snapshot.discarded, 3);
        assert_eq!(snapshot.skipped, 2);
        assert_eq!(snapshot.reads(), 4);
        assert!((snapshot.hit_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_hit_rate_without_reads() {
        assert_eq!(PrefetchStatsSnapshot::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_reset() {
        let stats = PrefetchStats::new();
        stats.record_direct_fetch();
        stats.reset();
        assert_eq!(stats.snapshot(), PrefetchStatsSnapshot::default());
    }

    #[test]
    fn test_merged() {
        let a = PrefetchStatsSnapshot {
            window_hits: 1,
            direct_fetches: 2,
            ..Default::default()
        };
        let b = PrefetchStatsSnapshot {
            window_hits: 3,
            produced: 4,
            ..Default::default()
        };
        let merged = a.merged(&b);
        assert_eq!(merged.window_hits, 4);
        assert_eq!(merged.direct_fetches, 2);
        assert_eq!(merged.produced, 4);
    }
}
