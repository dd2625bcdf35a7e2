//! Prefetching packet cache with a single background worker.
//!
//! # Read path
//!
//! 1. The index matches one of the two most recently served packets:
//!    return it without touching the window lock.
//! 2. The index is buffered (or is the very next one the worker will
//!    produce): take it from the window, waiting for the worker if needed.
//! 3. Anything else is a miss: the window is restarted at `index + 1` and
//!    the packet is fetched synchronously on the caller's thread. The next
//!    sequential read is served by the worker again.
//!
//! # Synchronization
//!
//! One mutex guards the [`Window`]; two condition variables signal
//! "space available" (reader → worker) and "packet available"
//! (worker → reader). The worker releases the lock while the source is
//! producing a packet, so reads of already-buffered packets never wait on
//! decode latency.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use super::config::{SIZE_PROBE_INDEX, WORKER_THREAD_PREFIX};
use super::error::PrefetchError;
use super::stats::{PrefetchStats, PrefetchStatsSnapshot};
use super::window::{Lookup, Window};
use crate::packet::Packet;
use crate::source::PacketSource;

/// State shared with the worker thread.
#[derive(Debug, Default)]
struct Shared {
    window: Mutex<Window>,
    space_available: Condvar,
    packet_available: Condvar,
}

/// The two most recently served packets, newest first.
#[derive(Debug, Default)]
struct RecentPackets {
    slots: [Option<(usize, Packet)>; 2],
}

impl RecentPackets {
    fn get(&self, index: usize) -> Option<Packet> {
        self.slots
            .iter()
            .flatten()
            .find(|(i, _)| *i == index)
            .map(|(_, packet)| packet.clone())
    }

    fn remember(&mut self, index: usize, packet: &Packet) {
        if matches!(&self.slots[0], Some((i, _)) if *i == index) {
            return;
        }
        self.slots[1] = self.slots[0].take();
        self.slots[0] = Some((index, packet.clone()));
    }

    fn clear(&mut self) {
        self.slots = [None, None];
    }
}

/// Observable position of the prefetch window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowState {
    /// Whether a worker is producing packets.
    pub running: bool,
    /// Lowest buffered index.
    pub first_buffered: usize,
    /// One past the highest buffered index.
    pub next_buffered: usize,
    /// Index the reader is expected to ask for next.
    pub next_expected: usize,
    /// Number of buffered packets.
    pub buffered: usize,
    /// Bytes held by buffered packets.
    pub buffered_bytes: usize,
    /// Maximum number of buffered packets.
    pub capacity: usize,
    /// Packet count of the source being precached.
    pub total: usize,
}

/// Bounded prefetch cache in front of one [`PacketSource`].
///
/// Without a running worker every read goes straight to the source, so a
/// cache that was never started (or was stopped) behaves like the bare
/// source.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use batchcache::packet::FrameGeometry;
/// use batchcache::prefetch::PrefetchCache;
/// use batchcache::source::SyntheticSource;
///
/// let source = Arc::new(SyntheticSource::new(20, FrameGeometry::new(8, 8, 1)));
/// let cache = PrefetchCache::new("demo", source.clone());
///
/// cache.start_precaching(20, 4 * 64).unwrap();
/// for index in 0..20 {
///     assert_eq!(cache.get_packet(index).unwrap(), source.expected(index));
/// }
/// cache.stop_precaching();
/// ```
pub struct PrefetchCache {
    name: String,
    source: Arc<dyn PacketSource>,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    recent: Mutex<RecentPackets>,
    stats: Arc<PrefetchStats>,
}

impl PrefetchCache {
    /// Create an idle cache over `source`. `name` tags logs and the worker thread.
    pub fn new(name: impl Into<String>, source: Arc<dyn PacketSource>) -> Self {
        Self {
            name: name.into(),
            source,
            shared: Arc::new(Shared::default()),
            worker: Mutex::new(None),
            recent: Mutex::new(RecentPackets::default()),
            stats: Arc::new(PrefetchStats::new()),
        }
    }

    /// Name given at construction.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The wrapped source.
    pub fn source(&self) -> &Arc<dyn PacketSource> {
        &self.source
    }

    /// Start the background worker.
    ///
    /// Packet `0` is fetched once to estimate the packet size; the window
    /// then holds `max(1, budget_bytes / packet_size)` packets. The probe
    /// packet becomes the first buffered entry.
    ///
    /// # Errors
    ///
    /// - [`PrefetchError::AlreadyRunning`] if a worker is active
    /// - [`PrefetchError::NoPackets`] if `total_count == 0`
    /// - [`PrefetchError::BudgetTooSmall`] if one packet exceeds the budget
    /// - [`PrefetchError::Fetch`] if the size probe fails
    ///
    /// No worker is spawned on error.
    pub fn start_precaching(
        &self,
        total_count: usize,
        budget_bytes: usize,
    ) -> Result<(), PrefetchError> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            if self.shared.window.lock().is_running() {
                return Err(PrefetchError::AlreadyRunning {
                    cache: self.name.clone(),
                });
            }
            // The worker shut itself down after a source failure.
            Self::join_worker(&self.name, worker.take());
        }
        if total_count == 0 {
            return Err(PrefetchError::NoPackets {
                cache: self.name.clone(),
            });
        }

        let probe = self.source.fetch_packet(SIZE_PROBE_INDEX)?;
        let packet_bytes = probe.byte_len().max(1);
        if budget_bytes < packet_bytes {
            return Err(PrefetchError::BudgetTooSmall {
                budget: budget_bytes,
                packet_bytes,
            });
        }
        let capacity = (budget_bytes / packet_bytes).max(1);

        {
            let mut window = self.shared.window.lock();
            *window = Window::started(total_count, capacity, budget_bytes);
            window.seed(probe);
        }
        self.recent.lock().clear();
        self.stats.reset();

        let shared = Arc::clone(&self.shared);
        let source = Arc::clone(&self.source);
        let stats = Arc::clone(&self.stats);
        let name = self.name.clone();
        let handle = thread::Builder::new()
            .name(format!("{}-{}", WORKER_THREAD_PREFIX, self.name))
            .spawn(move || run_worker(&name, &shared, source.as_ref(), &stats))
            .map_err(|e| {
                self.shared.window.lock().shut_down();
                PrefetchError::Spawn(e.to_string())
            })?;
        *worker = Some(handle);

        info!(
            cache = %self.name,
            total = total_count,
            capacity,
            packet_bytes,
            budget_bytes,
            "Precaching started"
        );
        Ok(())
    }

    /// Stop the worker and drop the window.
    ///
    /// Wakes a worker blocked on a full window, then joins it; no packet is
    /// produced after this returns. Safe to call repeatedly or on a cache
    /// that never started. A synchronous fetch already running on another
    /// reader thread is left to complete.
    pub fn stop_precaching(&self) {
        let mut worker = self.worker.lock();
        let dropped = {
            let mut window = self.shared.window.lock();
            let dropped = window.shut_down();
            self.shared.space_available.notify_all();
            self.shared.packet_available.notify_all();
            dropped
        };
        self.stats.record_discarded(dropped);

        if let Some(handle) = worker.take() {
            Self::join_worker(&self.name, Some(handle));
            info!(cache = %self.name, dropped, "Precaching stopped");
        }
    }

    fn join_worker(name: &str, handle: Option<JoinHandle<()>>) {
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!(cache = %name, "Precache worker panicked");
            }
        }
    }

    /// Whether a worker is currently producing packets.
    pub fn is_precaching(&self) -> bool {
        self.shared.window.lock().is_running()
    }

    /// Return the packet at `index`.
    ///
    /// The returned packet shares its payload with the cache; holding on
    /// to it is cheap and never blocks the cache.
    ///
    /// # Errors
    ///
    /// - [`PrefetchError::IndexOutOfRange`] if the cache is precaching and
    ///   `index` is past the end of the source
    /// - [`PrefetchError::Fetch`] if a synchronous fetch fails; the worker
    ///   is stopped and the window cleared before returning
    pub fn get_packet(&self, index: usize) -> Result<Packet, PrefetchError> {
        if let Some(packet) = self.recent.lock().get(index) {
            self.stats.record_repeat_hit();
            trace!(cache = %self.name, index, "Repeat read");
            return Ok(packet);
        }

        let running = {
            let mut window = self.shared.window.lock();
            if window.is_running() && index >= window.total() {
                return Err(PrefetchError::IndexOutOfRange {
                    index,
                    count: window.total(),
                });
            }
            if let Some(packet) = self.take_from_window(&mut window, index) {
                drop(window);
                self.stats.record_window_hit();
                self.recent.lock().remember(index, &packet);
                return Ok(packet);
            }
            let running = window.is_running();
            if running {
                let dropped = window.restart_at(index + 1);
                self.stats.record_discarded(dropped);
                self.shared.space_available.notify_all();
                debug!(
                    cache = %self.name,
                    index,
                    dropped,
                    "Prefetch miss, restarting window"
                );
            }
            running
        };

        self.stats.record_direct_fetch();
        match self.source.fetch_packet(index) {
            Ok(packet) => {
                self.recent.lock().remember(index, &packet);
                Ok(packet)
            }
            Err(e) => {
                if running {
                    warn!(cache = %self.name, index, error = %e, "Source failed, stopping precache");
                    let dropped = self.shared.window.lock().shut_down();
                    self.stats.record_discarded(dropped);
                    self.shared.space_available.notify_all();
                    self.shared.packet_available.notify_all();
                }
                Err(e.into())
            }
        }
    }

    /// Serve `index` from the window, waiting on the worker when it is the
    /// next packet to be produced. `None` means a miss.
    fn take_from_window(&self, window: &mut MutexGuard<'_, Window>, index: usize) -> Option<Packet> {
        loop {
            match window.lookup(index) {
                Lookup::Ready { packet, skipped } => {
                    self.note_skipped(index, skipped);
                    self.shared.space_available.notify_one();
                    return Some(packet);
                }
                Lookup::Pending { skipped } => {
                    self.note_skipped(index, skipped);
                    self.shared.space_available.notify_one();
                    self.shared.packet_available.wait(window);
                }
                Lookup::Miss => return None,
            }
        }
    }

    fn note_skipped(&self, index: usize, skipped: usize) {
        if skipped > 0 {
            self.stats.record_skipped(skipped);
            debug!(cache = %self.name, index, skipped, "Reader skipped buffered packets");
        }
    }

    /// Current position and fill of the window.
    pub fn window_state(&self) -> WindowState {
        let window = self.shared.window.lock();
        WindowState {
            running: window.is_running(),
            first_buffered: window.first_buffered(),
            next_buffered: window.next_buffered(),
            next_expected: window.next_expected(),
            buffered: window.len(),
            buffered_bytes: window.buffered_bytes(),
            capacity: window.capacity(),
            total: window.total(),
        }
    }

    /// Snapshot of the hit/miss counters since the last start.
    pub fn stats(&self) -> PrefetchStatsSnapshot {
        self.stats.snapshot()
    }
}

impl Drop for PrefetchCache {
    fn drop(&mut self) {
        self.stop_precaching();
    }
}

impl std::fmt::Debug for PrefetchCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefetchCache")
            .field("name", &self.name)
            .field("window", &self.window_state())
            .finish()
    }
}

/// Worker loop: fill the window until stopped.
fn run_worker(name: &str, shared: &Shared, source: &dyn PacketSource, stats: &PrefetchStats) {
    let mut window = shared.window.lock();
    debug!(cache = %name, "Precache worker running");
    while window.is_running() {
        let Some(index) = window.next_to_produce() else {
            shared.space_available.wait(&mut window);
            continue;
        };
        let generation = window.begin_production(index);
        let result = MutexGuard::unlocked(&mut window, || source.fetch_packet(index));
        match result {
            Ok(packet) => {
                if window.complete_production(generation, packet) {
                    stats.record_produced();
                    trace!(cache = %name, index, "Packet buffered");
                } else {
                    stats.record_discarded(1);
                }
            }
            Err(e) => {
                warn!(cache = %name, index, error = %e, "Source failed in precache worker");
                window.fail_production(generation);
            }
        }
        shared.packet_available.notify_all();
    }
    debug!(cache = %name, "Precache worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::FrameGeometry;
    use crate::source::{FetchError, SyntheticSource};
    use std::time::Duration;

    const GEOMETRY: FrameGeometry = FrameGeometry {
        width: 4,
        height: 4,
        channels: 1,
    };
    const PACKET_BYTES: usize = 16;

    fn synthetic(count: usize) -> Arc<SyntheticSource> {
        Arc::new(SyntheticSource::new(count, GEOMETRY))
    }

    fn cache_over(source: &Arc<SyntheticSource>) -> PrefetchCache {
        PrefetchCache::new("test", source.clone() as Arc<dyn PacketSource>)
    }

    #[test]
    fn test_idle_cache_reads_directly() {
        let source = synthetic(5);
        let cache = cache_over(&source);

        assert_eq!(cache.get_packet(3).unwrap(), source.expected(3));
        assert!(!cache.is_precaching());
        assert_eq!(cache.stats().direct_fetches, 1);
    }

    #[test]
    fn test_start_rejects_zero_packets() {
        let source = synthetic(0);
        let cache = cache_over(&source);

        let err = cache.start_precaching(0, 1024).unwrap_err();
        assert!(matches!(err, PrefetchError::NoPackets { .. }));
        assert!(!cache.is_precaching());
        assert_eq!(source.fetch_count(), 0);
    }

    #[test]
    fn test_start_rejects_small_budget() {
        let source = synthetic(5);
        let cache = cache_over(&source);

        let err = cache.start_precaching(5, PACKET_BYTES - 1).unwrap_err();
        assert_eq!(
            err,
            PrefetchError::BudgetTooSmall {
                budget: PACKET_BYTES - 1,
                packet_bytes: PACKET_BYTES
            }
        );
        assert!(!cache.is_precaching());
    }

    #[test]
    fn test_double_start_fails() {
        let source = synthetic(5);
        let cache = cache_over(&source);

        cache.start_precaching(5, 4 * PACKET_BYTES).unwrap();
        let err = cache.start_precaching(5, 4 * PACKET_BYTES).unwrap_err();
        assert!(matches!(err, PrefetchError::AlreadyRunning { .. }));
        cache.stop_precaching();
    }

    #[test]
    fn test_capacity_from_budget() {
        let source = synthetic(100);
        let cache = cache_over(&source);

        cache.start_precaching(100, 10 * PACKET_BYTES + 7).unwrap();
        assert_eq!(cache.window_state().capacity, 10);
        cache.stop_precaching();
    }

    #[test]
    fn test_sequential_reads_produce_each_packet_once() {
        let source = synthetic(50);
        let cache = cache_over(&source);
        cache.start_precaching(50, 3 * PACKET_BYTES).unwrap();

        for index in 0..50 {
            assert_eq!(cache.get_packet(index).unwrap(), source.expected(index));
        }
        cache.stop_precaching();

        let stats = cache.stats();
        assert_eq!(stats.window_hits, 50);
        assert_eq!(stats.direct_fetches, 0);
        assert_eq!(source.fetch_count(), 50);
    }

    #[test]
    fn test_repeat_read_uses_recent_slots() {
        let source = synthetic(10);
        let cache = cache_over(&source);
        cache.start_precaching(10, 2 * PACKET_BYTES).unwrap();

        let a = cache.get_packet(0).unwrap();
        let b = cache.get_packet(1).unwrap();
        assert_eq!(cache.get_packet(1).unwrap(), b);
        assert_eq!(cache.get_packet(0).unwrap(), a);

        let stats = cache.stats();
        assert_eq!(stats.window_hits, 2);
        assert_eq!(stats.repeat_hits, 2);
        cache.stop_precaching();
    }

    #[test]
    fn test_miss_restarts_window() {
        let source = synthetic(100);
        let cache = cache_over(&source);
        cache.start_precaching(100, 10 * PACKET_BYTES).unwrap();

        for index in 0..10 {
            cache.get_packet(index).unwrap();
        }
        assert_eq!(cache.get_packet(50).unwrap(), source.expected(50));
        assert_eq!(cache.get_packet(51).unwrap(), source.expected(51));

        let stats = cache.stats();
        assert_eq!(stats.window_hits, 11);
        assert_eq!(stats.direct_fetches, 1);
        cache.stop_precaching();
    }

    #[test]
    fn test_out_of_range_while_precaching() {
        let source = synthetic(4);
        let cache = cache_over(&source);
        cache.start_precaching(4, 4 * PACKET_BYTES).unwrap();

        let err = cache.get_packet(4).unwrap_err();
        assert_eq!(err, PrefetchError::IndexOutOfRange { index: 4, count: 4 });
        assert!(cache.is_precaching());
        cache.stop_precaching();
    }

    #[test]
    fn test_source_failure_stops_worker() {
        let source = Arc::new(SyntheticSource::new(10, GEOMETRY).with_failure_at(3));
        let cache = cache_over(&source);
        cache.start_precaching(10, 4 * PACKET_BYTES).unwrap();

        for index in 0..3 {
            cache.get_packet(index).unwrap();
        }
        let err = cache.get_packet(3).unwrap_err();
        assert!(matches!(
            err,
            PrefetchError::Fetch(FetchError::Failed { index: 3, .. })
        ));
        assert!(!cache.is_precaching());
        assert_eq!(cache.window_state().buffered, 0);

        // Still readable, and restartable.
        assert_eq!(cache.get_packet(4).unwrap(), source.expected(4));
        cache.start_precaching(10, 4 * PACKET_BYTES).unwrap();
        assert!(cache.is_precaching());
        cache.stop_precaching();
    }

    #[test]
    fn test_stop_is_idempotent() {
        let source = synthetic(5);
        let cache = cache_over(&source);

        cache.stop_precaching();
        cache.start_precaching(5, PACKET_BYTES).unwrap();
        cache.stop_precaching();
        cache.stop_precaching();
        assert!(!cache.is_precaching());
    }

    #[test]
    fn test_stop_unblocks_full_worker() {
        let source = Arc::new(SyntheticSource::new(1000, GEOMETRY));
        let cache = cache_over(&source);
        cache.start_precaching(1000, 2 * PACKET_BYTES).unwrap();

        thread::sleep(Duration::from_millis(20));
        cache.stop_precaching();

        let produced = source.fetch_count();
        thread::sleep(Duration::from_millis(20));
        assert_eq!(source.fetch_count(), produced);
        assert!(produced <= 3);
    }

    #[test]
    fn test_restart_matches_fresh_cache() {
        let source = synthetic(20);
        let cache = cache_over(&source);

        cache.start_precaching(20, 4 * PACKET_BYTES).unwrap();
        for index in 0..7 {
            cache.get_packet(index).unwrap();
        }
        cache.stop_precaching();

        cache.start_precaching(20, 4 * PACKET_BYTES).unwrap();
        for index in 0..20 {
            assert_eq!(cache.get_packet(index).unwrap(), source.expected(index));
        }
        let stats = cache.stats();
        assert_eq!(stats.window_hits, 20);
        assert_eq!(stats.direct_fetches, 0);
        cache.stop_precaching();
    }

    #[test]
    fn test_recent_packets_keeps_two() {
        let mut recent = RecentPackets::default();
        let a = Packet::new(vec![1u8]);
        let b = Packet::new(vec![2u8]);
        let c = Packet::new(vec![3u8]);

        recent.remember(1, &a);
        recent.remember(2, &b);
        recent.remember(2, &b);
        assert_eq!(recent.get(1), Some(a));
        recent.remember(3, &c);
        assert_eq!(recent.get(1), None);
        assert_eq!(recent.get(2), Some(b));
        assert_eq!(recent.get(3), Some(c));
    }
}
