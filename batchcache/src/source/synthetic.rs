//! Generated sources for tests, benchmarks and placeholder ground truth.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use super::{FetchError, PacketSource};
use crate::packet::{FrameGeometry, Packet};

/// Deterministic frame generator.
///
/// Byte `j` of packet `k` is `(k * 31 + j + seed) mod 256`, so every packet
/// is distinguishable and can be recomputed by the caller with
/// [`SyntheticSource::expected`]. Every call to `fetch_packet` is counted,
/// which lets tests check that a cache never produces the same index twice.
#[derive(Debug)]
pub struct SyntheticSource {
    count: usize,
    geometry: FrameGeometry,
    seed: u8,
    latency: Duration,
    failing: HashSet<usize>,
    fetches: AtomicUsize,
}

impl SyntheticSource {
    /// Create a generator of `count` frames with the given geometry.
    pub fn new(count: usize, geometry: FrameGeometry) -> Self {
        Self {
            count,
            geometry,
            seed: 0,
            latency: Duration::ZERO,
            failing: HashSet::new(),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Vary the content between two sources of the same shape.
    pub fn with_seed(mut self, seed: u8) -> Self {
        self.seed = seed;
        self
    }

    /// Sleep this long inside every fetch to emulate decode latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make fetching `index` fail.
    pub fn with_failure_at(mut self, index: usize) -> Self {
        self.failing.insert(index);
        self
    }

    /// The packet this source returns for `index`.
    pub fn expected(&self, index: usize) -> Packet {
        let data: Vec<u8> = (0..self.geometry.byte_len())
            .map(|j| (index.wrapping_mul(31).wrapping_add(j) as u8).wrapping_add(self.seed))
            .collect();
        Packet::with_geometry(data, self.geometry)
    }

    /// Number of `fetch_packet` calls so far, successful or not.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Geometry of every generated frame.
    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }
}

impl PacketSource for SyntheticSource {
    fn packet_count(&self) -> usize {
        self.count
    }

    fn fetch_packet(&self, index: usize) -> Result<Packet, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        if index >= self.count {
            return Err(FetchError::OutOfRange {
                index,
                count: self.count,
            });
        }
        if self.failing.contains(&index) {
            return Err(FetchError::Failed {
                index,
                reason: "injected failure".to_string(),
            });
        }
        Ok(self.expected(index))
    }
}

/// Returns the same packet for every index.
///
/// Used as ground truth for batches that ship none: every frame is filled
/// with [`OUT_OF_SCOPE_VALUE`](crate::packet::OUT_OF_SCOPE_VALUE) so an
/// evaluator ignores it.
#[derive(Debug, Clone)]
pub struct ConstantSource {
    count: usize,
    packet: Packet,
}

impl ConstantSource {
    /// `count` copies of `packet`.
    pub fn new(count: usize, packet: Packet) -> Self {
        Self { count, packet }
    }

    /// `count` single-channel frames filled with `value`.
    pub fn filled(count: usize, width: u32, height: u32, value: u8) -> Self {
        Self::new(
            count,
            Packet::filled(FrameGeometry::new(width, height, 1), value),
        )
    }
}

impl PacketSource for ConstantSource {
    fn packet_count(&self) -> usize {
        self.count
    }

    fn fetch_packet(&self, index: usize) -> Result<Packet, FetchError> {
        if index >= self.count {
            return Err(FetchError::OutOfRange {
                index,
                count: self.count,
            });
        }
        Ok(self.packet.clone())
    }
}
