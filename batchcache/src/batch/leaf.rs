//! Leaf batches: the nodes that own packets.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::error::BatchError;
use super::sink::ResultSink;
use crate::packet::Packet;
use crate::prefetch::{PrefetchCache, PrefetchError, PrefetchStatsSnapshot};
use crate::progress::ProgressCounter;
use crate::source::PacketSource;

/// What a collaborator provides to build a leaf.
#[derive(Clone)]
pub struct LeafSpec {
    /// Input packets.
    pub input: Arc<dyn PacketSource>,
    /// Ground-truth packets, index-aligned with the input.
    pub ground_truth: Arc<dyn PacketSource>,
    /// Scheduling weight; derived from the packet count when absent.
    pub expected_load: Option<f64>,
    /// Destination of pushed results.
    pub sink: Option<Arc<dyn ResultSink>>,
}

impl LeafSpec {
    pub fn new(input: Arc<dyn PacketSource>, ground_truth: Arc<dyn PacketSource>) -> Self {
        Self {
            input,
            ground_truth,
            expected_load: None,
            sink: None,
        }
    }

    /// Override the scheduling weight.
    pub fn with_expected_load(mut self, load: f64) -> Self {
        self.expected_load = Some(load);
        self
    }

    /// Send pushed results to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }
}

/// Packets, caches and progress of one work batch.
///
/// The input and ground-truth sides each get their own [`PrefetchCache`]
/// (and therefore their own worker thread while precaching).
pub struct LeafBatch {
    name: String,
    packet_count: usize,
    expected_load: f64,
    input: PrefetchCache,
    ground_truth: PrefetchCache,
    progress: ProgressCounter,
    sink: Option<Arc<dyn ResultSink>>,
}

impl LeafBatch {
    /// Build the leaf. `grayscale` halves the default load.
    pub(crate) fn new(name: &str, spec: LeafSpec, grayscale: bool) -> Self {
        let packet_count = spec.input.packet_count();
        let channel_factor = if grayscale { 1.0 } else { 2.0 };
        let expected_load = spec
            .expected_load
            .unwrap_or(packet_count as f64 * channel_factor);
        Self {
            name: name.to_string(),
            packet_count,
            expected_load,
            input: PrefetchCache::new(format!("{}/input", name), spec.input),
            ground_truth: PrefetchCache::new(format!("{}/gt", name), spec.ground_truth),
            progress: ProgressCounter::new(name),
            sink: spec.sink,
        }
    }

    /// Number of input packets, fixed at construction.
    pub fn packet_count(&self) -> usize {
        self.packet_count
    }

    /// Scheduling weight.
    pub fn expected_load(&self) -> f64 {
        self.expected_load
    }

    fn packet_error(&self, source: PrefetchError) -> BatchError {
        BatchError::Packet {
            batch: self.name.clone(),
            source,
        }
    }

    /// Start the input worker, and the ground-truth worker if `using_ground_truth`.
    ///
    /// If the ground-truth cache cannot start, the input cache is stopped
    /// again so the leaf is left idle.
    pub fn start_precaching(
        &self,
        using_ground_truth: bool,
        budget_bytes: usize,
    ) -> Result<(), BatchError> {
        self.input
            .start_precaching(self.packet_count, budget_bytes)
            .map_err(|e| self.packet_error(e))?;

        if using_ground_truth {
            let count = self.ground_truth.source().packet_count();
            if let Err(e) = self.ground_truth.start_precaching(count, budget_bytes) {
                self.input.stop_precaching();
                return Err(self.packet_error(e));
            }
        }
        debug!(batch = %self.name, using_ground_truth, budget_bytes, "Leaf precaching");
        Ok(())
    }

    /// Stop both workers. Idempotent.
    pub fn stop_precaching(&self) {
        self.input.stop_precaching();
        self.ground_truth.stop_precaching();
    }

    /// Whether the input cache is precaching.
    pub fn is_precaching(&self) -> bool {
        self.input.is_precaching()
    }

    /// Input packet at `index`.
    pub fn input_packet(&self, index: usize) -> Result<Packet, BatchError> {
        if index >= self.packet_count {
            return Err(BatchError::OutOfRange {
                batch: self.name.clone(),
                index,
                total: self.packet_count,
            });
        }
        self.input
            .get_packet(index)
            .map_err(|e| self.packet_error(e))
    }

    /// Ground-truth packet at `index`.
    pub fn ground_truth_packet(&self, index: usize) -> Result<Packet, BatchError> {
        let total = self.ground_truth.source().packet_count();
        if index >= total {
            return Err(BatchError::OutOfRange {
                batch: self.name.clone(),
                index,
                total,
            });
        }
        self.ground_truth
            .get_packet(index)
            .map_err(|e| self.packet_error(e))
    }

    /// Arm the progress counter and its clock.
    pub fn start_processing(&self) -> Result<(), BatchError> {
        self.progress.begin()?;
        info!(batch = %self.name, packets = self.packet_count, "Processing started");
        Ok(())
    }

    /// Stop precaching and fire the completion signal.
    ///
    /// Returns the final processed count. A second call is a protocol error.
    pub fn stop_processing(&self) -> Result<usize, BatchError> {
        self.stop_precaching();
        let count = self.progress.complete()?;
        info!(
            batch = %self.name,
            processed = count,
            elapsed = ?self.progress.elapsed(),
            "Processing stopped"
        );
        Ok(count)
    }

    /// Count one processed packet.
    pub fn record_processed(&self) -> usize {
        self.progress.record_processed()
    }

    /// Processed packets so far.
    pub fn current_processed_count(&self) -> usize {
        self.progress.current()
    }

    /// Block until processing stops, then return the final count.
    pub fn final_processed_count(&self) -> Result<usize, BatchError> {
        Ok(self.progress.wait_final()?)
    }

    /// The progress counter itself, for timed waits.
    pub fn progress(&self) -> &ProgressCounter {
        &self.progress
    }

    /// Time spent between start and stop of processing.
    pub fn process_time(&self) -> Duration {
        self.progress.elapsed()
    }

    /// Record one processed packet and forward its result to the sink.
    pub fn push_result(&self, index: usize, result: &Packet) -> Result<(), BatchError> {
        if index >= self.packet_count {
            return Err(BatchError::OutOfRange {
                batch: self.name.clone(),
                index,
                total: self.packet_count,
            });
        }
        self.record_processed();
        if let Some(sink) = &self.sink {
            sink.push_result(&self.name, index, result)
                .map_err(|source| BatchError::Sink {
                    batch: self.name.clone(),
                    index,
                    source,
                })?;
        }
        Ok(())
    }

    /// Cache counters for the input and ground-truth sides.
    pub fn cache_stats(&self) -> (PrefetchStatsSnapshot, PrefetchStatsSnapshot) {
        (self.input.stats(), self.ground_truth.stats())
    }

    /// The input cache.
    pub fn input_cache(&self) -> &PrefetchCache {
        &self.input
    }

    /// The ground-truth cache.
    pub fn ground_truth_cache(&self) -> &PrefetchCache {
        &self.ground_truth
    }
}

impl std::fmt::Debug for LeafBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeafBatch")
            .field("name", &self.name)
            .field("packet_count", &self.packet_count)
            .field("expected_load", &self.expected_load)
            .field("processed", &self.progress.current())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::sink::MemorySink;
    use crate::packet::{FrameGeometry, OUT_OF_SCOPE_VALUE};
    use crate::source::{ConstantSource, SyntheticSource};

    const GEOMETRY: FrameGeometry = FrameGeometry {
        width: 2,
        height: 2,
        channels: 3,
    };

    fn leaf(count: usize) -> (LeafBatch, Arc<SyntheticSource>) {
        let input = Arc::new(SyntheticSource::new(count, GEOMETRY));
        let gt = Arc::new(ConstantSource::filled(count, 2, 2, OUT_OF_SCOPE_VALUE));
        let spec = LeafSpec::new(input.clone(), gt);
        (LeafBatch::new("seq", spec, false), input)
    }

    #[test]
    fn test_default_load_depends_on_grayscale() {
        let input = Arc::new(SyntheticSource::new(10, GEOMETRY));
        let gt = Arc::new(ConstantSource::filled(10, 2, 2, 0));
        let color = LeafBatch::new("c", LeafSpec::new(input.clone(), gt.clone()), false);
        let gray = LeafBatch::new("g", LeafSpec::new(input, gt), true);

        assert_eq!(color.expected_load(), 20.0);
        assert_eq!(gray.expected_load(), 10.0);
    }

    #[test]
    fn test_explicit_load_wins() {
        let input = Arc::new(SyntheticSource::new(10, GEOMETRY));
        let gt = Arc::new(ConstantSource::filled(10, 2, 2, 0));
        let spec = LeafSpec::new(input, gt).with_expected_load(3.5);
        assert_eq!(LeafBatch::new("s", spec, false).expected_load(), 3.5);
    }

    #[test]
    fn test_reads_with_and_without_precaching() {
        let (leaf, input) = leaf(8);
        assert_eq!(leaf.input_packet(2).unwrap(), input.expected(2));

        leaf.start_precaching(true, 4 * GEOMETRY.byte_len()).unwrap();
        assert!(leaf.is_precaching());
        assert!(leaf.ground_truth_cache().is_precaching());
        for index in 0..8 {
            assert_eq!(leaf.input_packet(index).unwrap(), input.expected(index));
            assert_eq!(
                leaf.ground_truth_packet(index).unwrap().data()[0],
                OUT_OF_SCOPE_VALUE
            );
        }
        leaf.stop_precaching();
        assert!(!leaf.is_precaching());
    }

    #[test]
    fn test_out_of_range_read() {
        let (leaf, _) = leaf(3);
        assert!(matches!(
            leaf.input_packet(3),
            Err(BatchError::OutOfRange { index: 3, total: 3, .. })
        ));
        assert!(matches!(
            leaf.ground_truth_packet(3),
            Err(BatchError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_ground_truth_failure_leaves_leaf_idle() {
        let input = Arc::new(SyntheticSource::new(4, GEOMETRY));
        let gt = Arc::new(ConstantSource::filled(0, 2, 2, 0));
        let leaf = LeafBatch::new("seq", LeafSpec::new(input, gt), false);

        let err = leaf.start_precaching(true, 1024).unwrap_err();
        assert!(matches!(
            err,
            BatchError::Packet {
                source: PrefetchError::NoPackets { .. },
                ..
            }
        ));
        assert!(!leaf.is_precaching());
    }

    #[test]
    fn test_processing_lifecycle() {
        let (leaf, _) = leaf(5);
        leaf.start_processing().unwrap();
        leaf.start_precaching(false, 1024).unwrap();
        for _ in 0..5 {
            leaf.record_processed();
        }
        assert_eq!(leaf.current_processed_count(), 5);
        assert_eq!(leaf.stop_processing().unwrap(), 5);
        assert!(!leaf.is_precaching());
        assert_eq!(leaf.final_processed_count().unwrap(), 5);
        assert!(matches!(
            leaf.stop_processing(),
            Err(BatchError::Progress(_))
        ));
    }

    #[test]
    fn test_push_result_records_and_forwards() {
        let input = Arc::new(SyntheticSource::new(4, GEOMETRY));
        let gt = Arc::new(ConstantSource::filled(4, 2, 2, 0));
        let sink = Arc::new(MemorySink::new());
        let spec = LeafSpec::new(input, gt).with_sink(sink.clone());
        let leaf = LeafBatch::new("seq", spec, false);

        leaf.push_result(1, &Packet::new(vec![7u8])).unwrap();
        leaf.push_result(2, &Packet::new(vec![8u8])).unwrap();
        assert!(leaf.push_result(4, &Packet::empty()).is_err());

        assert_eq!(leaf.current_processed_count(), 2);
        let results = sink.results();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].batch, "seq");
        assert_eq!(results[1].index, 2);
    }
}
