//! Integration tests for batch trees.
//!
//! These tests build small datasets out of synthetic sources and verify:
//! - flat index routing through nested groups
//! - processed-count aggregation while several threads consume leaves
//! - blocking final counts and the completion protocol
//! - heaviest-first scheduling
//!
//! Run with: `cargo test --test batch_tree_integration`

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use batchcache::batch::{BatchError, BatchMeta, BatchNode, LeafSpec, MemorySink};
use batchcache::dataset::{Dataset, DatasetInfo, DatasetKind};
use batchcache::packet::{FrameGeometry, Packet, OUT_OF_SCOPE_VALUE};
use batchcache::prefetch::PrefetchConfig;
use batchcache::source::{ConstantSource, SyntheticSource};
use batchcache::ErrorCategory;

// ============================================================================
// Helper Functions
// ============================================================================

const GEOMETRY: FrameGeometry = FrameGeometry {
    width: 4,
    height: 2,
    channels: 3,
};

fn meta(name: &str) -> BatchMeta {
    BatchMeta::new(name, DatasetKind::VideoSegmentation)
}

fn leaf(name: &str, count: usize, seed: u8) -> (Arc<BatchNode>, Arc<SyntheticSource>) {
    let input = Arc::new(SyntheticSource::new(count, GEOMETRY).with_seed(seed));
    let gt = Arc::new(ConstantSource::filled(count, 4, 2, OUT_OF_SCOPE_VALUE));
    (BatchNode::leaf(meta(name), LeafSpec::new(input.clone(), gt)), input)
}

/// `baseline/{highway (5), office (3)}` and `thermal/park (7)`.
fn cdnet_like() -> (Dataset, Vec<Arc<SyntheticSource>>) {
    let (highway, s1) = leaf("highway", 5, 1);
    let (office, s2) = leaf("office", 3, 2);
    let (park, s3) = leaf("park", 7, 3);
    let baseline = BatchNode::group(meta("baseline"), vec![office, highway]);
    let thermal = BatchNode::group(meta("thermal"), vec![park]);
    let info = DatasetInfo::new("cdnet", DatasetKind::VideoSegmentation, "/data/cdnet");
    (Dataset::new(info, vec![thermal, baseline]), vec![s1, s2, s3])
}

// ============================================================================
// Integration Tests
// ============================================================================

#[test]
fn test_routing_through_dataset() {
    let (dataset, sources) = cdnet_like();
    assert_eq!(dataset.total_packet_count(), 15);

    let expected = [("highway", 0..5), ("office", 0..3), ("park", 0..7)];
    let mut global = 0;
    for ((name, range), source) in expected.iter().zip(&sources) {
        for local in range.clone() {
            let route = dataset.resolve(global).unwrap();
            assert_eq!(route.node.name(), *name);
            assert_eq!(route.local_index, local);
            assert_eq!(
                dataset.root().input_packet(global).unwrap(),
                source.expected(local)
            );
            global += 1;
        }
    }

    let err = dataset.resolve(15).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Range);
}

#[test]
fn test_precached_reads_through_groups() {
    let (dataset, sources) = cdnet_like();
    let config = PrefetchConfig::new()
        .with_buffer_budget(2 * GEOMETRY.byte_len())
        .with_ground_truth(true);
    dataset.start_precaching(&config).unwrap();

    let baseline = dataset.root().find("baseline").unwrap();
    for index in 0..baseline.total_packet_count() {
        let expected = if index < 5 {
            sources[0].expected(index)
        } else {
            sources[1].expected(index - 5)
        };
        assert_eq!(baseline.input_packet(index).unwrap(), expected);
        assert_eq!(
            baseline.ground_truth_packet(index).unwrap().data()[0],
            OUT_OF_SCOPE_VALUE
        );
    }
    dataset.stop_precaching();

    let stats = dataset.cache_stats();
    assert_eq!(stats.direct_fetches, 0);
    assert_eq!(stats.window_hits, 16);
}

#[test]
fn test_parallel_consumers_aggregate() {
    let (dataset, _) = cdnet_like();
    let dataset = Arc::new(dataset);
    dataset.root().start_processing().unwrap();

    let handles: Vec<_> = dataset
        .root()
        .leaves()
        .iter()
        .map(|leaf| leaf.name().to_string())
        .map(|name| {
            let dataset = Arc::clone(&dataset);
            thread::spawn(move || {
                let path = match name.as_str() {
                    "park" => format!("thermal/{}", name),
                    _ => format!("baseline/{}", name),
                };
                let node = dataset.root().find(&path).unwrap();
                for index in 0..node.total_packet_count() {
                    let frame = node.input_packet(index).unwrap();
                    node.push_result(index, &frame).unwrap();
                }
                node.stop_processing().unwrap()
            })
        })
        .collect();

    let final_count = dataset.final_processed_count().unwrap();
    assert_eq!(final_count, 15);

    let per_leaf: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(per_leaf, 15);
    assert_eq!(dataset.current_processed_count(), 15);
}

#[test]
fn test_group_sum_matches_children_snapshot() {
    let (dataset, _) = cdnet_like();
    let root = dataset.root();
    root.start_processing().unwrap();

    for index in [0, 2, 5, 9, 14] {
        root.push_result(index, &Packet::empty()).unwrap();
    }
    let children_sum: usize = root
        .children()
        .iter()
        .map(|c| c.current_processed_count())
        .sum();
    assert_eq!(root.current_processed_count(), children_sum);
    assert_eq!(children_sum, 5);
}

#[test]
fn test_final_count_blocks_until_every_leaf_stops() {
    let (dataset, _) = cdnet_like();
    let dataset = Arc::new(dataset);
    dataset.root().start_processing().unwrap();

    let waiter = {
        let dataset = Arc::clone(&dataset);
        thread::spawn(move || dataset.final_processed_count())
    };

    let leaves: Vec<_> = dataset
        .root()
        .leaves()
        .into_iter()
        .map(|l| l.name().to_string())
        .collect();
    for (i, name) in leaves.iter().enumerate() {
        let path = if name == "park" {
            format!("thermal/{}", name)
        } else {
            format!("baseline/{}", name)
        };
        let leaf = dataset.root().find(&path).unwrap().as_leaf().unwrap();
        leaf.record_processed();
        thread::sleep(Duration::from_millis(5));
        if i + 1 < leaves.len() {
            assert!(!waiter.is_finished());
        }
        leaf.stop_processing().unwrap();
    }

    assert_eq!(waiter.join().unwrap().unwrap(), 3);
    assert!(dataset.process_time() > Duration::ZERO);
}

#[test]
fn test_second_completion_is_protocol_error() {
    let (highway, _) = leaf("highway", 2, 0);
    highway.start_processing().unwrap();
    highway.stop_processing().unwrap();

    let err = highway.stop_processing().unwrap_err();
    assert!(matches!(err, BatchError::Progress(_)));
    assert_eq!(err.category(), ErrorCategory::Protocol);
}

#[test]
fn test_results_reach_sink() {
    let sink = Arc::new(MemorySink::new());
    let make = |name: &str, count: usize| {
        let input = Arc::new(SyntheticSource::new(count, GEOMETRY));
        let gt = Arc::new(ConstantSource::filled(count, 4, 2, 0));
        BatchNode::leaf(
            meta(name),
            LeafSpec::new(input, gt).with_sink(sink.clone()),
        )
    };
    let root = BatchNode::group(meta("root"), vec![make("b", 2), make("a", 3)]);

    root.push_result(4, &Packet::new(vec![1u8])).unwrap();
    root.push_result(0, &Packet::new(vec![2u8])).unwrap();

    let results = sink.results();
    assert_eq!(results.len(), 2);
    assert_eq!((results[0].batch.as_str(), results[0].index), ("b", 1));
    assert_eq!((results[1].batch.as_str(), results[1].index), ("a", 0));
}

#[test]
fn test_heaviest_batches_first() {
    let (small, _) = leaf("small", 2, 0);
    let (large, _) = leaf("large", 20, 0);
    let (medium, _) = leaf("medium", 8, 0);
    let dataset = Dataset::new(DatasetInfo::default(), vec![small, large, medium]);

    let order: Vec<_> = dataset
        .sorted_batches()
        .map(|b| b.name().to_string())
        .collect();
    assert_eq!(order, vec!["large", "medium", "small"]);
    assert_eq!(dataset.expected_load(), 60.0);
}
