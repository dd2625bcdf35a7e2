//! Sibling ordering and priority views over batches.
//!
//! Two interchangeable orders are defined over [`BatchNode`]s:
//!
//! - [`BatchOrder::Name`]: case-insensitive name, ties broken by the exact
//!   name so the order is total
//! - [`BatchOrder::Load`]: ascending expected load
//!
//! [`BatchQueue`] is a priority view built from either order. It holds
//! `Arc` handles and never touches the tree itself.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use batchcache::batch::{BatchMeta, BatchNode, BatchOrder, BatchQueue, LeafSpec};
//! use batchcache::dataset::DatasetKind;
//! use batchcache::packet::FrameGeometry;
//! use batchcache::source::SyntheticSource;
//!
//! let leaf = |name: &str, count: usize| {
//!     let source = Arc::new(SyntheticSource::new(count, FrameGeometry::new(2, 2, 1)));
//!     BatchNode::leaf(
//!         BatchMeta::new(name, DatasetKind::VideoSegmentation),
//!         LeafSpec::new(source.clone(), source),
//!     )
//! };
//! let root = BatchNode::group(
//!     BatchMeta::new("root", DatasetKind::VideoSegmentation),
//!     vec![leaf("small", 2), leaf("large", 9), leaf("medium", 5)],
//! );
//!
//! let mut queue = BatchQueue::from_batches(BatchOrder::Load, root.children().iter().cloned());
//! let mut names = Vec::new();
//! while let Some(batch) = queue.pop() {
//!     names.push(batch.name().to_string());
//! }
//! assert_eq!(names, ["large", "medium", "small"]);
//! ```

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use super::node::BatchNode;

/// Case-insensitive comparison of two names.
pub fn compare_lowercase(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
}

/// Order by case-insensitive name.
pub fn compare_by_name(a: &BatchNode, b: &BatchNode) -> Ordering {
    compare_lowercase(a.name(), b.name()).then_with(|| a.name().cmp(b.name()))
}

/// Order by ascending expected load.
pub fn compare_by_load(a: &BatchNode, b: &BatchNode) -> Ordering {
    a.expected_load().total_cmp(&b.expected_load())
}

/// Which comparator to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchOrder {
    #[default]
    Name,
    Load,
}

impl BatchOrder {
    pub fn compare(self, a: &BatchNode, b: &BatchNode) -> Ordering {
        match self {
            BatchOrder::Name => compare_by_name(a, b),
            BatchOrder::Load => compare_by_load(a, b),
        }
    }
}

/// Sort a slice of batches in ascending `order`.
pub fn sort_batches(batches: &mut [Arc<BatchNode>], order: BatchOrder) {
    batches.sort_by(|a, b| order.compare(a, b));
}

// =============================================================================
// Batch Queue
// =============================================================================

struct Ranked {
    node: Arc<BatchNode>,
    order: BatchOrder,
    sequence: u64,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: greatest batch first, then the one pushed earlier.
        match self.order.compare(&self.node, &other.node) {
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            ordering => ordering,
        }
    }
}

/// Priority view over a set of batches.
///
/// `pop` returns the greatest batch under the queue's order: the heaviest
/// for [`BatchOrder::Load`], the last name for [`BatchOrder::Name`].
/// Batches that compare equal come out in insertion order.
pub struct BatchQueue {
    heap: BinaryHeap<Ranked>,
    order: BatchOrder,
    sequence: u64,
}

impl BatchQueue {
    pub fn new(order: BatchOrder) -> Self {
        Self {
            heap: BinaryHeap::new(),
            order,
            sequence: 0,
        }
    }

    /// Build a queue over `batches`.
    pub fn from_batches<I>(order: BatchOrder, batches: I) -> Self
    where
        I: IntoIterator<Item = Arc<BatchNode>>,
    {
        let mut queue = Self::new(order);
        for batch in batches {
            queue.push(batch);
        }
        queue
    }

    pub fn order(&self) -> BatchOrder {
        self.order
    }

    pub fn push(&mut self, node: Arc<BatchNode>) {
        self.heap.push(Ranked {
            node,
            order: self.order,
            sequence: self.sequence,
        });
        self.sequence += 1;
    }

    /// Remove and return the greatest batch.
    pub fn pop(&mut self) -> Option<Arc<BatchNode>> {
        self.heap.pop().map(|ranked| ranked.node)
    }

    pub fn peek(&self) -> Option<&Arc<BatchNode>> {
        self.heap.peek().map(|ranked| &ranked.node)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drain the queue in pop order.
    pub fn into_sorted_vec(mut self) -> Vec<Arc<BatchNode>> {
        let mut out = Vec::with_capacity(self.heap.len());
        while let Some(node) = self.pop() {
            out.push(node);
        }
        out
    }
}

impl Iterator for BatchQueue {
    type Item = Arc<BatchNode>;

    fn next(&mut self) -> Option<Self::Item> {
        self.pop()
    }
}

impl std::fmt::Debug for BatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchQueue")
            .field("order", &self.order)
            .field("len", &self.heap.len())
            .finish()
    }
}
