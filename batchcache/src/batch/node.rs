//! Batch tree nodes.
//!
//! A [`BatchNode`] is either a leaf (owning packets) or a group (owning
//! children). Every operation is defined on the node; groups answer by
//! routing to the right leaf or by aggregating over their children.
//!
//! | Operation                  | Leaf                 | Group                       |
//! |----------------------------|----------------------|-----------------------------|
//! | `total_packet_count`       | source count         | sum of children             |
//! | `expected_load`            | given or derived     | sum of children             |
//! | `input_packet(i)`          | cache read           | resolve, then leaf read     |
//! | `current_processed_count`  | counter snapshot     | sum of children             |
//! | `final_processed_count`    | blocks on signal     | blocks on every child       |
//! | `start/stop_precaching`    | two workers          | forwarded to every child    |
//! | `resolve(i)`               | `NotAGroup` error    | route to leaf               |

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::error::BatchError;
use super::group::GroupBatch;
use super::leaf::{LeafBatch, LeafSpec};
use super::router::{self, Route};
use crate::dataset::DatasetKind;
use crate::packet::Packet;
use crate::prefetch::PrefetchStatsSnapshot;

/// Descriptive attributes shared by leaves and groups.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchMeta {
    /// Display name, also used for ordering.
    pub name: String,
    /// Path relative to the dataset root.
    pub relative_path: PathBuf,
    /// Kind of dataset the node belongs to.
    pub dataset: DatasetKind,
    /// Whether packets are single-channel.
    pub grayscale: bool,
}

impl BatchMeta {
    pub fn new(name: impl Into<String>, dataset: DatasetKind) -> Self {
        let name = name.into();
        Self {
            relative_path: PathBuf::from(&name),
            name,
            dataset,
            grayscale: false,
        }
    }

    /// Set the path relative to the dataset root.
    pub fn with_relative_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.relative_path = path.into();
        self
    }

    /// Mark packets as single-channel.
    pub fn with_grayscale(mut self, grayscale: bool) -> Self {
        self.grayscale = grayscale;
        self
    }
}

/// Leaf or group payload of a node.
#[derive(Debug)]
pub enum NodeKind {
    Leaf(LeafBatch),
    Group(GroupBatch),
}

/// A node in the batch tree.
#[derive(Debug)]
pub struct BatchNode {
    meta: BatchMeta,
    kind: NodeKind,
}

impl BatchNode {
    /// Build a leaf from the collaborator's sources.
    pub fn leaf(meta: BatchMeta, spec: LeafSpec) -> Arc<Self> {
        let leaf = LeafBatch::new(&meta.name, spec, meta.grayscale);
        Arc::new(Self {
            meta,
            kind: NodeKind::Leaf(leaf),
        })
    }

    /// Build a group; children are sorted by name.
    pub fn group(meta: BatchMeta, children: Vec<Arc<BatchNode>>) -> Arc<Self> {
        Arc::new(Self {
            meta,
            kind: NodeKind::Group(GroupBatch::new(children, false)),
        })
    }

    /// Wrap a single leaf in a group of the same name.
    ///
    /// Lets a flat work batch sit at a level of the tree that expects groups.
    pub fn bare_group(leaf: Arc<BatchNode>) -> Arc<Self> {
        let meta = leaf.meta.clone();
        Arc::new(Self {
            meta,
            kind: NodeKind::Group(GroupBatch::new(vec![leaf], true)),
        })
    }

    pub fn meta(&self) -> &BatchMeta {
        &self.meta
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn relative_path(&self) -> &Path {
        &self.meta.relative_path
    }

    pub fn dataset_kind(&self) -> DatasetKind {
        self.meta.dataset
    }

    pub fn is_grayscale(&self) -> bool {
        self.meta.grayscale
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, NodeKind::Group(_))
    }

    /// Whether this is a group wrapping one same-named leaf.
    pub fn is_bare(&self) -> bool {
        matches!(&self.kind, NodeKind::Group(g) if g.is_bare())
    }

    pub fn as_leaf(&self) -> Option<&LeafBatch> {
        match &self.kind {
            NodeKind::Leaf(leaf) => Some(leaf),
            NodeKind::Group(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<&GroupBatch> {
        match &self.kind {
            NodeKind::Group(group) => Some(group),
            NodeKind::Leaf(_) => None,
        }
    }

    /// Children in routing order; empty for a leaf.
    pub fn children(&self) -> &[Arc<BatchNode>] {
        match &self.kind {
            NodeKind::Group(group) => group.children(),
            NodeKind::Leaf(_) => &[],
        }
    }

    /// Every leaf below (or at) this node, depth-first in routing order.
    pub fn leaves(&self) -> Vec<&BatchNode> {
        let mut leaves = Vec::new();
        self.collect_leaves(&mut leaves);
        leaves
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a BatchNode>) {
        match &self.kind {
            NodeKind::Leaf(_) => out.push(self),
            NodeKind::Group(group) => {
                for child in group.children() {
                    child.collect_leaves(out);
                }
            }
        }
    }

    /// Find a descendant by `/`-separated names, e.g. `"baseline/highway"`.
    pub fn find(&self, path: &str) -> Option<&BatchNode> {
        let mut current = self;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            current = current
                .children()
                .iter()
                .find(|child| child.name() == part)?;
        }
        Some(current)
    }

    pub fn total_packet_count(&self) -> usize {
        match &self.kind {
            NodeKind::Leaf(leaf) => leaf.packet_count(),
            NodeKind::Group(group) => group.packet_count(),
        }
    }

    /// Workload weight used for scheduling (not wall-clock time).
    pub fn expected_load(&self) -> f64 {
        match &self.kind {
            NodeKind::Leaf(leaf) => leaf.expected_load(),
            NodeKind::Group(group) => group.expected_load(),
        }
    }

    /// Route a packet index of this group to its leaf.
    pub fn resolve(&self, index: usize) -> Result<Route<'_>, BatchError> {
        router::resolve(self, index)
    }

    fn route(&self, index: usize) -> Result<(&LeafBatch, usize), BatchError> {
        match &self.kind {
            NodeKind::Leaf(leaf) => Ok((leaf, index)),
            NodeKind::Group(_) => {
                let route = self.resolve(index)?;
                Ok((route.leaf, route.local_index))
            }
        }
    }

    /// Input packet at `index` of this node.
    pub fn input_packet(&self, index: usize) -> Result<Packet, BatchError> {
        let (leaf, local) = self.route(index)?;
        leaf.input_packet(local)
    }

    /// Ground-truth packet at `index` of this node.
    pub fn ground_truth_packet(&self, index: usize) -> Result<Packet, BatchError> {
        let (leaf, local) = self.route(index)?;
        leaf.ground_truth_packet(local)
    }

    /// Record the result of packet `index` on the leaf that owns it.
    pub fn push_result(&self, index: usize, result: &Packet) -> Result<(), BatchError> {
        let (leaf, local) = self.route(index)?;
        leaf.push_result(local, result)
    }

    /// Start precaching on every leaf below this node.
    ///
    /// On failure, leaves already started are stopped again.
    pub fn start_precaching(
        &self,
        using_ground_truth: bool,
        budget_bytes: usize,
    ) -> Result<(), BatchError> {
        let leaves = self.leaves();
        for (started, leaf) in leaves.iter().enumerate() {
            let result = leaf
                .as_leaf()
                .map_or(Ok(()), |l| l.start_precaching(using_ground_truth, budget_bytes));
            if let Err(e) = result {
                for node in &leaves[..started] {
                    node.stop_precaching();
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Stop precaching on every leaf below this node.
    pub fn stop_precaching(&self) {
        for leaf in self.leaves().into_iter().filter_map(BatchNode::as_leaf) {
            leaf.stop_precaching();
        }
    }

    /// Arm the progress counters of every leaf below this node.
    ///
    /// Every leaf is attempted even if one fails, so the subtree never ends
    /// up with only a prefix of its leaves armed. The first error is returned.
    pub fn start_processing(&self) -> Result<(), BatchError> {
        let mut first_error = None;
        for leaf in self.leaves().into_iter().filter_map(BatchNode::as_leaf) {
            if let Err(e) = leaf.start_processing() {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Stop every leaf below this node. Returns the summed final count.
    ///
    /// Every leaf is stopped even if one fails (for instance because it was
    /// already stopped on its own); the first error is returned after all
    /// workers are down and every completion signal has fired.
    pub fn stop_processing(&self) -> Result<usize, BatchError> {
        let mut total = 0;
        let mut first_error = None;
        for leaf in self.leaves().into_iter().filter_map(BatchNode::as_leaf) {
            match leaf.stop_processing() {
                Ok(count) => total += count,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(total), Err)
    }

    /// Processed packets so far, summed over the subtree. Never blocks.
    pub fn current_processed_count(&self) -> usize {
        match &self.kind {
            NodeKind::Leaf(leaf) => leaf.current_processed_count(),
            NodeKind::Group(group) => group
                .children()
                .iter()
                .map(|c| c.current_processed_count())
                .sum(),
        }
    }

    /// Final processed count, summed over the subtree.
    ///
    /// Blocks until every leaf below has signalled completion.
    pub fn final_processed_count(&self) -> Result<usize, BatchError> {
        match &self.kind {
            NodeKind::Leaf(leaf) => leaf.final_processed_count(),
            NodeKind::Group(group) => group
                .children()
                .iter()
                .map(|c| c.final_processed_count())
                .sum(),
        }
    }

    /// Processing time, summed over the subtree.
    pub fn process_time(&self) -> Duration {
        match &self.kind {
            NodeKind::Leaf(leaf) => leaf.process_time(),
            NodeKind::Group(group) => group.children().iter().map(|c| c.process_time()).sum(),
        }
    }

    /// Cache counters merged over every leaf and both sides.
    pub fn cache_stats(&self) -> PrefetchStatsSnapshot {
        self.leaves()
            .into_iter()
            .filter_map(BatchNode::as_leaf)
            .map(|leaf| {
                let (input, gt) = leaf.cache_stats();
                input.merged(&gt)
            })
            .fold(PrefetchStatsSnapshot::default(), |acc, s| acc.merged(&s))
    }
}
