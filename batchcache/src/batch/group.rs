//! Group batches: ordered collections of child nodes.

use std::sync::Arc;

use super::node::BatchNode;
use super::ordering::compare_by_name;

/// Children of a group, fixed at construction.
///
/// Children are sorted by case-insensitive name once; routing and
/// iteration both follow that order. Totals are computed once as well,
/// since the topology never changes after construction.
#[derive(Debug)]
pub struct GroupBatch {
    children: Vec<Arc<BatchNode>>,
    packet_count: usize,
    expected_load: f64,
    bare: bool,
}

impl GroupBatch {
    pub(crate) fn new(mut children: Vec<Arc<BatchNode>>, bare: bool) -> Self {
        children.sort_by(|a, b| compare_by_name(a, b));
        let packet_count = children.iter().map(|c| c.total_packet_count()).sum();
        let expected_load = children.iter().map(|c| c.expected_load()).sum();
        Self {
            children,
            packet_count,
            expected_load,
            bare,
        }
    }

    /// Children in routing order.
    pub fn children(&self) -> &[Arc<BatchNode>] {
        &self.children
    }

    /// Sum of the children's packet counts.
    pub fn packet_count(&self) -> usize {
        self.packet_count
    }

    /// Sum of the children's loads.
    pub fn expected_load(&self) -> f64 {
        self.expected_load
    }

    /// Whether this group only wraps a single leaf of the same name.
    pub fn is_bare(&self) -> bool {
        self.bare
    }
}
