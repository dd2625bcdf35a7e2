//! Mapping a flat packet index onto the leaf that holds it.
//!
//! A group's packets are the concatenation of its children's packets, in
//! child order:
//!
//! ```text
//! group:  [0 1 2 3 4 | 5 6 7 | 8 9 10 11 12 13 14]
//! leaf:      a (5)     b (3)        c (7)
//! ```
//!
//! Resolving walks down the tree, subtracting the counts of the children
//! it skips, until it lands in a leaf. Nothing is mutated along the way.

use super::error::BatchError;
use super::leaf::LeafBatch;
use super::node::{BatchNode, NodeKind};

/// Where a global packet index lives.
#[derive(Debug, Clone, Copy)]
pub struct Route<'a> {
    /// The leaf node.
    pub node: &'a BatchNode,
    /// The leaf's packets and caches.
    pub leaf: &'a LeafBatch,
    /// Index of the packet within the leaf.
    pub local_index: usize,
}

/// Resolve `index` relative to the group `node`.
///
/// # Errors
///
/// - [`BatchError::NotAGroup`] if `node` is a leaf
/// - [`BatchError::OutOfRange`] if `index >= node.total_packet_count()`
pub fn resolve(node: &BatchNode, index: usize) -> Result<Route<'_>, BatchError> {
    if !node.is_group() {
        return Err(BatchError::NotAGroup {
            batch: node.name().to_string(),
        });
    }
    let total = node.total_packet_count();
    if index >= total {
        return Err(BatchError::OutOfRange {
            batch: node.name().to_string(),
            index,
            total,
        });
    }

    let mut current = node;
    let mut local = index;
    loop {
        let group = match current.kind() {
            NodeKind::Leaf(leaf) => {
                return Ok(Route {
                    node: current,
                    leaf,
                    local_index: local,
                })
            }
            NodeKind::Group(group) => group,
        };
        let mut next = None;
        for child in group.children() {
            let count = child.total_packet_count();
            if local < count {
                next = Some(child.as_ref());
                break;
            }
            local -= count;
        }
        // Counts are cached at construction, so the walk always lands.
        current = next.ok_or_else(|| BatchError::OutOfRange {
            batch: current.name().to_string(),
            index: local,
            total: current.total_packet_count(),
        })?;
    }
}
