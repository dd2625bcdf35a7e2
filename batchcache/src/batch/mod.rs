//! Hierarchical batch tree.
//!
//! A dataset is a tree of [`BatchNode`]s. Leaves own a pair of packet
//! sources (input and ground truth), a pair of [`PrefetchCache`]s and a
//! processed-packet counter. Groups own an ordered list of children and
//! no packets of their own.
//!
//! # Architecture
//!
//! ```text
//!                     root (group, 15 packets)
//!                    /        |          \
//!             a (leaf, 5)  b (leaf, 3)  c (leaf, 7)
//!             input cache  input cache  input cache
//!             gt cache     gt cache     gt cache
//! ```
//!
//! Topology is fixed once built, so routing and ordering need no locks.
//! Only the per-leaf counters and caches synchronize, each independently.
//!
//! - [`router`]: flat index to `(leaf, local index)`
//! - [`ordering`]: name and load comparators plus [`BatchQueue`]
//! - [`sink`]: where pushed results go
//!
//! [`PrefetchCache`]: crate::prefetch::PrefetchCache

mod error;
mod group;
mod leaf;
mod node;
pub mod ordering;
pub mod router;
pub mod sink;

pub use error::BatchError;
pub use group::GroupBatch;
pub use leaf::{LeafBatch, LeafSpec};
pub use node::{BatchMeta, BatchNode, NodeKind};
pub use ordering::{
    compare_by_load, compare_by_name, compare_lowercase, sort_batches, BatchOrder, BatchQueue,
};
pub use router::Route;
pub use sink::{MemorySink, ResultSink, SinkError, StoredResult};
