//! BatchCache - prefetching packet cache and hierarchical batch indexing
//!
//! This library organizes large, ordered collections of media packets (video
//! frames or images, each with a ground-truth counterpart) into a tree of
//! batches, and hides source latency behind a background prefetcher.
//!
//! # Modules
//!
//! - [`prefetch`]: bounded, self-healing prefetch window over a packet source
//! - [`batch`]: leaf/group tree, index routing, progress aggregation, ordering
//! - [`progress`]: per-leaf processed counter with a one-shot completion signal
//! - [`source`]: the packet source abstraction and a few adapters
//! - [`dataset`]: dataset metadata and the tree root
//! - [`config`], [`logging`]: INI configuration and `tracing` setup
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use batchcache::batch::{BatchMeta, BatchNode, LeafSpec};
//! use batchcache::dataset::DatasetKind;
//!
//! let leaf = BatchNode::leaf(
//!     BatchMeta::new("highway", DatasetKind::VideoSegmentation),
//!     LeafSpec::new(input, ground_truth),
//! );
//! leaf.start_precaching(false, 64 * 1024 * 1024)?;
//! for index in 0..leaf.total_packet_count() {
//!     let frame = leaf.input_packet(index)?;
//!     leaf.push_result(index, &process(&frame))?;
//! }
//! ```

pub mod batch;
pub mod config;
pub mod dataset;
pub mod error;
pub mod logging;
pub mod packet;
pub mod prefetch;
pub mod progress;
pub mod source;

pub use batch::{BatchError, BatchNode};
pub use error::ErrorCategory;
pub use packet::{FrameGeometry, Packet};
pub use prefetch::{PrefetchCache, PrefetchError};
pub use source::{FetchError, PacketSource};
