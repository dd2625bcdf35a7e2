//! Background prefetching of packets.
//!
//! A [`PrefetchCache`] hides source latency from a mostly-sequential reader
//! by producing packets ahead of it on a dedicated worker thread, inside a
//! bounded window of memory.
//!
//! # Architecture
//!
//! - [`PrefetchConfig`]: budget and ground-truth settings for a batch
//! - [`PrefetchCache`]: the cache, its worker thread and the read path
//! - [`PrefetchStats`]: lock-free hit/miss counters
//!
//! # Access patterns
//!
//! | Pattern                   | Cost per read                          |
//! |---------------------------|----------------------------------------|
//! | sequential `0, 1, 2, ...` | window pop (worker stays ahead)        |
//! | repeat of last two reads  | no window lock                         |
//! | random jump               | one synchronous fetch, window restarts |
//!
//! After a random jump to `k`, the worker resumes at `k + 1`, so the
//! following sequential read is served from the window again.

mod cache;
mod config;
mod error;
mod stats;
mod window;

pub use cache::{PrefetchCache, WindowState};
pub use config::{
    PrefetchConfig, DEFAULT_BUFFER_BUDGET_BYTES, SIZE_PROBE_INDEX, WORKER_THREAD_PREFIX,
};
pub use error::PrefetchError;
pub use stats::{PrefetchStats, PrefetchStatsSnapshot};
