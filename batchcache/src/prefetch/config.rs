//! Precache settings.

/// Default byte budget for one prefetch window (256 MiB).
pub const DEFAULT_BUFFER_BUDGET_BYTES: usize = 256 * 1024 * 1024;

/// Index fetched once at start to estimate the packet size.
pub const SIZE_PROBE_INDEX: usize = 0;

/// Prefix of worker thread names; the cache name is appended.
pub const WORKER_THREAD_PREFIX: &str = "precache";

/// How a batch should precache its packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefetchConfig {
    /// Byte budget of each prefetch window (input and ground truth each get one).
    ///
    /// Default: 256 MiB.
    pub buffer_budget_bytes: usize,

    /// Whether ground-truth packets are precached alongside input packets.
    ///
    /// Default: false.
    pub ground_truth: bool,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            buffer_budget_bytes: DEFAULT_BUFFER_BUDGET_BYTES,
            ground_truth: false,
        }
    }
}

impl PrefetchConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-window byte budget.
    pub fn with_buffer_budget(mut self, bytes: usize) -> Self {
        self.buffer_budget_bytes = bytes;
        self
    }

    /// Enable or disable ground-truth precaching.
    pub fn with_ground_truth(mut self, enabled: bool) -> Self {
        self.ground_truth = enabled;
        self
    }
}
