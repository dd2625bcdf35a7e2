//! Error types for batch trees.

use thiserror::Error;

use super::sink::SinkError;
use crate::error::ErrorCategory;
use crate::prefetch::PrefetchError;
use crate::progress::ProgressError;

/// Errors raised by batch nodes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BatchError {
    /// A packet index is at or past the end of the node.
    #[error("Packet index {index} is out of range for '{batch}' ({total} packets)")]
    OutOfRange {
        batch: String,
        index: usize,
        total: usize,
    },

    /// Routing was attempted on a leaf.
    #[error("'{batch}' is a leaf batch and has no children to route through")]
    NotAGroup { batch: String },

    /// Reading or precaching packets failed.
    #[error("'{batch}': {source}")]
    Packet {
        batch: String,
        #[source]
        source: PrefetchError,
    },

    /// The completion protocol was violated.
    #[error(transparent)]
    Progress(#[from] ProgressError),

    /// The result sink rejected a result.
    #[error("Failed to record result {index} for '{batch}': {source}")]
    Sink {
        batch: String,
        index: usize,
        #[source]
        source: SinkError,
    },
}

impl BatchError {
    /// Error category of this failure.
    pub fn category(&self) -> ErrorCategory {
        match self {
            BatchError::OutOfRange { .. } | BatchError::NotAGroup { .. } => ErrorCategory::Range,
            BatchError::Packet { source, .. } => source.category(),
            BatchError::Progress(e) => e.category(),
            BatchError::Sink { .. } => ErrorCategory::SourceFetch,
        }
    }
}
