//! Packet sources: the external collaborators that produce packets.
//!
//! The core never decodes media. Everything it knows about the data comes
//! through the two calls of [`PacketSource`]: how many packets exist, and
//! "give me packet K". Sources are invoked from the prefetch worker thread
//! as well as from the caller's thread, hence the `Send + Sync` bound.
//!
//! # Provided adapters
//!
//! - [`FnSource`]: wraps a closure
//! - [`SyntheticSource`]: deterministic generated frames, with optional
//!   latency and failure injection
//! - [`ConstantSource`]: the same packet for every index
//! - [`FileListSource`]: one file per packet, raw bytes

mod files;
mod synthetic;

use std::path::PathBuf;

use thiserror::Error;

use crate::error::ErrorCategory;
use crate::packet::Packet;

pub use files::FileListSource;
pub use synthetic::{ConstantSource, SyntheticSource};

/// Errors raised by a packet source.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The index is past the end of the source.
    #[error("Packet {index} is out of range (source holds {count} packets)")]
    OutOfRange { index: usize, count: usize },

    /// Reading the backing file failed.
    #[error("Failed to read packet {index} from {}: {reason}", path.display())]
    Io {
        index: usize,
        path: PathBuf,
        reason: String,
    },

    /// The source could not produce the packet for another reason.
    #[error("Source failed to produce packet {index}: {reason}")]
    Failed { index: usize, reason: String },
}

impl FetchError {
    /// Index of the packet that could not be produced.
    pub fn index(&self) -> usize {
        match self {
            FetchError::OutOfRange { index, .. }
            | FetchError::Io { index, .. }
            | FetchError::Failed { index, .. } => *index,
        }
    }

    /// Error category (always `SourceFetch`).
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::SourceFetch
    }
}

/// Produces packets by index.
///
/// # Contract
///
/// - `packet_count()` is fixed for the lifetime of the source.
/// - `fetch_packet(k)` is deterministic for a fixed `k` and must succeed
///   for every `k` in `0..packet_count()` unless the backing media is
///   genuinely broken.
/// - Both calls may come from a background thread.
pub trait PacketSource: Send + Sync {
    /// Total number of packets.
    fn packet_count(&self) -> usize;

    /// Produce the packet at `index`.
    fn fetch_packet(&self, index: usize) -> Result<Packet, FetchError>;
}

/// Source backed by a closure.
///
/// ```
/// use batchcache::packet::Packet;
/// use batchcache::source::{FnSource, PacketSource};
///
/// let source = FnSource::new(3, |index| Ok(Packet::new(vec![index as u8])));
/// assert_eq!(source.packet_count(), 3);
/// assert_eq!(source.fetch_packet(2).unwrap().data().as_ref(), &[2]);
/// ```
pub struct FnSource<F> {
    count: usize,
    fetch: F,
}

impl<F> FnSource<F>
where
    F: Fn(usize) -> Result<Packet, FetchError> + Send + Sync,
{
    /// Create a source of `count` packets produced by `fetch`.
    pub fn new(count: usize, fetch: F) -> Self {
        Self { count, fetch }
    }
}

impl<F> PacketSource for FnSource<F>
where
    F: Fn(usize) -> Result<Packet, FetchError> + Send + Sync,
{
    fn packet_count(&self) -> usize {
        self.count
    }

    fn fetch_packet(&self, index: usize) -> Result<Packet, FetchError> {
        if index >= self.count {
            return Err(FetchError::OutOfRange {
                index,
                count: self.count,
            });
        }
        (self.fetch)(index)
    }
}

impl std::fmt::Debug for dyn PacketSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketSource")
            .field("packet_count", &self.packet_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_fn_source_delegates() {
        let source = FnSource::new(4, |i| Ok(Packet::new(vec![i as u8; 2])));
        assert_eq!(source.packet_count(), 4);
        assert_eq!(source.fetch_packet(3).unwrap().data().as_ref(), &[3, 3]);
    }

    #[test]
    fn test_fn_source_rejects_out_of_range() {
        let source = FnSource::new(2, |_| Ok(Packet::empty()));
        let err = source.fetch_packet(2).unwrap_err();
        assert_eq!(err, FetchError::OutOfRange { index: 2, count: 2 });
        assert_eq!(err.index(), 2);
        assert_eq!(err.category(), ErrorCategory::SourceFetch);
    }

    #[test]
    fn test_fetch_error_display() {
        let err = FetchError::Failed {
            index: 7,
            reason: "decoder crashed".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Source failed to produce packet 7: decoder crashed"
        );
    }

    #[test]
    fn test_trait_object_usage() {
        let source: Arc<dyn PacketSource> =
            Arc::new(FnSource::new(1, |_| Ok(Packet::new(vec![9u8]))));
        assert_eq!(source.packet_count(), 1);
        assert!(format!("{:?}", source).contains("packet_count: 1"));
    }
}
