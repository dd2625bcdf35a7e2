//! Error types for prefetch caches.

use thiserror::Error;

use crate::error::ErrorCategory;
use crate::source::FetchError;

/// Errors that can occur while starting or reading a prefetch cache.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PrefetchError {
    /// The source has no packets to precache.
    #[error("Cannot precache '{cache}': source has no packets")]
    NoPackets { cache: String },

    /// The byte budget cannot hold a single packet.
    #[error("Buffer budget of {budget} bytes cannot hold one {packet_bytes}-byte packet")]
    BudgetTooSmall { budget: usize, packet_bytes: usize },

    /// `start_precaching` was called on a running cache.
    #[error("Precaching is already running for '{cache}'")]
    AlreadyRunning { cache: String },

    /// The worker thread could not be spawned.
    #[error("Failed to spawn precache worker: {0}")]
    Spawn(String),

    /// The requested index is past the end of the precached source.
    #[error("Packet {index} is out of range (cache holds {count} packets)")]
    IndexOutOfRange { index: usize, count: usize },

    /// The source failed to produce a packet.
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl PrefetchError {
    /// Error category of this failure.
    pub fn category(&self) -> ErrorCategory {
        match self {
            PrefetchError::NoPackets { .. }
            | PrefetchError::BudgetTooSmall { .. }
            | PrefetchError::AlreadyRunning { .. }
            | PrefetchError::Spawn(_) => ErrorCategory::Configuration,
            PrefetchError::IndexOutOfRange { .. } => ErrorCategory::Range,
            PrefetchError::Fetch(_) => ErrorCategory::SourceFetch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_budget_too_small() {
        let err = PrefetchError::BudgetTooSmall {
            budget: 10,
            packet_bytes: 64,
        };
        assert_eq!(
            err.to_string(),
            "Buffer budget of 10 bytes cannot hold one 64-byte packet"
        );
    }

    #[test]
    fn test_fetch_error_is_transparent() {
        let fetch = FetchError::Failed {
            index: 3,
            reason: "eof".to_string(),
        };
        let err: PrefetchError = fetch.clone().into();
        assert_eq!(err.to_string(), fetch.to_string());
    }

    #[test]
    fn test_categories() {
        let cache = "seq".to_string();
        assert_eq!(
            PrefetchError::NoPackets { cache: cache.clone() }.category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            PrefetchError::AlreadyRunning { cache }.category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            PrefetchError::IndexOutOfRange { index: 4, count: 4 }.category(),
            ErrorCategory::Range
        );
        assert_eq!(
            PrefetchError::Fetch(FetchError::OutOfRange { index: 1, count: 0 }).category(),
            ErrorCategory::SourceFetch
        );
    }
}
