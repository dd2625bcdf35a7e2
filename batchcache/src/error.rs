//! Error classification shared by every module.
//!
//! Each module owns its own error enum (derived with `thiserror`). They all
//! map onto one of four categories so callers can decide how to react
//! without matching on every variant:
//!
//! | Category        | Raised by                                         |
//! |-----------------|---------------------------------------------------|
//! | `Configuration` | zero packets, budget too small, double start      |
//! | `SourceFetch`   | the packet source failed to produce an index      |
//! | `Range`         | index past the end, routing through a leaf        |
//! | `Protocol`      | completion signalled twice, wait before start     |
//!
//! Nothing in the crate retries automatically; the category only tells the
//! caller whether a retry at a higher level makes sense.

use std::fmt;

/// Broad class of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Invalid setup, reported immediately and never retried.
    Configuration,
    /// The external packet source could not deliver a packet.
    SourceFetch,
    /// An index was outside the addressable range of a node.
    Range,
    /// An operation was invoked out of its lifecycle order.
    Protocol,
}

impl ErrorCategory {
    /// Short lowercase label for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::SourceFetch => "source-fetch",
            ErrorCategory::Range => "range",
            ErrorCategory::Protocol => "protocol",
        }
    }

    /// Whether retrying the same operation later could succeed.
    ///
    /// Only source failures can be transient; everything else is a bug or
    /// a bad setup on the caller's side.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::SourceFetch)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
