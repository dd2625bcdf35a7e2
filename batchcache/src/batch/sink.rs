//! Result sinks: where processed results go.
//!
//! Persisting results is the collaborator's job. The tree only routes a
//! result to the leaf that owns the packet index and hands it over.

use parking_lot::Mutex;
use thiserror::Error;

use crate::packet::Packet;

/// Failure reported by a [`ResultSink`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct SinkError(pub String);

/// Receives one result per processed packet.
pub trait ResultSink: Send + Sync {
    /// Accept the result computed for packet `index` of leaf `batch`.
    fn push_result(&self, batch: &str, index: usize, result: &Packet) -> Result<(), SinkError>;
}

/// A recorded result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResult {
    pub batch: String,
    pub index: usize,
    pub result: Packet,
}

/// Keeps every result in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    results: Mutex<Vec<StoredResult>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of results received.
    pub fn len(&self) -> usize {
        self.results.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.lock().is_empty()
    }

    /// Copy of every result received, in arrival order.
    pub fn results(&self) -> Vec<StoredResult> {
        self.results.lock().clone()
    }
}

impl ResultSink for MemorySink {
    fn push_result(&self, batch: &str, index: usize, result: &Packet) -> Result<(), SinkError> {
        self.results.lock().push(StoredResult {
            batch: batch.to_string(),
            index,
            result: result.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_memory_sink_records_in_order() {
        let sink = MemorySink::new();
        assert!(sink.is_empty());

        sink.push_result("a", 0, &Packet::new(vec![1u8])).unwrap();
        sink.push_result("b", 3, &Packet::new(vec![2u8])).unwrap();

        let results = sink.results();
        assert_eq!(sink.len(), 2);
        assert_eq!(results[0].batch, "a");
        assert_eq!(results[1].index, 3);
    }

    #[test]
    fn test_trait_object_usage() {
        let sink: Arc<dyn ResultSink> = Arc::new(MemorySink::new());
        assert!(sink.push_result("a", 0, &Packet::empty()).is_ok());
    }
}
