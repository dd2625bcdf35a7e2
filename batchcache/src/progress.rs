//! Per-leaf processing progress with a one-shot completion signal.
//!
//! Each leaf batch owns a [`ProgressCounter`]. The consumer bumps it once
//! per finished packet; a controller can read the running count at any
//! time or block until the leaf declares that no more packets will be
//! processed.
//!
//! # Lifecycle
//!
//! ```text
//! Idle --begin()--> Running --complete()--> Completed
//! ```
//!
//! `complete()` fires exactly once. Waiting on an idle counter is an error
//! rather than a hang, since nothing would ever complete it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;
use tracing::debug;

use crate::error::ErrorCategory;

/// Errors raised when the completion protocol is violated.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProgressError {
    /// Completion was signalled a second time.
    #[error("Completion of '{name}' was already signalled")]
    AlreadyCompleted { name: String },

    /// The final count was requested before processing began.
    #[error("Processing of '{name}' has not started")]
    NotStarted { name: String },
}

impl ProgressError {
    /// Error category (always `Protocol`).
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::Protocol
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Running { started: Instant },
    Completed { count: usize, elapsed: Duration },
}

/// Processed-packet counter for one leaf batch.
#[derive(Debug)]
pub struct ProgressCounter {
    name: String,
    processed: AtomicUsize,
    phase: Mutex<Phase>,
    completed: Condvar,
}

impl ProgressCounter {
    /// New idle counter. `name` is used in errors and logs.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            processed: AtomicUsize::new(0),
            phase: Mutex::new(Phase::Idle),
            completed: Condvar::new(),
        }
    }

    /// Mark processing as started and start the clock.
    ///
    /// Calling it again while running is a no-op.
    pub fn begin(&self) -> Result<(), ProgressError> {
        let mut phase = self.phase.lock();
        match *phase {
            Phase::Idle => {
                *phase = Phase::Running {
                    started: Instant::now(),
                };
                Ok(())
            }
            Phase::Running { .. } => Ok(()),
            Phase::Completed { .. } => Err(ProgressError::AlreadyCompleted {
                name: self.name.clone(),
            }),
        }
    }

    /// Count one processed packet. Returns the new count.
    pub fn record_processed(&self) -> usize {
        self.processed.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Number of packets processed so far. Never blocks.
    pub fn current(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }

    /// Fire the completion signal with the current count.
    ///
    /// Wakes every thread blocked in [`wait_final`](Self::wait_final).
    pub fn complete(&self) -> Result<usize, ProgressError> {
        let mut phase = self.phase.lock();
        match *phase {
            Phase::Idle => Err(ProgressError::NotStarted {
                name: self.name.clone(),
            }),
            Phase::Running { started } => {
                let count = self.current();
                let elapsed = started.elapsed();
                *phase = Phase::Completed { count, elapsed };
                self.completed.notify_all();
                debug!(batch = %self.name, count, ?elapsed, "Processing completed");
                Ok(count)
            }
            Phase::Completed { .. } => Err(ProgressError::AlreadyCompleted {
                name: self.name.clone(),
            }),
        }
    }

    /// Block until completion, then return the final count.
    pub fn wait_final(&self) -> Result<usize, ProgressError> {
        let mut phase = self.phase.lock();
        loop {
            match *phase {
                Phase::Idle => {
                    return Err(ProgressError::NotStarted {
                        name: self.name.clone(),
                    })
                }
                Phase::Running { .. } => self.completed.wait(&mut phase),
                Phase::Completed { count, .. } => return Ok(count),
            }
        }
    }

    /// Like [`wait_final`](Self::wait_final), giving up after `timeout`.
    ///
    /// Returns `Ok(None)` on timeout.
    pub fn wait_final_timeout(&self, timeout: Duration) -> Result<Option<usize>, ProgressError> {
        let deadline = Instant::now() + timeout;
        let mut phase = self.phase.lock();
        loop {
            match *phase {
                Phase::Idle => {
                    return Err(ProgressError::NotStarted {
                        name: self.name.clone(),
                    })
                }
                Phase::Running { .. } => {
                    if self.completed.wait_until(&mut phase, deadline).timed_out() {
                        return Ok(match *phase {
                            Phase::Completed { count, .. } => Some(count),
                            _ => None,
                        });
                    }
                }
                Phase::Completed { count, .. } => return Ok(Some(count)),
            }
        }
    }

    /// Whether `begin` has been called.
    pub fn is_started(&self) -> bool {
        !matches!(*self.phase.lock(), Phase::Idle)
    }

    /// Whether the completion signal has fired.
    pub fn is_complete(&self) -> bool {
        matches!(*self.phase.lock(), Phase::Completed { .. })
    }

    /// Time between `begin` and `complete` (or now, while running).
    pub fn elapsed(&self) -> Duration {
        match *self.phase.lock() {
            Phase::Idle => Duration::ZERO,
            Phase::Running { started } => started.elapsed(),
            Phase::Completed { elapsed, .. } => elapsed,
        }
    }
}
