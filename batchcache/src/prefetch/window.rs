//! The contiguous window of prefetched packets.
//!
//! `Window` is the state shared between the reader and the worker. It has
//! no locking of its own; [`PrefetchCache`](super::PrefetchCache) keeps it
//! behind a single mutex and drives it from both sides.
//!
//! ```text
//!   consumed          buffered                    not yet produced
//! [0 ........ first | first ........ next) | next ............. total)
//!                    \_____ packets ______/
//! ```
//!
//! Every restart bumps `generation`. A packet the worker fetched under an
//! older generation no longer belongs at the head of the window and is
//! dropped instead of appended.

use std::collections::VecDeque;

use crate::packet::Packet;

/// Outcome of a reader lookup.
#[derive(Debug)]
pub(crate) enum Lookup {
    /// The packet was buffered and has been removed from the window.
    Ready { packet: Packet, skipped: usize },
    /// The worker is about to produce (or is producing) this index.
    Pending { skipped: usize },
    /// The window cannot serve this index; fetch it directly.
    Miss,
}

#[derive(Debug, Default)]
pub(crate) struct Window {
    packets: VecDeque<Packet>,
    first: usize,
    next: usize,
    total: usize,
    capacity: usize,
    budget_bytes: usize,
    buffered_bytes: usize,
    next_expected: usize,
    generation: u64,
    in_flight: Option<usize>,
    stalled: bool,
    running: bool,
}

impl Window {
    /// A running window over `total` packets holding at most `capacity`
    /// packets and `budget_bytes` bytes.
    pub fn started(total: usize, capacity: usize, budget_bytes: usize) -> Self {
        Self {
            packets: VecDeque::with_capacity(capacity.min(total)),
            total,
            capacity,
            budget_bytes,
            running: true,
            ..Default::default()
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes
    }

    pub fn first_buffered(&self) -> usize {
        self.first
    }

    pub fn next_buffered(&self) -> usize {
        self.next
    }

    pub fn next_expected(&self) -> usize {
        self.next_expected
    }

    fn is_full(&self) -> bool {
        self.packets.len() >= self.capacity
            || (!self.packets.is_empty() && self.buffered_bytes >= self.budget_bytes)
    }

    /// Append a packet the caller already holds for index `next`.
    ///
    /// Used to keep the size-probe packet instead of producing it twice.
    pub fn seed(&mut self, packet: Packet) {
        if self.running && !self.is_full() && self.next < self.total {
            self.push(packet);
        }
    }

    fn push(&mut self, packet: Packet) {
        self.buffered_bytes += packet.byte_len();
        self.packets.push_back(packet);
        self.next += 1;
    }

    /// Drop buffered packets below `index`. Returns how many were dropped.
    fn discard_before(&mut self, index: usize) -> usize {
        let mut dropped = 0;
        while self.first < index {
            match self.packets.pop_front() {
                Some(packet) => self.buffered_bytes -= packet.byte_len(),
                None => break,
            }
            self.first += 1;
            dropped += 1;
        }
        dropped
    }

    /// Reader side: try to serve `index` from the window.
    pub fn lookup(&mut self, index: usize) -> Lookup {
        if !self.running || index < self.first || index > self.next || index >= self.total {
            return Lookup::Miss;
        }
        let skipped = self.discard_before(index);
        if index < self.next {
            if let Some(packet) = self.packets.pop_front() {
                self.buffered_bytes -= packet.byte_len();
                self.first = index + 1;
                self.next_expected = index + 1;
                return Lookup::Ready { packet, skipped };
            }
        }
        if self.stalled {
            return Lookup::Miss;
        }
        Lookup::Pending { skipped }
    }

    /// Reader side: move production to `index` after a miss.
    ///
    /// Returns the number of buffered packets thrown away.
    pub fn restart_at(&mut self, index: usize) -> usize {
        let dropped = self.packets.len();
        self.packets.clear();
        self.buffered_bytes = 0;
        self.first = index.min(self.total);
        self.next = self.first;
        self.next_expected = index;
        self.generation += 1;
        self.stalled = false;
        dropped
    }

    /// Worker side: the next index to produce, if there is room and work.
    pub fn next_to_produce(&self) -> Option<usize> {
        if self.running && !self.stalled && !self.is_full() && self.next < self.total {
            Some(self.next)
        } else {
            None
        }
    }

    /// Worker side: mark `index` as being fetched. Returns the generation tag.
    pub fn begin_production(&mut self, index: usize) -> u64 {
        self.in_flight = Some(index);
        self.generation
    }

    /// Worker side: append a produced packet.
    ///
    /// Returns false when the window moved on while the packet was being
    /// fetched, in which case the packet is dropped.
    pub fn complete_production(&mut self, generation: u64, packet: Packet) -> bool {
        let index = self.in_flight.take();
        if !self.running || generation != self.generation || index != Some(self.next) {
            return false;
        }
        self.push(packet);
        true
    }

    /// Worker side: the source failed at the head of the window.
    ///
    /// Production pauses until the reader restarts the window.
    pub fn fail_production(&mut self, generation: u64) {
        self.in_flight = None;
        if generation == self.generation {
            self.stalled = true;
        }
    }

    /// Stop production and drop everything. Returns the number dropped.
    pub fn shut_down(&mut self) -> usize {
        self.running = false;
        let dropped = self.packets.len();
        self.packets.clear();
        self.buffered_bytes = 0;
        self.first = self.next;
        dropped
    }
}
