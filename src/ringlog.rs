//! Bounded, ordered, append-only log of captured events.
//!
//! The log owns the sequence counter: `append` assigns the next sequence
//! number and evicts the oldest entry once the configured capacity is
//! exceeded. Readers get an `Arc` snapshot of the slice they asked for so
//! filter evaluation never runs under the log's lock.

use crate::event::DebugEvent;
use std::collections::VecDeque;
use std::sync::Arc;

pub const DEFAULT_CAPACITY: usize = 10_000;

/// Result of a `read_since` scan: the events examined and the sequence
/// number of the last one, which is where the caller's cursor should land.
pub struct ReadSlice {
    pub events: Vec<Arc<DebugEvent>>,
    /// Sequence of the last event examined. Equal to the passed-in cursor
    /// when nothing newer was buffered.
    pub last_seq: u64,
}

pub struct RingLog {
    events: VecDeque<Arc<DebugEvent>>,
    capacity: usize,
    /// Last assigned sequence number; 0 means nothing ingested yet.
    /// Never rewinds, even across eviction.
    current_seq: u64,
}

impl RingLog {
    pub fn new(capacity: usize) -> Self {
        RingLog {
            events: VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY)),
            capacity: capacity.max(1),
            current_seq: 0,
        }
    }

    /// Append one captured event, assigning it the next sequence number.
    /// Evicts the smallest-sequence entry if the log is over capacity.
    pub fn append(
        &mut self,
        time: u64,
        pid: u32,
        process_name: Option<String>,
        text: String,
    ) -> u64 {
        self.current_seq += 1;
        self.events.push_back(Arc::new(DebugEvent {
            seq: self.current_seq,
            time,
            pid,
            process_name,
            text,
        }));
        while self.events.len() > self.capacity {
            self.events.pop_front();
        }
        self.current_seq
    }

    /// Events with sequence > `cursor`, oldest first, at most `limit` of
    /// them. A cursor pointing into an evicted range silently resumes from
    /// the oldest retained event; the lost backlog is gone by design.
    pub fn read_since(&self, cursor: u64, limit: usize) -> ReadSlice {
        let mut events = Vec::new();
        let mut last_seq = cursor;
        for event in self.events.iter() {
            if event.seq <= cursor {
                continue;
            }
            if events.len() >= limit {
                break;
            }
            last_seq = event.seq;
            events.push(event.clone());
        }
        ReadSlice { events, last_seq }
    }

    /// Count of buffered events with sequence > `cursor`, pre-filter.
    pub fn pending_count(&self, cursor: u64) -> usize {
        self.events.iter().filter(|e| e.seq > cursor).count()
    }

    /// Last assigned sequence number (0 before any ingestion).
    pub fn current_seq(&self) -> u64 {
        self.current_seq
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
