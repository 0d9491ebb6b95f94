//! Outstanding-segment bookkeeping for the sending side.

use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};
use tokio::task::JoinHandle;

/// How many retransmissions a single segment gets before the transfer dies.
pub const MAX_RETRANSMITS: u32 = 16;

/// Observation count of one ack number that triggers a fast retransmit.
pub const DUP_ACK_TRIGGER: u32 = 3;

/// One segment in flight: its payload, how often it has been retransmitted,
/// and the handle of its pending retransmission timer.
pub struct InFlight {
    pub payload: Bytes,
    pub retransmits: u32,
    pub timer: JoinHandle<()>,
}

/// Sliding window over unacknowledged segments, capped in segments rather
/// than bytes, plus the transfer-wide duplicate-ack counter.
pub struct SendWindow {
    capacity: usize,
    segments: BTreeMap<u32, InFlight>,
    ack_seen: HashMap<u32, u32>,
}

impl SendWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            segments: BTreeMap::new(),
            ack_seen: HashMap::new(),
        }
    }

    pub fn has_room(&self) -> bool {
        self.segments.len() < self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn contains(&self, seq: u32) -> bool {
        self.segments.contains_key(&seq)
    }

    pub fn get_mut(&mut self, seq: u32) -> Option<&mut InFlight> {
        self.segments.get_mut(&seq)
    }

    /// Lowest outstanding sequence number, the fast-retransmit target.
    pub fn lowest(&self) -> Option<u32> {
        self.segments.keys().next().copied()
    }

    pub fn insert(&mut self, seq: u32, entry: InFlight) {
        self.segments.insert(seq, entry);
    }

    /// Removes every outstanding segment whose end byte is covered by the
    /// cumulative `ack` and cancels its timer. Returns how many came out.
    pub fn ack(&mut self, ack: u32) -> usize {
        let covered: Vec<u32> = self
            .segments
            .iter()
            .filter(|&(&seq, ref entry)| seq + entry.payload.len() as u32 <= ack)
            .map(|(&seq, _)| seq)
            .collect();
        for seq in &covered {
            if let Some(entry) = self.segments.remove(seq) {
                entry.timer.abort();
            }
        }
        covered.len()
    }

    /// Records one observation of `ack` and returns the running total.
    pub fn observe_ack(&mut self, ack: u32) -> u32 {
        let count = self.ack_seen.entry(ack).or_insert(0);
        *count += 1;
        *count
    }

    /// Cancels every pending timer and forgets the in-flight segments.
    pub fn shutdown(&mut self) {
        for entry in self.segments.values() {
            entry.timer.abort();
        }
        self.segments.clear();
    }
}
