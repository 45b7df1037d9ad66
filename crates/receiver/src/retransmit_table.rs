//! The dynamic table of block indices awaiting retransmission.

use std::collections::VecDeque;

use diskio::ReceivedBitmap;

/// Starting capacity; the backing [`VecDeque`] doubles on growth the same
/// way any Rust growable collection does, so no manual resize logic is
/// needed here.
const INITIAL_CAPACITY: usize = 2048;

/// Indices the receiver believes are missing and has not yet resolved.
///
/// Entries are pushed in ascending order as forward gaps are detected, so
/// the oldest outstanding gap is always at the front.
#[derive(Debug, Default)]
pub struct RetransmitTable {
    entries: VecDeque<u32>,
}

impl RetransmitTable {
    /// Creates an empty table with the standard starting capacity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(INITIAL_CAPACITY),
        }
    }

    /// Records `block_index` as missing.
    pub fn push(&mut self, block_index: u32) {
        self.entries.push_back(block_index);
    }

    /// Number of indices currently tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no gaps are outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Discards every tracked index.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// If occupancy exceeds `threshold`, returns the oldest outstanding
    /// index and clears the table (the overload-escalation burst cap).
    pub fn overload_restart_target(&mut self, threshold: usize) -> Option<u32> {
        if self.entries.len() <= threshold {
            return None;
        }
        let target = self.entries[0];
        self.entries.clear();
        Some(target)
    }

    /// Compacts the table in place, dropping any index `received` already
    /// marks as written, and returns the surviving indices in order — the
    /// set to emit as `RETRANSMIT` records this round.
    pub fn drain_for_emission(&mut self, received: &ReceivedBitmap) -> Vec<u32> {
        self.entries.retain(|&block| !received.is_set(block));
        self.entries.iter().copied().collect()
    }
}
