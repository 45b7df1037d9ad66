//! Shared `received` bit set and `blocks_left` counter.
//!
//! Updates to `received[k]` must happen-before any subsequent read of
//! `received[k]`; this module uses a per-byte atomic word with
//! release/acquire ordering to satisfy that without a global lock.

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

/// Bit set tracking which 1-based block indices have been written to disk.
///
/// Indexed `[1..=block_count]`; index `0` is never set (it is the ring
/// buffer's shutdown sentinel, not a real block).
pub struct ReceivedBitmap {
    words: Vec<AtomicU8>,
}

impl ReceivedBitmap {
    /// Creates a bitmap large enough to track `block_count` blocks.
    #[must_use]
    pub fn new(block_count: u32) -> Self {
        let word_count = (block_count as usize / 8) + 1;
        let mut words = Vec::with_capacity(word_count);
        words.resize_with(word_count, || AtomicU8::new(0));
        Self { words }
    }

    /// Marks `block_index` as received. Uses `Release` ordering so a
    /// subsequent `Acquire` read by [`Self::is_set`] observes the write.
    pub fn set(&self, block_index: u32) {
        let word = block_index as usize / 8;
        let bit = 1u8 << (block_index % 8);
        self.words[word].fetch_or(bit, Ordering::Release);
    }

    /// Returns whether `block_index` has already been received.
    #[must_use]
    pub fn is_set(&self, block_index: u32) -> bool {
        let word = block_index as usize / 8;
        let bit = 1u8 << (block_index % 8);
        self.words[word].load(Ordering::Acquire) & bit != 0
    }
}

/// Atomic countdown of blocks remaining until the transfer is complete.
pub struct BlocksLeft {
    remaining: AtomicU32,
}

impl BlocksLeft {
    /// Initializes the counter to `block_count` (`N`).
    #[must_use]
    pub const fn new(block_count: u32) -> Self {
        Self {
            remaining: AtomicU32::new(block_count),
        }
    }

    /// Decrements the counter by one, returning the new value.
    pub fn decrement(&self) -> u32 {
        self.remaining.fetch_sub(1, Ordering::AcqRel) - 1
    }

    /// Reads the current count without modifying it.
    #[must_use]
    pub fn get(&self) -> u32 {
        self.remaining.load(Ordering::Acquire)
    }

    /// Returns `true` once every block has been accounted for.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.get() == 0
    }
}
