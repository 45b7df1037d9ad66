//! # Overview
//!
//! `diskio` is the receiver's disk-writer: it drains the [`ringbuf`] queue
//! in arrival order, seeks and writes each block's payload at its file
//! offset, and maintains the `received` bit set and `blocks_left` counter
//! the receiver loop reads for deduplication and completion detection.
//!
//! # Design
//!
//! [`writer::Writer`] tracks a `last_block` cursor and skips the seek when
//! the next block is contiguous with the last one written — the common
//! case for an in-order transfer. [`bitmap::ReceivedBitmap`] and
//! [`bitmap::BlocksLeft`] are the two pieces of state shared bidirectionally
//! with the receiver loop, built on per-word atomics rather than a lock.

mod bitmap;
mod writer;

pub use bitmap::{BlocksLeft, ReceivedBitmap};
pub use writer::{DiskIoError, Writer};
