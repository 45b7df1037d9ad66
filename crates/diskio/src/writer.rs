//! The disk-writer loop: drains the ring buffer, seeks and writes each
//! block, and maintains the shared received-bitmap and blocks-left counter.

use std::io::{self, Seek, SeekFrom, Write};
use std::sync::Arc;

use ringbuf::{Consumer, RecvError};

use crate::bitmap::{BlocksLeft, ReceivedBitmap};

/// Errors raised while writing blocks to disk.
#[derive(Debug, thiserror::Error)]
pub enum DiskIoError {
    /// The underlying file seek or write failed.
    #[error("disk I/O error writing block {block_index}: {source}")]
    Io {
        /// The block being written when the error occurred.
        block_index: u32,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The ring buffer producer was dropped before the sentinel arrived.
    #[error("ring buffer closed before the shutdown sentinel was received")]
    RingBufferClosed,
}

/// Writes received blocks to a file, tracking the seek-skip `last_block`
/// cursor across calls.
pub struct Writer<W> {
    file: W,
    block_size: u32,
    file_size: u64,
    block_count: u32,
    last_block: Option<u32>,
    received: Arc<ReceivedBitmap>,
    blocks_left: Arc<BlocksLeft>,
}

impl<W: Write + Seek> Writer<W> {
    /// Creates a writer for a file of `file_size` bytes split into
    /// `block_count` blocks of `block_size`, sharing `received` and
    /// `blocks_left` with the receiver loop.
    #[must_use]
    pub fn new(
        file: W,
        block_size: u32,
        file_size: u64,
        block_count: u32,
        received: Arc<ReceivedBitmap>,
        blocks_left: Arc<BlocksLeft>,
    ) -> Self {
        Self {
            file,
            block_size,
            file_size,
            block_count,
            last_block: None,
            received,
            blocks_left,
        }
    }

    fn write_size_for(&self, block_index: u32) -> u32 {
        if block_index != self.block_count {
            return self.block_size;
        }
        let remainder = (self.file_size % u64::from(self.block_size)) as u32;
        if remainder == 0 {
            self.block_size
        } else {
            remainder
        }
    }

    /// Writes one block's payload at its file offset, skipping the seek when
    /// contiguous with the previously written block, then publishes the
    /// received bit and decrements `blocks_left`.
    ///
    /// A block already marked received is a silent no-op, matching the
    /// reference duplicate-delivery guard.
    pub fn accept_block(&mut self, block_index: u32, payload: &[u8]) -> Result<(), DiskIoError> {
        if self.received.is_set(block_index) {
            return Ok(());
        }

        let write_size = self.write_size_for(block_index) as usize;
        let write_size = write_size.min(payload.len());

        if self.last_block != Some(block_index.wrapping_sub(1)) {
            let offset = u64::from(self.block_size) * u64::from(block_index - 1);
            self.file
                .seek(SeekFrom::Start(offset))
                .map_err(|source| DiskIoError::Io { block_index, source })?;
        }

        self.file
            .write_all(&payload[..write_size])
            .map_err(|source| DiskIoError::Io { block_index, source })?;

        self.received.set(block_index);
        self.blocks_left.decrement();
        self.last_block = Some(block_index);
        logging::trace_debug!(block_index, write_size, "wrote block to disk");

        Ok(())
    }

    /// Runs the writer loop until the ring buffer yields the sentinel slot
    /// or is closed unexpectedly.
    pub fn run(mut self, consumer: &Consumer) -> Result<(), DiskIoError> {
        loop {
            let slot = match consumer.recv() {
                Ok(slot) => slot,
                Err(RecvError::Closed) => return Err(DiskIoError::RingBufferClosed),
            };

            if slot.is_sentinel() {
                return Ok(());
            }

            self.accept_block(slot.block_index, &slot.payload)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringbuf::Slot;
    use std::io::Cursor;
    use wire::BlockType;

    fn make_writer(block_count: u32, file_size: u64) -> Writer<Cursor<Vec<u8>>> {
        Writer::new(
            Cursor::new(vec![0u8; file_size as usize]),
            4,
            file_size,
            block_count,
            Arc::new(ReceivedBitmap::new(block_count)),
            Arc::new(BlocksLeft::new(block_count)),
        )
    }

    #[test]
    fn writes_full_blocks_at_correct_offsets() {
        let mut writer = make_writer(2, 8);
        writer.accept_block(1, &[1, 2, 3, 4]).unwrap();
        writer.accept_block(2, &[5, 6, 7, 8]).unwrap();
        assert_eq!(writer.file.get_ref(), &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(writer.blocks_left.is_done());
    }

    #[test]
    fn short_last_block_writes_only_remainder() {
        let mut writer = make_writer(2, 6);
        writer.accept_block(1, &[1, 2, 3, 4]).unwrap();
        writer.accept_block(2, &[5, 6, 0, 0]).unwrap();
        assert_eq!(writer.file.get_ref(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn duplicate_block_is_a_noop() {
        let mut writer = make_writer(1, 4);
        writer.accept_block(1, &[9, 9, 9, 9]).unwrap();
        writer.accept_block(1, &[1, 1, 1, 1]).unwrap();
        assert_eq!(writer.file.get_ref(), &[9, 9, 9, 9]);
        assert_eq!(writer.blocks_left.get(), 0);
    }

    #[test]
    fn out_of_order_block_forces_a_seek() {
        let mut writer = make_writer(2, 8);
        writer.accept_block(2, &[5, 6, 7, 8]).unwrap();
        writer.accept_block(1, &[1, 2, 3, 4]).unwrap();
        assert_eq!(writer.file.get_ref(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn run_stops_at_sentinel() {
        let (producer, consumer) = ringbuf::channel(4);
        producer
            .send(Slot {
                block_index: 1,
                block_type: BlockType::Original,
                payload: vec![1, 2, 3, 4],
            })
            .unwrap();
        producer.send(Slot::sentinel()).unwrap();

        let writer = make_writer(1, 4);
        writer.run(&consumer).unwrap();
    }
}
