//! # Overview
//!
//! `sender` is the server-side main loop: iterating original blocks,
//! interleaving immediate retransmits, and reacting to `ERROR_RATE`,
//! `RESTART`, and `STOP` control records drained between paced sends.
//!
//! # Design
//!
//! [`SenderLoop::step`] performs one loop iteration rather than blocking
//! forever, so a caller (and this crate's own tests) drives the loop
//! explicitly and can assert on intermediate state. Block storage and
//! datagram transmission are abstracted behind [`BlockSource`] and
//! [`DatagramSink`] so the loop can be exercised against in-memory
//! fixtures; [`ControlSource`] abstracts non-blocking control-record
//! draining the same way.
//!
//! A `RESTART k` seen mid-drain discards any `RETRANSMIT` records
//! processed later in the same batch whose index is less than `k` —
//! [`SenderLoop::step`] tracks this with a per-batch "restart floor".

use std::io;

use pacer::IpdParams;
use wire::{BlockType, ControlRecord, DatagramHeader, RequestType};

/// Errors raised while running the sender loop.
#[derive(Debug, thiserror::Error)]
pub enum SenderError {
    /// Reading the requested block from storage failed.
    #[error("failed to read block {block_index}: {source}")]
    BlockRead {
        /// The block that failed to read.
        block_index: u32,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Sending a datagram failed.
    #[error("failed to send datagram for block {block_index}: {source}")]
    Send {
        /// The block whose datagram failed to send.
        block_index: u32,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Draining a control record failed.
    #[error("failed to read control record: {0}")]
    Control(#[source] io::Error),
}

/// Supplies block payloads by 1-based index.
pub trait BlockSource {
    /// Reads the block at `block_index` into `buf`, returning the number of
    /// useful bytes (`block_size` for all but a short final block).
    fn read_block(&mut self, block_index: u32, buf: &mut [u8]) -> io::Result<usize>;
}

/// Transmits an encoded datagram.
pub trait DatagramSink {
    /// Sends `datagram` (header plus payload) as a single UDP datagram.
    fn send_datagram(&mut self, datagram: &[u8]) -> io::Result<()>;
}

/// Non-blockingly drains pending control-channel records.
pub trait ControlSource {
    /// Returns the next pending record, or `Ok(None)` if none are queued.
    fn try_recv(&mut self) -> io::Result<Option<ControlRecord>>;
}

/// Result of one [`SenderLoop::step`] call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StepOutcome {
    /// An original block (or an immediate retransmit) was sent; keep stepping.
    Continue,
    /// All original blocks and the closing `TERMINATE` have been sent;
    /// keep stepping to continue servicing retransmits until `STOP`.
    AllOriginalsSent,
    /// A `STOP` record was received; the loop is done.
    Stopped,
}

/// Drives the server-side send loop one step at a time.
pub struct SenderLoop<B, S, C> {
    block_source: B,
    sink: S,
    control: C,
    block_size: u32,
    block_count: u32,
    no_retransmit: bool,
    ipd_params: IpdParams,
    ipd_current: u32,
    cursor: u32,
    terminate_sent: bool,
}

impl<B: BlockSource, S: DatagramSink, C: ControlSource> SenderLoop<B, S, C> {
    /// Creates a sender loop starting at block 1 with `ipd_current`
    /// initialized to `3 * ipd_time`.
    #[must_use]
    pub fn new(
        block_source: B,
        sink: S,
        control: C,
        block_size: u32,
        block_count: u32,
        no_retransmit: bool,
        ipd_params: IpdParams,
    ) -> Self {
        Self {
            block_source,
            sink,
            control,
            block_size,
            block_count,
            no_retransmit,
            ipd_current: ipd_params.initial_ipd_current(),
            ipd_params,
            cursor: 1,
            terminate_sent: false,
        }
    }

    /// Current inter-packet delay in microseconds.
    #[must_use]
    pub const fn ipd_current(&self) -> u32 {
        self.ipd_current
    }

    /// Current forward-progress block cursor.
    #[must_use]
    pub const fn cursor(&self) -> u32 {
        self.cursor
    }

    fn send_block(&mut self, block_index: u32, block_type: BlockType) -> Result<(), SenderError> {
        let mut buf = vec![0u8; DatagramHeader::WIRE_LEN + self.block_size as usize];
        let useful = self
            .block_source
            .read_block(block_index, &mut buf[DatagramHeader::WIRE_LEN..])
            .map_err(|source| SenderError::BlockRead { block_index, source })?;
        let _ = useful;

        let header = DatagramHeader {
            block_index,
            block_type,
        };
        header
            .encode(&mut buf)
            .expect("buffer sized for DatagramHeader::WIRE_LEN");

        self.sink
            .send_datagram(&buf)
            .map_err(|source| SenderError::Send { block_index, source })
    }

    fn apply_error_rate(&mut self, error_rate: u32) {
        self.ipd_current = self.ipd_params.apply_error_rate(self.ipd_current, error_rate);
        logging::trace_debug!(error_rate, ipd_current = self.ipd_current, "updated IPD");
    }

    /// Drains every currently pending control record, applying `RESTART`,
    /// `ERROR_RATE`, and immediate `RETRANSMIT` sends; returns `Ok(true)`
    /// if a `STOP` record was seen.
    fn drain_control(&mut self) -> Result<bool, SenderError> {
        let mut restart_floor: Option<u32> = None;

        while let Some(record) = self.control.try_recv().map_err(SenderError::Control)? {
            match record.request_type {
                RequestType::Stop => return Ok(true),
                RequestType::ErrorRate => self.apply_error_rate(record.error_rate),
                RequestType::Restart => {
                    let k = record.block;
                    if k == 0 || k > self.block_count {
                        logging::trace_warn!(block = k, "ignoring out-of-range RESTART");
                        continue;
                    }
                    self.cursor = k;
                    self.terminate_sent = false;
                    restart_floor = Some(k);
                }
                RequestType::Retransmit => {
                    if self.no_retransmit {
                        continue;
                    }
                    if let Some(floor) = restart_floor {
                        if record.block < floor {
                            continue;
                        }
                    }
                    self.send_block(record.block, BlockType::Retransmit)?;
                }
            }
        }

        Ok(false)
    }

    /// Executes one loop iteration: drains pending control records, then
    /// either sends the next original block or the closing `TERMINATE`
    /// datagram. Once both are done, it keeps re-sending `TERMINATE`
    /// (paced, same as an original block) every step — the receiver's
    /// blocking datagram read has nothing else to wake it once the writer
    /// thread has fallen behind the network thread, so the data channel
    /// must stay live until `STOP` actually arrives.
    pub fn step(&mut self) -> Result<StepOutcome, SenderError> {
        if self.drain_control()? {
            return Ok(StepOutcome::Stopped);
        }

        if self.cursor <= self.block_count {
            let block_index = self.cursor;
            self.send_block(block_index, BlockType::Original)?;
            pacer::precise_sleep(std::time::Duration::from_micros(u64::from(self.ipd_current)));
            self.cursor += 1;
            return Ok(StepOutcome::Continue);
        }

        self.send_block(self.block_count, BlockType::Terminate)?;
        pacer::precise_sleep(std::time::Duration::from_micros(u64::from(self.ipd_current)));
        let outcome = if self.terminate_sent {
            StepOutcome::AllOriginalsSent
        } else {
            self.terminate_sent = true;
            StepOutcome::Continue
        };
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct FakeBlocks {
        block_size: u32,
    }

    impl BlockSource for FakeBlocks {
        fn read_block(&mut self, block_index: u32, buf: &mut [u8]) -> io::Result<usize> {
            buf.fill(block_index as u8);
            Ok(self.block_size as usize)
        }
    }

    #[derive(Default)]
    struct FakeSink {
        sent: Vec<Vec<u8>>,
    }

    impl DatagramSink for FakeSink {
        fn send_datagram(&mut self, datagram: &[u8]) -> io::Result<()> {
            self.sent.push(datagram.to_vec());
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeControl {
        queue: VecDeque<ControlRecord>,
    }

    impl ControlSource for FakeControl {
        fn try_recv(&mut self) -> io::Result<Option<ControlRecord>> {
            Ok(self.queue.pop_front())
        }
    }

    fn ipd_params() -> IpdParams {
        IpdParams {
            ipd_time: 100,
            error_rate_threshold: 2_000,
            slower_num: 25,
            slower_den: 24,
            faster_num: 5,
            faster_den: 6,
        }
    }

    fn make_loop(block_count: u32) -> SenderLoop<FakeBlocks, FakeSink, FakeControl> {
        SenderLoop::new(
            FakeBlocks { block_size: 4 },
            FakeSink::default(),
            FakeControl::default(),
            4,
            block_count,
            false,
            ipd_params(),
        )
    }

    #[test]
    fn steps_through_all_original_blocks_then_keeps_repeating_terminate() {
        let mut sender = make_loop(2);
        assert_eq!(sender.step().unwrap(), StepOutcome::Continue);
        assert_eq!(sender.step().unwrap(), StepOutcome::Continue);
        assert_eq!(sender.step().unwrap(), StepOutcome::Continue); // first TERMINATE
        assert_eq!(sender.step().unwrap(), StepOutcome::AllOriginalsSent); // repeated TERMINATE
        assert_eq!(sender.step().unwrap(), StepOutcome::AllOriginalsSent); // still repeating
        assert_eq!(sender.sink.sent.len(), 5);
        for sent in &sender.sink.sent[2..] {
            assert_eq!(sent[4..6], 3u16.to_be_bytes()); // TERMINATE tag
        }
    }

    #[test]
    fn stop_record_halts_the_loop() {
        let mut sender = make_loop(5);
        sender
            .control
            .queue
            .push_back(ControlRecord::stop());
        assert_eq!(sender.step().unwrap(), StepOutcome::Stopped);
        assert!(sender.sink.sent.is_empty());
    }

    #[test]
    fn error_rate_above_threshold_increases_ipd() {
        let mut sender = make_loop(5);
        let before = sender.ipd_current();
        sender.control.queue.push_back(ControlRecord::error_rate(50_000));
        sender.step().unwrap();
        assert!(sender.ipd_current() > before);
    }

    #[test]
    fn restart_resets_cursor_and_discards_earlier_indexed_retransmits_after_it() {
        let mut sender = make_loop(10);
        sender.control.queue.push_back(ControlRecord::restart(5));
        sender.control.queue.push_back(ControlRecord::retransmit(2));
        sender.control.queue.push_back(ControlRecord::retransmit(6));
        sender.step().unwrap();
        assert_eq!(sender.cursor(), 5);
        // Only block 6's retransmit (>= restart floor 5) should have been sent.
        assert_eq!(sender.sink.sent.len(), 2); // retransmit(6) + original block 5
        assert_eq!(sender.sink.sent[0][0..4], 6u32.to_be_bytes());
    }

    #[test]
    fn out_of_range_restart_is_logged_and_skipped() {
        let mut sender = make_loop(3);
        sender.control.queue.push_back(ControlRecord::restart(99));
        // The cursor is unaffected and the loop keeps making forward progress
        // instead of aborting the transfer.
        assert_eq!(sender.step().unwrap(), StepOutcome::Continue);
        assert_eq!(sender.cursor(), 2);
        assert_eq!(sender.sink.sent.len(), 1);
    }

    #[test]
    fn no_retransmit_discards_retransmit_requests() {
        let mut sender = SenderLoop::new(
            FakeBlocks { block_size: 4 },
            FakeSink::default(),
            FakeControl::default(),
            4,
            5,
            true,
            ipd_params(),
        );
        sender.control.queue.push_back(ControlRecord::retransmit(2));
        sender.step().unwrap();
        // Only the original block 1 send, no retransmit.
        assert_eq!(sender.sink.sent.len(), 1);
        assert_eq!(sender.sink.sent[0][0..4], 1u32.to_be_bytes());
    }
}
