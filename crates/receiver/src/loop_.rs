//! The receiver's network-thread loop: classify each datagram, detect
//! forward gaps, admit payloads into the ring buffer, and drive retransmit
//! request emission.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use diskio::{BlocksLeft, ReceivedBitmap};
use wire::{BlockType, ControlRecord, DatagramHeader};

use crate::retransmit_table::RetransmitTable;

/// Run a maintenance pass every this many accepted datagrams, subject to
/// the `update_period` wall-clock gate.
pub const MAINTENANCE_INTERVAL_ITERATIONS: u64 = 50;

/// Default wall-clock gate on maintenance passes.
pub const DEFAULT_UPDATE_PERIOD: Duration = Duration::from_millis(500);

/// Default burst cap on the retransmit table before overload escalation
/// abandons backlog and restarts the sender's stream.
pub const DEFAULT_MAX_RETRANSMISSION_BUFFER: usize = 1_000;

/// Errors raised while running the receiver loop.
#[derive(Debug, thiserror::Error)]
pub enum ReceiverError {
    /// Writing a control record to the sender failed. The control channel
    /// is TCP; any I/O error here is fatal to the transfer.
    #[error("control channel send failed: {0}")]
    Control(#[from] io::Error),
    /// The ring buffer's consumer (the disk writer) has gone away.
    #[error("ring buffer closed: {0}")]
    RingBuffer(#[from] ringbuf::SendError),
}

/// Receives one UDP datagram into `buf`, returning the number of bytes
/// written. A transient error is logged and retried by the caller rather
/// than treated as fatal.
pub trait DatagramSource {
    /// Blocks until a datagram arrives, or returns an error.
    fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Sends a control record to the sender over the TCP control channel.
pub trait ControlSink {
    /// Writes `record` to the sender.
    fn send_control(&mut self, record: &ControlRecord) -> io::Result<()>;
}

/// Result of one [`ReceiverLoop::step`] call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StepOutcome {
    /// A datagram was processed (or a transient error logged); keep
    /// stepping.
    Continue,
    /// The transfer finished and the shutdown sentinel was enqueued.
    Completed,
}

/// Drives the client-side receive loop one step at a time.
///
/// # Design
///
/// Gap detection always records a missing run into the
/// [`RetransmitTable`], even when `no_retransmit` is set. This keeps the
/// table a faithful record of "not yet seen" regardless of mode, so
/// fire-and-forget emission — which must still reset the cursor past a
/// backlog the sender will never resend — has a well-defined `table[0]`
/// to resume at, the same way overload escalation does. The emission step
/// is what skips sending `RETRANSMIT` records in that case, not the
/// bookkeeping.
pub struct ReceiverLoop<D, C> {
    datagram_source: D,
    control_sink: C,
    producer: ringbuf::Producer,
    received: Arc<ReceivedBitmap>,
    blocks_left: Arc<BlocksLeft>,
    stats: stats::IntervalStats,
    retransmit_table: RetransmitTable,
    block_size: u32,
    block_count: u32,
    no_retransmit: bool,
    max_retransmission_buffer: usize,
    update_period: Duration,
    next_block: u32,
    blocks_since_tick: u64,
    retransmits_since_tick: u64,
    iterations: u64,
    last_maintenance: Instant,
    completed: bool,
}

impl<D: DatagramSource, C: ControlSink> ReceiverLoop<D, C> {
    /// Creates a receiver loop starting at block 1.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        datagram_source: D,
        control_sink: C,
        producer: ringbuf::Producer,
        received: Arc<ReceivedBitmap>,
        blocks_left: Arc<BlocksLeft>,
        block_size: u32,
        block_count: u32,
        no_retransmit: bool,
        history_weight: u32,
    ) -> Self {
        Self {
            datagram_source,
            control_sink,
            producer,
            received,
            blocks_left,
            stats: stats::IntervalStats::new(history_weight),
            retransmit_table: RetransmitTable::new(),
            block_size,
            block_count,
            no_retransmit,
            max_retransmission_buffer: DEFAULT_MAX_RETRANSMISSION_BUFFER,
            update_period: DEFAULT_UPDATE_PERIOD,
            next_block: 1,
            blocks_since_tick: 0,
            retransmits_since_tick: 0,
            iterations: 0,
            last_maintenance: Instant::now(),
            completed: false,
        }
    }

    /// Overrides the overload-escalation burst cap (default
    /// [`DEFAULT_MAX_RETRANSMISSION_BUFFER`]).
    #[must_use]
    pub const fn with_max_retransmission_buffer(mut self, max: usize) -> Self {
        self.max_retransmission_buffer = max;
        self
    }

    /// Overrides the maintenance wall-clock gate (default
    /// [`DEFAULT_UPDATE_PERIOD`]).
    #[must_use]
    pub const fn with_update_period(mut self, period: Duration) -> Self {
        self.update_period = period;
        self
    }

    /// The next block index the receiver has not yet seen in order.
    #[must_use]
    pub const fn next_block(&self) -> u32 {
        self.next_block
    }

    /// Whether the shutdown sentinel has already been enqueued.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        self.completed
    }

    /// The running interval-statistics tracker, for reading final totals
    /// once the transfer completes.
    #[must_use]
    pub fn stats(&self) -> &stats::IntervalStats {
        &self.stats
    }

    fn admit_block(
        &mut self,
        block_index: u32,
        block_type: BlockType,
        payload: &[u8],
    ) -> Result<(), ReceiverError> {
        if block_index == 0 || self.received.is_set(block_index) {
            return Ok(());
        }
        self.producer.send(ringbuf::Slot {
            block_index,
            block_type,
            payload: payload.to_vec(),
        })?;
        Ok(())
    }

    fn complete(&mut self) -> Result<(), ReceiverError> {
        if !self.completed {
            self.control_sink.send_control(&ControlRecord::stop())?;
            self.producer.send(ringbuf::Slot::sentinel())?;
            self.completed = true;
        }
        Ok(())
    }

    fn emit_retransmits(&mut self) -> Result<(), ReceiverError> {
        if let Some(target) = self
            .retransmit_table
            .overload_restart_target(self.max_retransmission_buffer)
        {
            self.control_sink.send_control(&ControlRecord::restart(target))?;
            self.next_block = target;
            logging::trace_debug!(target, "overload escalation: restarting stream");
            return Ok(());
        }

        let pending = self.retransmit_table.drain_for_emission(&self.received);

        if self.no_retransmit {
            for block in &pending {
                self.control_sink.send_control(&ControlRecord::retransmit(*block))?;
            }
            if let Some(&resume_at) = pending.first() {
                self.next_block = resume_at;
            }
            self.retransmit_table.clear();
            return Ok(());
        }

        for block in pending {
            self.control_sink.send_control(&ControlRecord::retransmit(block))?;
        }
        Ok(())
    }

    fn finish_or_continue(&mut self) -> Result<(), ReceiverError> {
        if self.blocks_left.is_done() || self.no_retransmit {
            self.complete()
        } else {
            self.emit_retransmits()
        }
    }

    fn maintenance_due(&self) -> bool {
        self.iterations % MAINTENANCE_INTERVAL_ITERATIONS == 0
            && (self.last_maintenance.elapsed() > self.update_period || self.stats.total_blocks() == 0)
    }

    fn run_maintenance(&mut self) -> Result<(), ReceiverError> {
        self.emit_retransmits()?;
        let snapshot = self
            .stats
            .tick(self.blocks_since_tick, self.block_size, self.retransmits_since_tick);
        self.blocks_since_tick = 0;
        self.retransmits_since_tick = 0;
        self.last_maintenance = Instant::now();
        if !self.no_retransmit {
            self.control_sink
                .send_control(&ControlRecord::error_rate(snapshot.error_rate))?;
        }
        Ok(())
    }

    fn handle_datagram(&mut self, datagram: &[u8]) -> Result<(), ReceiverError> {
        let header = match DatagramHeader::decode(datagram) {
            Ok(header) => header,
            Err(source) => {
                logging::trace_warn!(%source, "dropped malformed datagram");
                return Ok(());
            }
        };
        let payload = &datagram[DatagramHeader::WIRE_LEN..];
        let this_block = header.block_index;

        if header.block_type != BlockType::Terminate {
            self.admit_block(this_block, header.block_type, payload)?;
        }

        match header.block_type {
            BlockType::Original => {
                if this_block > self.next_block {
                    for missing in self.next_block..this_block {
                        self.retransmit_table.push(missing);
                    }
                }
                self.next_block = this_block + 1;
                self.blocks_since_tick += 1;
            }
            BlockType::Retransmit => {
                self.blocks_since_tick += 1;
                self.retransmits_since_tick += 1;
            }
            BlockType::Terminate => {}
        }

        let is_terminal = header.block_type == BlockType::Terminate || this_block >= self.block_count;
        if is_terminal {
            self.finish_or_continue()?;
        }

        Ok(())
    }

    /// Executes one loop iteration: receives (or times out on) one
    /// datagram, classifies it, and runs periodic maintenance if due.
    pub fn step(&mut self) -> Result<StepOutcome, ReceiverError> {
        self.iterations += 1;

        let mut buf = vec![0u8; DatagramHeader::WIRE_LEN + self.block_size as usize];
        match self.datagram_source.recv_datagram(&mut buf) {
            Ok(n) => self.handle_datagram(&buf[..n])?,
            Err(source) => {
                logging::trace_debug!(%source, "datagram receive idle or transient error");
                self.emit_retransmits()?;
            }
        }

        // The disk writer decrements `blocks_left` off-thread once a block
        // actually lands on disk, so completion can become true between
        // datagrams (e.g. a retransmitted block was the last one missing).
        // Re-checking here, not only on a terminal datagram, is what lets a
        // periodic socket-read timeout (see `DatagramSource` impls) notice
        // it instead of blocking forever on the next `recv_datagram`.
        if !self.completed && self.blocks_left.is_done() {
            self.complete()?;
        }

        if self.maintenance_due() {
            self.run_maintenance()?;
        }

        if self.completed {
            Ok(StepOutcome::Completed)
        } else {
            Ok(StepOutcome::Continue)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use wire::RequestType;

    struct FakeDatagrams {
        queue: VecDeque<Vec<u8>>,
    }

    impl DatagramSource for FakeDatagrams {
        fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.queue.pop_front() {
                Some(datagram) => {
                    buf[..datagram.len()].copy_from_slice(&datagram);
                    Ok(datagram.len())
                }
                None => Err(io::Error::new(io::ErrorKind::WouldBlock, "no datagram queued")),
            }
        }
    }

    #[derive(Default)]
    struct FakeControlSink {
        sent: Vec<ControlRecord>,
    }

    impl ControlSink for FakeControlSink {
        fn send_control(&mut self, record: &ControlRecord) -> io::Result<()> {
            self.sent.push(*record);
            Ok(())
        }
    }

    fn datagram(block_index: u32, block_type: BlockType, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; DatagramHeader::WIRE_LEN + payload.len()];
        DatagramHeader {
            block_index,
            block_type,
        }
        .encode(&mut buf)
        .unwrap();
        buf[DatagramHeader::WIRE_LEN..].copy_from_slice(payload);
        buf
    }

    fn make_loop(
        block_count: u32,
        no_retransmit: bool,
        datagrams: Vec<Vec<u8>>,
    ) -> (ReceiverLoop<FakeDatagrams, FakeControlSink>, ringbuf::Consumer) {
        let (producer, consumer) = ringbuf::channel(64);
        let received = Arc::new(ReceivedBitmap::new(block_count));
        let blocks_left = Arc::new(BlocksLeft::new(block_count));
        let receiver = ReceiverLoop::new(
            FakeDatagrams {
                queue: datagrams.into(),
            },
            FakeControlSink::default(),
            producer,
            received,
            blocks_left,
            4,
            block_count,
            no_retransmit,
            50,
        );
        (receiver, consumer)
    }

    #[test]
    fn in_order_transfer_admits_every_block_and_completes() {
        let (mut receiver, consumer) = make_loop(
            2,
            false,
            vec![
                datagram(1, BlockType::Original, &[1, 2, 3, 4]),
                datagram(2, BlockType::Original, &[5, 6, 7, 8]),
            ],
        );
        receiver.blocks_left.decrement();
        receiver.blocks_left.decrement();

        assert_eq!(receiver.step().unwrap(), StepOutcome::Continue);
        assert_eq!(receiver.step().unwrap(), StepOutcome::Completed);
        assert!(receiver.is_completed());

        assert_eq!(consumer.recv().unwrap().block_index, 1);
        assert_eq!(consumer.recv().unwrap().block_index, 2);
        assert!(consumer.recv().unwrap().is_sentinel());
        assert!(receiver
            .control_sink
            .sent
            .iter()
            .any(|r| r.request_type == RequestType::Stop));
    }

    #[test]
    fn completion_is_noticed_without_a_terminal_datagram() {
        // The disk writer decrements `blocks_left` off-thread; a socket read
        // timeout (modeled here as a transient receive error with nothing
        // queued) must be enough to notice completion on its own, without
        // waiting for another datagram to arrive.
        let (mut receiver, consumer) = make_loop(1, false, vec![]);
        receiver.blocks_left.decrement();

        assert_eq!(receiver.step().unwrap(), StepOutcome::Completed);
        assert!(receiver.is_completed());
        assert!(consumer.recv().unwrap().is_sentinel());
        assert!(receiver
            .control_sink
            .sent
            .iter()
            .any(|r| r.request_type == RequestType::Stop));
    }

    #[test]
    fn forward_gap_enqueues_missing_blocks_for_retransmission() {
        let (mut receiver, _consumer) =
            make_loop(5, false, vec![datagram(3, BlockType::Original, &[0; 4])]);
        receiver.step().unwrap();
        assert_eq!(receiver.retransmit_table.len(), 2);
        assert_eq!(receiver.next_block(), 4);
    }

    #[test]
    fn duplicate_block_is_not_readmitted() {
        let (mut receiver, consumer) = make_loop(
            1,
            false,
            vec![
                datagram(1, BlockType::Original, &[1, 2, 3, 4]),
                datagram(1, BlockType::Original, &[9, 9, 9, 9]),
            ],
        );
        receiver.received.set(1);
        receiver.step().unwrap();
        receiver.step().unwrap();
        assert!(consumer.is_empty());
    }

    #[test]
    fn terminal_with_outstanding_blocks_emits_retransmits_instead_of_completing() {
        let (mut receiver, _consumer) = make_loop(
            5,
            false,
            vec![datagram(5, BlockType::Terminate, &[0; 4])],
        );
        receiver.step().unwrap();
        assert!(!receiver.is_completed());
        assert!(receiver
            .control_sink
            .sent
            .iter()
            .any(|r| r.request_type == RequestType::Retransmit));
    }

    #[test]
    fn terminal_with_no_retransmit_completes_immediately_despite_gaps() {
        let (mut receiver, consumer) = make_loop(
            5,
            true,
            vec![datagram(5, BlockType::Terminate, &[0; 4])],
        );
        receiver.step().unwrap();
        assert!(receiver.is_completed());
        assert!(consumer.recv().unwrap().is_sentinel());
    }

    #[test]
    fn overload_escalation_sends_a_single_restart_and_clears_the_table() {
        let (mut receiver, _consumer) = make_loop(2_000, false, vec![]);
        for i in 1..=1_001u32 {
            receiver.retransmit_table.push(i);
        }
        receiver.emit_retransmits().unwrap();
        assert_eq!(receiver.control_sink.sent.len(), 1);
        assert_eq!(receiver.control_sink.sent[0].request_type, RequestType::Restart);
        assert_eq!(receiver.control_sink.sent[0].block, 1);
        assert_eq!(receiver.next_block(), 1);
        assert!(receiver.retransmit_table.is_empty());
    }

    #[test]
    fn fire_and_forget_emits_once_then_resets_cursor_to_the_oldest_gap() {
        let (mut receiver, _consumer) = make_loop(100, true, vec![]);
        receiver.retransmit_table.push(10);
        receiver.retransmit_table.push(11);
        receiver.emit_retransmits().unwrap();
        assert_eq!(receiver.control_sink.sent.len(), 2);
        assert_eq!(receiver.next_block(), 10);
        assert!(receiver.retransmit_table.is_empty());
    }

    #[test]
    fn transient_receive_error_does_not_abort_the_loop() {
        let (mut receiver, _consumer) = make_loop(5, false, vec![]);
        assert_eq!(receiver.step().unwrap(), StepOutcome::Continue);
    }
}
