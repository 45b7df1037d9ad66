//! # Overview
//!
//! `receiver` is the client-side network loop: it classifies each arriving
//! UDP datagram, detects forward gaps in the block sequence, admits
//! payloads into the [`ringbuf`] queue the disk writer drains, and emits
//! `RETRANSMIT`/`RESTART`/`ERROR_RATE` control records back to the sender.
//!
//! # Design
//!
//! [`ReceiverLoop::step`] performs one iteration at a time, the same
//! pattern the sender's loop uses, so the network-thread behavior can be
//! driven and asserted on directly in tests without real sockets or
//! blocking. [`RetransmitTable`] holds the outstanding gaps and implements
//! the three retransmit-emission modes: overload escalation, normal
//! compaction, and fire-and-forget reset.

mod loop_;
mod retransmit_table;

pub use loop_::{
    ControlSink, DatagramSource, ReceiverError, ReceiverLoop, StepOutcome,
    DEFAULT_MAX_RETRANSMISSION_BUFFER, DEFAULT_UPDATE_PERIOD, MAINTENANCE_INTERVAL_ITERATIONS,
};
pub use retransmit_table::RetransmitTable;
