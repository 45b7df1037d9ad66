//! # Overview
//!
//! `stats` tracks per-interval transfer statistics on both peers: a
//! throughput estimate smoothed with an exponentially weighted moving
//! average (EWMA), and (on the receiver) the retransmit-rate figure fed
//! back to the sender's pacer via `ERROR_RATE` control records. It also
//! renders the final human-readable transfer summary.
//!
//! # Design
//!
//! Each maintenance tick calls [`IntervalStats::tick`] with the bytes moved
//! and retransmits observed since the previous tick; it returns the
//! instantaneous and smoothed throughput plus the parts-per-100000 error
//! rate to report upstream. History weight `H` controls how much inertia
//! the smoothed rate carries, matching the protocol's `history` parameter.

use std::time::{Duration, Instant};

/// One maintenance-interval snapshot: instantaneous and smoothed throughput,
/// plus the error rate to report on the control channel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IntervalSnapshot {
    /// Bits/second observed strictly within the most recent interval.
    pub instantaneous_bits_per_sec: f64,
    /// EWMA-smoothed bits/second.
    pub smoothed_bits_per_sec: f64,
    /// Parts-per-100000 retransmit rate for this interval.
    pub error_rate: u32,
}

/// Running interval statistics for one side of a transfer.
#[derive(Debug)]
pub struct IntervalStats {
    history_weight: f64,
    smoothed_bits_per_sec: f64,
    total_blocks: u64,
    total_retransmits: u64,
    start: Instant,
    last_tick: Instant,
}

impl IntervalStats {
    /// Creates a fresh stats tracker with the given EWMA history weight
    /// `history_weight` (clamped to `[0, 100]`, matching the protocol's
    /// `H ∈ [0,100]` history parameter).
    #[must_use]
    pub fn new(history_weight: u32) -> Self {
        let now = Instant::now();
        Self {
            history_weight: f64::from(history_weight.min(100)),
            smoothed_bits_per_sec: 0.0,
            total_blocks: 0,
            total_retransmits: 0,
            start: now,
            last_tick: now,
        }
    }

    /// Records one maintenance interval: `blocks` useful blocks and
    /// `retransmits` retransmitted blocks moved since the previous tick.
    /// Returns the resulting snapshot.
    pub fn tick(&mut self, blocks: u64, block_size: u32, retransmits: u64) -> IntervalSnapshot {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
        self.total_blocks += blocks;
        self.total_retransmits += retransmits;

        let bytes = blocks * u64::from(block_size);
        let elapsed_secs = elapsed.as_secs_f64().max(f64::EPSILON);
        let instantaneous_bits_per_sec = (bytes as f64 * 8.0) / elapsed_secs;

        self.smoothed_bits_per_sec = (self.history_weight * self.smoothed_bits_per_sec
            + (100.0 - self.history_weight) * instantaneous_bits_per_sec)
            / 100.0;

        let denominator = blocks.max(1);
        let error_rate = ((retransmits * 100_000) / denominator).min(100_000) as u32;

        IntervalSnapshot {
            instantaneous_bits_per_sec,
            smoothed_bits_per_sec: self.smoothed_bits_per_sec,
            error_rate,
        }
    }

    /// Total time elapsed since the tracker was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Total useful blocks observed across all intervals.
    #[must_use]
    pub const fn total_blocks(&self) -> u64 {
        self.total_blocks
    }

    /// Total retransmitted blocks observed across all intervals.
    #[must_use]
    pub const fn total_retransmits(&self) -> u64 {
        self.total_retransmits
    }
}

/// Final transfer outcome, rendered as a one-line human-readable summary.
#[derive(Clone, Debug, PartialEq)]
pub enum TransferReport {
    /// The transfer completed; carries the figures to report.
    Completed {
        /// Total bytes written to disk.
        bytes: u64,
        /// Wall-clock duration of the transfer.
        duration: Duration,
        /// Count of blocks retransmitted at least once.
        retransmitted_blocks: u64,
    },
    /// The transfer was aborted before completion.
    Aborted {
        /// Human-readable reason for the abort.
        reason: String,
    },
}

impl std::fmt::Display for TransferReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed {
                bytes,
                duration,
                retransmitted_blocks,
            } => {
                let secs = duration.as_secs_f64().max(f64::EPSILON);
                let mbps = (*bytes as f64 * 8.0) / secs / 1_000_000.0;
                write!(
                    f,
                    "transfer complete: {bytes} bytes in {secs:.2}s ({mbps:.2} Mbps, {retransmitted_blocks} blocks retransmitted)"
                )
            }
            Self::Aborted { reason } => write!(f, "transfer not successful: {reason}"),
        }
    }
}
