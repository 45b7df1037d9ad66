//! # Overview
//!
//! `pacer` owns the sender's two rate-control responsibilities: computing
//! the inter-packet delay (`ipd_current`) from receiver-reported error
//! rates, and sleeping that delay with sub-millisecond accuracy between
//! paced sends.
//!
//! # Design
//!
//! [`ipd::IpdParams::apply_error_rate`] implements the slowdown/speedup
//! update rule; [`sleep::precise_sleep`] implements the real-sleep-then-
//! busy-wait pacing primitive. The two are independent: a sender loop calls
//! `apply_error_rate` once per `ERROR_RATE` control record and
//! `precise_sleep` once per block sent.

mod ipd;
mod sleep;

#[cfg(any(test, feature = "test-support"))]
mod test_support;

pub use ipd::{IpdParams, IPD_CEILING_MICROS};
pub use sleep::{precise_sleep, REAL_SLEEP_MARGIN};

#[cfg(feature = "test-support")]
pub use test_support::{recorded_sleep_session, RecordedSleepSession};
