//! Precise monotonic-clock pacing sleep.
//!
//! Sub-millisecond accuracy is required by the protocol's rate pacing.
//! [`precise_sleep`] real-sleeps down to within [`REAL_SLEEP_MARGIN`] of the
//! target and then busy-waits on [`std::time::Instant`] for the remainder,
//! since OS schedulers cannot reliably wake a thread with microsecond
//! accuracy.

use std::time::{Duration, Instant};

#[cfg(any(test, feature = "test-support"))]
use super::test_support::append_recorded_sleep;

/// How close to the deadline real (OS) sleeping is trusted; the remainder is
/// busy-waited on a monotonic clock.
pub const REAL_SLEEP_MARGIN: Duration = Duration::from_millis(10);

/// Sleeps for `duration` with sub-millisecond accuracy, using a monotonic
/// clock for the busy-wait tail.
///
/// Under the `test-support` feature (or in tests), the requested duration is
/// recorded and no real sleeping or busy-waiting occurs, so pacing behavior
/// can be asserted without slowing down the test suite.
pub fn precise_sleep(duration: Duration) {
    #[cfg(any(test, feature = "test-support"))]
    {
        append_recorded_sleep(duration);
        return;
    }

    #[cfg(not(any(test, feature = "test-support")))]
    {
        if duration.is_zero() {
            return;
        }

        let deadline = Instant::now() + duration;

        if duration > REAL_SLEEP_MARGIN {
            std::thread::sleep(duration - REAL_SLEEP_MARGIN);
        }

        while Instant::now() < deadline {
            std::hint::spin_loop();
        }
    }
}
