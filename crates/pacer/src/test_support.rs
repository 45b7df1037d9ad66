use std::mem;
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::time::Duration;

fn recorded_sleeps() -> &'static Mutex<Vec<Duration>> {
    static RECORDED: OnceLock<Mutex<Vec<Duration>>> = OnceLock::new();
    RECORDED.get_or_init(|| Mutex::new(Vec::new()))
}

fn session_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn lock_recorded() -> MutexGuard<'static, Vec<Duration>> {
    recorded_sleeps().lock().unwrap_or_else(|p| p.into_inner())
}

pub(crate) fn append_recorded_sleep(duration: Duration) {
    lock_recorded().push(duration);
}

/// Guard granting exclusive access to the pacer's recorded sleep durations.
///
/// Tests acquire a session, [`clear`](Self::clear) any leftover state, run
/// the code under test, then inspect the schedule with [`take`](Self::take).
#[cfg_attr(docsrs, doc(cfg(feature = "test-support")))]
pub struct RecordedSleepSession<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl RecordedSleepSession<'_> {
    /// Discards previously recorded sleep durations.
    pub fn clear(&mut self) {
        lock_recorded().clear();
    }

    /// Drains and returns the recorded sleep durations in call order.
    pub fn take(&mut self) -> Vec<Duration> {
        mem::take(&mut *lock_recorded())
    }

    /// Returns `true` when no sleeps have been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock_recorded().is_empty()
    }
}

/// Obtains a guard serializing access to the recorded sleep buffer.
#[cfg_attr(docsrs, doc(cfg(feature = "test-support")))]
#[must_use]
pub fn recorded_sleep_session() -> RecordedSleepSession<'static> {
    RecordedSleepSession {
        _guard: session_lock().lock().unwrap_or_else(|p| p.into_inner()),
    }
}
