//! Thin instrumentation facade shared by every Tsunami Transfer Protocol
//! crate.
//!
//! With the `tracing` feature disabled, [`trace_debug`], [`trace_warn`], and
//! [`trace_error`] compile to no-ops and [`init`] does nothing: logging is
//! additive instrumentation, never load-bearing control flow. With the
//! feature enabled they forward to the `tracing` crate and [`init`] installs
//! an `EnvFilter`-driven subscriber reading `TTP_LOG` (falling back to
//! `info`).

#[cfg(feature = "tracing")]
pub use tracing;

/// Installs a process-wide `tracing` subscriber honoring the `TTP_LOG`
/// environment variable. No-op when the `tracing` feature is disabled.
pub fn init() {
    #[cfg(feature = "tracing")]
    {
        use tracing_subscriber::EnvFilter;

        let filter = EnvFilter::try_from_env("TTP_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();
    }
}

/// Emits a debug-level event when the `tracing` feature is enabled.
#[macro_export]
macro_rules! trace_debug {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        {
            $crate::tracing::debug!($($arg)*);
        }
    };
}

/// Emits an info-level event when the `tracing` feature is enabled.
#[macro_export]
macro_rules! trace_info {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        {
            $crate::tracing::info!($($arg)*);
        }
    };
}

/// Emits a warn-level event when the `tracing` feature is enabled.
#[macro_export]
macro_rules! trace_warn {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        {
            $crate::tracing::warn!($($arg)*);
        }
    };
}

/// Emits an error-level event when the `tracing` feature is enabled.
#[macro_export]
macro_rules! trace_error {
    ($($arg:tt)*) => {
        #[cfg(feature = "tracing")]
        {
            $crate::tracing::error!($($arg)*);
        }
    };
}
