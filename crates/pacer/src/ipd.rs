//! Inter-packet delay computation.

/// Inter-packet delay tuning parameters carried from the negotiated transfer
/// parameters (`P` in the data model).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IpdParams {
    /// Floor delay in microseconds: `1_000_000 * 8 * block_size / target_rate`.
    pub ipd_time: u32,
    /// Error-rate threshold, parts-per-100000, above which the sender slows down.
    pub error_rate_threshold: u32,
    /// Slowdown numerator (`> slower_den`).
    pub slower_num: u32,
    /// Slowdown denominator.
    pub slower_den: u32,
    /// Speedup numerator (`< faster_den`).
    pub faster_num: u32,
    /// Speedup denominator.
    pub faster_den: u32,
}

/// Upper bound on the inter-packet delay, in microseconds.
pub const IPD_CEILING_MICROS: u32 = 10_000;

impl IpdParams {
    /// Computes the floor delay `ipd_time` for a given block size and target
    /// bitrate: `1_000_000 * 8 * block_size / target_rate_bits_per_sec`.
    #[must_use]
    pub fn compute_ipd_time(block_size: u32, target_rate_bits_per_sec: u64) -> u32 {
        let numerator = 1_000_000u64 * 8 * u64::from(block_size);
        (numerator / target_rate_bits_per_sec.max(1)) as u32
    }

    /// Returns the initial `ipd_current` value: `3 * ipd_time`.
    #[must_use]
    pub const fn initial_ipd_current(&self) -> u32 {
        self.ipd_time.saturating_mul(3)
    }

    fn clamp(&self, ipd_current: f64) -> u32 {
        let floor = f64::from(self.ipd_time);
        let ceiling = f64::from(IPD_CEILING_MICROS);
        ipd_current.clamp(floor, ceiling) as u32
    }

    /// Applies an `ERROR_RATE` report to the current delay, returning the
    /// updated, clamped `ipd_current`.
    ///
    /// When `observed_error_rate` exceeds the configured threshold the delay
    /// is stretched proportionally to how far over threshold the report is;
    /// otherwise it is scaled down by the speedup factor.
    #[must_use]
    pub fn apply_error_rate(&self, ipd_current: u32, observed_error_rate: u32) -> u32 {
        let current = f64::from(ipd_current);
        let updated = if observed_error_rate > self.error_rate_threshold {
            let slower_ratio = f64::from(self.slower_num) / f64::from(self.slower_den);
            let factor1 = slower_ratio - 1.0;
            let numerator = 1.0 + f64::from(observed_error_rate) - f64::from(self.error_rate_threshold);
            let denominator = 100_000.0 - f64::from(self.error_rate_threshold);
            let factor2 = numerator / denominator;
            current * (1.0 + factor1 * factor2)
        } else {
            current * f64::from(self.faster_num) / f64::from(self.faster_den)
        };
        self.clamp(updated)
    }
}
