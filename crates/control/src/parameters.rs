//! Transfer parameters (`P` in the protocol's data model) and the builder
//! used to assemble them.

use std::io::{self, Read, Write};

/// Fixed protocol revision both peers must agree on during the version
/// exchange.
pub use wire::PROTOCOL_REVISION;

/// Errors raised while validating a [`ParametersBuilder`] setter.
#[derive(Debug, thiserror::Error, Eq, PartialEq)]
pub enum ParametersError {
    /// `block_size` was zero.
    #[error("block_size must be nonzero")]
    ZeroBlockSize,
    /// `target_rate` was zero.
    #[error("target_rate must be nonzero")]
    ZeroTargetRate,
    /// `slower_num` was not strictly greater than `slower_den`.
    #[error("slower factor {0}/{1} must have numerator greater than denominator")]
    InvalidSlowerFactor(u16, u16),
    /// `faster_num` was not strictly less than `faster_den`.
    #[error("faster factor {0}/{1} must have numerator less than denominator")]
    InvalidFasterFactor(u16, u16),
    /// `history` exceeded 100.
    #[error("history weight {0} exceeds 100")]
    InvalidHistory(u32),
}

/// Negotiated and locally-configured transfer parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Parameters {
    block_size: u32,
    target_rate: u32,
    error_rate: u32,
    slower_num: u16,
    slower_den: u16,
    faster_num: u16,
    faster_den: u16,
    history: u32,
    no_retransmit: bool,
}

impl Parameters {
    /// Starts building a [`Parameters`] value from protocol defaults.
    #[must_use]
    pub fn builder() -> ParametersBuilder {
        ParametersBuilder::default()
    }

    /// Block size in bytes (`B`).
    #[must_use]
    pub const fn block_size(&self) -> u32 {
        self.block_size
    }

    /// Target bitrate in bits/second (`R`).
    #[must_use]
    pub const fn target_rate(&self) -> u32 {
        self.target_rate
    }

    /// Error-rate threshold, parts-per-100000 (`E`).
    #[must_use]
    pub const fn error_rate(&self) -> u32 {
        self.error_rate
    }

    /// Slowdown factor numerator/denominator.
    #[must_use]
    pub const fn slower_factor(&self) -> (u16, u16) {
        (self.slower_num, self.slower_den)
    }

    /// Speedup factor numerator/denominator.
    #[must_use]
    pub const fn faster_factor(&self) -> (u16, u16) {
        (self.faster_num, self.faster_den)
    }

    /// EWMA history weight, `0..=100`.
    #[must_use]
    pub const fn history(&self) -> u32 {
        self.history
    }

    /// Whether retransmission requests are suppressed client-side.
    #[must_use]
    pub const fn no_retransmit(&self) -> bool {
        self.no_retransmit
    }

    /// Computes the IPD floor (`ipd_time`) for these parameters.
    #[must_use]
    pub fn ipd_time(&self) -> u32 {
        pacer::IpdParams::compute_ipd_time(self.block_size, u64::from(self.target_rate))
    }

    /// Builds the [`pacer::IpdParams`] these parameters imply.
    #[must_use]
    pub fn ipd_params(&self) -> pacer::IpdParams {
        pacer::IpdParams {
            ipd_time: self.ipd_time(),
            error_rate_threshold: self.error_rate,
            slower_num: u32::from(self.slower_num),
            slower_den: u32::from(self.slower_den),
            faster_num: u32::from(self.faster_num),
            faster_den: u32::from(self.faster_den),
        }
    }

    /// Writes the seven wire-negotiated fields: `block_size, target_rate,
    /// error_rate, slower_num, slower_den, faster_num, faster_den`.
    pub fn write_negotiation(&self, out: &mut impl Write) -> io::Result<()> {
        out.write_all(&self.block_size.to_be_bytes())?;
        out.write_all(&self.target_rate.to_be_bytes())?;
        out.write_all(&self.error_rate.to_be_bytes())?;
        out.write_all(&self.slower_num.to_be_bytes())?;
        out.write_all(&self.slower_den.to_be_bytes())?;
        out.write_all(&self.faster_num.to_be_bytes())?;
        out.write_all(&self.faster_den.to_be_bytes())?;
        Ok(())
    }

    /// Reads the seven wire-negotiated fields into a [`Parameters`] that
    /// inherits `history`/`no_retransmit` from `local`.
    pub fn read_negotiation(input: &mut impl Read, local: &Parameters) -> io::Result<Parameters> {
        let mut buf4 = [0u8; 4];
        let mut buf2 = [0u8; 2];

        input.read_exact(&mut buf4)?;
        let block_size = u32::from_be_bytes(buf4);
        input.read_exact(&mut buf4)?;
        let target_rate = u32::from_be_bytes(buf4);
        input.read_exact(&mut buf4)?;
        let error_rate = u32::from_be_bytes(buf4);
        input.read_exact(&mut buf2)?;
        let slower_num = u16::from_be_bytes(buf2);
        input.read_exact(&mut buf2)?;
        let slower_den = u16::from_be_bytes(buf2);
        input.read_exact(&mut buf2)?;
        let faster_num = u16::from_be_bytes(buf2);
        input.read_exact(&mut buf2)?;
        let faster_den = u16::from_be_bytes(buf2);

        Ok(Parameters {
            block_size,
            target_rate,
            error_rate,
            slower_num,
            slower_den,
            faster_num,
            faster_den,
            history: local.history,
            no_retransmit: local.no_retransmit,
        })
    }
}

/// Builder for [`Parameters`], with bounds validated at each setter call.
#[derive(Clone, Copy, Debug)]
pub struct ParametersBuilder {
    block_size: u32,
    target_rate: u32,
    error_rate: u32,
    slower_num: u16,
    slower_den: u16,
    faster_num: u16,
    faster_den: u16,
    history: u32,
    no_retransmit: bool,
}

impl Default for ParametersBuilder {
    fn default() -> Self {
        Self {
            block_size: 32_768,
            target_rate: 100_000_000,
            error_rate: 2_000,
            slower_num: 25,
            slower_den: 24,
            faster_num: 5,
            faster_den: 6,
            history: 50,
            no_retransmit: false,
        }
    }
}

impl ParametersBuilder {
    /// Sets the block size in bytes.
    pub fn block_size(mut self, block_size: u32) -> Result<Self, ParametersError> {
        if block_size == 0 {
            return Err(ParametersError::ZeroBlockSize);
        }
        self.block_size = block_size;
        Ok(self)
    }

    /// Sets the target bitrate in bits/second.
    pub fn target_rate(mut self, target_rate: u32) -> Result<Self, ParametersError> {
        if target_rate == 0 {
            return Err(ParametersError::ZeroTargetRate);
        }
        self.target_rate = target_rate;
        Ok(self)
    }

    /// Sets the error-rate threshold, parts-per-100000.
    #[must_use]
    pub fn error_rate(mut self, error_rate: u32) -> Self {
        self.error_rate = error_rate;
        self
    }

    /// Sets the slowdown factor; `num` must exceed `den`.
    pub fn slower_factor(mut self, num: u16, den: u16) -> Result<Self, ParametersError> {
        if num <= den {
            return Err(ParametersError::InvalidSlowerFactor(num, den));
        }
        self.slower_num = num;
        self.slower_den = den;
        Ok(self)
    }

    /// Sets the speedup factor; `num` must be less than `den`.
    pub fn faster_factor(mut self, num: u16, den: u16) -> Result<Self, ParametersError> {
        if num >= den {
            return Err(ParametersError::InvalidFasterFactor(num, den));
        }
        self.faster_num = num;
        self.faster_den = den;
        Ok(self)
    }

    /// Sets the EWMA history weight; must be `<= 100`.
    pub fn history(mut self, history: u32) -> Result<Self, ParametersError> {
        if history > 100 {
            return Err(ParametersError::InvalidHistory(history));
        }
        self.history = history;
        Ok(self)
    }

    /// Sets whether retransmission requests are suppressed client-side.
    #[must_use]
    pub fn no_retransmit(mut self, no_retransmit: bool) -> Self {
        self.no_retransmit = no_retransmit;
        self
    }

    /// Finalises the builder. Infallible: every setter already validated
    /// its own bound.
    #[must_use]
    pub fn build(self) -> Parameters {
        Parameters {
            block_size: self.block_size,
            target_rate: self.target_rate,
            error_rate: self.error_rate,
            slower_num: self.slower_num,
            slower_den: self.slower_den,
            faster_num: self.faster_num,
            faster_den: self.faster_den,
            history: self.history,
            no_retransmit: self.no_retransmit,
        }
    }
}

/// File metadata the server reports after accepting a transfer request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileMetadata {
    /// Absolute file length in bytes (`L`).
    pub file_size: u64,
    /// Echoed block size; the client must verify this matches its request.
    pub block_size: u32,
    /// Block count (`N`).
    pub block_count: u32,
    /// Run epoch, seconds since the Unix epoch (`T`).
    pub epoch: u32,
}

impl FileMetadata {
    /// Writes `file_size, block_size, block_count, epoch`, all big-endian.
    pub fn write(&self, out: &mut impl Write) -> io::Result<()> {
        out.write_all(&self.file_size.to_be_bytes())?;
        out.write_all(&self.block_size.to_be_bytes())?;
        out.write_all(&self.block_count.to_be_bytes())?;
        out.write_all(&self.epoch.to_be_bytes())?;
        Ok(())
    }

    /// Reads a [`FileMetadata`] record.
    pub fn read(input: &mut impl Read) -> io::Result<Self> {
        let mut buf8 = [0u8; 8];
        let mut buf4 = [0u8; 4];

        input.read_exact(&mut buf8)?;
        let file_size = u64::from_be_bytes(buf8);
        input.read_exact(&mut buf4)?;
        let block_size = u32::from_be_bytes(buf4);
        input.read_exact(&mut buf4)?;
        let block_count = u32::from_be_bytes(buf4);
        input.read_exact(&mut buf4)?;
        let epoch = u32::from_be_bytes(buf4);

        Ok(Self {
            file_size,
            block_size,
            block_count,
            epoch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_defaults() {
        let params = Parameters::builder().build();
        assert_eq!(params.block_size(), 32_768);
        assert_eq!(params.slower_factor(), (25, 24));
        assert_eq!(params.faster_factor(), (5, 6));
    }

    #[test]
    fn rejects_zero_block_size() {
        let err = Parameters::builder().block_size(0).unwrap_err();
        assert_eq!(err, ParametersError::ZeroBlockSize);
    }

    #[test]
    fn rejects_inverted_slower_factor() {
        let err = Parameters::builder().slower_factor(24, 25).unwrap_err();
        assert_eq!(err, ParametersError::InvalidSlowerFactor(24, 25));
    }

    #[test]
    fn rejects_inverted_faster_factor() {
        let err = Parameters::builder().faster_factor(6, 5).unwrap_err();
        assert_eq!(err, ParametersError::InvalidFasterFactor(6, 5));
    }

    #[test]
    fn rejects_history_above_100() {
        let err = Parameters::builder().history(101).unwrap_err();
        assert_eq!(err, ParametersError::InvalidHistory(101));
    }

    #[test]
    fn negotiation_round_trips_over_a_buffer() {
        let params = Parameters::builder()
            .block_size(16_384)
            .unwrap()
            .target_rate(50_000_000)
            .unwrap()
            .error_rate(1_500)
            .build();

        let mut buf = Vec::new();
        params.write_negotiation(&mut buf).unwrap();

        let local = Parameters::builder().history(10).unwrap().build();
        let mut cursor = buf.as_slice();
        let decoded = Parameters::read_negotiation(&mut cursor, &local).unwrap();

        assert_eq!(decoded.block_size(), 16_384);
        assert_eq!(decoded.target_rate(), 50_000_000);
        assert_eq!(decoded.error_rate(), 1_500);
        assert_eq!(decoded.history(), 10);
    }

    #[test]
    fn file_metadata_round_trips() {
        let metadata = FileMetadata {
            file_size: 123_456_789,
            block_size: 32_768,
            block_count: 3_770,
            epoch: 1_700_000_000,
        };
        let mut buf = Vec::new();
        metadata.write(&mut buf).unwrap();
        let mut cursor = buf.as_slice();
        assert_eq!(FileMetadata::read(&mut cursor).unwrap(), metadata);
    }
}
