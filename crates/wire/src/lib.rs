#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! `wire` encodes and decodes the two on-the-wire shapes the Tsunami
//! Transfer Protocol uses: the fixed `6 + block_size` byte UDP datagram
//! and the 12-byte control record exchanged on the TCP control channel.
//! Every multi-byte field is big-endian; this crate is the single place
//! that performs the byte swap so higher layers never touch a raw buffer
//! offset directly.
//!
//! # Design
//!
//! - [`DatagramHeader`] covers the first six bytes of a UDP datagram
//!   (`block_index`, `block_type`); the remaining `block_size` bytes are
//!   payload and are left to the caller's buffer.
//! - [`ControlRecord`] covers the full 12-byte control message used for
//!   every receiver-to-sender request (`RETRANSMIT`, `RESTART`, `STOP`,
//!   `ERROR_RATE`).
//! - [`BlockType`] and [`RequestType`] are the closed sets of 16-bit tags
//!   each shape carries; decoding an unrecognised value is a protocol
//!   error, not a panic.
//!
//! # Invariants
//!
//! - `encode` always produces exactly [`DatagramHeader::WIRE_LEN`] or
//!   [`ControlRecord::WIRE_LEN`] bytes.
//! - `decode` never reads past the supplied slice and rejects slices
//!   shorter than the fixed wire length.
//! - Block index `0` is never produced by [`DatagramHeader::encode`]; it
//!   is reserved as the ring-buffer sentinel and callers that observe it
//!   on the wire should treat it as a protocol violation.

use std::fmt;

/// Fixed protocol revision exchanged during the version handshake.
///
/// Negotiation requires exact equality; revisions are never
/// range-compared.
pub const PROTOCOL_REVISION: u32 = 0x2002_1202;

/// Errors produced while decoding wire-format bytes.
#[derive(Debug, thiserror::Error, Eq, PartialEq)]
pub enum WireError {
    /// The supplied buffer was shorter than the fixed wire length.
    #[error("buffer too short: expected at least {expected} bytes, got {actual}")]
    BufferTooShort {
        /// Minimum length required.
        expected: usize,
        /// Actual length supplied.
        actual: usize,
    },
    /// The `block_type` tag did not match a known [`BlockType`] variant.
    #[error("unknown block type {0:#06x}")]
    UnknownBlockType(u16),
    /// The `request_type` tag did not match a known [`RequestType`] variant.
    #[error("unknown request type {0:#06x}")]
    UnknownRequestType(u16),
}

/// The three datagram kinds that appear on the data channel.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum BlockType {
    /// A block delivered in the sender's normal forward-progress order.
    Original,
    /// A block resent in response to a `RETRANSMIT` control request.
    Retransmit,
    /// Marks the final block of the transfer, prompting receiver shutdown.
    Terminate,
}

impl BlockType {
    const ORIGINAL: u16 = 1;
    const RETRANSMIT: u16 = 2;
    const TERMINATE: u16 = 3;

    /// Returns the 16-bit wire tag for this block type.
    #[must_use]
    pub const fn wire_value(self) -> u16 {
        match self {
            Self::Original => Self::ORIGINAL,
            Self::Retransmit => Self::RETRANSMIT,
            Self::Terminate => Self::TERMINATE,
        }
    }
}

impl TryFrom<u16> for BlockType {
    type Error = WireError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            Self::ORIGINAL => Ok(Self::Original),
            Self::RETRANSMIT => Ok(Self::Retransmit),
            Self::TERMINATE => Ok(Self::Terminate),
            other => Err(WireError::UnknownBlockType(other)),
        }
    }
}

/// The four control-record kinds sent receiver-to-sender.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RequestType {
    /// Request retransmission of a single block.
    Retransmit,
    /// Reset the sender's cursor to a given block and resume forward sends.
    Restart,
    /// Stop the transfer; the sender loop exits.
    Stop,
    /// Report the current measured error rate for IPD adaptation.
    ErrorRate,
}

impl RequestType {
    const RETRANSMIT: u16 = 0;
    const RESTART: u16 = 1;
    const STOP: u16 = 2;
    const ERROR_RATE: u16 = 3;

    /// Returns the 16-bit wire tag for this request type.
    #[must_use]
    pub const fn wire_value(self) -> u16 {
        match self {
            Self::Retransmit => Self::RETRANSMIT,
            Self::Restart => Self::RESTART,
            Self::Stop => Self::STOP,
            Self::ErrorRate => Self::ERROR_RATE,
        }
    }
}

impl TryFrom<u16> for RequestType {
    type Error = WireError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            Self::RETRANSMIT => Ok(Self::Retransmit),
            Self::RESTART => Ok(Self::Restart),
            Self::STOP => Ok(Self::Stop),
            Self::ERROR_RATE => Ok(Self::ErrorRate),
            other => Err(WireError::UnknownRequestType(other)),
        }
    }
}

/// The six-byte header prefixing every UDP datagram.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DatagramHeader {
    /// 1-based block index. `0` never appears on the wire — it is reserved
    /// as the ring-buffer shutdown sentinel.
    pub block_index: u32,
    /// The datagram's classification.
    pub block_type: BlockType,
}

impl DatagramHeader {
    /// Length in bytes of the encoded header (not counting the payload).
    pub const WIRE_LEN: usize = 6;

    /// Encodes the header into the first [`Self::WIRE_LEN`] bytes of `out`.
    pub fn encode(&self, out: &mut [u8]) -> Result<(), WireError> {
        if out.len() < Self::WIRE_LEN {
            return Err(WireError::BufferTooShort {
                expected: Self::WIRE_LEN,
                actual: out.len(),
            });
        }
        out[0..4].copy_from_slice(&self.block_index.to_be_bytes());
        out[4..6].copy_from_slice(&self.block_type.wire_value().to_be_bytes());
        Ok(())
    }

    /// Decodes a header from the first [`Self::WIRE_LEN`] bytes of `buf`.
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < Self::WIRE_LEN {
            return Err(WireError::BufferTooShort {
                expected: Self::WIRE_LEN,
                actual: buf.len(),
            });
        }
        let block_index = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let block_type = BlockType::try_from(u16::from_be_bytes([buf[4], buf[5]]))?;
        Ok(Self {
            block_index,
            block_type,
        })
    }
}

/// The fixed 12-byte control record exchanged receiver-to-sender.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ControlRecord {
    /// The kind of request this record carries.
    pub request_type: RequestType,
    /// Block index for `RETRANSMIT`/`RESTART`; `0` otherwise.
    pub block: u32,
    /// Parts-per-100000 error rate for `ERROR_RATE`; `0` otherwise.
    pub error_rate: u32,
}

impl ControlRecord {
    /// Length in bytes of an encoded control record.
    pub const WIRE_LEN: usize = 12;

    /// Builds a `RETRANSMIT` record for the given block.
    #[must_use]
    pub const fn retransmit(block: u32) -> Self {
        Self {
            request_type: RequestType::Retransmit,
            block,
            error_rate: 0,
        }
    }

    /// Builds a `RESTART` record resetting the sender to `block`.
    #[must_use]
    pub const fn restart(block: u32) -> Self {
        Self {
            request_type: RequestType::Restart,
            block,
            error_rate: 0,
        }
    }

    /// Builds a `STOP` record.
    #[must_use]
    pub const fn stop() -> Self {
        Self {
            request_type: RequestType::Stop,
            block: 0,
            error_rate: 0,
        }
    }

    /// Builds an `ERROR_RATE` record reporting `error_rate` parts-per-100000.
    #[must_use]
    pub const fn error_rate(error_rate: u32) -> Self {
        Self {
            request_type: RequestType::ErrorRate,
            block: 0,
            error_rate,
        }
    }

    /// Encodes this record into its fixed 12-byte wire form.
    #[must_use]
    pub fn encode(&self) -> [u8; Self::WIRE_LEN] {
        let mut out = [0u8; Self::WIRE_LEN];
        out[0..2].copy_from_slice(&self.request_type.wire_value().to_be_bytes());
        out[2..6].copy_from_slice(&self.block.to_be_bytes());
        out[6..10].copy_from_slice(&self.error_rate.to_be_bytes());
        // bytes 10..12 are padding, left zeroed.
        out
    }

    /// Decodes a record from exactly [`Self::WIRE_LEN`] bytes.
    pub fn decode(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < Self::WIRE_LEN {
            return Err(WireError::BufferTooShort {
                expected: Self::WIRE_LEN,
                actual: buf.len(),
            });
        }
        let request_type = RequestType::try_from(u16::from_be_bytes([buf[0], buf[1]]))?;
        let block = u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]);
        let error_rate = u32::from_be_bytes([buf[6], buf[7], buf[8], buf[9]]);
        Ok(Self {
            request_type,
            block,
            error_rate,
        })
    }
}

impl fmt::Display for ControlRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.request_type {
            RequestType::Retransmit => write!(f, "RETRANSMIT(block={})", self.block),
            RequestType::Restart => write!(f, "RESTART(block={})", self.block),
            RequestType::Stop => write!(f, "STOP"),
            RequestType::ErrorRate => write!(f, "ERROR_RATE(rate={})", self.error_rate),
        }
    }
}

/// Computes the number of blocks for a file of `length` bytes under `block_size`.
///
/// `N = ceil(L / B)`; an empty file has zero blocks.
#[must_use]
pub const fn block_count(length: u64, block_size: u32) -> u32 {
    if length == 0 {
        return 0;
    }
    let block_size = block_size as u64;
    let remainder = if length % block_size != 0 { 1 } else { 0 };
    let count = length / block_size + remainder;
    count as u32
}

/// Returns the number of useful payload bytes for `block_index` (1-based)
/// out of `block_count` total blocks in a file of `length` bytes.
#[must_use]
pub const fn useful_bytes(block_index: u32, block_count: u32, length: u64, block_size: u32) -> u32 {
    if block_index != block_count {
        return block_size;
    }
    let remainder = (length % block_size as u64) as u32;
    if remainder == 0 {
        block_size
    } else {
        remainder
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datagram_header_round_trips() {
        let header = DatagramHeader {
            block_index: 42,
            block_type: BlockType::Retransmit,
        };
        let mut buf = [0u8; DatagramHeader::WIRE_LEN];
        header.encode(&mut buf).unwrap();
        assert_eq!(buf, [0, 0, 0, 42, 0, 2]);
        assert_eq!(DatagramHeader::decode(&buf).unwrap(), header);
    }

    #[test]
    fn datagram_header_rejects_short_buffer() {
        let err = DatagramHeader::decode(&[0, 0, 0]).unwrap_err();
        assert_eq!(
            err,
            WireError::BufferTooShort {
                expected: 6,
                actual: 3,
            }
        );
    }

    #[test]
    fn datagram_header_rejects_unknown_block_type() {
        let buf = [0, 0, 0, 1, 0, 9];
        let err = DatagramHeader::decode(&buf).unwrap_err();
        assert_eq!(err, WireError::UnknownBlockType(9));
    }

    #[test]
    fn control_record_retransmit_round_trips() {
        let record = ControlRecord::retransmit(7);
        let buf = record.encode();
        assert_eq!(buf.len(), 12);
        assert_eq!(ControlRecord::decode(&buf).unwrap(), record);
    }

    #[test]
    fn control_record_error_rate_round_trips() {
        let record = ControlRecord::error_rate(12_345);
        assert_eq!(ControlRecord::decode(&record.encode()).unwrap(), record);
    }

    #[test]
    fn control_record_rejects_unknown_request_type() {
        let mut buf = [0u8; 12];
        buf[0..2].copy_from_slice(&99u16.to_be_bytes());
        let err = ControlRecord::decode(&buf).unwrap_err();
        assert_eq!(err, WireError::UnknownRequestType(99));
    }

    #[test]
    fn block_count_matches_ceiling_division() {
        assert_eq!(block_count(0, 32768), 0);
        assert_eq!(block_count(32768, 32768), 1);
        assert_eq!(block_count(32769, 32768), 2);
        assert_eq!(block_count(65536, 32768), 2);
    }

    #[test]
    fn useful_bytes_is_full_block_except_last() {
        let block_size = 32768;
        let n = block_count(32769, block_size);
        assert_eq!(useful_bytes(1, n, 32769, block_size), block_size);
        assert_eq!(useful_bytes(2, n, 32769, block_size), 1);
    }

    #[test]
    fn useful_bytes_last_block_full_when_exact_multiple() {
        let block_size = 32768;
        let n = block_count(65536, block_size);
        assert_eq!(useful_bytes(n, n, 65536, block_size), block_size);
    }

    proptest::proptest! {
        #[test]
        fn datagram_header_round_trip_proptest(index in 1u32..=u32::MAX, type_tag in 1u16..=3u16) {
            let block_type = BlockType::try_from(type_tag).unwrap();
            let header = DatagramHeader { block_index: index, block_type };
            let mut buf = [0u8; DatagramHeader::WIRE_LEN];
            header.encode(&mut buf).unwrap();
            proptest::prop_assert_eq!(DatagramHeader::decode(&buf).unwrap(), header);
        }

        #[test]
        fn control_record_round_trip_proptest(block in 0u32..1000, error_rate in 0u32..100_000) {
            for record in [
                ControlRecord::retransmit(block),
                ControlRecord::restart(block),
                ControlRecord::stop(),
                ControlRecord::error_rate(error_rate),
            ] {
                proptest::prop_assert_eq!(ControlRecord::decode(&record.encode()).unwrap(), record);
            }
        }
    }
}
