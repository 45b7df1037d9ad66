//! Concrete socket/file adapters implementing the [`sender`] and
//! [`receiver`] crates' I/O traits.
//!
//! Separating these from the trait definitions themselves is what let
//! `sender` and `receiver` be unit-tested without a real network stack;
//! this module is the only place a [`std::net::UdpSocket`] appears.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::net::{SocketAddr, TcpStream, UdpSocket};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use wire::ControlRecord;

/// Read timeout on the receiver's data socket.
///
/// Without this, `recv_from` blocks indefinitely; the receiver loop only
/// re-checks whether the transfer is already complete when a datagram
/// actually arrives (or this timeout elapses), so a socket with no timeout
/// can deadlock forever on the last few blocks if nothing further is sent.
pub const DATAGRAM_RECV_TIMEOUT: Duration = Duration::from_millis(500);

/// Reads blocks from a regular file by seeking to `block_size * (index - 1)`.
pub struct FileBlockSource {
    file: File,
    block_size: u32,
}

impl FileBlockSource {
    /// Wraps `file` as a block source with the given block size.
    #[must_use]
    pub const fn new(file: File, block_size: u32) -> Self {
        Self { file, block_size }
    }
}

impl sender::BlockSource for FileBlockSource {
    fn read_block(&mut self, block_index: u32, buf: &mut [u8]) -> io::Result<usize> {
        let offset = u64::from(self.block_size) * u64::from(block_index - 1);
        self.file.seek(SeekFrom::Start(offset))?;

        let mut total = 0;
        while total < buf.len() {
            match self.file.read(&mut buf[total..])? {
                0 => break,
                n => total += n,
            }
        }
        Ok(total)
    }
}

/// Sends datagrams to a fixed peer address over an unconnected UDP socket.
pub struct UdpBlockSink {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl UdpBlockSink {
    /// Wraps `socket`, addressing every send to `peer`.
    #[must_use]
    pub const fn new(socket: UdpSocket, peer: SocketAddr) -> Self {
        Self { socket, peer }
    }
}

impl sender::DatagramSink for UdpBlockSink {
    fn send_datagram(&mut self, datagram: &[u8]) -> io::Result<()> {
        self.socket.send_to(datagram, self.peer).map(|_| ())
    }
}

/// Non-blockingly drains `RETRANSMIT`/`RESTART`/`STOP`/`ERROR_RATE` records
/// from a TCP control stream, tallying retransmit requests for the final
/// transfer report.
pub struct TcpControlSource {
    stream: TcpStream,
    retransmit_count: Arc<AtomicU64>,
}

impl TcpControlSource {
    /// Wraps `stream`, which must already be set non-blocking.
    #[must_use]
    pub const fn new(stream: TcpStream, retransmit_count: Arc<AtomicU64>) -> Self {
        Self {
            stream,
            retransmit_count,
        }
    }
}

impl sender::ControlSource for TcpControlSource {
    fn try_recv(&mut self) -> io::Result<Option<ControlRecord>> {
        let mut buf = [0u8; ControlRecord::WIRE_LEN];
        match self.stream.read_exact(&mut buf) {
            Ok(()) => {
                let record = ControlRecord::decode(&buf)
                    .map_err(|source| io::Error::new(io::ErrorKind::InvalidData, source))?;
                if record.request_type == wire::RequestType::Retransmit {
                    self.retransmit_count.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Some(record))
            }
            Err(source) if source.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(source) => Err(source),
        }
    }
}

/// Receives datagrams on a bound (but unconnected) UDP socket, accepting
/// from any source address — the control channel is the only authenticated
/// channel; the data channel trusts whoever sends correctly-framed blocks
/// once a transfer has been negotiated.
pub struct UdpDatagramSource {
    socket: UdpSocket,
}

impl UdpDatagramSource {
    /// Wraps `socket`, setting [`DATAGRAM_RECV_TIMEOUT`] so `recv_datagram`
    /// returns a `TimedOut` error periodically instead of blocking forever.
    pub fn new(socket: UdpSocket) -> io::Result<Self> {
        socket.set_read_timeout(Some(DATAGRAM_RECV_TIMEOUT))?;
        Ok(Self { socket })
    }
}

impl receiver::DatagramSource for UdpDatagramSource {
    fn recv_datagram(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.recv_from(buf).map(|(n, _addr)| n)
    }
}

/// Writes control records to the sender over the TCP control channel.
pub struct TcpControlSink {
    stream: TcpStream,
}

impl TcpControlSink {
    /// Wraps `stream`.
    #[must_use]
    pub const fn new(stream: TcpStream) -> Self {
        Self { stream }
    }
}

impl receiver::ControlSink for TcpControlSink {
    fn send_control(&mut self, record: &ControlRecord) -> io::Result<()> {
        self.stream.write_all(&record.encode())
    }
}
