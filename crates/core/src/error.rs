//! [`TransferError`], the `core` crate's unified error type.

use std::fmt;
use std::io;

/// Which side of the transfer an error occurred on.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    /// The side transmitting the file (`sender`/server).
    Sender,
    /// The side receiving the file (`receiver`/client).
    Receiver,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sender => "sender",
            Self::Receiver => "receiver",
        })
    }
}

/// Errors raised while running a whole transfer, carrying enough context
/// (which role, which phase) to render a useful diagnostic.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// The control-channel handshake failed.
    #[error("{role} handshake failed during {phase}: {source}")]
    Handshake {
        /// Which side observed the failure.
        role: Role,
        /// Human-readable phase name (e.g. `"version negotiation"`).
        phase: &'static str,
        /// The underlying handshake error.
        #[source]
        source: control::HandshakeError,
    },
    /// The server-side send loop failed.
    #[error("sender loop failed: {0}")]
    Sender(#[from] sender::SenderError),
    /// The client-side receive loop failed.
    #[error("receiver loop failed: {0}")]
    Receiver(#[from] receiver::ReceiverError),
    /// The disk writer failed, or the writer thread did not shut down
    /// cleanly.
    #[error("disk writer failed: {0}")]
    DiskIo(#[from] diskio::DiskIoError),
    /// A socket or file operation outside the handshake failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The disk writer thread panicked instead of returning an error.
    #[error("disk writer thread panicked")]
    WriterPanicked,
}
