//! Transfer-level state machines for the sender and receiver roles.

/// Sender-side transfer states.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SenderState {
    /// Running the control-channel handshake.
    Negotiating,
    /// Exchanging the per-file open dialog.
    FileOpening,
    /// Actively pacing blocks onto the data channel.
    Transferring,
    /// Exited cleanly after a `STOP` control record.
    Stopped,
    /// Exited due to an I/O error or malformed request.
    Aborted,
}

impl SenderState {
    /// Returns `true` if this is a terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Aborted)
    }
}

/// Receiver-side transfer states.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ReceiverState {
    /// Running the control-channel handshake.
    Negotiating,
    /// Having sent the file-open request, awaiting metadata.
    Requesting,
    /// Actively classifying datagrams and writing to disk.
    Receiving,
    /// All blocks accounted for.
    Completed,
    /// Exited due to an unrecoverable I/O or disk-writer failure.
    Aborted,
}

impl ReceiverState {
    /// Returns `true` if this is a terminal state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }
}
