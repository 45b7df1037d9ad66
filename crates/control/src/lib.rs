//! # Overview
//!
//! `control` drives the TCP control channel: the version handshake,
//! challenge-response authentication, per-file parameter negotiation, and
//! the sender/receiver transfer state machines layered on top.
//!
//! # Design
//!
//! The handshake functions in [`handshake`] are written against `Read +
//! Write` rather than a concrete socket type, so they can be exercised
//! against an in-memory buffer in tests and reused against any real
//! transport. [`parameters::Parameters`] is the negotiated-parameter value
//! type; [`state`] holds the two peer-specific state machines.

pub mod handshake;
pub mod parameters;
pub mod state;

pub use handshake::{
    client_authenticate, client_negotiate_version, client_open_transfer, server_authenticate,
    server_negotiate_version, server_open_transfer, AcceptedTransfer, HandshakeError,
};
pub use parameters::{FileMetadata, Parameters, ParametersBuilder, ParametersError};
pub use state::{ReceiverState, SenderState};
