//! Control-session handshake: version exchange, challenge-response
//! authentication, and the per-file open dialog.

use std::io::{self, Read, Write};

use auth::Secret;

use crate::parameters::{FileMetadata, Parameters, PROTOCOL_REVISION};

/// Errors raised anywhere in the handshake.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    /// Underlying control-channel I/O failed.
    #[error("control channel I/O error: {0}")]
    Io(#[from] io::Error),
    /// The two peers reported different protocol revisions.
    #[error("protocol revision mismatch: local {local:#010x}, peer {peer:#010x}")]
    VersionMismatch {
        /// This side's revision.
        local: u32,
        /// The peer's reported revision.
        peer: u32,
    },
    /// Authentication failed (digest mismatch, or a nonzero status byte).
    #[error("authentication failed")]
    AuthFailed,
    /// Challenge/digest computation failed.
    #[error("authentication error: {0}")]
    Auth(#[from] auth::AuthError),
    /// The server rejected the requested file.
    #[error("server rejected file open request")]
    FileRejected,
    /// The server echoed a block size different from the one requested.
    #[error("block size mismatch: requested {requested}, echoed {echoed}")]
    BlockSizeMismatch {
        /// The block size the client proposed.
        requested: u32,
        /// The block size the server echoed back.
        echoed: u32,
    },
}

fn read_u32(input: &mut impl Read) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    input.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

fn write_u32(out: &mut impl Write, value: u32) -> io::Result<()> {
    out.write_all(&value.to_be_bytes())
}

/// Server side of the version exchange: sends [`PROTOCOL_REVISION`], then
/// reads and checks the client's.
pub fn server_negotiate_version(stream: &mut (impl Read + Write)) -> Result<(), HandshakeError> {
    write_u32(stream, PROTOCOL_REVISION)?;
    let peer = read_u32(stream)?;
    if peer != PROTOCOL_REVISION {
        return Err(HandshakeError::VersionMismatch {
            local: PROTOCOL_REVISION,
            peer,
        });
    }
    Ok(())
}

/// Client side of the version exchange: reads the server's revision first,
/// then echoes its own.
pub fn client_negotiate_version(stream: &mut (impl Read + Write)) -> Result<(), HandshakeError> {
    let peer = read_u32(stream)?;
    write_u32(stream, PROTOCOL_REVISION)?;
    if peer != PROTOCOL_REVISION {
        return Err(HandshakeError::VersionMismatch {
            local: PROTOCOL_REVISION,
            peer,
        });
    }
    Ok(())
}

/// Server side of challenge-response authentication.
///
/// Generates and sends a 64-byte challenge, reads the client's 16-byte
/// digest, compares it against the locally computed digest, and writes a
/// one-byte status (`0` on success).
pub fn server_authenticate(
    stream: &mut (impl Read + Write),
    secret: &Secret,
) -> Result<(), HandshakeError> {
    let challenge = auth::generate_challenge()?;
    stream.write_all(&challenge)?;

    let mut client_digest = [0u8; auth::DIGEST_LEN];
    stream.read_exact(&mut client_digest)?;

    let expected = auth::compute_digest(&challenge, secret)?;
    let matched = auth::digests_match(&expected, &client_digest);

    stream.write_all(&[u8::from(!matched)])?;
    logging::trace_debug!(matched, "server authentication attempt");

    if matched {
        Ok(())
    } else {
        Err(HandshakeError::AuthFailed)
    }
}

/// Client side of challenge-response authentication.
///
/// Reads the 64-byte challenge, computes its own digest from `secret` (which
/// is consumed so its in-memory copy is zeroized immediately after use),
/// sends the digest, and checks the server's one-byte status.
pub fn client_authenticate(
    stream: &mut (impl Read + Write),
    secret: Secret,
) -> Result<(), HandshakeError> {
    let mut challenge = [0u8; auth::CHALLENGE_LEN];
    stream.read_exact(&mut challenge)?;

    let digest = auth::compute_digest(&challenge, &secret)?;
    drop(secret);

    stream.write_all(&digest)?;

    let mut status = [0u8; 1];
    stream.read_exact(&mut status)?;

    if status[0] == 0 {
        Ok(())
    } else {
        Err(HandshakeError::AuthFailed)
    }
}

/// Client side of the per-file open dialog.
///
/// Writes `path\n`, reads the accept/reject status, writes the proposed
/// parameters, reads back the file metadata (checking the echoed block size
/// matches), and writes the UDP port it is listening on.
pub fn client_open_transfer(
    stream: &mut (impl Read + Write),
    path: &str,
    params: &Parameters,
    udp_port: u16,
) -> Result<FileMetadata, HandshakeError> {
    stream.write_all(path.as_bytes())?;
    stream.write_all(b"\n")?;

    let mut status = [0u8; 1];
    stream.read_exact(&mut status)?;
    if status[0] != 0 {
        return Err(HandshakeError::FileRejected);
    }

    params.write_negotiation(stream)?;

    let metadata = FileMetadata::read(stream)?;
    if metadata.block_size != params.block_size() {
        return Err(HandshakeError::BlockSizeMismatch {
            requested: params.block_size(),
            echoed: metadata.block_size,
        });
    }

    stream.write_all(&udp_port.to_be_bytes())?;

    Ok(metadata)
}

/// Outcome the server reaches after running its half of the file open
/// dialog.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AcceptedTransfer {
    /// Negotiated parameters (server's local history/no_retransmit grafted
    /// onto the client's wire-negotiated values).
    pub params: Parameters,
    /// The UDP port the client reports it is listening on.
    pub client_udp_port: u16,
}

/// Server side of the per-file open dialog.
///
/// Reads the requested path via `read_path`, decides acceptance via
/// `accept`, and on acceptance exchanges parameters and metadata.
pub fn server_open_transfer(
    stream: &mut (impl Read + Write),
    local_params: &Parameters,
    mut accept: impl FnMut(&str) -> Option<FileMetadata>,
) -> Result<AcceptedTransfer, HandshakeError> {
    let path = read_line(stream)?;

    let Some(metadata) = accept(&path) else {
        stream.write_all(&[1])?;
        return Err(HandshakeError::FileRejected);
    };
    stream.write_all(&[0])?;

    let params = Parameters::read_negotiation(stream, local_params)?;
    metadata.write(stream)?;

    let mut port_buf = [0u8; 2];
    stream.read_exact(&mut port_buf)?;
    let client_udp_port = u16::from_be_bytes(port_buf);

    Ok(AcceptedTransfer {
        params,
        client_udp_port,
    })
}

fn read_line(stream: &mut impl Read) -> io::Result<String> {
    let mut bytes = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        stream.read_exact(&mut byte)?;
        if byte[0] == b'\n' {
            break;
        }
        bytes.push(byte[0]);
    }
    String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
