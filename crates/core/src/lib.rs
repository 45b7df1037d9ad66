//! # Overview
//!
//! `core` is the top-level `Session`/`Transfer` API a CLI would drive: it
//! wires the [`control`] handshake, the [`sender`] send loop, and the
//! [`receiver`] receive loop (plus its concurrent [`diskio`] writer) into
//! two end-to-end procedures, [`serve_transfer`] and [`request_transfer`].
//!
//! # Design
//!
//! [`net`] holds the only concrete socket/file types in the workspace —
//! every lower crate is generic over a trait, so this is the single place
//! a real [`std::net::UdpSocket`] or [`std::fs::File`] is instantiated.
//! [`TransferError`] wraps lower-level errors with the role (sender or
//! receiver) and handshake phase they occurred in, in the spirit of a
//! client-facing error type that renders a useful diagnostic without
//! needing a full vectored-message-rendering subsystem.

mod error;
mod net;
mod session;

pub use error::{Role, TransferError};
pub use session::{request_transfer, serve_transfer};

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    use auth::Secret;
    use control::{FileMetadata, Parameters};

    fn loopback_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = thread::spawn(move || TcpStream::connect(addr).unwrap());
        let (server, _) = listener.accept().unwrap();
        (server, client.join().unwrap())
    }

    #[test]
    fn full_transfer_round_trips_small_file_over_loopback_sockets() {
        let (server_stream, client_stream) = loopback_pair();

        let payload = b"the quick brown fox jumps over the lazy dog".to_vec();
        let mut source_file = tempfile::tempfile().unwrap();
        source_file.write_all(&payload).unwrap();

        let dest_file = tempfile::tempfile().unwrap();

        let params = Parameters::builder()
            .block_size(8)
            .unwrap()
            .target_rate(1_000_000_000)
            .unwrap()
            .build();
        let block_count = wire::block_count(payload.len() as u64, params.block_size());

        let server_params = params;
        let server_secret = Secret::new(*b"shared-secret");
        let client_secret = Secret::new(*b"shared-secret");
        let file_len = payload.len() as u64;
        let block_size = params.block_size();

        let server = thread::spawn(move || {
            serve_transfer(server_stream, &server_secret, &server_params, |path| {
                assert_eq!(path, "remote.bin");
                Some((
                    source_file.try_clone().unwrap(),
                    FileMetadata {
                        file_size: file_len,
                        block_size,
                        block_count,
                        epoch: 1_700_000_000,
                    },
                ))
            })
        });

        let client_params = params;
        let report = request_transfer(
            client_stream,
            client_secret,
            &client_params,
            "remote.bin",
            dest_file.try_clone().unwrap(),
        )
        .unwrap();

        server.join().unwrap().unwrap();

        match report {
            stats::TransferReport::Completed { bytes, .. } => assert_eq!(bytes, file_len),
            stats::TransferReport::Aborted { reason } => panic!("transfer aborted: {reason}"),
        }

        let mut written = Vec::new();
        let mut dest_file = dest_file;
        use std::io::{Read, Seek, SeekFrom};
        dest_file.seek(SeekFrom::Start(0)).unwrap();
        dest_file.read_to_end(&mut written).unwrap();
        assert_eq!(written, payload);
    }
}
