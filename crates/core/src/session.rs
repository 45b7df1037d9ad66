//! Top-level session API: wires the control handshake, the sender loop,
//! and the receiver loop into complete `serve_transfer`/`request_transfer`
//! procedures.

use std::fs::File;
use std::net::{TcpStream, UdpSocket};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use auth::Secret;
use control::{FileMetadata, Parameters};

use crate::error::{Role, TransferError};
use crate::net::{FileBlockSource, TcpControlSink, TcpControlSource, UdpBlockSink, UdpDatagramSource};

fn handshake<T>(role: Role, phase: &'static str, result: Result<T, control::HandshakeError>) -> Result<T, TransferError> {
    result.map_err(|source| TransferError::Handshake { role, phase, source })
}

/// Runs the server side of one transfer end to end: version negotiation,
/// authentication, the per-file open dialog, then the send loop until the
/// client issues `STOP`.
///
/// `accept` is called once with the client's requested path; returning
/// `Some((file, metadata))` admits the transfer, `None` rejects it.
pub fn serve_transfer(
    mut control_stream: TcpStream,
    secret: &Secret,
    local_params: &Parameters,
    mut accept: impl FnMut(&str) -> Option<(File, FileMetadata)>,
) -> Result<stats::TransferReport, TransferError> {
    let started = Instant::now();

    handshake(
        Role::Sender,
        "version negotiation",
        control::server_negotiate_version(&mut control_stream),
    )?;
    handshake(
        Role::Sender,
        "authentication",
        control::server_authenticate(&mut control_stream, secret),
    )?;

    let mut opened: Option<(File, FileMetadata)> = None;
    let accepted = handshake(
        Role::Sender,
        "file open dialog",
        control::server_open_transfer(&mut control_stream, local_params, |path| match accept(path) {
            Some((file, metadata)) => {
                opened = Some((file, metadata));
                Some(metadata)
            }
            None => None,
        }),
    )?;
    let (file, metadata) = opened.ok_or_else(|| TransferError::Handshake {
        role: Role::Sender,
        phase: "file open dialog",
        source: control::HandshakeError::FileRejected,
    })?;

    let peer_ip = control_stream.peer_addr()?.ip();
    let client_addr = std::net::SocketAddr::new(peer_ip, accepted.client_udp_port);

    let udp_socket = UdpSocket::bind((peer_ip_any_of(peer_ip), 0))?;
    let control_clone = control_stream.try_clone()?;
    control_clone.set_nonblocking(true)?;

    let retransmit_count = Arc::new(AtomicU64::new(0));
    let mut sender_loop = sender::SenderLoop::new(
        FileBlockSource::new(file, metadata.block_size),
        UdpBlockSink::new(udp_socket, client_addr),
        TcpControlSource::new(control_clone, Arc::clone(&retransmit_count)),
        metadata.block_size,
        metadata.block_count,
        accepted.params.no_retransmit(),
        accepted.params.ipd_params(),
    );

    loop {
        match sender_loop.step()? {
            sender::StepOutcome::Stopped => break,
            sender::StepOutcome::Continue | sender::StepOutcome::AllOriginalsSent => {}
        }
    }

    Ok(stats::TransferReport::Completed {
        bytes: metadata.file_size,
        duration: started.elapsed(),
        retransmitted_blocks: retransmit_count.load(Ordering::Relaxed),
    })
}

/// Runs the client side of one transfer end to end: version negotiation,
/// authentication, the per-file open dialog, then the receive loop,
/// concurrent disk writer, until the transfer completes.
pub fn request_transfer(
    mut control_stream: TcpStream,
    secret: Secret,
    params: &Parameters,
    remote_path: &str,
    destination: File,
) -> Result<stats::TransferReport, TransferError> {
    let started = Instant::now();

    handshake(
        Role::Receiver,
        "version negotiation",
        control::client_negotiate_version(&mut control_stream),
    )?;
    handshake(
        Role::Receiver,
        "authentication",
        control::client_authenticate(&mut control_stream, secret),
    )?;

    let local_ip = control_stream.local_addr()?.ip();
    let udp_socket = UdpSocket::bind((local_ip, 0))?;
    let udp_port = udp_socket.local_addr()?.port();

    let metadata = handshake(
        Role::Receiver,
        "file open dialog",
        control::client_open_transfer(&mut control_stream, remote_path, params, udp_port),
    )?;

    destination.set_len(metadata.file_size)?;

    let received = Arc::new(diskio::ReceivedBitmap::new(metadata.block_count));
    let blocks_left = Arc::new(diskio::BlocksLeft::new(metadata.block_count));
    let (producer, consumer) = ringbuf::channel(ringbuf::DEFAULT_CAPACITY);

    let writer = diskio::Writer::new(
        destination,
        metadata.block_size,
        metadata.file_size,
        metadata.block_count,
        Arc::clone(&received),
        Arc::clone(&blocks_left),
    );
    let writer_handle = thread::spawn(move || writer.run(&consumer));

    let mut receiver_loop = receiver::ReceiverLoop::new(
        UdpDatagramSource::new(udp_socket)?,
        TcpControlSink::new(control_stream),
        producer,
        Arc::clone(&received),
        Arc::clone(&blocks_left),
        metadata.block_size,
        metadata.block_count,
        params.no_retransmit(),
        params.history(),
    );

    loop {
        match receiver_loop.step()? {
            receiver::StepOutcome::Continue => {}
            receiver::StepOutcome::Completed => break,
        }
    }

    writer_handle
        .join()
        .map_err(|_| TransferError::WriterPanicked)??;

    Ok(stats::TransferReport::Completed {
        bytes: metadata.file_size,
        duration: started.elapsed(),
        retransmitted_blocks: receiver_loop.stats().total_retransmits(),
    })
}

/// Binds the sender's outbound UDP socket on the same address family as
/// the peer's control-channel address.
const fn peer_ip_any_of(peer_ip: std::net::IpAddr) -> std::net::IpAddr {
    match peer_ip {
        std::net::IpAddr::V4(_) => std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
        std::net::IpAddr::V6(_) => std::net::IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED),
    }
}
