use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::config::{Config, HEADER_SIZE, PACKET_SIZE};
use crate::rdt::errors::RdtError;
use crate::rdt::flags::CtrlFlags;
use crate::rdt::header::SegmentHeader;
use crate::sock::udp::UdpLink;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);
const HANDSHAKE_RETRIES: usize = 5;

/// Header state for one side of a connection, fixed when the handshake
/// completes.
#[derive(Debug, Clone, Copy)]
pub struct Endpoint {
    /// Next wire sequence number this side will send.
    pub seq: u16,
    /// Next wire sequence number expected from the peer.
    pub ack: u16,
    /// Advertised receive window, in bytes.
    pub rwnd: u16,
}

/// Result of a completed three-way handshake.
#[derive(Debug, Clone, Copy)]
pub struct Handshake {
    /// Our view of the connection.
    pub local: Endpoint,
    /// The peer's view: `remote.seq` is the first data sequence number the
    /// peer will use, `remote.rwnd` its advertised window.
    pub remote: Endpoint,
    /// Total size of the file the server announced, in bytes.
    pub file_size: u64,
}

/// Server side: wait for a SYN on an unconnected link, connect to the
/// client, and complete the handshake. The SYN-ACK announces `file_size`
/// in an 8-byte payload.
pub fn accept(link: &UdpLink, file_size: u64, cfg: &Config) -> Result<Handshake, RdtError> {
    let mut buf = [0u8; PACKET_SIZE];

    link.set_read_timeout(None)?;
    let (syn, peer) = loop {
        match link.recv_segment_from(&mut buf) {
            Ok((hdr, from))
                if hdr.ctrl.contains(CtrlFlags::SYN) && !hdr.ctrl.contains(CtrlFlags::ACK) =>
            {
                break (hdr, from);
            }
            Ok(_) => continue,
            Err(RdtError::Header(err)) => {
                warn!(%err, "ignoring malformed segment");
                continue;
            }
            Err(err) => return Err(err),
        }
    };
    link.connect(peer)?;
    debug!(%peer, seq = syn.seq, rwnd = syn.window, "SYN received");

    let isn: u16 = rand::thread_rng().gen();
    let syn_ack = SegmentHeader {
        seq: isn,
        ack: syn.seq.wrapping_add(1),
        ctrl: CtrlFlags::SYN | CtrlFlags::ACK,
        len: 8,
        window: cfg.init_rwnd,
    };

    link.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;
    for _ in 0..HANDSHAKE_RETRIES {
        link.send_segment(&syn_ack, &file_size.to_be_bytes())?;

        match link.recv_segment(&mut buf) {
            Ok(hdr)
                if hdr.ctrl.contains(CtrlFlags::ACK)
                    && !hdr.ctrl.contains(CtrlFlags::SYN)
                    && hdr.ack == isn.wrapping_add(1) =>
            {
                info!(%peer, file_size, "connection established");
                return Ok(Handshake {
                    local: Endpoint {
                        seq: isn.wrapping_add(1),
                        ack: syn.seq.wrapping_add(1),
                        rwnd: cfg.init_rwnd,
                    },
                    remote: Endpoint {
                        seq: syn.seq.wrapping_add(1),
                        ack: isn.wrapping_add(1),
                        rwnd: hdr.window,
                    },
                    file_size,
                });
            }
            // A duplicate SYN or stray segment: re-send the SYN-ACK
            Ok(_) => continue,
            Err(err) if err.is_timeout() => continue,
            Err(RdtError::Header(err)) => {
                warn!(%err, "ignoring malformed segment");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(RdtError::HandshakeTimeout)
}

/// Client side: send a SYN to the connected peer and complete the
/// handshake, learning the server's initial sequence number, its window,
/// and the size of the file it is about to send.
pub fn connect(link: &UdpLink, cfg: &Config) -> Result<Handshake, RdtError> {
    let mut buf = [0u8; PACKET_SIZE];

    let isn: u16 = rand::thread_rng().gen();
    let syn = SegmentHeader {
        seq: isn,
        ack: 0,
        ctrl: CtrlFlags::SYN,
        len: 0,
        window: cfg.init_rwnd,
    };

    link.set_read_timeout(Some(HANDSHAKE_TIMEOUT))?;
    for _ in 0..HANDSHAKE_RETRIES {
        link.send_segment(&syn, &[])?;

        match link.recv_segment(&mut buf) {
            Ok(hdr)
                if hdr.ctrl.contains(CtrlFlags::SYN | CtrlFlags::ACK)
                    && hdr.ack == isn.wrapping_add(1)
                    && hdr.len == 8 =>
            {
                let mut size_bytes = [0u8; 8];
                size_bytes.copy_from_slice(&buf[HEADER_SIZE..HEADER_SIZE + 8]);
                let file_size = u64::from_be_bytes(size_bytes);

                let ack = SegmentHeader {
                    seq: isn.wrapping_add(1),
                    ack: hdr.seq.wrapping_add(1),
                    ctrl: CtrlFlags::ACK,
                    len: 0,
                    window: cfg.init_rwnd,
                };
                link.send_segment(&ack, &[])?;

                info!(file_size, rwnd = hdr.window, "connection established");
                return Ok(Handshake {
                    local: Endpoint {
                        seq: isn.wrapping_add(1),
                        ack: hdr.seq.wrapping_add(1),
                        rwnd: cfg.init_rwnd,
                    },
                    remote: Endpoint {
                        seq: hdr.seq.wrapping_add(1),
                        ack: isn.wrapping_add(1),
                        rwnd: hdr.window,
                    },
                    file_size,
                });
            }
            Ok(_) => continue,
            Err(err) if err.is_timeout() => continue,
            Err(RdtError::Header(err)) => {
                warn!(%err, "ignoring malformed segment");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(RdtError::HandshakeTimeout)
}
