use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use crate::config::{HEADER_SIZE, PACKET_SIZE};
use crate::rdt::errors::{HeaderError, RdtError};
use crate::rdt::header::SegmentHeader;

/// Segment-oriented wrapper around one UDP socket.
///
/// Speaks [`SegmentHeader`] instead of raw bytes; every datagram on the
/// wire is exactly [`PACKET_SIZE`] bytes, payload region zero-padded. All
/// methods take `&self`, so one link can be shared between an engine loop
/// and its listener thread.
#[derive(Debug)]
pub struct UdpLink {
    sock: UdpSocket,
}

impl UdpLink {
    /// Bind a new link. Pass port 0 to let the OS pick one.
    pub fn bind(local: SocketAddr) -> Result<Self, RdtError> {
        let sock = UdpSocket::bind(local)?;
        Ok(UdpLink { sock })
    }

    /// Fix the remote peer; `send_segment` and `recv_segment` require it.
    pub fn connect(&self, peer: SocketAddr) -> Result<(), RdtError> {
        self.sock.connect(peer)?;
        Ok(())
    }

    pub fn local_addr(&self) -> Result<SocketAddr, RdtError> {
        Ok(self.sock.local_addr()?)
    }

    /// Bound every blocking receive by `timeout` (`None` blocks forever).
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), RdtError> {
        self.sock.set_read_timeout(timeout)?;
        Ok(())
    }

    /// Encode `header` + `payload` into one fixed-size datagram and send it
    /// to the connected peer.
    pub fn send_segment(&self, header: &SegmentHeader, payload: &[u8]) -> Result<usize, RdtError> {
        if payload.len() > PACKET_SIZE - HEADER_SIZE {
            return Err(HeaderError::PayloadTooLarge {
                got: payload.len(),
                max: PACKET_SIZE - HEADER_SIZE,
            }
            .into());
        }

        let mut buf = [0u8; PACKET_SIZE];
        header.serialize(&mut buf)?;
        buf[HEADER_SIZE..HEADER_SIZE + payload.len()].copy_from_slice(payload);

        Ok(self.sock.send(&buf)?)
    }

    /// Receive one datagram from the connected peer into `buf` and parse
    /// its header. The payload sits at `buf[HEADER_SIZE..HEADER_SIZE + len]`.
    pub fn recv_segment(&self, buf: &mut [u8; PACKET_SIZE]) -> Result<SegmentHeader, RdtError> {
        let n = self.sock.recv(buf)?;
        Ok(SegmentHeader::parse(&buf[..n])?)
    }

    /// Like `recv_segment`, but on an unconnected link; also returns the
    /// sender's address. Used while waiting for a peer to appear.
    pub fn recv_segment_from(
        &self,
        buf: &mut [u8; PACKET_SIZE],
    ) -> Result<(SegmentHeader, SocketAddr), RdtError> {
        let (n, from) = self.sock.recv_from(buf)?;
        let header = SegmentHeader::parse(&buf[..n])?;
        Ok((header, from))
    }
}

// -- Unit tests --

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdt::flags::CtrlFlags;

    fn pair() -> (UdpLink, UdpLink) {
        let a = UdpLink::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let b = UdpLink::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        a.connect(b.local_addr().unwrap()).unwrap();
        b.connect(a.local_addr().unwrap()).unwrap();
        (a, b)
    }

    #[test]
    fn test_segment_roundtrip() {
        let (a, b) = pair();
        let hdr = SegmentHeader {
            seq: 17,
            ack: 0,
            ctrl: CtrlFlags::empty(),
            len: 5,
            window: 4096,
        };
        let sent = a.send_segment(&hdr, b"hello").unwrap();
        assert_eq!(sent, PACKET_SIZE);

        let mut buf = [0u8; PACKET_SIZE];
        let got = b.recv_segment(&mut buf).unwrap();
        assert_eq!(got, hdr);
        assert_eq!(&buf[HEADER_SIZE..HEADER_SIZE + 5], b"hello");
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let (a, _b) = pair();
        let hdr = SegmentHeader {
            seq: 0,
            ack: 0,
            ctrl: CtrlFlags::empty(),
            len: 0,
            window: 0,
        };
        let payload = vec![0u8; PACKET_SIZE];
        assert!(matches!(
            a.send_segment(&hdr, &payload),
            Err(RdtError::Header(HeaderError::PayloadTooLarge { .. }))
        ));
    }

    #[test]
    fn test_read_timeout_reported_as_timeout() {
        let (a, _b) = pair();
        a.set_read_timeout(Some(Duration::from_millis(10))).unwrap();

        let mut buf = [0u8; PACKET_SIZE];
        let err = a.recv_segment(&mut buf).unwrap_err();
        assert!(err.is_timeout());
    }
}
