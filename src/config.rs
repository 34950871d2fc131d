use std::time::Duration;

/// Fixed size of one datagram on the wire. Every segment is padded to this.
pub const PACKET_SIZE: usize = 1024;

/// Fixed size of the segment header at the front of every datagram.
pub const HEADER_SIZE: usize = 8;

/// Number of distinct values a 16-bit wire sequence number can take.
pub const SEQ_SPACE: u32 = 1 << 16;

/// Tunable protocol parameters, fixed at connection-setup time.
///
/// The defaults are the build-time constants; tests override individual
/// fields with struct-update syntax.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum payload bytes carried by one segment.
    pub payload_size: usize,
    /// Retransmission timeout for outstanding segments.
    pub rto: Duration,
    /// Initial congestion window, in bytes.
    pub init_cwnd: u32,
    /// Initial slow-start threshold, in bytes.
    pub init_ssthresh: u32,
    /// Receive window advertised at handshake time, in bytes.
    pub init_rwnd: u16,
    /// Wire sequence delta beyond which a wraparound is assumed.
    /// Must exceed any window's worth of sequence space and stay below
    /// half of `SEQ_SPACE`.
    pub wrap_threshold: u16,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            payload_size: PACKET_SIZE - HEADER_SIZE,
            rto: Duration::from_millis(500),
            init_cwnd: (PACKET_SIZE - HEADER_SIZE) as u32,
            init_ssthresh: 15360,
            init_rwnd: 15360,
            wrap_threshold: 24576,
        }
    }
}

impl Config {
    /// Maximum number of distinct segments representable within one
    /// sequence-space cycle; sizes the receiver's reassembly buffer.
    pub fn reassembly_capacity(&self) -> usize {
        SEQ_SPACE as usize / self.payload_size
    }
}

// -- Unit tests --

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_consistent() {
        let cfg = Config::default();
        assert_eq!(cfg.payload_size + HEADER_SIZE, PACKET_SIZE);
        assert!(cfg.wrap_threshold as u32 > cfg.init_rwnd as u32);
        assert!((cfg.wrap_threshold as u32) < SEQ_SPACE / 2);
    }

    #[test]
    fn test_reassembly_capacity() {
        let cfg = Config {
            payload_size: 512,
            ..Default::default()
        };
        assert_eq!(cfg.reassembly_capacity(), 128);
    }
}
