use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("Buffer too small: expected {expected}, found {found}")]
    BufferTooSmall { expected: usize, found: usize },

    #[error("Payload too large: {got} > {max}")]
    PayloadTooLarge { got: usize, max: usize },

    #[error("Payload length field {len} exceeds datagram size {datagram}")]
    LengthMismatch { len: usize, datagram: usize },
}

#[derive(Error, Debug)]
pub enum RdtError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error), // Wrapper around std::io::Error

    #[error("Header error: {0}")]
    Header(#[from] HeaderError), // Wrapper around HeaderError

    #[error("Handshake timed out")]
    HandshakeTimeout,
}

impl RdtError {
    /// `true` for a blocking-receive timeout, which the listener loops
    /// treat as a poll tick rather than a failure.
    pub fn is_timeout(&self) -> bool {
        match self {
            RdtError::Io(e) => {
                matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
            }
            _ => false,
        }
    }
}
