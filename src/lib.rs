//! `rft`: a reliable, ordered file-transfer protocol over UDP.
//!
//! The transfer core lives in [`rdt`]: a sliding-window sender with
//! selective retransmission and slow-start congestion control, and a
//! reassembling receiver with cumulative acknowledgments. Each direction
//! runs one engine loop and one listener thread against shared,
//! lock-protected state. [`sock`] holds the datagram plumbing: the
//! segment-oriented UDP socket wrapper and the three-way handshake.

pub mod config;
pub mod rdt;
pub mod sock;
