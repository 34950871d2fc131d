pub mod handshake;
pub mod udp;
