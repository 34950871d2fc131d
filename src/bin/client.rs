use std::fs::File;
use std::io::{Error, ErrorKind};
use std::net::{Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rft::config::Config;
use rft::rdt::errors::RdtError;
use rft::rdt::receiver;
use rft::sock::handshake;
use rft::sock::udp::UdpLink;

#[derive(Debug, Parser)]
#[command(name = "client", about = "Download a file from a reliable-UDP-transfer server")]
struct Args {
    /// Server hostname or IP address
    host: String,
    /// Server UDP port
    port: u16,
    /// Where to write the downloaded file
    output: PathBuf,
}

fn main() -> Result<(), RdtError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();
    let cfg = Config::default();

    let server = resolve(&args.host, args.port)?;
    let link = UdpLink::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))?;
    link.connect(server)?;
    info!(%server, "connecting");

    let shake = handshake::connect(&link, &cfg)?;
    let mut out = File::create(&args.output)?;
    receiver::recv_file(&link, &mut out, shake.file_size, &shake, &cfg)?;

    info!(bytes = shake.file_size, output = %args.output.display(), "transfer finished");
    Ok(())
}

/// Resolve a hostname to an IPv4 socket address.
fn resolve(host: &str, port: u16) -> Result<SocketAddr, RdtError> {
    let addrs = (host, port).to_socket_addrs()?;
    for addr in addrs {
        if addr.is_ipv4() {
            return Ok(addr);
        }
    }
    Err(Error::new(ErrorKind::AddrNotAvailable, "IPv4 address not found").into())
}
