use std::fs::File;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rft::config::Config;
use rft::rdt::errors::RdtError;
use rft::rdt::sender;
use rft::sock::handshake;
use rft::sock::udp::UdpLink;

#[derive(Debug, Parser)]
#[command(name = "server", about = "Serve one file over the reliable UDP transfer protocol")]
struct Args {
    /// UDP port to listen on
    port: u16,
    /// File to serve
    file: PathBuf,
}

fn main() -> Result<(), RdtError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();
    let cfg = Config::default();

    let mut file = File::open(&args.file)?;
    let fsize = file.metadata()?.len();

    let link = UdpLink::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, args.port)))?;
    info!(port = args.port, file = %args.file.display(), fsize, "waiting for a client");

    let shake = handshake::accept(&link, fsize, &cfg)?;
    sender::send_file(&link, &mut file, fsize, &shake, &cfg)?;

    info!(bytes = fsize, "transfer finished");
    Ok(())
}
