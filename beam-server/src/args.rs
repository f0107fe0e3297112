//! Command-line argument parsing

use clap::Parser;
use std::net::IpAddr;

use crate::constants::DEFAULT_PORT;

/// Beam rendezvous relay server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// IP address to bind to (IPv4 or IPv6)
    #[arg(short, long, default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Ceiling on the uploader wait duration (e.g. "120s", "5m")
    #[arg(long, default_value = "120s")]
    pub max_wait: String,

    /// Enable debug logging (shows per-chunk progress events)
    #[arg(long, default_value = "false")]
    pub debug: bool,
}
