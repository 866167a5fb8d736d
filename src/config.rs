//! Command line flags.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Pseudo interface to listen on all interfaces
pub const ANY_DEVICE: &str = "any";

/// Default packet filter to capture nfs traffic
pub const NFS_FILTER: &str = "port 2049";

/// Packet snapshot length
pub const SNAPLEN: i32 = 65535;

pub const REFRESH_SECS: u64 = 2;

pub const DEFAULT_MAX_BUFFER: usize = 16 * 1024 * 1024;

pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

#[derive(Parser, Debug, Clone)]
#[command(name = "nfstop", version, about = "Top-like view of live NFS requests")]
pub struct Args {
    /// Name of interface to listen on
    #[arg(short = 'i', long = "interface", value_name = "INTERFACE", default_value = ANY_DEVICE)]
    pub interface: String,

    /// Capture filter in libpcap filter syntax
    #[arg(short = 'f', long = "filter", value_name = "FILTER", default_value = NFS_FILTER)]
    pub filter: String,

    /// Print list of interfaces and exit
    #[arg(short = 'D', long = "list-interfaces")]
    pub list_interfaces: bool,

    /// Packet snapshot length
    #[arg(short = 's', long = "snaplen", value_name = "SNAPLEN", default_value_t = SNAPLEN,
          value_parser = clap::value_parser!(i32).range(64..))]
    pub snaplen: i32,

    /// Read packets from a pcap file instead of a live interface
    #[arg(short = 'r', long = "read", value_name = "FILE")]
    pub read: Option<PathBuf>,

    /// Refresh interval in seconds
    #[arg(short = 't', long = "interval", value_name = "SECS", default_value_t = REFRESH_SECS,
          value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: u64,

    /// Print one JSON line per refresh instead of drawing the terminal UI
    #[arg(long)]
    pub batch: bool,

    /// Resolve AUTH_SYS uids to login names using /etc/passwd
    #[arg(long)]
    pub names: bool,

    /// Per-direction reassembly buffer limit in bytes
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_MAX_BUFFER)]
    pub max_buffer: usize,

    /// Forget connections idle for this many seconds
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_IDLE_TIMEOUT_SECS)]
    pub idle_timeout: u64,

    /// Write log output to this file
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

impl Args {
    pub fn refresh(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    pub fn tracker_limits(&self) -> crate::stream::Limits {
        crate::stream::Limits {
            max_buffer: self.max_buffer,
            idle_timeout: chrono::Duration::seconds(self.idle_timeout as i64),
        }
    }
}
