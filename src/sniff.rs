// src/sniff.rs
use crate::config::Args;
use crate::error::CaptureError;
use chrono::{DateTime, Utc};
use crossbeam_channel::Sender;
use etherparse::{NetSlice, SlicedPacket, TransportSlice};
use pcap::{Activated, Capture, Device};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Read timeout so the capture loop can notice shutdown
const READ_TIMEOUT_MS: i32 = 500;

/// A TCP payload as captured, with its endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub timestamp: DateTime<Utc>,
    pub src: SocketAddr,
    pub dst: SocketAddr,
    pub payload: Vec<u8>,
}

/// Link layer framing of the capture handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Ethernet,
    LinuxSll,
    RawIp,
    /// BSD loopback: 4 byte address family before the IP header
    Null,
    Unsupported(i32),
}

impl LinkType {
    pub fn from_dlt(dlt: i32) -> LinkType {
        match dlt {
            1 => LinkType::Ethernet,
            113 => LinkType::LinuxSll,
            12 | 101 | 228 | 229 => LinkType::RawIp,
            0 => LinkType::Null,
            other => LinkType::Unsupported(other),
        }
    }

    fn slice<'a>(self, data: &'a [u8]) -> Option<SlicedPacket<'a>> {
        match self {
            LinkType::Ethernet => SlicedPacket::from_ethernet(data).ok(),
            LinkType::LinuxSll => SlicedPacket::from_linux_sll(data).ok(),
            LinkType::RawIp => SlicedPacket::from_ip(data).ok(),
            LinkType::Null => SlicedPacket::from_ip(data.get(4..)?).ok(),
            LinkType::Unsupported(_) => None,
        }
    }
}

/// Extract the TCP payload of a captured frame. Anything that is not
/// TCP over IPv4/IPv6 with data is ignored.
pub fn parse_segment(link: LinkType, timestamp: DateTime<Utc>, data: &[u8]) -> Option<Segment> {
    let packet = link.slice(data)?;

    let (src_ip, dst_ip): (IpAddr, IpAddr) = match packet.net.as_ref()? {
        NetSlice::Ipv4(ipv4) => (
            ipv4.header().source_addr().into(),
            ipv4.header().destination_addr().into(),
        ),
        NetSlice::Ipv6(ipv6) => (
            ipv6.header().source_addr().into(),
            ipv6.header().destination_addr().into(),
        ),
        #[allow(unreachable_patterns)]
        _ => return None,
    };

    let Some(TransportSlice::Tcp(tcp)) = packet.transport.as_ref() else {
        return None;
    };
    let payload = tcp.payload();
    if payload.is_empty() {
        return None;
    }

    Some(Segment {
        timestamp,
        src: SocketAddr::new(src_ip, tcp.source_port()),
        dst: SocketAddr::new(dst_ip, tcp.destination_port()),
        payload: payload.to_vec(),
    })
}

fn packet_time(header: &pcap::PacketHeader) -> DateTime<Utc> {
    let micros = header.ts.tv_usec.clamp(0, 999_999) as u32;
    DateTime::from_timestamp(header.ts.tv_sec as i64, micros * 1000).unwrap_or_default()
}

pub fn list_devices() -> Result<Vec<String>, CaptureError> {
    let devices = Device::list().map_err(CaptureError::List)?;
    Ok(devices.into_iter().map(|d| d.name).collect())
}

/// An opened capture handle, live or reading a file.
pub struct Sniffer {
    cap: Capture<dyn Activated>,
    link: LinkType,
}

impl Sniffer {
    pub fn open(args: &Args) -> Result<Sniffer, CaptureError> {
        let mut cap: Capture<dyn Activated> = match &args.read {
            Some(path) => open_file(path)?.into(),
            None => create_capture(&args.interface, args.snaplen)?.into(),
        };

        cap.filter(&args.filter, true)
            .map_err(|source| CaptureError::Filter {
                filter: args.filter.clone(),
                source,
            })?;

        let link = LinkType::from_dlt(cap.get_datalink().0);
        if let LinkType::Unsupported(dlt) = link {
            warn!(dlt, "unsupported link type, no packets will be decoded");
        }
        info!(interface = %args.interface, filter = %args.filter, ?link, "capture ready");

        Ok(Sniffer { cap, link })
    }

    /// Pump packets into `sender` until input ends, the receiver goes away
    /// or `running` is cleared. Returns the number of packets read.
    pub fn run(
        mut self,
        sender: Sender<Segment>,
        running: Arc<AtomicBool>,
    ) -> Result<u64, CaptureError> {
        let mut packets = 0u64;
        while running.load(Ordering::SeqCst) {
            match self.cap.next_packet() {
                Ok(packet) => {
                    packets += 1;
                    let at = packet_time(packet.header);
                    let Some(segment) = parse_segment(self.link, at, packet.data) else {
                        continue;
                    };
                    if sender.send(segment).is_err() {
                        debug!("segment receiver gone, stopping capture");
                        break;
                    }
                }
                Err(pcap::Error::TimeoutExpired) => continue,
                Err(pcap::Error::NoMorePackets) => {
                    info!(packets, "end of capture");
                    break;
                }
                Err(e) => return Err(CaptureError::Read(e)),
            }
        }
        Ok(packets)
    }
}

fn create_capture(interface: &str, snaplen: i32) -> Result<Capture<pcap::Active>, CaptureError> {
    let open_err = |source| CaptureError::Open {
        interface: interface.to_string(),
        source,
    };

    Capture::from_device(interface)
        .map_err(open_err)?
        .promisc(false)
        .snaplen(snaplen)
        .timeout(READ_TIMEOUT_MS)
        .immediate_mode(true)
        .open()
        .map_err(open_err)
}

fn open_file(path: &Path) -> Result<Capture<pcap::Offline>, CaptureError> {
    Capture::from_file(path).map_err(|source| CaptureError::OpenFile {
        path: path.to_path_buf(),
        source,
    })
}
