//! Per-connection byte stream reassembly.
//!
//! Segments are appended in capture order. Sequence numbers are not
//! inspected, so reordered or retransmitted segments land in the buffer
//! as they arrive.

use crate::sniff::Segment;
use chrono::{DateTime, Duration, Utc};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::net::SocketAddr;
use tracing::{debug, warn};

/// Direction independent identifier of a TCP connection.
///
/// Both endpoints take part in the key, ordered, so a packet and its
/// reply map to the same connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    lo: SocketAddr,
    hi: SocketAddr,
}

impl ConnectionKey {
    pub fn new(a: SocketAddr, b: SocketAddr) -> Self {
        if a <= b {
            ConnectionKey { lo: a, hi: b }
        } else {
            ConnectionKey { lo: b, hi: a }
        }
    }
}

/// Which of the two byte buffers of a connection a segment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Same source port as the first packet seen on the connection
    Forward,
    Reverse,
}

impl Direction {
    pub fn index(self) -> usize {
        match self {
            Direction::Forward => 0,
            Direction::Reverse => 1,
        }
    }
}

#[derive(Debug)]
pub struct TrackedConnection {
    src_port: u16,
    buffers: [Vec<u8>; 2],
    last_seen: DateTime<Utc>,
}

impl TrackedConnection {
    fn new(src_port: u16, now: DateTime<Utc>) -> Self {
        TrackedConnection {
            src_port,
            buffers: [Vec::new(), Vec::new()],
            last_seen: now,
        }
    }

    pub fn direction_of(&self, src_port: u16) -> Direction {
        if src_port == self.src_port {
            Direction::Forward
        } else {
            Direction::Reverse
        }
    }

    pub fn buffer(&self, dir: Direction) -> &[u8] {
        &self.buffers[dir.index()]
    }

    pub fn buffer_mut(&mut self, dir: Direction) -> &mut Vec<u8> {
        &mut self.buffers[dir.index()]
    }

    fn is_idle(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        now - self.last_seen > timeout
    }
}

/// One packet's contribution to a connection, handed to the decoder.
#[derive(Debug, Clone, Copy)]
pub struct TransportEvent {
    pub timestamp: DateTime<Utc>,
    pub src: SocketAddr,
    pub dst: SocketAddr,
    pub direction: Direction,
}

#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Bytes buffered per direction before the buffer is dropped
    pub max_buffer: usize,
    pub idle_timeout: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_buffer: crate::config::DEFAULT_MAX_BUFFER,
            idle_timeout: Duration::seconds(crate::config::DEFAULT_IDLE_TIMEOUT_SECS as i64),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct TrackerStats {
    pub created: u64,
    pub expired: u64,
    pub overflowed: u64,
}

/// Owns every tracked connection. Only the event loop touches it.
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    connections: HashMap<ConnectionKey, TrackedConnection>,
    limits: Limits,
    stats: TrackerStats,
}

impl ConnectionTracker {
    pub fn new(limits: Limits) -> Self {
        ConnectionTracker {
            connections: HashMap::new(),
            limits,
            stats: TrackerStats::default(),
        }
    }

    /// Append the segment payload to its connection and report the
    /// direction it was filed under.
    pub fn observe(&mut self, seg: &Segment) -> (TransportEvent, &mut TrackedConnection) {
        let key = ConnectionKey::new(seg.src, seg.dst);
        let Limits { max_buffer, idle_timeout } = self.limits;

        let conn = match self.connections.entry(key) {
            Entry::Occupied(entry) => {
                let conn = entry.into_mut();
                if conn.is_idle(seg.timestamp, idle_timeout) {
                    debug!(?key, "connection idle past timeout, starting over");
                    *conn = TrackedConnection::new(seg.src.port(), seg.timestamp);
                    self.stats.expired += 1;
                    self.stats.created += 1;
                }
                conn
            }
            Entry::Vacant(entry) => {
                self.stats.created += 1;
                entry.insert(TrackedConnection::new(seg.src.port(), seg.timestamp))
            }
        };

        let direction = conn.direction_of(seg.src.port());
        if seg.timestamp > conn.last_seen {
            conn.last_seen = seg.timestamp;
        }

        let buf = conn.buffer_mut(direction);
        if buf.len() + seg.payload.len() > max_buffer {
            warn!(
                ?key,
                buffered = buf.len(),
                limit = max_buffer,
                "reassembly buffer over limit, discarding"
            );
            buf.clear();
            self.stats.overflowed += 1;
        }
        buf.extend_from_slice(&seg.payload);

        let event = TransportEvent {
            timestamp: seg.timestamp,
            src: seg.src,
            dst: seg.dst,
            direction,
        };
        (event, conn)
    }

    /// Drop connections that have been quiet for longer than the idle timeout.
    pub fn expire(&mut self, now: DateTime<Utc>) -> usize {
        let timeout = self.limits.idle_timeout;
        let before = self.connections.len();
        self.connections.retain(|_, conn| !conn.is_idle(now, timeout));
        let removed = before - self.connections.len();
        if removed > 0 {
            debug!(removed, remaining = self.connections.len(), "expired idle connections");
            self.stats.expired += removed as u64;
        }
        removed
    }

    pub fn get(&self, key: &ConnectionKey) -> Option<&TrackedConnection> {
        self.connections.get(key)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn stats(&self) -> TrackerStats {
        self.stats
    }
}
