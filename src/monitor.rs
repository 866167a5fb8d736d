//! The event loop that owns all decode state.
//!
//! Packets, refresh ticks and shutdown are serviced from one thread, so
//! the connection tracker and collector need no locking.

use crate::aggregate::{aggregate, Selection, SharedSelection, Term};
use crate::collector::Collector;
use crate::nfs::{DecodeStats, Decoder};
use crate::sniff::Segment;
use crate::stream::{ConnectionTracker, TrackerStats};
use chrono::{DateTime, Local, Utc};
use crossbeam_channel::{select, tick, Receiver, Sender};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

/// One refresh worth of results.
#[derive(Debug, Clone, Serialize)]
pub struct Tick {
    pub at: DateTime<Local>,
    pub selection: Selection,
    pub term: Term,
    /// TCP segments seen since start
    pub segments: u64,
    pub connections: usize,
    pub decoder: DecodeStats,
    pub tracker: TrackerStats,
}

pub struct Monitor {
    tracker: ConnectionTracker,
    decoder: Decoder,
    collector: Collector,
    selection: SharedSelection,
    segments: u64,
    /// Newest capture timestamp, the clock for idle expiry
    latest: Option<DateTime<Utc>>,
}

impl Monitor {
    pub fn new(tracker: ConnectionTracker, decoder: Decoder, selection: SharedSelection) -> Self {
        Monitor {
            tracker,
            decoder,
            collector: Collector::new(),
            selection,
            segments: 0,
            latest: None,
        }
    }

    pub fn on_segment(&mut self, segment: Segment) {
        self.segments += 1;
        if self.latest.map_or(true, |t| segment.timestamp > t) {
            self.latest = Some(segment.timestamp);
        }

        let (event, conn) = self.tracker.observe(&segment);
        self.decoder
            .decode(conn.buffer_mut(event.direction), &event, &mut self.collector);
    }

    /// Drain the collector and aggregate it with the current selection.
    pub fn on_tick(&mut self) -> Tick {
        if let Some(now) = self.latest {
            self.tracker.expire(now);
        }

        let drained = self.collector.take();
        let selection = self.selection.get();
        let term = aggregate(drained.as_slice(), selection);
        debug!(requests = term.sum(), keys = term.len(), %selection, "refresh");

        Tick {
            at: Local::now(),
            selection,
            term,
            segments: self.segments,
            connections: self.tracker.len(),
            decoder: self.decoder.stats(),
            tracker: self.tracker.stats(),
        }
    }

    pub fn pending(&self) -> usize {
        self.collector.len()
    }
}

/// Run until shutdown, end of input, or the tick receiver going away.
///
/// At end of input a final tick is sent so the last partial window is
/// not lost.
pub fn run(
    mut monitor: Monitor,
    segments: Receiver<Segment>,
    shutdown: Receiver<()>,
    interval: Duration,
    ticks: Sender<Tick>,
) {
    let ticker = tick(interval);
    loop {
        select! {
            recv(segments) -> msg => match msg {
                Ok(segment) => monitor.on_segment(segment),
                Err(_) => {
                    info!("end of input");
                    let _ = ticks.send(monitor.on_tick());
                    break;
                }
            },
            recv(ticker) -> _ => {
                if ticks.send(monitor.on_tick()).is_err() {
                    debug!("tick receiver gone");
                    break;
                }
            },
            recv(shutdown) -> _ => {
                info!("shutdown requested");
                break;
            },
        }
    }
}
