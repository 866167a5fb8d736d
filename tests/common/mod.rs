#![allow(dead_code)]

#[path = "../../src/testutil.rs"]
mod testutil;

pub use testutil::*;

use chrono::{DateTime, Utc};
use nfstop::sniff::Segment;

pub const CLIENT: &str = "192.168.10.21:1021";
pub const SERVER: &str = "192.168.10.2:2049";

pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
}

pub fn segment(src: &str, dst: &str, payload: &[u8]) -> Segment {
    Segment {
        timestamp: at(0),
        src: src.parse().unwrap(),
        dst: dst.parse().unwrap(),
        payload: payload.to_vec(),
    }
}

pub fn call(payload: &[u8]) -> Segment {
    segment(CLIENT, SERVER, payload)
}

pub fn reply(payload: &[u8]) -> Segment {
    segment(SERVER, CLIENT, payload)
}
