//! Error types for nfstop
//!
//! Capture and terminal failures are fatal and surface in `main`. Decode
//! failures stay inside the decoder: live capture guarantees neither
//! well-formed nor complete data, so they are counted and skipped.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type
#[derive(Error, Debug)]
pub enum NfstopError {
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("terminal error: {0}")]
    Ui(#[from] UiError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Packet capture setup and read errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("failed to open interface '{interface}': {source}")]
    Open {
        interface: String,
        #[source]
        source: pcap::Error,
    },

    #[error("failed to open capture file '{}': {source}", path.display())]
    OpenFile {
        path: PathBuf,
        #[source]
        source: pcap::Error,
    },

    #[error("invalid capture filter '{filter}': {source}")]
    Filter {
        filter: String,
        #[source]
        source: pcap::Error,
    },

    #[error("failed to list interfaces: {0}")]
    List(#[source] pcap::Error),

    #[error("capture read failed: {0}")]
    Read(#[source] pcap::Error),
}

/// Reasons a single ONC-RPC record could not be decoded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("record truncated at offset {offset} (need {needed} more bytes)")]
    Truncated { offset: usize, needed: usize },

    #[error("unknown message type {0}")]
    MessageType(u32),

    #[error("unsupported RPC version {0}")]
    RpcVersion(u32),

    #[error("record length {len} exceeds limit {limit}")]
    RecordTooLarge { len: usize, limit: usize },

    #[error("empty fragment at offset {offset} is not the last of its record")]
    EmptyFragment { offset: usize },

    #[error("unsupported version {version} of program {program}")]
    ProgramVersion { program: u32, version: u32 },

    #[error("opaque length {0} is implausible")]
    OpaqueLength(u32),
}

/// Terminal setup and drawing errors
#[derive(Error, Debug)]
pub enum UiError {
    #[error("failed to initialize terminal: {0}")]
    Init(#[source] std::io::Error),

    #[error("failed to draw: {0}")]
    Draw(#[source] std::io::Error),

    #[error("failed to read terminal event: {0}")]
    Event(#[source] std::io::Error),
}
