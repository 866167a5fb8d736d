//! Live NFS traffic monitor.
//!
//! Captured TCP segments are reassembled per connection and direction,
//! ONC-RPC calls are framed and decoded into [`nfs::NfsRequest`]s, and on
//! every refresh the collected requests are grouped into a ranked
//! [`aggregate::Term`] for display.

pub mod aggregate;
pub mod collector;
pub mod config;
pub mod error;
pub mod monitor;
pub mod nfs;
pub mod rpc;
pub mod sniff;
pub mod stream;
pub mod ui;
pub mod users;

#[cfg(test)]
pub(crate) mod testutil;

pub use aggregate::{aggregate, aggregate_by, Selection, SharedSelection, Term};
pub use collector::Collector;
pub use error::{CaptureError, DecodeError, NfstopError, UiError};
pub use monitor::{Monitor, Tick};
pub use nfs::{Decoder, NfsRequest};
pub use stream::{ConnectionKey, ConnectionTracker, Direction};
