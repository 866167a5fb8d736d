//! NFS requests decoded from reassembled RPC streams.

use crate::collector::Collector;
use crate::error::DecodeError;
use crate::rpc::{self, CallHeader, Credential, Framing, Message, XdrReader};
use crate::stream::TransportEvent;
use crate::users::UserNames;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::SocketAddr;
use tracing::{debug, warn};

pub const NFS_PROGRAM: u32 = 100003;
pub const MOUNT_PROGRAM: u32 = 100005;

/// Marker for procedure numbers outside the known tables
pub const UNKNOWN: &str = "unknown";

/// Largest record the decoder is willing to wait for
pub const DEFAULT_RECORD_LIMIT: usize = 4 * 1024 * 1024;

const NFS2_PROCS: [&str; 18] = [
    "NULL", "GETATTR", "SETATTR", "ROOT", "LOOKUP", "READLINK", "READ", "WRITECACHE", "WRITE",
    "CREATE", "REMOVE", "RENAME", "LINK", "SYMLINK", "MKDIR", "RMDIR", "READDIR", "STATFS",
];

const NFS3_PROCS: [&str; 22] = [
    "NULL", "GETATTR", "SETATTR", "LOOKUP", "ACCESS", "READLINK", "READ", "WRITE", "CREATE",
    "MKDIR", "SYMLINK", "MKNOD", "REMOVE", "RMDIR", "RENAME", "LINK", "READDIR", "READDIRPLUS",
    "FSSTAT", "FSINFO", "PATHCONF", "COMMIT",
];

const MOUNT_PROCS: [&str; 6] = [
    "MOUNT_NULL",
    "MOUNT_MNT",
    "MOUNT_DUMP",
    "MOUNT_UMNT",
    "MOUNT_UMNTALL",
    "MOUNT_EXPORT",
];

/// NFSv4.x operations, starting at OP_ACCESS (3)
const NFS4_OPS: [&str; 73] = [
    "ACCESS", "CLOSE", "COMMIT", "CREATE", "DELEGPURGE", "DELEGRETURN", "GETATTR", "GETFH",
    "LINK", "LOCK", "LOCKT", "LOCKU", "LOOKUP", "LOOKUPP", "NVERIFY", "OPEN", "OPENATTR",
    "OPEN_CONFIRM", "OPEN_DOWNGRADE", "PUTFH", "PUTPUBFH", "PUTROOTFH", "READ", "READDIR",
    "READLINK", "REMOVE", "RENAME", "RENEW", "RESTOREFH", "SAVEFH", "SECINFO", "SETATTR",
    "SETCLIENTID", "SETCLIENTID_CONFIRM", "VERIFY", "WRITE", "RELEASE_LOCKOWNER",
    // 4.1
    "BACKCHANNEL_CTL", "BIND_CONN_TO_SESSION", "EXCHANGE_ID", "CREATE_SESSION",
    "DESTROY_SESSION", "FREE_STATEID", "GET_DIR_DELEGATION", "GETDEVICEINFO", "GETDEVICELIST",
    "LAYOUTCOMMIT", "LAYOUTGET", "LAYOUTRETURN", "SECINFO_NO_NAME", "SEQUENCE", "SET_SSV",
    "TEST_STATEID", "WANT_DELEGATION", "DESTROY_CLIENTID", "RECLAIM_COMPLETE",
    // 4.2
    "ALLOCATE", "COPY", "COPY_NOTIFY", "DEALLOCATE", "IO_ADVISE", "LAYOUTERROR", "LAYOUTSTATS",
    "OFFLOAD_CANCEL", "OFFLOAD_STATUS", "READ_PLUS", "SEEK", "WRITE_SAME", "CLONE",
    // RFC 8276
    "GETXATTR", "SETXATTR", "LISTXATTRS", "REMOVEXATTR",
];

const NFS4_FIRST_OP: u32 = 3;
const OP_PUTFH: u32 = 22;
const OP_PUTPUBFH: u32 = 23;
const OP_PUTROOTFH: u32 = 24;
const OP_SEQUENCE: u32 = 53;
const OP_ILLEGAL: u32 = 10044;

const NFS4_FHSIZE: u32 = 128;
const NFS4_MAX_TAG: u32 = 1024;
/// sessionid, sequenceid, slotid, highest_slotid, cachethis
const SEQUENCE_ARGS_LEN: usize = 16 + 4 * 4;

fn lookup(table: &[&'static str], index: u32) -> &'static str {
    table.get(index as usize).copied().unwrap_or(UNKNOWN)
}

pub fn nfs4_op_name(op: u32) -> &'static str {
    match op {
        OP_ILLEGAL => "ILLEGAL",
        op if op >= NFS4_FIRST_OP => lookup(&NFS4_OPS, op - NFS4_FIRST_OP),
        _ => UNKNOWN,
    }
}

/// Human readable name of a call, or an error when the program version is
/// not one we know how to read.
pub fn operation_name(call: &CallHeader<'_>) -> Result<&'static str, DecodeError> {
    let unsupported = DecodeError::ProgramVersion {
        program: call.program,
        version: call.version,
    };
    match (call.program, call.version) {
        (NFS_PROGRAM, 2) => Ok(lookup(&NFS2_PROCS, call.procedure)),
        (NFS_PROGRAM, 3) => Ok(lookup(&NFS3_PROCS, call.procedure)),
        (NFS_PROGRAM, 4) => Ok(match call.procedure {
            0 => "NULL",
            1 => compound_operation(call.args),
            _ => UNKNOWN,
        }),
        (MOUNT_PROGRAM, 1..=3) => Ok(lookup(&MOUNT_PROCS, call.procedure)),
        _ => Err(unsupported),
    }
}

/// Label a COMPOUND by its first operation that does more than set up
/// the session or current filehandle.
pub fn compound_operation(args: &[u8]) -> &'static str {
    let mut label = "COMPOUND";
    if let Err(e) = scan_compound(args, &mut label) {
        debug!(error = %e, label, "compound arguments cut short");
    }
    label
}

fn scan_compound(args: &[u8], label: &mut &'static str) -> Result<(), DecodeError> {
    let mut r = XdrReader::new(args);
    r.opaque(NFS4_MAX_TAG)?;
    let _minor = r.u32()?;
    let count = r.u32()?;
    for _ in 0..count {
        let op = r.u32()?;
        *label = nfs4_op_name(op);
        match op {
            OP_SEQUENCE => r.skip(SEQUENCE_ARGS_LEN)?,
            OP_PUTFH => {
                r.opaque(NFS4_FHSIZE)?;
            }
            OP_PUTROOTFH | OP_PUTPUBFH => {}
            _ => break,
        }
    }
    Ok(())
}

/// A decoded call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NfsRequest {
    pub timestamp: DateTime<Utc>,
    pub xid: u32,
    pub client: SocketAddr,
    pub server: SocketAddr,
    pub program: u32,
    pub version: u32,
    pub procedure: u32,
    pub operation: &'static str,
    pub credential: Credential,
    /// Display form of the credential, a login name when one is known
    pub user: String,
}

impl NfsRequest {
    pub fn client(&self) -> String {
        self.client.ip().to_string()
    }

    pub fn server(&self) -> String {
        self.server.ip().to_string()
    }

    pub fn op_code(&self) -> &'static str {
        self.operation
    }

    pub fn cred(&self) -> &str {
        &self.user
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DecodeStats {
    /// Complete records framed
    pub records: u64,
    pub calls: u64,
    pub replies: u64,
    /// Calls for programs other than NFS and MOUNT
    pub other_programs: u64,
    pub malformed: u64,
    /// Buffers thrown away because the framing could not be trusted
    pub discarded: u64,
}

/// Turns reassembled bytes into [`NfsRequest`]s.
#[derive(Debug)]
pub struct Decoder {
    record_limit: usize,
    users: Option<UserNames>,
    stats: DecodeStats,
}

impl Default for Decoder {
    fn default() -> Self {
        Decoder::new(DEFAULT_RECORD_LIMIT, None)
    }
}

impl Decoder {
    pub fn new(record_limit: usize, users: Option<UserNames>) -> Self {
        Decoder {
            record_limit,
            users,
            stats: DecodeStats::default(),
        }
    }

    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    /// Consume every complete record at the front of `buf`, pushing calls
    /// into `collector`. A trailing partial record stays in `buf`.
    pub fn decode(&mut self, buf: &mut Vec<u8>, event: &TransportEvent, collector: &mut Collector) {
        let mut consumed = 0;
        let mut lost = None;
        loop {
            match rpc::next_record(&buf[consumed..], self.record_limit) {
                Ok(Framing::Incomplete) => break,
                Ok(Framing::Record { consumed: len, body }) => {
                    self.stats.records += 1;
                    match self.request(&body, event) {
                        Ok(Some(request)) => collector.push(request),
                        Ok(None) => {}
                        Err(e) => {
                            self.stats.malformed += 1;
                            debug!(
                                src = %event.src,
                                dst = %event.dst,
                                error = %e,
                                "skipping malformed record"
                            );
                        }
                    }
                    consumed += len;
                }
                Err(e) => {
                    lost = Some(e);
                    break;
                }
            }
        }

        if let Some(e) = lost {
            self.stats.discarded += 1;
            warn!(
                src = %event.src,
                dst = %event.dst,
                buffered = buf.len(),
                error = %e,
                "record marking lost, dropping buffer"
            );
            buf.clear();
            return;
        }
        buf.drain(..consumed);
    }

    fn request(
        &mut self,
        body: &[u8],
        event: &TransportEvent,
    ) -> Result<Option<NfsRequest>, DecodeError> {
        let call = match rpc::parse_message(body)? {
            Message::Call(call) => call,
            Message::Reply { .. } => {
                self.stats.replies += 1;
                return Ok(None);
            }
        };

        if call.program != NFS_PROGRAM && call.program != MOUNT_PROGRAM {
            self.stats.other_programs += 1;
            return Ok(None);
        }
        let operation = operation_name(&call)?;
        self.stats.calls += 1;

        let user = self.display_user(&call.credential);
        Ok(Some(NfsRequest {
            timestamp: event.timestamp,
            xid: call.xid,
            // the sender of a call is the client
            client: event.src,
            server: event.dst,
            program: call.program,
            version: call.version,
            procedure: call.procedure,
            operation,
            credential: call.credential,
            user,
        }))
    }

    fn display_user(&self, credential: &Credential) -> String {
        match (credential, &self.users) {
            (Credential::Sys(sys), Some(users)) => match users.name(sys.uid) {
                Some(name) => name.to_string(),
                None => sys.uid.to_string(),
            },
            _ => credential.to_string(),
        }
    }
}
