//! ONC-RPC (RFC 5531) over a stream transport.
//!
//! Each message is carried in one or more fragments, every fragment
//! prefixed by a 4 byte record mark: the high bit flags the last fragment
//! of the record and the low 31 bits give the fragment length.

use crate::error::DecodeError;
use serde::Serialize;
use std::borrow::Cow;
use std::fmt;

pub const RPC_VERSION: u32 = 2;

pub const MSG_CALL: u32 = 0;
pub const MSG_REPLY: u32 = 1;

pub const AUTH_NONE: u32 = 0;
pub const AUTH_SYS: u32 = 1;
pub const AUTH_DH: u32 = 3;
pub const RPCSEC_GSS: u32 = 6;

pub const LAST_FRAGMENT: u32 = 0x8000_0000;
const FRAGMENT_LEN_MASK: u32 = 0x7fff_ffff;

/// Upper bound of a credential or verifier body
const MAX_AUTH_BYTES: u32 = 400;
const MAX_MACHINE_NAME: u32 = 255;
const MAX_AUX_GIDS: u32 = 16;

pub const RECORD_MARK_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordMark {
    pub last: bool,
    pub len: usize,
}

impl RecordMark {
    pub fn parse(buf: &[u8]) -> Option<RecordMark> {
        let raw = u32::from_be_bytes(buf.get(..RECORD_MARK_LEN)?.try_into().ok()?);
        Some(RecordMark {
            last: raw & LAST_FRAGMENT != 0,
            len: (raw & FRAGMENT_LEN_MASK) as usize,
        })
    }
}

/// Outcome of looking for the next record at the front of a buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum Framing<'a> {
    /// Not enough bytes yet; nothing may be consumed.
    Incomplete,
    /// A complete record. `consumed` covers every record mark and fragment.
    Record { consumed: usize, body: Cow<'a, [u8]> },
}

/// Find the first complete record in `buf`.
///
/// Fragments are collected until one carries the last-fragment bit. A
/// record whose size on the wire, record marks included, exceeds `limit`
/// is reported as an error so the caller can drop the buffer instead of
/// waiting for bytes that will never make sense. So is an empty fragment
/// that does not end its record: no sender emits one, and a run of them
/// would otherwise never reach the limit.
pub fn next_record(buf: &[u8], limit: usize) -> Result<Framing<'_>, DecodeError> {
    let mut offset = 0;
    let mut total = 0usize;
    let mut fragments = Vec::new();

    loop {
        let Some(mark) = RecordMark::parse(&buf[offset..]) else {
            return Ok(Framing::Incomplete);
        };
        if mark.len == 0 && !mark.last {
            return Err(DecodeError::EmptyFragment { offset });
        }
        let wire = offset + RECORD_MARK_LEN + mark.len;
        if wire > limit {
            return Err(DecodeError::RecordTooLarge { len: wire, limit });
        }
        total += mark.len;

        let start = offset + RECORD_MARK_LEN;
        let end = start + mark.len;
        if buf.len() < end {
            return Ok(Framing::Incomplete);
        }
        fragments.push(start..end);
        offset = end;

        if mark.last {
            break;
        }
    }

    let body = if fragments.len() == 1 {
        Cow::Borrowed(&buf[fragments[0].clone()])
    } else {
        let mut joined = Vec::with_capacity(total);
        for range in fragments {
            joined.extend_from_slice(&buf[range]);
        }
        Cow::Owned(joined)
    };

    Ok(Framing::Record {
        consumed: offset,
        body,
    })
}

/// Cursor over XDR encoded data.
#[derive(Debug, Clone)]
pub struct XdrReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> XdrReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        XdrReader { buf, pos: 0 }
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    pub fn u32(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn skip(&mut self, len: usize) -> Result<(), DecodeError> {
        self.take(len).map(|_| ())
    }

    /// Variable length opaque: length word, bytes, padding to 4.
    pub fn opaque(&mut self, max: u32) -> Result<&'a [u8], DecodeError> {
        let len = self.u32()?;
        if len > max {
            return Err(DecodeError::OpaqueLength(len));
        }
        let len = len as usize;
        let data = self.take(len)?;
        self.take(pad(len))?;
        Ok(data)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let available = self.buf.len() - self.pos;
        if available < len {
            return Err(DecodeError::Truncated {
                offset: self.pos,
                needed: len - available,
            });
        }
        let out = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }
}

fn pad(len: usize) -> usize {
    (4 - len % 4) % 4
}

/// AUTH_SYS credential body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthSys {
    pub stamp: u32,
    pub machine: String,
    pub uid: u32,
    pub gid: u32,
    pub gids: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "flavor", rename_all = "snake_case")]
pub enum Credential {
    None,
    Sys(AuthSys),
    Gss,
    Other { code: u32 },
}

impl Credential {
    fn parse(r: &mut XdrReader<'_>) -> Result<Credential, DecodeError> {
        let flavor = r.u32()?;
        let body = r.opaque(MAX_AUTH_BYTES)?;
        match flavor {
            AUTH_NONE => Ok(Credential::None),
            AUTH_SYS => AuthSys::parse(body).map(Credential::Sys),
            RPCSEC_GSS => Ok(Credential::Gss),
            code => Ok(Credential::Other { code }),
        }
    }
}

impl AuthSys {
    fn parse(body: &[u8]) -> Result<AuthSys, DecodeError> {
        let mut r = XdrReader::new(body);
        let stamp = r.u32()?;
        let machine = String::from_utf8_lossy(r.opaque(MAX_MACHINE_NAME)?).into_owned();
        let uid = r.u32()?;
        let gid = r.u32()?;
        let count = r.u32()?;
        if count > MAX_AUX_GIDS {
            return Err(DecodeError::OpaqueLength(count));
        }
        let gids = (0..count).map(|_| r.u32()).collect::<Result<Vec<_>, _>>()?;
        Ok(AuthSys {
            stamp,
            machine,
            uid,
            gid,
            gids,
        })
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::None => f.write_str("none"),
            Credential::Sys(sys) => write!(f, "{}", sys.uid),
            Credential::Gss => f.write_str("gss"),
            Credential::Other { code } => write!(f, "flavor:{}", code),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallHeader<'a> {
    pub xid: u32,
    pub program: u32,
    pub version: u32,
    pub procedure: u32,
    pub credential: Credential,
    /// Procedure arguments following the verifier
    pub args: &'a [u8],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message<'a> {
    Call(CallHeader<'a>),
    Reply { xid: u32 },
}

/// Decode the message header of a complete record body.
pub fn parse_message(body: &[u8]) -> Result<Message<'_>, DecodeError> {
    let mut r = XdrReader::new(body);
    let xid = r.u32()?;
    match r.u32()? {
        MSG_CALL => {}
        MSG_REPLY => return Ok(Message::Reply { xid }),
        other => return Err(DecodeError::MessageType(other)),
    }

    let rpc_version = r.u32()?;
    if rpc_version != RPC_VERSION {
        return Err(DecodeError::RpcVersion(rpc_version));
    }

    let program = r.u32()?;
    let version = r.u32()?;
    let procedure = r.u32()?;
    let credential = Credential::parse(&mut r)?;

    // verifier
    r.u32()?;
    r.opaque(MAX_AUTH_BYTES)?;

    Ok(Message::Call(CallHeader {
        xid,
        program,
        version,
        procedure,
        credential,
        args: r.remaining(),
    }))
}
