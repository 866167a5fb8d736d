//! Builders for synthetic ONC-RPC traffic, shared by unit tests,
//! integration tests and benchmarks.
#![allow(dead_code)]

const NFS_PROGRAM: u32 = 100003;

#[derive(Debug, Default, Clone)]
pub struct XdrWriter {
    buf: Vec<u8>,
}

impl XdrWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u32(mut self, v: u32) -> Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn opaque(mut self, data: &[u8]) -> Self {
        self.buf.extend_from_slice(&(data.len() as u32).to_be_bytes());
        self.buf.extend_from_slice(data);
        self.buf.resize(self.buf.len() + (4 - data.len() % 4) % 4, 0);
        self
    }

    pub fn raw(mut self, data: &[u8]) -> Self {
        self.buf.extend_from_slice(data);
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

#[derive(Debug, Clone)]
pub struct CallBuilder {
    xid: u32,
    program: u32,
    version: u32,
    procedure: u32,
    flavor: u32,
    machine: String,
    uid: u32,
    gid: u32,
    gids: Vec<u32>,
    args: Vec<u8>,
}

impl CallBuilder {
    pub fn new(xid: u32, program: u32, version: u32, procedure: u32) -> Self {
        CallBuilder {
            xid,
            program,
            version,
            procedure,
            flavor: 1,
            machine: "client".to_string(),
            uid: 0,
            gid: 0,
            gids: Vec::new(),
            args: Vec::new(),
        }
    }

    pub fn nfs3(xid: u32, procedure: u32) -> Self {
        Self::new(xid, NFS_PROGRAM, 3, procedure)
    }

    pub fn nfs4_compound(xid: u32, args: Vec<u8>) -> Self {
        Self::new(xid, NFS_PROGRAM, 4, 1).args(&args)
    }

    pub fn uid(mut self, uid: u32) -> Self {
        self.uid = uid;
        self
    }

    pub fn gid(mut self, gid: u32) -> Self {
        self.gid = gid;
        self
    }

    pub fn gids(mut self, gids: &[u32]) -> Self {
        self.gids = gids.to_vec();
        self
    }

    pub fn machine(mut self, name: &str) -> Self {
        self.machine = name.to_string();
        self
    }

    pub fn auth_none(mut self) -> Self {
        self.flavor = 0;
        self
    }

    pub fn flavor(mut self, flavor: u32) -> Self {
        self.flavor = flavor;
        self
    }

    pub fn args(mut self, args: &[u8]) -> Self {
        self.args = args.to_vec();
        self
    }

    /// Message body without record marking.
    pub fn body(&self) -> Vec<u8> {
        let cred = if self.flavor == 1 {
            let mut w = XdrWriter::new()
                .u32(0)
                .opaque(self.machine.as_bytes())
                .u32(self.uid)
                .u32(self.gid)
                .u32(self.gids.len() as u32);
            for gid in &self.gids {
                w = w.u32(*gid);
            }
            w.finish()
        } else {
            Vec::new()
        };

        XdrWriter::new()
            .u32(self.xid)
            .u32(0)
            .u32(2)
            .u32(self.program)
            .u32(self.version)
            .u32(self.procedure)
            .u32(self.flavor)
            .opaque(&cred)
            .u32(0)
            .opaque(&[])
            .raw(&self.args)
            .finish()
    }

    /// Body wrapped in a single last fragment.
    pub fn record(&self) -> Vec<u8> {
        record(&self.body())
    }
}

pub fn reply_body(xid: u32) -> Vec<u8> {
    XdrWriter::new()
        .u32(xid)
        .u32(1)
        .u32(0)
        .u32(0)
        .opaque(&[])
        .u32(0)
        .finish()
}

pub fn record(body: &[u8]) -> Vec<u8> {
    let mut out = (0x8000_0000u32 | body.len() as u32).to_be_bytes().to_vec();
    out.extend_from_slice(body);
    out
}

/// Split `body` into fragments of the given sizes; the last one gets the
/// last-fragment bit.
pub fn fragmented(body: &[u8], sizes: &[usize]) -> Vec<u8> {
    assert_eq!(sizes.iter().sum::<usize>(), body.len());
    let mut out = Vec::new();
    let mut offset = 0;
    for (i, size) in sizes.iter().enumerate() {
        let mut mark = *size as u32;
        if i + 1 == sizes.len() {
            mark |= 0x8000_0000;
        }
        out.extend_from_slice(&mark.to_be_bytes());
        out.extend_from_slice(&body[offset..offset + size]);
        offset += size;
    }
    out
}

/// COMPOUND4args: tag, minorversion and the operation array.
pub fn compound_args(minor: u32, ops: &[(u32, Vec<u8>)]) -> Vec<u8> {
    let mut w = XdrWriter::new()
        .opaque(b"")
        .u32(minor)
        .u32(ops.len() as u32);
    for (op, args) in ops {
        w = w.u32(*op).raw(args);
    }
    w.finish()
}

pub fn sequence_args() -> Vec<u8> {
    XdrWriter::new()
        .raw(&[0x5a; 16])
        .u32(1)
        .u32(0)
        .u32(0)
        .u32(0)
        .finish()
}

pub fn putfh_args(fh: &[u8]) -> Vec<u8> {
    XdrWriter::new().opaque(fh).finish()
}
