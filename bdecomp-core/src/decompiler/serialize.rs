//! Block Persistence
//!
//! Tag-length-value serialization of basic blocks. Every field is a
//! little-endian `(fid: u16, len: u32, payload)` record, so a reader that
//! does not know a field can always skip it by the encoded length.
//! A block is `BB_TYPE` (one byte of kind), `BB_OUTEDGES` (count-prefixed
//! list of 4-byte block indices), one `BB_RTL` per RTL, and a zero-length
//! `BB_END`.
//!
//! Deserialization restores out-edge *indices*; [`load_graph`] runs the
//! link pass that resolves them to block references and rebuilds the
//! in-edge lists.

use crate::decompiler::cfg::{BasicBlock, BlockId, BlockKind, ControlFlowGraph};
use crate::decompiler::error::DecompilerError;
use crate::decompiler::ssl::{
    BranchKind, Expr, Rtl, Stmt, StmtKind, SwitchForm, SwitchInfo, UnaryOp,
};

const FID_BB_TYPE: u16 = 0x0020;
const FID_BB_OUTEDGES: u16 = 0x0021;
const FID_BB_RTL: u16 = 0x0022;
const FID_BB_END: u16 = 0x0023;

const STAG_ASSIGN: u8 = 0;
const STAG_PHI: u8 = 1;
const STAG_BRANCH: u8 = 2;
const STAG_CALL: u8 = 3;
const STAG_CASE: u8 = 4;
const STAG_RETURN: u8 = 5;
const STAG_OTHER: u8 = 6;

const ETAG_CONST: u8 = 0;
const ETAG_LOC: u8 = 1;
const ETAG_UNARY: u8 = 2;
const ETAG_BINARY: u8 = 3;
const ETAG_SUBSCRIPT: u8 = 4;

/// A block as restored from a stream, with its out-edges still in index
/// form awaiting the link pass.
#[derive(Debug, Clone)]
pub struct PendingBlock {
    pub kind: BlockKind,
    pub rtls: Vec<Rtl>,
    pub out_edges: Vec<u32>,
}

// ---- writing ------------------------------------------------------------

fn put_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_i64(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_field(buf: &mut Vec<u8>, fid: u16, payload: &[u8]) {
    put_u16(buf, fid);
    put_u32(buf, payload.len() as u32);
    buf.extend_from_slice(payload);
}

fn put_expr(buf: &mut Vec<u8>, e: &Expr) {
    match e {
        Expr::Const(c) => {
            buf.push(ETAG_CONST);
            put_i64(buf, *c);
        }
        Expr::Loc(name) => {
            buf.push(ETAG_LOC);
            put_u32(buf, name.len() as u32);
            buf.extend_from_slice(name.as_bytes());
        }
        Expr::Unary(op, inner) => {
            buf.push(ETAG_UNARY);
            buf.push(*op as u8);
            put_expr(buf, inner);
        }
        Expr::Binary(op, l, r) => {
            buf.push(ETAG_BINARY);
            buf.push(*op as u8);
            put_expr(buf, l);
            put_expr(buf, r);
        }
        Expr::Subscript(base, def) => {
            buf.push(ETAG_SUBSCRIPT);
            put_expr(buf, base);
            put_u32(buf, *def);
        }
    }
}

fn put_stmt(buf: &mut Vec<u8>, s: &Stmt) {
    put_u32(buf, s.number);
    match &s.kind {
        StmtKind::Assign { lhs, rhs } => {
            buf.push(STAG_ASSIGN);
            put_expr(buf, lhs);
            put_expr(buf, rhs);
        }
        StmtKind::Phi { lhs, args } => {
            buf.push(STAG_PHI);
            put_expr(buf, lhs);
            put_u32(buf, args.len() as u32);
            for arg in args {
                match arg {
                    Some(def) => {
                        buf.push(1);
                        put_u32(buf, *def);
                    }
                    None => buf.push(0),
                }
            }
        }
        StmtKind::Branch { kind, cond } => {
            buf.push(STAG_BRANCH);
            buf.push(*kind as u8);
            put_expr(buf, cond);
        }
        StmtKind::Call { dest } => {
            buf.push(STAG_CALL);
            match dest {
                Some(addr) => {
                    buf.push(1);
                    put_u32(buf, *addr);
                }
                None => buf.push(0),
            }
        }
        StmtKind::Case(info) => {
            buf.push(STAG_CASE);
            put_expr(buf, &info.switch_var);
            put_i64(buf, info.lower);
            put_i64(buf, info.upper);
            buf.push(info.form as u8);
        }
        StmtKind::Return { value } => {
            buf.push(STAG_RETURN);
            match value {
                Some(v) => {
                    buf.push(1);
                    put_expr(buf, v);
                }
                None => buf.push(0),
            }
        }
        StmtKind::Other => buf.push(STAG_OTHER),
    }
}

fn put_rtl(buf: &mut Vec<u8>, rtl: &Rtl) {
    put_u32(buf, rtl.addr);
    put_u32(buf, rtl.stmts.len() as u32);
    for s in &rtl.stmts {
        put_stmt(buf, s);
    }
}

/// Serialize one block to its TLV form. Out-edges are stored as arena
/// indices, so the stream is position-independent.
pub fn serialize_block(bb: &BasicBlock) -> Vec<u8> {
    let mut out = Vec::new();

    put_field(&mut out, FID_BB_TYPE, &[bb.kind() as u8]);

    if !bb.out_edges().is_empty() {
        let mut payload = Vec::new();
        put_u32(&mut payload, bb.out_edges().len() as u32);
        for e in bb.out_edges() {
            put_u32(&mut payload, e.0);
        }
        put_field(&mut out, FID_BB_OUTEDGES, &payload);
    }

    for rtl in bb.rtls() {
        let mut payload = Vec::new();
        put_rtl(&mut payload, rtl);
        put_field(&mut out, FID_BB_RTL, &payload);
    }

    put_field(&mut out, FID_BB_END, &[]);
    out
}

// ---- reading ------------------------------------------------------------

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Reader<'a> {
        Reader { buf, pos: 0 }
    }

    fn need(&self, n: usize) -> Result<(), DecompilerError> {
        if self.pos + n > self.buf.len() {
            return Err(DecompilerError::Deserialize(format!(
                "truncated stream: need {} bytes at offset {}",
                n, self.pos
            )));
        }
        Ok(())
    }

    fn u8(&mut self) -> Result<u8, DecompilerError> {
        self.need(1)?;
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    fn u16(&mut self) -> Result<u16, DecompilerError> {
        self.need(2)?;
        let v = u16::from_le_bytes([self.buf[self.pos], self.buf[self.pos + 1]]);
        self.pos += 2;
        Ok(v)
    }

    fn u32(&mut self) -> Result<u32, DecompilerError> {
        self.need(4)?;
        let mut b = [0u8; 4];
        b.copy_from_slice(&self.buf[self.pos..self.pos + 4]);
        self.pos += 4;
        Ok(u32::from_le_bytes(b))
    }

    fn i64(&mut self) -> Result<i64, DecompilerError> {
        self.need(8)?;
        let mut b = [0u8; 8];
        b.copy_from_slice(&self.buf[self.pos..self.pos + 8]);
        self.pos += 8;
        Ok(i64::from_le_bytes(b))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecompilerError> {
        self.need(n)?;
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }
}

fn read_expr(r: &mut Reader) -> Result<Expr, DecompilerError> {
    use crate::decompiler::ssl::BinaryOp;
    let tag = r.u8()?;
    Ok(match tag {
        ETAG_CONST => Expr::Const(r.i64()?),
        ETAG_LOC => {
            let len = r.u32()? as usize;
            let bytes = r.take(len)?;
            let name = std::str::from_utf8(bytes)
                .map_err(|_| DecompilerError::Deserialize("non-utf8 location name".into()))?;
            Expr::Loc(name.to_string())
        }
        ETAG_UNARY => {
            let op = match r.u8()? {
                0 => UnaryOp::Not,
                1 => UnaryOp::Neg,
                v => {
                    return Err(DecompilerError::Deserialize(format!(
                        "unknown unary operator {}",
                        v
                    )))
                }
            };
            Expr::Unary(op, Box::new(read_expr(r)?))
        }
        ETAG_BINARY => {
            let raw = r.u8()?;
            let op = [
                BinaryOp::Add,
                BinaryOp::Sub,
                BinaryOp::Mul,
                BinaryOp::And,
                BinaryOp::Or,
                BinaryOp::Eq,
                BinaryOp::Ne,
                BinaryOp::Lt,
                BinaryOp::Le,
                BinaryOp::Gt,
                BinaryOp::Ge,
                BinaryOp::LtU,
                BinaryOp::LeU,
                BinaryOp::GtU,
                BinaryOp::GeU,
            ]
            .get(raw as usize)
            .copied()
            .ok_or_else(|| {
                DecompilerError::Deserialize(format!("unknown binary operator {}", raw))
            })?;
            let l = read_expr(r)?;
            let right = read_expr(r)?;
            Expr::Binary(op, Box::new(l), Box::new(right))
        }
        ETAG_SUBSCRIPT => {
            let base = read_expr(r)?;
            Expr::Subscript(Box::new(base), r.u32()?)
        }
        v => {
            return Err(DecompilerError::Deserialize(format!(
                "unknown expression tag {}",
                v
            )))
        }
    })
}

fn read_branch_kind(v: u8) -> Result<BranchKind, DecompilerError> {
    use BranchKind::*;
    [Je, Jne, Jl, Jg, Jle, Jge, Jult, Jugt, Jule, Juge, Jneg, Jof]
        .get(v as usize)
        .copied()
        .ok_or_else(|| DecompilerError::Deserialize(format!("unknown branch kind {}", v)))
}

fn read_stmt(r: &mut Reader) -> Result<Stmt, DecompilerError> {
    let number = r.u32()?;
    let tag = r.u8()?;
    let kind = match tag {
        STAG_ASSIGN => StmtKind::Assign {
            lhs: read_expr(r)?,
            rhs: read_expr(r)?,
        },
        STAG_PHI => {
            let lhs = read_expr(r)?;
            let n = r.u32()? as usize;
            let mut args = Vec::with_capacity(n);
            for _ in 0..n {
                args.push(if r.u8()? != 0 { Some(r.u32()?) } else { None });
            }
            StmtKind::Phi { lhs, args }
        }
        STAG_BRANCH => {
            let kind = read_branch_kind(r.u8()?)?;
            StmtKind::Branch {
                kind,
                cond: read_expr(r)?,
            }
        }
        STAG_CALL => StmtKind::Call {
            dest: if r.u8()? != 0 { Some(r.u32()?) } else { None },
        },
        STAG_CASE => {
            let switch_var = read_expr(r)?;
            let lower = r.i64()?;
            let upper = r.i64()?;
            let form = match r.u8()? {
                0 => SwitchForm::Absolute,
                1 => SwitchForm::Offset,
                2 => SwitchForm::Indirect,
                v => {
                    return Err(DecompilerError::Deserialize(format!(
                        "unknown switch form {}",
                        v
                    )))
                }
            };
            StmtKind::Case(SwitchInfo {
                switch_var,
                lower,
                upper,
                form,
            })
        }
        STAG_RETURN => StmtKind::Return {
            value: if r.u8()? != 0 {
                Some(read_expr(r)?)
            } else {
                None
            },
        },
        STAG_OTHER => StmtKind::Other,
        v => {
            return Err(DecompilerError::Deserialize(format!(
                "unknown statement tag {}",
                v
            )))
        }
    };
    Ok(Stmt::new(number, kind))
}

fn read_rtl(payload: &[u8]) -> Result<Rtl, DecompilerError> {
    let mut r = Reader::new(payload);
    let addr = r.u32()?;
    let n = r.u32()? as usize;
    let mut rtl = Rtl::new(addr);
    for _ in 0..n {
        rtl.append_stmt(read_stmt(&mut r)?);
    }
    Ok(rtl)
}

/// Restore one block from the head of `buf`. Returns the block (with
/// out-edges still as indices) and the number of bytes consumed.
///
/// Unknown fields are skipped by their encoded length; an RTL that fails
/// to parse is dropped with a warning. Neither is fatal.
pub fn deserialize_block(buf: &[u8]) -> Result<(PendingBlock, usize), DecompilerError> {
    let mut r = Reader::new(buf);
    let mut kind = BlockKind::Invalid;
    let mut rtls = Vec::new();
    let mut out_edges = Vec::new();

    loop {
        let fid = r.u16()?;
        let len = r.u32()? as usize;
        match fid {
            FID_BB_END => {
                if len != 0 {
                    return Err(DecompilerError::Deserialize(
                        "BB_END with nonzero length".into(),
                    ));
                }
                break;
            }
            FID_BB_TYPE => {
                if len != 1 {
                    return Err(DecompilerError::Deserialize(format!(
                        "BB_TYPE with length {}",
                        len
                    )));
                }
                let v = r.u8()?;
                kind = BlockKind::from_u8(v).ok_or_else(|| {
                    DecompilerError::Deserialize(format!("unknown block kind {}", v))
                })?;
            }
            FID_BB_OUTEDGES => {
                let payload = r.take(len)?;
                let mut pr = Reader::new(payload);
                let n = pr.u32()? as usize;
                if len != 4 + 4 * n {
                    return Err(DecompilerError::Deserialize(format!(
                        "BB_OUTEDGES length {} does not match count {}",
                        len, n
                    )));
                }
                for _ in 0..n {
                    out_edges.push(pr.u32()?);
                }
            }
            FID_BB_RTL => {
                let payload = r.take(len)?;
                match read_rtl(payload) {
                    Ok(rtl) => rtls.push(rtl),
                    Err(err) => {
                        log::warn!("skipping unreadable RTL: {}", err);
                    }
                }
            }
            unknown => {
                log::debug!("skipping unknown block field 0x{:04x} ({} bytes)", unknown, len);
                r.take(len)?;
            }
        }
    }

    Ok((
        PendingBlock {
            kind,
            rtls,
            out_edges,
        },
        r.pos,
    ))
}

/// Serialize a whole graph: block count, entry index, then each block's
/// TLV stream in arena order.
pub fn save_graph(cfg: &ControlFlowGraph) -> Vec<u8> {
    let mut out = Vec::new();
    put_u32(&mut out, cfg.num_blocks() as u32);
    put_u32(&mut out, cfg.entry().map(|e| e.0).unwrap_or(u32::MAX));
    for bb in cfg.blocks() {
        out.extend_from_slice(&serialize_block(bb));
    }
    out
}

/// Restore a graph saved by [`save_graph`], then run the link pass that
/// resolves out-edge indices to block references and rebuilds in-edges.
pub fn load_graph(buf: &[u8]) -> Result<ControlFlowGraph, DecompilerError> {
    let mut r = Reader::new(buf);
    let count = r.u32()? as usize;
    let entry = r.u32()?;

    let mut pending = Vec::with_capacity(count);
    let mut rest = &buf[r.pos..];
    for _ in 0..count {
        let (block, consumed) = deserialize_block(rest)?;
        pending.push(block);
        rest = &rest[consumed..];
    }

    let mut cfg = ControlFlowGraph::new();
    for p in &pending {
        cfg.add_block(p.kind, p.rtls.clone());
    }

    // link pass: indices become references, in-edges are rebuilt
    for (i, p) in pending.iter().enumerate() {
        for &target in &p.out_edges {
            if target as usize >= count {
                return Err(DecompilerError::DanglingEdge(target));
            }
            cfg.add_edge(BlockId(i as u32), BlockId(target));
        }
    }

    if entry != u32::MAX {
        if entry as usize >= count {
            return Err(DecompilerError::DanglingEdge(entry));
        }
        cfg.set_entry(BlockId(entry));
    }

    Ok(cfg)
}
