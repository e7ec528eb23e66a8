//! Basic Block Model
//!
//! Per-block state for control-flow structuring: the block kind, the owned
//! RTL sequence, edge lists, and the labels written by the structuring
//! passes (orderings, loop stamps, structure classification, traversal
//! state).
//!
//! # Memory Layout
//! - Blocks are arena-allocated in [`super::ControlFlowGraph`]; every
//!   cross-block reference is a [`BlockId`] index, so the block graph has
//!   no owning cycles.
//! - `in_edges`/`out_edges` use `SmallVec<[BlockId; 2]>`; most blocks have
//!   at most two edges.
//! - Kind and traversal enums are `#[repr(u8)]`.

use std::collections::BTreeSet;
use std::fmt;

use smallvec::SmallVec;

use crate::decompiler::ssl::{Addr, Expr, Rtl, Stmt, StmtKind, SwitchInfo};

/// Stable index of a block within its owning [`super::ControlFlowGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// Sentinel for an ordering index not yet assigned.
pub const UNORDERED: usize = usize::MAX;

/// Kind of a basic block, determining the expected shape of its out-edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BlockKind {
    /// Unconditional jump; one out-edge
    Oneway = 0,
    /// Conditional branch; out-edge 0 is "then", out-edge 1 is "else"
    Twoway = 1,
    /// N-way switch; out-edges in case-label order
    Nway = 2,
    /// Call with fall-through; one out-edge
    Call = 3,
    /// Procedure exit; no out-edges
    Return = 4,
    /// Fall-through; one out-edge
    Fall = 5,
    /// Computed jump; out-edge count unconstrained
    CompJump = 6,
    /// Computed call
    CompCall = 7,
    Invalid = 8,
}

impl BlockKind {
    pub fn from_u8(v: u8) -> Option<BlockKind> {
        use BlockKind::*;
        Some(match v {
            0 => Oneway,
            1 => Twoway,
            2 => Nway,
            3 => Call,
            4 => Return,
            5 => Fall,
            6 => CompJump,
            7 => CompCall,
            8 => Invalid,
            _ => return None,
        })
    }

    fn name(self) -> &'static str {
        use BlockKind::*;
        match self {
            Oneway => "Oneway",
            Twoway => "Twoway",
            Nway => "Nway",
            Call => "Call",
            Return => "Return",
            Fall => "Fall",
            CompJump => "Computed jump",
            CompCall => "Computed call",
            Invalid => "Invalid",
        }
    }
}

/// Traversal state, cycled explicitly by each structuring pass so a pass
/// can tell "visited in a prior pass" from "visited in this pass".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Traversal {
    #[default]
    Untraversed = 0,
    /// Forward loop-stamp DFS
    DfsLoopNum = 1,
    /// Reverse loop-stamp DFS
    DfsRevNum = 2,
    /// Post-dominator ordering DFS
    DfsPostDom = 3,
    /// Case-body tagging DFS
    DfsCase = 4,
    /// Code emission
    DfsCodegen = 5,
}

/// Loop classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoopKind {
    PreTested = 0,
    PostTested = 1,
    Endless = 2,
}

/// Conditional classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CondKind {
    IfThen = 0,
    IfElse = 1,
    IfThenElse = 2,
    Case = 3,
}

/// How a conditional's follow relates to the surrounding structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum UnstructKind {
    #[default]
    Structured = 0,
    JumpInOutLoop = 1,
    JumpIntoCase = 2,
}

/// Structure classification of a block, written by the analyzers.
///
/// A single tagged value instead of four independent labels, so that
/// invalid combinations (a latch on a sequential block, a loop kind on a
/// pure conditional) cannot be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Structure {
    /// Straight-line block, or a degraded header emitted via gotos
    #[default]
    Seq,
    /// Head of a two-way or N-way conditional
    Cond {
        kind: CondKind,
        us: UnstructKind,
        follow: Option<BlockId>,
    },
    /// Head of a loop whose predicate needs no separate conditional
    Loop {
        kind: LoopKind,
        latch: BlockId,
        follow: Option<BlockId>,
    },
    /// Head of a loop that is also a conditional header (post-tested
    /// multi-block loops and endless loops with a conditional head)
    LoopCond {
        loop_kind: LoopKind,
        latch: BlockId,
        loop_follow: Option<BlockId>,
        cond_kind: CondKind,
        us: UnstructKind,
        cond_follow: Option<BlockId>,
    },
}

impl Structure {
    pub fn is_loop(&self) -> bool {
        matches!(self, Structure::Loop { .. } | Structure::LoopCond { .. })
    }

    pub fn is_cond(&self) -> bool {
        matches!(self, Structure::Cond { .. } | Structure::LoopCond { .. })
    }
}

/// A basic block: a maximal straight-line run of RTLs ending in one
/// control-transfer statement (or a fall-through), plus the labeling
/// attributes written by the structuring passes.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub(crate) id: BlockId,
    pub(crate) kind: BlockKind,
    /// Owned RTL sequence; destroyed with the block.
    rtls: Vec<Rtl>,
    pub(crate) in_edges: SmallVec<[BlockId; 2]>,
    pub(crate) out_edges: SmallVec<[BlockId; 2]>,

    /// Nonzero when the translated source needs a label at this block.
    pub(crate) label_num: u32,

    // Structuring labels
    pub(crate) structure: Structure,
    pub(crate) loop_head: Option<BlockId>,
    pub(crate) case_head: Option<BlockId>,
    pub(crate) imm_pdom: Option<BlockId>,

    // Ordering numbers
    /// Position in the post-order block list (the reverse-post-order walk
    /// iterates that list backwards).
    pub(crate) ord: usize,
    /// Position in the post-dominator DFS order.
    pub(crate) rev_ord: usize,
    /// Entry/exit timestamps of the forward loop-stamp DFS.
    pub(crate) loop_stamps: [u32; 2],
    /// Entry/exit timestamps of the reverse-child-order DFS.
    pub(crate) rev_loop_stamps: [u32; 2],

    pub(crate) traversal: Traversal,
    /// Set when a goto targeted this block during emission.
    pub(crate) hll_label: bool,
    /// Indent level this block's body was written at.
    pub(crate) indent_level: usize,

    /// Return expression; populated when `kind` is `Return`.
    pub(crate) return_val: Option<Expr>,

    /// Liveness at the top of the block.
    pub(crate) live_in: BTreeSet<Expr>,
}

impl BasicBlock {
    /// Construct a block. Unlike [`set_rtls`](Self::set_rtls) this accepts
    /// an empty RTL sequence regardless of kind; the deserializer builds
    /// blocks before their contents are linked in.
    pub(crate) fn new(id: BlockId, kind: BlockKind, rtls: Vec<Rtl>) -> BasicBlock {
        BasicBlock {
            id,
            kind,
            rtls,
            in_edges: SmallVec::new(),
            out_edges: SmallVec::new(),
            label_num: 0,
            structure: Structure::Seq,
            loop_head: None,
            case_head: None,
            imm_pdom: None,
            ord: UNORDERED,
            rev_ord: UNORDERED,
            loop_stamps: [0, 0],
            rev_loop_stamps: [0, 0],
            traversal: Traversal::Untraversed,
            hll_label: false,
            indent_level: 0,
            return_val: None,
            live_in: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    /// Update the kind and expected out-edge count, e.g. when a computed
    /// jump is recognized as a switch and becomes Nway.
    pub fn update_kind(&mut self, kind: BlockKind) {
        self.kind = kind;
    }

    pub fn rtls(&self) -> &[Rtl] {
        &self.rtls
    }

    /// Assign the RTL sequence, taking ownership and dropping any previous
    /// contents. An empty sequence is only legal for Invalid blocks (the
    /// deserializer builds those before linking).
    pub fn set_rtls(&mut self, rtls: Vec<Rtl>) {
        assert!(
            !rtls.is_empty() || self.kind == BlockKind::Invalid,
            "empty RTL list for a {} block",
            self.kind.name()
        );
        self.rtls = rtls;
    }

    pub fn in_edges(&self) -> &[BlockId] {
        &self.in_edges
    }

    pub fn out_edges(&self) -> &[BlockId] {
        &self.out_edges
    }

    /// The out-edge at `i`, if present.
    pub fn out_edge(&self, i: usize) -> Option<BlockId> {
        self.out_edges.get(i).copied()
    }

    /// Nonzero when a label is required for this block in the translated
    /// source.
    pub fn label_num(&self) -> u32 {
        self.label_num
    }

    /// The lowest real address of this block.
    ///
    /// Usually the address of the first RTL, but not always: an orphan
    /// instruction lifted out of a delay slot is copied in front of its
    /// branch with address 0, in which case the branch carries the real
    /// low address.
    pub fn low_addr(&self) -> Addr {
        let Some(first) = self.rtls.first() else {
            return 0;
        };
        if first.addr == 0 && self.rtls.len() > 1 {
            let add2 = self.rtls[1].addr;
            // main() genuinely at offset 0 exists in the wild; only treat
            // address 0 as synthetic when the next RTL is clearly past it
            if add2 < 0x10 {
                return 0;
            }
            return add2;
        }
        first.addr
    }

    /// The address of the last RTL.
    pub fn hi_addr(&self) -> Addr {
        self.rtls.last().map(|r| r.addr).unwrap_or(0)
    }

    /// The branch condition of this block.
    ///
    /// # Panics
    /// Panics when the final RTL carries no branch statement; callers are
    /// required to check the block kind first.
    pub fn cond(&self) -> &Expr {
        self.find_branch()
            .and_then(|s| s.cond_expr())
            .unwrap_or_else(|| panic!("cond() on block {} with no branch statement", self.id))
    }

    /// Replace the branch condition of this block.
    ///
    /// # Panics
    /// Panics when no branch statement is present.
    pub fn set_cond(&mut self, e: Expr) {
        let id = self.id;
        let stmt = self
            .rtls
            .last_mut()
            .and_then(|rtl| rtl.stmts.iter_mut().rev().find(|s| s.is_branch()))
            .unwrap_or_else(|| panic!("set_cond() on block {} with no branch statement", id));
        stmt.set_cond_expr(e);
    }

    fn find_branch(&self) -> Option<&Stmt> {
        self.rtls
            .last()
            .and_then(|rtl| rtl.stmts.iter().rev().find(|s| s.is_branch()))
    }

    /// True iff this block branches on an equality test and `dest` is the
    /// edge taken when the tested value is zero.
    ///
    /// # Panics
    /// Panics when no branch statement is present.
    pub fn is_jmp_z(&self, dest: BlockId) -> bool {
        use crate::decompiler::ssl::BranchKind;
        let kind = self
            .find_branch()
            .and_then(|s| s.branch_kind())
            .unwrap_or_else(|| panic!("is_jmp_z() on block {} with no branch statement", self.id));
        match kind {
            BranchKind::Je => self.out_edges.first() == Some(&dest),
            BranchKind::Jne => self.out_edges.get(1) == Some(&dest),
            _ => false,
        }
    }

    /// The switch descriptor of this block.
    ///
    /// # Panics
    /// Panics when the final RTL carries no case statement.
    pub fn switch_info(&self) -> &SwitchInfo {
        self.rtls
            .last()
            .and_then(|rtl| rtl.hl_stmt())
            .and_then(|s| s.switch_info())
            .unwrap_or_else(|| panic!("switch_info() on block {} with no case statement", self.id))
    }

    /// Prepend a statement (usually a phi assignment) to this block. If the
    /// block already starts with a synthetic RTL (address 0) the statement
    /// is appended to it, otherwise a new synthetic RTL is created.
    pub fn prepend_stmt(&mut self, s: Stmt) {
        if let Some(first) = self.rtls.first_mut() {
            if first.addr == 0 {
                first.append_stmt(s);
                return;
            }
        }
        self.rtls.insert(0, Rtl::with_stmts(0, vec![s]));
    }

    /// The fixed destination of this block's call, or `None` for indirect
    /// calls and non-call blocks.
    pub fn call_dest(&self) -> Option<Addr> {
        if self.kind != BlockKind::Call {
            return None;
        }
        self.rtls
            .last()?
            .stmts
            .iter()
            .rev()
            .find(|s| s.is_call())
            .and_then(|s| s.call_target())
    }

    pub fn return_val(&self) -> Option<&Expr> {
        self.return_val.as_ref()
    }

    /// Set the return expression, dropping any previous one.
    pub fn set_return_val(&mut self, e: Expr) {
        self.return_val = Some(e);
    }

    /// Flat iteration over the statements of every RTL, in order.
    pub fn stmts(&self) -> impl Iterator<Item = &Stmt> {
        self.rtls.iter().flat_map(|rtl| rtl.stmts.iter())
    }

    /// Simplify all expressions in this block.
    pub fn simplify(&mut self) {
        for rtl in &mut self.rtls {
            rtl.simplify();
        }
    }

    // ---- structuring label accessors -----------------------------------

    pub fn structure(&self) -> &Structure {
        &self.structure
    }

    pub fn traversal(&self) -> Traversal {
        self.traversal
    }

    pub fn loop_head(&self) -> Option<BlockId> {
        self.loop_head
    }

    pub fn case_head(&self) -> Option<BlockId> {
        self.case_head
    }

    pub fn imm_pdom(&self) -> Option<BlockId> {
        self.imm_pdom
    }

    pub fn ord(&self) -> usize {
        self.ord
    }

    pub fn rev_ord(&self) -> usize {
        self.rev_ord
    }

    pub fn loop_stamps(&self) -> [u32; 2] {
        self.loop_stamps
    }

    pub fn hll_label(&self) -> bool {
        self.hll_label
    }

    pub fn live_in(&self) -> &BTreeSet<Expr> {
        &self.live_in
    }

    /// The latch of the loop this block heads, if any.
    pub fn latch_node(&self) -> Option<BlockId> {
        match self.structure {
            Structure::Loop { latch, .. } | Structure::LoopCond { latch, .. } => Some(latch),
            _ => None,
        }
    }

    /// The loop follow of the loop this block heads, if any.
    pub fn loop_follow(&self) -> Option<BlockId> {
        match self.structure {
            Structure::Loop { follow, .. } => follow,
            Structure::LoopCond { loop_follow, .. } => loop_follow,
            _ => None,
        }
    }

    /// The conditional follow of the conditional this block heads, if any.
    pub fn cond_follow(&self) -> Option<BlockId> {
        match self.structure {
            Structure::Cond { follow, .. } => follow,
            Structure::LoopCond { cond_follow, .. } => cond_follow,
            _ => None,
        }
    }

    pub fn loop_kind(&self) -> Option<LoopKind> {
        match self.structure {
            Structure::Loop { kind, .. } => Some(kind),
            Structure::LoopCond { loop_kind, .. } => Some(loop_kind),
            _ => None,
        }
    }

    pub fn cond_kind(&self) -> Option<CondKind> {
        match self.structure {
            Structure::Cond { kind, .. } => Some(kind),
            Structure::LoopCond { cond_kind, .. } => Some(cond_kind),
            _ => None,
        }
    }

    pub fn unstruct_kind(&self) -> Option<UnstructKind> {
        match self.structure {
            Structure::Cond { us, .. } => Some(us),
            Structure::LoopCond { us, .. } => Some(us),
            _ => None,
        }
    }

    pub(crate) fn set_cond_kind(&mut self, new: CondKind) {
        match &mut self.structure {
            Structure::Cond { kind, .. } => *kind = new,
            Structure::LoopCond { cond_kind, .. } => *cond_kind = new,
            other => panic!("set_cond_kind() on non-conditional structure {:?}", other),
        }
    }

    pub(crate) fn set_unstruct_kind(&mut self, new: UnstructKind) {
        match &mut self.structure {
            Structure::Cond { us, kind, .. } => {
                assert!(*kind != CondKind::Case, "unstructured tag on a case header");
                *us = new;
            }
            Structure::LoopCond { us, cond_kind, .. } => {
                assert!(
                    *cond_kind != CondKind::Case,
                    "unstructured tag on a case header"
                );
                *us = new;
            }
            other => panic!("set_unstruct_kind() on non-conditional structure {:?}", other),
        }
    }

    pub(crate) fn set_cond_follow(&mut self, new: Option<BlockId>) {
        match &mut self.structure {
            Structure::Cond { follow, .. } => *follow = new,
            Structure::LoopCond { cond_follow, .. } => *cond_follow = new,
            other => panic!("set_cond_follow() on non-conditional structure {:?}", other),
        }
    }

    /// Reset every label written by the structuring passes; used when the
    /// pipeline is re-run on an already structured graph.
    pub(crate) fn reset_structuring(&mut self) {
        self.label_num = 0;
        self.structure = Structure::Seq;
        self.loop_head = None;
        self.case_head = None;
        self.imm_pdom = None;
        self.ord = UNORDERED;
        self.rev_ord = UNORDERED;
        self.loop_stamps = [0, 0];
        self.rev_loop_stamps = [0, 0];
        self.traversal = Traversal::Untraversed;
        self.hll_label = false;
        self.indent_level = 0;
    }

    /// Human-readable dump: label, kind, RTLs and statements.
    pub fn print(&self) -> String {
        use std::fmt::Write;
        let mut out = String::new();
        if self.label_num != 0 {
            let _ = write!(out, "L{}: ", self.label_num);
        }
        let _ = writeln!(out, "{} BB {}:", self.kind.name(), self.id);
        for rtl in &self.rtls {
            let _ = writeln!(out, "  {:08x}", rtl.addr);
            for s in &rtl.stmts {
                match &s.kind {
                    StmtKind::Assign { lhs, rhs } => {
                        let _ = writeln!(out, "    {} := {}", lhs, rhs);
                    }
                    StmtKind::Phi { lhs, .. } => {
                        let _ = writeln!(out, "    {} := phi(...)", lhs);
                    }
                    StmtKind::Branch { cond, .. } => {
                        let _ = writeln!(out, "    branch if {}", cond);
                    }
                    StmtKind::Call { dest: Some(d) } => {
                        let _ = writeln!(out, "    call 0x{:08x}", d);
                    }
                    StmtKind::Call { dest: None } => {
                        let _ = writeln!(out, "    call <computed>");
                    }
                    StmtKind::Case(info) => {
                        let _ = writeln!(out, "    switch {}", info.switch_var);
                    }
                    StmtKind::Return { value: Some(v) } => {
                        let _ = writeln!(out, "    return {}", v);
                    }
                    StmtKind::Return { value: None } => {
                        let _ = writeln!(out, "    return");
                    }
                    StmtKind::Other => {
                        let _ = writeln!(out, "    <side effect>");
                    }
                }
            }
        }
        out
    }
}

/// Order blocks by lowest address; used for deterministic block listings.
pub fn less_address(a: &BasicBlock, b: &BasicBlock) -> std::cmp::Ordering {
    a.low_addr().cmp(&b.low_addr())
}

/// Order blocks by first DFS timestamp.
pub fn less_first_dfs(a: &BasicBlock, b: &BasicBlock) -> std::cmp::Ordering {
    a.loop_stamps[0].cmp(&b.loop_stamps[0])
}
