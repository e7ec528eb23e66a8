//! Control Flow Graph
//!
//! The block arena and the structuring pipeline. A procedure's CFG owns its
//! blocks exclusively; blocks refer to each other by [`BlockId`] index, so
//! back edges, dominators and structuring references never form owning
//! cycles.
//!
//! # Structuring Pipeline
//! 1. **Timestamps**: forward/reverse loop-stamp DFS, post-order list,
//!    post-dominator DFS order
//! 2. **Post-dominators**: immediate post-dominator of every block
//! 3. **Conditionals**: classify two-way and N-way headers, tag case bodies
//! 4. **Loops**: find headers and latches, tag loop members, classify loop
//!    kinds, locate loop follows
//! 5. **Unstructured check**: demote conditionals whose follow crosses a
//!    loop or case boundary to goto form
//!
//! The passes mutate only the labeling attributes on blocks; the edge set
//! and the RTLs are never altered. Everything is single-threaded and
//! deterministic: each traversal iterates edges in stored order.

pub mod block;
mod conds;
mod liveness;
mod loops;
mod traversal;

use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

pub use block::{
    BasicBlock, BlockId, BlockKind, CondKind, LoopKind, Structure, Traversal, UnstructKind,
    UNORDERED,
};
pub use liveness::InterferenceGraph;

use crate::decompiler::ssl::Rtl;

/// Counts collected by the structuring passes, in the manner of the
/// pipeline statistics the rest of the decompiler reports.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructuringStats {
    pub blocks: usize,
    pub loops: usize,
    pub pretested: usize,
    pub posttested: usize,
    pub endless: usize,
    pub conditionals: usize,
    pub cases: usize,
    pub unstructured: usize,
    pub gotos_emitted: usize,
}

/// A procedure's control flow graph: the arena of basic blocks plus the
/// orderings computed by the structuring passes.
#[derive(Debug, Clone, Default)]
pub struct ControlFlowGraph {
    blocks: Vec<BasicBlock>,
    entry: Option<BlockId>,
    /// Post-order list from the forward loop-stamp DFS; `ord` indexes it.
    pub(crate) ordering: Vec<BlockId>,
    /// Post-dominator DFS order; `rev_ord` indexes it.
    pub(crate) rev_ordering: Vec<BlockId>,
    structured: bool,
    stats: StructuringStats,
}

impl ControlFlowGraph {
    pub fn new() -> ControlFlowGraph {
        ControlFlowGraph::default()
    }

    /// Append a block to the arena. The first block added becomes the
    /// entry unless [`set_entry`](Self::set_entry) overrides it.
    pub fn add_block(&mut self, kind: BlockKind, rtls: Vec<Rtl>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock::new(id, kind, rtls));
        if self.entry.is_none() {
            self.entry = Some(id);
        }
        id
    }

    pub fn set_entry(&mut self, entry: BlockId) {
        self.entry = Some(entry);
    }

    pub fn entry(&self) -> Option<BlockId> {
        self.entry
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.iter()
    }

    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> {
        (0..self.blocks.len() as u32).map(BlockId)
    }

    pub fn stats(&self) -> &StructuringStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut StructuringStats {
        &mut self.stats
    }

    pub fn is_structured(&self) -> bool {
        self.structured
    }

    // ---- edge maintenance ----------------------------------------------

    /// Add the edge `from -> to` in both directions.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        self[from].out_edges.push(to);
        self[to].in_edges.push(from);
    }

    /// Add `to` to `from`'s out-edge list only. The matching in-edge must
    /// be added separately; graph construction normally goes through
    /// [`add_edge`](Self::add_edge).
    pub fn add_out_edge(&mut self, from: BlockId, to: BlockId) {
        self[from].out_edges.push(to);
    }

    /// Add `from` to `to`'s in-edge list only.
    pub fn add_in_edge(&mut self, to: BlockId, from: BlockId) {
        self[to].in_edges.push(from);
    }

    /// Remove the edge `from -> to` in both directions.
    pub fn delete_edge(&mut self, from: BlockId, to: BlockId) {
        if let Some(pos) = self[from].out_edges.iter().position(|&b| b == to) {
            self[from].out_edges.remove(pos);
        }
        if let Some(pos) = self[to].in_edges.iter().position(|&b| b == from) {
            self[to].in_edges.remove(pos);
        }
    }

    /// Overwrite out-edge `i` of `bb`. Appending (at `i == len`) is allowed
    /// for blocks still under construction.
    pub fn set_out_edge(&mut self, bb: BlockId, i: usize, new: BlockId) {
        let edges = &mut self[bb].out_edges;
        if i == edges.len() {
            edges.push(new);
        } else {
            edges[i] = new;
        }
    }

    /// Overwrite in-edge `i` of `bb`; needed when duplicating blocks.
    pub fn set_in_edge(&mut self, bb: BlockId, i: usize, new: BlockId) {
        self[bb].in_edges[i] = new;
    }

    /// The out-edge of `bb` whose target starts at address `addr`.
    pub fn correct_out_edge(&self, bb: BlockId, addr: u32) -> Option<BlockId> {
        self[bb]
            .out_edges
            .iter()
            .copied()
            .find(|&succ| self[succ].low_addr() == addr)
    }

    /// Index of `pred` in `bb`'s in-edge list.
    ///
    /// # Panics
    /// Panics when `pred` is not a predecessor of `bb`.
    pub fn which_pred(&self, bb: BlockId, pred: BlockId) -> usize {
        self[bb]
            .in_edges
            .iter()
            .position(|&p| p == pred)
            .unwrap_or_else(|| panic!("{} is not a predecessor of {}", pred, bb))
    }

    /// The non-follow successor of a loop header.
    ///
    /// # Panics
    /// Panics when `header` does not head a loop or is not two-way.
    pub fn loop_body(&self, header: BlockId) -> BlockId {
        let bb = &self[header];
        assert!(
            bb.structure.is_loop(),
            "loop_body() on non-loop block {}",
            header
        );
        assert!(bb.out_edges.len() == 2, "loop_body() on {}-edge header", bb.out_edges.len());
        let follow = bb.loop_follow();
        if Some(bb.out_edges[0]) != follow {
            bb.out_edges[0]
        } else {
            bb.out_edges[1]
        }
    }

    /// True iff `bb` is the latch of the loop enclosing it.
    pub(crate) fn is_latch(&self, bb: BlockId) -> bool {
        match self[bb].loop_head {
            Some(head) => self[head].latch_node() == Some(bb),
            None => false,
        }
    }

    /// True iff every forward (non-back-edge) predecessor of `bb` has had
    /// its code generated.
    pub(crate) fn all_parents_generated(&self, bb: BlockId) -> bool {
        self[bb].in_edges.iter().all(|&pred| {
            self.has_back_edge_to(pred, bb) || self[pred].traversal == Traversal::DfsCodegen
        })
    }

    // ---- structuring pipeline ------------------------------------------

    /// Run the full structuring pipeline. Safe to call again on an already
    /// structured graph: all labels are recomputed from scratch and reach
    /// the same fixpoint.
    pub fn structure(&mut self) {
        if self.blocks.is_empty() || self.entry.is_none() {
            return;
        }
        for bb in &mut self.blocks {
            bb.reset_structuring();
        }
        self.stats = StructuringStats {
            blocks: self.blocks.len(),
            ..StructuringStats::default()
        };
        self.set_time_stamps();
        self.find_immed_pdom();
        self.struct_conds();
        self.struct_loops();
        self.check_conds();
        self.structured = true;
        log::debug!(
            "structured {} blocks: {} loops, {} conditionals, {} unstructured",
            self.stats.blocks,
            self.stats.loops,
            self.stats.conditionals,
            self.stats.unstructured
        );
    }

    /// Simplify all expressions in every block.
    pub fn simplify(&mut self) {
        for bb in &mut self.blocks {
            bb.simplify();
        }
    }
}

impl Index<BlockId> for ControlFlowGraph {
    type Output = BasicBlock;

    fn index(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }
}

impl IndexMut<BlockId> for ControlFlowGraph {
    fn index_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.index()]
    }
}
