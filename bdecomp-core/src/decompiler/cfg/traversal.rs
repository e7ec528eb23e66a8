//! Graph Traversals
//!
//! The four depth-first traversals of the structuring pipeline, plus the
//! constant-time ancestor and back-edge queries built on the loop stamps.
//!
//! Each traversal writes its own [`Traversal`] value, so a pass can tell
//! blocks visited in a prior pass from blocks visited in the current one
//! without clearing any flags.

use smallvec::SmallVec;

use super::block::{BlockId, BlockKind, Traversal};
use super::ControlFlowGraph;

impl ControlFlowGraph {
    /// Run the three numbering traversals: forward loop stamps (plus the
    /// post-order list), reverse-child-order loop stamps, and the
    /// post-dominator ordering from the exit block.
    pub(crate) fn set_time_stamps(&mut self) {
        let entry = self.entry().expect("set_time_stamps() on an empty graph");

        let mut time = 1;
        let mut order = Vec::with_capacity(self.num_blocks());
        self.set_loop_stamps(entry, &mut time, &mut order);
        self.ordering = order;

        let mut time = 1;
        self.set_rev_loop_stamps(entry, &mut time);

        let mut rev_order = Vec::with_capacity(self.num_blocks());
        if let Some(exit) = self.find_exit() {
            self.set_rev_order(exit, &mut rev_order);
        } else {
            log::warn!("graph has no exit block; post-dominators unavailable");
        }
        self.rev_ordering = rev_order;
    }

    /// Timestamp `bb` and recurse on unvisited children in order. On entry
    /// the first stamp is the current time; after all children the second
    /// stamp is assigned, and the block is appended to the post-order list
    /// with its index recorded in `ord`.
    fn set_loop_stamps(&mut self, bb: BlockId, time: &mut u32, order: &mut Vec<BlockId>) {
        self[bb].traversal = Traversal::DfsLoopNum;
        self[bb].loop_stamps[0] = *time;

        let succs: SmallVec<[BlockId; 2]> = self[bb].out_edges.clone();
        for succ in succs {
            if self[succ].traversal != Traversal::DfsLoopNum {
                *time += 1;
                self.set_loop_stamps(succ, time, order);
            }
        }

        *time += 1;
        self[bb].loop_stamps[1] = *time;

        self[bb].ord = order.len();
        order.push(bb);
    }

    /// Same as [`set_loop_stamps`](Self::set_loop_stamps) but visiting
    /// children in reverse index order; breaks ties the forward stamps
    /// cannot, in irreducible regions.
    fn set_rev_loop_stamps(&mut self, bb: BlockId, time: &mut u32) {
        self[bb].traversal = Traversal::DfsRevNum;
        self[bb].rev_loop_stamps[0] = *time;

        let succs: SmallVec<[BlockId; 2]> = self[bb].out_edges.clone();
        for succ in succs.into_iter().rev() {
            if self[succ].traversal != Traversal::DfsRevNum {
                *time += 1;
                self.set_rev_loop_stamps(succ, time);
            }
        }

        *time += 1;
        self[bb].rev_loop_stamps[1] = *time;
    }

    /// DFS over the reverse graph (in-edges), recording each block's
    /// position in the visit order; post-dominators are computed from this
    /// ordering.
    fn set_rev_order(&mut self, bb: BlockId, order: &mut Vec<BlockId>) {
        self[bb].traversal = Traversal::DfsPostDom;

        let preds: SmallVec<[BlockId; 2]> = self[bb].in_edges.clone();
        for pred in preds {
            if self[pred].traversal != Traversal::DfsPostDom {
                self.set_rev_order(pred, order);
            }
        }

        self[bb].rev_ord = order.len();
        order.push(bb);
    }

    /// The block the post-dominator traversal starts from: the return
    /// block if there is one, else any block with no out-edges.
    fn find_exit(&self) -> Option<BlockId> {
        self.block_ids()
            .find(|&id| self[id].kind == BlockKind::Return)
            .or_else(|| self.block_ids().find(|&id| self[id].out_edges.is_empty()))
    }

    /// Tag every block dominated by the case header `head` (stopping at
    /// `follow`, back edges, and blocks already tagged in this pass) with
    /// `case_head = head`.
    pub(crate) fn set_case_head(&mut self, bb: BlockId, head: BlockId, follow: Option<BlockId>) {
        assert!(
            self[bb].case_head.is_none(),
            "case tagging reached {} twice",
            bb
        );

        self[bb].traversal = Traversal::DfsCase;

        // the header under investigation is not a member of its own body
        if bb != head {
            self[bb].case_head = Some(head);
        }

        // a nested case header has already tagged its own members, so skip
        // straight to its follow
        if self[bb].kind == BlockKind::Nway && bb != head {
            if let Some(cf) = self[bb].cond_follow() {
                if self[cf].traversal != Traversal::DfsCase && Some(cf) != follow {
                    self.set_case_head(cf, head, follow);
                }
            }
            return;
        }

        let succs: SmallVec<[BlockId; 2]> = self[bb].out_edges.clone();
        for succ in succs {
            if !self.has_back_edge_to(bb, succ)
                && self[succ].traversal != Traversal::DfsCase
                && Some(succ) != follow
            {
                self.set_case_head(succ, head, follow);
            }
        }
    }

    /// True iff `a` is an ancestor of `b` in either DFS tree. The stamp
    /// intervals of the two traversals are strictly nested for ancestors,
    /// so this is two interval tests.
    pub fn is_ancestor_of(&self, a: BlockId, b: BlockId) -> bool {
        let (sa, sb) = (&self[a], &self[b]);
        (sa.loop_stamps[0] < sb.loop_stamps[0] && sa.loop_stamps[1] > sb.loop_stamps[1])
            || (sa.rev_loop_stamps[0] < sb.rev_loop_stamps[0]
                && sa.rev_loop_stamps[1] > sb.rev_loop_stamps[1])
    }

    /// True iff the edge `a -> b` is a back edge (including a self loop).
    pub fn has_back_edge_to(&self, a: BlockId, b: BlockId) -> bool {
        b == a || self.is_ancestor_of(b, a)
    }

    /// True iff any out-edge of `bb` is a back edge.
    pub(crate) fn has_back_edge(&self, bb: BlockId) -> bool {
        self[bb]
            .out_edges
            .iter()
            .any(|&succ| self.has_back_edge_to(bb, succ))
    }
}
