//! Interval & Loop Analyzer
//!
//! Finds loop headers and their latches over the DFS tree, tags loop
//! members, classifies each loop as pre-tested, post-tested or endless,
//! and locates the loop follow.
//!
//! Loop membership is kept in a `BitVec` indexed by `ord` while a single
//! loop is under investigation, matching how the rest of the analysis
//! stores per-loop block sets.

use bitvec::prelude::*;

use super::block::{BlockId, BlockKind, CondKind, LoopKind, Structure, UnstructKind};
use super::ControlFlowGraph;

impl ControlFlowGraph {
    /// True iff `bb` lies inside the loop with the given header and latch.
    ///
    /// `bb` is in the loop when it is the latch itself, or when its stamp
    /// interval is strictly inside the header's and strictly contains the
    /// latch's, under either the forward or the reverse stamps.
    pub(crate) fn in_loop(&self, bb: BlockId, header: BlockId, latch: BlockId) -> bool {
        let h = &self[header];
        let l = &self[latch];
        debug_assert!(
            header == latch
                || (h.loop_stamps[0] > l.loop_stamps[0] && l.loop_stamps[1] > h.loop_stamps[1])
                || (h.loop_stamps[0] < l.loop_stamps[0] && l.loop_stamps[1] < h.loop_stamps[1]),
            "inconsistent header/latch stamps for {} and {}",
            header,
            latch
        );
        if bb == latch {
            return true;
        }
        let b = &self[bb];
        (h.loop_stamps[0] < b.loop_stamps[0]
            && b.loop_stamps[1] < h.loop_stamps[1]
            && b.loop_stamps[0] < l.loop_stamps[0]
            && l.loop_stamps[1] < b.loop_stamps[1])
            || (h.rev_loop_stamps[0] < b.rev_loop_stamps[0]
                && b.rev_loop_stamps[1] < h.rev_loop_stamps[1]
                && b.rev_loop_stamps[0] < l.rev_loop_stamps[0]
                && l.rev_loop_stamps[1] < b.rev_loop_stamps[1])
    }

    /// Tag every block between latch and header (inclusive of the latch)
    /// that satisfies [`in_loop`](Self::in_loop), recording membership in
    /// `loop_nodes` and pointing each member's `loop_head` at the header.
    fn tag_nodes_in_loop(&mut self, header: BlockId, latch: BlockId, loop_nodes: &mut BitVec) {
        let header_ord = self[header].ord;
        let latch_ord = self[latch].ord;
        for i in latch_ord..header_ord {
            let bb = self.ordering[i];
            if self.in_loop(bb, header, latch) {
                loop_nodes.set(i, true);
                self[bb].loop_head = Some(header);
            }
        }
    }

    /// Classify the loop at `header`. Returns the loop kind and whether
    /// the header keeps a conditional role (LoopCond).
    ///
    /// A two-way latch makes the loop post-tested; a two-way header whose
    /// conditional follow stays inside the loop makes it endless (the
    /// header keeps its conditional role); a two-way header branching out
    /// of the loop makes it pre-tested; anything else is endless.
    fn determine_loop_type(
        &self,
        header: BlockId,
        latch: BlockId,
        header_cond_follow: Option<BlockId>,
        loop_nodes: &BitVec,
    ) -> (LoopKind, bool) {
        if self[latch].kind == BlockKind::Twoway {
            // post-tested; a multi-block loop under a two-way header also
            // keeps the header's conditional
            let loop_cond = self[header].kind == BlockKind::Twoway && header != latch;
            return (LoopKind::PostTested, loop_cond);
        }
        if self[header].kind == BlockKind::Twoway {
            let follow_inside = header_cond_follow
                .map(|f| loop_nodes[self[f].ord])
                .unwrap_or(false);
            if follow_inside {
                return (LoopKind::Endless, true);
            }
            return (LoopKind::PreTested, false);
        }
        (LoopKind::Endless, false)
    }

    /// Locate the follow of the loop at `header`.
    ///
    /// Pre-tested loops follow at the header's out-of-loop arm; post-tested
    /// loops at the latch's non-back-edge arm. For endless loops the
    /// ordering between header and latch is scanned for conditional
    /// members whose arms leave the loop, keeping the highest-ordered
    /// escape target; an endless loop with no such conditional has no
    /// follow.
    fn find_loop_follow(
        &self,
        header: BlockId,
        latch: BlockId,
        kind: LoopKind,
        loop_nodes: &BitVec,
    ) -> Option<BlockId> {
        match kind {
            LoopKind::PreTested => {
                let out0 = self[header].out_edges[0];
                let out1 = self[header].out_edges[1];
                if loop_nodes[self[out0].ord] {
                    Some(out1)
                } else {
                    Some(out0)
                }
            }
            LoopKind::PostTested => {
                if self[latch].out_edges[0] == header {
                    Some(self[latch].out_edges[1])
                } else {
                    Some(self[latch].out_edges[0])
                }
            }
            LoopKind::Endless => {
                let mut follow: Option<BlockId> = None;
                let header_ord = self[header].ord;
                let latch_ord = self[latch].ord;
                if header_ord == 0 {
                    return None;
                }
                let mut i = header_ord - 1;
                while i > latch_ord {
                    let desc = self.ordering[i];
                    let desc_follow = match self[desc].structure {
                        Structure::Cond {
                            follow: Some(f), ..
                        } => Some(f),
                        _ => None,
                    };
                    let in_this_loop = self[desc].loop_head == Some(header);
                    let Some(df) = desc_follow.filter(|_| in_this_loop) else {
                        i -= 1;
                        continue;
                    };

                    if loop_nodes[self[df].ord] {
                        let df_ord = self[df].ord;
                        if self[desc].ord > df_ord && df_ord > 0 {
                            // the conditional rejoins lower in the loop;
                            // resume the scan below its follow
                            i = df_ord - 1;
                        } else {
                            // a backward jump to somewhere earlier in the
                            // loop; everything below sits under it
                            break;
                        }
                    } else {
                        // the out-of-loop arm of this conditional is a
                        // candidate follow
                        let mut succ = Some(self[desc].out_edges[0]);
                        if loop_nodes[self[succ.unwrap()].ord] {
                            let alt = self[desc].out_edges[1];
                            succ = if loop_nodes[self[alt].ord] {
                                None
                            } else {
                                Some(alt)
                            };
                        }
                        if let Some(s) = succ {
                            if follow.map(|f| self[s].ord > self[f].ord).unwrap_or(true) {
                                follow = Some(s);
                            }
                        }
                        i -= 1;
                    }
                }
                follow
            }
        }
    }

    /// Find every loop and label its header, latch, members, kind and
    /// follow. Processes headers from the entry downward so outer loops
    /// are labeled before the loops they enclose.
    pub(crate) fn struct_loops(&mut self) {
        for i in (0..self.ordering.len()).rev() {
            let cur = self.ordering[i];

            // The proper latching node of cur, when cur is a loop header:
            //   i) has a back edge to cur
            //  ii) shares cur's case head
            // iii) shares cur's loop head
            //  iv) is not an N-way block
            //   v) is not the latch of an enclosing loop
            //  vi) has the lowest ordering among the candidates
            let mut latch: Option<BlockId> = None;
            for j in 0..self[cur].in_edges.len() {
                let pred = self[cur].in_edges[j];
                if self[pred].case_head == self[cur].case_head
                    && self[pred].loop_head == self[cur].loop_head
                    && self[pred].kind != BlockKind::Nway
                    && !self.is_latch(pred)
                    && latch.map(|l| self[l].ord > self[pred].ord).unwrap_or(true)
                    && self.has_back_edge_to(pred, cur)
                {
                    latch = Some(pred);
                }
            }
            let Some(latch) = latch else { continue };

            // the prior conditional role of the header, if any; needed for
            // the endless check and carried into a LoopCond header
            let prior_cond = match self[cur].structure {
                Structure::Cond { kind, us, follow } => Some((kind, us, follow)),
                _ => None,
            };

            // a latch already structured as a conditional header reverts
            // to sequential unless the loop is a single block
            if latch != cur && matches!(self[latch].structure, Structure::Cond { .. }) {
                self[latch].structure = Structure::Seq;
            }

            let mut loop_nodes = bitvec![0; self.ordering.len()];
            self.tag_nodes_in_loop(cur, latch, &mut loop_nodes);

            let header_cond_follow = prior_cond.and_then(|(_, _, f)| f);
            let (kind, keeps_cond) =
                self.determine_loop_type(cur, latch, header_cond_follow, &loop_nodes);
            let follow = self.find_loop_follow(cur, latch, kind, &loop_nodes);

            self[cur].structure = if keeps_cond {
                let (cond_kind, us, cond_follow) = prior_cond
                    .unwrap_or((CondKind::IfThenElse, UnstructKind::Structured, None));
                Structure::LoopCond {
                    loop_kind: kind,
                    latch,
                    loop_follow: follow,
                    cond_kind,
                    us,
                    cond_follow,
                }
            } else {
                Structure::Loop {
                    kind,
                    latch,
                    follow,
                }
            };

            let stats = self.stats_mut();
            stats.loops += 1;
            match kind {
                LoopKind::PreTested => stats.pretested += 1,
                LoopKind::PostTested => stats.posttested += 1,
                LoopKind::Endless => stats.endless += 1,
            }
        }
    }
}
