//! Conditional & Case Analyzer
//!
//! Immediate post-dominators, conditional-header classification and the
//! unstructured check that demotes conditionals whose follow crosses a
//! loop or case boundary to goto form.

use super::block::{BlockId, BlockKind, CondKind, Structure, UnstructKind, UNORDERED};
use super::ControlFlowGraph;

/// Walk limit for the common post-dominator search; regions that fail to
/// converge within it are left unresolved rather than looping forever.
const GIVEUP: usize = 10_000;

impl ControlFlowGraph {
    /// `rev_ord` widened so that blocks never reached from the exit sort
    /// below every reached block.
    fn rev_ord_i(&self, bb: BlockId) -> i64 {
        match self[bb].rev_ord {
            UNORDERED => -1,
            n => n as i64,
        }
    }

    /// The common post-dominator of the two candidates, found by walking
    /// both immediate post-dominator chains toward the exit.
    fn common_pdom(&self, cur: Option<BlockId>, succ: Option<BlockId>) -> Option<BlockId> {
        let Some(cur_start) = cur else { return succ };
        let Some(succ_start) = succ else { return cur };
        if self[cur_start].rev_ord == self[succ_start].rev_ord && cur_start != succ_start {
            // ordering unavailable for these blocks; nothing to walk on
            return Some(cur_start);
        }

        let mut cur = Some(cur_start);
        let mut succ = Some(succ_start);
        let mut steps = 0;
        while steps < GIVEUP {
            let (Some(c), Some(s)) = (cur, succ) else { break };
            if c == s {
                return Some(c);
            }
            if self.rev_ord_i(c) > self.rev_ord_i(s) {
                succ = self[s].imm_pdom;
            } else {
                cur = self[c].imm_pdom;
            }
            steps += 1;
        }
        if steps >= GIVEUP {
            log::debug!(
                "no common post-dominator for {} and {}; leaving unchanged",
                cur_start,
                succ_start
            );
            return Some(cur_start);
        }
        cur.or(succ)
    }

    /// Compute the immediate post-dominator of every block.
    ///
    /// # Algorithm
    /// Three passes. The first walks the post-dominator ordering bottom-up
    /// considering only forward successors; the second revisits branching
    /// blocks in post-order with every successor; the third fixes up
    /// branching blocks on back edges, preferring the successor's
    /// post-dominator when it lies earlier in the ordering.
    pub(crate) fn find_immed_pdom(&mut self) {
        for i in (0..self.rev_ordering.len()).rev() {
            let cur = self.rev_ordering[i];
            for j in 0..self[cur].out_edges.len() {
                let succ = self[cur].out_edges[j];
                if self.rev_ord_i(succ) > self.rev_ord_i(cur) {
                    self[cur].imm_pdom = self.common_pdom(self[cur].imm_pdom, Some(succ));
                }
            }
        }

        for i in 0..self.ordering.len() {
            let cur = self.ordering[i];
            if self[cur].out_edges.len() > 1 {
                for j in 0..self[cur].out_edges.len() {
                    let succ = self[cur].out_edges[j];
                    self[cur].imm_pdom = self.common_pdom(self[cur].imm_pdom, Some(succ));
                }
            }
        }

        for i in 0..self.ordering.len() {
            let cur = self.ordering[i];
            if self[cur].out_edges.len() > 1 {
                for j in 0..self[cur].out_edges.len() {
                    let succ = self[cur].out_edges[j];
                    let succ_pdom = self[succ].imm_pdom;
                    let cur_pdom = self[cur].imm_pdom;
                    let prefer_succ = self.has_back_edge_to(cur, succ)
                        && match (succ_pdom, cur_pdom) {
                            (Some(sp), Some(cp)) => self[sp].ord < self[cp].ord,
                            _ => false,
                        };
                    self[cur].imm_pdom = if prefer_succ {
                        self.common_pdom(succ_pdom, cur_pdom)
                    } else {
                        self.common_pdom(cur_pdom, Some(succ))
                    };
                }
            }
        }
    }

    /// Derive the conditional kind of a two-way or N-way header from where
    /// its arms sit relative to the follow.
    fn classify_cond(&self, bb: BlockId, follow: Option<BlockId>) -> CondKind {
        let b = &self[bb];
        if b.kind == BlockKind::Nway {
            CondKind::Case
        } else if follow.is_some() && b.out_edges.get(1).copied() == follow {
            CondKind::IfThen
        } else if follow.is_some() && b.out_edges.first().copied() == follow {
            CondKind::IfElse
        } else {
            CondKind::IfThenElse
        }
    }

    /// Classify every branching block as a conditional header with its
    /// immediate post-dominator as follow, and tag the bodies of case
    /// headers.
    pub(crate) fn struct_conds(&mut self) {
        for i in 0..self.ordering.len() {
            let cur = self.ordering[i];
            if self[cur].out_edges.len() <= 1 {
                continue;
            }

            // a two-way header carrying a back edge has no follow
            if self[cur].kind == BlockKind::Twoway && self.has_back_edge(cur) {
                self[cur].structure = Structure::Cond {
                    kind: self.classify_cond(cur, None),
                    us: UnstructKind::Structured,
                    follow: None,
                };
                self.stats_mut().conditionals += 1;
                continue;
            }

            let follow = self[cur].imm_pdom;
            let kind = self.classify_cond(cur, follow);
            self[cur].structure = Structure::Cond {
                kind,
                us: UnstructKind::Structured,
                follow,
            };
            self.stats_mut().conditionals += 1;

            if kind == CondKind::Case {
                self.stats_mut().cases += 1;
                self.set_case_head(cur, cur, follow);
            }
        }
    }

    /// Demote conditional headers whose follow escapes the enclosing loop
    /// or case region. Runs after loop analysis so loop membership is
    /// known.
    pub(crate) fn check_conds(&mut self) {
        for i in 0..self.ordering.len() {
            let cur = self.ordering[i];

            let (is_loop_cond, cond_follow, cond_kind) = match self[cur].structure {
                Structure::Cond { kind, follow, .. } => (false, follow, Some(kind)),
                Structure::LoopCond {
                    cond_kind,
                    cond_follow,
                    ..
                } => (true, cond_follow, Some(cond_kind)),
                _ => continue,
            };

            if let (Some(follow), Some(kind)) = (cond_follow, cond_kind) {
                if kind != CondKind::Case {
                    self.check_cond_follow(cur, follow, is_loop_cond);
                }
            }

            // a structured two-way header left without a follow is the
            // source of a back edge; continue after the if at the
            // non-back-edge child
            if let Structure::Cond {
                kind,
                us: UnstructKind::Structured,
                follow: None,
            } = self[cur].structure
            {
                if kind != CondKind::Case && self.has_back_edge(cur) {
                    let then_edge = self[cur].out_edges[0];
                    let else_edge = self[cur].out_edges[1];
                    if self.has_back_edge_to(cur, then_edge) {
                        self[cur].set_cond_kind(CondKind::IfThen);
                        self[cur].set_cond_follow(Some(else_edge));
                    } else {
                        self[cur].set_cond_kind(CondKind::IfElse);
                        self[cur].set_cond_follow(Some(then_edge));
                    }
                }
            }
        }

        let unstructured = self
            .block_ids()
            .filter(|&id| {
                matches!(
                    self[id].unstruct_kind(),
                    Some(UnstructKind::JumpInOutLoop) | Some(UnstructKind::JumpIntoCase)
                )
            })
            .count();
        self.stats_mut().unstructured = unstructured;
    }

    /// The follow-relation checks for one two-way conditional header.
    fn check_cond_follow(&mut self, cur: BlockId, follow: BlockId, is_loop_cond: bool) {
        let then_edge = self[cur].out_edges[0];
        let else_edge = self[cur].out_edges[1];

        let my_loop_head = if is_loop_cond {
            Some(cur)
        } else {
            self[cur].loop_head
        };
        let foll_loop_head = self[follow].loop_head;

        if my_loop_head != foll_loop_head {
            // find the arm the latch sits on: the other arm jumps out of
            // the loop and becomes the emitted clause
            if let Some(my_latch) = my_loop_head.and_then(|h| self[h].latch_node()) {
                if then_edge == my_latch || self.is_ancestor_of(then_edge, my_latch) {
                    self[cur].set_unstruct_kind(UnstructKind::JumpInOutLoop);
                    self[cur].set_cond_kind(CondKind::IfElse);
                } else if else_edge == my_latch || self.is_ancestor_of(else_edge, my_latch) {
                    self[cur].set_unstruct_kind(UnstructKind::JumpInOutLoop);
                    self[cur].set_cond_kind(CondKind::IfThen);
                }
            }

            // a jump into a loop body: find the arm the target loop's head
            // sits on
            if self[cur].unstruct_kind() == Some(UnstructKind::Structured) {
                if let Some(flh) = foll_loop_head {
                    if then_edge == flh || self.is_ancestor_of(then_edge, flh) {
                        self[cur].set_unstruct_kind(UnstructKind::JumpInOutLoop);
                        self[cur].set_cond_kind(CondKind::IfElse);
                    } else if else_edge == flh || self.is_ancestor_of(else_edge, flh) {
                        self[cur].set_unstruct_kind(UnstructKind::JumpInOutLoop);
                        self[cur].set_cond_kind(CondKind::IfThen);
                    }
                }
            }
        }

        // a jump into a case body: one arm lives in a case region this
        // header is not part of
        if self[cur].unstruct_kind() == Some(UnstructKind::Structured) {
            let my_case = self[cur].case_head;
            let then_case = self[then_edge].case_head;
            let else_case = self[else_edge].case_head;
            if my_case != then_case || my_case != else_case {
                let my_case_follow = my_case.and_then(|c| self[c].cond_follow());
                if then_case == my_case && (my_case.is_none() || else_case != my_case_follow) {
                    self[cur].set_unstruct_kind(UnstructKind::JumpIntoCase);
                    self[cur].set_cond_kind(CondKind::IfElse);
                } else if else_case == my_case && (my_case.is_none() || then_case != my_case_follow)
                {
                    self[cur].set_unstruct_kind(UnstructKind::JumpIntoCase);
                    self[cur].set_cond_kind(CondKind::IfThen);
                }
            }
        }
    }
}
