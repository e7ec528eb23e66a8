//! Structured Emitter
//!
//! Recursive traversal that turns a structured CFG into ordered calls on
//! the HLL backend. Two stacks thread through the recursion: the follow
//! set (conditional and loop follows currently open) and the goto set
//! (blocks that must be reached by goto because they are cross-structure
//! targets). Pushes and pops are balanced on every path.
//!
//! # Control Rules
//! Applied in order on entry to every block:
//! 1. A block on the goto set whose label is still pending is emitted as a
//!    goto, unless it is a latch or not all of its forward parents have
//!    been emitted yet.
//! 2. Reaching a block on the follow set ends the current arm; only a
//!    non-innermost follow gets a goto.
//! 3. A block already emitted is legal only as the single-block body of a
//!    post-tested loop.
//! 4. A latch either closes its loop body at the loop's own indent level
//!    or degrades to a goto.
//!
//! Every edge of the CFG not captured by a structured construct surfaces
//! as an explicit goto, continue, break or return; a mis-classified block
//! degrades its own subtree to goto form without poisoning its siblings.

mod hll;

pub use hll::{HllCode, PseudoCWriter};

use crate::decompiler::cfg::block::{
    BlockId, BlockKind, CondKind, LoopKind, Structure, Traversal, UnstructKind,
};
use crate::decompiler::cfg::ControlFlowGraph;
use crate::decompiler::error::DecompilerError;
use crate::decompiler::ssl::{Expr, StmtKind};

impl ControlFlowGraph {
    /// Structure (if not yet done) and emit the whole procedure into the
    /// given backend.
    pub fn generate_code(&mut self, hll: &mut dyn HllCode) -> Result<(), DecompilerError> {
        if !self.is_structured() {
            self.structure();
        }
        StructuredEmitter::new(self).generate(hll)
    }
}

/// One emission run over a structured CFG.
pub struct StructuredEmitter<'c> {
    cfg: &'c mut ControlFlowGraph,
    follow_set: Vec<BlockId>,
    goto_set: Vec<BlockId>,
}

impl<'c> StructuredEmitter<'c> {
    pub fn new(cfg: &'c mut ControlFlowGraph) -> StructuredEmitter<'c> {
        StructuredEmitter {
            cfg,
            follow_set: Vec::new(),
            goto_set: Vec::new(),
        }
    }

    /// Emit the procedure from its entry block.
    pub fn generate(mut self, hll: &mut dyn HllCode) -> Result<(), DecompilerError> {
        if !self.cfg.is_structured() {
            return Err(DecompilerError::CodeGen(
                "generate() called before structuring".to_string(),
            ));
        }
        let entry = self.cfg.entry().ok_or(DecompilerError::NoEntry)?;
        self.gen_block(hll, entry, 1, None);
        debug_assert!(self.follow_set.is_empty(), "unbalanced follow stack");
        debug_assert!(self.goto_set.is_empty(), "unbalanced goto stack");
        Ok(())
    }

    fn gen_block(
        &mut self,
        hll: &mut dyn HllCode,
        bb: BlockId,
        indent: usize,
        latch: Option<BlockId>,
    ) {
        // follow of the most nested enclosing conditional
        let encl_follow = self.follow_set.last().copied();

        // rule 1: a goto-set member still waiting on parents (or standing
        // where the enclosing loop's follow will go) is reached by goto
        let latch_loop_follow = latch
            .and_then(|l| self.cfg[l].loop_head())
            .and_then(|h| self.cfg[h].loop_follow());
        if self.goto_set.contains(&bb)
            && !self.cfg.is_latch(bb)
            && (latch_loop_follow == Some(bb) || !self.cfg.all_parents_generated(bb))
        {
            self.emit_goto_and_label(hll, bb, indent, bb);
            return;
        }

        // rule 2: reaching an open follow ends the current arm; only a
        // non-innermost follow needs a goto
        if self.follow_set.contains(&bb) {
            if encl_follow != Some(bb) {
                self.emit_goto_and_label(hll, bb, indent, bb);
            }
            return;
        }

        // rule 3: revisits are only legal for a single-block post-tested
        // loop closing over itself
        if self.cfg[bb].traversal() == Traversal::DfsCodegen {
            assert!(
                matches!(
                    self.cfg[bb].structure(),
                    Structure::Loop {
                        kind: LoopKind::PostTested,
                        latch: l,
                        ..
                    } if *l == bb
                ),
                "block {} emitted twice",
                bb
            );
            return;
        }
        self.cfg[bb].traversal = Traversal::DfsCodegen;

        // rule 4: a latch closes its loop body when the indent matches the
        // loop's own level, and degrades to a goto otherwise
        if self.cfg.is_latch(bb) {
            let head = latch
                .and_then(|l| self.cfg[l].loop_head())
                .or_else(|| self.cfg[bb].loop_head())
                .expect("latch without a loop head");
            let expected = self.cfg[head].indent_level
                + (self.cfg[head].loop_kind() == Some(LoopKind::PreTested)) as usize;
            if indent == expected {
                self.write_bb(hll, bb, indent);
            } else {
                self.cfg[bb].traversal = Traversal::Untraversed;
                self.emit_goto_and_label(hll, bb, indent, bb);
            }
            return;
        }

        match *self.cfg[bb].structure() {
            Structure::Loop { .. } | Structure::LoopCond { .. } => {
                self.gen_loop(hll, bb, indent, latch)
            }
            Structure::Cond { kind, us, follow } => {
                self.gen_cond(hll, bb, indent, latch, kind, us, follow, false)
            }
            Structure::Seq => self.gen_seq(hll, bb, indent, latch),
        }
    }

    fn gen_loop(
        &mut self,
        hll: &mut dyn HllCode,
        bb: BlockId,
        indent: usize,
        outer_latch: Option<BlockId>,
    ) {
        let (loop_kind, my_latch, loop_follow, cond_part) = match *self.cfg[bb].structure() {
            Structure::Loop { kind, latch, follow } => (kind, latch, follow, None),
            Structure::LoopCond {
                loop_kind,
                latch,
                loop_follow,
                cond_kind,
                us,
                cond_follow,
            } => (loop_kind, latch, loop_follow, Some((cond_kind, us, cond_follow))),
            _ => unreachable!("gen_loop() on a non-loop block"),
        };

        if let Some(f) = loop_follow {
            self.follow_set.push(f);
        }

        match loop_kind {
            LoopKind::PreTested => {
                debug_assert_eq!(self.cfg[my_latch].out_edges().len(), 1);

                // header body, then the while predicate; invert when the
                // taken edge is the exit
                self.write_bb(hll, bb, indent);
                let follow = loop_follow.expect("pre-tested loop without a follow");
                let mut cond = self.cfg[bb].cond().clone();
                if self.cfg[bb].out_edge(0) == Some(follow) {
                    cond = cond.not().simplify();
                }
                hll.add_pretested_loop_header(indent, &cond);

                let body = if self.cfg[bb].out_edge(1) == Some(follow) {
                    self.cfg[bb].out_edges()[0]
                } else {
                    self.cfg[bb].out_edges()[1]
                };
                self.gen_block(hll, body, indent + 1, Some(my_latch));

                if self.cfg[my_latch].traversal() != Traversal::DfsCodegen {
                    self.cfg[my_latch].traversal = Traversal::DfsCodegen;
                    self.write_bb(hll, my_latch, indent + 1);
                }

                // the loop re-evaluates its predicate on the header body,
                // so that body repeats at the bottom; suppress its label
                self.cfg[bb].hll_label = false;
                self.write_bb(hll, bb, indent + 1);

                hll.add_pretested_loop_end(indent);
            }
            LoopKind::PostTested | LoopKind::Endless => {
                if loop_kind == LoopKind::Endless {
                    hll.add_endless_loop_header(indent);
                } else {
                    hll.add_posttested_loop_header(indent);
                }

                if let Some((cond_kind, us, cond_follow)) = cond_part {
                    // the header doubles as a conditional; emit it as one
                    // at the loop's body level
                    self.gen_cond(hll, bb, indent + 1, Some(my_latch), cond_kind, us, cond_follow, true);
                } else {
                    self.write_bb(hll, bb, indent + 1);
                    if let Some(succ) = self.cfg[bb].out_edge(0) {
                        self.gen_block(hll, succ, indent + 1, Some(my_latch));
                    }
                }

                if self.cfg[my_latch].traversal() != Traversal::DfsCodegen {
                    self.cfg[my_latch].traversal = Traversal::DfsCodegen;
                    self.write_bb(hll, my_latch, indent + 1);
                }

                if loop_kind == LoopKind::PostTested {
                    // the predicate lives in the latch, not the header; a
                    // call in mid-loop splits them
                    let cond = self.cfg[my_latch].cond().clone();
                    hll.add_posttested_loop_end(indent, &cond);
                } else {
                    hll.add_endless_loop_end(indent);
                }
            }
        }

        if let Some(follow) = loop_follow {
            self.follow_set.pop();
            if self.cfg[follow].traversal() != Traversal::DfsCodegen {
                self.gen_block(hll, follow, indent, outer_latch);
            } else {
                self.emit_goto_and_label(hll, bb, indent, follow);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn gen_cond(
        &mut self,
        hll: &mut dyn HllCode,
        bb: BlockId,
        indent: usize,
        latch: Option<BlockId>,
        kind: CondKind,
        us: UnstructKind,
        cond_follow: Option<BlockId>,
        as_loop_cond: bool,
    ) {
        // an unstructured two-way header gets a surrogate follow: the arm
        // that stays within the current loop and case
        let mut tmp_cond_follow: Option<BlockId> = None;
        let mut follows_pushed = 0usize;
        let mut gotos_pushed = 0usize;

        if kind == CondKind::Case {
            if let Some(f) = cond_follow {
                self.follow_set.push(f);
                follows_pushed += 1;
            }
        } else if let Some(f) = cond_follow {
            if us == UnstructKind::Structured {
                self.follow_set.push(f);
                follows_pushed += 1;
            } else {
                if us == UnstructKind::JumpInOutLoop {
                    let my_loop_head = if as_loop_cond {
                        Some(bb)
                    } else {
                        self.cfg[bb].loop_head()
                    };
                    self.goto_set.push(f);
                    gotos_pushed += 1;
                    if let Some(l) = latch {
                        self.goto_set.push(l);
                        gotos_pushed += 1;
                    }
                    if let Some(flh) = self.cfg[f].loop_head() {
                        if Some(flh) != my_loop_head {
                            self.goto_set.push(flh);
                            gotos_pushed += 1;
                        }
                    }
                }
                tmp_cond_follow =
                    self.cfg[bb].out_edge(if kind == CondKind::IfThen { 1 } else { 0 });
                if us == UnstructKind::JumpIntoCase {
                    if let Some(t) = tmp_cond_follow {
                        self.follow_set.push(t);
                        follows_pushed += 1;
                    }
                }
            }
        }

        // body of the header, excluding its predicate
        self.write_bb(hll, bb, indent);

        if kind == CondKind::Case {
            let info = self.cfg[bb].switch_info().clone();
            hll.add_case_cond_header(indent, &info.switch_var);
            for i in 0..self.cfg[bb].out_edges().len() {
                let case_val = Expr::Const(info.lower + i as i64);
                hll.add_case_cond_option(indent, &case_val);
                let succ = self.cfg[bb].out_edges()[i];
                if self.cfg[succ].traversal() == Traversal::DfsCodegen {
                    self.emit_goto_and_label(hll, bb, indent + 1, succ);
                } else {
                    self.gen_block(hll, succ, indent + 1, latch);
                }
                hll.add_case_cond_option_end(indent);
            }
            hll.add_case_cond_end(indent);
        } else {
            let mut cond = self.cfg[bb].cond().clone();
            if kind == CondKind::IfElse {
                cond = cond.not().simplify();
            }
            if kind == CondKind::IfThenElse {
                hll.add_if_else_cond_header(indent, &cond);
            } else {
                hll.add_if_cond_header(indent, &cond);
            }

            let first = self.cfg[bb]
                .out_edge(if kind == CondKind::IfElse { 1 } else { 0 })
                .expect("conditional header without arms");
            let loop_head_follow = self.cfg[bb]
                .loop_head()
                .and_then(|h| self.cfg[h].loop_follow());
            if self.cfg[first].traversal() == Traversal::DfsCodegen
                || loop_head_follow == Some(first)
            {
                self.emit_goto_and_label(hll, bb, indent + 1, first);
            } else {
                self.gen_block(hll, first, indent + 1, latch);
            }

            if kind == CondKind::IfThenElse {
                hll.add_if_else_cond_option(indent);
                let second = self.cfg[bb].out_edges()[1];
                if self.cfg[second].traversal() == Traversal::DfsCodegen {
                    self.emit_goto_and_label(hll, bb, indent + 1, second);
                } else {
                    self.gen_block(hll, second, indent + 1, latch);
                }
                hll.add_if_else_cond_end(indent);
            } else {
                hll.add_if_cond_end(indent);
            }
        }

        if cond_follow.is_some() {
            if us == UnstructKind::Structured || us == UnstructKind::JumpIntoCase {
                debug_assert_eq!(gotos_pushed, 0);
                for _ in 0..follows_pushed {
                    self.follow_set.pop();
                }
            } else {
                for _ in 0..gotos_pushed {
                    self.goto_set.pop();
                }
            }

            let target = tmp_cond_follow.or(cond_follow).unwrap();
            if self.cfg[target].traversal() == Traversal::DfsCodegen {
                self.emit_goto_and_label(hll, bb, indent, target);
            } else {
                self.gen_block(hll, target, indent, latch);
            }
        }
    }

    fn gen_seq(
        &mut self,
        hll: &mut dyn HllCode,
        bb: BlockId,
        indent: usize,
        latch: Option<BlockId>,
    ) {
        self.write_bb(hll, bb, indent);

        if self.cfg[bb].kind() == BlockKind::Return {
            let val = self.cfg[bb].return_val.clone();
            hll.add_return_statement(indent, val.as_ref());
            return;
        }

        if self.cfg[bb].out_edges().is_empty() {
            log::warn!("no out edge for block:\n{}", self.cfg[bb].print());
            return;
        }

        // fall through to the successor only when it stays in the same
        // loop and case region and is not owed to an enclosing construct
        let child = self.cfg[bb].out_edges()[0];
        let latch_follow = latch
            .and_then(|l| self.cfg[l].loop_head())
            .and_then(|h| self.cfg[h].loop_follow());
        let same_case = {
            let my_case = self.cfg[bb].case_head();
            my_case == self.cfg[child].case_head()
                || my_case
                    .map(|c| self.cfg[c].cond_follow() == Some(child))
                    .unwrap_or(false)
        };
        if self.cfg[child].traversal() == Traversal::DfsCodegen
            || (self.cfg[child].loop_head() != self.cfg[bb].loop_head()
                && (!self.cfg.all_parents_generated(child) || self.follow_set.contains(&child)))
            || latch_follow == Some(child)
            || !same_case
        {
            self.emit_goto_and_label(hll, bb, indent, child);
        } else {
            self.gen_block(hll, child, indent, latch);
        }
    }

    /// Emit a transfer to `dest` from inside `src`'s structure: a return
    /// when `dest` is the return block, continue/break when `dest` is the
    /// enclosing loop's head or follow, and a labeled goto otherwise.
    fn emit_goto_and_label(
        &mut self,
        hll: &mut dyn HllCode,
        src: BlockId,
        indent: usize,
        dest: BlockId,
    ) {
        if self.cfg[dest].kind() == BlockKind::Return {
            let val = self.cfg[dest].return_val.clone();
            hll.add_return_statement(indent, val.as_ref());
            return;
        }
        if let Some(head) = self.cfg[src].loop_head() {
            if head == dest {
                hll.add_continue(indent);
                return;
            }
            if self.cfg[head].loop_follow() == Some(dest) {
                hll.add_break(indent);
                return;
            }
        }
        hll.add_goto(indent, self.cfg[dest].ord());
        self.cfg[dest].hll_label = true;
        if self.cfg[dest].label_num == 0 {
            self.cfg[dest].label_num = self.cfg[dest].ord() as u32 + 1;
        }
        self.cfg.stats_mut().gotos_emitted += 1;
    }

    /// Emit the body of `bb`: its label slot and every non-control
    /// statement. Branch, case and return statements are expressed by the
    /// surrounding structure; phis have no printable form.
    fn write_bb(&mut self, hll: &mut dyn HllCode, bb: BlockId, indent: usize) {
        hll.add_label(indent, self.cfg[bb].ord());

        for rtl in self.cfg[bb].rtls() {
            for s in &rtl.stmts {
                match &s.kind {
                    StmtKind::Assign { lhs, rhs } => hll.add_assignment(indent, lhs, rhs),
                    StmtKind::Call { dest } => {
                        if dest.is_none() {
                            log::warn!(
                                "indirect call with unknown destination at 0x{:08x}",
                                rtl.addr
                            );
                        }
                        hll.add_call_statement(indent, *dest);
                    }
                    _ => {}
                }
            }
        }

        self.cfg[bb].indent_level = indent;
    }
}
