//! Liveness Sketch
//!
//! Backwards liveness over blocks, kept only as deep as the structuring
//! core needs it: live-in sets per block, phi operands routed per
//! predecessor, and an interference map assigning fresh local numbers to
//! subscripted locations that stay live across a differing definition of
//! the same base location.

use std::collections::{BTreeSet, HashMap};

use super::block::BlockId;
use super::ControlFlowGraph;
use crate::decompiler::ssl::{Expr, StmtKind};

/// Interfering subscripted locations, each mapped to the local variable
/// number it was renamed to.
pub type InterferenceGraph = HashMap<Expr, u32>;

impl ControlFlowGraph {
    /// Locations live at the bottom of `bb`: the union of the live-in sets
    /// of its successors, plus the phi operand each successor draws from
    /// this block. Phi operands are routed per predecessor so that only
    /// the definition flowing along this edge is kept alive.
    pub fn live_out(&self, bb: BlockId) -> BTreeSet<Expr> {
        let mut live = BTreeSet::new();
        for &succ in self[bb].out_edges() {
            live.extend(self[succ].live_in().iter().cloned());
            let j = self.which_pred(succ, bb);
            // phi assignments sit in the first RTL of the successor
            let Some(first) = self[succ].rtls().first() else {
                continue;
            };
            for s in &first.stmts {
                if let StmtKind::Phi { lhs, args } = &s.kind {
                    if let Some(def) = args.get(j).copied().flatten() {
                        live.insert(Expr::Subscript(Box::new(lhs.clone()), def));
                    }
                }
            }
        }
        live
    }

    /// One backwards transfer over `bb`. Definitions kill uses;
    /// subscripted uses that meet a live location with the same base but
    /// a different definition are recorded in `ig` and assigned the next
    /// local number. Returns true when the block's live-in set changed.
    pub fn calc_liveness(
        &mut self,
        bb: BlockId,
        ig: &mut InterferenceGraph,
        local_num: &mut u32,
    ) -> bool {
        let mut live = self.live_out(bb);

        for rtl in self[bb].rtls().iter().rev() {
            for s in rtl.stmts.iter().rev() {
                for def in s.definitions() {
                    live.remove(&def);
                }
                // phi operands flow per predecessor, not here
                if s.is_phi() {
                    continue;
                }
                for u in s.uses() {
                    if !u.is_subscript() {
                        continue;
                    }
                    let clashes = live
                        .iter()
                        .any(|l| l.is_subscript() && l.base() == u.base() && *l != u);
                    if clashes {
                        if !ig.contains_key(&u) {
                            log::debug!("interference of {}, assigned local{}", u, *local_num);
                            ig.insert(u, *local_num);
                            *local_num += 1;
                        }
                        // the clashing use is renamed, so it must not flow
                        // further up as a liveness
                    } else {
                        live.insert(u);
                    }
                }
            }
        }

        if live != *self[bb].live_in() {
            self[bb].live_in = live;
            true
        } else {
            false
        }
    }

    /// Iterate [`calc_liveness`](Self::calc_liveness) over all blocks to a
    /// fixpoint. Returns the number of interfering locations found.
    pub fn compute_liveness(&mut self, ig: &mut InterferenceGraph) -> usize {
        let mut local_num = 0;
        let ids: Vec<BlockId> = self.block_ids().collect();
        let mut changed = true;
        while changed {
            changed = false;
            for &bb in ids.iter().rev() {
                if self.calc_liveness(bb, ig, &mut local_num) {
                    changed = true;
                }
            }
        }
        local_num as usize
    }
}
