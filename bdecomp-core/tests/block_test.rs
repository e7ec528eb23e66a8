//! Block model tests: addresses, conditions, edges and the RTL helpers.

mod utils;

use bdecomp_core::decompiler::cfg::{BlockKind, ControlFlowGraph};
use bdecomp_core::decompiler::ssl::{BranchKind, Expr, Rtl, Stmt, StmtKind};
use utils::*;

#[test]
fn low_addr_skips_orphan_delay_slot_instructions() {
    let mut cfg = ControlFlowGraph::new();
    // an orphan instruction lifted from a delay slot carries address 0
    let b = cfg.add_block(
        BlockKind::Oneway,
        vec![
            rtl(0, vec![assign(1, "v0", 1)]),
            rtl(0x2000, vec![assign(2, "v1", 2)]),
        ],
    );
    assert_eq!(cfg[b].low_addr(), 0x2000);
    assert_eq!(cfg[b].hi_addr(), 0x2000);
}

#[test]
fn low_addr_keeps_genuine_address_zero() {
    let mut cfg = ControlFlowGraph::new();
    // a 286-style main at offset 0: the next RTL is close by, so address 0
    // is real
    let b = cfg.add_block(
        BlockKind::Oneway,
        vec![
            rtl(0, vec![assign(1, "v0", 1)]),
            rtl(0x8, vec![assign(2, "v1", 2)]),
        ],
    );
    assert_eq!(cfg[b].low_addr(), 0);
}

#[test]
fn cond_reads_and_writes_the_branch() {
    let mut cfg = ControlFlowGraph::new();
    let b = cond_block(&mut cfg, 0x100, "c");
    assert_eq!(*cfg[b].cond(), Expr::loc("c"));

    cfg[b].set_cond(Expr::loc("other"));
    assert_eq!(*cfg[b].cond(), Expr::loc("other"));
}

#[test]
fn is_jmp_z_picks_the_equality_arm() {
    let mut cfg = ControlFlowGraph::new();
    let b = cond_block(&mut cfg, 0x100, "c"); // branch kind Je
    let t = ret_block(&mut cfg, 0x104);
    let e = ret_block(&mut cfg, 0x108);
    cfg.add_edge(b, t);
    cfg.add_edge(b, e);

    assert!(cfg[b].is_jmp_z(t), "Je takes the then edge on zero");
    assert!(!cfg[b].is_jmp_z(e));

    let mut cfg2 = ControlFlowGraph::new();
    let b2 = cfg2.add_block(
        BlockKind::Twoway,
        vec![Rtl::with_stmts(
            0x100,
            vec![Stmt::new(
                1,
                StmtKind::Branch {
                    kind: BranchKind::Jl,
                    cond: Expr::loc("c"),
                },
            )],
        )],
    );
    let t2 = ret_block(&mut cfg2, 0x104);
    let e2 = ret_block(&mut cfg2, 0x108);
    cfg2.add_edge(b2, t2);
    cfg2.add_edge(b2, e2);
    assert!(
        !cfg2[b2].is_jmp_z(t2),
        "non-equality branches are never jump-on-zero"
    );
}

#[test]
fn prepend_stmt_merges_into_a_synthetic_rtl() {
    let mut cfg = ControlFlowGraph::new();
    let b = seq_block(&mut cfg, 0x100, "v0", 1);

    // first prepend creates the address-0 RTL
    cfg[b].prepend_stmt(assign(10, "p0", 0));
    assert_eq!(cfg[b].rtls().len(), 2);
    assert_eq!(cfg[b].rtls()[0].addr, 0);

    // second prepend appends to the same RTL
    cfg[b].prepend_stmt(assign(11, "p1", 0));
    assert_eq!(cfg[b].rtls().len(), 2);
    assert_eq!(cfg[b].rtls()[0].stmts.len(), 2);
}

#[test]
fn call_dest_is_explicit_about_indirect_calls() {
    let mut cfg = ControlFlowGraph::new();
    let direct = cfg.add_block(
        BlockKind::Call,
        vec![Rtl::with_stmts(
            0x100,
            vec![Stmt::new(1, StmtKind::Call { dest: Some(0x4000) })],
        )],
    );
    let indirect = cfg.add_block(
        BlockKind::Call,
        vec![Rtl::with_stmts(
            0x104,
            vec![Stmt::new(2, StmtKind::Call { dest: None })],
        )],
    );
    let not_a_call = seq_block(&mut cfg, 0x108, "v0", 1);

    assert_eq!(cfg[direct].call_dest(), Some(0x4000));
    assert_eq!(cfg[indirect].call_dest(), None);
    assert_eq!(cfg[not_a_call].call_dest(), None);
}

#[test]
fn delete_edge_removes_both_directions() {
    let mut cfg = ControlFlowGraph::new();
    let a = seq_block(&mut cfg, 0x100, "v0", 1);
    let b = ret_block(&mut cfg, 0x104);
    cfg.add_edge(a, b);
    assert!(cfg[a].out_edges().contains(&b));
    assert!(cfg[b].in_edges().contains(&a));

    cfg.delete_edge(a, b);
    assert!(cfg[a].out_edges().is_empty());
    assert!(cfg[b].in_edges().is_empty());
}

#[test]
fn set_rtls_takes_ownership_and_replaces() {
    let mut cfg = ControlFlowGraph::new();
    let b = seq_block(&mut cfg, 0x100, "v0", 1);
    cfg[b].set_rtls(vec![rtl(0x200, vec![assign(5, "w", 9)])]);
    assert_eq!(cfg[b].rtls().len(), 1);
    assert_eq!(cfg[b].rtls()[0].addr, 0x200);
}

#[test]
fn correct_out_edge_matches_by_address() {
    let mut cfg = ControlFlowGraph::new();
    let a = cond_block(&mut cfg, 0x100, "c");
    let t = seq_block(&mut cfg, 0x104, "v1", 1);
    let e = seq_block(&mut cfg, 0x108, "v2", 2);
    cfg.add_edge(a, t);
    cfg.add_edge(a, e);

    assert_eq!(cfg.correct_out_edge(a, 0x108), Some(e));
    assert_eq!(cfg.correct_out_edge(a, 0x10c), None);
}

#[test]
fn which_pred_returns_the_in_edge_index() {
    let mut cfg = ControlFlowGraph::new();
    let a = seq_block(&mut cfg, 0x100, "v0", 1);
    let b = seq_block(&mut cfg, 0x104, "v1", 2);
    let j = ret_block(&mut cfg, 0x108);
    cfg.add_edge(a, j);
    cfg.add_edge(b, j);

    assert_eq!(cfg.which_pred(j, a), 0);
    assert_eq!(cfg.which_pred(j, b), 1);
}

#[test]
fn print_names_the_kind_and_contents() {
    let mut cfg = ControlFlowGraph::new();
    let b = cond_block_with_body(&mut cfg, 0x100, "v0", 1, "c");
    let dump = cfg[b].print();
    assert!(dump.contains("Twoway BB"));
    assert!(dump.contains("v0 := 1"));
    assert!(dump.contains("branch if c"));
}

#[test]
fn expressions_simplify_through_negation() {
    use bdecomp_core::decompiler::ssl::BinaryOp;

    let cmp = Expr::Binary(
        BinaryOp::Eq,
        Box::new(Expr::loc("x")),
        Box::new(Expr::Const(0)),
    );
    let inverted = cmp.clone().not().simplify();
    assert_eq!(
        inverted,
        Expr::Binary(
            BinaryOp::Ne,
            Box::new(Expr::loc("x")),
            Box::new(Expr::Const(0)),
        )
    );

    let double = cmp.clone().not().not().simplify();
    assert_eq!(double, cmp);

    let folded = Expr::Binary(
        BinaryOp::Add,
        Box::new(Expr::Const(2)),
        Box::new(Expr::Const(3)),
    )
    .simplify();
    assert_eq!(folded, Expr::Const(5));
}
