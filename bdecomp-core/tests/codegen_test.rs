//! Structured emission tests: scenario outputs, bracket balance and the
//! goto/continue/break selection rules.

mod utils;

use bdecomp_core::decompiler::cfg::{BlockKind, ControlFlowGraph, Traversal};
use bdecomp_core::decompiler::codegen::PseudoCWriter;
use utils::*;

fn emit(cfg: &mut ControlFlowGraph) -> String {
    let mut writer = PseudoCWriter::new();
    cfg.generate_code(&mut writer).expect("emission failed");
    writer.finish()
}

#[test]
fn pretested_loop_emission() {
    // A -> B(cond) -> {C -> B, D}
    let mut cfg = ControlFlowGraph::new();
    let a = seq_block(&mut cfg, 0x100, "v0", 1);
    let b = cond_block(&mut cfg, 0x104, "c");
    let c = oneway_block(&mut cfg, 0x108, "v1", 2);
    let d = ret_block(&mut cfg, 0x10c);
    cfg.add_edge(a, b);
    cfg.add_edge(b, c);
    cfg.add_edge(b, d);
    cfg.add_edge(c, b);

    let out = emit(&mut cfg);
    assert_eq!(
        out,
        "    v0 = 1;\n\
         \x20   while (c) {\n\
         \x20       v1 = 2;\n\
         \x20   }\n\
         \x20   return;\n"
    );
}

#[test]
fn posttested_single_block_loop_emission() {
    // A -> B(body + cond) -> {B, C}
    let mut cfg = ControlFlowGraph::new();
    let a = seq_block(&mut cfg, 0x100, "v0", 1);
    let b = cond_block_with_body(&mut cfg, 0x104, "v1", 2, "c");
    let c = ret_block(&mut cfg, 0x108);
    cfg.add_edge(a, b);
    cfg.add_edge(b, b);
    cfg.add_edge(b, c);

    let out = emit(&mut cfg);
    assert_eq!(
        out,
        "    v0 = 1;\n\
         \x20   do {\n\
         \x20       v1 = 2;\n\
         \x20   } while (c);\n\
         \x20   return;\n"
    );
}

#[test]
fn if_then_else_emission() {
    let mut cfg = ControlFlowGraph::new();
    let a = cond_block_with_body(&mut cfg, 0x100, "v0", 1, "c");
    let t = seq_block(&mut cfg, 0x104, "v1", 2);
    let e = seq_block(&mut cfg, 0x108, "v2", 3);
    let j = ret_block(&mut cfg, 0x10c);
    cfg.add_edge(a, t);
    cfg.add_edge(a, e);
    cfg.add_edge(t, j);
    cfg.add_edge(e, j);

    let out = emit(&mut cfg);
    assert_eq!(
        out,
        "    v0 = 1;\n\
         \x20   if (c) {\n\
         \x20       v1 = 2;\n\
         \x20   } else {\n\
         \x20       v2 = 3;\n\
         \x20   }\n\
         \x20   return;\n"
    );
}

#[test]
fn switch_emission() {
    let mut cfg = ControlFlowGraph::new();
    let s = case_block(&mut cfg, 0x100, "sel", 10);
    let a0 = seq_block(&mut cfg, 0x104, "v0", 0);
    let a1 = seq_block(&mut cfg, 0x108, "v1", 1);
    let a2 = seq_block(&mut cfg, 0x10c, "v2", 2);
    let f = ret_block(&mut cfg, 0x110);
    cfg.add_edge(s, a0);
    cfg.add_edge(s, a1);
    cfg.add_edge(s, a2);
    cfg.add_edge(a0, f);
    cfg.add_edge(a1, f);
    cfg.add_edge(a2, f);

    let out = emit(&mut cfg);
    assert_eq!(
        out,
        "    switch (sel) {\n\
         \x20   case 10:\n\
         \x20       v0 = 0;\n\
         \x20       break;\n\
         \x20   case 11:\n\
         \x20       v1 = 1;\n\
         \x20       break;\n\
         \x20   case 12:\n\
         \x20       v2 = 2;\n\
         \x20       break;\n\
         \x20   }\n\
         \x20   return;\n"
    );
}

/// The jump-out-of-loop graph: `C` escapes the post-tested loop `H..L`
/// straight to `F`, which is past the loop's follow `D`.
fn jump_out_graph() -> ControlFlowGraph {
    let mut cfg = ControlFlowGraph::new();
    let a = seq_block(&mut cfg, 0x100, "v0", 0);
    let h = seq_block(&mut cfg, 0x104, "vh", 1);
    let c = cond_block(&mut cfg, 0x108, "c");
    let x = seq_block(&mut cfg, 0x10c, "vx", 2);
    let l = cond_block_with_body(&mut cfg, 0x110, "vl", 3, "lc");
    let d = oneway_block(&mut cfg, 0x114, "vd", 4);
    let f = seq_block(&mut cfg, 0x118, "vf", 5);
    let g = ret_block(&mut cfg, 0x11c);
    cfg.add_edge(a, h);
    cfg.add_edge(h, c);
    cfg.add_edge(c, f); // then: out of the loop
    cfg.add_edge(c, x); // else: loop body
    cfg.add_edge(x, l);
    cfg.add_edge(l, h); // back edge
    cfg.add_edge(l, d); // loop exit
    cfg.add_edge(d, f);
    cfg.add_edge(f, g);
    cfg
}

#[test]
fn jump_out_of_loop_emits_goto() {
    let mut cfg = jump_out_graph();
    let out = emit(&mut cfg);
    assert_eq!(
        out,
        "    v0 = 0;\n\
         \x20   do {\n\
         \x20       vh = 1;\n\
         \x20       if (c) {\n\
         \x20           goto L1;\n\
         \x20       }\n\
         \x20       vx = 2;\n\
         \x20       vl = 3;\n\
         \x20   } while (lc);\n\
         \x20   vd = 4;\n\
         L1:\n\
         \x20   vf = 5;\n\
         \x20   return;\n"
    );
    assert_eq!(cfg.stats().gotos_emitted, 1);
}

#[test]
fn jump_back_to_header_emits_continue() {
    // while (hc) { if (!(c)) continue; L-body }
    let mut cfg = ControlFlowGraph::new();
    let a = seq_block(&mut cfg, 0x100, "v0", 0);
    let h = cond_block(&mut cfg, 0x104, "hc");
    let b1 = cond_block(&mut cfg, 0x108, "c");
    let l = oneway_block(&mut cfg, 0x10c, "vl", 1);
    let x = ret_block(&mut cfg, 0x110);
    cfg.add_edge(a, h);
    cfg.add_edge(h, b1); // then: body
    cfg.add_edge(h, x); // else: exit
    cfg.add_edge(b1, l); // then: rest of body
    cfg.add_edge(b1, h); // else: straight back to the test
    cfg.add_edge(l, h); // back edge (the latch)

    let out = emit(&mut cfg);
    assert_eq!(
        out,
        "    v0 = 0;\n\
         \x20   while (hc) {\n\
         \x20       if (!(c)) {\n\
         \x20           continue;\n\
         \x20       }\n\
         \x20       vl = 1;\n\
         \x20   }\n\
         \x20   return;\n"
    );
    assert_eq!(cfg.stats().gotos_emitted, 0, "a continue needs no label");
}

#[test]
fn jump_to_loop_follow_emits_break() {
    // do { if (c) break; .. } while (lc); D..
    let mut cfg = ControlFlowGraph::new();
    let a = seq_block(&mut cfg, 0x100, "v0", 0);
    let h = seq_block(&mut cfg, 0x104, "vh", 1);
    let c = cond_block(&mut cfg, 0x108, "c");
    let x = seq_block(&mut cfg, 0x10c, "vx", 2);
    let l = cond_block_with_body(&mut cfg, 0x110, "vl", 3, "lc");
    let d = seq_block(&mut cfg, 0x114, "vd", 4);
    let e = ret_block(&mut cfg, 0x118);
    cfg.add_edge(a, h);
    cfg.add_edge(h, c);
    cfg.add_edge(c, d); // then: the loop's own follow
    cfg.add_edge(c, x); // else: loop body
    cfg.add_edge(x, l);
    cfg.add_edge(l, h); // back edge
    cfg.add_edge(l, d); // loop exit
    cfg.add_edge(d, e);

    let out = emit(&mut cfg);
    assert!(
        out.contains("break;"),
        "escape to the loop follow must be a break: \n{}",
        out
    );
    assert_eq!(cfg.stats().gotos_emitted, 0, "a break needs no label");
}

#[test]
fn emitter_calls_are_bracket_balanced() {
    let mut cfg = jump_out_graph();
    let mut hll = RecordingHll::new();
    cfg.generate_code(&mut hll).expect("emission failed");
    hll.assert_balanced();
    assert_eq!(hll.count(&Event::PosttestHeader), 1);
    assert_eq!(hll.count(&Event::IfHeader), 1);
    assert_eq!(hll.count(&Event::Return), 1);
}

#[test]
fn switch_calls_are_bracket_balanced() {
    let mut cfg = ControlFlowGraph::new();
    let s = case_block(&mut cfg, 0x100, "sel", 0);
    let a0 = seq_block(&mut cfg, 0x104, "v0", 0);
    let a1 = seq_block(&mut cfg, 0x108, "v1", 1);
    let f = ret_block(&mut cfg, 0x10c);
    cfg.add_edge(s, a0);
    cfg.add_edge(s, a1);
    cfg.add_edge(a0, f);
    cfg.add_edge(a1, f);

    let mut hll = RecordingHll::new();
    cfg.generate_code(&mut hll).expect("emission failed");
    hll.assert_balanced();
    assert_eq!(hll.count(&Event::CaseOption), 2);
    assert_eq!(hll.count(&Event::CaseOptionEnd), 2);
}

#[test]
fn every_reachable_block_is_covered_once() {
    let mut cfg = jump_out_graph();
    let mut hll = RecordingHll::new();
    cfg.generate_code(&mut hll).expect("emission failed");

    for id in cfg.block_ids() {
        assert!(
            cfg[id].traversal() == Traversal::DfsCodegen || cfg[id].hll_label(),
            "block {} neither emitted nor labeled",
            id
        );
    }
}

#[test]
fn seq_block_without_out_edges_stops_quietly() {
    let mut cfg = ControlFlowGraph::new();
    let a = seq_block(&mut cfg, 0x100, "v0", 1);
    let b = cfg.add_block(
        BlockKind::Fall,
        vec![rtl(0x104, vec![assign(0x104, "v1", 2)])],
    );
    cfg.add_edge(a, b);

    let out = emit(&mut cfg);
    assert_eq!(out, "    v0 = 1;\n    v1 = 2;\n");
}
