//! Decompiler Core
//!
//! Control-flow structuring and high-level code generation for one
//! procedure at a time. The stages cooperate through labels on the blocks
//! of a [`cfg::ControlFlowGraph`]:
//!
//! 1. **Block model** (`cfg::block`): kinds, RTLs, edges, structuring labels
//! 2. **Traversals** (`cfg::traversal`): loop stamps and orderings
//! 3. **Loop analysis** (`cfg::loops`): headers, latches, follows
//! 4. **Conditional analysis** (`cfg::conds`): post-dominators, if/case
//!    classification, unstructured demotion
//! 5. **Emission** (`codegen`): the recursive structured emitter over the
//!    [`codegen::HllCode`] backend
//!
//! Structuring mutates only labels; the instruction contents and the edge
//! set are never altered, and every pass is single-threaded and
//! deterministic. Two procedures never share blocks, so a program's
//! procedures can be processed independently.

pub mod cfg;
pub mod codegen;
pub mod error;
pub mod serialize;
pub mod ssl;

pub use cfg::{BasicBlock, BlockId, BlockKind, ControlFlowGraph, StructuringStats};
pub use codegen::{HllCode, PseudoCWriter, StructuredEmitter};
pub use error::DecompilerError;

use anyhow::Context;

/// Structure a procedure's CFG and render it as pseudo-C.
///
/// Convenience driver over the pipeline: simplify, structure, emit, and
/// resolve labels. The statistics collected along the way stay on the
/// graph.
pub fn decompile_proc(cfg: &mut ControlFlowGraph) -> anyhow::Result<String> {
    cfg.simplify();
    cfg.structure();
    let mut writer = PseudoCWriter::new();
    cfg.generate_code(&mut writer)
        .context("structured emission failed")?;
    Ok(writer.finish())
}
