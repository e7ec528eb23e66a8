//! Error Handling
//!
//! Error types for the decompiler core using `thiserror`.
//!
//! Two classes of failure are distinguished. Recoverable conditions (bad
//! serialized input, a graph with no entry block) are surfaced as
//! `DecompilerError` values. Violations of structural invariants (asking a
//! non-branch block for its condition, inconsistent loop stamps) are
//! programmer errors and panic with a diagnostic instead.

use thiserror::Error;

/// Decompiler core error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecompilerError {
    /// Serialized block stream is malformed or truncated.
    #[error("deserialization error: {0}")]
    Deserialize(String),

    /// An out-edge index in a serialized block does not resolve to a block.
    #[error("dangling out-edge index {0} while linking deserialized blocks")]
    DanglingEdge(u32),

    /// The graph has no entry block, so there is nothing to traverse.
    #[error("control flow graph has no entry block")]
    NoEntry,

    /// Code generation was requested before the structuring pipeline ran.
    #[error("code generation error: {0}")]
    CodeGen(String),
}
