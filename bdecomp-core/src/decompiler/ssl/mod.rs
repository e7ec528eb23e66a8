//! Semantic Statement Layer
//!
//! Expressions, statements and RTLs as consumed by the control-flow core.
//! Produced by the instruction decoder; the structuring passes read but
//! never rewrite them, apart from condition replacement and statement
//! prepending on the owning block.

pub mod exp;
pub mod stmt;

pub use exp::{BinaryOp, Expr, UnaryOp};
pub use stmt::{Addr, BranchKind, Rtl, Stmt, StmtId, StmtKind, SwitchForm, SwitchInfo};
