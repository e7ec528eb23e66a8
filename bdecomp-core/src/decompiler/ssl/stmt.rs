//! Intermediate Statements and RTLs
//!
//! The statement layer the structuring core consumes. An RTL is a list of
//! statements sharing one source address; a basic block holds an ordered
//! sequence of RTLs and treats their contents as opaque except for the
//! capabilities exposed here: branch conditions, switch descriptors, call
//! targets, and the definition/use sets needed by liveness.
//!
//! # Statement Kinds
//! - **Assign**: `lhs := rhs`
//! - **Phi**: SSA merge; one operand slot per in-edge of the owning block
//! - **Branch**: conditional transfer with a comparison kind and condition
//! - **Call**: direct (fixed target) or indirect (unknown target)
//! - **Case**: N-way transfer described by a switch descriptor
//! - **Return**: procedure exit with optional value
//! - **Other**: unmodeled side effect; emitted verbatim as a comment

use super::exp::Expr;

/// Native address.
pub type Addr = u32;

/// Statement number, unique within a procedure. Subscripted locations refer
/// to their defining statement by this number.
pub type StmtId = u32;

/// Branch comparison kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BranchKind {
    Je = 0,
    Jne = 1,
    Jl = 2,
    Jg = 3,
    Jle = 4,
    Jge = 5,
    Jult = 6,
    Jugt = 7,
    Jule = 8,
    Juge = 9,
    /// Branch if negative
    Jneg = 10,
    /// Branch on overflow
    Jof = 11,
}

/// How a switch statement locates its targets. Opaque to the structuring
/// core; preserved for the back end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SwitchForm {
    /// Jump table of absolute addresses
    Absolute = 0,
    /// Jump table of offsets from the table base
    Offset = 1,
    /// Computed target with no recovered table
    Indirect = 2,
}

/// Switch descriptor attached to a Case statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchInfo {
    /// The expression being switched on
    pub switch_var: Expr,
    /// Lowest case label
    pub lower: i64,
    /// Highest case label
    pub upper: i64,
    pub form: SwitchForm,
}

/// Statement payload.
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Assign {
        lhs: Expr,
        rhs: Expr,
    },
    /// SSA phi. `args[i]` is the number of the statement whose definition
    /// flows in along in-edge `i` of the owning block, if known.
    Phi {
        lhs: Expr,
        args: Vec<Option<StmtId>>,
    },
    Branch {
        kind: BranchKind,
        cond: Expr,
    },
    Call {
        /// Fixed destination, or `None` for an indirect call.
        dest: Option<Addr>,
    },
    Case(SwitchInfo),
    Return {
        value: Option<Expr>,
    },
    Other,
}

/// A numbered intermediate statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub number: StmtId,
    pub kind: StmtKind,
}

impl Stmt {
    pub fn new(number: StmtId, kind: StmtKind) -> Stmt {
        Stmt { number, kind }
    }

    pub fn is_branch(&self) -> bool {
        matches!(self.kind, StmtKind::Branch { .. })
    }

    pub fn is_call(&self) -> bool {
        matches!(self.kind, StmtKind::Call { .. })
    }

    pub fn is_phi(&self) -> bool {
        matches!(self.kind, StmtKind::Phi { .. })
    }

    /// Branch condition, if this is a branch.
    pub fn cond_expr(&self) -> Option<&Expr> {
        match &self.kind {
            StmtKind::Branch { cond, .. } => Some(cond),
            _ => None,
        }
    }

    /// Replace the branch condition. Returns false when this is not a
    /// branch statement.
    pub fn set_cond_expr(&mut self, e: Expr) -> bool {
        match &mut self.kind {
            StmtKind::Branch { cond, .. } => {
                *cond = e;
                true
            }
            _ => false,
        }
    }

    pub fn branch_kind(&self) -> Option<BranchKind> {
        match &self.kind {
            StmtKind::Branch { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn switch_info(&self) -> Option<&SwitchInfo> {
        match &self.kind {
            StmtKind::Case(info) => Some(info),
            _ => None,
        }
    }

    /// Fixed call target, if this is a direct call.
    pub fn call_target(&self) -> Option<Addr> {
        match &self.kind {
            StmtKind::Call { dest } => *dest,
            _ => None,
        }
    }

    /// Locations defined by this statement, subscripted with this
    /// statement's number (the definition site).
    pub fn definitions(&self) -> Vec<Expr> {
        match &self.kind {
            StmtKind::Assign { lhs, .. } | StmtKind::Phi { lhs, .. } => {
                vec![Expr::Subscript(Box::new(lhs.clone()), self.number)]
            }
            _ => Vec::new(),
        }
    }

    /// Locations used by this statement. Phi operands are deliberately
    /// excluded; they are routed per predecessor by the liveness pass.
    pub fn uses(&self) -> Vec<Expr> {
        let mut out = Vec::new();
        match &self.kind {
            StmtKind::Assign { rhs, .. } => rhs.locations_into(&mut out),
            StmtKind::Branch { cond, .. } => cond.locations_into(&mut out),
            StmtKind::Case(info) => info.switch_var.locations_into(&mut out),
            StmtKind::Return { value: Some(v) } => v.locations_into(&mut out),
            _ => {}
        }
        out
    }

    /// Simplify every expression held by this statement.
    pub fn simplify(&mut self) {
        match &mut self.kind {
            StmtKind::Assign { lhs, rhs } => {
                *lhs = std::mem::replace(lhs, Expr::Const(0)).simplify();
                *rhs = std::mem::replace(rhs, Expr::Const(0)).simplify();
            }
            StmtKind::Branch { cond, .. } => {
                *cond = std::mem::replace(cond, Expr::Const(0)).simplify();
            }
            StmtKind::Case(info) => {
                info.switch_var =
                    std::mem::replace(&mut info.switch_var, Expr::Const(0)).simplify();
            }
            StmtKind::Return { value: Some(v) } => {
                *v = std::mem::replace(v, Expr::Const(0)).simplify();
            }
            _ => {}
        }
    }
}

/// A register transfer list: the statements decoded from one instruction,
/// tagged with its source address. Address 0 marks synthetic RTLs (orphan
/// delay-slot instructions, prepended phi assignments).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Rtl {
    pub addr: Addr,
    pub stmts: Vec<Stmt>,
}

impl Rtl {
    pub fn new(addr: Addr) -> Rtl {
        Rtl {
            addr,
            stmts: Vec::new(),
        }
    }

    pub fn with_stmts(addr: Addr, stmts: Vec<Stmt>) -> Rtl {
        Rtl { addr, stmts }
    }

    pub fn append_stmt(&mut self, s: Stmt) {
        self.stmts.push(s);
    }

    /// The high-level statement of this RTL: the last statement, which is
    /// the control-transfer statement when one is present.
    pub fn hl_stmt(&self) -> Option<&Stmt> {
        self.stmts.last()
    }

    pub fn simplify(&mut self) {
        for s in &mut self.stmts {
            s.simplify();
        }
    }
}
