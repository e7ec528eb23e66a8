//! Expression Trees
//!
//! Expressions carried by intermediate statements: branch conditions, switch
//! selectors, assignment operands and return values. The structuring core
//! needs only a small capability set from them: clone, structural equality,
//! logical negation, simplification and printing. Subscripted locations
//! (`r24{7}`) identify an SSA definition site and are what the liveness
//! sketch tracks.

use std::fmt;

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum UnaryOp {
    /// Logical negation
    Not = 0,
    /// Arithmetic negation
    Neg = 1,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum BinaryOp {
    Add = 0,
    Sub = 1,
    Mul = 2,
    And = 3,
    Or = 4,
    Eq = 5,
    Ne = 6,
    Lt = 7,
    Le = 8,
    Gt = 9,
    Ge = 10,
    /// Unsigned comparisons keep their own operators so that inversion
    /// stays within the unsigned family.
    LtU = 11,
    LeU = 12,
    GtU = 13,
    GeU = 14,
}

impl BinaryOp {
    /// The comparison operator denoting the complement relation, if this is
    /// a comparison.
    pub fn inverted(self) -> Option<BinaryOp> {
        use BinaryOp::*;
        match self {
            Eq => Some(Ne),
            Ne => Some(Eq),
            Lt => Some(Ge),
            Ge => Some(Lt),
            Gt => Some(Le),
            Le => Some(Gt),
            LtU => Some(GeU),
            GeU => Some(LtU),
            GtU => Some(LeU),
            LeU => Some(GtU),
            _ => None,
        }
    }

    fn symbol(self) -> &'static str {
        use BinaryOp::*;
        match self {
            Add => "+",
            Sub => "-",
            Mul => "*",
            And => "&&",
            Or => "||",
            Eq => "==",
            Ne => "!=",
            Lt | LtU => "<",
            Le | LeU => "<=",
            Gt | GtU => ">",
            Ge | GeU => ">=",
        }
    }
}

/// An expression tree.
///
/// Clone-on-write semantics: the core clones an expression whenever it needs
/// to transform one (e.g. inverting a loop predicate) and never mutates an
/// expression owned by a statement in place, except through the explicit
/// `set_cond_expr` path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Expr {
    /// Integer constant
    Const(i64),
    /// Named location: a register or recovered local
    Loc(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// SSA-subscripted location: the base location as defined by the
    /// statement with the given number.
    Subscript(Box<Expr>, u32),
}

impl Expr {
    /// Convenience constructor for a named location.
    pub fn loc(name: &str) -> Expr {
        Expr::Loc(name.to_string())
    }

    /// Logical negation of this expression. The result is not simplified;
    /// call [`Expr::simplify`] to fold `!(a == b)` into `a != b`.
    pub fn not(self) -> Expr {
        Expr::Unary(UnaryOp::Not, Box::new(self))
    }

    pub fn is_subscript(&self) -> bool {
        matches!(self, Expr::Subscript(..))
    }

    /// The location under any subscript.
    pub fn base(&self) -> &Expr {
        match self {
            Expr::Subscript(base, _) => base,
            other => other,
        }
    }

    /// Bottom-up simplification.
    ///
    /// Folds constant arithmetic and comparisons, cancels double negation
    /// and pushes logical negation into comparison operators. This is the
    /// subset of rewrites the structuring core relies on when it inverts a
    /// branch predicate; anything it cannot improve is returned unchanged.
    pub fn simplify(self) -> Expr {
        match self {
            Expr::Unary(UnaryOp::Not, inner) => match inner.simplify() {
                // !(a op b) with a comparison op becomes (a inv-op b)
                Expr::Binary(op, l, r) if op.inverted().is_some() => {
                    Expr::Binary(op.inverted().unwrap(), l, r)
                }
                // !!x == x
                Expr::Unary(UnaryOp::Not, x) => *x,
                Expr::Const(c) => Expr::Const((c == 0) as i64),
                other => Expr::Unary(UnaryOp::Not, Box::new(other)),
            },
            Expr::Unary(op, inner) => Expr::Unary(op, Box::new(inner.simplify())),
            Expr::Binary(op, l, r) => {
                let l = l.simplify();
                let r = r.simplify();
                if let (Expr::Const(a), Expr::Const(b)) = (&l, &r) {
                    if let Some(folded) = fold_const(op, *a, *b) {
                        return Expr::Const(folded);
                    }
                }
                Expr::Binary(op, Box::new(l), Box::new(r))
            }
            Expr::Subscript(base, def) => Expr::Subscript(Box::new(base.simplify()), def),
            leaf => leaf,
        }
    }

    /// Collect every location (plain or subscripted) used by this
    /// expression into `out`.
    pub fn locations_into(&self, out: &mut Vec<Expr>) {
        match self {
            Expr::Const(_) => {}
            Expr::Loc(_) => out.push(self.clone()),
            Expr::Subscript(..) => out.push(self.clone()),
            Expr::Unary(_, inner) => inner.locations_into(out),
            Expr::Binary(_, l, r) => {
                l.locations_into(out);
                r.locations_into(out);
            }
        }
    }
}

fn fold_const(op: BinaryOp, a: i64, b: i64) -> Option<i64> {
    use BinaryOp::*;
    Some(match op {
        Add => a.wrapping_add(b),
        Sub => a.wrapping_sub(b),
        Mul => a.wrapping_mul(b),
        Eq => (a == b) as i64,
        Ne => (a != b) as i64,
        Lt => (a < b) as i64,
        Le => (a <= b) as i64,
        Gt => (a > b) as i64,
        Ge => (a >= b) as i64,
        LtU => ((a as u64) < b as u64) as i64,
        LeU => (a as u64 <= b as u64) as i64,
        GtU => (a as u64 > b as u64) as i64,
        GeU => (a as u64 >= b as u64) as i64,
        And | Or => return None,
    })
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(c) => write!(f, "{}", c),
            Expr::Loc(name) => write!(f, "{}", name),
            Expr::Unary(UnaryOp::Not, inner) => write!(f, "!({})", inner),
            Expr::Unary(UnaryOp::Neg, inner) => write!(f, "-({})", inner),
            Expr::Binary(op, l, r) => write!(f, "{} {} {}", l, op.symbol(), r),
            Expr::Subscript(base, def) => write!(f, "{}{{{}}}", base, def),
        }
    }
}
