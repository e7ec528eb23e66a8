//! Test Utilities
//!
//! Shared helpers for the structuring and code-generation tests: block
//! builders for the common CFG shapes and a recording HLL backend that
//! checks bracket nesting.

use bdecomp_core::decompiler::cfg::{BlockId, BlockKind, ControlFlowGraph};
use bdecomp_core::decompiler::codegen::HllCode;
use bdecomp_core::decompiler::ssl::{
    Addr, BranchKind, Expr, Rtl, Stmt, StmtKind, SwitchForm, SwitchInfo,
};

pub fn assign(number: u32, name: &str, val: i64) -> Stmt {
    Stmt::new(
        number,
        StmtKind::Assign {
            lhs: Expr::loc(name),
            rhs: Expr::Const(val),
        },
    )
}

pub fn branch(number: u32, cond: &str) -> Stmt {
    Stmt::new(
        number,
        StmtKind::Branch {
            kind: BranchKind::Je,
            cond: Expr::loc(cond),
        },
    )
}

pub fn rtl(addr: Addr, stmts: Vec<Stmt>) -> Rtl {
    Rtl::with_stmts(addr, stmts)
}

/// A fall-through block with a single visible assignment.
pub fn seq_block(cfg: &mut ControlFlowGraph, addr: Addr, var: &str, val: i64) -> BlockId {
    cfg.add_block(BlockKind::Fall, vec![rtl(addr, vec![assign(addr, var, val)])])
}

/// A one-way block with a single visible assignment.
pub fn oneway_block(cfg: &mut ControlFlowGraph, addr: Addr, var: &str, val: i64) -> BlockId {
    cfg.add_block(
        BlockKind::Oneway,
        vec![rtl(addr, vec![assign(addr, var, val)])],
    )
}

/// A two-way block whose only statement is its branch.
pub fn cond_block(cfg: &mut ControlFlowGraph, addr: Addr, cond: &str) -> BlockId {
    cfg.add_block(BlockKind::Twoway, vec![rtl(addr, vec![branch(addr, cond)])])
}

/// A two-way block with a visible assignment ahead of its branch.
pub fn cond_block_with_body(
    cfg: &mut ControlFlowGraph,
    addr: Addr,
    var: &str,
    val: i64,
    cond: &str,
) -> BlockId {
    cfg.add_block(
        BlockKind::Twoway,
        vec![rtl(addr, vec![assign(addr, var, val), branch(addr, cond)])],
    )
}

/// A return block with no return value.
pub fn ret_block(cfg: &mut ControlFlowGraph, addr: Addr) -> BlockId {
    cfg.add_block(
        BlockKind::Return,
        vec![rtl(
            addr,
            vec![Stmt::new(addr, StmtKind::Return { value: None })],
        )],
    )
}

/// An N-way block switching on `var` with case labels starting at `lower`.
pub fn case_block(cfg: &mut ControlFlowGraph, addr: Addr, var: &str, lower: i64) -> BlockId {
    cfg.add_block(
        BlockKind::Nway,
        vec![rtl(
            addr,
            vec![Stmt::new(
                addr,
                StmtKind::Case(SwitchInfo {
                    switch_var: Expr::loc(var),
                    lower,
                    upper: lower + 16,
                    form: SwitchForm::Absolute,
                }),
            )],
        )],
    )
}

/// One call on the HLL backend, as recorded by [`RecordingHll`].
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Label(usize),
    Goto(usize),
    Continue,
    Break,
    Return,
    PretestHeader,
    PretestEnd,
    PosttestHeader,
    PosttestEnd,
    EndlessHeader,
    EndlessEnd,
    IfHeader,
    IfEnd,
    IfElseHeader,
    ElseOption,
    IfElseEnd,
    CaseHeader,
    CaseOption,
    CaseOptionEnd,
    CaseEnd,
    Assign,
    Call,
}

/// Backend that records the call sequence so tests can assert on ordering
/// and bracket nesting.
#[derive(Default)]
pub struct RecordingHll {
    pub events: Vec<Event>,
}

impl RecordingHll {
    pub fn new() -> RecordingHll {
        RecordingHll::default()
    }

    /// Every `{header .. end}` triple must nest correctly.
    pub fn assert_balanced(&self) {
        #[derive(Debug, PartialEq)]
        enum Frame {
            While,
            Do,
            Endless,
            If,
            IfElseThen,
            IfElseElse,
            Case,
            CaseArm,
        }
        let mut stack: Vec<Frame> = Vec::new();
        for ev in &self.events {
            match ev {
                Event::PretestHeader => stack.push(Frame::While),
                Event::PretestEnd => assert_eq!(stack.pop(), Some(Frame::While)),
                Event::PosttestHeader => stack.push(Frame::Do),
                Event::PosttestEnd => assert_eq!(stack.pop(), Some(Frame::Do)),
                Event::EndlessHeader => stack.push(Frame::Endless),
                Event::EndlessEnd => assert_eq!(stack.pop(), Some(Frame::Endless)),
                Event::IfHeader => stack.push(Frame::If),
                Event::IfEnd => assert_eq!(stack.pop(), Some(Frame::If)),
                Event::IfElseHeader => stack.push(Frame::IfElseThen),
                Event::ElseOption => {
                    assert_eq!(stack.pop(), Some(Frame::IfElseThen));
                    stack.push(Frame::IfElseElse);
                }
                Event::IfElseEnd => assert_eq!(stack.pop(), Some(Frame::IfElseElse)),
                Event::CaseHeader => stack.push(Frame::Case),
                Event::CaseOption => {
                    assert_eq!(stack.last(), Some(&Frame::Case), "case option outside switch");
                    stack.push(Frame::CaseArm);
                }
                Event::CaseOptionEnd => assert_eq!(stack.pop(), Some(Frame::CaseArm)),
                Event::CaseEnd => assert_eq!(stack.pop(), Some(Frame::Case)),
                _ => {}
            }
        }
        assert!(stack.is_empty(), "unclosed constructs: {:?}", stack);
    }

    pub fn count(&self, want: &Event) -> usize {
        self.events.iter().filter(|e| *e == want).count()
    }
}

impl HllCode for RecordingHll {
    fn add_label(&mut self, _indent: usize, ord: usize) {
        self.events.push(Event::Label(ord));
    }
    fn add_goto(&mut self, _indent: usize, ord: usize) {
        self.events.push(Event::Goto(ord));
    }
    fn add_continue(&mut self, _indent: usize) {
        self.events.push(Event::Continue);
    }
    fn add_break(&mut self, _indent: usize) {
        self.events.push(Event::Break);
    }
    fn add_return_statement(&mut self, _indent: usize, _value: Option<&Expr>) {
        self.events.push(Event::Return);
    }
    fn add_pretested_loop_header(&mut self, _indent: usize, _cond: &Expr) {
        self.events.push(Event::PretestHeader);
    }
    fn add_pretested_loop_end(&mut self, _indent: usize) {
        self.events.push(Event::PretestEnd);
    }
    fn add_posttested_loop_header(&mut self, _indent: usize) {
        self.events.push(Event::PosttestHeader);
    }
    fn add_posttested_loop_end(&mut self, _indent: usize, _cond: &Expr) {
        self.events.push(Event::PosttestEnd);
    }
    fn add_endless_loop_header(&mut self, _indent: usize) {
        self.events.push(Event::EndlessHeader);
    }
    fn add_endless_loop_end(&mut self, _indent: usize) {
        self.events.push(Event::EndlessEnd);
    }
    fn add_if_cond_header(&mut self, _indent: usize, _cond: &Expr) {
        self.events.push(Event::IfHeader);
    }
    fn add_if_cond_end(&mut self, _indent: usize) {
        self.events.push(Event::IfEnd);
    }
    fn add_if_else_cond_header(&mut self, _indent: usize, _cond: &Expr) {
        self.events.push(Event::IfElseHeader);
    }
    fn add_if_else_cond_option(&mut self, _indent: usize) {
        self.events.push(Event::ElseOption);
    }
    fn add_if_else_cond_end(&mut self, _indent: usize) {
        self.events.push(Event::IfElseEnd);
    }
    fn add_case_cond_header(&mut self, _indent: usize, _switch_var: &Expr) {
        self.events.push(Event::CaseHeader);
    }
    fn add_case_cond_option(&mut self, _indent: usize, _case_val: &Expr) {
        self.events.push(Event::CaseOption);
    }
    fn add_case_cond_option_end(&mut self, _indent: usize) {
        self.events.push(Event::CaseOptionEnd);
    }
    fn add_case_cond_end(&mut self, _indent: usize) {
        self.events.push(Event::CaseEnd);
    }
    fn add_assignment(&mut self, _indent: usize, _lhs: &Expr, _rhs: &Expr) {
        self.events.push(Event::Assign);
    }
    fn add_call_statement(&mut self, _indent: usize, _dest: Option<Addr>) {
        self.events.push(Event::Call);
    }
}
