//! High-Level Language Emitter Interface
//!
//! The sink the structured emitter drives. Calls arrive as a well-nested
//! bracket sequence of `{header .. option .. end}` triples; a violation is
//! a bug in the emitter, never in the backend.

use std::collections::HashSet;

use crate::decompiler::ssl::{Addr, Expr};

/// Ordered sink for high-level constructs.
///
/// `ord` parameters identify the source block by its traversal order and
/// name the labels (`L<ord>`) used by goto emission.
pub trait HllCode {
    fn add_label(&mut self, indent: usize, ord: usize);
    fn add_goto(&mut self, indent: usize, ord: usize);
    fn add_continue(&mut self, indent: usize);
    fn add_break(&mut self, indent: usize);
    fn add_return_statement(&mut self, indent: usize, value: Option<&Expr>);

    fn add_pretested_loop_header(&mut self, indent: usize, cond: &Expr);
    fn add_pretested_loop_end(&mut self, indent: usize);
    fn add_posttested_loop_header(&mut self, indent: usize);
    fn add_posttested_loop_end(&mut self, indent: usize, cond: &Expr);
    fn add_endless_loop_header(&mut self, indent: usize);
    fn add_endless_loop_end(&mut self, indent: usize);

    fn add_if_cond_header(&mut self, indent: usize, cond: &Expr);
    fn add_if_cond_end(&mut self, indent: usize);
    fn add_if_else_cond_header(&mut self, indent: usize, cond: &Expr);
    fn add_if_else_cond_option(&mut self, indent: usize);
    fn add_if_else_cond_end(&mut self, indent: usize);

    fn add_case_cond_header(&mut self, indent: usize, switch_var: &Expr);
    fn add_case_cond_option(&mut self, indent: usize, case_val: &Expr);
    fn add_case_cond_option_end(&mut self, indent: usize);
    fn add_case_cond_end(&mut self, indent: usize);

    /// Body statement: an assignment.
    fn add_assignment(&mut self, indent: usize, lhs: &Expr, rhs: &Expr);
    /// Body statement: a call. `None` marks an unresolved computed call;
    /// the backend emits a placeholder for it.
    fn add_call_statement(&mut self, indent: usize, dest: Option<Addr>);
}

enum Line {
    /// Label slot for a block; kept in the output only when some goto
    /// targeted it.
    Label(usize),
    Text(usize, String),
}

/// Pseudo-C backend. Buffers lines as they arrive and resolves labels at
/// the end: label slots nothing jumped to are dropped, and a label slot
/// repeated for a re-emitted block (the body of a pre-tested loop header
/// appears before and inside the loop) keeps only its first occurrence.
#[derive(Default)]
pub struct PseudoCWriter {
    lines: Vec<Line>,
    used_labels: HashSet<usize>,
}

impl PseudoCWriter {
    pub fn new() -> PseudoCWriter {
        PseudoCWriter::default()
    }

    fn text(&mut self, indent: usize, s: String) {
        self.lines.push(Line::Text(indent, s));
    }

    /// Assemble the final text, dropping unused label slots.
    pub fn finish(self) -> String {
        let mut out = String::new();
        let mut placed: HashSet<usize> = HashSet::new();
        for line in &self.lines {
            match line {
                Line::Label(ord) => {
                    if self.used_labels.contains(ord) && placed.insert(*ord) {
                        out.push_str(&format!("L{}:\n", ord));
                    }
                }
                Line::Text(indent, s) => {
                    for _ in 0..*indent {
                        out.push_str("    ");
                    }
                    out.push_str(s);
                    out.push('\n');
                }
            }
        }
        out
    }
}

impl HllCode for PseudoCWriter {
    fn add_label(&mut self, _indent: usize, ord: usize) {
        self.lines.push(Line::Label(ord));
    }

    fn add_goto(&mut self, indent: usize, ord: usize) {
        self.used_labels.insert(ord);
        self.text(indent, format!("goto L{};", ord));
    }

    fn add_continue(&mut self, indent: usize) {
        self.text(indent, "continue;".to_string());
    }

    fn add_break(&mut self, indent: usize) {
        self.text(indent, "break;".to_string());
    }

    fn add_return_statement(&mut self, indent: usize, value: Option<&Expr>) {
        match value {
            Some(v) => self.text(indent, format!("return {};", v)),
            None => self.text(indent, "return;".to_string()),
        }
    }

    fn add_pretested_loop_header(&mut self, indent: usize, cond: &Expr) {
        self.text(indent, format!("while ({}) {{", cond));
    }

    fn add_pretested_loop_end(&mut self, indent: usize) {
        self.text(indent, "}".to_string());
    }

    fn add_posttested_loop_header(&mut self, indent: usize) {
        self.text(indent, "do {".to_string());
    }

    fn add_posttested_loop_end(&mut self, indent: usize, cond: &Expr) {
        self.text(indent, format!("}} while ({});", cond));
    }

    fn add_endless_loop_header(&mut self, indent: usize) {
        self.text(indent, "for (;;) {".to_string());
    }

    fn add_endless_loop_end(&mut self, indent: usize) {
        self.text(indent, "}".to_string());
    }

    fn add_if_cond_header(&mut self, indent: usize, cond: &Expr) {
        self.text(indent, format!("if ({}) {{", cond));
    }

    fn add_if_cond_end(&mut self, indent: usize) {
        self.text(indent, "}".to_string());
    }

    fn add_if_else_cond_header(&mut self, indent: usize, cond: &Expr) {
        self.text(indent, format!("if ({}) {{", cond));
    }

    fn add_if_else_cond_option(&mut self, indent: usize) {
        self.text(indent, "} else {".to_string());
    }

    fn add_if_else_cond_end(&mut self, indent: usize) {
        self.text(indent, "}".to_string());
    }

    fn add_case_cond_header(&mut self, indent: usize, switch_var: &Expr) {
        self.text(indent, format!("switch ({}) {{", switch_var));
    }

    fn add_case_cond_option(&mut self, indent: usize, case_val: &Expr) {
        self.text(indent, format!("case {}:", case_val));
    }

    fn add_case_cond_option_end(&mut self, indent: usize) {
        self.text(indent + 1, "break;".to_string());
    }

    fn add_case_cond_end(&mut self, indent: usize) {
        self.text(indent, "}".to_string());
    }

    fn add_assignment(&mut self, indent: usize, lhs: &Expr, rhs: &Expr) {
        self.text(indent, format!("{} = {};", lhs, rhs));
    }

    fn add_call_statement(&mut self, indent: usize, dest: Option<Addr>) {
        match dest {
            Some(addr) => self.text(indent, format!("proc_{:08x}();", addr)),
            None => self.text(indent, "(*unresolved)(); /* computed call */".to_string()),
        }
    }
}
