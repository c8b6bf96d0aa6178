//! Rule: Unreachable Code
//!
//! Warns about statements that follow one that always leaves the block
//! (`return`, `raise`, `break`, `continue`).
//!
//! ```python
//! def f():
//!     return 5
//!     x = 10        # unreachable
//! ```

use crate::executor::types::ast::Stmt;
use crate::parser::Module;

use super::super::{Diagnostics, ValidationRule};
use super::nested_suites;

pub struct UnreachableCodeRule;

impl ValidationRule for UnreachableCodeRule {
    fn id(&self) -> &'static str {
        "unreachable-code"
    }

    fn description(&self) -> &'static str {
        "Code after return/raise/break/continue is unreachable"
    }

    fn check(&self, module: &Module, out: &mut Diagnostics) {
        check_stmt(&module.body, out);
    }
}

fn check_stmt(stmt: &Stmt, out: &mut Diagnostics) {
    match stmt {
        Stmt::Block { body, .. } => check_stmts(body, out),
        Stmt::FunctionDef { def, .. } => check_stmt(&def.body, out),
        Stmt::ClassDef { body, .. } => check_stmt(body, out),
        other => {
            for suite in nested_suites(other) {
                check_stmt(suite, out);
            }
        }
    }
}

/// Flags the first statement after a terminator in `stmts`
fn check_stmts(stmts: &[Stmt], out: &mut Diagnostics) {
    let mut terminated = false;

    for stmt in stmts {
        if terminated {
            // Only the first unreachable statement is reported
            out.warning(stmt.span(), "Unreachable code after previous statement");
            break;
        }
        terminated = is_terminator(stmt);
        check_stmt(stmt, out);
    }
}

/// Check if a statement never falls through
fn is_terminator(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Return { .. } | Stmt::Raise { .. } | Stmt::Break { .. } | Stmt::Continue { .. } => {
            true
        }
        Stmt::Block { body, .. } => body.last().is_some_and(is_terminator),
        // Both branches have to terminate
        Stmt::If { then_s, else_s, .. } => {
            is_terminator(then_s) && else_s.as_ref().is_some_and(|s| is_terminator(s))
        }
        _ => false,
    }
}
