//! Rule: Loop Control
//!
//! `break` and `continue` must appear inside the body of a `for` or `while`
//! loop of the same function. A loop's `else` clause is not part of the loop.
//!
//! ```python
//! for x in xs:
//!     break         # ok
//! else:
//!     break         # error: 'break' outside loop
//!
//! while True:
//!     def f():
//!         continue  # error: 'continue' not properly in loop
//! ```

use crate::executor::types::ast::Stmt;
use crate::parser::Module;

use super::super::{Diagnostics, ValidationRule};

pub struct LoopControlRule;

impl ValidationRule for LoopControlRule {
    fn id(&self) -> &'static str {
        "loop-control"
    }

    fn description(&self) -> &'static str {
        "break and continue must be inside a loop"
    }

    fn check(&self, module: &Module, out: &mut Diagnostics) {
        check_stmt(&module.body, false, out);
    }
}

fn check_stmt(stmt: &Stmt, in_loop: bool, out: &mut Diagnostics) {
    match stmt {
        Stmt::Break { span } if !in_loop => {
            out.error(*span, "'break' outside loop");
        }
        Stmt::Continue { span } if !in_loop => {
            out.error(*span, "'continue' not properly in loop");
        }
        Stmt::Block { body, .. } => {
            for s in body.iter() {
                check_stmt(s, in_loop, out);
            }
        }
        Stmt::While { body, else_s, .. } | Stmt::For { body, else_s, .. } => {
            check_stmt(body, true, out);
            if let Some(else_s) = else_s {
                check_stmt(else_s, in_loop, out);
            }
        }
        Stmt::If { then_s, else_s, .. } => {
            check_stmt(then_s, in_loop, out);
            if let Some(else_s) = else_s {
                check_stmt(else_s, in_loop, out);
            }
        }
        Stmt::Try {
            body,
            handlers,
            else_s,
            finally_s,
            ..
        } => {
            check_stmt(body, in_loop, out);
            for handler in handlers {
                check_stmt(&handler.body, in_loop, out);
            }
            for extra in [else_s, finally_s].into_iter().flatten() {
                check_stmt(extra, in_loop, out);
            }
        }
        Stmt::FunctionDef { def, .. } => check_stmt(&def.body, false, out),
        Stmt::ClassDef { body, .. } => check_stmt(body, false, out),
        _ => {}
    }
}
