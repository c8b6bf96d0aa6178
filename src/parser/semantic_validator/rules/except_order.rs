//! Rule: Except Order
//!
//! A bare `except:` catches everything, so it has to be the last handler.

use crate::executor::types::ast::Stmt;
use crate::parser::Module;

use super::super::{Diagnostics, ValidationRule};
use super::nested_suites;

pub struct ExceptOrderRule;

impl ValidationRule for ExceptOrderRule {
    fn id(&self) -> &'static str {
        "except-order"
    }

    fn description(&self) -> &'static str {
        "a bare except clause must be the last handler"
    }

    fn check(&self, module: &Module, out: &mut Diagnostics) {
        check_stmt(&module.body, out);
    }
}

fn check_stmt(stmt: &Stmt, out: &mut Diagnostics) {
    match stmt {
        Stmt::Try { handlers, .. } => {
            let last = handlers.len().saturating_sub(1);
            if let Some(bare) = handlers[..last].iter().find(|h| h.kind.is_none()) {
                out.error(bare.span, "default 'except:' must be last");
            }
        }
        Stmt::FunctionDef { def, .. } => check_stmt(&def.body, out),
        Stmt::ClassDef { body, .. } => check_stmt(body, out),
        _ => {}
    }
    for suite in nested_suites(stmt) {
        check_stmt(suite, out);
    }
}
