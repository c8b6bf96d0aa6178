//! Rule: Return Outside Function
//!
//! `return` is only valid inside a function body. Class bodies do not count,
//! even when the class is defined inside a function.
//!
//! ```python
//! return 5          # error
//!
//! class A:
//!     return 1      # error
//! ```

use crate::executor::types::ast::Stmt;
use crate::parser::Module;

use super::super::{Diagnostics, ValidationRule};
use super::nested_suites;

pub struct ReturnOutsideFunctionRule;

impl ValidationRule for ReturnOutsideFunctionRule {
    fn id(&self) -> &'static str {
        "return-outside-function"
    }

    fn description(&self) -> &'static str {
        "return statements must be inside a function"
    }

    fn check(&self, module: &Module, out: &mut Diagnostics) {
        check_stmt(&module.body, out);
    }
}

/// Walk statements outside any function
fn check_stmt(stmt: &Stmt, out: &mut Diagnostics) {
    match stmt {
        Stmt::Return { span, .. } => {
            out.error(*span, "'return' outside function");
        }
        Stmt::FunctionDef { def, .. } => check_function_body(&def.body, out),
        Stmt::ClassDef { body, .. } => check_stmt(body, out),
        other => {
            for suite in nested_suites(other) {
                check_stmt(suite, out);
            }
        }
    }
}

/// Inside a function `return` is fine, but nested classes start over
fn check_function_body(stmt: &Stmt, out: &mut Diagnostics) {
    match stmt {
        Stmt::ClassDef { body, .. } => check_stmt(body, out),
        Stmt::FunctionDef { def, .. } => check_function_body(&def.body, out),
        other => {
            for suite in nested_suites(other) {
                check_function_body(suite, out);
            }
        }
    }
}
