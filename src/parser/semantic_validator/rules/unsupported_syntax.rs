//! Rule: Unsupported Syntax
//!
//! Statements the grammar accepts but the interpreter cannot run: generators
//! (`yield`), context managers (`with`) and coroutines (`async`).

use crate::executor::types::ast::Stmt;
use crate::parser::Module;

use super::super::{Diagnostics, ValidationRule};
use super::nested_suites;

pub struct UnsupportedSyntaxRule;

impl ValidationRule for UnsupportedSyntaxRule {
    fn id(&self) -> &'static str {
        "unsupported-syntax"
    }

    fn description(&self) -> &'static str {
        "yield, with and async are not supported"
    }

    fn check(&self, module: &Module, out: &mut Diagnostics) {
        check_stmt(&module.body, false, out);
    }
}

fn message(feature: &str, in_function: bool) -> String {
    match feature {
        "yield" if !in_function => "'yield' outside function".to_string(),
        "yield" => "generator functions ('yield') are not supported".to_string(),
        "with" => "'with' statements are not supported".to_string(),
        other => format!("'{}' is not supported", other),
    }
}

fn check_stmt(stmt: &Stmt, in_function: bool, out: &mut Diagnostics) {
    match stmt {
        Stmt::Unsupported { feature, span } => {
            out.error(*span, message(feature, in_function));
        }
        Stmt::FunctionDef { def, .. } => check_stmt(&def.body, true, out),
        Stmt::ClassDef { body, .. } => check_stmt(body, false, out),
        other => {
            for suite in nested_suites(other) {
                check_stmt(suite, in_function, out);
            }
        }
    }
}
