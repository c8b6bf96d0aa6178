//! Rule: Function Signature
//!
//! Parameter lists of `def` statements and lambdas:
//!
//! ```python
//! def f(a, a): ...          # duplicate argument 'a' in function definition
//! def g(a=1, b): ...        # parameter without a default follows parameter with a default
//! def h(*): ...             # named arguments must follow bare *
//! def k(**kw, x): ...       # arguments cannot follow var-keyword argument
//! ```

use std::collections::HashSet;

use crate::executor::types::ast::{Expr, FunctionDef, ParamKind, Stmt};
use crate::parser::Module;

use super::super::{Diagnostics, ValidationRule};
use super::{nested_suites, statement_exprs, walk_expr};

pub struct FunctionSignatureRule;

impl ValidationRule for FunctionSignatureRule {
    fn id(&self) -> &'static str {
        "function-signature"
    }

    fn description(&self) -> &'static str {
        "parameters must be unique and correctly ordered"
    }

    fn check(&self, module: &Module, out: &mut Diagnostics) {
        check_stmt(&module.body, out);
    }
}

fn check_stmt(stmt: &Stmt, out: &mut Diagnostics) {
    for expr in statement_exprs(stmt) {
        walk_expr(expr, &mut |e| {
            if let Expr::Lambda { def, .. } = e {
                check_signature(def, out);
            }
        });
    }

    match stmt {
        Stmt::FunctionDef { def, .. } => {
            check_signature(def, out);
            check_stmt(&def.body, out);
        }
        Stmt::ClassDef { body, .. } => check_stmt(body, out),
        other => {
            for suite in nested_suites(other) {
                check_stmt(suite, out);
            }
        }
    }
}

fn check_signature(def: &FunctionDef, out: &mut Diagnostics) {
    let mut seen = HashSet::new();
    let mut seen_default = false;
    let mut seen_varargs = false;
    let mut seen_varkw = false;

    for (i, param) in def.params.iter().enumerate() {
        if seen_varkw {
            out.error(param.span, "arguments cannot follow var-keyword argument");
            return;
        }

        if param.kind != ParamKind::VarArgs || param.name != "*" {
            if !seen.insert(param.name.as_str()) {
                out.error(param.span, format!("duplicate argument '{}' in function definition", param.name));
                return;
            }
        }

        match param.kind {
            ParamKind::Positional => {
                if param.default.is_some() {
                    seen_default = true;
                } else if seen_default {
                    out.error(param.span, "parameter without a default follows parameter with a default");
                    return;
                }
            }
            ParamKind::VarArgs => {
                if seen_varargs {
                    out.error(param.span, "* argument may appear only once");
                    return;
                }
                seen_varargs = true;
                let has_keyword_only = def.params[i + 1..]
                    .iter()
                    .any(|p| p.kind == ParamKind::KeywordOnly);
                if param.name == "*" && !has_keyword_only {
                    out.error(param.span, "named arguments must follow bare *");
                    return;
                }
            }
            ParamKind::KeywordOnly => {}
            ParamKind::VarKeywords => seen_varkw = true,
        }
    }
}
