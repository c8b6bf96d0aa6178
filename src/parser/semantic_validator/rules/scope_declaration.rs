//! Rule: Scope Declarations
//!
//! Checks `global` and `nonlocal` statements against the scopes around them:
//!
//! ```python
//! nonlocal x            # error: not allowed at module level
//!
//! def f(a):
//!     global a          # error: name 'a' is parameter and global
//!     nonlocal y        # error: no binding for nonlocal 'y' found
//! ```

use std::collections::BTreeSet;

use crate::executor::types::ast::{FunctionDef, Span, Stmt};
use crate::parser::Module;

use super::super::{Diagnostics, ValidationRule};
use super::nested_suites;

pub struct ScopeDeclarationRule;

impl ValidationRule for ScopeDeclarationRule {
    fn id(&self) -> &'static str {
        "scope-declaration"
    }

    fn description(&self) -> &'static str {
        "global and nonlocal declarations must refer to valid scopes"
    }

    fn check(&self, module: &Module, out: &mut Diagnostics) {
        let mut enclosing = Vec::new();
        check_scope(&module.body, Scope::Module, &mut enclosing, out);
    }
}

#[derive(Clone, Copy)]
enum Scope<'a> {
    Module,
    Class,
    Function(&'a FunctionDef),
}

/// Declarations found directly in one scope
#[derive(Default)]
struct Declarations {
    globals: Vec<(String, Span)>,
    nonlocals: Vec<(String, Span)>,
}

fn collect<'a>(
    stmt: &'a Stmt,
    decls: &mut Declarations,
    nested: &mut Vec<(Scope<'a>, &'a Stmt)>,
) {
    match stmt {
        Stmt::Global { names, span } => {
            decls.globals.extend(names.iter().map(|n| (n.clone(), *span)));
        }
        Stmt::Nonlocal { names, span } => {
            decls.nonlocals.extend(names.iter().map(|n| (n.clone(), *span)));
        }
        Stmt::FunctionDef { def, .. } => nested.push((Scope::Function(def), &def.body)),
        Stmt::ClassDef { body, .. } => nested.push((Scope::Class, body)),
        other => {
            for suite in nested_suites(other) {
                collect(suite, decls, nested);
            }
        }
    }
}

/// Names a `nonlocal` may refer to: locals of enclosing functions
fn bound_in<'a>(enclosing: &[&'a FunctionDef]) -> BTreeSet<&'a str> {
    let mut names = BTreeSet::new();
    for def in enclosing {
        names.extend(def.local_names.iter().map(String::as_str));
        names.extend(def.nonlocals.iter().map(String::as_str));
    }
    names
}

fn check_scope<'a>(
    body: &'a Stmt,
    scope: Scope<'a>,
    enclosing: &mut Vec<&'a FunctionDef>,
    out: &mut Diagnostics,
) {
    let mut decls = Declarations::default();
    let mut nested = Vec::new();
    collect(body, &mut decls, &mut nested);

    let params: BTreeSet<&str> = match scope {
        Scope::Function(def) => def.params.iter().map(|p| p.name.as_str()).collect(),
        _ => BTreeSet::new(),
    };

    for (name, span) in &decls.globals {
        if params.contains(name.as_str()) {
            out.error(*span, format!("name '{}' is parameter and global", name));
        } else if decls.nonlocals.iter().any(|(n, _)| n == name) {
            out.error(*span, format!("name '{}' is nonlocal and global", name));
        }
    }

    if matches!(scope, Scope::Module) {
        if let Some((_, span)) = decls.nonlocals.first() {
            out.error(*span, "nonlocal declaration not allowed at module level");
        }
    } else {
        let available = bound_in(enclosing);
        for (name, span) in &decls.nonlocals {
            if params.contains(name.as_str()) {
                out.error(*span, format!("name '{}' is parameter and nonlocal", name));
            } else if !available.contains(name.as_str()) {
                out.error(*span, format!("no binding for nonlocal '{}' found", name));
            }
        }
    }

    for (inner, inner_body) in nested {
        match scope {
            Scope::Function(def) => {
                enclosing.push(def);
                check_scope(inner_body, inner, enclosing, out);
                enclosing.pop();
            }
            _ => check_scope(inner_body, inner, enclosing, out),
        }
    }
}
