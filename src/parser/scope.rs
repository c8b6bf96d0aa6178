//! Static scope analysis for function bodies
//!
//! A name assigned anywhere in a function body is local to the whole body
//! unless declared `global` or `nonlocal`. Nested function and class bodies
//! are separate scopes and are not entered.

use std::collections::BTreeSet;

use crate::executor::types::ast::{Param, Stmt, Target};

#[derive(Debug, Default)]
pub(crate) struct ScopeInfo {
    pub locals: BTreeSet<String>,
    pub globals: BTreeSet<String>,
    pub nonlocals: BTreeSet<String>,
}

pub(crate) fn analyze(params: &[Param], body: &Stmt) -> ScopeInfo {
    let mut info = ScopeInfo::default();
    let mut bound = Vec::new();
    for param in params {
        if param.name != "*" {
            bound.push(param.name.clone());
        }
    }
    collect(body, &mut bound, &mut info);

    for name in bound {
        if !info.globals.contains(&name) && !info.nonlocals.contains(&name) {
            info.locals.insert(name);
        }
    }
    info
}

fn bind_target(target: &Target, bound: &mut Vec<String>) {
    target.bound_names(bound);
}

fn collect(stmt: &Stmt, bound: &mut Vec<String>, info: &mut ScopeInfo) {
    match stmt {
        Stmt::Block { body, .. } => {
            for s in body.iter() {
                collect(s, bound, info);
            }
        }
        Stmt::Assign { targets, .. } => {
            for target in targets {
                bind_target(target, bound);
            }
        }
        Stmt::AugAssign { target, .. } => bind_target(target, bound),
        Stmt::Delete { targets, .. } => {
            for target in targets {
                bind_target(target, bound);
            }
        }
        Stmt::For {
            target,
            body,
            else_s,
            ..
        } => {
            bind_target(target, bound);
            collect(body, bound, info);
            if let Some(else_s) = else_s {
                collect(else_s, bound, info);
            }
        }
        Stmt::While { body, else_s, .. } => {
            collect(body, bound, info);
            if let Some(else_s) = else_s {
                collect(else_s, bound, info);
            }
        }
        Stmt::If { then_s, else_s, .. } => {
            collect(then_s, bound, info);
            if let Some(else_s) = else_s {
                collect(else_s, bound, info);
            }
        }
        Stmt::Try {
            body,
            handlers,
            else_s,
            finally_s,
            ..
        } => {
            collect(body, bound, info);
            for handler in handlers {
                if let Some(name) = &handler.name {
                    bound.push(name.clone());
                }
                collect(&handler.body, bound, info);
            }
            for extra in [else_s, finally_s].into_iter().flatten() {
                collect(extra, bound, info);
            }
        }
        Stmt::FunctionDef { def, .. } => bound.push(def.name.clone()),
        Stmt::ClassDef { name, .. } => bound.push(name.clone()),
        Stmt::Import { names, .. } => {
            for alias in names {
                bound.push(alias.binding().to_string());
            }
        }
        Stmt::ImportFrom { names, .. } => {
            for alias in names {
                bound.push(alias.binding().to_string());
            }
        }
        Stmt::Global { names, .. } => info.globals.extend(names.iter().cloned()),
        Stmt::Nonlocal { names, .. } => info.nonlocals.extend(names.iter().cloned()),
        Stmt::Expr { .. }
        | Stmt::Return { .. }
        | Stmt::Raise { .. }
        | Stmt::Assert { .. }
        | Stmt::Pass { .. }
        | Stmt::Break { .. }
        | Stmt::Continue { .. }
        | Stmt::Unsupported { .. } => {}
    }
}
