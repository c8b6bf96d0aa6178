//! Validation Rules
//!
//! Each file in this module contains one validation rule:
//!
//! - `return_outside_function.rs` - `return` at module or class level
//! - `loop_control.rs` - `break` / `continue` outside a loop
//! - `scope_declaration.rs` - misplaced `nonlocal` / `global` declarations
//! - `function_signature.rs` - duplicate and badly ordered parameters
//! - `except_order.rs` - bare `except:` before other handlers
//! - `unsupported_syntax.rs` - syntax the interpreter does not run
//! - `unreachable_code.rs` - code after return/raise/break/continue

mod except_order;
mod function_signature;
mod loop_control;
mod return_outside_function;
mod scope_declaration;
mod unreachable_code;
mod unsupported_syntax;

pub use except_order::ExceptOrderRule;
pub use function_signature::FunctionSignatureRule;
pub use loop_control::LoopControlRule;
pub use return_outside_function::ReturnOutsideFunctionRule;
pub use scope_declaration::ScopeDeclarationRule;
pub use unreachable_code::UnreachableCodeRule;
pub use unsupported_syntax::UnsupportedSyntaxRule;

use crate::executor::types::ast::{Argument, DictItem, Expr, FStringPart, Stmt, Target};

/* ===== Shared Traversal ===== */

/// Suites nested directly in a compound statement, excluding function and
/// class bodies (which open a new scope)
pub(super) fn nested_suites(stmt: &Stmt) -> Vec<&Stmt> {
    match stmt {
        Stmt::Block { body, .. } => body.iter().collect(),
        Stmt::If { then_s, else_s, .. } => {
            let mut out = vec![then_s.as_ref()];
            out.extend(else_s.as_deref());
            out
        }
        Stmt::While { body, else_s, .. } | Stmt::For { body, else_s, .. } => {
            let mut out = vec![body.as_ref()];
            out.extend(else_s.as_deref());
            out
        }
        Stmt::Try {
            body,
            handlers,
            else_s,
            finally_s,
            ..
        } => {
            let mut out = vec![body.as_ref()];
            out.extend(handlers.iter().map(|h| h.body.as_ref()));
            out.extend(else_s.as_deref());
            out.extend(finally_s.as_deref());
            out
        }
        _ => Vec::new(),
    }
}

/// Expressions that appear directly in a statement (not in nested suites)
pub(super) fn statement_exprs(stmt: &Stmt) -> Vec<&Expr> {
    let mut out = Vec::new();
    match stmt {
        Stmt::Expr { expr, .. } => out.push(expr),
        Stmt::Assign { targets, value, .. } => {
            for target in targets {
                target_exprs(target, &mut out);
            }
            out.push(value);
        }
        Stmt::AugAssign { target, value, .. } => {
            target_exprs(target, &mut out);
            out.push(value);
        }
        Stmt::If { test, .. } | Stmt::While { test, .. } => out.push(test),
        Stmt::For {
            target, iterable, ..
        } => {
            target_exprs(target, &mut out);
            out.push(iterable);
        }
        Stmt::FunctionDef {
            def, decorators, ..
        } => {
            out.extend(decorators.iter());
            out.extend(def.params.iter().filter_map(|p| p.default.as_ref()));
        }
        Stmt::ClassDef {
            bases, decorators, ..
        } => {
            out.extend(decorators.iter());
            out.extend(bases.iter());
        }
        Stmt::Return { value, .. } => out.extend(value.iter()),
        Stmt::Raise { exc, cause, .. } => {
            out.extend(exc.iter());
            out.extend(cause.iter());
        }
        Stmt::Try { handlers, .. } => {
            out.extend(handlers.iter().filter_map(|h| h.kind.as_ref()));
        }
        Stmt::Assert { test, msg, .. } => {
            out.push(test);
            out.extend(msg.iter());
        }
        Stmt::Delete { targets, .. } => {
            for target in targets {
                target_exprs(target, &mut out);
            }
        }
        Stmt::Block { .. }
        | Stmt::Global { .. }
        | Stmt::Nonlocal { .. }
        | Stmt::Import { .. }
        | Stmt::ImportFrom { .. }
        | Stmt::Pass { .. }
        | Stmt::Break { .. }
        | Stmt::Continue { .. }
        | Stmt::Unsupported { .. } => {}
    }
    out
}

fn target_exprs<'a>(target: &'a Target, out: &mut Vec<&'a Expr>) {
    match target {
        Target::Name { .. } => {}
        Target::Attribute { object, .. } => out.push(object),
        Target::Subscript { object, index, .. } => {
            out.push(object);
            out.push(index);
        }
        Target::Unpack { elements, .. } => {
            for element in elements {
                target_exprs(element, out);
            }
        }
        Target::Starred { inner, .. } => target_exprs(inner, out),
    }
}

/// Visit `expr` and every sub-expression, outermost first.
///
/// Lambda bodies are entered: their `Return` wraps a single expression.
pub(super) fn walk_expr<'a>(expr: &'a Expr, f: &mut dyn FnMut(&'a Expr)) {
    f(expr);
    match expr {
        Expr::LitNone { .. }
        | Expr::LitBool { .. }
        | Expr::LitInt { .. }
        | Expr::LitBigInt { .. }
        | Expr::LitFloat { .. }
        | Expr::LitStr { .. }
        | Expr::LitEllipsis { .. }
        | Expr::Name { .. } => {}
        Expr::FString { parts, .. } => walk_fstring(parts, f),
        Expr::List { elements, .. } | Expr::Tuple { elements, .. } | Expr::Set { elements, .. } => {
            for element in elements {
                walk_expr(element, f);
            }
        }
        Expr::Dict { items, .. } => {
            for item in items {
                match item {
                    DictItem::Pair { key, value } => {
                        walk_expr(key, f);
                        walk_expr(value, f);
                    }
                    DictItem::Unpack { value } => walk_expr(value, f),
                }
            }
        }
        Expr::Starred { inner, .. } => walk_expr(inner, f),
        Expr::ListComp {
            element,
            generators,
            ..
        }
        | Expr::SetComp {
            element,
            generators,
            ..
        }
        | Expr::GeneratorExp {
            element,
            generators,
            ..
        } => {
            walk_expr(element, f);
            for generator in generators {
                walk_expr(&generator.iter, f);
                for cond in &generator.ifs {
                    walk_expr(cond, f);
                }
            }
        }
        Expr::DictComp {
            key,
            value,
            generators,
            ..
        } => {
            walk_expr(key, f);
            walk_expr(value, f);
            for generator in generators {
                walk_expr(&generator.iter, f);
                for cond in &generator.ifs {
                    walk_expr(cond, f);
                }
            }
        }
        Expr::Attribute { object, .. } => walk_expr(object, f),
        Expr::Subscript { object, index, .. } => {
            walk_expr(object, f);
            walk_expr(index, f);
        }
        Expr::Slice {
            lower, upper, step, ..
        } => {
            for part in [lower, upper, step].into_iter().flatten() {
                walk_expr(part, f);
            }
        }
        Expr::Call { callee, args, .. } => {
            walk_expr(callee, f);
            for arg in args {
                match arg {
                    Argument::Positional { value }
                    | Argument::Star { value }
                    | Argument::Keyword { value, .. }
                    | Argument::DoubleStar { value } => walk_expr(value, f),
                }
            }
        }
        Expr::BinaryOp { left, right, .. } | Expr::LogicalOp { left, right, .. } => {
            walk_expr(left, f);
            walk_expr(right, f);
        }
        Expr::UnaryOp { operand, .. } => walk_expr(operand, f),
        Expr::Compare { left, ops, .. } => {
            walk_expr(left, f);
            for (_, right) in ops {
                walk_expr(right, f);
            }
        }
        Expr::Ternary {
            condition,
            consequent,
            alternate,
            ..
        } => {
            walk_expr(condition, f);
            walk_expr(consequent, f);
            walk_expr(alternate, f);
        }
        Expr::Lambda { def, .. } => {
            for default in def.params.iter().filter_map(|p| p.default.as_ref()) {
                walk_expr(default, f);
            }
            if let Some(Stmt::Return {
                value: Some(value), ..
            }) = def.body.block_body().first()
            {
                walk_expr(value, f);
            }
        }
    }
}

fn walk_fstring<'a>(parts: &'a [FStringPart], f: &mut dyn FnMut(&'a Expr)) {
    for part in parts {
        if let FStringPart::Field { expr, spec, .. } = part {
            walk_expr(expr, f);
            walk_fstring(spec, f);
        }
    }
}
