//! AST builder
//!
//! Turns the pest pairs of one logical line into AST nodes. Keyword tokens are
//! real pairs in the grammar (they need atomic boundary checks), so every
//! builder walks `children()`, which drops them.

use num_bigint::BigInt;
use num_traits::ToPrimitive;
use std::sync::Arc;

use crate::executor::types::ast::{
    Argument, BinOp, BoolOp, CmpOp, Comprehension, DictItem, Expr, ImportAlias, Param,
    ParamKind, Span, Stmt, Target, UnaryOp,
};

use super::strings::build_strings;
use super::{build_function_def, pair_to_span, ParseError, ParseResult, Rule, SourceCtx};

type Pair<'i> = pest::iterators::Pair<'i, Rule>;

/* ===================== Line Kinds ===================== */

/// Header of a compound statement, before its suite is attached
#[derive(Debug)]
pub(crate) enum Header {
    If(Expr),
    Elif(Expr),
    Else,
    While(Expr),
    For(Target, Expr),
    Def { name: String, params: Vec<Param> },
    Class { name: String, bases: Vec<Expr> },
    Try,
    Except { kind: Option<Expr>, name: Option<String> },
    Finally,
    Unsupported(&'static str),
}

impl Header {
    /// Wording used by "expected an indented block after ..."
    pub fn describe(&self) -> &'static str {
        match self {
            Header::If(_) => "'if' statement",
            Header::Elif(_) => "'elif' statement",
            Header::Else => "'else' statement",
            Header::While(_) => "'while' statement",
            Header::For(..) => "'for' statement",
            Header::Def { .. } => "function definition",
            Header::Class { .. } => "class definition",
            Header::Try => "'try' statement",
            Header::Except { .. } => "'except' statement",
            Header::Finally => "'finally' statement",
            Header::Unsupported("with") => "'with' statement",
            Header::Unsupported(_) => "'async' statement",
        }
    }
}

#[derive(Debug)]
pub(crate) enum LineKind {
    Simple(Vec<Stmt>),
    Decorator(Expr),
    Header {
        header: Header,
        /// Statements after the colon on the same line
        inline: Option<Vec<Stmt>>,
        span: Span,
    },
}

#[derive(Debug)]
pub(crate) struct ParsedLine {
    pub line: super::lines::LogicalLine,
    pub kind: LineKind,
}

/* ===================== Pair Helpers ===================== */

fn is_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::kw_false
            | Rule::kw_none
            | Rule::kw_true
            | Rule::kw_and
            | Rule::kw_as
            | Rule::kw_assert
            | Rule::kw_async
            | Rule::kw_await
            | Rule::kw_break
            | Rule::kw_class
            | Rule::kw_continue
            | Rule::kw_def
            | Rule::kw_del
            | Rule::kw_elif
            | Rule::kw_else
            | Rule::kw_except
            | Rule::kw_finally
            | Rule::kw_for
            | Rule::kw_from
            | Rule::kw_global
            | Rule::kw_if
            | Rule::kw_import
            | Rule::kw_in
            | Rule::kw_is
            | Rule::kw_lambda
            | Rule::kw_nonlocal
            | Rule::kw_not
            | Rule::kw_or
            | Rule::kw_pass
            | Rule::kw_raise
            | Rule::kw_return
            | Rule::kw_try
            | Rule::kw_while
            | Rule::kw_with
            | Rule::kw_yield
            | Rule::EOI
    )
}

/// Inner pairs without keyword tokens
fn children(pair: Pair<'_>) -> Vec<Pair<'_>> {
    pair.into_inner().filter(|p| !is_keyword(p.as_rule())).collect()
}

fn unexpected(pair: &Pair<'_>, ctx: &SourceCtx) -> ParseError {
    ParseError::BuildError(
        format!("Unexpected rule: {:?}", pair.as_rule()),
        Some(pair_to_span(pair, ctx)),
    )
}

fn missing(what: &str, span: Span) -> ParseError {
    ParseError::BuildError(format!("Missing {}", what), Some(span))
}

/// Take the next child or fail with a build error
fn take<'i>(
    iter: &mut impl Iterator<Item = Pair<'i>>,
    what: &str,
    span: Span,
) -> ParseResult<Pair<'i>> {
    iter.next().ok_or_else(|| missing(what, span))
}

/* ===================== Lines ===================== */

pub(crate) fn build_line(pair: Pair<'_>, ctx: &SourceCtx) -> ParseResult<LineKind> {
    let span = pair_to_span(&pair, ctx);
    let content = take(&mut children(pair).into_iter(), "line content", span)?;

    match content.as_rule() {
        Rule::decorator => {
            let span = pair_to_span(&content, ctx);
            let expr = take(&mut children(content).into_iter(), "decorator", span)?;
            Ok(LineKind::Decorator(build_expression(expr, ctx)?))
        }
        Rule::compound_header => {
            let mut parts = children(content).into_iter();
            let header_pair = take(&mut parts, "header", span)?;
            let colon = take(&mut parts, "':'", span)?;
            let header_span = pair_to_span(&header_pair, ctx).merge(&pair_to_span(&colon, ctx));
            let header = build_header(header_pair, ctx)?;
            let inline = match parts.next() {
                Some(stmts) => Some(build_simple_stmts(stmts, ctx)?),
                None => None,
            };
            Ok(LineKind::Header {
                header,
                inline,
                span: header_span,
            })
        }
        Rule::simple_stmts => Ok(LineKind::Simple(build_simple_stmts(content, ctx)?)),
        _ => Err(unexpected(&content, ctx)),
    }
}

fn build_header(pair: Pair<'_>, ctx: &SourceCtx) -> ParseResult<Header> {
    let span = pair_to_span(&pair, ctx);
    let rule = pair.as_rule();
    let mut inner = children(pair).into_iter();

    match rule {
        Rule::if_header => Ok(Header::If(build_expression(take(&mut inner, "test", span)?, ctx)?)),
        Rule::elif_header => Ok(Header::Elif(build_expression(
            take(&mut inner, "test", span)?,
            ctx,
        )?)),
        Rule::else_header => Ok(Header::Else),
        Rule::while_header => Ok(Header::While(build_expression(
            take(&mut inner, "test", span)?,
            ctx,
        )?)),
        Rule::for_header => {
            let target = build_target_list(take(&mut inner, "target", span)?, TargetCtx::For, ctx)?;
            let iterable = build_star_expressions(take(&mut inner, "iterable", span)?, ctx)?;
            Ok(Header::For(target, iterable))
        }
        Rule::def_header => {
            let name = take(&mut inner, "name", span)?.as_str().to_string();
            let mut params = Vec::new();
            for part in inner {
                if part.as_rule() == Rule::parameters {
                    params = build_parameters(part, ctx)?;
                }
            }
            Ok(Header::Def { name, params })
        }
        Rule::class_header => {
            let name = take(&mut inner, "name", span)?.as_str().to_string();
            let mut bases = Vec::new();
            if let Some(args) = inner.next() {
                for arg in build_arguments(args, ctx)? {
                    match arg {
                        Argument::Positional { value } => bases.push(value),
                        _ => {
                            return Err(ParseError::syntax(
                                "class keyword arguments are not supported",
                                span,
                            ))
                        }
                    }
                }
            }
            Ok(Header::Class { name, bases })
        }
        Rule::try_header => Ok(Header::Try),
        Rule::except_header => {
            let kind = match inner.next() {
                Some(expr) => Some(build_expression(expr, ctx)?),
                None => None,
            };
            let name = inner.next().map(|p| p.as_str().to_string());
            Ok(Header::Except { kind, name })
        }
        Rule::finally_header => Ok(Header::Finally),
        Rule::with_header => Ok(Header::Unsupported("with")),
        Rule::async_header => Ok(Header::Unsupported("async")),
        _ => Err(ParseError::BuildError(
            format!("Unexpected header rule: {:?}", rule),
            Some(span),
        )),
    }
}

fn build_parameters(pair: Pair<'_>, ctx: &SourceCtx) -> ParseResult<Vec<Param>> {
    let mut params = Vec::new();
    let mut keyword_only = false;

    for param in children(pair) {
        let span = pair_to_span(&param, ctx);
        let rule = param.as_rule();
        let mut inner = children(param).into_iter();

        match rule {
            Rule::param_plain | Rule::lambda_plain => {
                let name = take(&mut inner, "parameter name", span)?.as_str().to_string();
                let mut default = None;
                for part in inner {
                    if part.as_rule() == Rule::default_value {
                        let part_span = pair_to_span(&part, ctx);
                        let expr = take(&mut children(part).into_iter(), "default", part_span)?;
                        default = Some(build_expression(expr, ctx)?);
                    }
                }
                let kind = if keyword_only {
                    ParamKind::KeywordOnly
                } else {
                    ParamKind::Positional
                };
                params.push(Param {
                    name,
                    kind,
                    default,
                    span,
                });
            }
            Rule::param_varargs | Rule::lambda_varargs => {
                keyword_only = true;
                if let Some(name) = inner.next() {
                    params.push(Param {
                        name: name.as_str().to_string(),
                        kind: ParamKind::VarArgs,
                        default: None,
                        span,
                    });
                } else {
                    params.push(Param {
                        name: "*".to_string(),
                        kind: ParamKind::VarArgs,
                        default: None,
                        span,
                    });
                }
            }
            Rule::param_kwargs | Rule::lambda_kwargs => {
                let name = take(&mut inner, "parameter name", span)?.as_str().to_string();
                params.push(Param {
                    name,
                    kind: ParamKind::VarKeywords,
                    default: None,
                    span,
                });
            }
            Rule::param_slash => {}
            _ => {
                return Err(ParseError::BuildError(
                    format!("Unexpected parameter rule: {:?}", rule),
                    Some(span),
                ))
            }
        }
    }

    Ok(params)
}

/* ===================== Simple Statements ===================== */

fn build_simple_stmts(pair: Pair<'_>, ctx: &SourceCtx) -> ParseResult<Vec<Stmt>> {
    children(pair)
        .into_iter()
        .map(|stmt| build_simple_stmt(stmt, ctx))
        .collect()
}

fn build_simple_stmt(pair: Pair<'_>, ctx: &SourceCtx) -> ParseResult<Stmt> {
    let span = pair_to_span(&pair, ctx);
    let rule = pair.as_rule();
    let parts = children(pair);

    match rule {
        Rule::pass_stmt => Ok(Stmt::Pass { span }),
        Rule::break_stmt => Ok(Stmt::Break { span }),
        Rule::continue_stmt => Ok(Stmt::Continue { span }),
        Rule::return_stmt => {
            let value = match parts.into_iter().next() {
                Some(expr) => Some(build_star_expressions(expr, ctx)?),
                None => None,
            };
            Ok(Stmt::Return { value, span })
        }
        Rule::raise_stmt => {
            let mut inner = parts.into_iter();
            let exc = match inner.next() {
                Some(expr) => Some(build_expression(expr, ctx)?),
                None => None,
            };
            let cause = match inner.next() {
                Some(expr) => Some(build_expression(expr, ctx)?),
                None => None,
            };
            Ok(Stmt::Raise { exc, cause, span })
        }
        Rule::global_stmt => Ok(Stmt::Global {
            names: parts.iter().map(|p| p.as_str().to_string()).collect(),
            span,
        }),
        Rule::nonlocal_stmt => Ok(Stmt::Nonlocal {
            names: parts.iter().map(|p| p.as_str().to_string()).collect(),
            span,
        }),
        Rule::del_stmt => {
            let list = take(&mut parts.into_iter(), "targets", span)?;
            let targets = match build_target_list(list, TargetCtx::Delete, ctx)? {
                Target::Unpack { elements, .. } => elements,
                single => vec![single],
            };
            Ok(Stmt::Delete { targets, span })
        }
        Rule::assert_stmt => {
            let mut inner = parts.into_iter();
            let test = build_expression(take(&mut inner, "assert test", span)?, ctx)?;
            let msg = match inner.next() {
                Some(expr) => Some(build_expression(expr, ctx)?),
                None => None,
            };
            Ok(Stmt::Assert { test, msg, span })
        }
        Rule::import_stmt => {
            let mut names = Vec::new();
            for dotted in parts {
                let mut inner = children(dotted).into_iter();
                let name = take(&mut inner, "module name", span)?.as_str().to_string();
                let alias = inner.next().map(|p| p.as_str().to_string());
                names.push(ImportAlias { name, alias });
            }
            Ok(Stmt::Import { names, span })
        }
        Rule::from_import_stmt => {
            let mut inner = parts.into_iter();
            let module = take(&mut inner, "module name", span)?.as_str().to_string();
            let what = take(&mut inner, "imported names", span)?;
            let mut names = Vec::new();
            if what.as_rule() == Rule::import_names {
                for import in children(what) {
                    let mut inner = children(import).into_iter();
                    let name = take(&mut inner, "imported name", span)?.as_str().to_string();
                    let alias = inner.next().map(|p| p.as_str().to_string());
                    names.push(ImportAlias { name, alias });
                }
            }
            Ok(Stmt::ImportFrom {
                module,
                names,
                span,
            })
        }
        Rule::yield_stmt => Ok(Stmt::Unsupported {
            feature: "yield".to_string(),
            span,
        }),
        Rule::assign_stmt => {
            let mut exprs = parts
                .into_iter()
                .map(|p| build_star_expressions(p, ctx))
                .collect::<ParseResult<Vec<_>>>()?;
            let value = exprs.pop().ok_or_else(|| missing("assigned value", span))?;
            let targets = exprs
                .into_iter()
                .map(|e| expr_to_target(e, TargetCtx::Assign, true))
                .collect::<ParseResult<Vec<_>>>()?;
            Ok(Stmt::Assign {
                targets,
                value,
                span,
            })
        }
        Rule::augassign_stmt => {
            let mut inner = parts.into_iter();
            let target_pair = take(&mut inner, "target", span)?;
            let op_pair = take(&mut inner, "operator", span)?;
            let value = build_star_expressions(take(&mut inner, "value", span)?, ctx)?;
            let target = build_single_target(target_pair, TargetCtx::Augmented, ctx)?;
            let op = match op_pair.as_str() {
                "+=" => BinOp::Add,
                "-=" => BinOp::Sub,
                "*=" => BinOp::Mul,
                "/=" => BinOp::Div,
                "//=" => BinOp::FloorDiv,
                "%=" => BinOp::Mod,
                "**=" => BinOp::Pow,
                "&=" => BinOp::BitAnd,
                "|=" => BinOp::BitOr,
                "^=" => BinOp::BitXor,
                "<<=" => BinOp::LShift,
                ">>=" => BinOp::RShift,
                other => {
                    return Err(ParseError::BuildError(
                        format!("Unknown augmented operator: {}", other),
                        Some(span),
                    ))
                }
            };
            Ok(Stmt::AugAssign {
                target,
                op,
                value,
                span,
            })
        }
        Rule::annassign_stmt => {
            let mut inner = parts.into_iter();
            let target_pair = take(&mut inner, "target", span)?;
            let target = build_single_target(target_pair, TargetCtx::Assign, ctx)?;
            let _annotation = take(&mut inner, "annotation", span)?;
            match inner.next() {
                Some(value) => Ok(Stmt::Assign {
                    targets: vec![target],
                    value: build_star_expressions(value, ctx)?,
                    span,
                }),
                None => Ok(Stmt::Pass { span }),
            }
        }
        Rule::expr_stmt => {
            let expr = build_star_expressions(take(&mut parts.into_iter(), "expression", span)?, ctx)?;
            if let Expr::Starred { span, .. } = &expr {
                return Err(ParseError::syntax("can't use starred expression here", *span));
            }
            Ok(Stmt::Expr { expr, span })
        }
        _ => Err(ParseError::BuildError(
            format!("Unexpected statement rule: {:?}", rule),
            Some(span),
        )),
    }
}

/* ===================== Targets ===================== */

/// Where a target appears, which decides the diagnostic wording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TargetCtx {
    Assign,
    Augmented,
    Delete,
    For,
}

fn build_single_target(pair: Pair<'_>, tctx: TargetCtx, ctx: &SourceCtx) -> ParseResult<Target> {
    let span = pair_to_span(&pair, ctx);
    let primary = take(&mut children(pair).into_iter(), "target", span)?;
    let expr = build_expression(primary, ctx)?;
    if tctx == TargetCtx::Augmented {
        return match expr {
            Expr::Name { .. } | Expr::Attribute { .. } | Expr::Subscript { .. } => {
                expr_to_target(expr, tctx, false)
            }
            other => Err(ParseError::syntax(
                format!(
                    "'{}' is an illegal expression for augmented assignment",
                    other.describe()
                ),
                other.span(),
            )),
        };
    }
    expr_to_target(expr, tctx, true)
}

fn build_target_list(pair: Pair<'_>, tctx: TargetCtx, ctx: &SourceCtx) -> ParseResult<Target> {
    let span = pair_to_span(&pair, ctx);
    let items = children(pair);
    let trailing = items.iter().any(|p| p.as_rule() == Rule::trailing_comma);
    let mut targets = Vec::new();
    for item in items {
        if item.as_rule() == Rule::trailing_comma {
            continue;
        }
        targets.push(build_target_item(item, tctx, ctx)?);
    }
    if targets.len() == 1 && !trailing {
        if let Some(Target::Starred { span, .. }) = targets.first() {
            return Err(ParseError::syntax(
                "starred assignment target must be in a list or tuple",
                *span,
            ));
        }
        return targets.pop().ok_or_else(|| missing("target", span));
    }
    check_single_star(&targets, span)?;
    Ok(Target::Unpack {
        elements: targets,
        span,
    })
}

fn build_target_item(pair: Pair<'_>, tctx: TargetCtx, ctx: &SourceCtx) -> ParseResult<Target> {
    let span = pair_to_span(&pair, ctx);
    match pair.as_rule() {
        Rule::star_target => {
            let inner = take(&mut children(pair).into_iter(), "starred target", span)?;
            Ok(Target::Starred {
                inner: Box::new(build_target_item(inner, tctx, ctx)?),
                span,
            })
        }
        Rule::paren_target => {
            let list = take(&mut children(pair).into_iter(), "target list", span)?;
            build_target_list(list, tctx, ctx)
        }
        Rule::bracket_target => {
            let list = take(&mut children(pair).into_iter(), "target list", span)?;
            match build_target_list(list, tctx, ctx)? {
                unpack @ Target::Unpack { .. } => Ok(unpack),
                single => Ok(Target::Unpack {
                    elements: vec![single],
                    span,
                }),
            }
        }
        Rule::primary => expr_to_target(build_expression(pair, ctx)?, tctx, false),
        _ => Err(unexpected(&pair, ctx)),
    }
}

fn check_single_star(targets: &[Target], span: Span) -> ParseResult<()> {
    let stars = targets
        .iter()
        .filter(|t| matches!(t, Target::Starred { .. }))
        .count();
    if stars > 1 {
        return Err(ParseError::syntax(
            "multiple starred expressions in assignment",
            span,
        ));
    }
    Ok(())
}

/// Convert a parsed expression into an assignment target
fn expr_to_target(expr: Expr, tctx: TargetCtx, top_level: bool) -> ParseResult<Target> {
    let verb = if tctx == TargetCtx::Delete {
        "delete"
    } else {
        "assign to"
    };
    match expr {
        Expr::Name { name, span } => Ok(Target::Name { name, span }),
        Expr::Attribute { object, attr, span } => Ok(Target::Attribute { object, attr, span }),
        Expr::Subscript {
            object,
            index,
            span,
        } => Ok(Target::Subscript {
            object,
            index,
            span,
        }),
        Expr::Tuple { elements, span } | Expr::List { elements, span } => {
            let targets = elements
                .into_iter()
                .map(|e| expr_to_target(e, tctx, false))
                .collect::<ParseResult<Vec<_>>>()?;
            check_single_star(&targets, span)?;
            Ok(Target::Unpack {
                elements: targets,
                span,
            })
        }
        Expr::Starred { inner, span } => {
            if top_level {
                return Err(ParseError::syntax(
                    "starred assignment target must be in a list or tuple",
                    span,
                ));
            }
            Ok(Target::Starred {
                inner: Box::new(expr_to_target(*inner, tctx, false)?),
                span,
            })
        }
        Expr::LitNone { span } => Err(ParseError::syntax(format!("cannot {} None", verb), span)),
        Expr::LitBool { v, span } => Err(ParseError::syntax(
            format!("cannot {} {}", verb, if v { "True" } else { "False" }),
            span,
        )),
        other => {
            let what = other.describe();
            let suggest = top_level
                && tctx == TargetCtx::Assign
                && matches!(what, "literal" | "function call" | "expression");
            let message = if suggest {
                format!(
                    "cannot {} {} here. Maybe you meant '==' instead of '='?",
                    verb, what
                )
            } else {
                format!("cannot {} {}", verb, what)
            };
            Err(ParseError::syntax(message, other.span()))
        }
    }
}

/* ===================== Expressions ===================== */

/// `a, b, *c` style lists: a tuple unless it is a single bare expression
pub(crate) fn build_star_expressions(pair: Pair<'_>, ctx: &SourceCtx) -> ParseResult<Expr> {
    let span = pair_to_span(&pair, ctx);
    let items = children(pair);
    let trailing = items.iter().any(|p| p.as_rule() == Rule::trailing_comma);
    let mut elements = Vec::new();
    for item in items {
        if item.as_rule() != Rule::trailing_comma {
            elements.push(build_expression(item, ctx)?);
        }
    }
    if elements.len() == 1 && !trailing {
        return elements.pop().ok_or_else(|| missing("expression", span));
    }
    Ok(Expr::Tuple { elements, span })
}

pub(crate) fn build_expression(pair: Pair<'_>, ctx: &SourceCtx) -> ParseResult<Expr> {
    let span = pair_to_span(&pair, ctx);

    match pair.as_rule() {
        Rule::expression | Rule::positional_arg | Rule::slice_upper | Rule::slice_step => {
            let inner = take(&mut children(pair).into_iter(), "expression", span)?;
            build_expression(inner, ctx)
        }
        Rule::star_expressions => build_star_expressions(pair, ctx),
        Rule::starred => {
            let inner = take(&mut children(pair).into_iter(), "starred value", span)?;
            Ok(Expr::Starred {
                inner: Box::new(build_expression(inner, ctx)?),
                span,
            })
        }
        Rule::ternary => {
            let mut parts = children(pair).into_iter();
            let first = build_expression(take(&mut parts, "expression", span)?, ctx)?;
            match parts.next() {
                None => Ok(first),
                Some(condition) => {
                    let condition = build_expression(condition, ctx)?;
                    let alternate = build_expression(take(&mut parts, "else branch", span)?, ctx)?;
                    Ok(Expr::Ternary {
                        condition: Box::new(condition),
                        consequent: Box::new(first),
                        alternate: Box::new(alternate),
                        span,
                    })
                }
            }
        }
        Rule::disjunction => build_logical_expr(pair, BoolOp::Or, ctx),
        Rule::conjunction => build_logical_expr(pair, BoolOp::And, ctx),
        Rule::not_expr => {
            let inner = take(&mut children(pair).into_iter(), "operand", span)?;
            Ok(Expr::UnaryOp {
                op: UnaryOp::Not,
                operand: Box::new(build_expression(inner, ctx)?),
                span,
            })
        }
        Rule::comparison => build_comparison(pair, ctx),
        Rule::bitor
        | Rule::bitxor
        | Rule::bitand
        | Rule::shift_expr
        | Rule::arith
        | Rule::term => build_binary_expr(pair, ctx),
        Rule::factor => {
            let mut parts = children(pair).into_iter();
            let first = take(&mut parts, "operand", span)?;
            let op = match first.as_rule() {
                Rule::op_neg => UnaryOp::Neg,
                Rule::op_pos => UnaryOp::Pos,
                Rule::op_invert => UnaryOp::Invert,
                _ => return build_expression(first, ctx),
            };
            let operand = build_expression(take(&mut parts, "operand", span)?, ctx)?;
            Ok(Expr::UnaryOp {
                op,
                operand: Box::new(operand),
                span,
            })
        }
        Rule::power => {
            if pair
                .clone()
                .into_inner()
                .next()
                .map(|p| p.as_rule() == Rule::kw_await)
                .unwrap_or(false)
            {
                return Err(ParseError::syntax("'await' outside async function", span));
            }
            let mut parts = children(pair).into_iter();
            let base = build_expression(take(&mut parts, "operand", span)?, ctx)?;
            match parts.next() {
                None => Ok(base),
                Some(_op) => {
                    let exponent = build_expression(take(&mut parts, "exponent", span)?, ctx)?;
                    Ok(Expr::BinaryOp {
                        op: BinOp::Pow,
                        left: Box::new(base),
                        right: Box::new(exponent),
                        span,
                    })
                }
            }
        }
        Rule::primary => build_primary(pair, ctx),
        Rule::lambda_expr => build_lambda(pair, ctx),
        Rule::paren_atom => build_paren_atom(pair, ctx),
        Rule::list_atom => build_list_atom(pair, ctx),
        Rule::brace_atom => build_brace_atom(pair, ctx),
        Rule::strings => build_strings(pair, ctx),
        Rule::float_number => {
            let text = pair.as_str().replace('_', "");
            let v = text.parse::<f64>().map_err(|_| {
                ParseError::BuildError(format!("Invalid float literal: {}", text), Some(span))
            })?;
            Ok(Expr::LitFloat { v, span })
        }
        Rule::int_number => build_int(pair.as_str(), span),
        Rule::none_lit => Ok(Expr::LitNone { span }),
        Rule::true_lit => Ok(Expr::LitBool { v: true, span }),
        Rule::false_lit => Ok(Expr::LitBool { v: false, span }),
        Rule::ellipsis => Ok(Expr::LitEllipsis { span }),
        Rule::identifier => Ok(Expr::Name {
            name: pair.as_str().to_string(),
            span,
        }),
        _ => Err(unexpected(&pair, ctx)),
    }
}

fn build_int(text: &str, span: Span) -> ParseResult<Expr> {
    let clean = text.replace('_', "");
    let lower = clean.to_ascii_lowercase();
    let (digits, radix) = if let Some(rest) = lower.strip_prefix("0x") {
        (rest.to_string(), 16)
    } else if let Some(rest) = lower.strip_prefix("0o") {
        (rest.to_string(), 8)
    } else if let Some(rest) = lower.strip_prefix("0b") {
        (rest.to_string(), 2)
    } else {
        if clean.len() > 1 && clean.starts_with('0') && clean.chars().any(|c| c != '0') {
            return Err(ParseError::syntax(
                "leading zeros in decimal integer literals are not permitted; use an 0o prefix for octal integers",
                span,
            ));
        }
        (clean.clone(), 10)
    };

    let value = BigInt::parse_bytes(digits.as_bytes(), radix).ok_or_else(|| {
        ParseError::BuildError(format!("Invalid integer literal: {}", text), Some(span))
    })?;
    match value.to_i64() {
        Some(v) => Ok(Expr::LitInt { v, span }),
        None => Ok(Expr::LitBigInt {
            digits: value.to_string(),
            span,
        }),
    }
}

fn build_logical_expr(pair: Pair<'_>, op: BoolOp, ctx: &SourceCtx) -> ParseResult<Expr> {
    let span = pair_to_span(&pair, ctx);
    let mut operands = children(pair).into_iter();
    let mut left = build_expression(take(&mut operands, "operand", span)?, ctx)?;
    for operand in operands {
        let right = build_expression(operand, ctx)?;
        let merged = left.span().merge(&right.span());
        left = Expr::LogicalOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
            span: merged,
        };
    }
    Ok(left)
}

fn build_comparison(pair: Pair<'_>, ctx: &SourceCtx) -> ParseResult<Expr> {
    let span = pair_to_span(&pair, ctx);
    let mut parts = children(pair).into_iter();
    let left = build_expression(take(&mut parts, "operand", span)?, ctx)?;

    let mut ops = Vec::new();
    while let Some(op_pair) = parts.next() {
        let op = match op_pair.as_rule() {
            Rule::op_eq => CmpOp::Eq,
            Rule::op_ne => CmpOp::NotEq,
            Rule::op_lt => CmpOp::Lt,
            Rule::op_le => CmpOp::LtE,
            Rule::op_gt => CmpOp::Gt,
            Rule::op_ge => CmpOp::GtE,
            Rule::op_in => CmpOp::In,
            Rule::op_not_in => CmpOp::NotIn,
            Rule::op_is => CmpOp::Is,
            Rule::op_is_not => CmpOp::IsNot,
            _ => return Err(unexpected(&op_pair, ctx)),
        };
        let right = build_expression(take(&mut parts, "operand", span)?, ctx)?;
        ops.push((op, right));
    }

    if ops.is_empty() {
        return Ok(left);
    }
    Ok(Expr::Compare {
        left: Box::new(left),
        ops,
        span,
    })
}

fn build_binary_expr(pair: Pair<'_>, ctx: &SourceCtx) -> ParseResult<Expr> {
    let span = pair_to_span(&pair, ctx);
    let inner_pairs = children(pair);

    if inner_pairs.is_empty() {
        return Err(ParseError::BuildError(
            "Empty binary expression".to_string(),
            Some(span),
        ));
    }

    let mut iter = inner_pairs.into_iter();
    let mut left = build_expression(take(&mut iter, "operand", span)?, ctx)?;

    while let Some(op_pair) = iter.next() {
        let op = match op_pair.as_rule() {
            Rule::op_add => BinOp::Add,
            Rule::op_sub => BinOp::Sub,
            Rule::op_mul => BinOp::Mul,
            Rule::op_div => BinOp::Div,
            Rule::op_floordiv => BinOp::FloorDiv,
            Rule::op_mod => BinOp::Mod,
            Rule::op_bitor => BinOp::BitOr,
            Rule::op_bitxor => BinOp::BitXor,
            Rule::op_bitand => BinOp::BitAnd,
            Rule::op_lshift => BinOp::LShift,
            Rule::op_rshift => BinOp::RShift,
            _ => return Err(unexpected(&op_pair, ctx)),
        };
        let right = build_expression(take(&mut iter, "operand", span)?, ctx)?;
        let merged = left.span().merge(&right.span());
        left = Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
            span: merged,
        };
    }

    Ok(left)
}

/* ===================== Primary & Postfix ===================== */

fn build_primary(pair: Pair<'_>, ctx: &SourceCtx) -> ParseResult<Expr> {
    let span = pair_to_span(&pair, ctx);
    let mut parts = children(pair).into_iter();
    let mut expr = build_expression(take(&mut parts, "atom", span)?, ctx)?;

    for suffix in parts {
        let suffix_span = pair_to_span(&suffix, ctx);
        let merged = expr.span().merge(&suffix_span);
        expr = match suffix.as_rule() {
            Rule::call_suffix => {
                let args = match children(suffix).into_iter().next() {
                    Some(args) => build_arguments(args, ctx)?,
                    None => Vec::new(),
                };
                Expr::Call {
                    callee: Box::new(expr),
                    args,
                    span: merged,
                }
            }
            Rule::subscript_suffix => {
                let list = take(&mut children(suffix).into_iter(), "subscript", suffix_span)?;
                let index = build_subscript_list(list, ctx)?;
                Expr::Subscript {
                    object: Box::new(expr),
                    index: Box::new(index),
                    span: merged,
                }
            }
            Rule::attr_suffix => {
                let name = take(&mut children(suffix).into_iter(), "attribute", suffix_span)?;
                Expr::Attribute {
                    object: Box::new(expr),
                    attr: name.as_str().to_string(),
                    span: merged,
                }
            }
            _ => return Err(unexpected(&suffix, ctx)),
        };
    }

    Ok(expr)
}

fn build_arguments(pair: Pair<'_>, ctx: &SourceCtx) -> ParseResult<Vec<Argument>> {
    let mut args = Vec::new();
    let mut seen_keyword = false;
    let trailing_comma = pair.as_str().trim_end().ends_with(',');
    let items = children(pair);
    let sole = items.len() == 1 && !trailing_comma;

    for arg in items {
        let span = pair_to_span(&arg, ctx);
        let rule = arg.as_rule();
        let mut inner = children(arg).into_iter();
        match rule {
            Rule::kwarg => {
                let name = take(&mut inner, "keyword", span)?.as_str().to_string();
                let value = build_expression(take(&mut inner, "value", span)?, ctx)?;
                seen_keyword = true;
                args.push(Argument::Keyword { name, value });
            }
            Rule::double_star_arg => {
                let value = build_expression(take(&mut inner, "value", span)?, ctx)?;
                seen_keyword = true;
                args.push(Argument::DoubleStar { value });
            }
            Rule::star_arg => {
                let value = build_expression(take(&mut inner, "value", span)?, ctx)?;
                args.push(Argument::Star { value });
            }
            Rule::positional_arg => {
                if seen_keyword {
                    return Err(ParseError::syntax(
                        "positional argument follows keyword argument",
                        span,
                    ));
                }
                let element = build_expression(take(&mut inner, "argument", span)?, ctx)?;
                let value = match inner.next() {
                    Some(_) if !sole => {
                        return Err(ParseError::syntax(
                            "Generator expression must be parenthesized",
                            span,
                        ));
                    }
                    Some(comp) => Expr::GeneratorExp {
                        element: Box::new(element),
                        generators: build_comprehension(comp, ctx)?,
                        span,
                    },
                    None => element,
                };
                args.push(Argument::Positional { value });
            }
            _ => {
                return Err(ParseError::BuildError(
                    format!("Unexpected argument rule: {:?}", rule),
                    Some(span),
                ))
            }
        }
    }

    Ok(args)
}

fn build_subscript_list(pair: Pair<'_>, ctx: &SourceCtx) -> ParseResult<Expr> {
    let span = pair_to_span(&pair, ctx);
    let items = children(pair);
    let trailing = items.iter().any(|p| p.as_rule() == Rule::trailing_comma);
    let mut elements = Vec::new();
    for item in items {
        if item.as_rule() != Rule::trailing_comma {
            elements.push(build_subscript_item(item, ctx)?);
        }
    }
    if elements.len() == 1 && !trailing {
        return elements.pop().ok_or_else(|| missing("subscript", span));
    }
    Ok(Expr::Tuple { elements, span })
}

fn build_subscript_item(pair: Pair<'_>, ctx: &SourceCtx) -> ParseResult<Expr> {
    let span = pair_to_span(&pair, ctx);
    let mut lower = None;
    let mut slice = None;
    for part in children(pair) {
        match part.as_rule() {
            Rule::slice_rest => slice = Some(part),
            _ => lower = Some(build_expression(part, ctx)?),
        }
    }

    let Some(rest) = slice else {
        return lower.ok_or_else(|| missing("subscript", span));
    };
    let mut upper = None;
    let mut step = None;
    for part in children(rest) {
        match part.as_rule() {
            Rule::slice_upper => upper = Some(Box::new(build_expression(part, ctx)?)),
            Rule::slice_step => step = Some(Box::new(build_expression(part, ctx)?)),
            _ => return Err(unexpected(&part, ctx)),
        }
    }
    Ok(Expr::Slice {
        lower: lower.map(Box::new),
        upper,
        step,
        span,
    })
}

fn build_lambda(pair: Pair<'_>, ctx: &SourceCtx) -> ParseResult<Expr> {
    let span = pair_to_span(&pair, ctx);
    let mut params = Vec::new();
    let mut body = None;
    for part in children(pair) {
        match part.as_rule() {
            Rule::lambda_params => params = build_parameters(part, ctx)?,
            _ => body = Some(build_expression(part, ctx)?),
        }
    }
    let value = body.ok_or_else(|| missing("lambda body", span))?;
    let value_span = value.span();
    let body = Stmt::Block {
        body: vec![Stmt::Return {
            value: Some(value),
            span: value_span,
        }]
        .into(),
        span: value_span,
    };
    let def = build_function_def("<lambda>".to_string(), params, body, true, span);
    Ok(Expr::Lambda {
        def: Arc::new(def),
        span,
    })
}

/* ===================== Displays ===================== */

/// Leading element plus the `, x, y` rest of a tuple/list/set display
fn collect_sequence(
    first: Pair<'_>,
    rest: Pair<'_>,
    ctx: &SourceCtx,
) -> ParseResult<(Vec<Expr>, bool)> {
    let mut elements = vec![build_expression(first, ctx)?];
    let mut comma = false;
    for item in children(rest) {
        if item.as_rule() == Rule::trailing_comma {
            comma = true;
        } else {
            comma = true;
            elements.push(build_expression(item, ctx)?);
        }
    }
    Ok((elements, comma))
}

fn build_paren_atom(pair: Pair<'_>, ctx: &SourceCtx) -> ParseResult<Expr> {
    let span = pair_to_span(&pair, ctx);
    let mut parts = children(pair).into_iter();
    let Some(first) = parts.next() else {
        return Ok(Expr::Tuple {
            elements: Vec::new(),
            span,
        });
    };
    let rest = take(&mut parts, "tuple rest", span)?;

    if rest.as_rule() == Rule::comprehension {
        return Ok(Expr::GeneratorExp {
            element: Box::new(build_expression(first, ctx)?),
            generators: build_comprehension(rest, ctx)?,
            span,
        });
    }

    let (mut elements, comma) = collect_sequence(first, rest, ctx)?;
    if !comma {
        let inner = elements.pop().ok_or_else(|| missing("expression", span))?;
        if let Expr::Starred { span, .. } = &inner {
            return Err(ParseError::syntax("cannot use starred expression here", *span));
        }
        return Ok(inner);
    }
    Ok(Expr::Tuple { elements, span })
}

fn build_list_atom(pair: Pair<'_>, ctx: &SourceCtx) -> ParseResult<Expr> {
    let span = pair_to_span(&pair, ctx);
    let mut parts = children(pair).into_iter();
    let Some(first) = parts.next() else {
        return Ok(Expr::List {
            elements: Vec::new(),
            span,
        });
    };
    let rest = take(&mut parts, "list rest", span)?;

    if rest.as_rule() == Rule::comprehension {
        return Ok(Expr::ListComp {
            element: Box::new(build_expression(first, ctx)?),
            generators: build_comprehension(rest, ctx)?,
            span,
        });
    }

    let (elements, _) = collect_sequence(first, rest, ctx)?;
    Ok(Expr::List { elements, span })
}

fn build_brace_atom(pair: Pair<'_>, ctx: &SourceCtx) -> ParseResult<Expr> {
    let span = pair_to_span(&pair, ctx);
    let Some(body) = children(pair).into_iter().next() else {
        return Ok(Expr::Dict {
            items: Vec::new(),
            span,
        });
    };

    match body.as_rule() {
        Rule::dict_body => {
            let parts = children(body);
            if let Some(comp) = parts.iter().find(|p| p.as_rule() == Rule::comprehension) {
                let generators = build_comprehension(comp.clone(), ctx)?;
                let entry = parts
                    .into_iter()
                    .find(|p| p.as_rule() != Rule::comprehension)
                    .ok_or_else(|| missing("dict entry", span))?;
                if entry.as_rule() != Rule::kv_pair {
                    return Err(ParseError::syntax(
                        "dict unpacking cannot be used in dict comprehension",
                        pair_to_span(&entry, ctx),
                    ));
                }
                let entry_span = pair_to_span(&entry, ctx);
                let mut kv = children(entry).into_iter();
                let key = build_expression(take(&mut kv, "key", entry_span)?, ctx)?;
                let value = build_expression(take(&mut kv, "value", entry_span)?, ctx)?;
                return Ok(Expr::DictComp {
                    key: Box::new(key),
                    value: Box::new(value),
                    generators,
                    span,
                });
            }

            let mut items = Vec::new();
            for entry in parts {
                let entry_span = pair_to_span(&entry, ctx);
                let rule = entry.as_rule();
                let mut inner = children(entry).into_iter();
                match rule {
                    Rule::kv_pair => {
                        let key = build_expression(take(&mut inner, "key", entry_span)?, ctx)?;
                        let value = build_expression(take(&mut inner, "value", entry_span)?, ctx)?;
                        items.push(DictItem::Pair { key, value });
                    }
                    Rule::double_star_item => {
                        let value = build_expression(take(&mut inner, "value", entry_span)?, ctx)?;
                        items.push(DictItem::Unpack { value });
                    }
                    _ => {
                        return Err(ParseError::BuildError(
                            format!("Unexpected dict entry: {:?}", rule),
                            Some(entry_span),
                        ))
                    }
                }
            }
            Ok(Expr::Dict { items, span })
        }
        Rule::set_body => {
            let mut parts = children(body).into_iter();
            let first = take(&mut parts, "set element", span)?;
            let rest = take(&mut parts, "set rest", span)?;
            if rest.as_rule() == Rule::comprehension {
                return Ok(Expr::SetComp {
                    element: Box::new(build_expression(first, ctx)?),
                    generators: build_comprehension(rest, ctx)?,
                    span,
                });
            }
            let (elements, _) = collect_sequence(first, rest, ctx)?;
            Ok(Expr::Set { elements, span })
        }
        _ => Err(unexpected(&body, ctx)),
    }
}

fn build_comprehension(pair: Pair<'_>, ctx: &SourceCtx) -> ParseResult<Vec<Comprehension>> {
    let mut generators: Vec<Comprehension> = Vec::new();
    for clause in children(pair) {
        let span = pair_to_span(&clause, ctx);
        match clause.as_rule() {
            Rule::comp_for => {
                let mut inner = children(clause).into_iter();
                let target =
                    build_target_list(take(&mut inner, "target", span)?, TargetCtx::For, ctx)?;
                let iter = build_expression(take(&mut inner, "iterable", span)?, ctx)?;
                generators.push(Comprehension {
                    target,
                    iter,
                    ifs: Vec::new(),
                });
            }
            Rule::comp_if => {
                let condition = take(&mut children(clause).into_iter(), "condition", span)?;
                let condition = build_expression(condition, ctx)?;
                match generators.last_mut() {
                    Some(generator) => generator.ifs.push(condition),
                    None => return Err(missing("comprehension 'for'", span)),
                }
            }
            _ => return Err(unexpected(&clause, ctx)),
        }
    }
    Ok(generators)
}
