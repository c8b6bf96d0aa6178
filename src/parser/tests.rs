//! Parser tests - verify parsing, AST structure and compile-error locations
//!
//! These tests do NOT execute the code; that's covered by the executor tests.

use super::*;
use crate::executor::types::ast::{
    Argument, BinOp, CmpOp, Expr, FStringPart, ParamKind, Stmt, Target,
};

/* ===================== Helpers ===================== */

fn parse_body(source: &str) -> Vec<Stmt> {
    match parse_module(source).expect("Should parse").body {
        Stmt::Block { body, .. } => body.to_vec(),
        other => panic!("Module body should be a block, got {:?}", other),
    }
}

fn parse_single(source: &str) -> Stmt {
    let mut body = parse_body(source);
    assert_eq!(body.len(), 1, "Expected one statement, got {:?}", body);
    body.remove(0)
}

fn parse_expr(source: &str) -> Expr {
    match parse_single(source) {
        Stmt::Expr { expr, .. } => expr,
        other => panic!("Expected expression statement, got {:?}", other),
    }
}

fn parse_err(source: &str) -> ParseError {
    match parse_module(source) {
        Ok(module) => panic!("Expected parse error, got {:?}", module),
        Err(err) => err,
    }
}

/* ===================== Statements ===================== */

#[test]
fn test_parse_assignment() {
    match parse_single("x = 1") {
        Stmt::Assign {
            targets,
            value: Expr::LitInt { v: 1, .. },
            span,
        } => {
            assert!(matches!(&targets[..], [Target::Name { name, .. }] if name == "x"));
            assert_eq!(span.start_col, 0);
            assert_eq!(span.end_col, 5);
        }
        other => panic!("Expected Assign, got {:?}", other),
    }
}

#[test]
fn test_parse_chained_assignment() {
    match parse_single("a = b = 0") {
        Stmt::Assign { targets, .. } => assert_eq!(targets.len(), 2),
        other => panic!("Expected Assign, got {:?}", other),
    }
}

#[test]
fn test_parse_star_unpacking() {
    match parse_single("first, *rest = [1, 2, 3]") {
        Stmt::Assign { targets, .. } => match &targets[0] {
            Target::Unpack { elements, .. } => {
                assert!(matches!(elements[0], Target::Name { .. }));
                assert!(matches!(elements[1], Target::Starred { .. }));
            }
            other => panic!("Expected Unpack, got {:?}", other),
        },
        other => panic!("Expected Assign, got {:?}", other),
    }
}

#[test]
fn test_parse_augmented_assignment() {
    match parse_single("total //= 2") {
        Stmt::AugAssign { op, target, .. } => {
            assert_eq!(op, BinOp::FloorDiv);
            assert!(matches!(target, Target::Name { .. }));
        }
        other => panic!("Expected AugAssign, got {:?}", other),
    }
}

#[test]
fn test_parse_annotated_assignment() {
    assert!(matches!(parse_single("x: int = 3"), Stmt::Assign { .. }));
    assert!(matches!(parse_single("x: int"), Stmt::Pass { .. }));
}

#[test]
fn test_parse_semicolons() {
    assert_eq!(parse_body("a = 1; b = 2; print(a)").len(), 3);
}

#[test]
fn test_parse_if_elif_else() {
    let source = "if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n";
    match parse_single(source) {
        Stmt::If {
            else_s: Some(else_s),
            ..
        } => match *else_s {
            Stmt::If {
                else_s: Some(inner_else),
                ..
            } => assert!(matches!(*inner_else, Stmt::Block { .. })),
            other => panic!("Expected nested If for elif, got {:?}", other),
        },
        other => panic!("Expected If, got {:?}", other),
    }
}

#[test]
fn test_parse_inline_suite() {
    match parse_single("if x: y = 1; z = 2") {
        Stmt::If { then_s, .. } => assert_eq!(then_s.block_body().len(), 2),
        other => panic!("Expected If, got {:?}", other),
    }
}

#[test]
fn test_parse_for_else() {
    let source = "for i, v in enumerate(xs):\n    pass\nelse:\n    done = True\n";
    match parse_single(source) {
        Stmt::For { target, else_s, .. } => {
            assert!(matches!(target, Target::Unpack { .. }));
            assert!(else_s.is_some());
        }
        other => panic!("Expected For, got {:?}", other),
    }
}

#[test]
fn test_parse_try_statement() {
    let source = r#"
try:
    risky()
except (ValueError, KeyError) as e:
    handle(e)
except Exception:
    pass
else:
    ok()
finally:
    cleanup()
"#;
    match parse_single(source) {
        Stmt::Try {
            handlers,
            else_s,
            finally_s,
            ..
        } => {
            assert_eq!(handlers.len(), 2);
            assert_eq!(handlers[0].name.as_deref(), Some("e"));
            assert!(matches!(handlers[0].kind, Some(Expr::Tuple { .. })));
            assert!(else_s.is_some());
            assert!(finally_s.is_some());
        }
        other => panic!("Expected Try, got {:?}", other),
    }
}

#[test]
fn test_parse_function_scope_info() {
    let source = r#"
def f(a, b=2, *args, key, **kw):
    global g
    c = a + b
    g = c
    for i in args:
        pass
    return c
"#;
    match parse_single(source) {
        Stmt::FunctionDef { def, .. } => {
            assert_eq!(def.name, "f");
            let kinds: Vec<_> = def.params.iter().map(|p| p.kind).collect();
            assert_eq!(
                kinds,
                vec![
                    ParamKind::Positional,
                    ParamKind::Positional,
                    ParamKind::VarArgs,
                    ParamKind::KeywordOnly,
                    ParamKind::VarKeywords
                ]
            );
            assert!(def.params[1].default.is_some());
            for name in ["a", "b", "args", "key", "kw", "c", "i"] {
                assert!(def.local_names.contains(name), "missing local {}", name);
            }
            assert!(!def.local_names.contains("g"));
            assert!(def.globals.contains("g"));
        }
        other => panic!("Expected FunctionDef, got {:?}", other),
    }
}

#[test]
fn test_parse_decorated_class() {
    let source = "@register\n@other(1)\nclass Point(Base):\n    x = 0\n    def norm(self):\n        return self.x\n";
    match parse_single(source) {
        Stmt::ClassDef {
            name,
            bases,
            decorators,
            body,
            ..
        } => {
            assert_eq!(name, "Point");
            assert_eq!(bases.len(), 1);
            assert_eq!(decorators.len(), 2);
            assert_eq!(body.block_body().len(), 2);
        }
        other => panic!("Expected ClassDef, got {:?}", other),
    }
}

#[test]
fn test_parse_imports() {
    let body = parse_body("import math as m\nfrom math import sqrt, pi as PI\nfrom math import *\n");
    match &body[0] {
        Stmt::Import { names, .. } => assert_eq!(names[0].binding(), "m"),
        other => panic!("Expected Import, got {:?}", other),
    }
    match &body[1] {
        Stmt::ImportFrom { module, names, .. } => {
            assert_eq!(module, "math");
            assert_eq!(names[1].binding(), "PI");
        }
        other => panic!("Expected ImportFrom, got {:?}", other),
    }
    assert!(matches!(&body[2], Stmt::ImportFrom { names, .. } if names.is_empty()));
}

#[test]
fn test_parse_comments_and_blank_lines() {
    let source = "# header\n\nx = 1  # trailing\n\n   # indented comment\ny = 2\n";
    assert_eq!(parse_body(source).len(), 2);
}

#[test]
fn test_parse_bracket_continuation() {
    let source = "values = [\n    1,\n    2,\n]\nprint(values)\n";
    let body = parse_body(source);
    assert_eq!(body.len(), 2);
    assert_eq!(body[1].span().start_line, 4);
}

/* ===================== Expressions ===================== */

#[test]
fn test_parse_precedence() {
    match parse_expr("1 + 2 * 3") {
        Expr::BinaryOp {
            op: BinOp::Add,
            right,
            ..
        } => assert!(matches!(*right, Expr::BinaryOp { op: BinOp::Mul, .. })),
        other => panic!("Expected Add at the root, got {:?}", other),
    }
}

#[test]
fn test_parse_power_binds_tighter_than_unary() {
    match parse_expr("-2 ** 2") {
        Expr::UnaryOp { operand, .. } => {
            assert!(matches!(*operand, Expr::BinaryOp { op: BinOp::Pow, .. }))
        }
        other => panic!("Expected unary minus at the root, got {:?}", other),
    }
}

#[test]
fn test_parse_chained_comparison() {
    match parse_expr("a < b <= c not in d") {
        Expr::Compare { ops, .. } => {
            let ops: Vec<_> = ops.iter().map(|(op, _)| *op).collect();
            assert_eq!(ops, vec![CmpOp::Lt, CmpOp::LtE, CmpOp::NotIn]);
        }
        other => panic!("Expected Compare, got {:?}", other),
    }
}

#[test]
fn test_parse_integer_literals() {
    assert!(matches!(parse_expr("0x1F"), Expr::LitInt { v: 31, .. }));
    assert!(matches!(parse_expr("1_000"), Expr::LitInt { v: 1000, .. }));
    assert!(matches!(parse_expr("0b101"), Expr::LitInt { v: 5, .. }));
    match parse_expr("123456789012345678901234567890") {
        Expr::LitBigInt { digits, .. } => assert_eq!(digits, "123456789012345678901234567890"),
        other => panic!("Expected LitBigInt, got {:?}", other),
    }
}

#[test]
fn test_parse_float_literals() {
    assert!(matches!(parse_expr("1.5"), Expr::LitFloat { v, .. } if v == 1.5));
    assert!(matches!(parse_expr("1e3"), Expr::LitFloat { v, .. } if v == 1000.0));
    assert!(matches!(parse_expr(".5"), Expr::LitFloat { v, .. } if v == 0.5));
}

#[test]
fn test_parse_string_concatenation_and_escapes() {
    match parse_expr(r#"'a\n' "b" r'\d'"#) {
        Expr::LitStr { v, .. } => assert_eq!(v, "a\nb\\d"),
        other => panic!("Expected LitStr, got {:?}", other),
    }
}

#[test]
fn test_parse_fstring_fields() {
    match parse_expr(r#"f"a{x!r:>5}b{{""#) {
        Expr::FString { parts, .. } => {
            assert_eq!(parts.len(), 3);
            match &parts[1] {
                FStringPart::Field {
                    expr,
                    conversion,
                    spec,
                    ..
                } => {
                    assert!(matches!(**expr, Expr::Name { .. }));
                    assert_eq!(*conversion, Some('r'));
                    assert!(matches!(&spec[..], [FStringPart::Literal { v }] if v == ">5"));
                }
                other => panic!("Expected field, got {:?}", other),
            }
            assert!(matches!(&parts[2], FStringPart::Literal { v } if v == "b{"));
        }
        other => panic!("Expected FString, got {:?}", other),
    }
}

#[test]
fn test_parse_fstring_debug_field() {
    match parse_expr(r#"f"{x + 1=}""#) {
        Expr::FString { parts, .. } => match &parts[0] {
            FStringPart::Field {
                debug_text,
                conversion,
                ..
            } => {
                assert_eq!(debug_text.as_deref(), Some("x + 1="));
                assert_eq!(*conversion, Some('r'));
            }
            other => panic!("Expected field, got {:?}", other),
        },
        other => panic!("Expected FString, got {:?}", other),
    }
}

#[test]
fn test_parse_fstring_field_span_points_into_source() {
    let err = parse_err("x = f'{1 +}'\n");
    assert_eq!(err.error_type(), "SyntaxError");
    assert_eq!(err.span().map(|s| s.start_line), Some(0));
}

#[test]
fn test_parse_displays_and_comprehensions() {
    assert!(matches!(parse_expr("()"), Expr::Tuple { elements, .. } if elements.is_empty()));
    assert!(matches!(parse_expr("(1,)"), Expr::Tuple { elements, .. } if elements.len() == 1));
    assert!(matches!(parse_expr("(1)"), Expr::LitInt { v: 1, .. }));
    assert!(matches!(parse_expr("{}"), Expr::Dict { .. }));
    assert!(matches!(parse_expr("{1, 2}"), Expr::Set { .. }));
    assert!(matches!(parse_expr("{**a, 'k': 1}"), Expr::Dict { items, .. } if items.len() == 2));
    assert!(matches!(
        parse_expr("[x * 2 for x in xs if x for y in x]"),
        Expr::ListComp { generators, .. } if generators.len() == 2 && generators[0].ifs.len() == 1
    ));
    assert!(matches!(
        parse_expr("{k: v for k, v in pairs}"),
        Expr::DictComp { .. }
    ));
    assert!(matches!(parse_expr("sum(x for x in xs)"), Expr::Call { .. }));
}

#[test]
fn test_parse_call_arguments() {
    match parse_expr("f(1, *rest, key=2, **opts)") {
        Expr::Call { args, .. } => {
            assert!(matches!(args[0], Argument::Positional { .. }));
            assert!(matches!(args[1], Argument::Star { .. }));
            assert!(matches!(&args[2], Argument::Keyword { name, .. } if name == "key"));
            assert!(matches!(args[3], Argument::DoubleStar { .. }));
        }
        other => panic!("Expected Call, got {:?}", other),
    }
}

#[test]
fn test_parse_slices() {
    match parse_expr("xs[1:-1:2]") {
        Expr::Subscript { index, .. } => match *index {
            Expr::Slice {
                lower, upper, step, ..
            } => {
                assert!(lower.is_some() && upper.is_some() && step.is_some());
            }
            other => panic!("Expected Slice, got {:?}", other),
        },
        other => panic!("Expected Subscript, got {:?}", other),
    }
    match parse_expr("xs[::-1]") {
        Expr::Subscript { index, .. } => {
            assert!(matches!(*index, Expr::Slice { lower: None, upper: None, step: Some(_), .. }))
        }
        other => panic!("Expected Subscript, got {:?}", other),
    }
}

#[test]
fn test_parse_lambda_and_ternary() {
    match parse_expr("lambda a, b=1: a if b else -a") {
        Expr::Lambda { def, .. } => {
            assert!(def.is_lambda);
            assert_eq!(def.params.len(), 2);
            assert!(matches!(
                def.body.block_body(),
                [Stmt::Return {
                    value: Some(Expr::Ternary { .. }),
                    ..
                }]
            ));
        }
        other => panic!("Expected Lambda, got {:?}", other),
    }
}

#[test]
fn test_parse_keyword_prefix_identifiers() {
    // Names that start with a keyword are ordinary identifiers
    assert_eq!(parse_body("iffy = 1\nnotes = iffy\nformat_x = notes").len(), 3);
}

/* ===================== Compile Errors ===================== */

#[test]
fn test_error_malformed_parameter_list() {
    let err = parse_err("def f(:\n pass");
    assert_eq!(err.error_type(), "SyntaxError");
    let span = err.span().unwrap();
    assert_eq!(span.start_line, 0);
    assert_eq!(span.start_col, 6);
}

#[test]
fn test_error_missing_colon() {
    let err = parse_err("if x\n    pass\n");
    assert_eq!(err.message(), "expected ':'");
    assert_eq!(err.span().unwrap().start_col, 4);
}

#[test]
fn test_error_expected_indented_block() {
    let err = parse_err("if x:\npass\n");
    assert_eq!(err.error_type(), "IndentationError");
    assert_eq!(
        err.message(),
        "expected an indented block after 'if' statement on line 1"
    );
    assert_eq!(err.span().unwrap().start_line, 1);
}

#[test]
fn test_error_expected_indented_block_at_eof() {
    let err = parse_err("def f():\n");
    assert_eq!(
        err.message(),
        "expected an indented block after function definition on line 1"
    );
}

#[test]
fn test_error_unexpected_indent() {
    let err = parse_err("x = 1\n    y = 2\n");
    assert_eq!(err.error_type(), "IndentationError");
    assert_eq!(err.message(), "unexpected indent");
    assert_eq!(err.span().unwrap().start_line, 1);
}

#[test]
fn test_error_inconsistent_dedent() {
    let err = parse_err("if x:\n    y = 1\n  z = 2\n");
    assert_eq!(
        err.message(),
        "unindent does not match any outer indentation level"
    );
}

#[test]
fn test_error_assign_to_literal() {
    let err = parse_err("1 = x");
    assert_eq!(
        err.message(),
        "cannot assign to literal here. Maybe you meant '==' instead of '='?"
    );
}

#[test]
fn test_error_assign_to_call() {
    let err = parse_err("f() = 1");
    assert_eq!(
        err.message(),
        "cannot assign to function call here. Maybe you meant '==' instead of '='?"
    );
}

#[test]
fn test_error_assign_to_none() {
    assert_eq!(parse_err("None = 1").message(), "cannot assign to None");
}

#[test]
fn test_error_augmented_assign_to_call() {
    assert_eq!(
        parse_err("f() += 1").message(),
        "'function call' is an illegal expression for augmented assignment"
    );
}

#[test]
fn test_error_try_without_handlers() {
    let err = parse_err("try:\n    x = 1\ny = 2\n");
    assert_eq!(err.message(), "expected 'except' or 'finally' block");
    assert_eq!(err.span().unwrap().start_line, 2);
}

#[test]
fn test_error_stray_else() {
    assert_eq!(parse_err("else:\n    pass\n").message(), "invalid syntax");
}

#[test]
fn test_error_leading_zero_integer() {
    assert!(parse_err("x = 012").message().starts_with("leading zeros"));
}

#[test]
fn test_error_positional_after_keyword() {
    assert_eq!(
        parse_err("f(a=1, 2)").message(),
        "positional argument follows keyword argument"
    );
}

#[test]
fn test_error_bare_generator_among_arguments() {
    for source in ["f(x for x in y, 1)", "f(1, x for x in y)", "f(x for x in y,)"] {
        let err = parse_err(source);
        assert_eq!(err.message(), "Generator expression must be parenthesized", "{}", source);
    }
    assert!(parse_module("f(x for x in y)").is_ok());
    assert!(parse_module("f((x for x in y), 1)").is_ok());
}

#[test]
fn test_error_earlier_line_wins_over_scanner_error() {
    // The unterminated string on line 2 is only reported once line 1 parses
    let err = parse_err("if x\ny = 'abc\n");
    assert_eq!(err.message(), "expected ':'");

    let err = parse_err("x = 1\ny = 'abc\n");
    assert_eq!(err.message(), "unterminated string literal (detected at line 2)");
}

#[test]
fn test_error_display_format() {
    let err = parse_err("x = 1\n    y = 2\n");
    assert_eq!(
        err.to_string(),
        "IndentationError: unexpected indent (line 2, column 5)"
    );
}

#[test]
fn test_normalize_source() {
    assert_eq!(normalize_source("\u{feff}a\r\nb\rc"), "a\nb\nc");
}

#[test]
fn test_error_unclosed_bracket_reported_at_opener() {
    let err = parse_err("x = (1 +\n2\n");
    assert_eq!(err.message(), "'(' was never closed");
    assert_eq!(err.span().map(|s| (s.start_line, s.start_col)), Some((0, 4)));
}

#[test]
fn test_error_inside_unclosed_bracket_blames_the_bracket() {
    let err = parse_err("x = [1, 2\ny = 3\n");
    assert_eq!(err.message(), "'[' was never closed");
    assert_eq!(err.span().map(|s| (s.start_line, s.start_col)), Some((0, 4)));

    // A defect on the opening line is still reported where it is
    let err = parse_err("x = [1 +* 2,\n3\n");
    assert_eq!(err.message(), "invalid syntax");
    assert_eq!(err.span().map(|s| s.start_line), Some(0));
}
