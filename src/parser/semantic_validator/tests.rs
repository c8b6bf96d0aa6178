//! Tests for the semantic validation system

use super::*;
use crate::parser::parse_module;

/* ===== Helper Functions ===== */

/// Parse source and validate, returning errors
fn validate(source: &str) -> Vec<ValidationError> {
    let module = parse_module(source).expect("Parse should succeed");
    validate_module(&module)
}

/// Check if errors contain a specific rule
fn has_rule(errors: &[ValidationError], rule_id: &str) -> bool {
    errors.iter().any(|e| e.rule_id == rule_id)
}

/// Get errors for a specific rule
fn for_rule<'a>(errors: &'a [ValidationError], rule_id: &str) -> Vec<&'a ValidationError> {
    errors.iter().filter(|e| e.rule_id == rule_id).collect()
}

/* ===== Return Outside Function ===== */

#[test]
fn test_return_at_module_level() {
    let errors = validate("x = 1\nreturn x\n");
    let found = for_rule(&errors, "return-outside-function");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].message, "'return' outside function");
    assert_eq!(found[0].span.start_line, 1);
}

#[test]
fn test_return_inside_function_ok() {
    let source = r#"
def f(x):
    if x:
        return 1
    for i in range(3):
        return i
    return None
"#;
    assert!(!has_rule(&validate(source), "return-outside-function"));
}

#[test]
fn test_return_in_class_body_inside_function() {
    let source = r#"
def f():
    class A:
        return 1
    return A
"#;
    let found = for_rule(&validate(source), "return-outside-function").len();
    assert_eq!(found, 1);
}

/* ===== Loop Control ===== */

#[test]
fn test_break_outside_loop() {
    let errors = validate("if True:\n    break\n");
    let found = for_rule(&errors, "loop-control");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].message, "'break' outside loop");
}

#[test]
fn test_continue_outside_loop() {
    let errors = validate("continue\n");
    let found = for_rule(&errors, "loop-control");
    assert_eq!(found[0].message, "'continue' not properly in loop");
}

#[test]
fn test_break_in_loop_and_try_ok() {
    let source = r#"
while True:
    try:
        break
    finally:
        pass
for x in [1]:
    if x:
        continue
"#;
    assert!(!has_rule(&validate(source), "loop-control"));
}

#[test]
fn test_break_in_loop_else_is_outside() {
    let source = "for x in []:\n    pass\nelse:\n    break\n";
    assert!(has_rule(&validate(source), "loop-control"));
}

#[test]
fn test_break_in_function_inside_loop() {
    let source = "while True:\n    def f():\n        break\n    break\n";
    assert_eq!(for_rule(&validate(source), "loop-control").len(), 1);
}

/* ===== Scope Declarations ===== */

#[test]
fn test_nonlocal_at_module_level() {
    let errors = validate("nonlocal x\n");
    let found = for_rule(&errors, "scope-declaration");
    assert_eq!(
        found[0].message,
        "nonlocal declaration not allowed at module level"
    );
}

#[test]
fn test_nonlocal_without_binding() {
    let source = "def f():\n    def g():\n        nonlocal y\n    return g\n";
    let errors = validate(source);
    let found = for_rule(&errors, "scope-declaration");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].message, "no binding for nonlocal 'y' found");
}

#[test]
fn test_nonlocal_with_binding_ok() {
    let source = r#"
def counter():
    count = 0
    def inc():
        nonlocal count
        count += 1
        return count
    return inc
"#;
    assert!(!has_rule(&validate(source), "scope-declaration"));
}

#[test]
fn test_parameter_declared_global() {
    let errors = validate("def f(a):\n    global a\n");
    let found = for_rule(&errors, "scope-declaration");
    assert_eq!(found[0].message, "name 'a' is parameter and global");
}

/* ===== Function Signature ===== */

#[test]
fn test_duplicate_argument() {
    let errors = validate("def f(a, b, a):\n    pass\n");
    let found = for_rule(&errors, "function-signature");
    assert_eq!(found.len(), 1);
    assert_eq!(
        found[0].message,
        "duplicate argument 'a' in function definition"
    );
}

#[test]
fn test_default_ordering() {
    let errors = validate("def f(a=1, b):\n    pass\n");
    let found = for_rule(&errors, "function-signature");
    assert_eq!(
        found[0].message,
        "parameter without a default follows parameter with a default"
    );
}

#[test]
fn test_keyword_only_without_default_ok() {
    let source = "def f(a=1, *args, b, c=2, **kw):\n    pass\n";
    assert!(!has_rule(&validate(source), "function-signature"));
}

#[test]
fn test_bare_star_needs_keyword_only() {
    let errors = validate("def f(a, *):\n    pass\n");
    let found = for_rule(&errors, "function-signature");
    assert_eq!(found[0].message, "named arguments must follow bare *");
}

#[test]
fn test_lambda_signature_checked() {
    let errors = validate("f = lambda x, x: x\n");
    assert!(has_rule(&errors, "function-signature"));
}

/* ===== Except Order ===== */

#[test]
fn test_bare_except_must_be_last() {
    let source = r#"
try:
    pass
except:
    pass
except ValueError:
    pass
"#;
    let errors = validate(source);
    let found = for_rule(&errors, "except-order");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].message, "default 'except:' must be last");
    assert_eq!(found[0].span.start_line, 3);
}

#[test]
fn test_bare_except_last_ok() {
    let source = "try:\n    pass\nexcept ValueError:\n    pass\nexcept:\n    pass\n";
    assert!(!has_rule(&validate(source), "except-order"));
}

/* ===== Unsupported Syntax ===== */

#[test]
fn test_yield_outside_function() {
    let errors = validate("yield 1\n");
    let found = for_rule(&errors, "unsupported-syntax");
    assert_eq!(found[0].message, "'yield' outside function");
}

#[test]
fn test_with_statement_unsupported() {
    let errors = validate("with open('f') as fh:\n    pass\n");
    let found = for_rule(&errors, "unsupported-syntax");
    assert_eq!(found[0].message, "'with' statements are not supported");
}

/* ===== Unreachable Code ===== */

#[test]
fn test_unreachable_after_return() {
    let source = "def f():\n    return 1\n    x = 2\n";
    let errors = validate(source);
    let found = for_rule(&errors, "unreachable-code");
    assert_eq!(found.len(), 1);
    assert!(!found[0].is_error());
}

#[test]
fn test_unreachable_ok_after_conditional_return() {
    let source = "def f(x):\n    if x:\n        return 1\n    return 2\n";
    assert!(!has_rule(&validate(source), "unreachable-code"));
}

#[test]
fn test_unreachable_after_both_branches_raise() {
    let source = r#"
def f(x):
    if x:
        raise ValueError()
    else:
        return 1
    print("never")
"#;
    assert!(has_rule(&validate(source), "unreachable-code"));
}

/* ===== Validator ===== */

#[test]
fn test_first_error_is_earliest() {
    let source = "def f(a, a):\n    pass\nbreak\nreturn 1\n";
    let module = parse_module(source).unwrap();
    let first = first_error(&module).unwrap();
    assert_eq!(first.rule_id, "function-signature");
    assert_eq!(first.span.start_line, 0);
}

#[test]
fn test_warnings_are_not_first_error() {
    let source = "def f():\n    return 1\n    x = 2\n";
    let module = parse_module(source).unwrap();
    assert!(first_error(&module).is_none());
}

#[test]
fn test_validator_lists_rules() {
    let validator = Validator::new();
    let rules: Vec<_> = validator.rules().collect();
    assert!(rules.iter().any(|(id, _)| *id == "loop-control"));
    assert!(rules.iter().any(|(id, _)| *id == "unreachable-code"));
}

#[test]
fn test_display_uses_one_based_position() {
    let errors = validate("x = 1\nbreak\n");
    let found = for_rule(&errors, "loop-control");
    assert_eq!(
        found[0].to_string(),
        "SyntaxError: 'break' outside loop (line 2, column 1; loop-control)"
    );
}
