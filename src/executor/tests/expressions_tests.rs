//! Arithmetic, comparisons, containers and comprehensions

use super::helpers::{run_err, run_ok};

/* ===================== Arithmetic ===================== */

#[test]
fn test_floor_division_and_modulo_follow_python_signs() {
    let out = run_ok("print(7 // 2, -7 // 2, 7 % -3, -7 % 3)\nprint(7.5 // 2, -7.5 % 2)");
    assert_eq!(out, "3 -4 -2 2\n3.0 0.5\n");
}

#[test]
fn test_true_division_always_returns_float() {
    assert_eq!(run_ok("print(6 / 3, 1 / 4)"), "2.0 0.25\n");
}

#[test]
fn test_integers_have_arbitrary_precision() {
    let out = run_ok("x = 2 ** 100\nprint(x)\nprint(x - x + 1)\nprint(-(2 ** 64) // 3)");
    assert_eq!(
        out,
        "1267650600228229401496703205376\n1\n-6148914691236517206\n"
    );
}

#[test]
fn test_float_repr_is_shortest_round_trip() {
    let out = run_ok("print(0.1 + 0.2)\nprint(1e16, 1.5e-7, 2.0)\nprint(repr(-0.0))");
    assert_eq!(out, "0.30000000000000004\n1e+16 1.5e-07 2.0\n-0.0\n");
}

#[test]
fn test_division_by_zero() {
    let (error_type, message) = run_err("x = 1\ny = x / 0");
    assert_eq!(error_type, "ZeroDivisionError");
    assert_eq!(message, "division by zero");
}

#[test]
fn test_unsupported_operand_message() {
    let (error_type, message) = run_err("1 + 'a'");
    assert_eq!(error_type, "TypeError");
    assert_eq!(message, "unsupported operand type(s) for +: 'int' and 'str'");
}

#[test]
fn test_bitwise_operators() {
    assert_eq!(run_ok("print(6 & 3, 6 | 3, 6 ^ 3, ~5, 1 << 10, -16 >> 2)"), "2 7 5 -6 1024 -4\n");
}

#[test]
fn test_huge_repetition_raises_memory_error() {
    let (error_type, _) = run_err("x = [0] * (10 ** 12)");
    assert_eq!(error_type, "MemoryError");
}

/* ===================== Comparisons & Logic ===================== */

#[test]
fn test_chained_comparisons() {
    assert_eq!(run_ok("x = 5\nprint(1 < x <= 5, 1 < x < 3, 1 == 1.0)"), "True False True\n");
}

#[test]
fn test_boolean_operators_return_operands() {
    assert_eq!(run_ok("print(0 or 'a', 1 and [], not None)"), "a [] True\n");
}

#[test]
fn test_conditional_expression() {
    assert_eq!(run_ok("x = 3\nprint('odd' if x % 2 else 'even')"), "odd\n");
}

#[test]
fn test_identity_and_membership() {
    let out = run_ok("a = [1]\nb = a\nprint(a is b, a is not [1], 2 in {1: 'x', 2: 'y'}, 'ell' in 'hello')");
    assert_eq!(out, "True True True True\n");
}

#[test]
fn test_ordering_mixed_types_fails() {
    let (error_type, message) = run_err("1 < 'a'");
    assert_eq!(error_type, "TypeError");
    assert_eq!(message, "'<' not supported between instances of 'int' and 'str'");
}

/* ===================== Containers ===================== */

#[test]
fn test_container_reprs() {
    let out = run_ok("print([1, 'a', None], (1,), {'k': [2]}, {3}, set(), ())");
    assert_eq!(out, "[1, 'a', None] (1,) {'k': [2]} {3} set() ()\n");
}

#[test]
fn test_self_referencing_list_repr() {
    assert_eq!(run_ok("a = [1]\na.append(a)\nprint(a)"), "[1, [...]]\n");
}

#[test]
fn test_slicing_with_steps() {
    let out = run_ok("s = 'abcdef'\nprint(s[::2], s[::-1], s[1:-1], s[-2:])\nl = [0, 1, 2, 3, 4]\nprint(l[4:1:-2])");
    assert_eq!(out, "ace fedcba bcde ef\n[4, 2]\n");
}

#[test]
fn test_slice_assignment_and_deletion() {
    let out = run_ok("l = [0, 1, 2, 3]\nl[1:3] = ['a', 'b', 'c']\nprint(l)\ndel l[::2]\nprint(l)");
    assert_eq!(out, "[0, 'a', 'b', 'c', 3]\n['a', 'c']\n");
}

#[test]
fn test_index_errors() {
    let (error_type, message) = run_err("[1, 2][5]");
    assert_eq!(error_type, "IndexError");
    assert_eq!(message, "list index out of range");

    let (error_type, message) = run_err("d = {}\nd['missing']");
    assert_eq!(error_type, "KeyError");
    assert_eq!(message, "'missing'");
}

#[test]
fn test_none_is_not_subscriptable() {
    let (_, message) = run_err("x = None\nx[0]");
    assert_eq!(message, "'NoneType' object is not subscriptable");
}

#[test]
fn test_unpacking_with_star_target() {
    let out = run_ok("a, *b, c = range(5)\nprint(a, b, c)\n(x, y), z = (1, 2), 3\nprint(x, y, z)");
    assert_eq!(out, "0 [1, 2, 3] 4\n1 2 3\n");
}

#[test]
fn test_unpacking_count_mismatch() {
    let (error_type, message) = run_err("a, b = [1, 2, 3]");
    assert_eq!(error_type, "ValueError");
    assert_eq!(message, "too many values to unpack (expected 2)");
}

#[test]
fn test_starred_displays_and_dict_unpacking() {
    let out = run_ok("a = [1, 2]\nprint([*a, 3], (*a,), {**{'x': 1}, 'y': 2})");
    assert_eq!(out, "[1, 2, 3] (1, 2) {'x': 1, 'y': 2}\n");
}

#[test]
fn test_dict_keys_unify_equal_numbers() {
    assert_eq!(run_ok("d = {1: 'a'}\nd[1.0] = 'b'\nd[True] = 'c'\nprint(d)"), "{1: 'c'}\n");
}

#[test]
fn test_unhashable_key() {
    let (error_type, message) = run_err("{[1]: 2}");
    assert_eq!(error_type, "TypeError");
    assert_eq!(message, "unhashable type: 'list'");
}

/* ===================== Comprehensions ===================== */

#[test]
fn test_comprehensions() {
    let source = "\
squares = [x * x for x in range(5) if x % 2 == 0]
pairs = [(i, j) for i in range(2) for j in 'ab']
lookup = {k: len(k) for k in ['a', 'bb']}
unique = {c for c in 'abca'}
total = sum(x for x in range(4))
print(squares, pairs, lookup, len(unique), total)
";
    assert_eq!(
        run_ok(source),
        "[0, 4, 16] [(0, 'a'), (0, 'b'), (1, 'a'), (1, 'b')] {'a': 1, 'bb': 2} 3 6\n"
    );
}

#[test]
fn test_comprehension_variable_does_not_leak() {
    let (error_type, _) = run_err("[i for i in range(3)]\nprint(i)");
    assert_eq!(error_type, "NameError");
}

#[test]
fn test_lambda_and_sorted_key() {
    let out = run_ok("words = ['ccc', 'a', 'bb']\nprint(sorted(words, key=lambda w: len(w), reverse=True))");
    assert_eq!(out, "['ccc', 'bb', 'a']\n");
}
