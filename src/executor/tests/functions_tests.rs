use super::helpers::{run_err, run_ok};

#[test]
fn test_defaults_varargs_and_kwargs() {
    let source = "\
def f(a, b=2, *args, c, d=4, **kw):
    return (a, b, args, c, d, kw)
print(f(1, c=3))
print(f(1, 5, 6, 7, c=3, e=8))
";
    assert_eq!(
        run_ok(source),
        "(1, 2, (), 3, 4, {})\n(1, 5, (6, 7), 3, 4, {'e': 8})\n"
    );
}

#[test]
fn test_call_site_unpacking() {
    let source = "\
def add(x, y, z):
    return x + y + z
args = [1, 2]
opts = {'z': 3}
print(add(*args, **opts))
";
    assert_eq!(run_ok(source), "6\n");
}

#[test]
fn test_default_values_are_shared_between_calls() {
    let source = "\
def push(item, bucket=[]):
    bucket.append(item)
    return bucket
push(1)
print(push(2))
";
    assert_eq!(run_ok(source), "[1, 2]\n");
}

#[test]
fn test_missing_argument_message() {
    let (error_type, message) = run_err("def f(a, b):\n    return a\nf(1)");
    assert_eq!(error_type, "TypeError");
    assert_eq!(message, "f() missing 1 required positional argument: 'b'");
}

#[test]
fn test_too_many_arguments_message() {
    let (_, message) = run_err("def f(a):\n    return a\nf(1, 2)");
    assert_eq!(message, "f() takes 1 positional argument but 2 were given");
}

#[test]
fn test_unexpected_keyword_message() {
    let (_, message) = run_err("def f(a):\n    return a\nf(a=1, b=2)");
    assert_eq!(message, "f() got an unexpected keyword argument 'b'");
}

#[test]
fn test_closures_capture_variables_not_values() {
    let source = "\
def make():
    fns = []
    for i in range(3):
        fns.append(lambda: i)
    return fns
print([f() for f in make()])
";
    assert_eq!(run_ok(source), "[2, 2, 2]\n");
}

#[test]
fn test_recursion() {
    let source = "\
def fib(n):
    if n < 2:
        return n
    return fib(n - 1) + fib(n - 2)
print(fib(15))
";
    assert_eq!(run_ok(source), "610\n");
}

#[test]
fn test_function_without_return_gives_none() {
    assert_eq!(run_ok("def f():\n    pass\nprint(f())"), "None\n");
}

#[test]
fn test_higher_order_builtins() {
    let source = "\
nums = [3, 1, 2]
print(list(map(lambda n: n * 2, nums)))
print(list(filter(None, [0, 1, '', 'a'])))
print(max(nums, key=lambda n: -n), min('bca'))
";
    assert_eq!(run_ok(source), "[6, 2, 4]\n[1, 'a']\n1 a\n");
}

#[test]
fn test_calling_non_callable() {
    let (error_type, message) = run_err("x = 5\nx()");
    assert_eq!(error_type, "TypeError");
    assert_eq!(message, "'int' object is not callable");
}
