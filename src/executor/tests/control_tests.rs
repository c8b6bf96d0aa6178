use super::helpers::{run_err, run_ok};

#[test]
fn test_if_elif_else() {
    let source = "\
for n in [-1, 0, 5]:
    if n < 0:
        print('neg')
    elif n == 0:
        print('zero')
    else:
        print('pos')
";
    assert_eq!(run_ok(source), "neg\nzero\npos\n");
}

#[test]
fn test_while_with_break_and_continue() {
    let source = "\
i = 0
total = 0
while True:
    i += 1
    if i % 2 == 0:
        continue
    if i > 7:
        break
    total += i
print(i, total)
";
    assert_eq!(run_ok(source), "9 16\n");
}

#[test]
fn test_loop_else_runs_only_without_break() {
    let source = "\
for x in range(3):
    pass
else:
    print('finished')
for x in range(3):
    if x == 1:
        break
else:
    print('unreachable')
n = 0
while n < 2:
    n += 1
else:
    print('while done', n)
";
    assert_eq!(run_ok(source), "finished\nwhile done 2\n");
}

#[test]
fn test_nested_loops_break_inner_only() {
    let source = "\
for i in range(3):
    for j in range(3):
        if j == 1:
            break
        print(i, j)
";
    assert_eq!(run_ok(source), "0 0\n1 0\n2 0\n");
}

#[test]
fn test_for_over_dict_and_string() {
    let source = "\
d = {'b': 2, 'a': 1}
for key in d:
    print(key, d[key])
for k, v in d.items():
    print(k + '=' + str(v))
print(list('hi'))
";
    assert_eq!(run_ok(source), "b 2\na 1\nb=2\na=1\n['h', 'i']\n");
}

#[test]
fn test_dict_mutation_during_iteration() {
    let source = "\
d = {1: 1}
for k in d:
    d[k + 1] = 1
";
    let (error_type, message) = run_err(source);
    assert_eq!(error_type, "RuntimeError");
    assert_eq!(message, "dictionary changed size during iteration");
}

#[test]
fn test_augmented_assignment_on_targets() {
    let source = "\
l = [1, 2]
l[0] += 10
d = {'k': 'a'}
d['k'] *= 3
class Box:
    pass
b = Box()
b.n = 1
b.n -= 5
alias = l
l += [3]
print(l, d, b.n, alias is l)
";
    assert_eq!(run_ok(source), "[11, 2, 3] {'k': 'aaa'} -4 True\n");
}

#[test]
fn test_del_statement() {
    let source = "\
x = 1
l = [1, 2, 3]
del l[0], x
print(l)
print(x)
";
    let (error_type, message) = run_err(source);
    assert_eq!(error_type, "NameError");
    assert_eq!(message, "name 'x' is not defined");
}

#[test]
fn test_assert_statement() {
    assert_eq!(run_ok("assert 1 + 1 == 2\nprint('ok')"), "ok\n");

    let (error_type, message) = run_err("x = 3\nassert x < 0, 'x must be negative'");
    assert_eq!(error_type, "AssertionError");
    assert_eq!(message, "x must be negative");
}

#[test]
fn test_import_math() {
    let source = "\
import math
from math import sqrt, pi as PI
print(math.floor(2.7), sqrt(16), round(PI, 2))
";
    assert_eq!(run_ok(source), "2 4.0 3.14\n");
}

#[test]
fn test_unknown_module() {
    let (error_type, message) = run_err("import numpy");
    assert_eq!(error_type, "ModuleNotFoundError");
    assert_eq!(message, "No module named 'numpy'");
}

#[test]
fn test_global_and_nonlocal() {
    let source = "\
count = 0
def bump():
    global count
    count += 1
def counter():
    n = 0
    def inc():
        nonlocal n
        n += 1
        return n
    return inc
bump()
bump()
c = counter()
c()
print(count, c())
";
    assert_eq!(run_ok(source), "2 2\n");
}

#[test]
fn test_unbound_local() {
    let source = "\
x = 1
def f():
    print(x)
    x = 2
f()
";
    let (error_type, message) = run_err(source);
    assert_eq!(error_type, "UnboundLocalError");
    assert_eq!(
        message,
        "cannot access local variable 'x' where it is not associated with a value"
    );
}
