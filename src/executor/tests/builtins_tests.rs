use super::helpers::{run_err, run_ok};

#[test]
fn test_print_separator_and_end() {
    let out = run_ok("print(1, 2, sep='-', end='!')\nprint()\nprint('a', None, True)");
    assert_eq!(out, "1-2!\na None True\n");
}

#[test]
fn test_numeric_builtins() {
    let source = "\
print(abs(-3), abs(-2.5), divmod(7, -2), pow(2, 10), pow(3, -1, 7))
print(round(2.5), round(3.5), round(-0.5), round(2.675, 2), round(1234, -2))
print(sum([1, 2, 3], 10), sum([0.5, 0.25]), min(3, 1, 2), max([]  or [0]))
";
    assert_eq!(
        run_ok(source),
        "3 2.5 (-4, -1) 1024 5\n2 4 0 2.67 1200\n16 0.75 1 0\n"
    );
}

#[test]
fn test_conversions() {
    let source = "\
print(int('  42 '), int('ff', 16), int('0b101', 0), int(-3.9), float('1e3'), float('-inf'))
print(str(12), bool([]), bool('x'), hex(255), bin(-5), oct(8), chr(65), ord('a'))
print(list((1, 2)), tuple([3]), dict([('a', 1)]), set([1, 1, 2]))
";
    assert_eq!(
        run_ok(source),
        "42 255 5 -3 1000.0 -inf\n12 False True 0xff -0b101 0o10 A 97\n[1, 2] (3,) {'a': 1} {1, 2}\n"
    );
}

#[test]
fn test_invalid_int_literal() {
    let (error_type, message) = run_err("int('12x')");
    assert_eq!(error_type, "ValueError");
    assert_eq!(message, "invalid literal for int() with base 10: '12x'");
}

#[test]
fn test_iteration_builtins() {
    let source = "\
print(list(enumerate('ab', start=1)))
print(list(zip([1, 2, 3], 'xy')))
print(list(reversed([1, 2, 3])), sorted({3: 0, 1: 0}))
print(any([0, '', 2]), all([]), all([1, 0]))
it = iter([1, 2])
print(next(it), next(it), next(it, 'done'))
";
    assert_eq!(
        run_ok(source),
        "[(1, 'a'), (2, 'b')]\n[(1, 'x'), (2, 'y')]\n[3, 2, 1] [1, 3]\nTrue True False\n1 2 done\n"
    );
}

#[test]
fn test_next_on_exhausted_iterator() {
    let (error_type, _) = run_err("it = iter([])\nnext(it)");
    assert_eq!(error_type, "StopIteration");
}

#[test]
fn test_range_behaviour() {
    let source = "\
r = range(10, 0, -3)
print(list(r), len(r), r[1], 4 in r, r)
print(list(range(0)), range(5)[-1])
";
    assert_eq!(run_ok(source), "[10, 7, 4, 1] 4 7 True range(10, 0, -3)\n[] 4\n");
}

#[test]
fn test_range_zero_step() {
    let (error_type, message) = run_err("range(1, 5, 0)");
    assert_eq!(error_type, "ValueError");
    assert_eq!(message, "range() arg 3 must not be zero");
}

#[test]
fn test_attribute_builtins() {
    let source = "\
class Bag:
    pass
b = Bag()
setattr(b, 'size', 3)
print(hasattr(b, 'size'), getattr(b, 'size'), getattr(b, 'color', 'none'))
delattr(b, 'size')
print(hasattr(b, 'size'))
";
    assert_eq!(run_ok(source), "True 3 none\nFalse\n");
}

#[test]
fn test_isinstance_with_bool_and_tuple() {
    let out = run_ok("print(isinstance(True, int), isinstance(1, (str, float)), isinstance([], list))");
    assert_eq!(out, "True False True\n");
}

#[test]
fn test_hash_of_equal_numbers_matches() {
    assert_eq!(run_ok("print(hash(1) == hash(1.0) == hash(True), hash(-1))"), "True -2\n");
}

#[test]
fn test_string_methods() {
    let source = "\
s = '  Hello, World  '
print(s.strip().lower(), s.split(), ','.join(['a', 'b']))
print('a,b,,c'.split(','), 'hello'.replace('l', 'L', 1), 'abc'.find('z'))
print('x'.center(5, '*'), '42'.zfill(5), 'Title case'.title(), 'a-b-c'.rpartition('-'))
";
    assert_eq!(
        run_ok(source),
        "hello, world ['Hello,', 'World'] a,b\n['a', 'b', '', 'c'] heLlo -1\n**x** 00042 Title Case ('a-b', '-', 'c')\n"
    );
}

#[test]
fn test_list_and_dict_methods() {
    let source = "\
l = [3, 1, 2]
l.sort()
l.insert(0, 9)
print(l, l.pop(), l.index(9), l.count(1))
d = {'a': 1}
d.update(b=2)
print(d.get('z', 0), d.setdefault('c', 3), list(d.keys()), d.pop('a'))
s = {1, 2}
s.add(3)
print(s & {2, 3, 4}, s | {9}, s - {1})
";
    assert_eq!(
        run_ok(source),
        "[9, 1, 2] 3 0 1\n0 3 ['a', 'b', 'c'] 1\n{2, 3} {1, 2, 3, 9} {2, 3}\n"
    );
}

#[test]
fn test_set_remove_and_discard() {
    let source = "\
s = {1, 2, 3}
s.remove(2)
s.discard(7)
print(s)
";
    assert_eq!(run_ok(source), "{1, 3}\n");

    let (error_type, message) = run_err("s = {1}\ns.remove(5)");
    assert_eq!(error_type, "KeyError");
    assert_eq!(message, "5");
}
