use super::helpers::{run_err, run_ok};

#[test]
fn test_fstrings() {
    let source = "\
name = 'Ada'
n = 3.14159
items = [1, 2]
print(f'{name!r} {n:.2f} {len(items)} {{braces}} {n:>8.1f}|')
print(f'{name=}')
";
    assert_eq!(run_ok(source), "'Ada' 3.14 2 {braces}      3.1|\nname='Ada'\n");
}

#[test]
fn test_format_specs() {
    let source = "\
print(format(1234567, ','), format(255, '#x'), format(5, '08b'), format(-42, '+06d'))
print(format('hi', '*^6'), format(0.5, '.1%'), format(12345.678, '.3e'), format(1e-5, 'g'))
";
    assert_eq!(
        run_ok(source),
        "1,234,567 0xff 00000101 -00042\n**hi** 50.0% 1.235e+04 1e-05\n"
    );
}

#[test]
fn test_str_format_method() {
    let source = "\
print('{} + {} = {}'.format(1, 2, 3))
print('{1}{0}{1}'.format('a', 'b'))
print('{name:<5}|{0:>3}'.format(7, name='x'))
point = {'x': 1}
print('{p[x]}'.format(p=point))
";
    assert_eq!(run_ok(source), "1 + 2 = 3\nbab\nx    |  7\n1\n");
}

#[test]
fn test_str_format_numbering_mix() {
    let (error_type, message) = run_err("'{} {0}'.format(1)");
    assert_eq!(error_type, "ValueError");
    assert_eq!(
        message,
        "cannot switch from automatic field numbering to manual field specification"
    );
}

#[test]
fn test_percent_formatting() {
    let source = "\
print('%s is %d years' % ('Bob', 30))
print('%5.1f|%-4s|%x|%%' % (2.26, 'a', 255))
print('%(k)s' % {'k': 'v'})
print('%r' % 'q')
";
    assert_eq!(run_ok(source), "Bob is 30 years\n  2.3|a   |ff|%\nv\n'q'\n");
}

#[test]
fn test_percent_formatting_argument_count() {
    let (error_type, message) = run_err("'%s %s' % ('a',)");
    assert_eq!(error_type, "TypeError");
    assert_eq!(message, "not enough arguments for format string");
}

#[test]
fn test_format_spec_on_unsupported_type() {
    let (error_type, message) = run_err("format([1], '>5')");
    assert_eq!(error_type, "TypeError");
    assert_eq!(message, "unsupported format string passed to list.__format__");
}

#[test]
fn test_user_defined_format_hook() {
    let source = "\
class Money:
    def __init__(self, cents):
        self.cents = cents
    def __format__(self, spec):
        return '$' + format(self.cents / 100, spec)
print(f'{Money(1999):.2f}')
";
    assert_eq!(run_ok(source), "$19.99\n");
}
