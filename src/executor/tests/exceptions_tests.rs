use super::helpers::{run_err, run_ok};

#[test]
fn test_try_except_else_finally_order() {
    let source = "\
def attempt(x):
    try:
        result = 10 // x
    except ZeroDivisionError as e:
        print('caught', e)
    else:
        print('result', result)
    finally:
        print('cleanup')
attempt(2)
attempt(0)
";
    assert_eq!(
        run_ok(source),
        "result 5\ncleanup\ncaught integer division or modulo by zero\ncleanup\n"
    );
}

#[test]
fn test_except_matches_base_classes_and_tuples() {
    let source = "\
for bad in ['[][1]', '{}[0]', 'int(\"x\")']:
    try:
        if bad == '[][1]':
            [][1]
        elif bad == '{}[0]':
            {}[0]
        else:
            int('x')
    except (LookupError, TypeError) as e:
        print('lookup', type(e).__name__)
    except Exception as e:
        print('other', type(e).__name__)
";
    assert_eq!(
        run_ok(source),
        "lookup IndexError\nlookup KeyError\nother ValueError\n"
    );
}

#[test]
fn test_except_variable_is_cleared() {
    let source = "\
try:
    raise ValueError('boom')
except ValueError as err:
    pass
print(err)
";
    let (error_type, _) = run_err(source);
    assert_eq!(error_type, "NameError");
}

#[test]
fn test_finally_runs_on_return_and_can_override() {
    let source = "\
def f():
    try:
        return 'try'
    finally:
        print('finally ran')
def g():
    try:
        return 'try'
    finally:
        return 'finally'
print(f(), g())
";
    assert_eq!(run_ok(source), "finally ran\ntry finally\n");
}

#[test]
fn test_finally_runs_on_break() {
    let source = "\
for i in range(3):
    try:
        if i == 1:
            break
    finally:
        print('leaving', i)
";
    assert_eq!(run_ok(source), "leaving 0\nleaving 1\n");
}

#[test]
fn test_custom_exception_classes() {
    let source = "\
class AppError(Exception):
    pass
class NotFound(AppError):
    def __init__(self, key):
        super().__init__('missing ' + key)
        self.key = key
try:
    raise NotFound('user')
except AppError as e:
    print(type(e).__name__, e, e.key, e.args)
";
    assert_eq!(run_ok(source), "NotFound missing user user ('missing user',)\n");
}

#[test]
fn test_uncaught_custom_exception() {
    let source = "class AppError(Exception):\n    pass\nraise AppError('bad', 2)";
    let (error_type, message) = run_err(source);
    assert_eq!(error_type, "AppError");
    assert_eq!(message, "('bad', 2)");
}

#[test]
fn test_bare_raise_reraises_active_exception() {
    let source = "\
try:
    try:
        raise KeyError('k')
    except KeyError:
        print('logging')
        raise
except KeyError as e:
    print('outer', repr(e))
";
    assert_eq!(run_ok(source), "logging\nouter KeyError('k')\n");
}

#[test]
fn test_raise_from_sets_cause() {
    let source = "\
try:
    try:
        1 / 0
    except ZeroDivisionError as e:
        raise ValueError('wrapped') from e
except ValueError as e:
    print(type(e.__cause__).__name__)
";
    assert_eq!(run_ok(source), "ZeroDivisionError\n");
}

#[test]
fn test_raise_class_instantiates_it() {
    let (error_type, message) = run_err("raise RuntimeError");
    assert_eq!(error_type, "RuntimeError");
    assert_eq!(message, "");
}

#[test]
fn test_raise_non_exception() {
    let (error_type, message) = run_err("raise 5");
    assert_eq!(error_type, "TypeError");
    assert_eq!(message, "exceptions must derive from BaseException");
}

#[test]
fn test_exception_inside_loop_body_propagates_through_calls() {
    let source = "\
def inner(values):
    return [10 // v for v in values]
def outer():
    return inner([1, 0])
outer()
";
    let (error_type, message) = run_err(source);
    assert_eq!(error_type, "ZeroDivisionError");
    assert_eq!(message, "integer division or modulo by zero");
}
