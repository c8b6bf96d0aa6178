use std::time::Duration;

use super::helpers::{run_err_with, run_with};
use crate::executor::output::TRUNCATION_MARKER;
use crate::executor::vm::{Limits, StepHook, VM};

fn limits(configure: impl FnOnce(&mut Limits)) -> Limits {
    let mut limits = Limits::default();
    configure(&mut limits);
    limits
}

#[test]
fn test_infinite_loop_times_out() {
    let (error_type, message) = run_err_with(
        "while True:\n    pass",
        limits(|l| l.timeout = Some(Duration::from_millis(50))),
    );
    assert_eq!(error_type, "TimeoutError");
    assert_eq!(message, "execution exceeded the time limit of 50 ms");
}

#[test]
fn test_runaway_recursion_hits_recursion_limit() {
    let (error_type, message) = run_err_with(
        "def down(n):\n    return down(n + 1)\ndown(0)",
        limits(|l| l.recursion_limit = 40),
    );
    assert_eq!(error_type, "RecursionError");
    assert_eq!(message, "maximum recursion depth exceeded");
}

#[test]
fn test_recursion_error_is_catchable() {
    let source = "\
def down(n):
    return down(n + 1)
try:
    down(0)
except RecursionError:
    print('recovered')
";
    let (vm, result) = run_with(source, limits(|l| l.recursion_limit = 40));
    assert!(result.is_ok());
    assert_eq!(vm.output.as_str(), "recovered\n");
}

#[test]
fn test_output_is_truncated_but_execution_continues() {
    let source = "\
for i in range(100):
    print('0123456789')
done = True
";
    let (vm, result) = run_with(source, limits(|l| l.max_output_bytes = 25));
    assert!(result.is_ok());
    assert!(vm.output.is_truncated());
    assert_eq!(
        vm.output.as_str(),
        format!("0123456789\n0123456789\n012{}", TRUNCATION_MARKER)
    );
}

struct CountSteps;

impl StepHook for CountSteps {
    fn on_step(&mut self, _vm: &mut VM, _line_no: usize) {}
}

#[test]
fn test_trace_step_limit_is_fatal() {
    let source = "total = 0\nfor i in range(1000):\n    total += i";
    let module = crate::parser::parse_module(source).expect("Parse failed");
    let mut vm = VM::new(limits(|l| l.max_trace_steps = 100));
    vm.set_hook(Box::new(CountSteps));
    let fault = vm.run_module(&module).expect_err("step limit should stop execution");
    assert!(fault.is_fatal());
    let crate::executor::Fault::Fatal(fatal) = fault else {
        unreachable!()
    };
    assert_eq!(fatal.error_type, "ResourceLimitError");
    assert_eq!(fatal.message, "trace exceeded the limit of 100 steps");
}

#[test]
fn test_steps_are_not_limited_without_a_hook() {
    let source = "total = 0\nfor i in range(1000):\n    total += i\nprint(total)";
    let (vm, result) = run_with(source, limits(|l| l.max_trace_steps = 10));
    assert!(result.is_ok());
    assert_eq!(vm.output.as_str(), "499500\n");
}
