//! End-to-end engine behaviour: scenarios, idempotence and isolation

use std::collections::HashMap;

use maplit::{convert_args, hashmap};

use super::{Engine, UNREPRESENTABLE};
use crate::config::EngineConfig;
use crate::types::{ExecutionResult, Step};

fn engine() -> Engine {
    Engine::new(EngineConfig::default())
}

fn bindings(step: &Step) -> HashMap<String, String> {
    step.locals.clone().into_iter().collect()
}

#[test]
fn test_scenario_simple_assignment() {
    let result = engine().execute("x = 1\nx = x + 1\nprint(x)");
    let ExecutionResult::Success { output, steps } = result else {
        panic!("expected success, got {:?}", result);
    };
    assert_eq!(output, "2");
    assert_eq!(steps.len(), 3);
    assert_eq!(steps[0].line_no, 1);
    assert_eq!(bindings(&steps[0]), convert_args!(hashmap!("x" => "1")));
    assert_eq!(steps[1].line_no, 2);
    assert_eq!(bindings(&steps[1]), convert_args!(hashmap!("x" => "2")));
    assert_eq!(steps[2].line_no, 3);
    assert_eq!(bindings(&steps[2]), convert_args!(hashmap!("x" => "2")));
}

#[test]
fn test_scenario_compile_error() {
    let result = engine().execute("def f(:\n pass");
    let ExecutionResult::CompileError {
        error_type,
        line_no,
        offset,
        source_text_line,
        steps,
        ..
    } = result
    else {
        panic!("expected compile_error, got {:?}", result);
    };
    assert_eq!(error_type, "SyntaxError");
    assert_eq!(line_no, 1);
    assert_eq!(offset, 7);
    assert_eq!(source_text_line, "def f(:");
    assert!(steps.is_empty());
}

#[test]
fn test_scenario_runtime_error_keeps_completed_steps() {
    let result = engine().execute("x = 1\nraise ValueError(\"boom\")");
    let ExecutionResult::RuntimeError {
        error_type,
        message,
        formatted_traceback,
        steps,
        ..
    } = result
    else {
        panic!("expected runtime_error, got {:?}", result);
    };
    assert_eq!(error_type, "ValueError");
    assert!(message.contains("boom"));
    assert!(formatted_traceback.starts_with("Traceback (most recent call last):\n"));
    assert!(formatted_traceback.ends_with("ValueError: boom\n"));
    assert_eq!(steps.len(), 1);
    assert_eq!(steps[0].line_no, 1);
    assert_eq!(bindings(&steps[0]), convert_args!(hashmap!("x" => "1")));
}

#[test]
fn test_scenario_unrepresentable_binding() {
    let source = "\
class Broken:
    def __repr__(self):
        raise RuntimeError('cannot show')
b = Broken()
done = True
";
    let result = engine().execute(source);
    let ExecutionResult::Success { steps, .. } = result else {
        panic!("expected success, got {:?}", result);
    };
    let last = steps.last().unwrap();
    assert_eq!(last.locals.get("b").map(String::as_str), Some(UNREPRESENTABLE));
    assert_eq!(last.locals.get("done").map(String::as_str), Some("True"));
}

#[test]
fn test_output_is_trimmed_on_runtime_error() {
    let result = engine().execute("print('partial')\nprint('  ')\n1 / 0");
    let ExecutionResult::RuntimeError { output, error_type, .. } = result else {
        panic!("expected runtime_error, got {:?}", result);
    };
    assert_eq!(error_type, "ZeroDivisionError");
    assert_eq!(output, "partial");
}

#[test]
fn test_leading_whitespace_is_kept() {
    let result = engine().execute("print('  indented')");
    assert_eq!(result.output(), "  indented");
}

#[test]
fn test_loops_produce_a_step_per_pass() {
    let result = engine().execute("total = 0\nfor i in range(3):\n    total += i");
    let lines: Vec<usize> = result.steps().iter().map(|s| s.line_no).collect();
    assert_eq!(lines, vec![1, 2, 3, 2, 3, 2, 3, 2]);
    let last = result.steps().last().unwrap();
    assert_eq!(last.locals.get("total").map(String::as_str), Some("3"));
}

#[test]
fn test_same_source_gives_identical_results() {
    let source = "\
class Node:
    def __init__(self, value):
        self.value = value
nodes = [Node(1), Node(2)]
ids = [id(n) for n in nodes]
print(ids[0] != ids[1])
";
    let engine = engine();
    let first = engine.execute(source);
    let second = engine.execute(source);
    assert_eq!(first.status().as_str(), "success");
    assert_eq!(first, second);
}

#[test]
fn test_executions_do_not_share_bindings() {
    let engine = engine();
    let first = engine.execute("secret = 42");
    assert_eq!(first.status().as_str(), "success");

    let second = engine.execute("print(secret)");
    let ExecutionResult::RuntimeError { error_type, message, .. } = second else {
        panic!("expected runtime_error, got {:?}", second);
    };
    assert_eq!(error_type, "NameError");
    assert_eq!(message, "name 'secret' is not defined");
}

#[test]
fn test_concurrent_executions_are_isolated() {
    let engine = engine();
    let handles: Vec<_> = (0..4)
        .map(|n| {
            let engine = engine.clone();
            std::thread::spawn(move || {
                let source = format!("value = {}\nfor i in range(50):\n    value += 1\nprint(value)", n * 1000);
                (n, engine.execute(&source))
            })
        })
        .collect();

    for handle in handles {
        let (n, result) = handle.join().unwrap();
        assert_eq!(result.output(), (n * 1000 + 50).to_string());
        assert!(result
            .steps()
            .iter()
            .all(|step| step.locals.keys().all(|k| k == "value" || k == "i")));
    }
}

#[test]
fn test_limit_violations_surface_as_runtime_errors() {
    let engine = Engine::new(EngineConfig {
        max_trace_steps: 20,
        ..EngineConfig::default()
    });
    let result = engine.execute("while True:\n    pass");
    let ExecutionResult::RuntimeError { error_type, steps, .. } = result else {
        panic!("expected runtime_error, got {:?}", result);
    };
    assert_eq!(error_type, "ResourceLimitError");
    assert_eq!(steps.len(), 20);
}

#[test]
fn test_recursion_error_is_a_normal_runtime_error() {
    let engine = Engine::new(EngineConfig {
        recursion_limit: 100,
        ..EngineConfig::default()
    });
    let result = engine.execute("def f(n):\n    return f(n + 1)\nf(0)");
    let ExecutionResult::RuntimeError { error_type, message, .. } = result else {
        panic!("expected runtime_error, got {:?}", result);
    };
    assert_eq!(error_type, "RecursionError");
    assert_eq!(message, "maximum recursion depth exceeded");
}

#[test]
fn test_large_binding_does_not_slow_tracing() {
    let source = "a = list(range(1000000))\nfor i in range(300):\n    pass\nprint(len(a))";
    let result = engine().execute(source);
    let ExecutionResult::Success { output, steps } = result else {
        panic!("expected success, got {:?}", result);
    };
    assert_eq!(output, "1000000");
    assert_eq!(steps.len(), 1 + 300 * 2 + 1 + 1);
    let a = &steps[0].locals["a"];
    assert!(a.starts_with("[0, 1, 2, "));
    assert!(a.ends_with("..."));
    assert_eq!(a.chars().count(), 1000 + 3);
}
