//! Test helpers for executor tests
//!
//! Parse source, validate it, and run it in a fresh VM

use crate::executor::errors::{exception_type_name, Fault};
use crate::executor::vm::{Limits, VM};
use crate::executor::ExecResult;

/// Parse, validate and execute `source` with the given limits
pub fn run_with(source: &str, limits: Limits) -> (VM, ExecResult<()>) {
    let module = crate::parser::parse_module(source).expect("Parse failed");
    let first = crate::parser::semantic_validator::first_error(&module);
    assert!(first.is_none(), "Validation failed: {:?}", first);

    let mut vm = VM::new(limits);
    let result = vm.run_module(&module);
    (vm, result)
}

/// Run `source` and return everything it printed, panicking on a fault
pub fn run_ok(source: &str) -> String {
    let (mut vm, result) = run_with(source, Limits::default());
    if let Err(fault) = result {
        let (error_type, message) = describe(&mut vm, fault);
        panic!("Unexpected {}: {}", error_type, message);
    }
    vm.output.as_str().to_string()
}

/// Run `source`, expecting a fault; returns `(error_type, message)`
pub fn run_err(source: &str) -> (String, String) {
    run_err_with(source, Limits::default())
}

pub fn run_err_with(source: &str, limits: Limits) -> (String, String) {
    let (mut vm, result) = run_with(source, limits);
    match result {
        Ok(()) => panic!("Expected a fault, output was {:?}", vm.output.as_str()),
        Err(fault) => describe(&mut vm, fault),
    }
}

fn describe(vm: &mut VM, fault: Fault) -> (String, String) {
    match vm.materialize(fault) {
        Fault::Raised(exc) => {
            let message = vm.exception_message(&exc);
            (exception_type_name(&exc), message)
        }
        Fault::Fatal(fatal) => (fatal.error_type.to_string(), fatal.message),
        Fault::Builtin { kind, .. } => (kind.name().to_string(), String::new()),
    }
}
