//! Isolated execution of one compiled unit on a dedicated worker thread
//!
//! Each run gets its own interpreter, namespace, tracer and output buffer.
//! Nothing is process-wide, so concurrent runs cannot observe each other.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use tracing::{error, warn};

use super::compiler::SourceUnit;
use super::tracer::StepTracer;
use crate::config::EngineConfig;
use crate::executor::errors::exception_type_name;
use crate::executor::{format_exception, format_fatal, Fault, VM};
use crate::types::Step;

/// Diagnostic for a run that ended in an exception or a fatal limit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeFailure {
    pub error_type: String,
    pub message: String,
    pub formatted_traceback: String,
}

impl RuntimeFailure {
    fn system_error(message: String) -> Self {
        Self {
            formatted_traceback: format!("SystemError: {}\n", message),
            error_type: "SystemError".to_string(),
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed(RuntimeFailure),
}

/// Everything one run produced
#[derive(Debug, Clone)]
pub struct SandboxRun {
    pub outcome: Outcome,
    pub output: String,
    pub output_truncated: bool,
    pub steps: Vec<Step>,
}

/// Run `unit` on a fresh worker thread and wait for it
pub fn run(unit: SourceUnit, settings: &EngineConfig) -> SandboxRun {
    let worker_settings = settings.clone();
    let spawned = thread::Builder::new()
        .name("stepwise-exec".to_string())
        .stack_size(settings.stack_size())
        .spawn(move || run_on_worker(&unit, &worker_settings));

    let joined = match spawned {
        Ok(handle) => handle.join(),
        Err(e) => {
            error!(error = %e, "failed to spawn execution thread");
            return failed_without_output(RuntimeFailure::system_error(format!(
                "failed to start execution thread: {}",
                e
            )));
        }
    };
    joined.unwrap_or_else(|payload| {
        let message = panic_message(payload.as_ref());
        error!(%message, "execution thread panicked");
        failed_without_output(RuntimeFailure::system_error(message))
    })
}

fn failed_without_output(failure: RuntimeFailure) -> SandboxRun {
    SandboxRun {
        outcome: Outcome::Failed(failure),
        output: String::new(),
        output_truncated: false,
        steps: Vec::new(),
    }
}

fn run_on_worker(unit: &SourceUnit, settings: &EngineConfig) -> SandboxRun {
    let mut vm = VM::new(settings.limits());
    let (tracer, trace) = StepTracer::new(settings.repr_limit);
    vm.set_hook(Box::new(tracer));

    let result = panic::catch_unwind(AssertUnwindSafe(|| vm.run_module(unit.module())));
    vm.clear_hook();

    let outcome = match result {
        Ok(Ok(())) => Outcome::Completed,
        Ok(Err(fault)) => Outcome::Failed(describe_fault(&mut vm, fault, unit.source_lines())),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(%message, "interpreter panicked");
            Outcome::Failed(RuntimeFailure::system_error(message))
        }
    };

    SandboxRun {
        outcome,
        output_truncated: vm.output.is_truncated(),
        output: vm.output.take(),
        steps: trace.take(),
    }
}

/// Class name, message and Python-style traceback of `fault`
fn describe_fault(vm: &mut VM, fault: Fault, source_lines: &[String]) -> RuntimeFailure {
    // `__str__` of user exceptions may print while the report is built
    vm.output.mute();
    let failure = match vm.materialize(fault) {
        Fault::Raised(exc) => RuntimeFailure {
            error_type: exception_type_name(&exc),
            message: vm.exception_message(&exc),
            formatted_traceback: format_exception(vm, &exc, source_lines),
        },
        Fault::Fatal(fatal) => {
            warn!(error_type = fatal.error_type, message = %fatal.message, "execution limit reached");
            RuntimeFailure {
                error_type: fatal.error_type.to_string(),
                formatted_traceback: format_fatal(&fatal, source_lines),
                message: fatal.message,
            }
        }
        Fault::Builtin { kind, .. } => RuntimeFailure {
            error_type: kind.name().to_string(),
            message: String::new(),
            formatted_traceback: format!("{}\n", kind.name()),
        },
    };
    vm.output.unmute();
    failure
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        format!("interpreter panicked: {}", text)
    } else if let Some(text) = payload.downcast_ref::<String>() {
        format!("interpreter panicked: {}", text)
    } else {
        "interpreter panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::compiler::compile;

    fn run_source(source: &str) -> SandboxRun {
        let unit = compile(source).unwrap();
        run(unit, &EngineConfig::default())
    }

    #[test]
    fn test_completed_run_keeps_output_and_steps() {
        let result = run_source("print('hi')\nx = 3");
        assert_eq!(result.outcome, Outcome::Completed);
        assert_eq!(result.output, "hi\n");
        assert_eq!(result.steps.len(), 2);
    }

    #[test]
    fn test_failure_carries_traceback() {
        let source = "\
def inner():
    return {}['missing']
inner()
";
        let result = run_source(source);
        let Outcome::Failed(failure) = result.outcome else {
            panic!("expected a failure");
        };
        assert_eq!(failure.error_type, "KeyError");
        assert_eq!(failure.message, "'missing'");
        assert_eq!(
            failure.formatted_traceback,
            "Traceback (most recent call last):\n  \
             File \"<string>\", line 3, in <module>\n    inner()\n  \
             File \"<string>\", line 2, in inner\n    return {}['missing']\n\
             KeyError: 'missing'\n"
        );
    }

    #[test]
    fn test_timeout_is_reported_as_failure() {
        let unit = compile("n = 0\nwhile True:\n    n += 1").unwrap();
        let settings = EngineConfig {
            timeout_ms: 50,
            max_trace_steps: usize::MAX,
            ..EngineConfig::default()
        };
        let result = run(unit, &settings);
        let Outcome::Failed(failure) = result.outcome else {
            panic!("expected a timeout");
        };
        assert_eq!(failure.error_type, "TimeoutError");
        assert!(!result.steps.is_empty());
    }

    #[test]
    fn test_panic_message_forms() {
        assert_eq!(panic_message(&"boom"), "interpreter panicked: boom");
        assert_eq!(panic_message(&String::from("bad")), "interpreter panicked: bad");
        assert_eq!(panic_message(&5u8), "interpreter panicked");
    }
}
