//! Folding compile and run outcomes into one `ExecutionResult`

use super::compiler::CompileError;
use super::sandbox::{Outcome, SandboxRun};
use crate::types::ExecutionResult;

pub fn from_compile_error(err: CompileError) -> ExecutionResult {
    ExecutionResult::CompileError {
        error_type: err.error_type,
        message: err.message,
        line_no: err.line_no,
        offset: err.offset,
        source_text_line: err.source_text_line,
        steps: Vec::new(),
    }
}

pub fn from_run(run: SandboxRun) -> ExecutionResult {
    let output = trim_output(run.output);
    match run.outcome {
        Outcome::Completed => ExecutionResult::Success {
            output,
            steps: run.steps,
        },
        Outcome::Failed(failure) => ExecutionResult::RuntimeError {
            error_type: failure.error_type,
            message: failure.message,
            formatted_traceback: failure.formatted_traceback,
            output,
            steps: run.steps,
        },
    }
}

/// Trailing whitespace goes, leading whitespace stays
fn trim_output(mut output: String) -> String {
    let kept = output.trim_end().len();
    output.truncate(kept);
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::sandbox::RuntimeFailure;

    fn run(outcome: Outcome, output: &str) -> SandboxRun {
        SandboxRun {
            outcome,
            output: output.to_string(),
            output_truncated: false,
            steps: Vec::new(),
        }
    }

    #[test]
    fn test_trims_only_trailing_whitespace() {
        assert_eq!(trim_output("  a\nb \n\n".to_string()), "  a\nb");
        assert_eq!(trim_output("\n".to_string()), "");
    }

    #[test]
    fn test_success() {
        let result = from_run(run(Outcome::Completed, "2\n"));
        assert_eq!(
            result,
            ExecutionResult::Success {
                output: "2".to_string(),
                steps: Vec::new()
            }
        );
    }

    #[test]
    fn test_runtime_failure_keeps_partial_output() {
        let failure = RuntimeFailure {
            error_type: "ValueError".to_string(),
            message: "boom".to_string(),
            formatted_traceback: "ValueError: boom\n".to_string(),
        };
        let result = from_run(run(Outcome::Failed(failure), "before\n"));
        let ExecutionResult::RuntimeError { error_type, output, .. } = result else {
            panic!("expected runtime_error");
        };
        assert_eq!(error_type, "ValueError");
        assert_eq!(output, "before");
    }

    #[test]
    fn test_compile_error_has_no_steps() {
        let err = CompileError {
            error_type: "SyntaxError".to_string(),
            message: "invalid syntax".to_string(),
            line_no: 2,
            offset: 3,
            source_text_line: "x = = 1".to_string(),
        };
        let result = from_compile_error(err);
        assert!(result.steps().is_empty());
        assert_eq!(result.status().as_str(), "compile_error");
    }
}
