//! Instrumented execution pipeline
//!
//! `Engine::execute` compiles the source, runs it in the sandbox with the step
//! tracer attached, and assembles the tagged result. A compile failure skips
//! execution entirely.

pub mod assembler;
pub mod compiler;
pub mod sandbox;
pub mod serializer;
pub mod tracer;

#[cfg(test)]
mod tests;

use std::time::Instant;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::types::ExecutionResult;

pub use compiler::{compile, CompileError, SourceUnit};
pub use serializer::UNREPRESENTABLE;

/// Per-request lifecycle; no phase is entered twice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Received,
    Compiling,
    CompileFailed,
    Compiled,
    Executing,
    Succeeded,
    RuntimeFailed,
}

impl Phase {
    fn can_advance_to(self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Phase::Received, Phase::Compiling)
                | (Phase::Compiling, Phase::CompileFailed | Phase::Compiled)
                | (Phase::Compiled, Phase::Executing)
                | (Phase::Executing, Phase::Succeeded | Phase::RuntimeFailed)
        )
    }
}

struct Lifecycle {
    execution_id: Uuid,
    phase: Phase,
    started: Instant,
}

impl Lifecycle {
    fn new() -> Self {
        let lifecycle = Self {
            execution_id: Uuid::new_v4(),
            phase: Phase::Received,
            started: Instant::now(),
        };
        debug!(execution_id = %lifecycle.execution_id, phase = ?Phase::Received, "execution received");
        lifecycle
    }

    fn advance(&mut self, next: Phase) {
        debug_assert!(self.phase.can_advance_to(next), "{:?} -> {:?}", self.phase, next);
        debug!(
            execution_id = %self.execution_id,
            from = ?self.phase,
            to = ?next,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "phase transition"
        );
        self.phase = next;
    }
}

/// Compiles and runs submitted source with the configured limits
#[derive(Debug, Clone, Default)]
pub struct Engine {
    settings: EngineConfig,
}

impl Engine {
    pub fn new(settings: EngineConfig) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &EngineConfig {
        &self.settings
    }

    /// Compile, execute once, and assemble the result. Blocks until the
    /// worker thread finishes.
    pub fn execute(&self, source: &str) -> ExecutionResult {
        let mut lifecycle = Lifecycle::new();

        lifecycle.advance(Phase::Compiling);
        let unit = match compile(source) {
            Ok(unit) => unit,
            Err(err) => {
                lifecycle.advance(Phase::CompileFailed);
                let result = assembler::from_compile_error(err);
                log_completion(&lifecycle, &result);
                return result;
            }
        };
        lifecycle.advance(Phase::Compiled);

        lifecycle.advance(Phase::Executing);
        let run = sandbox::run(unit, &self.settings);
        if run.output_truncated {
            warn!(
                execution_id = %lifecycle.execution_id,
                limit = self.settings.max_output_bytes,
                "output truncated"
            );
        }
        let result = assembler::from_run(run);
        lifecycle.advance(match result {
            ExecutionResult::Success { .. } => Phase::Succeeded,
            _ => Phase::RuntimeFailed,
        });
        log_completion(&lifecycle, &result);
        result
    }
}

fn log_completion(lifecycle: &Lifecycle, result: &ExecutionResult) {
    info!(
        execution_id = %lifecycle.execution_id,
        status = result.status().as_str(),
        steps = result.steps().len(),
        elapsed_ms = lifecycle.started.elapsed().as_millis() as u64,
        "execution finished"
    );
}
