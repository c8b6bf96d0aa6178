//! Tree-walking interpreter for the executed Python subset
//!
//! The VM keeps an explicit frame stack per activation. `run_until_done`
//! drives one activation to completion; user calls and class bodies push a
//! new activation and recurse into it.

mod attributes;
mod calls;
pub mod errors;
pub mod exec_loop;
mod expressions;
mod iteration;
mod operators;
pub mod output;
pub mod registry;
pub mod repr;
mod statements;
pub mod stdlib;
mod subscript;
pub mod types;
pub mod vm;

#[cfg(test)]
mod tests;

// Re-export commonly used items
pub use errors::{format_exception, format_fatal, ExcKind, ExecResult, FatalError, Fault, TraceEntry};
pub use exec_loop::{run_until_done, step};
pub use output::{OutputBuffer, TRUNCATION_MARKER};
pub use types::{Control, Frame, FrameKind, Val};
pub use vm::{Limits, Step, StepHook, VM};
