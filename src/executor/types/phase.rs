//! Execution phase enums for compound statements
//!
//! Each compound statement that stays on the frame stack has its own phase
//! enum tracking which part of it runs next. Simple statements complete in a
//! single step and never get a frame of their own.

/// Execution phase for While statements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WhilePhase {
    /// Evaluate the condition (again)
    Test = 0,
    /// The `else` suite is running
    Else = 1,
}

/// Execution phase for For statements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ForPhase {
    /// Pull the next item from the iterator
    Advance = 0,
    /// The `else` suite is running
    Else = 1,
}

/// Execution phase for Try statements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TryPhase {
    /// Executing the try block
    Body = 0,
    /// Executing a matching `except` handler
    Handler = 1,
    /// Executing the `else` suite
    Else = 2,
    /// Executing the `finally` suite
    Finally = 3,
}
