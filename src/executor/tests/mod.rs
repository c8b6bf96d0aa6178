//! Executor tests by feature area

mod helpers;

mod builtins_tests;
mod classes_tests;
mod control_tests;
mod exceptions_tests;
mod expressions_tests;
mod format_tests;
mod functions_tests;
mod limits_tests;
