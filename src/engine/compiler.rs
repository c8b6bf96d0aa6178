//! Source text to a checked, executable unit
//!
//! Parsing and semantic validation happen here; nothing is executed. A unit
//! that leaves this stage is guaranteed free of compile-time errors.

use thiserror::Error;

use crate::executor::types::ast::Span;
use crate::parser::semantic_validator::first_error;
use crate::parser::{normalize_source, parse_module, Module, ParseError};

/// Parsed module plus the source lines tracebacks quote from
#[derive(Debug, Clone)]
pub struct SourceUnit {
    module: Module,
    lines: Vec<String>,
}

impl SourceUnit {
    pub fn module(&self) -> &Module {
        &self.module
    }

    pub fn source_lines(&self) -> &[String] {
        &self.lines
    }
}

/// Syntax or indentation defect with its 1-based position
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{error_type}: {message} (line {line_no}, offset {offset})")]
pub struct CompileError {
    pub error_type: String,
    pub message: String,
    pub line_no: usize,
    /// Column in characters, 1-based
    pub offset: usize,
    pub source_text_line: String,
}

impl CompileError {
    fn at(error_type: &str, message: &str, span: Option<Span>, lines: &[String]) -> Self {
        let (line_no, offset) = match span {
            Some(span) => (span.start_line + 1, span.start_col + 1),
            None => (1, 1),
        };
        Self {
            error_type: error_type.to_string(),
            message: message.to_string(),
            line_no,
            offset,
            source_text_line: lines.get(line_no - 1).cloned().unwrap_or_default(),
        }
    }

    fn from_parse(err: &ParseError, lines: &[String]) -> Self {
        Self::at(err.error_type(), err.message(), err.span(), lines)
    }
}

pub fn compile(source: &str) -> Result<SourceUnit, CompileError> {
    let source = normalize_source(source);
    let lines: Vec<String> = source.lines().map(str::to_string).collect();

    let module = parse_module(&source).map_err(|err| CompileError::from_parse(&err, &lines))?;
    if let Some(err) = first_error(&module) {
        return Err(CompileError::at("SyntaxError", &err.message, Some(err.span), &lines));
    }

    Ok(SourceUnit { module, lines })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>() {}

    #[test]
    fn test_unit_can_move_to_a_worker_thread() {
        assert_send::<SourceUnit>();
    }

    #[test]
    fn test_compiles_valid_source() {
        let unit = compile("x = 1\r\nprint(x)\r\n").unwrap();
        assert_eq!(unit.source_lines(), ["x = 1", "print(x)"]);
    }

    #[test]
    fn test_reports_malformed_parameter_list() {
        let err = compile("def f(:\n pass").unwrap_err();
        assert_eq!(err.error_type, "SyntaxError");
        assert_eq!(err.line_no, 1);
        assert_eq!(err.offset, 7);
        assert_eq!(err.source_text_line, "def f(:");
    }

    #[test]
    fn test_reports_indentation_errors() {
        let err = compile("if True:\nprint(1)").unwrap_err();
        assert_eq!(err.error_type, "IndentationError");
        assert_eq!(err.line_no, 2);
        assert!(err.message.starts_with("expected an indented block"));
    }

    #[test]
    fn test_reports_semantic_errors() {
        let err = compile("x = 1\nreturn x").unwrap_err();
        assert_eq!(err.error_type, "SyntaxError");
        assert_eq!(err.message, "'return' outside function");
        assert_eq!(err.line_no, 2);
        assert_eq!(err.source_text_line, "return x");
    }
}
