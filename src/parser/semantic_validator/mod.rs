//! Compile-time checks the grammar cannot express
//!
//! CPython rejects some well-formed programs before running a single line:
//! `return` at module level, `break` outside a loop, duplicate parameters,
//! misplaced `global` and so on. Each check lives in its own file under
//! `rules/` and reports into a [`Diagnostics`] sink tagged with its id.
//! [`first_error`] picks the one diagnostic the compiler turns into a
//! `SyntaxError`.

pub mod rules;

use std::fmt;

use crate::executor::types::ast::Span;

use super::Module;

/* ===== Diagnostics ===== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Stops compilation with a `SyntaxError`
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub span: Span,
    /// Worded the way CPython words it
    pub message: String,
    pub severity: Severity,
    pub rule_id: &'static str,
}

impl ValidationError {
    pub fn error(span: Span, message: impl Into<String>, rule_id: &'static str) -> Self {
        Self::with_severity(Severity::Error, span, message.into(), rule_id)
    }

    pub fn warning(span: Span, message: impl Into<String>, rule_id: &'static str) -> Self {
        Self::with_severity(Severity::Warning, span, message.into(), rule_id)
    }

    fn with_severity(severity: Severity, span: Span, message: String, rule_id: &'static str) -> Self {
        Self {
            span,
            message,
            severity,
            rule_id,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    fn position(&self) -> (usize, usize) {
        (self.span.start_line, self.span.start_col)
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (line, col) = self.position();
        let label = if self.is_error() { "SyntaxError" } else { "warning" };
        write!(f, "{}: {} (line {}, column {}; {})", label, self.message, line + 1, col + 1, self.rule_id)
    }
}

impl std::error::Error for ValidationError {}

/// Collects what one rule finds, stamping each entry with the rule's id
pub struct Diagnostics {
    rule_id: &'static str,
    found: Vec<ValidationError>,
}

impl Diagnostics {
    fn for_rule(rule_id: &'static str) -> Self {
        Self {
            rule_id,
            found: Vec::new(),
        }
    }

    pub fn error(&mut self, span: Span, message: impl Into<String>) {
        self.found.push(ValidationError::error(span, message, self.rule_id));
    }

    pub fn warning(&mut self, span: Span, message: impl Into<String>) {
        self.found.push(ValidationError::warning(span, message, self.rule_id));
    }
}

/* ===== Rules ===== */

pub trait ValidationRule: Send + Sync {
    /// Kebab-case id, e.g. `loop-control`
    fn id(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn check(&self, module: &Module, out: &mut Diagnostics);
}

pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    pub fn new() -> Self {
        let rules: Vec<Box<dyn ValidationRule>> = vec![
            Box::new(rules::ReturnOutsideFunctionRule),
            Box::new(rules::LoopControlRule),
            Box::new(rules::ScopeDeclarationRule),
            Box::new(rules::FunctionSignatureRule),
            Box::new(rules::ExceptOrderRule),
            Box::new(rules::UnsupportedSyntaxRule),
            Box::new(rules::UnreachableCodeRule),
        ];
        Self { rules }
    }

    pub fn run(&self, module: &Module) -> Vec<ValidationError> {
        let mut all = Vec::new();
        for rule in &self.rules {
            let mut out = Diagnostics::for_rule(rule.id());
            rule.check(module, &mut out);
            all.append(&mut out.found);
        }
        all
    }

    /// `(id, description)` of every registered rule
    pub fn rules(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.rules.iter().map(|r| (r.id(), r.description()))
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

/* ===== Entry points ===== */

pub fn validate_module(module: &Module) -> Vec<ValidationError> {
    Validator::new().run(module)
}

/// Earliest error by source position; warnings never stop compilation
pub fn first_error(module: &Module) -> Option<ValidationError> {
    validate_module(module)
        .into_iter()
        .filter(ValidationError::is_error)
        .min_by_key(ValidationError::position)
}

#[cfg(test)]
mod tests;
