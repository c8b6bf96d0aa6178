//! PEST-based parser for the Python subset
//!
//! Produces the AST executed by the interpreter, with span information for
//! diagnostics. Parsing runs in two passes: the line scanner splits the text
//! into logical lines and the block builder parses each line with the grammar
//! while assembling suites from indentation.

use pest::Parser;
use pest_derive::Parser;
use serde::{Deserialize, Serialize};

use crate::executor::types::ast::{ExceptHandler, Expr, FunctionDef, Param, Span, Stmt};

mod builder;
pub mod lines;
mod scope;
pub mod semantic_validator;
mod strings;

use builder::{Header, LineKind, ParsedLine};
use lines::{LineIndex, LogicalLine};

#[cfg(test)]
mod tests;

/* ===================== Module ===================== */

/// A parsed source file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    /// Module body (always a `Stmt::Block`)
    pub body: Stmt,
    /// Span of the entire module
    #[serde(default, skip_serializing_if = "is_default_span")]
    pub span: Span,
}

fn is_default_span(span: &Span) -> bool {
    *span == Span::default()
}

/* ===================== PEST Parser ===================== */

#[derive(Parser)]
#[grammar = "parser/python.pest"]
struct PythonParser;

/* ===================== Error Types ===================== */

#[derive(Debug, Clone, thiserror::Error)]
pub enum ParseError {
    #[error("SyntaxError: {message} (line {}, column {})", .span.start_line + 1, .span.start_col + 1)]
    SyntaxError { message: String, span: Span },
    #[error("IndentationError: {message} (line {}, column {})", .span.start_line + 1, .span.start_col + 1)]
    IndentationError { message: String, span: Span },
    /// The grammar accepted something the builder could not turn into AST
    #[error("SyntaxError: {0}")]
    BuildError(String, Option<Span>),
}

impl ParseError {
    pub fn syntax(message: impl Into<String>, span: Span) -> Self {
        ParseError::SyntaxError {
            message: message.into(),
            span,
        }
    }

    pub fn indentation(message: impl Into<String>, span: Span) -> Self {
        ParseError::IndentationError {
            message: message.into(),
            span,
        }
    }

    /// Python exception class name reported for this error
    pub fn error_type(&self) -> &'static str {
        match self {
            ParseError::IndentationError { .. } => "IndentationError",
            ParseError::SyntaxError { .. } | ParseError::BuildError(..) => "SyntaxError",
        }
    }

    pub fn span(&self) -> Option<Span> {
        match self {
            ParseError::SyntaxError { span, .. } => Some(*span),
            ParseError::IndentationError { span, .. } => Some(*span),
            ParseError::BuildError(_, span) => *span,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ParseError::SyntaxError { message, .. } => message,
            ParseError::IndentationError { message, .. } => message,
            ParseError::BuildError(message, _) => message,
        }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/* ===================== Span Helpers ===================== */

/// Source context for one grammar invocation.
///
/// Pest positions are relative to the parsed slice; `base` shifts them back to
/// offsets in the full source.
#[derive(Clone, Copy)]
pub(crate) struct SourceCtx<'s> {
    pub source: &'s str,
    pub index: &'s LineIndex,
    pub base: usize,
}

impl<'s> SourceCtx<'s> {
    pub fn span(&self, start: usize, end: usize) -> Span {
        self.index
            .span(self.source, self.base + start, self.base + end)
    }

    pub fn at(&self, base: usize) -> SourceCtx<'s> {
        SourceCtx { base, ..*self }
    }
}

/// Convert a PEST pair's span to our Span type
pub(crate) fn pair_to_span(pair: &pest::iterators::Pair<Rule>, ctx: &SourceCtx) -> Span {
    let pest_span = pair.as_span();
    ctx.span(pest_span.start(), pest_span.end())
}

/// Turn a pest failure into a Python-style syntax error
fn syntax_error_from_pest(err: pest::error::Error<Rule>, ctx: &SourceCtx) -> ParseError {
    let pos = match err.location {
        pest::error::InputLocation::Pos(pos) => pos,
        pest::error::InputLocation::Span((start, _)) => start,
    };
    let expected_colon = matches!(
        &err.variant,
        pest::error::ErrorVariant::ParsingError { positives, .. } if positives.contains(&Rule::colon)
    );
    let message = if expected_colon {
        "expected ':'"
    } else {
        "invalid syntax"
    };
    ParseError::syntax(message, ctx.span(pos, pos + 1))
}

/* ===================== Public API ===================== */

/// Normalise line endings to `\n` and drop a leading byte order mark
pub fn normalize_source(source: &str) -> String {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);
    source.replace("\r\n", "\n").replace('\r', "\n")
}

/// Parse normalised source text into a module
pub fn parse_module(source: &str) -> ParseResult<Module> {
    let index = LineIndex::new(source);
    let scan = lines::scan(source, &index);

    let mut builder = BlockBuilder {
        source,
        index: &index,
        lines: scan.lines,
        pending: scan.error,
        pos: 0,
        cached: None,
        indents: vec![0],
    };

    let body = builder.parse_suite(0)?;
    let span = index.span(source, 0, source.len());
    Ok(Module {
        body: Stmt::Block {
            body: body.into(),
            span,
        },
        span,
    })
}

/// Parse a single logical line (no suites)
fn parse_line(line: &LogicalLine, source: &str, index: &LineIndex) -> ParseResult<ParsedLine> {
    let ctx = SourceCtx {
        source,
        index,
        base: line.start,
    };
    let text = &source[line.start..line.end];
    let mut pairs =
        PythonParser::parse(Rule::line, text).map_err(|e| syntax_error_from_pest(e, &ctx))?;
    let pair = pairs
        .next()
        .ok_or_else(|| ParseError::BuildError("empty parse".to_string(), None))?;
    let kind = builder::build_line(pair, &ctx)?;
    Ok(ParsedLine {
        line: *line,
        kind,
    })
}

/// The failure sits on a continuation line rather than the line the
/// logical line starts on
fn fails_on_later_line(line: &LogicalLine, err: &ParseError) -> bool {
    err.span().is_some_and(|span| span.start_line > line.line)
}

/// Parse the expression inside an f-string replacement field
pub(crate) fn parse_embedded_expression(text: &str, ctx: &SourceCtx) -> ParseResult<Expr> {
    let mut pairs = PythonParser::parse(Rule::fstring_field, text)
        .map_err(|e| syntax_error_from_pest(e, ctx))?;
    let field = pairs
        .next()
        .ok_or_else(|| ParseError::BuildError("empty f-string field".to_string(), None))?;
    let expr_pair = field
        .into_inner()
        .find(|p| p.as_rule() == Rule::star_expressions)
        .ok_or_else(|| ParseError::BuildError("missing f-string expression".to_string(), None))?;
    builder::build_star_expressions(expr_pair, ctx)
}

/* ===================== Block Builder ===================== */

/// Clause keyword of a header line, for continuing compound statements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Clause {
    Elif,
    Else,
    Except,
    Finally,
    Other,
}

/// Assembles suites from logical lines by indentation
struct BlockBuilder<'s> {
    source: &'s str,
    index: &'s LineIndex,
    lines: Vec<LogicalLine>,
    /// Scanner error, surfaced once the lines before it are consumed
    pending: Option<ParseError>,
    pos: usize,
    /// Parsed form of `lines[pos]`, when already looked at
    cached: Option<ParsedLine>,
    /// Indentation widths of the enclosing suites
    indents: Vec<usize>,
}

impl<'s> BlockBuilder<'s> {
    fn peek_raw(&mut self) -> ParseResult<Option<LogicalLine>> {
        match self.lines.get(self.pos) {
            Some(line) => Ok(Some(*line)),
            None => match self.pending.take() {
                Some(err) => Err(err),
                None => Ok(None),
            },
        }
    }

    fn peek_parsed(&mut self) -> ParseResult<Option<&ParsedLine>> {
        if self.cached.is_none() {
            let Some(line) = self.lines.get(self.pos).copied() else {
                return Ok(None);
            };
            let parsed = match parse_line(&line, self.source, self.index) {
                Ok(parsed) => parsed,
                // Past the opening line of an unclosed bracket, the bracket is at fault
                Err(err)
                    if line.unclosed
                        && (self.fails_at_end(&line, &err) || fails_on_later_line(&line, &err)) =>
                {
                    return Err(self.pending.take().unwrap_or(err));
                }
                Err(err) => return Err(err),
            };
            self.cached = Some(parsed);
        }
        Ok(self.cached.as_ref())
    }

    fn take_parsed(&mut self) -> ParseResult<ParsedLine> {
        self.peek_parsed()?;
        let parsed = self.cached.take().ok_or_else(|| {
            ParseError::BuildError("unexpected end of input".to_string(), None)
        })?;
        self.pos += 1;
        Ok(parsed)
    }

    /// Clause keyword of the next line if it sits at `indent`
    fn peek_clause(&mut self, indent: usize) -> ParseResult<Option<Clause>> {
        match self.peek_raw()? {
            Some(raw) if raw.indent == indent => {}
            _ => return Ok(None),
        }
        let clause = match self.peek_parsed()? {
            Some(ParsedLine {
                kind: LineKind::Header { header, .. },
                ..
            }) => match header {
                Header::Elif(_) => Clause::Elif,
                Header::Else => Clause::Else,
                Header::Except { .. } => Clause::Except,
                Header::Finally => Clause::Finally,
                _ => Clause::Other,
            },
            _ => Clause::Other,
        };
        Ok(Some(clause))
    }

    /// Whether a grammar error sits after the last character of `line`
    fn fails_at_end(&self, line: &LogicalLine, err: &ParseError) -> bool {
        let Some(span) = err.span() else {
            return false;
        };
        let text = &self.source[line.start..line.end];
        let content_end = line.start + text.trim_end().len();
        let end = self.index.line_col(self.source, content_end);
        (span.start_line, span.start_col) >= end
    }

    fn line_start_span(&self, line: &LogicalLine) -> Span {
        self.index.span(self.source, line.start, line.start + 1)
    }

    fn line_end_span(&self, line: &LogicalLine) -> Span {
        self.index.span(self.source, line.end, line.end)
    }

    /// Parse statements at exactly `indent` until a dedent or the end of input
    fn parse_suite(&mut self, indent: usize) -> ParseResult<Vec<Stmt>> {
        let mut body = Vec::new();
        while let Some(raw) = self.peek_raw()? {
            if raw.indent < indent {
                if !self.indents.contains(&raw.indent) {
                    return Err(ParseError::indentation(
                        "unindent does not match any outer indentation level",
                        self.line_start_span(&raw),
                    ));
                }
                break;
            }
            if raw.indent > indent {
                return Err(ParseError::indentation(
                    "unexpected indent",
                    self.line_start_span(&raw),
                ));
            }
            body.extend(self.parse_statement()?);
        }
        Ok(body)
    }

    fn parse_statement(&mut self) -> ParseResult<Vec<Stmt>> {
        let parsed = self.take_parsed()?;
        match parsed.kind {
            LineKind::Simple(stmts) => Ok(stmts),
            LineKind::Decorator(first) => {
                let line = parsed.line;
                let mut decorators = vec![first];
                loop {
                    let next_raw = self.peek_raw()?;
                    let Some(raw) = next_raw.filter(|raw| raw.indent == line.indent) else {
                        let span = match next_raw {
                            Some(raw) => self.line_start_span(&raw),
                            None => self.line_end_span(&line),
                        };
                        return Err(ParseError::syntax("invalid syntax", span));
                    };
                    let next = self.take_parsed()?;
                    match next.kind {
                        LineKind::Decorator(expr) => decorators.push(expr),
                        LineKind::Header {
                            header: header @ (Header::Def { .. } | Header::Class { .. }),
                            inline,
                            span,
                        } => {
                            let stmt = self.build_compound(next.line, header, inline, span, decorators)?;
                            return Ok(vec![stmt]);
                        }
                        _ => {
                            return Err(ParseError::syntax(
                                "invalid syntax",
                                self.line_start_span(&raw),
                            ))
                        }
                    }
                }
            }
            LineKind::Header {
                header,
                inline,
                span,
            } => {
                let stmt = self.build_compound(parsed.line, header, inline, span, Vec::new())?;
                Ok(vec![stmt])
            }
        }
    }

    /// Parse the suite following a header line
    fn parse_body(
        &mut self,
        line: &LogicalLine,
        what: &str,
        inline: Option<Vec<Stmt>>,
        header_span: Span,
    ) -> ParseResult<Stmt> {
        if let Some(stmts) = inline {
            let span = stmts
                .iter()
                .fold(header_span, |acc, s| acc.merge(&s.span()));
            return Ok(Stmt::Block {
                body: stmts.into(),
                span,
            });
        }

        match self.peek_raw()? {
            Some(next) if next.indent > line.indent => {
                self.indents.push(next.indent);
                let body = self.parse_suite(next.indent);
                self.indents.pop();
                let body = body?;
                let span = body
                    .iter()
                    .fold(self.line_start_span(&next), |acc, s| acc.merge(&s.span()));
                Ok(Stmt::Block {
                    body: body.into(),
                    span,
                })
            }
            next => {
                let span = match next {
                    Some(raw) => self.line_start_span(&raw),
                    None => self.line_end_span(line),
                };
                Err(ParseError::indentation(
                    format!(
                        "expected an indented block after {} on line {}",
                        what,
                        line.line + 1
                    ),
                    span,
                ))
            }
        }
    }

    fn build_compound(
        &mut self,
        line: LogicalLine,
        header: Header,
        inline: Option<Vec<Stmt>>,
        header_span: Span,
        decorators: Vec<Expr>,
    ) -> ParseResult<Stmt> {
        let what = header.describe();
        match header {
            Header::If(test) => {
                let then_s = self.parse_body(&line, what, inline, header_span)?;
                let else_s = self.parse_if_tail(line.indent)?;
                let span = merge_optional(header_span.merge(&then_s.span()), &else_s);
                Ok(Stmt::If {
                    test,
                    then_s: Box::new(then_s),
                    else_s,
                    span,
                })
            }
            Header::While(test) => {
                let body = self.parse_body(&line, what, inline, header_span)?;
                let else_s = self.parse_else_clause(line.indent)?;
                let span = merge_optional(header_span.merge(&body.span()), &else_s);
                Ok(Stmt::While {
                    test,
                    body: Box::new(body),
                    else_s,
                    span,
                })
            }
            Header::For(target, iterable) => {
                let body = self.parse_body(&line, what, inline, header_span)?;
                let else_s = self.parse_else_clause(line.indent)?;
                let span = merge_optional(header_span.merge(&body.span()), &else_s);
                Ok(Stmt::For {
                    target,
                    iterable,
                    body: Box::new(body),
                    else_s,
                    span,
                })
            }
            Header::Def { name, params } => {
                let body = self.parse_body(&line, what, inline, header_span)?;
                let span = header_span.merge(&body.span());
                let def = build_function_def(name, params, body, false, span);
                Ok(Stmt::FunctionDef {
                    def: std::sync::Arc::new(def),
                    decorators,
                    span,
                })
            }
            Header::Class { name, bases } => {
                let body = self.parse_body(&line, what, inline, header_span)?;
                let span = header_span.merge(&body.span());
                Ok(Stmt::ClassDef {
                    name,
                    bases,
                    body: Box::new(body),
                    decorators,
                    span,
                })
            }
            Header::Try => self.build_try(line, inline, header_span),
            Header::Unsupported(feature) => {
                let body = self.parse_body(&line, what, inline, header_span)?;
                Ok(Stmt::Unsupported {
                    feature: feature.to_string(),
                    span: header_span.merge(&body.span()),
                })
            }
            Header::Elif(_) | Header::Else | Header::Except { .. } | Header::Finally => Err(
                ParseError::syntax("invalid syntax", header_span),
            ),
        }
    }

    /// `elif` / `else` continuation of an `if` statement
    fn parse_if_tail(&mut self, indent: usize) -> ParseResult<Option<Box<Stmt>>> {
        match self.peek_clause(indent)? {
            Some(Clause::Elif) => {
                let parsed = self.take_parsed()?;
                let LineKind::Header {
                    header: Header::Elif(test),
                    inline,
                    span: header_span,
                } = parsed.kind
                else {
                    return Err(ParseError::BuildError("expected elif".to_string(), None));
                };
                let then_s =
                    self.parse_body(&parsed.line, "'elif' statement", inline, header_span)?;
                let else_s = self.parse_if_tail(indent)?;
                let span = merge_optional(header_span.merge(&then_s.span()), &else_s);
                Ok(Some(Box::new(Stmt::If {
                    test,
                    then_s: Box::new(then_s),
                    else_s,
                    span,
                })))
            }
            Some(Clause::Else) => self.parse_else_clause(indent),
            _ => Ok(None),
        }
    }

    /// Optional `else:` clause of a loop, `if` or `try`
    fn parse_else_clause(&mut self, indent: usize) -> ParseResult<Option<Box<Stmt>>> {
        if self.peek_clause(indent)? != Some(Clause::Else) {
            return Ok(None);
        }
        let parsed = self.take_parsed()?;
        let LineKind::Header { inline, span, .. } = parsed.kind else {
            return Err(ParseError::BuildError("expected else".to_string(), None));
        };
        let body = self.parse_body(&parsed.line, "'else' statement", inline, span)?;
        Ok(Some(Box::new(body)))
    }

    fn build_try(
        &mut self,
        line: LogicalLine,
        inline: Option<Vec<Stmt>>,
        header_span: Span,
    ) -> ParseResult<Stmt> {
        let body = self.parse_body(&line, "'try' statement", inline, header_span)?;
        let mut span = header_span.merge(&body.span());

        let mut handlers = Vec::new();
        while self.peek_clause(line.indent)? == Some(Clause::Except) {
            let parsed = self.take_parsed()?;
            let LineKind::Header {
                header: Header::Except { kind, name },
                inline,
                span: handler_span,
            } = parsed.kind
            else {
                return Err(ParseError::BuildError("expected except".to_string(), None));
            };
            let handler_body =
                self.parse_body(&parsed.line, "'except' statement", inline, handler_span)?;
            let handler_span = handler_span.merge(&handler_body.span());
            span = span.merge(&handler_span);
            handlers.push(ExceptHandler {
                kind,
                name,
                body: Box::new(handler_body),
                span: handler_span,
            });
        }

        let else_s = if handlers.is_empty() {
            None
        } else {
            self.parse_else_clause(line.indent)?
        };
        span = merge_optional(span, &else_s);

        let finally_s = if self.peek_clause(line.indent)? == Some(Clause::Finally) {
            let parsed = self.take_parsed()?;
            let LineKind::Header { inline, span, .. } = parsed.kind else {
                return Err(ParseError::BuildError("expected finally".to_string(), None));
            };
            let body = self.parse_body(&parsed.line, "'finally' statement", inline, span)?;
            Some(Box::new(body))
        } else {
            None
        };
        span = merge_optional(span, &finally_s);

        if handlers.is_empty() && finally_s.is_none() {
            let at = match self.peek_raw()? {
                Some(raw) => self.line_start_span(&raw),
                None => self.line_end_span(&line),
            };
            return Err(ParseError::syntax("expected 'except' or 'finally' block", at));
        }

        Ok(Stmt::Try {
            body: Box::new(body),
            handlers,
            else_s,
            finally_s,
            span,
        })
    }
}

fn merge_optional(span: Span, stmt: &Option<Box<Stmt>>) -> Span {
    match stmt {
        Some(stmt) => span.merge(&stmt.span()),
        None => span,
    }
}

/// Build a function definition with its static scope information
pub(crate) fn build_function_def(
    name: String,
    params: Vec<Param>,
    body: Stmt,
    is_lambda: bool,
    span: Span,
) -> FunctionDef {
    let info = scope::analyze(&params, &body);
    FunctionDef {
        name,
        params,
        body: Box::new(body),
        local_names: info.locals,
        globals: info.globals,
        nonlocals: info.nonlocals,
        is_lambda,
        span,
    }
}
