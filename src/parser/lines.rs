//! Logical line scanner
//!
//! First compiler pass. Splits normalised source text into logical lines:
//! physical lines joined while brackets are open or after a backslash
//! continuation, with blank and comment-only lines dropped. String literals are
//! skipped as opaque tokens so brackets and `#` inside them do not count.
//!
//! Tokenizer-level defects (unterminated strings, unbalanced brackets) are
//! reported here. The scanner stops at the first defect and hands back the
//! lines before it, so an earlier grammar error still wins.

use crate::executor::types::ast::Span;

use super::ParseError;

/* ===================== Line Index ===================== */

/// Maps byte offsets to 0-indexed (line, column) pairs, columns in characters
#[derive(Debug, Clone)]
pub struct LineIndex {
    starts: Vec<usize>,
    trailing_newline: bool,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                starts.push(i + 1);
            }
        }
        Self {
            starts,
            trailing_newline: source.ends_with('\n'),
        }
    }

    /// Number of physical lines
    pub fn line_count(&self) -> usize {
        if self.trailing_newline {
            self.starts.len() - 1
        } else {
            self.starts.len()
        }
    }

    pub fn line_col(&self, source: &str, offset: usize) -> (usize, usize) {
        let offset = offset.min(source.len());
        let line = self.starts.partition_point(|&s| s <= offset).saturating_sub(1);
        let line_start = self.starts[line];
        let col = source
            .get(line_start..offset)
            .map(|s| s.chars().count())
            .unwrap_or(0);
        (line, col)
    }

    pub fn span(&self, source: &str, start: usize, end: usize) -> Span {
        let (start_line, start_col) = self.line_col(source, start);
        let (end_line, end_col) = self.line_col(source, end);
        Span::new(start, end, start_line, start_col, end_line, end_col)
    }

    /// Text of a physical line without its newline
    pub fn line_text<'s>(&self, source: &'s str, line: usize) -> &'s str {
        let Some(&start) = self.starts.get(line) else {
            return "";
        };
        let end = self
            .starts
            .get(line + 1)
            .map(|&next| next - 1)
            .unwrap_or(source.len());
        source.get(start..end).unwrap_or("")
    }
}

/* ===================== Logical Lines ===================== */

/// One logical line of source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalLine {
    /// Byte offset of the first token
    pub start: usize,
    /// Byte offset just past the last character (excluding the newline)
    pub end: usize,
    /// Indentation width with tabs expanded to multiples of eight
    pub indent: usize,
    /// 0-indexed physical line of the first token
    pub line: usize,
    /// The line runs to the end of input inside an open bracket
    pub unclosed: bool,
}

/// Scanner output: every complete logical line up to the first defect
#[derive(Debug)]
pub struct Scan {
    pub lines: Vec<LogicalLine>,
    pub error: Option<ParseError>,
}

/// Split source into logical lines
pub fn scan(source: &str, index: &LineIndex) -> Scan {
    let mut scanner = Scanner {
        source,
        bytes: source.as_bytes(),
        index,
        pos: 0,
        lines: Vec::new(),
    };
    let error = scanner.run().err();
    Scan {
        lines: scanner.lines,
        error,
    }
}

struct Scanner<'s> {
    source: &'s str,
    bytes: &'s [u8],
    index: &'s LineIndex,
    pos: usize,
    lines: Vec<LogicalLine>,
}

impl<'s> Scanner<'s> {
    fn run(&mut self) -> Result<(), ParseError> {
        while self.pos < self.bytes.len() {
            let indent = self.skip_indentation();
            match self.peek() {
                None => break,
                Some(b'\n') => {
                    self.pos += 1;
                    continue;
                }
                Some(b'#') => {
                    self.skip_comment();
                    continue;
                }
                Some(_) => {}
            }
            self.logical_line(indent)?;
        }
        Ok(())
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_indentation(&mut self) -> usize {
        let mut width = 0;
        while let Some(b) = self.peek() {
            match b {
                b' ' => width += 1,
                b'\t' => width = (width / 8 + 1) * 8,
                b'\x0c' => width = 0,
                _ => break,
            }
            self.pos += 1;
        }
        width
    }

    fn skip_comment(&mut self) {
        while let Some(b) = self.peek() {
            if b == b'\n' {
                break;
            }
            self.pos += 1;
        }
    }

    fn logical_line(&mut self, indent: usize) -> Result<(), ParseError> {
        let start = self.pos;
        let (line, _) = self.index.line_col(self.source, start);
        let mut open: Vec<(u8, usize)> = Vec::new();

        loop {
            let Some(b) = self.peek() else {
                if let Some(&(bracket, at)) = open.last() {
                    self.finish(start, self.pos, indent, line, true);
                    return Err(self.error(
                        format!("'{}' was never closed", bracket as char),
                        at,
                    ));
                }
                self.finish(start, self.pos, indent, line, false);
                return Ok(());
            };

            match b {
                b'\n' => {
                    if open.is_empty() {
                        self.finish(start, self.pos, indent, line, false);
                        self.pos += 1;
                        return Ok(());
                    }
                    self.pos += 1;
                }
                b'#' => self.skip_comment(),
                b'\\' => match self.bytes.get(self.pos + 1) {
                    Some(b'\n') => self.pos += 2,
                    None => {
                        return Err(self.error("unexpected EOF while parsing", self.pos));
                    }
                    Some(_) => {
                        return Err(self.error(
                            "unexpected character after line continuation character",
                            self.pos + 1,
                        ));
                    }
                },
                b'"' | b'\'' => self.skip_string()?,
                b'(' | b'[' | b'{' => {
                    open.push((b, self.pos));
                    self.pos += 1;
                }
                b')' | b']' | b'}' => {
                    let Some((bracket, at)) = open.pop() else {
                        return Err(self.error(format!("unmatched '{}'", b as char), self.pos));
                    };
                    if closing_for(bracket) != b {
                        let (open_line, _) = self.index.line_col(self.source, at);
                        let (close_line, _) = self.index.line_col(self.source, self.pos);
                        let message = if open_line == close_line {
                            format!(
                                "closing parenthesis '{}' does not match opening parenthesis '{}'",
                                b as char, bracket as char
                            )
                        } else {
                            format!(
                                "closing parenthesis '{}' does not match opening parenthesis '{}' on line {}",
                                b as char,
                                bracket as char,
                                open_line + 1
                            )
                        };
                        return Err(self.error(message, self.pos));
                    }
                    self.pos += 1;
                }
                _ => self.pos += 1,
            }
        }
    }

    fn finish(&mut self, start: usize, end: usize, indent: usize, line: usize, unclosed: bool) {
        self.lines.push(LogicalLine {
            start,
            end,
            indent,
            line,
            unclosed,
        });
    }

    /// Skip a string literal starting at the quote under the cursor
    fn skip_string(&mut self) -> Result<(), ParseError> {
        let quote = self.bytes[self.pos];
        let token_start = self.prefix_start(self.pos);
        let triple = self.bytes.get(self.pos + 1) == Some(&quote)
            && self.bytes.get(self.pos + 2) == Some(&quote);

        if triple {
            self.pos += 3;
            while let Some(b) = self.peek() {
                if b == b'\\' {
                    self.pos += 2;
                    continue;
                }
                if b == quote
                    && self.bytes.get(self.pos + 1) == Some(&quote)
                    && self.bytes.get(self.pos + 2) == Some(&quote)
                {
                    self.pos += 3;
                    return Ok(());
                }
                self.pos += 1;
            }
            let last_line = self.index.line_count();
            return Err(self.error(
                format!(
                    "unterminated triple-quoted string literal (detected at line {})",
                    last_line
                ),
                token_start,
            ));
        }

        self.pos += 1;
        while let Some(b) = self.peek() {
            match b {
                b'\\' => {
                    // An escaped newline continues the literal onto the next line
                    self.pos += 2;
                }
                b'\n' => break,
                _ if b == quote => {
                    self.pos += 1;
                    return Ok(());
                }
                _ => self.pos += 1,
            }
        }
        let detected_at = self.pos.min(self.bytes.len());
        let (line, _) = self.index.line_col(self.source, detected_at.saturating_sub(1));
        Err(self.error(
            format!("unterminated string literal (detected at line {})", line + 1),
            token_start,
        ))
    }

    /// Walk back over a string prefix such as `f`, `rb` or `R`
    fn prefix_start(&self, quote_pos: usize) -> usize {
        let mut start = quote_pos;
        while start > 0 && quote_pos - start < 2 {
            let prev = self.bytes[start - 1];
            if matches!(prev, b'r' | b'R' | b'b' | b'B' | b'f' | b'F' | b'u' | b'U') {
                start -= 1;
            } else {
                break;
            }
        }
        if start < quote_pos && start > 0 {
            let before = self.bytes[start - 1];
            if before.is_ascii_alphanumeric() || before == b'_' {
                return quote_pos;
            }
        }
        start
    }

    fn error(&self, message: impl Into<String>, offset: usize) -> ParseError {
        let end = (offset + 1).min(self.bytes.len()).max(offset);
        ParseError::SyntaxError {
            message: message.into(),
            span: self.index.span(self.source, offset, end),
        }
    }
}

fn closing_for(open: u8) -> u8 {
    match open {
        b'(' => b')',
        b'[' => b']',
        _ => b'}',
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines_of(source: &str) -> Vec<String> {
        let index = LineIndex::new(source);
        let scan = scan(source, &index);
        assert!(scan.error.is_none(), "unexpected error: {:?}", scan.error);
        scan.lines
            .iter()
            .map(|l| source[l.start..l.end].to_string())
            .collect()
    }

    fn scan_error(source: &str) -> ParseError {
        let index = LineIndex::new(source);
        scan(source, &index).error.expect("expected a scan error")
    }

    #[test]
    fn test_skips_blank_and_comment_lines() {
        let lines = lines_of("x = 1\n\n   # note\ny = 2\n");
        assert_eq!(lines, vec!["x = 1", "y = 2"]);
    }

    #[test]
    fn test_joins_bracketed_lines() {
        let lines = lines_of("xs = [\n  1,\n  2,\n]\nprint(xs)");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "xs = [\n  1,\n  2,\n]");
    }

    #[test]
    fn test_joins_backslash_continuation() {
        let lines = lines_of("total = 1 + \\\n    2\n");
        assert_eq!(lines, vec!["total = 1 + \\\n    2"]);
    }

    #[test]
    fn test_indent_widths() {
        let source = "if x:\n    y = 1\n\tz = 2\n";
        let index = LineIndex::new(source);
        let scan = scan(source, &index);
        let indents: Vec<usize> = scan.lines.iter().map(|l| l.indent).collect();
        assert_eq!(indents, vec![0, 4, 8]);
    }

    #[test]
    fn test_brackets_inside_strings_ignored() {
        let lines = lines_of("s = '(['\nt = \"\"\"a\n)b\"\"\"\n");
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_unterminated_string() {
        let err = scan_error("x = 1\ny = 'abc\n");
        assert_eq!(err.message(), "unterminated string literal (detected at line 2)");
        let span = err.span().expect("span");
        assert_eq!(span.start_line, 1);
        assert_eq!(span.start_col, 4);
    }

    #[test]
    fn test_unterminated_triple_quoted_string() {
        let err = scan_error("s = \"\"\"abc\nmore\n");
        assert!(err
            .message()
            .starts_with("unterminated triple-quoted string literal"));
    }

    #[test]
    fn test_unclosed_bracket() {
        let err = scan_error("x = (1 +\n2\n");
        assert_eq!(err.message(), "'(' was never closed");
        assert_eq!(err.span().map(|s| s.start_col), Some(4));
    }

    #[test]
    fn test_unmatched_and_mismatched_brackets() {
        assert_eq!(scan_error("x = 1)").message(), "unmatched ')'");
        assert_eq!(
            scan_error("x = [1, 2)").message(),
            "closing parenthesis ')' does not match opening parenthesis '['"
        );
    }

    #[test]
    fn test_lines_before_defect_are_kept() {
        let source = "a = 1\nb = (\n";
        let index = LineIndex::new(source);
        let scan = scan(source, &index);
        assert_eq!(scan.lines.len(), 2);
        assert!(!scan.lines[0].unclosed);
        assert!(scan.lines[1].unclosed);
        assert!(scan.error.is_some());
    }

    #[test]
    fn test_line_index_columns_count_chars() {
        let source = "s = 'é'\nx";
        let index = LineIndex::new(source);
        let offset = source.find('x').unwrap_or(0);
        assert_eq!(index.line_col(source, offset), (1, 0));
        assert_eq!(index.line_text(source, 0), "s = 'é'");
    }
}
