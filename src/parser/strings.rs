//! String literal decoding
//!
//! Handles prefixes, escape sequences, implicit concatenation of adjacent
//! literals and the replacement fields of f-strings.

use crate::executor::types::ast::{Expr, FStringPart, Span};

use super::{pair_to_span, parse_embedded_expression, ParseError, ParseResult, Rule, SourceCtx};

type Pair<'i> = pest::iterators::Pair<'i, Rule>;

/// One decoded literal of a `strings` run
enum Piece {
    Plain(String),
    Formatted(Vec<FStringPart>),
}

pub(crate) fn build_strings(pair: Pair<'_>, ctx: &SourceCtx) -> ParseResult<Expr> {
    let span = pair_to_span(&pair, ctx);
    let mut pieces = Vec::new();
    for string in pair.into_inner() {
        pieces.push(build_string(string, ctx)?);
    }

    if pieces.iter().all(|p| matches!(p, Piece::Plain(_))) {
        let mut v = String::new();
        for piece in pieces {
            if let Piece::Plain(text) = piece {
                v.push_str(&text);
            }
        }
        return Ok(Expr::LitStr { v, span });
    }

    let mut parts = Vec::new();
    for piece in pieces {
        match piece {
            Piece::Plain(text) => push_literal(&mut parts, text),
            Piece::Formatted(inner) => {
                for part in inner {
                    match part {
                        FStringPart::Literal { v } => push_literal(&mut parts, v),
                        field => parts.push(field),
                    }
                }
            }
        }
    }
    Ok(Expr::FString { parts, span })
}

fn push_literal(parts: &mut Vec<FStringPart>, text: String) {
    if text.is_empty() {
        return;
    }
    if let Some(FStringPart::Literal { v }) = parts.last_mut() {
        v.push_str(&text);
        return;
    }
    parts.push(FStringPart::Literal { v: text });
}

fn build_string(pair: Pair<'_>, ctx: &SourceCtx) -> ParseResult<Piece> {
    let span = pair_to_span(&pair, ctx);
    let token_start = pair.as_span().start();
    let mut prefix = String::new();
    let mut body_pair = None;
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::string_prefix => prefix = part.as_str().to_ascii_lowercase(),
            _ => body_pair = Some(part),
        }
    }
    let body_pair =
        body_pair.ok_or_else(|| ParseError::BuildError("Missing string body".to_string(), Some(span)))?;

    if prefix.contains('b') {
        return Err(ParseError::syntax("bytes literals are not supported", span));
    }

    let quote_len = if body_pair.as_rule() == Rule::long_string {
        3
    } else {
        1
    };
    let text = body_pair.as_str();
    let body = &text[quote_len..text.len() - quote_len];
    let body_offset = token_start + prefix.len() + quote_len;
    let raw = prefix.contains('r');

    if prefix.contains('f') {
        let parser = FStringParser {
            ctx: ctx.at(ctx.base + body_offset),
            text: body,
            raw,
            span,
        };
        return Ok(Piece::Formatted(parser.parse(0, body.len(), 0)?));
    }

    if raw {
        Ok(Piece::Plain(body.to_string()))
    } else {
        Ok(Piece::Plain(decode_escapes(body)))
    }
}

/// Decode backslash escapes of a non-raw literal.
///
/// Unknown escapes are kept verbatim.
pub(crate) fn decode_escapes(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(next) = chars.next() else {
            out.push('\\');
            break;
        };
        match next {
            '\n' => {}
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'a' => out.push('\u{07}'),
            'b' => out.push('\u{08}'),
            'f' => out.push('\u{0C}'),
            'v' => out.push('\u{0B}'),
            '0'..='7' => {
                let mut value = next.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match chars.peek().and_then(|d| d.to_digit(8)) {
                        Some(d) => {
                            value = value * 8 + d;
                            chars.next();
                        }
                        None => break,
                    }
                }
                out.extend(char::from_u32(value));
            }
            'x' | 'u' | 'U' => {
                let width = match next {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let digits: String = chars.clone().take(width).collect();
                let decoded = if digits.len() == width {
                    u32::from_str_radix(&digits, 16)
                        .ok()
                        .and_then(char::from_u32)
                } else {
                    None
                };
                match decoded {
                    Some(ch) => {
                        out.push(ch);
                        for _ in 0..width {
                            chars.next();
                        }
                    }
                    None => {
                        out.push('\\');
                        out.push(next);
                    }
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }

    out
}

/* ===================== F-Strings ===================== */

struct FStringParser<'a, 's> {
    /// Context whose base is the first byte of the literal body
    ctx: SourceCtx<'s>,
    text: &'a str,
    raw: bool,
    span: Span,
}

impl<'a, 's> FStringParser<'a, 's> {
    fn error(&self, message: &str) -> ParseError {
        ParseError::syntax(message, self.span)
    }

    fn literal(&self, text: &str) -> String {
        if self.raw {
            text.to_string()
        } else {
            decode_escapes(text)
        }
    }

    /// Parse `text[start..end]` into literal pieces and fields
    fn parse(&self, start: usize, end: usize, depth: usize) -> ParseResult<Vec<FStringPart>> {
        let bytes = self.text.as_bytes();
        let mut parts = Vec::new();
        let mut literal_start = start;
        let mut pending = String::new();
        let mut i = start;

        while i < end {
            match bytes[i] {
                b'{' if i + 1 < end && bytes[i + 1] == b'{' && depth == 0 => {
                    pending.push_str(&self.literal(&self.text[literal_start..i]));
                    pending.push('{');
                    i += 2;
                    literal_start = i;
                }
                b'}' if i + 1 < end && bytes[i + 1] == b'}' && depth == 0 => {
                    pending.push_str(&self.literal(&self.text[literal_start..i]));
                    pending.push('}');
                    i += 2;
                    literal_start = i;
                }
                b'}' => return Err(self.error("f-string: single '}' is not allowed")),
                b'{' => {
                    pending.push_str(&self.literal(&self.text[literal_start..i]));
                    if !pending.is_empty() {
                        parts.push(FStringPart::Literal {
                            v: std::mem::take(&mut pending),
                        });
                    }
                    let (field, next) = self.parse_field(i + 1, end, depth)?;
                    parts.push(field);
                    i = next;
                    literal_start = i;
                }
                _ => i += 1,
            }
        }

        pending.push_str(&self.literal(&self.text[literal_start..end]));
        if !pending.is_empty() {
            parts.push(FStringPart::Literal { v: pending });
        }
        Ok(parts)
    }

    /// Parse a replacement field starting after its `{`; returns the index after `}`
    fn parse_field(
        &self,
        start: usize,
        end: usize,
        depth: usize,
    ) -> ParseResult<(FStringPart, usize)> {
        let bytes = self.text.as_bytes();
        let expr_end = self.scan_expression(start, end)?;
        let expr_text = &self.text[start..expr_end];
        if expr_text.trim().is_empty() {
            return Err(self.error("f-string: empty expression not allowed"));
        }

        let mut i = expr_end;
        let mut debug_text = None;
        if bytes.get(i) == Some(&b'=') {
            debug_text = Some(format!("{}=", expr_text));
            i += 1;
            while i < end && bytes[i] == b' ' {
                if let Some(text) = debug_text.as_mut() {
                    text.push(' ');
                }
                i += 1;
            }
        }

        let mut conversion = None;
        if bytes.get(i) == Some(&b'!') {
            let c = self.text[i + 1..end].chars().next();
            match c {
                Some(c @ ('r' | 's' | 'a')) => conversion = Some(c),
                _ => return Err(self.error("f-string: invalid conversion character: expected 's', 'r', or 'a'")),
            }
            i += 2;
        }

        let mut spec = Vec::new();
        if bytes.get(i) == Some(&b':') {
            let spec_end = self.scan_spec(i + 1, end)?;
            spec = self.parse(i + 1, spec_end, depth + 1)?;
            i = spec_end;
        }

        if bytes.get(i) != Some(&b'}') || i >= end {
            return Err(self.error("f-string: expecting '}'"));
        }

        if debug_text.is_some() && conversion.is_none() && spec.is_empty() {
            conversion = Some('r');
        }

        let ctx = self.ctx.at(self.ctx.base + start);
        let expr = parse_embedded_expression(expr_text, &ctx)?;
        Ok((
            FStringPart::Field {
                expr: Box::new(expr),
                conversion,
                spec,
                debug_text,
            },
            i + 1,
        ))
    }

    /// Find the end of the expression part of a field
    fn scan_expression(&self, start: usize, end: usize) -> ParseResult<usize> {
        let bytes = self.text.as_bytes();
        let mut nesting = 0usize;
        let mut quote: Option<u8> = None;
        let mut i = start;

        while i < end {
            let b = bytes[i];
            if let Some(q) = quote {
                if b == q {
                    quote = None;
                }
                i += 1;
                continue;
            }
            match b {
                b'\'' | b'"' => quote = Some(b),
                b'(' | b'[' | b'{' => nesting += 1,
                b')' | b']' => nesting = nesting.saturating_sub(1),
                b'}' if nesting > 0 => nesting -= 1,
                b'}' => return Ok(i),
                b'!' if nesting == 0 && bytes.get(i + 1) != Some(&b'=') => return Ok(i),
                b':' if nesting == 0 => return Ok(i),
                b'=' if nesting == 0 => {
                    let prev = if i > start { bytes[i - 1] } else { b' ' };
                    let next = bytes.get(i + 1).copied().unwrap_or(b' ');
                    if next != b'=' && !matches!(prev, b'=' | b'!' | b'<' | b'>') {
                        return Ok(i);
                    }
                    if next == b'=' {
                        i += 1;
                    }
                }
                _ => {}
            }
            i += 1;
        }

        Err(self.error("f-string: expecting '}'"))
    }

    /// Find the `}` closing a format spec, skipping nested fields
    fn scan_spec(&self, start: usize, end: usize) -> ParseResult<usize> {
        let bytes = self.text.as_bytes();
        let mut nesting = 0usize;
        for (offset, b) in bytes[start..end].iter().enumerate() {
            match b {
                b'{' => nesting += 1,
                b'}' if nesting > 0 => nesting -= 1,
                b'}' => return Ok(start + offset),
                _ => {}
            }
        }
        Err(self.error("f-string: expecting '}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_common_escapes() {
        assert_eq!(decode_escapes(r"a\nb\tc"), "a\nb\tc");
        assert_eq!(decode_escapes(r"\x41é\101"), "AéA");
        assert_eq!(decode_escapes(r"keep \d"), "keep \\d");
        assert_eq!(decode_escapes("line\\\ncontinued"), "linecontinued");
    }
}
