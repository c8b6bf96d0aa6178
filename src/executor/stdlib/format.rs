//! Format specifications: `format()`, f-strings, `str.format` and `str % args`
//!
//! All four front ends share one engine:
//! `[[fill]align][sign][#][0][width][,|_][.precision][type]`.

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive};

use super::{receiver, rest, CallArgs};
use crate::executor::errors::{ExecResult, Fault};
use crate::executor::operators::{to_f64, MAX_SEQUENCE_LEN};
use crate::executor::repr::{ascii_escape, bigint_to_string, float_repr};
use crate::executor::types::values::Val;
use crate::executor::vm::VM;

/* ===================== Spec Parsing ===================== */

#[derive(Debug, Clone, PartialEq)]
pub struct FormatSpec {
    pub fill: char,
    pub align: Option<char>,
    pub sign: Option<char>,
    pub alternate: bool,
    pub zero: bool,
    pub width: usize,
    pub grouping: Option<char>,
    pub precision: Option<usize>,
    pub ty: Option<char>,
}

impl Default for FormatSpec {
    fn default() -> Self {
        Self {
            fill: ' ',
            align: None,
            sign: None,
            alternate: false,
            zero: false,
            width: 0,
            grouping: None,
            precision: None,
            ty: None,
        }
    }
}

fn read_number(chars: &[char], i: &mut usize) -> ExecResult<Option<usize>> {
    let start = *i;
    while *i < chars.len() && chars[*i].is_ascii_digit() {
        *i += 1;
    }
    if *i == start {
        return Ok(None);
    }
    let digits: String = chars[start..*i].iter().collect();
    match digits.parse::<usize>() {
        Ok(n) if n <= MAX_SEQUENCE_LEN => Ok(Some(n)),
        _ => Err(Fault::value_error("Too many decimal digits in format string")),
    }
}

pub fn parse_spec(spec: &str, type_name: &str) -> ExecResult<FormatSpec> {
    let chars: Vec<char> = spec.chars().collect();
    let mut out = FormatSpec::default();
    let mut i = 0;
    let is_align = |c: char| matches!(c, '<' | '>' | '=' | '^');

    if chars.len() >= 2 && is_align(chars[1]) {
        out.fill = chars[0];
        out.align = Some(chars[1]);
        i = 2;
    } else if !chars.is_empty() && is_align(chars[0]) {
        out.align = Some(chars[0]);
        i = 1;
    }
    if let Some(&c @ ('+' | '-' | ' ')) = chars.get(i) {
        out.sign = Some(c);
        i += 1;
    }
    if chars.get(i) == Some(&'#') {
        out.alternate = true;
        i += 1;
    }
    if chars.get(i) == Some(&'0') {
        out.zero = true;
        i += 1;
    }
    out.width = read_number(&chars, &mut i)?.unwrap_or(0);
    if let Some(&c @ (',' | '_')) = chars.get(i) {
        out.grouping = Some(c);
        i += 1;
    }
    if chars.get(i) == Some(&'.') {
        i += 1;
        out.precision = Some(
            read_number(&chars, &mut i)?
                .ok_or_else(|| Fault::value_error("Format specifier missing precision"))?,
        );
    }
    match chars.len() - i {
        0 => {}
        1 => out.ty = Some(chars[i]),
        _ => {
            return Err(Fault::value_error(format!(
                "Invalid format specifier '{}' for object of type '{}'",
                spec, type_name
            )))
        }
    }
    if out.zero && out.align.is_none() {
        out.fill = '0';
    }
    Ok(out)
}

/* ===================== Padding ===================== */

fn repeat(c: char, n: usize) -> String {
    std::iter::repeat(c).take(n).collect()
}

/// Pad `text` to the spec width with its fill and alignment
fn align_text(text: &str, spec: &FormatSpec, default_align: char) -> String {
    let len = text.chars().count();
    if len >= spec.width {
        return text.to_string();
    }
    let pad = spec.width - len;
    match spec.align.unwrap_or(default_align) {
        '<' => format!("{}{}", text, repeat(spec.fill, pad)),
        '^' => format!(
            "{}{}{}",
            repeat(spec.fill, pad / 2),
            text,
            repeat(spec.fill, pad - pad / 2)
        ),
        _ => format!("{}{}", repeat(spec.fill, pad), text),
    }
}

fn group_digits(digits: &str, sep: char, every: usize) -> String {
    let chars: Vec<char> = digits.chars().collect();
    let mut out = String::with_capacity(chars.len() + chars.len() / every);
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % every == 0 {
            out.push(sep);
        }
        out.push(*c);
    }
    out
}

/// Assemble sign, prefix and digits, honouring `=` alignment and grouping
fn align_number(negative: bool, prefix: &str, body: &str, spec: &FormatSpec) -> String {
    let sign = match (negative, spec.sign) {
        (true, _) => "-",
        (false, Some('+')) => "+",
        (false, Some(' ')) => " ",
        _ => "",
    };
    let lead = format!("{}{}", sign, prefix);
    let split = if matches!(spec.ty, Some('x' | 'X' | 'o' | 'b')) {
        body.len()
    } else {
        body.find(|c: char| !c.is_ascii_digit()).unwrap_or(body.len())
    };
    let (mut int_part, tail) = (body[..split].to_string(), &body[split..]);
    let is_digits = !int_part.is_empty() && int_part.chars().all(|c| c.is_ascii_hexdigit());
    let pad_inside = spec.align.is_none() && spec.zero || spec.align == Some('=');

    let grouped = match spec.grouping {
        Some(sep) if is_digits => {
            let every = if !matches!(spec.ty, Some('x' | 'X' | 'o' | 'b')) {
                3
            } else {
                4
            };
            if pad_inside && spec.fill == '0' {
                let target = spec.width.saturating_sub(lead.chars().count() + tail.chars().count());
                let mut grouped = group_digits(&int_part, sep, every);
                while grouped.chars().count() < target {
                    int_part.insert(0, '0');
                    grouped = group_digits(&int_part, sep, every);
                }
                grouped
            } else {
                group_digits(&int_part, sep, every)
            }
        }
        _ => int_part,
    };
    let digits = format!("{}{}", grouped, tail);

    let len = lead.chars().count() + digits.chars().count();
    if len >= spec.width {
        return format!("{}{}", lead, digits);
    }
    let pad = spec.width - len;
    if pad_inside {
        return format!("{}{}{}", lead, repeat(spec.fill, pad), digits);
    }
    align_text(&format!("{}{}", lead, digits), spec, '>')
}

/* ===================== Numbers ===================== */

/// Scientific notation with a two-digit exponent: `1.50e+03`
fn sci(x: f64, precision: usize, upper: bool) -> String {
    let text = format!("{:.*e}", precision, x);
    let (mantissa, exp) = text.split_once('e').unwrap_or((text.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let e = if upper { 'E' } else { 'e' };
    format!("{}{}{}{:02}", mantissa, e, if exp < 0 { '-' } else { '+' }, exp.abs())
}

fn strip_fraction_zeros(text: &str) -> String {
    if !text.contains('.') {
        return text.to_string();
    }
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// `g` formatting; `plain` is the type-less variant used when only a precision is given
fn general(x: f64, precision: usize, spec: &FormatSpec, plain: bool) -> String {
    let p = precision.max(1);
    let upper = spec.ty == Some('G');
    let exp = if x == 0.0 {
        0
    } else {
        let text = format!("{:.*e}", p - 1, x);
        text.split_once('e')
            .and_then(|(_, e)| e.parse::<i32>().ok())
            .unwrap_or(0)
    };
    let limit = if plain { p as i32 - 1 } else { p as i32 };
    if (-4..limit).contains(&exp) {
        let decimals = (p as i32 - 1 - exp).max(0) as usize;
        let mut text = format!("{:.*}", decimals, x);
        if !spec.alternate {
            text = strip_fraction_zeros(&text);
        }
        if plain && !text.contains('.') {
            text.push_str(".0");
        }
        return text;
    }
    let text = sci(x, p - 1, upper);
    if spec.alternate {
        return text;
    }
    match text.split_once(if upper { 'E' } else { 'e' }) {
        Some((mantissa, exp)) => format!(
            "{}{}{}",
            strip_fraction_zeros(mantissa),
            if upper { 'E' } else { 'e' },
            exp
        ),
        None => text,
    }
}

pub fn format_float(x: f64, spec: &FormatSpec) -> ExecResult<String> {
    let negative = x.is_sign_negative() && !x.is_nan();
    let abs = x.abs();
    let upper = matches!(spec.ty, Some('F' | 'E' | 'G'));
    let body = if !abs.is_finite() {
        let text = if abs.is_nan() { "nan" } else { "inf" };
        let text = if upper { text.to_uppercase() } else { text.to_string() };
        if spec.ty == Some('%') {
            format!("{}%", text)
        } else {
            text
        }
    } else {
        match spec.ty {
            None => match spec.precision {
                None => float_repr(abs),
                Some(p) => general(abs, p, spec, true),
            },
            Some('f' | 'F') => {
                let p = spec.precision.unwrap_or(6);
                let mut text = format!("{:.*}", p, abs);
                if spec.alternate && p == 0 {
                    text.push('.');
                }
                text
            }
            Some('e' | 'E') => sci(abs, spec.precision.unwrap_or(6), upper),
            Some('g' | 'G') => general(abs, spec.precision.unwrap_or(6), spec, false),
            Some('%') => format!("{:.*}%", spec.precision.unwrap_or(6), abs * 100.0),
            Some(other) => {
                return Err(Fault::value_error(format!(
                    "Unknown format code '{}' for object of type 'float'",
                    other
                )))
            }
        }
    };
    Ok(align_number(negative, "", &body, spec))
}

pub fn format_int(n: &BigInt, spec: &FormatSpec) -> ExecResult<String> {
    if spec.precision.is_some() && !matches!(spec.ty, Some('e' | 'E' | 'f' | 'F' | 'g' | 'G' | '%')) {
        return Err(Fault::value_error(
            "Precision not allowed in integer format specifier",
        ));
    }
    let abs = n.abs();
    let (prefix, digits) = match spec.ty {
        None | Some('d' | 'n') => ("", bigint_to_string(&abs)?),
        Some('b') => ("0b", abs.to_str_radix(2)),
        Some('o') => ("0o", abs.to_str_radix(8)),
        Some('x') => ("0x", abs.to_str_radix(16)),
        Some('X') => ("0X", abs.to_str_radix(16).to_uppercase()),
        Some('c') => {
            let c = n
                .to_u32()
                .and_then(char::from_u32)
                .ok_or_else(|| Fault::overflow("%c arg not in range(0x110000)"))?;
            return Ok(align_text(&c.to_string(), spec, '<'));
        }
        Some('e' | 'E' | 'f' | 'F' | 'g' | 'G' | '%') => {
            let x = n
                .to_f64()
                .filter(|x| x.is_finite())
                .ok_or_else(|| Fault::overflow("int too large to convert to float"))?;
            return format_float(x, spec);
        }
        Some(other) => {
            return Err(Fault::value_error(format!(
                "Unknown format code '{}' for object of type 'int'",
                other
            )))
        }
    };
    if spec.grouping == Some(',') && !prefix.is_empty() {
        return Err(Fault::value_error(format!(
            "Cannot specify ',' with '{}'.",
            spec.ty.unwrap_or('d')
        )));
    }
    let prefix = if spec.alternate { prefix } else { "" };
    Ok(align_number(n.is_negative(), prefix, &digits, spec))
}

pub fn format_str(text: &str, spec: &FormatSpec) -> ExecResult<String> {
    match spec.ty {
        None | Some('s') => {}
        Some(other) => {
            return Err(Fault::value_error(format!(
                "Unknown format code '{}' for object of type 'str'",
                other
            )))
        }
    }
    if spec.sign.is_some() {
        return Err(Fault::value_error("Sign not allowed in string format specifier"));
    }
    if spec.alternate {
        return Err(Fault::value_error(
            "Alternate form (#) not allowed in string format specifier",
        ));
    }
    if spec.align == Some('=') {
        return Err(Fault::value_error(
            "'=' alignment not allowed in string format specifier",
        ));
    }
    let text: String = match spec.precision {
        Some(p) => text.chars().take(p).collect(),
        None => text.to_string(),
    };
    Ok(align_text(&text, spec, '<'))
}

/* ===================== format() ===================== */

/// `format(value, spec)`
pub fn format_value(vm: &mut VM, value: &Val, spec: &str) -> ExecResult<String> {
    match value {
        Val::Bool(b) if spec.is_empty() => Ok(if *b { "True" } else { "False" }.to_string()),
        Val::Int(_) | Val::BigInt(_) | Val::Bool(_) => {
            let parsed = parse_spec(spec, "int")?;
            let n = value.as_bigint().unwrap_or_default();
            format_int(&n, &parsed)
        }
        Val::Float(x) => format_float(*x, &parse_spec(spec, "float")?),
        Val::Str(s) => format_str(s, &parse_spec(spec, "str")?),
        Val::Instance(_) => {
            if let Some(method) = vm.lookup_special(value, "__format__") {
                return match vm.call_method(&method, value, vec![Val::str(spec)])? {
                    Val::Str(s) => Ok(s.to_string()),
                    other => Err(Fault::type_error(format!(
                        "__format__ must return a str, not {}",
                        other.type_name()
                    ))),
                };
            }
            format_object(vm, value, spec)
        }
        _ => format_object(vm, value, spec),
    }
}

/// `object.__format__`: only the empty spec is accepted
fn format_object(vm: &mut VM, value: &Val, spec: &str) -> ExecResult<String> {
    if !spec.is_empty() {
        return Err(Fault::type_error(format!(
            "unsupported format string passed to {}.__format__",
            value.type_name()
        )));
    }
    vm.to_str(value)
}

/* ===================== str.format ===================== */

enum Numbering {
    Unset,
    Auto(usize),
    Manual,
}

struct FormatArgs<'a> {
    positional: &'a [Val],
    keywords: &'a [(String, Val)],
    numbering: Numbering,
}

impl FormatArgs<'_> {
    fn lookup(&mut self, vm: &mut VM, field: &str) -> ExecResult<Val> {
        let first_end = field.find(['.', '[']).unwrap_or(field.len());
        let (head, mut accessors) = field.split_at(first_end);

        let mut value = if head.is_empty() {
            let idx = match self.numbering {
                Numbering::Manual => {
                    return Err(Fault::value_error(
                        "cannot switch from manual field specification to automatic field numbering",
                    ))
                }
                Numbering::Unset => 0,
                Numbering::Auto(next) => next,
            };
            self.numbering = Numbering::Auto(idx + 1);
            self.positional_arg(idx)?
        } else if head.chars().all(|c| c.is_ascii_digit()) {
            if let Numbering::Auto(_) = self.numbering {
                return Err(Fault::value_error(
                    "cannot switch from automatic field numbering to manual field specification",
                ));
            }
            self.numbering = Numbering::Manual;
            let idx = head.parse::<usize>().unwrap_or(usize::MAX);
            self.positional_arg(idx)?
        } else {
            match self.keywords.iter().find(|(k, _)| k == head) {
                Some((_, v)) => v.clone(),
                None => return Err(Fault::key_error(Val::str(head))),
            }
        };

        while !accessors.is_empty() {
            if let Some(after) = accessors.strip_prefix('.') {
                let end = after.find(['.', '[']).unwrap_or(after.len());
                let name = &after[..end];
                if name.is_empty() {
                    return Err(Fault::value_error("Empty attribute in format string"));
                }
                value = vm.get_attr(&value, name)?;
                accessors = &after[end..];
            } else if let Some(after) = accessors.strip_prefix('[') {
                let Some(end) = after.find(']') else {
                    return Err(Fault::value_error("Missing ']' in format string"));
                };
                let key = &after[..end];
                let key = match key.parse::<i64>() {
                    Ok(n) if key.chars().all(|c| c.is_ascii_digit()) => Val::Int(n),
                    _ => Val::str(key),
                };
                value = vm.get_item(&value, &key)?;
                accessors = &after[end + 1..];
            } else {
                return Err(Fault::value_error(
                    "Only '.' or '[' may follow ']' in format field specifier",
                ));
            }
        }
        Ok(value)
    }

    fn positional_arg(&self, idx: usize) -> ExecResult<Val> {
        self.positional.get(idx).cloned().ok_or_else(|| {
            Fault::index_error(format!(
                "Replacement index {} out of range for positional args tuple",
                idx
            ))
        })
    }
}

fn render(vm: &mut VM, fmt: &str, args: &mut FormatArgs, depth: usize) -> ExecResult<String> {
    if depth > 2 {
        return Err(Fault::value_error("Max string recursion exceeded"));
    }
    let chars: Vec<char> = fmt.chars().collect();
    let mut out = String::with_capacity(fmt.len());
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '{' if chars.get(i + 1) == Some(&'{') => {
                out.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                out.push('}');
                i += 2;
            }
            '}' => {
                return Err(Fault::value_error(
                    "Single '}' encountered in format string",
                ))
            }
            '{' => {
                let mut nesting = 1;
                let mut j = i + 1;
                while j < chars.len() {
                    match chars[j] {
                        '{' => nesting += 1,
                        '}' => {
                            nesting -= 1;
                            if nesting == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    j += 1;
                }
                if j >= chars.len() {
                    return Err(Fault::value_error(if nesting > 1 || i + 1 == chars.len() {
                        "Single '{' encountered in format string"
                    } else {
                        "expected '}' before end of string"
                    }));
                }
                let field: String = chars[i + 1..j].iter().collect();
                out.push_str(&render_field(vm, &field, args, depth)?);
                i = j + 1;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Ok(out)
}

fn render_field(vm: &mut VM, field: &str, args: &mut FormatArgs, depth: usize) -> ExecResult<String> {
    // The field name ends at the first `!` or `:` outside brackets
    let mut in_brackets = false;
    let mut name_end = field.len();
    for (pos, c) in field.char_indices() {
        match c {
            '[' => in_brackets = true,
            ']' => in_brackets = false,
            '!' | ':' if !in_brackets => {
                name_end = pos;
                break;
            }
            _ => {}
        }
    }
    let name = &field[..name_end];
    let rest = &field[name_end..];
    let (conversion, spec) = match rest.strip_prefix('!') {
        Some(after) => {
            let mut it = after.chars();
            let conv = it.next();
            let remainder = it.as_str();
            let spec = match remainder.strip_prefix(':') {
                Some(spec) => spec,
                None if remainder.is_empty() => "",
                None => {
                    return Err(Fault::value_error(
                        "expected ':' after conversion specifier",
                    ))
                }
            };
            (conv, spec)
        }
        None => (None, rest.strip_prefix(':').unwrap_or("")),
    };

    let value = args.lookup(vm, name)?;
    let value = match conversion {
        None => value,
        Some('r') => Val::str(&vm.repr(&value)?),
        Some('s') => Val::str(&vm.to_str(&value)?),
        Some('a') => Val::str(&ascii_escape(&vm.repr(&value)?)),
        Some(other) => {
            return Err(Fault::value_error(format!(
                "Unknown conversion specifier {}",
                other
            )))
        }
    };
    let spec = if spec.contains('{') {
        render(vm, spec, args, depth + 1)?
    } else {
        spec.to_string()
    };
    format_value(vm, &value, &spec)
}

/// `str.format(*args, **kwargs)`
pub fn str_format(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let fmt = match receiver(&args)? {
        Val::Str(s) => s.clone(),
        other => {
            return Err(Fault::type_error(format!(
                "descriptor 'format' requires a 'str' object but received a '{}'",
                other.type_name()
            )))
        }
    };
    let mut format_args = FormatArgs {
        positional: rest(&args),
        keywords: &args.keywords,
        numbering: Numbering::Unset,
    };
    let text = render(vm, &fmt, &mut format_args, 0)?;
    Ok(Val::str(&text))
}

/* ===================== printf-style ===================== */

enum PercentArgs {
    Sequence(Vec<Val>),
    Mapping(Val),
}

/// `fmt % args`
pub fn percent_format(vm: &mut VM, fmt: &str, args: &Val) -> ExecResult<String> {
    let mut source = match args {
        Val::Tuple(items) => PercentArgs::Sequence(items.to_vec()),
        Val::Dict(_) => PercentArgs::Mapping(args.clone()),
        other => PercentArgs::Sequence(vec![other.clone()]),
    };
    let mut next_arg = 0usize;
    let chars: Vec<char> = fmt.chars().collect();
    let mut out = String::with_capacity(fmt.len());
    let mut i = 0;
    let mut used_mapping = false;

    let mut take = |vm: &mut VM, source: &mut PercentArgs, key: Option<&str>| -> ExecResult<Val> {
        match (source, key) {
            (PercentArgs::Mapping(map), Some(key)) => vm.get_item(map, &Val::str(key)),
            (PercentArgs::Sequence(_), Some(_)) => Err(Fault::type_error("format requires a mapping")),
            (PercentArgs::Sequence(items), None) => {
                let value = items.get(next_arg).cloned().ok_or_else(|| {
                    Fault::type_error("not enough arguments for format string")
                })?;
                next_arg += 1;
                Ok(value)
            }
            (PercentArgs::Mapping(map), None) => {
                // A dict is a single positional argument unless keys are used
                let value = if next_arg == 0 { Some(map.clone()) } else { None };
                next_arg += 1;
                value.ok_or_else(|| Fault::type_error("not enough arguments for format string"))
            }
        }
    };

    while i < chars.len() {
        if chars[i] != '%' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        i += 1;
        let incomplete = || Fault::value_error("incomplete format");

        let mut key = None;
        if chars.get(i) == Some(&'(') {
            let mut depth = 1;
            let mut j = i + 1;
            while j < chars.len() && depth > 0 {
                match chars[j] {
                    '(' => depth += 1,
                    ')' => depth -= 1,
                    _ => {}
                }
                j += 1;
            }
            if depth > 0 {
                return Err(Fault::value_error("incomplete format key"));
            }
            key = Some(chars[i + 1..j - 1].iter().collect::<String>());
            used_mapping = true;
            i = j;
        }

        let mut spec = FormatSpec::default();
        let mut left = false;
        while let Some(&c) = chars.get(i) {
            match c {
                '-' => left = true,
                '+' => spec.sign = Some('+'),
                ' ' if spec.sign.is_none() => spec.sign = Some(' '),
                ' ' => {}
                '#' => spec.alternate = true,
                '0' => spec.zero = true,
                _ => break,
            }
            i += 1;
        }
        if chars.get(i) == Some(&'*') {
            let width = take(vm, &mut source, None)?;
            let width = width
                .as_i64()
                .ok_or_else(|| Fault::type_error("* wants int"))?;
            if width < 0 {
                left = true;
            }
            spec.width = width.unsigned_abs() as usize;
            i += 1;
        } else {
            spec.width = read_number(&chars, &mut i)?.unwrap_or(0);
        }
        if chars.get(i) == Some(&'.') {
            i += 1;
            if chars.get(i) == Some(&'*') {
                let precision = take(vm, &mut source, None)?;
                spec.precision = Some(
                    precision
                        .as_i64()
                        .ok_or_else(|| Fault::type_error("* wants int"))?
                        .max(0) as usize,
                );
                i += 1;
            } else {
                spec.precision = Some(read_number(&chars, &mut i)?.unwrap_or(0));
            }
        }
        while matches!(chars.get(i), Some('h' | 'l' | 'L')) {
            i += 1;
        }
        let conv = *chars.get(i).ok_or_else(incomplete)?;
        i += 1;

        if conv == '%' {
            out.push('%');
            continue;
        }
        if left {
            spec.align = Some('<');
            spec.zero = false;
        } else if spec.zero {
            spec.fill = '0';
        }

        let value = take(vm, &mut source, key.as_deref())?;
        let piece = match conv {
            's' | 'r' | 'a' => {
                let text = match conv {
                    's' => vm.to_str(&value)?,
                    'r' => vm.repr(&value)?,
                    _ => ascii_escape(&vm.repr(&value)?),
                };
                let text: String = match spec.precision {
                    Some(p) => text.chars().take(p).collect(),
                    None => text,
                };
                spec.fill = ' ';
                align_text(&text, &spec, '>')
            }
            'd' | 'i' | 'u' => {
                let n = match &value {
                    Val::Float(x) => super::numbers::float_to_int(*x)?
                        .as_bigint()
                        .unwrap_or_default(),
                    other => other.as_bigint().ok_or_else(|| {
                        Fault::type_error(format!(
                            "%{} format: a real number is required, not {}",
                            conv,
                            other.type_name()
                        ))
                    })?,
                };
                spec.precision = None;
                format_int(&n, &spec)?
            }
            'x' | 'X' | 'o' => {
                let n = value.as_bigint().ok_or_else(|| {
                    Fault::type_error(format!(
                        "%{} format: an integer is required, not {}",
                        conv,
                        value.type_name()
                    ))
                })?;
                spec.ty = Some(conv);
                spec.precision = None;
                format_int(&n, &spec)?
            }
            'e' | 'E' | 'f' | 'F' | 'g' | 'G' => {
                let x = to_f64(&value)?;
                spec.ty = Some(conv);
                format_float(x, &spec)?
            }
            'c' => {
                let c = match &value {
                    Val::Str(s) if s.chars().count() == 1 => s.to_string(),
                    other => match other.as_bigint() {
                        Some(n) => n
                            .to_u32()
                            .and_then(char::from_u32)
                            .ok_or_else(|| Fault::overflow("%c arg not in range(0x110000)"))?
                            .to_string(),
                        None => {
                            return Err(Fault::type_error(format!(
                                "%c requires an int or a unicode character, not {}",
                                other.type_name()
                            )))
                        }
                    },
                };
                spec.fill = ' ';
                align_text(&c, &spec, '>')
            }
            other => {
                return Err(Fault::value_error(format!(
                    "unsupported format character '{}' ({:#x}) at index {}",
                    other,
                    other as u32,
                    i - 1
                )))
            }
        };
        out.push_str(&piece);
    }

    let leftover = match &source {
        PercentArgs::Sequence(items) => next_arg < items.len(),
        PercentArgs::Mapping(_) => !used_mapping && next_arg == 0,
    };
    if leftover {
        return Err(Fault::type_error(
            "not all arguments converted during string formatting",
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(s: &str) -> FormatSpec {
        parse_spec(s, "int").unwrap()
    }

    #[test]
    fn test_parse_spec_fields() {
        let parsed = spec("*^+#010,.3f");
        assert_eq!(parsed.fill, '*');
        assert_eq!(parsed.align, Some('^'));
        assert_eq!(parsed.sign, Some('+'));
        assert!(parsed.alternate);
        assert_eq!(parsed.width, 10);
        assert_eq!(parsed.grouping, Some(','));
        assert_eq!(parsed.precision, Some(3));
        assert_eq!(parsed.ty, Some('f'));
        assert!(parse_spec("abc", "int").is_err());
    }

    #[test]
    fn test_format_int() {
        let n = BigInt::from(1234567);
        assert_eq!(format_int(&n, &spec(",")).unwrap(), "1,234,567");
        assert_eq!(format_int(&n, &spec("_")).unwrap(), "1_234_567");
        assert_eq!(format_int(&BigInt::from(255), &spec("#x")).unwrap(), "0xff");
        assert_eq!(format_int(&BigInt::from(5), &spec("08b")).unwrap(), "00000101");
        assert_eq!(format_int(&BigInt::from(-42), &spec("=+6")).unwrap(), "-   42");
        assert_eq!(format_int(&BigInt::from(-42), &spec("06")).unwrap(), "-00042");
        assert_eq!(format_int(&BigInt::from(42), &spec("^6")).unwrap(), "  42  ");
        assert_eq!(format_int(&BigInt::from(1234), &spec("08,")).unwrap(), "0,001,234");
        assert!(format_int(&n, &spec(".2")).is_err());
    }

    #[test]
    fn test_format_float() {
        let f = |x: f64, s: &str| format_float(x, &parse_spec(s, "float").unwrap()).unwrap();
        assert_eq!(f(3.14159, ".2f"), "3.14");
        assert_eq!(f(2.5, ""), "2.5");
        assert_eq!(f(1234.5, ",.1f"), "1,234.5");
        assert_eq!(f(0.25, ".1%"), "25.0%");
        assert_eq!(f(12345.678, ".3e"), "1.235e+04");
        assert_eq!(f(0.0001, "g"), "0.0001");
        assert_eq!(f(1e-5, "g"), "1e-05");
        assert_eq!(f(123456789.0, "g"), "1.23457e+08");
        assert_eq!(f(10.0, ".3"), "10.0");
        assert_eq!(f(100.0, ".3"), "1e+02");
        assert_eq!(f(-1.5, "8.2f"), "   -1.50");
        assert_eq!(f(1.0, "+.1f"), "+1.0");
        assert_eq!(f(f64::INFINITY, "f"), "inf");
    }

    #[test]
    fn test_format_str() {
        let s = |text: &str, sp: &str| format_str(text, &parse_spec(sp, "str").unwrap()).unwrap();
        assert_eq!(s("ab", ">5"), "   ab");
        assert_eq!(s("ab", "*^6"), "**ab**");
        assert_eq!(s("abcdef", ".3"), "abc");
        assert_eq!(s("ab", "5"), "ab   ");
        assert!(format_str("ab", &parse_spec("+5", "str").unwrap()).is_err());
    }

    #[test]
    fn test_group_digits() {
        assert_eq!(group_digits("1234567", ',', 3), "1,234,567");
        assert_eq!(group_digits("123", ',', 3), "123");
        assert_eq!(group_digits("ffff1", '_', 4), "f_fff1");
    }
}
