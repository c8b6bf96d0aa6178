//! `str` methods
//!
//! Positions are counted in characters, not bytes.

use std::rc::Rc;

use super::{format, named_args, receiver, rest, CallArgs, NativeFn};
use crate::executor::errors::{ExecResult, Fault};
use crate::executor::operators::MAX_SEQUENCE_LEN;
use crate::executor::subscript::slice_indices;
use crate::executor::types::values::{SliceObj, Val};
use crate::executor::vm::VM;

pub fn method(name: &str) -> Option<(&'static str, NativeFn)> {
    let entry: (&'static str, NativeFn) = match name {
        "upper" => ("upper", upper),
        "lower" => ("lower", lower),
        "casefold" => ("casefold", lower),
        "capitalize" => ("capitalize", capitalize),
        "title" => ("title", title),
        "swapcase" => ("swapcase", swapcase),
        "strip" => ("strip", strip),
        "lstrip" => ("lstrip", lstrip),
        "rstrip" => ("rstrip", rstrip),
        "split" => ("split", split),
        "rsplit" => ("rsplit", rsplit),
        "splitlines" => ("splitlines", splitlines),
        "join" => ("join", join),
        "replace" => ("replace", replace),
        "find" => ("find", find),
        "rfind" => ("rfind", rfind),
        "index" => ("index", index),
        "rindex" => ("rindex", rindex),
        "count" => ("count", count),
        "startswith" => ("startswith", startswith),
        "endswith" => ("endswith", endswith),
        "isdigit" => ("isdigit", isdigit),
        "isdecimal" => ("isdecimal", isdigit),
        "isnumeric" => ("isnumeric", isnumeric),
        "isalpha" => ("isalpha", isalpha),
        "isalnum" => ("isalnum", isalnum),
        "isspace" => ("isspace", isspace),
        "isupper" => ("isupper", isupper),
        "islower" => ("islower", islower),
        "istitle" => ("istitle", istitle),
        "isidentifier" => ("isidentifier", isidentifier),
        "isascii" => ("isascii", isascii),
        "center" => ("center", center),
        "ljust" => ("ljust", ljust),
        "rjust" => ("rjust", rjust),
        "zfill" => ("zfill", zfill),
        "partition" => ("partition", partition),
        "rpartition" => ("rpartition", rpartition),
        "removeprefix" => ("removeprefix", removeprefix),
        "removesuffix" => ("removesuffix", removesuffix),
        "expandtabs" => ("expandtabs", expandtabs),
        "format" => ("format", format::str_format),
        _ => return None,
    };
    Some(entry)
}

/* ===================== Argument Helpers ===================== */

fn this(args: &CallArgs, name: &str) -> ExecResult<Rc<str>> {
    match receiver(args)? {
        Val::Str(s) => Ok(s.clone()),
        other => Err(Fault::type_error(format!(
            "descriptor '{}' requires a 'str' object but received a '{}'",
            name,
            other.type_name()
        ))),
    }
}

fn str_arg(value: &Val, name: &str) -> ExecResult<Rc<str>> {
    match value {
        Val::Str(s) => Ok(s.clone()),
        other => Err(Fault::type_error(format!(
            "{}() argument must be str, not {}",
            name,
            other.type_name()
        ))),
    }
}

fn no_args(args: &CallArgs, name: &str) -> ExecResult<Rc<str>> {
    args.no_keywords(&format!("str.{}", name))?;
    if args.len() > 1 {
        return Err(Fault::type_error(format!(
            "str.{}() takes no arguments ({} given)",
            name,
            args.len() - 1
        )));
    }
    this(args, name)
}

fn int_arg(value: &Val) -> ExecResult<i64> {
    match value {
        Val::Int(n) => Ok(*n),
        Val::Bool(b) => Ok(*b as i64),
        Val::BigInt(_) => Err(Fault::overflow(
            "Python int too large to convert to C ssize_t",
        )),
        other => Err(Fault::type_error(format!(
            "'{}' object cannot be interpreted as an integer",
            other.type_name()
        ))),
    }
}

/// Character window `[start, end)` given optional slice-like bounds
fn window(chars: &[char], start: Option<&Val>, end: Option<&Val>) -> ExecResult<(usize, usize)> {
    let bound = |v: Option<&Val>| -> ExecResult<Val> {
        match v {
            None | Some(Val::None) => Ok(Val::None),
            Some(other) => Ok(Val::Int(int_arg(other)?)),
        }
    };
    let slice = SliceObj {
        lower: bound(start)?,
        upper: bound(end)?,
        step: Val::None,
    };
    let (start, stop, _) = slice_indices(&slice, chars.len())?;
    Ok((start.max(0) as usize, stop.max(0) as usize))
}

fn char_find(hay: &[char], needle: &[char], from: usize, to: usize) -> Option<usize> {
    if to < from || needle.len() > to - from {
        return None;
    }
    (from..=to - needle.len()).find(|&i| hay[i..i + needle.len()] == *needle)
}

fn char_rfind(hay: &[char], needle: &[char], from: usize, to: usize) -> Option<usize> {
    if to < from || needle.len() > to - from {
        return None;
    }
    (from..=to - needle.len())
        .rev()
        .find(|&i| hay[i..i + needle.len()] == *needle)
}

fn check_len(len: usize) -> ExecResult<()> {
    if len > MAX_SEQUENCE_LEN {
        return Err(Fault::memory_error());
    }
    Ok(())
}

/* ===================== Case ===================== */

fn upper(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    Ok(Val::str(&no_args(&args, "upper")?.to_uppercase()))
}

fn lower(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    Ok(Val::str(&no_args(&args, "lower")?.to_lowercase()))
}

fn capitalize(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let s = no_args(&args, "capitalize")?;
    let mut chars = s.chars();
    let out: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
        None => String::new(),
    };
    Ok(Val::str(&out))
}

fn title(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let s = no_args(&args, "title")?;
    let mut out = String::with_capacity(s.len());
    let mut prev_cased = false;
    for c in s.chars() {
        if prev_cased {
            out.extend(c.to_lowercase());
        } else {
            out.extend(c.to_uppercase());
        }
        prev_cased = c.is_alphabetic();
    }
    Ok(Val::str(&out))
}

fn swapcase(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let s = no_args(&args, "swapcase")?;
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_uppercase() {
            out.extend(c.to_lowercase());
        } else if c.is_lowercase() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
    }
    Ok(Val::str(&out))
}

/* ===================== Strip ===================== */

#[derive(Clone, Copy)]
enum Side {
    Left,
    Right,
    Both,
}

fn strip_impl(args: CallArgs, name: &str, side: Side) -> ExecResult<Val> {
    let s = this(&args, name)?;
    args.no_keywords(&format!("str.{}", name))?;
    args.arity(name, 1, 2)?;
    let chars: Option<Vec<char>> = match args.arg(1) {
        None | Some(Val::None) => None,
        Some(Val::Str(set)) => Some(set.chars().collect()),
        Some(other) => {
            return Err(Fault::type_error(format!(
                "{} arg must be None or str, not {}",
                name,
                other.type_name()
            )))
        }
    };
    let strip = |c: char| match &chars {
        None => c.is_whitespace(),
        Some(set) => set.contains(&c),
    };
    let out = match side {
        Side::Left => s.trim_start_matches(strip),
        Side::Right => s.trim_end_matches(strip),
        Side::Both => s.trim_matches(strip),
    };
    Ok(Val::str(out))
}

fn strip(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    strip_impl(args, "strip", Side::Both)
}

fn lstrip(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    strip_impl(args, "lstrip", Side::Left)
}

fn rstrip(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    strip_impl(args, "rstrip", Side::Right)
}

/* ===================== Split & Join ===================== */

/// Split on runs of whitespace, at most `maxsplit` times (negative: unlimited)
pub fn split_whitespace(s: &str, maxsplit: i64) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = s.trim_start();
    while !rest.is_empty() {
        if maxsplit >= 0 && out.len() as i64 == maxsplit {
            out.push(rest.to_string());
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(end) => {
                out.push(rest[..end].to_string());
                rest = rest[end..].trim_start();
            }
            None => {
                out.push(rest.to_string());
                break;
            }
        }
    }
    out
}

fn rsplit_whitespace(s: &str, maxsplit: i64) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = s.trim_end();
    while !rest.is_empty() {
        if maxsplit >= 0 && out.len() as i64 == maxsplit {
            out.push(rest.to_string());
            break;
        }
        match rest.rfind(char::is_whitespace) {
            Some(start) => {
                let ws_len = rest[start..].chars().next().map_or(1, char::len_utf8);
                out.push(rest[start + ws_len..].to_string());
                rest = rest[..start].trim_end();
            }
            None => {
                out.push(rest.to_string());
                break;
            }
        }
    }
    out.reverse();
    out
}

fn split_args(args: CallArgs, name: &str) -> ExecResult<(Rc<str>, Option<Rc<str>>, i64)> {
    let s = this(&args, name)?;
    let params = named_args(args, name, &["sep", "maxsplit"], 1)?;
    let sep = match &params[0] {
        None | Some(Val::None) => None,
        Some(Val::Str(sep)) if sep.is_empty() => {
            return Err(Fault::value_error("empty separator"))
        }
        Some(Val::Str(sep)) => Some(sep.clone()),
        Some(other) => {
            return Err(Fault::type_error(format!(
                "must be str or None, not {}",
                other.type_name()
            )))
        }
    };
    let maxsplit = match &params[1] {
        None => -1,
        Some(value) => int_arg(value)?,
    };
    Ok((s, sep, maxsplit))
}

fn to_list(parts: Vec<String>) -> Val {
    Val::list(parts.iter().map(|p| Val::str(p)).collect())
}

fn split(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let (s, sep, maxsplit) = split_args(args, "split")?;
    let parts = match sep {
        None => split_whitespace(&s, maxsplit),
        Some(sep) if maxsplit < 0 => s.split(&*sep).map(str::to_string).collect(),
        Some(sep) => s
            .splitn(maxsplit as usize + 1, &*sep)
            .map(str::to_string)
            .collect(),
    };
    Ok(to_list(parts))
}

fn rsplit(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let (s, sep, maxsplit) = split_args(args, "rsplit")?;
    let parts = match sep {
        None => rsplit_whitespace(&s, maxsplit),
        Some(sep) => {
            let mut parts: Vec<String> = if maxsplit < 0 {
                s.rsplit(&*sep).map(str::to_string).collect()
            } else {
                s.rsplitn(maxsplit as usize + 1, &*sep)
                    .map(str::to_string)
                    .collect()
            };
            parts.reverse();
            parts
        }
    };
    Ok(to_list(parts))
}

fn splitlines(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let s = this(&args, "splitlines")?;
    let params = named_args(args, "splitlines", &["keepends"], 1)?;
    let keepends = match &params[0] {
        Some(value) => vm.truthy(value)?,
        None => false,
    };
    let mut out = Vec::new();
    let mut line = String::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        let is_break = matches!(
            c,
            '\n' | '\r' | '\x0b' | '\x0c' | '\x1c' | '\x1d' | '\x1e' | '\u{85}' | '\u{2028}' | '\u{2029}'
        );
        if !is_break {
            line.push(c);
            continue;
        }
        if keepends {
            line.push(c);
        }
        if c == '\r' && chars.peek() == Some(&'\n') {
            chars.next();
            if keepends {
                line.push('\n');
            }
        }
        out.push(Val::str(&line));
        line.clear();
    }
    if !line.is_empty() {
        out.push(Val::str(&line));
    }
    Ok(Val::list(out))
}

fn join(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let sep = this(&args, "join")?;
    args.arity("join", 2, 2)?;
    let items = vm.collect(&args.positional[1])?;
    let mut out = String::new();
    for (i, item) in items.iter().enumerate() {
        let Val::Str(part) = item else {
            return Err(Fault::type_error(format!(
                "sequence item {}: expected str instance, {} found",
                i,
                item.type_name()
            )));
        };
        if i > 0 {
            out.push_str(&sep);
        }
        out.push_str(part);
        check_len(out.len())?;
    }
    Ok(Val::str(&out))
}

fn partition_impl(args: CallArgs, name: &str, from_right: bool) -> ExecResult<Val> {
    let s = this(&args, name)?;
    args.arity(name, 2, 2)?;
    let sep = str_arg(&args.positional[1], name)?;
    if sep.is_empty() {
        return Err(Fault::value_error("empty separator"));
    }
    let found = if from_right { s.rfind(&*sep) } else { s.find(&*sep) };
    let parts = match found {
        Some(at) => [&s[..at], &*sep, &s[at + sep.len()..]],
        None if from_right => ["", "", &*s],
        None => [&*s, "", ""],
    };
    Ok(Val::tuple(parts.iter().map(|p| Val::str(p)).collect()))
}

fn partition(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    partition_impl(args, "partition", false)
}

fn rpartition(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    partition_impl(args, "rpartition", true)
}

/* ===================== Search ===================== */

fn replace(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let s = this(&args, "replace")?;
    let params = named_args(args, "replace", &["old", "new", "count"], 1)?;
    let (Some(old), Some(new)) = (&params[0], &params[1]) else {
        return Err(Fault::type_error("replace expected at least 2 arguments"));
    };
    let old = str_arg(old, "replace")?;
    let new = str_arg(new, "replace")?;
    let count = match &params[2] {
        Some(value) => int_arg(value)?,
        None => -1,
    };
    let occurrences = if old.is_empty() {
        s.chars().count() + 1
    } else {
        s.matches(&*old).count()
    };
    let replaced = if count < 0 {
        occurrences
    } else {
        occurrences.min(count as usize)
    };
    check_len(s.len() + replaced * new.len())?;
    let out = if count < 0 {
        s.replace(&*old, &new)
    } else {
        s.replacen(&*old, &new, count as usize)
    };
    Ok(Val::str(&out))
}

/// Shared body of find / rfind / index / rindex / count
fn search_args(args: &CallArgs, name: &str) -> ExecResult<(Vec<char>, Vec<char>, usize, usize)> {
    let s = this(args, name)?;
    args.no_keywords(&format!("str.{}", name))?;
    args.arity(name, 2, 4)?;
    let Val::Str(needle) = &args.positional[1] else {
        return Err(Fault::type_error(format!(
            "must be str, not {}",
            args.positional[1].type_name()
        )));
    };
    let hay: Vec<char> = s.chars().collect();
    let (from, to) = window(&hay, args.arg(2), args.arg(3))?;
    Ok((hay, needle.chars().collect(), from, to))
}

fn find(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let (hay, needle, from, to) = search_args(&args, "find")?;
    Ok(Val::Int(char_find(&hay, &needle, from, to).map_or(-1, |i| i as i64)))
}

fn rfind(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let (hay, needle, from, to) = search_args(&args, "rfind")?;
    Ok(Val::Int(char_rfind(&hay, &needle, from, to).map_or(-1, |i| i as i64)))
}

fn index(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let (hay, needle, from, to) = search_args(&args, "index")?;
    char_find(&hay, &needle, from, to)
        .map(|i| Val::Int(i as i64))
        .ok_or_else(|| Fault::value_error("substring not found"))
}

fn rindex(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let (hay, needle, from, to) = search_args(&args, "rindex")?;
    char_rfind(&hay, &needle, from, to)
        .map(|i| Val::Int(i as i64))
        .ok_or_else(|| Fault::value_error("substring not found"))
}

fn count(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let (hay, needle, from, to) = search_args(&args, "count")?;
    if to < from {
        return Ok(Val::Int(0));
    }
    if needle.is_empty() {
        return Ok(Val::Int((to - from + 1) as i64));
    }
    let mut n = 0;
    let mut i = from;
    while let Some(at) = char_find(&hay, &needle, i, to) {
        n += 1;
        i = at + needle.len();
    }
    Ok(Val::Int(n))
}

fn affix_impl(args: CallArgs, name: &str, at_end: bool) -> ExecResult<Val> {
    let s = this(&args, name)?;
    args.no_keywords(&format!("str.{}", name))?;
    args.arity(name, 2, 4)?;
    let hay: Vec<char> = s.chars().collect();
    let (from, to) = window(&hay, args.arg(2), args.arg(3))?;
    let candidates: Vec<Rc<str>> = match &args.positional[1] {
        Val::Str(affix) => vec![affix.clone()],
        Val::Tuple(items) => items
            .iter()
            .map(|item| match item {
                Val::Str(affix) => Ok(affix.clone()),
                other => Err(Fault::type_error(format!(
                    "tuple for {} must only contain str, not {}",
                    name,
                    other.type_name()
                ))),
            })
            .collect::<ExecResult<_>>()?,
        other => {
            return Err(Fault::type_error(format!(
                "{} first arg must be str or a tuple of str, not {}",
                name,
                other.type_name()
            )))
        }
    };
    if to < from {
        return Ok(Val::Bool(false));
    }
    let window = &hay[from..to];
    let hit = candidates.iter().any(|affix| {
        let affix: Vec<char> = affix.chars().collect();
        if at_end {
            window.ends_with(&affix)
        } else {
            window.starts_with(&affix)
        }
    });
    Ok(Val::Bool(hit))
}

fn startswith(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    affix_impl(args, "startswith", false)
}

fn endswith(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    affix_impl(args, "endswith", true)
}

fn removeprefix(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let s = this(&args, "removeprefix")?;
    args.arity("removeprefix", 2, 2)?;
    let prefix = str_arg(&args.positional[1], "removeprefix")?;
    Ok(Val::str(s.strip_prefix(&*prefix).unwrap_or(&s)))
}

fn removesuffix(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let s = this(&args, "removesuffix")?;
    args.arity("removesuffix", 2, 2)?;
    let suffix = str_arg(&args.positional[1], "removesuffix")?;
    Ok(Val::str(s.strip_suffix(&*suffix).unwrap_or(&s)))
}

/* ===================== Predicates ===================== */

fn predicate(args: CallArgs, name: &str, test: impl Fn(&str) -> bool) -> ExecResult<Val> {
    let s = no_args(&args, name)?;
    Ok(Val::Bool(test(&s)))
}

fn isdigit(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    predicate(args, "isdigit", |s| {
        !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
    })
}

fn isnumeric(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    predicate(args, "isnumeric", |s| !s.is_empty() && s.chars().all(char::is_numeric))
}

fn isalpha(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    predicate(args, "isalpha", |s| !s.is_empty() && s.chars().all(char::is_alphabetic))
}

fn isalnum(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    predicate(args, "isalnum", |s| !s.is_empty() && s.chars().all(char::is_alphanumeric))
}

fn isspace(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    predicate(args, "isspace", |s| !s.is_empty() && s.chars().all(char::is_whitespace))
}

fn isupper(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    predicate(args, "isupper", |s| {
        s.chars().any(char::is_uppercase) && !s.chars().any(char::is_lowercase)
    })
}

fn islower(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    predicate(args, "islower", |s| {
        s.chars().any(char::is_lowercase) && !s.chars().any(char::is_uppercase)
    })
}

fn istitle(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    predicate(args, "istitle", |s| {
        let mut cased = false;
        let mut prev_cased = false;
        for c in s.chars() {
            if c.is_uppercase() {
                if prev_cased {
                    return false;
                }
                prev_cased = true;
                cased = true;
            } else if c.is_lowercase() {
                if !prev_cased {
                    return false;
                }
                prev_cased = true;
                cased = true;
            } else {
                prev_cased = false;
            }
        }
        cased
    })
}

fn isidentifier(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    predicate(args, "isidentifier", |s| {
        let mut chars = s.chars();
        match chars.next() {
            Some(c) if c == '_' || c.is_alphabetic() => {
                chars.all(|c| c == '_' || c.is_alphanumeric())
            }
            _ => false,
        }
    })
}

fn isascii(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    predicate(args, "isascii", |s| s.is_ascii())
}

/* ===================== Padding ===================== */

fn pad_args(args: &CallArgs, name: &str) -> ExecResult<(Rc<str>, usize, char)> {
    let s = this(args, name)?;
    args.no_keywords(&format!("str.{}", name))?;
    args.arity(name, 2, 3)?;
    let width = int_arg(&args.positional[1])?.max(0) as usize;
    check_len(width)?;
    let fill = match args.arg(2) {
        None => ' ',
        Some(Val::Str(fill)) if fill.chars().count() == 1 => fill.chars().next().unwrap_or(' '),
        Some(Val::Str(_)) => {
            return Err(Fault::type_error(
                "The fill character must be exactly one character long",
            ))
        }
        Some(other) => {
            return Err(Fault::type_error(format!(
                "The fill character must be a unicode character, not {}",
                other.type_name()
            )))
        }
    };
    Ok((s, width, fill))
}

fn fill(c: char, n: usize) -> String {
    std::iter::repeat(c).take(n).collect()
}

fn center(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let (s, width, c) = pad_args(&args, "center")?;
    let len = s.chars().count();
    if width <= len {
        return Ok(Val::Str(s));
    }
    let total = width - len;
    // CPython's rounding for odd padding
    let left = total / 2 + (total & width & 1);
    Ok(Val::str(&format!("{}{}{}", fill(c, left), s, fill(c, total - left))))
}

fn ljust(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let (s, width, c) = pad_args(&args, "ljust")?;
    let len = s.chars().count();
    Ok(Val::str(&format!("{}{}", s, fill(c, width.saturating_sub(len)))))
}

fn rjust(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let (s, width, c) = pad_args(&args, "rjust")?;
    let len = s.chars().count();
    Ok(Val::str(&format!("{}{}", fill(c, width.saturating_sub(len)), s)))
}

fn zfill(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let s = this(&args, "zfill")?;
    args.arity("zfill", 2, 2)?;
    let width = int_arg(&args.positional[1])?.max(0) as usize;
    check_len(width)?;
    let len = s.chars().count();
    if width <= len {
        return Ok(Val::Str(s));
    }
    let zeros = fill('0', width - len);
    let out = match s.chars().next() {
        Some(sign @ ('+' | '-')) => format!("{}{}{}", sign, zeros, &s[1..]),
        _ => format!("{}{}", zeros, s),
    };
    Ok(Val::str(&out))
}

fn expandtabs(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let s = this(&args, "expandtabs")?;
    let size = match rest(&args).first() {
        Some(value) => int_arg(value)?.max(0) as usize,
        None => 8,
    };
    let mut out = String::with_capacity(s.len());
    let mut column = 0;
    for c in s.chars() {
        match c {
            '\t' => {
                if size > 0 {
                    let spaces = size - column % size;
                    out.push_str(&fill(' ', spaces));
                    column += spaces;
                }
            }
            '\n' | '\r' => {
                out.push(c);
                column = 0;
            }
            c => {
                out.push(c);
                column += 1;
            }
        }
    }
    Ok(Val::str(&out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::vm::Limits;

    fn call(name: &str, receiver: &str, extra: Vec<Val>) -> Val {
        let mut vm = VM::new(Limits::default());
        let (_, func) = method(name).unwrap();
        let mut positional = vec![Val::str(receiver)];
        positional.extend(extra);
        func(&mut vm, CallArgs::new(positional)).unwrap()
    }

    fn strings(value: &Val) -> Vec<String> {
        match value {
            Val::List(items) => items
                .borrow()
                .iter()
                .map(|v| v.as_str().unwrap().to_string())
                .collect(),
            _ => panic!("expected a list"),
        }
    }

    #[test]
    fn test_split_whitespace_with_maxsplit() {
        assert_eq!(split_whitespace("  a b  c ", -1), vec!["a", "b", "c"]);
        assert_eq!(split_whitespace("a b  c ", 1), vec!["a", "b  c "]);
        assert!(split_whitespace("   ", -1).is_empty());
    }

    #[test]
    fn test_split_and_rsplit_with_separator() {
        let parts = call("split", "a,b,,c", vec![Val::str(",")]);
        assert_eq!(strings(&parts), vec!["a", "b", "", "c"]);
        let parts = call("rsplit", "a,b,c", vec![Val::str(","), Val::Int(1)]);
        assert_eq!(strings(&parts), vec!["a,b", "c"]);
    }

    #[test]
    fn test_find_counts_characters() {
        assert_eq!(call("find", "héllo", vec![Val::str("l")]).as_i64(), Some(2));
        assert_eq!(call("rfind", "héllo", vec![Val::str("l")]).as_i64(), Some(3));
        assert_eq!(call("find", "abc", vec![Val::str("z")]).as_i64(), Some(-1));
        assert_eq!(call("count", "aaaa", vec![Val::str("aa")]).as_i64(), Some(2));
        assert_eq!(call("count", "abc", vec![Val::str("")]).as_i64(), Some(4));
    }

    #[test]
    fn test_padding() {
        assert_eq!(call("center", "ab", vec![Val::Int(5), Val::str("*")]).as_str(), Some("**ab*"));
        assert_eq!(call("center", "abc", vec![Val::Int(6)]).as_str(), Some(" abc  "));
        assert_eq!(call("zfill", "-42", vec![Val::Int(5)]).as_str(), Some("-0042"));
        assert_eq!(call("ljust", "a", vec![Val::Int(3)]).as_str(), Some("a  "));
    }

    #[test]
    fn test_case_helpers() {
        assert_eq!(call("title", "hello wORLD", vec![]).as_str(), Some("Hello World"));
        assert_eq!(call("capitalize", "hELLO", vec![]).as_str(), Some("Hello"));
        assert_eq!(call("swapcase", "aB", vec![]).as_str(), Some("Ab"));
    }

    #[test]
    fn test_splitlines_and_partition() {
        let lines = call("splitlines", "a\nb\r\nc", vec![]);
        assert_eq!(strings(&lines), vec!["a", "b", "c"]);
        let parts = call("partition", "k=v=w", vec![Val::str("=")]);
        let Val::Tuple(parts) = parts else { panic!() };
        assert_eq!(parts[2].as_str(), Some("v=w"));
    }
}
