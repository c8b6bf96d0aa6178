//! `repr()` and `str()` of runtime values

use num_bigint::BigInt;
use std::rc::Rc;

use super::errors::{exception_args, ExcKind, ExecResult, Fault};
use super::types::values::{Class, ClassOrigin, Instance, Val, ViewKind};
use super::vm::VM;

/// CPython's default limit for int to str conversion
pub const MAX_STR_DIGITS: usize = 4300;

/* ===================== Scalars ===================== */

/// Shortest round-tripping representation, formatted the way Python prints floats
pub fn float_repr(x: f64) -> String {
    if x.is_nan() {
        return "nan".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let sign = if x.is_sign_negative() { "-" } else { "" };
    // `{:e}` yields the shortest digits that round-trip, e.g. `1.25e-7`
    let sci = format!("{:e}", x.abs());
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    if !(-4..16).contains(&exp) {
        let mut out = String::from(sign);
        out.push_str(&digits[..1]);
        if digits.len() > 1 {
            out.push('.');
            out.push_str(&digits[1..]);
        }
        out.push_str(&format!("e{}{:02}", if exp < 0 { '-' } else { '+' }, exp.abs()));
        return out;
    }

    let mut out = String::from(sign);
    if exp < 0 {
        out.push_str("0.");
        out.push_str(&"0".repeat((-exp - 1) as usize));
        out.push_str(&digits);
    } else {
        let int_len = exp as usize + 1;
        if digits.len() <= int_len {
            out.push_str(&digits);
            out.push_str(&"0".repeat(int_len - digits.len()));
            out.push_str(".0");
        } else {
            out.push_str(&digits[..int_len]);
            out.push('.');
            out.push_str(&digits[int_len..]);
        }
    }
    out
}

/// Decimal text of a big integer, refusing values with too many digits
pub fn bigint_to_string(n: &BigInt) -> ExecResult<String> {
    let too_long = || {
        Fault::value_error(format!(
            "Exceeds the limit ({} digits) for integer string conversion; use sys.set_int_max_str_digits() to increase the limit",
            MAX_STR_DIGITS
        ))
    };
    if n.bits() as f64 * std::f64::consts::LOG10_2 > (MAX_STR_DIGITS + 1) as f64 {
        return Err(too_long());
    }
    let text = n.to_string();
    if text.trim_start_matches('-').len() > MAX_STR_DIGITS {
        return Err(too_long());
    }
    Ok(text)
}

/// A representation being built. A capped one stops accepting text once it
/// holds more than `cap` chars, so callers can stop rendering early.
pub struct ReprOut {
    text: String,
    chars: usize,
    cap: Option<usize>,
}

impl ReprOut {
    pub fn unbounded() -> Self {
        Self {
            text: String::new(),
            chars: 0,
            cap: None,
        }
    }

    pub fn capped(cap: usize) -> Self {
        Self {
            cap: Some(cap),
            ..Self::unbounded()
        }
    }

    pub fn full(&self) -> bool {
        self.cap.is_some_and(|cap| self.chars > cap)
    }

    fn push(&mut self, c: char) {
        if !self.full() {
            self.text.push(c);
            self.chars += 1;
        }
    }

    fn push_str(&mut self, s: &str) {
        if !self.full() {
            self.text.push_str(s);
            self.chars += s.chars().count();
        }
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

/// Quote a string the way Python's `repr` does
pub fn str_repr(s: &str) -> String {
    let mut out = ReprOut::unbounded();
    push_str_repr(&mut out, s);
    out.into_string()
}

fn push_str_repr(out: &mut ReprOut, s: &str) {
    let quote = if s.contains('\'') && !s.contains('"') {
        '"'
    } else {
        '\''
    };
    out.push(quote);
    for c in s.chars() {
        if out.full() {
            return;
        }
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || (0x7f..0xa0).contains(&(c as u32)) => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push(quote);
}

/// Escape non-ASCII characters, as `ascii()` and `!a` do
pub fn ascii_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        let code = c as u32;
        match code {
            0..=0x7f => out.push(c),
            0x80..=0xff => out.push_str(&format!("\\x{:02x}", code)),
            0x100..=0xffff => out.push_str(&format!("\\u{:04x}", code)),
            _ => out.push_str(&format!("\\U{:08x}", code)),
        }
    }
    out
}

/// `'__main__.A'` for user classes, the bare name for built-in ones
fn class_path(class: &Class) -> String {
    match class.origin {
        ClassOrigin::User => format!("__main__.{}", class.qualname),
        _ => class.name.clone(),
    }
}

/* ===================== repr / str ===================== */

/// Container items rendered between deadline checks
const DEADLINE_STRIDE: usize = 1024;

impl VM {
    /// `repr(value)`
    pub fn repr(&mut self, value: &Val) -> ExecResult<String> {
        let mut out = ReprOut::unbounded();
        self.write_repr(value, &mut out)?;
        Ok(out.into_string())
    }

    /// Prefix of `repr(value)` holding at least `cap + 1` chars when the full
    /// text is longer; rendering stops there
    pub fn repr_capped(&mut self, value: &Val, cap: usize) -> ExecResult<String> {
        let mut out = ReprOut::capped(cap);
        self.write_repr(value, &mut out)?;
        Ok(out.into_string())
    }

    fn write_repr(&mut self, value: &Val, out: &mut ReprOut) -> ExecResult<()> {
        if out.full() {
            return Ok(());
        }
        match value {
            Val::None => out.push_str("None"),
            Val::NotImplemented => out.push_str("NotImplemented"),
            Val::Ellipsis => out.push_str("Ellipsis"),
            Val::Bool(true) => out.push_str("True"),
            Val::Bool(false) => out.push_str("False"),
            Val::Int(n) => out.push_str(&n.to_string()),
            Val::BigInt(n) => out.push_str(&bigint_to_string(n)?),
            Val::Float(x) => out.push_str(&float_repr(*x)),
            Val::Str(s) => push_str_repr(out, s),
            Val::List(items) => {
                let key = Rc::as_ptr(items) as *const u8 as usize;
                let items = Rc::clone(items);
                self.guarded(key, "[...]", out, |vm, out| {
                    out.push('[');
                    vm.write_joined(out, |i| items.borrow().get(i).cloned())?;
                    out.push(']');
                    Ok(())
                })?;
            }
            Val::Tuple(items) => {
                let items = Rc::clone(items);
                self.enter()?;
                out.push('(');
                let inner = self.write_joined(out, |i| items.get(i).cloned());
                self.leave();
                inner?;
                if items.len() == 1 {
                    out.push(',');
                }
                out.push(')');
            }
            Val::Dict(map) => {
                let key = Rc::as_ptr(map) as *const u8 as usize;
                let map = Rc::clone(map);
                self.guarded(key, "{...}", out, |vm, out| {
                    out.push('{');
                    let mut i = 0;
                    loop {
                        let entry = map.borrow().get_index(i).map(|(_, kv)| kv.clone());
                        let Some((k, v)) = entry else { break };
                        if out.full() {
                            break;
                        }
                        vm.separate(i, out)?;
                        vm.write_repr(&k, out)?;
                        out.push_str(": ");
                        vm.write_repr(&v, out)?;
                        i += 1;
                    }
                    out.push('}');
                    Ok(())
                })?;
            }
            Val::Set(set) => {
                if set.borrow().is_empty() {
                    out.push_str("set()");
                } else {
                    let set = Rc::clone(set);
                    self.enter()?;
                    out.push('{');
                    let inner = self.write_joined(out, |i| set.borrow().get_index(i).map(|(_, v)| v.clone()));
                    self.leave();
                    inner?;
                    out.push('}');
                }
            }
            Val::Range(r) => {
                if r.step == 1 {
                    out.push_str(&format!("range({}, {})", r.start, r.stop));
                } else {
                    out.push_str(&format!("range({}, {}, {})", r.start, r.stop, r.step));
                }
            }
            Val::Slice(s) => {
                out.push_str("slice(");
                self.write_repr(&s.lower, out)?;
                out.push_str(", ");
                self.write_repr(&s.upper, out)?;
                out.push_str(", ");
                self.write_repr(&s.step, out)?;
                out.push(')');
            }
            Val::DictView(view) => {
                let view = Rc::clone(view);
                out.push_str(&view.kind.type_name());
                out.push_str("([");
                self.write_joined(out, |i| {
                    view.dict.borrow().get_index(i).map(|(_, (k, v))| match view.kind {
                        ViewKind::Keys => k.clone(),
                        ViewKind::Values => v.clone(),
                        ViewKind::Items => Val::tuple(vec![k.clone(), v.clone()]),
                    })
                })?;
                out.push_str("])");
            }
            Val::Instance(inst) => {
                let text = self.instance_repr(inst, value)?;
                out.push_str(&text);
            }
            _ => {
                let text = self.default_repr(value);
                out.push_str(&text);
            }
        }
        Ok(())
    }

    /// `a, b, c` from `item(0)`, `item(1)`, ... until it yields `None`.
    /// Items are fetched one at a time; a nested `__repr__` may mutate the
    /// container.
    fn write_joined(&mut self, out: &mut ReprOut, item: impl Fn(usize) -> Option<Val>) -> ExecResult<()> {
        let mut i = 0;
        while let Some(value) = item(i) {
            if out.full() {
                break;
            }
            self.separate(i, out)?;
            self.write_repr(&value, out)?;
            i += 1;
        }
        Ok(())
    }

    /// Comma before every item but the first, plus a periodic deadline check
    fn separate(&self, i: usize, out: &mut ReprOut) -> ExecResult<()> {
        if i > 0 {
            out.push_str(", ");
        }
        if i % DEADLINE_STRIDE == DEADLINE_STRIDE - 1 {
            self.check_deadline()?;
        }
        Ok(())
    }

    fn join_reprs(&mut self, items: &[Val]) -> ExecResult<String> {
        let mut out = ReprOut::unbounded();
        self.write_joined(&mut out, |i| items.get(i).cloned())?;
        Ok(out.into_string())
    }

    /// Render a container, or `placeholder` if it is already being rendered
    fn guarded(
        &mut self,
        key: usize,
        placeholder: &str,
        out: &mut ReprOut,
        render: impl FnOnce(&mut VM, &mut ReprOut) -> ExecResult<()>,
    ) -> ExecResult<()> {
        if self.repr_guard.contains(&key) {
            out.push_str(placeholder);
            return Ok(());
        }
        self.enter()?;
        self.repr_guard.push(key);
        let result = render(self, out);
        self.repr_guard.pop();
        self.leave();
        result
    }

    fn instance_repr(&mut self, inst: &Rc<Instance>, value: &Val) -> ExecResult<String> {
        if let Some(method) = self.lookup_special(value, "__repr__") {
            self.enter()?;
            let result = self.call_method(&method, value, Vec::new());
            self.leave();
            return match result? {
                Val::Str(s) => Ok(s.to_string()),
                other => Err(Fault::type_error(format!(
                    "__repr__ returned non-string (type {})",
                    other.type_name()
                ))),
            };
        }
        if inst.exc.is_some() {
            return self.exception_repr(value);
        }
        Ok(self.default_repr(value))
    }

    /// `<__main__.A object at 0x...>` and the other identity-based reprs
    pub fn default_repr(&mut self, value: &Val) -> String {
        let addr = self.id_of(value);
        match value {
            Val::Instance(inst) => format!("<{} object at {:#x}>", class_path(&inst.class), addr),
            Val::Function(func) => format!("<function {} at {:#x}>", func.qualname, addr),
            Val::Builtin(builtin) => match &builtin.receiver {
                None => format!("<built-in function {}>", builtin.name),
                Some(receiver) => {
                    let receiver_addr = self.id_of(receiver);
                    format!(
                        "<built-in method {} of {} object at {:#x}>",
                        builtin.name,
                        receiver.type_name(),
                        receiver_addr
                    )
                }
            },
            Val::BoundMethod(method) => {
                let name = match &method.func {
                    Val::Function(func) => func.qualname.clone(),
                    Val::Builtin(builtin) => builtin.name.to_string(),
                    other => other.type_name(),
                };
                let receiver = self
                    .repr(&method.receiver)
                    .unwrap_or_else(|_| "<unrepresentable>".to_string());
                format!("<bound method {} of {}>", name, receiver)
            }
            Val::Class(cls) => format!("<class '{}'>", class_path(cls)),
            Val::Module(module) => format!("<module '{}' (built-in)>", module.name),
            Val::Iterator(iter) if iter.kind == "generator" => {
                format!("<generator object <genexpr> at {:#x}>", addr)
            }
            Val::Iterator(iter) => format!("<{} object at {:#x}>", iter.kind, addr),
            Val::StaticMethod(func) | Val::ClassMethod(func) => {
                let inner = self.default_repr(func);
                format!("<{}({})>", value.type_name(), inner)
            }
            Val::Super(sup) => format!(
                "<super: <class '{}'>, <{} object>>",
                sup.this.name,
                sup.receiver.type_name()
            ),
            other => format!("<{} object at {:#x}>", other.type_name(), addr),
        }
    }

    /// `ValueError('boom')`
    pub fn exception_repr(&mut self, exc: &Val) -> ExecResult<String> {
        let name = match exc {
            Val::Instance(inst) => inst.class.name.clone(),
            other => other.type_name(),
        };
        let args = exception_args(exc);
        let inner = self.join_reprs(&args)?;
        Ok(format!("{}({})", name, inner))
    }

    /// Message part of an exception: `str(exc)` without user overrides
    pub fn exception_text(&mut self, exc: &Val) -> ExecResult<String> {
        let args = exception_args(exc);
        let is_key_error = match exc {
            Val::Instance(inst) => inst
                .class
                .exception_kind()
                .is_some_and(|kind| kind == ExcKind::KeyError),
            _ => false,
        };
        match args.as_slice() {
            [] => Ok(String::new()),
            [single] if is_key_error => self.repr(single),
            [single] => self.to_str(single),
            _ => self.repr(&Val::tuple(args.clone())),
        }
    }

    /// `str(value)`
    pub fn to_str(&mut self, value: &Val) -> ExecResult<String> {
        match value {
            Val::Str(s) => Ok(s.to_string()),
            Val::Instance(inst) => {
                if let Some(method) = self.lookup_special(value, "__str__") {
                    self.enter()?;
                    let result = self.call_method(&method, value, Vec::new());
                    self.leave();
                    return match result? {
                        Val::Str(s) => Ok(s.to_string()),
                        other => Err(Fault::type_error(format!(
                            "__str__ returned non-string (type {})",
                            other.type_name()
                        ))),
                    };
                }
                if inst.exc.is_some() {
                    return self.exception_text(value);
                }
                self.repr(value)
            }
            other => self.repr(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_repr_matches_python() {
        assert_eq!(float_repr(1.0), "1.0");
        assert_eq!(float_repr(0.1), "0.1");
        assert_eq!(float_repr(-2.5), "-2.5");
        assert_eq!(float_repr(1e16), "1e+16");
        assert_eq!(float_repr(123456789.0), "123456789.0");
        assert_eq!(float_repr(0.0001), "0.0001");
        assert_eq!(float_repr(0.00001), "1e-05");
        assert_eq!(float_repr(1.5e300), "1.5e+300");
        assert_eq!(float_repr(-0.0), "-0.0");
        assert_eq!(float_repr(f64::INFINITY), "inf");
        assert_eq!(float_repr(0.1 + 0.2), "0.30000000000000004");
    }

    #[test]
    fn test_str_repr_picks_quotes() {
        assert_eq!(str_repr("hi"), "'hi'");
        assert_eq!(str_repr("it's"), "\"it's\"");
        assert_eq!(str_repr("a'b\"c"), "'a\\'b\"c'");
        assert_eq!(str_repr("tab\there\n"), "'tab\\there\\n'");
        assert_eq!(str_repr("\u{1}"), "'\\x01'");
    }

    #[test]
    fn test_ascii_escape() {
        assert_eq!(ascii_escape("é"), "\\xe9");
        assert_eq!(ascii_escape("€"), "\\u20ac");
        assert_eq!(ascii_escape("ok"), "ok");
    }

    #[test]
    fn test_huge_int_refuses_conversion() {
        let n = BigInt::from(10).pow(5000);
        assert!(bigint_to_string(&n).is_err());
        let n = BigInt::from(10).pow(100);
        assert_eq!(bigint_to_string(&n).unwrap().len(), 101);
    }
}
