//! Built-in functions and the constructors of the built-in types

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{One, Signed, ToPrimitive, Zero};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use super::dicts::{dict_set, dict_update, set_from};
use super::format::format_value;
use super::lists::sort_values;
use super::numbers::{
    float_to_int, index_arg, parse_float, parse_int, round_float, round_half_even, round_int,
    small_index,
};
use super::{named_args, CallArgs, NativeFn};
use crate::executor::errors::{ExcKind, ExecResult, Fault};
use crate::executor::operators::{to_f64, MAX_INT_BITS};
use crate::executor::repr::ascii_escape;
use crate::executor::types::ast::BinOp;
use crate::executor::types::values::{
    BuiltinType, Class, DictMap, HashKey, Instance, IterObj, IterState, Property, RangeObj,
    SliceObj, SuperObj, Val,
};
use crate::executor::vm::VM;

pub const FUNCTIONS: &[(&str, NativeFn)] = &[
    ("print", print),
    ("len", len),
    ("abs", abs),
    ("min", min),
    ("max", max),
    ("sum", sum),
    ("sorted", sorted),
    ("reversed", reversed),
    ("enumerate", enumerate),
    ("zip", zip),
    ("map", map),
    ("filter", filter),
    ("any", any),
    ("all", all),
    ("isinstance", isinstance),
    ("issubclass", issubclass),
    ("repr", repr),
    ("ascii", ascii),
    ("round", round),
    ("chr", chr),
    ("ord", ord),
    ("hex", hex),
    ("bin", bin),
    ("oct", oct),
    ("divmod", divmod),
    ("pow", pow),
    ("hash", hash),
    ("id", id),
    ("iter", iter),
    ("next", next),
    ("hasattr", hasattr),
    ("getattr", getattr),
    ("setattr", setattr),
    ("delattr", delattr),
    ("callable", callable),
    ("format", format),
    ("input", input),
];

/// Check the deadline once every this many items of a native loop
const DEADLINE_STRIDE: usize = 1024;

fn one_arg<'a>(args: &'a CallArgs, name: &str) -> ExecResult<&'a Val> {
    args.no_keywords(name)?;
    args.arity(name, 1, 1)?;
    Ok(&args.positional[0])
}

fn attr_name<'a>(value: &'a Val) -> ExecResult<&'a str> {
    value.as_str().ok_or_else(|| {
        Fault::type_error(format!(
            "attribute name must be string, not '{}'",
            value.type_name()
        ))
    })
}

/* ===================== Output ===================== */

fn print(vm: &mut VM, mut args: CallArgs) -> ExecResult<Val> {
    let separator = |value: Option<Val>, what: &str, default: &str| -> ExecResult<String> {
        match value {
            None | Some(Val::None) => Ok(default.to_string()),
            Some(Val::Str(s)) => Ok(s.to_string()),
            Some(other) => Err(Fault::type_error(format!(
                "{} must be None or a string, not {}",
                what,
                other.type_name()
            ))),
        }
    };
    let sep = separator(args.take_keyword("sep"), "sep", " ")?;
    let end = separator(args.take_keyword("end"), "end", "\n")?;
    args.take_keyword("flush");
    if let Some(file) = args.take_keyword("file") {
        if !file.is_none() {
            return Err(Fault::new(
                ExcKind::NotImplementedError,
                "print() to a file is not supported",
            ));
        }
    }
    args.no_keywords("print")?;

    let mut line = String::new();
    for (i, value) in args.positional.iter().enumerate() {
        if i > 0 {
            line.push_str(&sep);
        }
        line.push_str(&vm.to_str(value)?);
    }
    line.push_str(&end);
    vm.output.write(&line);
    Ok(Val::None)
}

fn input(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    args.no_keywords("input")?;
    args.arity("input", 0, 1)?;
    if let Some(prompt) = args.arg(0) {
        let prompt = vm.to_str(prompt)?;
        vm.output.write(&prompt);
    }
    Err(Fault::new(ExcKind::EOFError, "EOF when reading a line"))
}

/* ===================== Numbers ===================== */

fn len(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let value = one_arg(&args, "len")?;
    Ok(Val::Int(vm.len_of(value)? as i64))
}

fn abs(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let value = one_arg(&args, "abs")?;
    match value {
        Val::Bool(b) => Ok(Val::Int(*b as i64)),
        Val::Int(n) => Ok(match n.checked_abs() {
            Some(n) => Val::Int(n),
            None => Val::from_bigint(BigInt::from(*n).abs()),
        }),
        Val::BigInt(n) => Ok(Val::from_bigint(n.abs())),
        Val::Float(x) => Ok(Val::Float(x.abs())),
        Val::Instance(_) => match vm.lookup_special(value, "__abs__") {
            Some(method) => vm.call_method(&method, value, Vec::new()),
            None => Err(Fault::type_error(format!(
                "bad operand type for abs(): '{}'",
                value.type_name()
            ))),
        },
        other => Err(Fault::type_error(format!(
            "bad operand type for abs(): '{}'",
            other.type_name()
        ))),
    }
}

fn round(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let params = named_args(args, "round", &["number", "ndigits"], 0)?;
    let Some(number) = &params[0] else {
        return Err(Fault::type_error(
            "round() missing required argument 'number' (pos 1)",
        ));
    };
    let ndigits = match &params[1] {
        None | Some(Val::None) => None,
        Some(n) => Some(small_index(n)?),
    };
    match (number, ndigits) {
        (Val::Float(x), None) => float_to_int(round_half_even(*x)),
        (Val::Float(x), Some(nd)) => Ok(Val::Float(round_float(*x, nd))),
        (n @ (Val::Int(_) | Val::BigInt(_) | Val::Bool(_)), nd) => {
            let value = n.as_bigint().unwrap_or_default();
            Ok(Val::from_bigint(match nd {
                Some(nd) => round_int(&value, nd),
                None => value,
            }))
        }
        (Val::Instance(_), _) => match vm.lookup_special(number, "__round__") {
            Some(method) => {
                let extra = params[1].iter().cloned().collect();
                vm.call_method(&method, number, extra)
            }
            None => Err(no_round(number)),
        },
        (other, _) => Err(no_round(other)),
    }
}

fn no_round(value: &Val) -> Fault {
    Fault::type_error(format!(
        "type {} doesn't define __round__ method",
        value.type_name()
    ))
}

fn divmod(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    args.no_keywords("divmod")?;
    if args.len() != 2 {
        return Err(Fault::type_error(format!(
            "divmod expected 2 arguments, got {}",
            args.len()
        )));
    }
    let (a, b) = (&args.positional[0], &args.positional[1]);
    if !a.is_numeric() || !b.is_numeric() {
        return Err(Fault::type_error(format!(
            "unsupported operand type(s) for divmod(): '{}' and '{}'",
            a.type_name(),
            b.type_name()
        )));
    }
    let quotient = vm.binary_op(BinOp::FloorDiv, a, b)?;
    let remainder = vm.binary_op(BinOp::Mod, a, b)?;
    Ok(Val::tuple(vec![quotient, remainder]))
}

fn pow(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let params = named_args(args, "pow", &["base", "exp", "mod"], 0)?;
    let (Some(base), Some(exp)) = (&params[0], &params[1]) else {
        return Err(Fault::type_error("pow() missing required argument 'exp' (pos 2)"));
    };
    let modulus = match &params[2] {
        None | Some(Val::None) => return vm.binary_op(BinOp::Pow, base, exp),
        Some(m) => m,
    };
    let (Some(base), Some(exp), Some(modulus)) =
        (base.as_bigint(), exp.as_bigint(), modulus.as_bigint())
    else {
        return Err(Fault::type_error(
            "pow() 3rd argument not allowed unless all arguments are integers",
        ));
    };
    if modulus.is_zero() {
        return Err(Fault::value_error("pow() 3rd argument cannot be 0"));
    }
    let (base, exp) = if exp.is_negative() {
        let m = modulus.abs();
        let reduced = base.mod_floor(&m);
        let egcd = reduced.extended_gcd(&m);
        if !egcd.gcd.is_one() {
            return Err(Fault::value_error(
                "base is not invertible for the given modulus",
            ));
        }
        (egcd.x.mod_floor(&m), -exp)
    } else {
        (base, exp)
    };
    Ok(Val::from_bigint(base.modpow(&exp, &modulus)))
}

fn radix_text(args: &CallArgs, name: &str, radix: u32, prefix: &str) -> ExecResult<Val> {
    let n = index_arg(one_arg(args, name)?, "")?;
    let digits = n.abs().to_str_radix(radix);
    let sign = if n.is_negative() { "-" } else { "" };
    Ok(Val::str(&format!("{}{}{}", sign, prefix, digits)))
}

fn hex(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    radix_text(&args, "hex", 16, "0x")
}

fn bin(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    radix_text(&args, "bin", 2, "0b")
}

fn oct(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    radix_text(&args, "oct", 8, "0o")
}

fn chr(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let n = index_arg(one_arg(&args, "chr")?, "")?;
    let c = n
        .to_u32()
        .filter(|n| *n < 0x110000)
        .and_then(char::from_u32)
        .ok_or_else(|| Fault::value_error("chr() arg not in range(0x110000)"))?;
    Ok(Val::str(c.encode_utf8(&mut [0; 4])))
}

fn ord(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    match one_arg(&args, "ord")? {
        Val::Str(s) => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Val::Int(c as i64)),
                _ => Err(Fault::type_error(format!(
                    "ord() expected a character, but string of length {} found",
                    s.chars().count()
                ))),
            }
        }
        other => Err(Fault::type_error(format!(
            "ord() expected string of length 1, but {} found",
            other.type_name()
        ))),
    }
}

/* ===================== Aggregates ===================== */

fn extremum(vm: &mut VM, mut args: CallArgs, name: &str, want_max: bool) -> ExecResult<Val> {
    let key = args.take_keyword("key").filter(|k| !k.is_none());
    let default = args.take_keyword("default");
    args.no_keywords(name)?;

    let items = match args.positional.len() {
        0 => {
            return Err(Fault::type_error(format!(
                "{} expected at least 1 argument, got 0",
                name
            )))
        }
        1 => vm.collect(&args.positional[0])?,
        _ if default.is_some() => {
            return Err(Fault::type_error(format!(
                "Cannot specify a default for {}() with multiple positional arguments",
                name
            )))
        }
        _ => args.positional,
    };

    let mut best: Option<(Val, Val)> = None;
    for item in items {
        let k = match &key {
            Some(func) => vm.call(func, vec![item.clone()])?,
            None => item.clone(),
        };
        best = match best {
            None => Some((k, item)),
            Some((best_k, best_item)) => {
                let replace = if want_max {
                    vm.less_than(&best_k, &k)?
                } else {
                    vm.less_than(&k, &best_k)?
                };
                if replace {
                    Some((k, item))
                } else {
                    Some((best_k, best_item))
                }
            }
        };
    }
    match (best, default) {
        (Some((_, item)), _) => Ok(item),
        (None, Some(default)) => Ok(default),
        (None, None) => Err(Fault::value_error(format!(
            "{}() iterable argument is empty",
            name
        ))),
    }
}

fn min(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    extremum(vm, args, "min", false)
}

fn max(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    extremum(vm, args, "max", true)
}

fn sum(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let params = named_args(args, "sum", &["iterable", "start"], 0)?;
    let Some(iterable) = &params[0] else {
        return Err(Fault::type_error("sum() takes at least 1 positional argument (0 given)"));
    };
    let mut acc = params[1].clone().unwrap_or(Val::Int(0));
    if let Val::Str(_) = acc {
        return Err(Fault::type_error(
            "sum() can't sum strings [use ''.join(seq) instead]",
        ));
    }
    let iter = vm.get_iter(iterable)?;
    let mut n = 0usize;
    while let Some(item) = vm.next_item(&iter)? {
        acc = vm.binary_op(BinOp::Add, &acc, &item)?;
        n += 1;
        if n % DEADLINE_STRIDE == 0 {
            vm.check_deadline()?;
        }
    }
    Ok(acc)
}

fn sorted(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    if args.len() != 1 {
        return Err(Fault::type_error(format!(
            "sorted expected 1 argument, got {}",
            args.len()
        )));
    }
    let iterable = args.positional[0].clone();
    let params = named_args(args, "sort", &["key", "reverse"], 1)?;
    let reverse = match &params[1] {
        Some(value) => vm.truthy(value)?,
        None => false,
    };
    let items = vm.collect(&iterable)?;
    let items = sort_values(vm, items, params[0].as_ref(), reverse)?;
    Ok(Val::list(items))
}

fn any(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let iter = vm.get_iter(one_arg(&args, "any")?)?;
    while let Some(item) = vm.next_item(&iter)? {
        if vm.truthy(&item)? {
            return Ok(Val::Bool(true));
        }
    }
    Ok(Val::Bool(false))
}

fn all(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let iter = vm.get_iter(one_arg(&args, "all")?)?;
    while let Some(item) = vm.next_item(&iter)? {
        if !vm.truthy(&item)? {
            return Ok(Val::Bool(false));
        }
    }
    Ok(Val::Bool(true))
}

/* ===================== Iterators ===================== */

fn reversed(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let value = one_arg(&args, "reversed")?;
    let snapshot = |kind: &'static str, mut items: Vec<Val>| {
        items.reverse();
        IterObj::new(kind, IterState::Items { items, idx: 0 })
    };
    match value {
        Val::List(items) => Ok(snapshot("list_reverseiterator", items.borrow().clone())),
        Val::Tuple(_) | Val::Str(_) => Ok(snapshot("reversed", vm.collect(value)?)),
        Val::Dict(map) => {
            let keys = map.borrow().values().map(|(k, _)| k.clone()).collect();
            Ok(snapshot("dict_reversekeyiterator", keys))
        }
        Val::Range(r) => Ok(IterObj::new(
            "range_iterator",
            IterState::Range {
                next: r.get(r.len() - 1),
                remaining: r.len(),
                step: -r.step,
            },
        )),
        Val::Instance(_) => {
            if let Some(method) = vm.lookup_special(value, "__reversed__") {
                return vm.call_method(&method, value, Vec::new());
            }
            if vm.lookup_special(value, "__len__").is_some()
                && vm.lookup_special(value, "__getitem__").is_some()
            {
                let len = vm.len_of(value)?;
                let mut items = Vec::with_capacity(len);
                for i in 0..len {
                    items.push(vm.get_item(value, &Val::Int(i as i64))?);
                }
                return Ok(snapshot("reversed", items));
            }
            Err(not_reversible(value))
        }
        other => Err(not_reversible(other)),
    }
}

fn not_reversible(value: &Val) -> Fault {
    Fault::type_error(format!("'{}' object is not reversible", value.type_name()))
}

fn enumerate(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let params = named_args(args, "enumerate", &["iterable", "start"], 0)?;
    let Some(iterable) = &params[0] else {
        return Err(Fault::type_error(
            "enumerate() missing required argument 'iterable' (pos 1)",
        ));
    };
    let count = match &params[1] {
        Some(start) => small_index(start)?,
        None => 0,
    };
    let inner = vm.get_iter(iterable)?;
    Ok(IterObj::new("enumerate", IterState::Enumerate { inner, count }))
}

fn zip(vm: &mut VM, mut args: CallArgs) -> ExecResult<Val> {
    args.take_keyword("strict");
    args.no_keywords("zip")?;
    if args.is_empty() {
        return Ok(IterObj::new("zip", IterState::Exhausted));
    }
    let mut inners = Vec::with_capacity(args.len());
    for value in &args.positional {
        inners.push(vm.get_iter(value)?);
    }
    Ok(IterObj::new("zip", IterState::Zip { inners }))
}

fn map(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    args.no_keywords("map")?;
    if args.len() < 2 {
        return Err(Fault::type_error("map() must have at least two arguments."));
    }
    let mut positional = args.positional.into_iter();
    let func = positional.next().unwrap_or(Val::None);
    let mut inners = Vec::new();
    for value in positional {
        inners.push(vm.get_iter(&value)?);
    }
    Ok(IterObj::new("map", IterState::Map { func, inners }))
}

fn filter(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    args.no_keywords("filter")?;
    if args.len() != 2 {
        return Err(Fault::type_error(format!(
            "filter expected 2 arguments, got {}",
            args.len()
        )));
    }
    let inner = vm.get_iter(&args.positional[1])?;
    let func = args.positional[0].clone();
    Ok(IterObj::new("filter", IterState::Filter { func, inner }))
}

fn iter(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let value = one_arg(&args, "iter")?;
    vm.get_iter(value)
}

fn next(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    args.no_keywords("next")?;
    args.arity("next", 1, 2)?;
    let iter = &args.positional[0];
    match vm.next_item(iter)? {
        Some(item) => Ok(item),
        None => match args.arg(1) {
            Some(default) => Ok(default.clone()),
            None => Err(Fault::bare(ExcKind::StopIteration)),
        },
    }
}

/* ===================== Introspection ===================== */

/// Classes named by the second argument of `isinstance` / `issubclass`
fn class_targets(value: &Val, name: &str, out: &mut Vec<Rc<Class>>) -> ExecResult<()> {
    match value {
        Val::Class(cls) => out.push(cls.clone()),
        Val::Tuple(items) => {
            for item in items.iter() {
                class_targets(item, name, out)?;
            }
        }
        _ => {
            return Err(Fault::type_error(format!(
                "{}() arg 2 must be a type, a tuple of types, or a union",
                name
            )))
        }
    }
    Ok(())
}

fn isinstance(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    args.no_keywords("isinstance")?;
    if args.len() != 2 {
        return Err(Fault::type_error(format!(
            "isinstance expected 2 arguments, got {}",
            args.len()
        )));
    }
    let mut targets = Vec::new();
    class_targets(&args.positional[1], "isinstance", &mut targets)?;
    let class = vm.types.class_of(&args.positional[0]);
    Ok(Val::Bool(
        targets.iter().any(|t| Class::is_subclass(&class, t)),
    ))
}

fn issubclass(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    args.no_keywords("issubclass")?;
    if args.len() != 2 {
        return Err(Fault::type_error(format!(
            "issubclass expected 2 arguments, got {}",
            args.len()
        )));
    }
    let Val::Class(class) = &args.positional[0] else {
        return Err(Fault::type_error("issubclass() arg 1 must be a class"));
    };
    let mut targets = Vec::new();
    class_targets(&args.positional[1], "issubclass", &mut targets)?;
    Ok(Val::Bool(
        targets.iter().any(|t| Class::is_subclass(class, t)),
    ))
}

fn repr(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let value = one_arg(&args, "repr")?;
    Ok(Val::str(&vm.repr(value)?))
}

fn ascii(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let value = one_arg(&args, "ascii")?;
    Ok(Val::str(&ascii_escape(&vm.repr(value)?)))
}

fn format(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    args.no_keywords("format")?;
    args.arity("format", 1, 2)?;
    let spec = match args.arg(1) {
        None => String::new(),
        Some(Val::Str(s)) => s.to_string(),
        Some(other) => {
            return Err(Fault::type_error(format!(
                "format() argument 2 must be str, not {}",
                other.type_name()
            )))
        }
    };
    Ok(Val::str(&format_value(vm, &args.positional[0], &spec)?))
}

fn hash(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let value = one_arg(&args, "hash")?;
    let key = vm.hash_key(value)?;
    let n = match key {
        HashKey::Int(n) => n,
        other => {
            let mut hasher = DefaultHasher::new();
            other.hash(&mut hasher);
            // CPython hashes are 61-bit on 64-bit platforms
            (hasher.finish() >> 3) as i64
        }
    };
    Ok(Val::Int(if n == -1 { -2 } else { n }))
}

fn id(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let value = one_arg(&args, "id")?;
    Ok(Val::Int(vm.id_of(value) as i64))
}

fn callable(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let value = one_arg(&args, "callable")?;
    let result = match value {
        Val::Function(_)
        | Val::Builtin(_)
        | Val::BoundMethod(_)
        | Val::Class(_)
        | Val::StaticMethod(_) => true,
        Val::Instance(_) => vm.lookup_special(value, "__call__").is_some(),
        _ => false,
    };
    Ok(Val::Bool(result))
}

fn hasattr(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    args.no_keywords("hasattr")?;
    args.arity("hasattr", 2, 2)?;
    let name = attr_name(&args.positional[1])?;
    match vm.get_attr(&args.positional[0], name) {
        Ok(_) => Ok(Val::Bool(true)),
        Err(fault) if fault.matches(ExcKind::AttributeError) => Ok(Val::Bool(false)),
        Err(fault) => Err(fault),
    }
}

fn getattr(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    args.no_keywords("getattr")?;
    args.arity("getattr", 2, 3)?;
    let name = attr_name(&args.positional[1])?;
    match (vm.get_attr(&args.positional[0], name), args.arg(2)) {
        (Err(fault), Some(default)) if fault.matches(ExcKind::AttributeError) => {
            Ok(default.clone())
        }
        (result, _) => result,
    }
}

fn setattr(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    args.no_keywords("setattr")?;
    args.arity("setattr", 3, 3)?;
    let name = attr_name(&args.positional[1])?;
    vm.set_attr(&args.positional[0], name, args.positional[2].clone())?;
    Ok(Val::None)
}

fn delattr(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    args.no_keywords("delattr")?;
    args.arity("delattr", 2, 2)?;
    let name = attr_name(&args.positional[1])?;
    vm.del_attr(&args.positional[0], name)?;
    Ok(Val::None)
}

/* ===================== Type Constructors ===================== */

/// Call a built-in type object: `int("3")`, `list(x)`, `super()`
pub fn construct(vm: &mut VM, ty: BuiltinType, args: CallArgs) -> ExecResult<Val> {
    match ty {
        BuiltinType::Object => {
            if !args.is_empty() || !args.keywords.is_empty() {
                return Err(Fault::type_error("object() takes no arguments"));
            }
            Ok(Val::Instance(Instance::new(vm.types.object())))
        }
        BuiltinType::Type => construct_type(vm, args),
        BuiltinType::NoneType => {
            args.arity("NoneType", 0, 0)?;
            Ok(Val::None)
        }
        BuiltinType::Bool => {
            args.no_keywords("bool")?;
            args.arity("bool", 0, 1)?;
            match args.arg(0) {
                Some(value) => Ok(Val::Bool(vm.truthy(value)?)),
                None => Ok(Val::Bool(false)),
            }
        }
        BuiltinType::Int => construct_int(vm, args),
        BuiltinType::Float => {
            args.no_keywords("float")?;
            args.arity("float", 0, 1)?;
            let Some(value) = args.arg(0) else {
                return Ok(Val::Float(0.0));
            };
            match value {
                Val::Str(s) => Ok(Val::Float(parse_float(s)?)),
                Val::Instance(_) => match vm.lookup_special(value, "__float__") {
                    Some(method) => vm.call_method(&method, value, Vec::new()),
                    None => Err(float_arg_error(value)),
                },
                v if v.is_numeric() => Ok(Val::Float(to_f64(v)?)),
                other => Err(float_arg_error(other)),
            }
        }
        BuiltinType::Str => {
            args.no_keywords("str")?;
            args.arity("str", 0, 1)?;
            match args.arg(0) {
                Some(value) => Ok(Val::str(&vm.to_str(value)?)),
                None => Ok(Val::str("")),
            }
        }
        BuiltinType::List => {
            args.no_keywords("list")?;
            args.arity("list", 0, 1)?;
            match args.arg(0) {
                Some(value) => Ok(Val::list(vm.collect(value)?)),
                None => Ok(Val::list(Vec::new())),
            }
        }
        BuiltinType::Tuple => {
            args.no_keywords("tuple")?;
            args.arity("tuple", 0, 1)?;
            match args.arg(0) {
                Some(value @ Val::Tuple(_)) => Ok(value.clone()),
                Some(value) => Ok(Val::tuple(vm.collect(value)?)),
                None => Ok(Val::tuple(Vec::new())),
            }
        }
        BuiltinType::Dict => {
            args.arity("dict", 0, 1)?;
            let map = Rc::new(std::cell::RefCell::new(DictMap::new()));
            if let Some(source) = args.arg(0) {
                dict_update(vm, &map, source)?;
            }
            for (key, value) in args.keywords {
                let k = Val::str(&key);
                dict_set(&mut map.borrow_mut(), HashKey::Str(Rc::from(key.as_str())), k, value);
            }
            Ok(Val::Dict(map))
        }
        BuiltinType::Set => {
            args.no_keywords("set")?;
            args.arity("set", 0, 1)?;
            match args.arg(0) {
                Some(value) => Ok(Val::set(set_from(vm, value)?)),
                None => Ok(Val::set(Default::default())),
            }
        }
        BuiltinType::Range => construct_range(args),
        BuiltinType::Slice => {
            args.no_keywords("slice")?;
            args.arity("slice", 1, 3)?;
            let mut parts = args.positional.into_iter();
            let first = parts.next().unwrap_or(Val::None);
            let slice = match (parts.next(), parts.next()) {
                (None, _) => SliceObj {
                    lower: Val::None,
                    upper: first,
                    step: Val::None,
                },
                (Some(upper), step) => SliceObj {
                    lower: first,
                    upper,
                    step: step.unwrap_or(Val::None),
                },
            };
            Ok(Val::Slice(Rc::new(slice)))
        }
        BuiltinType::Property => {
            let params = named_args(args, "property", &["fget", "fset", "fdel", "doc"], 0)?;
            let accessor = |v: &Option<Val>| v.clone().filter(|v| !v.is_none());
            Ok(Val::Property(Rc::new(Property {
                fget: accessor(&params[0]),
                fset: accessor(&params[1]),
                fdel: accessor(&params[2]),
            })))
        }
        BuiltinType::StaticMethod => {
            let func = one_arg(&args, "staticmethod")?;
            Ok(Val::StaticMethod(Rc::new(func.clone())))
        }
        BuiltinType::ClassMethod => {
            let func = one_arg(&args, "classmethod")?;
            Ok(Val::ClassMethod(Rc::new(func.clone())))
        }
        BuiltinType::Super => construct_super(vm, args),
        other => Err(Fault::type_error(format!(
            "cannot create '{}' instances",
            vm.types.get(other).name
        ))),
    }
}

fn float_arg_error(value: &Val) -> Fault {
    Fault::type_error(format!(
        "float() argument must be a string or a real number, not '{}'",
        value.type_name()
    ))
}

fn construct_type(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    args.no_keywords("type")?;
    match args.len() {
        1 => Ok(Val::Class(vm.types.class_of(&args.positional[0]))),
        3 => {
            let mut parts = args.positional.into_iter();
            let (name, bases, namespace) = (
                parts.next().unwrap_or(Val::None),
                parts.next().unwrap_or(Val::None),
                parts.next().unwrap_or(Val::None),
            );
            let Val::Str(name) = name else {
                return Err(Fault::type_error(format!(
                    "type.__new__() argument 1 must be str, not {}",
                    name.type_name()
                )));
            };
            let Val::Tuple(bases) = bases else {
                return Err(Fault::type_error(format!(
                    "type.__new__() argument 2 must be tuple, not {}",
                    bases.type_name()
                )));
            };
            let Val::Dict(namespace) = namespace else {
                return Err(Fault::type_error(format!(
                    "type.__new__() argument 3 must be dict, not {}",
                    namespace.type_name()
                )));
            };
            let mut attrs = indexmap::IndexMap::new();
            for (key, value) in namespace.borrow().values() {
                if let Val::Str(key) = key {
                    attrs.insert(key.to_string(), value.clone());
                }
            }
            vm.create_class(&name, &name, bases.to_vec(), attrs)
        }
        _ => Err(Fault::type_error("type() takes 1 or 3 arguments")),
    }
}

fn construct_int(vm: &mut VM, mut args: CallArgs) -> ExecResult<Val> {
    let base = args.take_keyword("base");
    args.no_keywords("int")?;
    args.arity("int", 0, 2)?;
    let base = match (args.arg(1), base) {
        (Some(_), Some(_)) => {
            return Err(Fault::type_error(
                "argument for int() given by name ('base') and position (2)",
            ))
        }
        (Some(b), None) => Some(b.clone()),
        (None, b) => b,
    };
    let Some(value) = args.arg(0) else {
        if base.is_some() {
            return Err(Fault::type_error("int() missing string argument"));
        }
        return Ok(Val::Int(0));
    };

    if let Some(base) = base {
        let base = small_index(&base)?;
        if base != 0 && !(2..=36).contains(&base) {
            return Err(Fault::value_error("int() base must be >= 2 and <= 36, or 0"));
        }
        let Val::Str(text) = value else {
            return Err(Fault::type_error(
                "int() can't convert non-string with explicit base",
            ));
        };
        return parse_int(text, base as u32);
    }

    match value {
        Val::Bool(b) => Ok(Val::Int(*b as i64)),
        Val::Int(_) | Val::BigInt(_) => Ok(value.clone()),
        Val::Float(x) => float_to_int(*x),
        Val::Str(text) => parse_int(text, 10),
        Val::Instance(_) => {
            for name in ["__int__", "__index__"] {
                if let Some(method) = vm.lookup_special(value, name) {
                    return vm.call_method(&method, value, Vec::new());
                }
            }
            Err(int_arg_error(value))
        }
        other => Err(int_arg_error(other)),
    }
}

fn int_arg_error(value: &Val) -> Fault {
    Fault::type_error(format!(
        "int() argument must be a string, a bytes-like object or a real number, not '{}'",
        value.type_name()
    ))
}

fn construct_range(args: CallArgs) -> ExecResult<Val> {
    args.no_keywords("range")?;
    args.arity("range", 1, 3)?;
    let bound = |v: &Val| -> ExecResult<i64> {
        let n = index_arg(v, "")?;
        if n.bits() > MAX_INT_BITS {
            return Err(Fault::memory_error());
        }
        n.to_i64().ok_or_else(|| {
            Fault::overflow("Python int too large to convert to C ssize_t")
        })
    };
    let (start, stop, step) = match args.positional.as_slice() {
        [stop] => (0, bound(stop)?, 1),
        [start, stop] => (bound(start)?, bound(stop)?, 1),
        [start, stop, step] => (bound(start)?, bound(stop)?, bound(step)?),
        _ => (0, 0, 1),
    };
    if step == 0 {
        return Err(Fault::value_error("range() arg 3 must not be zero"));
    }
    Ok(Val::Range(RangeObj { start, stop, step }))
}

fn construct_super(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    args.no_keywords("super")?;
    let (this, receiver) = match args.len() {
        0 => {
            let act = vm
                .activation()
                .ok_or_else(|| Fault::new(ExcKind::RuntimeError, "super(): no arguments"))?;
            let func = act
                .function
                .clone()
                .ok_or_else(|| Fault::new(ExcKind::RuntimeError, "super(): no arguments"))?;
            let owner = func.owner.borrow().as_ref().and_then(|w| w.upgrade());
            let this = owner.ok_or_else(|| {
                Fault::new(ExcKind::RuntimeError, "super(): __class__ cell not found")
            })?;
            let receiver = func
                .def
                .params
                .first()
                .and_then(|p| act.locals.get(&p.name))
                .ok_or_else(|| Fault::new(ExcKind::RuntimeError, "super(): no arguments"))?;
            (this, receiver)
        }
        2 => {
            let Val::Class(this) = &args.positional[0] else {
                return Err(Fault::type_error(format!(
                    "super() argument 1 must be a type, not {}",
                    args.positional[0].type_name()
                )));
            };
            (this.clone(), args.positional[1].clone())
        }
        n => {
            return Err(Fault::type_error(format!(
                "super() takes 0 or 2 arguments ({} given)",
                n
            )))
        }
    };
    let receiver_class = match &receiver {
        Val::Class(cls) => cls.clone(),
        other => vm.types.class_of(other),
    };
    if !Class::is_subclass(&receiver_class, &this) {
        return Err(Fault::type_error(
            "super(type, obj): obj must be an instance or subtype of type",
        ));
    }
    Ok(Val::Super(Rc::new(SuperObj { this, receiver })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::vm::Limits;

    fn call(vm: &mut VM, name: &str, args: Vec<Val>) -> ExecResult<Val> {
        let func = FUNCTIONS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, f)| *f)
            .unwrap();
        func(vm, CallArgs::new(args))
    }

    #[test]
    fn test_print_writes_separator_and_end() {
        let mut vm = VM::new(Limits::default());
        let mut args = CallArgs::new(vec![Val::Int(1), Val::str("a")]);
        args.keywords.push(("sep".to_string(), Val::str("-")));
        args.keywords.push(("end".to_string(), Val::str("!")));
        print(&mut vm, args).unwrap();
        assert_eq!(vm.output.as_str(), "1-a!");
    }

    #[test]
    fn test_min_max_keep_first_of_equal_items() {
        let mut vm = VM::new(Limits::default());
        let items = Val::list(vec![Val::Int(3), Val::Float(3.0), Val::Int(1)]);
        let best = call(&mut vm, "max", vec![items]).unwrap();
        assert!(matches!(best, Val::Int(3)));
        let err = call(&mut vm, "min", vec![Val::list(Vec::new())]).unwrap_err();
        assert!(err.matches(ExcKind::ValueError));
    }

    #[test]
    fn test_radix_text_and_chr_ord() {
        let mut vm = VM::new(Limits::default());
        let text = call(&mut vm, "hex", vec![Val::Int(-255)]).unwrap();
        assert_eq!(text.as_str(), Some("-0xff"));
        let text = call(&mut vm, "bin", vec![Val::Int(5)]).unwrap();
        assert_eq!(text.as_str(), Some("0b101"));
        let c = call(&mut vm, "chr", vec![Val::Int(65)]).unwrap();
        assert_eq!(c.as_str(), Some("A"));
        let n = call(&mut vm, "ord", vec![Val::str("é")]).unwrap();
        assert_eq!(n.as_i64(), Some(233));
    }

    #[test]
    fn test_modular_pow_with_negative_exponent() {
        let mut vm = VM::new(Limits::default());
        let inverse = call(&mut vm, "pow", vec![Val::Int(3), Val::Int(-1), Val::Int(7)]).unwrap();
        assert_eq!(inverse.as_i64(), Some(5));
        let err = call(&mut vm, "pow", vec![Val::Int(2), Val::Int(-1), Val::Int(4)]).unwrap_err();
        assert!(err.matches(ExcKind::ValueError));
    }

    #[test]
    fn test_round_half_to_even() {
        let mut vm = VM::new(Limits::default());
        let r = call(&mut vm, "round", vec![Val::Float(2.5)]).unwrap();
        assert_eq!(r.as_i64(), Some(2));
        let r = call(&mut vm, "round", vec![Val::Int(1250), Val::Int(-2)]).unwrap();
        assert_eq!(r.as_i64(), Some(1200));
    }

    #[test]
    fn test_construct_int_parses_bases() {
        let mut vm = VM::new(Limits::default());
        let mut args = CallArgs::new(vec![Val::str("ff")]);
        args.keywords.push(("base".to_string(), Val::Int(16)));
        assert_eq!(construct(&mut vm, BuiltinType::Int, args).unwrap().as_i64(), Some(255));
        let err = construct(&mut vm, BuiltinType::Int, CallArgs::new(vec![Val::str("x")])).unwrap_err();
        assert!(err.matches(ExcKind::ValueError));
    }

    #[test]
    fn test_range_rejects_zero_step() {
        let err = construct_range(CallArgs::new(vec![Val::Int(0), Val::Int(5), Val::Int(0)])).unwrap_err();
        assert!(err.matches(ExcKind::ValueError));
    }
}
