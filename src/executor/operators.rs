//! Operators: arithmetic, comparison, membership, truthiness and hashing

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{FromPrimitive, Signed, ToPrimitive, Zero};
use std::cmp::Ordering;
use std::rc::Rc;

use super::errors::{ExcKind, ExecResult, Fault};
use super::types::ast::{BinOp, CmpOp, UnaryOp};
use super::types::values::{HashKey, Instance, SetMap, Val, ViewKind};
use super::vm::VM;
use super::stdlib::format::percent_format;

/// Integers larger than this many bits are refused with `MemoryError`
pub const MAX_INT_BITS: u64 = 1 << 22;

/// Sequences longer than this are refused with `MemoryError`
pub const MAX_SEQUENCE_LEN: usize = 10_000_000;

/* ===================== Truthiness ===================== */

impl VM {
    pub fn truthy(&mut self, value: &Val) -> ExecResult<bool> {
        Ok(match value {
            Val::None => false,
            Val::Bool(b) => *b,
            Val::Int(n) => *n != 0,
            Val::BigInt(_) => true,
            Val::Float(x) => *x != 0.0,
            Val::Str(s) => !s.is_empty(),
            Val::List(items) => !items.borrow().is_empty(),
            Val::Tuple(items) => !items.is_empty(),
            Val::Dict(map) => !map.borrow().is_empty(),
            Val::Set(set) => !set.borrow().is_empty(),
            Val::Range(r) => !r.is_empty(),
            Val::DictView(view) => !view.dict.borrow().is_empty(),
            Val::Instance(inst) => return self.instance_truthy(inst, value),
            _ => true,
        })
    }

    fn instance_truthy(&mut self, inst: &Rc<Instance>, value: &Val) -> ExecResult<bool> {
        if let Some(method) = inst.class.lookup_user("__bool__") {
            return match self.call_method(&method, value, Vec::new())? {
                Val::Bool(b) => Ok(b),
                other => Err(Fault::type_error(format!(
                    "__bool__ should return bool, returned {}",
                    other.type_name()
                ))),
            };
        }
        if inst.class.lookup_user("__len__").is_some() {
            return Ok(self.len_of(value)? != 0);
        }
        Ok(true)
    }
}

/* ===================== Arithmetic ===================== */

impl VM {
    /// Evaluate `left op right`
    pub fn binary_op(&mut self, op: BinOp, left: &Val, right: &Val) -> ExecResult<Val> {
        if left.is_numeric() && right.is_numeric() {
            return numeric_op(op, left, right);
        }
        if let Some(result) = self.dunder_binary(op, left, right)? {
            return Ok(result);
        }
        if let Some(result) = self.container_op(op, left, right)? {
            return Ok(result);
        }
        Err(binary_type_error(op, left, right))
    }

    /// Evaluate `left op= right`, mutating mutable containers in place
    pub fn inplace_op(&mut self, op: BinOp, left: &Val, right: &Val) -> ExecResult<Val> {
        match (op, left, right) {
            (BinOp::Add, Val::List(items), _) => {
                let extra = self.collect(right)?;
                check_sequence_len(items.borrow().len() + extra.len())?;
                items.borrow_mut().extend(extra);
                return Ok(left.clone());
            }
            (BinOp::Mul, Val::List(items), count) if count.is_int_like() => {
                let repeated = repeat_items(&items.borrow(), count)?;
                *items.borrow_mut() = repeated;
                return Ok(left.clone());
            }
            (
                BinOp::BitOr | BinOp::BitAnd | BinOp::Sub | BinOp::BitXor,
                Val::Set(set),
                Val::Set(other),
            ) => {
                let result = set_op(op, &set.borrow(), &other.borrow());
                *set.borrow_mut() = result;
                return Ok(left.clone());
            }
            (BinOp::BitOr, Val::Dict(map), Val::Dict(other)) => {
                let entries: Vec<_> = other
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                map.borrow_mut().extend(entries);
                return Ok(left.clone());
            }
            _ => {}
        }

        if let Some(method) = self.lookup_special(left, op.inplace_dunder()) {
            let result = self.call_method(&method, left, vec![right.clone()])?;
            if !matches!(result, Val::NotImplemented) {
                return Ok(result);
            }
        }
        self.binary_op(op, left, right)
    }

    fn dunder_binary(&mut self, op: BinOp, left: &Val, right: &Val) -> ExecResult<Option<Val>> {
        if let Some(method) = self.lookup_special(left, op.dunder()) {
            let result = self.call_method(&method, left, vec![right.clone()])?;
            if !matches!(result, Val::NotImplemented) {
                return Ok(Some(result));
            }
        }
        if let Some(method) = self.lookup_special(right, op.reflected_dunder()) {
            let result = self.call_method(&method, right, vec![left.clone()])?;
            if !matches!(result, Val::NotImplemented) {
                return Ok(Some(result));
            }
        }
        Ok(None)
    }

    /// Operators on strings, sequences, sets and dicts
    fn container_op(&mut self, op: BinOp, left: &Val, right: &Val) -> ExecResult<Option<Val>> {
        let result = match (op, left, right) {
            (BinOp::Add, Val::Str(a), Val::Str(b)) => {
                check_sequence_len(a.len() + b.len())?;
                let mut s = String::with_capacity(a.len() + b.len());
                s.push_str(a);
                s.push_str(b);
                Val::str(&s)
            }
            (BinOp::Add, Val::List(a), Val::List(b)) => {
                let mut items = a.borrow().clone();
                items.extend(b.borrow().iter().cloned());
                check_sequence_len(items.len())?;
                Val::list(items)
            }
            (BinOp::Add, Val::Tuple(a), Val::Tuple(b)) => {
                let mut items = a.to_vec();
                items.extend(b.iter().cloned());
                check_sequence_len(items.len())?;
                Val::tuple(items)
            }
            (BinOp::Mul, seq, count) | (BinOp::Mul, count, seq)
                if is_sequence(seq) && count.is_int_like() =>
            {
                repeat_sequence(seq, count)?
            }
            (BinOp::Mod, Val::Str(fmt), args) => Val::str(&percent_format(self, fmt, args)?),
            (
                BinOp::BitOr | BinOp::BitAnd | BinOp::Sub | BinOp::BitXor,
                Val::Set(a),
                Val::Set(b),
            ) => Val::set(set_op(op, &a.borrow(), &b.borrow())),
            (BinOp::BitOr, Val::Dict(a), Val::Dict(b)) => {
                let mut merged = a.borrow().clone();
                let entries: Vec<_> = b
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                merged.extend(entries);
                Val::dict(merged)
            }
            _ => return Ok(None),
        };
        Ok(Some(result))
    }

    pub fn unary_op(&mut self, op: UnaryOp, value: &Val) -> ExecResult<Val> {
        let result = match (op, value) {
            (UnaryOp::Not, v) => Val::Bool(!self.truthy(v)?),
            (UnaryOp::Neg, Val::Int(n)) => match n.checked_neg() {
                Some(neg) => Val::Int(neg),
                None => Val::from_bigint(-BigInt::from(*n)),
            },
            (UnaryOp::Neg, Val::Bool(b)) => Val::Int(-(*b as i64)),
            (UnaryOp::Neg, Val::BigInt(n)) => Val::from_bigint(-n.as_ref().clone()),
            (UnaryOp::Neg, Val::Float(x)) => Val::Float(-x),
            (UnaryOp::Pos, Val::Bool(b)) => Val::Int(*b as i64),
            (UnaryOp::Pos, Val::Int(_) | Val::BigInt(_) | Val::Float(_)) => value.clone(),
            (UnaryOp::Invert, Val::Int(n)) => Val::Int(!n),
            (UnaryOp::Invert, Val::Bool(b)) => Val::Int(!(*b as i64)),
            (UnaryOp::Invert, Val::BigInt(n)) => {
                Val::from_bigint(-(n.as_ref() + BigInt::from(1)))
            }
            _ => {
                let (dunder, symbol) = match op {
                    UnaryOp::Neg => ("__neg__", "-"),
                    UnaryOp::Pos => ("__pos__", "+"),
                    UnaryOp::Invert => ("__invert__", "~"),
                    UnaryOp::Not => ("__bool__", "not"),
                };
                if let Some(method) = self.lookup_special(value, dunder) {
                    return self.call_method(&method, value, Vec::new());
                }
                return Err(Fault::type_error(format!(
                    "bad operand type for unary {}: '{}'",
                    symbol,
                    value.type_name()
                )));
            }
        };
        Ok(result)
    }
}

fn is_sequence(value: &Val) -> bool {
    matches!(value, Val::Str(_) | Val::List(_) | Val::Tuple(_))
}

fn check_sequence_len(len: usize) -> ExecResult<()> {
    if len > MAX_SEQUENCE_LEN {
        return Err(Fault::memory_error());
    }
    Ok(())
}

/// Repetition count of `seq * n`; negative counts repeat zero times
fn repeat_count(count: &Val, item_len: usize) -> ExecResult<usize> {
    let n = match count {
        Val::BigInt(n) if n.is_negative() => 0,
        Val::BigInt(_) => return Err(Fault::memory_error()),
        other => other.as_i64().unwrap_or(0).max(0) as usize,
    };
    if item_len > 0 {
        check_sequence_len(item_len.saturating_mul(n))?;
    }
    Ok(n)
}

fn repeat_items(items: &[Val], count: &Val) -> ExecResult<Vec<Val>> {
    let n = repeat_count(count, items.len())?;
    let mut out = Vec::with_capacity(items.len() * n);
    for _ in 0..n {
        out.extend(items.iter().cloned());
    }
    Ok(out)
}

fn repeat_sequence(seq: &Val, count: &Val) -> ExecResult<Val> {
    Ok(match seq {
        Val::Str(s) => {
            let n = repeat_count(count, s.len())?;
            Val::str(&s.repeat(n))
        }
        Val::List(items) => Val::list(repeat_items(&items.borrow(), count)?),
        Val::Tuple(items) => Val::tuple(repeat_items(items, count)?),
        other => other.clone(),
    })
}

pub(crate) fn set_op(op: BinOp, a: &SetMap, b: &SetMap) -> SetMap {
    match op {
        BinOp::BitOr => {
            let mut out = a.clone();
            for (k, v) in b {
                out.entry(k.clone()).or_insert_with(|| v.clone());
            }
            out
        }
        BinOp::BitAnd => a
            .iter()
            .filter(|(k, _)| b.contains_key(*k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        BinOp::Sub => a
            .iter()
            .filter(|(k, _)| !b.contains_key(*k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        _ => {
            let mut out: SetMap = a
                .iter()
                .filter(|(k, _)| !b.contains_key(*k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            for (k, v) in b {
                if !a.contains_key(k) {
                    out.insert(k.clone(), v.clone());
                }
            }
            out
        }
    }
}

fn binary_type_error(op: BinOp, left: &Val, right: &Val) -> Fault {
    if op == BinOp::Add {
        if let Val::Str(_) | Val::List(_) | Val::Tuple(_) = left {
            return Fault::type_error(format!(
                "can only concatenate {} (not \"{}\") to {}",
                left.type_name(),
                right.type_name(),
                left.type_name()
            ));
        }
    }
    if op == BinOp::Mul {
        let other = if is_sequence(left) {
            Some(right)
        } else if is_sequence(right) {
            Some(left)
        } else {
            None
        };
        if let Some(other) = other {
            return Fault::type_error(format!(
                "can't multiply sequence by non-int of type '{}'",
                other.type_name()
            ));
        }
    }
    Fault::type_error(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op.symbol(),
        left.type_name(),
        right.type_name()
    ))
}

/* ===================== Numeric Operations ===================== */

/// Convert a number to `f64`, failing for integers beyond the float range
pub fn to_f64(value: &Val) -> ExecResult<f64> {
    match value {
        Val::Float(x) => Ok(*x),
        Val::Int(n) => Ok(*n as f64),
        Val::Bool(b) => Ok(*b as i64 as f64),
        Val::BigInt(n) => match n.to_f64() {
            Some(x) if x.is_finite() => Ok(x),
            _ => Err(Fault::overflow("int too large to convert to float")),
        },
        other => Err(Fault::type_error(format!(
            "must be real number, not {}",
            other.type_name()
        ))),
    }
}

fn numeric_op(op: BinOp, a: &Val, b: &Val) -> ExecResult<Val> {
    if let (Val::Bool(x), Val::Bool(y)) = (a, b) {
        match op {
            BinOp::BitAnd => return Ok(Val::Bool(*x & *y)),
            BinOp::BitOr => return Ok(Val::Bool(*x | *y)),
            BinOp::BitXor => return Ok(Val::Bool(*x ^ *y)),
            _ => {}
        }
    }

    if matches!(a, Val::Float(_)) || matches!(b, Val::Float(_)) {
        if matches!(
            op,
            BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor | BinOp::LShift | BinOp::RShift
        ) {
            return Err(binary_type_error(op, a, b));
        }
        return float_op(op, to_f64(a)?, to_f64(b)?);
    }

    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if let Some(result) = small_int_op(op, x, y)? {
            return Ok(result);
        }
    }
    match (a.as_bigint(), b.as_bigint()) {
        (Some(x), Some(y)) => big_int_op(op, &x, &y),
        _ => Err(binary_type_error(op, a, b)),
    }
}

/// Fast path for 64-bit integers; `None` means the result needs a big integer
fn small_int_op(op: BinOp, x: i64, y: i64) -> ExecResult<Option<Val>> {
    Ok(match op {
        BinOp::Add => x.checked_add(y).map(Val::Int),
        BinOp::Sub => x.checked_sub(y).map(Val::Int),
        BinOp::Mul => x.checked_mul(y).map(Val::Int),
        BinOp::Div => {
            if y == 0 {
                return Err(Fault::zero_division("division by zero"));
            }
            Some(Val::Float(x as f64 / y as f64))
        }
        BinOp::FloorDiv => {
            if y == 0 {
                return Err(Fault::zero_division("integer division or modulo by zero"));
            }
            if x == i64::MIN && y == -1 {
                None
            } else {
                Some(Val::Int(x.div_floor(&y)))
            }
        }
        BinOp::Mod => {
            if y == 0 {
                return Err(Fault::zero_division("integer modulo by zero"));
            }
            if y == -1 {
                Some(Val::Int(0))
            } else {
                Some(Val::Int(x.mod_floor(&y)))
            }
        }
        BinOp::Pow => {
            if y < 0 {
                return float_op(op, x as f64, y as f64).map(Some);
            }
            u32::try_from(y)
                .ok()
                .and_then(|e| x.checked_pow(e))
                .map(Val::Int)
        }
        BinOp::LShift => {
            if y < 0 {
                return Err(Fault::value_error("negative shift count"));
            }
            if y < 63 && (x << y) >> y == x {
                Some(Val::Int(x << y))
            } else {
                None
            }
        }
        BinOp::RShift => {
            if y < 0 {
                return Err(Fault::value_error("negative shift count"));
            }
            Some(Val::Int(if y >= 64 {
                if x < 0 {
                    -1
                } else {
                    0
                }
            } else {
                x >> y
            }))
        }
        BinOp::BitAnd => Some(Val::Int(x & y)),
        BinOp::BitOr => Some(Val::Int(x | y)),
        BinOp::BitXor => Some(Val::Int(x ^ y)),
    })
}

fn big_int_op(op: BinOp, x: &BigInt, y: &BigInt) -> ExecResult<Val> {
    Ok(match op {
        BinOp::Add => Val::from_bigint(x + y),
        BinOp::Sub => Val::from_bigint(x - y),
        BinOp::Mul => {
            if x.bits() + y.bits() > MAX_INT_BITS {
                return Err(Fault::memory_error());
            }
            Val::from_bigint(x * y)
        }
        BinOp::Div => {
            if y.is_zero() {
                return Err(Fault::zero_division("division by zero"));
            }
            let result = x.to_f64().unwrap_or(f64::NAN) / y.to_f64().unwrap_or(f64::NAN);
            if !result.is_finite() {
                return Err(Fault::overflow(
                    "integer division result too large for a float",
                ));
            }
            Val::Float(result)
        }
        BinOp::FloorDiv => {
            if y.is_zero() {
                return Err(Fault::zero_division("integer division or modulo by zero"));
            }
            Val::from_bigint(x.div_floor(y))
        }
        BinOp::Mod => {
            if y.is_zero() {
                return Err(Fault::zero_division("integer modulo by zero"));
            }
            Val::from_bigint(x.mod_floor(y))
        }
        BinOp::Pow => {
            if y.is_negative() {
                let base = x
                    .to_f64()
                    .filter(|b| b.is_finite())
                    .ok_or_else(|| Fault::overflow("int too large to convert to float"))?;
                return float_op(op, base, y.to_f64().unwrap_or(f64::NEG_INFINITY));
            }
            big_pow(x, y)?
        }
        BinOp::LShift => {
            if y.is_negative() {
                return Err(Fault::value_error("negative shift count"));
            }
            let shift = y.to_u64().filter(|s| *s <= MAX_INT_BITS);
            match shift {
                Some(shift) if x.bits() + shift <= MAX_INT_BITS => {
                    Val::from_bigint(x << shift as usize)
                }
                _ if x.is_zero() => Val::Int(0),
                _ => return Err(Fault::memory_error()),
            }
        }
        BinOp::RShift => {
            if y.is_negative() {
                return Err(Fault::value_error("negative shift count"));
            }
            match y.to_u64().filter(|s| *s < x.bits() + 1) {
                Some(shift) => Val::from_bigint(x >> shift as usize),
                None => Val::Int(if x.is_negative() { -1 } else { 0 }),
            }
        }
        BinOp::BitAnd => Val::from_bigint(x & y),
        BinOp::BitOr => Val::from_bigint(x | y),
        BinOp::BitXor => Val::from_bigint(x ^ y),
    })
}

fn big_pow(base: &BigInt, exp: &BigInt) -> ExecResult<Val> {
    let one = BigInt::from(1);
    if base.is_zero() || *base == one {
        return Ok(Val::from_bigint(if exp.is_zero() { one } else { base.clone() }));
    }
    if *base == -one.clone() {
        return Ok(Val::Int(if exp.is_even() { 1 } else { -1 }));
    }
    let exp = exp
        .to_u32()
        .filter(|e| base.bits().saturating_mul(u64::from(*e)) <= MAX_INT_BITS)
        .ok_or_else(Fault::memory_error)?;
    Ok(Val::from_bigint(base.pow(exp)))
}

fn float_op(op: BinOp, x: f64, y: f64) -> ExecResult<Val> {
    Ok(Val::Float(match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => {
            if y == 0.0 {
                return Err(Fault::zero_division("float division by zero"));
            }
            x / y
        }
        BinOp::FloorDiv => {
            if y == 0.0 {
                return Err(Fault::zero_division("float floor division by zero"));
            }
            float_divmod(x, y).0
        }
        BinOp::Mod => {
            if y == 0.0 {
                return Err(Fault::zero_division("float modulo by zero"));
            }
            float_divmod(x, y).1
        }
        BinOp::Pow => float_pow(x, y)?,
        _ => {
            return Err(Fault::type_error(format!(
                "unsupported operand type(s) for {}: 'float' and 'float'",
                op.symbol()
            )))
        }
    }))
}

/// Floor division and modulo with the sign of the divisor
pub fn float_divmod(x: f64, y: f64) -> (f64, f64) {
    let mut rem = x % y;
    let mut div = (x - rem) / y;
    if rem != 0.0 {
        if (y < 0.0) != (rem < 0.0) {
            rem += y;
            div -= 1.0;
        }
    } else {
        rem = 0.0f64.copysign(y);
    }
    let floordiv = if div != 0.0 {
        let mut floor = div.floor();
        if div - floor > 0.5 {
            floor += 1.0;
        }
        floor
    } else {
        0.0f64.copysign(x / y)
    };
    (floordiv, rem)
}

pub fn float_pow(x: f64, y: f64) -> ExecResult<f64> {
    if x == 0.0 && y < 0.0 {
        return Err(Fault::zero_division(
            "0.0 cannot be raised to a negative power",
        ));
    }
    if x < 0.0 && y.is_finite() && y.fract() != 0.0 {
        return Err(Fault::value_error(
            "negative number cannot be raised to a fractional power",
        ));
    }
    let result = x.powf(y);
    if result.is_infinite() && x.is_finite() && y.is_finite() {
        return Err(Fault::overflow("(34, 'Numerical result out of range')"));
    }
    Ok(result)
}

/* ===================== Comparison ===================== */

/// `a is b`
pub fn is_same(a: &Val, b: &Val) -> bool {
    match (a, b) {
        (Val::None, Val::None)
        | (Val::NotImplemented, Val::NotImplemented)
        | (Val::Ellipsis, Val::Ellipsis) => true,
        (Val::Bool(x), Val::Bool(y)) => x == y,
        (Val::Int(x), Val::Int(y)) => x == y,
        (Val::Float(x), Val::Float(y)) => x.to_bits() == y.to_bits(),
        // String constants behave as interned
        (Val::Str(x), Val::Str(y)) => x == y,
        (Val::Range(x), Val::Range(y)) => x == y,
        _ => match (a.identity(), b.identity()) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
    }
}

fn numeric_eq(a: &Val, b: &Val) -> bool {
    match (a, b) {
        (Val::Float(x), Val::Float(y)) => x == y,
        (Val::Float(x), other) | (other, Val::Float(x)) => {
            if !x.is_finite() || x.fract() != 0.0 {
                return false;
            }
            match (BigInt::from_f64(*x), other.as_bigint()) {
                (Some(x), Some(y)) => x == y,
                _ => false,
            }
        }
        _ => match (a.as_i64(), b.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => a.as_bigint() == b.as_bigint(),
        },
    }
}

fn numeric_cmp(a: &Val, b: &Val) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return Some(x.cmp(&y));
    }
    if a.is_int_like() && b.is_int_like() {
        return Some(a.as_bigint()?.cmp(&b.as_bigint()?));
    }
    let lossy = |v: &Val| match v {
        Val::Float(x) => *x,
        Val::BigInt(n) => n.to_f64().unwrap_or(f64::NAN),
        other => other.as_i64().unwrap_or(0) as f64,
    };
    lossy(a).partial_cmp(&lossy(b))
}

fn ordering_holds(op: CmpOp, ord: Ordering) -> bool {
    match op {
        CmpOp::Lt => ord == Ordering::Less,
        CmpOp::LtE => ord != Ordering::Greater,
        CmpOp::Gt => ord == Ordering::Greater,
        _ => ord != Ordering::Less,
    }
}

impl VM {
    /// Evaluate one link of a comparison chain
    pub fn compare(&mut self, op: CmpOp, left: &Val, right: &Val) -> ExecResult<Val> {
        match op {
            CmpOp::Is => Ok(Val::Bool(is_same(left, right))),
            CmpOp::IsNot => Ok(Val::Bool(!is_same(left, right))),
            CmpOp::In => Ok(Val::Bool(self.contains(right, left)?)),
            CmpOp::NotIn => Ok(Val::Bool(!self.contains(right, left)?)),
            CmpOp::Eq => self.rich_eq(left, right),
            CmpOp::NotEq => self.rich_ne(left, right),
            CmpOp::Lt | CmpOp::LtE | CmpOp::Gt | CmpOp::GtE => self.rich_order(op, left, right),
        }
    }

    fn rich_eq(&mut self, left: &Val, right: &Val) -> ExecResult<Val> {
        if matches!(left, Val::Instance(_)) || matches!(right, Val::Instance(_)) {
            if let Some(result) = self.try_dunder(left, "__eq__", right)? {
                return Ok(result);
            }
            if let Some(result) = self.try_dunder(right, "__eq__", left)? {
                return Ok(result);
            }
            return Ok(Val::Bool(is_same(left, right)));
        }
        Ok(Val::Bool(self.eq(left, right)?))
    }

    fn rich_ne(&mut self, left: &Val, right: &Val) -> ExecResult<Val> {
        if matches!(left, Val::Instance(_)) || matches!(right, Val::Instance(_)) {
            if let Some(result) = self.try_dunder(left, "__ne__", right)? {
                return Ok(result);
            }
            if let Some(result) = self.try_dunder(right, "__ne__", left)? {
                return Ok(result);
            }
            let eq = self.rich_eq(left, right)?;
            return Ok(Val::Bool(!self.truthy(&eq)?));
        }
        Ok(Val::Bool(!self.eq(left, right)?))
    }

    /// Call a user dunder method, treating `NotImplemented` as absent
    fn try_dunder(&mut self, receiver: &Val, name: &str, other: &Val) -> ExecResult<Option<Val>> {
        let Some(method) = self.lookup_special(receiver, name) else {
            return Ok(None);
        };
        let result = self.call_method(&method, receiver, vec![other.clone()])?;
        Ok((!matches!(result, Val::NotImplemented)).then_some(result))
    }

    fn rich_order(&mut self, op: CmpOp, left: &Val, right: &Val) -> ExecResult<Val> {
        let (name, reflected) = match op {
            CmpOp::Lt => ("__lt__", "__gt__"),
            CmpOp::LtE => ("__le__", "__ge__"),
            CmpOp::Gt => ("__gt__", "__lt__"),
            _ => ("__ge__", "__le__"),
        };
        if let Some(result) = self.try_dunder(left, name, right)? {
            return Ok(result);
        }
        if let Some(result) = self.try_dunder(right, reflected, left)? {
            return Ok(result);
        }
        match self.builtin_order(op, left, right)? {
            Some(holds) => Ok(Val::Bool(holds)),
            None => Err(Fault::type_error(format!(
                "'{}' not supported between instances of '{}' and '{}'",
                op.symbol(),
                left.type_name(),
                right.type_name()
            ))),
        }
    }

    /// Ordering of built-in values; `None` when the types are unorderable
    fn builtin_order(&mut self, op: CmpOp, left: &Val, right: &Val) -> ExecResult<Option<bool>> {
        Ok(match (left, right) {
            _ if left.is_numeric() && right.is_numeric() => Some(match numeric_cmp(left, right) {
                Some(ord) => ordering_holds(op, ord),
                None => false,
            }),
            (Val::Str(a), Val::Str(b)) => Some(ordering_holds(op, a.cmp(b))),
            (Val::List(a), Val::List(b)) => {
                let (a, b) = (a.borrow().clone(), b.borrow().clone());
                Some(self.sequence_order(op, &a, &b)?)
            }
            (Val::Tuple(a), Val::Tuple(b)) => Some(self.sequence_order(op, a, b)?),
            (Val::Set(a), Val::Set(b)) => {
                let (a, b) = (a.borrow(), b.borrow());
                let a_in_b = a.keys().all(|k| b.contains_key(k));
                let b_in_a = b.keys().all(|k| a.contains_key(k));
                Some(match op {
                    CmpOp::Lt => a_in_b && a.len() < b.len(),
                    CmpOp::LtE => a_in_b,
                    CmpOp::Gt => b_in_a && a.len() > b.len(),
                    _ => b_in_a,
                })
            }
            _ => None,
        })
    }

    /// Lexicographic comparison: the first unequal pair decides
    fn sequence_order(&mut self, op: CmpOp, a: &[Val], b: &[Val]) -> ExecResult<bool> {
        for (x, y) in a.iter().zip(b.iter()) {
            if !self.eq(x, y)? {
                let result = self.compare(op, x, y)?;
                return self.truthy(&result);
            }
        }
        Ok(ordering_holds(op, a.len().cmp(&b.len())))
    }

    /// `a < b`, as used by sorting, `min` and `max`
    pub fn less_than(&mut self, a: &Val, b: &Val) -> ExecResult<bool> {
        let result = self.compare(CmpOp::Lt, a, b)?;
        self.truthy(&result)
    }

    /// Value equality as used by containers (`==`, `in`, `list.index`)
    pub fn eq(&mut self, a: &Val, b: &Val) -> ExecResult<bool> {
        if is_same(a, b) && !matches!(a, Val::Float(_)) {
            return Ok(true);
        }
        Ok(match (a, b) {
            (Val::Instance(_), _) | (_, Val::Instance(_)) => {
                let result = self.rich_eq(a, b)?;
                return self.truthy(&result);
            }
            _ if a.is_numeric() && b.is_numeric() => numeric_eq(a, b),
            (Val::Str(x), Val::Str(y)) => x == y,
            (Val::List(x), Val::List(y)) => {
                let (x, y) = (x.borrow().clone(), y.borrow().clone());
                self.sequence_eq(&x, &y)?
            }
            (Val::Tuple(x), Val::Tuple(y)) => self.sequence_eq(x, y)?,
            (Val::Dict(x), Val::Dict(y)) => {
                let (x, y) = (x.borrow().clone(), y.borrow().clone());
                if x.len() != y.len() {
                    return Ok(false);
                }
                for (key, (_, value)) in &x {
                    match y.get(key) {
                        Some((_, other)) => {
                            self.enter()?;
                            let equal = self.eq(value, other);
                            self.leave();
                            if !equal? {
                                return Ok(false);
                            }
                        }
                        None => return Ok(false),
                    }
                }
                true
            }
            (Val::Set(x), Val::Set(y)) => {
                let (x, y) = (x.borrow(), y.borrow());
                x.len() == y.len() && x.keys().all(|k| y.contains_key(k))
            }
            (Val::DictView(x), Val::DictView(y))
                if x.kind == ViewKind::Keys && y.kind == ViewKind::Keys =>
            {
                let (x, y) = (x.dict.borrow(), y.dict.borrow());
                x.len() == y.len() && x.keys().all(|k| y.contains_key(k))
            }
            (Val::Range(x), Val::Range(y)) => {
                let len = x.len();
                len == y.len() && (len == 0 || (x.start == y.start && (len == 1 || x.step == y.step)))
            }
            (Val::Slice(x), Val::Slice(y)) => {
                self.eq(&x.lower, &y.lower)?
                    && self.eq(&x.upper, &y.upper)?
                    && self.eq(&x.step, &y.step)?
            }
            (Val::BoundMethod(x), Val::BoundMethod(y)) => {
                is_same(&x.receiver, &y.receiver) && is_same(&x.func, &y.func)
            }
            _ => false,
        })
    }

    fn sequence_eq(&mut self, a: &[Val], b: &[Val]) -> ExecResult<bool> {
        if a.len() != b.len() {
            return Ok(false);
        }
        self.enter()?;
        let mut result = Ok(true);
        for (x, y) in a.iter().zip(b.iter()) {
            match self.eq(x, y) {
                Ok(true) => {}
                other => {
                    result = other;
                    break;
                }
            }
        }
        self.leave();
        result
    }
}

/* ===================== Membership ===================== */

impl VM {
    /// `item in container`
    pub fn contains(&mut self, container: &Val, item: &Val) -> ExecResult<bool> {
        match container {
            Val::Str(s) => match item {
                Val::Str(sub) => Ok(s.contains(&**sub)),
                other => Err(Fault::type_error(format!(
                    "'in <string>' requires string as left operand, not {}",
                    other.type_name()
                ))),
            },
            Val::List(items) => {
                let items = items.borrow().clone();
                self.any_eq(&items, item)
            }
            Val::Tuple(items) => {
                let items = items.clone();
                self.any_eq(&items, item)
            }
            Val::Dict(map) => {
                let key = self.hash_key(item)?;
                Ok(map.borrow().contains_key(&key))
            }
            Val::Set(set) => {
                let key = self.hash_key(item)?;
                Ok(set.borrow().contains_key(&key))
            }
            Val::Range(r) => Ok(match item {
                Val::Float(x) if x.fract() == 0.0 && x.abs() < 9.0e18 => r.contains(*x as i64),
                other => other.as_i64().is_some_and(|n| r.contains(n)),
            }),
            Val::DictView(view) => match view.kind {
                ViewKind::Keys => {
                    let key = self.hash_key(item)?;
                    Ok(view.dict.borrow().contains_key(&key))
                }
                ViewKind::Values => {
                    let values: Vec<Val> =
                        view.dict.borrow().values().map(|(_, v)| v.clone()).collect();
                    self.any_eq(&values, item)
                }
                ViewKind::Items => {
                    let Val::Tuple(pair) = item else {
                        return Ok(false);
                    };
                    if pair.len() != 2 {
                        return Ok(false);
                    }
                    let key = self.hash_key(&pair[0])?;
                    let value = view.dict.borrow().get(&key).map(|(_, v)| v.clone());
                    match value {
                        Some(value) => self.eq(&value, &pair[1]),
                        None => Ok(false),
                    }
                }
            },
            Val::Instance(_) => {
                if let Some(method) = self.lookup_special(container, "__contains__") {
                    let result = self.call_method(&method, container, vec![item.clone()])?;
                    return self.truthy(&result);
                }
                if self.lookup_special(container, "__iter__").is_some() {
                    let iter = self.get_iter(container)?;
                    return self.iter_contains(&iter, item);
                }
                Err(not_iterable_membership(container))
            }
            Val::Iterator(_) => self.iter_contains(container, item),
            other => Err(not_iterable_membership(other)),
        }
    }

    fn iter_contains(&mut self, iter: &Val, item: &Val) -> ExecResult<bool> {
        while let Some(next) = self.next_item(iter)? {
            if is_same(&next, item) || self.eq(&next, item)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn any_eq(&mut self, items: &[Val], item: &Val) -> ExecResult<bool> {
        for candidate in items {
            if is_same(candidate, item) || self.eq(candidate, item)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn not_iterable_membership(value: &Val) -> Fault {
    Fault::type_error(format!(
        "argument of type '{}' is not iterable",
        value.type_name()
    ))
}

/* ===================== Hashing ===================== */

fn float_key(x: f64) -> HashKey {
    if x.is_finite() && x.fract() == 0.0 {
        if x.abs() < 9.0e18 {
            return HashKey::Int(x as i64);
        }
        if let Some(n) = BigInt::from_f64(x) {
            return match n.to_i64() {
                Some(small) => HashKey::Int(small),
                None => HashKey::BigInt(n),
            };
        }
    }
    HashKey::Float(x.to_bits())
}

pub(crate) fn unhashable(value: &Val) -> Fault {
    Fault::type_error(format!("unhashable type: '{}'", value.type_name()))
}

impl VM {
    /// Dict / set key of a hashable value
    pub fn hash_key(&mut self, value: &Val) -> ExecResult<HashKey> {
        Ok(match value {
            Val::None => HashKey::None,
            Val::Bool(b) => HashKey::Int(*b as i64),
            Val::Int(n) => HashKey::Int(*n),
            Val::BigInt(n) => HashKey::BigInt(n.as_ref().clone()),
            Val::Float(x) => float_key(*x),
            Val::Str(s) => HashKey::Str(s.clone()),
            Val::Tuple(items) => {
                let mut keys = Vec::with_capacity(items.len());
                for item in items.iter() {
                    keys.push(self.hash_key(item)?);
                }
                HashKey::Tuple(keys)
            }
            Val::Range(r) => HashKey::Range(r.start, r.stop, r.step),
            Val::Ellipsis => HashKey::Singleton(0),
            Val::NotImplemented => HashKey::Singleton(1),
            Val::List(_) | Val::Dict(_) | Val::Set(_) | Val::Slice(_) | Val::DictView(_) => {
                return Err(unhashable(value))
            }
            Val::Instance(inst) => return self.instance_hash(inst, value),
            other => HashKey::Identity(other.identity().unwrap_or(0)),
        })
    }

    fn instance_hash(&mut self, inst: &Rc<Instance>, value: &Val) -> ExecResult<HashKey> {
        match inst.class.lookup_user("__hash__") {
            Some(Val::None) => Err(unhashable(value)),
            Some(method) => match self.call_method(&method, value, Vec::new())? {
                Val::Int(n) => Ok(HashKey::Int(n)),
                Val::Bool(b) => Ok(HashKey::Int(b as i64)),
                Val::BigInt(n) => Ok(HashKey::BigInt(n.as_ref().clone())),
                _ => Err(Fault::type_error(
                    "__hash__ method should return an integer",
                )),
            },
            // Defining __eq__ without __hash__ makes instances unhashable
            None if inst.class.lookup_user("__eq__").is_some() => Err(unhashable(value)),
            None => Ok(HashKey::Identity(Rc::as_ptr(inst) as usize)),
        }
    }

    /// Length as reported by `len()`
    pub fn len_of(&mut self, value: &Val) -> ExecResult<usize> {
        Ok(match value {
            Val::Str(s) => s.chars().count(),
            Val::List(items) => items.borrow().len(),
            Val::Tuple(items) => items.len(),
            Val::Dict(map) => map.borrow().len(),
            Val::Set(set) => set.borrow().len(),
            Val::Range(r) => r.len().max(0) as usize,
            Val::DictView(view) => view.dict.borrow().len(),
            Val::Instance(_) => {
                let Some(method) = self.lookup_special(value, "__len__") else {
                    return Err(no_len(value));
                };
                match self.call_method(&method, value, Vec::new())? {
                    Val::Int(n) if n >= 0 => n as usize,
                    Val::Bool(b) => b as usize,
                    Val::Int(_) => {
                        return Err(Fault::value_error("__len__() should return >= 0"))
                    }
                    other => {
                        return Err(Fault::type_error(format!(
                            "'{}' object cannot be interpreted as an integer",
                            other.type_name()
                        )))
                    }
                }
            }
            other => return Err(no_len(other)),
        })
    }
}

fn no_len(value: &Val) -> Fault {
    Fault::new(
        ExcKind::TypeError,
        format!("object of type '{}' has no len()", value.type_name()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_divmod_follows_divisor_sign() {
        assert_eq!(float_divmod(7.0, 2.0), (3.0, 1.0));
        assert_eq!(float_divmod(-7.0, 2.0), (-4.0, 1.0));
        assert_eq!(float_divmod(7.0, -2.0), (-4.0, -1.0));
    }

    #[test]
    fn test_small_int_overflow_promotes() {
        assert!(small_int_op(BinOp::Mul, i64::MAX, 2).unwrap().is_none());
        let big = numeric_op(BinOp::Mul, &Val::Int(i64::MAX), &Val::Int(2)).unwrap();
        assert!(matches!(big, Val::BigInt(_)));
    }

    #[test]
    fn test_numeric_keys_are_shared() {
        assert_eq!(float_key(1.0), HashKey::Int(1));
        assert_eq!(float_key(-0.0), HashKey::Int(0));
        assert_ne!(float_key(1.5), HashKey::Int(1));
    }

    #[test]
    fn test_huge_power_is_memory_error() {
        let result = numeric_op(BinOp::Pow, &Val::Int(10), &Val::Int(100_000_000));
        assert!(matches!(
            result,
            Err(Fault::Builtin {
                kind: ExcKind::MemoryError,
                ..
            })
        ));
    }
}
