//! The `math` module

use indexmap::IndexMap;
use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{One, Signed, ToPrimitive, Zero};

use super::numbers::{float_to_int, index_arg};
use super::{native, CallArgs, NativeFn};
use crate::executor::errors::{ExecResult, Fault};
use crate::executor::operators::{to_f64, MAX_INT_BITS};
use crate::executor::types::values::Val;
use crate::executor::vm::VM;

const FUNCTIONS: &[(&str, NativeFn)] = &[
    ("sqrt", sqrt),
    ("floor", floor),
    ("ceil", ceil),
    ("trunc", trunc),
    ("fabs", fabs),
    ("factorial", factorial),
    ("gcd", gcd),
    ("lcm", lcm),
    ("isqrt", isqrt),
    ("comb", comb),
    ("perm", perm),
    ("log", log),
    ("log2", log2),
    ("log10", log10),
    ("exp", exp),
    ("pow", pow),
    ("sin", sin),
    ("cos", cos),
    ("tan", tan),
    ("asin", asin),
    ("acos", acos),
    ("atan", atan),
    ("atan2", atan2),
    ("hypot", hypot),
    ("degrees", degrees),
    ("radians", radians),
    ("copysign", copysign),
    ("isclose", isclose),
    ("isfinite", isfinite),
    ("isinf", isinf),
    ("isnan", isnan),
    ("fsum", fsum),
    ("prod", prod),
];

/// Attributes of a freshly imported `math` module
pub fn module() -> IndexMap<String, Val> {
    let mut attrs = IndexMap::new();
    attrs.insert("pi".to_string(), Val::Float(std::f64::consts::PI));
    attrs.insert("e".to_string(), Val::Float(std::f64::consts::E));
    attrs.insert("tau".to_string(), Val::Float(std::f64::consts::TAU));
    attrs.insert("inf".to_string(), Val::Float(f64::INFINITY));
    attrs.insert("nan".to_string(), Val::Float(f64::NAN));
    for &(name, func) in FUNCTIONS {
        attrs.insert(name.to_string(), native(name, func));
    }
    attrs
}

fn domain_error() -> Fault {
    Fault::value_error("math domain error")
}

fn range_error() -> Fault {
    Fault::overflow("math range error")
}

fn one_float(args: &CallArgs, name: &str) -> ExecResult<f64> {
    args.no_keywords(name)?;
    args.arity(name, 1, 1).map_err(|_| {
        Fault::type_error(format!(
            "math.{}() takes exactly one argument ({} given)",
            name,
            args.len()
        ))
    })?;
    to_f64(&args.positional[0])
}

fn two_floats(args: &CallArgs, name: &str) -> ExecResult<(f64, f64)> {
    args.no_keywords(name)?;
    if args.len() != 2 {
        return Err(Fault::type_error(format!(
            "{} expected 2 arguments, got {}",
            name,
            args.len()
        )));
    }
    Ok((to_f64(&args.positional[0])?, to_f64(&args.positional[1])?))
}

/// Apply `f`, mapping NaN from a finite input to a domain error and an
/// infinite result from a finite input to a range error
fn checked(x: f64, result: f64) -> ExecResult<Val> {
    if result.is_nan() && !x.is_nan() {
        return Err(domain_error());
    }
    if result.is_infinite() && x.is_finite() {
        return Err(range_error());
    }
    Ok(Val::Float(result))
}

/* ===================== Rounding ===================== */

fn integral(args: &CallArgs, name: &str, round: fn(f64) -> f64) -> ExecResult<Val> {
    args.arity(name, 1, 1)?;
    match &args.positional[0] {
        Val::Bool(b) => Ok(Val::Int(*b as i64)),
        v @ (Val::Int(_) | Val::BigInt(_)) => Ok(v.clone()),
        Val::Float(x) => float_to_int(round(*x)),
        other => Err(Fault::type_error(format!(
            "must be real number, not {}",
            other.type_name()
        ))),
    }
}

fn floor(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    integral(&args, "floor", f64::floor)
}

fn ceil(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    integral(&args, "ceil", f64::ceil)
}

fn trunc(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    integral(&args, "trunc", f64::trunc)
}

fn fabs(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    Ok(Val::Float(one_float(&args, "fabs")?.abs()))
}

/* ===================== Integer Functions ===================== */

fn check_bits(n: &BigInt) -> ExecResult<()> {
    if n.bits() > MAX_INT_BITS {
        return Err(Fault::memory_error());
    }
    Ok(())
}

fn factorial(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    args.arity("factorial", 1, 1)?;
    if let Val::Float(_) = args.positional[0] {
        return Err(Fault::type_error(
            "'float' object cannot be interpreted as an integer",
        ));
    }
    let n = index_arg(&args.positional[0], "factorial")?;
    if n.is_negative() {
        return Err(Fault::value_error(
            "factorial() not defined for negative values",
        ));
    }
    let n = n
        .to_u64()
        .ok_or_else(|| Fault::overflow("factorial() argument should not exceed 9223372036854775807"))?;
    let mut acc = BigInt::one();
    for k in 2..=n {
        acc *= k;
        if k % 256 == 0 {
            vm.check_deadline()?;
            check_bits(&acc)?;
        }
    }
    check_bits(&acc)?;
    Ok(Val::from_bigint(acc))
}

fn gcd(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    args.no_keywords("gcd")?;
    let mut acc = BigInt::zero();
    for value in &args.positional {
        acc = acc.gcd(&index_arg(value, "gcd")?);
    }
    Ok(Val::from_bigint(acc))
}

fn lcm(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    args.no_keywords("lcm")?;
    let mut acc = BigInt::one();
    for value in &args.positional {
        let n = index_arg(value, "lcm")?;
        if n.is_zero() {
            return Ok(Val::Int(0));
        }
        acc = acc.lcm(&n);
        check_bits(&acc)?;
    }
    Ok(Val::from_bigint(acc))
}

fn isqrt(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    args.arity("isqrt", 1, 1)?;
    let n = index_arg(&args.positional[0], "isqrt")?;
    if n.is_negative() {
        return Err(Fault::value_error(
            "isqrt() argument must be nonnegative",
        ));
    }
    Ok(Val::from_bigint(n.sqrt()))
}

fn counting_args(args: &CallArgs, name: &str) -> ExecResult<(BigInt, Option<BigInt>)> {
    args.no_keywords(name)?;
    args.arity(name, 1, 2)?;
    let n = index_arg(&args.positional[0], name)?;
    let k = match args.arg(1) {
        Some(Val::None) | None => None,
        Some(v) => Some(index_arg(v, name)?),
    };
    if n.is_negative() {
        return Err(Fault::value_error("n must be a non-negative integer"));
    }
    if k.as_ref().is_some_and(|k| k.is_negative()) {
        return Err(Fault::value_error("k must be a non-negative integer"));
    }
    Ok((n, k))
}

/// n * (n-1) * ... * (n-k+1)
fn falling(vm: &mut VM, n: &BigInt, k: u64) -> ExecResult<BigInt> {
    let mut acc = BigInt::one();
    let mut term = n.clone();
    for i in 0..k {
        acc *= &term;
        term -= 1u32;
        if i % 256 == 255 {
            vm.check_deadline()?;
            check_bits(&acc)?;
        }
    }
    check_bits(&acc)?;
    Ok(acc)
}

fn comb(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    if args.len() != 2 {
        return Err(Fault::type_error(format!(
            "comb expected 2 arguments, got {}",
            args.len()
        )));
    }
    let (n, k) = counting_args(&args, "comb")?;
    let k = k.unwrap_or_default();
    if k > n {
        return Ok(Val::Int(0));
    }
    let k = std::cmp::min(k.clone(), &n - &k);
    let k = k.to_u64().ok_or_else(|| Fault::overflow("min(n - k, k) must not exceed 9223372036854775807"))?;
    let mut den = BigInt::one();
    for i in 2..=k {
        den *= i;
    }
    Ok(Val::from_bigint(falling(vm, &n, k)? / den))
}

fn perm(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let (n, k) = counting_args(&args, "perm")?;
    let k = k.unwrap_or_else(|| n.clone());
    if k > n {
        return Ok(Val::Int(0));
    }
    let k = k.to_u64().ok_or_else(|| Fault::overflow("k must not exceed 9223372036854775807"))?;
    Ok(Val::from_bigint(falling(vm, &n, k)?))
}

/* ===================== Exponents and Logarithms ===================== */

fn sqrt(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let x = one_float(&args, "sqrt")?;
    if x < 0.0 {
        return Err(domain_error());
    }
    Ok(Val::Float(x.sqrt()))
}

/// Natural log of a number, exact for integers too large for a float
fn ln(value: &Val) -> ExecResult<f64> {
    if let Val::BigInt(n) = value {
        if n.is_positive() {
            let bits = n.bits();
            if bits > 1000 {
                let shift = bits - 64;
                let top = (n.as_ref() >> shift).to_f64().unwrap_or(f64::NAN);
                return Ok(top.ln() + shift as f64 * std::f64::consts::LN_2);
            }
        }
    }
    let x = to_f64(value)?;
    if x <= 0.0 {
        return Err(domain_error());
    }
    Ok(x.ln())
}

fn log(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    args.no_keywords("log")?;
    args.arity("log", 1, 2)?;
    let x = ln(&args.positional[0])?;
    match args.arg(1) {
        None => Ok(Val::Float(x)),
        Some(base) => {
            let b = ln(base)?;
            if b == 0.0 {
                return Err(Fault::zero_division("float division by zero"));
            }
            Ok(Val::Float(x / b))
        }
    }
}

fn log2(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    args.arity("log2", 1, 1)?;
    match &args.positional[0] {
        Val::Float(x) if *x > 0.0 => Ok(Val::Float(x.log2())),
        other => Ok(Val::Float(ln(other)? / std::f64::consts::LN_2)),
    }
}

fn log10(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    args.arity("log10", 1, 1)?;
    match &args.positional[0] {
        Val::Float(x) if *x > 0.0 => Ok(Val::Float(x.log10())),
        Val::Int(n) if *n > 0 => Ok(Val::Float((*n as f64).log10())),
        other => Ok(Val::Float(ln(other)? / std::f64::consts::LN_10)),
    }
}

fn exp(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let x = one_float(&args, "exp")?;
    checked(x, x.exp())
}

fn pow(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let (x, y) = two_floats(&args, "pow")?;
    if x == 0.0 && y < 0.0 {
        return Err(domain_error());
    }
    if x < 0.0 && y.is_finite() && y.fract() != 0.0 {
        return Err(domain_error());
    }
    let result = x.powf(y);
    if result.is_infinite() && x.is_finite() && y.is_finite() {
        return Err(range_error());
    }
    Ok(Val::Float(result))
}

/* ===================== Trigonometry ===================== */

fn unary(args: CallArgs, name: &str, f: fn(f64) -> f64) -> ExecResult<Val> {
    let x = one_float(&args, name)?;
    if x.is_infinite() && matches!(name, "sin" | "cos" | "tan") {
        return Err(domain_error());
    }
    checked(x, f(x))
}

fn sin(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    unary(args, "sin", f64::sin)
}

fn cos(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    unary(args, "cos", f64::cos)
}

fn tan(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    unary(args, "tan", f64::tan)
}

fn asin(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    unary(args, "asin", f64::asin)
}

fn acos(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    unary(args, "acos", f64::acos)
}

fn atan(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    unary(args, "atan", f64::atan)
}

fn degrees(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    unary(args, "degrees", f64::to_degrees)
}

fn radians(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    unary(args, "radians", f64::to_radians)
}

fn atan2(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let (y, x) = two_floats(&args, "atan2")?;
    Ok(Val::Float(y.atan2(x)))
}

fn hypot(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    args.no_keywords("hypot")?;
    let mut acc = 0.0f64;
    for value in &args.positional {
        acc = acc.hypot(to_f64(value)?);
    }
    Ok(Val::Float(acc))
}

fn copysign(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let (x, y) = two_floats(&args, "copysign")?;
    Ok(Val::Float(x.copysign(y)))
}

/* ===================== Classification ===================== */

fn isfinite(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    Ok(Val::Bool(one_float(&args, "isfinite")?.is_finite()))
}

fn isinf(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    Ok(Val::Bool(one_float(&args, "isinf")?.is_infinite()))
}

fn isnan(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    Ok(Val::Bool(one_float(&args, "isnan")?.is_nan()))
}

fn isclose(_vm: &mut VM, mut args: CallArgs) -> ExecResult<Val> {
    let rel_tol = match args.take_keyword("rel_tol") {
        Some(v) => to_f64(&v)?,
        None => 1e-9,
    };
    let abs_tol = match args.take_keyword("abs_tol") {
        Some(v) => to_f64(&v)?,
        None => 0.0,
    };
    let (a, b) = two_floats(&args, "isclose")?;
    if rel_tol < 0.0 || abs_tol < 0.0 {
        return Err(Fault::value_error("tolerances must be non-negative"));
    }
    if a == b {
        return Ok(Val::Bool(true));
    }
    if a.is_infinite() || b.is_infinite() {
        return Ok(Val::Bool(false));
    }
    let diff = (b - a).abs();
    Ok(Val::Bool(
        diff <= (rel_tol * b).abs() || diff <= (rel_tol * a).abs() || diff <= abs_tol,
    ))
}

/* ===================== Sums and Products ===================== */

/// Exactly rounded sum using Shewchuk's partials
fn fsum(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    args.arity("fsum", 1, 1)?;
    let items = vm.collect(&args.positional[0])?;
    let mut partials: Vec<f64> = Vec::new();
    let mut special = 0.0f64;
    for item in &items {
        let mut x = to_f64(item)?;
        if !x.is_finite() {
            special += x;
            continue;
        }
        let mut kept = 0;
        for i in 0..partials.len() {
            let mut y = partials[i];
            if x.abs() < y.abs() {
                std::mem::swap(&mut x, &mut y);
            }
            let hi = x + y;
            let lo = y - (hi - x);
            if lo != 0.0 {
                partials[kept] = lo;
                kept += 1;
            }
            x = hi;
        }
        partials.truncate(kept);
        partials.push(x);
    }
    if special != 0.0 || special.is_nan() {
        return Ok(Val::Float(special));
    }
    let mut total = 0.0;
    while let Some(p) = partials.pop() {
        let prev = total;
        total += p;
        let lo = p - (total - prev);
        if lo != 0.0 {
            partials.push(lo);
            let rest: f64 = partials.drain(..).sum();
            total += rest;
            break;
        }
    }
    Ok(Val::Float(total))
}

fn prod(vm: &mut VM, mut args: CallArgs) -> ExecResult<Val> {
    let start = args.take_keyword("start").unwrap_or(Val::Int(1));
    args.no_keywords("prod")?;
    args.arity("prod", 1, 1)?;
    let items = vm.collect(&args.positional[0])?;
    let mut acc = start;
    for item in &items {
        acc = vm.binary_op(crate::executor::types::ast::BinOp::Mul, &acc, item)?;
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::vm::Limits;

    fn call(name: &str, args: Vec<Val>) -> ExecResult<Val> {
        let mut vm = VM::new(Limits::default());
        let func = FUNCTIONS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, f)| *f)
            .unwrap();
        func(&mut vm, CallArgs::new(args))
    }

    #[test]
    fn test_integer_functions() {
        assert_eq!(call("factorial", vec![Val::Int(5)]).unwrap().as_i64(), Some(120));
        assert_eq!(call("gcd", vec![Val::Int(12), Val::Int(18)]).unwrap().as_i64(), Some(6));
        assert_eq!(call("lcm", vec![Val::Int(4), Val::Int(6)]).unwrap().as_i64(), Some(12));
        assert_eq!(call("isqrt", vec![Val::Int(17)]).unwrap().as_i64(), Some(4));
        assert_eq!(call("comb", vec![Val::Int(5), Val::Int(2)]).unwrap().as_i64(), Some(10));
        assert_eq!(call("perm", vec![Val::Int(5), Val::Int(2)]).unwrap().as_i64(), Some(20));
        assert!(call("factorial", vec![Val::Int(-1)]).is_err());
    }

    #[test]
    fn test_domain_errors() {
        let err = call("sqrt", vec![Val::Int(-1)]).unwrap_err();
        assert!(err.matches(crate::executor::errors::ExcKind::ValueError));
        assert!(call("log", vec![Val::Int(0)]).is_err());
    }

    #[test]
    fn test_floor_ceil_return_ints() {
        assert_eq!(call("floor", vec![Val::Float(-2.5)]).unwrap().as_i64(), Some(-3));
        assert_eq!(call("ceil", vec![Val::Float(2.1)]).unwrap().as_i64(), Some(3));
        assert_eq!(call("trunc", vec![Val::Float(-2.9)]).unwrap().as_i64(), Some(-2));
    }

    #[test]
    fn test_fsum_is_exact() {
        let items = Val::list(vec![Val::Float(0.1); 10]);
        match call("fsum", vec![items]).unwrap() {
            Val::Float(x) => assert_eq!(x, 1.0),
            other => panic!("unexpected {:?}", other),
        }
    }
}
