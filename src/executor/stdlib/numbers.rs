//! `int` and `float` methods, plus the string parsing behind their constructors

use num_bigint::BigInt;
use num_traits::{FromPrimitive, Num, Signed, ToPrimitive, Zero};

use super::{receiver, CallArgs, NativeFn};
use crate::executor::errors::{ExecResult, Fault};
use crate::executor::repr::{str_repr, MAX_STR_DIGITS};
use crate::executor::types::values::Val;
use crate::executor::vm::VM;

/* ===================== Method Tables ===================== */

pub fn int_method(name: &str) -> Option<(&'static str, NativeFn)> {
    Some(match name {
        "bit_length" => ("bit_length", int_bit_length),
        "bit_count" => ("bit_count", int_bit_count),
        "conjugate" => ("conjugate", int_conjugate),
        "is_integer" => ("is_integer", int_is_integer),
        _ => return None,
    })
}

pub fn float_method(name: &str) -> Option<(&'static str, NativeFn)> {
    Some(match name {
        "is_integer" => ("is_integer", float_is_integer),
        "conjugate" => ("conjugate", float_conjugate),
        "as_integer_ratio" => ("as_integer_ratio", float_as_integer_ratio),
        _ => return None,
    })
}

fn int_receiver(args: &CallArgs, name: &str) -> ExecResult<BigInt> {
    args.arity(name, 1, 1)?;
    receiver(args)?
        .as_bigint()
        .ok_or_else(|| Fault::type_error(format!("descriptor '{}' requires an 'int' object", name)))
}

fn float_receiver(args: &CallArgs, name: &str) -> ExecResult<f64> {
    args.arity(name, 1, 1)?;
    match receiver(args)? {
        Val::Float(x) => Ok(*x),
        other => Err(Fault::type_error(format!(
            "descriptor '{}' for 'float' objects doesn't apply to a '{}' object",
            name,
            other.type_name()
        ))),
    }
}

/* ===================== int ===================== */

fn int_bit_length(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let n = int_receiver(&args, "bit_length")?;
    Ok(Val::Int(n.bits() as i64))
}

fn int_bit_count(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let n = int_receiver(&args, "bit_count")?;
    let ones: u64 = n
        .abs()
        .to_u64_digits()
        .1
        .iter()
        .map(|d| d.count_ones() as u64)
        .sum();
    Ok(Val::Int(ones as i64))
}

fn int_conjugate(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let n = int_receiver(&args, "conjugate")?;
    Ok(Val::from_bigint(n))
}

fn int_is_integer(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    int_receiver(&args, "is_integer")?;
    Ok(Val::Bool(true))
}

/* ===================== float ===================== */

fn float_is_integer(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let x = float_receiver(&args, "is_integer")?;
    Ok(Val::Bool(x.is_finite() && x.fract() == 0.0))
}

fn float_conjugate(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    Ok(Val::Float(float_receiver(&args, "conjugate")?))
}

fn float_as_integer_ratio(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let x = float_receiver(&args, "as_integer_ratio")?;
    if x.is_infinite() {
        return Err(Fault::overflow("cannot convert Infinity to integer ratio"));
    }
    if x.is_nan() {
        return Err(Fault::value_error("cannot convert NaN to integer ratio"));
    }
    let mut numerator = x;
    let mut denominator = BigInt::from(1);
    while numerator.fract() != 0.0 {
        numerator *= 2.0;
        denominator *= 2;
    }
    let numerator = BigInt::from_f64(numerator).unwrap_or_default();
    Ok(Val::tuple(vec![
        Val::from_bigint(numerator),
        Val::from_bigint(denominator),
    ]))
}

/* ===================== Conversions ===================== */

/// `int(x)` of a float: truncates toward zero
pub fn float_to_int(x: f64) -> ExecResult<Val> {
    if x.is_nan() {
        return Err(Fault::value_error("cannot convert float NaN to integer"));
    }
    if x.is_infinite() {
        return Err(Fault::overflow("cannot convert float infinity to integer"));
    }
    let truncated = x.trunc();
    if truncated.abs() < 9.0e18 {
        return Ok(Val::Int(truncated as i64));
    }
    Ok(Val::from_bigint(
        BigInt::from_f64(truncated).unwrap_or_default(),
    ))
}

/// Remove `_` separators, which are only allowed between digits
fn strip_underscores(digits: &str) -> Option<String> {
    if digits.starts_with('_') || digits.ends_with('_') || digits.contains("__") {
        return None;
    }
    Some(digits.replace('_', ""))
}

/// `int(text, base)`
pub fn parse_int(text: &str, base: u32) -> ExecResult<Val> {
    let invalid = || {
        Fault::value_error(format!(
            "invalid literal for int() with base {}: {}",
            base,
            str_repr(text)
        ))
    };
    let trimmed = text.trim();
    let (negative, body) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    let lower = body.to_ascii_lowercase();
    let (radix, digits, prefixed) = match (base, lower.get(..2)) {
        (0 | 16, Some("0x")) => (16, &body[2..], true),
        (0 | 8, Some("0o")) => (8, &body[2..], true),
        (0 | 2, Some("0b")) => (2, &body[2..], true),
        (0, _) => {
            // Base 0 forbids leading zeros on non-zero decimals
            if body.len() > 1 && body.starts_with('0') && body.chars().any(|c| c != '0' && c != '_') {
                return Err(invalid());
            }
            (10, body, false)
        }
        (radix, _) => (radix, body, false),
    };
    // One underscore may follow a base prefix
    let digits = match digits.strip_prefix('_') {
        Some(after) if prefixed => after,
        _ => digits,
    };
    let digits = strip_underscores(digits).ok_or_else(invalid)?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return Err(invalid());
    }
    if radix == 10 && digits.len() > MAX_STR_DIGITS {
        return Err(Fault::value_error(format!(
            "Exceeds the limit ({} digits) for integer string conversion: value has {} digits; use sys.set_int_max_str_digits() to increase the limit",
            MAX_STR_DIGITS,
            digits.len()
        )));
    }
    let magnitude = BigInt::from_str_radix(&digits, radix).map_err(|_| invalid())?;
    Ok(Val::from_bigint(if negative { -magnitude } else { magnitude }))
}

/// `float(text)`
pub fn parse_float(text: &str) -> ExecResult<f64> {
    let invalid = || {
        Fault::value_error(format!(
            "could not convert string to float: {}",
            str_repr(text)
        ))
    };
    let trimmed = text.trim();
    let (sign, body) = match trimmed.as_bytes().first() {
        Some(b'-') => (-1.0, &trimmed[1..]),
        Some(b'+') => (1.0, &trimmed[1..]),
        _ => (1.0, trimmed),
    };
    match body.to_ascii_lowercase().as_str() {
        "inf" | "infinity" => return Ok(sign * f64::INFINITY),
        "nan" => return Ok(f64::NAN),
        _ => {}
    }
    if body.is_empty()
        || !body
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-' | '_'))
    {
        return Err(invalid());
    }
    // Underscores must sit between digits
    let chars: Vec<char> = body.chars().collect();
    for (i, c) in chars.iter().enumerate() {
        if *c == '_' {
            let before = i > 0 && chars[i - 1].is_ascii_digit();
            let after = chars.get(i + 1).is_some_and(|c| c.is_ascii_digit());
            if !before || !after {
                return Err(invalid());
            }
        }
    }
    let cleaned = body.replace('_', "");
    cleaned
        .parse::<f64>()
        .map(|x| sign * x)
        .map_err(|_| invalid())
}

/// Integer argument accepted where Python calls `__index__`
pub fn index_arg(value: &Val, what: &str) -> ExecResult<BigInt> {
    value.as_bigint().ok_or_else(|| {
        Fault::type_error(format!(
            "'{}' object cannot be interpreted as an integer{}",
            value.type_name(),
            what
        ))
    })
}

/// Small integer argument, for counts and indices
pub fn small_index(value: &Val) -> ExecResult<i64> {
    let n = index_arg(value, "")?;
    n.to_i64().ok_or_else(|| {
        Fault::index_error("cannot fit 'int' into an index-sized integer")
    })
}

/// Round half to even, as `round(x)` does
pub fn round_half_even(x: f64) -> f64 {
    let rounded = x.round();
    if (x - x.trunc()).abs() == 0.5 {
        2.0 * (x / 2.0).round()
    } else {
        rounded
    }
}

/// `round(x, ndigits)` for floats, correctly rounded via the decimal text
pub fn round_float(x: f64, ndigits: i64) -> f64 {
    if !x.is_finite() || x == 0.0 {
        return x;
    }
    if ndigits > 308 {
        return x;
    }
    if ndigits < -308 {
        return 0.0f64.copysign(x);
    }
    if ndigits >= 0 {
        let text = format!("{:.*}", ndigits as usize, x);
        return text.parse().unwrap_or(x);
    }
    let factor = 10f64.powi((-ndigits) as i32);
    let y = round_half_even(x / factor) * factor;
    if y.is_finite() {
        y
    } else {
        x
    }
}

/// `round(n, ndigits)` for integers with a negative digit count
pub fn round_int(n: &BigInt, ndigits: i64) -> BigInt {
    if ndigits >= 0 {
        return n.clone();
    }
    let Some(exp) = u32::try_from(-ndigits).ok().filter(|e| *e < 10_000) else {
        return BigInt::zero();
    };
    let factor = BigInt::from(10).pow(exp);
    let twice = BigInt::from(2);
    let quotient = num_integer::Integer::div_floor(n, &factor);
    let remainder = n - &quotient * &factor;
    let doubled = &remainder * &twice;
    let rounded = if doubled > factor
        || (doubled == factor && num_integer::Integer::is_odd(&quotient))
    {
        quotient + 1
    } else {
        quotient
    };
    rounded * factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int_with_bases() {
        assert_eq!(parse_int("  42 ", 10).unwrap().as_i64(), Some(42));
        assert_eq!(parse_int("-1_000", 10).unwrap().as_i64(), Some(-1000));
        assert_eq!(parse_int("ff", 16).unwrap().as_i64(), Some(255));
        assert_eq!(parse_int("0x1F", 0).unwrap().as_i64(), Some(31));
        assert_eq!(parse_int("0b101", 2).unwrap().as_i64(), Some(5));
        assert_eq!(parse_int("z", 36).unwrap().as_i64(), Some(35));
    }

    #[test]
    fn test_parse_int_rejects_garbage() {
        assert!(parse_int("abc", 10).is_err());
        assert!(parse_int("", 10).is_err());
        assert!(parse_int("1__0", 10).is_err());
        assert!(parse_int("012", 0).is_err());
        assert!(parse_int("3.5", 10).is_err());
    }

    #[test]
    fn test_parse_float() {
        assert_eq!(parse_float(" 2.5 ").unwrap(), 2.5);
        assert_eq!(parse_float("1e3").unwrap(), 1000.0);
        assert_eq!(parse_float("-inf").unwrap(), f64::NEG_INFINITY);
        assert!(parse_float("1_0.5").is_ok());
        assert!(parse_float("abc").is_err());
        assert!(parse_float("_1").is_err());
    }

    #[test]
    fn test_round_half_even() {
        assert_eq!(round_half_even(2.5), 2.0);
        assert_eq!(round_half_even(3.5), 4.0);
        assert_eq!(round_half_even(-2.5), -2.0);
        assert_eq!(round_float(2.675, 2), 2.67);
        assert_eq!(round_int(&BigInt::from(1250), -2), BigInt::from(1200));
        assert_eq!(round_int(&BigInt::from(1350), -2), BigInt::from(1400));
    }

    #[test]
    fn test_float_to_int_truncates() {
        assert_eq!(float_to_int(-3.9).unwrap().as_i64(), Some(-3));
        assert!(float_to_int(f64::NAN).is_err());
    }
}
