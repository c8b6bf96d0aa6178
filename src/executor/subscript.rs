//! Subscription: `obj[index]`, slices, item assignment and deletion

use num_traits::Signed;

use super::errors::{ExecResult, Fault};
use super::types::values::{RangeObj, SliceObj, Val};
use super::vm::VM;

/* ===================== Index Helpers ===================== */

fn slice_int(value: &Val) -> ExecResult<i64> {
    match value {
        Val::Int(n) => Ok(*n),
        Val::Bool(b) => Ok(*b as i64),
        Val::BigInt(n) => Ok(if n.is_negative() { i64::MIN } else { i64::MAX }),
        _ => Err(Fault::type_error(
            "slice indices must be integers or None or have an __index__ method",
        )),
    }
}

/// Resolve a slice against a sequence length into `(start, stop, step)`
pub fn slice_indices(slice: &SliceObj, len: usize) -> ExecResult<(i64, i64, i64)> {
    let step = match &slice.step {
        Val::None => 1,
        other => slice_int(other)?,
    };
    if step == 0 {
        return Err(Fault::value_error("slice step cannot be zero"));
    }
    let len = len as i64;
    let clamp = |v: i64| -> i64 {
        if v < 0 {
            let v = v.saturating_add(len);
            if v < 0 {
                if step < 0 {
                    -1
                } else {
                    0
                }
            } else {
                v
            }
        } else if v >= len {
            if step < 0 {
                len - 1
            } else {
                len
            }
        } else {
            v
        }
    };
    let start = match &slice.lower {
        Val::None if step < 0 => len - 1,
        Val::None => 0,
        other => clamp(slice_int(other)?),
    };
    let stop = match &slice.upper {
        Val::None if step < 0 => -1,
        Val::None => len,
        other => clamp(slice_int(other)?),
    };
    Ok((start, stop, step))
}

/// Positions selected by a slice, in order
pub fn slice_positions(slice: &SliceObj, len: usize) -> ExecResult<Vec<usize>> {
    let (start, stop, step) = slice_indices(slice, len)?;
    let mut out = Vec::new();
    let mut i = start;
    if step > 0 {
        while i < stop {
            out.push(i as usize);
            i += step;
        }
    } else {
        while i > stop {
            out.push(i as usize);
            i += step;
        }
    }
    Ok(out)
}

/// Normalise a (possibly negative) sequence index
fn seq_index(index: &Val, len: usize, what: &str) -> ExecResult<usize> {
    let i = match index {
        Val::Int(n) => *n,
        Val::Bool(b) => *b as i64,
        Val::BigInt(_) => {
            return Err(Fault::index_error(
                "cannot fit 'int' into an index-sized integer",
            ))
        }
        other => {
            return Err(Fault::type_error(match what {
                "string" => format!("string indices must be integers, not '{}'", other.type_name()),
                _ => format!(
                    "{} indices must be integers or slices, not {}",
                    what,
                    other.type_name()
                ),
            }))
        }
    };
    let len = len as i64;
    let adjusted = if i < 0 { i + len } else { i };
    if adjusted < 0 || adjusted >= len {
        let message = match what {
            "range" => "range object index out of range".to_string(),
            _ => format!("{} index out of range", what),
        };
        return Err(Fault::index_error(message));
    }
    Ok(adjusted as usize)
}

fn not_subscriptable(value: &Val) -> Fault {
    match value {
        Val::Class(cls) => Fault::type_error(format!("type '{}' is not subscriptable", cls.name)),
        other => Fault::type_error(format!(
            "'{}' object is not subscriptable",
            other.type_name()
        )),
    }
}

/* ===================== Item Access ===================== */

impl VM {
    /// `obj[index]`
    pub fn get_item(&mut self, obj: &Val, index: &Val) -> ExecResult<Val> {
        match obj {
            Val::List(items) => {
                let items = items.borrow();
                if let Val::Slice(slice) = index {
                    let positions = slice_positions(slice, items.len())?;
                    return Ok(Val::list(positions.iter().map(|i| items[*i].clone()).collect()));
                }
                let i = seq_index(index, items.len(), "list")?;
                Ok(items[i].clone())
            }
            Val::Tuple(items) => {
                if let Val::Slice(slice) = index {
                    let positions = slice_positions(slice, items.len())?;
                    return Ok(Val::tuple(positions.iter().map(|i| items[*i].clone()).collect()));
                }
                let i = seq_index(index, items.len(), "tuple")?;
                Ok(items[i].clone())
            }
            Val::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                if let Val::Slice(slice) = index {
                    let positions = slice_positions(slice, chars.len())?;
                    let text: String = positions.iter().map(|i| chars[*i]).collect();
                    return Ok(Val::str(&text));
                }
                let i = seq_index(index, chars.len(), "string")?;
                Ok(Val::str(chars[i].encode_utf8(&mut [0; 4])))
            }
            Val::Range(r) => {
                let len = r.len().max(0) as usize;
                if let Val::Slice(slice) = index {
                    let (start, stop, step) = slice_indices(slice, len)?;
                    return Ok(Val::Range(RangeObj {
                        start: r.get(start),
                        stop: r.get(stop),
                        step: r.step * step,
                    }));
                }
                let i = seq_index(index, len, "range")?;
                Ok(Val::Int(r.get(i as i64)))
            }
            Val::Dict(map) => {
                let key = self.hash_key(index)?;
                let value = map.borrow().get(&key).map(|(_, v)| v.clone());
                value.ok_or_else(|| Fault::key_error(index.clone()))
            }
            Val::Instance(_) => match self.lookup_special(obj, "__getitem__") {
                Some(method) => self.call_method(&method, obj, vec![index.clone()]),
                None => Err(not_subscriptable(obj)),
            },
            other => Err(not_subscriptable(other)),
        }
    }

    /// `obj[index] = value`
    pub fn set_item(&mut self, obj: &Val, index: &Val, value: Val) -> ExecResult<()> {
        match obj {
            Val::List(items) => {
                if let Val::Slice(slice) = index {
                    let replacement = self.collect(&value)?;
                    return assign_slice(&mut items.borrow_mut(), slice, replacement);
                }
                let mut items = items.borrow_mut();
                let i = seq_index(index, items.len(), "list")
                    .map_err(|_| list_assignment_error(index))?;
                items[i] = value;
                Ok(())
            }
            Val::Dict(map) => {
                let key = self.hash_key(index)?;
                let mut map = map.borrow_mut();
                match map.get_mut(&key) {
                    Some(entry) => entry.1 = value,
                    None => {
                        map.insert(key, (index.clone(), value));
                    }
                }
                Ok(())
            }
            Val::Instance(_) => match self.lookup_special(obj, "__setitem__") {
                Some(method) => {
                    self.call_method(&method, obj, vec![index.clone(), value])?;
                    Ok(())
                }
                None => Err(no_item_assignment(obj)),
            },
            other => Err(no_item_assignment(other)),
        }
    }

    /// `del obj[index]`
    pub fn del_item(&mut self, obj: &Val, index: &Val) -> ExecResult<()> {
        match obj {
            Val::List(items) => {
                let mut items = items.borrow_mut();
                if let Val::Slice(slice) = index {
                    let mut positions = slice_positions(slice, items.len())?;
                    positions.sort_unstable_by(|a, b| b.cmp(a));
                    for i in positions {
                        items.remove(i);
                    }
                    return Ok(());
                }
                let i = seq_index(index, items.len(), "list")
                    .map_err(|_| list_assignment_error(index))?;
                items.remove(i);
                Ok(())
            }
            Val::Dict(map) => {
                let key = self.hash_key(index)?;
                match map.borrow_mut().shift_remove(&key) {
                    Some(_) => Ok(()),
                    None => Err(Fault::key_error(index.clone())),
                }
            }
            Val::Instance(_) => match self.lookup_special(obj, "__delitem__") {
                Some(method) => {
                    self.call_method(&method, obj, vec![index.clone()])?;
                    Ok(())
                }
                None => Err(Fault::type_error(format!(
                    "'{}' object doesn't support item deletion",
                    obj.type_name()
                ))),
            },
            other => Err(Fault::type_error(format!(
                "'{}' object doesn't support item deletion",
                other.type_name()
            ))),
        }
    }
}

fn assign_slice(items: &mut Vec<Val>, slice: &SliceObj, replacement: Vec<Val>) -> ExecResult<()> {
    let (start, stop, step) = slice_indices(slice, items.len())?;
    if step == 1 {
        let start = start.max(0) as usize;
        let stop = (stop.max(0) as usize).max(start);
        items.splice(start..stop, replacement);
        return Ok(());
    }
    let positions = slice_positions(slice, items.len())?;
    if positions.len() != replacement.len() {
        return Err(Fault::value_error(format!(
            "attempt to assign sequence of size {} to extended slice of size {}",
            replacement.len(),
            positions.len()
        )));
    }
    for (i, value) in positions.into_iter().zip(replacement) {
        items[i] = value;
    }
    Ok(())
}

fn list_assignment_error(index: &Val) -> Fault {
    if index.is_int_like() {
        Fault::index_error("list assignment index out of range")
    } else {
        Fault::type_error(format!(
            "list indices must be integers or slices, not {}",
            index.type_name()
        ))
    }
}

fn no_item_assignment(value: &Val) -> Fault {
    Fault::type_error(format!(
        "'{}' object does not support item assignment",
        value.type_name()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slice(lower: Val, upper: Val, step: Val) -> SliceObj {
        SliceObj { lower, upper, step }
    }

    #[test]
    fn test_slice_positions_forward_and_backward() {
        let s = slice(Val::Int(1), Val::None, Val::Int(2));
        assert_eq!(slice_positions(&s, 6).unwrap(), vec![1, 3, 5]);

        let s = slice(Val::None, Val::None, Val::Int(-1));
        assert_eq!(slice_positions(&s, 3).unwrap(), vec![2, 1, 0]);
    }

    #[test]
    fn test_slice_bounds_are_clamped() {
        let s = slice(Val::Int(-100), Val::Int(100), Val::None);
        assert_eq!(slice_indices(&s, 4).unwrap(), (0, 4, 1));
    }

    #[test]
    fn test_zero_step_is_rejected() {
        let s = slice(Val::None, Val::None, Val::Int(0));
        assert!(slice_indices(&s, 4).is_err());
    }

    #[test]
    fn test_extended_slice_assignment_size_mismatch() {
        let mut items = vec![Val::Int(0), Val::Int(1), Val::Int(2), Val::Int(3)];
        let s = slice(Val::None, Val::None, Val::Int(2));
        assert!(assign_slice(&mut items, &s, vec![Val::Int(9)]).is_err());
        assert!(assign_slice(&mut items, &s, vec![Val::Int(8), Val::Int(9)]).is_ok());
        assert_eq!(items[2].as_i64(), Some(9));
    }
}
