//! `list` and `tuple` methods, and the sort shared with `sorted()`

use super::numbers::small_index;
use super::{named_args, receiver, CallArgs, NativeFn};
use crate::executor::errors::{ExecResult, Fault};
use crate::executor::operators::{is_same, MAX_SEQUENCE_LEN};
use crate::executor::subscript::slice_indices;
use crate::executor::types::values::{SliceObj, Val};
use crate::executor::vm::VM;

pub fn list_method(name: &str) -> Option<(&'static str, NativeFn)> {
    let entry: (&'static str, NativeFn) = match name {
        "append" => ("append", append),
        "extend" => ("extend", extend),
        "insert" => ("insert", insert),
        "pop" => ("pop", pop),
        "remove" => ("remove", remove),
        "index" => ("index", index),
        "count" => ("count", count),
        "sort" => ("sort", sort),
        "reverse" => ("reverse", reverse),
        "copy" => ("copy", copy),
        "clear" => ("clear", clear),
        _ => return None,
    };
    Some(entry)
}

pub fn tuple_method(name: &str) -> Option<(&'static str, NativeFn)> {
    let entry: (&'static str, NativeFn) = match name {
        "index" => ("index", index),
        "count" => ("count", count),
        _ => return None,
    };
    Some(entry)
}

/* ===================== Sorting ===================== */

/// Stable merge sort with a comparison that may fail
fn merge_sort(vm: &mut VM, items: Vec<(Val, Val)>) -> ExecResult<Vec<(Val, Val)>> {
    if items.len() <= 1 {
        return Ok(items);
    }
    let mut right = items;
    let left = right.drain(..right.len() / 2).collect::<Vec<_>>();
    let left = merge_sort(vm, left)?;
    let right = merge_sort(vm, right)?;

    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();
    while let (Some(l), Some(r)) = (left.peek(), right.peek()) {
        // Take from the right only when strictly smaller, keeping equal items in order
        if vm.less_than(&r.0, &l.0)? {
            out.extend(right.next());
        } else {
            out.extend(left.next());
        }
    }
    out.extend(left);
    out.extend(right);
    Ok(out)
}

/// Sort values by an optional key function; `reverse` keeps equal items stable
pub fn sort_values(vm: &mut VM, items: Vec<Val>, key: Option<&Val>, reverse: bool) -> ExecResult<Vec<Val>> {
    let mut keyed = Vec::with_capacity(items.len());
    for item in items {
        let k = match key {
            Some(func) if !func.is_none() => vm.call(func, vec![item.clone()])?,
            _ => item.clone(),
        };
        keyed.push((k, item));
    }
    if reverse {
        keyed.reverse();
    }
    let mut sorted = merge_sort(vm, keyed)?;
    if reverse {
        sorted.reverse();
    }
    Ok(sorted.into_iter().map(|(_, item)| item).collect())
}

/* ===================== list ===================== */

fn this_list(args: &CallArgs, name: &str) -> ExecResult<std::rc::Rc<std::cell::RefCell<Vec<Val>>>> {
    match receiver(args)? {
        Val::List(items) => Ok(items.clone()),
        other => Err(Fault::type_error(format!(
            "descriptor '{}' for 'list' objects doesn't apply to a '{}' object",
            name,
            other.type_name()
        ))),
    }
}

fn append(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let list = this_list(&args, "append")?;
    args.arity("list.append", 2, 2).map_err(|_| {
        Fault::type_error(format!(
            "list.append() takes exactly one argument ({} given)",
            args.len().saturating_sub(1)
        ))
    })?;
    let mut items = list.borrow_mut();
    if items.len() >= MAX_SEQUENCE_LEN {
        return Err(Fault::memory_error());
    }
    items.push(args.positional[1].clone());
    Ok(Val::None)
}

fn extend(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let list = this_list(&args, "extend")?;
    args.arity("extend", 2, 2)?;
    let extra = vm.collect(&args.positional[1])?;
    let mut items = list.borrow_mut();
    if items.len() + extra.len() > MAX_SEQUENCE_LEN {
        return Err(Fault::memory_error());
    }
    items.extend(extra);
    Ok(Val::None)
}

fn insert(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let list = this_list(&args, "insert")?;
    args.arity("insert", 3, 3)?;
    let at = small_index(&args.positional[1])?;
    let mut items = list.borrow_mut();
    let len = items.len() as i64;
    let at = if at < 0 { (at + len).max(0) } else { at.min(len) };
    items.insert(at as usize, args.positional[2].clone());
    Ok(Val::None)
}

fn pop(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let list = this_list(&args, "pop")?;
    args.arity("pop", 1, 2)?;
    let mut items = list.borrow_mut();
    if items.is_empty() {
        return Err(Fault::index_error("pop from empty list"));
    }
    let len = items.len() as i64;
    let at = match args.arg(1) {
        Some(index) => small_index(index)?,
        None => -1,
    };
    let at = if at < 0 { at + len } else { at };
    if at < 0 || at >= len {
        return Err(Fault::index_error("pop index out of range"));
    }
    Ok(items.remove(at as usize))
}

fn remove(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let list = this_list(&args, "remove")?;
    args.arity("remove", 2, 2)?;
    let target = &args.positional[1];
    let snapshot = list.borrow().clone();
    for (i, item) in snapshot.iter().enumerate() {
        if is_same(item, target) || vm.eq(item, target)? {
            let mut items = list.borrow_mut();
            if i < items.len() {
                items.remove(i);
            }
            return Ok(Val::None);
        }
    }
    Err(Fault::value_error("list.remove(x): x not in list"))
}

fn sort(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let list = this_list(&args, "sort")?;
    if args.len() > 1 {
        return Err(Fault::type_error(
            "sort() takes no positional arguments",
        ));
    }
    let params = named_args(args, "sort", &["key", "reverse"], 1)?;
    let reverse = match &params[1] {
        Some(value) => vm.truthy(value)?,
        None => false,
    };
    // The list appears empty while it is being sorted
    let items = std::mem::take(&mut *list.borrow_mut());
    let result = sort_values(vm, items.clone(), params[0].as_ref(), reverse);
    let mut current = list.borrow_mut();
    let modified = !current.is_empty();
    match result {
        Ok(sorted) => {
            *current = sorted;
            if modified {
                return Err(Fault::value_error("list modified during sort"));
            }
            Ok(Val::None)
        }
        Err(fault) => {
            *current = items;
            Err(fault)
        }
    }
}

fn reverse(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let list = this_list(&args, "reverse")?;
    args.arity("reverse", 1, 1)?;
    list.borrow_mut().reverse();
    Ok(Val::None)
}

fn copy(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let list = this_list(&args, "copy")?;
    args.arity("copy", 1, 1)?;
    let items = list.borrow().clone();
    Ok(Val::list(items))
}

fn clear(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let list = this_list(&args, "clear")?;
    args.arity("clear", 1, 1)?;
    list.borrow_mut().clear();
    Ok(Val::None)
}

/* ===================== Shared by list and tuple ===================== */

fn sequence_items(args: &CallArgs) -> ExecResult<(Vec<Val>, &'static str)> {
    match receiver(args)? {
        Val::List(items) => Ok((items.borrow().clone(), "list")),
        Val::Tuple(items) => Ok((items.to_vec(), "tuple")),
        other => Err(Fault::type_error(format!(
            "descriptor requires a 'list' or 'tuple' object but received a '{}'",
            other.type_name()
        ))),
    }
}

fn index(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let (items, kind) = sequence_items(&args)?;
    args.arity("index", 2, 4)?;
    let target = &args.positional[1];
    let bound = |v: Option<&Val>| -> ExecResult<Val> {
        match v {
            None => Ok(Val::None),
            Some(v) => Ok(Val::Int(small_index(v)?)),
        }
    };
    let slice = SliceObj {
        lower: bound(args.arg(2))?,
        upper: bound(args.arg(3))?,
        step: Val::None,
    };
    let (start, stop, _) = slice_indices(&slice, items.len())?;
    let (start, stop) = (start.max(0) as usize, stop.max(0) as usize);
    for (i, item) in items.iter().enumerate().take(stop).skip(start) {
        if is_same(item, target) || vm.eq(item, target)? {
            return Ok(Val::Int(i as i64));
        }
    }
    Err(Fault::value_error(match kind {
        "list" => format!("{} is not in list", vm.repr(target)?),
        _ => "tuple.index(x): x not in tuple".to_string(),
    }))
}

fn count(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let (items, _) = sequence_items(&args)?;
    args.arity("count", 2, 2)?;
    let target = &args.positional[1];
    let mut n = 0;
    for item in &items {
        if is_same(item, target) || vm.eq(item, target)? {
            n += 1;
        }
    }
    Ok(Val::Int(n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::vm::Limits;

    fn ints(values: &[Val]) -> Vec<i64> {
        values.iter().map(|v| v.as_i64().unwrap()).collect()
    }

    #[test]
    fn test_sort_values_is_stable_in_both_directions() {
        let mut vm = VM::new(Limits::default());
        let items = vec![
            Val::tuple(vec![Val::Int(1), Val::str("a")]),
            Val::tuple(vec![Val::Int(0), Val::str("b")]),
            Val::tuple(vec![Val::Int(1), Val::str("c")]),
        ];
        let key = super::super::native("first", |_vm, args| match &args.positional[0] {
            Val::Tuple(items) => Ok(items[0].clone()),
            _ => Ok(Val::None),
        });

        let sorted = sort_values(&mut vm, items.clone(), Some(&key), false).unwrap();
        let tags: Vec<&str> = sorted
            .iter()
            .map(|v| match v {
                Val::Tuple(t) => t[1].as_str().unwrap(),
                _ => "",
            })
            .collect();
        assert_eq!(tags, vec!["b", "a", "c"]);

        let sorted = sort_values(&mut vm, items, Some(&key), true).unwrap();
        let tags: Vec<&str> = sorted
            .iter()
            .map(|v| match v {
                Val::Tuple(t) => t[1].as_str().unwrap(),
                _ => "",
            })
            .collect();
        assert_eq!(tags, vec!["a", "c", "b"]);
    }

    #[test]
    fn test_sort_reports_incomparable_values() {
        let mut vm = VM::new(Limits::default());
        let items = vec![Val::Int(1), Val::str("x")];
        assert!(sort_values(&mut vm, items, None, false).is_err());
    }

    #[test]
    fn test_pop_and_insert_clamp_indices() {
        let mut vm = VM::new(Limits::default());
        let list = Val::list(vec![Val::Int(1), Val::Int(2)]);
        insert(&mut vm, CallArgs::new(vec![list.clone(), Val::Int(-10), Val::Int(0)])).unwrap();
        insert(&mut vm, CallArgs::new(vec![list.clone(), Val::Int(99), Val::Int(3)])).unwrap();
        let popped = pop(&mut vm, CallArgs::new(vec![list.clone()])).unwrap();
        assert_eq!(popped.as_i64(), Some(3));
        let Val::List(items) = &list else { unreachable!() };
        assert_eq!(ints(&items.borrow()), vec![0, 1, 2]);
    }
}
