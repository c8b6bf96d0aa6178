//! `dict` and `set` methods

use std::cell::RefCell;
use std::rc::Rc;

use super::{receiver, rest, CallArgs, NativeFn};
use crate::executor::errors::{ExcKind, ExecResult, Fault};
use crate::executor::operators::set_op;
use crate::executor::types::ast::BinOp;
use crate::executor::types::values::{DictMap, DictView, HashKey, SetMap, Val, ViewKind};
use crate::executor::vm::VM;

pub fn dict_method(name: &str) -> Option<(&'static str, NativeFn)> {
    let entry: (&'static str, NativeFn) = match name {
        "get" => ("get", get),
        "keys" => ("keys", keys),
        "values" => ("values", values),
        "items" => ("items", items),
        "pop" => ("pop", dict_pop),
        "popitem" => ("popitem", popitem),
        "update" => ("update", update),
        "setdefault" => ("setdefault", setdefault),
        "copy" => ("copy", dict_copy),
        "clear" => ("clear", dict_clear),
        _ => return None,
    };
    Some(entry)
}

pub fn set_method(name: &str) -> Option<(&'static str, NativeFn)> {
    let entry: (&'static str, NativeFn) = match name {
        "add" => ("add", add),
        "remove" => ("remove", set_remove),
        "discard" => ("discard", discard),
        "pop" => ("pop", set_pop),
        "union" => ("union", union),
        "intersection" => ("intersection", intersection),
        "difference" => ("difference", difference),
        "symmetric_difference" => ("symmetric_difference", symmetric_difference),
        "issubset" => ("issubset", issubset),
        "issuperset" => ("issuperset", issuperset),
        "isdisjoint" => ("isdisjoint", isdisjoint),
        "update" => ("update", set_update),
        "copy" => ("copy", set_copy),
        "clear" => ("clear", set_clear),
        _ => return None,
    };
    Some(entry)
}

/* ===================== Shared Builders ===================== */

/// Insert keeping the original key object of an existing entry
pub fn dict_set(map: &mut DictMap, key: HashKey, k: Val, v: Val) {
    match map.get_mut(&key) {
        Some(entry) => entry.1 = v,
        None => {
            map.insert(key, (k, v));
        }
    }
}

/// `dict.update(other)`: a mapping or an iterable of key/value pairs
pub fn dict_update(vm: &mut VM, map: &Rc<RefCell<DictMap>>, other: &Val) -> ExecResult<()> {
    if let Val::Dict(source) = other {
        let entries: Vec<_> = source
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let mut map = map.borrow_mut();
        for (key, (k, v)) in entries {
            dict_set(&mut map, key, k, v);
        }
        return Ok(());
    }
    if matches!(other, Val::Instance(_)) && vm.lookup_special(other, "keys").is_some() {
        let keys = vm.get_attr(other, "keys")?;
        let keys = vm.call(&keys, Vec::new())?;
        for k in vm.collect(&keys)? {
            let v = vm.get_item(other, &k)?;
            let key = vm.hash_key(&k)?;
            dict_set(&mut map.borrow_mut(), key, k, v);
        }
        return Ok(());
    }
    let elements = vm.collect(other).map_err(|fault| {
        if fault.matches(ExcKind::TypeError) {
            Fault::type_error(format!(
                "'{}' object is not iterable",
                other.type_name()
            ))
        } else {
            fault
        }
    })?;
    for (i, element) in elements.iter().enumerate() {
        let pair = vm.collect(element).map_err(|_| {
            Fault::type_error(format!(
                "cannot convert dictionary update sequence element #{} to a sequence",
                i
            ))
        })?;
        if pair.len() != 2 {
            return Err(Fault::value_error(format!(
                "dictionary update sequence element #{} has length {}; 2 is required",
                i,
                pair.len()
            )));
        }
        let key = vm.hash_key(&pair[0])?;
        dict_set(&mut map.borrow_mut(), key, pair[0].clone(), pair[1].clone());
    }
    Ok(())
}

/// Elements of an iterable as set storage
pub fn set_from(vm: &mut VM, iterable: &Val) -> ExecResult<SetMap> {
    if let Val::Set(set) = iterable {
        return Ok(set.borrow().clone());
    }
    let mut out = SetMap::new();
    for item in vm.collect(iterable)? {
        let key = vm.hash_key(&item)?;
        out.entry(key).or_insert(item);
    }
    Ok(out)
}

/* ===================== dict ===================== */

fn this_dict(args: &CallArgs, name: &str) -> ExecResult<Rc<RefCell<DictMap>>> {
    match receiver(args)? {
        Val::Dict(map) => Ok(map.clone()),
        other => Err(Fault::type_error(format!(
            "descriptor '{}' for 'dict' objects doesn't apply to a '{}' object",
            name,
            other.type_name()
        ))),
    }
}

fn get(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let map = this_dict(&args, "get")?;
    args.arity("get", 2, 3)?;
    let key = vm.hash_key(&args.positional[1])?;
    let found = map.borrow().get(&key).map(|(_, v)| v.clone());
    Ok(found.unwrap_or_else(|| args.arg(2).cloned().unwrap_or(Val::None)))
}

fn view(args: &CallArgs, name: &str, kind: ViewKind) -> ExecResult<Val> {
    let dict = this_dict(args, name)?;
    args.arity(name, 1, 1)?;
    Ok(Val::DictView(Rc::new(DictView { dict, kind })))
}

fn keys(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    view(&args, "keys", ViewKind::Keys)
}

fn values(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    view(&args, "values", ViewKind::Values)
}

fn items(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    view(&args, "items", ViewKind::Items)
}

fn dict_pop(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let map = this_dict(&args, "pop")?;
    args.arity("pop", 2, 3)?;
    let key = vm.hash_key(&args.positional[1])?;
    let removed = map.borrow_mut().shift_remove(&key);
    match (removed, args.arg(2)) {
        (Some((_, v)), _) => Ok(v),
        (None, Some(default)) => Ok(default.clone()),
        (None, None) => Err(Fault::key_error(args.positional[1].clone())),
    }
}

fn popitem(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let map = this_dict(&args, "popitem")?;
    args.arity("popitem", 1, 1)?;
    let last = map.borrow_mut().pop();
    match last {
        Some((_, (k, v))) => Ok(Val::tuple(vec![k, v])),
        None => Err(Fault::new(
            ExcKind::KeyError,
            "popitem(): dictionary is empty",
        )),
    }
}

fn update(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let map = this_dict(&args, "update")?;
    if args.len() > 2 {
        return Err(Fault::type_error(format!(
            "update expected at most 1 argument, got {}",
            args.len() - 1
        )));
    }
    if let Some(other) = args.arg(1) {
        dict_update(vm, &map, other)?;
    }
    for (name, value) in args.keywords {
        let k = Val::str(&name);
        let key = vm.hash_key(&k)?;
        dict_set(&mut map.borrow_mut(), key, k, value);
    }
    Ok(Val::None)
}

fn setdefault(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let map = this_dict(&args, "setdefault")?;
    args.arity("setdefault", 2, 3)?;
    let k = args.positional[1].clone();
    let key = vm.hash_key(&k)?;
    let mut map = map.borrow_mut();
    if let Some((_, v)) = map.get(&key) {
        return Ok(v.clone());
    }
    let default = args.arg(2).cloned().unwrap_or(Val::None);
    map.insert(key, (k, default.clone()));
    Ok(default)
}

fn dict_copy(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let map = this_dict(&args, "copy")?;
    args.arity("copy", 1, 1)?;
    let copied = map.borrow().clone();
    Ok(Val::dict(copied))
}

fn dict_clear(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let map = this_dict(&args, "clear")?;
    args.arity("clear", 1, 1)?;
    map.borrow_mut().clear();
    Ok(Val::None)
}

/* ===================== set ===================== */

fn this_set(args: &CallArgs, name: &str) -> ExecResult<Rc<RefCell<SetMap>>> {
    match receiver(args)? {
        Val::Set(set) => Ok(set.clone()),
        other => Err(Fault::type_error(format!(
            "descriptor '{}' for 'set' objects doesn't apply to a '{}' object",
            name,
            other.type_name()
        ))),
    }
}

fn add(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let set = this_set(&args, "add")?;
    args.arity("add", 2, 2)?;
    let item = args.positional[1].clone();
    let key = vm.hash_key(&item)?;
    set.borrow_mut().entry(key).or_insert(item);
    Ok(Val::None)
}

fn set_remove(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let set = this_set(&args, "remove")?;
    args.arity("remove", 2, 2)?;
    let key = vm.hash_key(&args.positional[1])?;
    let removed = set.borrow_mut().shift_remove(&key);
    match removed {
        Some(_) => Ok(Val::None),
        None => Err(Fault::key_error(args.positional[1].clone())),
    }
}

fn discard(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let set = this_set(&args, "discard")?;
    args.arity("discard", 2, 2)?;
    let key = vm.hash_key(&args.positional[1])?;
    set.borrow_mut().shift_remove(&key);
    Ok(Val::None)
}

fn set_pop(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let set = this_set(&args, "pop")?;
    args.arity("pop", 1, 1)?;
    let first = set.borrow_mut().shift_remove_index(0);
    match first {
        Some((_, item)) => Ok(item),
        None => Err(Fault::new(ExcKind::KeyError, "pop from an empty set")),
    }
}

/// Fold every argument into the receiver with a set operator
fn combine(vm: &mut VM, args: &CallArgs, name: &str, op: BinOp) -> ExecResult<SetMap> {
    let set = this_set(args, name)?;
    args.no_keywords(&format!("set.{}", name))?;
    let mut acc = set.borrow().clone();
    for other in rest(args) {
        let other = set_from(vm, other)?;
        acc = set_op(op, &acc, &other);
    }
    Ok(acc)
}

fn union(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    Ok(Val::set(combine(vm, &args, "union", BinOp::BitOr)?))
}

fn intersection(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    Ok(Val::set(combine(vm, &args, "intersection", BinOp::BitAnd)?))
}

fn difference(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    Ok(Val::set(combine(vm, &args, "difference", BinOp::Sub)?))
}

fn symmetric_difference(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    args.arity("symmetric_difference", 2, 2)?;
    Ok(Val::set(combine(vm, &args, "symmetric_difference", BinOp::BitXor)?))
}

fn set_update(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let set = this_set(&args, "update")?;
    let merged = combine(vm, &args, "update", BinOp::BitOr)?;
    *set.borrow_mut() = merged;
    Ok(Val::None)
}

fn relation(vm: &mut VM, args: &CallArgs, name: &str) -> ExecResult<(SetMap, SetMap)> {
    let set = this_set(args, name)?;
    args.arity(name, 2, 2)?;
    let other = set_from(vm, &args.positional[1])?;
    let this = set.borrow().clone();
    Ok((this, other))
}

fn issubset(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let (this, other) = relation(vm, &args, "issubset")?;
    Ok(Val::Bool(this.keys().all(|k| other.contains_key(k))))
}

fn issuperset(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let (this, other) = relation(vm, &args, "issuperset")?;
    Ok(Val::Bool(other.keys().all(|k| this.contains_key(k))))
}

fn isdisjoint(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let (this, other) = relation(vm, &args, "isdisjoint")?;
    Ok(Val::Bool(!this.keys().any(|k| other.contains_key(k))))
}

fn set_copy(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let set = this_set(&args, "copy")?;
    args.arity("copy", 1, 1)?;
    let copied = set.borrow().clone();
    Ok(Val::set(copied))
}

fn set_clear(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let set = this_set(&args, "clear")?;
    args.arity("clear", 1, 1)?;
    set.borrow_mut().clear();
    Ok(Val::None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::vm::Limits;

    #[test]
    fn test_update_from_pairs_keeps_first_key_object() {
        let mut vm = VM::new(Limits::default());
        let map = Rc::new(RefCell::new(DictMap::new()));
        let pairs = Val::list(vec![
            Val::tuple(vec![Val::Int(1), Val::str("a")]),
            Val::tuple(vec![Val::Float(1.0), Val::str("b")]),
        ]);
        dict_update(&mut vm, &map, &pairs).unwrap();
        let map = map.borrow();
        assert_eq!(map.len(), 1);
        let (k, v) = map.values().next().unwrap();
        assert!(matches!(k, Val::Int(1)));
        assert_eq!(v.as_str(), Some("b"));
    }

    #[test]
    fn test_update_rejects_bad_pairs() {
        let mut vm = VM::new(Limits::default());
        let map = Rc::new(RefCell::new(DictMap::new()));
        let pairs = Val::list(vec![Val::tuple(vec![Val::Int(1)])]);
        assert!(dict_update(&mut vm, &map, &pairs).is_err());
    }

    #[test]
    fn test_set_methods_accept_any_iterable() {
        let mut vm = VM::new(Limits::default());
        let set = Val::set(set_from(&mut vm, &Val::list(vec![Val::Int(1), Val::Int(2)])).unwrap());
        let other = Val::list(vec![Val::Int(2), Val::Int(3)]);
        let result = union(&mut vm, CallArgs::new(vec![set.clone(), other.clone()])).unwrap();
        let Val::Set(result) = result else { unreachable!() };
        assert_eq!(result.borrow().len(), 3);

        let result = intersection(&mut vm, CallArgs::new(vec![set, other])).unwrap();
        let Val::Set(result) = result else { unreachable!() };
        assert_eq!(result.borrow().len(), 1);
    }
}
