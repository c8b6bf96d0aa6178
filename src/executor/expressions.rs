//! Expression evaluation and assignment targets
//!
//! Expressions are evaluated recursively; they never record steps. Anything
//! that runs user statements (a call, a class body) goes through a nested
//! `run_until_done` on the frame stack.

use indexmap::IndexMap;
use num_bigint::BigInt;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use super::errors::{ExecResult, Fault};
use super::operators::MAX_SEQUENCE_LEN;
use super::repr::ascii_escape;
use super::stdlib::{format::format_value, CallArgs};
use super::types::ast::{
    Argument, BinOp, BoolOp, Comprehension, DictItem, FStringPart, FunctionDef, Target, UnaryOp,
};
use super::types::values::{
    Binder, DictMap, Function, HashKey, IterObj, IterState, Scope, SetMap, SliceObj,
};
use super::types::{Expr, Val};
use super::vm::{Activation, ScopeKind, VM};

/* ===================== Expressions ===================== */

pub fn eval_expr(vm: &mut VM, expr: &Expr) -> ExecResult<Val> {
    match expr {
        Expr::LitNone { .. } => Ok(Val::None),
        Expr::LitBool { v, .. } => Ok(Val::Bool(*v)),
        Expr::LitInt { v, .. } => Ok(Val::Int(*v)),
        Expr::LitBigInt { digits, .. } => digits
            .parse::<BigInt>()
            .map(Val::from_bigint)
            .map_err(|_| Fault::value_error(format!("invalid integer literal: {}", digits))),
        Expr::LitFloat { v, .. } => Ok(Val::Float(*v)),
        Expr::LitStr { v, .. } => Ok(Val::str(v)),
        Expr::LitEllipsis { .. } => Ok(Val::Ellipsis),
        Expr::FString { parts, .. } => Ok(Val::str(&eval_fstring(vm, parts)?)),

        Expr::Name { name, .. } => vm.load_name(name),

        Expr::List { elements, .. } => Ok(Val::list(eval_elements(vm, elements)?)),
        Expr::Tuple { elements, .. } => Ok(Val::tuple(eval_elements(vm, elements)?)),
        Expr::Set { elements, .. } => {
            let items = eval_elements(vm, elements)?;
            let mut set = SetMap::new();
            for item in items {
                let key = vm.hash_key(&item)?;
                set.entry(key).or_insert(item);
            }
            Ok(Val::set(set))
        }
        Expr::Dict { items, .. } => eval_dict(vm, items),
        Expr::Starred { .. } => Err(Fault::type_error("can't use starred expression here")),

        Expr::ListComp {
            element,
            generators,
            ..
        } => {
            let mut out = Vec::new();
            run_comprehension(vm, generators, &mut |vm: &mut VM| {
                out.push(eval_expr(vm, element)?);
                check_growth(out.len())
            })?;
            Ok(Val::list(out))
        }
        Expr::SetComp {
            element,
            generators,
            ..
        } => {
            let mut out = SetMap::new();
            run_comprehension(vm, generators, &mut |vm: &mut VM| {
                let item = eval_expr(vm, element)?;
                let key = vm.hash_key(&item)?;
                out.entry(key).or_insert(item);
                check_growth(out.len())
            })?;
            Ok(Val::set(out))
        }
        Expr::GeneratorExp {
            element,
            generators,
            ..
        } => {
            let mut items = Vec::new();
            run_comprehension(vm, generators, &mut |vm: &mut VM| {
                items.push(eval_expr(vm, element)?);
                check_growth(items.len())
            })?;
            Ok(IterObj::new("generator", IterState::Items { items, idx: 0 }))
        }
        Expr::DictComp {
            key,
            value,
            generators,
            ..
        } => {
            let mut out = DictMap::new();
            run_comprehension(vm, generators, &mut |vm: &mut VM| {
                let k = eval_expr(vm, key)?;
                let v = eval_expr(vm, value)?;
                dict_insert(vm, &mut out, k, v)?;
                check_growth(out.len())
            })?;
            Ok(Val::dict(out))
        }

        Expr::Attribute { object, attr, .. } => {
            let obj = eval_expr(vm, object)?;
            vm.get_attr(&obj, attr)
        }
        Expr::Subscript { object, index, .. } => {
            let obj = eval_expr(vm, object)?;
            let index = eval_expr(vm, index)?;
            vm.get_item(&obj, &index)
        }
        Expr::Slice {
            lower, upper, step, ..
        } => {
            let mut bound = |part: &Option<Box<Expr>>| -> ExecResult<Val> {
                match part {
                    Some(expr) => eval_expr(vm, expr),
                    None => Ok(Val::None),
                }
            };
            let lower = bound(lower)?;
            let upper = bound(upper)?;
            let step = bound(step)?;
            Ok(Val::Slice(Rc::new(SliceObj { lower, upper, step })))
        }

        Expr::Call { callee, args, .. } => {
            let func = eval_expr(vm, callee)?;
            let args = eval_arguments(vm, &func, args)?;
            vm.call_with(&func, args)
        }

        Expr::BinaryOp {
            op, left, right, ..
        } => {
            let left = eval_expr(vm, left)?;
            let right = eval_expr(vm, right)?;
            vm.binary_op(*op, &left, &right)
        }
        Expr::UnaryOp { op, operand, .. } => {
            let value = eval_expr(vm, operand)?;
            match op {
                UnaryOp::Not => Ok(Val::Bool(!vm.truthy(&value)?)),
                _ => vm.unary_op(*op, &value),
            }
        }
        Expr::LogicalOp {
            op, left, right, ..
        } => {
            let left = eval_expr(vm, left)?;
            let truth = vm.truthy(&left)?;
            match (op, truth) {
                (BoolOp::And, false) | (BoolOp::Or, true) => Ok(left),
                _ => eval_expr(vm, right),
            }
        }
        Expr::Compare { left, ops, .. } => {
            let mut left = eval_expr(vm, left)?;
            let mut result = Val::Bool(true);
            for (i, (op, right)) in ops.iter().enumerate() {
                let right = eval_expr(vm, right)?;
                result = vm.compare(*op, &left, &right)?;
                if i + 1 < ops.len() && !vm.truthy(&result)? {
                    return Ok(result);
                }
                left = right;
            }
            Ok(result)
        }
        Expr::Ternary {
            condition,
            consequent,
            alternate,
            ..
        } => {
            let condition = eval_expr(vm, condition)?;
            if vm.truthy(&condition)? {
                eval_expr(vm, consequent)
            } else {
                eval_expr(vm, alternate)
            }
        }
        Expr::Lambda { def, .. } => make_function(vm, def),
    }
}

fn check_growth(len: usize) -> ExecResult<()> {
    if len > MAX_SEQUENCE_LEN {
        return Err(Fault::memory_error());
    }
    Ok(())
}

/// Whether `iter()` would accept the value
fn is_iterable(vm: &VM, value: &Val) -> bool {
    match value {
        Val::List(_)
        | Val::Tuple(_)
        | Val::Str(_)
        | Val::Range(_)
        | Val::Dict(_)
        | Val::DictView(_)
        | Val::Set(_)
        | Val::Iterator(_) => true,
        Val::Instance(_) => {
            vm.lookup_special(value, "__iter__").is_some()
                || vm.lookup_special(value, "__getitem__").is_some()
        }
        _ => false,
    }
}

/// Elements of a display, expanding `*iterable` items
fn eval_elements(vm: &mut VM, elements: &[Expr]) -> ExecResult<Vec<Val>> {
    let mut out = Vec::with_capacity(elements.len());
    for element in elements {
        match element {
            Expr::Starred { inner, .. } => {
                let value = eval_expr(vm, inner)?;
                if !is_iterable(vm, &value) {
                    return Err(Fault::type_error(format!(
                        "Value after * must be an iterable, not {}",
                        value.type_name()
                    )));
                }
                out.extend(vm.collect(&value)?);
            }
            other => out.push(eval_expr(vm, other)?),
        }
    }
    Ok(out)
}

/// Insert keeping the first key object seen for equal keys
fn dict_insert(vm: &mut VM, map: &mut DictMap, key: Val, value: Val) -> ExecResult<()> {
    let hash = vm.hash_key(&key)?;
    match map.get_mut(&hash) {
        Some(entry) => entry.1 = value,
        None => {
            map.insert(hash, (key, value));
        }
    }
    Ok(())
}

fn eval_dict(vm: &mut VM, items: &[DictItem]) -> ExecResult<Val> {
    let mut map = DictMap::new();
    for item in items {
        match item {
            DictItem::Pair { key, value } => {
                let key = eval_expr(vm, key)?;
                let value = eval_expr(vm, value)?;
                dict_insert(vm, &mut map, key, value)?;
            }
            DictItem::Unpack { value } => {
                let source = eval_expr(vm, value)?;
                let Val::Dict(other) = &source else {
                    return Err(Fault::type_error(format!(
                        "'{}' object is not a mapping",
                        source.type_name()
                    )));
                };
                let entries: Vec<(HashKey, (Val, Val))> = other
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                for (hash, (key, value)) in entries {
                    match map.get_mut(&hash) {
                        Some(entry) => entry.1 = value,
                        None => {
                            map.insert(hash, (key, value));
                        }
                    }
                }
            }
        }
    }
    Ok(Val::dict(map))
}

fn eval_fstring(vm: &mut VM, parts: &[FStringPart]) -> ExecResult<String> {
    let mut out = String::new();
    for part in parts {
        match part {
            FStringPart::Literal { v } => out.push_str(v),
            FStringPart::Field {
                expr,
                conversion,
                spec,
                debug_text,
            } => {
                if let Some(text) = debug_text {
                    out.push_str(text);
                }
                let value = eval_expr(vm, expr)?;
                let value = match conversion {
                    Some('r') => Val::str(&vm.repr(&value)?),
                    Some('s') => Val::str(&vm.to_str(&value)?),
                    Some('a') => Val::str(&ascii_escape(&vm.repr(&value)?)),
                    _ => value,
                };
                let spec = eval_fstring(vm, spec)?;
                out.push_str(&format_value(vm, &value, &spec)?);
            }
        }
    }
    Ok(out)
}

/* ===================== Calls ===================== */

/// Name used for a callee in argument errors
fn callee_name(func: &Val) -> String {
    match func {
        Val::Function(f) => f.qualname.clone(),
        Val::Builtin(b) => b.name.to_string(),
        Val::Class(c) => c.name.clone(),
        Val::BoundMethod(m) => callee_name(&m.func),
        other => other.type_name(),
    }
}

fn eval_arguments(vm: &mut VM, func: &Val, args: &[Argument]) -> ExecResult<CallArgs> {
    let mut out = CallArgs::default();
    let repeated = |name: &str| {
        Fault::type_error(format!(
            "{}() got multiple values for keyword argument '{}'",
            callee_name(func),
            name
        ))
    };

    for arg in args {
        match arg {
            Argument::Positional { value } => out.positional.push(eval_expr(vm, value)?),
            Argument::Star { value } => {
                let value = eval_expr(vm, value)?;
                if !is_iterable(vm, &value) {
                    return Err(Fault::type_error(format!(
                        "{}() argument after * must be an iterable, not {}",
                        callee_name(func),
                        value.type_name()
                    )));
                }
                out.positional.extend(vm.collect(&value)?);
            }
            Argument::Keyword { name, value } => {
                if out.keywords.iter().any(|(k, _)| k == name) {
                    return Err(repeated(name));
                }
                let value = eval_expr(vm, value)?;
                out.keywords.push((name.clone(), value));
            }
            Argument::DoubleStar { value } => {
                let value = eval_expr(vm, value)?;
                let Val::Dict(map) = &value else {
                    return Err(Fault::type_error(format!(
                        "{}() argument after ** must be a mapping, not {}",
                        callee_name(func),
                        value.type_name()
                    )));
                };
                let entries: Vec<(Val, Val)> = map.borrow().values().cloned().collect();
                for (key, value) in entries {
                    let Val::Str(name) = key else {
                        return Err(Fault::type_error("keywords must be strings"));
                    };
                    if out.keywords.iter().any(|(k, _)| **k == *name) {
                        return Err(repeated(&*name));
                    }
                    out.keywords.push((name.to_string(), value));
                }
            }
        }
    }
    Ok(out)
}

/* ===================== Comprehensions ===================== */

type ComprehensionBody<'a> = dyn FnMut(&mut VM) -> ExecResult<()> + 'a;

/// Run `body` once per combination produced by the `for`/`if` clauses.
///
/// The iteration variables live in a scope of their own; the first iterable
/// is evaluated in the enclosing scope.
fn run_comprehension(
    vm: &mut VM,
    generators: &[Comprehension],
    body: &mut ComprehensionBody<'_>,
) -> ExecResult<()> {
    let Some(first) = generators.first() else {
        return body(vm);
    };
    let first_iterable = eval_expr(vm, &first.iter)?;

    let mut names = Vec::new();
    for generator in generators {
        generator.target.bound_names(&mut names);
    }
    let scope = Scope::new(Binder::Comprehension(names));
    match vm.activation_mut() {
        Some(act) => act.comprehensions.push(scope),
        None => return Err(Fault::type_error("comprehension outside of a frame")),
    }
    let result = comprehension_level(vm, generators, 0, Some(first_iterable), body);
    if let Some(act) = vm.activation_mut() {
        act.comprehensions.pop();
    }
    result
}

fn comprehension_level(
    vm: &mut VM,
    generators: &[Comprehension],
    level: usize,
    iterable: Option<Val>,
    body: &mut ComprehensionBody<'_>,
) -> ExecResult<()> {
    let Some(generator) = generators.get(level) else {
        return body(vm);
    };
    let iterable = match iterable {
        Some(value) => value,
        None => eval_expr(vm, &generator.iter)?,
    };
    let iter = vm.get_iter(&iterable)?;

    let mut count = 0usize;
    'items: while let Some(item) = vm.next_item(&iter)? {
        count += 1;
        if count % 1024 == 0 {
            vm.check_deadline()?;
        }
        assign(vm, &generator.target, item)?;
        for condition in &generator.ifs {
            let verdict = eval_expr(vm, condition)?;
            if !vm.truthy(&verdict)? {
                continue 'items;
            }
        }
        comprehension_level(vm, generators, level + 1, None, body)?;
    }
    Ok(())
}

/* ===================== Functions ===================== */

/// Scopes a function or class defined in `act` can see
pub fn closure_for_definition(act: &Activation) -> Rc<[Rc<Scope>]> {
    let mut scopes: Vec<Rc<Scope>> = Vec::new();
    match act.kind {
        ScopeKind::Module => {}
        ScopeKind::Function => {
            scopes.extend(act.closure.iter().cloned());
            scopes.push(act.locals.clone());
        }
        // Class namespaces are not visible to nested scopes
        ScopeKind::Class => scopes.extend(act.closure.iter().cloned()),
    }
    scopes.extend(act.comprehensions.iter().cloned());
    Rc::from(scopes)
}

/// Create a function object, evaluating parameter defaults now
pub fn make_function(vm: &mut VM, def: &Arc<FunctionDef>) -> ExecResult<Val> {
    let mut defaults = Vec::with_capacity(def.params.len());
    for param in &def.params {
        defaults.push(match &param.default {
            Some(expr) => Some(eval_expr(vm, expr)?),
            None => None,
        });
    }

    let (closure, qualname, globals) = match vm.activation() {
        Some(act) => (
            closure_for_definition(act),
            format!("{}{}", act.qualprefix, def.name),
            act.globals.clone(),
        ),
        None => (Rc::from(Vec::new()), def.name.clone(), vm.globals.clone()),
    };
    Ok(Val::Function(Rc::new(Function {
        def: def.clone(),
        qualname,
        defaults,
        globals,
        closure,
        owner: RefCell::new(None),
        attrs: RefCell::new(IndexMap::new()),
    })))
}

/* ===================== Assignment ===================== */

/// Bind `value` to an assignment target
pub fn assign(vm: &mut VM, target: &Target, value: Val) -> ExecResult<()> {
    match target {
        Target::Name { name, .. } => vm.store_name(name, value),
        Target::Attribute { object, attr, .. } => {
            let obj = eval_expr(vm, object)?;
            vm.set_attr(&obj, attr, value)
        }
        Target::Subscript { object, index, .. } => {
            let obj = eval_expr(vm, object)?;
            let index = eval_expr(vm, index)?;
            vm.set_item(&obj, &index, value)
        }
        Target::Unpack { elements, .. } => unpack(vm, elements, value),
        Target::Starred { .. } => Err(Fault::type_error(
            "starred assignment target must be in a list or tuple",
        )),
    }
}

fn unpack(vm: &mut VM, targets: &[Target], value: Val) -> ExecResult<()> {
    if !is_iterable(vm, &value) {
        return Err(Fault::type_error(format!(
            "cannot unpack non-iterable {} object",
            value.type_name()
        )));
    }
    let mut items = vm.collect(&value)?;
    let star = targets
        .iter()
        .position(|t| matches!(t, Target::Starred { .. }));

    let Some(star) = star else {
        if items.len() < targets.len() {
            return Err(Fault::value_error(format!(
                "not enough values to unpack (expected {}, got {})",
                targets.len(),
                items.len()
            )));
        }
        if items.len() > targets.len() {
            return Err(Fault::value_error(format!(
                "too many values to unpack (expected {})",
                targets.len()
            )));
        }
        for (target, item) in targets.iter().zip(items) {
            assign(vm, target, item)?;
        }
        return Ok(());
    };

    let required = targets.len() - 1;
    if items.len() < required {
        return Err(Fault::value_error(format!(
            "not enough values to unpack (expected at least {}, got {})",
            required,
            items.len()
        )));
    }
    let after = targets.len() - star - 1;
    let tail = items.split_off(items.len() - after);
    let middle = items.split_off(star);

    for (target, item) in targets[..star].iter().zip(items) {
        assign(vm, target, item)?;
    }
    if let Target::Starred { inner, .. } = &targets[star] {
        assign(vm, inner, Val::list(middle))?;
    }
    for (target, item) in targets[star + 1..].iter().zip(tail) {
        assign(vm, target, item)?;
    }
    Ok(())
}

/// `target op= value`; the target's object and index are evaluated once
pub fn aug_assign(vm: &mut VM, target: &Target, op: BinOp, value: &Expr) -> ExecResult<()> {
    match target {
        Target::Name { name, .. } => {
            let current = vm.load_name(name)?;
            let rhs = eval_expr(vm, value)?;
            let result = vm.inplace_op(op, &current, &rhs)?;
            vm.store_name(name, result)
        }
        Target::Attribute { object, attr, .. } => {
            let obj = eval_expr(vm, object)?;
            let current = vm.get_attr(&obj, attr)?;
            let rhs = eval_expr(vm, value)?;
            let result = vm.inplace_op(op, &current, &rhs)?;
            vm.set_attr(&obj, attr, result)
        }
        Target::Subscript { object, index, .. } => {
            let obj = eval_expr(vm, object)?;
            let index = eval_expr(vm, index)?;
            let current = vm.get_item(&obj, &index)?;
            let rhs = eval_expr(vm, value)?;
            let result = vm.inplace_op(op, &current, &rhs)?;
            vm.set_item(&obj, &index, result)
        }
        Target::Unpack { .. } | Target::Starred { .. } => Err(Fault::type_error(
            "illegal expression for augmented assignment",
        )),
    }
}

/// `del target`
pub fn delete_target(vm: &mut VM, target: &Target) -> ExecResult<()> {
    match target {
        Target::Name { name, .. } => vm.delete_name(name),
        Target::Attribute { object, attr, .. } => {
            let obj = eval_expr(vm, object)?;
            vm.del_attr(&obj, attr)
        }
        Target::Subscript { object, index, .. } => {
            let obj = eval_expr(vm, object)?;
            let index = eval_expr(vm, index)?;
            vm.del_item(&obj, &index)
        }
        Target::Unpack { elements, .. } => {
            for element in elements {
                delete_target(vm, element)?;
            }
            Ok(())
        }
        Target::Starred { .. } => Err(Fault::type_error("cannot delete starred")),
    }
}
