//! Methods of `object`, `BaseException` and `property`
//!
//! These natives live on the built-in classes themselves so that
//! `super().__init__(...)` and `object.__repr__(self)` resolve to them.

use std::rc::Rc;

use super::{receiver, CallArgs, NativeFn};
use crate::executor::errors::{ExecResult, Fault};
use crate::executor::types::values::{Property, Val};
use crate::executor::vm::VM;

/* ===================== object ===================== */

pub fn object_init(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    receiver(&args)?;
    if args.len() > 1 || !args.keywords.is_empty() {
        return Err(Fault::type_error(
            "object.__init__() takes exactly one argument (the instance to initialize)",
        ));
    }
    Ok(Val::None)
}

pub fn object_repr(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let this = receiver(&args)?.clone();
    Ok(Val::str(&vm.default_repr(&this)))
}

pub fn object_str(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let this = receiver(&args)?.clone();
    Ok(Val::str(&vm.repr(&this)?))
}

pub fn object_eq(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    args.arity("__eq__", 2, 2)?;
    let same = match (args.positional[0].identity(), args.positional[1].identity()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    };
    Ok(if same { Val::Bool(true) } else { Val::NotImplemented })
}

pub fn object_ne(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    args.arity("__ne__", 2, 2)?;
    let (a, b) = (args.positional[0].clone(), args.positional[1].clone());
    let equal = vm.eq(&a, &b)?;
    Ok(Val::Bool(!equal))
}

pub fn object_hash(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let this = receiver(&args)?.clone();
    Ok(Val::Int(vm.id_of(&this) as i64 >> 4))
}

/* ===================== BaseException ===================== */

pub fn exception_init(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let this = receiver(&args)?.clone();
    if !args.keywords.is_empty() {
        return Err(Fault::type_error(format!(
            "{}() takes no keyword arguments",
            this.type_name()
        )));
    }
    if let Val::Instance(inst) = &this {
        if let Some(state) = &inst.exc {
            state.borrow_mut().args = args.positional[1..].to_vec();
        }
    }
    Ok(Val::None)
}

pub fn exception_str(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let this = receiver(&args)?.clone();
    Ok(Val::str(&vm.exception_text(&this)?))
}

pub fn exception_repr(vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    let this = receiver(&args)?.clone();
    Ok(Val::str(&vm.exception_repr(&this)?))
}

/* ===================== property ===================== */

pub fn property_method(name: &str) -> Option<(&'static str, NativeFn)> {
    Some(match name {
        "getter" => ("getter", property_getter),
        "setter" => ("setter", property_setter),
        "deleter" => ("deleter", property_deleter),
        _ => return None,
    })
}

/// Copy of the receiving property with one accessor replaced
fn replace_accessor(args: &CallArgs, name: &str, which: usize) -> ExecResult<Val> {
    args.arity(name, 2, 2)?;
    let Val::Property(prop) = &args.positional[0] else {
        return Err(Fault::type_error(format!(
            "descriptor '{}' requires a 'property' object",
            name
        )));
    };
    let func = Some(args.positional[1].clone());
    let mut accessors = [prop.fget.clone(), prop.fset.clone(), prop.fdel.clone()];
    accessors[which] = func;
    let [fget, fset, fdel] = accessors;
    Ok(Val::Property(Rc::new(Property { fget, fset, fdel })))
}

fn property_getter(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    replace_accessor(&args, "getter", 0)
}

fn property_setter(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    replace_accessor(&args, "setter", 1)
}

fn property_deleter(_vm: &mut VM, args: CallArgs) -> ExecResult<Val> {
    replace_accessor(&args, "deleter", 2)
}
