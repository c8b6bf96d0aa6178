//! Standard library function implementations
//!
//! Built-in functions, the methods of built-in types and the `math` module
//! are native Rust functions sharing one signature. Methods receive their
//! receiver as the first positional argument.

pub mod builtins;
pub mod dicts;
pub mod format;
pub mod lists;
pub mod math;
pub mod numbers;
pub mod objects;
pub mod strings;

use indexmap::IndexMap;
use std::rc::Rc;

use super::errors::{ExecResult, Fault};
use super::registry::TypeRegistry;
use super::types::values::{BuiltinType, Scope};
use super::types::Val;
use super::vm::VM;

pub use super::types::values::Builtin;

/* ===================== Native Function Types ===================== */

/// Signature shared by every native function and method
pub type NativeFn = fn(&mut VM, CallArgs) -> ExecResult<Val>;

/// Arguments of a call, after `*` and `**` unpacking
#[derive(Debug, Default)]
pub struct CallArgs {
    pub positional: Vec<Val>,
    /// Keyword arguments in call order
    pub keywords: Vec<(String, Val)>,
}

impl CallArgs {
    pub fn new(positional: Vec<Val>) -> Self {
        Self {
            positional,
            keywords: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty()
    }

    pub fn arg(&self, idx: usize) -> Option<&Val> {
        self.positional.get(idx)
    }

    /// Check the number of positional arguments
    pub fn arity(&self, name: &str, min: usize, max: usize) -> ExecResult<()> {
        let given = self.positional.len();
        if given >= min && given <= max {
            return Ok(());
        }
        let message = if min == max && min == 1 {
            format!("{}() takes exactly one argument ({} given)", name, given)
        } else if min == max && min == 0 {
            format!("{}() takes no arguments ({} given)", name, given)
        } else if given < min {
            format!(
                "{} expected at least {} argument{}, got {}",
                name,
                min,
                plural(min),
                given
            )
        } else {
            format!(
                "{} expected at most {} argument{}, got {}",
                name,
                max,
                plural(max),
                given
            )
        };
        Err(Fault::type_error(message))
    }

    /// Remove and return a keyword argument
    pub fn take_keyword(&mut self, name: &str) -> Option<Val> {
        let pos = self.keywords.iter().position(|(k, _)| k == name)?;
        Some(self.keywords.remove(pos).1)
    }

    /// Fail if keyword arguments remain unconsumed
    pub fn no_keywords(&self, name: &str) -> ExecResult<()> {
        match self.keywords.first() {
            None => Ok(()),
            Some((kw, _)) if self.keywords.len() == 1 && !name.contains('.') => Err(
                Fault::type_error(format!("'{}' is an invalid keyword argument for {}()", kw, name)),
            ),
            Some(_) => Err(Fault::type_error(format!(
                "{}() takes no keyword arguments",
                name
            ))),
        }
    }
}

pub(crate) fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

/// Receiver of a native method (always the first positional argument)
pub(crate) fn receiver(args: &CallArgs) -> ExecResult<&Val> {
    args.positional
        .first()
        .ok_or_else(|| Fault::type_error("descriptor needs an argument"))
}

/// Positional arguments after the receiver
pub(crate) fn rest(args: &CallArgs) -> &[Val] {
    args.positional.get(1..).unwrap_or(&[])
}

/// Match positional (after the first `skip`) and keyword arguments against
/// named parameters; absent ones are `None`
pub(crate) fn named_args(
    args: CallArgs,
    name: &str,
    params: &[&str],
    skip: usize,
) -> ExecResult<Vec<Option<Val>>> {
    let positional = args.positional.into_iter().skip(skip);
    if positional.len() > params.len() {
        return Err(Fault::type_error(format!(
            "{}() takes at most {} argument{} ({} given)",
            name,
            params.len(),
            plural(params.len()),
            positional.len()
        )));
    }
    let mut out: Vec<Option<Val>> = vec![None; params.len()];
    for (slot, value) in out.iter_mut().zip(positional) {
        *slot = Some(value);
    }
    for (key, value) in args.keywords {
        let Some(i) = params.iter().position(|p| *p == key) else {
            return Err(Fault::type_error(format!(
                "'{}' is an invalid keyword argument for {}()",
                key, name
            )));
        };
        if out[i].is_some() {
            return Err(Fault::type_error(format!(
                "argument for {}() given by name ('{}') and position ({})",
                name,
                key,
                i + 1
            )));
        }
        out[i] = Some(value);
    }
    Ok(out)
}

/// Native function value
pub fn native(name: &'static str, func: NativeFn) -> Val {
    Val::Builtin(Rc::new(Builtin {
        name,
        func,
        receiver: None,
    }))
}

/// Native method bound to `receiver`
pub fn bound_native(name: &'static str, func: NativeFn, receiver: Val) -> Val {
    Val::Builtin(Rc::new(Builtin {
        name,
        func,
        receiver: Some(receiver),
    }))
}

/* ===================== Environment Injection ===================== */

/// Inject built-in functions, types and exceptions into the builtins scope
///
/// Called automatically by VM::new().
pub fn inject_builtins(scope: &Rc<Scope>, types: &TypeRegistry) {
    for &(name, func) in builtins::FUNCTIONS {
        scope.set(name, native(name, func));
    }

    let type_names = [
        ("object", BuiltinType::Object),
        ("type", BuiltinType::Type),
        ("bool", BuiltinType::Bool),
        ("int", BuiltinType::Int),
        ("float", BuiltinType::Float),
        ("str", BuiltinType::Str),
        ("list", BuiltinType::List),
        ("tuple", BuiltinType::Tuple),
        ("dict", BuiltinType::Dict),
        ("set", BuiltinType::Set),
        ("range", BuiltinType::Range),
        ("slice", BuiltinType::Slice),
        ("property", BuiltinType::Property),
        ("staticmethod", BuiltinType::StaticMethod),
        ("classmethod", BuiltinType::ClassMethod),
        ("super", BuiltinType::Super),
    ];
    for (name, ty) in type_names {
        scope.set(name, Val::Class(types.get(ty)));
    }

    for class in types.exception_classes() {
        let name = class.name.clone();
        scope.set(&name, Val::Class(class));
    }

    scope.set("__name__", Val::str("__main__"));
    scope.set("NotImplemented", Val::NotImplemented);
    scope.set("Ellipsis", Val::Ellipsis);
}

/// Attributes of an importable module, or None if no such module exists
pub fn module_attrs(name: &str) -> Option<IndexMap<String, Val>> {
    match name {
        "math" => Some(math::module()),
        _ => None,
    }
}

/* ===================== Method Tables ===================== */

/// Native method of a built-in value
pub fn method_of(value: &Val, name: &str) -> Option<(&'static str, NativeFn)> {
    match value {
        Val::Str(_) => strings::method(name),
        Val::List(_) => lists::list_method(name),
        Val::Tuple(_) => lists::tuple_method(name),
        Val::Dict(_) => dicts::dict_method(name),
        Val::Set(_) => dicts::set_method(name),
        Val::Int(_) | Val::BigInt(_) | Val::Bool(_) => numbers::int_method(name),
        Val::Float(_) => numbers::float_method(name),
        Val::Property(_) => objects::property_method(name),
        _ => None,
    }
}

/// Native method looked up on a built-in type object (`str.upper`)
pub fn type_method(ty: BuiltinType, name: &str) -> Option<(&'static str, NativeFn)> {
    match ty {
        BuiltinType::Str => strings::method(name),
        BuiltinType::List => lists::list_method(name),
        BuiltinType::Tuple => lists::tuple_method(name),
        BuiltinType::Dict => dicts::dict_method(name),
        BuiltinType::Set => dicts::set_method(name),
        BuiltinType::Int | BuiltinType::Bool => numbers::int_method(name),
        BuiltinType::Float => numbers::float_method(name),
        _ => None,
    }
}
