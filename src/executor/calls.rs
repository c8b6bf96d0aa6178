//! Calling functions, instantiating classes and building class objects

use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use super::errors::{ExcKind, ExecResult, Fault};
use super::exec_loop::run_until_done;
use super::stdlib::{builtins, plural, CallArgs};
use super::types::ast::ParamKind;
use super::types::values::{
    Binder, BuiltinType, Class, ClassOrigin, DictMap, Function, HashKey, Instance, Scope,
};
use super::types::{Frame, Stmt, Val};
use super::vm::{ScopeKind, VM};

/* ===================== Call Dispatch ===================== */

impl VM {
    /// Call `callee` with positional arguments only
    pub fn call(&mut self, callee: &Val, args: Vec<Val>) -> ExecResult<Val> {
        self.call_with(callee, CallArgs::new(args))
    }

    pub fn call_with(&mut self, callee: &Val, mut args: CallArgs) -> ExecResult<Val> {
        match callee {
            Val::Function(func) => self.call_function(func, args),
            Val::Builtin(builtin) => {
                if let Some(receiver) = &builtin.receiver {
                    args.positional.insert(0, receiver.clone());
                }
                (builtin.func)(self, args)
            }
            Val::BoundMethod(method) => {
                args.positional.insert(0, method.receiver.clone());
                self.call_with(&method.func, args)
            }
            Val::Class(class) => self.instantiate(class, args),
            Val::StaticMethod(func) => self.call_with(func, args),
            Val::Instance(_) => match self.lookup_special(callee, "__call__") {
                Some(method) => self.call_method_args(&method, callee, args),
                None => Err(not_callable(callee)),
            },
            other => Err(not_callable(other)),
        }
    }

    /// Call a method found on a class with an explicit receiver
    pub fn call_method(&mut self, method: &Val, receiver: &Val, args: Vec<Val>) -> ExecResult<Val> {
        self.call_method_args(method, receiver, CallArgs::new(args))
    }

    pub fn call_method_args(
        &mut self,
        method: &Val,
        receiver: &Val,
        mut args: CallArgs,
    ) -> ExecResult<Val> {
        match method {
            Val::StaticMethod(func) => self.call_with(func, args),
            Val::ClassMethod(func) => {
                let class = match receiver {
                    Val::Class(_) => receiver.clone(),
                    other => Val::Class(self.types.class_of(other)),
                };
                args.positional.insert(0, class);
                self.call_with(func, args)
            }
            _ => {
                args.positional.insert(0, receiver.clone());
                self.call_with(method, args)
            }
        }
    }

    /// Run a user function in a fresh activation
    pub fn call_function(&mut self, func: &Rc<Function>, args: CallArgs) -> ExecResult<Val> {
        self.check_deadline()?;
        let locals = Scope::new(Binder::Function(func.def.clone()));
        bind_arguments(func, args, &locals)?;

        self.enter()?;
        self.push_activation(
            &func.def.name,
            ScopeKind::Function,
            locals,
            func.closure.clone(),
            Some(func.clone()),
            format!("{}.<locals>.", func.qualname),
        );
        let base = self.frames.len();
        match func.def.body.as_ref() {
            Stmt::Block { body, .. } => self.frames.push(Frame::block(body.clone())),
            other => self.frames.push(Frame::block(Arc::from(vec![other.clone()]))),
        }
        let result = run_until_done(self, base);
        self.activations.pop();
        self.leave();
        result
    }

    /* ===================== Instances ===================== */

    /// `Class(args)`
    pub fn instantiate(&mut self, class: &Rc<Class>, args: CallArgs) -> ExecResult<Val> {
        if let ClassOrigin::Builtin(ty) = class.origin {
            return builtins::construct(self, ty, args);
        }

        let inst = Instance::new(class.clone());
        if let Some(state) = &inst.exc {
            state.borrow_mut().args = args.positional.clone();
        }
        let obj = Val::Instance(inst);

        let init = Class::mro(class)
            .into_iter()
            .find_map(|c| {
                let init = c.attrs.borrow().get("__init__").cloned();
                init.map(|init| (c.origin, init))
            });
        match init {
            Some((origin, init)) if origin != ClassOrigin::Builtin(BuiltinType::Object) => {
                let result = self.call_method_args(&init, &obj, args)?;
                if !result.is_none() {
                    return Err(Fault::type_error(format!(
                        "__init__() should return None, not '{}'",
                        result.type_name()
                    )));
                }
            }
            _ => {
                if !args.positional.is_empty() || !args.keywords.is_empty() {
                    return Err(Fault::type_error(format!(
                        "{}() takes no arguments",
                        class.name
                    )));
                }
            }
        }
        Ok(obj)
    }

    /* ===================== Classes ===================== */

    /// Build a user class from the namespace its body produced
    pub fn create_class(
        &mut self,
        name: &str,
        qualname: &str,
        bases: Vec<Val>,
        attrs: IndexMap<String, Val>,
    ) -> ExecResult<Val> {
        let mut base_classes: Vec<Rc<Class>> = Vec::new();
        for base in bases {
            let Val::Class(cls) = base else {
                return Err(Fault::type_error("bases must be types"));
            };
            if let ClassOrigin::Builtin(ty) = cls.origin {
                if ty != BuiltinType::Object {
                    return Err(Fault::new(
                        ExcKind::NotImplementedError,
                        format!("subclassing built-in type '{}' is not supported", cls.name),
                    ));
                }
            }
            if base_classes.iter().any(|b| Rc::ptr_eq(b, &cls)) {
                return Err(Fault::type_error(format!("duplicate base class {}", cls.name)));
            }
            base_classes.push(cls);
        }
        if base_classes.is_empty() {
            base_classes.push(self.types.object());
        }

        let ancestors = linearize(&base_classes)?;
        let class = Rc::new(Class {
            name: name.to_string(),
            qualname: qualname.to_string(),
            bases: base_classes,
            ancestors,
            attrs: RefCell::new(attrs),
            origin: ClassOrigin::User,
        });
        for value in class.attrs.borrow().values() {
            set_owner(value, &class);
        }
        Ok(Val::Class(class))
    }
}

fn not_callable(value: &Val) -> Fault {
    Fault::type_error(format!("'{}' object is not callable", value.type_name()))
}

/// Record the defining class on methods, for zero-argument `super()`
fn set_owner(value: &Val, class: &Rc<Class>) {
    match value {
        Val::Function(func) => *func.owner.borrow_mut() = Some(Rc::downgrade(class)),
        Val::StaticMethod(inner) | Val::ClassMethod(inner) => set_owner(inner, class),
        Val::Property(prop) => {
            for accessor in [&prop.fget, &prop.fset, &prop.fdel].into_iter().flatten() {
                set_owner(accessor, class);
            }
        }
        _ => {}
    }
}

/// C3 linearisation of the bases (the class itself excluded)
fn linearize(bases: &[Rc<Class>]) -> ExecResult<Vec<Rc<Class>>> {
    let mut sequences: Vec<Vec<Rc<Class>>> = bases.iter().map(Class::mro).collect();
    sequences.push(bases.to_vec());

    let mut out = Vec::new();
    loop {
        sequences.retain(|s| !s.is_empty());
        if sequences.is_empty() {
            return Ok(out);
        }
        let candidate = sequences
            .iter()
            .map(|s| s[0].clone())
            .find(|c| {
                !sequences
                    .iter()
                    .any(|s| s[1..].iter().any(|x| Rc::ptr_eq(x, c)))
            });
        let Some(candidate) = candidate else {
            let names: Vec<&str> = bases.iter().map(|b| b.name.as_str()).collect();
            return Err(Fault::type_error(format!(
                "Cannot create a consistent method resolution order (MRO) for bases {}",
                names.join(", ")
            )));
        };
        for seq in sequences.iter_mut() {
            if Rc::ptr_eq(&seq[0], &candidate) {
                seq.remove(0);
            }
        }
        out.push(candidate);
    }
}

/* ===================== Argument Binding ===================== */

fn quoted_list(names: &[&str]) -> String {
    let quoted: Vec<String> = names.iter().map(|n| format!("'{}'", n)).collect();
    match quoted.len() {
        0 => String::new(),
        1 => quoted[0].clone(),
        2 => format!("{} and {}", quoted[0], quoted[1]),
        n => format!("{}, and {}", quoted[..n - 1].join(", "), quoted[n - 1]),
    }
}

/// Bind call arguments to the parameters of `func` inside `locals`
fn bind_arguments(func: &Function, args: CallArgs, locals: &Scope) -> ExecResult<()> {
    let params = &func.def.params;
    let name = &func.qualname;
    let given = args.positional.len();
    let mut bound = vec![false; params.len()];
    let mut varargs = None;
    let mut varkw = None;

    let mut positional = args.positional.into_iter();
    for (i, param) in params.iter().enumerate() {
        match param.kind {
            ParamKind::Positional => {
                if let Some(value) = positional.next() {
                    locals.set(&param.name, value);
                    bound[i] = true;
                }
            }
            // A bare `*` only marks the start of keyword-only parameters
            ParamKind::VarArgs if param.name == "*" => {}
            ParamKind::VarArgs => varargs = Some(i),
            ParamKind::VarKeywords => varkw = Some(i),
            ParamKind::KeywordOnly => {}
        }
    }

    let extra: Vec<Val> = positional.collect();
    match varargs {
        Some(i) => locals.set(&params[i].name, Val::tuple(extra)),
        None if !extra.is_empty() => {
            let total = params
                .iter()
                .filter(|p| p.kind == ParamKind::Positional)
                .count();
            let required = params
                .iter()
                .enumerate()
                .filter(|(i, p)| p.kind == ParamKind::Positional && func.defaults[*i].is_none())
                .count();
            let takes = if required == total {
                format!("{} positional argument{}", total, plural(total))
            } else {
                format!("from {} to {} positional arguments", required, total)
            };
            return Err(Fault::type_error(format!(
                "{}() takes {} but {} {} given",
                name,
                takes,
                given,
                if given == 1 { "was" } else { "were" }
            )));
        }
        None => {}
    }

    let mut extra_keywords = DictMap::new();
    for (key, value) in args.keywords {
        let target = params.iter().position(|p| {
            p.name == key && matches!(p.kind, ParamKind::Positional | ParamKind::KeywordOnly)
        });
        match target {
            Some(i) if bound[i] => {
                return Err(Fault::type_error(format!(
                    "{}() got multiple values for argument '{}'",
                    name, key
                )))
            }
            Some(i) => {
                locals.set(&key, value);
                bound[i] = true;
            }
            None if varkw.is_some() => {
                let key_val = Val::str(&key);
                extra_keywords.insert(HashKey::Str(Rc::from(key.as_str())), (key_val, value));
            }
            None => {
                return Err(Fault::type_error(format!(
                    "{}() got an unexpected keyword argument '{}'",
                    name, key
                )))
            }
        }
    }
    if let Some(i) = varkw {
        locals.set(&params[i].name, Val::dict(extra_keywords));
    }

    let mut missing_positional = Vec::new();
    let mut missing_keyword = Vec::new();
    for (i, param) in params.iter().enumerate() {
        if bound[i] || matches!(param.kind, ParamKind::VarArgs | ParamKind::VarKeywords) {
            continue;
        }
        match &func.defaults[i] {
            Some(default) => locals.set(&param.name, default.clone()),
            None if param.kind == ParamKind::Positional => missing_positional.push(param.name.as_str()),
            None => missing_keyword.push(param.name.as_str()),
        }
    }
    for (missing, what) in [
        (&missing_positional, "positional"),
        (&missing_keyword, "keyword-only"),
    ] {
        if !missing.is_empty() {
            return Err(Fault::type_error(format!(
                "{}() missing {} required {} argument{}: {}",
                name,
                missing.len(),
                what,
                plural(missing.len()),
                quoted_list(missing)
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoted_list_joins_like_python() {
        assert_eq!(quoted_list(&["a"]), "'a'");
        assert_eq!(quoted_list(&["a", "b"]), "'a' and 'b'");
        assert_eq!(quoted_list(&["a", "b", "c"]), "'a', 'b', and 'c'");
    }
}
