//! Attribute access: `obj.name`, assignment, deletion and method binding

use indexmap::IndexMap;
use std::rc::Rc;

use super::errors::{ExecResult, Fault};
use super::stdlib::{self, bound_native, native};
use super::types::values::{
    BoundMethod, Class, ClassOrigin, DictMap, Function, HashKey, Instance, SuperObj, Val,
};
use super::vm::VM;

fn no_attribute(value: &Val, name: &str) -> Fault {
    Fault::attribute_error(format!(
        "'{}' object has no attribute '{}'",
        value.type_name(),
        name
    ))
}

fn bound_method(receiver: Val, func: Val) -> Val {
    Val::BoundMethod(Rc::new(BoundMethod { receiver, func }))
}

/// Snapshot of an attribute table as a dict
fn attrs_dict(attrs: &IndexMap<String, Val>) -> Val {
    let mut map = DictMap::new();
    for (name, value) in attrs {
        map.insert(
            HashKey::Str(Rc::from(name.as_str())),
            (Val::str(name), value.clone()),
        );
    }
    Val::dict(map)
}

/* ===================== Lookup ===================== */

impl VM {
    /// Special method defined by a user class, looked up on the type only
    pub fn lookup_special(&self, value: &Val, name: &str) -> Option<Val> {
        match value {
            Val::Instance(inst) => inst.class.lookup_user(name),
            _ => None,
        }
    }

    /// `obj.name`
    pub fn get_attr(&mut self, obj: &Val, name: &str) -> ExecResult<Val> {
        match obj {
            Val::Instance(inst) => self.instance_attr(inst, obj, name),
            Val::Class(cls) => self.class_attr(cls, name),
            Val::Module(module) => {
                let value = module.attrs.borrow().get(name).cloned();
                match (value, name) {
                    (Some(value), _) => Ok(value),
                    (None, "__name__") => Ok(Val::str(&module.name)),
                    (None, _) => Err(Fault::attribute_error(format!(
                        "module '{}' has no attribute '{}'",
                        module.name, name
                    ))),
                }
            }
            Val::Function(func) => function_attr(func, obj, name),
            Val::BoundMethod(method) => match name {
                "__self__" => Ok(method.receiver.clone()),
                "__func__" => Ok(method.func.clone()),
                _ => self.get_attr(&method.func, name),
            },
            Val::Builtin(builtin) => match name {
                "__name__" | "__qualname__" => Ok(Val::str(builtin.name)),
                "__self__" => Ok(builtin.receiver.clone().unwrap_or(Val::None)),
                "__class__" => Ok(Val::Class(self.types.class_of(obj))),
                _ => Err(no_attribute(obj, name)),
            },
            Val::Super(sup) => self.super_attr(sup, name),
            _ => self.value_attr(obj, name),
        }
    }

    fn instance_attr(&mut self, inst: &Rc<Instance>, obj: &Val, name: &str) -> ExecResult<Val> {
        let class_attr = inst.class.lookup(name);

        // Properties take precedence over the instance dict
        if let Some(Val::Property(prop)) = &class_attr {
            return match &prop.fget {
                Some(fget) => self.call(fget, vec![obj.clone()]),
                None => Err(Fault::attribute_error(format!(
                    "property '{}' of '{}' object has no getter",
                    name, inst.class.name
                ))),
            };
        }

        let own = inst.attrs.borrow().get(name).cloned();
        if let Some(value) = own {
            return Ok(value);
        }

        if let Some(state) = &inst.exc {
            let state = state.borrow();
            match name {
                "args" => return Ok(Val::tuple(state.args.clone())),
                "__cause__" => return Ok(state.cause.clone().unwrap_or(Val::None)),
                "__context__" => return Ok(state.context.clone().unwrap_or(Val::None)),
                "__suppress_context__" => return Ok(Val::Bool(state.suppress_context)),
                "__traceback__" => return Ok(Val::None),
                _ => {}
            }
        }

        match name {
            "__class__" => return Ok(Val::Class(inst.class.clone())),
            "__dict__" => return Ok(attrs_dict(&inst.attrs.borrow())),
            _ => {}
        }

        if let Some(attr) = class_attr {
            return Ok(self.bind(attr, obj));
        }
        if let Some(getattr) = inst.class.lookup_user("__getattr__") {
            return self.call_method(&getattr, obj, vec![Val::str(name)]);
        }
        Err(no_attribute(obj, name))
    }

    /// Bind a class attribute found through an instance
    fn bind(&self, attr: Val, receiver: &Val) -> Val {
        match attr {
            Val::Function(_) => bound_method(receiver.clone(), attr),
            Val::Builtin(ref builtin) if builtin.receiver.is_none() => {
                bound_method(receiver.clone(), attr)
            }
            Val::ClassMethod(func) => {
                bound_method(Val::Class(self.types.class_of(receiver)), (*func).clone())
            }
            Val::StaticMethod(func) => (*func).clone(),
            other => other,
        }
    }

    fn class_attr(&mut self, cls: &Rc<Class>, name: &str) -> ExecResult<Val> {
        match name {
            "__name__" => return Ok(Val::str(&cls.name)),
            "__qualname__" => return Ok(Val::str(&cls.qualname)),
            "__mro__" => {
                let mro = Class::mro(cls).into_iter().map(Val::Class).collect();
                return Ok(Val::tuple(mro));
            }
            "__bases__" => {
                let bases = cls.bases.iter().cloned().map(Val::Class).collect();
                return Ok(Val::tuple(bases));
            }
            "__dict__" => return Ok(attrs_dict(&cls.attrs.borrow())),
            "__class__" => return Ok(Val::Class(self.types.class_of(&Val::Class(cls.clone())))),
            _ => {}
        }

        if let Some(attr) = cls.lookup(name) {
            return Ok(match attr {
                Val::ClassMethod(func) => bound_method(Val::Class(cls.clone()), (*func).clone()),
                Val::StaticMethod(func) => (*func).clone(),
                other => other,
            });
        }
        match (cls.origin, name) {
            (ClassOrigin::Builtin(ty), _) => {
                if let Some((method, func)) = stdlib::type_method(ty, name) {
                    return Ok(native(method, func));
                }
            }
            (_, "__module__") => return Ok(Val::str("builtins")),
            _ => {}
        }
        if name == "__doc__" {
            return Ok(Val::None);
        }
        Err(Fault::attribute_error(format!(
            "type object '{}' has no attribute '{}'",
            cls.name, name
        )))
    }

    /// `super().name`: look past `this` in the receiver's MRO
    fn super_attr(&mut self, sup: &SuperObj, name: &str) -> ExecResult<Val> {
        let mro = match &sup.receiver {
            Val::Class(cls) => Class::mro(cls),
            other => Class::mro(&self.types.class_of(other)),
        };
        let start = mro
            .iter()
            .position(|c| Rc::ptr_eq(c, &sup.this))
            .map_or(mro.len(), |i| i + 1);

        for cls in &mro[start..] {
            let attr = cls.attrs.borrow().get(name).cloned();
            let Some(attr) = attr else {
                continue;
            };
            return match attr {
                Val::Property(prop) => match &prop.fget {
                    Some(fget) => self.call(fget, vec![sup.receiver.clone()]),
                    None => Err(Fault::attribute_error(format!(
                        "property '{}' has no getter",
                        name
                    ))),
                },
                Val::ClassMethod(func) => {
                    let class = match &sup.receiver {
                        Val::Class(_) => sup.receiver.clone(),
                        other => Val::Class(self.types.class_of(other)),
                    };
                    Ok(bound_method(class, (*func).clone()))
                }
                Val::StaticMethod(func) => Ok((*func).clone()),
                Val::Function(_) | Val::Builtin(_) => Ok(bound_method(sup.receiver.clone(), attr)),
                other => Ok(other),
            };
        }
        Err(Fault::attribute_error(format!(
            "'super' object has no attribute '{}'",
            name
        )))
    }

    /// Attributes of built-in values: native methods and a few data fields
    fn value_attr(&mut self, obj: &Val, name: &str) -> ExecResult<Val> {
        if let Some((method, func)) = stdlib::method_of(obj, name) {
            return Ok(bound_native(method, func, obj.clone()));
        }
        let value = match (obj, name) {
            (_, "__class__") => Val::Class(self.types.class_of(obj)),
            (Val::Int(_) | Val::BigInt(_) | Val::Bool(_), "real" | "numerator") => match obj {
                Val::Bool(b) => Val::Int(*b as i64),
                other => other.clone(),
            },
            (Val::Int(_) | Val::BigInt(_) | Val::Bool(_), "imag") => Val::Int(0),
            (Val::Int(_) | Val::BigInt(_) | Val::Bool(_), "denominator") => Val::Int(1),
            (Val::Float(_), "real") => obj.clone(),
            (Val::Float(_), "imag") => Val::Float(0.0),
            (Val::Range(r), "start") => Val::Int(r.start),
            (Val::Range(r), "stop") => Val::Int(r.stop),
            (Val::Range(r), "step") => Val::Int(r.step),
            (Val::Slice(s), "start") => s.lower.clone(),
            (Val::Slice(s), "stop") => s.upper.clone(),
            (Val::Slice(s), "step") => s.step.clone(),
            (Val::Property(p), "fget") => p.fget.clone().unwrap_or(Val::None),
            (Val::Property(p), "fset") => p.fset.clone().unwrap_or(Val::None),
            (Val::Property(p), "fdel") => p.fdel.clone().unwrap_or(Val::None),
            (Val::StaticMethod(f) | Val::ClassMethod(f), "__func__") => (**f).clone(),
            _ => return Err(no_attribute(obj, name)),
        };
        Ok(value)
    }
}

fn function_attr(func: &Rc<Function>, obj: &Val, name: &str) -> ExecResult<Val> {
    let own = func.attrs.borrow().get(name).cloned();
    if let Some(value) = own {
        return Ok(value);
    }
    Ok(match name {
        "__name__" => Val::str(func.name()),
        "__qualname__" => Val::str(&func.qualname),
        "__module__" => Val::str("__main__"),
        "__doc__" => Val::None,
        "__dict__" => attrs_dict(&func.attrs.borrow()),
        "__defaults__" => {
            let defaults: Vec<Val> = func.defaults.iter().flatten().cloned().collect();
            if defaults.is_empty() {
                Val::None
            } else {
                Val::tuple(defaults)
            }
        }
        _ => return Err(no_attribute(obj, name)),
    })
}

/* ===================== Assignment & Deletion ===================== */

impl VM {
    /// `obj.name = value`
    pub fn set_attr(&mut self, obj: &Val, name: &str, value: Val) -> ExecResult<()> {
        match obj {
            Val::Instance(inst) => {
                if let Some(Val::Property(prop)) = inst.class.lookup(name) {
                    return match &prop.fset {
                        Some(fset) => self.call(fset, vec![obj.clone(), value]).map(|_| ()),
                        None => Err(Fault::attribute_error(format!(
                            "property '{}' of '{}' object has no setter",
                            name, inst.class.name
                        ))),
                    };
                }
                if let Some(state) = &inst.exc {
                    match name {
                        "args" => {
                            let args = self.collect(&value)?;
                            state.borrow_mut().args = args;
                            return Ok(());
                        }
                        "__cause__" => {
                            let mut state = state.borrow_mut();
                            state.suppress_context = true;
                            state.cause = (!value.is_none()).then_some(value);
                            return Ok(());
                        }
                        "__context__" => {
                            state.borrow_mut().context = (!value.is_none()).then_some(value);
                            return Ok(());
                        }
                        "__suppress_context__" => {
                            let flag = self.truthy(&value)?;
                            state.borrow_mut().suppress_context = flag;
                            return Ok(());
                        }
                        _ => {}
                    }
                }
                if name == "__class__" {
                    return Err(Fault::type_error("__class__ assignment is not supported"));
                }
                inst.attrs.borrow_mut().insert(name.to_string(), value);
                Ok(())
            }
            Val::Class(cls) if cls.is_user() => {
                cls.attrs.borrow_mut().insert(name.to_string(), value);
                Ok(())
            }
            Val::Class(cls) => Err(Fault::type_error(format!(
                "cannot set '{}' attribute of immutable type '{}'",
                name, cls.name
            ))),
            Val::Function(func) => {
                func.attrs.borrow_mut().insert(name.to_string(), value);
                Ok(())
            }
            Val::Module(module) => {
                module.attrs.borrow_mut().insert(name.to_string(), value);
                Ok(())
            }
            other => {
                if stdlib::method_of(other, name).is_some() {
                    return Err(Fault::attribute_error(format!(
                        "'{}' object attribute '{}' is read-only",
                        other.type_name(),
                        name
                    )));
                }
                Err(no_attribute(other, name))
            }
        }
    }

    /// `del obj.name`
    pub fn del_attr(&mut self, obj: &Val, name: &str) -> ExecResult<()> {
        let removed = match obj {
            Val::Instance(inst) => {
                if let Some(Val::Property(prop)) = inst.class.lookup(name) {
                    return match &prop.fdel {
                        Some(fdel) => self.call(fdel, vec![obj.clone()]).map(|_| ()),
                        None => Err(Fault::attribute_error(format!(
                            "property '{}' of '{}' object has no deleter",
                            name, inst.class.name
                        ))),
                    };
                }
                inst.attrs.borrow_mut().shift_remove(name)
            }
            Val::Class(cls) if cls.is_user() => {
                let removed = cls.attrs.borrow_mut().shift_remove(name);
                if removed.is_none() {
                    return Err(Fault::attribute_error(format!(
                        "type object '{}' has no attribute '{}'",
                        cls.name, name
                    )));
                }
                removed
            }
            Val::Function(func) => func.attrs.borrow_mut().shift_remove(name),
            Val::Module(module) => module.attrs.borrow_mut().shift_remove(name),
            _ => None,
        };
        match removed {
            Some(_) => Ok(()),
            None => Err(no_attribute(obj, name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::vm::Limits;

    #[test]
    fn test_builtin_method_is_bound_to_receiver() {
        let mut vm = VM::new(Limits::default());
        let list = Val::list(vec![Val::Int(1)]);
        let append = vm.get_attr(&list, "append").unwrap();
        vm.call(&append, vec![Val::Int(2)]).unwrap();
        let Val::List(items) = &list else {
            panic!("expected list");
        };
        assert_eq!(items.borrow().len(), 2);
    }

    #[test]
    fn test_missing_attribute_message() {
        let mut vm = VM::new(Limits::default());
        let err = vm.get_attr(&Val::Int(3), "nope").unwrap_err();
        let Fault::Builtin { args, .. } = err else {
            panic!("expected builtin fault");
        };
        assert_eq!(args[0].as_str(), Some("'int' object has no attribute 'nope'"));
    }

    #[test]
    fn test_cannot_set_attribute_on_builtin_type() {
        let mut vm = VM::new(Limits::default());
        let int = Val::Class(vm.types.get(crate::executor::types::values::BuiltinType::Int));
        assert!(vm.set_attr(&int, "x", Val::Int(1)).is_err());
    }
}
