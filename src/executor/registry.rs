//! Class objects for the built-in types and exceptions
//!
//! Every VM builds its own registry, so class identity (`type(x) is int`) is
//! stable within one execution and nothing is shared between executions.

use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::errors::ExcKind;
use super::stdlib::{native, objects};
use super::types::values::{BuiltinType, Class, ClassOrigin, Val};

pub struct TypeRegistry {
    builtin: HashMap<BuiltinType, Rc<Class>>,
    exceptions: HashMap<ExcKind, Rc<Class>>,
    /// Iterator and dict view classes, created on first use
    named: RefCell<HashMap<&'static str, Rc<Class>>>,
}

const BUILTIN_TYPES: [(BuiltinType, &str); 23] = [
    (BuiltinType::Type, "type"),
    (BuiltinType::NoneType, "NoneType"),
    (BuiltinType::Int, "int"),
    (BuiltinType::Float, "float"),
    (BuiltinType::Str, "str"),
    (BuiltinType::List, "list"),
    (BuiltinType::Tuple, "tuple"),
    (BuiltinType::Dict, "dict"),
    (BuiltinType::Set, "set"),
    (BuiltinType::Range, "range"),
    (BuiltinType::Slice, "slice"),
    (BuiltinType::Function, "function"),
    (BuiltinType::BuiltinFunction, "builtin_function_or_method"),
    (BuiltinType::Method, "method"),
    (BuiltinType::Module, "module"),
    (BuiltinType::Property, "property"),
    (BuiltinType::StaticMethod, "staticmethod"),
    (BuiltinType::ClassMethod, "classmethod"),
    (BuiltinType::Super, "super"),
    (BuiltinType::Iterator, "iterator"),
    (BuiltinType::DictView, "dict_view"),
    (BuiltinType::Ellipsis, "ellipsis"),
    (BuiltinType::NotImplementedType, "NotImplementedType"),
];

fn new_class(
    name: &str,
    bases: Vec<Rc<Class>>,
    origin: ClassOrigin,
    attrs: IndexMap<String, Val>,
) -> Rc<Class> {
    // Built-in hierarchies are single inheritance
    let mut ancestors = Vec::new();
    if let Some(base) = bases.first() {
        ancestors = Class::mro(base);
    }
    Rc::new(Class {
        name: name.to_string(),
        qualname: name.to_string(),
        bases,
        ancestors,
        attrs: RefCell::new(attrs),
        origin,
    })
}

impl TypeRegistry {
    pub fn new() -> Self {
        let mut object_attrs = IndexMap::new();
        object_attrs.insert("__init__".to_string(), native("__init__", objects::object_init));
        object_attrs.insert("__repr__".to_string(), native("__repr__", objects::object_repr));
        object_attrs.insert("__str__".to_string(), native("__str__", objects::object_str));
        object_attrs.insert("__eq__".to_string(), native("__eq__", objects::object_eq));
        object_attrs.insert("__ne__".to_string(), native("__ne__", objects::object_ne));
        object_attrs.insert("__hash__".to_string(), native("__hash__", objects::object_hash));
        let object = new_class(
            "object",
            Vec::new(),
            ClassOrigin::Builtin(BuiltinType::Object),
            object_attrs,
        );

        let mut builtin = HashMap::new();
        builtin.insert(BuiltinType::Object, object.clone());
        for (ty, name) in BUILTIN_TYPES {
            let class = new_class(
                name,
                vec![object.clone()],
                ClassOrigin::Builtin(ty),
                IndexMap::new(),
            );
            builtin.insert(ty, class);
        }
        let int = builtin[&BuiltinType::Int].clone();
        builtin.insert(
            BuiltinType::Bool,
            new_class(
                "bool",
                vec![int],
                ClassOrigin::Builtin(BuiltinType::Bool),
                IndexMap::new(),
            ),
        );

        let mut exceptions: HashMap<ExcKind, Rc<Class>> = HashMap::new();
        for kind in ExcKind::ALL {
            let base = match kind.parent() {
                Some(parent) => exceptions[&parent].clone(),
                None => object.clone(),
            };
            let mut attrs = IndexMap::new();
            if kind == ExcKind::BaseException {
                attrs.insert(
                    "__init__".to_string(),
                    native("__init__", objects::exception_init),
                );
                attrs.insert("__str__".to_string(), native("__str__", objects::exception_str));
                attrs.insert(
                    "__repr__".to_string(),
                    native("__repr__", objects::exception_repr),
                );
            }
            let class = new_class(kind.name(), vec![base], ClassOrigin::Exception(kind), attrs);
            exceptions.insert(kind, class);
        }

        Self {
            builtin,
            exceptions,
            named: RefCell::new(HashMap::new()),
        }
    }

    pub fn get(&self, ty: BuiltinType) -> Rc<Class> {
        match self.builtin.get(&ty) {
            Some(class) => class.clone(),
            None => self.builtin[&BuiltinType::Object].clone(),
        }
    }

    pub fn object(&self) -> Rc<Class> {
        self.get(BuiltinType::Object)
    }

    pub fn exception(&self, kind: ExcKind) -> Rc<Class> {
        match self.exceptions.get(&kind) {
            Some(class) => class.clone(),
            None => self.object(),
        }
    }

    /// Built-in exception classes in hierarchy order
    pub fn exception_classes(&self) -> Vec<Rc<Class>> {
        ExcKind::ALL.iter().map(|kind| self.exception(*kind)).collect()
    }

    fn named(&self, name: &'static str, ty: BuiltinType) -> Rc<Class> {
        let mut named = self.named.borrow_mut();
        named
            .entry(name)
            .or_insert_with(|| {
                new_class(
                    name,
                    vec![self.object()],
                    ClassOrigin::Builtin(ty),
                    IndexMap::new(),
                )
            })
            .clone()
    }

    /// The class object `type(value)` returns
    pub fn class_of(&self, value: &Val) -> Rc<Class> {
        let ty = match value {
            Val::Instance(inst) => return inst.class.clone(),
            Val::Iterator(it) => return self.named(it.kind, BuiltinType::Iterator),
            Val::DictView(view) => return self.named(view.kind.type_name(), BuiltinType::DictView),
            Val::None => BuiltinType::NoneType,
            Val::NotImplemented => BuiltinType::NotImplementedType,
            Val::Ellipsis => BuiltinType::Ellipsis,
            Val::Bool(_) => BuiltinType::Bool,
            Val::Int(_) | Val::BigInt(_) => BuiltinType::Int,
            Val::Float(_) => BuiltinType::Float,
            Val::Str(_) => BuiltinType::Str,
            Val::List(_) => BuiltinType::List,
            Val::Tuple(_) => BuiltinType::Tuple,
            Val::Dict(_) => BuiltinType::Dict,
            Val::Set(_) => BuiltinType::Set,
            Val::Range(_) => BuiltinType::Range,
            Val::Slice(_) => BuiltinType::Slice,
            Val::Function(_) => BuiltinType::Function,
            Val::Builtin(_) => BuiltinType::BuiltinFunction,
            Val::BoundMethod(_) => BuiltinType::Method,
            Val::Class(_) => BuiltinType::Type,
            Val::Module(_) => BuiltinType::Module,
            Val::Property(_) => BuiltinType::Property,
            Val::StaticMethod(_) => BuiltinType::StaticMethod,
            Val::ClassMethod(_) => BuiltinType::ClassMethod,
            Val::Super(_) => BuiltinType::Super,
        };
        self.get(ty)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
