//! Runtime value types
//!
//! Every value the interpreter manipulates is a `Val`. Scalars are stored
//! inline; containers and objects are reference counted so that aliasing and
//! identity behave the way the executed program expects.

use indexmap::IndexMap;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use super::ast::FunctionDef;
use crate::executor::errors::{ExcKind, TraceEntry};
use crate::executor::stdlib::NativeFn;

/// Insertion-ordered dict storage: hash key -> (original key, value)
pub type DictMap = IndexMap<HashKey, (Val, Val)>;

/// Insertion-ordered set storage: hash key -> original element
pub type SetMap = IndexMap<HashKey, Val>;

/// Runtime value type
#[derive(Clone)]
pub enum Val {
    None,
    NotImplemented,
    Ellipsis,
    Bool(bool),
    Int(i64),
    /// Integer outside the `i64` range; never holds a value that fits in `Int`
    BigInt(Rc<BigInt>),
    Float(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Val>>>),
    Tuple(Rc<[Val]>),
    Dict(Rc<RefCell<DictMap>>),
    Set(Rc<RefCell<SetMap>>),
    Range(RangeObj),
    Slice(Rc<SliceObj>),
    Function(Rc<Function>),
    Builtin(Rc<Builtin>),
    BoundMethod(Rc<BoundMethod>),
    Class(Rc<Class>),
    Instance(Rc<Instance>),
    Module(Rc<ModuleObj>),
    Iterator(Rc<IterObj>),
    DictView(Rc<DictView>),
    Property(Rc<Property>),
    StaticMethod(Rc<Val>),
    ClassMethod(Rc<Val>),
    Super(Rc<SuperObj>),
}

impl Val {
    pub fn str(s: &str) -> Val {
        Val::Str(Rc::from(s))
    }

    pub fn list(items: Vec<Val>) -> Val {
        Val::List(Rc::new(RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Val>) -> Val {
        Val::Tuple(Rc::from(items))
    }

    pub fn dict(map: DictMap) -> Val {
        Val::Dict(Rc::new(RefCell::new(map)))
    }

    pub fn set(map: SetMap) -> Val {
        Val::Set(Rc::new(RefCell::new(map)))
    }

    /// Normalise an arbitrary precision integer, demoting it to `Int` when it fits
    pub fn from_bigint(n: BigInt) -> Val {
        match n.to_i64() {
            Some(small) => Val::Int(small),
            None => Val::BigInt(Rc::new(n)),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Val::None)
    }

    /// Integer value of `int` and `bool` values that fit in 64 bits
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Val::Int(n) => Some(*n),
            Val::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// Integer value of `int` and `bool` values as a big integer
    pub fn as_bigint(&self) -> Option<BigInt> {
        match self {
            Val::Int(n) => Some(BigInt::from(*n)),
            Val::Bool(b) => Some(BigInt::from(*b as i64)),
            Val::BigInt(n) => Some(n.as_ref().clone()),
            _ => None,
        }
    }

    pub fn is_int_like(&self) -> bool {
        matches!(self, Val::Int(_) | Val::Bool(_) | Val::BigInt(_))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Val::Int(_) | Val::Bool(_) | Val::BigInt(_) | Val::Float(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Val::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Pointer identity of heap values, used by `is`, `id()` and identity hashing
    pub fn identity(&self) -> Option<usize> {
        fn addr<T: ?Sized>(rc: &Rc<T>) -> usize {
            Rc::as_ptr(rc) as *const u8 as usize
        }
        match self {
            Val::BigInt(rc) => Some(addr(rc)),
            Val::Str(rc) => Some(addr(rc)),
            Val::List(rc) => Some(addr(rc)),
            Val::Tuple(rc) => Some(addr(rc)),
            Val::Dict(rc) => Some(addr(rc)),
            Val::Set(rc) => Some(addr(rc)),
            Val::Slice(rc) => Some(addr(rc)),
            Val::Function(rc) => Some(addr(rc)),
            Val::Builtin(rc) => Some(addr(rc)),
            Val::BoundMethod(rc) => Some(addr(rc)),
            Val::Class(rc) => Some(addr(rc)),
            Val::Instance(rc) => Some(addr(rc)),
            Val::Module(rc) => Some(addr(rc)),
            Val::Iterator(rc) => Some(addr(rc)),
            Val::DictView(rc) => Some(addr(rc)),
            Val::Property(rc) => Some(addr(rc)),
            Val::StaticMethod(rc) => Some(addr(rc)),
            Val::ClassMethod(rc) => Some(addr(rc)),
            Val::Super(rc) => Some(addr(rc)),
            Val::None
            | Val::NotImplemented
            | Val::Ellipsis
            | Val::Bool(_)
            | Val::Int(_)
            | Val::Float(_)
            | Val::Range(_) => None,
        }
    }

    /// Python type name, as used in error messages
    pub fn type_name(&self) -> String {
        let name = match self {
            Val::None => "NoneType",
            Val::NotImplemented => "NotImplementedType",
            Val::Ellipsis => "ellipsis",
            Val::Bool(_) => "bool",
            Val::Int(_) | Val::BigInt(_) => "int",
            Val::Float(_) => "float",
            Val::Str(_) => "str",
            Val::List(_) => "list",
            Val::Tuple(_) => "tuple",
            Val::Dict(_) => "dict",
            Val::Set(_) => "set",
            Val::Range(_) => "range",
            Val::Slice(_) => "slice",
            Val::Function(_) => "function",
            Val::Builtin(_) => "builtin_function_or_method",
            Val::BoundMethod(_) => "method",
            Val::Class(_) => "type",
            Val::Instance(inst) => return inst.class.name.clone(),
            Val::Module(_) => "module",
            Val::Iterator(it) => it.kind,
            Val::DictView(view) => view.kind.type_name(),
            Val::Property(_) => "property",
            Val::StaticMethod(_) => "staticmethod",
            Val::ClassMethod(_) => "classmethod",
            Val::Super(_) => "super",
        };
        name.to_string()
    }
}

impl std::fmt::Debug for Val {
    /// Shallow rendering; containers may be self-referencing
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Val::None => write!(f, "None"),
            Val::Bool(b) => write!(f, "Bool({})", b),
            Val::Int(n) => write!(f, "Int({})", n),
            Val::BigInt(n) => write!(f, "BigInt({})", n),
            Val::Float(x) => write!(f, "Float({})", x),
            Val::Str(s) => write!(f, "Str({:?})", s),
            Val::List(items) => write!(f, "List(len={})", items.borrow().len()),
            Val::Tuple(items) => write!(f, "Tuple(len={})", items.len()),
            Val::Dict(map) => write!(f, "Dict(len={})", map.borrow().len()),
            Val::Set(map) => write!(f, "Set(len={})", map.borrow().len()),
            Val::Function(func) => write!(f, "Function({})", func.qualname),
            Val::Builtin(b) => write!(f, "Builtin({})", b.name),
            Val::Class(cls) => write!(f, "Class({})", cls.name),
            Val::Instance(inst) => write!(f, "Instance({})", inst.class.name),
            other => write!(f, "{}", other.type_name()),
        }
    }
}

/* ===================== Hashing ===================== */

/// Key under which a hashable value is stored in dicts and sets.
///
/// Numbers that compare equal share a key (`1`, `1.0` and `True`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    None,
    Int(i64),
    BigInt(BigInt),
    /// Bits of a non-integral float
    Float(u64),
    Str(Rc<str>),
    Tuple(Vec<HashKey>),
    Range(i64, i64, i64),
    /// Objects hashed by identity
    Identity(usize),
    Singleton(u8),
}

/* ===================== Containers ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeObj {
    pub start: i64,
    pub stop: i64,
    pub step: i64,
}

impl RangeObj {
    pub fn len(&self) -> i64 {
        if self.step > 0 && self.start < self.stop {
            (self.stop - self.start - 1) / self.step + 1
        } else if self.step < 0 && self.start > self.stop {
            (self.start - self.stop - 1) / (-self.step) + 1
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, idx: i64) -> i64 {
        self.start + idx * self.step
    }

    pub fn contains(&self, n: i64) -> bool {
        if self.step > 0 {
            n >= self.start && n < self.stop && (n - self.start) % self.step == 0
        } else {
            n <= self.start && n > self.stop && (self.start - n) % (-self.step) == 0
        }
    }
}

#[derive(Debug)]
pub struct SliceObj {
    pub lower: Val,
    pub upper: Val,
    pub step: Val,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    Keys,
    Values,
    Items,
}

impl ViewKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            ViewKind::Keys => "dict_keys",
            ViewKind::Values => "dict_values",
            ViewKind::Items => "dict_items",
        }
    }
}

pub struct DictView {
    pub dict: Rc<RefCell<DictMap>>,
    pub kind: ViewKind,
}

/* ===================== Scopes ===================== */

/// What determines the names a scope binds
#[derive(Debug)]
pub enum Binder {
    Module,
    Class,
    /// Function locals, known statically from the body
    Function(Arc<FunctionDef>),
    /// Comprehension iteration variables
    Comprehension(Vec<String>),
}

/// A variable namespace
#[derive(Debug)]
pub struct Scope {
    pub vars: RefCell<IndexMap<String, Val>>,
    pub binder: Binder,
}

impl Scope {
    pub fn new(binder: Binder) -> Rc<Scope> {
        Rc::new(Scope {
            vars: RefCell::new(IndexMap::new()),
            binder,
        })
    }

    /// Whether a closure lookup of `name` resolves to this scope
    pub fn binds(&self, name: &str) -> bool {
        match &self.binder {
            Binder::Function(def) => def.local_names.contains(name),
            Binder::Comprehension(names) => names.iter().any(|n| n == name),
            Binder::Module | Binder::Class => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<Val> {
        self.vars.borrow().get(name).cloned()
    }

    pub fn set(&self, name: &str, value: Val) {
        let mut vars = self.vars.borrow_mut();
        match vars.get_mut(name) {
            Some(slot) => *slot = value,
            None => {
                vars.insert(name.to_string(), value);
            }
        }
    }

    pub fn remove(&self, name: &str) -> Option<Val> {
        self.vars.borrow_mut().shift_remove(name)
    }
}

/* ===================== Callables ===================== */

/// A user-defined function or lambda
pub struct Function {
    pub def: Arc<FunctionDef>,
    pub qualname: String,
    /// Evaluated default values, aligned with `def.params`
    pub defaults: Vec<Option<Val>>,
    pub globals: Rc<Scope>,
    /// Enclosing function and comprehension scopes, innermost last
    pub closure: Rc<[Rc<Scope>]>,
    /// Class whose body defined this function, for zero-argument `super()`
    pub owner: RefCell<Option<Weak<Class>>>,
    pub attrs: RefCell<IndexMap<String, Val>>,
}

impl Function {
    pub fn name(&self) -> &str {
        &self.def.name
    }
}

/// Native function or method implemented in Rust
pub struct Builtin {
    pub name: &'static str,
    pub func: NativeFn,
    /// Bound receiver, passed as the first positional argument
    pub receiver: Option<Val>,
}

/// A function bound to an instance (or to a class for classmethods)
pub struct BoundMethod {
    pub receiver: Val,
    pub func: Val,
}

pub struct Property {
    pub fget: Option<Val>,
    pub fset: Option<Val>,
    pub fdel: Option<Val>,
}

pub struct SuperObj {
    /// Lookup starts after this class in the receiver's MRO
    pub this: Rc<Class>,
    pub receiver: Val,
}

/* ===================== Classes & Instances ===================== */

/// Built-in types that are exposed as class objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinType {
    Object,
    Type,
    NoneType,
    Bool,
    Int,
    Float,
    Str,
    List,
    Tuple,
    Dict,
    Set,
    Range,
    Slice,
    Function,
    BuiltinFunction,
    Method,
    Module,
    Property,
    StaticMethod,
    ClassMethod,
    Super,
    Iterator,
    DictView,
    Ellipsis,
    NotImplementedType,
}

/// Where a class object comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassOrigin {
    Builtin(BuiltinType),
    Exception(ExcKind),
    User,
}

pub struct Class {
    pub name: String,
    pub qualname: String,
    pub bases: Vec<Rc<Class>>,
    /// Method resolution order without the class itself, nearest first
    pub ancestors: Vec<Rc<Class>>,
    pub attrs: RefCell<IndexMap<String, Val>>,
    pub origin: ClassOrigin,
}

impl Class {
    /// Full method resolution order, starting with `this`
    pub fn mro(this: &Rc<Class>) -> Vec<Rc<Class>> {
        let mut out = Vec::with_capacity(this.ancestors.len() + 1);
        out.push(this.clone());
        out.extend(this.ancestors.iter().cloned());
        out
    }

    /// Find an attribute along the MRO
    pub fn lookup(&self, name: &str) -> Option<Val> {
        if let Some(v) = self.attrs.borrow().get(name) {
            return Some(v.clone());
        }
        self.ancestors
            .iter()
            .find_map(|cls| cls.attrs.borrow().get(name).cloned())
    }

    /// Like `lookup` but skips the built-in `object` class
    pub fn lookup_user(&self, name: &str) -> Option<Val> {
        if let Some(v) = self.attrs.borrow().get(name) {
            return Some(v.clone());
        }
        self.ancestors
            .iter()
            .filter(|cls| cls.origin == ClassOrigin::User)
            .find_map(|cls| cls.attrs.borrow().get(name).cloned())
    }

    pub fn is_subclass(this: &Rc<Class>, other: &Rc<Class>) -> bool {
        Rc::ptr_eq(this, other) || this.ancestors.iter().any(|a| Rc::ptr_eq(a, other))
    }

    /// The built-in exception this class derives from, if any
    pub fn exception_kind(&self) -> Option<ExcKind> {
        if let ClassOrigin::Exception(kind) = self.origin {
            return Some(kind);
        }
        self.ancestors.iter().find_map(|cls| match cls.origin {
            ClassOrigin::Exception(kind) => Some(kind),
            _ => None,
        })
    }

    pub fn is_exception(&self) -> bool {
        self.exception_kind().is_some()
    }

    pub fn is_user(&self) -> bool {
        self.origin == ClassOrigin::User
    }
}

/// State carried by exception instances
#[derive(Default)]
pub struct ExcState {
    pub args: Vec<Val>,
    /// Innermost entry first
    pub traceback: Vec<TraceEntry>,
    pub cause: Option<Val>,
    pub context: Option<Val>,
    pub suppress_context: bool,
}

pub struct Instance {
    pub class: Rc<Class>,
    pub attrs: RefCell<IndexMap<String, Val>>,
    /// Present on instances of exception classes
    pub exc: Option<RefCell<ExcState>>,
}

impl Instance {
    pub fn new(class: Rc<Class>) -> Rc<Instance> {
        let exc = class.is_exception().then(|| RefCell::new(ExcState::default()));
        Rc::new(Instance {
            class,
            attrs: RefCell::new(IndexMap::new()),
            exc,
        })
    }
}

pub struct ModuleObj {
    pub name: String,
    pub attrs: RefCell<IndexMap<String, Val>>,
}

/* ===================== Iterators ===================== */

pub struct IterObj {
    /// Python type name (`list_iterator`, `enumerate`, ...)
    pub kind: &'static str,
    pub state: RefCell<IterState>,
}

impl IterObj {
    pub fn new(kind: &'static str, state: IterState) -> Val {
        Val::Iterator(Rc::new(IterObj {
            kind,
            state: RefCell::new(state),
        }))
    }
}

pub enum IterState {
    /// Live view of a list; sees appends made during iteration
    List {
        list: Rc<RefCell<Vec<Val>>>,
        idx: usize,
    },
    /// Snapshot of items
    Items { items: Vec<Val>, idx: usize },
    Range { next: i64, remaining: i64, step: i64 },
    Dict {
        dict: Rc<RefCell<DictMap>>,
        idx: usize,
        len: usize,
        kind: ViewKind,
    },
    Set {
        set: Rc<RefCell<SetMap>>,
        idx: usize,
        len: usize,
    },
    Enumerate { inner: Val, count: i64 },
    Zip { inners: Vec<Val> },
    Map { func: Val, inners: Vec<Val> },
    Filter { func: Val, inner: Val },
    Exhausted,
}
