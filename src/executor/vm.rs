//! VM state, activations, and name resolution

use indexmap::IndexMap;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::errors::{ExcKind, ExecResult, Fault, TraceEntry};
use super::exec_loop::run_until_done;
use super::output::OutputBuffer;
use super::registry::TypeRegistry;
use super::stdlib;
use super::types::values::{Binder, Function, ModuleObj, Scope};
use super::types::{Control, Frame, Stmt, Val};
use crate::parser::Module;

/* ===================== Limits & Hooks ===================== */

/// Cooperative execution limits
#[derive(Debug, Clone)]
pub struct Limits {
    pub timeout: Option<Duration>,
    pub recursion_limit: usize,
    pub max_trace_steps: usize,
    pub max_output_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_millis(5000)),
            recursion_limit: 1000,
            max_trace_steps: 50_000,
            max_output_bytes: 1024 * 1024,
        }
    }
}

/// Observer called at every statement boundary of user code.
///
/// The hook is detached from the VM while it runs, so anything it evaluates
/// (a user `__repr__`) is not observed.
pub trait StepHook {
    fn on_step(&mut self, vm: &mut VM, line_no: usize);
}

/// Result of executing one step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// More work remains
    Continue,
    /// The frames of the current activation are exhausted
    Done,
}

/* ===================== Activations ===================== */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Module,
    Function,
    Class,
}

/// One Python frame: the module body, a function call or a class body
pub struct Activation {
    pub id: u64,
    /// Name shown in tracebacks
    pub name: Rc<str>,
    pub kind: ScopeKind,
    pub locals: Rc<Scope>,
    pub globals: Rc<Scope>,
    pub closure: Rc<[Rc<Scope>]>,
    /// Function being executed, for zero-argument `super()`
    pub function: Option<Rc<Function>>,
    /// Comprehension scopes currently being evaluated, innermost last
    pub comprehensions: Vec<Rc<Scope>>,
    /// Prefix for qualified names of functions and classes defined here
    pub qualprefix: String,
    /// Line of the statement currently executing
    pub line_no: usize,
}

impl Activation {
    fn is_lambda(&self) -> bool {
        self.function.as_ref().is_some_and(|f| f.def.is_lambda)
    }
}

/* ===================== VM ===================== */

pub struct VM {
    pub frames: Vec<Frame>,
    pub control: Control,
    pub activations: Vec<Activation>,
    pub globals: Rc<Scope>,
    pub builtins: Rc<Scope>,
    pub types: TypeRegistry,
    pub output: OutputBuffer,
    pub limits: Limits,
    /// Exceptions currently being handled by `except` blocks, innermost last
    pub handling: Vec<Val>,
    /// Containers currently being rendered by `repr`
    pub(crate) repr_guard: Vec<usize>,
    /// Nesting of calls and native recursion
    pub(crate) depth: usize,
    hook: Option<Box<dyn StepHook>>,
    steps: usize,
    deadline: Option<Instant>,
    identities: HashMap<usize, (u64, Val)>,
    modules: HashMap<String, Val>,
    next_activation: u64,
}

const ADDRESS_BASE: u64 = 0x7f00_0000_0000;
const ADDRESS_STRIDE: u64 = 0x30;

impl VM {
    pub fn new(limits: Limits) -> Self {
        let types = TypeRegistry::new();
        let builtins = Scope::new(Binder::Module);
        stdlib::inject_builtins(&builtins, &types);

        let globals = Scope::new(Binder::Module);
        let builtins_module = ModuleObj {
            name: "builtins".to_string(),
            attrs: std::cell::RefCell::new(builtins.vars.borrow().clone()),
        };
        globals.set("__builtins__", Val::Module(Rc::new(builtins_module)));

        let output = OutputBuffer::new(limits.max_output_bytes);
        Self {
            frames: Vec::new(),
            control: Control::None,
            activations: Vec::new(),
            globals,
            builtins,
            types,
            output,
            limits,
            handling: Vec::new(),
            repr_guard: Vec::new(),
            depth: 0,
            hook: None,
            steps: 0,
            deadline: None,
            identities: HashMap::new(),
            modules: HashMap::new(),
            next_activation: 0,
        }
    }

    pub fn set_hook(&mut self, hook: Box<dyn StepHook>) {
        self.hook = Some(hook);
    }

    pub fn clear_hook(&mut self) -> Option<Box<dyn StepHook>> {
        self.hook.take()
    }

    /// Execute a parsed module in this VM's global namespace
    pub fn run_module(&mut self, module: &Module) -> ExecResult<()> {
        self.deadline = self.limits.timeout.map(|t| Instant::now() + t);
        let body: Arc<[Stmt]> = match &module.body {
            Stmt::Block { body, .. } => body.clone(),
            other => Arc::from(vec![other.clone()]),
        };

        let globals = self.globals.clone();
        self.push_activation(
            "<module>",
            ScopeKind::Module,
            globals,
            Rc::from(Vec::new()),
            None,
            String::new(),
        );
        let base = self.frames.len();
        self.frames.push(Frame::block(body));
        let result = run_until_done(self, base);
        self.activations.pop();
        result.map(|_| ())
    }

    /* ===================== Activations ===================== */

    pub fn push_activation(
        &mut self,
        name: &str,
        kind: ScopeKind,
        locals: Rc<Scope>,
        closure: Rc<[Rc<Scope>]>,
        function: Option<Rc<Function>>,
        qualprefix: String,
    ) {
        self.next_activation += 1;
        self.activations.push(Activation {
            id: self.next_activation,
            name: Rc::from(name),
            kind,
            locals,
            globals: self.globals.clone(),
            closure,
            function,
            comprehensions: Vec::new(),
            qualprefix,
            line_no: 0,
        });
    }

    pub fn activation(&self) -> Option<&Activation> {
        self.activations.last()
    }

    pub fn activation_mut(&mut self) -> Option<&mut Activation> {
        self.activations.last_mut()
    }

    pub fn set_line(&mut self, line_no: usize) {
        if let Some(act) = self.activations.last_mut() {
            act.line_no = line_no;
        }
    }

    /* ===================== Limits ===================== */

    /// Fail with a fatal `TimeoutError` once the wall-clock deadline passed
    pub fn check_deadline(&self) -> ExecResult<()> {
        if let (Some(deadline), Some(timeout)) = (self.deadline, self.limits.timeout) {
            if Instant::now() >= deadline {
                return Err(Fault::timeout(timeout.as_millis()));
            }
        }
        Ok(())
    }

    /// Guard native recursion (nested containers, calls)
    pub fn enter(&mut self) -> ExecResult<()> {
        if self.depth >= self.limits.recursion_limit {
            return Err(Fault::new(
                ExcKind::RecursionError,
                "maximum recursion depth exceeded",
            ));
        }
        self.depth += 1;
        Ok(())
    }

    pub fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /* ===================== Tracing ===================== */

    /// Report a statement boundary to the step hook
    pub fn record_step(&mut self, line_no: usize) -> ExecResult<()> {
        if self.hook.is_none() || self.activation().is_some_and(Activation::is_lambda) {
            return Ok(());
        }
        self.steps += 1;
        if self.steps > self.limits.max_trace_steps {
            return Err(Fault::resource_limit(format!(
                "trace exceeded the limit of {} steps",
                self.limits.max_trace_steps
            )));
        }
        if let Some(mut hook) = self.hook.take() {
            hook.on_step(self, line_no);
            self.hook = Some(hook);
        }
        Ok(())
    }

    /// Bindings of the current frame, excluding internal names
    pub fn frame_bindings(&self) -> Vec<(String, Val)> {
        let Some(act) = self.activation() else {
            return Vec::new();
        };
        let vars = act.locals.vars.borrow();
        vars.iter()
            .filter(|(name, _)| name.as_str() != "__builtins__")
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /* ===================== Faults ===================== */

    /// Start unwinding with `fault`, raised at the current line
    pub fn throw(&mut self, fault: Fault) {
        let fault = self.materialize(fault);
        let (act_id, act_name, line_no) = match self.activation() {
            Some(act) => (act.id, act.name.clone(), act.line_no),
            None => (0, Rc::from("<module>"), 0),
        };
        let entry = TraceEntry {
            name: act_name,
            line_no,
            activation: act_id,
        };

        match &fault {
            Fault::Raised(Val::Instance(inst)) => {
                if let Some(state) = &inst.exc {
                    let mut state = state.borrow_mut();
                    if state.traceback.last().map(|e| e.activation) != Some(act_id) {
                        state.traceback.push(entry.clone());
                    }
                    if state.context.is_none() {
                        let own = Rc::as_ptr(inst) as usize;
                        if let Some(handled) = self.handling.last() {
                            if handled.identity() != Some(own) {
                                state.context = Some(handled.clone());
                            }
                        }
                    }
                }
            }
            _ => {}
        }
        let fault = match fault {
            Fault::Fatal(mut fatal) => {
                if fatal.traceback.last().map(|e| e.activation) != Some(act_id) {
                    fatal.traceback.push(entry);
                }
                Fault::Fatal(fatal)
            }
            other => other,
        };
        self.control = Control::Throw(fault);
    }

    /* ===================== Identity ===================== */

    /// Stable per-execution identity, rendered as an address in reprs
    pub fn id_of(&mut self, value: &Val) -> u64 {
        let key = match value {
            Val::None => return ADDRESS_BASE - 0x100,
            Val::Bool(b) => return ADDRESS_BASE - 0x200 + *b as u64 * 0x20,
            Val::Int(n) => return (ADDRESS_BASE / 2).wrapping_add((*n as u64).wrapping_mul(0x20)),
            Val::Float(x) => return (ADDRESS_BASE / 4).wrapping_add(x.to_bits() % 0x1000_0000 * 0x10),
            Val::Ellipsis => return ADDRESS_BASE - 0x300,
            Val::NotImplemented => return ADDRESS_BASE - 0x400,
            Val::Range(r) => {
                return (ADDRESS_BASE / 8)
                    .wrapping_add((r.start as u64).wrapping_mul(31))
                    .wrapping_add((r.stop as u64).wrapping_mul(17))
            }
            other => match other.identity() {
                Some(ptr) => ptr,
                None => return ADDRESS_BASE,
            },
        };
        let next = self.identities.len() as u64 + 1;
        // The registry keeps the object alive so its address is never reused
        let entry = self
            .identities
            .entry(key)
            .or_insert_with(|| (next, value.clone()));
        ADDRESS_BASE + entry.0 * ADDRESS_STRIDE
    }

    /* ===================== Name Resolution ===================== */

    fn current(&self) -> ExecResult<&Activation> {
        self.activations
            .last()
            .ok_or_else(|| Fault::new(ExcKind::RuntimeError, "no active frame"))
    }

    pub fn load_name(&self, name: &str) -> ExecResult<Val> {
        let act = self.current()?;
        for scope in act.comprehensions.iter().rev() {
            if let Some(value) = scope.get(name) {
                return Ok(value);
            }
        }

        match act.kind {
            ScopeKind::Function => {
                if let Binder::Function(def) = &act.locals.binder {
                    if def.local_names.contains(name) {
                        return act.locals.get(name).ok_or_else(|| {
                            Fault::new(
                                ExcKind::UnboundLocalError,
                                format!(
                                    "cannot access local variable '{}' where it is not associated with a value",
                                    name
                                ),
                            )
                        });
                    }
                    if !def.globals.contains(name) {
                        if let Some(value) = lookup_closure(&act.closure, name)? {
                            return Ok(value);
                        }
                    }
                }
            }
            ScopeKind::Class => {
                if let Some(value) = act.locals.get(name) {
                    return Ok(value);
                }
                if let Some(value) = lookup_closure(&act.closure, name)? {
                    return Ok(value);
                }
            }
            ScopeKind::Module => {}
        }

        if let Some(value) = act.globals.get(name) {
            return Ok(value);
        }
        self.builtins
            .get(name)
            .ok_or_else(|| Fault::name_error(name))
    }

    /// Scope an assignment to `name` writes into
    fn store_scope(&self, name: &str) -> ExecResult<Rc<Scope>> {
        let act = self.current()?;
        if let Some(scope) = act.comprehensions.iter().rev().find(|s| s.binds(name)) {
            return Ok(scope.clone());
        }
        if let (ScopeKind::Function, Binder::Function(def)) = (act.kind, &act.locals.binder) {
            if def.globals.contains(name) {
                return Ok(act.globals.clone());
            }
            if def.nonlocals.contains(name) {
                if let Some(scope) = act.closure.iter().rev().find(|s| s.binds(name)) {
                    return Ok(scope.clone());
                }
            }
        }
        Ok(act.locals.clone())
    }

    pub fn store_name(&mut self, name: &str, value: Val) -> ExecResult<()> {
        self.store_scope(name)?.set(name, value);
        Ok(())
    }

    pub fn delete_name(&mut self, name: &str) -> ExecResult<()> {
        let scope = self.store_scope(name)?;
        if scope.remove(name).is_some() {
            return Ok(());
        }
        let is_local = matches!(&scope.binder, Binder::Function(def) if def.local_names.contains(name));
        if is_local {
            return Err(Fault::new(
                ExcKind::UnboundLocalError,
                format!(
                    "cannot access local variable '{}' where it is not associated with a value",
                    name
                ),
            ));
        }
        Err(Fault::name_error(name))
    }

    /* ===================== Modules ===================== */

    /// Resolve `import name`
    pub fn import_module(&mut self, name: &str) -> ExecResult<Val> {
        if let Some(module) = self.modules.get(name) {
            return Ok(module.clone());
        }
        let attrs: IndexMap<String, Val> = match stdlib::module_attrs(name) {
            Some(attrs) => attrs,
            None => {
                return Err(Fault::new(
                    ExcKind::ModuleNotFoundError,
                    format!("No module named '{}'", name),
                ))
            }
        };
        let module = Val::Module(Rc::new(ModuleObj {
            name: name.to_string(),
            attrs: std::cell::RefCell::new(attrs),
        }));
        self.modules.insert(name.to_string(), module.clone());
        Ok(module)
    }
}

fn lookup_closure(closure: &[Rc<Scope>], name: &str) -> ExecResult<Option<Val>> {
    for scope in closure.iter().rev() {
        if scope.binds(name) {
            return match scope.get(name) {
                Some(value) => Ok(Some(value)),
                None => Err(Fault::new(
                    ExcKind::NameError,
                    format!(
                        "cannot access free variable '{}' where it is not associated with a value in enclosing scope",
                        name
                    ),
                )),
            };
        }
    }
    Ok(None)
}
