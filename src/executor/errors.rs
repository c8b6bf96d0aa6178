//! Runtime faults, the built-in exception hierarchy, and traceback rendering

use std::rc::Rc;

use super::types::values::{Class, Instance, Val};
use super::vm::VM;

/* ===================== Built-in Exceptions ===================== */

/// Built-in exception classes, each with its CPython name and parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExcKind {
    BaseException,
    Exception,
    ArithmeticError,
    ZeroDivisionError,
    OverflowError,
    AssertionError,
    AttributeError,
    LookupError,
    IndexError,
    KeyError,
    NameError,
    UnboundLocalError,
    RuntimeError,
    RecursionError,
    NotImplementedError,
    TypeError,
    ValueError,
    StopIteration,
    ImportError,
    ModuleNotFoundError,
    EOFError,
    MemoryError,
}

impl ExcKind {
    /// Every kind, parents before children
    pub const ALL: [ExcKind; 22] = [
        ExcKind::BaseException,
        ExcKind::Exception,
        ExcKind::ArithmeticError,
        ExcKind::ZeroDivisionError,
        ExcKind::OverflowError,
        ExcKind::AssertionError,
        ExcKind::AttributeError,
        ExcKind::LookupError,
        ExcKind::IndexError,
        ExcKind::KeyError,
        ExcKind::NameError,
        ExcKind::UnboundLocalError,
        ExcKind::RuntimeError,
        ExcKind::RecursionError,
        ExcKind::NotImplementedError,
        ExcKind::TypeError,
        ExcKind::ValueError,
        ExcKind::StopIteration,
        ExcKind::ImportError,
        ExcKind::ModuleNotFoundError,
        ExcKind::EOFError,
        ExcKind::MemoryError,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ExcKind::BaseException => "BaseException",
            ExcKind::Exception => "Exception",
            ExcKind::ArithmeticError => "ArithmeticError",
            ExcKind::ZeroDivisionError => "ZeroDivisionError",
            ExcKind::OverflowError => "OverflowError",
            ExcKind::AssertionError => "AssertionError",
            ExcKind::AttributeError => "AttributeError",
            ExcKind::LookupError => "LookupError",
            ExcKind::IndexError => "IndexError",
            ExcKind::KeyError => "KeyError",
            ExcKind::NameError => "NameError",
            ExcKind::UnboundLocalError => "UnboundLocalError",
            ExcKind::RuntimeError => "RuntimeError",
            ExcKind::RecursionError => "RecursionError",
            ExcKind::NotImplementedError => "NotImplementedError",
            ExcKind::TypeError => "TypeError",
            ExcKind::ValueError => "ValueError",
            ExcKind::StopIteration => "StopIteration",
            ExcKind::ImportError => "ImportError",
            ExcKind::ModuleNotFoundError => "ModuleNotFoundError",
            ExcKind::EOFError => "EOFError",
            ExcKind::MemoryError => "MemoryError",
        }
    }

    pub fn parent(&self) -> Option<ExcKind> {
        match self {
            ExcKind::BaseException => None,
            ExcKind::Exception => Some(ExcKind::BaseException),
            ExcKind::ZeroDivisionError | ExcKind::OverflowError => Some(ExcKind::ArithmeticError),
            ExcKind::IndexError | ExcKind::KeyError => Some(ExcKind::LookupError),
            ExcKind::UnboundLocalError => Some(ExcKind::NameError),
            ExcKind::RecursionError | ExcKind::NotImplementedError => Some(ExcKind::RuntimeError),
            ExcKind::ModuleNotFoundError => Some(ExcKind::ImportError),
            _ => Some(ExcKind::Exception),
        }
    }

    /// `self` is `other` or derives from it
    pub fn is_subkind(self, other: ExcKind) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind == other {
                return true;
            }
            current = kind.parent();
        }
        false
    }
}

/* ===================== Faults ===================== */

/// One frame of a Python traceback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEntry {
    /// Frame name: `<module>`, a function or a class name
    pub name: Rc<str>,
    pub line_no: usize,
    /// Activation the entry was recorded in
    pub activation: u64,
}

/// Uncatchable termination of the run
#[derive(Debug, Clone)]
pub struct FatalError {
    pub error_type: &'static str,
    pub message: String,
    /// Innermost entry first
    pub traceback: Vec<TraceEntry>,
}

/// Error raised while executing code
#[derive(Debug, Clone)]
pub enum Fault {
    /// An exception object raised by the program
    Raised(Val),
    /// A built-in exception that has not been instantiated yet
    Builtin { kind: ExcKind, args: Vec<Val> },
    /// Time and trace limits; skips `except` and `finally`
    Fatal(Box<FatalError>),
}

pub type ExecResult<T> = Result<T, Fault>;

impl Fault {
    pub fn new(kind: ExcKind, message: impl Into<String>) -> Self {
        let message: String = message.into();
        Fault::Builtin {
            kind,
            args: vec![Val::str(&message)],
        }
    }

    /// Exception without arguments (`raise StopIteration`)
    pub fn bare(kind: ExcKind) -> Self {
        Fault::Builtin {
            kind,
            args: Vec::new(),
        }
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Fault::new(ExcKind::TypeError, message)
    }

    pub fn value_error(message: impl Into<String>) -> Self {
        Fault::new(ExcKind::ValueError, message)
    }

    pub fn index_error(message: impl Into<String>) -> Self {
        Fault::new(ExcKind::IndexError, message)
    }

    pub fn attribute_error(message: impl Into<String>) -> Self {
        Fault::new(ExcKind::AttributeError, message)
    }

    pub fn zero_division(message: impl Into<String>) -> Self {
        Fault::new(ExcKind::ZeroDivisionError, message)
    }

    pub fn overflow(message: impl Into<String>) -> Self {
        Fault::new(ExcKind::OverflowError, message)
    }

    pub fn memory_error() -> Self {
        Fault::bare(ExcKind::MemoryError)
    }

    /// `KeyError` carries the missing key itself
    pub fn key_error(key: Val) -> Self {
        Fault::Builtin {
            kind: ExcKind::KeyError,
            args: vec![key],
        }
    }

    pub fn name_error(name: &str) -> Self {
        Fault::new(ExcKind::NameError, format!("name '{}' is not defined", name))
    }

    pub fn timeout(limit_ms: u128) -> Self {
        Fault::Fatal(Box::new(FatalError {
            error_type: "TimeoutError",
            message: format!("execution exceeded the time limit of {} ms", limit_ms),
            traceback: Vec::new(),
        }))
    }

    pub fn resource_limit(message: impl Into<String>) -> Self {
        Fault::Fatal(Box::new(FatalError {
            error_type: "ResourceLimitError",
            message: message.into(),
            traceback: Vec::new(),
        }))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Fault::Fatal(_))
    }

    /// Whether an `except kind:` clause would catch this fault
    pub fn matches(&self, kind: ExcKind) -> bool {
        match self {
            Fault::Builtin { kind: own, .. } => own.is_subkind(kind),
            Fault::Raised(Val::Instance(inst)) => inst
                .class
                .exception_kind()
                .is_some_and(|own| own.is_subkind(kind)),
            _ => false,
        }
    }
}

/* ===================== Exception Objects ===================== */

impl VM {
    /// Instantiate a built-in exception
    pub fn new_exception(&mut self, kind: ExcKind, args: Vec<Val>) -> Val {
        let class = self.types.exception(kind);
        let inst = Instance::new(class);
        if let Some(exc) = &inst.exc {
            exc.borrow_mut().args = args;
        }
        Val::Instance(inst)
    }

    /// Turn a pending built-in fault into an exception object
    pub fn materialize(&mut self, fault: Fault) -> Fault {
        match fault {
            Fault::Builtin { kind, args } => Fault::Raised(self.new_exception(kind, args)),
            other => other,
        }
    }

    /// Text after the colon in `Type: message`
    pub fn exception_message(&mut self, exc: &Val) -> String {
        match self.to_str(exc) {
            Ok(text) => text,
            Err(_) => "<exception str() failed>".to_string(),
        }
    }
}

/// Class name shown for an exception
pub fn exception_type_name(exc: &Val) -> String {
    match exc {
        Val::Instance(inst) => inst.class.qualname.clone(),
        other => other.type_name(),
    }
}

pub fn exception_args(exc: &Val) -> Vec<Val> {
    match exc {
        Val::Instance(inst) => match &inst.exc {
            Some(state) => state.borrow().args.clone(),
            None => Vec::new(),
        },
        _ => Vec::new(),
    }
}

pub fn exception_class(exc: &Val) -> Option<Rc<Class>> {
    match exc {
        Val::Instance(inst) if inst.exc.is_some() => Some(inst.class.clone()),
        _ => None,
    }
}

/* ===================== Traceback Rendering ===================== */

const CAUSE_SEPARATOR: &str =
    "\nThe above exception was the direct cause of the following exception:\n\n";
const CONTEXT_SEPARATOR: &str =
    "\nDuring handling of the above exception, another exception occurred:\n\n";

fn render_entries(entries: &[TraceEntry], source_lines: &[String], out: &mut String) {
    if entries.is_empty() {
        return;
    }
    out.push_str("Traceback (most recent call last):\n");
    for entry in entries.iter().rev() {
        out.push_str(&format!(
            "  File \"<string>\", line {}, in {}\n",
            entry.line_no, entry.name
        ));
        if let Some(line) = source_lines.get(entry.line_no.wrapping_sub(1)) {
            let line = line.trim();
            if !line.is_empty() {
                out.push_str("    ");
                out.push_str(line);
                out.push('\n');
            }
        }
    }
}

/// Render an exception and its cause / context chain the way CPython prints it
pub fn format_exception(vm: &mut VM, exc: &Val, source_lines: &[String]) -> String {
    let mut out = String::new();
    let mut seen = Vec::new();
    format_chain(vm, exc, source_lines, &mut seen, &mut out);
    out
}

fn format_chain(
    vm: &mut VM,
    exc: &Val,
    source_lines: &[String],
    seen: &mut Vec<usize>,
    out: &mut String,
) {
    if let Some(id) = exc.identity() {
        if seen.contains(&id) {
            return;
        }
        seen.push(id);
    }

    let Val::Instance(inst) = exc else {
        out.push_str(&exc.type_name());
        out.push('\n');
        return;
    };
    let (traceback, cause, context) = match &inst.exc {
        Some(state) => {
            let state = state.borrow();
            let context = if state.suppress_context {
                None
            } else {
                state.context.clone()
            };
            (state.traceback.clone(), state.cause.clone(), context)
        }
        None => (Vec::new(), None, None),
    };

    if let Some(cause) = cause {
        format_chain(vm, &cause, source_lines, seen, out);
        out.push_str(CAUSE_SEPARATOR);
    } else if let Some(context) = context {
        format_chain(vm, &context, source_lines, seen, out);
        out.push_str(CONTEXT_SEPARATOR);
    }

    render_entries(&traceback, source_lines, out);
    let message = vm.exception_message(exc);
    out.push_str(&exception_type_name(exc));
    if !message.is_empty() {
        out.push_str(": ");
        out.push_str(&message);
    }
    out.push('\n');
}

/// Render a fatal limit violation with the location it stopped at
pub fn format_fatal(fatal: &FatalError, source_lines: &[String]) -> String {
    let mut out = String::new();
    render_entries(&fatal.traceback, source_lines, &mut out);
    out.push_str(&format!("{}: {}\n", fatal.error_type, fatal.message));
    out
}
