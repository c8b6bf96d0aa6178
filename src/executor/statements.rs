//! Statement execution handlers
//!
//! Simple statements run to completion inside `execute_block`. Compound
//! statements that contain suites push a frame of their own; the frame's
//! phase records which suite runs next when the frame is back on top.

use std::sync::Arc;

use super::errors::{ExcKind, ExecResult, Fault};
use super::exec_loop::run_until_done;
use super::expressions::{assign, closure_for_definition, delete_target, eval_expr, make_function};
use super::types::ast::{ExceptHandler, Expr, ImportAlias, Stmt};
use super::types::values::{Binder, Class, Scope};
use super::types::{Control, ForPhase, Frame, FrameKind, StmtRef, TryPhase, Val, WhilePhase};
use super::vm::{ScopeKind, Step, VM};

/* ===================== Frame Helpers ===================== */

/// Push the block frame for a suite
fn push_suite(vm: &mut VM, suite: &Stmt) {
    match suite {
        Stmt::Block { body, .. } => vm.frames.push(Frame::block(body.clone())),
        other => vm.frames.push(Frame::block(Arc::from(vec![other.clone()]))),
    }
}

fn top_kind(vm: &mut VM) -> Option<&mut FrameKind> {
    vm.frames.last_mut().map(|frame| &mut frame.kind)
}

/* ===================== Block ===================== */

/// Execute the next statement of a block
pub fn execute_block(vm: &mut VM, body: Arc<[Stmt]>, idx: usize) -> Step {
    // Block complete, pop frame
    if idx >= body.len() {
        vm.frames.pop();
        return Step::Continue;
    }

    if let Some(FrameKind::Block { idx: next, .. }) = top_kind(vm) {
        *next = idx + 1;
    }

    vm.set_line(body[idx].span().line_no());
    let result = vm
        .check_deadline()
        .and_then(|_| execute_statement(vm, &body, idx));
    if let Err(fault) = result {
        vm.throw(fault);
    }
    Step::Continue
}

/// Run one statement, recording a step when it completes
fn execute_statement(vm: &mut VM, body: &Arc<[Stmt]>, idx: usize) -> ExecResult<()> {
    let stmt = &body[idx];
    let line = stmt.span().line_no();

    match stmt {
        Stmt::Block { .. } => {
            push_suite(vm, stmt);
            return Ok(());
        }

        Stmt::Expr { expr, .. } => {
            eval_expr(vm, expr)?;
        }

        Stmt::Assign { targets, value, .. } => {
            let value = eval_expr(vm, value)?;
            for target in targets {
                assign(vm, target, value.clone())?;
            }
        }

        Stmt::AugAssign {
            target, op, value, ..
        } => super::expressions::aug_assign(vm, target, *op, value)?,

        Stmt::If { .. } => return execute_if(vm, stmt),

        Stmt::While { .. } => {
            vm.frames.push(Frame {
                kind: FrameKind::While {
                    node: StmtRef::new(body.clone(), idx),
                    phase: WhilePhase::Test,
                },
            });
            return Ok(());
        }

        Stmt::For { iterable, .. } => {
            let iterable = eval_expr(vm, iterable)?;
            let iter = vm.get_iter(&iterable)?;
            vm.frames.push(Frame {
                kind: FrameKind::For {
                    node: StmtRef::new(body.clone(), idx),
                    iter,
                    phase: ForPhase::Advance,
                },
            });
            return Ok(());
        }

        Stmt::Try { body: try_body, .. } => {
            vm.frames.push(Frame {
                kind: FrameKind::Try {
                    node: StmtRef::new(body.clone(), idx),
                    phase: TryPhase::Body,
                    pending: None,
                    handler_name: None,
                },
            });
            push_suite(vm, try_body);
            return Ok(());
        }

        Stmt::FunctionDef {
            def, decorators, ..
        } => {
            let decorators = eval_all(vm, decorators)?;
            let mut func = make_function(vm, def)?;
            for decorator in decorators.iter().rev() {
                func = vm.call(decorator, vec![func])?;
            }
            vm.store_name(&def.name, func)?;
        }

        Stmt::ClassDef {
            name,
            bases,
            body: class_body,
            decorators,
            ..
        } => {
            let decorators = eval_all(vm, decorators)?;
            let mut class = execute_class_body(vm, name, bases, class_body)?;
            for decorator in decorators.iter().rev() {
                class = vm.call(decorator, vec![class])?;
            }
            vm.set_line(line);
            vm.store_name(name, class)?;
        }

        Stmt::Return { value, .. } => {
            let value = match value {
                Some(expr) => eval_expr(vm, expr)?,
                None => Val::None,
            };
            vm.record_step(line)?;
            vm.control = Control::Return(value);
            return Ok(());
        }

        Stmt::Raise { exc, cause, .. } => return Err(execute_raise(vm, exc, cause)),

        Stmt::Assert { test, msg, .. } => {
            let value = eval_expr(vm, test)?;
            if !vm.truthy(&value)? {
                return Err(match msg {
                    Some(msg) => {
                        let msg = eval_expr(vm, msg)?;
                        Fault::Builtin {
                            kind: ExcKind::AssertionError,
                            args: vec![msg],
                        }
                    }
                    None => Fault::bare(ExcKind::AssertionError),
                });
            }
        }

        Stmt::Delete { targets, .. } => {
            for target in targets {
                delete_target(vm, target)?;
            }
        }

        Stmt::Import { names, .. } => {
            for alias in names {
                execute_import(vm, alias)?;
            }
        }

        Stmt::ImportFrom { module, names, .. } => execute_import_from(vm, module, names)?,

        Stmt::Break { .. } => {
            vm.record_step(line)?;
            vm.control = Control::Break;
            return Ok(());
        }

        Stmt::Continue { .. } => {
            vm.record_step(line)?;
            vm.control = Control::Continue;
            return Ok(());
        }

        Stmt::Global { .. } | Stmt::Nonlocal { .. } | Stmt::Pass { .. } => {}

        Stmt::Unsupported { feature, .. } => {
            return Err(Fault::new(
                ExcKind::NotImplementedError,
                format!("'{}' is not supported", feature),
            ))
        }
    }

    vm.record_step(line)
}

fn eval_all(vm: &mut VM, exprs: &[Expr]) -> ExecResult<Vec<Val>> {
    exprs.iter().map(|e| eval_expr(vm, e)).collect()
}

/* ===================== If ===================== */

/// Evaluate the `if` / `elif` chain and push the chosen suite
fn execute_if(vm: &mut VM, stmt: &Stmt) -> ExecResult<()> {
    let mut current = stmt;
    loop {
        let Stmt::If {
            test,
            then_s,
            else_s,
            span,
        } = current
        else {
            push_suite(vm, current);
            return Ok(());
        };

        vm.set_line(span.line_no());
        let value = eval_expr(vm, test)?;
        let truth = vm.truthy(&value)?;
        vm.record_step(span.line_no())?;

        if truth {
            push_suite(vm, then_s);
            return Ok(());
        }
        match else_s {
            Some(next) => current = next,
            None => return Ok(()),
        }
    }
}

/* ===================== While ===================== */

/// Execute While statement
pub fn execute_while(vm: &mut VM) -> Step {
    let Some(FrameKind::While { node, phase }) = top_kind(vm) else {
        return Step::Continue;
    };
    let (node, phase) = (node.clone(), *phase);

    // The else suite finished
    if phase == WhilePhase::Else {
        vm.frames.pop();
        return Step::Continue;
    }

    let Stmt::While {
        test,
        body,
        else_s,
        span,
    } = node.get()
    else {
        vm.frames.pop();
        return Step::Continue;
    };

    let line = span.line_no();
    vm.set_line(line);
    let result = vm
        .check_deadline()
        .and_then(|_| eval_expr(vm, test))
        .and_then(|value| vm.truthy(&value))
        .and_then(|truth| vm.record_step(line).map(|_| truth));

    match result {
        Ok(true) => push_suite(vm, body),
        Ok(false) => match else_s {
            Some(else_s) => {
                if let Some(FrameKind::While { phase, .. }) = top_kind(vm) {
                    *phase = WhilePhase::Else;
                }
                push_suite(vm, else_s);
            }
            None => {
                vm.frames.pop();
            }
        },
        Err(fault) => vm.throw(fault),
    }
    Step::Continue
}

/* ===================== For ===================== */

/// Execute For statement: advance the iterator and run the body once
pub fn execute_for(vm: &mut VM) -> Step {
    let Some(FrameKind::For { node, iter, phase }) = top_kind(vm) else {
        return Step::Continue;
    };
    let (node, iter, phase) = (node.clone(), iter.clone(), *phase);

    if phase == ForPhase::Else {
        vm.frames.pop();
        return Step::Continue;
    }

    let Stmt::For {
        target,
        body,
        else_s,
        span,
        ..
    } = node.get()
    else {
        vm.frames.pop();
        return Step::Continue;
    };

    let line = span.line_no();
    vm.set_line(line);
    let result = vm.check_deadline().and_then(|_| vm.next_item(&iter));

    let outcome = match result {
        Ok(Some(item)) => assign(vm, target, item)
            .and_then(|_| vm.record_step(line))
            .map(|_| push_suite(vm, body)),
        Ok(None) => vm.record_step(line).map(|_| match else_s {
            Some(else_s) => {
                if let Some(FrameKind::For { phase, .. }) = top_kind(vm) {
                    *phase = ForPhase::Else;
                }
                push_suite(vm, else_s);
            }
            None => {
                vm.frames.pop();
            }
        }),
        Err(fault) => Err(fault),
    };

    if let Err(fault) = outcome {
        vm.throw(fault);
    }
    Step::Continue
}

/* ===================== Try ===================== */

/// Execute Try statement: the suite of the current phase completed normally
pub fn execute_try(vm: &mut VM) -> Step {
    let Some(FrameKind::Try { node, phase, .. }) = top_kind(vm) else {
        return Step::Continue;
    };
    let (node, phase) = (node.clone(), *phase);
    let Stmt::Try {
        else_s, finally_s, ..
    } = node.get()
    else {
        vm.frames.pop();
        return Step::Continue;
    };

    match phase {
        TryPhase::Body => match else_s {
            Some(else_s) => {
                set_try_phase(vm, TryPhase::Else);
                push_suite(vm, else_s);
            }
            None => enter_finally(vm, finally_s.as_deref(), None),
        },
        TryPhase::Else => enter_finally(vm, finally_s.as_deref(), None),
        TryPhase::Handler => {
            exit_handler(vm);
            enter_finally(vm, finally_s.as_deref(), None);
        }
        TryPhase::Finally => {
            let pending = match top_kind(vm) {
                Some(FrameKind::Try { pending, .. }) => pending.take(),
                _ => None,
            };
            vm.frames.pop();
            if let Some(pending) = pending {
                vm.control = pending;
            }
        }
    }
    Step::Continue
}

/// Control flow reached a Try frame while unwinding
pub fn unwind_try(vm: &mut VM) {
    let Some(FrameKind::Try { node, phase, .. }) = top_kind(vm) else {
        return;
    };
    let (node, phase) = (node.clone(), *phase);
    let Stmt::Try {
        handlers,
        finally_s,
        ..
    } = node.get()
    else {
        vm.frames.pop();
        return;
    };

    let mut control = std::mem::take(&mut vm.control);

    match phase {
        TryPhase::Body => {
            if let Control::Throw(Fault::Raised(exc)) = &control {
                let exc = exc.clone();
                match find_handler(vm, handlers, &exc) {
                    Ok(Some(handler)) => {
                        enter_handler(vm, handler, exc);
                        return;
                    }
                    Ok(None) => {}
                    Err(fault) => {
                        vm.throw(fault);
                        control = std::mem::take(&mut vm.control);
                    }
                }
            }
        }
        TryPhase::Handler => exit_handler(vm),
        TryPhase::Else => {}
        TryPhase::Finally => {
            // Control flow leaving a finally suite replaces whatever was pending
            vm.frames.pop();
            vm.control = control;
            return;
        }
    }

    // Limit violations skip finally suites
    if matches!(control, Control::Throw(Fault::Fatal(_))) {
        vm.frames.pop();
        vm.control = control;
        return;
    }
    enter_finally(vm, finally_s.as_deref(), Some(control));
}

fn set_try_phase(vm: &mut VM, new_phase: TryPhase) {
    if let Some(FrameKind::Try { phase, .. }) = top_kind(vm) {
        *phase = new_phase;
    }
}

/// Run the finally suite (if any) with `control` suspended, else resume it
fn enter_finally(vm: &mut VM, finally_s: Option<&Stmt>, control: Option<Control>) {
    match finally_s {
        Some(finally_s) => {
            if let Some(FrameKind::Try { phase, pending, .. }) = top_kind(vm) {
                *phase = TryPhase::Finally;
                *pending = control;
            }
            push_suite(vm, finally_s);
        }
        None => {
            vm.frames.pop();
            if let Some(control) = control {
                vm.control = control;
            }
        }
    }
}

/// First handler whose exception type matches `exc`
fn find_handler<'a>(
    vm: &mut VM,
    handlers: &'a [ExceptHandler],
    exc: &Val,
) -> ExecResult<Option<&'a ExceptHandler>> {
    let Some(exc_class) = super::errors::exception_class(exc) else {
        return Ok(None);
    };
    for handler in handlers {
        let Some(kind) = &handler.kind else {
            return Ok(Some(handler));
        };
        vm.set_line(handler.span.line_no());
        let kind = eval_expr(vm, kind)?;
        if exception_matches(&exc_class, &kind)? {
            return Ok(Some(handler));
        }
    }
    Ok(None)
}

fn exception_matches(exc_class: &std::rc::Rc<Class>, kind: &Val) -> ExecResult<bool> {
    match kind {
        Val::Class(cls) if cls.is_exception() => Ok(Class::is_subclass(exc_class, cls)),
        Val::Tuple(items) => {
            for item in items.iter() {
                if exception_matches(exc_class, item)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        _ => Err(Fault::type_error(
            "catching classes that do not inherit from BaseException is not allowed",
        )),
    }
}

fn enter_handler(vm: &mut VM, handler: &ExceptHandler, exc: Val) {
    let line = handler.span.line_no();
    vm.set_line(line);
    vm.handling.push(exc.clone());
    if let Some(FrameKind::Try {
        phase,
        handler_name,
        ..
    }) = top_kind(vm)
    {
        *phase = TryPhase::Handler;
        *handler_name = handler.name.clone();
    }

    let bound = match &handler.name {
        Some(name) => vm.store_name(name, exc),
        None => Ok(()),
    };
    match bound.and_then(|_| vm.record_step(line)) {
        Ok(()) => push_suite(vm, &handler.body),
        Err(fault) => vm.throw(fault),
    }
}

/// Leave an `except` suite: the exception is no longer being handled and
/// the `as` name is unbound
fn exit_handler(vm: &mut VM) {
    vm.handling.pop();
    let name = match top_kind(vm) {
        Some(FrameKind::Try { handler_name, .. }) => handler_name.take(),
        _ => None,
    };
    if let Some(name) = name {
        let _ = vm.delete_name(&name);
    }
}

/* ===================== Raise ===================== */

fn execute_raise(vm: &mut VM, exc: &Option<Expr>, cause: &Option<Expr>) -> Fault {
    let Some(exc) = exc else {
        return match vm.handling.last() {
            Some(active) => Fault::Raised(active.clone()),
            None => Fault::new(ExcKind::RuntimeError, "No active exception to reraise"),
        };
    };

    let exc = match eval_expr(vm, exc).and_then(|value| instantiate_exception(vm, value)) {
        Ok(Some(exc)) => exc,
        Ok(None) => return Fault::type_error("exceptions must derive from BaseException"),
        Err(fault) => return fault,
    };

    if let Some(cause) = cause {
        let cause = match eval_expr(vm, cause) {
            Ok(Val::None) => None,
            Ok(value) => match instantiate_exception(vm, value) {
                Ok(Some(cause)) => Some(cause),
                Ok(None) => {
                    return Fault::type_error("exception causes must derive from BaseException")
                }
                Err(fault) => return fault,
            },
            Err(fault) => return fault,
        };
        if let Val::Instance(inst) = &exc {
            if let Some(state) = &inst.exc {
                let mut state = state.borrow_mut();
                state.cause = cause;
                state.suppress_context = true;
            }
        }
    }
    Fault::Raised(exc)
}

/// Exception instance for `raise value`; classes are instantiated without arguments
fn instantiate_exception(vm: &mut VM, value: Val) -> ExecResult<Option<Val>> {
    match &value {
        Val::Class(cls) if cls.is_exception() => {
            let exc = vm.call(&value, Vec::new())?;
            Ok(Some(exc))
        }
        Val::Instance(inst) if inst.exc.is_some() => Ok(Some(value)),
        _ => Ok(None),
    }
}

/* ===================== Class Bodies ===================== */

/// Run a class body in its own namespace and build the class object
fn execute_class_body(vm: &mut VM, name: &str, bases: &[Expr], body: &Stmt) -> ExecResult<Val> {
    let bases = eval_all(vm, bases)?;
    let (closure, qualname) = match vm.activation() {
        Some(act) => (closure_for_definition(act), format!("{}{}", act.qualprefix, name)),
        None => (std::rc::Rc::from(Vec::new()), name.to_string()),
    };

    let namespace = Scope::new(Binder::Class);
    namespace.set("__module__", Val::str("__main__"));
    namespace.set("__qualname__", Val::str(&qualname));

    vm.enter()?;
    vm.push_activation(
        name,
        ScopeKind::Class,
        namespace.clone(),
        closure,
        None,
        format!("{}.", qualname),
    );
    let base = vm.frames.len();
    push_suite(vm, body);
    let result = run_until_done(vm, base);
    vm.activations.pop();
    vm.leave();
    result?;

    let attrs = namespace.vars.borrow().clone();
    let class = vm.create_class(name, &qualname, bases, attrs)?;
    Ok(class)
}

/* ===================== Imports ===================== */

fn execute_import(vm: &mut VM, alias: &ImportAlias) -> ExecResult<()> {
    if let Some((head, _)) = alias.name.split_once('.') {
        vm.import_module(head)?;
        return Err(Fault::new(
            ExcKind::ModuleNotFoundError,
            format!(
                "No module named '{}'; '{}' is not a package",
                alias.name, head
            ),
        ));
    }
    let module = vm.import_module(&alias.name)?;
    vm.store_name(alias.binding(), module)
}

fn execute_import_from(vm: &mut VM, module_name: &str, names: &[ImportAlias]) -> ExecResult<()> {
    let module = vm.import_module(module_name)?;
    let Val::Module(module) = module else {
        return Ok(());
    };

    if names.is_empty() {
        let public: Vec<(String, Val)> = module
            .attrs
            .borrow()
            .iter()
            .filter(|(name, _)| !name.starts_with('_'))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        for (name, value) in public {
            vm.store_name(&name, value)?;
        }
        return Ok(());
    }

    for alias in names {
        let value = module.attrs.borrow().get(&alias.name).cloned();
        let Some(value) = value else {
            return Err(Fault::new(
                ExcKind::ImportError,
                format!(
                    "cannot import name '{}' from '{}' (unknown location)",
                    alias.name, module_name
                ),
            ));
        };
        let binding = alias.alias.as_deref().unwrap_or(&alias.name);
        vm.store_name(binding, value)?;
    }
    Ok(())
}
