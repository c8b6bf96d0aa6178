//! Main execution loop for the VM

use super::errors::ExecResult;
use super::statements::{execute_block, execute_for, execute_try, execute_while, unwind_try};
use super::types::{Control, ForPhase, FrameKind, Val, WhilePhase};
use super::vm::{Step, VM};

/* ===================== Public API ===================== */

/// Run the frames above `base` until they are exhausted.
///
/// Returns the value of a `return` statement (or `None` when the frames
/// simply ran out) and leaves the frame stack at `base`.
pub fn run_until_done(vm: &mut VM, base: usize) -> ExecResult<Val> {
    while step(vm, base) == Step::Continue {}
    vm.frames.truncate(base);

    match std::mem::take(&mut vm.control) {
        Control::Return(value) => Ok(value),
        Control::Throw(fault) => Err(fault),
        Control::None | Control::Break | Control::Continue => Ok(Val::None),
    }
}

/// Execute one step of the activation whose frames start at `base`
pub fn step(vm: &mut VM, base: usize) -> Step {
    if vm.frames.len() <= base {
        return Step::Done;
    }

    // If control flow is active, unwind first
    if !vm.control.is_none() {
        return unwind(vm, base);
    }

    let top = vm.frames.len() - 1;
    match &vm.frames[top].kind {
        FrameKind::Block { body, idx } => {
            let (body, idx) = (body.clone(), *idx);
            execute_block(vm, body, idx)
        }
        FrameKind::While { .. } => execute_while(vm),
        FrameKind::For { .. } => execute_for(vm),
        FrameKind::Try { .. } => execute_try(vm),
    }
}

/* ===================== Unwinding ===================== */

/// Pop or redirect the top frame according to the active control flow
fn unwind(vm: &mut VM, base: usize) -> Step {
    if vm.frames.len() <= base {
        return Step::Done;
    }
    let top = vm.frames.len() - 1;

    // `break` / `continue` inside a loop's `else` suite belong to an outer loop
    let in_loop_body = matches!(
        vm.frames[top].kind,
        FrameKind::While {
            phase: WhilePhase::Test,
            ..
        } | FrameKind::For {
            phase: ForPhase::Advance,
            ..
        }
    );

    match (&vm.frames[top].kind, &vm.control) {
        (_, Control::Break) if in_loop_body => {
            vm.frames.pop();
            vm.control = Control::None;
        }
        (_, Control::Continue) if in_loop_body => {
            vm.control = Control::None;
        }
        (FrameKind::Try { .. }, _) => unwind_try(vm),
        _ => {
            vm.frames.pop();
        }
    }
    Step::Continue
}
