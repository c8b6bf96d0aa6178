//! Per-execution step recording

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use super::serializer::serialize;
use crate::executor::{StepHook, VM};
use crate::types::Step;

/// Steps recorded so far; shared between the hook and its owner
#[derive(Debug, Clone, Default)]
pub struct Trace(Rc<RefCell<Vec<Step>>>);

impl Trace {
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn take(&self) -> Vec<Step> {
        std::mem::take(&mut *self.0.borrow_mut())
    }
}

/// Snapshots the current frame's bindings at every statement boundary
pub struct StepTracer {
    trace: Trace,
    repr_limit: usize,
}

impl StepTracer {
    pub fn new(repr_limit: usize) -> (Self, Trace) {
        let trace = Trace::default();
        let tracer = Self {
            trace: trace.clone(),
            repr_limit,
        };
        (tracer, trace)
    }
}

impl StepHook for StepTracer {
    fn on_step(&mut self, vm: &mut VM, line_no: usize) {
        let locals: IndexMap<String, String> = vm
            .frame_bindings()
            .into_iter()
            .map(|(name, value)| {
                let text = serialize(vm, &value, self.repr_limit);
                (name, text)
            })
            .collect();
        self.trace.0.borrow_mut().push(Step { line_no, locals });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Limits;

    fn trace(source: &str) -> Vec<Step> {
        let module = crate::parser::parse_module(source).unwrap();
        let mut vm = VM::new(Limits::default());
        let (tracer, trace) = StepTracer::new(1000);
        vm.set_hook(Box::new(tracer));
        let _ = vm.run_module(&module);
        vm.clear_hook();
        trace.take()
    }

    fn lines(steps: &[Step]) -> Vec<usize> {
        steps.iter().map(|s| s.line_no).collect()
    }

    #[test]
    fn test_one_step_per_statement_with_bindings_after_it() {
        let steps = trace("x = 1\ny = x + 1");
        assert_eq!(lines(&steps), vec![1, 2]);
        assert_eq!(steps[0].locals.get("x").map(String::as_str), Some("1"));
        assert!(!steps[0].locals.contains_key("y"));
        assert_eq!(steps[1].locals.get("y").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_internal_bindings_are_hidden() {
        let steps = trace("a = 'x'");
        assert_eq!(steps[0].locals.keys().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn test_function_steps_show_function_locals() {
        let source = "\
def double(n):
    result = n * 2
    return result
value = double(4)
";
        let steps = trace(source);
        assert_eq!(lines(&steps), vec![1, 2, 3, 4]);
        assert_eq!(steps[1].locals.keys().collect::<Vec<_>>(), vec!["n", "result"]);
        assert!(!steps[1].locals.contains_key("double"));
        assert_eq!(steps[3].locals.get("value").map(String::as_str), Some("8"));
    }

    #[test]
    fn test_repr_side_effects_are_not_traced() {
        let source = "\
class Noisy:
    def __repr__(self):
        tag = 'noisy'
        return tag
n = Noisy()
";
        let steps = trace(source);
        assert_eq!(lines(&steps), vec![2, 1, 5]);
        assert_eq!(steps[2].locals.get("n").map(String::as_str), Some("noisy"));
    }
}
