//! Failure-proof value representations for trace steps

use std::panic::{self, AssertUnwindSafe};

use tracing::debug;

use crate::executor::{Control, Val, VM};

/// Shown instead of a representation that could not be produced
pub const UNREPRESENTABLE: &str = "<unrepresentable>";

/// `repr(value)`, cut to `limit` characters plus `...`.
///
/// Rendering stops shortly past `limit`, so a huge binding costs about as
/// much as a small one. Never fails: a raising or non-string `__repr__`, an
/// expired deadline, or a panic all yield [`UNREPRESENTABLE`]. Anything
/// `__repr__` prints is dropped.
pub fn serialize(vm: &mut VM, value: &Val, limit: usize) -> String {
    let saved = Snapshot::take(vm);

    vm.output.mute();
    let result = panic::catch_unwind(AssertUnwindSafe(|| vm.repr_capped(value, limit)));
    vm.output.unmute();

    match result {
        Ok(Ok(text)) => truncate(text, limit),
        Ok(Err(_)) => UNREPRESENTABLE.to_string(),
        Err(_) => {
            debug!("repr panicked, restoring interpreter state");
            saved.restore(vm);
            UNREPRESENTABLE.to_string()
        }
    }
}

/// Interpreter bookkeeping a panicking `repr` may leave half-updated
struct Snapshot {
    frames: usize,
    activations: usize,
    depth: usize,
    control: Control,
}

impl Snapshot {
    fn take(vm: &VM) -> Self {
        Self {
            frames: vm.frames.len(),
            activations: vm.activations.len(),
            depth: vm.depth,
            control: vm.control.clone(),
        }
    }

    fn restore(self, vm: &mut VM) {
        vm.frames.truncate(self.frames);
        vm.activations.truncate(self.activations);
        vm.depth = self.depth;
        vm.control = self.control;
        vm.repr_guard.clear();
    }
}

fn truncate(text: String, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Limits;

    fn eval_global(source: &str, name: &str) -> (VM, Val) {
        let module = crate::parser::parse_module(source).unwrap();
        let mut vm = VM::new(Limits::default());
        vm.run_module(&module).map_err(|_| "run failed").unwrap();
        let value = vm.globals.get(name).unwrap();
        (vm, value)
    }

    #[test]
    fn test_builtin_values() {
        let (mut vm, value) = eval_global("x = [1, 'two', 3.0, None, {'k': (1,)}]", "x");
        assert_eq!(serialize(&mut vm, &value, 1000), "[1, 'two', 3.0, None, {'k': (1,)}]");
    }

    #[test]
    fn test_long_reprs_are_cut() {
        let (mut vm, value) = eval_global("s = 'a' * 50", "s");
        assert_eq!(serialize(&mut vm, &value, 10), "'aaaaaaaaa...");
        assert_eq!(truncate("héllo".to_string(), 2), "hé...");
        assert_eq!(truncate("abc".to_string(), 3), "abc");
    }

    #[test]
    fn test_raising_repr_is_unrepresentable() {
        let source = "\
class Bad:
    def __repr__(self):
        raise ValueError('no')
b = Bad()
";
        let (mut vm, value) = eval_global(source, "b");
        assert_eq!(serialize(&mut vm, &value, 1000), UNREPRESENTABLE);
    }

    #[test]
    fn test_non_string_repr_is_unrepresentable() {
        let source = "class Odd:\n    def __repr__(self):\n        return 42\no = Odd()";
        let (mut vm, value) = eval_global(source, "o");
        assert_eq!(serialize(&mut vm, &value, 1000), UNREPRESENTABLE);
    }

    #[test]
    fn test_output_from_repr_is_discarded() {
        let source = "\
class Loud:
    def __repr__(self):
        print('side effect')
        return 'Loud()'
l = Loud()
";
        let (mut vm, value) = eval_global(source, "l");
        assert_eq!(serialize(&mut vm, &value, 1000), "Loud()");
        assert_eq!(vm.output.as_str(), "");
    }

    #[test]
    fn test_self_reference() {
        let (mut vm, value) = eval_global("d = {}\nd['me'] = d", "d");
        assert_eq!(serialize(&mut vm, &value, 1000), "{'me': {...}}");
    }

    #[test]
    fn test_large_values_render_a_prefix_only() {
        let (mut vm, value) = eval_global("a = list(range(200000))\nb = [a] * 6", "b");
        let text = serialize(&mut vm, &value, 20);
        assert_eq!(text, "[[0, 1, 2, 3, 4, 5, ...");
        assert_eq!(serialize(&mut vm, &Val::str(&"x".repeat(5_000_000)), 3), "'xx...");
    }

    #[test]
    fn test_capped_repr_matches_full_repr_prefix() {
        let (mut vm, value) = eval_global("x = {'k': [1, (2,), 'three'], 'z': {4}}", "x");
        let full = vm.repr(&value).unwrap();
        for cap in [0, 1, 5, 12, 30, 1000] {
            let capped = vm.repr_capped(&value, cap).unwrap();
            assert!(full.starts_with(&capped), "cap {}: {:?}", cap, capped);
            assert!(capped.chars().count() > cap || capped == full);
        }
    }

    #[test]
    fn test_restore_rewinds_depth_and_stacks() {
        let (mut vm, _) = eval_global("x = 1", "x");
        let saved = Snapshot::take(&vm);
        vm.enter().unwrap();
        vm.enter().unwrap();
        vm.repr_guard.push(7);
        saved.restore(&mut vm);
        assert_eq!(vm.depth, 0);
        assert!(vm.repr_guard.is_empty());
        assert_eq!(serialize(&mut vm, &Val::Int(5), 10), "5");
    }
}
