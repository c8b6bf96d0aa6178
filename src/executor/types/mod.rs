//! Syntax tree, runtime values and the frame/control records the VM
//! threads through its dispatch loop

pub mod ast;
pub mod control;
pub mod phase;
pub mod values;

pub use ast::{Expr, Stmt};
pub use control::{Control, Frame, FrameKind, StmtRef};
pub use phase::*;
pub use values::Val;
