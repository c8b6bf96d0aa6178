//! Control signals and the frame stack the VM walks

use std::sync::Arc;

use super::ast::Stmt;
use super::phase::{ForPhase, TryPhase, WhilePhase};
use super::values::Val;
use crate::executor::errors::Fault;

/* ===================== Control Flow ===================== */

/// How the current statement finished
///
/// This represents active control flow (return, break, continue, raise).
/// When control != None, the VM unwinds the frame stack to find the
/// statement that handles it.
#[derive(Debug, Clone, Default)]
pub enum Control {
    #[default]
    None,
    Break,
    Continue,
    Return(Val),
    Throw(Fault),
}

impl Control {
    pub fn is_none(&self) -> bool {
        matches!(self, Control::None)
    }
}

/* ===================== Frames ===================== */

/// Shared handle to one statement inside a block
#[derive(Debug, Clone)]
pub struct StmtRef {
    block: Arc<[Stmt]>,
    idx: usize,
}

impl StmtRef {
    pub fn new(block: Arc<[Stmt]>, idx: usize) -> Self {
        Self { block, idx }
    }

    pub fn get(&self) -> &Stmt {
        &self.block[self.idx]
    }
}

/// Statement being run and how far it has got
#[derive(Debug)]
pub enum FrameKind {
    Block {
        body: Arc<[Stmt]>,
        idx: usize,
    },
    While {
        node: StmtRef,
        phase: WhilePhase,
    },
    For {
        node: StmtRef,
        iter: Val,
        phase: ForPhase,
    },
    Try {
        node: StmtRef,
        phase: TryPhase,
        /// Control flow suspended while the `finally` suite runs
        pending: Option<Control>,
        /// Name bound by the active `except ... as name` handler
        handler_name: Option<String>,
    },
}

/// Execution frame - one per active block or compound statement
#[derive(Debug)]
pub struct Frame {
    pub kind: FrameKind,
}

impl Frame {
    pub fn block(body: Arc<[Stmt]>) -> Self {
        Self {
            kind: FrameKind::Block { body, idx: 0 },
        }
    }

    /// Frames that `break` / `continue` target
    pub fn is_loop(&self) -> bool {
        matches!(self.kind, FrameKind::While { .. } | FrameKind::For { .. })
    }
}
