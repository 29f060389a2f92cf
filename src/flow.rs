use crate::error::{ExecError, ExecResult};
use crate::variable::VarId;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FlowKind {
    #[default]
    Next,
    Return,
    Continue,
    Break,
    Goto(String),
    Exit,
    Error,
}

impl fmt::Display for FlowKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FlowKind::Next => write!(f, "next"),
            FlowKind::Return => write!(f, "return"),
            FlowKind::Continue => write!(f, "continue"),
            FlowKind::Break => write!(f, "break"),
            FlowKind::Goto(label) => write!(f, "goto {}", label),
            FlowKind::Exit => write!(f, "exit"),
            FlowKind::Error => write!(f, "error"),
        }
    }
}

/// Control signal threaded through every execution call, plus the value
/// travelling with a `return` or `exit`.
///
/// Whoever replaces or takes the return variable becomes responsible for
/// releasing it; the setters hand the previous one back for that reason.
#[derive(Debug, Default)]
pub struct FlowControl {
    kind: FlowKind,
    ret: Option<VarId>,
}

impl FlowControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(&self) -> &FlowKind {
        &self.kind
    }

    pub fn is_next(&self) -> bool {
        self.kind == FlowKind::Next
    }

    pub fn is_exit(&self) -> bool {
        self.kind == FlowKind::Exit
    }

    pub fn set_kind(&mut self, kind: FlowKind) {
        self.kind = kind;
    }

    pub fn set_flow_next(&mut self) {
        self.kind = FlowKind::Next;
    }

    pub fn set_goto(&mut self, label: impl Into<String>) {
        self.kind = FlowKind::Goto(label.into());
    }

    pub fn return_variable(&self) -> Option<VarId> {
        self.ret
    }

    #[must_use]
    pub fn set_return_variable(&mut self, var: VarId) -> Option<VarId> {
        self.ret.replace(var)
    }

    #[must_use]
    pub fn take_return_variable(&mut self) -> Option<VarId> {
        self.ret.take()
    }

    /// Inside an expression only Next and Exit may be observed.
    pub fn check_expression(&self) -> ExecResult<()> {
        match &self.kind {
            FlowKind::Next | FlowKind::Exit => Ok(()),
            other => Err(ExecError::read_error(format!(
                "'{}' cannot interrupt an expression",
                other
            ))),
        }
    }

    /// Rules at a function or program boundary: `return` completes normally,
    /// `exit` keeps propagating, anything else escaped its construct.
    pub fn close_boundary(&mut self) -> ExecResult<()> {
        match &self.kind {
            FlowKind::Next | FlowKind::Exit => Ok(()),
            FlowKind::Return => {
                self.kind = FlowKind::Next;
                Ok(())
            }
            FlowKind::Goto(label) => Err(ExecError::not_found(format!(
                "label '{}' not found",
                label
            ))),
            FlowKind::Break | FlowKind::Continue => Err(ExecError::read_error(format!(
                "'{}' outside of a loop",
                self.kind
            ))),
            FlowKind::Error => Err(ExecError::state("execution already failed")),
        }
    }
}
