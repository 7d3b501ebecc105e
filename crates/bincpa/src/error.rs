//! Analysis error types.

use bincpa_ir::Label;
use thiserror::Error;

use crate::state::CompositeState;

/// Domain-level fault raised by a transfer function.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("invalid memory access at {address:#x}")]
    InvalidMemoryAccess { address: u64 },

    #[error("no statement at {label}")]
    MissingStatement { label: Label },

    #[error("{analysis} expected its own state in component {index}")]
    ComponentMismatch { analysis: &'static str, index: usize },
}

/// Fault together with the state it was raised in.
#[derive(Debug, Error)]
#[error("{fault}")]
pub struct StateException {
    pub fault: Fault,
    pub state: Option<Box<CompositeState>>,
}

impl StateException {
    #[must_use]
    pub const fn new(fault: Fault) -> Self {
        Self { fault, state: None }
    }
}

impl From<Fault> for StateException {
    fn from(fault: Fault) -> Self {
        Self::new(fault)
    }
}

/// Indirect control flow that could not be resolved in strict mode.
#[derive(Debug, Error)]
#[error("unresolvable control flow from {label}")]
pub struct ControlFlowException {
    pub label: Label,
    pub state: Box<CompositeState>,
}

/// Analysis error type.
#[derive(Debug, Error)]
pub enum CpaError {
    #[error(transparent)]
    State(#[from] StateException),

    #[error(transparent)]
    ControlFlow(#[from] ControlFlowException),
}

impl From<Fault> for CpaError {
    fn from(fault: Fault) -> Self {
        Self::State(StateException::new(fault))
    }
}

impl CpaError {
    /// State the error was raised in, if known.
    #[must_use]
    pub fn state(&self) -> Option<&CompositeState> {
        match self {
            Self::State(e) => e.state.as_deref(),
            Self::ControlFlow(e) => Some(&e.state),
        }
    }

    /// Attach `state` unless the error already carries one.
    pub fn attach_state(&mut self, state: &CompositeState) {
        if let Self::State(e) = self {
            e.state.get_or_insert_with(|| Box::new(state.clone()));
        }
    }
}
