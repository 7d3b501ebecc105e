//! Bounded call-stack component.

use std::fmt;

use bincpa_cfa::{CfaEdge, Location};
use bincpa_ir::GotoKind;
use tracing::debug;

use super::ConfigurableProgramAnalysis;
use crate::error::Fault;
use crate::precision::ComponentPrecision;
use crate::state::{ComponentState, CompositeState};

/// Default maximum number of tracked return addresses.
pub const DEFAULT_MAX_DEPTH: usize = 64;

/// Stack of return addresses, innermost last.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct CallStackState {
    frames: Vec<u64>,
}

impl CallStackState {
    #[must_use]
    pub const fn new() -> Self {
        Self { frames: Vec::new() }
    }

    #[must_use]
    pub fn top(&self) -> Option<u64> {
        self.frames.last().copied()
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn frames(&self) -> &[u64] {
        &self.frames
    }

    /// Push `address`, dropping the outermost frame past `max_depth`.
    #[must_use]
    pub fn push(&self, address: u64, max_depth: usize) -> Self {
        let mut frames = self.frames.clone();
        frames.push(address);
        if frames.len() > max_depth {
            frames.remove(0);
        }
        Self { frames }
    }

    #[must_use]
    pub fn pop(&self) -> Self {
        let mut frames = self.frames.clone();
        frames.pop();
        Self { frames }
    }
}

impl fmt::Display for CallStackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, frame) in self.frames.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{frame:#x}")?;
        }
        f.write_str("]")
    }
}

/// Matches returns against the calls that led to them.
pub struct CallStackAnalysis {
    max_depth: usize,
}

impl Default for CallStackAnalysis {
    fn default() -> Self {
        Self::new()
    }
}

impl CallStackAnalysis {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }
}

impl ConfigurableProgramAnalysis for CallStackAnalysis {
    fn name(&self) -> &'static str {
        "call-stack"
    }

    fn init_start_state(&self, _location: Location) -> ComponentState {
        ComponentState::CallStack(CallStackState::new())
    }

    fn post(
        &self,
        state: &CompositeState,
        index: usize,
        edge: &CfaEdge,
        _precision: &ComponentPrecision,
    ) -> Result<Vec<ComponentState>, Fault> {
        let stack = state
            .component(index)
            .and_then(ComponentState::as_call_stack)
            .ok_or(Fault::ComponentMismatch {
                analysis: self.name(),
                index,
            })?;
        let target = edge.target().address();
        let next = match edge.transformer().branch() {
            Some(branch) if branch.kind == GotoKind::Call => match branch.fall_through {
                Some(ret) if ret.address() != target => stack.push(ret.address(), self.max_depth),
                _ => stack.clone(),
            },
            Some(branch) if branch.kind == GotoKind::Return => match stack.top() {
                Some(top) if top == target => stack.pop(),
                None => stack.clone(),
                Some(top) => {
                    debug!(expected = top, target, "return does not match call stack");
                    return Ok(Vec::new());
                }
            },
            _ => stack.clone(),
        };
        Ok(vec![ComponentState::CallStack(next)])
    }
}
