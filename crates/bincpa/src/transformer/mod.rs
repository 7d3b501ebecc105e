//! Transformer factories: which edges leave a state.

mod resolving;

pub use resolving::{ResolvingTransformerFactory, SUSPICIOUS_TARGET_BELOW};

use std::collections::BTreeSet;

use bincpa_cfa::{CfaEdge, ControlFlowGraph, Location};
use bincpa_ir::Label;

use crate::analysis::Direction;
use crate::error::CpaError;
use crate::state::CompositeState;

static NO_LABELS: BTreeSet<Label> = BTreeSet::new();

/// Produces the outgoing edges of abstract states.
pub trait TransformerFactory {
    /// Location the analysis starts from.
    fn initial_location(&self) -> Location;

    /// Edges leaving `state`, computed fresh on every call.
    ///
    /// # Errors
    ///
    /// Fails when no statement exists at the state's label, or when a
    /// resolver in debug mode cannot determine a branch target.
    fn transformers(&mut self, state: &CompositeState) -> Result<Vec<CfaEdge>, CpaError>;

    /// False once some branch target could not be resolved.
    fn is_sound(&self) -> bool {
        true
    }

    /// Labels of branches whose targets could not be resolved.
    fn unresolved_branches(&self) -> &BTreeSet<Label> {
        &NO_LABELS
    }

    /// Number of instructions discovered so far, if tracked.
    fn instruction_count(&self) -> Option<usize> {
        None
    }
}

/// Serves edges of an already reconstructed graph.
pub struct CfaTransformerFactory {
    cfg: ControlFlowGraph,
    initial: Location,
    direction: Direction,
}

impl CfaTransformerFactory {
    /// Follow out-edges starting at `entry`.
    #[must_use]
    pub const fn forward(cfg: ControlFlowGraph, entry: Location) -> Self {
        Self {
            cfg,
            initial: entry,
            direction: Direction::Forward,
        }
    }

    /// Follow in-edges starting at `exit`.
    #[must_use]
    pub const fn backward(cfg: ControlFlowGraph, exit: Location) -> Self {
        Self {
            cfg,
            initial: exit,
            direction: Direction::Backward,
        }
    }

    #[must_use]
    pub const fn cfg(&self) -> &ControlFlowGraph {
        &self.cfg
    }

    fn edges_at(&self, location: Location) -> Vec<CfaEdge> {
        match self.direction {
            Direction::Forward => self.cfg.out_edges(location).cloned().collect(),
            Direction::Backward => self.cfg.in_edges(location).cloned().collect(),
        }
    }
}

impl TransformerFactory for CfaTransformerFactory {
    fn initial_location(&self) -> Location {
        self.initial
    }

    fn transformers(&mut self, state: &CompositeState) -> Result<Vec<CfaEdge>, CpaError> {
        let location = state.location();
        let mut edges = self.edges_at(location);
        if edges.is_empty() && location.vpc().is_some() {
            edges = self.edges_at(Location::from(location.label()));
        }
        Ok(edges)
    }
}

#[cfg(test)]
mod tests {
    use bincpa_ir::Stmt;

    use super::*;

    #[test]
    fn test_forward_and_backward_edges() {
        let a = Location::from(Label::at(0x10));
        let b = Location::from(Label::at(0x14));
        let cfg = ControlFlowGraph::from_edges([CfaEdge::must(a, b, Stmt::Skip)]);

        let mut forward = CfaTransformerFactory::forward(cfg.clone(), a);
        let edges = forward.transformers(&CompositeState::new(a, [])).unwrap();
        assert_eq!(edges.len(), 1);
        assert!(forward.transformers(&CompositeState::new(b, [])).unwrap().is_empty());

        let mut backward = CfaTransformerFactory::backward(cfg, b);
        assert_eq!(backward.initial_location(), b);
        let edges = backward.transformers(&CompositeState::new(b, [])).unwrap();
        assert_eq!(edges.first().map(CfaEdge::source), Some(a));
        assert!(backward.is_sound());
        assert!(backward.unresolved_branches().is_empty());
    }

    #[test]
    fn test_vpc_location_falls_back_to_label() {
        let a = Location::from(Label::at(0x10));
        let b = Location::from(Label::at(0x14));
        let cfg = ControlFlowGraph::from_edges([CfaEdge::must(a, b, Stmt::Skip)]);
        let mut factory = CfaTransformerFactory::forward(cfg, a);
        let split = Location::Vpc {
            label: Label::at(0x10),
            vpc: 3,
        };
        let edges = factory.transformers(&CompositeState::new(split, [])).unwrap();
        assert_eq!(edges.len(), 1);
    }
}
