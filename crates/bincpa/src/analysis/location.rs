//! Control-location component.

use bincpa_cfa::{CfaEdge, Location};

use crate::state::CompositeState;

/// Direction in which edges are followed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

/// Tracks the program location, optionally split by a virtual program counter.
#[derive(Clone, Debug, Default)]
pub struct LocationAnalysis {
    direction: Direction,
    vpc_register: Option<u8>,
}

impl LocationAnalysis {
    #[must_use]
    pub const fn forward() -> Self {
        Self {
            direction: Direction::Forward,
            vpc_register: None,
        }
    }

    #[must_use]
    pub const fn backward() -> Self {
        Self {
            direction: Direction::Backward,
            vpc_register: None,
        }
    }

    /// Split locations by the value of `reg` whenever it is known exactly.
    #[must_use]
    pub const fn with_vpc(mut self, reg: u8) -> Self {
        self.vpc_register = Some(reg);
        self
    }

    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self.direction {
            Direction::Forward => "location",
            Direction::Backward => "backward-location",
        }
    }

    #[must_use]
    pub const fn tracks_vpc(&self) -> bool {
        self.vpc_register.is_some()
    }

    /// Location reached by following `edge` from `state`.
    #[must_use]
    pub fn successor(&self, state: &CompositeState, edge: &CfaEdge) -> Location {
        let next = match self.direction {
            Direction::Forward => edge.target(),
            Direction::Backward => edge.source(),
        };
        let Some(reg) = self.vpc_register else {
            return next;
        };
        let label = next.label();
        state
            .values()
            .and_then(|values| values.value_after(edge.transformer(), reg).single())
            .map_or(Location::Label(label), |vpc| Location::Vpc { label, vpc })
    }
}

#[cfg(test)]
mod tests {
    use bincpa_ir::{Expr, Label, Stmt};

    use super::*;
    use crate::analysis::ValueState;
    use crate::state::ComponentState;

    fn edge(stmt: Stmt) -> CfaEdge {
        CfaEdge::must(
            Location::from(Label::at(0x10)),
            Location::from(Label::at(0x14)),
            stmt,
        )
    }

    #[test]
    fn test_forward_and_backward() {
        let state = CompositeState::new(Location::from(Label::at(0x10)), []);
        let e = edge(Stmt::Skip);
        assert_eq!(LocationAnalysis::forward().successor(&state, &e), e.target());
        assert_eq!(LocationAnalysis::backward().successor(&state, &e), e.source());
    }

    #[test]
    fn test_vpc_from_assignment() {
        let state = CompositeState::new(
            Location::from(Label::at(0x10)),
            [ComponentState::Values(ValueState::new())],
        );
        let analysis = LocationAnalysis::forward().with_vpc(5);
        assert!(analysis.tracks_vpc());

        let e = edge(Stmt::assign(5, Expr::imm(0x40)));
        assert_eq!(
            analysis.successor(&state, &e),
            Location::Vpc {
                label: Label::at(0x14),
                vpc: 0x40
            }
        );

        // Unknown register leaves the plain label
        let e = edge(Stmt::Skip);
        assert_eq!(analysis.successor(&state, &e), Location::from(Label::at(0x14)));
    }
}
