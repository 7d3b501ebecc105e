//! Composite abstract states.

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bincpa_cfa::{Location, Program};
use bincpa_ir::Expr;

use crate::analysis::{CallStackState, ValueState};

static NEXT_STATE_ID: AtomicU64 = AtomicU64::new(0);

/// Unique identity of a state, used for reachability-tree bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(u64);

impl StateId {
    fn fresh() -> Self {
        Self(NEXT_STATE_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One tuple of concrete values (`None` = unconstrained) for a list of expressions.
pub type Valuation = Vec<Option<u64>>;

/// State of a single component analysis.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ComponentState {
    Location(Location),
    Values(ValueState),
    CallStack(CallStackState),
}

impl ComponentState {
    #[must_use]
    pub const fn as_location(&self) -> Option<Location> {
        match self {
            Self::Location(loc) => Some(*loc),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_values(&self) -> Option<&ValueState> {
        match self {
            Self::Values(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_call_stack(&self) -> Option<&CallStackState> {
        match self {
            Self::CallStack(s) => Some(s),
            _ => None,
        }
    }

    /// This component's opinion on the possible values of `exprs`.
    fn projection(&self, exprs: &[&Expr], program: &Program) -> Option<BTreeSet<Valuation>> {
        match self {
            Self::Values(values) => Some(values.projection(exprs, program)),
            Self::Location(_) | Self::CallStack(_) => None,
        }
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Location(loc) => write!(f, "{loc}"),
            Self::Values(v) => write!(f, "{v}"),
            Self::CallStack(s) => write!(f, "{s}"),
        }
    }
}

/// Product of component states. Component 0 is always the location.
///
/// Equality and hashing are structural over the components; the id only
/// distinguishes otherwise equal states in the reachability tree.
#[derive(Clone, Debug)]
pub struct CompositeState {
    id: StateId,
    location: Location,
    components: Arc<[ComponentState]>,
}

impl CompositeState {
    /// Create a state at `location` with the remaining components.
    #[must_use]
    pub fn new(location: Location, others: impl IntoIterator<Item = ComponentState>) -> Self {
        let components: Vec<_> = std::iter::once(ComponentState::Location(location))
            .chain(others)
            .collect();
        Self {
            id: StateId::fresh(),
            location,
            components: components.into(),
        }
    }

    #[must_use]
    pub const fn id(&self) -> StateId {
        self.id
    }

    #[must_use]
    pub const fn location(&self) -> Location {
        self.location
    }

    #[must_use]
    pub fn component(&self, index: usize) -> Option<&ComponentState> {
        self.components.get(index)
    }

    #[must_use]
    pub fn components(&self) -> &[ComponentState] {
        &self.components
    }

    /// Number of components, including the location.
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// First value-analysis component, if any.
    #[must_use]
    pub fn values(&self) -> Option<&ValueState> {
        self.components.iter().find_map(ComponentState::as_values)
    }

    /// First call-stack component, if any.
    #[must_use]
    pub fn call_stack(&self) -> Option<&CallStackState> {
        self.components.iter().find_map(ComponentState::as_call_stack)
    }

    /// Tuples of concrete values `exprs` may take in this state.
    ///
    /// Components that have an opinion are intersected. Without any opinion,
    /// each expression is constant-folded and yields its constant or `None`.
    #[must_use]
    pub fn projection_from_concretization(&self, exprs: &[&Expr], program: &Program) -> Vec<Valuation> {
        let mut result: Option<BTreeSet<Valuation>> = None;
        for component in self.components.iter() {
            if let Some(opinion) = component.projection(exprs, program) {
                result = Some(match result {
                    None => opinion,
                    Some(acc) => intersect(&acc, &opinion),
                });
            }
        }
        result.map_or_else(
            || vec![exprs.iter().map(|e| e.simplify().const_value()).collect()],
            |set| set.into_iter().collect(),
        )
    }
}

/// Pairwise-compatible tuples, with unconstrained entries filled from either side.
fn intersect(left: &BTreeSet<Valuation>, right: &BTreeSet<Valuation>) -> BTreeSet<Valuation> {
    let mut out = BTreeSet::new();
    for a in left {
        for b in right {
            let compatible = a
                .iter()
                .zip(b)
                .all(|(x, y)| x.is_none() || y.is_none() || x == y);
            if compatible {
                out.insert(a.iter().zip(b).map(|(x, y)| x.or(*y)).collect());
            }
        }
    }
    out
}

impl PartialEq for CompositeState {
    fn eq(&self, other: &Self) -> bool {
        self.components == other.components
    }
}

impl Eq for CompositeState {}

impl Hash for CompositeState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.components.hash(state);
    }
}

impl fmt::Display for CompositeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.location())
    }
}

#[cfg(test)]
mod tests {
    use bincpa_cfa::ProgramBuilder;
    use bincpa_ir::{Label, Stmt};

    use super::*;

    fn program() -> Program {
        ProgramBuilder::new(0x1000)
            .instruction(0x1000, 4, "hlt", vec![Stmt::Halt])
            .build()
    }

    #[test]
    fn test_structural_equality_ignores_id() {
        let loc = Location::from(Label::at(0x1000));
        let a = CompositeState::new(loc, [ComponentState::Values(ValueState::new())]);
        let b = CompositeState::new(loc, [ComponentState::Values(ValueState::new())]);
        assert_ne!(a.id(), b.id());
        assert_eq!(a, b);
        assert_eq!(a.location(), loc);
        assert_eq!(a.len(), 2);
    }

    #[test]
    fn test_projection_without_opinion_folds_constants() {
        let state = CompositeState::new(Location::from(Label::at(0x1000)), []);
        let cond = Expr::TRUE;
        let target = Expr::add(Expr::imm(0x10), Expr::imm(0x20));
        let reg = Expr::reg(3);
        let tuples = state.projection_from_concretization(&[&cond, &target, &reg], &program());
        assert_eq!(tuples, vec![vec![Some(1), Some(0x30), None]]);
    }

    #[test]
    fn test_projection_uses_values() {
        let mut values = ValueState::new();
        values.set_constant(1, 0x2000);
        let state = CompositeState::new(
            Location::from(Label::at(0x1000)),
            [ComponentState::Values(values)],
        );
        let target = Expr::reg(1);
        let tuples = state.projection_from_concretization(&[&Expr::TRUE, &target], &program());
        assert_eq!(tuples, vec![vec![Some(1), Some(0x2000)]]);
    }

    #[test]
    fn test_intersect_fills_unconstrained() {
        let left = BTreeSet::from([vec![Some(1), None], vec![Some(0), None]]);
        let right = BTreeSet::from([vec![None, Some(7)], vec![Some(1), Some(8)]]);
        let out = intersect(&left, &right);
        assert_eq!(
            out,
            BTreeSet::from([
                vec![Some(0), Some(7)],
                vec![Some(1), Some(7)],
                vec![Some(1), Some(8)],
            ])
        );
    }
}
