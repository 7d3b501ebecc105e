//! Configurable program analyses and their composition.

mod call_stack;
mod location;
mod value;

pub use call_stack::{CallStackAnalysis, CallStackState, DEFAULT_MAX_DEPTH};
pub use location::{Direction, LocationAnalysis};
pub use value::{MAX_VALUES, MergeMode, NULL_PAGE_END, NUM_REGS, RegisterValue, ValueAnalysis, ValueState};

use bincpa_cfa::{CfaEdge, Location};
use bincpa_ir::Stmt;
use tracing::trace;

use crate::error::{Fault, StateException};
use crate::precision::{ComponentPrecision, CompositePrecision};
use crate::reached::ReachedSet;
use crate::state::{ComponentState, CompositeState};

/// One component of a composite analysis.
///
/// Every operation receives the full composite state and the component's
/// position in it, so a component may consult its neighbours.
pub trait ConfigurableProgramAnalysis {
    fn name(&self) -> &'static str;

    fn init_start_state(&self, location: Location) -> ComponentState;

    fn init_precision(&self, _location: Location, _transformer: Option<&Stmt>) -> ComponentPrecision {
        ComponentPrecision::Null
    }

    /// Successor components of `state[index]` along `edge`.
    ///
    /// An empty result means the edge is infeasible from this state.
    ///
    /// # Errors
    ///
    /// Raises a [`Fault`] for runtime errors found during transfer.
    fn post(
        &self,
        state: &CompositeState,
        index: usize,
        edge: &CfaEdge,
        precision: &ComponentPrecision,
    ) -> Result<Vec<ComponentState>, Fault>;

    /// Merge the new component `s1` into the reached component `s2`.
    ///
    /// Returning `s2` keeps the states apart.
    fn merge(&self, _s1: &ComponentState, s2: &ComponentState, _precision: &ComponentPrecision) -> ComponentState {
        s2.clone()
    }

    /// Subsumption: `s1` is covered by `s2`.
    fn less_or_equal(&self, s1: &ComponentState, s2: &ComponentState) -> bool {
        s1 == s2
    }

    /// Precision refinement for `state[index]`.
    ///
    /// # Errors
    ///
    /// Fails when `state[index]` is not this analysis' component.
    fn prec(
        &self,
        state: &CompositeState,
        index: usize,
        precision: &ComponentPrecision,
        _reached: &ReachedSet,
    ) -> Result<(ComponentState, ComponentPrecision), Fault> {
        let component = state.component(index).ok_or(Fault::ComponentMismatch {
            analysis: self.name(),
            index,
        })?;
        Ok((component.clone(), precision.clone()))
    }
}

/// Ordered product of a location analysis and further components.
pub struct CompositeAnalysis {
    location: LocationAnalysis,
    components: Vec<Box<dyn ConfigurableProgramAnalysis>>,
}

impl CompositeAnalysis {
    #[must_use]
    pub fn new(location: LocationAnalysis, components: Vec<Box<dyn ConfigurableProgramAnalysis>>) -> Self {
        Self { location, components }
    }

    #[must_use]
    pub const fn location_analysis(&self) -> &LocationAnalysis {
        &self.location
    }

    /// Component names in state order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        std::iter::once(self.location.name())
            .chain(self.components.iter().map(|c| c.name()))
            .collect()
    }

    /// Whether locations carry a virtual program counter.
    #[must_use]
    pub const fn tracks_vpc(&self) -> bool {
        self.location.tracks_vpc()
    }

    fn indexed(&self) -> impl Iterator<Item = (usize, &dyn ConfigurableProgramAnalysis)> + '_ {
        self.components.iter().enumerate().map(|(i, c)| (i + 1, c.as_ref()))
    }

    #[must_use]
    pub fn init_start_state(&self, location: Location) -> CompositeState {
        CompositeState::new(
            location,
            self.components.iter().map(|c| c.init_start_state(location)),
        )
    }

    #[must_use]
    pub fn init_precision(&self, location: Location, transformer: Option<&Stmt>) -> CompositePrecision {
        CompositePrecision::new(
            std::iter::once(ComponentPrecision::Null)
                .chain(self.components.iter().map(|c| c.init_precision(location, transformer)))
                .collect(),
        )
    }

    /// Cartesian product of the component successors.
    ///
    /// # Errors
    ///
    /// Propagates the first component fault, without a state attached.
    pub fn post(
        &self,
        state: &CompositeState,
        edge: &CfaEdge,
        precision: &CompositePrecision,
    ) -> Result<Vec<CompositeState>, StateException> {
        let location = self.location.successor(state, edge);
        let mut tuples: Vec<Vec<ComponentState>> = vec![Vec::with_capacity(self.components.len())];
        for (index, cpa) in self.indexed() {
            let successors = cpa.post(state, index, edge, precision.component(index))?;
            if successors.is_empty() {
                trace!(analysis = cpa.name(), edge = %edge, "edge infeasible");
                return Ok(Vec::new());
            }
            tuples = tuples
                .into_iter()
                .flat_map(|prefix| {
                    successors.iter().map(move |s| {
                        let mut tuple = prefix.clone();
                        tuple.push(s.clone());
                        tuple
                    })
                })
                .collect();
        }
        Ok(tuples
            .into_iter()
            .map(|tuple| CompositeState::new(location, tuple))
            .collect())
    }

    /// Componentwise merge of `s1` into `s2`.
    ///
    /// Returns `s2` unchanged across locations, when nothing changes, or when
    /// some component keeps the states apart.
    #[must_use]
    pub fn merge(&self, s1: &CompositeState, s2: &CompositeState, precision: &CompositePrecision) -> CompositeState {
        if s1.location() != s2.location() {
            return s2.clone();
        }
        let mut merged = Vec::with_capacity(self.components.len());
        let mut changed = false;
        let pairs = s1.components().iter().zip(s2.components()).skip(1);
        for ((index, cpa), (c1, c2)) in self.indexed().zip(pairs) {
            let m = cpa.merge(c1, c2, precision.component(index));
            if m == *c2 {
                if !cpa.less_or_equal(c1, c2) {
                    return s2.clone();
                }
            } else {
                changed = true;
            }
            merged.push(m);
        }
        if changed {
            CompositeState::new(s2.location(), merged)
        } else {
            s2.clone()
        }
    }

    /// Componentwise subsumption at equal locations.
    #[must_use]
    pub fn less_or_equal(&self, s1: &CompositeState, s2: &CompositeState) -> bool {
        s1.location() == s2.location()
            && s1.len() == s2.len()
            && self
                .indexed()
                .zip(s1.components().iter().zip(s2.components()).skip(1))
                .all(|((_, cpa), (c1, c2))| cpa.less_or_equal(c1, c2))
    }

    /// Whether some reached state at the same location covers `state`.
    #[must_use]
    pub fn stop(&self, state: &CompositeState, reached: &ReachedSet, _precision: &CompositePrecision) -> bool {
        reached
            .at_location(state.location())
            .any(|r| self.less_or_equal(state, r))
    }

    /// Refine every component. Returns `state` itself when nothing changed.
    ///
    /// # Errors
    ///
    /// Propagates the first component fault.
    pub fn prec(
        &self,
        state: &CompositeState,
        precision: &CompositePrecision,
        reached: &ReachedSet,
    ) -> Result<(CompositeState, CompositePrecision), StateException> {
        let mut components = Vec::with_capacity(self.components.len());
        let mut precisions = vec![ComponentPrecision::Null];
        for (index, cpa) in self.indexed() {
            let (component, refined) = cpa.prec(state, index, precision.component(index), reached)?;
            components.push(component);
            precisions.push(refined);
        }
        let precision = CompositePrecision::new(precisions);
        if components.iter().eq(state.components().iter().skip(1)) {
            Ok((state.clone(), precision))
        } else {
            Ok((CompositeState::new(state.location(), components), precision))
        }
    }
}

#[cfg(test)]
mod tests;
