//! Reached set indexed by location and, optionally, one more component.

use bincpa_cfa::Location;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::state::{ComponentState, CompositeState};

/// All states accepted so far.
#[derive(Debug, Default)]
pub struct ReachedSet {
    by_location: FxHashMap<Location, FxHashSet<CompositeState>>,
    index: Option<usize>,
    by_component: FxHashMap<ComponentState, FxHashSet<CompositeState>>,
    len: usize,
}

impl ReachedSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Maintain a secondary index on component `index`.
    #[must_use]
    pub fn with_index(index: usize) -> Self {
        Self {
            index: Some(index),
            ..Self::default()
        }
    }

    fn indexed_component(&self, state: &CompositeState) -> Option<ComponentState> {
        self.index
            .filter(|&i| i > 0)
            .and_then(|i| state.component(i))
            .cloned()
    }

    /// Insert `state`; returns false if an equal state is already present.
    pub fn add(&mut self, state: CompositeState) -> bool {
        if let Some(key) = self.indexed_component(&state) {
            self.by_component.entry(key).or_default().insert(state.clone());
        }
        let inserted = self
            .by_location
            .entry(state.location())
            .or_default()
            .insert(state);
        if inserted {
            self.len += 1;
        }
        inserted
    }

    pub fn remove(&mut self, state: &CompositeState) -> bool {
        let Some(states) = self.by_location.get_mut(&state.location()) else {
            return false;
        };
        if !states.remove(state) {
            return false;
        }
        if states.is_empty() {
            self.by_location.remove(&state.location());
        }
        if let Some(key) = self.indexed_component(state) {
            if let Some(states) = self.by_component.get_mut(&key) {
                states.remove(state);
                if states.is_empty() {
                    self.by_component.remove(&key);
                }
            }
        }
        self.len -= 1;
        true
    }

    #[must_use]
    pub fn contains(&self, state: &CompositeState) -> bool {
        self.by_location
            .get(&state.location())
            .is_some_and(|states| states.contains(state))
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompositeState> + '_ {
        self.by_location.values().flatten()
    }

    /// Locations with at least one reached state.
    pub fn locations(&self) -> impl Iterator<Item = Location> + '_ {
        self.by_location.keys().copied()
    }

    /// States reached at `location`.
    pub fn at_location(&self, location: Location) -> impl Iterator<Item = &CompositeState> + '_ {
        self.by_location.get(&location).into_iter().flatten()
    }

    /// States whose component `index` equals `value`.
    #[must_use]
    pub fn where_component(&self, index: usize, value: &ComponentState) -> Vec<&CompositeState> {
        if index == 0 {
            return value
                .as_location()
                .map(|loc| self.at_location(loc).collect())
                .unwrap_or_default();
        }
        if self.index == Some(index) {
            return self.by_component.get(value).into_iter().flatten().collect();
        }
        self.iter()
            .filter(|s| s.component(index) == Some(value))
            .collect()
    }
}
