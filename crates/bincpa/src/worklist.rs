//! Worklist policies.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, VecDeque};

use bincpa_cfa::Location;
use rustc_hash::FxHashMap;

use crate::state::{CompositeState, StateId};

/// Frontier of pending states. Membership is structural.
pub trait Worklist {
    /// Insert `state`; returns false if an equal state is pending.
    fn add(&mut self, state: CompositeState) -> bool;

    fn pick(&mut self) -> Option<CompositeState>;

    /// Remove the pending state equal to `state`, if any.
    fn remove(&mut self, state: &CompositeState) -> bool;

    fn contains(&self, state: &CompositeState) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn iter(&self) -> Box<dyn Iterator<Item = &CompositeState> + '_>;

    /// Release memory held by removed entries.
    fn compact(&mut self) {}
}

/// Queue-backed worklist. Removal is lazy; stale entries are skipped on pick.
#[derive(Debug, Default)]
struct Queue {
    queue: VecDeque<CompositeState>,
    members: FxHashMap<CompositeState, StateId>,
}

impl Queue {
    fn add(&mut self, state: CompositeState) -> bool {
        match self.members.entry(state.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(state.id());
                self.queue.push_back(state);
                true
            }
        }
    }

    fn is_live(&self, state: &CompositeState) -> bool {
        self.members.get(state) == Some(&state.id())
    }

    fn take(&mut self, lifo: bool) -> Option<CompositeState> {
        loop {
            let state = if lifo {
                self.queue.pop_back()
            } else {
                self.queue.pop_front()
            }?;
            if self.is_live(&state) {
                self.members.remove(&state);
                return Some(state);
            }
        }
    }

    fn compact(&mut self) {
        let members = &self.members;
        self.queue
            .retain(|state| members.get(state) == Some(&state.id()));
        self.queue.shrink_to_fit();
        self.members.shrink_to_fit();
    }
}

macro_rules! queue_worklist {
    ($(#[$doc:meta])* $name:ident, $lifo:expr) => {
        $(#[$doc])*
        #[derive(Debug, Default)]
        pub struct $name(Queue);

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self::default()
            }
        }

        impl Worklist for $name {
            fn add(&mut self, state: CompositeState) -> bool {
                self.0.add(state)
            }

            fn pick(&mut self) -> Option<CompositeState> {
                self.0.take($lifo)
            }

            fn remove(&mut self, state: &CompositeState) -> bool {
                self.0.members.remove(state).is_some()
            }

            fn contains(&self, state: &CompositeState) -> bool {
                self.0.members.contains_key(state)
            }

            fn len(&self) -> usize {
                self.0.members.len()
            }

            fn iter(&self) -> Box<dyn Iterator<Item = &CompositeState> + '_> {
                Box::new(self.0.members.keys())
            }

            fn compact(&mut self) {
                self.0.compact();
            }
        }
    };
}

queue_worklist!(
    /// Breadth-first exploration.
    FifoWorklist,
    false
);

queue_worklist!(
    /// Depth-first exploration.
    LifoWorklist,
    true
);

/// Explores the smallest location first, oldest state first within a location.
#[derive(Debug, Default)]
pub struct PriorityWorklist {
    order: BTreeMap<(Location, StateId), CompositeState>,
    members: FxHashMap<CompositeState, StateId>,
}

impl PriorityWorklist {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Worklist for PriorityWorklist {
    fn add(&mut self, state: CompositeState) -> bool {
        match self.members.entry(state.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(state.id());
                self.order.insert((state.location(), state.id()), state);
                true
            }
        }
    }

    fn pick(&mut self) -> Option<CompositeState> {
        let (_, state) = self.order.pop_first()?;
        self.members.remove(&state);
        Some(state)
    }

    fn remove(&mut self, state: &CompositeState) -> bool {
        let Some(id) = self.members.remove(state) else {
            return false;
        };
        self.order.remove(&(state.location(), id));
        true
    }

    fn contains(&self, state: &CompositeState) -> bool {
        self.members.contains_key(state)
    }

    fn len(&self) -> usize {
        self.members.len()
    }

    fn iter(&self) -> Box<dyn Iterator<Item = &CompositeState> + '_> {
        Box::new(self.order.values())
    }
}
