//! Analysis precisions.

use std::collections::{BTreeMap, BTreeSet};

/// Default number of distinct values a register may take before it is widened.
pub const DEFAULT_VALUE_THRESHOLD: usize = 8;

/// Value-analysis precision: every constant seen per register so far.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValuePrecision {
    threshold: usize,
    seen: BTreeMap<u8, BTreeSet<u64>>,
}

impl ValuePrecision {
    #[must_use]
    pub const fn new(threshold: usize) -> Self {
        Self {
            threshold,
            seen: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn threshold(&self) -> usize {
        self.threshold
    }

    /// Record `values` for `reg`; returns whether the register must be widened.
    pub fn observe(&mut self, reg: u8, values: &[u64]) -> bool {
        let seen = self.seen.entry(reg).or_default();
        seen.extend(values.iter().copied());
        seen.len() > self.threshold
    }

    /// Number of distinct values recorded for `reg`.
    #[must_use]
    pub fn seen(&self, reg: u8) -> usize {
        self.seen.get(&reg).map_or(0, BTreeSet::len)
    }
}

/// Precision of a single component.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ComponentPrecision {
    Null,
    Values(ValuePrecision),
}

static NULL_PRECISION: ComponentPrecision = ComponentPrecision::Null;

/// Per-component precisions, positionally aligned with the composite analysis.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct CompositePrecision(Vec<ComponentPrecision>);

impl CompositePrecision {
    #[must_use]
    pub const fn new(components: Vec<ComponentPrecision>) -> Self {
        Self(components)
    }

    /// Precision of component `index`; missing entries are [`ComponentPrecision::Null`].
    #[must_use]
    pub fn component(&self, index: usize) -> &ComponentPrecision {
        self.0.get(index).unwrap_or(&NULL_PRECISION)
    }

    #[must_use]
    pub fn components(&self) -> &[ComponentPrecision] {
        &self.0
    }
}
