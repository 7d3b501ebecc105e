//! Control flow graph discovered during analysis.

use std::collections::BTreeSet;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::edge::{CfaEdge, EdgeKind};
use crate::location::Location;

/// Edge set with out-edge and in-edge indices.
///
/// Edges are kept in insertion order so that iteration is deterministic.
#[derive(Clone, Debug, Default)]
pub struct ControlFlowGraph {
    edges: Vec<CfaEdge>,
    known: FxHashSet<CfaEdge>,
    out_edges: FxHashMap<Location, Vec<usize>>,
    in_edges: FxHashMap<Location, Vec<usize>>,
}

impl ControlFlowGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from a set of edges.
    #[must_use]
    pub fn from_edges(edges: impl IntoIterator<Item = CfaEdge>) -> Self {
        let mut graph = Self::new();
        graph.extend(edges);
        graph
    }

    /// Add an edge. Returns false if it was already present.
    pub fn add_edge(&mut self, edge: CfaEdge) -> bool {
        if !self.known.insert(edge.clone()) {
            return false;
        }
        let idx = self.edges.len();
        self.out_edges.entry(edge.source()).or_default().push(idx);
        self.in_edges.entry(edge.target()).or_default().push(idx);
        self.edges.push(edge);
        true
    }

    pub fn extend(&mut self, edges: impl IntoIterator<Item = CfaEdge>) {
        for edge in edges {
            self.add_edge(edge);
        }
    }

    /// All edges in insertion order.
    #[must_use]
    pub fn edges(&self) -> &[CfaEdge] {
        &self.edges
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    #[must_use]
    pub fn contains(&self, edge: &CfaEdge) -> bool {
        self.known.contains(edge)
    }

    /// Edges leaving `location`.
    pub fn out_edges(&self, location: Location) -> impl Iterator<Item = &CfaEdge> + '_ {
        self.indexed(&self.out_edges, location)
    }

    /// Edges entering `location`.
    pub fn in_edges(&self, location: Location) -> impl Iterator<Item = &CfaEdge> + '_ {
        self.indexed(&self.in_edges, location)
    }

    fn indexed<'a>(
        &'a self,
        index: &'a FxHashMap<Location, Vec<usize>>,
        location: Location,
    ) -> impl Iterator<Item = &'a CfaEdge> + 'a {
        index
            .get(&location)
            .into_iter()
            .flatten()
            .map(|&idx| &self.edges[idx])
    }

    /// All locations that appear on some edge, in location order.
    #[must_use]
    pub fn nodes(&self) -> BTreeSet<Location> {
        self.out_edges
            .keys()
            .chain(self.in_edges.keys())
            .copied()
            .collect()
    }

    /// Locations with an incoming MUST edge but no outgoing one: the points
    /// where sound reconstruction stopped.
    #[must_use]
    pub fn must_leaves(&self) -> BTreeSet<Location> {
        self.in_edges
            .keys()
            .copied()
            .filter(|&loc| self.in_edges(loc).any(|e| e.kind() == EdgeKind::Must))
            .filter(|&loc| !self.out_edges(loc).any(|e| e.kind() == EdgeKind::Must))
            .collect()
    }
}
