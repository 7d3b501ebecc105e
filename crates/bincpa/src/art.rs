//! Abstract reachability tree.

use std::collections::VecDeque;

use bincpa_cfa::{CfaEdge, ControlFlowGraph};
use rustc_hash::FxHashMap;

use crate::state::{CompositeState, StateId};

/// Index of a node in the tree arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug)]
struct Node {
    state: CompositeState,
    parent: Option<(NodeId, CfaEdge)>,
    children: Vec<(CfaEdge, NodeId)>,
}

/// Provenance of accepted states: which edge from which parent produced them.
///
/// Nodes are appended only, so the tree never has cycles.
#[derive(Debug, Default)]
pub struct ReachabilityTree {
    nodes: Vec<Node>,
    index: FxHashMap<StateId, NodeId>,
    root: Option<NodeId>,
}

impl ReachabilityTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, state: CompositeState, parent: Option<(NodeId, CfaEdge)>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.index.insert(state.id(), id);
        self.nodes.push(Node {
            state,
            parent,
            children: Vec::new(),
        });
        id
    }

    pub fn set_root(&mut self, state: CompositeState) -> NodeId {
        let id = self.push(state, None);
        self.root = Some(id);
        id
    }

    /// Record `child` as reached from `parent` via `edge`.
    ///
    /// Returns `None` if `parent` is not in the tree.
    pub fn add_child(&mut self, parent: &CompositeState, edge: CfaEdge, child: CompositeState) -> Option<NodeId> {
        let parent_id = self.node_of(parent)?;
        let id = self.push(child, Some((parent_id, edge.clone())));
        self.nodes[parent_id.0].children.push((edge, id));
        Some(id)
    }

    fn node_of(&self, state: &CompositeState) -> Option<NodeId> {
        self.index.get(&state.id()).copied()
    }

    #[must_use]
    pub fn contains(&self, state: &CompositeState) -> bool {
        self.index.contains_key(&state.id())
    }

    #[must_use]
    pub fn root(&self) -> Option<&CompositeState> {
        self.root.map(|id| &self.nodes[id.0].state)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Children of `state` in insertion order.
    #[must_use]
    pub fn children(&self, state: &CompositeState) -> Vec<(&CfaEdge, &CompositeState)> {
        self.node_of(state)
            .map(|id| {
                self.nodes[id.0]
                    .children
                    .iter()
                    .map(|(edge, child)| (edge, &self.nodes[child.0].state))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Breadth-first walk from the root.
    pub fn bfs(&self) -> impl Iterator<Item = &CompositeState> + '_ {
        let mut queue: VecDeque<NodeId> = self.root.into_iter().collect();
        std::iter::from_fn(move || {
            let id = queue.pop_front()?;
            let node = &self.nodes[id.0];
            queue.extend(node.children.iter().map(|(_, child)| *child));
            Some(&node.state)
        })
    }

    /// Edges from the root to `state`, or `None` if it is not in the tree.
    #[must_use]
    pub fn path_to(&self, state: &CompositeState) -> Option<Vec<&CfaEdge>> {
        let mut id = self.node_of(state)?;
        let mut path = Vec::new();
        while let Some((parent, edge)) = &self.nodes[id.0].parent {
            path.push(edge);
            id = *parent;
        }
        path.reverse();
        Some(path)
    }

    /// Control-flow graph over the locations of tree states.
    #[must_use]
    pub fn to_cfg(&self) -> ControlFlowGraph {
        let mut cfg = ControlFlowGraph::new();
        for node in &self.nodes {
            let source = node.state.location();
            for (edge, child) in &node.children {
                let target = self.nodes[child.0].state.location();
                cfg.add_edge(edge.with_endpoints(source, target));
            }
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use bincpa_cfa::Location;
    use bincpa_ir::{Label, Stmt};

    use super::*;

    fn state(address: u64) -> CompositeState {
        CompositeState::new(Location::from(Label::at(address)), [])
    }

    fn edge(from: u64, to: u64) -> CfaEdge {
        CfaEdge::must(Label::at(from), Label::at(to), Stmt::Skip)
    }

    #[test]
    fn test_tree_structure() {
        let mut art = ReachabilityTree::new();
        let root = state(0);
        let a = state(1);
        let b = state(2);
        let c = state(3);
        art.set_root(root.clone());
        assert!(art.add_child(&root, edge(0, 1), a.clone()).is_some());
        assert!(art.add_child(&root, edge(0, 2), b.clone()).is_some());
        assert!(art.add_child(&a, edge(1, 3), c.clone()).is_some());
        assert!(art.add_child(&state(9), edge(9, 3), state(3)).is_none());

        assert_eq!(art.len(), 4);
        assert_eq!(art.root().map(CompositeState::id), Some(root.id()));
        assert_eq!(art.children(&root).len(), 2);
        assert!(art.children(&c).is_empty());

        let order: Vec<_> = art.bfs().map(|s| s.location().address()).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);

        let path = art.path_to(&c).unwrap();
        let hops: Vec<_> = path.iter().map(|e| e.target().address()).collect();
        assert_eq!(hops, vec![1, 3]);
        assert!(art.path_to(&root).is_some_and(|p| p.is_empty()));
    }

    #[test]
    fn test_to_cfg_uses_state_locations() {
        let mut art = ReachabilityTree::new();
        let root = state(0);
        let split = CompositeState::new(
            Location::Vpc {
                label: Label::at(1),
                vpc: 7,
            },
            [],
        );
        art.set_root(root.clone());
        art.add_child(&root, edge(0, 1), split.clone());

        let cfg = art.to_cfg();
        assert_eq!(cfg.edge_count(), 1);
        assert_eq!(cfg.edges()[0].target(), split.location());
    }
}
