//! Control flow automaton edges.

use std::fmt;
use std::sync::Arc;

use bincpa_ir::Stmt;

use crate::location::Location;

/// Whether an edge is known to exist or was added by over-approximation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EdgeKind {
    Must,
    May,
}

/// Labeled transition between two locations.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CfaEdge {
    source: Location,
    target: Location,
    transformer: Arc<Stmt>,
    kind: EdgeKind,
}

impl CfaEdge {
    #[must_use]
    pub fn new(
        source: impl Into<Location>,
        target: impl Into<Location>,
        transformer: Stmt,
        kind: EdgeKind,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            transformer: Arc::new(transformer),
            kind,
        }
    }

    /// Edge that holds in every concretization.
    #[must_use]
    pub fn must(source: impl Into<Location>, target: impl Into<Location>, transformer: Stmt) -> Self {
        Self::new(source, target, transformer, EdgeKind::Must)
    }

    /// Edge produced by over-approximation.
    #[must_use]
    pub fn may(source: impl Into<Location>, target: impl Into<Location>, transformer: Stmt) -> Self {
        Self::new(source, target, transformer, EdgeKind::May)
    }

    #[must_use]
    pub const fn source(&self) -> Location {
        self.source
    }

    #[must_use]
    pub const fn target(&self) -> Location {
        self.target
    }

    #[must_use]
    pub fn transformer(&self) -> &Stmt {
        &self.transformer
    }

    #[must_use]
    pub const fn kind(&self) -> EdgeKind {
        self.kind
    }

    /// Same edge between different endpoints. Used when relabeling edges
    /// onto context-sensitive locations.
    #[must_use]
    pub fn with_endpoints(&self, source: Location, target: Location) -> Self {
        Self {
            source,
            target,
            transformer: Arc::clone(&self.transformer),
            kind: self.kind,
        }
    }
}

impl fmt::Display for CfaEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arrow = match self.kind {
            EdgeKind::Must => "->",
            EdgeKind::May => "~>",
        };
        write!(
            f,
            "{} {arrow} {} [{}]",
            self.source, self.target, self.transformer
        )
    }
}
