//! Control flow automaton model: program locations, labeled edges, the
//! graph discovered during analysis, and the in-memory program the analysis
//! reads instructions and IL statements from.

mod builder;
mod edge;
mod graph;
mod location;
mod program;

pub use builder::*;
pub use edge::*;
pub use graph::*;
pub use location::*;
pub use program::*;
