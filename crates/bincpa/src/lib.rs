//! Configurable program analysis over binaries whose control flow graph is
//! reconstructed while the analysis runs.
//!
//! [`CpaAlgorithm`] drives a [`CompositeAnalysis`] to a fixpoint. Outgoing
//! edges come from a [`TransformerFactory`]; [`ResolvingTransformerFactory`]
//! resolves indirect branches against the abstract state and records the
//! discovered graph.

pub mod analysis;
mod algorithm;
mod art;
mod config;
mod error;
pub mod metrics;
mod precision;
mod reached;
mod state;
pub mod transformer;
mod worklist;

pub use algorithm::*;
pub use analysis::{CompositeAnalysis, ConfigurableProgramAnalysis};
pub use art::*;
pub use config::*;
pub use error::*;
pub use precision::*;
pub use reached::*;
pub use state::*;
pub use transformer::{CfaTransformerFactory, ResolvingTransformerFactory, TransformerFactory};
pub use worklist::*;

pub use bincpa_cfa as cfa;
pub use bincpa_ir as ir;
