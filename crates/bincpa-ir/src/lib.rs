//! Intermediate language for binary analysis.
//!
//! This crate provides pure IR types with no instruction-set knowledge.
//! Front ends translate machine instructions into sequences of [`Stmt`]s
//! addressed by [`Label`]s; the analysis engine consumes them.

mod expr;
mod label;
mod stmt;

pub use expr::*;
pub use label::*;
pub use stmt::*;
