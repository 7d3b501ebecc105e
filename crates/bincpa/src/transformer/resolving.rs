//! On-the-fly control flow reconstruction.

use std::collections::BTreeSet;
use std::sync::Arc;

use bincpa_cfa::{CfaEdge, ControlFlowGraph, EdgeKind, Location, Program};
use bincpa_ir::{Branch, Expr, Goto, GotoKind, Label, LabeledStmt, Stmt};
use rustc_hash::FxHashSet;
use tracing::{debug, info, warn};

use super::TransformerFactory;
use crate::config::Options;
use crate::error::{ControlFlowException, CpaError, Fault};
use crate::state::CompositeState;

/// Jump targets below this address are almost certainly miscomputed.
pub const SUSPICIOUS_TARGET_BELOW: u64 = 10;

/// Resolves indirect branches against the abstract state and links calls
/// to their fall-through with call-return edges.
pub struct ResolvingTransformerFactory {
    program: Arc<Program>,
    options: Options,
    sound: bool,
    unresolved: BTreeSet<Label>,
    cfa: ControlFlowGraph,
    discovered: FxHashSet<u64>,
}

/// Edge list that drops duplicates and keeps emission order.
#[derive(Default)]
struct Edges {
    seen: FxHashSet<CfaEdge>,
    edges: Vec<CfaEdge>,
}

impl Edges {
    fn push(&mut self, edge: CfaEdge) {
        if self.seen.insert(edge.clone()) {
            self.edges.push(edge);
        }
    }
}

impl ResolvingTransformerFactory {
    #[must_use]
    pub fn new(program: Arc<Program>, options: Options) -> Self {
        Self {
            program,
            options,
            sound: true,
            unresolved: BTreeSet::new(),
            cfa: ControlFlowGraph::new(),
            discovered: FxHashSet::default(),
        }
    }

    #[must_use]
    pub fn program(&self) -> &Program {
        &self.program
    }

    #[must_use]
    pub const fn options(&self) -> &Options {
        &self.options
    }

    /// Every edge emitted so far.
    #[must_use]
    pub const fn cfa(&self) -> &ControlFlowGraph {
        &self.cfa
    }

    #[must_use]
    pub fn into_cfa(self) -> ControlFlowGraph {
        self.cfa
    }

    fn resolve_goto(
        &mut self,
        state: &CompositeState,
        stmt: &LabeledStmt,
        goto: &Goto,
        edges: &mut Edges,
    ) -> Result<(), CpaError> {
        let label = stmt.label;

        if goto.kind == GotoKind::Call && self.options.call_return_edges {
            let next = self
                .program
                .harness()
                .filter(|h| h.contains(label.address()))
                .and_then(|h| h.fall_through(label.address()))
                .map(Label::at)
                .or(stmt.next);
            match next {
                Some(next) => edges.push(CfaEdge::must(label, next, Stmt::CallReturn)),
                None => warn!(%label, "call has no fall-through address, no call-return edge"),
            }
        }

        let branch = Branch {
            kind: goto.kind,
            fall_through: stmt.next,
        };
        let pairs = state.projection_from_concretization(&[&goto.condition, &goto.target], &self.program);
        for pair in pairs {
            let target = pair.get(1).copied().flatten();
            // An unconstrained condition can go either way
            let conditions = match pair.first().copied().flatten() {
                Some(value) => vec![value],
                None => vec![0, 1],
            };
            for condition in conditions {
                let assumption = Expr::eq(goto.condition.clone(), Expr::imm(condition));
                if condition == 0 {
                    let Some(next) = stmt.next else {
                        debug!(%label, "branch not taken but no fall-through");
                        continue;
                    };
                    let assume = Stmt::assume(assumption.simplify());
                    edges.push(self.checked_edge(state, label, next, assume, EdgeKind::Must));
                    continue;
                }
                match target {
                    Some(target) => {
                        let assumption = Expr::logical_and(
                            assumption,
                            Expr::eq(goto.target.clone(), Expr::imm(target)),
                        )
                        .simplify();
                        let assume = Stmt::Assume {
                            assumption,
                            branch: Some(branch),
                        };
                        edges.push(self.checked_edge(state, label, Label::at(target), assume, EdgeKind::Must));
                    }
                    None if self.options.all_edges => {
                        warn!(
                            %label,
                            target = %goto.target,
                            "cannot resolve target, adding edges to all code addresses"
                        );
                        self.sound = false;
                        for address in self.program.code_addresses() {
                            let assume = Stmt::Assume {
                                assumption: Expr::eq(goto.target.clone(), Expr::imm(address)),
                                branch: Some(branch),
                            };
                            edges.push(CfaEdge::may(label, Label::at(address), assume));
                        }
                    }
                    None => {
                        info!(
                            %label,
                            target = %goto.target,
                            "cannot resolve target, continuing with unsound underapproximation"
                        );
                        debug!(%state, "unresolved at");
                        self.sound = false;
                        self.unresolved.insert(label);
                        if self.options.debug {
                            return Err(ControlFlowException {
                                label,
                                state: Box::new(state.clone()),
                            }
                            .into());
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn checked_edge(&self, state: &CompositeState, source: Label, target: Label, stmt: Stmt, kind: EdgeKind) -> CfaEdge {
        if target.address() < SUSPICIOUS_TARGET_BELOW {
            warn!(from = %state.location(), target = %target, "control flow reaches suspicious address");
        }
        CfaEdge::new(source, target, stmt, kind)
    }
}

impl TransformerFactory for ResolvingTransformerFactory {
    fn initial_location(&self) -> Location {
        Location::from(self.program.start_label())
    }

    fn transformers(&mut self, state: &CompositeState) -> Result<Vec<CfaEdge>, CpaError> {
        let label = state.location().label();
        let program = Arc::clone(&self.program);
        let stmt = program
            .statement(label)
            .ok_or(Fault::MissingStatement { label })?;
        self.discovered.insert(label.address());

        let mut edges = Edges::default();
        match &stmt.stmt {
            Stmt::Goto(goto) => self.resolve_goto(state, stmt, goto, &mut edges)?,
            Stmt::Halt => {}
            other => match stmt.next {
                Some(next) => edges.push(CfaEdge::must(label, next, other.clone())),
                None => debug!(%label, "statement has no successor"),
            },
        }

        self.cfa.extend(edges.edges.iter().cloned());
        Ok(edges.edges)
    }

    fn is_sound(&self) -> bool {
        self.sound
    }

    fn unresolved_branches(&self) -> &BTreeSet<Label> {
        &self.unresolved
    }

    fn instruction_count(&self) -> Option<usize> {
        Some(self.discovered.len())
    }
}
