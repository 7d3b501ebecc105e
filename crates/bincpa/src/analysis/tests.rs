use std::sync::Arc;

use bincpa_cfa::{Program, ProgramBuilder};
use bincpa_ir::{Expr, Label};

use super::*;

fn program() -> Arc<Program> {
    Arc::new(
        ProgramBuilder::new(0x1000)
            .instruction(0x1000, 4, "hlt", vec![Stmt::Halt])
            .build(),
    )
}

fn composite() -> CompositeAnalysis {
    CompositeAnalysis::new(
        LocationAnalysis::forward(),
        vec![
            Box::new(ValueAnalysis::new(program())),
            Box::new(CallStackAnalysis::new()),
        ],
    )
}

fn state(address: u64, r1: &[u64], frames: &[u64]) -> CompositeState {
    let mut values = ValueState::new();
    values.set(1, RegisterValue::from_values(r1.iter().copied()));
    let stack = frames
        .iter()
        .fold(CallStackState::new(), |s, &f| s.push(f, DEFAULT_MAX_DEPTH));
    CompositeState::new(
        Location::from(Label::at(address)),
        [ComponentState::Values(values), ComponentState::CallStack(stack)],
    )
}

#[test]
fn test_init_start_state() {
    let cpa = composite();
    let loc = Location::from(Label::at(0x1000));
    let start = cpa.init_start_state(loc);
    assert_eq!(start.location(), loc);
    assert_eq!(start.len(), 3);
    assert_eq!(cpa.names(), vec!["location", "value", "call-stack"]);
    let precision = cpa.init_precision(loc, None);
    assert_eq!(precision.components().len(), 3);
    assert_eq!(precision.component(0), &ComponentPrecision::Null);
}

#[test]
fn test_merge_joins_componentwise() {
    let cpa = composite();
    let precision = cpa.init_precision(Location::from(Label::at(0x10)), None);
    let s1 = state(0x10, &[1], &[]);
    let s2 = state(0x10, &[2], &[]);
    let merged = cpa.merge(&s1, &s2, &precision);
    assert_ne!(merged, s2);
    assert!(cpa.less_or_equal(&s1, &merged));
    assert!(cpa.less_or_equal(&s2, &merged));
}

#[test]
fn test_merge_refused_by_component() {
    let cpa = composite();
    let precision = cpa.init_precision(Location::from(Label::at(0x10)), None);
    let s1 = state(0x10, &[1], &[0x20]);
    let s2 = state(0x10, &[2], &[]);
    let merged = cpa.merge(&s1, &s2, &precision);
    assert_eq!(merged.id(), s2.id());
}

#[test]
fn test_merge_never_crosses_locations() {
    let cpa = composite();
    let precision = cpa.init_precision(Location::from(Label::at(0x10)), None);
    let s1 = state(0x10, &[1], &[]);
    let s2 = state(0x14, &[2], &[]);
    assert_eq!(cpa.merge(&s1, &s2, &precision).id(), s2.id());
}

#[test]
fn test_merge_without_change_keeps_reached_state() {
    let cpa = composite();
    let precision = cpa.init_precision(Location::from(Label::at(0x10)), None);
    let s1 = state(0x10, &[1], &[]);
    let s2 = state(0x10, &[1, 2], &[]);
    assert_eq!(cpa.merge(&s1, &s2, &precision).id(), s2.id());
}

#[test]
fn test_stop_is_idempotent_subsumption() {
    let cpa = composite();
    let precision = cpa.init_precision(Location::from(Label::at(0x10)), None);
    let mut reached = ReachedSet::new();
    reached.add(state(0x10, &[1, 2], &[]));

    let covered = state(0x10, &[1], &[]);
    assert!(cpa.stop(&covered, &reached, &precision));
    assert!(cpa.stop(&covered, &reached, &precision));
    assert!(!cpa.stop(&state(0x10, &[3], &[]), &reached, &precision));
    assert!(!cpa.stop(&state(0x14, &[1], &[]), &reached, &precision));
}

#[test]
fn test_post_combines_components() {
    let cpa = composite();
    let from = state(0x10, &[1], &[]);
    let precision = cpa.init_precision(Location::from(Label::at(0x14)), None);

    let assign = CfaEdge::must(Label::at(0x10), Label::at(0x14), Stmt::assign(2, Expr::imm(9)));
    let next = cpa.post(&from, &assign, &precision).unwrap();
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].location(), Location::from(Label::at(0x14)));
    assert_eq!(next[0].values().and_then(|v| v.get(2).single()), Some(9));

    let infeasible = CfaEdge::must(
        Label::at(0x10),
        Label::at(0x14),
        Stmt::assume(Expr::eq(Expr::reg(1), Expr::imm(5))),
    );
    assert!(cpa.post(&from, &infeasible, &precision).unwrap().is_empty());
}

#[test]
fn test_post_fault_propagates() {
    let cpa = composite();
    let from = state(0x10, &[1], &[]);
    let precision = cpa.init_precision(Location::from(Label::at(0x14)), None);
    let store = CfaEdge::must(
        Label::at(0x10),
        Label::at(0x14),
        Stmt::store(Expr::reg(1), Expr::imm(0), 4),
    );
    let err = cpa.post(&from, &store, &precision).unwrap_err();
    assert_eq!(err.fault, Fault::InvalidMemoryAccess { address: 1 });
    assert!(err.state.is_none());
}

#[test]
fn test_prec_keeps_identity_when_unchanged() {
    let cpa = composite();
    let reached = ReachedSet::new();
    let s = state(0x10, &[1], &[]);
    let precision = cpa.init_precision(s.location(), None);
    let (refined, _) = cpa.prec(&s, &precision, &reached).unwrap();
    assert_eq!(refined.id(), s.id());
}
