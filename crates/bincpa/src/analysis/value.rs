//! Bounded value-set analysis over registers.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use bincpa_cfa::{CfaEdge, Program};
use bincpa_ir::{BinaryOp, Expr, Stmt};
use tracing::debug;

use super::ConfigurableProgramAnalysis;
use crate::error::Fault;
use crate::precision::{ComponentPrecision, ValuePrecision, DEFAULT_VALUE_THRESHOLD};
use crate::reached::ReachedSet;
use crate::state::{ComponentState, CompositeState, Valuation};

/// Maximum number of constants tracked per register.
pub const MAX_VALUES: usize = 16;

/// Number of tracked registers.
pub const NUM_REGS: usize = 32;

/// Accesses entirely below this address are null-pointer dereferences.
pub const NULL_PAGE_END: u64 = 0x1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum ValueKind {
    Unknown,
    Constant,
}

/// Either unknown or one of a small sorted set of constants.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RegisterValue {
    kind: ValueKind,
    values: Vec<u64>,
}

static UNKNOWN: RegisterValue = RegisterValue::unknown();

impl RegisterValue {
    #[must_use]
    pub const fn unknown() -> Self {
        Self {
            kind: ValueKind::Unknown,
            values: Vec::new(),
        }
    }

    #[must_use]
    pub fn constant(value: u64) -> Self {
        Self {
            kind: ValueKind::Constant,
            values: vec![value],
        }
    }

    /// Value set of `values`, or unknown past [`MAX_VALUES`].
    #[must_use]
    pub fn from_values(values: impl IntoIterator<Item = u64>) -> Self {
        let set: BTreeSet<u64> = values.into_iter().collect();
        if set.len() > MAX_VALUES {
            return Self::unknown();
        }
        Self {
            kind: ValueKind::Constant,
            values: set.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn is_constant(&self) -> bool {
        self.kind == ValueKind::Constant
    }

    /// Candidate constants, or `None` when unknown.
    #[must_use]
    pub fn values(&self) -> Option<&[u64]> {
        match self.kind {
            ValueKind::Constant => Some(&self.values),
            ValueKind::Unknown => None,
        }
    }

    /// The value, if it is known exactly.
    #[must_use]
    pub fn single(&self) -> Option<u64> {
        match self.values() {
            Some(&[value]) => Some(value),
            _ => None,
        }
    }

    pub fn add_value(&mut self, value: u64) {
        if self.kind != ValueKind::Constant {
            return;
        }

        if let Err(idx) = self.values.binary_search(&value) {
            if self.values.len() >= MAX_VALUES {
                self.kind = ValueKind::Unknown;
                self.values.clear();
            } else {
                self.values.insert(idx, value);
            }
        }
    }

    /// Union of both value sets.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        if self.kind == ValueKind::Unknown || other.kind == ValueKind::Unknown {
            return Self::unknown();
        }
        let mut merged = self.clone();
        for &value in &other.values {
            merged.add_value(value);
        }
        merged
    }

    /// Set inclusion; everything is included in unknown.
    #[must_use]
    pub fn is_subset_of(&self, other: &Self) -> bool {
        match (self.values(), other.values()) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(a), Some(b)) => a.iter().all(|v| b.binary_search(v).is_ok()),
        }
    }

    fn map(&self, f: impl Fn(u64) -> u64) -> Self {
        self.values()
            .map_or_else(Self::unknown, |values| Self::from_values(values.iter().map(|&v| f(v))))
    }

    fn combine(&self, other: &Self, f: impl Fn(u64, u64) -> u64) -> Self {
        match (self.values(), other.values()) {
            (Some(a), Some(b)) => {
                Self::from_values(a.iter().flat_map(|&x| b.iter().map(move |&y| (x, y))).map(|(x, y)| f(x, y)))
            }
            _ => Self::unknown(),
        }
    }
}

impl fmt::Display for RegisterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.values() {
            None => f.write_str("*"),
            Some([value]) => write!(f, "{value:#x}"),
            Some(values) => {
                f.write_str("{")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value:#x}")?;
                }
                f.write_str("}")
            }
        }
    }
}

/// Register file of value sets. Cloning is cheap until a register changes.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ValueState {
    regs: Arc<[RegisterValue; NUM_REGS]>,
}

impl Default for ValueState {
    fn default() -> Self {
        Self::new()
    }
}

impl ValueState {
    /// All registers unknown.
    #[must_use]
    pub fn new() -> Self {
        Self {
            regs: Arc::new(std::array::from_fn(|_| RegisterValue::unknown())),
        }
    }

    #[must_use]
    pub fn get(&self, reg: u8) -> &RegisterValue {
        self.regs.get(usize::from(reg)).unwrap_or(&UNKNOWN)
    }

    pub fn set(&mut self, reg: u8, value: RegisterValue) {
        let idx = usize::from(reg);
        if idx >= NUM_REGS || self.regs[idx] == value {
            return;
        }
        Arc::make_mut(&mut self.regs)[idx] = value;
    }

    pub fn set_constant(&mut self, reg: u8, value: u64) {
        self.set(reg, RegisterValue::constant(value));
    }

    pub fn set_unknown(&mut self, reg: u8) {
        self.set(reg, RegisterValue::unknown());
    }

    /// Registers holding known constants.
    pub fn constants(&self) -> impl Iterator<Item = (u8, &[u64])> + '_ {
        (0u8..)
            .zip(self.regs.iter())
            .filter_map(|(reg, value)| value.values().map(|v| (reg, v)))
    }

    #[must_use]
    pub fn join(&self, other: &Self) -> Self {
        let mut joined = self.clone();
        for (idx, value) in (0u8..).zip(other.regs.iter()) {
            joined.set(idx, self.get(idx).merge(value));
        }
        joined
    }

    #[must_use]
    pub fn less_or_equal(&self, other: &Self) -> bool {
        self.regs
            .iter()
            .zip(other.regs.iter())
            .all(|(a, b)| a.is_subset_of(b))
    }

    /// Evaluate `expr`, reading constants through `program` when given.
    ///
    /// # Errors
    ///
    /// Fails on a memory read from the null page.
    pub fn eval(&self, expr: &Expr, program: Option<&Program>) -> Result<RegisterValue, Fault> {
        Ok(match expr {
            Expr::Imm(value) => RegisterValue::constant(*value),
            Expr::Reg(reg) => self.get(*reg).clone(),
            Expr::Mem { addr, width } => {
                let addresses = self.eval(addr, program)?;
                Self::load(&addresses, *width, program)?
            }
            Expr::Unary { op, expr } => self.eval(expr, program)?.map(|v| op.apply(v)),
            Expr::Binary { op, left, right } => {
                let left = self.eval(left, program)?;
                let right = self.eval(right, program)?;
                if *op == BinaryOp::LogicalAnd && (left.single() == Some(0) || right.single() == Some(0)) {
                    RegisterValue::constant(0)
                } else {
                    left.combine(&right, |l, r| op.apply(l, r))
                }
            }
        })
    }

    /// Reject accesses whose every candidate address is in the null page.
    ///
    /// # Errors
    ///
    /// Returns [`Fault::InvalidMemoryAccess`] with the first candidate address.
    pub fn check_access(addresses: &RegisterValue) -> Result<(), Fault> {
        match addresses.values() {
            Some(values @ [first, ..]) if values.iter().all(|&a| a < NULL_PAGE_END) => {
                Err(Fault::InvalidMemoryAccess { address: *first })
            }
            _ => Ok(()),
        }
    }

    fn load(addresses: &RegisterValue, width: u8, program: Option<&Program>) -> Result<RegisterValue, Fault> {
        Self::check_access(addresses)?;
        let (Some(addrs), Some(program)) = (addresses.values(), program) else {
            return Ok(RegisterValue::unknown());
        };
        let loaded: Option<Vec<u64>> = addrs
            .iter()
            .map(|&a| program.read_readonly(a, usize::from(width)))
            .collect();
        Ok(loaded.map_or_else(RegisterValue::unknown, RegisterValue::from_values))
    }

    /// State restricted to `assumption`, or `None` if it cannot hold.
    ///
    /// # Errors
    ///
    /// Fails when evaluating the assumption reads the null page.
    pub fn assume(&self, assumption: &Expr, program: Option<&Program>) -> Result<Option<Self>, Fault> {
        let truth = self.eval(assumption, program)?;
        if truth.values().is_some_and(|values| values.iter().all(|&v| v == 0)) {
            return Ok(None);
        }
        let mut next = self.clone();
        Ok(next.refine(assumption).then_some(next))
    }

    /// Narrow registers compared against constants. Returns false when infeasible.
    fn refine(&mut self, assumption: &Expr) -> bool {
        let Expr::Binary { op, left, right } = assumption else {
            return true;
        };
        match op {
            BinaryOp::LogicalAnd => self.refine(left) && self.refine(right),
            BinaryOp::Eq | BinaryOp::Ne => {
                let (reg, constant) = match (left.as_ref(), right.as_ref()) {
                    (Expr::Reg(reg), Expr::Imm(c)) | (Expr::Imm(c), Expr::Reg(reg)) => (*reg, *c),
                    _ => return true,
                };
                let current = self.get(reg).clone();
                if *op == BinaryOp::Eq {
                    if current.values().is_some_and(|v| v.binary_search(&constant).is_err()) {
                        return false;
                    }
                    self.set_constant(reg, constant);
                    true
                } else {
                    let Some(values) = current.values() else {
                        return true;
                    };
                    let rest: Vec<u64> = values.iter().copied().filter(|&v| v != constant).collect();
                    if rest.is_empty() {
                        return false;
                    }
                    self.set(reg, RegisterValue::from_values(rest));
                    true
                }
            }
            _ => true,
        }
    }

    /// Value of `reg` after executing `stmt`, without touching memory.
    #[must_use]
    pub fn value_after(&self, stmt: &Stmt, reg: u8) -> RegisterValue {
        match stmt {
            Stmt::Assign { reg: r, value } if *r == reg => {
                self.eval(value, None).unwrap_or_else(|_| RegisterValue::unknown())
            }
            Stmt::Havoc { reg: r } if *r == reg => RegisterValue::unknown(),
            _ => self.get(reg).clone(),
        }
    }

    /// Candidate value tuples of `exprs`. Registers are treated independently.
    #[must_use]
    pub fn projection(&self, exprs: &[&Expr], program: &Program) -> BTreeSet<Valuation> {
        let mut tuples: Vec<Valuation> = vec![Vec::with_capacity(exprs.len())];
        for expr in exprs {
            let candidates: Vec<Option<u64>> = match self.eval(expr, Some(program)) {
                Ok(value) => value
                    .values()
                    .map_or_else(|| vec![None], |values| values.iter().copied().map(Some).collect()),
                Err(_) => vec![None],
            };
            tuples = tuples
                .into_iter()
                .flat_map(|prefix| {
                    candidates.iter().map(move |c| {
                        let mut tuple = prefix.clone();
                        tuple.push(*c);
                        tuple
                    })
                })
                .collect();
        }
        tuples.into_iter().collect()
    }
}

impl fmt::Display for ValueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, (reg, _)) in self.constants().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "r{reg}={}", self.get(reg))?;
        }
        f.write_str("]")
    }
}

/// How reached value states absorb new ones.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MergeMode {
    #[default]
    Join,
    Sep,
}

/// Constant propagation with bounded value sets.
pub struct ValueAnalysis {
    program: Arc<Program>,
    merge: MergeMode,
    threshold: usize,
    atomic_calls: bool,
}

impl ValueAnalysis {
    #[must_use]
    pub const fn new(program: Arc<Program>) -> Self {
        Self {
            program,
            merge: MergeMode::Join,
            threshold: DEFAULT_VALUE_THRESHOLD,
            atomic_calls: false,
        }
    }

    #[must_use]
    pub const fn with_merge(mut self, merge: MergeMode) -> Self {
        self.merge = merge;
        self
    }

    /// Distinct values per register before widening.
    #[must_use]
    pub const fn with_threshold(mut self, threshold: usize) -> Self {
        self.threshold = threshold;
        self
    }

    /// Follow call-return edges, forgetting every register.
    #[must_use]
    pub const fn with_atomic_calls(mut self, enabled: bool) -> Self {
        self.atomic_calls = enabled;
        self
    }

    fn values<'a>(&self, state: &'a CompositeState, index: usize) -> Result<&'a ValueState, Fault> {
        state
            .component(index)
            .and_then(ComponentState::as_values)
            .ok_or(Fault::ComponentMismatch {
                analysis: self.name(),
                index,
            })
    }
}

impl ConfigurableProgramAnalysis for ValueAnalysis {
    fn name(&self) -> &'static str {
        "value"
    }

    fn init_start_state(&self, _location: bincpa_cfa::Location) -> ComponentState {
        ComponentState::Values(ValueState::new())
    }

    fn init_precision(&self, _location: bincpa_cfa::Location, _transformer: Option<&Stmt>) -> ComponentPrecision {
        ComponentPrecision::Values(ValuePrecision::new(self.threshold))
    }

    fn post(
        &self,
        state: &CompositeState,
        index: usize,
        edge: &CfaEdge,
        _precision: &ComponentPrecision,
    ) -> Result<Vec<ComponentState>, Fault> {
        let values = self.values(state, index)?;
        let program = Some(self.program.as_ref());
        let next = match edge.transformer() {
            Stmt::Assign { reg, value } => {
                let value = values.eval(value, program)?;
                let mut next = values.clone();
                next.set(*reg, value);
                Some(next)
            }
            Stmt::Havoc { reg } => {
                let mut next = values.clone();
                next.set_unknown(*reg);
                Some(next)
            }
            Stmt::Store { addr, value, .. } => {
                ValueState::check_access(&values.eval(addr, program)?)?;
                values.eval(value, program)?;
                Some(values.clone())
            }
            Stmt::Assume { assumption, .. } => values.assume(assumption, program)?,
            Stmt::CallReturn => self.atomic_calls.then(ValueState::new),
            Stmt::Goto(_) | Stmt::Skip | Stmt::Halt => Some(values.clone()),
        };
        Ok(next.into_iter().map(ComponentState::Values).collect())
    }

    fn merge(&self, s1: &ComponentState, s2: &ComponentState, _precision: &ComponentPrecision) -> ComponentState {
        match (self.merge, s1.as_values(), s2.as_values()) {
            (MergeMode::Join, Some(v1), Some(v2)) => ComponentState::Values(v1.join(v2)),
            _ => s2.clone(),
        }
    }

    fn less_or_equal(&self, s1: &ComponentState, s2: &ComponentState) -> bool {
        match (s1.as_values(), s2.as_values()) {
            (Some(v1), Some(v2)) => v1.less_or_equal(v2),
            _ => s1 == s2,
        }
    }

    fn prec(
        &self,
        state: &CompositeState,
        index: usize,
        precision: &ComponentPrecision,
        _reached: &ReachedSet,
    ) -> Result<(ComponentState, ComponentPrecision), Fault> {
        let values = self.values(state, index)?;
        let ComponentPrecision::Values(precision) = precision else {
            return Ok((ComponentState::Values(values.clone()), precision.clone()));
        };
        let mut precision = precision.clone();
        let mut refined = values.clone();
        for (reg, constants) in values.constants() {
            if precision.observe(reg, constants) {
                debug!(reg, location = %state.location(), "widening register");
                refined.set_unknown(reg);
            }
        }
        Ok((ComponentState::Values(refined), ComponentPrecision::Values(precision)))
    }
}

#[cfg(test)]
mod tests {
    use bincpa_cfa::{Location, ProgramBuilder};
    use bincpa_ir::Label;

    use super::*;

    fn program() -> Arc<Program> {
        Arc::new(
            ProgramBuilder::new(0x1000)
                .instruction(0x1000, 4, "hlt", vec![Stmt::Halt])
                .ro_segment(0x3000, vec![0x00, 0x20, 0x00, 0x00, 0x10, 0x20, 0x00, 0x00])
                .build(),
        )
    }

    fn state_with(values: ValueState) -> CompositeState {
        CompositeState::new(Location::from(Label::at(0x1000)), [ComponentState::Values(values)])
    }

    fn edge(stmt: Stmt) -> CfaEdge {
        CfaEdge::must(Label::at(0x1000), Label::at(0x1004), stmt)
    }

    #[test]
    fn test_register_value_merge() {
        let a = RegisterValue::constant(1);
        let b = RegisterValue::constant(2);
        let merged = a.merge(&b);
        assert_eq!(merged.values(), Some(&[1, 2][..]));
        assert!(a.is_subset_of(&merged));
        assert!(!merged.is_subset_of(&a));
        assert!(merged.is_subset_of(&RegisterValue::unknown()));
    }

    #[test]
    fn test_register_value_overflow() {
        let value = RegisterValue::from_values(0..MAX_VALUES as u64);
        assert!(value.is_constant());
        let mut value = value;
        value.add_value(1000);
        assert!(!value.is_constant());
        assert!(!RegisterValue::from_values(0..=MAX_VALUES as u64).is_constant());
    }

    #[test]
    fn test_eval_and_load() {
        let program = program();
        let mut values = ValueState::new();
        values.set(1, RegisterValue::from_values([0x3000, 0x3004]));
        let loaded = values.eval(&Expr::mem(Expr::reg(1), 4), Some(program.as_ref())).unwrap();
        assert_eq!(loaded.values(), Some(&[0x2000, 0x2010][..]));

        // Unknown memory is unknown
        values.set_constant(2, 0x8000);
        let loaded = values.eval(&Expr::mem(Expr::reg(2), 4), Some(program.as_ref())).unwrap();
        assert!(!loaded.is_constant());
    }

    #[test]
    fn test_null_page_access_faults() {
        let mut values = ValueState::new();
        values.set_constant(1, 0x10);
        let err = values.eval(&Expr::mem(Expr::reg(1), 4), None).unwrap_err();
        assert_eq!(err, Fault::InvalidMemoryAccess { address: 0x10 });

        // One valid candidate is enough
        values.set(1, RegisterValue::from_values([0x10, 0x3000]));
        assert!(values.eval(&Expr::mem(Expr::reg(1), 4), None).is_ok());
    }

    #[test]
    fn test_assume_refines_and_prunes() {
        let mut values = ValueState::new();
        values.set(1, RegisterValue::from_values([1, 2, 3]));

        let eq = Expr::eq(Expr::reg(1), Expr::imm(2));
        let refined = values.assume(&eq, None).unwrap().unwrap();
        assert_eq!(refined.get(1).single(), Some(2));

        let ne = Expr::ne(Expr::reg(1), Expr::imm(2));
        let refined = values.assume(&ne, None).unwrap().unwrap();
        assert_eq!(refined.get(1).values(), Some(&[1, 3][..]));

        let impossible = Expr::eq(Expr::reg(1), Expr::imm(9));
        assert!(values.assume(&impossible, None).unwrap().is_none());
        assert!(values.assume(&Expr::FALSE, None).unwrap().is_none());
    }

    #[test]
    fn test_post_assign_and_call_return() {
        let analysis = ValueAnalysis::new(program());
        let state = state_with(ValueState::new());
        let precision = analysis.init_precision(state.location(), None);

        let next = analysis
            .post(&state, 1, &edge(Stmt::assign(3, Expr::imm(7))), &precision)
            .unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].as_values().and_then(|v| v.get(3).single()), Some(7));

        let next = analysis.post(&state, 1, &edge(Stmt::CallReturn), &precision).unwrap();
        assert!(next.is_empty());

        let atomic = ValueAnalysis::new(program()).with_atomic_calls(true);
        let next = atomic.post(&state, 1, &edge(Stmt::CallReturn), &precision).unwrap();
        assert_eq!(next.len(), 1);
    }

    #[test]
    fn test_store_to_null_faults() {
        let analysis = ValueAnalysis::new(program());
        let state = state_with(ValueState::new());
        let store = Stmt::store(Expr::imm(0), Expr::imm(1), 4);
        let err = analysis
            .post(&state, 1, &edge(store), &ComponentPrecision::Null)
            .unwrap_err();
        assert_eq!(err, Fault::InvalidMemoryAccess { address: 0 });
    }

    #[test]
    fn test_merge_modes() {
        let mut a = ValueState::new();
        a.set_constant(1, 1);
        let mut b = ValueState::new();
        b.set_constant(1, 2);
        let (a, b) = (ComponentState::Values(a), ComponentState::Values(b));

        let join = ValueAnalysis::new(program());
        let merged = join.merge(&a, &b, &ComponentPrecision::Null);
        assert!(join.less_or_equal(&a, &merged));
        assert!(join.less_or_equal(&b, &merged));

        let sep = ValueAnalysis::new(program()).with_merge(MergeMode::Sep);
        assert_eq!(sep.merge(&a, &b, &ComponentPrecision::Null), b);
    }

    #[test]
    fn test_prec_widens_past_threshold() {
        let analysis = ValueAnalysis::new(program()).with_threshold(2);
        let reached = ReachedSet::new();
        let mut precision = analysis.init_precision(Location::from(Label::at(0x1000)), None);
        for value in 0..3 {
            let mut values = ValueState::new();
            values.set_constant(4, value);
            let (refined, next) = analysis.prec(&state_with(values), 1, &precision, &reached).unwrap();
            let widened = refined.as_values().is_some_and(|v| !v.get(4).is_constant());
            assert_eq!(widened, value == 2);
            precision = next;
        }
    }

    #[test]
    fn test_projection_is_cartesian() {
        let program = program();
        let mut values = ValueState::new();
        values.set(1, RegisterValue::from_values([0x2000, 0x2010]));
        let tuples = values.projection(&[&Expr::TRUE, &Expr::reg(1), &Expr::reg(2)], &program);
        assert_eq!(
            tuples.into_iter().collect::<Vec<_>>(),
            vec![vec![Some(1), Some(0x2000), None], vec![Some(1), Some(0x2010), None]]
        );
    }
}
