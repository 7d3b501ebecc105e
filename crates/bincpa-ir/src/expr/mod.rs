//! Expression IR.

use std::fmt;

use rustc_hash::FxHashMap;

/// Unary operations.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum UnaryOp {
    /// Bitwise complement.
    Not,
    /// Two's complement negation.
    Neg,
    /// Boolean negation (0 becomes 1, everything else becomes 0).
    LogicalNot,
}

impl UnaryOp {
    /// Concrete 64-bit semantics.
    #[must_use]
    pub fn apply(self, value: u64) -> u64 {
        match self {
            Self::Not => !value,
            Self::Neg => value.wrapping_neg(),
            Self::LogicalNot => u64::from(value == 0),
        }
    }

    const fn symbol(self) -> &'static str {
        match self {
            Self::Not => "~",
            Self::Neg => "-",
            Self::LogicalNot => "!",
        }
    }
}

/// Flipping the sign bit maps signed order onto unsigned order.
const SIGN_BIT: u64 = 1 << 63;

/// Binary operations.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Eq,
    Ne,
    Ltu,
    Lt,
    LogicalAnd,
}

impl BinaryOp {
    /// Concrete 64-bit wrapping semantics. Comparisons yield 0 or 1.
    #[must_use]
    pub fn apply(self, left: u64, right: u64) -> u64 {
        // Shift amounts are taken modulo 64
        let shift = u32::try_from(right & 63).unwrap_or_default();
        match self {
            Self::Add => left.wrapping_add(right),
            Self::Sub => left.wrapping_sub(right),
            Self::Mul => left.wrapping_mul(right),
            Self::And => left & right,
            Self::Or => left | right,
            Self::Xor => left ^ right,
            Self::Shl => left.wrapping_shl(shift),
            Self::Shr => left.wrapping_shr(shift),
            Self::Eq => u64::from(left == right),
            Self::Ne => u64::from(left != right),
            Self::Ltu => u64::from(left < right),
            Self::Lt => u64::from((left ^ SIGN_BIT) < (right ^ SIGN_BIT)),
            Self::LogicalAnd => u64::from(left != 0 && right != 0),
        }
    }

    /// Whether the operation always produces 0 or 1.
    #[must_use]
    pub const fn is_boolean(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Ltu | Self::Lt | Self::LogicalAnd
        )
    }

    const fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::And => "&",
            Self::Or => "|",
            Self::Xor => "^",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Ltu => "<u",
            Self::Lt => "<s",
            Self::LogicalAnd => "&&",
        }
    }
}

/// Expression tree node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Expr {
    Imm(u64),
    Reg(u8),
    Mem {
        addr: Box<Self>,
        width: u8,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Self>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Self>,
        right: Box<Self>,
    },
}

/// Known register values used when evaluating expressions.
#[derive(Clone, Debug, Default)]
pub struct Context {
    regs: FxHashMap<u8, u64>,
}

impl Context {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a register to a concrete value.
    #[must_use]
    pub fn with_reg(mut self, reg: u8, value: u64) -> Self {
        self.regs.insert(reg, value);
        self
    }

    #[must_use]
    pub fn get(&self, reg: u8) -> Option<u64> {
        self.regs.get(&reg).copied()
    }
}

// These are factory methods, not trait implementations
#[allow(clippy::should_implement_trait)]
impl Expr {
    pub const TRUE: Self = Self::Imm(1);
    pub const FALSE: Self = Self::Imm(0);

    /// Create an immediate expression.
    #[must_use]
    pub const fn imm(val: u64) -> Self {
        Self::Imm(val)
    }

    /// Create a register read expression.
    #[must_use]
    pub const fn reg(idx: u8) -> Self {
        Self::Reg(idx)
    }

    /// Create a boolean constant.
    #[must_use]
    pub fn bool(val: bool) -> Self {
        Self::Imm(u64::from(val))
    }

    /// Create a memory read expression.
    #[must_use]
    pub fn mem(addr: Self, width: u8) -> Self {
        Self::Mem {
            addr: Box::new(addr),
            width,
        }
    }

    /// Constant value, if the expression is an immediate.
    #[must_use]
    pub const fn const_value(&self) -> Option<u64> {
        match self {
            Self::Imm(v) => Some(*v),
            _ => None,
        }
    }

    /// Whether the expression is statically known to evaluate to 0 or 1.
    #[must_use]
    pub const fn is_boolean(&self) -> bool {
        match self {
            Self::Imm(v) => *v <= 1,
            Self::Unary { op, .. } => matches!(op, UnaryOp::LogicalNot),
            Self::Binary { op, .. } => op.is_boolean(),
            _ => false,
        }
    }

    const fn is_zero(&self) -> bool {
        matches!(self, Self::Imm(0))
    }

    fn unary(op: UnaryOp, expr: Self) -> Self {
        if let Self::Imm(v) = expr {
            return Self::Imm(op.apply(v));
        }
        Self::Unary {
            op,
            expr: Box::new(expr),
        }
    }

    fn binary(op: BinaryOp, left: Self, right: Self) -> Self {
        if let (Self::Imm(l), Self::Imm(r)) = (&left, &right) {
            return Self::Imm(op.apply(*l, *r));
        }
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    #[must_use]
    pub fn not(expr: Self) -> Self {
        Self::unary(UnaryOp::Not, expr)
    }

    #[must_use]
    pub fn neg(expr: Self) -> Self {
        Self::unary(UnaryOp::Neg, expr)
    }

    #[must_use]
    pub fn logical_not(expr: Self) -> Self {
        match expr {
            Self::Binary {
                op: BinaryOp::Eq,
                left,
                right,
            } => Self::binary(BinaryOp::Ne, *left, *right),
            Self::Binary {
                op: BinaryOp::Ne,
                left,
                right,
            } => Self::binary(BinaryOp::Eq, *left, *right),
            other => Self::unary(UnaryOp::LogicalNot, other),
        }
    }

    #[must_use]
    pub fn add(left: Self, right: Self) -> Self {
        if right.is_zero() {
            return left;
        }
        if left.is_zero() {
            return right;
        }
        Self::binary(BinaryOp::Add, left, right)
    }

    #[must_use]
    pub fn sub(left: Self, right: Self) -> Self {
        if right.is_zero() {
            return left;
        }
        if left.is_zero() {
            return Self::neg(right);
        }
        Self::binary(BinaryOp::Sub, left, right)
    }

    #[must_use]
    pub fn mul(left: Self, right: Self) -> Self {
        if left.is_zero() || right.is_zero() {
            return Self::Imm(0);
        }
        if right == Self::Imm(1) {
            return left;
        }
        if left == Self::Imm(1) {
            return right;
        }
        Self::binary(BinaryOp::Mul, left, right)
    }

    #[must_use]
    pub fn and(left: Self, right: Self) -> Self {
        if left.is_zero() || right.is_zero() {
            return Self::Imm(0);
        }
        Self::binary(BinaryOp::And, left, right)
    }

    #[must_use]
    pub fn or(left: Self, right: Self) -> Self {
        if right.is_zero() {
            return left;
        }
        if left.is_zero() {
            return right;
        }
        Self::binary(BinaryOp::Or, left, right)
    }

    #[must_use]
    pub fn xor(left: Self, right: Self) -> Self {
        if right.is_zero() {
            return left;
        }
        if left.is_zero() {
            return right;
        }
        Self::binary(BinaryOp::Xor, left, right)
    }

    #[must_use]
    pub fn shl(left: Self, right: Self) -> Self {
        if right.is_zero() {
            return left;
        }
        Self::binary(BinaryOp::Shl, left, right)
    }

    #[must_use]
    pub fn shr(left: Self, right: Self) -> Self {
        if right.is_zero() {
            return left;
        }
        Self::binary(BinaryOp::Shr, left, right)
    }

    /// Equality. Pure expressions compared with themselves fold to true.
    #[must_use]
    pub fn eq(left: Self, right: Self) -> Self {
        if left == right {
            return Self::TRUE;
        }
        Self::binary(BinaryOp::Eq, left, right)
    }

    #[must_use]
    pub fn ne(left: Self, right: Self) -> Self {
        if left == right {
            return Self::FALSE;
        }
        Self::binary(BinaryOp::Ne, left, right)
    }

    #[must_use]
    pub fn ltu(left: Self, right: Self) -> Self {
        Self::binary(BinaryOp::Ltu, left, right)
    }

    #[must_use]
    pub fn lt(left: Self, right: Self) -> Self {
        Self::binary(BinaryOp::Lt, left, right)
    }

    /// Conjunction of two conditions.
    #[must_use]
    pub fn logical_and(left: Self, right: Self) -> Self {
        match (left.const_value(), right.const_value()) {
            (Some(0), _) | (_, Some(0)) => Self::FALSE,
            (Some(_), _) if right.is_boolean() => right,
            (_, Some(_)) if left.is_boolean() => left,
            _ => Self::binary(BinaryOp::LogicalAnd, left, right),
        }
    }

    /// Rebuild the expression with known register values substituted and
    /// all constant subterms folded.
    #[must_use]
    pub fn evaluate(&self, ctx: &Context) -> Self {
        match self {
            Self::Imm(_) => self.clone(),
            Self::Reg(r) => ctx.get(*r).map_or_else(|| self.clone(), Self::Imm),
            Self::Mem { addr, width } => Self::mem(addr.evaluate(ctx), *width),
            Self::Unary { op, expr } => {
                let expr = expr.evaluate(ctx);
                match op {
                    UnaryOp::Not => Self::not(expr),
                    UnaryOp::Neg => Self::neg(expr),
                    UnaryOp::LogicalNot => Self::logical_not(expr),
                }
            }
            Self::Binary { op, left, right } => {
                let left = left.evaluate(ctx);
                let right = right.evaluate(ctx);
                match op {
                    BinaryOp::Add => Self::add(left, right),
                    BinaryOp::Sub => Self::sub(left, right),
                    BinaryOp::Mul => Self::mul(left, right),
                    BinaryOp::And => Self::and(left, right),
                    BinaryOp::Or => Self::or(left, right),
                    BinaryOp::Xor => Self::xor(left, right),
                    BinaryOp::Shl => Self::shl(left, right),
                    BinaryOp::Shr => Self::shr(left, right),
                    BinaryOp::Eq => Self::eq(left, right),
                    BinaryOp::Ne => Self::ne(left, right),
                    BinaryOp::Ltu => Self::ltu(left, right),
                    BinaryOp::Lt => Self::lt(left, right),
                    BinaryOp::LogicalAnd => Self::logical_and(left, right),
                }
            }
        }
    }

    /// Fold constants without any register knowledge.
    #[must_use]
    pub fn simplify(&self) -> Self {
        self.evaluate(&Context::default())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Imm(v) => write!(f, "{v:#x}"),
            Self::Reg(r) => write!(f, "r{r}"),
            Self::Mem { addr, width } => write!(f, "mem{}[{addr}]", u32::from(*width) * 8),
            Self::Unary { op, expr } => write!(f, "{}{expr}", op.symbol()),
            Self::Binary { op, left, right } => write!(f, "({left} {} {right})", op.symbol()),
        }
    }
}

#[cfg(test)]
mod tests;
