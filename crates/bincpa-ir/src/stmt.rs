//! Statement IR.

use std::fmt;

use crate::expr::Expr;
use crate::label::Label;

/// Control transfer flavor of a goto.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GotoKind {
    Jump,
    Call,
    Return,
}

/// Conditional transfer to a (possibly computed) target address.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Goto {
    pub kind: GotoKind,
    pub condition: Expr,
    pub target: Expr,
}

impl Goto {
    /// Unconditional jump.
    #[must_use]
    pub const fn jump(target: Expr) -> Self {
        Self {
            kind: GotoKind::Jump,
            condition: Expr::TRUE,
            target,
        }
    }

    /// Conditional jump.
    #[must_use]
    pub const fn branch(condition: Expr, target: Expr) -> Self {
        Self {
            kind: GotoKind::Jump,
            condition,
            target,
        }
    }

    /// Unconditional call.
    #[must_use]
    pub const fn call(target: Expr) -> Self {
        Self {
            kind: GotoKind::Call,
            condition: Expr::TRUE,
            target,
        }
    }

    /// Unconditional return through a computed address.
    #[must_use]
    pub const fn ret(target: Expr) -> Self {
        Self {
            kind: GotoKind::Return,
            condition: Expr::TRUE,
            target,
        }
    }

    /// Whether the target is a constant.
    #[must_use]
    pub const fn is_direct(&self) -> bool {
        self.target.const_value().is_some()
    }
}

/// Origin of an assumption that was split off a goto.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Branch {
    pub kind: GotoKind,
    /// Static fall-through of the originating goto.
    pub fall_through: Option<Label>,
}

/// Statement kinds.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Stmt {
    /// Register assignment.
    Assign { reg: u8, value: Expr },
    /// Register receives an unknown value.
    Havoc { reg: u8 },
    /// Memory write.
    Store { addr: Expr, value: Expr, width: u8 },
    /// Restrict execution to states satisfying the assumption.
    Assume {
        assumption: Expr,
        branch: Option<Branch>,
    },
    /// Control transfer, resolved into assumptions during analysis.
    Goto(Goto),
    /// Summary edge from a call site to its fall-through.
    CallReturn,
    /// No operation.
    Skip,
    /// Stop execution.
    Halt,
}

impl Stmt {
    #[must_use]
    pub const fn assign(reg: u8, value: Expr) -> Self {
        Self::Assign { reg, value }
    }

    #[must_use]
    pub const fn havoc(reg: u8) -> Self {
        Self::Havoc { reg }
    }

    #[must_use]
    pub const fn store(addr: Expr, value: Expr, width: u8) -> Self {
        Self::Store { addr, value, width }
    }

    /// Plain assumption without branch provenance.
    #[must_use]
    pub const fn assume(assumption: Expr) -> Self {
        Self::Assume {
            assumption,
            branch: None,
        }
    }

    /// Check if this statement transfers control.
    #[must_use]
    pub const fn is_goto(&self) -> bool {
        matches!(self, Self::Goto(_))
    }

    /// Branch provenance of an assumption, if any.
    #[must_use]
    pub const fn branch(&self) -> Option<&Branch> {
        match self {
            Self::Assume {
                branch: Some(branch),
                ..
            } => Some(branch),
            _ => None,
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Assign { reg, value } => write!(f, "r{reg} := {value}"),
            Self::Havoc { reg } => write!(f, "r{reg} := nondet"),
            Self::Store { addr, value, width } => {
                write!(f, "mem{}[{addr}] := {value}", u32::from(*width) * 8)
            }
            Self::Assume { assumption, .. } => write!(f, "assume {assumption}"),
            Self::Goto(goto) => {
                let kind = match goto.kind {
                    GotoKind::Jump => "goto",
                    GotoKind::Call => "call",
                    GotoKind::Return => "return",
                };
                if goto.condition == Expr::TRUE {
                    write!(f, "{kind} {}", goto.target)
                } else {
                    write!(f, "if {} {kind} {}", goto.condition, goto.target)
                }
            }
            Self::CallReturn => f.write_str("call-return"),
            Self::Skip => f.write_str("skip"),
            Self::Halt => f.write_str("halt"),
        }
    }
}

/// A statement placed in the program.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LabeledStmt {
    pub label: Label,
    /// Static fall-through; `None` when control cannot fall through.
    pub next: Option<Label>,
    pub stmt: Stmt,
}

impl LabeledStmt {
    #[must_use]
    pub const fn new(label: Label, next: Option<Label>, stmt: Stmt) -> Self {
        Self { label, next, stmt }
    }
}

impl fmt::Display for LabeledStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label, self.stmt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_goto_constructors() {
        let jump = Goto::jump(Expr::imm(0x1000));
        assert_eq!(jump.kind, GotoKind::Jump);
        assert_eq!(jump.condition, Expr::TRUE);
        assert!(jump.is_direct());
        assert!(!Goto::ret(Expr::reg(1)).is_direct());
    }

    #[test]
    fn test_branch_provenance() {
        let stmt = Stmt::Assume {
            assumption: Expr::TRUE,
            branch: Some(Branch {
                kind: GotoKind::Call,
                fall_through: Some(Label::at(0x1004)),
            }),
        };
        assert_eq!(stmt.branch().map(|b| b.kind), Some(GotoKind::Call));
        assert!(Stmt::assume(Expr::TRUE).branch().is_none());
    }

    #[test]
    fn test_stmt_display() {
        let stmt = Stmt::Goto(Goto::branch(
            Expr::eq(Expr::reg(1), Expr::imm(0)),
            Expr::imm(0x2000),
        ));
        assert_eq!(stmt.to_string(), "if (r1 == 0x0) goto 0x2000");
        assert_eq!(Stmt::assign(3, Expr::imm(1)).to_string(), "r3 := 0x1");
    }
}
