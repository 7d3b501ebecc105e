//! Program builder fluent API.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use tracing::warn;

use bincpa_ir::{Expr, Goto, Label, LabeledStmt, Stmt};

use crate::program::{Harness, Instruction, Program, RoSegment};

/// Size of each synthetic harness instruction.
const HARNESS_INSTR_SIZE: u8 = 5;

/// Builder for [`Program`]s.
///
/// Each call to [`ProgramBuilder::instruction`] adds one machine instruction
/// together with its IL translation. Statements are labeled
/// `address:0`, `address:1`, ... and chained by their fall-through labels;
/// the last one falls through to the next instruction in memory.
pub struct ProgramBuilder {
    entry: u64,
    statements: BTreeMap<Label, LabeledStmt>,
    instructions: BTreeMap<u64, Instruction>,
    ro_segments: Vec<RoSegment>,
    symbols: FxHashMap<u64, String>,
    harness: Option<Harness>,
}

impl ProgramBuilder {
    /// Create a new builder for a program entered at `entry`.
    #[must_use]
    pub fn new(entry: u64) -> Self {
        Self {
            entry,
            statements: BTreeMap::new(),
            instructions: BTreeMap::new(),
            ro_segments: Vec::new(),
            symbols: FxHashMap::default(),
            harness: None,
        }
    }

    /// Add a machine instruction and its IL statements.
    #[must_use]
    pub fn instruction(mut self, address: u64, size: u8, mnemonic: &str, stmts: Vec<Stmt>) -> Self {
        let stmts = if stmts.is_empty() {
            vec![Stmt::Skip]
        } else {
            stmts
        };
        let fall_through = address.checked_add(u64::from(size)).map(Label::at);
        let count = stmts.len();
        for (index, stmt) in (0u16..).zip(stmts) {
            let label = Label::new(address, index);
            let next = if matches!(stmt, Stmt::Halt) {
                None
            } else if usize::from(index) + 1 < count {
                Some(Label::new(address, index + 1))
            } else {
                fall_through
            };
            self.statements
                .insert(label, LabeledStmt::new(label, next, stmt));
        }
        let previous = self.instructions.insert(
            address,
            Instruction {
                address,
                size,
                mnemonic: mnemonic.to_string(),
            },
        );
        if previous.is_some() {
            warn!("instruction at {address:#x} replaced");
        }
        self
    }

    /// Add a read-only data segment.
    #[must_use]
    pub fn ro_segment(mut self, start: u64, data: Vec<u8>) -> Self {
        self.ro_segments.push(RoSegment::new(start, data));
        self
    }

    /// Name an address.
    #[must_use]
    pub fn symbol(mut self, address: u64, name: &str) -> Self {
        self.symbols.insert(address, name.to_string());
        self
    }

    /// Install the `call entry; halt` harness at `address`.
    ///
    /// Analysis then starts at the harness rather than at the entry point.
    #[must_use]
    pub fn harness(mut self, address: u64) -> Self {
        let halt_address = address.saturating_add(u64::from(HARNESS_INSTR_SIZE));
        let call = Label::at(address);
        self.statements.insert(
            call,
            LabeledStmt::new(call, None, Stmt::Goto(Goto::call(Expr::imm(self.entry)))),
        );
        self = self.instruction(halt_address, HARNESS_INSTR_SIZE, "halt", vec![Stmt::Halt]);
        self.instructions.insert(
            address,
            Instruction {
                address,
                size: HARNESS_INSTR_SIZE,
                mnemonic: "call".to_string(),
            },
        );
        self.harness = Some(Harness {
            call_address: address,
            halt_address,
        });
        self
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> Program {
        Program {
            entry: Label::at(self.entry),
            statements: self.statements,
            instructions: self.instructions,
            ro_segments: self.ro_segments,
            symbols: self.symbols,
            harness: self.harness,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statements_are_chained() {
        let program = ProgramBuilder::new(0x1000)
            .instruction(
                0x1000,
                4,
                "addi",
                vec![Stmt::assign(1, Expr::imm(1)), Stmt::havoc(2)],
            )
            .instruction(0x1004, 4, "hlt", vec![Stmt::Halt])
            .build();

        let first = program.statement(Label::at(0x1000)).map(|s| s.next);
        assert_eq!(first, Some(Some(Label::new(0x1000, 1))));
        let second = program.statement(Label::new(0x1000, 1)).map(|s| s.next);
        assert_eq!(second, Some(Some(Label::at(0x1004))));
        let halt = program.statement(Label::at(0x1004)).map(|s| s.next);
        assert_eq!(halt, Some(None));
        assert_eq!(program.instruction_count(), 2);
        assert_eq!(program.start_label(), Label::at(0x1000));
    }

    #[test]
    fn test_last_instruction_has_no_fall_through() {
        let program = ProgramBuilder::new(u64::MAX - 1)
            .instruction(u64::MAX - 1, 2, "nop", Vec::new())
            .build();
        let next = program.statement(Label::at(u64::MAX - 1)).map(|s| s.next);
        assert_eq!(next, Some(None));
    }

    #[test]
    fn test_empty_instruction_is_skip() {
        let program = ProgramBuilder::new(0x10)
            .instruction(0x10, 2, "nop", Vec::new())
            .build();
        let stmt = program.statement(Label::at(0x10)).map(|s| s.stmt.clone());
        assert_eq!(stmt, Some(Stmt::Skip));
    }

    #[test]
    fn test_harness_installation() {
        let program = ProgramBuilder::new(0x1000)
            .instruction(0x1000, 1, "ret", vec![Stmt::Halt])
            .harness(0x100)
            .symbol(0x1000, "main")
            .build();

        assert_eq!(program.start_label(), Label::at(0x100));
        assert!(program.is_harness(0x100));
        assert!(program.is_harness(0x105));
        assert!(!program.is_harness(0x1000));
        assert_eq!(program.code_addresses().collect::<Vec<_>>(), vec![0x100, 0x105, 0x1000]);
        assert_eq!(program.symbol(0x1000), Some("main"));

        let call = program.statement(Label::at(0x100));
        assert!(call.is_some_and(|s| s.next.is_none() && s.stmt.is_goto()));
    }
}
