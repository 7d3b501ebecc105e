//! In-memory program: instructions, IL statements and read-only data.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use bincpa_ir::{Label, LabeledStmt};

/// Disassembled machine instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    pub address: u64,
    pub size: u8,
    pub mnemonic: String,
}

impl Instruction {
    /// Address of the next instruction in memory, if it is addressable.
    #[must_use]
    pub fn fall_through(&self) -> Option<u64> {
        self.address.checked_add(u64::from(self.size))
    }
}

/// Read-only memory segment used to resolve loads of constants.
#[derive(Clone, Debug)]
pub struct RoSegment {
    /// Start address.
    pub start: u64,
    /// Segment data.
    pub data: Vec<u8>,
}

impl RoSegment {
    #[must_use]
    pub const fn new(start: u64, data: Vec<u8>) -> Self {
        Self { start, data }
    }

    /// End address (exclusive). Saturates for a segment reaching the top of
    /// the address space.
    #[must_use]
    pub fn end(&self) -> u64 {
        u64::try_from(self.data.len()).map_or(u64::MAX, |len| self.start.saturating_add(len))
    }

    /// Check if address is within this segment.
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        addr.checked_sub(self.start)
            .and_then(|offset| usize::try_from(offset).ok())
            .is_some_and(|offset| offset < self.data.len())
    }

    /// Read a value from this segment (little-endian, up to 8 bytes).
    #[must_use]
    pub fn read(&self, addr: u64, size: usize) -> Option<u64> {
        if size == 0 || size > 8 || !self.contains(addr) {
            return None;
        }
        let offset = usize::try_from(addr - self.start).ok()?;
        let bytes = self.data.get(offset..offset.checked_add(size)?)?;
        Some(
            bytes
                .iter()
                .enumerate()
                .fold(0u64, |acc, (i, &b)| acc | (u64::from(b) << (i * 8))),
        )
    }
}

/// Synthetic entry routine: `call entry; halt`.
///
/// The harness call has no instruction-level fall-through of its own, so the
/// harness supplies it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Harness {
    /// Address of the harness call instruction.
    pub call_address: u64,
    /// Address of the terminating halt.
    pub halt_address: u64,
}

impl Harness {
    /// Check if `address` belongs to the harness.
    #[must_use]
    pub const fn contains(&self, address: u64) -> bool {
        address == self.call_address || address == self.halt_address
    }

    /// Fall-through address of a harness instruction, if it has one.
    #[must_use]
    pub const fn fall_through(&self, address: u64) -> Option<u64> {
        if address == self.call_address {
            Some(self.halt_address)
        } else {
            None
        }
    }
}

/// Program under analysis.
///
/// Built once by a front end (or [`crate::ProgramBuilder`]) and shared
/// read-only with the analysis.
#[derive(Clone, Debug)]
pub struct Program {
    pub(crate) entry: Label,
    pub(crate) statements: BTreeMap<Label, LabeledStmt>,
    pub(crate) instructions: BTreeMap<u64, Instruction>,
    pub(crate) ro_segments: Vec<RoSegment>,
    pub(crate) symbols: FxHashMap<u64, String>,
    pub(crate) harness: Option<Harness>,
}

impl Program {
    /// Label where analysis starts: the harness if installed, else the entry point.
    #[must_use]
    pub fn start_label(&self) -> Label {
        self.harness
            .map_or(self.entry, |h| Label::at(h.call_address))
    }

    /// Program entry point.
    #[must_use]
    pub const fn entry(&self) -> Label {
        self.entry
    }

    /// IL statement at `label`.
    #[must_use]
    pub fn statement(&self, label: Label) -> Option<&LabeledStmt> {
        self.statements.get(&label)
    }

    /// All statements in label order.
    pub fn statements(&self) -> impl Iterator<Item = &LabeledStmt> + '_ {
        self.statements.values()
    }

    /// Machine instruction at `address`.
    #[must_use]
    pub fn instruction(&self, address: u64) -> Option<&Instruction> {
        self.instructions.get(&address)
    }

    /// All known code addresses in ascending order.
    pub fn code_addresses(&self) -> impl Iterator<Item = u64> + '_ {
        self.instructions.keys().copied()
    }

    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    /// Check if `address` is the start of a known instruction.
    #[must_use]
    pub fn is_code_address(&self, address: u64) -> bool {
        self.instructions.contains_key(&address)
    }

    #[must_use]
    pub const fn harness(&self) -> Option<&Harness> {
        self.harness.as_ref()
    }

    /// Check if `address` belongs to the entry harness.
    #[must_use]
    pub fn is_harness(&self, address: u64) -> bool {
        self.harness.is_some_and(|h| h.contains(address))
    }

    /// Symbol name for `address`.
    #[must_use]
    pub fn symbol(&self, address: u64) -> Option<&str> {
        self.symbols.get(&address).map(String::as_str)
    }

    /// Read value from read-only segment at address.
    #[must_use]
    pub fn read_readonly(&self, addr: u64, width: usize) -> Option<u64> {
        self.ro_segments
            .iter()
            .find(|seg| seg.contains(addr))
            .and_then(|seg| seg.read(addr, width))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ro_segment_read() {
        let seg = RoSegment::new(0x3000, vec![0x10, 0x20, 0x00, 0x00, 0xff]);
        assert_eq!(seg.read(0x3000, 4), Some(0x2010));
        assert_eq!(seg.read(0x3004, 1), Some(0xff));
        assert_eq!(seg.read(0x3004, 2), None);
        assert_eq!(seg.read(0x2fff, 1), None);
        assert_eq!(seg.end(), 0x3005);
    }

    #[test]
    fn test_top_of_address_space() {
        let seg = RoSegment::new(u64::MAX - 1, vec![0xaa, 0xbb]);
        assert_eq!(seg.end(), u64::MAX);
        assert!(seg.contains(u64::MAX));
        assert_eq!(seg.read(u64::MAX, 1), Some(0xbb));
        assert_eq!(seg.read(u64::MAX - 1, 2), Some(0xbbaa));
        assert_eq!(seg.read(u64::MAX, 2), None);

        let last = Instruction {
            address: u64::MAX - 1,
            size: 4,
            mnemonic: "hlt".to_string(),
        };
        assert_eq!(last.fall_through(), None);
        let inner = Instruction {
            address: 0x1000,
            size: 4,
            mnemonic: "nop".to_string(),
        };
        assert_eq!(inner.fall_through(), Some(0x1004));
    }

    #[test]
    fn test_harness_fall_through() {
        let harness = Harness {
            call_address: 0x100,
            halt_address: 0x105,
        };
        assert!(harness.contains(0x105));
        assert_eq!(harness.fall_through(0x100), Some(0x105));
        assert_eq!(harness.fall_through(0x105), None);
    }
}
