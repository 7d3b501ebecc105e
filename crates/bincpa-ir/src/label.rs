//! Program labels.

use std::fmt;

/// Address of a single IL statement: the machine instruction address plus
/// the statement's position within that instruction's translation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label {
    address: u64,
    index: u16,
}

impl Label {
    /// Create a label for the `index`-th statement of the instruction at `address`.
    #[must_use]
    pub const fn new(address: u64, index: u16) -> Self {
        Self { address, index }
    }

    /// Label of the first statement of the instruction at `address`.
    #[must_use]
    pub const fn at(address: u64) -> Self {
        Self::new(address, 0)
    }

    /// Instruction address.
    #[must_use]
    pub const fn address(&self) -> u64 {
        self.address
    }

    /// Statement index within the instruction.
    #[must_use]
    pub const fn index(&self) -> u16 {
        self.index
    }
}

impl From<u64> for Label {
    fn from(address: u64) -> Self {
        Self::at(address)
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}:{}", self.address, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_order() {
        assert!(Label::new(0x1000, 1) < Label::new(0x1004, 0));
        assert!(Label::new(0x1000, 0) < Label::new(0x1000, 1));
        assert_eq!(Label::from(0x1000), Label::at(0x1000));
    }

    #[test]
    fn test_label_display() {
        assert_eq!(Label::new(0x401000, 2).to_string(), "0x401000:2");
    }
}
