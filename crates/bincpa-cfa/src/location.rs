//! Program points.

use std::fmt;

use bincpa_ir::Label;

/// A program point, compared and hashed by value.
///
/// `Vpc` locations split a label by the value of a virtual program counter,
/// which lets the analysis unroll interpreter loops path-sensitively.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Location {
    Label(Label),
    Vpc { label: Label, vpc: u64 },
}

impl Location {
    /// Program label of this location.
    #[must_use]
    pub const fn label(&self) -> Label {
        match self {
            Self::Label(label) | Self::Vpc { label, .. } => *label,
        }
    }

    /// Instruction address of this location.
    #[must_use]
    pub const fn address(&self) -> u64 {
        self.label().address()
    }

    /// Virtual program counter, if this location carries one.
    #[must_use]
    pub const fn vpc(&self) -> Option<u64> {
        match self {
            Self::Label(_) => None,
            Self::Vpc { vpc, .. } => Some(*vpc),
        }
    }
}

impl From<Label> for Location {
    fn from(label: Label) -> Self {
        Self::Label(label)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Label(label) => write!(f, "{label}"),
            Self::Vpc { label, vpc } => write!(f, "{label}@{vpc:#x}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_value_equality() {
        let a = Location::from(Label::at(0x1000));
        let b = Location::Label(Label::new(0x1000, 0));
        assert_eq!(a, b);
        assert_ne!(
            a,
            Location::Vpc {
                label: Label::at(0x1000),
                vpc: 0
            }
        );
    }

    #[test]
    fn test_vpc_projection() {
        let loc = Location::Vpc {
            label: Label::new(0x2000, 1),
            vpc: 0x40,
        };
        assert_eq!(loc.label(), Label::new(0x2000, 1));
        assert_eq!(loc.vpc(), Some(0x40));
        assert_eq!(loc.to_string(), "0x2000:1@0x40");
    }
}
