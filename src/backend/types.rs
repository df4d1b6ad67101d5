// Value types of the expression graph
//
// Every expression node carries one of these as its declared type. Scalars come
// in four kinds at five widths; strings and aggregates are the non-numeric types.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Width {
    W8,
    W16,
    W32,
    W64,
    W128,
}

impl Width {
    pub fn bits(self) -> u32 {
        match self {
            Width::W8 => 8,
            Width::W16 => 16,
            Width::W32 => 32,
            Width::W64 => 64,
            Width::W128 => 128,
        }
    }

    /// Number of 32-bit words needed to hold a value of this width
    pub fn words(self) -> usize {
        match self {
            Width::W8 | Width::W16 | Width::W32 => 1,
            Width::W64 => 2,
            Width::W128 => 4,
        }
    }

    /// Mask selecting the low `bits()` bits
    pub fn mask(self) -> u128 {
        match self {
            Width::W128 => u128::MAX,
            w => (1u128 << w.bits()) - 1,
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Width::W8 => 0,
            Width::W16 => 1,
            Width::W32 => 2,
            Width::W64 => 3,
            Width::W128 => 4,
        }
    }

    pub fn from_code(code: u32) -> Option<Width> {
        match code {
            0 => Some(Width::W8),
            1 => Some(Width::W16),
            2 => Some(Width::W32),
            3 => Some(Width::W64),
            4 => Some(Width::W128),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarKind {
    Fixed,
    Float,
    Int,
    Uns,
}

impl ScalarKind {
    /// INT and UNS share a domain: bytecode arithmetic is sign-agnostic
    pub fn is_integral(self) -> bool {
        matches!(self, ScalarKind::Int | ScalarKind::Uns)
    }

    pub fn compatible_with(self, other: ScalarKind) -> bool {
        self == other || (self.is_integral() && other.is_integral())
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ScalarKind::Fixed => write!(f, "fixed"),
            ScalarKind::Float => write!(f, "float"),
            ScalarKind::Int => write!(f, "int"),
            ScalarKind::Uns => write!(f, "uns"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Scalar(ScalarKind, Width),
    Str,
    Aggregate,
}

impl Type {
    pub const INT32: Type = Type::Scalar(ScalarKind::Int, Width::W32);
    pub const UNS32: Type = Type::Scalar(ScalarKind::Uns, Width::W32);
    pub const FIXED32: Type = Type::Scalar(ScalarKind::Fixed, Width::W32);
    pub const FLOAT32: Type = Type::Scalar(ScalarKind::Float, Width::W32);

    pub fn scalar(self) -> Option<(ScalarKind, Width)> {
        match self {
            Type::Scalar(kind, width) => Some((kind, width)),
            _ => None,
        }
    }

    pub fn kind(self) -> Option<ScalarKind> {
        self.scalar().map(|(kind, _)| kind)
    }

    /// Word count for scalar types; aggregates depend on their members
    pub fn scalar_words(self) -> Option<usize> {
        self.scalar().map(|(_, width)| width.words())
    }

    /// Compact numeric code used by the token stream
    pub fn code(self) -> u32 {
        match self {
            Type::Scalar(kind, width) => {
                let k = match kind {
                    ScalarKind::Fixed => 0,
                    ScalarKind::Float => 1,
                    ScalarKind::Int => 2,
                    ScalarKind::Uns => 3,
                };
                (k << 4) | width.code()
            }
            Type::Str => 0x100,
            Type::Aggregate => 0x200,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Type::Scalar(kind, width) => write!(f, "{}{}", kind, width.bits()),
            Type::Str => write!(f, "str"),
            Type::Aggregate => write!(f, "aggregate"),
        }
    }
}
