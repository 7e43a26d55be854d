//! Integer memory quantities with an explicit unit.
//!
//! QEMU accepts sizes like `4G` or `512M`; topology documents use the same
//! literals. [`MemSize`] keeps the magnitude and unit together so that
//! arithmetic between mismatched units is an error instead of a silently
//! wrong number.

use std::fmt;
use std::str::FromStr;

use crate::error::{CompileError, Result};

/// Unit of a [`MemSize`] quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeUnit {
    /// Gibibytes, suffix `G`.
    Gibi,
    /// Mebibytes, suffix `M`.
    Mebi,
}

impl SizeUnit {
    const fn suffix(self) -> char {
        match self {
            Self::Gibi => 'G',
            Self::Mebi => 'M',
        }
    }
}

/// An integer number of gibibytes or mebibytes.
///
/// The magnitude is signed so that subtraction can express "nothing left"
/// (the option assembler checks for a non-positive remainder), but parsing
/// only accepts non-negative literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemSize {
    amount: i64,
    unit: SizeUnit,
}

impl MemSize {
    /// Zero gibibytes, the default for `mem` and `nvmem`.
    pub const ZERO_G: Self = Self { amount: 0, unit: SizeUnit::Gibi };

    /// A quantity of whole gibibytes.
    #[must_use]
    pub const fn gibibytes(amount: i64) -> Self {
        Self { amount, unit: SizeUnit::Gibi }
    }

    /// A quantity of whole mebibytes.
    #[must_use]
    pub const fn mebibytes(amount: i64) -> Self {
        Self { amount, unit: SizeUnit::Mebi }
    }

    #[must_use]
    pub const fn amount(self) -> i64 {
        self.amount
    }

    #[must_use]
    pub const fn unit(self) -> SizeUnit {
        self.unit
    }

    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.amount == 0
    }

    /// The magnitude expressed in mebibytes.
    #[must_use]
    pub const fn as_mebibytes(self) -> i64 {
        match self.unit {
            SizeUnit::Gibi => self.amount * 1024,
            SizeUnit::Mebi => self.amount,
        }
    }

    /// Sum of two quantities of the same unit.
    pub fn checked_add(self, other: Self) -> Result<Self> {
        if self.unit != other.unit {
            return Err(CompileError::SizeFormat(format!(
                "unit mismatch adding {self} and {other}"
            )));
        }
        Ok(Self { amount: self.amount + other.amount, unit: self.unit })
    }

    /// Difference of two quantities of the same unit.
    pub fn checked_sub(self, other: Self) -> Result<Self> {
        if self.unit != other.unit {
            return Err(CompileError::SizeFormat(format!(
                "unit mismatch subtracting {other} from {self}"
            )));
        }
        Ok(Self { amount: self.amount - other.amount, unit: self.unit })
    }
}

impl fmt::Display for MemSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.unit.suffix())
    }
}

impl FromStr for MemSize {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self> {
        // Bare "0" is the documented default for mem/nvmem.
        if s == "0" {
            return Ok(Self::ZERO_G);
        }
        let unit = match s.as_bytes().last() {
            Some(b'g' | b'G') => SizeUnit::Gibi,
            Some(b'm' | b'M') => SizeUnit::Mebi,
            _ => return Err(bad_size(s)),
        };
        let magnitude = &s[..s.len() - 1];
        let amount = magnitude
            .parse::<i64>()
            .ok()
            .filter(|a| *a >= 0)
            .ok_or_else(|| bad_size(s))?;
        Ok(Self { amount, unit })
    }
}

fn bad_size(s: &str) -> CompileError {
    CompileError::SizeFormat(format!(
        "unsupported size {s:?}, expected an integer with a unit suffix like \"2G\" or \"512M\""
    ))
}
