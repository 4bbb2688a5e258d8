//! Fixed-point scalar with eight decimal places.

use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

const DECIMALS: i64 = 100_000_000;

/// Signed fixed-point value with 10⁻⁸ precision.
///
/// Fees, balances and interop prices are all denominated in this unit.
/// The inner value is the raw amount of 10⁻⁸ units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fixed8(pub i64);

impl Fixed8 {
    pub const fn zero() -> Fixed8 {
        Fixed8(0)
    }

    /// Converts a whole-unit amount into its fixed-point representation.
    pub const fn from_int64(value: i64) -> Fixed8 {
        Fixed8(value * DECIMALS)
    }

    /// Returns the raw amount of 10⁻⁸ units.
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Multiplies the raw value by an integer factor.
    pub const fn mul_int(self, factor: i64) -> Fixed8 {
        Fixed8(self.0 * factor)
    }
}

impl Add for Fixed8 {
    type Output = Fixed8;
    fn add(self, rhs: Fixed8) -> Fixed8 {
        Fixed8(self.0 + rhs.0)
    }
}

impl AddAssign for Fixed8 {
    fn add_assign(&mut self, rhs: Fixed8) {
        self.0 += rhs.0;
    }
}

impl Sum for Fixed8 {
    fn sum<I: Iterator<Item = Fixed8>>(iter: I) -> Fixed8 {
        iter.fold(Fixed8::zero(), Add::add)
    }
}

impl fmt::Display for Fixed8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(
            f,
            "{}{}.{:08}",
            sign,
            abs / DECIMALS as u64,
            abs % DECIMALS as u64
        )
    }
}

impl Encode for Fixed8 {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.0.encode(out);
    }
}

impl Decode for Fixed8 {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        Ok(Fixed8(i64::decode(input)?))
    }
}
