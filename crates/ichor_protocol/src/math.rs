//! Fixed-point and binary-angle math shared by the wire format and the
//! simulation.
//!
//! Positions, momenta, and heights are 16.16 fixed point. Angles are binary
//! angle measurement: the full `u32` range is one turn, so wrapping
//! arithmetic is the correct arithmetic.

use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

use crate::{Decode, Encode};

/// Fractional bits in a [`Fixed`].
pub const FRACBITS: u32 = 16;

/// One map unit.
pub const FRACUNIT: i32 = 1 << FRACBITS;

/// A 16.16 fixed-point number.
#[derive(
    Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Fixed(pub i32);

impl Fixed {
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(FRACUNIT);
    pub const MAX: Self = Self(i32::MAX);
    pub const MIN: Self = Self(i32::MIN);

    pub const fn from_int(n: i32) -> Self {
        Self(n << FRACBITS)
    }

    /// Truncates toward negative infinity, like the arithmetic shift the
    /// original engines use.
    pub const fn to_int(self) -> i32 {
        self.0 >> FRACBITS
    }

    pub fn from_float(f: f64) -> Self {
        Self((f * FRACUNIT as f64) as i32)
    }

    pub fn to_float(self) -> f64 {
        f64::from(self.0) / f64::from(FRACUNIT)
    }

    pub const fn abs(self) -> Self {
        Self(self.0.abs())
    }

    /// Fixed-point multiply with an intermediate 64-bit product.
    pub const fn fixed_mul(self, rhs: Self) -> Self {
        Self(((self.0 as i64 * rhs.0 as i64) >> FRACBITS) as i32)
    }

    /// Fixed-point divide. Saturates on overflow and division by values
    /// smaller than one unit, as the original `FixedDiv` does.
    pub fn fixed_div(self, rhs: Self) -> Self {
        if (self.0.abs() >> 14) >= rhs.0.abs() {
            if (self.0 ^ rhs.0) < 0 {
                Self::MIN
            } else {
                Self::MAX
            }
        } else {
            Self((((self.0 as i64) << FRACBITS) / rhs.0 as i64) as i32)
        }
    }
}

impl Add for Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.wrapping_add(rhs.0))
    }
}

impl AddAssign for Fixed {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0.wrapping_sub(rhs.0))
    }
}

impl SubAssign for Fixed {
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl Neg for Fixed {
    type Output = Self;

    fn neg(self) -> Self {
        Self(self.0.wrapping_neg())
    }
}

impl Mul for Fixed {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        self.fixed_mul(rhs)
    }
}

impl Div for Fixed {
    type Output = Self;

    fn div(self, rhs: Self) -> Self {
        self.fixed_div(rhs)
    }
}

impl Mul<i32> for Fixed {
    type Output = Self;

    fn mul(self, rhs: i32) -> Self {
        Self(self.0.wrapping_mul(rhs))
    }
}

impl fmt::Debug for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.to_float())
    }
}

impl Encode for Fixed {
    fn encode(&self, w: impl std::io::Write) -> anyhow::Result<()> {
        self.0.encode(w)
    }
}

impl Decode<'_> for Fixed {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        i32::decode(r).map(Self)
    }
}

/// A binary angle. `0x4000_0000` is a quarter turn counterclockwise.
#[derive(
    Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Angle(pub u32);

impl Angle {
    pub const ZERO: Self = Self(0);
    pub const EAST: Self = Self(0);
    pub const NORTH: Self = Self(0x4000_0000);
    pub const WEST: Self = Self(0x8000_0000);
    pub const SOUTH: Self = Self(0xC000_0000);

    pub fn from_degrees(deg: f64) -> Self {
        Self((deg.rem_euclid(360.0) / 360.0 * 2f64.powi(32)) as u32)
    }

    pub fn to_radians(self) -> f64 {
        f64::from(self.0) / 2f64.powi(32) * std::f64::consts::TAU
    }

    /// Unit direction as fixed-point (cosine, sine).
    pub fn direction(self) -> (Fixed, Fixed) {
        let rad = self.to_radians();
        (Fixed::from_float(rad.cos()), Fixed::from_float(rad.sin()))
    }
}

impl Add for Angle {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0.wrapping_add(rhs.0))
    }
}

impl Sub for Angle {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self(self.0.wrapping_sub(rhs.0))
    }
}

impl Neg for Angle {
    type Output = Self;

    fn neg(self) -> Self {
        Self(self.0.wrapping_neg())
    }
}

impl fmt::Debug for Angle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}deg", f64::from(self.0) / 2f64.powi(32) * 360.0)
    }
}

impl Encode for Angle {
    fn encode(&self, w: impl std::io::Write) -> anyhow::Result<()> {
        self.0.encode(w)
    }
}

impl Decode<'_> for Angle {
    fn decode(r: &mut &[u8]) -> anyhow::Result<Self> {
        u32::decode(r).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_int_round_trip() {
        assert_eq!(Fixed::from_int(64).to_int(), 64);
        assert_eq!(Fixed::from_int(-64).to_int(), -64);
        assert_eq!(Fixed::from_int(3).0, 3 * FRACUNIT);
    }

    #[test]
    fn fixed_mul_div() {
        let a = Fixed::from_int(6);
        let b = Fixed::from_int(7);
        assert_eq!(a * b, Fixed::from_int(42));
        assert_eq!(Fixed::from_int(42) / b, a);

        // Division overflow saturates.
        assert_eq!(Fixed::MAX / Fixed(1), Fixed::MAX);
        assert_eq!(Fixed::MAX / Fixed(-1), Fixed::MIN);
    }

    #[test]
    fn angle_wraps() {
        assert_eq!(Angle::SOUTH + Angle::NORTH, Angle::ZERO);
        assert_eq!(Angle::ZERO - Angle::NORTH, Angle::SOUTH);
    }

    #[test]
    fn angle_directions() {
        let (x, y) = Angle::EAST.direction();
        assert_eq!(x, Fixed::ONE);
        assert_eq!(y, Fixed::ZERO);

        let (x, y) = Angle::NORTH.direction();
        assert!(x.abs().0 < 8);
        assert_eq!(y, Fixed::ONE);
    }
}
