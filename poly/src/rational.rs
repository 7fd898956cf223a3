//! Exact rational arithmetic for polynomial coefficients.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub};

/// Greatest common divisor, always non-negative.
pub fn gcd(a: i128, b: i128) -> i128 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

pub fn lcm(a: i128, b: i128) -> i128 {
    if a == 0 || b == 0 {
        return 0;
    }
    (a / gcd(a, b) * b).abs()
}

/// Floor division rounding toward negative infinity.
pub fn div_floor(a: i128, b: i128) -> i128 {
    let q = a / b;
    if (a % b != 0) && ((a < 0) != (b < 0)) { q - 1 } else { q }
}

/// A normalized fraction: positive denominator, coprime parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rational {
    num: i128,
    den: i128,
}

impl Rational {
    pub const ZERO: Self = Self { num: 0, den: 1 };
    pub const ONE: Self = Self { num: 1, den: 1 };

    pub fn new(num: i128, den: i128) -> Self {
        debug_assert!(den != 0, "rational with zero denominator");
        let sign = if den < 0 { -1 } else { 1 };
        let g = gcd(num, den).max(1);
        Self { num: sign * num / g, den: sign * den / g }
    }

    pub const fn int(value: i128) -> Self {
        Self { num: value, den: 1 }
    }

    pub const fn num(&self) -> i128 {
        self.num
    }

    pub const fn den(&self) -> i128 {
        self.den
    }

    pub const fn is_zero(&self) -> bool {
        self.num == 0
    }

    pub const fn is_integer(&self) -> bool {
        self.den == 1
    }

    pub const fn is_negative(&self) -> bool {
        self.num < 0
    }

    pub fn to_integer(&self) -> Option<i128> {
        self.is_integer().then_some(self.num)
    }

    pub fn floor(&self) -> i128 {
        div_floor(self.num, self.den)
    }

    pub fn ceil(&self) -> i128 {
        -div_floor(-self.num, self.den)
    }

    pub fn abs(&self) -> Self {
        Self { num: self.num.abs(), den: self.den }
    }

    pub fn recip(&self) -> Self {
        Self::new(self.den, self.num)
    }

    pub fn pow(&self, exp: u32) -> Self {
        Self { num: self.num.pow(exp), den: self.den.pow(exp) }
    }

    // Evaluation at caller-supplied parameters goes through the checked forms;
    // the operators are for symbolic coefficients.

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        if self.den == rhs.den {
            return Some(Self::new(self.num.checked_add(rhs.num)?, self.den));
        }
        let num = self.num.checked_mul(rhs.den)?.checked_add(rhs.num.checked_mul(self.den)?)?;
        Some(Self::new(num, self.den.checked_mul(rhs.den)?))
    }

    pub fn checked_mul(self, rhs: Self) -> Option<Self> {
        // cross-reduce first so integral products stay small
        let g1 = gcd(self.num, rhs.den).max(1);
        let g2 = gcd(rhs.num, self.den).max(1);
        let num = (self.num / g1).checked_mul(rhs.num / g2)?;
        let den = (self.den / g2).checked_mul(rhs.den / g1)?;
        Some(Self::new(num, den))
    }

    pub fn checked_pow(self, exp: u32) -> Option<Self> {
        Some(Self { num: self.num.checked_pow(exp)?, den: self.den.checked_pow(exp)? })
    }
}

impl Default for Rational {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<i64> for Rational {
    fn from(value: i64) -> Self {
        Self::int(value as i128)
    }
}

impl From<i128> for Rational {
    fn from(value: i128) -> Self {
        Self::int(value)
    }
}

impl Ord for Rational {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.num * other.den).cmp(&(other.num * self.den))
    }
}

impl PartialOrd for Rational {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Add for Rational {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        if self.den == rhs.den {
            return Self::new(self.num + rhs.num, self.den);
        }
        Self::new(self.num * rhs.den + rhs.num * self.den, self.den * rhs.den)
    }
}

impl AddAssign for Rational {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Rational {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        self + (-rhs)
    }
}

impl Neg for Rational {
    type Output = Self;
    fn neg(self) -> Self {
        Self { num: -self.num, den: self.den }
    }
}

impl Mul for Rational {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(self.num * rhs.num, self.den * rhs.den)
    }
}

impl Div for Rational {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        Self::new(self.num * rhs.den, self.den * rhs.num)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 { write!(f, "{}", self.num) } else { write!(f, "{}/{}", self.num, self.den) }
    }
}
