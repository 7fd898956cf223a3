//! Quasi-polynomials over named integer parameters.
//!
//! A [`QPoly`] is a polynomial with rational coefficients whose variables are
//! *atoms*: either a named parameter or `floor(p / d)` of another quasi-polynomial.
//! Floor atoms are how periodic behavior (strides, tile counts, rounding) shows up
//! in closed-form counts.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::hash::BuildHasher;
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

use itertools::Itertools;
use snafu::OptionExt;

use crate::error::{OverflowSnafu, Result, UnboundParameterSnafu};
use crate::rational::{Rational, div_floor, gcd, lcm};

// ============================================================================
// PARAMETER SOURCES
// ============================================================================

/// Anything that can supply integer values for named parameters.
pub trait ParamSource {
    fn value(&self, name: &str) -> Option<i64>;
}

impl<S: BuildHasher> ParamSource for HashMap<String, i64, S> {
    fn value(&self, name: &str) -> Option<i64> {
        self.get(name).copied()
    }
}

impl<S: BuildHasher> ParamSource for HashMap<&str, i64, S> {
    fn value(&self, name: &str) -> Option<i64> {
        self.get(name).copied()
    }
}

impl ParamSource for BTreeMap<String, i64> {
    fn value(&self, name: &str) -> Option<i64> {
        self.get(name).copied()
    }
}

impl ParamSource for [(&str, i64)] {
    fn value(&self, name: &str) -> Option<i64> {
        self.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
    }
}

impl<const N: usize> ParamSource for [(&str, i64); N] {
    fn value(&self, name: &str) -> Option<i64> {
        self.as_slice().value(name)
    }
}

impl<T: ParamSource + ?Sized> ParamSource for &T {
    fn value(&self, name: &str) -> Option<i64> {
        (**self).value(name)
    }
}

// ============================================================================
// ATOMS AND MONOMIALS
// ============================================================================

/// An integer-valued variable of a quasi-polynomial.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Atom {
    Param(String),
    /// `floor(numerator / divisor)`; the numerator has integer coefficients and
    /// `divisor >= 2`.
    Floor { numerator: Box<QPoly>, divisor: i128 },
}

impl Atom {
    fn eval(&self, params: &dyn ParamSource) -> Result<Rational> {
        match self {
            Atom::Param(name) => {
                let value = params.value(name).context(UnboundParameterSnafu { name: name.clone() })?;
                Ok(Rational::from(value))
            }
            Atom::Floor { numerator, divisor } => {
                let value = numerator.eval_dyn(params)?;
                let den = value.den().checked_mul(*divisor).context(OverflowSnafu { during: "evaluating a floor" })?;
                Ok(Rational::int(div_floor(value.num(), den)))
            }
        }
    }

    fn collect_params(&self, out: &mut BTreeSet<String>) {
        match self {
            Atom::Param(name) => {
                out.insert(name.clone());
            }
            Atom::Floor { numerator, .. } => numerator.collect_params(out),
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Param(name) => write!(f, "{name}"),
            Atom::Floor { numerator, divisor } => write!(f, "floor(({numerator})/{divisor})"),
        }
    }
}

/// Product of atoms with positive exponents. The empty monomial is `1`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Monomial(BTreeMap<Atom, u32>);

impl Monomial {
    pub fn atom(atom: Atom) -> Self {
        Self(BTreeMap::from([(atom, 1)]))
    }

    pub fn is_one(&self) -> bool {
        self.0.is_empty()
    }

    pub fn degree(&self) -> u32 {
        self.0.values().sum()
    }

    pub fn atoms(&self) -> impl Iterator<Item = (&Atom, u32)> {
        self.0.iter().map(|(a, e)| (a, *e))
    }

    pub fn has_floor(&self) -> bool {
        self.0.keys().any(|a| matches!(a, Atom::Floor { .. }))
    }

    fn mul(&self, other: &Self) -> Self {
        let mut out = self.0.clone();
        for (atom, exp) in &other.0 {
            *out.entry(atom.clone()).or_insert(0) += exp;
        }
        Self(out)
    }

    fn exponent_of(&self, name: &str) -> u32 {
        self.0.iter().find(|(a, _)| matches!(a, Atom::Param(n) if n == name)).map(|(_, e)| *e).unwrap_or(0)
    }

    fn without(&self, name: &str) -> Self {
        Self(self.0.iter().filter(|(a, _)| !matches!(a, Atom::Param(n) if n == name)).map(|(a, e)| (a.clone(), *e)).collect())
    }
}

impl fmt::Display for Monomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "1");
        }
        let parts = self.0.iter().map(|(atom, exp)| if *exp == 1 { atom.to_string() } else { format!("{atom}^{exp}") });
        write!(f, "{}", parts.format("*"))
    }
}

// ============================================================================
// QUASI-POLYNOMIAL
// ============================================================================

/// A polynomial with rational coefficients over [`Atom`]s.
///
/// Zero coefficients are never stored, so structural equality is mathematical
/// equality of the normal form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QPoly {
    terms: BTreeMap<Monomial, Rational>,
}

impl QPoly {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn one() -> Self {
        Self::constant(Rational::ONE)
    }

    pub fn constant(value: impl Into<Rational>) -> Self {
        let value = value.into();
        let mut terms = BTreeMap::new();
        if !value.is_zero() {
            terms.insert(Monomial::default(), value);
        }
        Self { terms }
    }

    pub fn param(name: impl Into<String>) -> Self {
        Self::from_atom(Atom::Param(name.into()))
    }

    pub fn from_atom(atom: Atom) -> Self {
        Self { terms: BTreeMap::from([(Monomial::atom(atom), Rational::ONE)]) }
    }

    pub fn from_terms(terms: impl IntoIterator<Item = (Monomial, Rational)>) -> Self {
        let mut out = Self::zero();
        for (mono, coeff) in terms {
            out.add_term(mono, coeff);
        }
        out
    }

    fn add_term(&mut self, mono: Monomial, coeff: Rational) {
        if coeff.is_zero() {
            return;
        }
        let entry = self.terms.entry(mono).or_insert(Rational::ZERO);
        *entry += coeff;
        if entry.is_zero() {
            self.terms.retain(|_, c| !c.is_zero());
        }
    }

    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> impl Iterator<Item = (&Monomial, &Rational)> {
        self.terms.iter()
    }

    /// The value if this polynomial has no variables.
    pub fn as_constant(&self) -> Option<Rational> {
        match self.terms.len() {
            0 => Some(Rational::ZERO),
            1 => self.terms.get(&Monomial::default()).copied(),
            _ => None,
        }
    }

    /// The constant term.
    pub fn constant_term(&self) -> Rational {
        self.terms.get(&Monomial::default()).copied().unwrap_or(Rational::ZERO)
    }

    pub fn is_constant(&self) -> bool {
        self.as_constant().is_some()
    }

    pub fn has_floor(&self) -> bool {
        self.terms.keys().any(Monomial::has_floor)
    }

    pub fn degree(&self) -> u32 {
        self.terms.keys().map(Monomial::degree).max().unwrap_or(0)
    }

    /// All parameter names, including those nested inside floor atoms.
    pub fn params(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_params(&mut out);
        out
    }

    fn collect_params(&self, out: &mut BTreeSet<String>) {
        for mono in self.terms.keys() {
            for (atom, _) in mono.atoms() {
                atom.collect_params(out);
            }
        }
    }

    pub fn mentions(&self, name: &str) -> bool {
        self.params().contains(name)
    }

    /// Whether `name` occurs inside a floor atom.
    pub fn mentions_in_floor(&self, name: &str) -> bool {
        self.terms.keys().any(|mono| {
            mono.atoms().any(|(atom, _)| matches!(atom, Atom::Floor { numerator, .. } if numerator.mentions(name)))
        })
    }

    /// Least `p` such that after `name := p*q + r`, for integer `q` and
    /// constant `r`, the floors no longer depend on `q`. `1` when `name` does
    /// not occur inside a floor. Saturates at `u32::MAX`.
    pub(crate) fn floor_period(&self, name: &str) -> i128 {
        let cap = i128::from(u32::MAX);
        self.terms.keys().flat_map(Monomial::atoms).fold(1, |acc, (atom, _)| match atom {
            Atom::Floor { numerator, divisor } if numerator.mentions(name) => {
                lcm(acc, divisor.saturating_mul(numerator.floor_period(name)).min(cap)).min(cap)
            }
            _ => acc,
        })
    }

    /// Coefficients `c_k` such that `self == sum_k c_k * name^k`.
    ///
    /// Returns `None` when `name` appears inside a floor atom.
    pub fn coefficients_in(&self, name: &str) -> Option<Vec<QPoly>> {
        if self.mentions_in_floor(name) {
            return None;
        }
        let mut coeffs: Vec<QPoly> = Vec::new();
        for (mono, coeff) in &self.terms {
            let exp = mono.exponent_of(name) as usize;
            if coeffs.len() <= exp {
                coeffs.resize(exp + 1, QPoly::zero());
            }
            coeffs[exp].add_term(mono.without(name), *coeff);
        }
        if coeffs.is_empty() {
            coeffs.push(QPoly::zero());
        }
        Some(coeffs)
    }

    /// `(a, rest)` with `self == a * name + rest` when `self` is affine in `name`.
    pub fn split_linear(&self, name: &str) -> Option<(QPoly, QPoly)> {
        let mut coeffs = self.coefficients_in(name)?;
        match coeffs.len() {
            1 => Some((QPoly::zero(), coeffs.remove(0))),
            2 => {
                let a = coeffs.pop()?;
                Some((a, coeffs.remove(0)))
            }
            _ => None,
        }
    }

    pub fn scale(&self, factor: Rational) -> Self {
        if factor.is_zero() {
            return Self::zero();
        }
        Self { terms: self.terms.iter().map(|(m, c)| (m.clone(), *c * factor)).collect() }
    }

    pub fn pow(&self, exp: u32) -> Self {
        (0..exp).fold(Self::one(), |acc, _| &acc * self)
    }

    /// Least common multiple of the coefficient denominators.
    pub fn denominator_lcm(&self) -> i128 {
        self.terms.values().fold(1, |acc, c| lcm(acc, c.den()))
    }

    /// `floor(self / k)` for positive `k`, simplified so that any integer multiple
    /// of `k` is pulled out of the floor.
    pub fn floor_div(&self, k: i128) -> Self {
        debug_assert!(k > 0, "floor_div by non-positive constant");
        let scale = self.denominator_lcm();
        let numerator = self.scale(Rational::int(scale));
        let divisor = k * scale;
        if divisor == 1 {
            return numerator;
        }

        let mut quotient = Self::zero();
        let mut remainder = Self::zero();
        for (mono, coeff) in &numerator.terms {
            let c = coeff.num();
            let q = div_floor(c, divisor);
            quotient.add_term(mono.clone(), Rational::int(q));
            remainder.add_term(mono.clone(), Rational::int(c - q * divisor));
        }
        if remainder.is_zero() {
            return quotient;
        }
        if let Some(constant) = remainder.as_constant() {
            // 0 <= remainder < divisor
            debug_assert!(constant.floor() < divisor);
            return quotient;
        }

        let g = remainder.terms.values().fold(divisor, |acc, c| gcd(acc, c.num()));
        let remainder = remainder.scale(Rational::new(1, g));
        let divisor = divisor / g;
        if divisor == 1 {
            return quotient + remainder;
        }
        quotient + Self::from_atom(Atom::Floor { numerator: Box::new(remainder), divisor })
    }

    /// `ceil(self / k)` for positive `k`.
    pub fn ceil_div(&self, k: i128) -> Self {
        -(-self).floor_div(k)
    }

    /// Replaces the parameter `name` by `value` everywhere, including inside
    /// floor atoms.
    pub fn substitute(&self, name: &str, value: &QPoly) -> Self {
        let mut out = Self::zero();
        for (mono, coeff) in &self.terms {
            let mut product = Self::constant(*coeff);
            for (atom, exp) in mono.atoms() {
                let replaced = match atom {
                    Atom::Param(n) if n == name => value.clone(),
                    Atom::Param(_) => Self::from_atom(atom.clone()),
                    Atom::Floor { numerator, divisor } => numerator.substitute(name, value).floor_div(*divisor),
                };
                product = &product * &replaced.pow(exp);
            }
            out += product;
        }
        out
    }

    /// Evaluates at the given parameter values.
    pub fn eval(&self, params: &impl ParamSource) -> Result<Rational> {
        self.eval_dyn(params)
    }

    pub(crate) fn eval_dyn(&self, params: &dyn ParamSource) -> Result<Rational> {
        let overflow = || OverflowSnafu { during: "evaluating a polynomial" };
        let mut total = Rational::ZERO;
        for (mono, coeff) in &self.terms {
            let mut term = *coeff;
            for (atom, exp) in mono.atoms() {
                let factor = atom.eval(params)?.checked_pow(exp).with_context(overflow)?;
                term = term.checked_mul(factor).with_context(overflow)?;
            }
            total = total.checked_add(term).with_context(overflow)?;
        }
        Ok(total)
    }

    /// Over-approximation (`upward`) or under-approximation of `self` without
    /// floor atoms, assuming every non-floor factor is non-negative.
    pub fn relax_floors(&self, upward: bool) -> Self {
        let mut out = Self::zero();
        for (mono, coeff) in &self.terms {
            let grows = coeff.is_negative() != upward;
            let mut product = Self::constant(*coeff);
            for (atom, exp) in mono.atoms() {
                let bound = match atom {
                    Atom::Param(_) => Self::from_atom(atom.clone()),
                    Atom::Floor { numerator, divisor } => {
                        let d = Rational::new(1, *divisor);
                        if grows {
                            numerator.relax_floors(true).scale(d)
                        } else {
                            (numerator.relax_floors(false) - Self::constant(Rational::int(divisor - 1))).scale(d)
                        }
                    }
                };
                product = &product * &bound.pow(exp);
            }
            out += product;
        }
        out
    }
}

impl From<i64> for QPoly {
    fn from(value: i64) -> Self {
        Self::constant(value)
    }
}

impl From<Rational> for QPoly {
    fn from(value: Rational) -> Self {
        Self::constant(value)
    }
}

impl From<&str> for QPoly {
    fn from(name: &str) -> Self {
        Self::param(name)
    }
}

// ============================================================================
// ARITHMETIC
// ============================================================================

impl Add<&QPoly> for &QPoly {
    type Output = QPoly;
    fn add(self, rhs: &QPoly) -> QPoly {
        let mut out = self.clone();
        out += rhs.clone();
        out
    }
}

impl Add for QPoly {
    type Output = QPoly;
    fn add(mut self, rhs: QPoly) -> QPoly {
        self += rhs;
        self
    }
}

impl AddAssign for QPoly {
    fn add_assign(&mut self, rhs: QPoly) {
        for (mono, coeff) in rhs.terms {
            self.add_term(mono, coeff);
        }
    }
}

impl Sub<&QPoly> for &QPoly {
    type Output = QPoly;
    fn sub(self, rhs: &QPoly) -> QPoly {
        self + &(-rhs)
    }
}

impl Sub for QPoly {
    type Output = QPoly;
    fn sub(self, rhs: QPoly) -> QPoly {
        self + (-rhs)
    }
}

impl Neg for &QPoly {
    type Output = QPoly;
    fn neg(self) -> QPoly {
        self.scale(-Rational::ONE)
    }
}

impl Neg for QPoly {
    type Output = QPoly;
    fn neg(self) -> QPoly {
        -&self
    }
}

impl Mul<&QPoly> for &QPoly {
    type Output = QPoly;
    fn mul(self, rhs: &QPoly) -> QPoly {
        let mut out = QPoly::zero();
        for (m1, c1) in &self.terms {
            for (m2, c2) in &rhs.terms {
                out.add_term(m1.mul(m2), *c1 * *c2);
            }
        }
        out
    }
}

impl Mul for QPoly {
    type Output = QPoly;
    fn mul(self, rhs: QPoly) -> QPoly {
        &self * &rhs
    }
}

impl fmt::Display for QPoly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.terms.is_empty() {
            return write!(f, "0");
        }
        // Highest degree first, constant last.
        let ordered = self.terms.iter().sorted_by(|(a, _), (b, _)| b.degree().cmp(&a.degree()).then_with(|| a.cmp(b)));
        for (idx, (mono, coeff)) in ordered.enumerate() {
            let magnitude = coeff.abs();
            match (idx, coeff.is_negative()) {
                (0, true) => write!(f, "-")?,
                (0, false) => {}
                (_, true) => write!(f, " - ")?,
                (_, false) => write!(f, " + ")?,
            }
            match (mono.is_one(), magnitude == Rational::ONE) {
                (true, _) => write!(f, "{magnitude}")?,
                (false, true) => write!(f, "{mono}")?,
                (false, false) => write!(f, "{magnitude}*{mono}")?,
            }
        }
        Ok(())
    }
}
