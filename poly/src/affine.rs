//! Named affine expressions and constraints with integer coefficients.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

use crate::qpoly::QPoly;
use crate::rational::{Rational, div_floor, gcd};

/// `sum(coeff * var) + constant`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinExpr {
    coeffs: BTreeMap<String, i64>,
    constant: i64,
}

impl LinExpr {
    pub fn constant(value: i64) -> Self {
        Self { coeffs: BTreeMap::new(), constant: value }
    }

    pub fn var(name: impl Into<String>) -> Self {
        Self::term(name, 1)
    }

    pub fn term(name: impl Into<String>, coeff: i64) -> Self {
        let mut coeffs = BTreeMap::new();
        if coeff != 0 {
            coeffs.insert(name.into(), coeff);
        }
        Self { coeffs, constant: 0 }
    }

    pub fn coeff(&self, name: &str) -> i64 {
        self.coeffs.get(name).copied().unwrap_or(0)
    }

    pub fn constant_term(&self) -> i64 {
        self.constant
    }

    pub fn coeffs(&self) -> impl Iterator<Item = (&str, i64)> {
        self.coeffs.iter().map(|(n, c)| (n.as_str(), *c))
    }

    pub fn vars(&self) -> impl Iterator<Item = &str> {
        self.coeffs.keys().map(String::as_str)
    }

    pub fn mentions(&self, name: &str) -> bool {
        self.coeffs.contains_key(name)
    }

    pub fn is_constant(&self) -> bool {
        self.coeffs.is_empty()
    }

    /// `self + factor * other`, or `None` on overflow.
    pub fn checked_add_scaled(&self, other: &LinExpr, factor: i64) -> Option<LinExpr> {
        let mut out = self.clone();
        for (name, c) in &other.coeffs {
            let entry = out.coeffs.entry(name.clone()).or_insert(0);
            *entry = entry.checked_add(c.checked_mul(factor)?)?;
        }
        out.coeffs.retain(|_, c| *c != 0);
        out.constant = out.constant.checked_add(other.constant.checked_mul(factor)?)?;
        Some(out)
    }

    pub fn checked_scale(&self, factor: i64) -> Option<LinExpr> {
        LinExpr::default().checked_add_scaled(self, factor)
    }

    /// Replaces `name` by `value`.
    pub fn substitute(&self, name: &str, value: &LinExpr) -> Option<LinExpr> {
        let coeff = self.coeff(name);
        if coeff == 0 {
            return Some(self.clone());
        }
        let mut rest = self.clone();
        rest.coeffs.remove(name);
        rest.checked_add_scaled(value, coeff)
    }

    pub fn rename(&self, from: &str, to: &str) -> LinExpr {
        let coeff = self.coeff(from);
        if coeff == 0 {
            return self.clone();
        }
        let mut out = self.clone();
        out.coeffs.remove(from);
        out + LinExpr::term(to, coeff)
    }

    /// Drops `name` and returns its coefficient.
    pub(crate) fn take(&mut self, name: &str) -> i64 {
        self.coeffs.remove(name).unwrap_or(0)
    }

    pub(crate) fn content(&self) -> i64 {
        self.coeffs.values().fold(0, |acc, c| gcd(acc as i128, *c as i128) as i64)
    }

    pub fn to_qpoly(&self) -> QPoly {
        self.coeffs
            .iter()
            .fold(QPoly::constant(self.constant), |acc, (name, c)| acc + QPoly::param(name.as_str()).scale(Rational::from(*c)))
    }

    /// `self >= rhs`
    pub fn at_least(self, rhs: impl Into<LinExpr>) -> Constraint {
        Constraint::ge_zero(self - rhs.into())
    }

    /// `self <= rhs`
    pub fn at_most(self, rhs: impl Into<LinExpr>) -> Constraint {
        Constraint::ge_zero(rhs.into() - self)
    }

    /// `self > rhs`
    pub fn greater_than(self, rhs: impl Into<LinExpr>) -> Constraint {
        Constraint::ge_zero(self - rhs.into() - LinExpr::constant(1))
    }

    /// `self < rhs`
    pub fn less_than(self, rhs: impl Into<LinExpr>) -> Constraint {
        Constraint::ge_zero(rhs.into() - self - LinExpr::constant(1))
    }

    /// `self == rhs`
    pub fn equals(self, rhs: impl Into<LinExpr>) -> Constraint {
        Constraint::eq_zero(self - rhs.into())
    }
}

impl From<i64> for LinExpr {
    fn from(value: i64) -> Self {
        Self::constant(value)
    }
}

impl From<&str> for LinExpr {
    fn from(name: &str) -> Self {
        Self::var(name)
    }
}

impl Add for LinExpr {
    type Output = LinExpr;
    fn add(mut self, rhs: LinExpr) -> LinExpr {
        for (name, c) in rhs.coeffs {
            *self.coeffs.entry(name).or_insert(0) += c;
        }
        self.coeffs.retain(|_, c| *c != 0);
        self.constant += rhs.constant;
        self
    }
}

impl Sub for LinExpr {
    type Output = LinExpr;
    fn sub(self, rhs: LinExpr) -> LinExpr {
        self + (-rhs)
    }
}

impl Neg for LinExpr {
    type Output = LinExpr;
    fn neg(self) -> LinExpr {
        self * -1
    }
}

impl Mul<i64> for LinExpr {
    type Output = LinExpr;
    fn mul(mut self, rhs: i64) -> LinExpr {
        if rhs == 0 {
            return LinExpr::default();
        }
        self.coeffs.values_mut().for_each(|c| *c *= rhs);
        self.constant *= rhs;
        self
    }
}

impl fmt::Display for LinExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, c) in &self.coeffs {
            let sign = if *c < 0 { "-" } else { "+" };
            match (first, c.abs()) {
                (true, 1) => write!(f, "{}{name}", if *c < 0 { "-" } else { "" })?,
                (true, m) => write!(f, "{}{m}*{name}", if *c < 0 { "-" } else { "" })?,
                (false, 1) => write!(f, " {sign} {name}")?,
                (false, m) => write!(f, " {sign} {m}*{name}")?,
            }
            first = false;
        }
        match (first, self.constant) {
            (true, c) => write!(f, "{c}"),
            (false, 0) => Ok(()),
            (false, c) if c < 0 => write!(f, " - {}", -c),
            (false, c) => write!(f, " + {c}"),
        }
    }
}

// ============================================================================
// CONSTRAINTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConstraintKind {
    /// `expr == 0`
    Eq,
    /// `expr >= 0`
    Ge,
}

/// An affine equality or inequality against zero.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Constraint {
    expr: LinExpr,
    kind: ConstraintKind,
}

/// Outcome of normalizing a constraint over the integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Normalized {
    True,
    False,
    Keep(Constraint),
}

impl Constraint {
    pub fn ge_zero(expr: LinExpr) -> Self {
        Self { expr, kind: ConstraintKind::Ge }
    }

    pub fn eq_zero(expr: LinExpr) -> Self {
        Self { expr, kind: ConstraintKind::Eq }
    }

    pub fn expr(&self) -> &LinExpr {
        &self.expr
    }

    pub fn kind(&self) -> ConstraintKind {
        self.kind
    }

    pub fn is_eq(&self) -> bool {
        self.kind == ConstraintKind::Eq
    }

    pub fn mentions(&self, name: &str) -> bool {
        self.expr.mentions(name)
    }

    pub fn coeff(&self, name: &str) -> i64 {
        self.expr.coeff(name)
    }

    /// Disjoint alternatives covering the complement of this constraint.
    pub fn negate(&self) -> Vec<Constraint> {
        match self.kind {
            ConstraintKind::Ge => vec![Constraint::ge_zero(-self.expr.clone() - LinExpr::constant(1))],
            ConstraintKind::Eq => vec![
                Constraint::ge_zero(self.expr.clone() - LinExpr::constant(1)),
                Constraint::ge_zero(-self.expr.clone() - LinExpr::constant(1)),
            ],
        }
    }

    pub fn substitute(&self, name: &str, value: &LinExpr) -> Option<Constraint> {
        Some(Self { expr: self.expr.substitute(name, value)?, kind: self.kind })
    }

    pub fn rename(&self, from: &str, to: &str) -> Constraint {
        Self { expr: self.expr.rename(from, to), kind: self.kind }
    }

    pub(crate) fn with_expr(&self, expr: LinExpr) -> Constraint {
        Self { expr, kind: self.kind }
    }

    /// Divides by the coefficient content, tightening inequalities over the
    /// integers, and decides constant constraints.
    pub(crate) fn normalize(&self) -> Normalized {
        let content = self.expr.content();
        let constant = self.expr.constant_term();
        if content == 0 {
            let holds = match self.kind {
                ConstraintKind::Ge => constant >= 0,
                ConstraintKind::Eq => constant == 0,
            };
            return if holds { Normalized::True } else { Normalized::False };
        }
        let mut expr = self.expr.clone();
        match self.kind {
            ConstraintKind::Ge => {
                expr.coeffs.values_mut().for_each(|c| *c /= content);
                expr.constant = div_floor(constant as i128, content as i128) as i64;
            }
            ConstraintKind::Eq => {
                if constant % content != 0 {
                    return Normalized::False;
                }
                expr.coeffs.values_mut().for_each(|c| *c /= content);
                expr.constant /= content;
                // Canonical sign: first coefficient positive.
                if expr.coeffs.values().next().is_some_and(|c| *c < 0) {
                    expr = -expr;
                }
            }
        }
        Normalized::Keep(Self { expr, kind: self.kind })
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ConstraintKind::Eq => write!(f, "{} = 0", self.expr),
            ConstraintKind::Ge => write!(f, "{} >= 0", self.expr),
        }
    }
}
