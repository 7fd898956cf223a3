//! Piecewise quasi-polynomial count expressions.
//!
//! A [`PwQPoly`] is a sum of guarded pieces: its value at a parameter point is the
//! sum of the values of every piece whose guards all hold there. Counting results
//! have pairwise disjoint guards, but sums of counts need not, so operations that
//! are not additive (ceiling division) first refine the pieces into disjoint ones.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::{Add, AddAssign, Mul};

use itertools::Itertools;
use snafu::OptionExt;

use crate::affine::{Constraint, LinExpr};
use crate::error::{NonIntegralValueSnafu, OverflowSnafu, Result};
use crate::fm;
use crate::qpoly::{ParamSource, QPoly};
use crate::rational::{Rational, div_floor, gcd};

// ============================================================================
// GUARDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GuardKind {
    /// `expr >= 0`
    NonNegative,
    /// `expr == 0`
    Zero,
}

/// A quasi-affine condition on parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Guard {
    expr: QPoly,
    kind: GuardKind,
}

impl Guard {
    pub fn non_negative(expr: QPoly) -> Self {
        Self { expr, kind: GuardKind::NonNegative }.normalized()
    }

    pub fn zero(expr: QPoly) -> Self {
        Self { expr, kind: GuardKind::Zero }.normalized()
    }

    /// `lhs >= rhs`
    pub fn at_least(lhs: &QPoly, rhs: &QPoly) -> Self {
        Self::non_negative(lhs - rhs)
    }

    /// `lhs > rhs` over the integers.
    pub fn greater_than(lhs: &QPoly, rhs: &QPoly) -> Self {
        Self::non_negative(lhs - rhs - QPoly::one())
    }

    fn falsum() -> Self {
        Self { expr: QPoly::constant(-1i64), kind: GuardKind::NonNegative }
    }

    pub fn expr(&self) -> &QPoly {
        &self.expr
    }

    pub fn kind(&self) -> GuardKind {
        self.kind
    }

    /// Scales to integer coefficients with unit content, tightening the constant
    /// of inequalities.
    fn normalized(self) -> Self {
        let scale = self.expr.denominator_lcm();
        let expr = self.expr.scale(Rational::int(scale));
        let content = expr.terms().filter(|(m, _)| !m.is_one()).fold(0, |acc, (_, c)| gcd(acc, c.num()));
        if content <= 1 {
            return self.canonical_sign(expr);
        }
        let constant = expr.constant_term().num();
        let linear = (expr.clone() - QPoly::constant(Rational::int(constant))).scale(Rational::new(1, content));
        match self.kind {
            GuardKind::NonNegative => Self {
                expr: linear + QPoly::constant(Rational::int(div_floor(constant, content))),
                kind: self.kind,
            },
            GuardKind::Zero if constant % content != 0 => Self::falsum(),
            GuardKind::Zero => self.canonical_sign(linear + QPoly::constant(Rational::int(constant / content))),
        }
    }

    fn canonical_sign(&self, expr: QPoly) -> Self {
        let flip = self.kind == GuardKind::Zero
            && expr.terms().find(|(m, _)| !m.is_one()).is_some_and(|(_, c)| c.is_negative());
        Self { expr: if flip { -expr } else { expr }, kind: self.kind }
    }

    /// Truth value when the guard has no free parameters.
    pub fn as_constant(&self) -> Option<bool> {
        let value = self.expr.as_constant()?;
        Some(match self.kind {
            GuardKind::NonNegative => !value.is_negative(),
            GuardKind::Zero => value.is_zero(),
        })
    }

    pub fn holds(&self, params: &impl ParamSource) -> Result<bool> {
        let value = self.expr.eval(params)?;
        Ok(match self.kind {
            GuardKind::NonNegative => !value.is_negative(),
            GuardKind::Zero => value.is_zero(),
        })
    }

    /// Disjoint guards covering the complement.
    pub fn negate(&self) -> Vec<Guard> {
        match self.kind {
            GuardKind::NonNegative => vec![Guard::non_negative(-&self.expr - QPoly::one())],
            GuardKind::Zero => vec![
                Guard::non_negative(&self.expr - &QPoly::one()),
                Guard::non_negative(-&self.expr - QPoly::one()),
            ],
        }
    }

    pub fn substitute(&self, name: &str, value: &QPoly) -> Guard {
        Self { expr: self.expr.substitute(name, value), kind: self.kind }.normalized()
    }

    /// Linearized constraint, with each non-constant monomial as an opaque variable.
    fn linearize(&self) -> Option<Constraint> {
        let mut expr = LinExpr::default();
        for (mono, coeff) in self.expr.terms() {
            let c = i64::try_from(coeff.to_integer()?).ok()?;
            let term = if mono.is_one() { LinExpr::constant(c) } else { LinExpr::term(mono.to_string(), c) };
            expr = expr + term;
        }
        Some(match self.kind {
            GuardKind::NonNegative => Constraint::ge_zero(expr),
            GuardKind::Zero => Constraint::eq_zero(expr),
        })
    }
}

impl From<&Constraint> for Guard {
    fn from(c: &Constraint) -> Self {
        let expr = c.expr().to_qpoly();
        if c.is_eq() { Guard::zero(expr) } else { Guard::non_negative(expr) }
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            GuardKind::NonNegative => write!(f, "{} >= 0", self.expr),
            GuardKind::Zero => write!(f, "{} = 0", self.expr),
        }
    }
}

/// Simplifies a guard conjunction; `None` when it is unsatisfiable.
pub(crate) fn simplify_guards(guards: impl IntoIterator<Item = Guard>) -> Option<Vec<Guard>> {
    let mut out = BTreeSet::new();
    for guard in guards {
        match guard.as_constant() {
            Some(true) => {}
            Some(false) => return None,
            None => {
                out.insert(guard);
            }
        }
    }
    let out: Vec<Guard> = out.into_iter().collect();
    let linear: Option<Vec<Constraint>> = out.iter().map(Guard::linearize).collect();
    if let Some(linear) = linear
        && fm::is_infeasible(&linear)
    {
        return None;
    }
    Some(out)
}

// ============================================================================
// PIECEWISE QUASI-POLYNOMIAL
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Piece {
    guards: Vec<Guard>,
    value: QPoly,
}

impl Piece {
    pub(crate) fn new(guards: Vec<Guard>, value: QPoly) -> Self {
        Self { guards, value }
    }

    pub fn guards(&self) -> &[Guard] {
        &self.guards
    }

    pub fn value(&self) -> &QPoly {
        &self.value
    }
}

/// Rounding applied by [`PwQPoly::divide_by_constant`] when the division is not
/// provably exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    Floor,
    Ceil,
}

/// A count expression: a sum of guarded quasi-polynomial pieces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PwQPoly {
    pieces: Vec<Piece>,
}

impl PwQPoly {
    pub const fn zero() -> Self {
        Self { pieces: Vec::new() }
    }

    pub fn one() -> Self {
        Self::from_qpoly(QPoly::one())
    }

    pub fn constant(value: i64) -> Self {
        Self::from_qpoly(QPoly::from(value))
    }

    pub fn param(name: &str) -> Self {
        Self::from_qpoly(QPoly::param(name))
    }

    pub fn from_qpoly(value: QPoly) -> Self {
        Self::guarded(Vec::new(), value)
    }

    /// `value` where every guard holds, zero elsewhere.
    pub fn guarded(guards: Vec<Guard>, value: QPoly) -> Self {
        Self::from_pieces(vec![Piece { guards, value }])
    }

    pub(crate) fn from_pieces(pieces: Vec<Piece>) -> Self {
        let mut merged: BTreeMap<Vec<Guard>, QPoly> = BTreeMap::new();
        for piece in pieces {
            if piece.value.is_zero() {
                continue;
            }
            let Some(guards) = simplify_guards(piece.guards) else {
                continue;
            };
            *merged.entry(guards).or_default() += piece.value;
        }
        let pieces = merged.into_iter().filter(|(_, v)| !v.is_zero()).map(|(guards, value)| Piece { guards, value }).collect();
        Self { pieces }
    }

    pub fn pieces(&self) -> &[Piece] {
        &self.pieces
    }

    pub fn is_zero(&self) -> bool {
        self.pieces.is_empty()
    }

    /// The polynomial when there is a single unguarded piece.
    pub fn as_qpoly(&self) -> Option<QPoly> {
        match self.pieces.as_slice() {
            [] => Some(QPoly::zero()),
            [piece] if piece.guards.is_empty() => Some(piece.value.clone()),
            _ => None,
        }
    }

    pub fn params(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for piece in &self.pieces {
            out.extend(piece.value.params());
            for guard in &piece.guards {
                out.extend(guard.expr.params());
            }
        }
        out
    }

    pub fn scale(&self, factor: i64) -> Self {
        Self::from_pieces(
            self.pieces
                .iter()
                .map(|p| Piece { guards: p.guards.clone(), value: p.value.scale(Rational::from(factor)) })
                .collect(),
        )
    }

    /// Divides by a positive constant.
    ///
    /// When every coefficient is a multiple of `k` the division is exact;
    /// otherwise `rounding` is applied per disjoint piece.
    pub fn divide_by_constant(&self, k: i64, rounding: Rounding) -> Self {
        debug_assert!(k > 0, "division by non-positive constant");
        let k = k as i128;
        let exact = self
            .pieces
            .iter()
            .all(|p| p.value.terms().all(|(_, c)| c.is_integer() && c.num() % k == 0));
        if exact {
            return Self::from_pieces(
                self.pieces
                    .iter()
                    .map(|p| Piece { guards: p.guards.clone(), value: p.value.scale(Rational::new(1, k)) })
                    .collect(),
            );
        }
        let divided = self
            .disjoint_pieces()
            .into_iter()
            .map(|p| {
                let value = match rounding {
                    Rounding::Floor => p.value.floor_div(k),
                    Rounding::Ceil => p.value.ceil_div(k),
                };
                Piece { guards: p.guards, value }
            })
            .collect();
        Self::from_pieces(divided)
    }

    /// Refines overlapping pieces into pairwise disjoint ones with the same sum.
    fn disjoint_pieces(&self) -> Vec<Piece> {
        let mut regions: Vec<(Vec<Guard>, QPoly)> = vec![(Vec::new(), QPoly::zero())];
        for piece in &self.pieces {
            let mut next = Vec::with_capacity(regions.len() * 2);
            for (context, acc) in regions {
                let inside = context.iter().chain(&piece.guards).cloned();
                if let Some(guards) = simplify_guards(inside) {
                    next.push((guards, &acc + &piece.value));
                }
                let mut prefix = context.clone();
                for guard in &piece.guards {
                    for alternative in guard.negate() {
                        let outside = prefix.iter().cloned().chain(std::iter::once(alternative));
                        if let Some(guards) = simplify_guards(outside) {
                            next.push((guards, acc.clone()));
                        }
                    }
                    prefix.push(guard.clone());
                }
            }
            regions = next;
        }
        regions
            .into_iter()
            .filter(|(_, value)| !value.is_zero())
            .map(|(guards, value)| Piece { guards, value })
            .collect()
    }

    /// Evaluates at concrete parameter values.
    ///
    /// Fails with [`crate::Error::UnboundParameter`] when a parameter needed by a
    /// guard or an active piece is missing.
    pub fn eval(&self, params: &impl ParamSource) -> Result<i64> {
        let mut total = Rational::ZERO;
        for piece in &self.pieces {
            let mut active = true;
            for guard in &piece.guards {
                if !guard.holds(params)? {
                    active = false;
                    break;
                }
            }
            if active {
                let value = piece.value.eval(params)?;
                total = total.checked_add(value).context(OverflowSnafu { during: "adding pieces" })?;
            }
        }
        let value = total.to_integer().context(NonIntegralValueSnafu { value: total })?;
        i64::try_from(value).ok().context(OverflowSnafu { during: "narrowing a count to 64 bits" })
    }

    /// A floor-free expression that is pointwise at least `self` for
    /// non-negative piece values.
    ///
    /// Guards that depend on floor atoms are dropped and floor atoms in values are
    /// replaced by their rational upper bound.
    pub fn remove_divisive_terms(&self) -> Self {
        let pieces = self
            .pieces
            .iter()
            .map(|p| Piece {
                guards: p.guards.iter().filter(|g| !g.expr.has_floor()).cloned().collect(),
                value: p.value.relax_floors(true),
            })
            .collect();
        Self::from_pieces(pieces)
    }
}

impl From<QPoly> for PwQPoly {
    fn from(value: QPoly) -> Self {
        Self::from_qpoly(value)
    }
}

impl From<i64> for PwQPoly {
    fn from(value: i64) -> Self {
        Self::constant(value)
    }
}

impl Add<&PwQPoly> for &PwQPoly {
    type Output = PwQPoly;
    fn add(self, rhs: &PwQPoly) -> PwQPoly {
        PwQPoly::from_pieces(self.pieces.iter().chain(&rhs.pieces).cloned().collect())
    }
}

impl Add for PwQPoly {
    type Output = PwQPoly;
    fn add(self, rhs: PwQPoly) -> PwQPoly {
        &self + &rhs
    }
}

impl AddAssign<&PwQPoly> for PwQPoly {
    fn add_assign(&mut self, rhs: &PwQPoly) {
        *self = &*self + rhs;
    }
}

impl Mul<&PwQPoly> for &PwQPoly {
    type Output = PwQPoly;
    fn mul(self, rhs: &PwQPoly) -> PwQPoly {
        let pieces = self
            .pieces
            .iter()
            .cartesian_product(&rhs.pieces)
            .map(|(a, b)| Piece {
                guards: a.guards.iter().chain(&b.guards).cloned().collect(),
                value: &a.value * &b.value,
            })
            .collect();
        PwQPoly::from_pieces(pieces)
    }
}

impl Mul for PwQPoly {
    type Output = PwQPoly;
    fn mul(self, rhs: PwQPoly) -> PwQPoly {
        &self * &rhs
    }
}

impl fmt::Display for PwQPoly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pieces.is_empty() {
            return write!(f, "0");
        }
        let parts = self.pieces.iter().map(|p| {
            if p.guards.is_empty() {
                format!("{}", p.value)
            } else {
                format!("({}) [{}]", p.value, p.guards.iter().join(" and "))
            }
        });
        write!(f, "{}", parts.format(" + "))
    }
}
