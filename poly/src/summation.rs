//! Symbolic summation of quasi-polynomials over integer ranges.
//!
//! Dimensions are summed one at a time. Each dimension's lower and upper bounds
//! are split into guarded pieces (one per choice of active bound) and the
//! summand is integrated with Faulhaber's formula.

use itertools::Itertools;
use once_cell::sync::Lazy;
use snafu::ensure;

use crate::count::{Guard, GuardKind, Piece, PwQPoly, simplify_guards};
use crate::error::{Result, UnboundedSnafu, UnsupportedSnafu};
use crate::qpoly::QPoly;
use crate::rational::{Rational, lcm};

/// Highest power that the precomputed Bernoulli table supports.
const MAX_DEGREE: usize = 16;

/// Largest number of residue classes a dimension is split into.
const MAX_PERIOD: i128 = 64;

/// Nested residue splits allowed per region.
const MAX_SPLITS: u32 = 4;

/// Bernoulli numbers with `B_1 = +1/2`.
static BERNOULLI: Lazy<Vec<Rational>> = Lazy::new(|| {
    let mut b = vec![Rational::ONE];
    for m in 1..=MAX_DEGREE {
        // sum_{j=0}^{m} C(m+1, j) B_j = 0
        let acc = (0..m).fold(Rational::ZERO, |acc, j| acc + Rational::int(binomial(m + 1, j)) * b[j]);
        b.push(-acc / Rational::int(binomial(m + 1, m)));
    }
    b[1] = -b[1];
    b
});

fn binomial(n: usize, k: usize) -> i128 {
    (0..k).fold(1i128, |acc, i| acc * (n - i) as i128 / (i + 1) as i128)
}

/// `sum_{x=1}^{n} x^k` as a polynomial in `n`.
fn faulhaber(k: usize, n: &QPoly) -> QPoly {
    (0..=k).fold(QPoly::zero(), |acc, j| {
        let coeff = Rational::int(binomial(k + 1, j)) * BERNOULLI[j] / Rational::int((k + 1) as i128);
        acc + n.pow((k + 1 - j) as u32).scale(coeff)
    })
}

/// `sum_{x=lower}^{upper} value(x)`, assuming `lower <= upper + 1`.
fn sum_range(value: &QPoly, var: &str, lower: &QPoly, upper: &QPoly) -> Result<QPoly> {
    let coeffs = value
        .coefficients_in(var)
        .ok_or_else(|| UnsupportedSnafu { reason: format!("'{var}' occurs inside a floor") }.build())?;
    ensure!(
        coeffs.len() <= MAX_DEGREE + 1,
        UnsupportedSnafu { reason: format!("summand of degree {} in '{var}'", coeffs.len() - 1) }
    );
    let below = lower - &QPoly::one();
    Ok(coeffs
        .iter()
        .enumerate()
        .filter(|(_, c)| !c.is_zero())
        .fold(QPoly::zero(), |acc, (k, c)| acc + c * &(faulhaber(k, upper) - faulhaber(k, &below))))
}

/// Sums `value` over every integer point of `dims` satisfying `guards`.
///
/// The result is a function of the remaining names. Fails with `Unbounded` when
/// a dimension lacks a lower or upper bound, and with `Unsupported` when no
/// dimension can be summed in closed form.
///
/// A dimension that only occurs inside floors is split into residue classes
/// modulo the floors' divisors, which frees it from them.
pub fn sum_out<S: AsRef<str>>(dims: &[S], guards: Vec<Guard>, value: QPoly) -> Result<PwQPoly> {
    let dims: Vec<String> = dims.iter().map(|d| d.as_ref().to_string()).collect();
    let mut pieces = Vec::new();
    sum_region(&dims, guards, value, MAX_SPLITS, &mut pieces)?;
    Ok(PwQPoly::from_pieces(pieces))
}

fn sum_region(dims: &[String], guards: Vec<Guard>, value: QPoly, splits: u32, out: &mut Vec<Piece>) -> Result<()> {
    let Some(guards) = simplify_guards(guards) else {
        return Ok(());
    };
    if value.is_zero() {
        return Ok(());
    }
    if dims.is_empty() {
        out.push(Piece::new(guards, value));
        return Ok(());
    }

    let var = match pick_dimension(dims, &guards, &value) {
        Ok(var) => var,
        Err(err) => {
            let Some((var, period)) = residue_split(dims, &guards, &value) else {
                return Err(err);
            };
            ensure!(
                splits > 0 && period <= MAX_PERIOD,
                UnsupportedSnafu { reason: format!("'{var}' occurs inside floors of period {period}") }
            );
            return sum_residues(dims, &var, period, &guards, &value, splits - 1, out);
        }
    };
    let rest: Vec<String> = dims.iter().filter(|d| **d != var).cloned().collect();

    let mut independent = Vec::new();
    let mut lowers = Vec::new();
    let mut uppers = Vec::new();
    let mut equality = None;
    for guard in guards {
        let Some((a, r)) = guard.expr().split_linear(&var) else {
            return UnsupportedSnafu { reason: format!("non-affine bound on '{var}'") }.fail();
        };
        if a.is_zero() {
            independent.push(guard);
            continue;
        }
        let a = a
            .as_constant()
            .and_then(|c| c.to_integer())
            .ok_or_else(|| UnsupportedSnafu { reason: format!("symbolic coefficient of '{var}'") }.build())?;
        match guard.kind() {
            GuardKind::Zero if equality.is_none() => equality = Some((a, r)),
            GuardKind::Zero => {
                // A second equality is re-checked after substitution.
                independent.push(guard);
            }
            // a*x + r >= 0  =>  x >= ceil(-r/a)
            GuardKind::NonNegative if a > 0 => lowers.push(-r.floor_div(a)),
            // x <= floor(r/|a|)
            GuardKind::NonNegative => uppers.push(r.floor_div(-a)),
        }
    }

    if let Some((a, r)) = equality {
        // a*x + r == 0
        let (a, r) = if a < 0 { (-a, -r) } else { (a, r) };
        let mut guards = independent;
        let solution = if a == 1 {
            -r
        } else {
            let neg = -r;
            let solution = neg.floor_div(a);
            guards.push(Guard::zero(&neg - &solution.scale(Rational::int(a))));
            solution
        };
        guards.extend(lowers.iter().map(|l| Guard::at_least(&solution, l)));
        guards.extend(uppers.iter().map(|u| Guard::at_least(u, &solution)));
        let guards = guards.into_iter().map(|g| g.substitute(&var, &solution)).collect();
        return sum_region(&rest, guards, value.substitute(&var, &solution), splits, out);
    }

    ensure!(!lowers.is_empty(), UnboundedSnafu { dim: var.clone(), side: "lower" });
    ensure!(!uppers.is_empty(), UnboundedSnafu { dim: var.clone(), side: "upper" });

    for ((i, lower), (j, upper)) in lowers.iter().enumerate().cartesian_product(uppers.iter().enumerate()) {
        let mut piece = independent.clone();
        // The chosen lower bound is the first maximal one.
        for (k, other) in lowers.iter().enumerate().filter(|(k, _)| *k != i) {
            piece.push(if k < i { Guard::greater_than(lower, other) } else { Guard::at_least(lower, other) });
        }
        // The chosen upper bound is the first minimal one.
        for (k, other) in uppers.iter().enumerate().filter(|(k, _)| *k != j) {
            piece.push(if k < j { Guard::greater_than(other, upper) } else { Guard::at_least(other, upper) });
        }
        piece.push(Guard::at_least(upper, lower));
        let summed = sum_range(&value, &var, lower, upper)?;
        sum_region(&rest, piece, summed, splits, out)?;
    }
    Ok(())
}

/// The dimension with the fewest residue classes that frees it from floors.
fn residue_split(dims: &[String], guards: &[Guard], value: &QPoly) -> Option<(String, i128)> {
    dims.iter()
        .rev()
        .map(|d| {
            let period = guards
                .iter()
                .map(Guard::expr)
                .chain([value])
                .fold(1, |acc, e| lcm(acc, e.floor_period(d)).min(MAX_PERIOD + 1));
            (period, d)
        })
        .filter(|(period, _)| *period > 1)
        .min_by_key(|(period, _)| *period)
        .map(|(period, d)| (d.clone(), period))
}

/// Sums each class `var = period*q + r` separately, with `q` in place of `var`.
fn sum_residues(
    dims: &[String],
    var: &str,
    period: i128,
    guards: &[Guard],
    value: &QPoly,
    splits: u32,
    out: &mut Vec<Piece>,
) -> Result<()> {
    let quotient = format!("{var}'q");
    let dims: Vec<String> = dims.iter().map(|d| if d == var { quotient.clone() } else { d.clone() }).collect();
    for r in 0..period {
        let class = QPoly::param(quotient.as_str()).scale(Rational::int(period)) + QPoly::constant(Rational::int(r));
        let guards = guards.iter().map(|g| g.substitute(var, &class)).collect();
        sum_region(&dims, guards, value.substitute(var, &class), splits, out)?;
    }
    Ok(())
}

/// The next dimension to sum: never one that occurs inside a floor, and
/// preferably one with an equality or unit coefficients everywhere.
fn pick_dimension(dims: &[String], guards: &[Guard], value: &QPoly) -> Result<String> {
    let score = |dim: &String| -> Option<(u8, usize)> {
        if value.mentions_in_floor(dim) || guards.iter().any(|g| g.expr().mentions_in_floor(dim)) {
            return None;
        }
        let mut unit = true;
        let mut has_equality = false;
        let mut bounds = 0;
        for guard in guards {
            let (a, _) = guard.expr().split_linear(dim)?;
            if a.is_zero() {
                continue;
            }
            let a = a.as_constant()?;
            bounds += 1;
            unit &= a.abs() == Rational::ONE;
            has_equality |= guard.kind() == GuardKind::Zero;
        }
        let rank = match (has_equality, unit) {
            (true, true) => 0,
            (true, false) => 2,
            (false, true) => 1,
            (false, false) => 3,
        };
        Some((rank, bounds))
    };
    // Innermost first among equally good candidates.
    dims.iter()
        .rev()
        .filter_map(|d| score(d).map(|s| (s, d)))
        .min_by_key(|(s, _)| *s)
        .map(|(_, d)| d.clone())
        .ok_or_else(|| UnsupportedSnafu { reason: format!("no summable dimension among {}", dims.iter().join(", ")) }.build())
}
