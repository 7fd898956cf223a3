//! Fourier–Motzkin elimination over affine constraint systems.
//!
//! Rational elimination is used for emptiness checks and shadows; the exact
//! integer variant lives in [`crate::set`].

use std::collections::BTreeSet;

use crate::affine::{Constraint, Normalized};

/// Systems larger than this are not simplified further; callers treat the
/// result as "unknown".
pub(crate) const MAX_CONSTRAINTS: usize = 512;

/// Normalizes, deduplicates and promotes opposite inequality pairs to equalities.
///
/// Returns `None` when a constraint is trivially false.
pub(crate) fn simplify(constraints: impl IntoIterator<Item = Constraint>) -> Option<Vec<Constraint>> {
    let mut kept = BTreeSet::new();
    for constraint in constraints {
        match constraint.normalize() {
            Normalized::True => {}
            Normalized::False => return None,
            Normalized::Keep(c) => {
                kept.insert(c);
            }
        }
    }

    // e >= 0 and -e >= 0 means e == 0.
    let mut out: Vec<Constraint> = Vec::with_capacity(kept.len());
    let mut promoted = BTreeSet::new();
    for c in &kept {
        if c.is_eq() {
            out.push(c.clone());
            continue;
        }
        let opposite = Constraint::ge_zero(-c.expr().clone());
        if kept.contains(&opposite) {
            if promoted.insert(opposite.clone()) {
                match Constraint::eq_zero(c.expr().clone()).normalize() {
                    Normalized::Keep(eq) => out.push(eq),
                    Normalized::False => return None,
                    Normalized::True => {}
                }
            }
            promoted.insert(c.clone());
            continue;
        }
        out.push(c.clone());
    }
    out.sort();
    out.dedup();
    Some(out)
}

/// Rationally eliminates `var`, using an equality when one mentions it.
///
/// Returns `None` on coefficient overflow.
pub(crate) fn eliminate(constraints: &[Constraint], var: &str) -> Option<Vec<Constraint>> {
    if let Some(eq) = constraints.iter().find(|c| c.is_eq() && c.mentions(var)) {
        let a = eq.coeff(var);
        let mut out = Vec::with_capacity(constraints.len());
        for c in constraints {
            if std::ptr::eq(c, eq) {
                continue;
            }
            let b = c.coeff(var);
            if b == 0 {
                out.push(c.clone());
                continue;
            }
            // |a| * c - sign(a) * b * eq has no `var` and keeps the inequality direction.
            let scaled = c.expr().checked_scale(a.checked_abs()?)?;
            let combined = scaled.checked_add_scaled(eq.expr(), -a.signum() * b)?;
            out.push(c.with_expr(combined));
        }
        return Some(out);
    }

    let (with, without): (Vec<_>, Vec<_>) = constraints.iter().partition(|c| c.mentions(var));
    let lowers: Vec<&Constraint> = with.iter().copied().filter(|c| c.coeff(var) > 0).collect();
    let uppers: Vec<&Constraint> = with.iter().copied().filter(|c| c.coeff(var) < 0).collect();
    let mut out: Vec<Constraint> = without.into_iter().cloned().collect();
    for lower in &lowers {
        for upper in &uppers {
            let a = lower.coeff(var);
            let b = -upper.coeff(var);
            let combined = lower.expr().checked_scale(b)?.checked_add_scaled(upper.expr(), a)?;
            out.push(Constraint::ge_zero(combined));
        }
    }
    Some(out)
}

/// Variables mentioned by any constraint.
pub(crate) fn variables(constraints: &[Constraint]) -> BTreeSet<String> {
    constraints.iter().flat_map(|c| c.expr().vars().map(str::to_string)).collect()
}

/// Whether the system has no rational (hence no integer) solution.
///
/// Conservative: returns `false` whenever the answer is not established.
pub(crate) fn is_infeasible(constraints: &[Constraint]) -> bool {
    let Some(mut system) = simplify(constraints.iter().cloned()) else {
        return true;
    };
    loop {
        let vars = variables(&system);
        let Some(var) = pick_cheapest(&system, &vars) else {
            return false;
        };
        let Some(next) = eliminate(&system, &var) else {
            return false;
        };
        match simplify(next) {
            None => return true,
            Some(next) if next.len() > MAX_CONSTRAINTS => return false,
            Some(next) => system = next,
        }
    }
}

/// Variable whose elimination creates the fewest new constraints.
pub(crate) fn pick_cheapest(system: &[Constraint], vars: &BTreeSet<String>) -> Option<String> {
    vars.iter()
        .map(|v| {
            let cost = if system.iter().any(|c| c.is_eq() && c.mentions(v)) {
                0
            } else {
                let lowers = system.iter().filter(|c| c.coeff(v) > 0).count();
                let uppers = system.iter().filter(|c| c.coeff(v) < 0).count();
                lowers * uppers
            };
            (cost, v)
        })
        .min()
        .map(|(_, v)| v.clone())
}
