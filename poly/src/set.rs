//! Integer sets described by affine constraints.
//!
//! A [`BasicSet`] is the set of integer points `dims` for which there exist
//! integer values of `exists` satisfying every constraint, as a function of the
//! symbolic `params`. A [`Set`] is a finite union of basic sets over the same
//! dimensions.

use std::collections::BTreeSet;
use std::fmt;

use itertools::Itertools;
use snafu::{OptionExt, ensure};
use tracing::trace;

use crate::affine::{Constraint, LinExpr};
use crate::error::{Result, UnknownVariableSnafu, UnsupportedSnafu};
use crate::fm;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BasicSet {
    dims: Vec<String>,
    exists: Vec<String>,
    params: BTreeSet<String>,
    constraints: Vec<Constraint>,
}

impl BasicSet {
    /// All integer points over `dims`.
    pub fn universe<S: Into<String>>(dims: impl IntoIterator<Item = S>) -> Self {
        Self {
            dims: dims.into_iter().map(Into::into).collect(),
            exists: Vec::new(),
            params: BTreeSet::new(),
            constraints: Vec::new(),
        }
    }

    pub fn empty<S: Into<String>>(dims: impl IntoIterator<Item = S>) -> Self {
        Self::universe(dims).add_constraint(Constraint::ge_zero(LinExpr::constant(-1)))
    }

    /// Parses `"[n] -> { [i, j] : 0 <= i < n and 0 <= j <= i }"`.
    pub fn parse(text: &str) -> Result<Self> {
        crate::parse::parse_set(text)
    }

    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    pub fn exists(&self) -> &[String] {
        &self.exists
    }

    pub fn params(&self) -> &BTreeSet<String> {
        &self.params
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn has_dim(&self, name: &str) -> bool {
        self.dims.iter().any(|d| d == name)
    }

    fn is_bound(&self, name: &str) -> bool {
        self.has_dim(name) || self.exists.iter().any(|e| e == name)
    }

    fn names(&self) -> BTreeSet<String> {
        self.dims.iter().chain(&self.exists).chain(&self.params).cloned().collect()
    }

    pub fn with_params<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.params.extend(names.into_iter().map(Into::into));
        self
    }

    /// Adds a constraint. Names that are neither dimensions nor existentials
    /// become parameters.
    pub fn add_constraint(mut self, constraint: Constraint) -> Self {
        for var in constraint.expr().vars() {
            if !self.is_bound(var) {
                self.params.insert(var.to_string());
            }
        }
        self.constraints.push(constraint);
        self
    }

    pub fn add_constraints(self, constraints: impl IntoIterator<Item = Constraint>) -> Self {
        constraints.into_iter().fold(self, Self::add_constraint)
    }

    /// Renames every existential so none collides with `taken`.
    fn rename_exists_avoiding(&self, taken: &BTreeSet<String>) -> BasicSet {
        let mut out = self.clone();
        let mut used: BTreeSet<String> = taken.iter().chain(&self.names()).cloned().collect();
        for idx in 0..out.exists.len() {
            let old = out.exists[idx].clone();
            if !taken.contains(&old) {
                continue;
            }
            let new = fresh_name(&used, "e");
            used.insert(new.clone());
            out.constraints = out.constraints.iter().map(|c| c.rename(&old, &new)).collect();
            out.exists[idx] = new;
        }
        out
    }

    /// Conjunction of both sets. Dimensions are matched by name; dimensions only
    /// present in `other` are appended.
    pub fn intersect(&self, other: &BasicSet) -> BasicSet {
        let lhs = self.rename_exists_avoiding(&other.dims.iter().chain(&other.params).cloned().collect());
        let rhs = other.rename_exists_avoiding(&lhs.names());
        let mut out = lhs;
        for dim in &rhs.dims {
            if !out.has_dim(dim) {
                out.params.remove(dim);
                out.dims.push(dim.clone());
            }
        }
        out.exists.extend(rhs.exists);
        for param in rhs.params {
            if !out.is_bound(&param) {
                out.params.insert(param);
            }
        }
        out.constraints.extend(rhs.constraints);
        out
    }

    /// Turns the named dimensions into existentials.
    pub fn project_out<S: AsRef<str>>(&self, names: &[S]) -> Result<BasicSet> {
        let mut out = self.clone();
        for name in names {
            let name = name.as_ref();
            let idx = out.dims.iter().position(|d| d == name).context(UnknownVariableSnafu { name })?;
            let dim = out.dims.remove(idx);
            out.exists.push(dim);
        }
        Ok(out)
    }

    /// Keeps only the named dimensions, in their current order.
    pub fn project_onto<S: AsRef<str>>(&self, keep: &[S]) -> Result<BasicSet> {
        for name in keep {
            ensure!(self.has_dim(name.as_ref()), UnknownVariableSnafu { name: name.as_ref() });
        }
        let drop: Vec<String> =
            self.dims.iter().filter(|d| !keep.iter().any(|k| k.as_ref() == d.as_str())).cloned().collect();
        self.project_out(&drop)
    }

    /// Image of the set under the affine map `out_dims[k] = index[k]`.
    pub fn apply_access<S: AsRef<str>>(&self, index: &[LinExpr], out_dims: &[S]) -> Result<BasicSet> {
        ensure!(
            index.len() == out_dims.len(),
            UnsupportedSnafu { reason: format!("{} index expressions for {} output dims", index.len(), out_dims.len()) }
        );
        for name in out_dims {
            ensure!(
                !self.params.contains(name.as_ref()),
                UnsupportedSnafu { reason: format!("output dim '{}' shadows a parameter", name.as_ref()) }
            );
        }

        let mut out = self.clone();
        let mut used = self.names();
        used.extend(out_dims.iter().map(|d| d.as_ref().to_string()));
        let mut index: Vec<LinExpr> = index.to_vec();
        let old_dims = std::mem::take(&mut out.dims);
        for dim in old_dims {
            let renamed = fresh_name(&used, &dim);
            used.insert(renamed.clone());
            out.constraints = out.constraints.iter().map(|c| c.rename(&dim, &renamed)).collect();
            index = index.iter().map(|e| e.rename(&dim, &renamed)).collect();
            out.exists.push(renamed);
        }
        for (name, expr) in out_dims.iter().zip(index) {
            out.dims.push(name.as_ref().to_string());
            out.constraints.push(Constraint::eq_zero(LinExpr::var(name.as_ref()) - expr));
        }
        Ok(out)
    }

    /// Normalized and deduplicated constraints; an empty set keeps a single
    /// false constraint.
    pub fn simplify(&self) -> BasicSet {
        let mut out = self.clone();
        match fm::simplify(self.constraints.iter().cloned()) {
            Some(constraints) => out.constraints = constraints,
            None => out.constraints = vec![Constraint::ge_zero(LinExpr::constant(-1))],
        }
        out
    }

    /// Whether normalization alone shows a contradiction.
    pub fn is_obviously_empty(&self) -> bool {
        fm::simplify(self.constraints.iter().cloned()).is_none()
    }

    /// Whether the set is empty even over the rationals. `false` means unknown.
    pub fn is_rationally_empty(&self) -> bool {
        fm::is_infeasible(&self.constraints)
    }

    /// Drops integrality of the existentials by projecting them out over the
    /// rationals.
    ///
    /// The result contains every point of `self` and has no existentials, so
    /// stride and divisibility information is lost.
    pub fn remove_divisive_terms(&self) -> BasicSet {
        let mut out = self.clone();
        let Some(mut system) = fm::simplify(self.constraints.iter().cloned()) else {
            return self.simplify();
        };
        for var in &self.exists {
            let next = match fm::eliminate(&system, var) {
                Some(next) => next,
                None => system.iter().filter(|c| !c.mentions(var)).cloned().collect(),
            };
            match fm::simplify(next) {
                Some(next) => system = next,
                None => {
                    system = vec![Constraint::ge_zero(LinExpr::constant(-1))];
                    break;
                }
            }
        }
        out.exists.clear();
        out.constraints = system;
        out
    }

    /// Rational shadow of the set on a single dimension, over parameters only.
    pub(crate) fn shadow_on(&self, dim: &str) -> Vec<Constraint> {
        let mut system = self.remove_divisive_terms().constraints;
        for other in self.dims.iter().filter(|d| *d != dim) {
            let next = match fm::eliminate(&system, other) {
                Some(next) => next,
                None => system.iter().filter(|c| !c.mentions(other)).cloned().collect(),
            };
            match fm::simplify(next) {
                Some(next) => system = next,
                None => return vec![Constraint::ge_zero(LinExpr::constant(-1))],
            }
        }
        system
    }

    /// A set with the same number of points and no existentials, or
    /// `Unsupported` when the elimination cannot be done exactly over the
    /// integers.
    ///
    /// Equalities are solved first: unit coefficients by substitution, then
    /// unimodular reduction of coefficients among existentials, then promotion
    /// of a strided existential into a dimension it determines. Remaining
    /// existentials are removed by Fourier-Motzkin when every bound pair is
    /// exact over the integers.
    ///
    /// Promotion renumbers the points, so the result is only good for counting.
    pub(crate) fn eliminate_existentials_exact(&self) -> Result<BasicSet> {
        self.eliminate_existentials(true)
    }

    /// The same point set without existentials, or `Unsupported`.
    pub(crate) fn without_existentials(&self) -> Result<BasicSet> {
        self.eliminate_existentials(false)
    }

    /// Points of `self` outside `other`, as pairwise disjoint sets.
    ///
    /// Both sets must have the same dimensions and `other` must be free of
    /// existentials; each piece violates one constraint of `other` and
    /// satisfies all the constraints before it.
    pub fn subtract(&self, other: &BasicSet) -> Result<Vec<BasicSet>> {
        ensure!(
            self.dims == other.dims,
            UnsupportedSnafu { reason: format!("subtracting over different dimensions {other}") }
        );
        ensure!(other.exists.is_empty(), UnsupportedSnafu { reason: "subtrahend has existentials" });
        let Some(cuts) = fm::simplify(other.constraints.iter().cloned()) else {
            return Ok(vec![self.clone()]);
        };

        let mut rest = self.rename_exists_avoiding(&other.names());
        let mut pieces = Vec::new();
        for cut in cuts {
            for outside in cut.negate() {
                let piece = rest.clone().add_constraint(outside);
                if !piece.is_obviously_empty() && !piece.is_rationally_empty() {
                    pieces.push(piece);
                }
            }
            rest = rest.add_constraint(cut);
            if rest.is_rationally_empty() {
                break;
            }
        }
        Ok(pieces)
    }

    fn eliminate_existentials(&self, promote: bool) -> Result<BasicSet> {
        let mut out = self.clone();
        let Some(mut system) = fm::simplify(self.constraints.iter().cloned()) else {
            return Ok(self.simplify());
        };
        let mut exists = self.exists.clone();
        let mut budget = 64 * (exists.len() + 1);

        loop {
            exists.retain(|e| system.iter().any(|c| c.mentions(e)));
            if exists.is_empty() {
                break;
            }
            ensure!(budget > 0, UnsupportedSnafu { reason: "existential elimination did not converge" });
            budget -= 1;

            let next = if let Some(next) = substitute_unit_equality(&system, &mut exists)? {
                next
            } else if let Some(next) = reduce_equality(&system, &exists)? {
                next
            } else if let Some(next) = promote.then(|| promote_strided(&system, &mut exists, &out.dims)).transpose()?.flatten()
            {
                next
            } else if system.iter().any(|c| c.is_eq() && exists.iter().any(|e| c.mentions(e))) {
                return UnsupportedSnafu { reason: "equality with non-unit existential coefficients" }.fail();
            } else {
                exact_fourier_motzkin(&system, &mut exists)?
            };
            match fm::simplify(next) {
                Some(next) => system = next,
                None => return Ok(self.simplify_to_empty()),
            }
            trace!(constraints = system.len(), exists = exists.len(), "existential elimination step");
        }

        out.exists.clear();
        out.constraints = system;
        Ok(out)
    }

    fn simplify_to_empty(&self) -> BasicSet {
        let mut out = self.clone();
        out.exists.clear();
        out.constraints = vec![Constraint::ge_zero(LinExpr::constant(-1))];
        out
    }
}

/// `"{base}'"`, `"{base}'1"`, ... whichever is not yet taken.
fn fresh_name(taken: &BTreeSet<String>, base: &str) -> String {
    let mut candidate = format!("{base}'");
    let mut k = 1;
    while taken.contains(&candidate) {
        candidate = format!("{base}'{k}");
        k += 1;
    }
    candidate
}

fn substitute_all(system: &[Constraint], var: &str, value: &LinExpr) -> Result<Vec<Constraint>> {
    system
        .iter()
        .map(|c| c.substitute(var, value).context(UnsupportedSnafu { reason: "coefficient overflow" }))
        .collect()
}

/// Solves an equality for an existential with coefficient `±1`.
fn substitute_unit_equality(system: &[Constraint], exists: &mut Vec<String>) -> Result<Option<Vec<Constraint>>> {
    let found = system.iter().enumerate().find_map(|(idx, c)| {
        if !c.is_eq() {
            return None;
        }
        exists.iter().find(|e| c.coeff(e).abs() == 1).map(|e| (idx, e.clone()))
    });
    let Some((idx, var)) = found else {
        return Ok(None);
    };
    let eq = &system[idx];
    let c = eq.coeff(&var);
    let mut rest = eq.expr().clone();
    rest.take(&var);
    let value = rest.checked_scale(-c).context(UnsupportedSnafu { reason: "coefficient overflow" })?;
    let others: Vec<Constraint> =
        system.iter().enumerate().filter(|(i, _)| *i != idx).map(|(_, c)| c.clone()).collect();
    exists.retain(|e| *e != var);
    Ok(Some(substitute_all(&others, &var, &value)?))
}

/// Shrinks the existential coefficients of an equality that mentions several
/// existentials by a unimodular change of variables (one Euclid step).
fn reduce_equality(system: &[Constraint], exists: &[String]) -> Result<Option<Vec<Constraint>>> {
    let Some(eq) = system.iter().find(|c| c.is_eq() && exists.iter().filter(|e| c.mentions(e)).count() >= 2) else {
        return Ok(None);
    };
    let Some(pivot) = exists.iter().filter(|e| eq.mentions(e)).min_by_key(|e| eq.coeff(e).abs()) else {
        return Ok(None);
    };
    let a = eq.coeff(pivot);
    // pivot := pivot - sum(q_e * e) with q_e = c_e div a.
    let mut value = LinExpr::var(pivot.as_str());
    for e in exists.iter().filter(|e| *e != pivot && eq.mentions(e)) {
        let q = eq.coeff(e).div_euclid(a);
        value = value
            .checked_add_scaled(&LinExpr::var(e.as_str()), -q)
            .context(UnsupportedSnafu { reason: "coefficient overflow" })?;
    }
    Ok(Some(substitute_all(system, pivot, &value)?))
}

/// For `c*e + d + r == 0` with a single existential `e` and a dimension `d`
/// with unit coefficient: `d` is determined by `e` and vice versa, so `d` is
/// substituted away and `e` takes its place.
fn promote_strided(
    system: &[Constraint],
    exists: &mut Vec<String>,
    dims: &[String],
) -> Result<Option<Vec<Constraint>>> {
    let found = system.iter().enumerate().find_map(|(idx, c)| {
        if !c.is_eq() {
            return None;
        }
        let mut mentioned = exists.iter().filter(|e| c.mentions(e));
        let e = mentioned.next()?;
        if mentioned.next().is_some() {
            return None;
        }
        let d = dims.iter().find(|d| c.coeff(d).abs() == 1)?;
        Some((idx, e.clone(), d.clone()))
    });
    let Some((idx, e, d)) = found else {
        return Ok(None);
    };
    let eq = &system[idx];
    let c = eq.coeff(&d);
    let mut rest = eq.expr().clone();
    rest.take(&d);
    let value = rest.checked_scale(-c).context(UnsupportedSnafu { reason: "coefficient overflow" })?;
    let others: Vec<Constraint> =
        system.iter().enumerate().filter(|(i, _)| *i != idx).map(|(_, c)| c.clone()).collect();
    let substituted = substitute_all(&others, &d, &value)?;
    exists.retain(|x| *x != e);
    Ok(Some(substituted.iter().map(|c| c.rename(&e, &d)).collect()))
}

/// Eliminates one existential from inequalities, provided the shadow is exact.
fn exact_fourier_motzkin(system: &[Constraint], exists: &mut Vec<String>) -> Result<Vec<Constraint>> {
    let mut inexact = Vec::new();
    let candidates = exists
        .iter()
        .map(|e| {
            let lowers = system.iter().filter(|c| c.coeff(e) > 0).count();
            let uppers = system.iter().filter(|c| c.coeff(e) < 0).count();
            (lowers * uppers, e.clone())
        })
        .sorted();
    for (_, var) in candidates {
        let lowers: Vec<&Constraint> = system.iter().filter(|c| c.coeff(&var) > 0).collect();
        let uppers: Vec<&Constraint> = system.iter().filter(|c| c.coeff(&var) < 0).collect();
        if lowers.is_empty() || uppers.is_empty() {
            exists.retain(|e| *e != var);
            return Ok(system.iter().filter(|c| !c.mentions(&var)).cloned().collect());
        }
        let exact = lowers.iter().cartesian_product(&uppers).all(|(lower, upper)| pair_is_exact(lower, upper, &var));
        if !exact {
            inexact.push(var);
            continue;
        }
        let next = fm::eliminate(system, &var).context(UnsupportedSnafu { reason: "coefficient overflow" })?;
        exists.retain(|e| *e != var);
        return Ok(next);
    }
    UnsupportedSnafu { reason: format!("inexact integer projection of {}", inexact.iter().join(", ")) }.fail()
}

/// A bound pair `a*x + l >= 0`, `-b*x + u >= 0` has an integer `x` exactly when
/// its rational shadow holds if either coefficient is 1, or when the shadow is a
/// constant at least `(a-1)(b-1)`.
fn pair_is_exact(lower: &Constraint, upper: &Constraint, var: &str) -> bool {
    let a = lower.coeff(var);
    let b = -upper.coeff(var);
    if a == 1 || b == 1 {
        return true;
    }
    let combined = lower.expr().checked_scale(b).and_then(|l| l.checked_add_scaled(upper.expr(), a));
    match combined {
        Some(shadow) if shadow.is_constant() => {
            let slack = (a - 1).checked_mul(b - 1).unwrap_or(i64::MAX);
            shadow.constant_term() >= slack
        }
        _ => false,
    }
}

impl fmt::Display for BasicSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.params.is_empty() {
            write!(f, "[{}] -> ", self.params.iter().join(", "))?;
        }
        write!(f, "{{ [{}]", self.dims.iter().join(", "))?;
        if self.constraints.is_empty() {
            return write!(f, " }}");
        }
        write!(f, " : ")?;
        if !self.exists.is_empty() {
            write!(f, "exists ({} : ", self.exists.iter().join(", "))?;
        }
        write!(f, "{}", self.constraints.iter().join(" and "))?;
        if !self.exists.is_empty() {
            write!(f, ")")?;
        }
        write!(f, " }}")
    }
}

// ============================================================================
// UNIONS
// ============================================================================

/// A finite union of basic sets over the same dimensions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Set {
    parts: Vec<BasicSet>,
}

impl Set {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn parts(&self) -> &[BasicSet] {
        &self.parts
    }

    pub fn is_empty(&self) -> bool {
        self.parts.iter().all(BasicSet::is_obviously_empty)
    }

    pub fn union(mut self, other: impl Into<Set>) -> Self {
        for part in other.into().parts {
            if !self.parts.contains(&part) {
                self.parts.push(part);
            }
        }
        self
    }

    pub fn remove_divisive_terms(&self) -> Set {
        Self { parts: self.parts.iter().map(BasicSet::remove_divisive_terms).collect() }
    }
}

impl From<BasicSet> for Set {
    fn from(part: BasicSet) -> Self {
        Self { parts: vec![part] }
    }
}

impl FromIterator<BasicSet> for Set {
    fn from_iter<I: IntoIterator<Item = BasicSet>>(iter: I) -> Self {
        iter.into_iter().fold(Set::empty(), Set::union)
    }
}

impl fmt::Display for Set {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.parts.is_empty() {
            return write!(f, "{{ }}");
        }
        write!(f, "{}", self.parts.iter().join(" union "))
    }
}
