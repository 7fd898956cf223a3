//! Domain counting over kernel axes.
//!
//! For a single instruction the counted axes are the axes it runs in plus the
//! axes of enclosing reductions. Hardware axes are kept or projected out
//! according to the redundant-work policy and the requested granularity; the
//! remaining points are counted with the configured [`Cardinality`].

use std::collections::BTreeSet;

use itertools::Itertools;
use once_cell::unsync::OnceCell;
use tally_ir::{CmpOp, Expr, Instruction, Kernel};
use tally_poly::{BoundingBoxCounter, Cardinality, Constraint, PwQPoly, Rounding};

use crate::error::*;
use crate::key::CountGranularity;
use crate::policy::CountingPolicy;

/// Disjoint alternatives, each a conjunction of constraints.
pub type Alternatives = Vec<Vec<Constraint>>;

// ============================================================================
// CONDITIONS
// ============================================================================

/// Splits an affine condition into the disjoint alternatives where it holds
/// and where it does not. `None` when the condition is not affine.
pub fn split_condition(condition: &Expr) -> Option<(Alternatives, Alternatives)> {
    match condition {
        Expr::Compare { op, lhs, rhs } => {
            let (l, r) = (lhs.to_lin_expr()?, rhs.to_lin_expr()?);
            let lt = || l.clone().less_than(r.clone());
            let gt = || l.clone().greater_than(r.clone());
            let le = || l.clone().at_most(r.clone());
            let ge = || l.clone().at_least(r.clone());
            let eq = || l.clone().equals(r.clone());
            Some(match op {
                CmpOp::Lt => (vec![vec![lt()]], vec![vec![ge()]]),
                CmpOp::Le => (vec![vec![le()]], vec![vec![gt()]]),
                CmpOp::Gt => (vec![vec![gt()]], vec![vec![le()]]),
                CmpOp::Ge => (vec![vec![ge()]], vec![vec![lt()]]),
                CmpOp::Eq => (vec![vec![eq()]], vec![vec![lt()], vec![gt()]]),
                CmpOp::Ne => (vec![vec![lt()], vec![gt()]], vec![vec![eq()]]),
            })
        }
        Expr::LogicalNot(inner) => split_condition(inner).map(|(yes, no)| (no, yes)),
        Expr::LogicalAnd(items) => {
            let mut parts = items.iter().map(split_condition);
            let first = parts.next()??;
            parts.try_fold(first, |(yes, no), part| {
                let (part_yes, part_no) = part?;
                let mut out_no = no;
                out_no.extend(conjoin(&yes, &part_no));
                Some((conjoin(&yes, &part_yes), out_no))
            })
        }
        Expr::LogicalOr(items) => {
            let mut parts = items.iter().map(split_condition);
            let first = parts.next()??;
            parts.try_fold(first, |(yes, no), part| {
                let (part_yes, part_no) = part?;
                let mut out_yes = yes;
                out_yes.extend(conjoin(&no, &part_yes));
                Some((out_yes, conjoin(&no, &part_no)))
            })
        }
        _ => None,
    }
}

/// Affine predicates of `insn` as alternatives; non-affine predicates are
/// ignored with a warning.
pub fn predicate_alternatives(insn: &Instruction) -> Alternatives {
    let mut out: Alternatives = vec![Vec::new()];
    for predicate in insn.predicates() {
        match split_condition(predicate) {
            Some((holds, _)) => out = conjoin(&out, &holds),
            None => tracing::warn!(insn.id = insn.id(), %predicate, "non-affine predicate not applied to domain"),
        }
    }
    out
}

/// Pairwise conjunction of two sets of alternatives.
pub fn conjoin(lhs: &Alternatives, rhs: &Alternatives) -> Alternatives {
    lhs.iter().cartesian_product(rhs).map(|(a, b)| a.iter().chain(b).cloned().collect()).collect()
}

// ============================================================================
// SCOPE
// ============================================================================

/// Where inside an instruction a counted unit sits: the reductions enclosing it
/// and the branch alternatives leading to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Scope {
    pub reduction_axes: BTreeSet<String>,
    pub conditions: Alternatives,
}

impl Default for Scope {
    fn default() -> Self {
        Self { reduction_axes: BTreeSet::new(), conditions: vec![Vec::new()] }
    }
}

impl Scope {
    pub fn unconditional() -> Self {
        Self::default()
    }

    pub fn with_reduction(&self, axes: &[String]) -> Self {
        let mut out = self.clone();
        out.reduction_axes.extend(axes.iter().cloned());
        out
    }

    pub fn with_condition(&self, alternatives: &Alternatives) -> Self {
        Self { reduction_axes: self.reduction_axes.clone(), conditions: conjoin(&self.conditions, alternatives) }
    }
}

// ============================================================================
// COUNTER
// ============================================================================

pub struct DomainCounter<'k> {
    kernel: &'k Kernel,
    policy: &'k CountingPolicy,
    counter: &'static dyn Cardinality,
    subgroup_size: OnceCell<u32>,
}

impl<'k> DomainCounter<'k> {
    pub fn new(kernel: &'k Kernel, policy: &'k CountingPolicy) -> Self {
        Self { kernel, policy, counter: policy.cardinality.counter(), subgroup_size: OnceCell::new() }
    }

    /// Resolved on first use and then fixed for the whole request.
    pub fn subgroup_size(&self) -> u32 {
        *self.subgroup_size.get_or_init(|| self.policy.subgroup_size.resolve())
    }

    pub fn kernel(&self) -> &'k Kernel {
        self.kernel
    }

    pub fn counter(&self) -> &'static dyn Cardinality {
        self.counter
    }

    /// Axes counted for `insn` at `granularity`, in declaration order.
    fn counted_axes(&self, insn: &Instruction, reduction_axes: &BTreeSet<String>, granularity: CountGranularity) -> Vec<String> {
        let redundant = self.policy.count_redundant_work;
        self.kernel
            .axes()
            .iter()
            .filter(|axis| insn.is_within(axis) || reduction_axes.contains(*axis))
            .filter(|axis| {
                let role = self.kernel.role(axis);
                match (redundant, granularity) {
                    (false, _) => !role.is_hardware_parallel(),
                    (true, CountGranularity::WorkItem) => true,
                    (true, _) => !role.is_local(),
                }
            })
            .cloned()
            .collect()
    }

    /// Number of times a unit in `scope` of `insn` is billed at `granularity`.
    pub fn count(&self, insn: &Instruction, scope: &Scope, granularity: CountGranularity) -> Result<PwQPoly> {
        let axes = self.counted_axes(insn, &scope.reduction_axes, granularity);
        let alternatives = conjoin(&predicate_alternatives(insn), &scope.conditions);

        let mut total = PwQPoly::zero();
        for conjunction in alternatives {
            let restricted = self.kernel.domain().clone().add_constraints(conjunction);
            let projected = restricted.project_onto(&axes)?;
            total += &self.counter.card(&projected)?;
        }

        if self.policy.count_redundant_work {
            total = &total * &self.replication(insn, &scope.reduction_axes, granularity)?;
        }
        Ok(total)
    }

    /// Points of `axes` in the kernel domain.
    pub fn card_onto(&self, axes: &[String]) -> Result<PwQPoly> {
        Ok(self.counter.card(&self.kernel.domain().project_onto(axes)?)?)
    }

    /// Extent of one axis from its bounding box.
    fn extent(&self, axis: &str) -> Result<PwQPoly> {
        Ok(BoundingBoxCounter.card(&self.kernel.domain().project_onto(&[axis])?)?)
    }

    /// Product of the extents of the first axis bound to each local dimension.
    pub fn group_size(&self) -> Result<PwQPoly> {
        let mut seen = BTreeSet::new();
        let mut size = PwQPoly::one();
        for (axis, dim) in self.kernel.local_axes() {
            if seen.insert(dim) {
                size = &size * &self.extent(axis)?;
            }
        }
        Ok(size)
    }

    /// Replicas of hardware dimensions the instruction does not run along.
    fn replication(
        &self,
        insn: &Instruction,
        reduction_axes: &BTreeSet<String>,
        granularity: CountGranularity,
    ) -> Result<PwQPoly> {
        let uses = |axis: &str| insn.is_within(axis) || reduction_axes.contains(axis);
        let mut factor = PwQPoly::one();

        let mut unused_dims = |bound: Vec<(&str, u8)>| -> Result<()> {
            let used: BTreeSet<u8> = bound.iter().filter(|&&(axis, _)| uses(axis)).map(|&(_, dim)| dim).collect();
            let mut seen = BTreeSet::new();
            for (axis, dim) in bound {
                if !used.contains(&dim) && seen.insert(dim) {
                    factor = &factor * &self.extent(axis)?;
                }
            }
            Ok(())
        };
        if granularity == CountGranularity::WorkItem {
            unused_dims(self.kernel.local_axes())?;
        }
        unused_dims(self.kernel.group_axes())?;

        if granularity == CountGranularity::SubGroup {
            // partial subgroups still issue
            let subgroups = self.group_size()?.divide_by_constant(i64::from(self.subgroup_size()), Rounding::Ceil);
            factor = &factor * &subgroups;
        }
        Ok(factor)
    }
}
