//! Access footprints: the distinct cells of each array an instruction list
//! touches, independent of how often.

use std::collections::{BTreeMap, BTreeSet};

use tally_ir::{ArrayDecl, Expr, Instruction, Kernel, MemScope};
use tally_poly::{BasicSet, LinExpr, PwQPoly, Set};

use crate::domain::predicate_alternatives;
use crate::error::*;
use crate::key::Direction;
use crate::policy::CountingPolicy;

/// Footprint per `(variable, direction)`.
pub type Footprints = BTreeMap<(String, Direction), Set>;

struct Gatherer<'k> {
    kernel: &'k Kernel,
    ignore_uncountable: bool,
    out: Footprints,
}

impl Gatherer<'_> {
    fn access(
        &mut self,
        insn: &Instruction,
        array: &ArrayDecl,
        index: &[Expr],
        direction: Direction,
        reductions: &BTreeSet<String>,
    ) -> Result<()> {
        if array.ndim() == 0 || array.scope() == MemScope::Private {
            return Ok(());
        }
        let Some(index) = index.iter().map(Expr::to_lin_expr).collect::<Option<Vec<LinExpr>>>() else {
            if self.ignore_uncountable {
                tracing::warn!(insn.id = insn.id(), variable = array.name(), "non-affine access skipped in footprint");
                return Ok(());
            }
            return NonAffineAccessSnafu { variable: array.name() }.fail();
        };

        let axes: Vec<&String> =
            self.kernel.axes().iter().filter(|a| insn.is_within(a) || reductions.contains(*a)).collect();
        let out_dims: Vec<String> = (0..array.ndim()).map(|d| format!("{}.{d}", array.name())).collect();

        let mut image = Set::empty();
        for conjunction in predicate_alternatives(insn) {
            let restricted: BasicSet = self.kernel.domain().clone().add_constraints(conjunction);
            let part = restricted.project_onto(&axes)?.apply_access(&index, &out_dims)?;
            image = image.union(part);
        }
        let entry = self.out.entry((array.name().to_string(), direction)).or_insert_with(Set::empty);
        *entry = std::mem::replace(entry, Set::empty()).union(image);
        Ok(())
    }

    fn visit(&mut self, insn: &Instruction, expr: &Expr, reductions: &BTreeSet<String>) -> Result<()> {
        match expr {
            Expr::Subscript { array, index } => {
                if let Some(decl) = self.kernel.array(array) {
                    self.access(insn, decl, index, Direction::Load, reductions)?;
                }
            }
            Expr::Reduce { axes, body, .. } => {
                let mut inner = reductions.clone();
                inner.extend(axes.iter().cloned());
                return self.visit(insn, body, &inner);
            }
            _ => {}
        }
        expr.children().into_iter().try_for_each(|child| self.visit(insn, child, reductions))
    }
}

/// Footprint of every array access, keyed by variable and direction.
///
/// Non-affine accesses fail with [`Error::NonAffineAccess`] unless
/// `ignore_uncountable` is set, in which case they are skipped.
pub fn gather(kernel: &Kernel, ignore_uncountable: bool) -> Result<Footprints> {
    let mut gatherer = Gatherer { kernel, ignore_uncountable, out: Footprints::new() };
    let none = BTreeSet::new();
    for insn in kernel.instructions() {
        if let Expr::Subscript { array, index } = insn.assignee()
            && let Some(decl) = kernel.array(array)
        {
            gatherer.access(insn, decl, index, Direction::Store, &none)?;
            for position in index {
                gatherer.visit(insn, position, &none)?;
            }
        }
        gatherer.visit(insn, insn.expression(), &none)?;
    }
    Ok(gatherer.out)
}

/// Number of cells in `footprint`.
pub fn count(footprint: &Set, policy: &CountingPolicy) -> Result<PwQPoly> {
    Ok(policy.cardinality.counter().card_set(footprint)?)
}
