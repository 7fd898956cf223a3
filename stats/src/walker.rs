//! Expression walkers classifying operations and memory accesses.
//!
//! Each instruction is walked once. Every classified unit is recorded against
//! the [`Scope`] it occurs in and its billing granularity; the units of one
//! scope share a single domain count, which is computed once and scaled by the
//! unit multiplicities.

use std::collections::BTreeMap;

use snafu::OptionExt;
use tally_dtype::DType;
use tally_ir::{ArrayDecl, Expr, Instruction, Kernel, MemScope, ReduceOp};

use crate::count_map::CountMap;
use crate::domain::{DomainCounter, Scope, split_condition};
use crate::error::*;
use crate::key::{CountGranularity, CountKey, Direction, MemAccess, MemoryType, Op, OpName};
use crate::policy::CountingPolicy;
use crate::strides::access_strides;
use crate::types::{TypeOracle, ensure_builtin};

// ============================================================================
// UNITS
// ============================================================================

/// Unit multiplicities of one instruction, grouped by scope and granularity.
#[derive(Debug)]
struct Units<K: CountKey> {
    groups: BTreeMap<(Scope, CountGranularity), BTreeMap<K, i64>>,
}

impl<K: CountKey> Default for Units<K> {
    fn default() -> Self {
        Self { groups: BTreeMap::new() }
    }
}

impl<K: CountKey> Units<K> {
    fn add(&mut self, scope: &Scope, granularity: CountGranularity, key: K, times: i64) {
        if times == 0 {
            return;
        }
        *self.groups.entry((scope.clone(), granularity)).or_default().entry(key).or_default() += times;
    }

    fn finish(self, insn: &Instruction, domain: &DomainCounter<'_>, out: &mut CountMap<K>) -> Result<()> {
        for ((scope, granularity), keys) in self.groups {
            let count = domain.count(insn, &scope, granularity)?;
            tracing::debug!(
                insn.id = insn.id(),
                %granularity,
                reductions = scope.reduction_axes.len(),
                branches = scope.conditions.len(),
                entries = keys.len(),
                %count,
                "counted scope"
            );
            for (key, times) in keys {
                out.accumulate(key, &count.scale(times));
            }
        }
        Ok(())
    }
}

/// How an `if` expression's branches are scoped.
fn branch_scopes(condition: &Expr, scope: &Scope, redundant: bool) -> (Scope, Scope) {
    if redundant {
        return (scope.clone(), scope.clone());
    }
    match split_condition(condition) {
        Some((holds, fails)) => (scope.with_condition(&holds), scope.with_condition(&fails)),
        None => {
            tracing::warn!(%condition, "non-affine condition, counting both branches");
            (scope.clone(), scope.clone())
        }
    }
}

fn reduce_op_name(op: ReduceOp) -> OpName {
    match op {
        ReduceOp::Sum => OpName::Add,
        ReduceOp::Product => OpName::Mul,
        ReduceOp::Max | ReduceOp::Min => OpName::MaxMin,
    }
}

fn is_minus_one(expr: &Expr) -> bool {
    match expr {
        Expr::Int(v) => *v == -1,
        Expr::Float(v) => *v == -1.0,
        _ => false,
    }
}

// ============================================================================
// OPERATIONS
// ============================================================================

struct OpWalker<'k> {
    oracle: TypeOracle<'k>,
    policy: &'k CountingPolicy,
    units: Units<Op>,
}

impl OpWalker<'_> {
    fn unit(&mut self, scope: &Scope, name: OpName, dtype: DType, times: usize) {
        let granularity = self.policy.op_granularity;
        self.units.add(scope, granularity, Op::new(dtype, name, granularity), times as i64);
    }

    fn visit_all<'e>(&mut self, items: impl IntoIterator<Item = &'e Expr>, scope: &Scope) -> Result<()> {
        items.into_iter().try_for_each(|e| self.visit(e, scope))
    }

    fn visit(&mut self, expr: &Expr, scope: &Scope) -> Result<()> {
        let binary = match expr {
            Expr::Int(_) | Expr::Float(_) | Expr::Var(_) => return Ok(()),
            Expr::Subscript { index, .. } => {
                if self.policy.count_within_subscripts {
                    self.visit_all(index, scope)?;
                }
                return Ok(());
            }
            Expr::Product(items) => {
                let factors: Vec<&Expr> = items.iter().filter(|e| !is_minus_one(e)).collect();
                let dtype = self.oracle.dtype(expr)?;
                self.unit(scope, OpName::Mul, dtype, factors.len().saturating_sub(1));
                return self.visit_all(factors, scope);
            }
            Expr::Call { function, args } => {
                ensure_builtin(function)?;
                let dtype = self.oracle.dtype(expr)?;
                self.unit(scope, OpName::Func(function.clone()), dtype, 1);
                return self.visit_all(args, scope);
            }
            Expr::If { condition, then, otherwise } => {
                self.visit(condition, scope)?;
                let (then_scope, otherwise_scope) =
                    branch_scopes(condition, scope, self.policy.count_redundant_work);
                self.visit(then, &then_scope)?;
                return self.visit(otherwise, &otherwise_scope);
            }
            Expr::Reduce { op, axes, body } => {
                let inner = scope.with_reduction(axes);
                let dtype = self.oracle.dtype(expr)?;
                self.unit(&inner, reduce_op_name(*op), dtype, 1);
                return self.visit(body, &inner);
            }
            Expr::Compare { .. } | Expr::LogicalNot(_) | Expr::LogicalAnd(_) | Expr::LogicalOr(_) => None,
            Expr::Sum(items) => Some((OpName::Add, items.len().saturating_sub(1))),
            Expr::BitAnd(items) | Expr::BitOr(items) | Expr::BitXor(items) => Some((OpName::Bitwise, items.len().saturating_sub(1))),
            Expr::Min(items) | Expr::Max(items) => Some((OpName::MaxMin, items.len().saturating_sub(1))),
            Expr::Difference(..) => Some((OpName::Sub, 1)),
            Expr::Quotient(..) | Expr::FloorDiv(..) | Expr::Remainder(..) => Some((OpName::Div, 1)),
            Expr::Power(..) => Some((OpName::Pow, 1)),
            Expr::LeftShift(..) | Expr::RightShift(..) => Some((OpName::Shift, 1)),
            Expr::BitNot(_) => Some((OpName::Bitwise, 1)),
        };
        if let Some((name, times)) = binary {
            let dtype = self.oracle.dtype(expr)?;
            self.unit(scope, name, dtype, times);
        }
        self.visit_all(expr.children(), scope)
    }
}

/// Arithmetic operation counts of every instruction.
pub fn count_ops(kernel: &Kernel, policy: &CountingPolicy) -> Result<CountMap<Op>> {
    let domain = DomainCounter::new(kernel, policy);
    let mut out = CountMap::new();
    for insn in kernel.instructions() {
        let mut walker = OpWalker { oracle: TypeOracle::new(kernel), policy, units: Units::default() };
        let scope = Scope::unconditional();
        if let Expr::Subscript { index, .. } = insn.assignee()
            && policy.count_within_subscripts
        {
            walker.visit_all(index, &scope)?;
        }
        walker.visit(insn.expression(), &scope)?;
        walker.units.finish(insn, &domain, &mut out)?;
    }
    Ok(out)
}

// ============================================================================
// MEMORY
// ============================================================================

struct MemWalker<'k> {
    kernel: &'k Kernel,
    insn: &'k Instruction,
    policy: &'k CountingPolicy,
    units: Units<MemAccess>,
}

impl MemWalker<'_> {
    fn access(&mut self, array: &ArrayDecl, index: &[Expr], direction: Direction, scope: &Scope) {
        let mtype = match array.scope() {
            MemScope::Global => MemoryType::Global,
            MemScope::Local => MemoryType::Local,
            MemScope::Private => return,
        };
        let strides = access_strides(self.kernel, self.insn, array, index);
        let granularity = match mtype {
            MemoryType::Local => CountGranularity::WorkItem,
            MemoryType::Global if strides.is_uniform() => CountGranularity::SubGroup,
            MemoryType::Global if strides.is_consecutive() => self.policy.coalesced_granularity,
            MemoryType::Global => CountGranularity::WorkItem,
        };
        let key = MemAccess {
            mtype: Some(mtype),
            dtype: Some(array.dtype()),
            direction: Some(direction),
            variable: Some(array.name().to_string()),
            lid_strides: Some(strides.lid),
            gid_strides: Some(strides.gid),
            granularity: Some(granularity),
        };
        self.units.add(scope, granularity, key, 1);
    }

    /// A zero-dimensional global referenced by name.
    fn scalar(&mut self, name: &str, direction: Direction, scope: &Scope) {
        let Some(array) = self.kernel.array(name) else { return };
        if !array.is_scalar() || array.scope() != MemScope::Global {
            return;
        }
        let key = MemAccess {
            mtype: Some(MemoryType::Global),
            dtype: Some(array.dtype()),
            direction: Some(direction),
            variable: Some(name.to_string()),
            lid_strides: Some(Default::default()),
            gid_strides: Some(Default::default()),
            granularity: Some(CountGranularity::WorkItem),
        };
        self.units.add(scope, CountGranularity::WorkItem, key, 1);
    }

    fn visit(&mut self, expr: &Expr, scope: &Scope) -> Result<()> {
        match expr {
            Expr::Subscript { array, index } => {
                let decl = self.kernel.array(array).context(UnresolvedTypeSnafu { variable: array.as_str() })?;
                self.access(decl, index, Direction::Load, scope);
            }
            Expr::Var(name) => self.scalar(name, Direction::Load, scope),
            Expr::If { condition, then, otherwise } => {
                self.visit(condition, scope)?;
                let (then_scope, otherwise_scope) =
                    branch_scopes(condition, scope, self.policy.count_redundant_work);
                self.visit(then, &then_scope)?;
                return self.visit(otherwise, &otherwise_scope);
            }
            Expr::Reduce { axes, body, .. } => return self.visit(body, &scope.with_reduction(axes)),
            _ => {}
        }
        expr.children().into_iter().try_for_each(|child| self.visit(child, scope))
    }
}

/// Global and local memory transactions of every instruction.
pub fn count_mem_accesses(kernel: &Kernel, policy: &CountingPolicy) -> Result<CountMap<MemAccess>> {
    let domain = DomainCounter::new(kernel, policy);
    let mut out = CountMap::new();
    for insn in kernel.instructions() {
        let mut walker = MemWalker { kernel, insn, policy, units: Units::default() };
        let scope = Scope::unconditional();
        match insn.assignee() {
            Expr::Subscript { array, index } => {
                let decl = kernel.array(array).context(UnresolvedTypeSnafu { variable: array.as_str() })?;
                walker.access(decl, index, Direction::Store, &scope);
                for position in index {
                    walker.visit(position, &scope)?;
                }
            }
            Expr::Var(name) => walker.scalar(name, Direction::Store, &scope),
            _ => {}
        }
        walker.visit(insn.expression(), &scope)?;
        walker.units.finish(insn, &domain, &mut out)?;
    }
    Ok(out)
}
