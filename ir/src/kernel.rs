//! Kernels: an iteration domain, array declarations and instructions.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use bon::bon;
use itertools::Itertools;
use smallvec::SmallVec;
use snafu::{ResultExt, ensure};
use tally_dtype::DType;
use tally_poly::{BasicSet, QPoly, parse_constraints};

use crate::axis::AxisRole;
use crate::error::*;
use crate::expr::Expr;

/// Address space of an array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::Display, strum::EnumString, strum::IntoStaticStr, strum::EnumIter)]
#[strum(serialize_all = "lowercase")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MemScope {
    Global,
    /// Shared by the work-items of one workgroup.
    Local,
    Private,
}

// ============================================================================
// ARRAYS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayDecl {
    name: String,
    dtype: DType,
    shape: SmallVec<[QPoly; 4]>,
    scope: MemScope,
    temporary: bool,
}

impl ArrayDecl {
    fn new<E: Into<QPoly>>(
        name: impl Into<String>,
        dtype: DType,
        shape: impl IntoIterator<Item = E>,
        scope: MemScope,
    ) -> Self {
        Self {
            name: name.into(),
            dtype,
            shape: shape.into_iter().map(Into::into).collect(),
            scope,
            temporary: scope != MemScope::Global,
        }
    }

    /// Kernel argument in global memory.
    pub fn global<E: Into<QPoly>>(name: impl Into<String>, dtype: DType, shape: impl IntoIterator<Item = E>) -> Self {
        Self::new(name, dtype, shape, MemScope::Global)
    }

    /// Zero-dimensional global argument, referenced as a plain variable.
    pub fn scalar(name: impl Into<String>, dtype: DType) -> Self {
        Self::new(name, dtype, std::iter::empty::<QPoly>(), MemScope::Global)
    }

    pub fn local<E: Into<QPoly>>(name: impl Into<String>, dtype: DType, shape: impl IntoIterator<Item = E>) -> Self {
        Self::new(name, dtype, shape, MemScope::Local)
    }

    pub fn private<E: Into<QPoly>>(name: impl Into<String>, dtype: DType, shape: impl IntoIterator<Item = E>) -> Self {
        Self::new(name, dtype, shape, MemScope::Private)
    }

    /// Marks the array as kernel-owned scratch space.
    pub fn temporary(mut self) -> Self {
        self.temporary = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[QPoly] {
        &self.shape
    }

    pub fn scope(&self) -> MemScope {
        self.scope
    }

    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn is_scalar(&self) -> bool {
        self.shape.is_empty()
    }

    /// Element strides of a C-ordered layout; the last dimension has stride 1.
    pub fn row_major_strides(&self) -> SmallVec<[QPoly; 4]> {
        let mut strides: SmallVec<[QPoly; 4]> = SmallVec::with_capacity(self.shape.len());
        let mut acc = QPoly::one();
        for extent in self.shape.iter().rev() {
            strides.push(acc.clone());
            acc = &acc * extent;
        }
        strides.reverse();
        strides
    }
}

// ============================================================================
// INSTRUCTIONS
// ============================================================================

/// `assignee = expression`, executed once per point of its `within` axes.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    id: String,
    assignee: Expr,
    expression: Expr,
    within: Option<BTreeSet<String>>,
    predicates: Vec<Expr>,
    depends_on: BTreeSet<String>,
}

impl Instruction {
    pub fn new(id: impl Into<String>, assignee: impl Into<Expr>, expression: impl Into<Expr>) -> Self {
        Self {
            id: id.into(),
            assignee: assignee.into(),
            expression: expression.into(),
            within: None,
            predicates: Vec::new(),
            depends_on: BTreeSet::new(),
        }
    }

    /// Enclosing axes. When not given, the axes the instruction references
    /// outside reductions are used.
    pub fn within<S: Into<String>>(mut self, axes: impl IntoIterator<Item = S>) -> Self {
        self.within = Some(axes.into_iter().map(Into::into).collect());
        self
    }

    pub fn depends_on<S: Into<String>>(mut self, ids: impl IntoIterator<Item = S>) -> Self {
        self.depends_on.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Guard under which the instruction executes.
    pub fn predicate(mut self, condition: Expr) -> Self {
        self.predicates.push(condition);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn assignee(&self) -> &Expr {
        &self.assignee
    }

    pub fn expression(&self) -> &Expr {
        &self.expression
    }

    pub fn predicates(&self) -> &[Expr] {
        &self.predicates
    }

    pub fn dependencies(&self) -> impl Iterator<Item = &str> {
        self.depends_on.iter().map(String::as_str)
    }

    pub fn within_axes(&self) -> impl Iterator<Item = &str> {
        self.within.iter().flatten().map(String::as_str)
    }

    pub fn is_within(&self, axis: &str) -> bool {
        self.within.as_ref().is_some_and(|axes| axes.contains(axis))
    }

    /// Name written by the instruction.
    pub fn assignee_name(&self) -> Option<&str> {
        match &self.assignee {
            Expr::Var(name) | Expr::Subscript { array: name, .. } => Some(name),
            _ => None,
        }
    }

    /// Arrays and variables read by the expression and predicates, plus those
    /// read inside the assignee's subscript.
    pub fn read_names(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        let mut visit = |e: &Expr| match e {
            Expr::Subscript { array, .. } => {
                out.insert(array.clone());
            }
            Expr::Var(name) => {
                out.insert(name.clone());
            }
            _ => {}
        };
        self.expression.walk(&mut visit);
        self.predicates.iter().for_each(|p| p.walk(&mut visit));
        if let Expr::Subscript { index, .. } = &self.assignee {
            index.iter().for_each(|e| e.walk(&mut visit));
        }
        out
    }

    fn referenced_axes(&self, axes: &[String]) -> BTreeSet<String> {
        let mut names = self.assignee.free_variables();
        names.extend(self.expression.free_variables());
        for predicate in &self.predicates {
            names.extend(predicate.free_variables());
        }
        names.retain(|name| axes.contains(name));
        names
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.assignee, self.expression)?;
        write!(f, "  {{id={}", self.id)?;
        if let Some(within) = &self.within {
            write!(f, ", within={}", within.iter().join(","))?;
        }
        if !self.depends_on.is_empty() {
            write!(f, ", dep={}", self.depends_on.iter().join(":"))?;
        }
        if !self.predicates.is_empty() {
            write!(f, ", if={}", self.predicates.iter().join(" and "))?;
        }
        write!(f, "}}")
    }
}

// ============================================================================
// KERNEL
// ============================================================================

/// A finished, schedulable kernel.
///
/// ```
/// use tally_dtype::DType;
/// use tally_ir::{ArrayDecl, Expr, Instruction, Kernel};
///
/// let i = Expr::var("i");
/// let kernel = Kernel::builder()
///     .name("scale")
///     .domain("[n] -> { [i] : 0 <= i < n }")
///     .arrays(vec![
///         ArrayDecl::global("a", DType::Float32, ["n"]),
///         ArrayDecl::global("b", DType::Float32, ["n"]),
///     ])
///     .instructions(vec![Instruction::new("scale", Expr::subscript("b", [i.clone()]), Expr::subscript("a", [i]) * 2.0)])
///     .build()
///     .unwrap()
///     .tag("i", "local:0")
///     .unwrap();
/// assert!(kernel.role("i").is_local());
/// ```
#[derive(Debug, Clone)]
pub struct Kernel {
    name: String,
    domain: BasicSet,
    arrays: BTreeMap<String, ArrayDecl>,
    scalars: BTreeMap<String, DType>,
    instructions: Vec<Instruction>,
    roles: BTreeMap<String, AxisRole>,
}

#[bon]
impl Kernel {
    /// Parses the domain and assumptions and validates every name.
    #[builder]
    pub fn new(
        #[builder(into)] name: String,
        // Set notation, e.g. `[n] -> { [i] : 0 <= i < n }`.
        #[builder(into)]
        domain: String,
        // Constraints on parameters, e.g. `n, m >= 1`.
        #[builder(into, default)]
        assumptions: String,
        #[builder(default)] arrays: Vec<ArrayDecl>,
        // Value arguments and scalar temporaries.
        #[builder(default)]
        scalars: BTreeMap<String, DType>,
        instructions: Vec<Instruction>,
        #[builder(default)] roles: BTreeMap<String, AxisRole>,
    ) -> Result<Self> {
        let domain = BasicSet::parse(&domain).context(DomainSnafu)?;
        let assumptions = parse_constraints(&assumptions).context(DomainSnafu)?;
        let domain = domain.add_constraints(assumptions);

        let arrays: BTreeMap<_, _> = arrays.into_iter().map(|a| (a.name.clone(), a)).collect();
        let mut kernel = Self { name, domain, arrays, scalars, instructions: Vec::new(), roles: BTreeMap::new() };

        for (axis, role) in roles {
            kernel = kernel.with_role(&axis, role)?;
        }

        let mut seen = BTreeSet::new();
        for mut insn in instructions {
            ensure!(seen.insert(insn.id.clone()), DuplicateInstructionSnafu { id: insn.id.clone() });
            kernel.check_names(&insn)?;
            let within = match insn.within.take() {
                Some(within) => {
                    for axis in &within {
                        kernel.check_axis(axis)?;
                    }
                    within
                }
                None => insn.referenced_axes(kernel.axes()),
            };
            insn.within = Some(within);
            kernel.instructions.push(insn);
        }
        for insn in &kernel.instructions {
            for dependency in &insn.depends_on {
                ensure!(
                    seen.contains(dependency),
                    UnknownDependencySnafu { id: insn.id.clone(), dependency: dependency.clone() }
                );
            }
        }

        tracing::debug!(
            kernel = %kernel.name,
            axes = kernel.axes().len(),
            instructions = kernel.instructions.len(),
            "kernel built"
        );
        Ok(kernel)
    }
}

impl Kernel {
    fn check_axis(&self, axis: &str) -> Result<()> {
        ensure!(self.domain.has_dim(axis), UnknownAxisSnafu { name: axis });
        Ok(())
    }

    fn check_names(&self, insn: &Instruction) -> Result<()> {
        let mut result = Ok(());
        let mut visit = |e: &Expr| {
            if result.is_err() {
                return;
            }
            match e {
                Expr::Subscript { array, .. } if !self.arrays.contains_key(array) => {
                    result = UndeclaredArraySnafu { name: array.clone() }.fail();
                }
                Expr::Reduce { axes, .. } => {
                    if let Some(axis) = axes.iter().find(|a| !self.domain.has_dim(a)) {
                        result = UnknownAxisSnafu { name: axis.clone() }.fail();
                    }
                }
                _ => {}
            }
        };
        insn.assignee.walk(&mut visit);
        insn.expression.walk(&mut visit);
        insn.predicates.iter().for_each(|p| p.walk(&mut visit));
        result
    }

    /// Assigns a hardware role to an axis, replacing any previous one.
    pub fn with_role(mut self, axis: &str, role: AxisRole) -> Result<Self> {
        self.check_axis(axis)?;
        self.roles.insert(axis.to_string(), role);
        Ok(self)
    }

    /// [`Kernel::with_role`] with a textual role such as `"local:0"` or `"g.1"`.
    pub fn tag(self, axis: &str, role: &str) -> Result<Self> {
        let role = role.parse()?;
        self.with_role(axis, role)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn domain(&self) -> &BasicSet {
        &self.domain
    }

    /// Axes in declaration order.
    pub fn axes(&self) -> &[String] {
        self.domain.dims()
    }

    pub fn params(&self) -> &BTreeSet<String> {
        self.domain.params()
    }

    pub fn role(&self, axis: &str) -> AxisRole {
        self.roles.get(axis).copied().unwrap_or_default()
    }

    /// `(axis, hardware dimension)` for every local axis, in declaration order.
    pub fn local_axes(&self) -> Vec<(&str, u8)> {
        self.axes().iter().filter_map(|a| Some((a.as_str(), self.role(a).local_dim()?))).collect()
    }

    /// `(axis, hardware dimension)` for every group axis, in declaration order.
    pub fn group_axes(&self) -> Vec<(&str, u8)> {
        self.axes().iter().filter_map(|a| Some((a.as_str(), self.role(a).group_dim()?))).collect()
    }

    pub fn arrays(&self) -> impl Iterator<Item = &ArrayDecl> {
        self.arrays.values()
    }

    pub fn array(&self, name: &str) -> Option<&ArrayDecl> {
        self.arrays.get(name)
    }

    pub fn scalar_dtype(&self, name: &str) -> Option<DType> {
        self.scalars.get(name).copied()
    }

    /// Type of loop axes and domain parameters used as values.
    pub fn index_dtype(&self) -> DType {
        DType::Int32
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn instruction(&self, id: &str) -> Option<&Instruction> {
        self.instructions.iter().find(|insn| insn.id == id)
    }

    /// Every instruction `id` depends on, directly or not.
    pub fn transitive_dependencies(&self, id: &str) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        let mut stack = vec![id.to_string()];
        while let Some(current) = stack.pop() {
            let Some(insn) = self.instruction(&current) else { continue };
            for dependency in &insn.depends_on {
                if out.insert(dependency.clone()) {
                    stack.push(dependency.clone());
                }
            }
        }
        out
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "kernel {}", self.name)?;
        writeln!(f, "  domain: {}", self.domain)?;
        for array in self.arrays.values() {
            let shape = array.shape.iter().join(", ");
            writeln!(f, "  {} {}: {}[{shape}]", array.scope, array.name, array.dtype.short_name())?;
        }
        for (axis, role) in &self.roles {
            writeln!(f, "  {axis}: {role}")?;
        }
        for insn in &self.instructions {
            writeln!(f, "  {insn}")?;
        }
        Ok(())
    }
}
