//! Static cost model for data-parallel loop kernels.
//!
//! Counts arithmetic operations, memory transactions and synchronization
//! events of a [`tally_ir::Kernel`] as symbolic functions of its parameters,
//! and computes per-array access footprints.
//!
//! ```
//! use tally_dtype::DType;
//! use tally_ir::{ArrayDecl, Expr, Instruction, Kernel};
//! use tally_stats::{CountGranularity, CountingPolicy, Op, OpName, get_op_map};
//!
//! let i = Expr::var("i");
//! let kernel = Kernel::builder()
//!     .name("axpy")
//!     .domain("[n] -> { [i] : 0 <= i < n }")
//!     .arrays(vec![
//!         ArrayDecl::global("x", DType::Float32, ["n"]),
//!         ArrayDecl::global("y", DType::Float32, ["n"]),
//!     ])
//!     .instructions(vec![Instruction::new(
//!         "axpy",
//!         Expr::subscript("y", [i.clone()]),
//!         Expr::subscript("x", [i.clone()]) * 2.0 + Expr::subscript("y", [i]),
//!     )])
//!     .build()
//!     .unwrap();
//!
//! let ops = get_op_map(&kernel, &CountingPolicy::default()).unwrap();
//! let mul = Op::new(DType::Float32, OpName::Mul, CountGranularity::WorkItem);
//! assert_eq!(ops[&mul].eval(&[("n", 100)]).unwrap(), 100);
//! ```
//!
//! # Module Organization
//!
//! - [`key`] - Classification keys and granularities
//! - [`count_map`] - Count maps, filtering and grouping
//! - [`policy`] - Counting policy and its environment fallbacks
//! - [`domain`] - Domain counting per instruction and scope
//! - [`types`] - Expression result types
//! - [`walker`] - Operation and memory access classification
//! - [`strides`] - Local and group strides of accesses
//! - [`footprint`] - Access footprints
//! - [`sync`] - Barrier placement and counting
//! - [`error`] - Error types and result handling

use std::collections::BTreeMap;

use snafu::OptionExt;
use tally_ir::Kernel;
use tally_poly::{PwQPoly, Set};

pub mod count_map;
pub mod domain;
pub mod error;
pub mod footprint;
pub mod key;
pub mod policy;
pub mod strides;
pub mod sync;
pub mod types;
pub mod walker;

#[cfg(test)]
pub mod test;

pub use count_map::{CountMap, Filter};
pub use error::{Error, Result};
pub use footprint::Footprints;
pub use key::{CountGranularity, CountKey, Direction, FieldValue, MemAccess, MemoryType, Op, OpName, StrideMap, SyncKind};
pub use policy::{CountingPolicy, DEFAULT_SUBGROUP_SIZE, SubgroupSize};

use crate::domain::DomainCounter;
use crate::error::UnresolvedTypeSnafu;

/// Arithmetic operations, keyed by result type, operation and granularity.
#[tracing::instrument(skip_all, fields(kernel = %kernel.name()))]
pub fn get_op_map(kernel: &Kernel, policy: &CountingPolicy) -> Result<CountMap<Op>> {
    walker::count_ops(kernel, policy)
}

/// Global and local memory transactions.
#[tracing::instrument(skip_all, fields(kernel = %kernel.name()))]
pub fn get_mem_access_map(kernel: &Kernel, policy: &CountingPolicy) -> Result<CountMap<MemAccess>> {
    walker::count_mem_accesses(kernel, policy)
}

/// Kernel launches and barriers. Events that never happen have no entry.
#[tracing::instrument(skip_all, fields(kernel = %kernel.name()))]
pub fn get_synchronization_map(kernel: &Kernel, policy: &CountingPolicy) -> Result<CountMap<SyncKind>> {
    sync::count_sync(kernel, DomainCounter::new(kernel, policy))
}

/// Distinct cells touched per `(variable, direction)`.
#[tracing::instrument(skip_all, fields(kernel = %kernel.name()))]
pub fn gather_access_footprints(kernel: &Kernel, ignore_uncountable: bool) -> Result<Footprints> {
    footprint::gather(kernel, ignore_uncountable)
}

/// Cardinality of a footprint.
pub fn count_footprint(footprint: &Set, policy: &CountingPolicy) -> Result<PwQPoly> {
    footprint::count(footprint, policy)
}

/// Footprint sizes in bytes per `(variable, direction)`.
#[tracing::instrument(skip_all, fields(kernel = %kernel.name()))]
pub fn gather_access_footprint_bytes(
    kernel: &Kernel,
    policy: &CountingPolicy,
    ignore_uncountable: bool,
) -> Result<BTreeMap<(String, Direction), PwQPoly>> {
    let footprints = footprint::gather(kernel, ignore_uncountable)?;
    let mut out = BTreeMap::new();
    for ((variable, direction), cells) in footprints {
        let dtype = kernel.array(&variable).map(|a| a.dtype()).context(UnresolvedTypeSnafu { variable: &variable })?;
        let bytes = footprint::count(&cells, policy)?.scale(dtype.bytes() as i64);
        out.insert((variable, direction), bytes);
    }
    Ok(out)
}
