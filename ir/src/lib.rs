//! Kernel intermediate representation for the tally cost model.
//!
//! A [`Kernel`] is an affine iteration domain over named axes, a set of array
//! declarations and an ordered list of [`Instruction`]s whose right-hand sides
//! are [`Expr`] trees. Axes carry hardware roles ([`AxisRole`]).
//!
//! # Module Organization
//!
//! - [`axis`] - Hardware roles of loop axes
//! - [`expr`] - Expression trees, operator overloading and affine extraction
//! - [`kernel`] - Kernels, arrays, instructions and validation
//! - [`error`] - Error types and result handling

pub mod axis;
pub mod error;
pub mod expr;
pub mod kernel;


pub use axis::AxisRole;
pub use error::{Error, Result};
pub use expr::{CmpOp, Expr, LinearForm, ReduceOp};
pub use kernel::{ArrayDecl, Instruction, Kernel, MemScope};

pub use tally_dtype::DType;
