//! Symbolic counting for the tally cost model.
//!
//! This crate provides closed-form, parameterized counts of integer points in
//! affine sets.
//!
//! # Module Organization
//!
//! - [`rational`] - Exact rational coefficients
//! - [`qpoly`] - Quasi-polynomials over named parameters and floor atoms
//! - [`count`] - Piecewise quasi-polynomial count expressions ([`PwQPoly`])
//! - [`affine`] - Named affine expressions and constraints
//! - [`set`] - Basic sets, unions, projection and existential elimination
//! - [`parse`] - Text notation for sets and constraint lists
//! - [`summation`] - Faulhaber-based symbolic summation
//! - [`card`] - Cardinality counters and mode selection
//! - [`error`] - Error types and result handling

pub mod affine;
pub mod card;
pub mod count;
pub mod error;
mod fm;
pub mod parse;
pub mod qpoly;
pub mod rational;
pub mod set;
pub mod summation;


pub use affine::{Constraint, ConstraintKind, LinExpr};
pub use card::{
    BoundingBoxCounter, Cardinality, CardinalityMode, ExactCounter, FallbackCounter, exact_counting_available,
};
pub use count::{Guard, GuardKind, Piece, PwQPoly, Rounding};
pub use error::{Error, Result};
pub use parse::parse_constraints;
pub use qpoly::{Atom, Monomial, ParamSource, QPoly};
pub use rational::Rational;
pub use set::{BasicSet, Set};
