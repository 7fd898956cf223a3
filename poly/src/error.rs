use snafu::Snafu;

use crate::rational::Rational;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Evaluation needed a parameter the caller did not provide.
    #[snafu(display("no value bound for parameter '{name}'"))]
    UnboundParameter { name: String },

    #[snafu(display("count evaluated to non-integral value {value}"))]
    NonIntegralValue { value: Rational },

    /// Integer overflow while evaluating at concrete parameters.
    #[snafu(display("integer overflow while {during}"))]
    Overflow { during: &'static str },

    #[snafu(display("parse error at offset {position}: {message}"))]
    Parse { position: usize, message: String },

    #[snafu(display("unknown variable '{name}' in constraint"))]
    UnknownVariable { name: String },

    #[snafu(display("dimension '{dim}' has no {side} bound"))]
    Unbounded { dim: String, side: &'static str },

    /// The set lies outside the class the exact counter handles.
    #[snafu(display("exact counting unsupported: {reason}"))]
    Unsupported { reason: String },
}
