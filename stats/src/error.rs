use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("invalid count granularity '{value}': expected workitem, subgroup or workgroup"))]
    InvalidGranularity { value: String },

    /// A variable or subexpression whose scalar type is unknown.
    #[snafu(display("cannot determine the type of '{variable}'"))]
    UnresolvedType { variable: String },

    #[snafu(display("no counting rule for operation '{name}'"))]
    UnclassifiedOperation { name: String },

    #[snafu(display("parameter '{name}' has no value"))]
    UnboundParameter { name: String },

    #[snafu(display("invalid kernel: {source}"))]
    Ir { source: tally_ir::Error },

    #[snafu(display("counting failed: {source}"))]
    Counting { source: tally_poly::Error },

    /// Footprints need affine subscripts.
    #[snafu(display("access to '{variable}' has a non-affine subscript"))]
    NonAffineAccess { variable: String },
}

/// Unbound parameters keep their own variant; everything else is a counting failure.
impl From<tally_poly::Error> for Error {
    fn from(source: tally_poly::Error) -> Self {
        match source {
            tally_poly::Error::UnboundParameter { name } => Error::UnboundParameter { name },
            source => Error::Counting { source },
        }
    }
}
