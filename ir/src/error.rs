use snafu::Snafu;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Domain or assumption text failed to parse.
    #[snafu(display("invalid domain: {source}"))]
    Domain { source: tally_poly::Error },

    /// Role, `within` set or reduction refers to an axis outside the domain.
    #[snafu(display("unknown axis '{name}'"))]
    UnknownAxis { name: String },

    #[snafu(display("invalid axis role '{text}'"))]
    InvalidRole { text: String },

    /// Subscript of a name with no array declaration.
    #[snafu(display("undeclared array '{name}'"))]
    UndeclaredArray { name: String },

    #[snafu(display("duplicate instruction id '{id}'"))]
    DuplicateInstruction { id: String },

    #[snafu(display("instruction '{id}' depends on unknown instruction '{dependency}'"))]
    UnknownDependency { id: String, dependency: String },
}
