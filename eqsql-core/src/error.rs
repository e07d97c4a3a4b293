//! Crate-wide error taxonomy.
//!
//! Every variant is a terminal failure of the single operation invoked:
//! either a construction-time invariant violation or a precondition violation
//! by the caller. Nothing here is transient and nothing is retried
//! internally.

use crate::types::RelType;

pub type Result<T> = std::result::Result<T, Error>;

/// Relational-type invariant violations, raised eagerly at construction.
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
pub enum TypeError {
    /// Decomposing a scalar (leaf) type into pair components.
    #[error("cannot decompose a scalar type")]
    InvalidType,
    /// Two types that the algebra requires to be structurally equal are not.
    #[error("mismatched types: expected {expected}, found {found}")]
    TypeMismatch { expected: RelType, found: RelType },
}

#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Type(#[from] TypeError),
    /// Deliberately unimplemented algebra cases (`EXCEPT`, a `JOIN` carrying
    /// a non-trivial `ON` predicate).
    #[error("unsupported query construct: {0}")]
    Unsupported(&'static str),
    /// Reconstruction input is not a lambda applied to an output variable.
    #[error("top-level expression must be a lambda applied to an output variable")]
    MalformedTopLevel,
    /// Two selector assignments landed on the same projection path with
    /// different values.
    #[error("conflicting selector assignments at one projection path")]
    InconsistentSelectors,
    /// Reconstruction input is shaped like no expressible query.
    #[error("ill-formed query: {0}")]
    IllFormedQuery(&'static str),
    /// A select branch accumulated an empty `WHERE` conjunction.
    #[error("select branch accumulated no constraints")]
    NoConstraints,
    /// Strict instantiation hit a variable the substitution does not cover.
    #[error("variable `{0}` is not bound by the substitution")]
    UnboundVariable(String),
}
