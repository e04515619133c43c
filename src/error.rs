use thiserror::Error;

/// Boundary validation errors. A query with no solutions is not an error;
/// it is reported through `QueryResult` as a single failed solution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("term is missing a type tag")]
    MissingType,

    #[error("unknown term type `{0}`")]
    UnknownType(String),

    #[error("`{0}` term requires a {1} value")]
    InvalidValue(&'static str, &'static str),

    #[error("compound term is missing a functor")]
    MissingFunctor,

    #[error("invalid date `{0}`")]
    InvalidDate(String),

    #[error("predicate must be an atom or a compound term")]
    InvalidPredicate,

    #[error("rule head must be an atom or a compound term")]
    InvalidRuleHead,
}
