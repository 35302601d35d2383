//! Compiler Error Types
//!
//! Four layers, innermost first:
//!
//! - [`ResolveError`]: a name in an expression fragment could not be bound
//! - [`QueryError`]: a relational operator rejected its arguments
//! - [`CompileError`]: program-level failure, including query errors rewrapped
//!   with the view or command they came from
//! - [`InvariantViolation`]: a condition that upstream structure should make
//!   impossible; these pass through every layer unwrapped

use thiserror::Error;

use crate::storage::StorageError;

/// A broken internal invariant (the Rust rendition of an assertion)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("internal invariant violated: {0}")]
pub struct InvariantViolation(pub String);

impl InvariantViolation {
    pub fn new(message: impl Into<String>) -> Self {
        InvariantViolation(message.into())
    }
}

/// Identifier resolution errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Bare identifier not in scope and not an import
    #[error("Unknown name: {0}")]
    UnknownName(String),

    /// `relation.column` not found in any visible relation
    #[error("Unknown reference: {0}")]
    UnknownReference(String),

    /// Name maps to columns from more than one relation
    #[error("Ambiguous reference: {0}")]
    Ambiguous(String),

    /// Expression fragment failed to parse
    #[error("Invalid expression '{fragment}': {message}")]
    Malformed { fragment: String, message: String },
}

/// Operator-level errors raised while evaluating a query
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("Unknown query command: {0}")]
    UnknownOperator(String),

    #[error("from() must be the first clause in a query")]
    FromNotFirst,

    #[error("Relation '{0}' is already in scope; give it an alias")]
    DuplicateRelation(String),

    #[error("join: No common columns in {relation} ('{right}' vs. '{left}')")]
    NoCommonColumns {
        relation: String,
        right: String,
        left: String,
    },

    #[error("destroy: must specify at least one source table name")]
    DestroyWithoutTables,

    #[error("destroy: no rows in specified tables: {}", .0.join(","))]
    DestroyNoRows(Vec<String>),

    #[error("Missing names for '{summary}': {missing}")]
    MissingNames { summary: String, missing: String },

    #[error("No columns in {0}")]
    NoColumns(String),

    #[error("Can't set: {0}")]
    CannotSet(String),

    #[error("Can't alias *")]
    AliasedStar,

    #[error("steps after {0}() are not supported")]
    StepsAfterGroup(&'static str),

    #[error("{operator} expects {expected} argument(s), got {got}")]
    Arity {
        operator: &'static str,
        expected: usize,
        got: usize,
    },

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}

/// Program-level compiler errors
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Duplicate definition of {0}")]
    DuplicateDeclaration(String),

    #[error("Scalar {0} is a vector; this is unsupported")]
    VectorScalar(String),

    #[error("syntax error: alias {alias} given for index on {ident}")]
    IndexAlias { alias: String, ident: String },

    #[error("Unknown metadata on table '{table}': {func}")]
    UnknownMeta { table: String, func: String },

    #[error("while evaluating {name}: {source}")]
    InDeclaration {
        name: String,
        #[source]
        source: QueryError,
    },

    #[error("Seed data error: {0}")]
    SeedData(#[from] StorageError),

    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}

impl CompileError {
    /// Wrap a query error with the view or command it was raised in.
    ///
    /// Invariant violations are not user errors and pass through unwrapped.
    pub fn in_declaration(name: &str, error: QueryError) -> Self {
        match error {
            QueryError::Invariant(violation) => CompileError::Invariant(violation),
            source => CompileError::InDeclaration {
                name: name.to_string(),
                source,
            },
        }
    }

    /// True for internal defects rather than problems in the program
    pub fn is_internal(&self) -> bool {
        matches!(self, CompileError::Invariant(_))
    }
}

/// Result type for query evaluation
pub type QueryResult<T> = Result<T, QueryError>;

/// Result type for whole-program compilation
pub type CompileResult<T> = Result<T, CompileError>;
