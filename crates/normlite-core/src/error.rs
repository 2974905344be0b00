//! The error taxonomy shared by every component of the execution core.
//!
//! Every failure surfaced by this crate is a variant of [`NormliteError`].
//! Nothing downstream of the SQL front end discards error detail by
//! converting to a string early; callers match on the variant.

use normlite_sql::SyntaxError;
use std::fmt;

pub type NormliteResult<T> = Result<T, NormliteError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum NormliteError {
    /// Lex/parse failure, forwarded unchanged from `normlite-sql`.
    #[error("syntax error: {0}")]
    Syntax(#[from] SyntaxError),

    /// DBAPI contract violated: missing payload keys, operation on a closed
    /// cursor, an unsupported type at bind time, `paramstyle` misuse.
    #[error("interface error: {reason}")]
    Interface { reason: String },

    /// An invariant the implementation itself is supposed to guarantee was
    /// violated, or a remote response had an unexpected shape.
    #[error("internal error: {reason}")]
    Internal { reason: String },

    /// General failure surfaced by the Notion client.
    #[error("database error: {reason}")]
    Database { reason: String },

    /// Transient failure while staging or committing an operation.
    #[error("operational error: {reason}")]
    Operational { reason: String },

    /// `commit`/`rollback` invoked on a transaction in the wrong state.
    #[error("transaction error: {reason}")]
    Transaction { reason: String },

    /// A lock could not be granted immediately.
    #[error("could not acquire {mode:?} lock on {resource}: held by {conflicting_holders:?}")]
    AcquireLockFailed { resource: String, mode: LockModeHint, conflicting_holders: Vec<String> },

    /// A row accessor requiring exactly one row found none.
    #[error("no result found")]
    NoResultFound,

    /// A row accessor requiring exactly one row found more than one.
    #[error("multiple results found")]
    MultipleResultsFound,

    /// Operation attempted on a cursor or result set that is already closed.
    #[error("resource closed: {reason}")]
    ResourceClosed { reason: String },

    /// `Table` construction found two columns with the same name.
    #[error("duplicate column {column:?} on table {table:?}")]
    DuplicateColumn { table: String, column: String },

    /// Builder/compiler misuse: bad argument combination.
    #[error("argument error: {reason}")]
    Argument { reason: String },

    /// Schema/registry misuse: duplicate table, unknown table, malformed
    /// reflected metadata.
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },
}

/// A lock mode, duplicated here (rather than importing `crate::lock::LockMode`)
/// only so that `NormliteError` doesn't need to depend on the lock module;
/// kept in lockstep by `From` in `crate::lock`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockModeHint {
    Shared,
    Exclusive,
}

impl fmt::Display for LockModeHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shared => write!(f, "SHARED"),
            Self::Exclusive => write!(f, "EXCLUSIVE"),
        }
    }
}

impl NormliteError {
    #[must_use]
    pub fn interface(reason: impl Into<String>) -> Self {
        Self::Interface { reason: reason.into() }
    }

    #[must_use]
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal { reason: reason.into() }
    }

    #[must_use]
    pub fn database(reason: impl Into<String>) -> Self {
        Self::Database { reason: reason.into() }
    }

    #[must_use]
    pub fn operational(reason: impl Into<String>) -> Self {
        Self::Operational { reason: reason.into() }
    }

    #[must_use]
    pub fn transaction(reason: impl Into<String>) -> Self {
        Self::Transaction { reason: reason.into() }
    }

    #[must_use]
    pub fn argument(reason: impl Into<String>) -> Self {
        Self::Argument { reason: reason.into() }
    }

    #[must_use]
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest { reason: reason.into() }
    }
}
