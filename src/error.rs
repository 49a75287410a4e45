//! Module `error` defines the error taxonomy returned across the public
//! API boundary. Every kind is a distinct, testable value; the engine
//! never panics past an API boundary (failures are always returned to
//! the immediate caller).

use std::fmt;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds surfaced by the store, a transaction, a field index, a
/// stream or a cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Operation attempted on a store after `close()`.
    StoreClosed,
    /// Identifier absent under the reader's view.
    DocumentNotFound,
    /// Identifier resolves to a tombstone under the reader's view.
    DocumentDeleted,
    /// `create_index` with a name already registered.
    IndexExists(String),
    /// `create_index` with zero declared fields.
    EmptyIndex,
    /// Operation names an absent index.
    IndexNotFound(String),
    /// `next`/`reset` on a closed/cancelled stream or cursor.
    StreamClosed,
    /// Null or malformed document passed to create/update.
    InvalidData,
    /// Operation on a transaction that already committed or rolled back.
    TransactionClosed,
    /// Mutation attempted on a read-only transaction.
    ReadOnlyTransaction,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::StoreClosed => write!(f, "store is closed"),
            Error::DocumentNotFound => write!(f, "document not found"),
            Error::DocumentDeleted => write!(f, "document was deleted"),
            Error::IndexExists(name) => write!(f, "index {:?} already exists", name),
            Error::EmptyIndex => write!(f, "index must declare at least one field"),
            Error::IndexNotFound(name) => write!(f, "index {:?} not found", name),
            Error::StreamClosed => write!(f, "stream or cursor is closed"),
            Error::InvalidData => write!(f, "document data is null or malformed"),
            Error::TransactionClosed => write!(f, "transaction is closed"),
            Error::ReadOnlyTransaction => write!(f, "transaction is read-only"),
        }
    }
}

impl std::error::Error for Error {}
