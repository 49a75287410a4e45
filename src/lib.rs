//! docdb is an embedded, in-process, in-memory document store.
//!
//! Documents are schemaless field-value mappings, identified by an
//! opaque string id minted on creation. All access goes through a
//! [`Transaction`] opened from a [`Store`]: reads and writes are
//! snapshot-isolated under multi-version concurrency control, with
//! read-your-writes within a single transaction and last-writer-wins
//! across concurrent commits (there is no conflict detection).
//!
//! Secondary [`FieldIndex`]es declare an ordered set of fields to
//! extract a composite key from; a document is indexed under a
//! declaration iff every declared field is present and non-null.
//! Indexes support exact, inclusive-range and prefix lookups and stay
//! synchronized with committed document state as part of every commit.
//!
//! Snapshot iteration over the whole document set or over one index's
//! key order is available either as a [`Stream`] (store-wide, forward
//! only, asynchronous) or as a [`Cursor`] (transaction-framed,
//! bidirectional, positionable).
//!
//! ```
//! use docdb::{Store, Mode, Value};
//!
//! let store = Store::new("example");
//! let mut txn = store.open_transaction(Mode::ReadWrite).unwrap();
//! let mut doc = std::collections::HashMap::new();
//! doc.insert("name".to_string(), Value::String("sirius".to_string()));
//! let id = txn.create(doc).unwrap();
//! txn.commit().unwrap();
//!
//! let reader = store.open_transaction(Mode::ReadOnly).unwrap();
//! assert!(reader.read(&id).is_ok());
//! ```

mod cell;
mod cursor;
mod error;
mod id;
mod index;
mod store;
mod stream;
mod txn;
mod value;

pub use crate::cursor::{Cursor, CursorItem};
pub use crate::error::{Error, Result};
pub use crate::id::{IdGenerator, UuidGenerator};
pub use crate::index::FieldIndex;
pub use crate::store::{Store, StoreOptions};
pub use crate::stream::Stream;
pub use crate::txn::{Mode, Transaction};
pub use crate::value::{cmp, deep_copy, Document, IndexKey, Value};
