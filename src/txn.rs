//! Module `txn` implements the transaction: the sole unit of
//! interaction application code has with a store. A transaction buffers
//! writes and applies them atomically at `commit()`; reads resolve
//! through the buffer first (read-your-writes), then through the
//! document cell's visibility predicate at the transaction's fixed
//! snapshot timestamp.
//!
//! Buffering shape is grounded on `other_examples`'s
//! `gabrielelanaro-wrongodb::engine::transaction::MultiCollectionTxn`
//! (pending-ops tracking, commit/abort as terminal consuming methods)
//! and `solisoft-solidb`'s collection-level txn buffer.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cursor::Cursor;
use crate::error::{Error, Result};
use crate::store::Store;
use crate::value::{deep_copy, Document, Value};

/// A transaction's access mode, fixed at `open_transaction()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Clone)]
enum Write {
    Put(Document),
    Delete,
}

/// A buffered, not-yet-applied mutation, recorded in insertion order.
#[derive(Debug, Clone)]
struct WriteRecord {
    id: String,
    write: Write,
}

pub(crate) enum Applied {
    Put { id: String, data: Document },
    Delete { id: String },
}

impl WriteRecord {
    fn to_applied(&self) -> Applied {
        match &self.write {
            Write::Put(data) => Applied::Put {
                id: self.id.clone(),
                data: data.clone(),
            },
            Write::Delete => Applied::Delete {
                id: self.id.clone(),
            },
        }
    }
}

/// The sole unit of interaction with a [`crate::store::Store`] from
/// application code. `snapshot_timestamp` is captured at `open` and
/// never changes; `txn_id` is drawn from a process-wide monotonic
/// counter (invariant I4).
pub struct Transaction {
    store: Arc<Store>,
    txn_id: u64,
    snapshot_timestamp: u64,
    mode: Mode,
    buffer: Vec<WriteRecord>,
    closed: bool,
}

impl Transaction {
    pub(crate) fn new(store: Arc<Store>, txn_id: u64, snapshot_timestamp: u64, mode: Mode) -> Transaction {
        Transaction {
            store,
            txn_id,
            snapshot_timestamp,
            mode,
            buffer: Vec::new(),
            closed: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.txn_id
    }

    pub fn snapshot_timestamp(&self) -> u64 {
        self.snapshot_timestamp
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::TransactionClosed)
        } else {
            Ok(())
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        self.ensure_open()?;
        if self.mode != Mode::ReadWrite {
            return Err(Error::ReadOnlyTransaction);
        }
        Ok(())
    }

    /// Scan the write buffer backward for the most recent pending write
    /// on `id`.
    fn buffered(&self, id: &str) -> Option<&Write> {
        self.buffer.iter().rev().find(|r| r.id == id).map(|r| &r.write)
    }

    /// Reject document data with no representable content. `Document` is
    /// a typed mapping rather than an `Option<Value>`, so there is no
    /// distinct "null" to carry through the API; an empty field mapping
    /// is the closest in-language equivalent and is rejected the same
    /// way a literal null would be in the source's dynamically typed
    /// document model.
    fn validate_data(data: &Document) -> Result<()> {
        if data.is_empty() {
            return Err(Error::InvalidData);
        }
        Ok(())
    }

    /// Create a new document, returning its freshly minted identifier.
    /// Read-write only.
    pub fn create(&mut self, data: Document) -> Result<String> {
        self.ensure_writable()?;
        Self::validate_data(&data)?;
        let id = self.store.next_id();
        self.buffer.push(WriteRecord {
            id: id.clone(),
            write: Write::Put(data),
        });
        Ok(id)
    }

    /// Replace the data of an existing, reader-visible document.
    /// Read-write only.
    pub fn update(&mut self, id: &str, data: Document) -> Result<()> {
        self.ensure_writable()?;
        Self::validate_data(&data)?;
        self.require_visible(id)?;
        self.buffer.push(WriteRecord {
            id: id.to_string(),
            write: Write::Put(data),
        });
        Ok(())
    }

    /// Mark an existing, reader-visible document deleted. Read-write
    /// only.
    pub fn delete(&mut self, id: &str) -> Result<()> {
        self.ensure_writable()?;
        self.require_visible(id)?;
        self.buffer.push(WriteRecord {
            id: id.to_string(),
            write: Write::Delete,
        });
        Ok(())
    }

    /// Verify that `id` currently resolves for this reader (checking
    /// the buffer first, then the cell's visibility predicate), failing
    /// `DocumentNotFound` otherwise. Used by `update`/`delete` before
    /// buffering a write.
    fn require_visible(&self, id: &str) -> Result<()> {
        match self.buffered(id) {
            Some(Write::Put(_)) => return Ok(()),
            Some(Write::Delete) => return Err(Error::DocumentNotFound),
            None => {}
        }
        match self.store.get_cell(id) {
            Some(cell) => cell.with_visible(self.txn_id, self.snapshot_timestamp, |visible| {
                use crate::cell::Visible;
                match visible {
                    Visible::Data(_) => Ok(()),
                    Visible::Deleted | Visible::NotFound => Err(Error::DocumentNotFound),
                }
            }),
            None => Err(Error::DocumentNotFound),
        }
    }

    /// Read a single document by id, overlaying any pending write from
    /// this transaction's own buffer on top of the visibility-filtered
    /// committed state.
    pub fn read(&self, id: &str) -> Result<Document> {
        self.ensure_open()?;
        self.store.ensure_open()?;
        match self.buffered(id) {
            Some(Write::Put(data)) => return Ok(deep_copy(data)),
            Some(Write::Delete) => return Err(Error::DocumentDeleted),
            None => {}
        }
        match self.store.get_cell(id) {
            Some(cell) => cell.with_visible(self.txn_id, self.snapshot_timestamp, |visible| {
                use crate::cell::Visible;
                match visible {
                    Visible::Data(data) => Ok(deep_copy(data)),
                    Visible::Deleted => Err(Error::DocumentDeleted),
                    Visible::NotFound => Err(Error::DocumentNotFound),
                }
            }),
            None => Err(Error::DocumentNotFound),
        }
    }

    /// Read every document visible to this transaction: a
    /// visibility-filtered snapshot of the document registry, with
    /// pending buffered writes overlaid (puts override, deletes
    /// remove). Returned mapping is a deep copy.
    pub fn read_all(&self) -> Result<HashMap<String, Document>> {
        self.ensure_open()?;
        self.store.ensure_open()?;
        use crate::cell::Visible;
        let mut out = HashMap::new();
        for (id, cell) in self.store.all_cells() {
            cell.with_visible(self.txn_id, self.snapshot_timestamp, |visible| {
                if let Visible::Data(data) = visible {
                    out.insert(id.clone(), deep_copy(data));
                }
            });
        }
        for record in &self.buffer {
            match &record.write {
                Write::Put(data) => {
                    out.insert(record.id.clone(), deep_copy(data));
                }
                Write::Delete => {
                    out.remove(&record.id);
                }
            }
        }
        Ok(out)
    }

    /// Resolve candidate identifiers from the named index's exact-match
    /// lookup, then filter each through the visibility-plus-buffer read
    /// path.
    pub fn find_by_index(&self, name: &str, values: &[Value]) -> Result<HashMap<String, Document>> {
        self.ensure_open()?;
        self.store.ensure_open()?;
        let index = self.store.get_index(name)?;
        self.resolve_candidates(index.lookup(values))
    }

    /// Resolve candidates from the named index's inclusive range scan.
    pub fn find_by_range(&self, name: &str, min: &[Value], max: &[Value]) -> Result<HashMap<String, Document>> {
        self.ensure_open()?;
        self.store.ensure_open()?;
        let index = self.store.get_index(name)?;
        self.resolve_candidates(index.lookup_range(min, max))
    }

    /// Resolve candidates from the named index's prefix scan.
    pub fn find_by_prefix(&self, name: &str, prefix: &[Value]) -> Result<HashMap<String, Document>> {
        self.ensure_open()?;
        self.store.ensure_open()?;
        let index = self.store.get_index(name)?;
        self.resolve_candidates(index.lookup_prefix(prefix))
    }

    fn resolve_candidates(&self, ids: std::collections::HashSet<String>) -> Result<HashMap<String, Document>> {
        use crate::cell::Visible;
        let mut out = HashMap::new();
        for id in ids {
            if let Some(Write::Delete) = self.buffered(&id) {
                continue;
            }
            if let Some(Write::Put(data)) = self.buffered(&id) {
                out.insert(id, deep_copy(data));
                continue;
            }
            if let Some(cell) = self.store.get_cell(&id) {
                cell.with_visible(self.txn_id, self.snapshot_timestamp, |visible| {
                    if let Visible::Data(data) = visible {
                        out.insert(id.clone(), deep_copy(data));
                    }
                });
            }
        }
        Ok(out)
    }

    /// Open a bidirectional cursor over every document, in no
    /// particular order. Per spec.md §4.7 the cursor's snapshot is
    /// decoupled from this transaction's own visibility horizon: its id
    /// list is captured now, but each position resolves against the
    /// store's latest committed state when reached.
    pub fn cursor_all(&self) -> Result<Cursor> {
        self.ensure_open()?;
        let ids = self.store.all_ids();
        Ok(Cursor::new(Arc::clone(&self.store), ids))
    }

    /// Open a bidirectional cursor over the documents indexed by
    /// `name`, in ascending key order. See `cursor_all` for the
    /// snapshot/resolution split.
    pub fn cursor_by_index(&self, name: &str) -> Result<Cursor> {
        self.ensure_open()?;
        let ids = self.store.ordered_ids(name)?;
        Ok(Cursor::new(Arc::clone(&self.store), ids))
    }

    /// Commit this transaction. Read-write transactions stamp a fresh
    /// commit timestamp and apply every buffered write under the
    /// store's registry lock in one critical section (so no partial
    /// commit is ever externally observable); read-only transactions
    /// simply close. Either way the transaction is removed from the
    /// store's active set afterwards, which is also the trigger for an
    /// opportunistic, rate-limited garbage-collection sweep.
    pub fn commit(mut self) -> Result<()> {
        self.ensure_open()?;
        if self.mode == Mode::ReadWrite && !self.buffer.is_empty() {
            let applied: Vec<Applied> = self.buffer.iter().map(WriteRecord::to_applied).collect();
            let commit_time = self.store.next_stamp();
            self.store.apply(self.txn_id, applied, commit_time)?;
        }
        self.finish();
        Ok(())
    }

    /// Discard the write buffer and close. Idempotent in spirit (a
    /// second call would fail `TransactionClosed`, same as any other
    /// operation on a closed transaction, per the `Open -> Committed |
    /// RolledBack` state machine).
    pub fn rollback(mut self) -> Result<()> {
        self.ensure_open()?;
        self.buffer.clear();
        self.finish();
        Ok(())
    }

    fn finish(&mut self) {
        self.closed = true;
        self.store.end_transaction(self.txn_id);
    }
}
