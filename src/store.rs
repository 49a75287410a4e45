//! Module `store` implements the facade: the single entry point
//! application code opens and holds on to. A `Store` owns the document
//! registry, the index registry, the shared logical clock, and the set
//! of currently active transactions (needed to compute a
//! garbage-collection safe point).
//!
//! Grounded on the teacher's `rdms.rs` (`Rdms<K, V, I>`: a named handle
//! wrapping the index, `close()`/`Drop` semantics, builder-style
//! configuration via `set_commit_interval`). `StoreOptions` plays the
//! role `set_commit_interval` plays there, generalized to the two knobs
//! this engine needs: the id generator and the GC interval.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock, Weak};
use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::cell::Cell;
use crate::error::{Error, Result};
use crate::id::{IdGenerator, UuidGenerator};
use crate::index::FieldIndex;
use crate::stream::{Stream, DEFAULT_STREAM_BUFFER_CAPACITY};
use crate::txn::{Applied, Mode, Transaction};
use crate::value::Document;

/// Builder-style configuration accepted by [`Store::with_options`].
/// Mirrors the teacher's `set_commit_interval` builder pattern, folded
/// into a single struct since this engine has only two independent
/// knobs.
pub struct StoreOptions {
    id_generator: Arc<dyn IdGenerator>,
    gc_interval: Duration,
}

impl StoreOptions {
    pub fn new() -> StoreOptions {
        StoreOptions {
            id_generator: Arc::new(UuidGenerator),
            gc_interval: Duration::from_millis(0),
        }
    }

    /// Install a custom identifier generator in place of the default
    /// UUID-backed one. Mainly useful for deterministic tests.
    pub fn id_generator(mut self, gen: Arc<dyn IdGenerator>) -> StoreOptions {
        self.id_generator = gen;
        self
    }

    /// Minimum wall-clock interval between opportunistic GC sweeps
    /// triggered by transaction close. A zero interval (the default)
    /// sweeps on every close.
    pub fn gc_interval(mut self, interval: Duration) -> StoreOptions {
        self.gc_interval = interval;
        self
    }
}

impl Default for StoreOptions {
    fn default() -> StoreOptions {
        StoreOptions::new()
    }
}

/// The store facade: an embedded, in-process, in-memory document
/// database. Cloneable only via `Arc<Store>`; every `Transaction`,
/// `Stream` and `Cursor` holds a reference back to its owning store.
///
/// `self_ref` is the standard `Arc::new_cyclic` self-reference trick:
/// it lets `open_transaction`/`stream_all`/`stream_by_index` hand out a
/// fresh `Arc<Store>` clone from an `&self` method, since stable Rust
/// does not accept `self: &Arc<Self>` as a receiver.
pub struct Store {
    name: String,
    cells: RwLock<HashMap<String, Arc<Cell>>>,
    indexes: RwLock<HashMap<String, Arc<FieldIndex>>>,
    clock: AtomicU64,
    active: RwLock<HashMap<u64, u64>>,
    id_generator: Arc<dyn IdGenerator>,
    gc_interval: Duration,
    last_gc: RwLock<Instant>,
    closed: AtomicBool,
    self_ref: Weak<Store>,
}

impl Store {
    /// Open a new, empty store under default options.
    pub fn new(name: impl Into<String>) -> Arc<Store> {
        Store::with_options(name, StoreOptions::new())
    }

    /// Open a new, empty store under explicit options.
    pub fn with_options(name: impl Into<String>, options: StoreOptions) -> Arc<Store> {
        let name = name.into();
        debug!("docdb: opening store {:?}", name);
        Arc::new_cyclic(|self_ref| Store {
            name,
            cells: RwLock::new(HashMap::new()),
            indexes: RwLock::new(HashMap::new()),
            clock: AtomicU64::new(1),
            active: RwLock::new(HashMap::new()),
            id_generator: options.id_generator,
            gc_interval: options.gc_interval,
            last_gc: RwLock::new(Instant::now() - options.gc_interval),
            closed: AtomicBool::new(false),
            self_ref: self_ref.clone(),
        })
    }

    /// Clone the `Arc` this store is held by. Panics only if called
    /// during construction before `Arc::new_cyclic` has finished, which
    /// cannot happen through any public API.
    fn arc(&self) -> Arc<Store> {
        self.self_ref.upgrade().expect("store's own Arc has been dropped")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.closed.load(AtomicOrdering::Acquire) {
            Err(Error::StoreClosed)
        } else {
            Ok(())
        }
    }

    /// Draw the next tick of the store's shared logical clock. Used both
    /// to stamp a new transaction's snapshot timestamp and to stamp a
    /// commit timestamp, so the two scales share one strictly monotone
    /// sequence (invariant I1).
    pub(crate) fn next_stamp(&self) -> u64 {
        self.clock.fetch_add(1, AtomicOrdering::SeqCst)
    }

    pub(crate) fn next_id(&self) -> String {
        self.id_generator.next_id()
    }

    /// Begin a new transaction. Its snapshot timestamp is the clock tick
    /// drawn at open; every version committed at or after that tick is
    /// invisible to it (other than its own writes).
    pub fn open_transaction(&self, mode: Mode) -> Result<Transaction> {
        self.ensure_open()?;
        let snapshot = self.next_stamp();
        let txn_id = self.next_stamp();
        self.active.write().expect("active-set lock poisoned").insert(txn_id, snapshot);
        trace!("docdb: opened txn {} snapshot {}", txn_id, snapshot);
        Ok(Transaction::new(self.arc(), txn_id, snapshot, mode))
    }

    /// Register `txn_id` as no longer active and opportunistically run
    /// a rate-limited GC sweep. Called by `Transaction::finish` on both
    /// `commit` and `rollback`.
    pub(crate) fn end_transaction(&self, txn_id: u64) {
        self.active.write().expect("active-set lock poisoned").remove(&txn_id);
        self.maybe_gc();
    }

    fn maybe_gc(&self) {
        {
            let last = self.last_gc.read().expect("gc-timer lock poisoned");
            if last.elapsed() < self.gc_interval {
                return;
            }
        }
        let mut last = self.last_gc.write().expect("gc-timer lock poisoned");
        if last.elapsed() < self.gc_interval {
            return;
        }
        *last = Instant::now();
        drop(last);

        let threshold = {
            let active = self.active.read().expect("active-set lock poisoned");
            active.values().copied().min()
        };
        let threshold = match threshold {
            Some(t) => t,
            None => self.clock.load(AtomicOrdering::SeqCst),
        };
        let cells = self.cells.read().expect("cell registry lock poisoned");
        for cell in cells.values() {
            cell.gc(threshold);
        }
        trace!("docdb: gc swept at threshold {}", threshold);
    }

    /// Look up a document cell by id. `None` means the identifier has
    /// never existed in this store (as opposed to having been deleted,
    /// which is a tombstoned, still-present cell).
    pub(crate) fn get_cell(&self, id: &str) -> Option<Arc<Cell>> {
        self.cells.read().expect("cell registry lock poisoned").get(id).cloned()
    }

    /// A snapshot of every cell currently in the registry, paired with
    /// its id. Used by `Transaction::read_all` and by cursor/stream
    /// construction.
    pub(crate) fn all_cells(&self) -> Vec<(String, Arc<Cell>)> {
        self.cells
            .read()
            .expect("cell registry lock poisoned")
            .iter()
            .map(|(id, cell)| (id.clone(), Arc::clone(cell)))
            .collect()
    }

    pub(crate) fn get_index(&self, name: &str) -> Result<Arc<FieldIndex>> {
        self.indexes
            .read()
            .expect("index registry lock poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| Error::IndexNotFound(name.to_string()))
    }

    /// Declare a new field index over `fields`, backfilling it from
    /// every document currently in the registry (ignoring
    /// transactional visibility, per `Cell::latest`, since index
    /// construction happens outside any reader's snapshot).
    pub fn create_index(&self, name: impl Into<String>, fields: Vec<String>) -> Result<()> {
        self.ensure_open()?;
        let name = name.into();
        if fields.is_empty() {
            return Err(Error::EmptyIndex);
        }
        let mut indexes = self.indexes.write().expect("index registry lock poisoned");
        if indexes.contains_key(&name) {
            return Err(Error::IndexExists(name));
        }
        let index = FieldIndex::new(name.clone(), fields);
        let cells = self.cells.read().expect("cell registry lock poisoned");
        for (id, cell) in cells.iter() {
            if let Some(data) = cell.latest() {
                index.insert_doc(id, &data);
            }
        }
        drop(cells);
        indexes.insert(name, Arc::new(index));
        Ok(())
    }

    pub fn drop_index(&self, name: &str) -> Result<()> {
        self.ensure_open()?;
        let mut indexes = self.indexes.write().expect("index registry lock poisoned");
        indexes.remove(name).map(|_| ()).ok_or_else(|| Error::IndexNotFound(name.to_string()))
    }

    /// Names of every currently declared index, in no particular order.
    pub fn list_indexes(&self) -> Vec<String> {
        self.indexes.read().expect("index registry lock poisoned").keys().cloned().collect()
    }

    /// Apply a transaction's buffered writes atomically: acquire the
    /// cell registry lock once, perform every put/delete against the
    /// registry and its cells, then perform matching index maintenance.
    /// Cell state is always updated before index state within one
    /// commit, the canonical lock order this engine follows throughout
    /// (registry before index, writer before any concurrent index
    /// reader observes the new version).
    ///
    /// Buffered writes are collapsed to at most one per document id
    /// before being applied, keeping each id's last write and the
    /// relative order of each id's first appearance. A transaction that
    /// e.g. `update`s the same id twice must still stamp exactly one
    /// version at `commit_time` for that id - applying every buffered
    /// write verbatim would `prepend` several versions carrying the
    /// same `committed_at`, breaking the chain's strictly-decreasing
    /// commit-time invariant (I1/P1).
    pub(crate) fn apply(&self, txn_id: u64, writes: Vec<Applied>, commit_time: u64) -> Result<()> {
        self.ensure_open()?;
        let indexes: Vec<Arc<FieldIndex>> = self.indexes.read().expect("index registry lock poisoned").values().cloned().collect();

        let mut order: Vec<String> = Vec::new();
        let mut last: HashMap<String, Applied> = HashMap::new();
        for write in writes {
            let id = match &write {
                Applied::Put { id, .. } => id.clone(),
                Applied::Delete { id } => id.clone(),
            };
            if !last.contains_key(&id) {
                order.push(id.clone());
            }
            last.insert(id, write);
        }

        let mut cells = self.cells.write().expect("cell registry lock poisoned");
        let mut maintenance: Vec<(Option<Document>, Option<Document>, String)> = Vec::with_capacity(order.len());

        for id in order {
            match last.remove(&id).expect("id was collected from its own write") {
                Applied::Put { id, data } => {
                    let prev = cells.get(&id).and_then(|c| c.latest());
                    match cells.get(&id) {
                        Some(cell) => cell.prepend(txn_id, commit_time, Some(data.clone())),
                        None => {
                            cells.insert(id.clone(), Arc::new(Cell::new(id.clone(), txn_id, commit_time, data.clone())));
                        }
                    }
                    maintenance.push((prev, Some(data), id));
                }
                Applied::Delete { id } => {
                    match cells.get(&id) {
                        Some(cell) => {
                            let prev = cell.latest();
                            cell.prepend(txn_id, commit_time, None);
                            maintenance.push((prev, None, id));
                        }
                        None => return Err(Error::DocumentNotFound),
                    }
                }
            }
        }
        drop(cells);

        for (prev, new, id) in maintenance {
            for index in &indexes {
                match &new {
                    Some(data) => {
                        index.update_doc(&id, prev.as_ref(), data);
                    }
                    None => {
                        if let Some(data) = &prev {
                            index.delete_doc(&id, data);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// All identifiers currently in the registry, in no particular
    /// order. Used to seed the unordered document cursor/stream.
    pub(crate) fn all_ids(&self) -> Vec<String> {
        self.cells.read().expect("cell registry lock poisoned").keys().cloned().collect()
    }

    /// Identifiers in ascending key order under the named index. Used
    /// to seed the by-index cursor/stream.
    pub(crate) fn ordered_ids(&self, name: &str) -> Result<Vec<String>> {
        Ok(self.get_index(name)?.ordered_ids())
    }

    /// Open a stream over every document in the registry, in no
    /// particular order, buffered to the default capacity. Unlike a
    /// cursor, a stream is not framed against any reader's snapshot: it
    /// resolves each document's current state as the background thread
    /// reaches it.
    pub fn stream_all(&self) -> Stream {
        self.stream_all_with_capacity(DEFAULT_STREAM_BUFFER_CAPACITY)
    }

    /// Like [`Store::stream_all`], but with an explicit buffer capacity
    /// (zero means an unbuffered, rendezvous channel).
    pub fn stream_all_with_capacity(&self, capacity: usize) -> Stream {
        Stream::over_all(self.arc(), capacity)
    }

    /// Open a stream over the documents indexed by `name`, in
    /// ascending key order, buffered to the default capacity.
    pub fn stream_by_index(&self, name: &str) -> Result<Stream> {
        self.stream_by_index_with_capacity(name, DEFAULT_STREAM_BUFFER_CAPACITY)
    }

    /// Like [`Store::stream_by_index`], but with an explicit buffer
    /// capacity.
    pub fn stream_by_index_with_capacity(&self, name: &str, capacity: usize) -> Result<Stream> {
        Stream::over_index(self.arc(), name, capacity)
    }

    /// Close the store. Further operations on it, or on transactions
    /// still holding a reference to it, fail `StoreClosed`. Registries
    /// are cleared to release memory; any `Arc<Cell>`/`Arc<FieldIndex>`
    /// already handed out to a live cursor or stream stays valid for
    /// that holder regardless.
    pub fn close(&self) {
        debug!("docdb: closing store {:?}", self.name);
        self.closed.store(true, AtomicOrdering::Release);
        self.cells.write().expect("cell registry lock poisoned").clear();
        self.indexes.write().expect("index registry lock poisoned").clear();
    }
}
