//! Module `stream` implements the forward, cancellable, buffered
//! document stream.
//!
//! A stream captures its id list at construction (either the full
//! unordered registry, or one index's ascending key order) and then
//! walks it on a dedicated background thread, resolving each id's data
//! against the *current* store state (not the construction-time
//! snapshot) and pushing results through a bounded channel. A document
//! deleted between snapshot construction and the thread reaching its
//! position is silently skipped rather than surfaced as an error or a
//! stale copy - a stream has no fixed reader transaction to frame a
//! "deleted" error against, unlike a cursor.
//!
//! Grounded on the teacher's `util/thread.rs` gen-server pattern (a
//! background thread driven by an mpsc channel, joined on drop), but
//! reimplemented against this crate's own `Error`/`Result` rather than
//! reused verbatim - the teacher's `Thread`/`Tx` types are generic over
//! an `err_at!`-built error type and pull in `num_cpus`, neither of
//! which docdb's dependency set carries.

use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use log::trace;

use crate::error::{Error, Result};
use crate::store::Store;
use crate::value::{deep_copy, Document};
use std::sync::Arc;

/// Default buffer capacity used by [`crate::store::Store::stream_all`]
/// and [`crate::store::Store::stream_by_index`] when the caller doesn't
/// ask for a specific one via the `_with_capacity` variants.
pub const DEFAULT_STREAM_BUFFER_CAPACITY: usize = 16;

enum Signal {
    Stop,
}

/// A forward, one-shot iterator over a snapshot of document identifiers,
/// delivered asynchronously from a background worker thread.
pub struct Stream {
    rx: Receiver<Document>,
    stop_tx: Sender<Signal>,
    handle: Option<JoinHandle<()>>,
    closed: bool,
}

impl Stream {
    /// Spawn a stream over every document currently in the registry, in
    /// no particular order, buffered to `capacity` (zero means an
    /// unbuffered, rendezvous channel per spec.md §4.7).
    pub(crate) fn over_all(store: Arc<Store>, capacity: usize) -> Stream {
        let ids = store.all_ids();
        Stream::spawn(store, ids, capacity)
    }

    /// Spawn a stream over the identifiers indexed by `name`, in
    /// ascending key order, buffered to `capacity`.
    pub(crate) fn over_index(store: Arc<Store>, name: &str, capacity: usize) -> Result<Stream> {
        let ids = store.ordered_ids(name)?;
        Ok(Stream::spawn(store, ids, capacity))
    }

    fn spawn(store: Arc<Store>, ids: Vec<String>, capacity: usize) -> Stream {
        let (tx, rx) = mpsc::sync_channel(capacity);
        let (stop_tx, stop_rx) = mpsc::channel();

        trace!("docdb: stream spawned over {} ids, capacity {}", ids.len(), capacity);
        let handle = thread::spawn(move || {
            for id in ids {
                if stop_rx.try_recv().is_ok() {
                    return;
                }
                let cell = match store.get_cell(&id) {
                    Some(cell) => cell,
                    None => continue,
                };
                let data = match cell.latest() {
                    Some(data) => data,
                    None => continue,
                };
                if tx.send(deep_copy(&data)).is_err() {
                    return;
                }
            }
        });

        Stream {
            rx,
            stop_tx,
            handle: Some(handle),
            closed: false,
        }
    }

    /// Pull the next document, or `None` once the underlying id list is
    /// exhausted.
    pub fn next(&mut self) -> Result<Option<Document>> {
        if self.closed {
            return Err(Error::StreamClosed);
        }
        match self.rx.recv() {
            Ok(doc) => Ok(Some(doc)),
            Err(_) => {
                self.closed = true;
                Ok(None)
            }
        }
    }

    /// Cancel the stream: signal the worker thread to stop pushing
    /// further items and join it. Idempotent.
    pub fn close(&mut self) {
        if self.handle.is_some() {
            trace!("docdb: stream closed");
            let _ = self.stop_tx.send(Signal::Stop);
            while self.rx.try_recv().is_ok() {}
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        }
        self.closed = true;
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.close();
    }
}

impl Iterator for Stream {
    type Item = Document;

    fn next(&mut self) -> Option<Document> {
        Stream::next(self).ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txn::Mode;
    use crate::value::Value;

    fn doc(pairs: &[(&str, Value)]) -> Document {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_stream_over_all_yields_every_document() {
        let store = Store::new("t");
        let mut txn = store.open_transaction(Mode::ReadWrite).unwrap();
        txn.create(doc(&[("x", Value::Integer(1))])).unwrap();
        txn.create(doc(&[("x", Value::Integer(2))])).unwrap();
        txn.commit().unwrap();

        let stream = Stream::over_all(store, DEFAULT_STREAM_BUFFER_CAPACITY);
        let items: Vec<Document> = stream.collect();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_stream_close_stops_iteration() {
        let store = Store::new("t");
        let mut txn = store.open_transaction(Mode::ReadWrite).unwrap();
        txn.create(doc(&[("x", Value::Integer(1))])).unwrap();
        txn.commit().unwrap();

        let mut stream = Stream::over_all(store, DEFAULT_STREAM_BUFFER_CAPACITY);
        stream.close();
        assert_eq!(stream.next(), Err(Error::StreamClosed));
    }

    #[test]
    fn test_stream_over_index_is_ordered() {
        let store = Store::new("t");
        store.create_index("by_n", vec!["n".to_string()]).unwrap();
        let mut txn = store.open_transaction(Mode::ReadWrite).unwrap();
        txn.create(doc(&[("n", Value::Integer(3))])).unwrap();
        txn.create(doc(&[("n", Value::Integer(1))])).unwrap();
        txn.create(doc(&[("n", Value::Integer(2))])).unwrap();
        txn.commit().unwrap();

        let stream = Stream::over_index(store, "by_n", DEFAULT_STREAM_BUFFER_CAPACITY).unwrap();
        let ns: Vec<i64> = stream
            .map(|doc| match doc.get("n") {
                Some(Value::Integer(n)) => *n,
                _ => panic!("expected integer"),
            })
            .collect();
        assert_eq!(ns, vec![1, 2, 3]);
    }
}
