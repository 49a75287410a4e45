//! Module `cursor` implements the bidirectional, positionable cursor.
//!
//! Like a [`crate::stream::Stream`], a cursor captures its id list once
//! at construction and resolves each id against the store's *current*
//! committed state, not a fixed reader snapshot - per spec.md §4.7,
//! cursor and stream snapshots are decoupled from transaction
//! snapshots. Unlike a stream, a cursor can move in either direction
//! and re-resolves its current position on every step rather than
//! materializing once up front. Because resolution is lazy and keyed
//! off the live cell rather than a copy taken at construction, a
//! document deleted after the cursor's id-list snapshot was built but
//! before the cursor reaches its position surfaces as
//! [`CursorItem::Deleted`] at that position - never a stale copy, and
//! never a silent skip.
//!
//! Position is an `i64` over the closed range `-1..=len`: `-1` is the
//! before-first sentinel, `0..len` index valid id-list entries, and
//! `len` is the end sentinel (reachable only by repeated `next()`, and
//! "un-reachable" again by a subsequent `previous()`).

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::store::Store;
use crate::value::{deep_copy, Document};

/// The resolved outcome of a cursor position.
#[derive(Debug, Clone, PartialEq)]
pub enum CursorItem {
    /// The document's latest committed version, as of this step.
    Document(String, Document),
    /// The document existed in the id list at construction but its
    /// latest committed version, as of this step, is a tombstone.
    Deleted(String),
}

pub struct Cursor {
    store: Arc<Store>,
    ids: Vec<String>,
    position: i64,
    closed: bool,
}

impl Cursor {
    pub(crate) fn new(store: Arc<Store>, ids: Vec<String>) -> Cursor {
        Cursor {
            store,
            ids,
            position: -1,
            closed: false,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::StreamClosed)
        } else {
            Ok(())
        }
    }

    /// Resolve the document currently backing `id`, ignoring any
    /// transactional visibility horizon - the same "latest committed"
    /// resolution `Cell::latest` provides to index backfill and to
    /// `Stream`.
    fn resolve(&self, index: usize) -> CursorItem {
        let id = &self.ids[index];
        match self.store.get_cell(id).and_then(|cell| cell.latest()) {
            Some(data) => CursorItem::Document(id.clone(), deep_copy(&data)),
            None => CursorItem::Deleted(id.clone()),
        }
    }

    /// Move the cursor by `delta` positions (negative moves backward),
    /// clamped to `-1..=len`, and resolve the new position. Returns
    /// `Ok(None)` at either sentinel.
    pub fn advance(&mut self, delta: i64) -> Result<Option<CursorItem>> {
        self.ensure_open()?;
        let len = self.ids.len() as i64;
        let target = self.position.saturating_add(delta).clamp(-1, len);
        self.position = target;
        if target < 0 || target >= len {
            return Ok(None);
        }
        Ok(Some(self.resolve(target as usize)))
    }

    pub fn next(&mut self) -> Result<Option<CursorItem>> {
        self.advance(1)
    }

    pub fn previous(&mut self) -> Result<Option<CursorItem>> {
        self.advance(-1)
    }

    /// Reset to the before-first sentinel, so the next `next()` yields
    /// the first item again.
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.position = -1;
        Ok(())
    }

    /// The number of identifiers captured in this cursor's snapshot,
    /// irrespective of current position or each id's live visibility.
    pub fn count(&self) -> usize {
        self.ids.len()
    }

    /// Close the cursor. Idempotent; subsequent `next`/`previous`/
    /// `advance`/`reset` fail `StreamClosed`.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// An independent cursor over the same id-list snapshot, positioned
    /// back at the before-first sentinel.
    pub fn fork(&self) -> Cursor {
        Cursor::new(Arc::clone(&self.store), self.ids.clone())
    }
}
