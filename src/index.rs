//! Module `index` implements a field index: an ordered tree mapping a
//! composite key, extracted from a fixed, declared set of field names,
//! to the set of document identifiers currently indexed at that key.
//!
//! The ordered tree is `std::collections::BTreeMap` - itself a B-tree -
//! keyed by `IndexKey`, whose `Ord` implementation is the total order
//! from `crate::value`. See `DESIGN.md` for why this stands in for the
//! teacher's hand-rolled LLRB tree.

use std::collections::{BTreeMap, HashSet};
use std::ops::Bound;
use std::sync::RwLock;

use crate::value::{Document, IndexKey, Value};

/// Declares the name and ordered field list of a field index. Names are
/// unique per store; a document is indexed under a given declaration
/// iff every declared field is present and non-null.
pub struct FieldIndex {
    name: String,
    fields: Vec<String>,
    tree: RwLock<BTreeMap<IndexKey, HashSet<String>>>,
}

/// Extract the composite key for `data` under `fields`, or `None` if
/// the document is not indexable (a declared field is absent or null).
fn extract_key(fields: &[String], data: &Document) -> Option<IndexKey> {
    let mut values = Vec::with_capacity(fields.len());
    for field in fields {
        match data.get(field) {
            Some(Value::Null) | None => return None,
            Some(value) => values.push(value.clone()),
        }
    }
    Some(IndexKey::new(values))
}

impl FieldIndex {
    pub fn new(name: impl Into<String>, fields: Vec<String>) -> FieldIndex {
        FieldIndex {
            name: name.into(),
            fields,
            tree: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Insert `id` into the entry for `data`'s extracted key. Returns
    /// `true` iff the document is now indexed (i.e. it was indexable).
    pub fn insert_doc(&self, id: &str, data: &Document) -> bool {
        match extract_key(&self.fields, data) {
            Some(key) => {
                let mut tree = self.tree.write().expect("index lock poisoned");
                tree.entry(key).or_default().insert(id.to_string());
                true
            }
            None => false,
        }
    }

    /// Reconcile an update from `prev_data` to `new_data`. If both
    /// extract to the same key, this is a no-op (the entry already
    /// covers `id`). Otherwise `id` is removed from the old key's entry
    /// (if it was indexable) and added to the new key's entry (if it
    /// is indexable); an entry whose member-set becomes empty is
    /// removed from the tree, preserving invariant I5.
    pub fn update_doc(&self, id: &str, prev_data: Option<&Document>, new_data: &Document) -> bool {
        let prev_key = prev_data.and_then(|d| extract_key(&self.fields, d));
        let new_key = extract_key(&self.fields, new_data);

        if let (Some(p), Some(n)) = (&prev_key, &new_key) {
            if p == n {
                let mut tree = self.tree.write().expect("index lock poisoned");
                tree.entry(n.clone()).or_default().insert(id.to_string());
                return true;
            }
        }

        let mut tree = self.tree.write().expect("index lock poisoned");
        if let Some(key) = &prev_key {
            remove_member(&mut tree, key, id);
        }
        match &new_key {
            Some(key) => {
                tree.entry(key.clone()).or_default().insert(id.to_string());
                true
            }
            None => false,
        }
    }

    /// Remove `id` from the entry extracted from `data`, dropping the
    /// entry if it becomes empty.
    pub fn delete_doc(&self, id: &str, data: &Document) {
        if let Some(key) = extract_key(&self.fields, data) {
            let mut tree = self.tree.write().expect("index lock poisoned");
            remove_member(&mut tree, &key, id);
        }
    }

    /// Exact-match lookup: the member-set at `values`, or empty.
    pub fn lookup(&self, values: &[Value]) -> HashSet<String> {
        let key = IndexKey::new(values.to_vec());
        let tree = self.tree.read().expect("index lock poisoned");
        tree.get(&key).cloned().unwrap_or_default()
    }

    /// Inclusive range lookup: the union of member-sets of every entry
    /// whose key `K` satisfies `min <= K <= max`. Empty if `min > max`.
    pub fn lookup_range(&self, min: &[Value], max: &[Value]) -> HashSet<String> {
        let min_key = IndexKey::new(min.to_vec());
        let max_key = IndexKey::new(max.to_vec());
        if min_key.cmp(&max_key) == std::cmp::Ordering::Greater {
            return HashSet::new();
        }
        let tree = self.tree.read().expect("index lock poisoned");
        let mut out = HashSet::new();
        for (_, members) in tree.range((Bound::Included(min_key), Bound::Included(max_key))) {
            out.extend(members.iter().cloned());
        }
        out
    }

    /// Union of member-sets of every entry whose key starts with
    /// `prefix`, element-for-element, under `crate::value::cmp`
    /// equality. `prefix.len()` must not exceed the declared field
    /// count (callers may rely on an empty result for an over-long
    /// prefix rather than an error).
    pub fn lookup_prefix(&self, prefix: &[Value]) -> HashSet<String> {
        if prefix.len() > self.fields.len() {
            return HashSet::new();
        }
        let prefix_key = IndexKey::new(prefix.to_vec());
        let tree = self.tree.read().expect("index lock poisoned");
        let mut out = HashSet::new();
        for (key, members) in tree.iter() {
            if prefix_key.is_prefix_of(key) {
                out.extend(members.iter().cloned());
            }
        }
        out
    }

    /// All currently indexed document identifiers, in ascending key
    /// order. Used to seed the "by-index" cursor snapshot (§4.7).
    pub fn ordered_ids(&self) -> Vec<String> {
        let tree = self.tree.read().expect("index lock poisoned");
        let mut out = Vec::new();
        for members in tree.values() {
            out.extend(members.iter().cloned());
        }
        out
    }

    #[cfg(test)]
    fn entry_count(&self) -> usize {
        self.tree.read().expect("index lock poisoned").len()
    }
}

fn remove_member(tree: &mut BTreeMap<IndexKey, HashSet<String>>, key: &IndexKey, id: &str) {
    if let Some(members) = tree.get_mut(key) {
        members.remove(id);
        if members.is_empty() {
            tree.remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(pairs: &[(&str, Value)]) -> Document {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_insert_and_exact_lookup() {
        let idx = FieldIndex::new("by_status", vec!["status".to_string()]);
        let d = doc(&[("status", Value::String("pending".into()))]);
        assert!(idx.insert_doc("w", &d));
        let found = idx.lookup(&[Value::String("pending".into())]);
        assert!(found.contains("w"));
    }

    #[test]
    fn test_non_indexable_missing_field() {
        let idx = FieldIndex::new("by_status", vec!["status".to_string()]);
        let d = doc(&[("other", Value::Boolean(true))]);
        assert!(!idx.insert_doc("w", &d));
        assert_eq!(idx.entry_count(), 0);
    }

    #[test]
    fn test_non_indexable_null_field() {
        let idx = FieldIndex::new("by_status", vec!["status".to_string()]);
        let d = doc(&[("status", Value::Null)]);
        assert!(!idx.insert_doc("w", &d));
    }

    #[test]
    fn test_update_changes_key_and_drops_empty_entry() {
        let idx = FieldIndex::new("by_status", vec!["status".to_string()]);
        let pending = doc(&[("status", Value::String("pending".into()))]);
        idx.insert_doc("w", &pending);

        let archived = doc(&[("status", Value::String("archived".into()))]);
        idx.update_doc("w", Some(&pending), &archived);

        assert!(idx.lookup(&[Value::String("pending".into())]).is_empty());
        assert!(idx.lookup(&[Value::String("archived".into())]).contains("w"));
        assert_eq!(idx.entry_count(), 1);
    }

    #[test]
    fn test_update_to_non_indexable_removes_from_index() {
        let idx = FieldIndex::new("by_status", vec!["status".to_string()]);
        let pending = doc(&[("status", Value::String("pending".into()))]);
        idx.insert_doc("w", &pending);

        let other = doc(&[("other", Value::Boolean(true))]);
        let still_indexed = idx.update_doc("w", Some(&pending), &other);

        assert!(!still_indexed);
        assert!(idx.lookup(&[Value::String("pending".into())]).is_empty());
        assert_eq!(idx.entry_count(), 0);
    }

    #[test]
    fn test_composite_range_lookup() {
        let idx = FieldIndex::new("idx", vec!["cat".to_string(), "score".to_string()]);
        let rows = [
            ("a1", "A", 10),
            ("a2", "A", 20),
            ("a3", "A", 30),
            ("b1", "B", 15),
            ("b2", "B", 25),
        ];
        for (id, cat, score) in rows {
            let d = doc(&[
                ("cat", Value::String(cat.into())),
                ("score", Value::Integer(score)),
            ]);
            idx.insert_doc(id, &d);
        }

        let min = [Value::String("A".into()), Value::Integer(25)];
        let max = [Value::String("B".into()), Value::Integer(26)];
        let found = idx.lookup_range(&min, &max);
        let expect: HashSet<String> = ["a3", "b1", "b2"].iter().map(|s| s.to_string()).collect();
        assert_eq!(found, expect);
    }

    #[test]
    fn test_prefix_lookup() {
        let idx = FieldIndex::new("idx", vec!["cat".to_string(), "score".to_string()]);
        let a = doc(&[("cat", Value::String("A".into())), ("score", Value::Integer(1))]);
        let b = doc(&[("cat", Value::String("B".into())), ("score", Value::Integer(2))]);
        idx.insert_doc("a", &a);
        idx.insert_doc("b", &b);

        let found = idx.lookup_prefix(&[Value::String("A".into())]);
        assert!(found.contains("a") && !found.contains("b"));
    }

    #[test]
    fn test_empty_range_when_min_greater_than_max() {
        let idx = FieldIndex::new("idx", vec!["n".to_string()]);
        idx.insert_doc("a", &doc(&[("n", Value::Integer(5))]));
        let found = idx.lookup_range(&[Value::Integer(10)], &[Value::Integer(1)]);
        assert!(found.is_empty());
    }
}
