//! Module `value` implements the schemaless value model, the total
//! order used to place composite keys in a field index's ordered tree,
//! and the deep-copy routine that isolates document data across the
//! API boundary.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

/// A document is an unordered mapping from field name to value. Field
/// presence is per-document; there is no schema.
pub type Document = HashMap<String, Value>;

/// A schemaless value. Only the first five variants participate in
/// indexing; [`Value::Array`] and [`Value::Object`] may appear in
/// document data but are never used as index key components.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
    Array(Vec<Value>),
    Object(Document),
}

impl Value {
    /// A stable textual label for this value's runtime type, used only
    /// as the rule-5 fallback in [`cmp`] when two values of genuinely
    /// different, non-numeric types are compared.
    fn type_label(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Integer(_) | Value::Float(_) => "number",
            Value::Boolean(_) => "boolean",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Textual rendering used by the rule-6 fallback comparison. Not a
    /// wire format: only used to produce a deterministic total order
    /// between values the earlier rules don't distinguish (e.g. two
    /// arrays).
    fn textual(&self) -> String {
        format!("{:?}", self)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Integer(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::String(s) => write!(f, "{}", s),
            Value::Array(_) | Value::Object(_) => write!(f, "{}", self.textual()),
        }
    }
}

/// Total, stable comparator over heterogeneous values, per the rules in
/// the value-ordering component: both-null compares equal; a null value
/// is less than any non-null value; two numeric values (integer or
/// float) compare as double-precision floats; two values of the same
/// runtime type compare by that type's natural order (falling through
/// to rule 6 for arrays/objects); otherwise values of different runtime
/// types compare by a stable textual type label, and as an ultimate
/// fallback, by their textual rendering.
///
/// This order never fails: it is total by construction and is the sole
/// source of truth for field-index placement and range scans.
pub fn cmp(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => {
            if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
                return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
            }
            match (a, b) {
                (Value::Boolean(x), Value::Boolean(y)) => x.cmp(y),
                (Value::String(x), Value::String(y)) => x.cmp(y),
                _ if a.type_label() == b.type_label() => a.textual().cmp(&b.textual()),
                _ => a.type_label().cmp(b.type_label()),
            }
        }
    }
}

/// An ordered tuple of values extracted from a document's declared
/// index fields. Implements the composite-key ordering: compared
/// element-by-element left to right under [`cmp`]; if one key is a
/// strict prefix of the other, the shorter key is less.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexKey(pub Vec<Value>);

impl IndexKey {
    pub fn new(values: Vec<Value>) -> Self {
        IndexKey(values)
    }

    /// Whether `self` is a (possibly equal-length) prefix of `other`
    /// under element-wise [`cmp`]-equality.
    pub fn is_prefix_of(&self, other: &IndexKey) -> bool {
        if self.0.len() > other.0.len() {
            return false;
        }
        self.0
            .iter()
            .zip(other.0.iter())
            .all(|(x, y)| cmp(x, y) == Ordering::Equal)
    }
}

impl Eq for IndexKey {}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> Ordering {
        for (x, y) in self.0.iter().zip(other.0.iter()) {
            match cmp(x, y) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        self.0.len().cmp(&other.0.len())
    }
}

/// Produce a structurally independent clone of a document: scalars are
/// copied by value, sequences and nested mappings are recursively
/// cloned. Used at every API boundary where caller-supplied or
/// caller-returned document data must be isolated from internal state;
/// returning a shared reference from a read path is forbidden.
pub fn deep_copy(doc: &Document) -> Document {
    doc.iter().map(|(k, v)| (k.clone(), deep_copy_value(v))).collect()
}

fn deep_copy_value(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Integer(n) => Value::Integer(*n),
        Value::Float(n) => Value::Float(*n),
        Value::Boolean(b) => Value::Boolean(*b),
        Value::String(s) => Value::String(s.clone()),
        Value::Array(items) => Value::Array(items.iter().map(deep_copy_value).collect()),
        Value::Object(obj) => Value::Object(deep_copy(obj)),
    }
}
