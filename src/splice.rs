use std::rc::Rc;

use crate::{collection::Key, value::Value};

/// One contiguous array mutation in index space.
#[derive(Clone, Debug)]
pub struct IndexSplice {
    /// Position of the mutation in the array as it was before the splice.
    pub index: usize,
    /// The elements removed, in their original order.
    pub removed: Vec<Value>,
    /// How many elements were inserted at `index`.
    pub added_count: usize,
}

/// An [`IndexSplice`] translated into key space by the collection registry.
/// This is the form the repeater consumes.
#[derive(Clone, Debug)]
pub struct KeySplice {
    pub index: usize,
    pub removed: Vec<Key>,
    pub added: Vec<Key>,
}

/// The payload delivered on a `<path>.splices` notification: the batch of
/// index splices applied by one mutation, plus their key-space translation.
#[derive(Debug)]
pub struct SpliceSet {
    pub index_splices: Vec<IndexSplice>,
    pub key_splices: Vec<KeySplice>,
}

/// What changed at a notified path.
///
/// Structured splice batches travel behind an `Rc` so the same payload can be
/// forwarded through any number of effects without copying; two `Splices`
/// changes are equal only when they are the same payload.
#[derive(Clone, Debug)]
pub enum Change {
    Value(Value),
    Splices(Rc<SpliceSet>),
}

impl Change {
    pub fn value(v: impl Into<Value>) -> Change {
        Change::Value(v.into())
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Change::Value(v) => Some(v),
            Change::Splices(_) => None,
        }
    }

    pub fn as_splices(&self) -> Option<&Rc<SpliceSet>> {
        match self {
            Change::Splices(s) => Some(s),
            Change::Value(_) => None,
        }
    }
}

impl PartialEq for Change {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Change::Value(a), Change::Value(b)) => a == b,
            (Change::Splices(a), Change::Splices(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<Value> for Change {
    fn from(v: Value) -> Self {
        Change::Value(v)
    }
}
