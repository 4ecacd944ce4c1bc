use std::{
    cell::RefCell,
    fmt,
    hash::BuildHasherDefault,
    rc::Rc,
};

use indexmap::IndexMap;
use rustc_hash::FxHasher;

use crate::path::Segment;

pub(crate) type FxIndexMap<K, V> = IndexMap<K, V, BuildHasherDefault<FxHasher>>;

/// The map behind a [`Value::Object`].
pub type ObjectMap = FxIndexMap<String, Value>;

/// A dynamic value in an observed object graph.
///
/// Primitives compare by value; lists and objects are shared handles that
/// compare by identity. Cloning a `Value` clones the handle, never the graph,
/// so a clone of a list observes the same elements as the original.
///
/// Identity equality is what the notifier's dirty check and the collection
/// registry's item lookup are built on: two structurally equal objects are
/// distinct values, while two equal primitives are indistinguishable.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    List(Rc<RefCell<Vec<Value>>>),
    Object(Rc<RefCell<ObjectMap>>),
}

impl Value {
    /// An empty object value.
    pub fn object() -> Value {
        Value::Object(Rc::new(RefCell::new(ObjectMap::default())))
    }

    /// A list value owning the given elements.
    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Rc<RefCell<Vec<Value>>>> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Rc<RefCell<ObjectMap>>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Whether this value terminates a path traversal when found in an
    /// intermediate position.
    pub(crate) fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Reads one step of a path traversal. Returns `None` for any
    /// member/segment combination that does not resolve.
    pub(crate) fn member(&self, segment: &Segment) -> Option<Value> {
        match (self, segment) {
            (Value::Object(map), Segment::Prop(name)) => map.borrow().get(&**name).cloned(),
            // Numeric segments address object fields by their string form,
            // the way a dynamic host language would.
            (Value::Object(map), Segment::Index(i)) => map.borrow().get(&i.to_string()).cloned(),
            (Value::List(list), Segment::Index(i)) => list.borrow().get(*i).cloned(),
            (Value::List(list), Segment::Prop(name)) if &**name == "length" => {
                Some(Value::Int(list.borrow().len() as i64))
            }
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::List(l) => f.debug_list().entries(l.borrow().iter()).finish(),
            Value::Object(o) => f.debug_map().entries(o.borrow().iter()).finish(),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(Rc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(Rc::from(v.as_str()))
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::list(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitives_compare_by_value() {
        assert_eq!(Value::from(1), Value::from(1));
        assert_eq!(Value::from(1), Value::Float(1.0));
        assert_eq!(Value::from("a"), Value::from("a"));
        assert_ne!(Value::from(1), Value::from(2));
    }

    #[test]
    fn references_compare_by_identity() {
        let a = Value::list(vec![Value::from(1)]);
        let b = Value::list(vec![Value::from(1)]);
        assert_ne!(a, b);
        assert_eq!(a, a.clone());

        let o = Value::object();
        assert_eq!(o, o.clone());
        assert_ne!(o, Value::object());
    }

    #[test]
    fn list_length_member() {
        let l = Value::list(vec![Value::from(1), Value::from(2)]);
        let len = l.member(&Segment::prop("length"));
        assert_eq!(len, Some(Value::Int(2)));
    }
}
