use std::{
    cell::{Cell, RefCell},
    fmt,
    rc::{Rc, Weak},
};

use rustc_hash::FxHashMap;

use crate::{
    splice::{IndexSplice, KeySplice},
    value::{FxIndexMap, Value},
};

thread_local! {
    static COLLECTIONS: RefCell<FxHashMap<usize, Rc<Collection>>> =
        RefCell::new(FxHashMap::default());
}

/// A registry-assigned stable identifier for an array element, independent of
/// the element's current index. Rendered `#<n>` inside paths.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(u64);

impl Key {
    pub(crate) fn from_raw(raw: u64) -> Key {
        Key(raw)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Identity tracking for one observed array.
///
/// A collection is bound 1:1 to a list instance by reference identity and
/// assigns every element a [`Key`] that survives reordering and splicing.
/// Items are matched by `Value` equality, so distinct objects always get
/// independent keys while duplicate primitive values collapse to a single
/// key. That collapse is a documented limitation of value identity, not
/// something callers should rely on being special-cased away.
pub struct Collection {
    array: Weak<RefCell<Vec<Value>>>,
    items: RefCell<FxIndexMap<Key, Value>>,
    next_key: Cell<u64>,
}

impl Collection {
    /// Returns the cached wrapper for `array`, creating and populating it on
    /// first use. Wrappers for dropped arrays are pruned lazily.
    pub fn get(array: &Rc<RefCell<Vec<Value>>>) -> Rc<Collection> {
        let ptr = Rc::as_ptr(array) as usize;
        COLLECTIONS.with(|collections| {
            let mut collections = collections.borrow_mut();
            collections.retain(|_, c| c.array.strong_count() > 0);
            if let Some(existing) = collections.get(&ptr) {
                return existing.clone();
            }
            let collection = Rc::new(Collection {
                array: Rc::downgrade(array),
                items: RefCell::new(FxIndexMap::default()),
                next_key: Cell::new(0),
            });
            for item in array.borrow().iter() {
                collection.get_key(item);
            }
            collections.insert(ptr, collection.clone());
            collection
        })
    }

    fn mint(&self) -> Key {
        let key = Key(self.next_key.get());
        self.next_key.set(key.0 + 1);
        key
    }

    /// The key already associated with `item`, if any.
    pub fn key_for(&self, item: &Value) -> Option<Key> {
        self.items
            .borrow()
            .iter()
            .find(|(_, v)| *v == item)
            .map(|(k, _)| *k)
    }

    /// The key for `item`, minting and associating a fresh one if the item is
    /// untracked. Deterministic regardless of which observer asks first.
    pub fn get_key(&self, item: &Value) -> Key {
        if let Some(key) = self.key_for(item) {
            return key;
        }
        let key = self.mint();
        self.items.borrow_mut().insert(key, item.clone());
        key
    }

    pub fn get_item(&self, key: Key) -> Option<Value> {
        self.items.borrow().get(&key).cloned()
    }

    /// Re-associates `key` with a new item, preserving row identity across a
    /// whole-element replacement at a stable path.
    pub(crate) fn set_item(&self, key: Key, item: Value) {
        self.items.borrow_mut().insert(key, item);
    }

    /// Keys of the wrapped array's elements in current array order, minting
    /// for any element not yet tracked.
    pub fn get_keys(&self) -> Vec<Key> {
        let Some(array) = self.array.upgrade() else {
            return Vec::new();
        };
        let items = array.borrow();
        items.iter().map(|item| self.get_key(item)).collect()
    }

    /// Index of the element currently associated with `key`, by value lookup
    /// in the wrapped array.
    pub fn index_of(&self, key: Key) -> Option<usize> {
        let item = self.get_item(key)?;
        let array = self.array.upgrade()?;
        let array = array.borrow();
        array.iter().position(|v| *v == item)
    }

    /// Translates index-space splices into key-space splices, in batch order.
    ///
    /// Removed items are looked up (minting if the item was never tracked)
    /// and unmapped; added keys are minted from the post-splice array
    /// contents. A removed-then-re-added element gets a fresh key.
    pub fn apply_splices(&self, splices: &[IndexSplice]) -> Vec<KeySplice> {
        let array = self.array.upgrade();
        splices
            .iter()
            .map(|splice| {
                let removed: Vec<Key> = splice
                    .removed
                    .iter()
                    .map(|item| self.get_key(item))
                    .collect();
                {
                    let mut items = self.items.borrow_mut();
                    for key in &removed {
                        items.shift_remove(key);
                    }
                }
                let added: Vec<Key> = match &array {
                    Some(array) => {
                        let array = array.borrow();
                        array
                            .iter()
                            .skip(splice.index)
                            .take(splice.added_count)
                            .map(|item| self.get_key(item))
                            .collect()
                    }
                    None => Vec::new(),
                };
                KeySplice {
                    index: splice.index,
                    removed,
                    added,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj() -> Value {
        Value::object()
    }

    #[test]
    fn keys_are_stable_across_reorder() {
        let list = Rc::new(RefCell::new(vec![obj(), obj(), obj()]));
        let coll = Collection::get(&list);
        let keys = coll.get_keys();
        list.borrow_mut().swap(0, 2);
        let after = coll.get_keys();
        assert_eq!(after, vec![keys[2], keys[1], keys[0]]);
    }

    #[test]
    fn same_array_same_collection() {
        let list = Rc::new(RefCell::new(vec![obj()]));
        let a = Collection::get(&list);
        let b = Collection::get(&list);
        assert!(Rc::ptr_eq(&a, &b));
    }

    #[test]
    fn duplicate_primitives_share_a_key() {
        let list = Rc::new(RefCell::new(vec![Value::from(1), Value::from(1)]));
        let coll = Collection::get(&list);
        let keys = coll.get_keys();
        assert_eq!(keys[0], keys[1]);
    }

    #[test]
    fn apply_splices_translates_removals_and_additions() {
        let list = Rc::new(RefCell::new(vec![obj(), obj(), obj()]));
        let coll = Collection::get(&list);
        let keys = coll.get_keys();

        // remove the middle element, insert two new ones in its place
        let removed_item = list.borrow_mut().remove(1);
        list.borrow_mut().insert(1, obj());
        list.borrow_mut().insert(2, obj());

        let key_splices = coll.apply_splices(&[IndexSplice {
            index: 1,
            removed: vec![removed_item],
            added_count: 2,
        }]);
        assert_eq!(key_splices.len(), 1);
        assert_eq!(key_splices[0].removed, vec![keys[1]]);
        assert_eq!(key_splices[0].added.len(), 2);
        assert!(coll.get_item(keys[1]).is_none());

        // array order and key order agree afterwards
        let now = coll.get_keys();
        for (i, key) in now.iter().enumerate() {
            assert_eq!(coll.get_item(*key).unwrap(), list.borrow()[i]);
        }
    }
}
