use std::{cell::RefCell, cmp::Ordering, rc::Rc};

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::trace;

use crate::{
    collection::Collection,
    effects::{EffectContext, EffectId, PathEffect},
    error::BindError,
    path::{dash_case, Path, Segment},
    splice::{Change, IndexSplice, SpliceSet},
    value::Value,
};

/// The structured change signal fired to external listeners when a
/// top-level-owned path changes and the change did not originate from a
/// downward forward. `name` is derived from the root property
/// (`myItems` → `my-items-changed`).
pub struct PropertyEvent {
    pub name: String,
    pub path: Path,
    pub change: Change,
}

/// A named sort or filter resolvable on a data host.
#[derive(Clone)]
pub enum HostMethod {
    Sort(Rc<dyn Fn(&Value, &Value) -> Ordering>),
    Filter(Rc<dyn Fn(&Value) -> bool>),
}

/// The capability any object participating in path notification exposes.
pub trait Observable {
    fn get_path(&self, path: &Path) -> Option<Value>;
    fn set_path(&self, path: &Path, value: Value);
    fn notify_change(&self, path: &Path, change: Change, from_above: bool);
}

/// Result of resolving all but the last segment of a path.
struct Resolved {
    /// The value holding the leaf segment.
    parent: Value,
    /// All-but-leaf segments with numeric list positions rewritten to their
    /// stable key form, so the notified path survives reorders.
    canonical: SmallVec<[Segment; 4]>,
}

/// A bindable object: application data plus the notifier state attached to
/// it. The notifier attaches behavior, not storage; the data graph stays an
/// ordinary [`Value`] tree owned by application code.
///
/// All notification is synchronous and re-entrant. An effect handler may call
/// [`set`](Bindable::set) again; the dirty check terminates cyclic link
/// forwarding, while unbounded recursion through cyclic *bindings* remains
/// the caller's hazard.
pub struct Bindable {
    data: Value,
    effects: RefCell<FxHashMap<String, Vec<Rc<PathEffect>>>>,
    links: RefCell<Vec<(Path, Path)>>,
    seen: RefCell<FxHashMap<Path, Change>>,
    listeners: RefCell<Vec<Rc<dyn Fn(&PropertyEvent)>>>,
    methods: RefCell<FxHashMap<String, HostMethod>>,
}

impl Default for Bindable {
    fn default() -> Self {
        Self::new()
    }
}

impl Bindable {
    pub fn new() -> Bindable {
        Bindable::with_data(Value::object())
    }

    /// Wraps an existing object value. The root must be an object; its
    /// top-level fields are the root properties effects register under.
    pub fn with_data(data: Value) -> Bindable {
        debug_assert!(data.as_object().is_some(), "bindable data is an object");
        Bindable {
            data,
            effects: RefCell::new(FxHashMap::default()),
            links: RefCell::new(Vec::new()),
            seen: RefCell::new(FxHashMap::default()),
            listeners: RefCell::new(Vec::new()),
            methods: RefCell::new(FxHashMap::default()),
        }
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    // ---- path access ----

    /// Reads the value at `path`, or `None` past any undefined segment.
    pub fn get(&self, path: impl Into<Path>) -> Option<Value> {
        let path = path.into();
        Self::get_from(&self.data, &path)
    }

    pub(crate) fn get_from(start: &Value, path: &Path) -> Option<Value> {
        let resolved = Self::descend(start, path)?;
        Self::read_leaf(&resolved.parent, path.leaf())
    }

    /// Writes `value` at `path` and notifies, unless the write falls through
    /// an undefined intermediate (silent no-op) or the value is unchanged.
    pub fn set(&self, path: impl Into<Path>, value: impl Into<Value>) {
        self.set_in(None, path.into(), value.into());
    }

    /// Writes through `root` instead of this object's own data. Writes on a
    /// detached model do not notify.
    pub fn set_on(&self, root: &Value, path: impl Into<Path>, value: impl Into<Value>) {
        self.set_in(Some(root), path.into(), value.into());
    }

    /// Walks all but the last segment. A key segment is translated through
    /// the collection of the list traversed on the previous step; a numeric
    /// segment into such a list is rewritten to key form in the canonical
    /// path. The translation is deliberately one list level deep — the flag
    /// carries over exactly one step, matching the long-standing behavior of
    /// the path engine this reimplements.
    fn descend(start: &Value, path: &Path) -> Option<Resolved> {
        let mut cur = start.clone();
        let mut array: Option<Rc<RefCell<Vec<Value>>>> = None;
        let mut canonical: SmallVec<[Segment; 4]> = SmallVec::new();
        for seg in &path.segments()[..path.len() - 1] {
            let next = match (&array, seg) {
                (Some(list), Segment::Key(key)) => {
                    canonical.push(seg.clone());
                    Collection::get(list).get_item(*key)
                }
                (Some(list), Segment::Index(_)) => {
                    let next = cur.member(seg);
                    match &next {
                        Some(item) => {
                            canonical.push(Segment::Key(Collection::get(list).get_key(item)));
                        }
                        None => canonical.push(seg.clone()),
                    }
                    next
                }
                _ => {
                    canonical.push(seg.clone());
                    cur.member(seg)
                }
            };
            let next = next?;
            if next.is_null() {
                return None;
            }
            array = next.as_list().cloned();
            cur = next;
        }
        Some(Resolved {
            parent: cur,
            canonical,
        })
    }

    fn read_leaf(parent: &Value, leaf: &Segment) -> Option<Value> {
        match (parent, leaf) {
            (Value::List(list), Segment::Key(key)) => Collection::get(list).get_item(*key),
            _ => parent.member(leaf),
        }
    }

    fn set_in(&self, root: Option<&Value>, path: Path, value: Value) {
        let start = root.cloned().unwrap_or_else(|| self.data.clone());
        let Some(resolved) = Self::descend(&start, &path) else {
            return;
        };
        let leaf = path.leaf();
        let mut canonical_leaf = leaf.clone();
        let old: Option<Value> = match (&resolved.parent, leaf) {
            (Value::List(list), Segment::Key(key)) => {
                let coll = Collection::get(list);
                let Some(index) = coll.index_of(*key) else {
                    return;
                };
                let prev = {
                    let mut items = list.borrow_mut();
                    std::mem::replace(&mut items[index], value.clone())
                };
                coll.set_item(*key, value.clone());
                Some(prev)
            }
            (Value::List(list), Segment::Index(index)) => {
                let coll = Collection::get(list);
                let prev = {
                    let mut items = list.borrow_mut();
                    if *index >= items.len() {
                        return;
                    }
                    std::mem::replace(&mut items[*index], value.clone())
                };
                let key = coll.get_key(&prev);
                coll.set_item(key, value.clone());
                canonical_leaf = Segment::Key(key);
                Some(prev)
            }
            (Value::Object(map), Segment::Prop(name)) => {
                map.borrow_mut().insert(name.to_string(), value.clone())
            }
            (Value::Object(map), Segment::Index(index)) => {
                map.borrow_mut().insert(index.to_string(), value.clone())
            }
            _ => return,
        };
        if root.is_some() {
            // detached model: the caller owns notification
            return;
        }
        if old.as_ref() == Some(&value) {
            return;
        }
        let mut segments = resolved.canonical;
        segments.push(canonical_leaf);
        self.notify_path_change(Path::from_segments(segments), Change::Value(value), false);
    }

    // ---- notification ----

    /// Notifies a change at `path`. Redundant notifications are suppressed by
    /// a shallow equality check against the last notified change — exactly
    /// once per call, never deeply.
    pub fn notify_path(&self, path: impl Into<Path>, change: Change, from_above: bool) {
        self.notify_path_change(path.into(), change, from_above);
    }

    fn notify_path_change(&self, path: Path, change: Change, from_above: bool) {
        {
            let mut seen = self.seen.borrow_mut();
            if seen.get(&path) == Some(&change) {
                return;
            }
            seen.insert(path.clone(), change.clone());
        }
        trace!(path = %path, from_above, "path changed");
        self.dispatch_path_effects(&path, &change);
        self.forward_linked_paths(&path, &change);
        if !from_above {
            self.fire_changed_event(&path, &change);
        }
    }

    fn dispatch_path_effects(&self, changed: &Path, change: &Change) {
        let Segment::Prop(root) = changed.root() else {
            return;
        };
        let effects: Vec<Rc<PathEffect>> = match self.effects.borrow().get(&**root) {
            Some(effects) => effects.clone(),
            None => return,
        };
        for effect in effects {
            if effect.kind.is_relevant(changed) {
                (effect.run)(EffectContext {
                    host: self,
                    changed,
                    change,
                });
            }
        }
    }

    fn forward_linked_paths(&self, changed: &Path, change: &Change) {
        let links: Vec<(Path, Path)> = self.links.borrow().clone();
        for (alias, source) in links {
            if alias.is_prefix_of(changed) {
                if let Some(forwarded) = changed.rebase(&alias, &source) {
                    self.notify_path_change(forwarded, change.clone(), true);
                }
            } else if source.is_prefix_of(changed) {
                if let Some(forwarded) = changed.rebase(&source, &alias) {
                    self.notify_path_change(forwarded, change.clone(), true);
                }
            }
        }
    }

    fn fire_changed_event(&self, path: &Path, change: &Change) {
        let Segment::Prop(root) = path.root() else {
            return;
        };
        let event = PropertyEvent {
            name: format!("{}-changed", dash_case(root)),
            path: path.clone(),
            change: change.clone(),
        };
        let listeners: Vec<_> = self.listeners.borrow().clone();
        for listener in listeners {
            listener(&event);
        }
    }

    pub fn add_listener(&self, listener: impl Fn(&PropertyEvent) + 'static) {
        self.listeners.borrow_mut().push(Rc::new(listener));
    }

    // ---- effects and links ----

    /// Registers a path effect under a root property name. Effects are
    /// immutable once registered; the notifier only reads and dispatches.
    pub fn add_path_effect(&self, root: &str, effect: PathEffect) -> EffectId {
        let id = effect.id();
        self.effects
            .borrow_mut()
            .entry(root.to_string())
            .or_default()
            .push(Rc::new(effect));
        id
    }

    pub fn remove_path_effect(&self, root: &str, id: EffectId) {
        if let Some(effects) = self.effects.borrow_mut().get_mut(root) {
            effects.retain(|e| e.id() != id);
        }
    }

    /// Aliases `alias` to `source`: changes under either side are forwarded
    /// to the other with the path rebased, delivered as coming from above so
    /// they cannot re-ascend.
    pub fn link_paths(&self, alias: impl Into<Path>, source: impl Into<Path>) {
        self.links.borrow_mut().push((alias.into(), source.into()));
    }

    pub fn unlink_paths(&self, alias: impl Into<Path>) {
        let alias = alias.into();
        self.links.borrow_mut().retain(|(a, _)| *a != alias);
    }

    // ---- named host methods ----

    pub fn register_sort_method(
        &self,
        name: &str,
        f: impl Fn(&Value, &Value) -> Ordering + 'static,
    ) {
        self.methods
            .borrow_mut()
            .insert(name.to_string(), HostMethod::Sort(Rc::new(f)));
    }

    pub fn register_filter_method(&self, name: &str, f: impl Fn(&Value) -> bool + 'static) {
        self.methods
            .borrow_mut()
            .insert(name.to_string(), HostMethod::Filter(Rc::new(f)));
    }

    pub fn method(&self, name: &str) -> Option<HostMethod> {
        self.methods.borrow().get(name).cloned()
    }

    // ---- array mutation proxy ----

    fn list_at(&self, path: &Path) -> Result<Rc<RefCell<Vec<Value>>>, BindError> {
        match self.get(path) {
            Some(Value::List(list)) => Ok(list),
            _ => Err(BindError::NotAnArray(path.clone())),
        }
    }

    /// Appends `values` and notifies one splice. Returns the new length.
    pub fn push(
        &self,
        path: impl Into<Path>,
        values: impl IntoIterator<Item = Value>,
    ) -> Result<usize, BindError> {
        let path = path.into();
        let list = self.list_at(&path)?;
        let values: Vec<Value> = values.into_iter().collect();
        let (index, new_len) = {
            let mut items = list.borrow_mut();
            let index = items.len();
            items.extend(values.iter().cloned());
            (index, items.len())
        };
        if !values.is_empty() {
            self.notify_splice(
                &path,
                &list,
                IndexSplice {
                    index,
                    removed: Vec::new(),
                    added_count: values.len(),
                },
                true,
            );
        }
        Ok(new_len)
    }

    /// Removes and returns the last element, notifying one splice.
    pub fn pop(&self, path: impl Into<Path>) -> Result<Option<Value>, BindError> {
        let path = path.into();
        let list = self.list_at(&path)?;
        let popped = {
            let mut items = list.borrow_mut();
            items.pop().map(|v| (v, items.len()))
        };
        let Some((removed, index)) = popped else {
            return Ok(None);
        };
        self.notify_splice(
            &path,
            &list,
            IndexSplice {
                index,
                removed: vec![removed.clone()],
                added_count: 0,
            },
            true,
        );
        Ok(Some(removed))
    }

    /// Removes and returns the first element, notifying one splice.
    pub fn shift(&self, path: impl Into<Path>) -> Result<Option<Value>, BindError> {
        let path = path.into();
        let list = self.list_at(&path)?;
        let removed = {
            let mut items = list.borrow_mut();
            if items.is_empty() {
                None
            } else {
                Some(items.remove(0))
            }
        };
        let Some(removed) = removed else {
            return Ok(None);
        };
        self.notify_splice(
            &path,
            &list,
            IndexSplice {
                index: 0,
                removed: vec![removed.clone()],
                added_count: 0,
            },
            true,
        );
        Ok(Some(removed))
    }

    /// Prepends `values`, notifying one splice. Returns the new length.
    pub fn unshift(
        &self,
        path: impl Into<Path>,
        values: impl IntoIterator<Item = Value>,
    ) -> Result<usize, BindError> {
        let path = path.into();
        let list = self.list_at(&path)?;
        let values: Vec<Value> = values.into_iter().collect();
        let new_len = {
            let mut items = list.borrow_mut();
            for (i, v) in values.iter().enumerate() {
                items.insert(i, v.clone());
            }
            items.len()
        };
        if !values.is_empty() {
            self.notify_splice(
                &path,
                &list,
                IndexSplice {
                    index: 0,
                    removed: Vec::new(),
                    added_count: values.len(),
                },
                true,
            );
        }
        Ok(new_len)
    }

    /// Removes `delete_count` elements at `start`, inserting `insert` in
    /// their place. Synthesizes exactly one splice record describing the net
    /// effect. Returns the removed elements.
    pub fn splice(
        &self,
        path: impl Into<Path>,
        start: usize,
        delete_count: usize,
        insert: Vec<Value>,
    ) -> Result<Vec<Value>, BindError> {
        let path = path.into();
        let list = self.list_at(&path)?;
        let (start, removed, len_changed) = {
            let mut items = list.borrow_mut();
            let old_len = items.len();
            let start = start.min(old_len);
            let delete = delete_count.min(old_len - start);
            let removed: Vec<Value> = items
                .splice(start..start + delete, insert.iter().cloned())
                .collect();
            (start, removed, items.len() != old_len)
        };
        if !removed.is_empty() || !insert.is_empty() {
            self.notify_splice(
                &path,
                &list,
                IndexSplice {
                    index: start,
                    removed: removed.clone(),
                    added_count: insert.len(),
                },
                len_changed,
            );
        }
        Ok(removed)
    }

    fn notify_splice(
        &self,
        path: &Path,
        list: &Rc<RefCell<Vec<Value>>>,
        splice: IndexSplice,
        len_changed: bool,
    ) {
        let coll = Collection::get(list);
        let index_splices = vec![splice];
        let key_splices = coll.apply_splices(&index_splices);
        let set = Rc::new(SpliceSet {
            index_splices,
            key_splices,
        });
        self.notify_path_change(
            path.child(Segment::prop("splices")),
            Change::Splices(set),
            false,
        );
        if len_changed {
            let len = list.borrow().len();
            self.notify_path_change(
                path.child(Segment::prop("length")),
                Change::value(len),
                false,
            );
        }
    }
}

impl Observable for Bindable {
    fn get_path(&self, path: &Path) -> Option<Value> {
        self.get(path)
    }

    fn set_path(&self, path: &Path, value: Value) {
        self.set(path, value);
    }

    fn notify_change(&self, path: &Path, change: Change, from_above: bool) {
        self.notify_path(path, change, from_above);
    }
}
