use std::{
    cell::{Cell, RefCell},
    cmp::Ordering,
    rc::{Rc, Weak},
};

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::{
    collection::{Collection, Key},
    effects::{EffectId, EffectKind, PathEffect},
    error::BindError,
    notify::{Bindable, HostMethod},
    path::{Path, Segment},
    render::{InstanceId, RenderSink},
    scheduler::{Scheduler, TaskHandle},
    splice::{Change, KeySplice},
    value::Value,
};

pub type SortFn = Rc<dyn Fn(&Value, &Value) -> Ordering>;
pub type FilterFn = Rc<dyn Fn(&Value) -> bool>;

/// A sort comparator, given directly or resolved by name on the host.
#[derive(Clone)]
pub enum SortSpec {
    Func(SortFn),
    Method(String),
}

impl SortSpec {
    pub fn func(f: impl Fn(&Value, &Value) -> Ordering + 'static) -> SortSpec {
        SortSpec::Func(Rc::new(f))
    }
}

/// A filter predicate, given directly or resolved by name on the host.
#[derive(Clone)]
pub enum FilterSpec {
    Func(FilterFn),
    Method(String),
}

impl FilterSpec {
    pub fn func(f: impl Fn(&Value) -> bool + 'static) -> FilterSpec {
        FilterSpec::Func(Rc::new(f))
    }
}

struct Row {
    key: Key,
    item: Value,
    index: usize,
    instance: InstanceId,
}

/// A live, ordered, filtered/sorted projection of an observed array as a
/// sequence of rendered template instances.
///
/// The repeater registers itself on the host as an annotation effect bound to
/// the items path, so every `items.*` change reaches it: whole-array
/// replacement rebinds, `.splices` batches accumulate for the next render
/// pass, and element-level sub-paths are forwarded to the owning row only.
/// Renders are deferred through the scheduler so mutations in one tick
/// coalesce into a single pass; rescheduling supersedes any pending pass.
pub struct Repeater {
    host: Rc<Bindable>,
    items_path: Path,
    sink: Rc<RefCell<dyn RenderSink>>,
    as_name: RefCell<String>,
    index_as: RefCell<String>,
    sort: RefCell<Option<SortFn>>,
    filter: RefCell<Option<FilterFn>>,
    observe: RefCell<Vec<Path>>,
    delay: Cell<Option<u64>>,
    items: RefCell<Option<Rc<RefCell<Vec<Value>>>>>,
    ordered_keys: RefCell<Vec<Key>>,
    rows: RefCell<Vec<Row>>,
    row_for_key: RefCell<FxHashMap<Key, usize>>,
    pool: RefCell<Vec<InstanceId>>,
    pending_splices: RefCell<Vec<KeySplice>>,
    full_refresh: Cell<bool>,
    pending: RefCell<Option<TaskHandle>>,
    render_listeners: RefCell<Vec<Rc<dyn Fn()>>>,
    effect_id: Cell<Option<EffectId>>,
    this: RefCell<Weak<Repeater>>,
}

impl Repeater {
    pub fn new(
        host: Rc<Bindable>,
        items_path: impl Into<Path>,
        sink: Rc<RefCell<dyn RenderSink>>,
    ) -> Rc<Repeater> {
        let items_path = items_path.into();
        let repeater = Rc::new(Repeater {
            host: host.clone(),
            items_path: items_path.clone(),
            sink,
            as_name: RefCell::new("item".to_string()),
            index_as: RefCell::new("index".to_string()),
            sort: RefCell::new(None),
            filter: RefCell::new(None),
            observe: RefCell::new(Vec::new()),
            delay: Cell::new(None),
            items: RefCell::new(None),
            ordered_keys: RefCell::new(Vec::new()),
            rows: RefCell::new(Vec::new()),
            row_for_key: RefCell::new(FxHashMap::default()),
            pool: RefCell::new(Vec::new()),
            pending_splices: RefCell::new(Vec::new()),
            full_refresh: Cell::new(false),
            pending: RefCell::new(None),
            render_listeners: RefCell::new(Vec::new()),
            effect_id: Cell::new(None),
            this: RefCell::new(Weak::new()),
        });
        *repeater.this.borrow_mut() = Rc::downgrade(&repeater);

        if let Segment::Prop(root) = items_path.root() {
            let weak = Rc::downgrade(&repeater);
            let id = host.add_path_effect(
                root,
                PathEffect::new(
                    EffectKind::Annotation {
                        source: items_path.clone(),
                        negate: false,
                    },
                    move |ctx| {
                        if let Some(repeater) = weak.upgrade() {
                            repeater.host_path_changed(ctx.changed, ctx.change);
                        }
                    },
                ),
            );
            repeater.effect_id.set(Some(id));
        }

        repeater.rebind_items();
        repeater
    }

    // ---- configuration ----

    pub fn set_as(&self, name: &str) {
        *self.as_name.borrow_mut() = name.to_string();
    }

    pub fn set_index_as(&self, name: &str) {
        *self.index_as.borrow_mut() = name.to_string();
    }

    /// Configures the sort order. A named method that is missing or
    /// registered for the wrong role fails here, not at first comparison.
    pub fn set_sort(&self, spec: Option<SortSpec>) -> Result<(), BindError> {
        let resolved = match spec {
            None => None,
            Some(SortSpec::Func(f)) => Some(f),
            Some(SortSpec::Method(name)) => match self.host.method(&name) {
                Some(HostMethod::Sort(f)) => Some(f),
                Some(_) => return Err(BindError::MethodKindMismatch(name)),
                None => return Err(BindError::UnknownSortMethod(name)),
            },
        };
        *self.sort.borrow_mut() = resolved;
        self.full_refresh.set(true);
        self.schedule_render(false);
        Ok(())
    }

    /// Configures the filter predicate, with the same fail-fast resolution
    /// as [`set_sort`](Repeater::set_sort).
    pub fn set_filter(&self, spec: Option<FilterSpec>) -> Result<(), BindError> {
        let resolved = match spec {
            None => None,
            Some(FilterSpec::Func(f)) => Some(f),
            Some(FilterSpec::Method(name)) => match self.host.method(&name) {
                Some(HostMethod::Filter(f)) => Some(f),
                Some(_) => return Err(BindError::MethodKindMismatch(name)),
                None => return Err(BindError::UnknownFilterMethod(name)),
            },
        };
        *self.filter.borrow_mut() = resolved;
        self.full_refresh.set(true);
        self.schedule_render(false);
        Ok(())
    }

    /// Space-separated item sub-paths whose deep mutation forces a re-sort or
    /// re-filter even though list membership did not change through a splice.
    pub fn set_observe(&self, paths: &str) {
        *self.observe.borrow_mut() = paths.split_whitespace().map(Path::parse).collect();
    }

    /// Debounce for observe-triggered renders, in scheduler milliseconds.
    pub fn set_delay(&self, delay_ms: Option<u64>) {
        self.delay.set(delay_ms);
    }

    /// Registers a callback fired once per completed render pass.
    pub fn on_render(&self, f: impl Fn() + 'static) {
        self.render_listeners.borrow_mut().push(Rc::new(f));
    }

    // ---- change intake ----

    fn rebind_items(&self) {
        let items = self
            .host
            .get(&self.items_path)
            .and_then(|v| v.as_list().cloned());
        *self.items.borrow_mut() = items;
        self.full_refresh.set(true);
        self.schedule_render(false);
    }

    fn host_path_changed(&self, changed: &Path, change: &Change) {
        let Some(rest) = changed.strip_prefix(&self.items_path) else {
            // an ancestor of the items path changed wholesale
            self.rebind_items();
            return;
        };
        if rest.is_empty() {
            let items = change.as_value().and_then(|v| v.as_list().cloned());
            *self.items.borrow_mut() = items;
            self.full_refresh.set(true);
            self.schedule_render(false);
            return;
        }
        match &rest[0] {
            Segment::Prop(name) if &**name == "splices" => {
                if let Change::Splices(set) = change {
                    self.pending_splices
                        .borrow_mut()
                        .extend(set.key_splices.iter().cloned());
                    self.schedule_render(false);
                }
            }
            Segment::Prop(name) if &**name == "length" => {}
            segment => {
                let key = match segment {
                    Segment::Key(key) => Some(*key),
                    Segment::Index(index) => self.key_at_index(*index),
                    Segment::Prop(_) => None,
                };
                let Some(key) = key else {
                    return;
                };
                let sub = &rest[1..];
                if sub.is_empty() {
                    self.replace_item(key, change);
                } else {
                    self.forward_item_change(key, sub, change);
                }
            }
        }
    }

    fn key_at_index(&self, index: usize) -> Option<Key> {
        let items = self.items.borrow();
        let list = items.as_ref()?;
        let item = list.borrow().get(index)?.clone();
        Some(Collection::get(list).get_key(&item))
    }

    /// Whole-item replacement on one row: rebind the row's value directly,
    /// then re-derive order if a sort or filter could be affected.
    fn replace_item(&self, key: Key, change: &Change) {
        let Some(value) = change.as_value() else {
            return;
        };
        if let Some(&row_index) = self.row_for_key.borrow().get(&key) {
            let mut rows = self.rows.borrow_mut();
            if let Some(row) = rows.get_mut(row_index) {
                row.item = value.clone();
                self.sink.borrow_mut().set_instance_property(
                    row.instance,
                    &self.as_name.borrow(),
                    value,
                );
            }
        }
        if self.sort.borrow().is_some() || self.filter.borrow().is_some() {
            self.full_refresh.set(true);
            self.schedule_render(false);
        }
    }

    /// A sub-path change on one element: pushed down only to the owning
    /// row's instance, rebased into the item scope.
    fn forward_item_change(&self, key: Key, sub: &[Segment], change: &Change) {
        if let Some(value) = change.as_value() {
            if let Some(&row_index) = self.row_for_key.borrow().get(&key) {
                let rows = self.rows.borrow();
                if let Some(row) = rows.get(row_index) {
                    let name = format!("{}.{}", self.as_name.borrow(), dotted(sub));
                    self.sink
                        .borrow_mut()
                        .set_instance_property(row.instance, &name, value);
                }
            }
        }
        let ordering_active =
            self.sort.borrow().is_some() || self.filter.borrow().is_some();
        if ordering_active && self.observes(sub) {
            self.full_refresh.set(true);
            self.schedule_render(true);
        }
    }

    fn observes(&self, sub: &[Segment]) -> bool {
        let sub = Path::from_segments(sub.iter().cloned().collect());
        self.observe
            .borrow()
            .iter()
            .any(|o| o.is_prefix_of(&sub) || sub.is_prefix_of(o))
    }

    /// A change made inside a row's bound scope, pushed up to the host.
    /// `path` is relative to the instance (`<as>.<subpath>` or `<as>`
    /// alone for whole-item replacement).
    pub fn forward_instance_path(&self, row: usize, path: impl Into<Path>, value: impl Into<Value>) {
        let path = path.into();
        let as_root = Path::parse(&self.as_name.borrow());
        let Some(sub) = path.strip_prefix(&as_root) else {
            return;
        };
        let sub: Vec<Segment> = sub.to_vec();
        let key = {
            let rows = self.rows.borrow();
            match rows.get(row) {
                Some(row) => row.key,
                None => return,
            }
        };
        let host_path = self.items_path.child(Segment::Key(key)).join(&sub);
        self.host.set(host_path, value.into());
    }

    // ---- rendering ----

    fn schedule_render(&self, delayed: bool) {
        if let Some(prev) = self.pending.borrow_mut().take() {
            prev.cancel();
        }
        let weak = self.this.borrow().clone();
        let delay = if delayed { self.delay.get() } else { None };
        let handle = Scheduler::schedule(delay, move || {
            if let Some(repeater) = weak.upgrade() {
                repeater.render_now();
            }
        });
        *self.pending.borrow_mut() = Some(handle);
    }

    /// Renders synchronously, superseding any pending deferred pass.
    pub fn render(&self) {
        if let Some(pending) = self.pending.borrow_mut().take() {
            pending.cancel();
        }
        self.render_now();
    }

    fn render_now(&self) {
        self.pending.borrow_mut().take();

        let items = self.items.borrow().clone();
        let coll = items.as_ref().map(Collection::get);
        let sort = self.sort.borrow().clone();
        let filter = self.filter.borrow().clone();
        let splices: Vec<KeySplice> = self.pending_splices.borrow_mut().drain(..).collect();
        let full = self.full_refresh.take() || (filter.is_some() && !splices.is_empty());

        {
            let mut keys = self.ordered_keys.borrow_mut();
            match &coll {
                None => keys.clear(),
                Some(coll) => {
                    if full {
                        *keys = Self::compute_full(coll, &sort, &filter);
                    } else if !splices.is_empty() {
                        match &sort {
                            None => Self::apply_splices_direct(&mut keys, &splices),
                            Some(cmp) => {
                                Self::apply_splices_sorted(&mut keys, &splices, coll, cmp)
                            }
                        }
                    }
                }
            }
        }

        self.update_rows(coll.as_deref());

        debug!(
            items = %self.items_path,
            rows = self.rows.borrow().len(),
            full,
            "render pass"
        );
        let listeners: Vec<_> = self.render_listeners.borrow().clone();
        for listener in listeners {
            listener();
        }
    }

    /// Recomputes the whole ordered key sequence: array order (or the
    /// collection key list under a sort), filtered, then sorted.
    fn compute_full(coll: &Collection, sort: &Option<SortFn>, filter: &Option<FilterFn>) -> Vec<Key> {
        let mut keys = coll.get_keys();
        if let Some(filter) = filter {
            keys.retain(|key| {
                coll.get_item(*key)
                    .map(|item| filter(&item))
                    .unwrap_or(false)
            });
        }
        if let Some(cmp) = sort {
            keys.sort_by(|a, b| {
                let a = coll.get_item(*a).unwrap_or(Value::Null);
                let b = coll.get_item(*b).unwrap_or(Value::Null);
                cmp(&a, &b)
            });
        }
        keys
    }

    /// View order equals array order, so each splice applies at its reported
    /// index unchanged.
    fn apply_splices_direct(keys: &mut Vec<Key>, splices: &[KeySplice]) {
        for splice in splices {
            let start = splice.index.min(keys.len());
            let end = (start + splice.removed.len()).min(keys.len());
            keys.splice(start..end, splice.added.iter().cloned());
        }
    }

    /// Under a sort order, removals drop their current row and additions go
    /// through comparator binary search, avoiding a full resort for small
    /// batches.
    fn apply_splices_sorted(
        keys: &mut Vec<Key>,
        splices: &[KeySplice],
        coll: &Collection,
        cmp: &SortFn,
    ) {
        for splice in splices {
            for key in &splice.removed {
                if let Some(pos) = keys.iter().position(|k| k == key) {
                    keys.remove(pos);
                }
            }
            for key in &splice.added {
                let item = coll.get_item(*key).unwrap_or(Value::Null);
                let at = Self::insertion_index(keys, &item, coll, cmp);
                keys.insert(at, *key);
            }
        }
    }

    /// Comparator binary search. An equal comparison inserts at the probe
    /// point; ties are not otherwise disambiguated.
    fn insertion_index(keys: &[Key], item: &Value, coll: &Collection, cmp: &SortFn) -> usize {
        let mut lo = 0;
        let mut hi = keys.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            let other = coll.get_item(keys[mid]).unwrap_or(Value::Null);
            match cmp(item, &other) {
                Ordering::Less => hi = mid,
                Ordering::Greater => lo = mid + 1,
                Ordering::Equal => return mid,
            }
        }
        lo
    }

    /// Walks the finalized key order, rebinding rows in place, growing from
    /// the pool (or fresh instances) and detaching extras back into it.
    fn update_rows(&self, coll: Option<&Collection>) {
        let keys = self.ordered_keys.borrow().clone();
        let as_name = self.as_name.borrow().clone();
        let index_as = self.index_as.borrow().clone();
        let mut rows = self.rows.borrow_mut();
        let mut pool = self.pool.borrow_mut();
        let mut sink = self.sink.borrow_mut();

        for (i, key) in keys.iter().enumerate() {
            let item = coll
                .and_then(|c| c.get_item(*key))
                .unwrap_or(Value::Null);
            if let Some(row) = rows.get_mut(i) {
                if row.key != *key {
                    row.key = *key;
                    sink.set_instance_property(row.instance, "key", &Value::from(key.to_string()));
                }
                if row.item != item {
                    row.item = item.clone();
                    sink.set_instance_property(row.instance, &as_name, &item);
                }
                if row.index != i {
                    row.index = i;
                    sink.set_instance_property(row.instance, &index_as, &Value::from(i));
                }
            } else {
                let instance = match pool.pop() {
                    Some(instance) => instance,
                    None => sink.create_instance(&item),
                };
                sink.insert_before(instance, None);
                sink.set_instance_property(instance, &as_name, &item);
                sink.set_instance_property(instance, "key", &Value::from(key.to_string()));
                sink.set_instance_property(instance, &index_as, &Value::from(i));
                rows.push(Row {
                    key: *key,
                    item,
                    index: i,
                    instance,
                });
            }
        }
        while rows.len() > keys.len() {
            let row = rows.pop().expect("row walk shrink");
            sink.detach(row.instance);
            pool.push(row.instance);
        }

        let mut row_for_key = self.row_for_key.borrow_mut();
        row_for_key.clear();
        for (i, row) in rows.iter().enumerate() {
            row_for_key.insert(row.key, i);
        }
    }

    // ---- inspection ----

    pub fn ordered_keys(&self) -> Vec<Key> {
        self.ordered_keys.borrow().clone()
    }

    pub fn row_for_key(&self, key: Key) -> Option<usize> {
        self.row_for_key.borrow().get(&key).copied()
    }

    pub fn len(&self) -> usize {
        self.rows.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.borrow().is_empty()
    }

    pub fn instance_at(&self, row: usize) -> Option<InstanceId> {
        self.rows.borrow().get(row).map(|r| r.instance)
    }

    pub fn item_at(&self, row: usize) -> Option<Value> {
        self.rows.borrow().get(row).map(|r| r.item.clone())
    }

    /// Detaches every row and unhooks the repeater from its host.
    pub fn teardown(&self) {
        if let Some(pending) = self.pending.borrow_mut().take() {
            pending.cancel();
        }
        if let Some(id) = self.effect_id.take() {
            if let Segment::Prop(root) = self.items_path.root() {
                self.host.remove_path_effect(root, id);
            }
        }
        let mut rows = self.rows.borrow_mut();
        let mut sink = self.sink.borrow_mut();
        let mut pool = self.pool.borrow_mut();
        for row in rows.drain(..) {
            sink.detach(row.instance);
            pool.push(row.instance);
        }
        self.row_for_key.borrow_mut().clear();
        self.ordered_keys.borrow_mut().clear();
    }
}

fn dotted(segments: &[Segment]) -> String {
    let mut out = String::new();
    for (i, seg) in segments.iter().enumerate() {
        if i > 0 {
            out.push('.');
        }
        out.push_str(&seg.to_string());
    }
    out
}
