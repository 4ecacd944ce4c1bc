use std::{
    cell::{Cell, RefCell},
    rc::Rc,
};

use bindery::{
    Bindable, Change, Collection, EffectArg, EffectKind, PathEffect, Value,
};

fn obj() -> Value {
    Value::object()
}

fn obj_with(key: &str, v: impl Into<Value>) -> Value {
    let o = Value::object();
    o.as_object()
        .unwrap()
        .borrow_mut()
        .insert(key.to_string(), v.into());
    o
}

#[test]
fn set_get_round_trip() {
    let host = Bindable::new();
    host.set("user", obj());
    host.set("user.name", "Ada");
    assert_eq!(host.get("user.name"), Some(Value::from("Ada")));
    host.set("user.name", "Grace");
    assert_eq!(host.get("user.name"), Some(Value::from("Grace")));
}

#[test]
fn get_past_undefined_segment_is_none() {
    let host = Bindable::new();
    host.set("user", obj());
    assert_eq!(host.get("user.profile.name"), None);
    assert_eq!(host.get("missing.whatever"), None);
}

#[test]
fn set_through_undefined_intermediate_is_silent() {
    let host = Bindable::new();
    host.set("user", obj());

    let events = Rc::new(Cell::new(0));
    host.add_listener({
        let events = events.clone();
        move |_| events.set(events.get() + 1)
    });

    // no such intermediate: no exception, no mutation, no notification
    host.set("user.profile.name", "Ada");
    assert_eq!(host.get("user.profile"), None);
    assert_eq!(events.get(), 0);
}

#[test]
fn set_on_detached_root_does_not_notify() {
    let host = Bindable::new();
    host.set("items", obj());

    let events = Rc::new(Cell::new(0));
    host.add_listener({
        let events = events.clone();
        move |_| events.set(events.get() + 1)
    });

    let detached = obj_with("items", obj());
    host.set_on(&detached, "items.1.n", 99);
    assert_eq!(events.get(), 0);
}

#[test]
fn redundant_notification_is_suppressed_once() {
    let host = Bindable::new();
    host.set("user", obj());

    let runs = Rc::new(Cell::new(0));
    host.add_path_effect(
        "user",
        PathEffect::new(
            EffectKind::Observer {
                args: vec![EffectArg::new("user.name")],
            },
            {
                let runs = runs.clone();
                move |_| runs.set(runs.get() + 1)
            },
        ),
    );

    host.notify_path("user.name", Change::value("Ada"), false);
    assert_eq!(runs.get(), 1);
    // same value again: dirty check suppresses dispatch and events
    host.notify_path("user.name", Change::value("Ada"), false);
    assert_eq!(runs.get(), 1);
    host.notify_path("user.name", Change::value("Grace"), false);
    assert_eq!(runs.get(), 2);
}

#[test]
fn set_with_identical_value_does_not_notify() {
    let host = Bindable::new();
    host.set("user", obj());
    host.set("user.name", "Ada");

    let events = Rc::new(Cell::new(0));
    host.add_listener({
        let events = events.clone();
        move |_| events.set(events.get() + 1)
    });

    host.set("user.name", "Ada");
    assert_eq!(events.get(), 0);
}

#[test]
fn changed_event_is_kebab_cased_from_the_root() {
    let host = Bindable::new();
    host.set("userProfile", obj());

    let names = Rc::new(RefCell::new(Vec::new()));
    host.add_listener({
        let names = names.clone();
        move |event| names.borrow_mut().push(event.name.clone())
    });

    host.set("userProfile.name", "Ada");
    assert_eq!(&*names.borrow(), &["user-profile-changed".to_string()]);
}

#[test]
fn annotation_effect_sees_descendant_changes() {
    let host = Bindable::new();
    host.set("items", Value::list(vec![obj_with("n", 1)]));

    let changed_paths = Rc::new(RefCell::new(Vec::new()));
    host.add_path_effect(
        "items",
        PathEffect::new(
            EffectKind::Annotation {
                source: "items".into(),
                negate: false,
            },
            {
                let changed_paths = changed_paths.clone();
                move |ctx| changed_paths.borrow_mut().push(ctx.changed.to_string())
            },
        ),
    );

    host.set("items.0.n", 2);
    // the numeric segment is canonicalized to the element's stable key
    assert_eq!(&*changed_paths.borrow(), &["items.#0.n".to_string()]);
}

#[test]
fn linked_paths_forward_without_reascending() {
    let host = Bindable::new();
    host.set("a", obj());
    host.set("a.b", obj());
    host.set("c", obj());
    host.set("c.d", obj());
    host.link_paths("c.d", "a.b");

    let forwarded = Rc::new(RefCell::new(Vec::new()));
    host.add_path_effect(
        "c",
        PathEffect::new(
            EffectKind::Observer {
                args: vec![EffectArg::wildcard("c.d")],
            },
            {
                let forwarded = forwarded.clone();
                move |ctx| {
                    forwarded.borrow_mut().push((
                        ctx.changed.to_string(),
                        ctx.change.as_value().cloned(),
                    ))
                }
            },
        ),
    );

    let events = Rc::new(RefCell::new(Vec::new()));
    host.add_listener({
        let events = events.clone();
        move |event| events.borrow_mut().push(event.name.clone())
    });

    host.set("a.b.x", 1);

    // the change reached c.d.x with the forwarded value
    assert_eq!(
        &*forwarded.borrow(),
        &[("c.d.x".to_string(), Some(Value::from(1)))]
    );
    // but only the originating side fired an upward event
    assert_eq!(&*events.borrow(), &["a-changed".to_string()]);
}

#[test]
fn unlink_paths_stops_forwarding() {
    let host = Bindable::new();
    host.set("a", obj());
    host.set("a.b", obj());
    host.set("c", obj());
    host.set("c.d", obj());
    host.link_paths("c.d", "a.b");
    host.unlink_paths("c.d");

    let runs = Rc::new(Cell::new(0));
    host.add_path_effect(
        "c",
        PathEffect::new(
            EffectKind::Observer {
                args: vec![EffectArg::wildcard("c.d")],
            },
            {
                let runs = runs.clone();
                move |_| runs.set(runs.get() + 1)
            },
        ),
    );

    host.set("a.b.x", 1);
    assert_eq!(runs.get(), 0);
}

#[test]
fn push_notifies_a_single_splice() {
    let host = Bindable::new();
    host.set("items", Value::list(vec![obj(), obj()]));

    let splices = Rc::new(RefCell::new(Vec::new()));
    let lengths = Rc::new(RefCell::new(Vec::new()));
    host.add_listener({
        let splices = splices.clone();
        let lengths = lengths.clone();
        move |event| match event.path.to_string().as_str() {
            "items.splices" => {
                let set = event.change.as_splices().unwrap().clone();
                splices.borrow_mut().push(set);
            }
            "items.length" => {
                lengths
                    .borrow_mut()
                    .push(event.change.as_value().unwrap().as_int().unwrap());
            }
            _ => {}
        }
    });

    let len = host.push("items", [obj(), obj()]).unwrap();
    assert_eq!(len, 4);
    assert_eq!(splices.borrow().len(), 1);
    let set = splices.borrow()[0].clone();
    assert_eq!(set.index_splices.len(), 1);
    assert_eq!(set.index_splices[0].index, 2);
    assert_eq!(set.index_splices[0].added_count, 2);
    assert!(set.index_splices[0].removed.is_empty());
    assert_eq!(set.key_splices[0].added.len(), 2);
    assert_eq!(&*lengths.borrow(), &[4]);
}

#[test]
fn mutation_ops_keep_registry_order_consistent() {
    let host = Bindable::new();
    let a = obj();
    let b = obj();
    let c = obj();
    host.set("items", Value::list(vec![a, b, c]));

    host.push("items", [obj()]).unwrap();
    host.shift("items").unwrap();
    host.unshift("items", [obj(), obj()]).unwrap();
    host.splice("items", 1, 2, vec![obj()]).unwrap();
    host.pop("items").unwrap();

    let list = host.get("items").unwrap().as_list().unwrap().clone();
    let coll = Collection::get(&list);
    let keys = coll.get_keys();
    let items = list.borrow();
    assert_eq!(keys.len(), items.len());
    for (i, key) in keys.iter().enumerate() {
        assert_eq!(coll.get_item(*key).unwrap(), items[i]);
    }
}

#[test]
fn array_ops_on_non_arrays_fail() {
    let host = Bindable::new();
    host.set("user", obj());
    assert!(host.push("user", [obj()]).is_err());
    assert!(host.pop("missing").is_err());
    assert!(host.splice("user.name", 0, 0, vec![]).is_err());
}

#[test]
fn pop_on_empty_array_is_a_quiet_none() {
    let host = Bindable::new();
    host.set("items", Value::list(vec![]));

    let events = Rc::new(Cell::new(0));
    host.add_listener({
        let events = events.clone();
        move |_| events.set(events.get() + 1)
    });

    assert_eq!(host.pop("items").unwrap(), None);
    assert_eq!(host.shift("items").unwrap(), None);
    assert_eq!(events.get(), 0);
}

#[test]
fn whole_element_set_remaps_the_key() {
    let host = Bindable::new();
    let first = obj_with("n", 1);
    host.set("items", Value::list(vec![first, obj_with("n", 2)]));

    let list = host.get("items").unwrap().as_list().unwrap().clone();
    let coll = Collection::get(&list);
    let keys = coll.get_keys();

    let replacement = obj_with("n", 9);
    host.set("items.0", replacement.clone());

    // the stable key now maps to the replacement element
    assert_eq!(coll.get_item(keys[0]), Some(replacement));
    assert_eq!(host.get("items.0.n"), Some(Value::from(9)));
}
