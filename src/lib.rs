//! Fine-grained path observation and incremental list rendering.
//!
//! This crate is the data-binding core of a component framework: it
//! propagates dotted-path mutations (`item.user.name`) between a host object
//! and its dependents without re-evaluating the whole tree, and it maintains
//! a live, ordered, filtered/sorted projection of an observed array as a
//! sequence of rendered template instances, patched by diffing array splices
//! rather than recomputed from scratch.
//!
//! The pieces, leaf first:
//!
//! - [`Value`]: a dynamic object graph with host-language identity semantics
//!   (primitives by value, lists/objects by reference).
//! - [`Path`]: a dotted or segmented address into such a graph.
//! - [`Collection`]: stable identity [`Key`]s for the elements of an observed
//!   array, surviving reorders and splices.
//! - [`Bindable`]: the path notifier attached to an object — get/set by
//!   path, change events, registered [`PathEffect`] dispatch, linked-path
//!   forwarding, and path-aware array mutation.
//! - [`Repeater`]: the incremental list view, reconciling rendered rows
//!   against key-space splices through a [`RenderSink`].
//!
//! Everything is single-threaded and cooperative. Path notification is fully
//! synchronous and re-entrant; only the repeater's render pass is deferred,
//! through the [`Scheduler`], so mutations in one tick coalesce into one
//! pass.
//!
//! ```
//! use std::rc::Rc;
//! use bindery::{Bindable, Value};
//!
//! let host = Rc::new(Bindable::new());
//! host.set("user", Value::object());
//! host.set("user.name", "Ada");
//! assert_eq!(host.get("user.name"), Some(Value::from("Ada")));
//! ```

mod collection;
mod effects;
mod error;
mod notify;
mod path;
mod render;
mod repeat;
mod scheduler;
mod splice;
mod value;

pub use collection::{Collection, Key};
pub use effects::{EffectArg, EffectContext, EffectId, EffectKind, PathEffect};
pub use error::BindError;
pub use notify::{Bindable, HostMethod, Observable, PropertyEvent};
pub use path::{Path, Segment};
pub use render::{InstanceId, RenderSink};
pub use repeat::{FilterFn, FilterSpec, Repeater, SortFn, SortSpec};
pub use scheduler::{Scheduler, TaskHandle};
pub use splice::{Change, IndexSplice, KeySplice, SpliceSet};
pub use value::{ObjectMap, Value};
