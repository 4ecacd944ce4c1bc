use std::{rc::Rc, sync::atomic::AtomicU64};

use crate::{notify::Bindable, path::Path, splice::Change};

/// Identifies one registered [`PathEffect`] so it can be removed later.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EffectId(u64);

impl EffectId {
    pub(crate) fn next() -> EffectId {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        EffectId(COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed))
    }
}

/// One declared dependency of an observer-style effect.
#[derive(Clone, Debug)]
pub struct EffectArg {
    pub path: Path,
    /// A wildcarded dependency (`a.b.*`) also matches ancestors of its path.
    pub wildcard: bool,
}

impl EffectArg {
    pub fn new(path: impl Into<Path>) -> EffectArg {
        EffectArg {
            path: path.into(),
            wildcard: false,
        }
    }

    pub fn wildcard(path: impl Into<Path>) -> EffectArg {
        EffectArg {
            path: path.into(),
            wildcard: true,
        }
    }

    fn matches(&self, changed: &Path) -> bool {
        self.path.is_prefix_of(changed) || (self.wildcard && changed.is_prefix_of(&self.path))
    }
}

/// The closed set of effect shapes the notifier knows how to dispatch.
///
/// The kind only determines *relevance* for a changed path; re-evaluation is
/// the registered handler's job (the binding compiler supplies it).
#[derive(Clone, Debug)]
pub enum EffectKind {
    /// A template annotation binding rooted at `source`. Relevant when the
    /// source (or a sub-path of it) changed, or, unless negated, when an
    /// ancestor of the source changed and the new value must be forwarded
    /// down.
    Annotation { source: Path, negate: bool },
    /// A multi-argument complex observer.
    Observer { args: Vec<EffectArg> },
    /// A computed property.
    Computed { args: Vec<EffectArg> },
    /// An inline annotated computation.
    Computation { args: Vec<EffectArg> },
}

impl EffectKind {
    pub(crate) fn is_relevant(&self, changed: &Path) -> bool {
        match self {
            EffectKind::Annotation { source, negate } => {
                source.is_prefix_of(changed) || (!negate && changed.is_prefix_of(source))
            }
            EffectKind::Observer { args }
            | EffectKind::Computed { args }
            | EffectKind::Computation { args } => args.iter().any(|arg| arg.matches(changed)),
        }
    }
}

/// What a relevant effect handler receives.
pub struct EffectContext<'a> {
    pub host: &'a Bindable,
    pub changed: &'a Path,
    pub change: &'a Change,
}

/// A registered reaction to path changes under one root property.
///
/// Effects are registered once at bind time and are immutable afterwards;
/// the notifier only reads and dispatches them.
pub struct PathEffect {
    pub(crate) id: EffectId,
    pub(crate) kind: EffectKind,
    pub(crate) run: Rc<dyn Fn(EffectContext)>,
}

impl PathEffect {
    pub fn new(kind: EffectKind, run: impl Fn(EffectContext) + 'static) -> PathEffect {
        PathEffect {
            id: EffectId::next(),
            kind,
            run: Rc::new(run),
        }
    }

    pub fn id(&self) -> EffectId {
        self.id
    }

    pub fn kind(&self) -> &EffectKind {
        &self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotation_relevance() {
        let kind = EffectKind::Annotation {
            source: Path::parse("items"),
            negate: false,
        };
        assert!(kind.is_relevant(&Path::parse("items")));
        assert!(kind.is_relevant(&Path::parse("items.splices")));
        assert!(!kind.is_relevant(&Path::parse("other")));

        // a negated annotation is not forwarded downward
        let negated = EffectKind::Annotation {
            source: Path::parse("a.b.c"),
            negate: true,
        };
        assert!(negated.is_relevant(&Path::parse("a.b.c.d")));
        assert!(!negated.is_relevant(&Path::parse("a.b")));
    }

    #[test]
    fn observer_relevance() {
        let kind = EffectKind::Observer {
            args: vec![EffectArg::new("user.name"), EffectArg::wildcard("items")],
        };
        assert!(kind.is_relevant(&Path::parse("user.name")));
        assert!(kind.is_relevant(&Path::parse("user.name.first")));
        // ancestors only match wildcarded args
        assert!(!kind.is_relevant(&Path::parse("user")));
        assert!(kind.is_relevant(&Path::parse("items")));
        assert!(kind.is_relevant(&Path::parse("items.0.n")));
    }
}
