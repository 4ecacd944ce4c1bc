use std::{fmt, rc::Rc};

use smallvec::SmallVec;

use crate::collection::Key;

/// One step of a [`Path`].
///
/// Numeric segments address list indices (or numeric object fields); key
/// segments, written `#<n>` in dotted form, address list elements by their
/// registry-assigned stable key and survive reordering.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    Prop(Rc<str>),
    Index(usize),
    Key(Key),
}

impl Segment {
    pub fn prop(name: &str) -> Segment {
        Segment::Prop(Rc::from(name))
    }

    fn parse(part: &str) -> Segment {
        if let Some(rest) = part.strip_prefix('#') {
            if let Ok(n) = rest.parse::<u64>() {
                return Segment::Key(Key::from_raw(n));
            }
        }
        if let Ok(i) = part.parse::<usize>() {
            // "01" is a property name, not an index
            if part == "0" || !part.starts_with('0') {
                return Segment::Index(i);
            }
        }
        Segment::Prop(Rc::from(part))
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Prop(p) => write!(f, "{p}"),
            Segment::Index(i) => write!(f, "{i}"),
            Segment::Key(k) => write!(f, "{k}"),
        }
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A dotted address into an object graph, stored as its canonical segment
/// sequence. Never empty.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Path {
    segments: SmallVec<[Segment; 4]>,
}

impl Path {
    /// Parses a dotted string into segments.
    pub fn parse(path: &str) -> Path {
        debug_assert!(!path.is_empty(), "paths have at least one segment");
        Path {
            segments: path.split('.').map(Segment::parse).collect(),
        }
    }

    /// Builds a path from a sequence of parts, flattening each part on `.`
    /// before concatenating.
    pub fn from_parts<I, S>(parts: I) -> Path
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let segments: SmallVec<[Segment; 4]> = parts
            .into_iter()
            .flat_map(|p| {
                p.as_ref()
                    .split('.')
                    .map(Segment::parse)
                    .collect::<SmallVec<[Segment; 4]>>()
            })
            .collect();
        debug_assert!(!segments.is_empty(), "paths have at least one segment");
        Path { segments }
    }

    pub(crate) fn from_segments(segments: SmallVec<[Segment; 4]>) -> Path {
        debug_assert!(!segments.is_empty(), "paths have at least one segment");
        Path { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// The first segment, naming the root property the path hangs off.
    pub fn root(&self) -> &Segment {
        &self.segments[0]
    }

    pub fn leaf(&self) -> &Segment {
        &self.segments[self.segments.len() - 1]
    }

    /// The path without its last segment, or `None` for a single-segment
    /// path.
    pub fn parent(&self) -> Option<Path> {
        if self.segments.len() < 2 {
            return None;
        }
        Some(Path {
            segments: self.segments[..self.segments.len() - 1].into(),
        })
    }

    /// This path extended by one segment.
    pub fn child(&self, segment: Segment) -> Path {
        let mut segments = self.segments.clone();
        segments.push(segment);
        Path { segments }
    }

    /// This path extended by all of `rest`.
    pub fn join(&self, rest: &[Segment]) -> Path {
        let mut segments = self.segments.clone();
        segments.extend(rest.iter().cloned());
        Path { segments }
    }

    /// True iff `other` is this path or a descendant of it.
    pub fn is_prefix_of(&self, other: &Path) -> bool {
        other.strip_prefix(self).is_some()
    }

    /// The remaining segments of `self` after `prefix`. `Some(&[])` means the
    /// paths are equal.
    pub fn strip_prefix(&self, prefix: &Path) -> Option<&[Segment]> {
        if prefix.segments.len() > self.segments.len() {
            return None;
        }
        if self.segments[..prefix.segments.len()] != prefix.segments[..] {
            return None;
        }
        Some(&self.segments[prefix.segments.len()..])
    }

    /// Replaces a matched leading prefix with another, preserving the
    /// remainder. Used to translate a path expressed relative to one object
    /// into the equivalent path relative to a bound object.
    pub fn rebase(&self, from: &Path, to: &Path) -> Option<Path> {
        let rest = self.strip_prefix(from)?;
        Some(to.join(rest))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<&str> for Path {
    fn from(path: &str) -> Self {
        Path::parse(path)
    }
}

impl From<&Path> for Path {
    fn from(path: &Path) -> Self {
        path.clone()
    }
}

/// Converts a camelCase root property name to its dash-cased event form.
pub(crate) fn dash_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_segment_kinds() {
        let p = Path::parse("items.3.#7.name");
        assert_eq!(p.len(), 4);
        assert_eq!(p.segments()[1], Segment::Index(3));
        assert_eq!(p.segments()[2], Segment::Key(Key::from_raw(7)));
        assert_eq!(p.to_string(), "items.3.#7.name");
    }

    #[test]
    fn from_parts_flattens_dotted_parts() {
        let p = Path::from_parts(["items", "3.name"]);
        assert_eq!(p, Path::parse("items.3.name"));
    }

    #[test]
    fn prefix_relations() {
        let a = Path::parse("a.b");
        let b = Path::parse("a.b.c");
        assert!(a.is_prefix_of(&b));
        assert!(a.is_prefix_of(&a));
        assert!(!b.is_prefix_of(&a));
        // segment boundaries, not string prefixes
        assert!(!Path::parse("a.bb").strip_prefix(&a).is_some());
    }

    #[test]
    fn rebase_swaps_prefix() {
        let p = Path::parse("a.b.x");
        let rebased = p.rebase(&Path::parse("a.b"), &Path::parse("c.d"));
        assert_eq!(rebased, Some(Path::parse("c.d.x")));
        assert_eq!(p.rebase(&Path::parse("z"), &Path::parse("c")), None);
    }

    #[test]
    fn dash_case_root() {
        assert_eq!(dash_case("myItems"), "my-items");
        assert_eq!(dash_case("items"), "items");
    }
}
