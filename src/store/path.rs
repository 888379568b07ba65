use std::collections::{btree_map, BTreeMap};
use std::fmt::Display;

use rocket::serde::json::Value;

use crate::error::{Error, Result};

/// Characters that may not appear in a path segment. `.` and `$` collide
/// with MongoDB field paths, the rest are reserved by the path syntax.
const RESERVED: &[char] = &['/', '.', '$', '#', '[', ']'];

/// A slash-separated location in the hierarchical store, e.g.
/// `elections/<id>/results/<candidate>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DbPath(Vec<String>);

impl DbPath {
    /// The root of the tree.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Extend this path by one segment.
    pub fn child(mut self, segment: impl Display) -> Self {
        self.0.push(segment.to_string());
        self
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Is `self` a strict prefix of `other`?
    pub fn is_ancestor_of(&self, other: &DbPath) -> bool {
        self.0.len() < other.0.len() && other.0.starts_with(&self.0)
    }

    /// Reject empty segments and segments containing reserved characters.
    pub fn validate(&self) -> Result<()> {
        for segment in &self.0 {
            if segment.is_empty() || segment.contains(RESERVED) {
                return Err(Error::Store(format!(
                    "Illegal path segment {segment:?} in {self}"
                )));
            }
        }
        Ok(())
    }
}

impl From<&str> for DbPath {
    fn from(path: &str) -> Self {
        Self(
            path.split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }
}

impl Display for DbPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "/{}", self.0.join("/"))
    }
}

/// A set of writes to apply atomically. `None` (or JSON `null`) removes the
/// value at that path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Updates(BTreeMap<DbPath, Option<Value>>);

impl Updates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `value` at `path`, replacing anything queued for it already.
    pub fn set(&mut self, path: DbPath, value: impl Into<Value>) -> &mut Self {
        let value = value.into();
        let value = if value.is_null() { None } else { Some(value) };
        self.0.insert(path, value);
        self
    }

    /// Remove whatever is at `path`.
    pub fn remove(&mut self, path: DbPath) -> &mut Self {
        self.0.insert(path, None);
        self
    }

    /// Every path must be valid, and no path may be an ancestor of another:
    /// the result of such a pair would depend on application order.
    pub fn validate(&self) -> Result<()> {
        let mut previous: Option<&DbPath> = None;
        for path in self.0.keys() {
            path.validate()?;
            // Sorted order puts an ancestor directly before its first descendant.
            if let Some(prev) = previous {
                if prev.is_ancestor_of(path) {
                    return Err(Error::Store(format!(
                        "Overlapping update paths {prev} and {path}"
                    )));
                }
            }
            previous = Some(path);
        }
        Ok(())
    }
}

impl IntoIterator for Updates {
    type Item = (DbPath, Option<Value>);
    type IntoIter = btree_map::IntoIter<DbPath, Option<Value>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
