//! Materialized paths
//!
//! An [`MPath`] addresses a tree node by the chain of segment ids leading to
//! it from the root: `[1, 2, 3]` is child 3 of child 2 of root child 1.
//! Segments are positive and never renumbered except by a subtree move.
//!
//! Ordering is lexicographic over segments, so sorting a set of paths yields
//! a depth-first pre-order walk and every subtree is a contiguous range.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator used by the canonical text form (and therefore cache keys)
pub const SEPARATOR: char = ',';

/// Ordered, immutable path from the root to a tree node
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Vec<u64>", into = "Vec<u64>")]
pub struct MPath(Vec<u64>);

impl MPath {
    /// The degenerate root path (no segments)
    #[must_use]
    pub const fn root() -> Self {
        Self(Vec::new())
    }

    /// Create a path, rejecting zero segments
    pub fn new(segments: impl Into<Vec<u64>>) -> Result<Self, MPathError> {
        let segments = segments.into();
        if let Some(pos) = segments.iter().position(|s| *s == 0) {
            return Err(MPathError::ZeroSegment { position: pos });
        }
        Ok(Self(segments))
    }

    /// Create without validation (internal use only)
    #[must_use]
    pub fn new_unchecked(segments: impl Into<Vec<u64>>) -> Self {
        Self(segments.into())
    }

    #[must_use]
    pub fn segments(&self) -> &[u64] {
        &self.0
    }

    /// Number of segments
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the degenerate root path
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Last segment, i.e. the node's position among its siblings
    #[must_use]
    pub fn last(&self) -> Option<u64> {
        self.0.last().copied()
    }

    /// Nearest ancestor, `None` for the root
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Path of the child at `segment` below this node
    #[must_use]
    pub fn child(&self, segment: u64) -> Self {
        debug_assert!(segment > 0, "mpath segments are positive");
        let mut segments = Vec::with_capacity(self.0.len() + 1);
        segments.extend_from_slice(&self.0);
        segments.push(segment);
        Self(segments)
    }

    /// Ancestors ordered nearest first, farthest last.
    ///
    /// The empty root path is not listed: `[1,2,3]` yields `[[1,2],[1]]`.
    #[must_use]
    pub fn parents(&self) -> Vec<Self> {
        (1..self.0.len())
            .rev()
            .map(|n| Self(self.0[..n].to_vec()))
            .collect()
    }

    /// Longest path that prefixes both `self` and `other`
    #[must_use]
    pub fn common_root(&self, other: &Self) -> Self {
        let shared = self
            .0
            .iter()
            .zip(other.0.iter())
            .take_while(|(a, b)| a == b)
            .count();
        Self(self.0[..shared].to_vec())
    }

    /// True if `prefix` is this path or one of its ancestors
    #[must_use]
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// True if this path is a strict ancestor of `other`
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        other.0.len() > self.0.len() && other.starts_with(self)
    }

    /// Replace the `from` prefix of this path with `to`.
    ///
    /// Returns `None` when `from` does not prefix this path.
    #[must_use]
    pub fn rebase(&self, from: &Self, to: &Self) -> Option<Self> {
        if !self.starts_with(from) {
            return None;
        }
        let mut segments = Vec::with_capacity(to.0.len() + self.0.len() - from.0.len());
        segments.extend_from_slice(&to.0);
        segments.extend_from_slice(&self.0[from.0.len()..]);
        Some(Self(segments))
    }
}

impl fmt::Debug for MPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MPath({self})")
    }
}

impl fmt::Display for MPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "{SEPARATOR}")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for MPath {
    type Err = MPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::root());
        }
        let segments = s
            .split(SEPARATOR)
            .map(|part| {
                part.trim()
                    .parse::<u64>()
                    .map_err(|_| MPathError::InvalidSegment(part.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(segments)
    }
}

impl TryFrom<Vec<u64>> for MPath {
    type Error = MPathError;

    fn try_from(segments: Vec<u64>) -> Result<Self, Self::Error> {
        Self::new(segments)
    }
}

impl From<MPath> for Vec<u64> {
    fn from(path: MPath) -> Self {
        path.0
    }
}

/// Errors that can occur when building an mpath
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MPathError {
    #[error("mpath segment at position {position} is zero")]
    ZeroSegment { position: usize },
    #[error("invalid mpath segment: {0:?}")]
    InvalidSegment(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mp(segments: &[u64]) -> MPath {
        MPath::new(segments.to_vec()).unwrap()
    }

    #[test]
    fn test_parents_nearest_first() {
        assert_eq!(mp(&[1, 2, 3]).parents(), vec![mp(&[1, 2]), mp(&[1])]);
        assert!(mp(&[1]).parents().is_empty());
        assert!(MPath::root().parents().is_empty());
    }

    #[test]
    fn test_common_root() {
        assert_eq!(mp(&[1, 2, 3]).common_root(&mp(&[1, 4, 5])), mp(&[1]));
        assert_eq!(mp(&[1, 2]).common_root(&mp(&[1, 2, 9])), mp(&[1, 2]));
        assert_eq!(mp(&[2, 7]).common_root(&mp(&[3, 7])), MPath::root());
        assert_eq!(mp(&[4, 5]).common_root(&mp(&[4, 5])), mp(&[4, 5]));
    }

    #[test]
    fn test_display_and_parse() {
        let path = mp(&[1, 22, 3]);
        assert_eq!(path.to_string(), "1,22,3");
        assert_eq!("1,22,3".parse::<MPath>().unwrap(), path);
        assert_eq!("".parse::<MPath>().unwrap(), MPath::root());
        assert_eq!(MPath::root().to_string(), "");
    }

    #[test]
    fn test_parse_rejects_bad_segments() {
        assert_eq!(
            "1,0,2".parse::<MPath>(),
            Err(MPathError::ZeroSegment { position: 1 })
        );
        assert!(matches!(
            "1,x".parse::<MPath>(),
            Err(MPathError::InvalidSegment(_))
        ));
    }

    #[test]
    fn test_parent_child() {
        let path = mp(&[1, 2]);
        assert_eq!(path.child(7), mp(&[1, 2, 7]));
        assert_eq!(path.parent(), Some(mp(&[1])));
        assert_eq!(path.last(), Some(2));
        assert_eq!(MPath::root().parent(), None);
    }

    #[test]
    fn test_ancestry() {
        assert!(mp(&[1]).is_ancestor_of(&mp(&[1, 2])));
        assert!(!mp(&[1, 2]).is_ancestor_of(&mp(&[1, 2])));
        assert!(!mp(&[1, 3]).is_ancestor_of(&mp(&[1, 2, 3])));
        assert!(MPath::root().is_ancestor_of(&mp(&[5])));
    }

    #[test]
    fn test_rebase() {
        let moved = mp(&[1, 2, 3, 4]).rebase(&mp(&[1, 2]), &mp(&[1, 5, 1]));
        assert_eq!(moved, Some(mp(&[1, 5, 1, 3, 4])));
        assert_eq!(mp(&[1, 3]).rebase(&mp(&[1, 2]), &mp(&[9])), None);
    }

    #[test]
    fn test_ordering_is_preorder() {
        let mut paths = vec![mp(&[1, 2]), mp(&[1, 1, 5]), mp(&[1]), mp(&[1, 1])];
        paths.sort();
        assert_eq!(paths, vec![mp(&[1]), mp(&[1, 1]), mp(&[1, 1, 5]), mp(&[1, 2])]);
    }
}
