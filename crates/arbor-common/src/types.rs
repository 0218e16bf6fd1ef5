//! Core type definitions for Arbor
//!
//! Tree nodes, their identifiers, and the filters used when listing them.

use crate::mpath::MPath;
use derive_more::{From, Into};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Path separator for human-readable node paths
pub const PATH_SEPARATOR: char = '/';

/// Stable identity of a tree node, unchanged by moves
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, From, Into)]
pub struct NodeUuid(Uuid);

impl NodeUuid {
    /// Generate a new random node UUID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for NodeUuid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NodeUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeUuid({})", self.0)
    }
}

impl fmt::Display for NodeUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// File or directory
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum NodeKind {
    /// A file; its size is authoritative
    Leaf,
    /// A directory; its size is the derived aggregate of descendant leaves
    #[default]
    Collection,
}

impl NodeKind {
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf)
    }
}

/// A file or directory in the tree
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    /// Stable identity
    pub uuid: NodeUuid,
    /// Position in the tree, changed only by a move
    pub mpath: MPath,
    /// Slash-joined name path from the root (the root itself is "")
    pub path: String,
    /// Last path component
    pub name: String,
    pub kind: NodeKind,
    /// Bytes; for collections this is filled in on read
    pub size: i64,
    pub etag: String,
    /// Modification time (unix seconds)
    pub mtime: i64,
    #[serde(default)]
    pub meta: HashMap<String, String>,
}

impl TreeNode {
    /// Build a node at `mpath`/`path` from a creation template
    #[must_use]
    pub fn from_info(mpath: MPath, path: impl Into<String>, info: &NodeInfo) -> Self {
        let path = path.into();
        Self {
            uuid: info.uuid.unwrap_or_default(),
            mpath,
            name: base_name(&path).to_string(),
            path,
            kind: info.kind,
            size: info.size,
            etag: info.etag.clone(),
            mtime: info.mtime,
            meta: info.meta.clone(),
        }
    }

    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        self.kind.is_leaf()
    }

    /// Depth of the node (number of mpath segments)
    #[must_use]
    pub fn depth(&self) -> usize {
        self.mpath.len()
    }
}

/// Template used when the store creates nodes
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Identity to assign; a fresh one is generated when unset
    pub uuid: Option<NodeUuid>,
    pub kind: NodeKind,
    pub size: i64,
    pub etag: String,
    pub mtime: i64,
    #[serde(default)]
    pub meta: HashMap<String, String>,
}

impl NodeInfo {
    /// Template for a file of `size` bytes
    #[must_use]
    pub fn leaf(size: i64) -> Self {
        Self {
            kind: NodeKind::Leaf,
            size,
            ..Self::default()
        }
    }

    /// Template for a directory
    #[must_use]
    pub fn collection() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_uuid(mut self, uuid: NodeUuid) -> Self {
        self.uuid = Some(uuid);
        self
    }

    #[must_use]
    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = etag.into();
        self
    }

    #[must_use]
    pub const fn with_mtime(mut self, mtime: i64) -> Self {
        self.mtime = mtime;
        self
    }

    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }
}

/// Restriction applied to listings. All filters of a listing must match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeFilter {
    /// Only nodes of this kind
    Kind(NodeKind),
    /// Only nodes whose name starts with the prefix
    NamePrefix(String),
    /// Only nodes at most this many levels below the listed node
    MaxDepth(usize),
}

impl NodeFilter {
    /// Check `node`, listed from a node at `base_depth`
    #[must_use]
    pub fn matches(&self, node: &TreeNode, base_depth: usize) -> bool {
        match self {
            Self::Kind(kind) => node.kind == *kind,
            Self::NamePrefix(prefix) => node.name.starts_with(prefix.as_str()),
            Self::MaxDepth(max) => node.depth().saturating_sub(base_depth) <= *max,
        }
    }

    /// Check every filter of a listing
    #[must_use]
    pub fn match_all(filters: &[Self], node: &TreeNode, base_depth: usize) -> bool {
        filters.iter().all(|f| f.matches(node, base_depth))
    }
}

/// Normalize a node path: trim separators and collapse empty components
#[must_use]
pub fn clean_path(path: &str) -> String {
    path.split(PATH_SEPARATOR)
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Last component of a cleaned path ("" for the root)
#[must_use]
pub fn base_name(path: &str) -> &str {
    path.rsplit(PATH_SEPARATOR).next().unwrap_or_default()
}

/// Join a parent path and a child name
#[must_use]
pub fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}{PATH_SEPARATOR}{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(mpath: &[u64], path: &str, info: &NodeInfo) -> TreeNode {
        TreeNode::from_info(MPath::new(mpath.to_vec()).unwrap(), path, info)
    }

    #[test]
    fn test_from_info() {
        let uuid = NodeUuid::new();
        let info = NodeInfo::leaf(42).with_uuid(uuid).with_etag("abc");
        let n = node(&[1, 3], "docs/readme.md", &info);
        assert_eq!(n.uuid, uuid);
        assert_eq!(n.name, "readme.md");
        assert_eq!(n.size, 42);
        assert!(n.is_leaf());
        assert_eq!(n.depth(), 2);
    }

    #[test]
    fn test_filters() {
        let file = node(&[1, 2, 3], "a/b/report.pdf", &NodeInfo::leaf(1));
        let dir = node(&[1, 2], "a/b", &NodeInfo::collection());

        assert!(NodeFilter::Kind(NodeKind::Leaf).matches(&file, 1));
        assert!(!NodeFilter::Kind(NodeKind::Leaf).matches(&dir, 1));
        assert!(NodeFilter::NamePrefix("rep".into()).matches(&file, 1));
        assert!(!NodeFilter::MaxDepth(1).matches(&file, 1));
        assert!(NodeFilter::MaxDepth(1).matches(&dir, 1));

        let filters = [NodeFilter::Kind(NodeKind::Leaf), NodeFilter::MaxDepth(2)];
        assert!(NodeFilter::match_all(&filters, &file, 1));
        assert!(NodeFilter::match_all(&[], &dir, 1));
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(clean_path("/a//b/c/"), "a/b/c");
        assert_eq!(clean_path("/"), "");
        assert_eq!(base_name("a/b/c"), "c");
        assert_eq!(base_name(""), "");
        assert_eq!(join_path("", "a"), "a");
        assert_eq!(join_path("a/b", "c"), "a/b/c");
    }
}
