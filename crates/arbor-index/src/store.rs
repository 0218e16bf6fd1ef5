//! Tree store trait
//!
//! The durable tree index lives behind [`TreeStore`]. Decorators such as the
//! folder-size cache implement the same trait so callers cannot tell them
//! apart from the store they wrap.

use crate::stream::NodeStream;
use arbor_common::{MPath, NodeFilter, NodeInfo, NodeUuid, Result, TreeNode};
use async_trait::async_trait;

/// Materialized-path tree persistence
#[async_trait]
pub trait TreeStore: Send + Sync {
    /// Store name for logging
    fn name(&self) -> &str;

    /// Look up a node by its position
    async fn get_node_by_mpath(&self, mpath: &MPath) -> Result<TreeNode>;

    /// Look up a node by its slash-joined name path
    async fn get_node_by_path(&self, path: &str) -> Result<TreeNode>;

    /// Look up a node by its stable identity
    async fn get_node_by_uuid(&self, uuid: &NodeUuid) -> Result<TreeNode>;

    /// Direct children of `mpath`, in mpath order
    fn get_node_children(&self, mpath: &MPath, filters: &[NodeFilter]) -> NodeStream;

    /// Every descendant of `mpath` (the node itself excluded), depth-first
    fn get_node_tree(&self, mpath: &MPath, filters: &[NodeFilter]) -> NodeStream;

    /// Resolve `path`, creating it and any missing ancestors.
    ///
    /// `info` is the template for the final node, `folder_info` for the
    /// intermediate folders created along the way. Returns the node and the
    /// nodes that were created, shallowest first (empty if it existed).
    async fn get_or_create_node_by_path(
        &self,
        path: &str,
        info: &NodeInfo,
        folder_info: Option<&NodeInfo>,
    ) -> Result<(TreeNode, Vec<TreeNode>)>;

    /// Insert a fully positioned node under an existing collection
    async fn insert_node(&self, node: &TreeNode) -> Result<()>;

    /// Replace the stored attributes of the node at `node.mpath`
    async fn update_node(&self, node: &TreeNode) -> Result<()>;

    /// Remove a node together with its descendants
    async fn delete_node(&self, node: &TreeNode) -> Result<()>;

    /// Move the subtree rooted at `from` so that its root lands at `to`
    async fn move_node_tree(&self, from: &TreeNode, to: &TreeNode) -> Result<()>;

    /// Authoritative sum of descendant leaf sizes below `mpath`
    async fn get_node_children_size(&self, mpath: &MPath) -> Result<i64>;

    /// Number of direct children of `mpath`
    async fn get_node_children_count(&self, mpath: &MPath) -> Result<u64>;
}
