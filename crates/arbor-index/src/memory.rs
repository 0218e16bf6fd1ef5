//! In-memory tree store
//!
//! Reference [`TreeStore`] keeping every node in a `BTreeMap` keyed by mpath.
//! Because mpaths sort in depth-first pre-order, a subtree is one contiguous
//! range of the map. Nothing here is durable.

use crate::store::TreeStore;
use crate::stream::NodeStream;
use arbor_common::{
    base_name, clean_path, join_path, Error, IndexConfig, MPath, NodeFilter, NodeInfo, NodeKind,
    NodeUuid, Result, TreeNode,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::iter;
use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Position of the tree root
#[must_use]
pub fn root_mpath() -> MPath {
    MPath::new_unchecked(vec![1])
}

#[derive(Default)]
struct TreeState {
    nodes: BTreeMap<MPath, TreeNode>,
    by_uuid: HashMap<NodeUuid, MPath>,
    by_path: HashMap<String, MPath>,
}

impl TreeState {
    fn get(&self, mpath: &MPath) -> Result<&TreeNode> {
        self.nodes
            .get(mpath)
            .ok_or_else(|| Error::not_found(format!("mpath {mpath}")))
    }

    /// Strict descendants of `mpath` in pre-order
    fn descendants<'a>(&'a self, mpath: &'a MPath) -> impl Iterator<Item = &'a TreeNode> + 'a {
        self.nodes
            .range::<MPath, _>((Bound::Excluded(mpath), Bound::Unbounded))
            .take_while(move |(path, _)| path.starts_with(mpath))
            .map(|(_, node)| node)
    }

    fn children<'a>(&'a self, mpath: &'a MPath) -> impl Iterator<Item = &'a TreeNode> + 'a {
        let depth = mpath.len() + 1;
        self.descendants(mpath).filter(move |node| node.depth() == depth)
    }

    fn next_child_segment(&self, parent: &MPath) -> u64 {
        self.children(parent)
            .filter_map(|node| node.mpath.last())
            .max()
            .map_or(1, |last| last + 1)
    }

    /// Parent collection of a position that is about to be occupied
    fn collection_parent(&self, mpath: &MPath) -> Result<&TreeNode> {
        let parent_mpath = mpath
            .parent()
            .filter(|parent| !parent.is_empty())
            .ok_or_else(|| Error::invalid_path(format!("{mpath} has no parent")))?;
        let parent = self.get(&parent_mpath)?;
        if parent.is_leaf() {
            return Err(Error::invalid_path(format!(
                "{} is not a folder",
                parent.path
            )));
        }
        Ok(parent)
    }

    fn list(&self, mpath: &MPath, filters: &[NodeFilter], recursive: bool) -> Result<Vec<TreeNode>> {
        self.get(mpath)?;
        let base = mpath.len();
        Ok(self
            .descendants(mpath)
            .filter(|node| recursive || node.depth() == base + 1)
            .filter(|node| NodeFilter::match_all(filters, node, base))
            .cloned()
            .collect())
    }

    fn insert(&mut self, node: TreeNode) {
        self.by_uuid.insert(node.uuid, node.mpath.clone());
        self.by_path.insert(node.path.clone(), node.mpath.clone());
        self.nodes.insert(node.mpath.clone(), node);
    }

    fn remove(&mut self, mpath: &MPath) -> Option<TreeNode> {
        let node = self.nodes.remove(mpath)?;
        self.by_uuid.remove(&node.uuid);
        self.by_path.remove(&node.path);
        Some(node)
    }

    /// The stored node at `node.mpath`, provided it is the same node
    fn get_same(&self, node: &TreeNode) -> Result<&TreeNode> {
        let existing = self.get(&node.mpath)?;
        if existing.uuid != node.uuid {
            return Err(Error::not_found(format!(
                "node {} at mpath {}",
                node.uuid, node.mpath
            )));
        }
        Ok(existing)
    }
}

/// Tracks listing producers that still hold a cursor
struct CursorGuard(Arc<AtomicUsize>);

impl CursorGuard {
    fn open(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for CursorGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Non-durable tree store held in process memory
pub struct MemoryTreeStore {
    state: Arc<RwLock<TreeState>>,
    open_cursors: Arc<AtomicUsize>,
    stream_buffer: usize,
}

impl MemoryTreeStore {
    /// Create a store holding only the root collection
    #[must_use]
    pub fn new() -> Self {
        Self::from_config(&IndexConfig::default())
    }

    /// Create a store using the listing buffer from configuration
    #[must_use]
    pub fn from_config(config: &IndexConfig) -> Self {
        let mut state = TreeState::default();
        state.insert(TreeNode::from_info(root_mpath(), "", &NodeInfo::collection()));
        info!("Memory tree store initialized (stream buffer {})", config.stream_buffer);
        Self {
            state: Arc::new(RwLock::new(state)),
            open_cursors: Arc::new(AtomicUsize::new(0)),
            stream_buffer: config.stream_buffer,
        }
    }

    /// The root collection
    #[must_use]
    pub fn root(&self) -> TreeNode {
        let state = self.state.read();
        state.nodes[&root_mpath()].clone()
    }

    /// Number of nodes, root included
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().nodes.len()
    }

    /// Always false: the root cannot be removed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().nodes.is_empty()
    }

    /// Number of listings whose producer is still running
    #[must_use]
    pub fn open_cursors(&self) -> usize {
        self.open_cursors.load(Ordering::SeqCst)
    }

    /// First free position below `parent`
    pub fn next_child_mpath(&self, parent: &MPath) -> Result<MPath> {
        let state = self.state.read();
        state.get(parent)?;
        Ok(parent.child(state.next_child_segment(parent)))
    }

    fn spawn_listing(&self, mpath: &MPath, filters: &[NodeFilter], recursive: bool) -> NodeStream {
        let (sink, stream) = NodeStream::channel(self.stream_buffer);
        let state = Arc::clone(&self.state);
        let cursor = CursorGuard::open(&self.open_cursors);
        let mpath = mpath.clone();
        let filters = filters.to_vec();

        tokio::spawn(async move {
            let _cursor = cursor;
            let snapshot = state.read().list(&mpath, &filters, recursive);
            let nodes = match snapshot {
                Ok(nodes) => nodes,
                Err(e) => {
                    sink.send(Err(e)).await;
                    return;
                }
            };
            for node in nodes {
                if !sink.send(Ok(node)).await {
                    debug!("Listing of {} cancelled by consumer", mpath);
                    return;
                }
            }
        });

        stream
    }
}

impl Default for MemoryTreeStore {
    fn default() -> Self {
        Self::new()
    }
}

fn folder_template(folder_info: Option<&NodeInfo>) -> NodeInfo {
    folder_info.map_or_else(NodeInfo::collection, |info| NodeInfo {
        uuid: None,
        kind: NodeKind::Collection,
        size: 0,
        ..info.clone()
    })
}

/// Swap the `from` prefix of a name path for `to`
fn rebase_path(path: &str, from: &str, to: &str) -> String {
    if path == from {
        return to.to_string();
    }
    format!("{to}{}", &path[from.len()..])
}

#[async_trait]
impl TreeStore for MemoryTreeStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get_node_by_mpath(&self, mpath: &MPath) -> Result<TreeNode> {
        self.state.read().get(mpath).cloned()
    }

    async fn get_node_by_path(&self, path: &str) -> Result<TreeNode> {
        let path = clean_path(path);
        let state = self.state.read();
        let mpath = state
            .by_path
            .get(&path)
            .ok_or_else(|| Error::not_found(format!("path {path:?}")))?;
        state.get(mpath).cloned()
    }

    async fn get_node_by_uuid(&self, uuid: &NodeUuid) -> Result<TreeNode> {
        let state = self.state.read();
        let mpath = state
            .by_uuid
            .get(uuid)
            .ok_or_else(|| Error::not_found(format!("uuid {uuid}")))?;
        state.get(mpath).cloned()
    }

    fn get_node_children(&self, mpath: &MPath, filters: &[NodeFilter]) -> NodeStream {
        self.spawn_listing(mpath, filters, false)
    }

    fn get_node_tree(&self, mpath: &MPath, filters: &[NodeFilter]) -> NodeStream {
        self.spawn_listing(mpath, filters, true)
    }

    async fn get_or_create_node_by_path(
        &self,
        path: &str,
        info: &NodeInfo,
        folder_info: Option<&NodeInfo>,
    ) -> Result<(TreeNode, Vec<TreeNode>)> {
        let path = clean_path(path);
        let mut state = self.state.write();
        if let Some(mpath) = state.by_path.get(&path) {
            return Ok((state.get(mpath)?.clone(), Vec::new()));
        }

        let components: Vec<&str> = path.split('/').collect();
        let mut parent = state.get(&root_mpath())?.clone();
        let mut current = String::new();
        let mut created = Vec::new();

        for (i, name) in components.iter().enumerate() {
            current = join_path(&current, name);
            if parent.is_leaf() {
                return Err(Error::invalid_path(format!("{} is not a folder", parent.path)));
            }
            if let Some(mpath) = state.by_path.get(&current) {
                parent = state.get(mpath)?.clone();
                continue;
            }

            let template = if i + 1 == components.len() {
                info.clone()
            } else {
                folder_template(folder_info)
            };
            let mpath = parent.mpath.child(state.next_child_segment(&parent.mpath));
            let node = TreeNode::from_info(mpath, current.clone(), &template);
            if state.by_uuid.contains_key(&node.uuid) {
                return Err(Error::NodeAlreadyExists(format!("uuid {}", node.uuid)));
            }
            debug!("Creating {} at {}", node.path, node.mpath);
            state.insert(node.clone());
            created.push(node.clone());
            parent = node;
        }

        Ok((parent, created))
    }

    async fn insert_node(&self, node: &TreeNode) -> Result<()> {
        let mut state = self.state.write();
        if state.nodes.contains_key(&node.mpath) {
            return Err(Error::NodeAlreadyExists(format!("mpath {}", node.mpath)));
        }
        if state.by_uuid.contains_key(&node.uuid) {
            return Err(Error::NodeAlreadyExists(format!("uuid {}", node.uuid)));
        }
        let parent_path = state.collection_parent(&node.mpath)?.path.clone();

        let path = clean_path(&node.path);
        let name = base_name(&path).to_string();
        if name.is_empty() || join_path(&parent_path, &name) != path {
            return Err(Error::invalid_path(format!(
                "{path:?} is not a child of {parent_path:?}"
            )));
        }
        if state.by_path.contains_key(&path) {
            return Err(Error::NodeAlreadyExists(format!("path {path:?}")));
        }

        state.insert(TreeNode {
            path,
            name,
            ..node.clone()
        });
        Ok(())
    }

    async fn update_node(&self, node: &TreeNode) -> Result<()> {
        let mut state = self.state.write();
        let existing = state.get_same(node)?;
        if clean_path(&node.path) != existing.path {
            return Err(Error::invalid_path(format!(
                "renaming {:?} requires a move",
                existing.path
            )));
        }
        if existing.kind != node.kind {
            return Err(Error::invalid_path(format!(
                "kind of {:?} cannot change",
                existing.path
            )));
        }

        let updated = TreeNode {
            path: existing.path.clone(),
            name: existing.name.clone(),
            ..node.clone()
        };
        state.nodes.insert(node.mpath.clone(), updated);
        Ok(())
    }

    async fn delete_node(&self, node: &TreeNode) -> Result<()> {
        let mut state = self.state.write();
        state.get_same(node)?;
        if node.mpath == root_mpath() {
            return Err(Error::invalid_path("the root cannot be deleted"));
        }

        let doomed: Vec<MPath> = iter::once(node.mpath.clone())
            .chain(state.descendants(&node.mpath).map(|n| n.mpath.clone()))
            .collect();
        debug!("Deleting {} ({} nodes)", node.mpath, doomed.len());
        for mpath in &doomed {
            state.remove(mpath);
        }
        Ok(())
    }

    async fn move_node_tree(&self, from: &TreeNode, to: &TreeNode) -> Result<()> {
        let mut state = self.state.write();
        let source = state.get_same(from)?.clone();
        if source.mpath == root_mpath() {
            return Err(Error::InvalidMove("the root cannot be moved".to_string()));
        }
        if to.mpath.starts_with(&source.mpath) {
            return Err(Error::InvalidMove(format!(
                "{} is inside the moved subtree {}",
                to.mpath, source.mpath
            )));
        }
        if state.nodes.contains_key(&to.mpath) {
            return Err(Error::NodeAlreadyExists(format!("mpath {}", to.mpath)));
        }

        let parent_path = state.collection_parent(&to.mpath)?.path.clone();
        let target_name = base_name(&clean_path(&to.path)).to_string();
        if target_name.is_empty() {
            return Err(Error::invalid_path("move target has no name"));
        }
        let target_path = join_path(&parent_path, &target_name);
        if state.by_path.contains_key(&target_path) {
            return Err(Error::NodeAlreadyExists(format!("path {target_path:?}")));
        }

        let subtree: Vec<TreeNode> = iter::once(source.clone())
            .chain(state.descendants(&source.mpath).cloned())
            .collect();
        let mut moved = Vec::with_capacity(subtree.len());
        for node in &subtree {
            let mpath = node
                .mpath
                .rebase(&source.mpath, &to.mpath)
                .ok_or_else(|| Error::internal(format!("{} escaped its subtree", node.mpath)))?;
            let name = if node.mpath == source.mpath {
                target_name.clone()
            } else {
                node.name.clone()
            };
            moved.push(TreeNode {
                mpath,
                path: rebase_path(&node.path, &source.path, &target_path),
                name,
                ..node.clone()
            });
        }

        debug!(
            "Moving {} ({} nodes) to {}",
            source.mpath,
            subtree.len(),
            to.mpath
        );
        for node in &subtree {
            state.remove(&node.mpath);
        }
        for node in moved {
            state.insert(node);
        }
        Ok(())
    }

    async fn get_node_children_size(&self, mpath: &MPath) -> Result<i64> {
        let state = self.state.read();
        state.get(mpath)?;
        Ok(state
            .descendants(mpath)
            .filter(|node| node.is_leaf())
            .map(|node| node.size)
            .fold(0i64, i64::saturating_add))
    }

    async fn get_node_children_count(&self, mpath: &MPath) -> Result<u64> {
        let state = self.state.read();
        state.get(mpath)?;
        Ok(state.children(mpath).count() as u64)
    }
}
