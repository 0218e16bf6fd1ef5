//! Folder size caching decorator
//!
//! [`FolderSizeCache`] wraps a [`TreeStore`] and fills in the aggregate size
//! of every collection it returns. The last computed size of each folder is
//! kept in a [`SharedCache`] under the folder's mpath; structural mutations
//! delete the keys of every folder whose aggregate they may have changed.
//!
//! The cache is strictly best-effort. Reads always recompute the aggregate
//! from the store, so a stale, missing or unreachable cache only costs
//! latency, never correctness.

use crate::store::TreeStore;
use crate::stream::NodeStream;
use arbor_cache::SharedCache;
use arbor_common::{IndexConfig, MPath, NodeFilter, NodeInfo, NodeUuid, Result, TreeNode};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::iter;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Cache key of the folder at `mpath`
#[must_use]
pub fn cache_key(mpath: &MPath) -> String {
    mpath.to_string()
}

/// Keys to drop when the aggregate at `mpath` changes.
///
/// The node's own key comes first, then its ancestors nearest first, keeping
/// only ancestors at least `min_depth` segments deep.
#[must_use]
pub fn invalidation_keys(mpath: &MPath, min_depth: usize) -> Vec<String> {
    iter::once(mpath.clone())
        .chain(
            mpath
                .parents()
                .into_iter()
                .filter(|parent| parent.len() >= min_depth),
        )
        .map(|path| cache_key(&path))
        .collect()
}

/// Keys to drop when the subtree at `from` moves to `to`.
///
/// Ancestors above the common root of both positions keep their aggregate and
/// are left alone.
#[must_use]
pub fn move_invalidation_keys(from: &MPath, to: &MPath) -> Vec<String> {
    let min_depth = to.common_root(from).len();
    let mut keys = invalidation_keys(to, min_depth);
    for key in invalidation_keys(from, min_depth) {
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

/// Cached sizes are positive decimal integers; anything else is a miss
fn decode_size(value: &[u8]) -> Option<i64> {
    std::str::from_utf8(value)
        .ok()?
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|size| *size > 0)
}

fn encode_size(size: i64) -> Bytes {
    Bytes::from(size.to_string())
}

/// Fill in the aggregate size of a collection
async fn resolve_size<S, C>(store: &S, cache: &C, node: &mut TreeNode)
where
    S: TreeStore + ?Sized,
    C: SharedCache + ?Sized,
{
    if node.is_leaf() {
        return;
    }

    let key = cache_key(&node.mpath);
    match cache.get_bytes(&key).await {
        Ok(Some(value)) => match decode_size(&value) {
            Some(size) => node.size = size,
            None => debug!("Ignoring undecodable cached size at {}", key),
        },
        Ok(None) => {}
        Err(e) if e.is_cache_error() => {
            debug!("Cache {} read failed for {}: {}", cache.name(), key, e);
        }
        Err(e) => warn!("Cache {} misbehaved reading {}: {}", cache.name(), key, e),
    }

    match store.get_node_children_size(&node.mpath).await {
        Ok(size) => {
            node.size = size;
            if let Err(e) = cache.set(&key, encode_size(size)).await {
                debug!("Cache {} write failed for {}: {}", cache.name(), key, e);
            }
        }
        Err(e) => debug!(
            "Could not compute size of {} in {}: {}",
            node.mpath,
            store.name(),
            e
        ),
    }
}

/// Delete every key, logging and skipping failures
async fn invalidate<C: SharedCache + ?Sized>(cache: &C, keys: &[String]) {
    for key in keys {
        if let Err(e) = cache.delete(key).await {
            debug!("Cache {} failed to invalidate {}: {}", cache.name(), key, e);
        }
    }
}

/// Tree store decorator that maintains folder sizes
pub struct FolderSizeCache<S: ?Sized, C: ?Sized> {
    inner: Arc<S>,
    cache: Arc<C>,
    stream_buffer: usize,
}

impl<S: ?Sized, C: ?Sized> Clone for FolderSizeCache<S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            cache: Arc::clone(&self.cache),
            stream_buffer: self.stream_buffer,
        }
    }
}

impl<S, C> FolderSizeCache<S, C>
where
    S: TreeStore + ?Sized + 'static,
    C: SharedCache + ?Sized + 'static,
{
    /// Wrap `inner`, keeping folder sizes in `cache`
    pub fn new(inner: Arc<S>, cache: Arc<C>) -> Self {
        Self {
            inner,
            cache,
            stream_buffer: IndexConfig::default().stream_buffer,
        }
    }

    /// Set the channel capacity of resolved listings
    #[must_use]
    pub fn with_stream_buffer(mut self, stream_buffer: usize) -> Self {
        self.stream_buffer = stream_buffer;
        self
    }

    /// The decorated store
    pub const fn inner(&self) -> &Arc<S> {
        &self.inner
    }

    /// The size cache
    pub const fn cache(&self) -> &Arc<C> {
        &self.cache
    }

    /// Direct children of `mpath`, also stopped when `cancel` fires
    pub fn get_node_children_with_cancel(
        &self,
        mpath: &MPath,
        filters: &[NodeFilter],
        cancel: &CancellationToken,
    ) -> NodeStream {
        let inner = self.inner.get_node_children(mpath, filters);
        self.resolve_stream(inner, cancel.child_token())
    }

    /// Every descendant of `mpath`, also stopped when `cancel` fires
    pub fn get_node_tree_with_cancel(
        &self,
        mpath: &MPath,
        filters: &[NodeFilter],
        cancel: &CancellationToken,
    ) -> NodeStream {
        let inner = self.inner.get_node_tree(mpath, filters);
        self.resolve_stream(inner, cancel.child_token())
    }

    async fn resolved(&self, mut node: TreeNode) -> TreeNode {
        resolve_size(&*self.inner, &*self.cache, &mut node).await;
        node
    }

    /// Forward `inner` item by item, resolving collection sizes on the way
    fn resolve_stream(&self, inner: NodeStream, cancel: CancellationToken) -> NodeStream {
        let (sink, stream) = NodeStream::channel_with_cancel(self.stream_buffer, cancel);
        let store = Arc::clone(&self.inner);
        let cache = Arc::clone(&self.cache);

        tokio::spawn(async move {
            let mut inner = inner;
            loop {
                let item = tokio::select! {
                    biased;
                    () = sink.cancelled() => break,
                    item = inner.next() => item,
                };
                let Some(item) = item else {
                    break;
                };
                let item = match item {
                    Ok(mut node) => {
                        resolve_size(&*store, &*cache, &mut node).await;
                        Ok(node)
                    }
                    Err(e) => Err(e),
                };
                if !sink.send(item).await {
                    break;
                }
            }
            if sink.is_cancelled() {
                debug!("Resolved listing cancelled, releasing {} cursor", store.name());
            }
        });

        stream
    }
}

#[async_trait]
impl<S, C> TreeStore for FolderSizeCache<S, C>
where
    S: TreeStore + ?Sized + 'static,
    C: SharedCache + ?Sized + 'static,
{
    fn name(&self) -> &str {
        "folder-size-cache"
    }

    async fn get_node_by_mpath(&self, mpath: &MPath) -> Result<TreeNode> {
        let node = self.inner.get_node_by_mpath(mpath).await?;
        Ok(self.resolved(node).await)
    }

    async fn get_node_by_path(&self, path: &str) -> Result<TreeNode> {
        let node = self.inner.get_node_by_path(path).await?;
        Ok(self.resolved(node).await)
    }

    async fn get_node_by_uuid(&self, uuid: &NodeUuid) -> Result<TreeNode> {
        let node = self.inner.get_node_by_uuid(uuid).await?;
        Ok(self.resolved(node).await)
    }

    fn get_node_children(&self, mpath: &MPath, filters: &[NodeFilter]) -> NodeStream {
        let inner = self.inner.get_node_children(mpath, filters);
        self.resolve_stream(inner, CancellationToken::new())
    }

    fn get_node_tree(&self, mpath: &MPath, filters: &[NodeFilter]) -> NodeStream {
        let inner = self.inner.get_node_tree(mpath, filters);
        self.resolve_stream(inner, CancellationToken::new())
    }

    async fn get_or_create_node_by_path(
        &self,
        path: &str,
        info: &NodeInfo,
        folder_info: Option<&NodeInfo>,
    ) -> Result<(TreeNode, Vec<TreeNode>)> {
        let (node, created) = self
            .inner
            .get_or_create_node_by_path(path, info, folder_info)
            .await?;

        if !created.is_empty() {
            let cache = Arc::clone(&self.cache);
            let keys = invalidation_keys(&node.mpath, 0);
            debug!("Created {} nodes down to {}", created.len(), node.mpath);
            tokio::spawn(async move {
                invalidate(&*cache, &keys).await;
            });
        }

        Ok((node, created))
    }

    async fn insert_node(&self, node: &TreeNode) -> Result<()> {
        invalidate(&*self.cache, &invalidation_keys(&node.mpath, 0)).await;
        self.inner.insert_node(node).await
    }

    async fn update_node(&self, node: &TreeNode) -> Result<()> {
        invalidate(&*self.cache, &invalidation_keys(&node.mpath, 0)).await;
        self.inner.update_node(node).await
    }

    async fn delete_node(&self, node: &TreeNode) -> Result<()> {
        invalidate(&*self.cache, &invalidation_keys(&node.mpath, 0)).await;
        self.inner.delete_node(node).await
    }

    async fn move_node_tree(&self, from: &TreeNode, to: &TreeNode) -> Result<()> {
        invalidate(&*self.cache, &move_invalidation_keys(&from.mpath, &to.mpath)).await;
        self.inner.move_node_tree(from, to).await
    }

    async fn get_node_children_size(&self, mpath: &MPath) -> Result<i64> {
        self.inner.get_node_children_size(mpath).await
    }

    async fn get_node_children_count(&self, mpath: &MPath) -> Result<u64> {
        self.inner.get_node_children_count(mpath).await
    }
}
