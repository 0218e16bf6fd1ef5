//! Local directory indexing and folder size reporting

use anyhow::{bail, Context, Result};
use arbor_common::{join_path, NodeFilter, NodeInfo, NodeKind, TreeNode};
use arbor_index::{root_mpath, TreeStore};
use futures::StreamExt;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, warn};

/// Filesystem entry found by the walk, keyed by its path below the scan root
#[derive(Debug)]
struct Entry {
    path: String,
    info: NodeInfo,
}

/// Counts reported after indexing a directory
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanSummary {
    pub files: u64,
    pub folders: u64,
    /// Unreadable entries, special files and non UTF-8 names
    pub skipped: u64,
}

/// One folder of the size report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderLine {
    /// Path below the scan root, "." for the root itself
    pub path: String,
    pub depth: usize,
    pub size: i64,
    /// Number of direct children
    pub children: u64,
}

impl fmt::Display for FolderLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>14}  {:>6}  {}{}",
            self.size,
            self.children,
            "  ".repeat(self.depth),
            self.path
        )
    }
}

fn mtime_secs(meta: &fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .and_then(|d| i64::try_from(d.as_secs()).ok())
        .unwrap_or_default()
}

/// Depth-first walk, siblings in name order. Symlinks are not followed.
fn walk(root: &Path) -> Result<(Vec<Entry>, u64)> {
    let meta = fs::metadata(root).with_context(|| format!("stat {}", root.display()))?;
    if !meta.is_dir() {
        bail!("{} is not a directory", root.display());
    }

    let mut entries = Vec::new();
    let mut skipped = 0;
    let mut pending: Vec<(PathBuf, String)> = vec![(root.to_path_buf(), String::new())];

    while let Some((dir, prefix)) = pending.pop() {
        let read = match fs::read_dir(&dir) {
            Ok(read) => read,
            Err(e) => {
                warn!("Cannot read {}: {}", dir.display(), e);
                skipped += 1;
                continue;
            }
        };

        let mut children: Vec<fs::DirEntry> = Vec::new();
        for child in read {
            match child {
                Ok(child) => children.push(child),
                Err(e) => {
                    warn!("Cannot read entry in {}: {}", dir.display(), e);
                    skipped += 1;
                }
            }
        }
        children.sort_by_key(fs::DirEntry::file_name);

        let mut subdirs = Vec::new();
        for child in children {
            let Some(name) = child.file_name().to_str().map(str::to_string) else {
                warn!("Skipping non UTF-8 name in {}", dir.display());
                skipped += 1;
                continue;
            };
            let meta = match child.metadata() {
                Ok(meta) => meta,
                Err(e) => {
                    warn!("Cannot stat {}: {}", child.path().display(), e);
                    skipped += 1;
                    continue;
                }
            };

            let path = join_path(&prefix, &name);
            if meta.is_dir() {
                entries.push(Entry {
                    path: path.clone(),
                    info: NodeInfo::collection().with_mtime(mtime_secs(&meta)),
                });
                subdirs.push((child.path(), path));
            } else if meta.is_file() {
                let size = i64::try_from(meta.len()).unwrap_or(i64::MAX);
                entries.push(Entry {
                    path,
                    info: NodeInfo::leaf(size).with_mtime(mtime_secs(&meta)),
                });
            } else {
                debug!("Skipping special file {}", child.path().display());
                skipped += 1;
            }
        }
        pending.extend(subdirs.into_iter().rev());
    }

    Ok((entries, skipped))
}

/// Load every file and folder below `root` into `store`
pub async fn index_directory<S: TreeStore + ?Sized>(store: &S, root: &Path) -> Result<ScanSummary> {
    let root = root.to_path_buf();
    let (entries, skipped) = tokio::task::spawn_blocking(move || walk(&root))
        .await
        .context("directory walk aborted")??;

    let folder = NodeInfo::collection();
    let mut summary = ScanSummary {
        skipped,
        ..ScanSummary::default()
    };
    for entry in entries {
        store
            .get_or_create_node_by_path(&entry.path, &entry.info, Some(&folder))
            .await
            .with_context(|| format!("index {}", entry.path))?;
        match entry.info.kind {
            NodeKind::Leaf => summary.files += 1,
            NodeKind::Collection => summary.folders += 1,
        }
    }
    Ok(summary)
}

async fn folder_line<S: TreeStore + ?Sized>(store: &S, node: &TreeNode) -> Result<FolderLine> {
    Ok(FolderLine {
        path: if node.path.is_empty() {
            ".".to_string()
        } else {
            node.path.clone()
        },
        depth: node.depth().saturating_sub(root_mpath().len()),
        size: node.size,
        children: store.get_node_children_count(&node.mpath).await?,
    })
}

/// Every folder down to `max_depth` levels below the root, root first
pub async fn folder_report<S: TreeStore + ?Sized>(
    store: &S,
    max_depth: Option<usize>,
) -> Result<Vec<FolderLine>> {
    let root = store.get_node_by_mpath(&root_mpath()).await?;
    let mut filters = vec![NodeFilter::Kind(NodeKind::Collection)];
    if let Some(depth) = max_depth {
        filters.push(NodeFilter::MaxDepth(depth));
    }

    let mut lines = vec![folder_line(store, &root).await?];
    let mut stream = store.get_node_tree(&root.mpath, &filters);
    while let Some(node) = stream.next().await {
        lines.push(folder_line(store, &node?).await?);
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_cache::{MemoryCache, SharedCache};
    use arbor_index::{FolderSizeCache, MemoryTreeStore};
    use std::sync::Arc;
    use std::time::Duration;

    /// a/x (100), a/b/y (20), z (3) and an empty folder e
    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::create_dir(dir.path().join("e")).unwrap();
        fs::write(dir.path().join("a/x"), vec![0u8; 100]).unwrap();
        fs::write(dir.path().join("a/b/y"), vec![0u8; 20]).unwrap();
        fs::write(dir.path().join("z"), b"abc").unwrap();
        dir
    }

    fn folders() -> (FolderSizeCache<MemoryTreeStore, MemoryCache>, Arc<MemoryCache>) {
        let cache = Arc::new(MemoryCache::new("scan", Duration::from_secs(60), 100));
        let folders = FolderSizeCache::new(Arc::new(MemoryTreeStore::new()), Arc::clone(&cache));
        (folders, cache)
    }

    #[tokio::test]
    async fn test_index_and_report() {
        let dir = fixture();
        let (folders, cache) = folders();

        let summary = index_directory(&folders, dir.path()).await.unwrap();
        assert_eq!(
            summary,
            ScanSummary {
                files: 3,
                folders: 3,
                skipped: 0
            }
        );

        let lines = folder_report(&folders, None).await.unwrap();
        folders.get_node_by_mpath(&root_mpath()).await.unwrap();
        let listed: Vec<_> = lines
            .iter()
            .map(|l| (l.path.as_str(), l.size, l.children))
            .collect();
        assert_eq!(
            listed,
            [(".", 123, 3), ("a", 120, 2), ("a/b", 20, 1), ("e", 0, 0)]
        );
        assert_eq!(
            cache.get_bytes("1").await.unwrap().as_deref(),
            Some(&b"123"[..])
        );
    }

    #[tokio::test]
    async fn test_report_depth_limit() {
        let dir = fixture();
        let (folders, _) = folders();
        index_directory(&folders, dir.path()).await.unwrap();

        let lines = folder_report(&folders, Some(1)).await.unwrap();
        let paths: Vec<_> = lines.iter().map(|l| l.path.as_str()).collect();
        assert_eq!(paths, [".", "a", "e"]);
        assert_eq!(lines[1].depth, 1);
    }

    #[tokio::test]
    async fn test_reindex_is_idempotent() {
        let dir = fixture();
        let (folders, _) = folders();
        index_directory(&folders, dir.path()).await.unwrap();
        index_directory(&folders, dir.path()).await.unwrap();

        let lines = folder_report(&folders, None).await.unwrap();
        assert_eq!(lines[0].size, 123);
        assert_eq!(folders.inner().len(), 7);
    }

    #[tokio::test]
    async fn test_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (folders, _) = folders();
        assert!(index_directory(&folders, &dir.path().join("nope"))
            .await
            .is_err());

        let file = dir.path().join("plain");
        fs::write(&file, b"x").unwrap();
        assert!(index_directory(&folders, &file).await.is_err());
    }

    #[test]
    fn test_line_display() {
        let line = FolderLine {
            path: "a/b".to_string(),
            depth: 2,
            size: 20,
            children: 1,
        };
        assert_eq!(line.to_string(), format!("{:>14}  {:>6}      a/b", 20, 1));
    }
}
