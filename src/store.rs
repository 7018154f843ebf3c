//! Document store: a thin accessor over the workspace directory.
//!
//! The filesystem is the source of truth; nothing here caches content.
//! Writes land in a hidden temp file in the target directory and are renamed
//! into place, so readers never observe a partially written document.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use globset::{Glob, GlobSet, GlobSetBuilder};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::error::{Result, WorkspaceError};
use crate::models::{Document, NodeKind, TreeNode, Version};
use crate::sandbox::PathSandbox;

/// Directories that are never part of the corpus, on top of dot-directories.
const SYSTEM_DIRS: &[&str] = &["node_modules", "target", "__pycache__"];

#[derive(Debug, Clone)]
pub struct DocumentStore {
    sandbox: PathSandbox,
    excludes: GlobSet,
}

impl DocumentStore {
    pub fn new(sandbox: PathSandbox, exclude_globs: &[String]) -> anyhow::Result<Self> {
        Ok(Self {
            sandbox,
            excludes: build_globset(exclude_globs)?,
        })
    }

    pub fn sandbox(&self) -> &PathSandbox {
        &self.sandbox
    }

    /// Whether a workspace-relative path is part of the managed corpus.
    pub fn manages(&self, relative: &str) -> bool {
        !self.excludes.is_match(relative)
            && !relative
                .split('/')
                .any(|part| part.starts_with('.') || SYSTEM_DIRS.contains(&part))
    }

    pub async fn read(&self, relative: &str) -> Result<Document> {
        let abs = self.sandbox.resolve(relative)?;
        let metadata = tokio::fs::metadata(&abs)
            .await
            .map_err(|e| WorkspaceError::from_io(relative, e))?;
        if !metadata.is_file() {
            return Err(WorkspaceError::NotFound(relative.to_string()));
        }
        let content = tokio::fs::read_to_string(&abs)
            .await
            .map_err(|e| WorkspaceError::from_io(relative, e))?;

        Ok(Document {
            size: content.len() as u64,
            version: mtime_millis(&metadata),
            content,
        })
    }

    /// Current version without reading content.
    pub async fn version(&self, relative: &str) -> Result<Version> {
        let abs = self.sandbox.resolve(relative)?;
        let metadata = tokio::fs::metadata(&abs)
            .await
            .map_err(|e| WorkspaceError::from_io(relative, e))?;
        Ok(mtime_millis(&metadata))
    }

    /// Atomically replaces the document's content and returns its new version.
    ///
    /// The returned version is always greater than the version observed
    /// before the write, even on filesystems with coarse mtime resolution.
    pub async fn write(&self, relative: &str, content: &str) -> Result<Version> {
        let abs = self.sandbox.resolve(relative)?;
        let previous = tokio::fs::metadata(&abs)
            .await
            .ok()
            .map(|m| mtime_millis(&m));

        let parent = abs
            .parent()
            .ok_or_else(|| WorkspaceError::InvalidPath(relative.to_string()))?;
        tokio::fs::create_dir_all(parent).await?;

        let file_name = abs
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let tmp = parent.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

        if let Err(e) = write_fully(&tmp, content).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp, &abs).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        let mut version = mtime_millis(&tokio::fs::metadata(&abs).await?);
        if let Some(prev) = previous {
            if version <= prev {
                version = prev + 1;
                set_mtime(&abs, version).await?;
            }
        }

        tracing::debug!(path = relative, version, "document written");
        Ok(version)
    }

    pub async fn delete(&self, relative: &str) -> Result<()> {
        let abs = self.sandbox.resolve(relative)?;
        tokio::fs::remove_file(&abs)
            .await
            .map_err(|e| WorkspaceError::from_io(relative, e))?;
        tracing::debug!(path = relative, "document deleted");
        Ok(())
    }

    /// All managed documents, recursively, in lexicographic order.
    pub fn list(&self) -> Vec<String> {
        let root = self.sandbox.root();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0 || {
                    let name = entry.file_name().to_string_lossy();
                    !name.starts_with('.') && !SYSTEM_DIRS.contains(&name.as_ref())
                }
            });

        let mut paths = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("skipping unreadable workspace entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(rel) = self.sandbox.relativize(entry.path()) {
                if self.manages(&rel) {
                    paths.push(rel);
                }
            }
        }

        paths.sort();
        paths
    }

    /// Nested directory tree of all managed documents.
    pub fn tree(&self) -> Vec<TreeNode> {
        build_tree(&self.list())
    }
}

async fn write_fully(path: &Path, content: &str) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(content.as_bytes()).await?;
    file.sync_all().await?;
    Ok(())
}

async fn set_mtime(path: &Path, version: Version) -> std::io::Result<()> {
    let path = path.to_path_buf();
    let when = UNIX_EPOCH + Duration::from_millis(version.max(0) as u64);
    tokio::task::spawn_blocking(move || {
        std::fs::File::options()
            .write(true)
            .open(&path)?
            .set_modified(when)
    })
    .await
    .map_err(std::io::Error::other)?
}

pub(crate) fn mtime_millis(metadata: &std::fs::Metadata) -> Version {
    metadata
        .modified()
        .unwrap_or(SystemTime::UNIX_EPOCH)
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as Version
}

fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[derive(Default)]
struct DirBuilder {
    dirs: BTreeMap<String, DirBuilder>,
    files: Vec<String>,
}

impl DirBuilder {
    fn insert(&mut self, parts: &[&str]) {
        match parts {
            [] => {}
            [file] => self.files.push(file.to_string()),
            [dir, rest @ ..] => self.dirs.entry(dir.to_string()).or_default().insert(rest),
        }
    }

    fn into_nodes(self, prefix: &str) -> Vec<TreeNode> {
        let join = |name: &str| {
            if prefix.is_empty() {
                name.to_string()
            } else {
                format!("{}/{}", prefix, name)
            }
        };

        let mut nodes = Vec::with_capacity(self.dirs.len() + self.files.len());
        for (name, dir) in self.dirs {
            let path = join(&name);
            let children = dir.into_nodes(&path);
            nodes.push(TreeNode {
                name,
                kind: NodeKind::Dir,
                path,
                children: Some(children),
            });
        }

        let mut files = self.files;
        files.sort();
        for name in files {
            nodes.push(TreeNode {
                path: join(&name),
                name,
                kind: NodeKind::File,
                children: None,
            });
        }
        nodes
    }
}

fn build_tree(paths: &[String]) -> Vec<TreeNode> {
    let mut root = DirBuilder::default();
    for path in paths {
        let parts: Vec<&str> = path.split('/').collect();
        root.insert(&parts);
    }
    root.into_nodes("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(tmp: &TempDir) -> DocumentStore {
        let root = tmp.path().canonicalize().unwrap();
        DocumentStore::new(PathSandbox::new(root, "md"), &["archive/**".to_string()]).unwrap()
    }

    #[tokio::test]
    async fn test_write_then_read_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);

        let content = "# Title\n\nbody with unicode: día ✓\n";
        let version = store.write("deep/nested/doc.md", content).await.unwrap();
        let doc = store.read("deep/nested/doc.md").await.unwrap();

        assert_eq!(doc.content, content);
        assert_eq!(doc.version, version);
        assert_eq!(doc.size, content.len() as u64);
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = store(&tmp).read("nope.md").await.unwrap_err();
        assert!(matches!(err, WorkspaceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_read_rejects_traversal() {
        let tmp = TempDir::new().unwrap();
        let err = store(&tmp).read("../outside.md").await.unwrap_err();
        assert!(matches!(err, WorkspaceError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn test_versions_strictly_increase() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        let v1 = store.write("a.md", "one").await.unwrap();
        let v2 = store.write("a.md", "two").await.unwrap();
        let v3 = store.write("a.md", "three").await.unwrap();
        assert!(v2 > v1);
        assert!(v3 > v2);
        assert_eq!(store.version("a.md").await.unwrap(), v3);
    }

    #[tokio::test]
    async fn test_write_leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        store.write("a.md", "x").await.unwrap();
        let names: Vec<String> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.md".to_string()]);
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_filtered() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        for path in ["b.md", "a/z.md", "a/c.md", "archive/old.md"] {
            store.write(path, "x").await.unwrap();
        }
        std::fs::create_dir_all(tmp.path().join(".git")).unwrap();
        std::fs::write(tmp.path().join(".git/config.md"), "x").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "x").unwrap();

        assert_eq!(store.list(), vec!["a/c.md", "a/z.md", "b.md"]);
    }

    #[tokio::test]
    async fn test_delete() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp);
        store.write("a.md", "x").await.unwrap();
        store.delete("a.md").await.unwrap();
        assert!(matches!(
            store.delete("a.md").await,
            Err(WorkspaceError::NotFound(_))
        ));
    }

    #[test]
    fn test_build_tree_dirs_first() {
        let paths = vec![
            "a/c.md".to_string(),
            "a/sub/d.md".to_string(),
            "b.md".to_string(),
        ];
        let tree = build_tree(&paths);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].name, "a");
        assert_eq!(tree[0].kind, NodeKind::Dir);
        let children = tree[0].children.as_ref().unwrap();
        assert_eq!(children[0].path, "a/sub");
        assert_eq!(children[1].path, "a/c.md");
        assert_eq!(tree[1].path, "b.md");
        assert!(tree[1].children.is_none());
    }
}
