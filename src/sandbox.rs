//! Path sandbox.
//!
//! Every client-supplied path passes through [`PathSandbox::resolve`] before
//! any other component touches the filesystem. The lexical checks run first.
//! Then the deepest part of the path that already exists is canonicalized,
//! so a symlink inside the workspace cannot lead a read or write outside it.

use std::path::{Component, Path, PathBuf};

use crate::error::{Result, WorkspaceError};

#[derive(Debug, Clone)]
pub struct PathSandbox {
    root: PathBuf,
    extension: String,
}

impl PathSandbox {
    /// `root` should already be absolute (the workspace canonicalizes it once
    /// at construction).
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            extension: extension.into().to_lowercase(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Resolves a workspace-relative path into an absolute path strictly
    /// inside the root.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let normalized = normalize_separators(relative);
        if normalized.trim().is_empty() {
            return Err(WorkspaceError::InvalidPath("path is empty".to_string()));
        }
        if normalized.contains('\0') {
            return Err(WorkspaceError::InvalidPath(format!(
                "{}: contains a NUL byte",
                relative
            )));
        }

        let mut resolved = self.root.clone();
        let mut depth = 0usize;
        for component in Path::new(&normalized).components() {
            match component {
                Component::Normal(part) => {
                    resolved.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                Component::ParentDir => {
                    return Err(WorkspaceError::InvalidPath(format!(
                        "{}: parent-directory segments are not allowed",
                        relative
                    )));
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(WorkspaceError::InvalidPath(format!(
                        "{}: absolute paths are not allowed",
                        relative
                    )));
                }
            }
        }

        if depth == 0 || !self.has_managed_extension(&resolved) {
            return Err(WorkspaceError::InvalidPath(format!(
                "{}: only .{} documents are managed",
                relative, self.extension
            )));
        }

        if !resolved.starts_with(&self.root) || resolved == self.root {
            return Err(escapes(relative));
        }

        self.check_links(&resolved, relative)?;
        Ok(resolved)
    }

    /// Follows the nearest existing ancestor of `resolved` (the path itself
    /// included) and requires it to stay under the root.
    fn check_links(&self, resolved: &Path, relative: &str) -> Result<()> {
        let existing = resolved
            .ancestors()
            .take_while(|a| *a != self.root.as_path())
            .find(|a| std::fs::symlink_metadata(a).is_ok());
        let Some(existing) = existing else {
            return Ok(());
        };

        let root = self.root.canonicalize().unwrap_or_else(|_| self.root.clone());
        match existing.canonicalize() {
            Ok(real) if real.starts_with(&root) && real != root => Ok(()),
            // Dangling links land here as well.
            _ => Err(escapes(relative)),
        }
    }

    /// Maps an absolute path (e.g. from the watcher) back to its
    /// workspace-relative form. Returns `None` for anything the workspace
    /// does not manage: paths outside the root, hidden entries, wrong extension.
    pub fn relativize(&self, absolute: &Path) -> Option<String> {
        let rel = absolute.strip_prefix(&self.root).ok()?;
        let mut parts = Vec::new();
        for component in rel.components() {
            match component {
                Component::Normal(part) => {
                    let part = part.to_str()?;
                    if part.starts_with('.') {
                        return None;
                    }
                    parts.push(part);
                }
                _ => return None,
            }
        }
        if parts.is_empty() || !self.has_managed_extension(absolute) {
            return None;
        }
        Some(parts.join("/"))
    }

    pub fn has_managed_extension(&self, path: &Path) -> bool {
        let stem_ok = path
            .file_stem()
            .map(|s| !s.is_empty())
            .unwrap_or(false);
        let ext_ok = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(&self.extension))
            .unwrap_or(false);
        stem_ok && ext_ok
    }
}

fn escapes(relative: &str) -> WorkspaceError {
    WorkspaceError::InvalidPath(format!("{}: escapes the workspace root", relative))
}

fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox() -> PathSandbox {
        PathSandbox::new("/srv/memory", "md")
    }

    #[test]
    fn test_resolves_nested_document() {
        let p = sandbox().resolve("notes/today.md").unwrap();
        assert_eq!(p, PathBuf::from("/srv/memory/notes/today.md"));
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let sb = sandbox();
        let first = sb.resolve("./notes/./today.md").unwrap();
        let rel = sb.relativize(&first).unwrap();
        assert_eq!(rel, "notes/today.md");
        assert_eq!(sb.resolve(&rel).unwrap(), first);
    }

    #[test]
    fn test_rejects_parent_traversal() {
        let sb = sandbox();
        assert!(matches!(
            sb.resolve("../etc/passwd.md"),
            Err(WorkspaceError::InvalidPath(_))
        ));
        assert!(sb.resolve("notes/../../x.md").is_err());
        assert!(sb.resolve("notes\\..\\..\\x.md").is_err());
    }

    #[test]
    fn test_rejects_empty_and_absolute() {
        let sb = sandbox();
        assert!(sb.resolve("").is_err());
        assert!(sb.resolve("   ").is_err());
        assert!(sb.resolve("/etc/passwd.md").is_err());
    }

    #[test]
    fn test_rejects_wrong_extension() {
        let sb = sandbox();
        assert!(sb.resolve("notes/today.txt").is_err());
        assert!(sb.resolve("notes/today").is_err());
        assert!(sb.resolve(".md").is_err());
        assert!(sb.resolve("notes/").is_err());
    }

    #[test]
    fn test_extension_match_is_case_insensitive() {
        assert!(sandbox().resolve("README.MD").is_ok());
    }

    #[test]
    fn test_relativize_skips_hidden_and_foreign() {
        let sb = sandbox();
        assert_eq!(
            sb.relativize(Path::new("/srv/memory/.git/HEAD.md")),
            None
        );
        assert_eq!(
            sb.relativize(Path::new("/srv/memory/notes/.today.md.tmp")),
            None
        );
        assert_eq!(sb.relativize(Path::new("/elsewhere/a.md")), None);
        assert_eq!(
            sb.relativize(Path::new("/srv/memory/a.md")),
            Some("a.md".to_string())
        );
    }

    #[cfg(unix)]
    mod links {
        use super::*;
        use std::os::unix::fs::symlink;
        use tempfile::TempDir;

        fn setup() -> (TempDir, PathSandbox, PathBuf) {
            let tmp = TempDir::new().unwrap();
            let base = tmp.path().canonicalize().unwrap();
            let root = base.join("notes");
            let outside = base.join("outside");
            std::fs::create_dir_all(root.join("real")).unwrap();
            std::fs::create_dir_all(&outside).unwrap();
            (tmp, PathSandbox::new(root, "md"), outside)
        }

        #[test]
        fn test_rejects_directory_link_out_of_root() {
            let (_tmp, sb, outside) = setup();
            symlink(&outside, sb.root().join("link")).unwrap();
            assert!(matches!(
                sb.resolve("link/pwned.md"),
                Err(WorkspaceError::InvalidPath(_))
            ));
            assert!(sb.resolve("link/deeper/pwned.md").is_err());
        }

        #[test]
        fn test_rejects_file_link_out_of_root() {
            let (_tmp, sb, outside) = setup();
            std::fs::write(outside.join("secret.md"), "secret").unwrap();
            symlink(outside.join("secret.md"), sb.root().join("secret.md")).unwrap();
            assert!(sb.resolve("secret.md").is_err());

            symlink(outside.join("missing.md"), sb.root().join("dangling.md")).unwrap();
            assert!(sb.resolve("dangling.md").is_err());
        }

        #[test]
        fn test_allows_links_within_root() {
            let (_tmp, sb, _outside) = setup();
            symlink(sb.root().join("real"), sb.root().join("alias")).unwrap();
            assert!(sb.resolve("alias/today.md").is_ok());
            assert!(sb.resolve("real/new/today.md").is_ok());
            assert!(sb.resolve("fresh.md").is_ok());
        }
    }
}
