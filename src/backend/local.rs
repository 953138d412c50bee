//! Local filesystem backend.
//!
//! The owner is a directory path and the whole directory is treated as one
//! repository. Walking is blocking I/O and runs on the blocking pool; file
//! reads use `tokio::fs`.

use super::{FileContent, FileEntry, OwnerScope, RepositoryPage, SourceBackend, SKIP_DIRS};
use crate::classify::RawFailure;
use crate::types::{Platform, Repository, Visibility};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Branch name reported for local trees.
const LOCAL_BRANCH: &str = "local";

/// Local directory backend.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    max_depth: usize,
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self { max_depth: 100 }
    }
}

impl LocalBackend {
    #[must_use]
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    fn repository_for(root: &Path) -> Repository {
        let name = root
            .file_name()
            .map_or_else(|| root.display().to_string(), |n| n.to_string_lossy().into_owned());
        let location = root.display().to_string();
        Repository {
            owner: "local".to_string(),
            name: name.clone(),
            full_name: name,
            default_branch: Some(LOCAL_BRANCH.to_string()),
            archived: false,
            visibility: Visibility::Private,
            url: format!("file://{location}"),
            clone_url: location,
        }
    }
}

#[async_trait]
impl SourceBackend for LocalBackend {
    fn platform(&self) -> Platform {
        Platform::Local
    }

    fn default_repository_concurrency(&self) -> usize {
        1
    }

    async fn resolve_scope(&self, owner: &str) -> Result<OwnerScope, RawFailure> {
        let path = PathBuf::from(owner);
        let metadata = tokio::fs::metadata(&path).await?;
        if !metadata.is_dir() {
            return Err(RawFailure::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not a directory", path.display()),
            )));
        }
        let canonical = tokio::fs::canonicalize(&path).await?;
        Ok(OwnerScope::Directory(canonical))
    }

    async fn list_repository_page(
        &self,
        owner: &str,
        scope: &OwnerScope,
        page: u32,
    ) -> Result<RepositoryPage, RawFailure> {
        if page > 1 {
            return Ok(RepositoryPage::default());
        }
        let root = match scope {
            OwnerScope::Directory(root) => root.clone(),
            _ => PathBuf::from(owner),
        };
        Ok(RepositoryPage {
            repositories: vec![Self::repository_for(&root)],
            has_more: false,
        })
    }

    async fn get_repository(
        &self,
        owner: &str,
        name: &str,
    ) -> Result<Option<Repository>, RawFailure> {
        let root = match self.resolve_scope(owner).await {
            Ok(OwnerScope::Directory(root)) => root,
            Ok(_) => return Ok(None),
            Err(RawFailure::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let repository = Self::repository_for(&root);
        Ok((repository.name == name).then_some(repository))
    }

    async fn list_files(&self, repository: &Repository) -> Result<Vec<FileEntry>, RawFailure> {
        let root = PathBuf::from(&repository.clone_url);
        let max_depth = self.max_depth;
        tokio::task::spawn_blocking(move || walk(&root, max_depth))
            .await
            .map_err(|e| RawFailure::Other(format!("directory walk task failed: {e}")))?
    }

    async fn read_file(
        &self,
        repository: &Repository,
        entry: &FileEntry,
    ) -> Result<FileContent, RawFailure> {
        let path = Path::new(&repository.clone_url).join(&entry.path);
        let content = tokio::fs::read_to_string(&path).await?;
        Ok(FileContent {
            content,
            url: format!("file://{}", path.display()),
        })
    }
}

fn walk(root: &Path, max_depth: usize) -> Result<Vec<FileEntry>, RawFailure> {
    let mut entries = Vec::new();
    let walker = WalkDir::new(root)
        .max_depth(max_depth)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_skipped(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() > 0 => {
                tracing::warn!(error = %e, "Skipping unreadable path");
                continue;
            }
            Err(e) => {
                return Err(e
                    .into_io_error()
                    .map_or_else(|| RawFailure::Other("directory walk failed".to_string()), RawFailure::Io));
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        entries.push(FileEntry {
            path,
            size: entry.metadata().ok().map(|m| m.len()),
            sha: None,
        });
    }

    Ok(entries)
}

fn is_skipped(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    entry.file_type().is_dir() && (name.starts_with('.') || SKIP_DIRS.iter().any(|s| *s == name))
}
