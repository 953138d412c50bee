//! Source backends: where repositories and IaC files come from.
//!
//! A backend answers a handful of narrow questions (resolve an owner, list a
//! page of repositories, list a repository's files, read one file). Everything
//! else (pagination policy, filtering, retry, fan-out, caching, aggregation)
//! lives once in [`crate::discovery::Discovery`] and is shared by all
//! backends.
//!
//! Failures leave a backend as [`RawFailure`] and are classified through
//! [`SourceBackend::classify_error`].
//!
//! # Implementations
//!
//! - [`GitHubBackend`]: GitHub REST v3 (organizations and users)
//! - [`GitLabBackend`]: GitLab REST v4 (groups, subgroups and users)
//! - [`LocalBackend`]: a directory on disk, treated as a single repository

mod cache;
mod github;
mod gitlab;
mod http;
mod local;

pub use cache::{cache_key, CacheLookup, RepositoryCache};
pub use github::{GitHubBackend, DEFAULT_API_URL as GITHUB_API_URL};
pub use gitlab::{GitLabBackend, DEFAULT_API_URL as GITLAB_API_URL};
pub use http::ApiClient;
pub use local::LocalBackend;

use crate::classify::{classify, ErrorEnvelope, RawFailure};
use crate::types::{Platform, Repository};
use async_trait::async_trait;
use std::path::PathBuf;

/// Page size requested from paginated platform APIs.
pub const PAGE_SIZE: usize = 100;

/// Directories never descended into when walking a tree.
pub const SKIP_DIRS: &[&str] = &[".git", ".terraform", ".terragrunt-cache", "node_modules"];

/// What kind of account an owner string resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerScope {
    /// GitHub organization or GitLab group
    Organization,
    User,
    /// Local directory, canonicalized
    Directory(PathBuf),
}

/// One page of a repository listing.
#[derive(Debug, Clone, Default)]
pub struct RepositoryPage {
    pub repositories: Vec<Repository>,
    pub has_more: bool,
}

/// A file in a repository tree, before its content is fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path relative to the repository root, `/`-separated
    pub path: String,
    pub size: Option<u64>,
    pub sha: Option<String>,
}

/// Fetched file content plus its browser URL.
#[derive(Debug, Clone)]
pub struct FileContent {
    pub content: String,
    pub url: String,
}

/// Platform-specific repository and file enumeration.
#[async_trait]
pub trait SourceBackend: Send + Sync {
    /// Get the platform this backend talks to
    fn platform(&self) -> Platform;

    /// How many repositories to process at once when not configured.
    fn default_repository_concurrency(&self) -> usize {
        5
    }

    /// Determine whether `owner` is an organization/group or a user.
    async fn resolve_scope(&self, owner: &str) -> Result<OwnerScope, RawFailure>;

    /// Fetch page `page` (1-indexed) of the owner's repositories.
    async fn list_repository_page(
        &self,
        owner: &str,
        scope: &OwnerScope,
        page: u32,
    ) -> Result<RepositoryPage, RawFailure>;

    /// Look up a single repository. `Ok(None)` when the platform reports it absent.
    async fn get_repository(&self, owner: &str, name: &str)
        -> Result<Option<Repository>, RawFailure>;

    /// List every file of the repository's default branch.
    async fn list_files(&self, repository: &Repository) -> Result<Vec<FileEntry>, RawFailure>;

    /// Fetch the content of one file.
    async fn read_file(
        &self,
        repository: &Repository,
        entry: &FileEntry,
    ) -> Result<FileContent, RawFailure>;

    /// Classify a raw failure raised by this backend.
    fn classify_error(&self, raw: RawFailure) -> ErrorEnvelope {
        classify(self.platform(), raw)
    }
}
