//! Discovery orchestration shared by every backend.
//!
//! [`Discovery`] drives a [`SourceBackend`] through the whole pipeline:
//!
//! 1. validate the owner and resolve its scope
//! 2. page through repositories, dedupe and filter while listing
//! 3. fan out per-repository file listing (settled, bounded)
//! 4. fan out per-file content reads (settled, bounded)
//! 5. aggregate files, successes and failures
//!
//! Every backend read goes through the retry policy with the classified
//! envelope's `retryable` flag as the eligibility check. Listing failures are
//! fatal; a failing repository or file is logged and left out.

use crate::backend::{cache_key, CacheLookup, FileEntry, RepositoryCache, SourceBackend};
use crate::classify::{ErrorEnvelope, RawFailure};
use crate::concurrency::process_concurrently_settled;
use crate::error::{AuditError, Result};
use crate::retry::RetryPolicy;
use crate::types::{
    DiscoveryFilter, DiscoveryOptions, DiscoveryReport, IacFile, IacKind, Platform, Repository,
    RepositoryFailure, RepositoryFilter, RepositoryStatus,
};
use glob::Pattern;
use regex::Regex;
use std::collections::HashSet;
use std::future::Future;
use std::path::PathBuf;

/// Tunables for one [`Discovery`] instance.
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    pub retry: RetryPolicy,
    /// Total tries per backend read, including the first
    pub max_attempts: u32,
    /// Repositories processed at once; `None` uses the backend default
    pub repository_concurrency: Option<usize>,
    /// File reads in flight per repository
    pub file_concurrency: usize,
    pub cache_enabled: bool,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            max_attempts: 3,
            repository_concurrency: None,
            file_concurrency: 10,
            cache_enabled: true,
        }
    }
}

/// Compiled repository filter.
#[derive(Debug, Clone)]
struct RepositorySelector {
    max_repositories: Option<usize>,
    skip_archived: bool,
    name: Option<Regex>,
    visibility: Option<crate::types::Visibility>,
}

impl RepositorySelector {
    fn compile(filter: &RepositoryFilter) -> Result<Self> {
        let name = filter
            .name_pattern
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| {
                Regex::new(p).map_err(|e| {
                    crate::err!(ConfigValue {
                        key: "discovery.repositories.name_pattern".to_string(),
                        message: format!("invalid regular expression '{p}': {e}"),
                    })
                })
            })
            .transpose()?;
        Ok(Self {
            max_repositories: filter.max_repositories,
            skip_archived: filter.skip_archived,
            name,
            visibility: filter.visibility,
        })
    }

    fn limit_reached(&self, accepted: usize) -> bool {
        self.max_repositories.is_some_and(|max| accepted >= max)
    }

    /// Why a repository is rejected, if it is.
    fn rejection(&self, repo: &Repository) -> Option<&'static str> {
        if self.skip_archived && repo.archived {
            Some("archived")
        } else if self.name.as_ref().is_some_and(|re| !re.is_match(&repo.name)) {
            Some("name pattern")
        } else if self.visibility.is_some_and(|v| v != repo.visibility) {
            Some("visibility")
        } else {
            None
        }
    }
}

/// Compiled file filter.
#[derive(Debug, Clone)]
pub struct FileSelector {
    kinds: Vec<IacKind>,
    max_files: Option<usize>,
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl FileSelector {
    /// Compile the glob patterns of `options`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigValue` for a malformed glob pattern.
    pub fn compile(options: &DiscoveryOptions) -> Result<Self> {
        Ok(Self {
            kinds: options.kinds.clone(),
            max_files: options.max_files,
            include: compile_globs(&options.include_patterns, "discovery.files.include_patterns")?,
            exclude: compile_globs(&options.exclude_patterns, "discovery.files.exclude_patterns")?,
        })
    }

    /// Kind of `path` if it passes every file filter.
    ///
    /// Exclude patterns are checked before include patterns.
    #[must_use]
    pub fn select(&self, path: &str) -> Option<IacKind> {
        let kind = IacKind::detect(path)?;
        if !self.kinds.contains(&kind) {
            return None;
        }
        if self.exclude.iter().any(|p| p.matches(path)) {
            return None;
        }
        if !self.include.is_empty() && !self.include.iter().any(|p| p.matches(path)) {
            return None;
        }
        Some(kind)
    }
}

fn compile_globs(patterns: &[String], key: &str) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|e| {
                crate::err!(ConfigValue {
                    key: key.to_string(),
                    message: format!("invalid glob pattern '{p}': {e}"),
                })
            })
        })
        .collect()
}

/// Reject empty owners and owners containing control characters.
fn validate_owner(owner: &str) -> Result<&str> {
    let trimmed = owner.trim();
    if trimmed.is_empty() {
        return Err(crate::err!(InvalidOwner {
            owner: owner.to_string(),
            message: "owner must not be empty".to_string(),
        }));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(crate::err!(InvalidOwner {
            owner: owner.to_string(),
            message: "owner contains control characters".to_string(),
        }));
    }
    Ok(trimmed)
}

fn validate_repository_name(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    let problem = if trimmed.is_empty() {
        "repository name must not be empty"
    } else if trimmed.contains('/') || trimmed.chars().any(char::is_control) {
        "repository name must be a single path segment without control characters"
    } else {
        return Ok(trimmed);
    };
    Err(crate::err!(InvalidRepositoryName {
        name: name.to_string(),
        message: problem.to_string(),
    }))
}

/// Discovery pipeline over one backend.
///
/// # Example
///
/// ```rust,no_run
/// use modscout::backend::LocalBackend;
/// use modscout::discovery::{Discovery, DiscoverySettings};
/// use modscout::types::DiscoveryFilter;
///
/// # async fn run() -> modscout::Result<()> {
/// let discovery = Discovery::new(LocalBackend::default(), DiscoverySettings::default());
/// let report = discovery.discover("./infrastructure", &DiscoveryFilter::default()).await?;
/// println!("{} IaC files", report.files.len());
/// # Ok(())
/// # }
/// ```
pub struct Discovery<B> {
    backend: B,
    cache: RepositoryCache,
    settings: DiscoverySettings,
}

impl<B: SourceBackend> Discovery<B> {
    #[must_use]
    pub fn new(backend: B, settings: DiscoverySettings) -> Self {
        Self {
            cache: RepositoryCache::new(settings.cache_enabled),
            backend,
            settings,
        }
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[must_use]
    pub fn cache(&self) -> &RepositoryCache {
        &self.cache
    }

    fn platform(&self) -> Platform {
        self.backend.platform()
    }

    /// Run one backend read under the retry policy, classifying its failure.
    async fn call<T, F, Fut>(&self, label: &str, mut op: F) -> std::result::Result<T, ErrorEnvelope>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, RawFailure>>,
    {
        self.settings
            .retry
            .execute_if(
                label,
                self.settings.max_attempts,
                |e: &ErrorEnvelope| e.retryable,
                || {
                    let pending = op();
                    async move { pending.await.map_err(|raw| self.backend.classify_error(raw)) }
                },
            )
            .await
    }

    /// List the owner's repositories, applying `filter` while paging.
    ///
    /// Repositories are deduplicated by `full_name` and listing stops as soon
    /// as `max_repositories` have been accepted.
    ///
    /// # Errors
    ///
    /// `InvalidOwner` for an empty owner, `ConfigValue` for a bad name
    /// pattern, `DirectoryNotFound` when a local owner is not a directory,
    /// `Backend` when the scope or a page cannot be fetched.
    pub async fn get_repositories(
        &self,
        owner: &str,
        filter: &RepositoryFilter,
    ) -> Result<Vec<Repository>> {
        let selector = RepositorySelector::compile(filter)?;
        let owner = validate_owner(owner)?;
        let platform = self.platform();

        let scope = self
            .call("resolve owner", || self.backend.resolve_scope(owner))
            .await
            .map_err(|envelope| self.scope_error(owner, envelope))?;
        tracing::debug!(platform = %platform, owner, scope = ?scope, "Owner resolved");

        let mut seen = HashSet::new();
        let mut accepted = Vec::new();
        let mut page_number: u32 = 1;

        'pages: loop {
            if selector.limit_reached(accepted.len()) {
                break;
            }
            let page = self
                .call("list repositories", || {
                    self.backend.list_repository_page(owner, &scope, page_number)
                })
                .await
                .map_err(|envelope| {
                    crate::err!(Backend {
                        operation: format!("listing repositories of '{owner}' (page {page_number})"),
                        envelope,
                    })
                })?;
            let fetched = page.repositories.len();

            for repo in page.repositories {
                if !seen.insert(repo.full_name.clone()) {
                    tracing::debug!(repository = %repo.full_name, "Duplicate repository in listing");
                    continue;
                }
                if let Some(reason) = selector.rejection(&repo) {
                    tracing::debug!(repository = %repo.full_name, reason, "Repository filtered out");
                    continue;
                }
                self.cache.set(
                    cache_key(platform, "repository", &[repo.owner.as_str(), repo.name.as_str()]),
                    Some(repo.clone()),
                );
                accepted.push(repo);
                if selector.limit_reached(accepted.len()) {
                    tracing::debug!(owner, max = accepted.len(), "Repository limit reached");
                    break 'pages;
                }
            }

            if !page.has_more || fetched == 0 {
                break;
            }
            page_number += 1;
        }

        tracing::info!(
            platform = %platform,
            owner,
            repositories = accepted.len(),
            pages = page_number,
            "Repositories listed"
        );
        Ok(accepted)
    }

    fn scope_error(&self, owner: &str, envelope: ErrorEnvelope) -> AuditError {
        if self.platform() == Platform::Local {
            tracing::error!(path = owner, error = %envelope, "Local directory is not usable");
            crate::err!(DirectoryNotFound {
                path: PathBuf::from(owner),
            })
        } else {
            crate::err!(Backend {
                operation: format!("resolving owner '{owner}'"),
                envelope,
            })
        }
    }

    /// Look up one repository by name.
    ///
    /// A platform 404 yields [`RepositoryStatus::Missing`]; a repository the
    /// filter rejects (archived with `skip_archived`, say) yields
    /// [`RepositoryStatus::Excluded`]. Lookups are memoized.
    ///
    /// # Errors
    ///
    /// `InvalidOwner` for an empty owner, `InvalidRepositoryName` for an
    /// empty name, `ConfigValue` for a bad
    /// name pattern, `Backend` for any failure other than not-found.
    pub async fn repository_exists(
        &self,
        owner: &str,
        name: &str,
        filter: &RepositoryFilter,
    ) -> Result<RepositoryStatus> {
        let selector = RepositorySelector::compile(filter)?;
        let owner = validate_owner(owner)?;
        let name = validate_repository_name(name)?;
        let key = cache_key(self.platform(), "repository", &[owner, name]);

        let repository = match self.cache.get(&key) {
            CacheLookup::Hit(cached) => {
                tracing::trace!(owner, name, "Repository lookup served from cache");
                cached
            }
            CacheLookup::Miss => {
                let fetched = self
                    .call("get repository", || self.backend.get_repository(owner, name))
                    .await;
                let fetched = match fetched {
                    Ok(repo) => repo,
                    Err(envelope) if envelope.is_not_found() => None,
                    Err(envelope) => {
                        return Err(crate::err!(Backend {
                            operation: format!("looking up repository '{owner}/{name}'"),
                            envelope,
                        }))
                    }
                };
                self.cache.set(key, fetched.clone());
                fetched
            }
        };

        Ok(match repository {
            None => RepositoryStatus::Missing,
            Some(repo) => match selector.rejection(&repo) {
                Some(reason) => {
                    tracing::debug!(repository = %repo.full_name, reason, "Repository excluded");
                    RepositoryStatus::Excluded
                }
                None => RepositoryStatus::Available,
            },
        })
    }

    /// Fetch the IaC files of one repository.
    ///
    /// # Errors
    ///
    /// `ConfigValue` for a malformed glob, `Backend` when the file tree
    /// cannot be listed. Individual unreadable files are logged and skipped.
    pub async fn find_iac_files_in_repository(
        &self,
        repository: &Repository,
        options: &DiscoveryOptions,
    ) -> Result<Vec<IacFile>> {
        let selector = FileSelector::compile(options)?;
        self.files_for(repository, &selector).await.map_err(|envelope| {
            crate::err!(Backend {
                operation: format!("listing files of '{}'", repository.full_name),
                envelope,
            })
        })
    }

    async fn files_for(
        &self,
        repository: &Repository,
        selector: &FileSelector,
    ) -> std::result::Result<Vec<IacFile>, ErrorEnvelope> {
        let entries = self
            .call("list files", || self.backend.list_files(repository))
            .await?;
        let total = entries.len();

        let mut selected: Vec<(FileEntry, IacKind)> = entries
            .into_iter()
            .filter_map(|entry| selector.select(&entry.path).map(|kind| (entry, kind)))
            .collect();
        if let Some(max) = selector.max_files {
            if selected.len() > max {
                tracing::debug!(
                    repository = %repository.full_name,
                    matched = selected.len(),
                    max,
                    "Truncating file list"
                );
                selected.truncate(max);
            }
        }
        tracing::debug!(
            repository = %repository.full_name,
            total,
            selected = selected.len(),
            "Selected IaC files"
        );

        let batch = process_concurrently_settled(
            selected,
            self.settings.file_concurrency,
            |(entry, kind), _| async move {
                let fetched = self
                    .call("read file", || self.backend.read_file(repository, &entry))
                    .await;
                fetched
                    .map(|content| IacFile {
                        kind,
                        repository: repository.full_name.clone(),
                        path: entry.path.clone(),
                        content: content.content,
                        url: content.url,
                        sha: entry.sha.clone(),
                        size: entry.size,
                    })
                    .map_err(|envelope| (entry.path, envelope))
            },
        )
        .await;

        for (_, (path, envelope)) in batch.failures() {
            tracing::warn!(
                repository = %repository.full_name,
                path = %path,
                kind = %envelope.kind,
                error = %envelope,
                "Skipping unreadable file"
            );
        }
        Ok(batch.successes().collect())
    }

    /// Run the full pipeline for `owner`.
    ///
    /// # Errors
    ///
    /// Only configuration and listing errors; per-repository failures are
    /// reported in [`DiscoveryReport::failures`].
    pub async fn discover(&self, owner: &str, filter: &DiscoveryFilter) -> Result<DiscoveryReport> {
        let selector = FileSelector::compile(&filter.files)?;
        let repositories = self.get_repositories(owner, &filter.repositories).await?;
        let concurrency = self
            .settings
            .repository_concurrency
            .unwrap_or_else(|| self.backend.default_repository_concurrency());

        tracing::info!(
            platform = %self.platform(),
            repositories = repositories.len(),
            concurrency,
            "Discovering IaC files"
        );

        let selector = &selector;
        let batch = process_concurrently_settled(
            repositories.clone(),
            concurrency,
            |repo, _| async move { self.files_for(&repo, selector).await },
        )
        .await;

        let mut report = DiscoveryReport {
            repositories_scanned: batch.success_count,
            repositories_failed: batch.error_count,
            ..DiscoveryReport::default()
        };

        for (repo, (files, error)) in repositories
            .iter()
            .zip(batch.results.into_iter().zip(batch.errors))
        {
            match (files, error) {
                (Some(files), _) => {
                    tracing::info!(repository = %repo.full_name, files = files.len(), "Repository scanned");
                    report.files.extend(files);
                }
                (None, Some(envelope)) => {
                    tracing::error!(
                        repository = %repo.full_name,
                        kind = %envelope.kind,
                        error = ?envelope,
                        "Repository discovery failed"
                    );
                    report.failures.push(RepositoryFailure {
                        repository: repo.full_name.clone(),
                        error: envelope,
                    });
                }
                (None, None) => {}
            }
        }
        report.repositories = repositories;

        if report.is_partial() {
            tracing::warn!(
                scanned = report.repositories_scanned,
                failed = report.repositories_failed,
                "Discovery finished with failures"
            );
        } else {
            tracing::info!(
                scanned = report.repositories_scanned,
                files = report.files.len(),
                "Discovery finished"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FileContent, OwnerScope, RepositoryPage};
    use crate::classify::ErrorKind;
    use crate::types::Visibility;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn repo(name: &str, archived: bool) -> Repository {
        Repository {
            owner: "acme".to_string(),
            name: name.to_string(),
            full_name: format!("acme/{name}"),
            default_branch: Some("main".to_string()),
            archived,
            visibility: Visibility::Public,
            url: format!("https://example.test/acme/{name}"),
            clone_url: format!("https://example.test/acme/{name}.git"),
        }
    }

    /// In-memory backend with failure injection.
    #[derive(Default)]
    struct FakeBackend {
        pages: Vec<Vec<Repository>>,
        files: HashMap<String, Vec<(String, String)>>,
        failing_repos: HashSet<String>,
        failing_files: HashSet<String>,
        /// Transient 503s returned before a call succeeds, keyed by operation
        flaky: Mutex<HashMap<&'static str, u32>>,
        lookups: AtomicU32,
        page_calls: AtomicU32,
    }

    impl FakeBackend {
        fn take_flake(&self, op: &'static str) -> bool {
            let mut flaky = self.flaky.lock().unwrap();
            match flaky.get_mut(op) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    true
                }
                _ => false,
            }
        }
    }

    #[async_trait]
    impl SourceBackend for FakeBackend {
        fn platform(&self) -> Platform {
            Platform::GitHub
        }

        async fn resolve_scope(&self, owner: &str) -> std::result::Result<OwnerScope, RawFailure> {
            if owner == "ghost" {
                return Err(RawFailure::Http {
                    status: 404,
                    message: "no such owner".to_string(),
                });
            }
            Ok(OwnerScope::Organization)
        }

        async fn list_repository_page(
            &self,
            _owner: &str,
            _scope: &OwnerScope,
            page: u32,
        ) -> std::result::Result<RepositoryPage, RawFailure> {
            self.page_calls.fetch_add(1, Ordering::SeqCst);
            if self.take_flake("page") {
                return Err(RawFailure::Http {
                    status: 503,
                    message: "unavailable".to_string(),
                });
            }
            let index = page as usize - 1;
            Ok(RepositoryPage {
                repositories: self.pages.get(index).cloned().unwrap_or_default(),
                has_more: index + 1 < self.pages.len(),
            })
        }

        async fn get_repository(
            &self,
            _owner: &str,
            name: &str,
        ) -> std::result::Result<Option<Repository>, RawFailure> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if name == "forbidden" {
                return Err(RawFailure::Http {
                    status: 403,
                    message: "forbidden".to_string(),
                });
            }
            Ok(self.pages.iter().flatten().find(|r| r.name == name).cloned())
        }

        async fn list_files(
            &self,
            repository: &Repository,
        ) -> std::result::Result<Vec<FileEntry>, RawFailure> {
            if self.failing_repos.contains(&repository.name) {
                return Err(RawFailure::Http {
                    status: 401,
                    message: "bad credentials".to_string(),
                });
            }
            Ok(self
                .files
                .get(&repository.name)
                .map(|files| {
                    files
                        .iter()
                        .map(|(path, _)| FileEntry {
                            path: path.clone(),
                            size: None,
                            sha: None,
                        })
                        .collect()
                })
                .unwrap_or_default())
        }

        async fn read_file(
            &self,
            repository: &Repository,
            entry: &FileEntry,
        ) -> std::result::Result<FileContent, RawFailure> {
            if self.failing_files.contains(&entry.path) {
                return Err(RawFailure::Http {
                    status: 404,
                    message: "gone".to_string(),
                });
            }
            let content = self.files[&repository.name]
                .iter()
                .find(|(p, _)| *p == entry.path)
                .map(|(_, c)| c.clone())
                .unwrap_or_default();
            Ok(FileContent {
                content,
                url: format!("{}/blob/main/{}", repository.url, entry.path),
            })
        }
    }

    fn settings() -> DiscoverySettings {
        DiscoverySettings {
            retry: RetryPolicy::new(Duration::from_millis(1), Duration::from_millis(2)),
            ..DiscoverySettings::default()
        }
    }

    fn files(paths: &[&str]) -> Vec<(String, String)> {
        paths
            .iter()
            .map(|p| ((*p).to_string(), format!("# {p}")))
            .collect()
    }

    #[tokio::test]
    async fn test_empty_owner_is_rejected() {
        let discovery = Discovery::new(FakeBackend::default(), settings());
        let err = discovery
            .get_repositories("   ", &RepositoryFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::InvalidOwner { .. }));
    }

    #[tokio::test]
    async fn test_unknown_owner_is_fatal_backend_error() {
        let discovery = Discovery::new(FakeBackend::default(), settings());
        let err = discovery
            .get_repositories("ghost", &RepositoryFilter::default())
            .await
            .unwrap_err();
        assert_eq!(err.envelope().map(|e| e.kind), Some(ErrorKind::ResourceNotFound));
    }

    #[tokio::test]
    async fn test_invalid_name_pattern_fails_before_any_call() {
        let backend = FakeBackend::default();
        let discovery = Discovery::new(backend, settings());
        let filter = RepositoryFilter {
            name_pattern: Some("(unclosed".to_string()),
            ..RepositoryFilter::default()
        };
        let err = discovery.get_repositories("acme", &filter).await.unwrap_err();
        assert!(matches!(err, AuditError::ConfigValue { .. }));
        assert_eq!(discovery.backend().page_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_listing_dedupes_and_filters() {
        let backend = FakeBackend {
            pages: vec![
                vec![repo("infra", false), repo("legacy", true), repo("app", false)],
                vec![repo("infra", false), repo("tf-modules", false)],
            ],
            ..FakeBackend::default()
        };
        let discovery = Discovery::new(backend, settings());

        let all = discovery
            .get_repositories("acme", &RepositoryFilter::default())
            .await
            .unwrap();
        let names: Vec<&str> = all.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["infra", "legacy", "app", "tf-modules"]);

        let filter = RepositoryFilter {
            skip_archived: true,
            name_pattern: Some("^(infra|tf-)".to_string()),
            ..RepositoryFilter::default()
        };
        let filtered = discovery.get_repositories("acme", &filter).await.unwrap();
        let names: Vec<&str> = filtered.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["infra", "tf-modules"]);
    }

    #[tokio::test]
    async fn test_max_repositories_truncates_exactly_and_stops_paging() {
        let backend = FakeBackend {
            pages: vec![
                vec![repo("a", false), repo("b", false)],
                vec![repo("c", false), repo("d", false)],
                vec![repo("e", false)],
            ],
            ..FakeBackend::default()
        };
        let discovery = Discovery::new(backend, settings());
        let filter = RepositoryFilter {
            max_repositories: Some(3),
            ..RepositoryFilter::default()
        };

        let repos = discovery.get_repositories("acme", &filter).await.unwrap();
        assert_eq!(repos.len(), 3);
        assert_eq!(repos[2].name, "c");
        assert_eq!(discovery.backend().page_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_max_repositories_lists_nothing() {
        let backend = FakeBackend {
            pages: vec![vec![repo("a", false), repo("b", false)]],
            ..FakeBackend::default()
        };
        let discovery = Discovery::new(backend, settings());
        let filter = RepositoryFilter {
            max_repositories: Some(0),
            ..RepositoryFilter::default()
        };

        let repos = discovery.get_repositories("acme", &filter).await.unwrap();
        assert!(repos.is_empty());
        assert_eq!(discovery.backend().page_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_transient_listing_failure_is_retried() {
        let backend = FakeBackend {
            pages: vec![vec![repo("infra", false)]],
            ..FakeBackend::default()
        };
        backend.flaky.lock().unwrap().insert("page", 2);
        let discovery = Discovery::new(backend, settings());

        let repos = discovery
            .get_repositories("acme", &RepositoryFilter::default())
            .await
            .unwrap();
        assert_eq!(repos.len(), 1);
        assert_eq!(discovery.backend().page_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_listing_failure_after_retries_is_fatal() {
        let backend = FakeBackend {
            pages: vec![vec![repo("infra", false)]],
            ..FakeBackend::default()
        };
        backend.flaky.lock().unwrap().insert("page", 10);
        let discovery = Discovery::new(backend, settings());

        let err = discovery
            .get_repositories("acme", &RepositoryFilter::default())
            .await
            .unwrap_err();
        let envelope = err.envelope().expect("backend envelope");
        assert_eq!(envelope.kind, ErrorKind::PlatformError);
        assert_eq!(discovery.backend().page_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_repository_exists_statuses_and_cache() {
        let backend = FakeBackend {
            pages: vec![vec![repo("infra", false), repo("legacy", true)]],
            ..FakeBackend::default()
        };
        let discovery = Discovery::new(backend, settings());
        let skip_archived = RepositoryFilter {
            skip_archived: true,
            ..RepositoryFilter::default()
        };

        assert_eq!(
            discovery.repository_exists("acme", "infra", &skip_archived).await.unwrap(),
            RepositoryStatus::Available
        );
        assert_eq!(
            discovery.repository_exists("acme", "legacy", &skip_archived).await.unwrap(),
            RepositoryStatus::Excluded
        );
        assert_eq!(
            discovery
                .repository_exists("acme", "legacy", &RepositoryFilter::default())
                .await
                .unwrap(),
            RepositoryStatus::Available
        );
        assert_eq!(
            discovery.repository_exists("acme", "nope", &skip_archived).await.unwrap(),
            RepositoryStatus::Missing
        );
        assert_eq!(
            discovery.repository_exists("acme", "nope", &skip_archived).await.unwrap(),
            RepositoryStatus::Missing
        );
        // infra, legacy, nope: each fetched once.
        assert_eq!(discovery.backend().lookups.load(Ordering::SeqCst), 3);

        let err = discovery
            .repository_exists("acme", "forbidden", &skip_archived)
            .await
            .unwrap_err();
        assert_eq!(err.envelope().map(|e| e.kind), Some(ErrorKind::AuthorizationFailed));
    }

    #[tokio::test]
    async fn test_repository_exists_rejects_empty_name() {
        let discovery = Discovery::new(FakeBackend::default(), settings());
        let err = discovery
            .repository_exists("acme", "  ", &RepositoryFilter::default())
            .await
            .unwrap_err();
        match &err {
            AuditError::InvalidRepositoryName { message, .. } => {
                assert!(message.contains("repository name"));
            }
            other => panic!("expected InvalidRepositoryName, got {other:?}"),
        }
        assert_eq!(err.exit_code(), 16);
        assert_eq!(discovery.backend().lookups.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_listing_populates_cache() {
        let backend = FakeBackend {
            pages: vec![vec![repo("infra", false)]],
            ..FakeBackend::default()
        };
        let discovery = Discovery::new(backend, settings());
        discovery
            .get_repositories("acme", &RepositoryFilter::default())
            .await
            .unwrap();

        let status = discovery
            .repository_exists("acme", "infra", &RepositoryFilter::default())
            .await
            .unwrap();
        assert_eq!(status, RepositoryStatus::Available);
        assert_eq!(discovery.backend().lookups.load(Ordering::SeqCst), 0);
        assert_eq!(discovery.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_disabled_cache_always_asks_backend() {
        let backend = FakeBackend {
            pages: vec![vec![repo("infra", false)]],
            ..FakeBackend::default()
        };
        let discovery = Discovery::new(
            backend,
            DiscoverySettings {
                cache_enabled: false,
                ..settings()
            },
        );
        for _ in 0..2 {
            discovery
                .repository_exists("acme", "infra", &RepositoryFilter::default())
                .await
                .unwrap();
        }
        assert_eq!(discovery.backend().lookups.load(Ordering::SeqCst), 2);
        assert!(discovery.cache().is_empty());
    }

    #[tokio::test]
    async fn test_file_filters_and_truncation() {
        let mut backend = FakeBackend::default();
        backend.files.insert(
            "infra".to_string(),
            files(&[
                "README.md",
                "main.tf",
                "modules/vpc/main.tf",
                "test/fixtures/main.tf",
                "live/prod/terragrunt.hcl",
                "live/root.hcl",
            ]),
        );
        let discovery = Discovery::new(backend, settings());
        let infra = repo("infra", false);

        let all = discovery
            .find_iac_files_in_repository(&infra, &DiscoveryOptions::default())
            .await
            .unwrap();
        let paths: Vec<&str> = all.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["main.tf", "modules/vpc/main.tf", "test/fixtures/main.tf", "live/prod/terragrunt.hcl"]
        );
        assert_eq!(all[3].kind, IacKind::Terragrunt);
        assert_eq!(all[0].repository, "acme/infra");
        assert_eq!(all[0].content, "# main.tf");

        let options = DiscoveryOptions {
            kinds: vec![IacKind::Terraform],
            exclude_patterns: vec!["test/**".to_string()],
            include_patterns: vec!["**/*.tf".to_string(), "main.tf".to_string()],
            max_files: Some(2),
        };
        let some = discovery.find_iac_files_in_repository(&infra, &options).await.unwrap();
        let paths: Vec<&str> = some.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["main.tf", "modules/vpc/main.tf"]);
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let selector = FileSelector::compile(&DiscoveryOptions {
            include_patterns: vec!["modules/**".to_string()],
            exclude_patterns: vec!["modules/legacy/**".to_string()],
            ..DiscoveryOptions::default()
        })
        .unwrap();
        assert_eq!(selector.select("modules/vpc/main.tf"), Some(IacKind::Terraform));
        assert_eq!(selector.select("modules/legacy/main.tf"), None);
        assert_eq!(selector.select("main.tf"), None);
    }

    #[test]
    fn test_bad_glob_is_configuration_error() {
        let err = FileSelector::compile(&DiscoveryOptions {
            exclude_patterns: vec!["[".to_string()],
            ..DiscoveryOptions::default()
        })
        .unwrap_err();
        assert!(matches!(err, AuditError::ConfigValue { .. }));
    }

    #[tokio::test]
    async fn test_unreadable_files_are_dropped() {
        let mut backend = FakeBackend::default();
        backend
            .files
            .insert("infra".to_string(), files(&["a.tf", "b.tf", "c.tf"]));
        backend.failing_files.insert("b.tf".to_string());
        let discovery = Discovery::new(backend, settings());

        let found = discovery
            .find_iac_files_in_repository(&repo("infra", false), &DiscoveryOptions::default())
            .await
            .unwrap();
        let paths: Vec<&str> = found.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a.tf", "c.tf"]);
    }

    #[tokio::test]
    async fn test_discover_isolates_failing_repository() {
        let mut backend = FakeBackend {
            pages: vec![vec![repo("one", false), repo("two", false), repo("three", false)]],
            ..FakeBackend::default()
        };
        backend.files.insert("one".to_string(), files(&["main.tf"]));
        backend.files.insert("three".to_string(), files(&["x.tf", "y.tf"]));
        backend.failing_repos.insert("two".to_string());
        let discovery = Discovery::new(backend, settings());

        let report = discovery.discover("acme", &DiscoveryFilter::default()).await.unwrap();
        assert_eq!(report.repositories.len(), 3);
        assert_eq!(report.repositories_scanned, 2);
        assert_eq!(report.repositories_failed, 1);
        assert!(report.is_partial());
        assert_eq!(report.files.len(), 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].repository, "acme/two");
        assert_eq!(report.failures[0].error.kind, ErrorKind::AuthenticationFailed);
    }

    #[tokio::test]
    async fn test_discover_with_no_iac_files_is_not_partial() {
        let backend = FakeBackend {
            pages: vec![vec![repo("docs", false)]],
            ..FakeBackend::default()
        };
        let discovery = Discovery::new(backend, settings());
        let report = discovery.discover("acme", &DiscoveryFilter::default()).await.unwrap();
        assert!(report.files.is_empty());
        assert!(!report.is_partial());
        assert_eq!(report.repositories_scanned, 1);
    }
}
